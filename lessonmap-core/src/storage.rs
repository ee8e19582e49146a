use crate::error::{ExtractionError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Where finished exports go. Implementations must leave earlier exports
/// untouched when a write fails.
pub trait ExportSink: Send + Sync {
    /// Store `contents` under `name`; returns the location when there is one
    fn write_export(&self, document: &str, name: &str, contents: &[u8]) -> Result<Option<PathBuf>>;
}

/// File-based sink writing into one output directory
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&output_dir)?;
        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Unique per write, so parallel writers never share a temp file
    fn temp_path(&self, name: &str) -> PathBuf {
        self.output_dir
            .join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
    }
}

impl ExportSink for FileSink {
    fn write_export(&self, document: &str, name: &str, contents: &[u8]) -> Result<Option<PathBuf>> {
        let path = self.output_dir.join(name);
        let temp = self.temp_path(name);

        // Write beside the target, then rename: readers never see a partial file
        let written = fs::write(&temp, contents).and_then(|_| fs::rename(&temp, &path));
        if let Err(e) = written {
            fs::remove_file(&temp).ok();
            return Err(ExtractionError::write(
                document,
                format!("cannot write {}", path.display()),
                e,
            ));
        }

        tracing::debug!("Wrote {} ({} bytes)", path.display(), contents.len());
        Ok(Some(path))
    }
}

/// No-op sink that discards all exports
pub struct NoOpSink;

impl ExportSink for NoOpSink {
    fn write_export(&self, _document: &str, _name: &str, _contents: &[u8]) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Hash of the raw input bytes, stamped into export metadata
pub fn calculate_input_hash(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.len().to_le_bytes());
    hasher.update(input);
    format!("{:x}", hasher.finalize())
}

/// Hash of the effective configuration, so exports record which settings made them
pub fn calculate_config_hash<T: serde::Serialize>(config: &T) -> serde_json::Result<String> {
    let config_json = serde_json::to_string(config)?;

    let mut hasher = Sha256::new();
    hasher.update(config_json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;

    #[test]
    fn test_input_hash_consistency() {
        let data = b"LESSON 1 | SESSION 1";
        assert_eq!(calculate_input_hash(data), calculate_input_hash(data));
        assert_ne!(calculate_input_hash(data), calculate_input_hash(b"LESSON 1 | SESSION 2"));
    }

    #[test]
    fn test_config_hash_tracks_changes() {
        let default = ExtractionConfig::default();
        let mut changed = ExtractionConfig::default();
        changed.sessions.default_span = 5;
        assert_ne!(
            calculate_config_hash(&default).unwrap(),
            calculate_config_hash(&changed).unwrap()
        );
    }

    #[test]
    fn test_file_sink_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("out")).unwrap();

        let path = sink
            .write_export("doc", "doc.json", b"{}")
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");

        let leftovers: Vec<_> = std::fs::read_dir(sink.output_dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_temp_paths_are_unique_per_write() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        assert_ne!(sink.temp_path("doc.json"), sink.temp_path("doc.json"));
    }

    #[test]
    fn test_file_sink_failure_is_schema_write() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::new(dir.path()).unwrap();
        let err = sink
            .write_export("doc", "missing/dir/doc.json", b"{}")
            .unwrap_err();
        assert!(matches!(err, ExtractionError::SchemaWrite { .. }));
    }

    #[test]
    fn test_noop_sink_discards() {
        assert_eq!(NoOpSink.write_export("doc", "doc.json", b"{}").unwrap(), None);
    }
}
