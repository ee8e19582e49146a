use crate::error::LoadError;
use crate::types::SourceDocument;
use std::path::Path;

/// Converts raw input bytes into page records.
///
/// Sources only produce pages and whatever document metadata the input
/// carries. Missing grade/volume are resolved later from the filename.
pub trait PageSource: Send + Sync {
    /// Parse already-read input bytes
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<SourceDocument, LoadError>;

    /// Read and parse a file. The file handle is dropped before parsing starts.
    fn load_file(&self, path: &Path) -> Result<SourceDocument, LoadError> {
        let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.parse(&filename, &bytes)
    }

    /// Source name for logging
    fn name(&self) -> &str;

    fn supports_file_type(&self, path: &Path) -> bool;
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}
