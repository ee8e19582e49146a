use crate::error::{ErrorKind, ExtractionError, Result};
use crate::export::{render, ExportFormat, ExportMetadata};
use crate::processor::{ExtractionCoordinator, PipelineStages};
use crate::report::ExtractionResult;
use crate::sources::source_for;
use crate::storage::{calculate_config_hash, calculate_input_hash, ExportSink};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::time::Duration;

/// Options for a batch run, filled from the CLI
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub format: ExportFormat,
    /// Worker threads; 0 lets rayon decide
    pub jobs: usize,
    pub timeout: Option<Duration>,
    pub profile: bool,
    /// Write per-stage JSON dumps into this directory
    pub stages_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Succeeded {
        document: String,
        lessons: usize,
        sessions: usize,
        quality: f32,
        export: Option<PathBuf>,
    },
    Failed {
        document: String,
        kind: ErrorKind,
        message: String,
    },
}

impl DocumentOutcome {
    pub fn document(&self) -> &str {
        match self {
            DocumentOutcome::Succeeded { document, .. } | DocumentOutcome::Failed { document, .. } => document,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<DocumentOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DocumentOutcome::Succeeded { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DocumentOutcome::Failed { .. }))
    }

    /// Documents that loaded fine but produced no lessons
    pub fn empty_documents(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DocumentOutcome::Succeeded { lessons: 0, .. }))
    }

    /// 0 all succeeded, 1 any document failed, 2 any document had no lessons
    pub fn exit_code(&self) -> i32 {
        if self.failures().next().is_some() {
            1
        } else if self.empty_documents().next().is_some() {
            2
        } else {
            0
        }
    }
}

/// Runs the coordinator over many inputs. A failing document is recorded
/// and the batch moves on.
pub struct BatchRunner {
    coordinator: Arc<ExtractionCoordinator>,
    sink: Arc<dyn ExportSink>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(
        coordinator: ExtractionCoordinator,
        sink: Arc<dyn ExportSink>,
        options: BatchOptions,
    ) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            sink,
            options,
        }
    }

    pub fn run(&self, inputs: &[PathBuf]) -> Result<BatchSummary> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build()
            .map_err(|e| ExtractionError::Config(format!("cannot start worker pool: {e}")))?;

        tracing::info!("Processing {} documents", inputs.len());
        let names = export_names(inputs);
        let outcomes = pool.install(|| {
            inputs
                .par_iter()
                .zip(names.par_iter())
                .map(|(path, name)| self.process_one(path, name))
                .collect::<Vec<_>>()
        });

        let summary = BatchSummary { outcomes };
        tracing::info!(
            "Batch finished: {} succeeded, {} failed",
            summary.succeeded(),
            summary.failures().count()
        );
        Ok(summary)
    }

    fn process_one(&self, path: &Path, export_name: &str) -> DocumentOutcome {
        let document = path.display().to_string();
        match self.extract_and_export(path, export_name) {
            Ok((result, export)) => DocumentOutcome::Succeeded {
                document,
                lessons: result.document.lessons.len(),
                sessions: result.report.stats.total_sessions_found,
                quality: result.document.extraction_quality_score,
                export,
            },
            Err(e) => {
                tracing::error!("{document}: {e}");
                DocumentOutcome::Failed {
                    document,
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    fn extract_and_export(
        &self,
        path: &Path,
        export_name: &str,
    ) -> Result<(ExtractionResult, Option<PathBuf>)> {
        let document = path.display().to_string();
        let (result, stages, input_hash) = match self.options.timeout {
            Some(timeout) => self.extract_with_timeout(path, timeout)?,
            None => extract_path(&self.coordinator, path, &self.options)?,
        };

        if let (Some(dir), Some(stages)) = (&self.options.stages_dir, &stages) {
            write_stages(dir, export_name, stages)
                .map_err(|e| ExtractionError::write(&document, "cannot write stage dump", e))?;
        }

        // Writing happens here, after the worker returned, so a timed-out
        // document never leaves an export behind
        let config = self.coordinator.config();
        let config_hash = calculate_config_hash(config)
            .map_err(|e| ExtractionError::write(&document, "cannot hash config", e))?;
        let metadata = ExportMetadata::new(input_hash, &config.name, config_hash);
        let rendered = render(&result, &metadata, self.options.format)
            .map_err(|e| ExtractionError::write(&document, "cannot serialize export", e))?;

        let name = self.options.format.file_name(export_name);
        let export = self.sink.write_export(&document, &name, rendered.as_bytes())?;
        Ok((result, export))
    }

    fn extract_with_timeout(&self, path: &Path, timeout: Duration) -> Result<Extracted> {
        let (tx, rx) = mpsc::channel();
        let coordinator = Arc::clone(&self.coordinator);
        let options = self.options.clone();
        let owned_path = path.to_path_buf();

        std::thread::spawn(move || {
            // The receiver is gone once the timeout fired; nothing left to report to
            let _ = tx.send(extract_path(&coordinator, &owned_path, &options));
        });

        match rx.recv_timeout(timeout) {
            Ok(extracted) => extracted,
            Err(_) => Err(ExtractionError::Timeout {
                document: path.display().to_string(),
                seconds: timeout.as_secs(),
            }),
        }
    }
}

type Extracted = (ExtractionResult, Option<PipelineStages>, String);

fn extract_path(
    coordinator: &ExtractionCoordinator,
    path: &Path,
    options: &BatchOptions,
) -> Result<Extracted> {
    let document = path.display().to_string();
    let source = source_for(path).map_err(|e| ExtractionError::load(&document, e))?;
    let bytes = std::fs::read(path).map_err(|e| {
        ExtractionError::load(
            &document,
            crate::error::LoadError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        )
    })?;
    let input_hash = calculate_input_hash(&bytes);

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| document.clone());
    let source_document = source
        .parse(&filename, &bytes)
        .map_err(|e| ExtractionError::load(&document, e))?;
    tracing::debug!("{document}: loaded with {} source", source.name());

    if options.stages_dir.is_some() {
        let (result, stages) = coordinator.extract_capture_stages(source_document)?;
        Ok((result, Some(stages), input_hash))
    } else if options.profile {
        let result = coordinator.extract_with_profiling(source_document)?;
        Ok((result, None, input_hash))
    } else {
        let result = coordinator.extract(source_document)?;
        Ok((result, None, input_hash))
    }
}

/// Output name for every input, taken from the input file name. Inputs that
/// share a file name (from different directories) get `-2`, `-3`, ... appended
/// to the stem in input order.
pub fn export_names(inputs: &[PathBuf]) -> Vec<String> {
    let base: Vec<String> = inputs
        .iter()
        .map(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        })
        .collect();

    let mut seen: HashMap<&str, usize> = HashMap::new();
    base.iter()
        .map(|name| {
            let count = seen.entry(name.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name.clone()
            } else {
                match name.rsplit_once('.') {
                    Some((stem, ext)) => format!("{stem}-{count}.{ext}"),
                    None => format!("{name}-{count}"),
                }
            }
        })
        .collect()
}

/// One JSON file per stage: `<stem>.pages.json`, `<stem>.markers.json`,
/// `<stem>.outline.json`, `<stem>.lessons.json`
pub fn write_stages(dir: &Path, filename: &str, stages: &PipelineStages) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);

    let dumps = [
        ("pages", serde_json::to_string_pretty(&stages.page_classes)),
        ("markers", serde_json::to_string_pretty(&stages.markers)),
        ("outline", serde_json::to_string_pretty(&stages.outline)),
        ("lessons", serde_json::to_string_pretty(&stages.lessons)),
    ];
    for (stage, json) in dumps {
        let json = json.map_err(std::io::Error::other)?;
        std::fs::write(dir.join(format!("{stem}.{stage}.json")), json)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileSink, NoOpSink};

    const LESSON_PAGES: &str = r#"{"pages": [
        {"page_number": 1, "text_content": "LESSON 1 | SESSION 1 Explore Ratios"},
        {"page_number": 2, "text_content": "LESSON 1 | SESSION 2"}
    ]}"#;

    fn write_input(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn failures_do_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_input(dir.path(), "RCM07_V1.json", LESSON_PAGES);
        let bad = write_input(dir.path(), "RCM07_V2.json", "not json");
        let missing = dir.path().join("RCM08_V1.json");

        let sink = Arc::new(FileSink::new(dir.path().join("out")).unwrap());
        let runner = BatchRunner::new(ExtractionCoordinator::default(), sink, BatchOptions::default());
        let summary = runner.run(&[good, bad, missing]).unwrap();

        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.failures().count(), 2);
        assert!(summary
            .failures()
            .all(|f| matches!(f, DocumentOutcome::Failed { kind: ErrorKind::DocumentLoad, .. })));
        assert_eq!(summary.exit_code(), 1);
        assert!(dir.path().join("out/RCM07_V1.hierarchy.json").exists());
    }

    #[test]
    fn document_without_lessons_exits_with_two() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(
            dir.path(),
            "RCM06_V1.json",
            r#"[{"page_number": 1, "text_content": "Nothing structural here"}]"#,
        );
        let runner = BatchRunner::new(
            ExtractionCoordinator::default(),
            Arc::new(NoOpSink),
            BatchOptions::default(),
        );
        let summary = runner.run(&[input]).unwrap();
        assert_eq!(summary.empty_documents().count(), 1);
        assert_eq!(summary.exit_code(), 2);
    }

    #[test]
    fn all_good_exits_with_zero() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "RCM07_V1.json", LESSON_PAGES);
        let runner = BatchRunner::new(
            ExtractionCoordinator::default(),
            Arc::new(NoOpSink),
            BatchOptions {
                jobs: 2,
                timeout: Some(Duration::from_secs(30)),
                ..BatchOptions::default()
            },
        );
        let summary = runner.run(&[input]).unwrap();
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.outcomes[0].document(), dir.path().join("RCM07_V1.json").display().to_string());
    }

    #[test]
    fn stage_dumps_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path(), "RCM07_V1.json", LESSON_PAGES);
        let stages_dir = dir.path().join("stages");
        let runner = BatchRunner::new(
            ExtractionCoordinator::default(),
            Arc::new(NoOpSink),
            BatchOptions {
                stages_dir: Some(stages_dir.clone()),
                ..BatchOptions::default()
            },
        );
        runner.run(&[input]).unwrap();
        for stage in ["pages", "markers", "outline", "lessons"] {
            assert!(stages_dir.join(format!("RCM07_V1.{stage}.json")).exists());
        }
    }

    #[test]
    fn exports_are_named_after_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let shared = r#"{"filename": "RCM07_NA_SW_V1.pdf", "pages": [
            {"page_number": 1, "text_content": "LESSON 1 | SESSION 1 Explore Ratios"}
        ]}"#;
        let first = write_input(dir.path(), "g7_run_a.json", shared);
        let second = write_input(dir.path(), "g7_run_b.json", shared);

        let out = dir.path().join("out");
        let sink = Arc::new(FileSink::new(&out).unwrap());
        let runner = BatchRunner::new(
            ExtractionCoordinator::default(),
            sink,
            BatchOptions {
                jobs: 2,
                ..BatchOptions::default()
            },
        );
        let summary = runner.run(&[first, second]).unwrap();

        assert_eq!(summary.succeeded(), 2);
        let mut files: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["g7_run_a.hierarchy.json", "g7_run_b.hierarchy.json"]);
    }

    #[test]
    fn same_file_name_in_two_directories_gets_distinct_names() {
        let names = export_names(&[
            PathBuf::from("vol1/RCM07_V1.json"),
            PathBuf::from("vol2/RCM07_V1.json"),
            PathBuf::from("vol2/RCM07_V2.json"),
            PathBuf::from("vol3/RCM07_V1.json"),
        ]);
        assert_eq!(
            names,
            vec!["RCM07_V1.json", "RCM07_V1-2.json", "RCM07_V2.json", "RCM07_V1-3.json"]
        );
    }

    // A FIFO with no writer blocks the reader forever, which pins the
    // extraction worker past any timeout
    #[cfg(unix)]
    #[test]
    fn timed_out_document_is_recorded_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let stalled = dir.path().join("RCM07_V1.json");
        let status = std::process::Command::new("mkfifo").arg(&stalled).status().unwrap();
        assert!(status.success());
        let good = write_input(dir.path(), "RCM07_V2.json", LESSON_PAGES);

        let out = dir.path().join("out");
        let sink = Arc::new(FileSink::new(&out).unwrap());
        let runner = BatchRunner::new(
            ExtractionCoordinator::default(),
            sink,
            BatchOptions {
                jobs: 2,
                timeout: Some(Duration::from_secs(2)),
                ..BatchOptions::default()
            },
        );
        let summary = runner.run(&[stalled, good]).unwrap();

        assert!(matches!(
            summary.outcomes[0],
            DocumentOutcome::Failed {
                kind: ErrorKind::Timeout,
                ..
            }
        ));
        assert!(matches!(summary.outcomes[1], DocumentOutcome::Succeeded { .. }));
        assert_eq!(summary.exit_code(), 1);

        let files: Vec<String> = std::fs::read_dir(&out)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files, vec!["RCM07_V2.hierarchy.json"]);
    }

    #[test]
    fn exit_code_prefers_failure_over_empty() {
        let summary = BatchSummary {
            outcomes: vec![
                DocumentOutcome::Succeeded {
                    document: "a".to_string(),
                    lessons: 0,
                    sessions: 0,
                    quality: 0.0,
                    export: None,
                },
                DocumentOutcome::Failed {
                    document: "b".to_string(),
                    kind: ErrorKind::Timeout,
                    message: "timed out".to_string(),
                },
            ],
        };
        assert_eq!(summary.exit_code(), 1);
    }
}
