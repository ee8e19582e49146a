use super::traits::{has_extension, PageSource};
use crate::error::LoadError;
use crate::types::{PageRecord, SourceDocument, Volume};
use serde::Deserialize;
use std::path::Path;

/// Page dumps as written by the PDF/OCR step.
pub struct JsonPageSource;

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonInput {
    Document(JsonDocument),
    Pages(Vec<PageRecord>),
}

#[derive(Deserialize)]
struct JsonDocument {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    grade: Option<u32>,
    #[serde(default)]
    volume: Option<String>,
    #[serde(default)]
    total_pages: Option<u32>,
    pages: Vec<PageRecord>,
}

impl PageSource for JsonPageSource {
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<SourceDocument, LoadError> {
        let input: JsonInput =
            serde_json::from_slice(bytes).map_err(|e| LoadError::Malformed(e.to_string()))?;

        let document = match input {
            JsonInput::Pages(pages) => SourceDocument::new(filename, pages),
            JsonInput::Document(doc) => SourceDocument {
                filename: doc.filename.unwrap_or_else(|| filename.to_string()),
                grade: doc.grade,
                volume: doc.volume.as_deref().and_then(Volume::parse),
                total_pages: doc.total_pages,
                pages: doc.pages,
            },
        };

        tracing::debug!(
            "Loaded {} pages from {} (json)",
            document.pages.len(),
            document.filename
        );
        Ok(document)
    }

    fn name(&self) -> &str {
        "json"
    }

    fn supports_file_type(&self, path: &Path) -> bool {
        has_extension(path, &["json"])
    }
}
