use super::traits::{has_extension, PageSource};
use crate::error::LoadError;
use crate::types::{PageRecord, SourceDocument};
use std::path::Path;

const FORM_FEED: char = '\u{0c}';

/// Text dumps with one page per form feed, as written by `pdftotext`.
/// Pages are numbered from 1 in file order.
pub struct PlainTextPageSource;

impl PageSource for PlainTextPageSource {
    fn parse(&self, filename: &str, bytes: &[u8]) -> Result<SourceDocument, LoadError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| LoadError::Malformed(format!("not valid UTF-8: {e}")))?;

        let mut pages: Vec<PageRecord> = text
            .split(FORM_FEED)
            .enumerate()
            .map(|(i, page)| PageRecord::new(i as u32 + 1, page))
            .collect();

        // pdftotext ends the last page with a form feed too
        if pages.last().is_some_and(|p| p.text_content.trim().is_empty()) && pages.len() > 1 {
            pages.pop();
        }

        tracing::debug!("Loaded {} pages from {filename} (text)", pages.len());
        Ok(SourceDocument::new(filename, pages))
    }

    fn name(&self) -> &str {
        "text"
    }

    fn supports_file_type(&self, path: &Path) -> bool {
        has_extension(path, &["txt", "text"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_form_feed() {
        let doc = PlainTextPageSource
            .parse("RCM07_V1.txt", b"page one\x0cpage two\x0c")
            .unwrap();
        assert_eq!(
            doc.pages,
            vec![PageRecord::new(1, "page one"), PageRecord::new(2, "page two")]
        );
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        assert!(matches!(
            PlainTextPageSource.parse("x.txt", &[0xff, 0xfe]),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn picks_source_by_extension() {
        assert_eq!(crate::sources::source_for(Path::new("a.TXT")).unwrap().name(), "text");
        assert!(crate::sources::source_for(Path::new("a.pdf")).is_err());
    }
}
