//! Page Sources
//!
//! A page source turns an input file into ordered page records. Everything
//! after this point works with `PageRecord`s and does not care how the text
//! was produced.
//!
//! ```text
//! Input file (JSON page dump, form-feed text)
//!     ↓
//! [Format-specific PageSource]
//!     ↓
//! SourceDocument { filename, grade?, volume?, pages }
//!     ↓
//! [ExtractionCoordinator]
//! ```
//!
//! ## Available Sources
//!
//! - `JsonPageSource` - `{"pages": [{"page_number", "text_content"}]}` or a bare array
//! - `PlainTextPageSource` - one page per form feed (`\x0c`)

pub mod json;
pub mod plain_text;
pub mod traits;

pub use json::JsonPageSource;
pub use plain_text::PlainTextPageSource;
pub use traits::PageSource;

use crate::error::LoadError;
use std::path::Path;

/// Pick the page source that understands this file.
pub fn source_for(path: &Path) -> Result<Box<dyn PageSource>, LoadError> {
    let candidates: Vec<Box<dyn PageSource>> =
        vec![Box::new(JsonPageSource), Box::new(PlainTextPageSource)];

    candidates
        .into_iter()
        .find(|source| source.supports_file_type(path))
        .ok_or_else(|| LoadError::UnsupportedFormat(path.display().to_string()))
}
