// All extraction logic lives in lessonmap-core
// This CLI acts as a thin wrapper around the core library

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

// Re-export core types for convenience
pub use lessonmap_core::*;

/// Pick the effective config: an explicit file wins over a named preset.
pub fn resolve_config(config_path: Option<&str>, preset: Option<&str>) -> Result<ExtractionConfig> {
    if let Some(path) = config_path {
        return ExtractionConfig::load_from_file(path)
            .with_context(|| format!("cannot load config from {path}"));
    }

    let manager = ConfigManager::new();
    match preset {
        Some(name) => manager.get(name).cloned().with_context(|| {
            format!(
                "unknown preset '{name}' (available: {})",
                manager.preset_names().join(", ")
            )
        }),
        None => Ok(ExtractionConfig::default()),
    }
}

/// Expand directories into the page dumps they contain (sorted, non-recursive).
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("cannot list {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_page_dump(p))
                .collect();
            found.sort();
            inputs.extend(found);
        } else {
            inputs.push(path.clone());
        }
    }
    Ok(inputs)
}

fn is_page_dump(path: &Path) -> bool {
    sources::source_for(path).is_ok()
}
