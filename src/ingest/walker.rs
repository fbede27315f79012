use walkdir::WalkDir;
use std::path::{Path, PathBuf};
use crate::error::{DescendantError, Result};
use crate::ingest::normalize_source_path;

/// A content export file found under the content folder
#[derive(Debug, Clone)]
pub struct ExportFile {
    /// Path relative to the content folder, `/`-separated. Stored as the item's source path.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub file_size: u64,
    pub modified: std::time::SystemTime,
}

/// Whether `path` looks like a content export (`*.json`, case-insensitive).
pub fn is_export_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Recursively discover content exports under `root`.
///
/// Results are sorted by relative path so imports run in a stable order.
pub fn discover_exports(root: &Path) -> Result<Vec<ExportFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || !is_export_file(path) {
            continue;
        }

        let metadata = std::fs::metadata(path)?;
        let relative_path = relative_source_path(root, path)?;

        files.push(ExportFile {
            relative_path,
            absolute_path: path.to_path_buf(),
            file_size: metadata.len(),
            modified: metadata.modified()?,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    log::info!("Discovered {} content exports in {}", files.len(), root.display());
    Ok(files)
}

/// Source path of `path` relative to the content folder `root`.
pub fn relative_source_path(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        DescendantError::InvalidInput(format!(
            "{} is outside the content folder {}",
            path.display(),
            root.display()
        ))
    })?;
    Ok(normalize_source_path(&relative.to_string_lossy()))
}
