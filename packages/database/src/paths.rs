//! Filesystem helpers for database files.

use std::path::Path;

/// Creates the directory that will hold the database file at `path`.
///
/// A bare file name (no parent) needs nothing.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            log::debug!("Creating database directory {}", parent.display());
            std::fs::create_dir_all(parent)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_parents_once() {
        let root = std::env::temp_dir().join(format!("accident_map_paths_{}", std::process::id()));
        let file = root.join("nested").join("accident_map.duckdb");

        ensure_parent_dir(&file).unwrap();
        ensure_parent_dir(&file).unwrap();
        assert!(root.join("nested").is_dir());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn bare_file_names_need_no_directory() {
        ensure_parent_dir(Path::new("accident_map.duckdb")).unwrap();
    }
}
