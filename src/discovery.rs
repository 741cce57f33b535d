//! Input table discovery.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::error::PrepError;

const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv"];

/// Lower-cased file stem to input path, ordered by table name.
pub type TableFiles = BTreeMap<String, PathBuf>;

/// Returns the table identifier for `path`: its file stem, lower-cased.
pub fn table_name(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_lowercase)
}

fn is_delimited(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            DELIMITED_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Lists the delimited files in `dir`, keyed by table name.
pub fn discover_tables(dir: &Path) -> Result<TableFiles, PrepError> {
    if !dir.is_dir() {
        return Err(PrepError::InputDirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|source| PrepError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut tables = TableFiles::new();
    for entry in entries {
        let entry = entry.map_err(|source| PrepError::DirectoryRead {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() || !is_delimited(&path) {
            continue;
        }
        let Some(name) = table_name(&path) else {
            continue;
        };
        if let Some(existing) = tables.get(&name) {
            // read_dir order is platform dependent; report the pair sorted.
            let (first, second) = if existing < &path {
                (existing.clone(), path)
            } else {
                (path, existing.clone())
            };
            return Err(PrepError::DuplicateTable {
                table: name,
                first,
                second,
            });
        }
        tables.insert(name, path);
    }

    Ok(tables)
}
