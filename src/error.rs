//! Typed failures raised before any table is converted.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
    /// Input directory does not exist or is not a directory.
    #[error("{path} does not exist")]
    InputDirectoryNotFound { path: PathBuf },

    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two input files map to the same lower-cased table name.
    #[error("table '{table}' is provided by both {first} and {second}")]
    DuplicateTable {
        table: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A cast rule names a table that has no input file.
    #[error("cast rule references table '{table}' which was not found in {directory}")]
    UnknownTable { table: String, directory: PathBuf },
}
