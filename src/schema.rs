//! Column types, per-table schema maps, and sampling type inference.
//!
//! A [`TableSchema`] is the ordered column-name to [`ColumnType`] mapping for
//! one input table. It starts out as the result of [`infer_table_schema`],
//! which samples the first rows of the file, and is then adjusted in place by
//! the cast rules of the active mode profile before the typed read.
//!
//! Inference is deliberately conservative: a single value that no typed
//! parser accepts turns the column into `String`.

use std::{fmt, path::Path, str::FromStr};

use anyhow::{Context, Result, anyhow, ensure};
use log::debug;
use serde::Serialize;

use crate::{
    data::{parse_guid, parse_naive_date, parse_naive_datetime, parse_naive_time},
    io_utils::{self, ReadOptions},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    Guid,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Time => "time",
            ColumnType::Guid => "guid",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "string", "integer", "float", "boolean", "date", "datetime", "time", "guid",
        ]
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "varchar" | "text" => Ok(ColumnType::String),
            "integer" | "int" | "bigint" => Ok(ColumnType::Integer),
            "float" | "double" => Ok(ColumnType::Float),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "date" => Ok(ColumnType::Date),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            "time" => Ok(ColumnType::Time),
            "guid" | "uuid" => Ok(ColumnType::Guid),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

impl From<ColumnType> for String {
    fn from(value: ColumnType) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub datatype: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSchema>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn datatype(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|col| col.name == column)
            .map(|col| col.datatype)
    }

    /// Sets `target` on every column whose lower-cased name is in `names` and
    /// returns how many columns matched.
    pub fn retype_matching<'a, I>(&mut self, names: I, target: ColumnType) -> usize
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let mut matched = 0;
        for column in &mut self.columns {
            let lowered = column.name.to_lowercase();
            if names.clone().into_iter().any(|name| name == lowered) {
                column.datatype = target;
                matched += 1;
            }
        }
        matched
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|col| col.name.as_str())
    }
}

#[derive(Debug, Clone, Default)]
struct TypeCandidate {
    non_empty: usize,
    boolean_matches: usize,
    integer_matches: usize,
    float_matches: usize,
    date_matches: usize,
    datetime_matches: usize,
    time_matches: usize,
    guid_matches: usize,
    unclassified: usize,
}

impl TypeCandidate {
    fn update(&mut self, value: &str) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }
        self.non_empty += 1;

        // Single letters such as a gender column of "F" stay text.
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            self.boolean_matches += 1;
            return;
        }

        if trimmed.parse::<i64>().is_ok() {
            self.integer_matches += 1;
            return;
        }
        // f64 also accepts "inf" and "nan"; those stay text.
        if trimmed.bytes().any(|b| b.is_ascii_digit()) && trimmed.parse::<f64>().is_ok() {
            self.float_matches += 1;
            return;
        }

        if parse_naive_date(trimmed).is_ok() {
            self.date_matches += 1;
        } else if parse_naive_datetime(trimmed).is_ok() {
            self.datetime_matches += 1;
        } else if parse_naive_time(trimmed).is_ok() {
            self.time_matches += 1;
        } else if parse_guid(trimmed).is_ok() {
            self.guid_matches += 1;
        } else {
            self.unclassified += 1;
        }
    }

    fn all(&self, count: usize) -> bool {
        count == self.non_empty
    }

    fn decide(&self) -> ColumnType {
        if self.non_empty == 0 || self.unclassified > 0 {
            return ColumnType::String;
        }
        let numeric = self.integer_matches + self.float_matches;
        if self.all(self.boolean_matches) {
            ColumnType::Boolean
        } else if self.all(self.integer_matches) {
            ColumnType::Integer
        } else if self.all(numeric) {
            ColumnType::Float
        } else if self.all(self.date_matches) {
            ColumnType::Date
        } else if self.all(self.datetime_matches + self.date_matches) && self.datetime_matches > 0 {
            ColumnType::DateTime
        } else if self.all(self.time_matches) {
            ColumnType::Time
        } else if self.all(self.guid_matches) {
            ColumnType::Guid
        } else {
            ColumnType::String
        }
    }
}

/// Samples up to `sample_rows` data rows of `path` (0 scans everything) and
/// infers one type per header column.
pub fn infer_table_schema(
    table: &str,
    path: &Path,
    sample_rows: usize,
    options: &ReadOptions,
) -> Result<TableSchema> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter)?;
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, options.quoting)?;
    let headers = io_utils::reader_headers(&mut reader, options.encoding)
        .with_context(|| format!("Reading header of {path:?}"))?;
    ensure!(!headers.is_empty(), "{path:?} has no header row");

    let mut candidates = vec![TypeCandidate::default(); headers.len()];
    let mut record = csv::ByteRecord::new();
    let mut processed = 0usize;
    while sample_rows == 0 || processed < sample_rows {
        if !reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Sampling {path:?}"))?
        {
            break;
        }
        for (idx, field) in record.iter().enumerate().take(headers.len()) {
            if field.is_empty() {
                continue;
            }
            let decoded = io_utils::decode_bytes(field, options.encoding)
                .with_context(|| format!("Decoding row {} of {path:?}", processed + 1))?;
            candidates[idx].update(&decoded);
        }
        processed += 1;
    }

    debug!("Sampled {processed} row(s) of table '{table}'");

    let columns = headers
        .into_iter()
        .zip(candidates.iter())
        .map(|(name, candidate)| ColumnSchema {
            name,
            datatype: candidate.decide(),
        })
        .collect();
    Ok(TableSchema::new(table, columns))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(values: &[&str]) -> ColumnType {
        let mut candidate = TypeCandidate::default();
        for value in values {
            candidate.update(value);
        }
        candidate.decide()
    }

    #[test]
    fn only_true_false_spellings_infer_boolean() {
        assert_eq!(decide(&["yes", "no"]), ColumnType::String);
        assert_eq!(decide(&["t", "f"]), ColumnType::String);
        assert_eq!(decide(&["Y", "N"]), ColumnType::String);
        assert_eq!(decide(&["true", "false", "yes"]), ColumnType::String);
        assert_eq!(decide(&["True", "", "false"]), ColumnType::Boolean);
    }

    #[test]
    fn candidate_detects_scalar_types() {
        assert_eq!(decide(&["1", "42", "-7"]), ColumnType::Integer);
        assert_eq!(decide(&["1", "4.5"]), ColumnType::Float);
        assert_eq!(decide(&["true", "FALSE"]), ColumnType::Boolean);
        assert_eq!(decide(&["F", "F"]), ColumnType::String);
        assert_eq!(decide(&["2020-01-01", "1999-12-31"]), ColumnType::Date);
        assert_eq!(
            decide(&["2019-02-17T05:07:38Z", "2020-01-01T00:00:00Z"]),
            ColumnType::DateTime
        );
        assert_eq!(decide(&["12:30:00", "08:15"]), ColumnType::Time);
        assert_eq!(
            decide(&["b9c610cd-28a6-4636-ccb6-c7a0d2a4cb85"]),
            ColumnType::Guid
        );
    }

    #[test]
    fn candidate_falls_back_to_string() {
        assert_eq!(decide(&[]), ColumnType::String);
        assert_eq!(decide(&["", "  "]), ColumnType::String);
        assert_eq!(decide(&["1", "two"]), ColumnType::String);
        assert_eq!(decide(&["inf", "nan"]), ColumnType::String);
        assert_eq!(decide(&["2020-01-01", "12:00"]), ColumnType::String);
    }

    #[test]
    fn compact_dates_infer_as_integers() {
        assert_eq!(decide(&["19700101", "20991231"]), ColumnType::Integer);
    }

    #[test]
    fn column_type_parses_database_spellings() {
        assert_eq!("VARCHAR".parse::<ColumnType>().unwrap(), ColumnType::String);
        assert_eq!("UUID".parse::<ColumnType>().unwrap(), ColumnType::Guid);
        assert_eq!("DATE".parse::<ColumnType>().unwrap(), ColumnType::Date);
        assert_eq!("BIGINT".parse::<ColumnType>().unwrap(), ColumnType::Integer);
        assert_eq!("timestamp".parse::<ColumnType>().unwrap(), ColumnType::DateTime);
        let err = "decimal".parse::<ColumnType>().unwrap_err();
        assert!(err.to_string().contains("Supported types"));
    }

    #[test]
    fn retype_matching_is_case_insensitive() {
        let mut schema = TableSchema::new(
            "patients",
            vec![
                ColumnSchema {
                    name: "Id".to_string(),
                    datatype: ColumnType::String,
                },
                ColumnSchema {
                    name: "BIRTHDATE".to_string(),
                    datatype: ColumnType::Date,
                },
            ],
        );
        let matched = schema.retype_matching(["id", "patient"], ColumnType::Guid);
        assert_eq!(matched, 1);
        assert_eq!(schema.datatype("Id"), Some(ColumnType::Guid));
        assert_eq!(schema.datatype("BIRTHDATE"), Some(ColumnType::Date));
    }

    #[test]
    fn infer_table_schema_reads_header_and_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.csv");
        std::fs::write(
            &path,
            "Id,BIRTHDATE,HEALTHCARE_EXPENSES,NOTES\n\
             b9c610cd-28a6-4636-ccb6-c7a0d2a4cb85,1989-05-25,1234.5,\n\
             c1f1fcaa-82fd-d5b7-3544-c8f9708b06a8,1975-03-01,99,x\n",
        )
        .unwrap();

        let schema = infer_table_schema("patients", &path, 0, &ReadOptions::default()).unwrap();
        assert_eq!(schema.table, "patients");
        let types: Vec<ColumnType> = schema.columns.iter().map(|c| c.datatype).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Guid,
                ColumnType::Date,
                ColumnType::Float,
                ColumnType::String
            ]
        );
    }

    #[test]
    fn empty_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        let err = infer_table_schema("empty", &path, 0, &ReadOptions::default()).unwrap_err();
        assert!(err.to_string().contains("no header row"));
    }

    #[test]
    fn sampling_limit_bounds_inference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.csv");
        std::fs::write(&path, "value\n1\n2\nthree\n").unwrap();

        let sampled = infer_table_schema("mixed", &path, 2, &ReadOptions::default()).unwrap();
        assert_eq!(sampled.datatype("value"), Some(ColumnType::Integer));
        let full = infer_table_schema("mixed", &path, 0, &ReadOptions::default()).unwrap();
        assert_eq!(full.datatype("value"), Some(ColumnType::String));
    }
}
