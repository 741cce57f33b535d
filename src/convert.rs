use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;

use crate::{
    data::parse_typed_value,
    discovery::{self, TableFiles},
    error::PrepError,
    io_utils::{self, ReadOptions},
    parquet_io::TableWriter,
    rules::{self, Mode, ModeProfile},
    schema::{self, TableSchema},
};

pub const PARQUET_EXTENSION: &str = "parquet";

/// Everything one conversion run needs besides the fixed profile data.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub input_directory: PathBuf,
    pub mode: Mode,
    pub output_dir: Option<PathBuf>,
    pub sample_rows: usize,
    pub read: ReadOptions,
}

impl ConvertOptions {
    pub fn new(input_directory: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            input_directory: input_directory.into(),
            mode,
            output_dir: None,
            sample_rows: 20_480,
            read: ReadOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub output: PathBuf,
    pub rows: u64,
    /// Columns whose final type differs from the inferred one.
    pub retyped_columns: usize,
    pub explicit_schema: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub output_directory: PathBuf,
    pub tables: Vec<TableReport>,
}

impl ConversionReport {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }

    /// One line per table, naming the schema source and the cast count.
    pub fn summary_lines(&self) -> Vec<String> {
        self.tables
            .iter()
            .map(|t| {
                let source = if t.explicit_schema {
                    format!("explicit schema, {} column(s) cast", t.retyped_columns)
                } else {
                    "inferred schema".to_string()
                };
                format!("{}: {} row(s), {source} -> {:?}", t.table, t.rows, t.output)
            })
            .collect()
    }
}

/// Rule-adjusted schema maps for the targeted tables, plus how many columns
/// each rule set changed relative to inference.
#[derive(Debug, Clone)]
pub struct PlannedSchemas {
    pub schemas: BTreeMap<String, TableSchema>,
    pub retyped: BTreeMap<String, usize>,
}

/// Resolves and canonicalises the input directory.
pub fn resolve_input_directory(path: &Path) -> Result<PathBuf, PrepError> {
    if !path.is_dir() {
        return Err(PrepError::InputDirectoryNotFound {
            path: path.to_path_buf(),
        });
    }
    fs::canonicalize(path).map_err(|_| PrepError::InputDirectoryNotFound {
        path: path.to_path_buf(),
    })
}

/// Output directory: the explicit override, or a sibling of the input named
/// after the profile.
pub fn resolve_output_directory(
    input_directory: &Path,
    output_dir: Option<&Path>,
    profile: &ModeProfile,
) -> PathBuf {
    match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input_directory.with_file_name(profile.output_dir_name),
    }
}

pub fn output_path(output_directory: &Path, table: &str) -> PathBuf {
    output_directory.join(format!("{}.{PARQUET_EXTENSION}", table.to_lowercase()))
}

/// Samples every table targeted by `profile`'s rules and folds the rules over
/// the inferred schemas. Fails before anything is written when a rule names
/// a table that was not discovered.
pub fn plan_schemas(
    input_directory: &Path,
    tables: &TableFiles,
    profile: &ModeProfile,
    sample_rows: usize,
    read: &ReadOptions,
) -> Result<PlannedSchemas> {
    let resolved = profile.resolve(tables.keys().map(String::as_str));
    let targeted = rules::targeted_tables(&resolved);
    debug!("Tables targeted by cast rules: {}", targeted.iter().join(", "));

    if let Some(missing) = targeted.iter().find(|table| !tables.contains_key(*table)) {
        return Err(PrepError::UnknownTable {
            table: missing.clone(),
            directory: input_directory.to_path_buf(),
        }
        .into());
    }

    let mut schemas = BTreeMap::new();
    let mut retyped = BTreeMap::new();
    for table in targeted {
        let path = tables
            .get(&table)
            .ok_or_else(|| anyhow!("Table '{table}' disappeared from the input list"))?;
        let inferred = schema::infer_table_schema(&table, path, sample_rows, read)
            .with_context(|| format!("Inferring schema for table '{table}'"))?;
        let mut adjusted = inferred.clone();
        rules::apply_rules(&mut adjusted, &resolved);
        let changed = inferred
            .columns
            .iter()
            .zip(&adjusted.columns)
            .filter(|(before, after)| before.datatype != after.datatype)
            .count();
        retyped.insert(table.clone(), changed);
        schemas.insert(table, adjusted);
    }

    Ok(PlannedSchemas { schemas, retyped })
}

/// Reads `path` with the explicit column types of `table` and writes it to
/// `output`. Returns the number of data rows written.
pub fn convert_table(
    path: &Path,
    table: &TableSchema,
    date_format: &str,
    read: &ReadOptions,
    output: &Path,
) -> Result<u64> {
    let delimiter = io_utils::resolve_input_delimiter(path, read.delimiter)?;
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter, read.quoting)?;
    let headers = io_utils::reader_headers(&mut reader, read.encoding)
        .with_context(|| format!("Reading header of {path:?}"))?;
    let header_names: Vec<&str> = headers.iter().map(String::as_str).collect();
    let schema_names: Vec<&str> = table.column_names().collect();
    if header_names != schema_names {
        return Err(anyhow!(
            "Header of {path:?} does not match the schema of table '{}'",
            table.table
        ));
    }

    let mut writer = TableWriter::create(output, table)?;
    let mut record = csv::ByteRecord::new();
    let mut row = 0usize;
    while reader
        .read_byte_record(&mut record)
        .with_context(|| format!("Reading {path:?}"))?
    {
        row += 1;
        let mut values = Vec::with_capacity(table.columns.len());
        for (field, column) in record.iter().zip(&table.columns) {
            let text = io_utils::decode_bytes(field, read.encoding)
                .with_context(|| format!("Decoding row {row} of {path:?}"))?;
            let value = parse_typed_value(&text, column.datatype, date_format).with_context(|| {
                format!(
                    "Table '{}', row {row}, column '{}'",
                    table.table, column.name
                )
            })?;
            values.push(value);
        }
        writer.push_row(values)?;
    }

    writer
        .finish()
        .with_context(|| format!("Finishing Parquet output {output:?}"))
}

/// Runs the whole conversion described by `options`.
pub fn convert_directory(options: &ConvertOptions) -> Result<ConversionReport> {
    let input_directory = resolve_input_directory(&options.input_directory)?;
    let profile = ModeProfile::for_mode(options.mode);
    let mut tables = discovery::discover_tables(&input_directory)?;
    info!(
        "Discovered {} table(s) in {:?} ({:?} mode)",
        tables.len(),
        input_directory,
        profile.mode
    );

    let planned = plan_schemas(
        &input_directory,
        &tables,
        &profile,
        options.sample_rows,
        &options.read,
    )?;

    let output_directory =
        resolve_output_directory(&input_directory, options.output_dir.as_deref(), &profile);
    fs::create_dir_all(&output_directory)
        .with_context(|| format!("Creating output directory {output_directory:?}"))?;

    let mut reports = Vec::with_capacity(tables.len());
    for (name, adjusted) in &planned.schemas {
        let path = tables
            .remove(name)
            .ok_or_else(|| anyhow!("Table '{name}' was planned but not discovered"))?;
        let output = output_path(&output_directory, name);
        let rows = convert_table(&path, adjusted, profile.date_format, &options.read, &output)
            .with_context(|| format!("Converting table '{name}'"))?;
        let retyped_columns = planned.retyped.get(name).copied().unwrap_or_default();
        info!("Wrote {rows} row(s) of '{name}' to {output:?} ({retyped_columns} column(s) cast)");
        reports.push(TableReport {
            table: name.clone(),
            output,
            rows,
            retyped_columns,
            explicit_schema: true,
        });
    }

    for (name, path) in &tables {
        let inferred = schema::infer_table_schema(name, path, options.sample_rows, &options.read)
            .with_context(|| format!("Inferring schema for table '{name}'"))?;
        let output = output_path(&output_directory, name);
        let rows = convert_table(path, &inferred, profile.date_format, &options.read, &output)
            .with_context(|| format!("Converting table '{name}'"))?;
        info!("Wrote {rows} row(s) of '{name}' to {output:?}");
        reports.push(TableReport {
            table: name.clone(),
            output,
            rows,
            retyped_columns: 0,
            explicit_schema: false,
        });
    }

    Ok(ConversionReport {
        output_directory,
        tables: reports,
    })
}
