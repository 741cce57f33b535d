use std::path::PathBuf;

use clap::Parser;

use crate::rules::Mode;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Convert Synthea or Athena vocabulary CSV files to Parquet, ready for dbt-synthea",
    long_about = None
)]
pub struct Cli {
    /// Path to the input directory, e.g. the Synthea CSV output
    pub input_directory: PathBuf,
    /// Treat the input as a directory of vocabulary files instead of Synthea CSV output
    #[arg(short = 'v', long = "vocab")]
    pub vocab: bool,
    /// Output directory (defaults to synthea_parquet or vocab_parquet next to the input directory)
    #[arg(short = 'o', long = "output_dir", alias = "output-dir")]
    pub output_dir: Option<PathBuf>,
    /// Number of rows to sample when inferring types (0 means full scan)
    #[arg(long, default_value_t = 20_480)]
    pub sample_rows: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|'); sniffed from the header when omitted
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Treat double quotes as ordinary characters
    #[arg(long = "no-quoting")]
    pub no_quoting: bool,
    /// Print the discovered tables as JSON and exit
    #[arg(long = "list-tables", conflicts_with = "print_schemas")]
    pub list_tables: bool,
    /// Print the rule-adjusted schemas as YAML and exit without writing Parquet
    #[arg(long = "print-schemas")]
    pub print_schemas: bool,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.vocab {
            Mode::Vocabulary
        } else {
            Mode::Clinical
        }
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
