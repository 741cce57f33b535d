pub mod cli;
pub mod convert;
pub mod data;
pub mod discovery;
pub mod error;
pub mod io_utils;
pub mod parquet_io;
pub mod rules;
pub mod schema;

use std::{
    collections::BTreeMap,
    env,
    io::{self, Write},
    sync::OnceLock,
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::Cli,
    convert::{ConvertOptions, convert_directory, plan_schemas, resolve_input_directory},
    io_utils::ReadOptions,
    rules::ModeProfile,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("synthea_parquet", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let options = convert_options(&cli)?;
    if cli.list_tables {
        return handle_list_tables(&options);
    }
    if cli.print_schemas {
        return handle_print_schemas(&options);
    }
    let report = convert_directory(&options)?;
    info!(
        "Converted {} table(s), {} row(s) in total, into {:?}",
        report.tables.len(),
        report.total_rows(),
        report.output_directory
    );
    for line in report.summary_lines() {
        info!("  {line}");
    }
    debug!(
        "Conversion report: {}",
        serde_json::to_string(&report).context("Serializing conversion report")?
    );
    Ok(())
}

fn convert_options(cli: &Cli) -> Result<ConvertOptions> {
    let input_directory = resolve_input_directory(&cli.input_directory)?;
    let output_dir = match &cli.output_dir {
        // The directory may not exist yet, so resolve it against the cwd only.
        Some(dir) if dir.is_relative() => Some(
            env::current_dir()
                .context("Resolving current directory")?
                .join(dir),
        ),
        other => other.clone(),
    };
    let read = ReadOptions {
        delimiter: cli.delimiter,
        encoding: io_utils::resolve_encoding(cli.input_encoding.as_deref())?,
        quoting: !cli.no_quoting,
    };
    debug!(
        "Input {:?}, delimiter {}, encoding {}",
        input_directory,
        cli.delimiter
            .map(printable_delimiter)
            .unwrap_or_else(|| "auto".to_string()),
        read.encoding.name()
    );
    Ok(ConvertOptions {
        input_directory,
        mode: cli.mode(),
        output_dir,
        sample_rows: cli.sample_rows,
        read,
    })
}

fn handle_list_tables(options: &ConvertOptions) -> Result<()> {
    let tables = discovery::discover_tables(&options.input_directory)?;
    let listing: BTreeMap<&str, String> = tables
        .iter()
        .map(|(name, path)| (name.as_str(), path.display().to_string()))
        .collect();
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, &listing).context("Writing table listing")?;
    writeln!(stdout)?;
    Ok(())
}

fn handle_print_schemas(options: &ConvertOptions) -> Result<()> {
    let profile = ModeProfile::for_mode(options.mode);
    let tables = discovery::discover_tables(&options.input_directory)?;
    let planned = plan_schemas(
        &options.input_directory,
        &tables,
        &profile,
        options.sample_rows,
        &options.read,
    )?;
    let schemas: Vec<_> = planned.schemas.values().collect();
    let rendered = serde_yaml::to_string(&schemas).context("Rendering schemas as YAML")?;
    io::stdout()
        .lock()
        .write_all(rendered.as_bytes())
        .context("Writing schemas")?;
    info!("Printed {} rule-adjusted schema(s)", schemas.len());
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
