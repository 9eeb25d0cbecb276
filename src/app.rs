//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - initializes logging
//! - parses CLI arguments
//! - runs the multi-year pipeline (or one of the inspection tools)
//! - prints reports and writes exports

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{AnalyzeArgs, Cli, Command, DedupMode, DictionaryArgs, InspectArgs};
use crate::domain::{KeyTracking, RunConfig};
use crate::error::Result;
use crate::io::loader::{self, DatasetSource};
use crate::{dictionary, schema};

pub mod pipeline;

/// Entry point for the `censo` binary.
pub fn run() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => handle_analyze(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Dictionary(args) => handle_dictionary(args),
    }
}

fn handle_analyze(args: AnalyzeArgs) -> Result<()> {
    let config = run_config_from_args(&args);
    let output = pipeline::run(&config)?;
    println!("{}", crate::report::format::format_run_summary(&output, &config));
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let source = source_for(&args.file, &args.entry_filter)?;
    let (format, headers) = loader::read_headers(&source)?;

    println!("Source   : {}", source.describe());
    println!("Encoding : {}", format.encoding.name());
    println!("Delimiter: '{}'", format.delimiter_char());
    println!("Headers  : {}", headers.len());

    match &args.filter {
        Some(filter) => {
            let needle = filter.to_uppercase();
            for header in headers.iter().filter(|h| h.to_uppercase().contains(&needle)) {
                println!("  {header}");
            }
        }
        None => {
            for header in headers.iter().take(args.limit) {
                println!("  {header}");
            }
            if headers.len() > args.limit {
                println!("  ... ({} more)", headers.len() - args.limit);
            }
        }
    }
    Ok(())
}

fn handle_dictionary(args: DictionaryArgs) -> Result<()> {
    let fields = dictionary::load_from_path(&args.file, args.dict_offset)?;

    match &args.field {
        Some(query) => match schema::find_field_description(&fields, query) {
            Some(description) => println!("{query}: {description}"),
            None => println!("No description found for {query}"),
        },
        None => {
            for (idx, field) in fields.iter().enumerate() {
                println!(
                    "{:<4} {:<28} {:<8} {}",
                    idx + 1,
                    field.name.trim(),
                    field.declared_type,
                    field.description
                );
            }
            println!("{} fields", fields.len());
        }
    }
    Ok(())
}

/// Build the pipeline configuration from CLI flags plus environment defaults.
pub fn run_config_from_args(args: &AnalyzeArgs) -> RunConfig {
    dotenvy::dotenv().ok();
    let data_dir = args
        .data_dir
        .clone()
        .or_else(|| std::env::var("CENSO_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));

    RunConfig {
        data_dir,
        output_dir: Some(args.out.clone()),
        years: args.years.clone(),
        metric_field: args.metric.clone(),
        year_field: args.year_field.clone(),
        cluster_field: args.cluster.clone(),
        dedup_keys: args.keys.clone(),
        key_tracking: match args.dedup_mode {
            DedupMode::Exact => KeyTracking::Exact,
            DedupMode::Sampled => KeyTracking::Sampled {
                cap: args.dedup_cap,
            },
        },
        skip_dedup: args.no_dedup,
        project_limit: args.project_limit,
        parallel: !args.sequential,
        file_prefix: args.file_prefix.clone(),
        entry_filter: args.entry_filter.clone(),
        dictionary_filter: args.dictionary_filter.clone(),
        dictionary_offset: args.dict_offset,
    }
}

fn source_for(file: &Path, entry_filter: &str) -> Result<DatasetSource> {
    if file.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zip")) {
        let entry = loader::find_csv_entry(file, entry_filter)?;
        Ok(DatasetSource::ZipEntry {
            archive: file.to_path_buf(),
            entry,
        })
    } else {
        Ok(DatasetSource::Csv(file.to_path_buf()))
    }
}
