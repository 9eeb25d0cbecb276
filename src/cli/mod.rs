//! Command-line parsing for the census microdata analyzer.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the pipeline code.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::dictionary::DEFAULT_HEADER_OFFSET;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "censo",
    version,
    about = "School census microdata: schema reconciliation + streaming aggregation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the multi-year pipeline and write JSON exports.
    Analyze(AnalyzeArgs),
    /// Sniff a dataset and print its encoding, delimiter and header row.
    Inspect(InspectArgs),
    /// Load a dictionary workbook; list its fields or look one up.
    Dictionary(DictionaryArgs),
}

/// How the duplicate detector bounds its key map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DedupMode {
    /// Track every distinct key (exact full-history detection, O(n) memory).
    Exact,
    /// Cap the tracked key population; overflow rows pass untested.
    Sampled,
}

/// Options for the full analysis run.
#[derive(Debug, Parser, Clone)]
pub struct AnalyzeArgs {
    /// Census years to process.
    #[arg(short = 'y', long, value_delimiter = ',', default_values_t = [2021u16, 2022, 2023])]
    pub years: Vec<u16>,

    /// Directory holding the downloaded datasets (falls back to
    /// CENSO_DATA_DIR, then "data").
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Directory for the JSON exports.
    #[arg(short = 'o', long, default_value = "out")]
    pub out: PathBuf,

    /// Metric field summed per group.
    #[arg(short = 'm', long, default_value = "QT_MAT_ESP")]
    pub metric: String,

    /// Primary dimension field.
    #[arg(long, default_value = "NU_ANO_CENSO")]
    pub year_field: String,

    /// Optional second dimension for pivoted views (e.g. NO_REGIAO).
    #[arg(short = 'c', long)]
    pub cluster: Option<String>,

    /// Natural key fields for duplicate detection, in priority order.
    #[arg(long = "key", value_delimiter = ',', default_value = "CO_ENTIDADE")]
    pub keys: Vec<String>,

    /// Skip duplicate detection entirely.
    #[arg(long)]
    pub no_dedup: bool,

    /// Memory mode for duplicate detection.
    #[arg(long, value_enum, default_value_t = DedupMode::Exact)]
    pub dedup_mode: DedupMode,

    /// Distinct-key cap for `--dedup-mode sampled`.
    #[arg(long, default_value_t = 1_000_000)]
    pub dedup_cap: usize,

    /// How many dictionary fields (beyond the required ones) to project.
    #[arg(long, default_value_t = 10)]
    pub project_limit: usize,

    /// Process years one at a time instead of on the rayon pool.
    #[arg(long)]
    pub sequential: bool,

    /// Dataset file stem, completed with `_{year}.zip` / `_{year}.csv`.
    #[arg(long, default_value = "microdados_censo_escolar")]
    pub file_prefix: String,

    /// Name filter selecting the main microdata entry inside an archive.
    #[arg(long, default_value = "microdados_ed_basica")]
    pub entry_filter: String,

    /// Name filter selecting the dictionary workbook inside an archive.
    #[arg(long, default_value = "dicion")]
    pub dictionary_filter: String,

    /// Rows above the dictionary's true header row.
    #[arg(long, default_value_t = DEFAULT_HEADER_OFFSET)]
    pub dict_offset: usize,
}

/// Options for header inspection.
#[derive(Debug, Parser)]
pub struct InspectArgs {
    /// Dataset to inspect (flat CSV or census zip).
    pub file: PathBuf,

    /// Name filter selecting the main microdata entry inside an archive.
    #[arg(long, default_value = "microdados_ed_basica")]
    pub entry_filter: String,

    /// Only print headers containing this text (case-insensitive).
    #[arg(short = 'f', long)]
    pub filter: Option<String>,

    /// Maximum headers to print when no filter is given.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

/// Options for dictionary listing/lookup.
#[derive(Debug, Parser)]
pub struct DictionaryArgs {
    /// Dictionary workbook (.xlsx).
    pub file: PathBuf,

    /// Look up one field's description instead of listing everything.
    #[arg(short = 'f', long)]
    pub field: Option<String>,

    /// Rows above the dictionary's true header row.
    #[arg(long, default_value_t = DEFAULT_HEADER_OFFSET)]
    pub dict_offset: usize,
}
