use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::analysis::AnalysisKind;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Analyze ESG uploads and roll them up per site",
    long_about = None
)]
pub struct Cli {
    /// YAML settings file (store location, completer, keyword overrides)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding site state and file records (overrides the settings file)
    #[arg(long = "store-dir", global = true)]
    pub store_dir: Option<PathBuf>,
    /// Seconds to wait for the field completer (overrides the settings file)
    #[arg(long = "completer-timeout", global = true)]
    pub completer_timeout: Option<u64>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze an uploaded file and merge it into its site's cumulative state
    Analyze(AnalyzeArgs),
    /// Show the cumulative state of a site
    Site(SiteArgs),
    /// Re-analyze every stored file of one kind as a single combined table
    Metrics(MetricsArgs),
    /// Merge two analysis documents without touching the store
    Merge(MergeArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Upload to analyze (.csv, .tsv, .txt, .json, or '-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Which analysis to run
    #[arg(short, long, value_enum, default_value = "environmental")]
    pub kind: AnalysisKind,
    /// Site the upload belongs to; its results are merged into the site state
    #[arg(short, long)]
    pub site: Option<String>,
    /// Identifier for the file record (a UUID is generated when omitted)
    #[arg(long = "file-id")]
    pub file_id: Option<String>,
    /// Delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the upload (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Print the analysis as JSON or as a field/value table
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct SiteArgs {
    /// Site name (or slug) to show
    pub site: String,
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Which kind of stored files to roll up
    #[arg(short, long, value_enum)]
    pub kind: AnalysisKind,
    /// Restrict the rollup to one site
    #[arg(short, long)]
    pub site: Option<String>,
    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Cumulative document (JSON object)
    #[arg(long)]
    pub existing: PathBuf,
    /// Document to fold into the cumulative one (JSON object)
    #[arg(long)]
    pub incoming: PathBuf,
    /// Output file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
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
