pub mod aggregate;
pub mod analysis;
pub mod cli;
pub mod completer;
pub mod config;
pub mod document;
pub mod environmental;
pub mod error;
pub mod financial;
pub mod io_utils;
pub mod matcher;
pub mod merge;
pub mod pipeline;
pub mod rows;
pub mod stats;
pub mod store;
pub mod table;
pub mod template;

use std::{
    env, fs,
    path::Path,
    sync::{Arc, OnceLock},
    time::Duration,
};

use anyhow::{Context, Result, anyhow, ensure};
use clap::Parser;
use heck::ToKebabCase;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{AnalyzeArgs, Cli, Commands, MergeArgs, MetricsArgs, OutputFormat, SiteArgs},
    config::Settings,
    document::Document,
    pipeline::{Pipeline, Site, Upload},
    store::{DirStore, Store},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("esg_rollup", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    match cli.command {
        Commands::Analyze(args) => handle_analyze(settings, &args),
        Commands::Site(args) => handle_site(&settings, &args),
        Commands::Metrics(args) => handle_metrics(settings, &args),
        Commands::Merge(args) => handle_merge(&args),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = &cli.store_dir {
        settings.store_dir = dir.clone();
    }
    if let Some(secs) = cli.completer_timeout {
        ensure!(secs > 0, "--completer-timeout must be greater than zero");
        settings.completer_timeout = Duration::from_secs(secs);
    }
    debug!(
        "Store at {:?}, completer {:?} with timeout {:?}",
        settings.store_dir, settings.completer_command, settings.completer_timeout
    );
    Ok(settings)
}

fn open_pipeline(settings: Settings) -> Result<Pipeline> {
    let store = DirStore::open(&settings.store_dir)
        .with_context(|| format!("Opening store at {:?}", settings.store_dir))?;
    Ok(Pipeline::new(settings, Arc::new(store)))
}

fn handle_analyze(settings: Settings, args: &AnalyzeArgs) -> Result<()> {
    info!(
        "Analyzing '{}' as {} with delimiter '{}'",
        args.input.display(),
        args.kind,
        args.delimiter
            .map(printable_delimiter)
            .unwrap_or_else(|| "auto".to_string())
    );
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let (table, digest) = io_utils::load_table(&args.input, args.delimiter, encoding)?;
    let site = args.site.as_deref().map(Site::named).transpose()?;
    let pipeline = open_pipeline(settings)?;
    let outcome = pipeline.process(Upload {
        file_id: args.file_id.clone(),
        kind: args.kind,
        table,
        digest,
        site,
    })?;
    for warning in &outcome.warnings {
        warn!("{warning}");
    }
    info!("Stored file record {}", outcome.file_id);
    emit(&outcome.analysis, args.format)
}

fn handle_site(settings: &Settings, args: &SiteArgs) -> Result<()> {
    let store = DirStore::open(&settings.store_dir)
        .with_context(|| format!("Opening store at {:?}", settings.store_dir))?;
    let site_id = args.site.to_kebab_case();
    let state = store
        .get_site_state(&site_id)
        .with_context(|| format!("Reading state for site '{site_id}'"))?
        .ok_or_else(|| anyhow!("No data has been recorded for site '{site_id}'"))?;
    emit(&state, args.format)
}

fn handle_metrics(settings: Settings, args: &MetricsArgs) -> Result<()> {
    let site_id = args.site.as_deref().map(str::to_kebab_case);
    let pipeline = open_pipeline(settings)?;
    let rollup = pipeline.rollup(args.kind, site_id.as_deref())?;
    for warning in &rollup.warnings {
        warn!("{warning}");
    }
    info!("Rolled up {} {} file(s)", rollup.file_count, rollup.kind);
    emit(&rollup.analysis, args.format)
}

fn handle_merge(args: &MergeArgs) -> Result<()> {
    let existing = read_document(&args.existing)?;
    let incoming = read_document(&args.incoming)?;
    let (merged, report) = merge::merge_with_report(&existing, &incoming);
    if !report.is_clean() {
        warn!(
            "{} type conflict(s); existing values were kept",
            report.conflicts.len()
        );
    }
    let rendered = serde_json::to_string_pretty(&merged).context("Encoding merged document")?;
    match &args.output {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Writing merged document to {path:?}"))?;
            info!("Merged document written to {path:?}");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn read_document(path: &Path) -> Result<Document> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening {path:?}"))?;
    serde_json::from_str(&raw).with_context(|| format!("Parsing {path:?} as a JSON object"))
}

fn emit(document: &Document, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let rendered =
                serde_json::to_string_pretty(document).context("Encoding analysis as JSON")?;
            println!("{rendered}");
        }
        OutputFormat::Table => table::print_document(document),
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
