//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pagegraph_core::{build_pipeline, capture};
use pagegraph_keywords::KeywordExtractionEngine;
use pagegraph_shared::{
    AppConfig, EventStatus, Page, PageStatus, ProcessingEvent, Stage, init_config, load_config,
    load_config_from,
};
use pagegraph_storage::GraphStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// pagegraph: turn web pages into keyword-indexed knowledge records.
#[derive(Parser)]
#[command(
    name = "pagegraph",
    version,
    about = "Run web pages through metadata, content and keyword extraction into a local store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of `~/.pagegraph/pagegraph.toml`.
    #[arg(long, global = true, env = "PAGEGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Capture a page (or read saved markup) and run it through the pipeline.
    Process {
        /// Page URL.
        url: String,

        /// Read markup from this file instead of fetching the URL.
        #[arg(long)]
        html: Option<PathBuf>,

        /// Database path (defaults to the configured store).
        #[arg(long)]
        db: Option<PathBuf>,

        /// Print the processed page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract keywords from plain text without running the pipeline.
    Keywords {
        /// Read text from this file.
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,

        /// Text to analyse.
        text: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. `RUST_LOG` wins when set.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "pagegraph=info",
        1 => "pagegraph=debug",
        _ => "pagegraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Process { url, html, db, json } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_process(&config, &url, html.as_deref(), db.as_deref(), json).await
        }
        Command::Keywords { file, text } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_keywords(&config, file.as_deref(), text.as_deref())
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// process
// ---------------------------------------------------------------------------

async fn cmd_process(
    config: &AppConfig,
    url: &str,
    html: Option<&Path>,
    db: Option<&Path>,
    json: bool,
) -> Result<()> {
    let raw = match html {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?,
        None => capture::fetch_page(url, &config.capture).await?,
    };

    let db_path = match db {
        Some(p) => p.to_path_buf(),
        None => config.storage.resolve_db_path()?,
    };
    let store = GraphStore::open(&db_path).await?;
    info!(db = %db_path.display(), "store opened");

    let pipeline = build_pipeline(config, store);
    let progress = StageProgress::new();
    let spinner = progress.clone();
    pipeline
        .events()
        .subscribe(move |event: &ProcessingEvent| -> pagegraph_shared::Result<()> {
            spinner.observe(event);
            Ok(())
        });

    let page = pipeline.process_page(url, raw).await?;
    progress.finish();

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_summary(&page);
    }

    if page.status() == PageStatus::Error {
        return Err(eyre!("processing failed for {url}"));
    }
    Ok(())
}

fn print_summary(page: &Page) {
    println!();
    println!("  URL:       {}", page.url());
    println!("  Status:    {}", page.status().as_str());
    if let Some(title) = page.meta_str("metadata.title") {
        println!("  Title:     {title}");
    }
    println!("  Quality:   {:.2}", page.metrics.quality);
    println!("  Relevance: {:.2}", page.metrics.relevance);

    if !page.keywords.is_empty() {
        let mut ranked: Vec<(&String, &f64)> = page.keywords.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));
        println!("  Keywords:");
        for (keyword, score) in ranked {
            println!("    {score:.3}  {keyword}");
        }
    }

    if !page.errors.is_empty() {
        println!("  Errors:");
        for error in &page.errors {
            let component = error
                .component
                .as_ref()
                .map(|c| format!(" [{c}]"))
                .unwrap_or_default();
            println!(
                "    {}{component} {}: {}",
                error.stage, error.kind, error.message
            );
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// Stage progress
// ---------------------------------------------------------------------------

/// Spinner fed by pipeline events.
#[derive(Clone)]
struct StageProgress {
    spinner: ProgressBar,
}

impl StageProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn observe(&self, event: &ProcessingEvent) {
        match (event.stage, event.status) {
            (Stage::Complete | Stage::Error, _) => self.spinner.finish_and_clear(),
            (stage, EventStatus::Error) => self
                .spinner
                .set_message(format!("{stage}: {}", event.message)),
            (stage, EventStatus::Ok) => self.spinner.set_message(format!("{stage}...")),
        }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// keywords
// ---------------------------------------------------------------------------

fn cmd_keywords(config: &AppConfig, file: Option<&Path>, text: Option<&str>) -> Result<()> {
    let text = match (file, text) {
        (Some(path), _) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?,
        (None, Some(text)) => text.to_string(),
        (None, None) => return Err(eyre!("pass TEXT or --file FILE")),
    };

    let engine = KeywordExtractionEngine::new(config.keywords.clone(), &config.validator);
    let keywords = engine.extract(&text)?;

    if keywords.is_empty() {
        println!("No keywords found.");
        return Ok(());
    }

    println!("{:<8} {:<8} {:<5} KEYWORD", "SCORE", "TYPE", "FREQ");
    for keyword in &keywords {
        println!(
            "{:<8.3} {:<8} {:<5} {}",
            keyword.score, keyword.keyword_type, keyword.frequency, keyword.text
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
