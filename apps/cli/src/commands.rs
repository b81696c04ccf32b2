//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use lazylist_core::{ProgressReporter, SearchConfig, SearchReport};
use lazylist_extractor::OpenAiEngine;
use lazylist_materializer::{ChromiumLauncher, Materializer};
use lazylist_shared::{
    AppConfig, EngineConfig, ExtractionResult, ScrollConfig, init_config, load_config,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// lazylist: fully load lazy search listings and extract their items.
#[derive(Parser)]
#[command(
    name = "lazylist",
    version,
    about = "Scroll a lazily-rendered listing until it stops growing, then extract its items.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Browser options shared by `search` and `fetch`.
#[derive(clap::Args, Debug, Clone, Default)]
pub(crate) struct BrowserArgs {
    /// Maximum scroll checks, clamped to 1..=200.
    #[arg(long)]
    pub scrolls: Option<u32>,

    /// Show the browser window.
    #[arg(long)]
    pub visible: bool,

    /// Pause after each scroll, in ms.
    #[arg(long)]
    pub scroll_pause_ms: Option<u64>,

    /// Extra wait for network-triggered renders after each scroll, in ms.
    #[arg(long)]
    pub network_idle_ms: Option<u64>,

    /// CSS selector matching one listing card.
    #[arg(long)]
    pub selector: Option<String>,

    /// Chrome/Chromium binary to launch instead of the auto-detected one.
    #[arg(long, env = "LAZYLIST_BROWSER")]
    pub browser: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Search the listing site and print extracted items as JSON.
    Search {
        /// Search terms.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Keep at most this many items (1..=200). Defaults to the config value.
        #[arg(short, long)]
        take: Option<u32>,

        /// Engine model id (overrides config).
        #[arg(short, long)]
        model: Option<String>,

        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,

        #[command(flatten)]
        browser: BrowserArgs,
    },

    /// Fully load a page and print its rendered HTML.
    Fetch {
        /// Page URL.
        url: String,

        /// Write HTML to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        browser: BrowserArgs,
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

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "lazylist=info",
        1 => "lazylist=debug",
        _ => "lazylist=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
    match cli.command {
        Command::Search {
            query,
            take,
            model,
            pretty,
            browser,
        } => cmd_search(&query.join(" "), take, model.as_deref(), pretty, &browser).await,
        Command::Fetch { url, out, browser } => cmd_fetch(&url, out, &browser).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Merge config-file values with CLI flags (flags win).
fn scroll_config(config: &AppConfig, args: &BrowserArgs) -> ScrollConfig {
    let mut scroll = ScrollConfig::from(config);
    if let Some(n) = args.scrolls {
        scroll.max_scrolls = n;
    }
    if args.visible {
        scroll.visible = true;
    }
    if let Some(ms) = args.scroll_pause_ms {
        scroll.scroll_pause_ms = ms;
    }
    if let Some(ms) = args.network_idle_ms {
        scroll.network_idle_ms = ms;
    }
    if let Some(selector) = &args.selector {
        scroll.item_selector = selector.clone();
    }
    scroll.clamped()
}

fn materializer(config: &AppConfig, args: &BrowserArgs) -> Materializer {
    let mut launcher = ChromiumLauncher::new();
    if let Some(path) = &args.browser {
        launcher = launcher.with_executable(path);
    }
    Materializer::new(scroll_config(config, args), Arc::new(launcher))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(
    query: &str,
    take: Option<u32>,
    model: Option<&str>,
    pretty: bool,
    browser: &BrowserArgs,
) -> Result<()> {
    let config = load_config()?;

    // Fail on missing credentials before a browser is launched
    let mut engine_config = EngineConfig::from_app_config(&config)?;
    if let Some(model) = model {
        engine_config = engine_config.with_model(model)?;
    }
    let engine = OpenAiEngine::new(engine_config)?;

    let search = SearchConfig {
        query: query.to_string(),
        listing_base: config.listing.base_url.clone(),
        take: Some(take.unwrap_or(config.defaults.take)),
    };
    let materializer = materializer(&config, browser);

    info!(query, model = engine.model(), "searching listing");

    let reporter = CliProgress::new();
    let report = lazylist_core::run_search(&search, &materializer, &engine, &reporter).await;
    reporter.clear();
    let report = report?;

    let output = ExtractionResult {
        items: report.items,
    };
    let json = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{json}");

    Ok(())
}

async fn cmd_fetch(url: &str, out: Option<PathBuf>, browser: &BrowserArgs) -> Result<()> {
    let config = load_config()?;
    let parsed = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let materializer = materializer(&config, browser);

    let reporter = CliProgress::new();
    reporter.phase("Loading page");
    let page = materializer.materialize(&parsed).await;
    reporter.clear();
    let page = page?;

    match out {
        Some(path) => {
            std::fs::write(&path, &page.html)
                .map_err(|e| eyre!("failed to write '{}': {e}", path.display()))?;
            info!(
                path = %path.display(),
                bytes = page.html.len(),
                final_count = page.final_count,
                "page written"
            );
        }
        None => println!("{}", page.html),
    }

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, report: &SearchReport) {
        self.spinner.finish_and_clear();
        if !report.outcome.is_converged() {
            eprintln!(
                "warning: listing was still growing after {} checks; results may be partial",
                report.outcome.checks()
            );
        }
    }
}
