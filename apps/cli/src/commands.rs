//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use url::Url;

use toolharvest_capture::{ChromiumRenderer, ContentCapture, FaviconResolver};
use toolharvest_core::{
    BatchContext, BatchReport, ItemOutcome, OpenAiClient, ProgressReporter, recategorize_stored,
    refresh_favicons, run_batch,
};
use toolharvest_shared::{
    AppConfig, BrowserConfig, CandidateRecord, DuplicatePolicy, FaviconConfig, LlmClientConfig,
    PipelineConfig, ToolHarvestError, expand_home, init_config, load_config, resolve_api_key,
    to_toml,
};
use toolharvest_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ToolHarvest: build a searchable catalog of AI tools from a listing page.
#[derive(Parser)]
#[command(
    name = "toolharvest",
    version,
    about = "Crawl an AI-tool listing, summarize and categorize each tool, and store the results.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (defaults to `defaults.database_path` from the config).
    #[arg(long, global = true, env = "TOOLHARVEST_DB")]
    pub db: Option<PathBuf>,

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
    /// Crawl a listing page and enrich every new tool on it.
    Run {
        /// Listing page URL (defaults to `defaults.listing_url`).
        source_url: Option<String>,

        /// Override the duplicate-check policy: fail-open or fail-closed.
        #[arg(long)]
        duplicate_policy: Option<DuplicatePolicy>,

        /// Show the browser window.
        #[arg(long)]
        headed: bool,
    },

    /// Re-categorize stored tools whose categories are missing or invalid.
    Recategorize,

    /// Resolve favicons for stored tools that have none.
    Favicons,

    /// Delete stored tools whose URL starts with a prefix.
    Delete {
        /// Literal URL prefix, e.g. `https://example.com/`.
        #[arg(long)]
        url_prefix: String,
    },

    /// List stored tools, newest first.
    List {
        /// Page number (1-based).
        #[arg(long, default_value = "1")]
        page: u32,

        /// Tools per page.
        #[arg(long, default_value = "20")]
        per_page: u32,
    },

    /// Full-text search over name, summary and keywords.
    Search {
        /// Search query.
        query: String,

        /// Maximum results.
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Print one stored tool as JSON.
    Show {
        /// The tool's data id.
        data_id: String,
    },

    /// Show recent batch runs.
    Runs {
        /// Maximum runs to show.
        #[arg(long, default_value = "10")]
        limit: u32,
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

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "toolharvest=info",
        1 => "toolharvest=debug",
        _ => "toolharvest=trace",
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
    let config = load_config()?;
    let db = cli.db.clone();

    match cli.command {
        Command::Run {
            source_url,
            duplicate_policy,
            headed,
        } => {
            cmd_run(
                &config,
                db.as_deref(),
                source_url.as_deref(),
                duplicate_policy,
                headed,
            )
            .await
        }
        Command::Recategorize => cmd_recategorize(&config, db.as_deref()).await,
        Command::Favicons => cmd_favicons(&config, db.as_deref()).await,
        Command::Delete { url_prefix } => cmd_delete(&config, db.as_deref(), &url_prefix).await,
        Command::List { page, per_page } => cmd_list(&config, db.as_deref(), page, per_page).await,
        Command::Search { query, limit } => cmd_search(&config, db.as_deref(), &query, limit).await,
        Command::Show { data_id } => cmd_show(&config, db.as_deref(), &data_id).await,
        Command::Runs { limit } => cmd_runs(&config, db.as_deref(), limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

/// The `--db` flag, else the configured path.
fn database_path(config: &AppConfig, db: Option<&Path>) -> PathBuf {
    db.map(Path::to_path_buf)
        .unwrap_or_else(|| expand_home(&config.defaults.database_path))
}

async fn open_writable(config: &AppConfig, db: Option<&Path>) -> Result<Storage> {
    let path = database_path(config, db);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ToolHarvestError::io(parent, e))?;
    }
    Ok(Storage::open(&path).await?)
}

async fn open_readonly(config: &AppConfig, db: Option<&Path>) -> Result<Storage> {
    Ok(Storage::open_readonly(&database_path(config, db)).await?)
}

fn content_capture(config: &AppConfig) -> Result<ContentCapture> {
    let favicons = FaviconResolver::new(&FaviconConfig::from(config))?;
    Ok(ContentCapture::new(favicons, config.browser.jpeg_quality))
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

async fn cmd_run(
    config: &AppConfig,
    db: Option<&Path>,
    source_url: Option<&str>,
    duplicate_policy: Option<DuplicatePolicy>,
    headed: bool,
) -> Result<()> {
    let api_key = resolve_api_key(config)?;
    let raw_source = source_url.unwrap_or(config.defaults.listing_url.as_str());
    let source = Url::parse(raw_source).map_err(|e| eyre!("invalid URL '{raw_source}': {e}"))?;

    let storage = open_writable(config, db).await?;
    let llm = OpenAiClient::new(api_key, LlmClientConfig::from(config))?;
    let capture = content_capture(config)?;

    let mut pipeline_config = PipelineConfig::from(config);
    if let Some(policy) = duplicate_policy {
        pipeline_config.duplicate_policy = policy;
    }

    let mut browser_config = BrowserConfig::from(config);
    if headed {
        browser_config.headless = false;
    }

    info!(source = %source, "starting batch");
    let run_id = storage.begin_batch_run(source.as_str()).await?;
    let renderer = match ChromiumRenderer::launch(&browser_config).await {
        Ok(renderer) => renderer,
        Err(e) => {
            record_failed_run(&storage, &run_id, &e).await;
            return Err(e.into());
        }
    };

    let reporter = CliProgress::new();
    let result = {
        let ctx = BatchContext {
            renderer: &renderer,
            capture: &capture,
            llm: &llm,
            store: &storage,
            config: &pipeline_config,
        };
        run_batch(&ctx, &source, &reporter).await
    };
    renderer.shutdown().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            reporter.finish();
            record_failed_run(&storage, &run_id, &e).await;
            return Err(e.into());
        }
    };

    let stats = serde_json::to_string(&report)?;
    if let Err(e) = storage.finish_batch_run(&run_id, &stats).await {
        warn!(error = %e, "failed to record batch run");
    }

    print_batch_report(&report);
    Ok(())
}

async fn record_failed_run(storage: &Storage, run_id: &str, error: &ToolHarvestError) {
    if let Err(e) = storage.fail_batch_run(run_id, &error.to_string()).await {
        warn!(error = %e, "failed to record batch run");
    }
}

fn print_batch_report(report: &BatchReport) {
    println!();
    println!("  Batch complete");
    println!("  Source:     {}", report.source_url);
    println!("  Candidates: {}", report.candidates);
    println!("  Processed:  {}", report.processed());
    println!("  Stored:     {}", report.stored);
    println!("  Duplicates: {}", report.duplicates);
    println!("  Skipped:    {}", report.skipped);
    println!("  Failed:     {}", report.failed);
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// Maintenance
// ---------------------------------------------------------------------------

async fn cmd_recategorize(config: &AppConfig, db: Option<&Path>) -> Result<()> {
    let api_key = resolve_api_key(config)?;
    let storage = open_writable(config, db).await?;
    let llm = OpenAiClient::new(api_key, LlmClientConfig::from(config))?;

    let reporter = CliProgress::new();
    let report =
        recategorize_stored(&storage, &llm, &PipelineConfig::from(config), &reporter).await?;
    reporter.finish();

    println!(
        "Recategorized {} of {} tools ({} failed).",
        report.updated, report.examined, report.failed
    );
    Ok(())
}

async fn cmd_favicons(config: &AppConfig, db: Option<&Path>) -> Result<()> {
    let storage = open_writable(config, db).await?;
    let capture = content_capture(config)?;
    let renderer = ChromiumRenderer::launch(&BrowserConfig::from(config)).await?;

    let reporter = CliProgress::new();
    let result = refresh_favicons(&storage, &renderer, &capture, &reporter).await;
    reporter.finish();
    renderer.shutdown().await;
    let report = result?;

    println!(
        "Resolved favicons for {} of {} tools ({} failed).",
        report.updated, report.examined, report.failed
    );
    Ok(())
}

async fn cmd_delete(config: &AppConfig, db: Option<&Path>, url_prefix: &str) -> Result<()> {
    let storage = open_writable(config, db).await?;
    let deleted = storage.delete_by_url_prefix(url_prefix).await?;
    info!(url_prefix, deleted, "deleted tools by URL prefix");
    println!("Deleted {deleted} tools with URL prefix '{url_prefix}'.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

async fn cmd_list(config: &AppConfig, db: Option<&Path>, page: u32, per_page: u32) -> Result<()> {
    let storage = open_readonly(config, db).await?;
    let total = storage.count_tools().await?;
    let tools = storage.list_tools(page, per_page).await?;

    if tools.is_empty() {
        println!("No tools on page {page} ({total} stored).");
        return Ok(());
    }

    println!("{:<10} {:<40} {:<30} URL", "ID", "CATEGORY", "NAME");
    for tool in &tools {
        let c = &tool.record.candidate;
        println!(
            "{:<10} {:<40} {:<30} {}",
            c.data_id, tool.record.category, c.name, c.url
        );
    }
    println!();
    println!("Page {page}, {} of {total} tools.", tools.len());
    Ok(())
}

async fn cmd_search(config: &AppConfig, db: Option<&Path>, query: &str, limit: u32) -> Result<()> {
    let storage = open_readonly(config, db).await?;
    let results = storage.search(query, limit).await?;

    if results.is_empty() {
        println!("No matches for '{query}'.");
        return Ok(());
    }
    for r in &results {
        println!("{:<10} {:<30} {:<40} {}", r.data_id, r.name, r.category, r.url);
    }
    Ok(())
}

async fn cmd_show(config: &AppConfig, db: Option<&Path>, data_id: &str) -> Result<()> {
    let storage = open_readonly(config, db).await?;
    let tool = storage
        .get_tool(data_id)
        .await?
        .ok_or_else(|| eyre!("no tool with data id '{data_id}'"))?;
    println!("{}", serde_json::to_string_pretty(&tool)?);
    Ok(())
}

async fn cmd_runs(config: &AppConfig, db: Option<&Path>, limit: u32) -> Result<()> {
    let storage = open_readonly(config, db).await?;
    let runs = storage.list_batch_runs(limit).await?;

    if runs.is_empty() {
        println!("No batch runs recorded.");
        return Ok(());
    }
    for run in &runs {
        let finished = run
            .finished_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unfinished".to_string());
        println!(
            "{}  {}  {}  {}",
            run.started_at.to_rfc3339(),
            finished,
            run.source_url,
            run.stats_json.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    println!("{}", to_toml(config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner. Finished items are
/// printed above the spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_started(&self, index: usize, total: usize, candidate: &CandidateRecord) {
        let label = if candidate.name.is_empty() {
            &candidate.url
        } else {
            &candidate.name
        };
        self.spinner
            .set_message(format!("[{}/{total}] {label}", index + 1));
    }

    fn item_finished(
        &self,
        index: usize,
        total: usize,
        candidate: &CandidateRecord,
        outcome: &ItemOutcome,
    ) {
        let detail = match outcome {
            ItemOutcome::Unavailable { reason, .. } | ItemOutcome::EmptyContent { reason } => {
                format!(" ({reason})")
            }
            ItemOutcome::Uncategorized { attempts } => format!(" (after {attempts} attempts)"),
            ItemOutcome::Failed { error } => format!(" ({error})"),
            _ => String::new(),
        };
        self.spinner.println(format!(
            "  [{}/{total}] {:<14} {} {}{detail}",
            index + 1,
            outcome.label(),
            candidate.data_id,
            candidate.url
        ));
    }

    fn done(&self, _report: &BatchReport) {
        self.spinner.finish_and_clear();
    }
}
