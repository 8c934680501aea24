//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use articlefix_core::ledger::{self, Ledger, LedgerPaths, content_hash};
use articlefix_core::{
    GeminiClient, ModelClient, Orchestrator, RepairProgress, RetryPolicy, RunMode, RunOptions,
    RunSummary, regenerate_html, strategy_for, tidy_articles,
};
use articlefix_shared::{
    AppConfig, ArticleFilter, IssueCategory, ModelSettings, Outcome, RepairConfig, expand_home,
    init_config, load_config, load_config_from, resolve_api_key,
};
use articlefix_storage::{ArticleStore, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ArticleFix: repair broken components and prose in localized articles.
#[derive(Parser)]
#[command(
    name = "articlefix",
    version,
    about = "Detect and repair defects in localized teaching articles.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.articlefix/articlefix.toml.
    #[arg(long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Record selection shared by several commands.
#[derive(Args, Clone, Debug, Default)]
pub(crate) struct Selection {
    /// Language pair as native-target, e.g. es-en.
    #[arg(long)]
    pub pair: Option<String>,

    /// Restrict to these record ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub ids: Vec<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Repair one issue category (or all) with the generative model.
    Fix {
        /// Issue category, or "all".
        #[arg(short, long)]
        category: String,

        #[command(flatten)]
        selection: Selection,

        /// Process at most this many records.
        #[arg(long)]
        limit: Option<usize>,

        /// Worker pool size (overrides config).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Records per prompt (overrides config).
        #[arg(long)]
        batch_size: Option<usize>,

        /// Preview fixes without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Forget earlier progress for the category before running.
        #[arg(long, conflicts_with = "dry_run")]
        reset: bool,
    },

    /// Report detected issues without calling the model.
    Detect {
        /// Issue category, or "all".
        #[arg(short, long, default_value = "all")]
        category: String,

        #[command(flatten)]
        selection: Selection,

        /// Scan at most this many records.
        #[arg(long)]
        limit: Option<usize>,

        /// Print issues as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Re-derive stored HTML from article content.
    Regen {
        #[command(flatten)]
        selection: Selection,

        /// Report stale records without updating them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Rename legacy component attributes and drop duplicate vocabulary cards.
    Tidy {
        #[command(flatten)]
        selection: Selection,

        /// Report what would change without updating anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the content an article had before each update.
    History {
        /// Article id.
        id: String,
    },

    /// Import articles from a JSON export.
    Import {
        /// JSON file holding an array of articles.
        file: PathBuf,
    },

    /// Export articles to a JSON file.
    Export {
        /// Destination file.
        file: PathBuf,

        #[command(flatten)]
        selection: Selection,
    },

    /// Inspect or reset a category's progress ledger.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Ledger subcommands.
#[derive(Subcommand)]
pub(crate) enum LedgerAction {
    /// Show applied, failed and skipped counts.
    Show {
        #[arg(short, long)]
        category: String,
    },
    /// Delete the ledger and rotate the results log.
    Reset {
        #[arg(short, long)]
        category: String,
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
        0 => "articlefix=info",
        1 => "articlefix=debug",
        _ => "articlefix=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(cli.config_path.as_deref()),
        };
    }

    let config = match &cli.config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Fix {
            category,
            selection,
            limit,
            concurrency,
            batch_size,
            dry_run,
            reset,
        } => {
            let options = FixOptions {
                limit,
                concurrency,
                batch_size,
                dry_run,
                reset,
            };
            cmd_fix(&config, &category, &selection, options).await
        }
        Command::Detect {
            category,
            selection,
            limit,
            json,
        } => cmd_detect(&config, &category, &selection, limit, json).await,
        Command::Regen { selection, dry_run } => cmd_regen(&config, &selection, dry_run).await,
        Command::Tidy { selection, dry_run } => cmd_tidy(&config, &selection, dry_run).await,
        Command::History { id } => cmd_history(&config, &id).await,
        Command::Import { file } => cmd_import(&config, &file).await,
        Command::Export { file, selection } => cmd_export(&config, &file, &selection).await,
        Command::Ledger { action } => match action {
            LedgerAction::Show { category } => cmd_ledger_show(&config, &category),
            LedgerAction::Reset { category } => cmd_ledger_reset(&config, &category),
        },
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve `all` or a single category name.
fn parse_categories(name: &str) -> Result<Vec<IssueCategory>> {
    if name == "all" {
        return Ok(IssueCategory::ALL.to_vec());
    }
    name.parse::<IssueCategory>().map(|c| vec![c]).map_err(|_| {
        let names: Vec<&str> = IssueCategory::ALL.iter().map(|c| c.as_str()).collect();
        eyre!("unknown category '{name}': expected one of {} or all", names.join(", "))
    })
}

fn parse_category(name: &str) -> Result<IssueCategory> {
    Ok(name.parse::<IssueCategory>()?)
}

fn build_filter(selection: &Selection, limit: Option<usize>) -> Result<ArticleFilter> {
    let mut filter = match &selection.pair {
        Some(pair) => ArticleFilter::for_pair(pair)?,
        None => ArticleFilter::default(),
    };
    filter.ids = selection.ids.clone();
    filter.limit = limit;
    Ok(filter)
}

fn database_path(config: &AppConfig) -> PathBuf {
    expand_home(&config.defaults.database_path)
}

async fn open_storage(config: &AppConfig, readonly: bool) -> Result<Storage> {
    let path = database_path(config);
    let storage = if readonly {
        Storage::open_readonly(&path).await?
    } else {
        Storage::open(&path).await?
    };
    Ok(storage)
}

// ---------------------------------------------------------------------------
// fix
// ---------------------------------------------------------------------------

struct FixOptions {
    limit: Option<usize>,
    concurrency: Option<usize>,
    batch_size: Option<usize>,
    dry_run: bool,
    reset: bool,
}

async fn cmd_fix(
    config: &AppConfig,
    category: &str,
    selection: &Selection,
    options: FixOptions,
) -> Result<()> {
    let categories = parse_categories(category)?;
    let filter = build_filter(selection, None)?;
    let mode = if options.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Apply
    };

    let api_key = resolve_api_key(config)?;
    let settings = ModelSettings::new(&config.model, api_key);
    let client: Arc<dyn ModelClient> = Arc::new(GeminiClient::new(&settings)?);
    let retry = RetryPolicy::from_settings(&settings);
    let store: Arc<dyn ArticleStore> = Arc::new(open_storage(config, options.dry_run).await?);

    info!(
        categories = categories.len(),
        model = %settings.model,
        dry_run = options.dry_run,
        "starting fix"
    );

    for category in categories {
        let repair = RepairConfig::for_category(config, category.as_str());
        if options.reset {
            let paths = LedgerPaths::for_category(&repair.data_dir, category);
            if let Some(rotated) = ledger::reset(&paths)? {
                info!(path = %rotated.display(), "rotated results log");
            }
        }

        let orchestrator =
            Orchestrator::new(repair, Arc::clone(&store), Arc::clone(&client)).with_retry(retry);
        let run_options = RunOptions {
            filter: filter.clone(),
            limit: options.limit,
            mode,
            concurrency: options.concurrency,
            batch_size: options.batch_size,
        };
        let reporter = CliProgress::new();
        let summary = orchestrator
            .run(strategy_for(category), run_options, &reporter)
            .await?;
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.dry_run {
        println!("  {} (dry run, nothing written)", summary.category);
    } else {
        println!("  {}", summary.category);
    }
    println!("  Applied:      {}", summary.applied);
    println!("  Failed:       {}", summary.failed);
    println!("  Skipped:      {}", summary.skipped);
    println!("  Already done: {}", summary.already_done);
    println!("  Fields fixed: {}", summary.fields_fixed);
    println!("  Time:         {:.1}s", summary.elapsed.as_secs_f64());

    if !summary.failures.is_empty() {
        println!();
        println!("  Failures:");
        for (id, reason) in &summary.failures {
            println!("    {id}: {reason}");
        }
    }
    if !summary.previews.is_empty() {
        println!();
        println!("  Would change:");
        for preview in &summary.previews {
            println!("    {}: {}", preview.id, preview.fields.join(", "));
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        bar.set_message("Loading records");
        Self { bar }
    }
}

impl RepairProgress for CliProgress {
    fn started(&self, category: IssueCategory, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix} [{bar:30}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("=> "),
        );
        self.bar.set_prefix(category.to_string());
        self.bar.set_message("");
    }

    fn record_done(&self, id: &str, outcome: &Outcome) {
        self.bar.inc(1);
        self.bar.set_message(format!("{id}: {}", outcome.label()));
    }

    fn finished(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// detect
// ---------------------------------------------------------------------------

async fn cmd_detect(
    config: &AppConfig,
    category: &str,
    selection: &Selection,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let categories = parse_categories(category)?;
    let storage = open_storage(config, true).await?;
    let articles = storage.read(&build_filter(selection, limit)?).await?;

    let mut totals: BTreeMap<IssueCategory, usize> = BTreeMap::new();
    let mut report = Vec::new();
    for article in &articles {
        let issues: Vec<_> = categories
            .iter()
            .flat_map(|c| articlefix_detect::detect(*c, article))
            .collect();
        if issues.is_empty() {
            continue;
        }
        for issue in &issues {
            *totals.entry(issue.category).or_default() += 1;
        }
        report.push((article, issues));
    }

    if json {
        let value: Vec<serde_json::Value> = report
            .iter()
            .map(|(article, issues)| {
                serde_json::json!({
                    "id": article.id,
                    "pair": article.pair(),
                    "issues": issues,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (article, issues) in &report {
        println!("{} [{}] {}", article.id, article.pair(), article.title);
        for issue in issues {
            let field = issue
                .field
                .as_deref()
                .map(|f| format!(" {f}:"))
                .unwrap_or_default();
            println!(
                "  {:<26} {:<6}{field} {}",
                issue.category.as_str(),
                issue.severity.to_string(),
                issue.detail
            );
        }
    }

    println!();
    println!("  Scanned: {}", articles.len());
    println!("  Affected: {}", report.len());
    for (category, count) in &totals {
        println!("  {category}: {count}");
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// regen / import / export
// ---------------------------------------------------------------------------

async fn cmd_regen(config: &AppConfig, selection: &Selection, dry_run: bool) -> Result<()> {
    let storage = open_storage(config, dry_run).await?;
    let mode = if dry_run { RunMode::DryRun } else { RunMode::Apply };
    let summary = regenerate_html(&storage, &build_filter(selection, None)?, mode).await?;

    println!();
    println!("  Scanned: {}", summary.scanned);
    println!("  Stale:   {}", summary.changed);
    println!("  Updated: {}", summary.updated);
    for (id, reason) in &summary.failures {
        println!("  {id}: {reason}");
    }
    println!();
    Ok(())
}

async fn cmd_tidy(config: &AppConfig, selection: &Selection, dry_run: bool) -> Result<()> {
    let storage = open_storage(config, dry_run).await?;
    let mode = if dry_run { RunMode::DryRun } else { RunMode::Apply };
    let summary = tidy_articles(&storage, &build_filter(selection, None)?, mode).await?;

    println!();
    println!("  Scanned:            {}", summary.scanned);
    println!("  Changed:            {}", summary.changed);
    println!("  Updated:            {}", summary.updated);
    println!("  Attributes renamed: {}", summary.renamed);
    println!("  Duplicates removed: {}", summary.removed);
    for (id, reason) in &summary.failures {
        println!("  {id}: {reason}");
    }
    println!();
    Ok(())
}

async fn cmd_history(config: &AppConfig, id: &str) -> Result<()> {
    let storage = open_storage(config, true).await?;
    let revisions = storage.revisions(id).await?;
    if revisions.is_empty() {
        println!("No earlier revisions of {id}");
        return Ok(());
    }

    println!();
    for (i, revision) in revisions.iter().enumerate() {
        println!(
            "  #{} replaced {} ({} bytes, sha256 {})",
            i + 1,
            revision.replaced_at.to_rfc3339(),
            revision.content.len(),
            content_hash(&revision.content),
        );
    }
    println!();
    Ok(())
}

async fn cmd_import(config: &AppConfig, file: &Path) -> Result<()> {
    let storage = open_storage(config, false).await?;
    let count = storage.import_json(file).await?;
    println!("Imported {count} articles from {}", file.display());
    Ok(())
}

async fn cmd_export(config: &AppConfig, file: &Path, selection: &Selection) -> Result<()> {
    let storage = open_storage(config, true).await?;
    let count = storage
        .export_json(file, &build_filter(selection, None)?)
        .await?;
    println!("Exported {count} articles to {}", file.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// ledger / config
// ---------------------------------------------------------------------------

fn cmd_ledger_show(config: &AppConfig, category: &str) -> Result<()> {
    let category = parse_category(category)?;
    let repair = RepairConfig::for_category(config, category.as_str());
    let paths = LedgerPaths::for_category(&repair.data_dir, category);
    let ledger = Ledger::load(&paths.ledger)?;

    println!();
    println!("  Ledger:       {}", paths.ledger.display());
    println!("  Applied:      {}", ledger.applied.len());
    println!("  Failed:       {}", ledger.failed.len());
    println!("  Skipped:      {}", ledger.skipped.len());
    println!("  Fields fixed: {}", ledger.stats.fields_fixed);
    println!("  Runs:         {}", ledger.stats.runs);
    if let Some(last) = ledger.stats.last_run {
        println!("  Last run:     {}", last.to_rfc3339());
    }
    for (field, count) in &ledger.stats.by_field {
        println!("    {field}: {count}");
    }
    if !ledger.stats.by_issue.is_empty() {
        println!("  Issues resolved:");
        for (category, count) in &ledger.stats.by_issue {
            println!("    {category}: {count}");
        }
    }
    if !ledger.failed.is_empty() {
        println!();
        println!("  Failures:");
        for (id, reason) in &ledger.failed {
            println!("    {id}: {reason}");
        }
    }
    println!();
    Ok(())
}

fn cmd_ledger_reset(config: &AppConfig, category: &str) -> Result<()> {
    let category = parse_category(category)?;
    let repair = RepairConfig::for_category(config, category.as_str());
    let paths = LedgerPaths::for_category(&repair.data_dir, category);
    match ledger::reset(&paths)? {
        Some(rotated) => println!(
            "Ledger reset for {category}; results log moved to {}",
            rotated.display()
        ),
        None => println!("Ledger reset for {category}"),
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
