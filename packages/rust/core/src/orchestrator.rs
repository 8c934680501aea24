//! Repair orchestrator: one category, a bounded worker pool, a resumable ledger.
//!
//! Workers pull work units (1..batch_size same-pair records) from a shared
//! queue, run detect → prompt → model → parse → apply → validate → persist for
//! each record, and send the outcome to a single collector. Only the collector
//! touches the ledger and results log.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use articlefix_markup::{count_components, normalize};
use articlefix_shared::{
    Article, ArticleFilter, ArticleFixError, ArticleUpdate, IssueCategory, Outcome, RepairConfig,
    Result,
};
use articlefix_storage::ArticleStore;

use crate::apply::{Fix, Target, group_targets};
use crate::ledger::{Ledger, LedgerPaths, ResultLine, ResultsLog, completed_ids, content_hash};
use crate::model::{ModelClient, RetryPolicy, send_with_retry};
use crate::prompt::PromptRecord;
use crate::response::parse_response;
use crate::strategy::RepairStrategy;
use crate::tidy::tidy;
use crate::validate::validate;

/// Whether a run persists its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Apply,
    /// Detect, prompt, apply and validate, but write nothing.
    DryRun,
}

/// Per-invocation options; `None` falls back to [`RepairConfig`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub filter: ArticleFilter,
    /// Cap on records processed, counted after resume exclusion.
    pub limit: Option<usize>,
    pub mode: RunMode,
    pub concurrency: Option<usize>,
    pub batch_size: Option<usize>,
}

/// What a dry run would have written for one record.
#[derive(Debug, Clone)]
pub struct Preview {
    pub id: String,
    pub fields: Vec<String>,
    pub content: String,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub category: IssueCategory,
    pub run_id: String,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Records excluded because an earlier run finished them.
    pub already_done: usize,
    pub fields_fixed: usize,
    /// `(record id, reason)` per failure.
    pub failures: Vec<(String, String)>,
    pub previews: Vec<Preview>,
    pub dry_run: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    fn new(category: IssueCategory, mode: RunMode) -> Self {
        Self {
            category,
            run_id: Uuid::now_v7().to_string(),
            applied: 0,
            failed: 0,
            skipped: 0,
            already_done: 0,
            fields_fixed: 0,
            failures: Vec::new(),
            previews: Vec::new(),
            dry_run: mode == RunMode::DryRun,
            elapsed: Duration::ZERO,
        }
    }

    pub fn processed(&self) -> usize {
        self.applied + self.failed + self.skipped
    }
}

/// Progress callback for reporting run status.
pub trait RepairProgress: Send + Sync {
    /// Called once the work queue is known.
    fn started(&self, category: IssueCategory, total: usize);
    /// Called as each record reaches a final outcome.
    fn record_done(&self, id: &str, outcome: &Outcome);
    /// Called when the run completes.
    fn finished(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl RepairProgress for SilentProgress {
    fn started(&self, _category: IssueCategory, _total: usize) {}
    fn record_done(&self, _id: &str, _outcome: &Outcome) {}
    fn finished(&self, _summary: &RunSummary) {}
}

/// Drives repair runs against an article store and a model client.
pub struct Orchestrator {
    config: RepairConfig,
    store: Arc<dyn ArticleStore>,
    client: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

impl Orchestrator {
    pub fn new(
        config: RepairConfig,
        store: Arc<dyn ArticleStore>,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            config,
            store,
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Repair every selected record for the strategy's category.
    ///
    /// Only a failure to read the initial record set (or the ledger) is fatal;
    /// per-record errors become `failed` outcomes.
    #[instrument(skip_all, fields(category = %strategy.category(), mode = ?options.mode))]
    pub async fn run(
        &self,
        strategy: Arc<dyn RepairStrategy>,
        options: RunOptions,
        progress: &dyn RepairProgress,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let category = strategy.category();
        let mode = options.mode;
        let mut summary = RunSummary::new(category, mode);

        let paths = LedgerPaths::for_category(&self.config.data_dir, category);
        let mut ledger = Ledger::load(&paths.ledger)?;
        let done = completed_ids(&paths, &mut ledger)?;

        let read_filter = ArticleFilter {
            limit: None,
            ..options.filter.clone()
        };
        let articles = self.store.read(&read_filter).await?;
        let total_read = articles.len();
        let mut queue: Vec<Article> = articles
            .into_iter()
            .filter(|a| !done.contains(&a.id))
            .collect();
        summary.already_done = total_read - queue.len();
        if let Some(limit) = options.limit.or(options.filter.limit) {
            queue.truncate(limit);
        }

        let concurrency = options.concurrency.unwrap_or(self.config.concurrency).max(1);
        let batch_size = options.batch_size.unwrap_or(self.config.batch_size).max(1);
        let units = work_units(queue, batch_size);
        let record_count: usize = units.iter().map(Vec::len).sum();

        info!(
            records = record_count,
            units = units.len(),
            already_done = summary.already_done,
            concurrency,
            batch_size,
            run_id = %summary.run_id,
            "starting repair run"
        );
        progress.started(category, record_count);

        let worker = Arc::new(Worker {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
            min_length_ratio: self.config.length_ratio(strategy.min_length_ratio()),
            strategy,
            retry: self.retry,
            mode,
        });
        let pool = concurrency.min(units.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(units)));
        let (tx, mut rx) = mpsc::unbounded_channel::<RecordResult>();

        let mut workers = JoinSet::new();
        for _ in 0..pool {
            let queue = Arc::clone(&queue);
            let worker = Arc::clone(&worker);
            let tx = tx.clone();
            workers.spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(unit) = next else { break };
                    for result in worker.process(unit).await {
                        if tx.send(result).is_err() {
                            return;
                        }
                    }
                }
            });
        }
        drop(tx);

        let results = ResultsLog::new(&paths.results);
        let flush_every = self.config.flush_every.max(1);
        let mut unflushed = 0usize;

        while let Some(result) = rx.recv().await {
            progress.record_done(&result.id, &result.outcome);
            match &result.outcome {
                Outcome::Applied { fields_fixed } => {
                    summary.applied += 1;
                    summary.fields_fixed += fields_fixed;
                }
                Outcome::Failed { reason } => {
                    warn!(id = %result.id, %reason, "record failed");
                    summary.failed += 1;
                    summary.failures.push((result.id.clone(), reason.clone()));
                }
                Outcome::Skipped { .. } => summary.skipped += 1,
            }

            if mode == RunMode::DryRun {
                if let Some(content) = result.candidate {
                    summary.previews.push(Preview {
                        id: result.id,
                        fields: result.fields,
                        content,
                    });
                }
                continue;
            }

            ledger.record(&result.id, &result.outcome, &result.fields, &result.issues);
            let mut line = ResultLine::new(&summary.run_id, &result.id, &result.outcome);
            line.before_sha256 = Some(result.before_sha256);
            line.after_sha256 = result.candidate.as_deref().map(content_hash);
            if let Err(e) = results.append(&line) {
                warn!(error = %e, "failed to append results line");
            }

            unflushed += 1;
            if unflushed >= flush_every {
                match ledger.save(&paths.ledger) {
                    Ok(()) => unflushed = 0,
                    Err(e) => warn!(error = %e, "ledger flush failed, will retry"),
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task ended abnormally");
            }
        }

        if mode == RunMode::Apply {
            ledger.stats.runs += 1;
            ledger.stats.last_run = Some(chrono::Utc::now());
            ledger.save(&paths.ledger)?;
        }

        summary.elapsed = start.elapsed();
        info!(
            applied = summary.applied,
            failed = summary.failed,
            skipped = summary.skipped,
            fields_fixed = summary.fields_fixed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "repair run complete"
        );
        progress.finished(&summary);
        Ok(summary)
    }
}

/// Group records by language pair, then chunk each group.
fn work_units(articles: Vec<Article>, batch_size: usize) -> Vec<Vec<Article>> {
    let mut by_pair: BTreeMap<String, Vec<Article>> = BTreeMap::new();
    for article in articles {
        by_pair.entry(article.pair()).or_default().push(article);
    }
    let mut units = Vec::new();
    for group in by_pair.into_values() {
        let mut group = group.into_iter().peekable();
        while group.peek().is_some() {
            units.push(group.by_ref().take(batch_size).collect());
        }
    }
    units
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Final outcome for one record, sent from a worker to the collector.
#[derive(Debug)]
struct RecordResult {
    id: String,
    outcome: Outcome,
    fields: Vec<String>,
    /// Categories of the issues an applied record resolved.
    issues: Vec<IssueCategory>,
    before_sha256: String,
    /// Content that was (or, in a dry run, would be) written.
    candidate: Option<String>,
}

impl RecordResult {
    fn new(article: &Article, outcome: Outcome) -> Self {
        Self {
            id: article.id.clone(),
            outcome,
            fields: Vec::new(),
            issues: Vec::new(),
            before_sha256: content_hash(&article.content),
            candidate: None,
        }
    }
}

struct Worker {
    store: Arc<dyn ArticleStore>,
    client: Arc<dyn ModelClient>,
    strategy: Arc<dyn RepairStrategy>,
    retry: RetryPolicy,
    min_length_ratio: f64,
    mode: RunMode,
}

impl Worker {
    /// Process one work unit. Every record in it yields exactly one result.
    async fn process(&self, unit: Vec<Article>) -> Vec<RecordResult> {
        let mut results = Vec::with_capacity(unit.len());
        let mut pending: Vec<(Article, Vec<Target>)> = Vec::new();
        for article in unit {
            let issues = self.strategy.detect(&article);
            if issues.is_empty() {
                debug!(id = %article.id, "no issues detected");
                results.push(RecordResult::new(&article, Outcome::skipped("no issues detected")));
            } else {
                pending.push((article, group_targets(issues)));
            }
        }
        if pending.is_empty() {
            return results;
        }

        let prompt = {
            let records: Vec<PromptRecord<'_>> = pending
                .iter()
                .map(|(article, targets)| PromptRecord { article, targets })
                .collect();
            self.strategy.build_prompt(&records)
        };
        let ids: Vec<&str> = pending.iter().map(|(a, _)| a.id.as_str()).collect();

        let reply = send_with_retry(self.client.as_ref(), &prompt, &self.retry).await;
        let parsed = match reply.and_then(|text| parse_response(&text, &ids)) {
            Ok(parsed) => parsed,
            Err(e) => {
                let reason = e.to_string();
                for (article, _) in &pending {
                    results.push(RecordResult::new(article, Outcome::failed(reason.clone())));
                }
                return results;
            }
        };

        for (article, targets) in &pending {
            let fixes = parsed.get(&article.id).map(Vec::as_slice).unwrap_or_default();
            let result = match self.repair(article, targets, fixes).await {
                Ok((content, fields)) => RecordResult {
                    outcome: Outcome::Applied {
                        fields_fixed: fields.len(),
                    },
                    fields,
                    issues: targets
                        .iter()
                        .flat_map(|t| t.issues.iter().map(|i| i.category))
                        .collect(),
                    candidate: Some(content),
                    ..RecordResult::new(article, Outcome::skipped(""))
                },
                Err(reason) => RecordResult::new(article, Outcome::failed(reason)),
            };
            results.push(result);
        }
        results
    }

    /// Apply, validate and (in apply mode) persist one record's fixes.
    /// Returns the new content and the fields written, or a failure reason.
    async fn repair(
        &self,
        article: &Article,
        targets: &[Target],
        fixes: &[Fix],
    ) -> std::result::Result<(String, Vec<String>), String> {
        let applied = self.strategy.apply(&article.content, targets, fixes);
        for reason in &applied.skipped {
            debug!(id = %article.id, %reason, "target not applied");
        }
        if applied.fields_fixed() == 0 {
            return Err("no fixes applied".to_string());
        }

        let validated = validate(
            &article.content,
            &applied.content,
            self.min_length_ratio,
            &article.native_lang,
            &article.target_lang,
        )
        .map_err(|v| ArticleFixError::validation(v.to_string()).to_string())?;
        if validated.fell_back {
            return Err(ArticleFixError::Render(
                "normalizer fell back to unrendered text".to_string(),
            )
            .to_string());
        }

        if self.mode == RunMode::Apply {
            let update = ArticleUpdate {
                content: Some(applied.content.clone()),
                content_html: Some(validated.html),
            };
            self.store
                .update(&article.id, &update)
                .await
                .map_err(|e| e.to_string())?;
            debug!(id = %article.id, fields = applied.fields_fixed(), "record updated");
        }
        Ok((applied.content, applied.fields))
    }
}

// ---------------------------------------------------------------------------
// HTML regeneration
// ---------------------------------------------------------------------------

/// Result of a [`regenerate_html`] pass.
#[derive(Debug, Clone, Default)]
pub struct RegenSummary {
    pub scanned: usize,
    /// Records whose stored HTML differed from a fresh normalization.
    pub changed: usize,
    pub updated: usize,
    pub failures: Vec<(String, String)>,
    pub dry_run: bool,
}

/// Re-derive `content_html` for records whose stored HTML is stale.
#[instrument(skip_all, fields(mode = ?mode))]
pub async fn regenerate_html(
    store: &dyn ArticleStore,
    filter: &ArticleFilter,
    mode: RunMode,
) -> Result<RegenSummary> {
    let articles = store.read(filter).await?;
    let mut summary = RegenSummary {
        scanned: articles.len(),
        dry_run: mode == RunMode::DryRun,
        ..RegenSummary::default()
    };

    for article in &articles {
        let result = normalize(&article.content, &article.native_lang, Some(&article.target_lang));
        if result.stats.fell_back || result.html.trim().is_empty() {
            let reason = ArticleFixError::Render("no usable HTML from content".to_string());
            warn!(id = %article.id, error = %reason, "skipping record");
            summary.failures.push((article.id.clone(), reason.to_string()));
            continue;
        }
        if result.html == article.content_html {
            continue;
        }
        summary.changed += 1;
        if mode == RunMode::DryRun {
            continue;
        }
        let update = ArticleUpdate {
            content: None,
            content_html: Some(result.html),
        };
        match store.update(&article.id, &update).await {
            Ok(()) => summary.updated += 1,
            Err(e) => {
                warn!(id = %article.id, error = %e, "HTML update failed");
                summary.failures.push((article.id.clone(), e.to_string()));
            }
        }
    }

    info!(
        scanned = summary.scanned,
        changed = summary.changed,
        updated = summary.updated,
        failed = summary.failures.len(),
        "HTML regeneration complete"
    );
    Ok(summary)
}

/// Outcome of a [`tidy_articles`] pass.
#[derive(Debug, Clone, Default)]
pub struct TidySummary {
    pub scanned: usize,
    /// Records the clean-up would change.
    pub changed: usize,
    pub updated: usize,
    pub renamed: usize,
    pub removed: usize,
    pub failures: Vec<(String, String)>,
    pub dry_run: bool,
}

/// Rename legacy component attributes and drop duplicate vocabulary cards,
/// storing the new content together with freshly rendered HTML.
#[instrument(skip_all, fields(mode = ?mode))]
pub async fn tidy_articles(
    store: &dyn ArticleStore,
    filter: &ArticleFilter,
    mode: RunMode,
) -> Result<TidySummary> {
    let articles = store.read(filter).await?;
    let mut summary = TidySummary {
        scanned: articles.len(),
        dry_run: mode == RunMode::DryRun,
        ..TidySummary::default()
    };

    for article in &articles {
        let tidied = tidy(&article.content);
        if !tidied.changed() {
            continue;
        }
        if !tidied.preserves_components(&count_components(&article.content)) {
            let reason = ArticleFixError::Render("clean-up changed unrelated components".to_string());
            warn!(id = %article.id, error = %reason, "skipping record");
            summary.failures.push((article.id.clone(), reason.to_string()));
            continue;
        }
        let result = normalize(&tidied.content, &article.native_lang, Some(&article.target_lang));
        if result.stats.fell_back || result.html.trim().is_empty() {
            let reason = ArticleFixError::Render("no usable HTML from content".to_string());
            warn!(id = %article.id, error = %reason, "skipping record");
            summary.failures.push((article.id.clone(), reason.to_string()));
            continue;
        }

        debug!(id = %article.id, renamed = tidied.renamed, removed = tidied.removed, "record tidied");
        summary.changed += 1;
        summary.renamed += tidied.renamed;
        summary.removed += tidied.removed;
        if mode == RunMode::DryRun {
            continue;
        }
        let update = ArticleUpdate {
            content: Some(tidied.content),
            content_html: Some(result.html),
        };
        match store.update(&article.id, &update).await {
            Ok(()) => summary.updated += 1,
            Err(e) => {
                warn!(id = %article.id, error = %e, "tidy update failed");
                summary.failures.push((article.id.clone(), e.to_string()));
            }
        }
    }

    info!(
        scanned = summary.scanned,
        changed = summary.changed,
        updated = summary.updated,
        renamed = summary.renamed,
        removed = summary.removed,
        failed = summary.failures.len(),
        "clean-up complete"
    );
    Ok(summary)
}
