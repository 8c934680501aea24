//! Progress ledger and results log.
//!
//! The ledger is the resume authority: a JSON document per category listing
//! every record already applied, failed or skipped. It is rewritten atomically
//! (temp file + rename). The results log is an append-only JSONL artifact with
//! one line per outcome, used to cross-check the ledger when its last flush
//! was lost.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use articlefix_shared::{ArticleFixError, IssueCategory, Outcome, Result};

/// Where one category's ledger and results log live.
#[derive(Debug, Clone)]
pub struct LedgerPaths {
    pub ledger: PathBuf,
    pub results: PathBuf,
}

impl LedgerPaths {
    pub fn for_category(data_dir: &Path, category: IssueCategory) -> Self {
        Self {
            ledger: data_dir.join(format!("{category}.ledger.json")),
            results: data_dir.join(format!("{category}.results.jsonl")),
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Fields written across all applied records.
    pub fields_fixed: usize,
    /// Fields written, per field name (`text` for passages).
    #[serde(default)]
    pub by_field: BTreeMap<String, usize>,
    /// Issues resolved in applied records, per issue category.
    #[serde(default)]
    pub by_issue: BTreeMap<IssueCategory, usize>,
    #[serde(default)]
    pub runs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}

/// Per-category resume state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub applied: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeMap<String, String>,
    #[serde(default)]
    pub skipped: BTreeMap<String, String>,
    #[serde(default)]
    pub stats: LedgerStats,
}

impl Ledger {
    /// Load a ledger; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ArticleFixError::io(path, e)),
        };
        serde_json::from_str(&content)
            .map_err(|e| ArticleFixError::Ledger(format!("{}: {e}", path.display())))
    }

    /// Write the ledger atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ArticleFixError::io(dir, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ArticleFixError::Ledger(e.to_string()))?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, json).map_err(|e| ArticleFixError::io(&temp, e))?;
        std::fs::rename(&temp, path).map_err(|e| ArticleFixError::io(path, e))?;
        debug!(path = %path.display(), applied = self.applied.len(), "ledger flushed");
        Ok(())
    }

    /// Whether a record already has a final outcome.
    pub fn is_done(&self, id: &str) -> bool {
        self.applied.contains(id) || self.failed.contains_key(id) || self.skipped.contains_key(id)
    }

    /// Record a final outcome. `fields` lists the fields written and
    /// `issues` the categories of the issues they resolved, if any.
    pub fn record(
        &mut self,
        id: &str,
        outcome: &Outcome,
        fields: &[String],
        issues: &[IssueCategory],
    ) {
        self.failed.remove(id);
        self.skipped.remove(id);
        match outcome {
            Outcome::Applied { fields_fixed } => {
                self.applied.insert(id.to_string());
                self.stats.fields_fixed += fields_fixed;
                for field in fields {
                    *self.stats.by_field.entry(field.clone()).or_default() += 1;
                }
                for category in issues {
                    *self.stats.by_issue.entry(*category).or_default() += 1;
                }
            }
            Outcome::Failed { reason } => {
                self.applied.remove(id);
                self.failed.insert(id.to_string(), reason.clone());
            }
            Outcome::Skipped { reason } => {
                self.applied.remove(id);
                self.skipped.insert(id.to_string(), reason.clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.applied.len() + self.failed.len() + self.skipped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Results log
// ---------------------------------------------------------------------------

/// One JSONL line of the results log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLine {
    pub run_id: String,
    pub id: String,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub fields_fixed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_sha256: Option<String>,
    pub at: DateTime<Utc>,
}

impl ResultLine {
    /// The outcome this line records, if its label is known.
    pub fn to_outcome(&self) -> Option<Outcome> {
        let reason = self.reason.clone().unwrap_or_default();
        match self.outcome.as_str() {
            "applied" => Some(Outcome::Applied {
                fields_fixed: self.fields_fixed,
            }),
            "failed" => Some(Outcome::failed(reason)),
            "skipped" => Some(Outcome::skipped(reason)),
            _ => None,
        }
    }

    pub fn new(run_id: &str, id: &str, outcome: &Outcome) -> Self {
        let (reason, fields_fixed) = match outcome {
            Outcome::Applied { fields_fixed } => (None, *fields_fixed),
            Outcome::Failed { reason } | Outcome::Skipped { reason } => (Some(reason.clone()), 0),
        };
        Self {
            run_id: run_id.to_string(),
            id: id.to_string(),
            outcome: outcome.label().to_string(),
            reason,
            fields_fixed,
            before_sha256: None,
            after_sha256: None,
            at: Utc::now(),
        }
    }
}

/// Hex SHA-256 of a content body.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Append-only JSONL outcome log.
#[derive(Debug, Clone)]
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &ResultLine) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ArticleFixError::io(dir, e))?;
        }
        let mut json =
            serde_json::to_string(line).map_err(|e| ArticleFixError::Ledger(e.to_string()))?;
        json.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ArticleFixError::io(&self.path, e))?;
        file.write_all(json.as_bytes())
            .map_err(|e| ArticleFixError::io(&self.path, e))
    }

    /// Every line in the log. Unparseable lines are skipped with a warning.
    pub fn lines(&self) -> Result<Vec<ResultLine>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ArticleFixError::io(&self.path, e)),
        };
        let mut out = Vec::new();
        for (n, raw) in content.lines().enumerate() {
            if raw.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(raw) {
                Ok(line) => out.push(line),
                Err(e) => warn!(line = n + 1, error = %e, "skipping malformed results line"),
            }
        }
        Ok(out)
    }

    /// The last outcome logged for each id.
    pub fn latest_outcomes(&self) -> Result<BTreeMap<String, Outcome>> {
        let mut latest = BTreeMap::new();
        for line in self.lines()? {
            match line.to_outcome() {
                Some(outcome) => {
                    latest.insert(line.id, outcome);
                }
                None => warn!(id = %line.id, outcome = %line.outcome, "unknown outcome in results log"),
            }
        }
        Ok(latest)
    }

    /// Move the log aside to `<stem>.<uuid v7>.jsonl`, which sorts by time.
    /// Returns the new path, or `None` when there was nothing to rotate.
    pub fn rotate(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("results");
        let rotated = self
            .path
            .with_file_name(format!("{stem}.{}.jsonl", Uuid::now_v7()));
        std::fs::rename(&self.path, &rotated).map_err(|e| ArticleFixError::io(&rotated, e))?;
        Ok(Some(rotated))
    }
}

/// Delete a category's ledger and rotate its results log.
pub fn reset(paths: &LedgerPaths) -> Result<Option<PathBuf>> {
    match std::fs::remove_file(&paths.ledger) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(ArticleFixError::io(&paths.ledger, e)),
    }
    ResultsLog::new(&paths.results).rotate()
}

/// Ids a new run must not reprocess.
///
/// Outcomes the results log holds for ids missing from the ledger (a flush
/// lost before exit) are folded into `ledger` first, so the returned set is
/// every id the ledger then knows.
pub fn completed_ids(paths: &LedgerPaths, ledger: &mut Ledger) -> Result<BTreeSet<String>> {
    let mut recovered = 0usize;
    for (id, outcome) in ResultsLog::new(&paths.results).latest_outcomes()? {
        if !ledger.is_done(&id) {
            ledger.record(&id, &outcome, &[], &[]);
            recovered += 1;
        }
    }
    if recovered > 0 {
        warn!(recovered, "results log lists outcomes missing from the ledger");
    }

    let mut done: BTreeSet<String> = ledger.applied.iter().cloned().collect();
    done.extend(ledger.failed.keys().cloned());
    done.extend(ledger.skipped.keys().cloned());
    Ok(done)
}
