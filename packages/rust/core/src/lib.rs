//! Repair pipeline for ArticleFix.
//!
//! This crate ties detection, prompting, the model client, fix application,
//! validation and persistence into one parameterized [`Orchestrator`]. Each
//! issue category plugs in through a [`RepairStrategy`].

pub mod apply;
pub mod ledger;
pub mod model;
pub mod orchestrator;
pub mod prompt;
pub mod response;
pub mod strategy;
pub mod tidy;
pub mod validate;

pub use apply::{Applied, Fix, Target, apply_fixes, group_targets};
pub use ledger::{Ledger, LedgerPaths, LedgerStats, ResultLine, ResultsLog};
pub use model::{GeminiClient, ModelClient, RetryPolicy, send_with_retry};
pub use orchestrator::{
    Orchestrator, Preview, RegenSummary, RepairProgress, RunMode, RunOptions, RunSummary,
    SilentProgress, TidySummary, regenerate_html, tidy_articles,
};
pub use prompt::{PromptRecord, PromptSpec, build_prompt};
pub use response::{ParsedFixes, parse_response};
pub use strategy::{ComponentFieldStrategy, ProseStrategy, RepairStrategy, strategy_for};
pub use tidy::{Tidied, tidy};
pub use validate::{Validated, Violation, validate};
