//! Shared types, error model, and configuration for ArticleFix.
//!
//! This crate is the foundation depended on by all other ArticleFix crates.
//! It provides:
//! - [`ArticleFixError`], the unified error type
//! - Domain types ([`Article`], [`Issue`], [`Anchor`], [`Outcome`])
//! - The supported-language table ([`lang`])
//! - Configuration ([`AppConfig`], [`RepairConfig`], config loading)

pub mod config;
pub mod error;
pub mod lang;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CategoryConfig, DefaultsConfig, ModelConfig, ModelSettings, RepairConfig,
    ValidationConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, resolve_api_key,
};
pub use error::{ArticleFixError, Result};
pub use lang::Script;
pub use types::{
    Anchor, Article, ArticleFilter, ArticleUpdate, Issue, IssueCategory, Outcome, Severity,
};
