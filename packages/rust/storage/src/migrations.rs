//! SQL migration definitions for the article database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: articles",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Localized articles: source markup plus derived HTML
CREATE TABLE IF NOT EXISTS articles (
    id           TEXT PRIMARY KEY,
    native_lang  TEXT NOT NULL,
    target_lang  TEXT NOT NULL,
    title        TEXT NOT NULL DEFAULT '',
    category     TEXT,
    content      TEXT NOT NULL,
    content_html TEXT NOT NULL DEFAULT '',
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_pair ON articles(native_lang, target_lang);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Article revisions: content replaced by updates",
            sql: r#"
CREATE TABLE IF NOT EXISTS article_revisions (
    id           TEXT PRIMARY KEY,
    article_id   TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    content      TEXT NOT NULL,
    content_html TEXT NOT NULL,
    replaced_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_revisions_article ON article_revisions(article_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
