//! Turso Embedded / libSQL storage layer for articles (offline mode).
//!
//! The repair pipeline only needs keyed read and update, expressed by the
//! [`ArticleStore`] trait. [`Storage`] implements it over a local libSQL
//! database and adds bulk import/export and a revision trail: every update
//! keeps the content it replaced.
//!
//! **Access rules:**
//! - `fix`, `regen`, `import`: read-write via [`Storage::open`]
//! - `detect`, `export`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use articlefix_shared::{Article, ArticleFilter, ArticleFixError, ArticleUpdate, Result};
use async_trait::async_trait;
use chrono::Utc;
use libsql::params::Params;
use libsql::{Connection, Database, Value, params};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Persistence adapter
// ---------------------------------------------------------------------------

/// Keyed read/update access to articles.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Read the articles selected by `filter`, ordered by id.
    async fn read(&self, filter: &ArticleFilter) -> Result<Vec<Article>>;

    /// Overwrite the fields set in `update` for article `id`.
    async fn update(&self, id: &str, update: &ArticleUpdate) -> Result<()>;
}

fn storage_err(e: impl std::fmt::Display) -> ArticleFixError {
    ArticleFixError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// libSQL storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Content an update replaced.
#[derive(Debug, Clone)]
pub struct Revision {
    pub content: String,
    pub content_html: String,
    pub replaced_at: chrono::DateTime<Utc>,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArticleFixError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ArticleFixError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    ArticleFixError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ArticleFixError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Article operations
    // -----------------------------------------------------------------------

    /// Insert or replace articles by id. Returns the number written.
    pub async fn import_articles(&self, articles: &[Article]) -> Result<usize> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction().await.map_err(storage_err)?;
        for article in articles {
            tx.execute(
                "INSERT INTO articles (id, native_lang, target_lang, title, category, content, content_html, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                   native_lang = excluded.native_lang,
                   target_lang = excluded.target_lang,
                   title = excluded.title,
                   category = excluded.category,
                   content = excluded.content,
                   content_html = excluded.content_html,
                   updated_at = excluded.updated_at",
                params![
                    article.id.as_str(),
                    article.native_lang.as_str(),
                    article.target_lang.as_str(),
                    article.title.as_str(),
                    article.category.as_deref(),
                    article.content.as_str(),
                    article.content_html.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        tracing::info!(count = articles.len(), "articles imported");
        Ok(articles.len())
    }

    /// Import a JSON array of articles from `path`.
    pub async fn import_json(&self, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path).map_err(|e| ArticleFixError::io(path, e))?;
        let articles: Vec<Article> = serde_json::from_str(&raw)
            .map_err(|e| ArticleFixError::Storage(format!("invalid article export: {e}")))?;
        self.import_articles(&articles).await
    }

    /// Read the articles selected by `filter`.
    pub async fn export_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        self.read_articles(filter).await
    }

    /// Write the articles selected by `filter` to `path` as a JSON array.
    pub async fn export_json(&self, path: &Path, filter: &ArticleFilter) -> Result<usize> {
        let articles = self.export_articles(filter).await?;
        let json = serde_json::to_string_pretty(&articles)
            .map_err(|e| ArticleFixError::Storage(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| ArticleFixError::io(path, e))?;
        Ok(articles.len())
    }

    async fn read_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        let mut sql = String::from(
            "SELECT id, native_lang, target_lang, title, category, content, content_html
             FROM articles",
        );
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if !filter.ids.is_empty() {
            let marks = vec!["?"; filter.ids.len()].join(", ");
            clauses.push(format!("id IN ({marks})"));
            values.extend(filter.ids.iter().map(|id| Value::Text(id.clone())));
        }
        if let Some(native) = &filter.native_lang {
            clauses.push("native_lang = ?".to_string());
            values.push(Value::Text(native.clone()));
        }
        if let Some(target) = &filter.target_lang {
            clauses.push("target_lang = ?".to_string());
            values.push(Value::Text(target.clone()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(storage_err)?;

        collect_rows(rows, row_to_article).await
    }

    async fn update_article(&self, id: &str, update: &ArticleUpdate) -> Result<()> {
        self.check_writable()?;
        if update.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        let revision_id = Uuid::now_v7().to_string();

        let tx = self.conn.transaction().await.map_err(storage_err)?;
        tx.execute(
            "INSERT INTO article_revisions (id, article_id, content, content_html, replaced_at)
             SELECT ?1, id, content, content_html, ?2 FROM articles WHERE id = ?3",
            params![revision_id.as_str(), now.as_str(), id],
        )
        .await
        .map_err(storage_err)?;
        let changed = tx
            .execute(
                "UPDATE articles SET
                   content = COALESCE(?1, content),
                   content_html = COALESCE(?2, content_html),
                   updated_at = ?3
                 WHERE id = ?4",
                params![
                    update.content.as_deref(),
                    update.content_html.as_deref(),
                    now.as_str(),
                    id
                ],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            tx.rollback().await.map_err(storage_err)?;
            return Err(ArticleFixError::Storage(format!("article '{id}' not found")));
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    /// Content replaced by earlier updates of article `id`, oldest first.
    pub async fn revisions(&self, id: &str) -> Result<Vec<Revision>> {
        let rows = self
            .conn
            .query(
                "SELECT content, content_html, replaced_at FROM article_revisions
                 WHERE article_id = ?1 ORDER BY rowid",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        collect_rows(rows, |row| {
            let replaced_at: String = row.get(2).map_err(storage_err)?;
            Ok(Revision {
                content: row.get(0).map_err(storage_err)?,
                content_html: row.get(1).map_err(storage_err)?,
                replaced_at: chrono::DateTime::parse_from_rfc3339(&replaced_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| ArticleFixError::Storage(format!("invalid date: {e}")))?,
            })
        })
        .await
    }
}

#[async_trait]
impl ArticleStore for Storage {
    async fn read(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        self.read_articles(filter).await
    }

    async fn update(&self, id: &str, update: &ArticleUpdate) -> Result<()> {
        self.update_article(id, update).await
    }
}

/// Drain a result set. A row that fails to fetch fails the whole read.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    convert: impl Fn(&libsql::Row) -> Result<T>,
) -> Result<Vec<T>> {
    let mut results = Vec::new();
    while let Some(row) = rows.next().await.map_err(storage_err)? {
        results.push(convert(&row)?);
    }
    Ok(results)
}

/// Convert a database row to an [`Article`].
fn row_to_article(row: &libsql::Row) -> Result<Article> {
    Ok(Article {
        id: row.get::<String>(0).map_err(storage_err)?,
        native_lang: row.get::<String>(1).map_err(storage_err)?,
        target_lang: row.get::<String>(2).map_err(storage_err)?,
        title: row.get::<String>(3).unwrap_or_default(),
        category: row.get::<String>(4).ok(),
        content: row.get::<String>(5).map_err(storage_err)?,
        content_html: row.get::<String>(6).unwrap_or_default(),
    })
}
