use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::config::SourceConfig;
use crate::fetcher::CandidateItem;

pub const MAX_TITLE_LEN: usize = 1024;
pub const MAX_URL_LEN: usize = 2048;
pub const MAX_SUMMARY_LEN: usize = 4000;
pub const MAX_SOURCE_LEN: usize = 255;

/// How a source is fetched.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SourceKind {
    /// RSS or Atom document
    #[default]
    #[serde(alias = "rss")]
    Feed,
    /// Plain HTML page scanned for keyword links
    Html,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "feed",
            SourceKind::Html => "html",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "feed" | "rss" => Ok(SourceKind::Feed),
            "html" => Ok(SourceKind::Html),
            other => Err(anyhow::anyhow!("unknown source kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub kind: SourceKind,
    pub url: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Article {
    pub id: i64,
    pub source: String,
    pub title: String,
    pub url: String,
    pub summary: String,
    /// RFC 3339, second precision
    pub published: Option<String>,
    /// RFC 3339, microsecond precision
    pub fetched_at: String,
}

pub fn format_published(published: DateTime<Utc>) -> String {
    published.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn now_fetched_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Cut `s` to at most `max` characters without splitting a code point.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to `sqlite::memory:` is its own database.
        let in_memory = database_url.contains(":memory:");
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options.connect(database_url).await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'feed',
                url TEXT NOT NULL UNIQUE,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                summary TEXT NOT NULL DEFAULT '',
                published TEXT,
                fetched_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_articles_published
            ON articles(published DESC, fetched_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert the configured seed sources, but only into an empty registry.
    pub async fn seed_sources(&self, configs: &[SourceConfig]) -> anyhow::Result<usize> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sources")
            .fetch_one(&self.pool)
            .await?;
        if count.0 > 0 {
            return Ok(0);
        }

        let mut seeded = 0;
        for config in configs {
            let result = sqlx::query(
                r#"
                INSERT INTO sources (name, kind, url, enabled)
                VALUES (?, ?, ?, 1)
                ON CONFLICT(url) DO NOTHING
                "#,
            )
            .bind(&config.name)
            .bind(config.kind)
            .bind(&config.url)
            .execute(&self.pool)
            .await?;
            seeded += result.rows_affected() as usize;
        }
        Ok(seeded)
    }

    pub async fn list_sources(&self) -> anyhow::Result<Vec<Source>> {
        let sources = sqlx::query_as::<_, Source>("SELECT * FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(sources)
    }

    /// Owned snapshot of the enabled sources; later registry edits do not
    /// reach a pass that already holds it.
    pub async fn list_enabled_sources(&self) -> anyhow::Result<Vec<Source>> {
        let sources =
            sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE enabled = 1 ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(sources)
    }

    pub async fn get_source(&self, source_id: i64) -> anyhow::Result<Option<Source>> {
        let source = sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(source)
    }

    pub async fn add_source(&self, name: &str, kind: SourceKind, url: &str) -> anyhow::Result<i64> {
        let result = sqlx::query("INSERT INTO sources (name, kind, url, enabled) VALUES (?, ?, ?, 1)")
            .bind(name)
            .bind(kind)
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Flip the enabled flag. Returns the new state, or `None` for an unknown id.
    pub async fn toggle_source(&self, source_id: i64) -> anyhow::Result<Option<bool>> {
        let row: Option<(bool,)> =
            sqlx::query_as("UPDATE sources SET enabled = NOT enabled WHERE id = ? RETURNING enabled")
                .bind(source_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    pub async fn remove_source(&self, source_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store `item` unless an article with the same url already exists.
    ///
    /// Returns `true` only when a new row was written. Existing rows are left
    /// untouched. Title, url, summary and source are truncated rather than
    /// rejected when they exceed the column limits.
    pub async fn upsert_article(
        &self,
        item: &CandidateItem,
        source_name: &str,
    ) -> anyhow::Result<bool> {
        let title = item.title.trim();
        let url = item.url.trim();
        if title.is_empty() || url.is_empty() {
            return Ok(false);
        }

        let title = truncate_chars(title, MAX_TITLE_LEN);
        let url = truncate_chars(url, MAX_URL_LEN);
        let summary = truncate_chars(&item.summary, MAX_SUMMARY_LEN);
        let source = truncate_chars(source_name, MAX_SOURCE_LEN);
        let published = item.published.map(format_published);

        // Single autocommit statement; the unique url index decides.
        let result = sqlx::query(
            r#"
            INSERT INTO articles (source, title, url, summary, published, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
            "#,
        )
        .bind(source)
        .bind(title)
        .bind(url)
        .bind(summary)
        .bind(published)
        .bind(now_fetched_at())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn replace_summary(&self, article_id: i64, summary: &str) -> anyhow::Result<bool> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Ok(false);
        }

        let result = sqlx::query("UPDATE articles SET summary = ?, fetched_at = ? WHERE id = ?")
            .bind(truncate_chars(summary, MAX_SUMMARY_LEN))
            .bind(now_fetched_at())
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_article(&self, article_id: i64) -> anyhow::Result<Option<Article>> {
        let article = sqlx::query_as::<_, Article>("SELECT * FROM articles WHERE id = ?")
            .bind(article_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }

    /// Most recent `limit` articles, newest published first, undated last.
    ///
    /// `query` is matched against title and summary only inside that window,
    /// so an older matching article beyond `limit` is not returned.
    pub async fn list_recent(
        &self,
        limit: i64,
        query: Option<&str>,
    ) -> anyhow::Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            ORDER BY published DESC NULLS LAST, fetched_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let query = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        let Some(query) = query else {
            return Ok(articles);
        };

        Ok(articles
            .into_iter()
            .filter(|a| {
                a.title.to_lowercase().contains(&query) || a.summary.to_lowercase().contains(&query)
            })
            .collect())
    }

    pub async fn list_all_articles(&self) -> anyhow::Result<Vec<Article>> {
        let articles = sqlx::query_as::<_, Article>(
            r#"
            SELECT * FROM articles
            ORDER BY published DESC NULLS LAST, fetched_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(articles)
    }

    pub async fn article_count(&self) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}
