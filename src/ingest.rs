use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::Config;
use crate::db::{Database, Source};
use crate::enricher::Enricher;
use crate::fetcher::{build_client, CandidateItem, Fetcher};
use crate::relevance::RelevanceFilter;

/// Sources fetched at the same time within one pass.
const FETCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// Newly inserted articles
    pub inserted: usize,
    /// Enabled sources visited
    pub sources: usize,
    pub finished_at: String,
}

#[derive(Debug)]
pub enum PassOutcome {
    Completed(PassReport),
    /// Another pass held the guard; nothing was fetched.
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichOutcome {
    NotFound,
    Updated,
    /// The page gave no usable text; the stored summary is unchanged.
    NoContent,
}

/// Runs ingestion passes and single-article enrichment against one store.
///
/// Shared by the scheduler and the HTTP triggers. At most one pass runs at a
/// time.
pub struct Ingestor {
    db: Arc<Database>,
    fetcher: Fetcher,
    enricher: Enricher,
    filter: RelevanceFilter,
    /// Held for the whole pass; released on drop, even when the pass future
    /// is cancelled.
    running: Mutex<()>,
    last_report: RwLock<Option<PassReport>>,
}

impl Ingestor {
    pub fn new(
        db: Arc<Database>,
        fetcher: Fetcher,
        enricher: Enricher,
        filter: RelevanceFilter,
    ) -> Self {
        Self {
            db,
            fetcher,
            enricher,
            filter,
            running: Mutex::new(()),
            last_report: RwLock::new(None),
        }
    }

    pub fn from_config(db: Arc<Database>, config: &Config) -> anyhow::Result<Self> {
        let client = build_client(&config.user_agent)?;
        Ok(Self::new(
            db,
            Fetcher::new(client.clone(), config.keywords.clone()),
            Enricher::new(client),
            RelevanceFilter::new(
                config.keywords.clone(),
                config.always_relevant_sources.clone(),
            ),
        ))
    }

    pub async fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    pub async fn last_report(&self) -> Option<PassReport> {
        self.last_report.read().await.clone()
    }

    /// Run one full ingestion pass over the enabled sources.
    ///
    /// Returns [`PassOutcome::AlreadyRunning`] without doing anything when a
    /// pass is already in progress.
    pub async fn run_pass(&self) -> anyhow::Result<PassOutcome> {
        let Ok(_guard) = self.running.try_lock() else {
            info!("Ingestion pass already in progress, skipping");
            return Ok(PassOutcome::AlreadyRunning);
        };

        let report = self.do_pass().await?;
        *self.last_report.write().await = Some(report.clone());
        Ok(PassOutcome::Completed(report))
    }

    async fn do_pass(&self) -> anyhow::Result<PassReport> {
        let sources = self.db.list_enabled_sources().await?;
        info!("Ingesting from {} enabled sources", sources.len());

        let fetcher = &self.fetcher;
        let fetched: Vec<(Source, Vec<CandidateItem>)> = stream::iter(sources)
            .map(move |source| async move {
                let items = fetcher.fetch_source(&source).await;
                (source, items)
            })
            .buffered(FETCH_CONCURRENCY)
            .collect()
            .await;

        let mut inserted = 0;
        for (source, items) in &fetched {
            let added = self.store_items(items, &source.name).await;
            if added > 0 {
                info!("Added {} new articles from '{}'", added, source.name);
            }
            inserted += added;
        }

        info!(inserted, sources = fetched.len(), "Ingestion pass complete");
        Ok(PassReport {
            inserted,
            sources: fetched.len(),
            finished_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    /// Filter and store `items`, returning how many were new.
    ///
    /// Each item is stored on its own; a failure is logged and the rest of
    /// the batch continues.
    pub async fn store_items(&self, items: &[CandidateItem], source_name: &str) -> usize {
        let mut added = 0;
        for item in items {
            if !self.filter.accepts(item, source_name) {
                continue;
            }
            match self.db.upsert_article(item, source_name).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(source = %source_name, url = %item.url, error = %e, "Failed to store article");
                }
            }
        }
        added
    }

    /// Replace one stored article's summary with text pulled from its page.
    pub async fn enrich_article(
        &self,
        article_id: i64,
        max_paragraphs: usize,
    ) -> anyhow::Result<EnrichOutcome> {
        let Some(article) = self.db.get_article(article_id).await? else {
            return Ok(EnrichOutcome::NotFound);
        };

        let Some(summary) = self.enricher.enrich(&article.url, max_paragraphs).await else {
            return Ok(EnrichOutcome::NoContent);
        };

        if self.db.replace_summary(article_id, &summary).await? {
            info!(article_id, url = %article.url, "Replaced summary with full text");
            Ok(EnrichOutcome::Updated)
        } else {
            Ok(EnrichOutcome::NoContent)
        }
    }
}
