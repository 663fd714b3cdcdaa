use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::parser;
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use scraper::{Html, Selector};
use tracing::{info, warn};
use url::Url;

use crate::db::{Source, SourceKind};
use crate::error::FetchError;
use crate::relevance::matches_keyword;

/// Timeout for listing fetches (feeds and link pages).
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(12);
pub const MAX_FEED_ITEMS: usize = 60;
pub const MAX_HTML_LINKS: usize = 80;

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// A fetched item that has not been filtered or stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateItem {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
}

/// HTTP client shared by the fetchers and the enricher.
pub fn build_client(user_agent: &str) -> reqwest::Result<Client> {
    Client::builder().user_agent(user_agent).build()
}

/// GET `url`, treating non-2xx statuses as errors.
async fn get(client: &Client, url: &str, timeout: Duration) -> Result<Response, FetchError> {
    Ok(client
        .get(url)
        .timeout(timeout)
        .send()
        .await?
        .error_for_status()?)
}

/// GET `url` and return the body decoded as text.
pub(crate) async fn get_text(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<String, FetchError> {
    Ok(get(client, url, timeout).await?.text().await?)
}

/// GET `url` and return the raw body.
pub(crate) async fn get_bytes(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    Ok(get(client, url, timeout).await?.bytes().await?.to_vec())
}

#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    keywords: Vec<String>,
}

impl Fetcher {
    pub fn new(client: Client, keywords: Vec<String>) -> Self {
        Self { client, keywords }
    }

    /// Fetch candidates for `source` using the strategy its kind selects.
    ///
    /// Never fails: any network or parse error is logged and the source
    /// contributes no items to the pass.
    pub async fn fetch_source(&self, source: &Source) -> Vec<CandidateItem> {
        info!("Fetching {} source: {} ({})", source.kind, source.name, source.url);

        let result = match source.kind {
            SourceKind::Feed => self.fetch_feed(&source.url).await,
            SourceKind::Html => self.fetch_html(&source.url).await,
        };

        match result {
            Ok(items) => {
                info!(source = %source.name, count = items.len(), "Fetched candidates");
                items
            }
            Err(e) => {
                warn!(source = %source.name, url = %source.url, error = %e, "Fetch failed, skipping source");
                Vec::new()
            }
        }
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<CandidateItem>, FetchError> {
        let bytes = get_bytes(&self.client, url, LISTING_TIMEOUT).await?;
        Self::parse_feed(&bytes)
    }

    pub async fn fetch_html(&self, url: &str) -> Result<Vec<CandidateItem>, FetchError> {
        let body = get_text(&self.client, url, LISTING_TIMEOUT).await?;
        Self::extract_keyword_links(&body, url, &self.keywords)
    }

    /// Parse an RSS/Atom document into at most [`MAX_FEED_ITEMS`] candidates,
    /// in document order.
    ///
    /// A missing or unparsable date leaves `published` empty; it never drops
    /// the entry.
    pub fn parse_feed(bytes: &[u8]) -> Result<Vec<CandidateItem>, FetchError> {
        let parsed = parser::parse(bytes)?;

        let items = parsed
            .entries
            .into_iter()
            .take(MAX_FEED_ITEMS)
            .map(|entry| {
                let title = entry
                    .title
                    .map(|t| t.content.trim().to_string())
                    .unwrap_or_default();

                let url = entry
                    .links
                    .first()
                    .map(|l| l.href.trim().to_string())
                    .unwrap_or_default();

                let summary = entry
                    .summary
                    .map(|s| s.content)
                    .or_else(|| entry.content.and_then(|c| c.body))
                    .unwrap_or_default();

                CandidateItem {
                    title,
                    url,
                    summary,
                    published: entry.published.or(entry.updated),
                }
            })
            .collect();

        Ok(items)
    }

    /// Collect links whose text or absolute URL mention a keyword.
    ///
    /// Links are resolved against `base_url`, deduplicated by URL in
    /// first-seen order and capped at [`MAX_HTML_LINKS`]. Link text becomes
    /// the title, falling back to the URL itself.
    pub fn extract_keyword_links(
        html: &str,
        base_url: &str,
        keywords: &[String],
    ) -> Result<Vec<CandidateItem>, FetchError> {
        let base = Url::parse(base_url)?;
        let document = Html::parse_document(html);

        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for anchor in document.select(&LINK_SELECTOR) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = base.join(href.trim()) else {
                continue;
            };
            let url = resolved.to_string();

            let text = anchor
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");

            if !matches_keyword(&format!("{} {}", text, url), keywords) {
                continue;
            }
            if !seen.insert(url.clone()) {
                continue;
            }

            let title = if text.is_empty() { url.clone() } else { text };
            items.push(CandidateItem {
                title,
                url,
                summary: String::new(),
                published: None,
            });

            if items.len() >= MAX_HTML_LINKS {
                break;
            }
        }

        Ok(items)
    }
}
