//! Single-article deep fetch that turns a page into a short plain-text summary.

use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::fetcher::get_text;

pub const FULL_TEXT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_PARAGRAPHS: usize = 3;
/// Paragraph count used by the explicit single-article action.
pub const ARTICLE_ACTION_PARAGRAPHS: usize = 4;

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("static selector"));
static MAIN: Lazy<Selector> = Lazy::new(|| Selector::parse("main").expect("static selector"));
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").expect("static selector"));
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="description"]"#).expect("static selector"));
static OG_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:description"]"#).expect("static selector"));

#[derive(Clone)]
pub struct Enricher {
    client: Client,
}

impl Enricher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch `url` and summarize it, or `None` when the page is unreachable
    /// or has no usable text.
    pub async fn enrich(&self, url: &str, max_paragraphs: usize) -> Option<String> {
        match get_text(&self.client, url, FULL_TEXT_TIMEOUT).await {
            Ok(html) => {
                let summary = Self::extract_summary(&html, max_paragraphs);
                debug!(%url, found = summary.is_some(), "Full-text extraction finished");
                summary
            }
            Err(e) => {
                warn!(%url, error = %e, "Full-text fetch failed");
                None
            }
        }
    }

    /// Up to `max_paragraphs` non-empty paragraphs joined by blank lines.
    ///
    /// Paragraphs come from the first `article` element; when it yields none,
    /// from the first `main` element or else the whole document. With no
    /// paragraphs at all, the meta description (or `og:description`) is used.
    pub fn extract_summary(html: &str, max_paragraphs: usize) -> Option<String> {
        let document = Html::parse_document(html);

        let mut paragraphs = document
            .select(&ARTICLE)
            .next()
            .map(|article| collect_paragraphs(article, max_paragraphs))
            .unwrap_or_default();

        if paragraphs.is_empty() {
            let container = document
                .select(&MAIN)
                .next()
                .unwrap_or_else(|| document.root_element());
            paragraphs = collect_paragraphs(container, max_paragraphs);
        }

        let summary = paragraphs.join("\n\n");
        if !summary.is_empty() {
            return Some(summary);
        }

        document
            .select(&META_DESCRIPTION)
            .next()
            .or_else(|| document.select(&OG_DESCRIPTION).next())
            .and_then(|meta| meta.value().attr("content"))
            .map(str::trim)
            .filter(|content| !content.is_empty())
            .map(str::to_string)
    }
}

fn collect_paragraphs(container: ElementRef<'_>, max: usize) -> Vec<String> {
    container
        .select(&PARAGRAPH)
        .map(|p| {
            p.text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|text| !text.is_empty())
        .take(max)
        .collect()
}
