//! Keyword relevance policy applied to candidate items before storage.

use crate::fetcher::CandidateItem;

/// True when `text` contains any of `keywords`.
///
/// Keywords are expected lowercased (config normalizes them); `text` is
/// lowercased here.
pub fn matches_keyword(text: &str, keywords: &[String]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|k| text.contains(k.as_str()))
}

#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    keywords: Vec<String>,
    always_relevant_sources: Vec<String>,
}

impl RelevanceFilter {
    pub fn new(keywords: Vec<String>, always_relevant_sources: Vec<String>) -> Self {
        Self {
            keywords,
            always_relevant_sources,
        }
    }

    /// Accept `item` for storage.
    ///
    /// Requires a non-blank title and url, then a keyword hit in the title or
    /// url. Sources whose name contains one of `always_relevant_sources` skip
    /// the keyword check entirely: that allowlist is deliberate and keeps
    /// every item from those sources.
    pub fn accepts(&self, item: &CandidateItem, source_name: &str) -> bool {
        let title = item.title.trim();
        if title.is_empty() || item.url.trim().is_empty() {
            return false;
        }

        if matches_keyword(&format!("{} {}", title, item.url), &self.keywords) {
            return true;
        }

        let source = source_name.to_lowercase();
        self.always_relevant_sources
            .iter()
            .any(|name| source.contains(name.as_str()))
    }
}
