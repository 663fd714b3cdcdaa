use serde::Deserialize;
use std::path::Path;

use crate::db::SourceKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Shared secret for admin actions. Admin actions are disabled when unset.
    #[serde(default)]
    pub admin_token: Option<String>,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Sources whose items are stored even without a keyword hit
    #[serde(default = "default_always_relevant_sources")]
    pub always_relevant_sources: Vec<String>,
    /// Seed list, only applied when the registry is empty
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_database_url() -> String {
    "sqlite:geowatch.db?mode=rwc".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_user_agent() -> String {
    "Geowatch/1.0 (+https://example.com)".to_string()
}

fn default_keywords() -> Vec<String> {
    [
        "russia",
        "ukraine",
        "china",
        "taiwan",
        "nato",
        "israel",
        "palestine",
        "iran",
        "afghanistan",
        "india",
        "modi",
        "us",
        "united states",
        "syrian",
        "korea",
        "vladimir",
        "zelensky",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect()
}

fn default_always_relevant_sources() -> Vec<String> {
    vec!["al jazeera".to_string()]
}

fn default_sources() -> Vec<SourceConfig> {
    let seed = [
        ("Al Jazeera", SourceKind::Feed, "https://www.aljazeera.com/xml/rss/all.xml"),
        ("BBC World", SourceKind::Feed, "http://feeds.bbci.co.uk/news/world/rss.xml"),
        ("Reuters World", SourceKind::Feed, "http://feeds.reuters.com/Reuters/worldNews"),
        (
            "NYTimes World",
            SourceKind::Feed,
            "https://rss.nytimes.com/services/xml/rss/nyt/World.xml",
        ),
        (
            "The Guardian World (html)",
            SourceKind::Html,
            "https://www.theguardian.com/world",
        ),
    ];
    seed.into_iter()
        .map(|(name, kind, url)| SourceConfig {
            name: name.to_string(),
            kind,
            url: url.to_string(),
        })
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub kind: SourceKind,
    pub url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: default_refresh_interval(),
            database_url: default_database_url(),
            listen_addr: default_listen_addr(),
            user_agent: default_user_agent(),
            admin_token: None,
            keywords: default_keywords(),
            always_relevant_sources: default_always_relevant_sources(),
            sources: default_sources(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.normalize();
        Ok(config)
    }

    /// Load the config file if it exists, otherwise start from the defaults,
    /// then apply process environment overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment-style overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(agent) = lookup("USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(minutes) = lookup("SCRAPE_INTERVAL_MINUTES") {
            self.refresh_interval = minutes.trim().parse().map_err(|e| {
                anyhow::anyhow!("invalid SCRAPE_INTERVAL_MINUTES {:?}: {}", minutes, e)
            })?;
        }
        if let Some(token) = lookup("ADMIN_TOKEN") {
            self.admin_token = Some(token);
        }
        if let Some(keywords) = lookup("KEYWORDS") {
            self.keywords = keywords.split(',').map(str::to_string).collect();
        }
        if let Some(addr) = lookup("LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        self.normalize();
        Ok(())
    }

    fn normalize(&mut self) {
        self.keywords = self
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self.always_relevant_sources = self
            .always_relevant_sources
            .iter()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        if self.admin_token.as_deref().is_some_and(str::is_empty) {
            self.admin_token = None;
        }
    }
}
