//! Integration tests for the geowatch news collector
//!
//! These tests exercise the full workflow from configuration loading through
//! fetching mocked sources, filtering, storage and the HTTP surface.

use std::io::Write;
use tempfile::NamedTempFile;

mod common {
    use tempfile::TempDir;

    /// Create a temporary directory for test databases
    pub fn create_temp_dir() -> TempDir {
        tempfile::tempdir().expect("Failed to create temp directory")
    }

    /// Create a test database path
    pub fn create_db_path(temp_dir: &TempDir) -> String {
        let db_path = temp_dir.path().join("test.db");
        format!("sqlite:{}?mode=rwc", db_path.display())
    }

    pub const WORLD_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>World News</title>
                <link>https://world.example.com</link>
                <description>Latest world news</description>
                <item>
                    <title>Taiwan strait tensions rise</title>
                    <link>https://world.example.com/article/1</link>
                    <description>Naval drills continue.</description>
                    <pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate>
                </item>
                <item>
                    <title>Weather: mild week ahead</title>
                    <link>https://world.example.com/article/2</link>
                    <pubDate>Mon, 09 Dec 2024 11:00:00 GMT</pubDate>
                </item>
                <item>
                    <title>Korea holds talks</title>
                    <link>https://world.example.com/article/3</link>
                    <pubDate>yesterday-ish</pubDate>
                </item>
            </channel>
        </rss>
    "#;

    pub const FRONT_PAGE: &str = r#"
        <html><body>
            <a href="/world/ukraine-aid">Aid package approved</a>
            <a href="/world/ukraine-aid">Aid package approved (dup)</a>
            <a href="/sport/football">Cup final tonight</a>
            <a href="/world/2024/nato">Alliance meets</a>
        </body></html>
    "#;
}

#[cfg(test)]
mod config_integration_tests {
    use super::*;
    use geowatch::config::Config;
    use geowatch::db::SourceKind;

    #[test]
    fn test_load_shipped_config() {
        let config = Config::load("geowatch.toml");
        assert!(config.is_ok(), "Failed to load geowatch.toml: {:?}", config.err());

        let config = config.unwrap();
        assert_eq!(config.sources.len(), 5);
        assert!(config.refresh_interval > 0);
        assert!(config.keywords.iter().all(|k| k == &k.to_lowercase()));
        assert_eq!(config.sources[4].kind, SourceKind::Html);
    }

    #[test]
    fn test_config_file_with_env_overrides() {
        let toml_content = r#"
            refresh_interval = 30
            keywords = ["taiwan"]

            [[sources]]
            name = "World"
            url = "https://world.example.com/rss"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let mut config = Config::load(temp_file.path()).unwrap();
        config
            .apply_overrides(|key| match key {
                "KEYWORDS" => Some("Korea,Iran".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.refresh_interval, 30);
        assert_eq!(config.keywords, vec!["korea", "iran"]);
        assert_eq!(config.sources[0].kind, SourceKind::Feed);
    }
}

#[cfg(test)]
mod database_integration_tests {
    use super::common::*;
    use geowatch::config::SourceConfig;
    use geowatch::db::{Database, SourceKind};
    use geowatch::fetcher::CandidateItem;

    fn item(i: usize) -> CandidateItem {
        CandidateItem {
            title: format!("Iran report {}", i),
            url: format!("https://example.com/{}", i),
            summary: String::new(),
            published: None,
        }
    }

    #[tokio::test]
    async fn test_database_persistence() {
        let temp_dir = create_temp_dir();
        let db_url = create_db_path(&temp_dir);

        {
            let db = Database::new(&db_url).await.unwrap();
            db.initialize().await.unwrap();
            db.seed_sources(&[SourceConfig {
                name: "Persistent Feed".to_string(),
                kind: SourceKind::Feed,
                url: "https://persistent.example.com/rss".to_string(),
            }])
            .await
            .unwrap();
            assert!(db.upsert_article(&item(1), "Persistent Feed").await.unwrap());
            db.close().await;
        }

        {
            let db = Database::new(&db_url).await.unwrap();
            db.initialize().await.unwrap();

            // Seeding again is a no-op because the registry is not empty.
            let seeded = db
                .seed_sources(&[SourceConfig {
                    name: "Other".to_string(),
                    kind: SourceKind::Html,
                    url: "https://other.example.com".to_string(),
                }])
                .await
                .unwrap();
            assert_eq!(seeded, 0);

            let sources = db.list_sources().await.unwrap();
            assert_eq!(sources.len(), 1);
            assert_eq!(sources[0].name, "Persistent Feed");

            assert!(!db.upsert_article(&item(1), "Persistent Feed").await.unwrap());
            assert_eq!(db.article_count().await.unwrap(), 1);
        }
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_same_url() {
        let temp_dir = create_temp_dir();
        let db_url = create_db_path(&temp_dir);

        let db = std::sync::Arc::new(Database::new(&db_url).await.unwrap());
        db.initialize().await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut inserted = 0;
                for i in 1..=10 {
                    if db.upsert_article(&item(i), "Race").await.unwrap() {
                        inserted += 1;
                    }
                }
                inserted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }

        assert_eq!(total, 10);
        assert_eq!(db.article_count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_of_distinct_urls() {
        let temp_dir = create_temp_dir();
        let db_url = create_db_path(&temp_dir);

        let db = std::sync::Arc::new(Database::new(&db_url).await.unwrap());
        db.initialize().await.unwrap();

        let mut handles = Vec::new();
        for writer in 0..8 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut inserted = 0;
                for i in 0..25 {
                    if db.upsert_article(&item(writer * 100 + i), "Race").await.unwrap() {
                        inserted += 1;
                    }
                }
                inserted
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 25);
        }
        assert_eq!(db.article_count().await.unwrap(), 200);
    }
}

#[cfg(test)]
mod end_to_end_tests {
    use super::common::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use geowatch::config::Config;
    use geowatch::db::{Database, SourceKind};
    use geowatch::ingest::{Ingestor, PassOutcome};
    use geowatch::routes::{router, AppState};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn start_sources() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/world.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WORLD_FEED))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/front"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FRONT_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/world/ukraine-aid"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><meta name="description" content="Lawmakers approved aid."></head>
                   <body><div>No paragraphs</div></body></html>"#,
            ))
            .mount(&server)
            .await;
        server
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.keywords = vec![
            "taiwan".into(),
            "korea".into(),
            "ukraine".into(),
            "nato".into(),
        ];
        config.user_agent = "GeowatchTest/1.0".into();
        config
    }

    async fn create_db(server: &MockServer) -> Arc<Database> {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db.add_source("World Wire", SourceKind::Feed, &format!("{}/world.xml", server.uri()))
            .await
            .unwrap();
        db.add_source("Front Page", SourceKind::Html, &format!("{}/front", server.uri()))
            .await
            .unwrap();
        Arc::new(db)
    }

    fn inserted(outcome: PassOutcome) -> usize {
        match outcome {
            PassOutcome::Completed(report) => report.inserted,
            PassOutcome::AlreadyRunning => panic!("pass unexpectedly refused"),
        }
    }

    #[tokio::test]
    async fn test_pass_is_idempotent() {
        let server = start_sources().await;
        let db = create_db(&server).await;
        let ingestor = Ingestor::from_config(db.clone(), &test_config()).unwrap();

        // Feed: Taiwan + Korea. Page: ukraine-aid + nato, duplicate folded.
        assert_eq!(inserted(ingestor.run_pass().await.unwrap()), 4);
        assert_eq!(inserted(ingestor.run_pass().await.unwrap()), 0);
        assert_eq!(db.article_count().await.unwrap(), 4);

        let articles = db.list_recent(10, None).await.unwrap();
        assert_eq!(articles[0].title, "Taiwan strait tensions rise");
        assert_eq!(articles[0].summary, "Naval drills continue.");
        assert!(articles
            .iter()
            .all(|a| !a.url.contains("sport") && !a.title.contains("Weather")));

        let korea = articles.iter().find(|a| a.title == "Korea holds talks").unwrap();
        assert!(korea.published.is_none());
    }

    #[tokio::test]
    async fn test_scrape_then_fetch_full_over_http() {
        let server = start_sources().await;
        let db = create_db(&server).await;
        let ingestor = Arc::new(Ingestor::from_config(db.clone(), &test_config()).unwrap());
        let app = router(Arc::new(AppState {
            db: db.clone(),
            ingestor,
            admin_token: None,
        }));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/scrape_now")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["inserted"], 4);

        let aid_url = format!("{}/world/ukraine-aid", server.uri());
        let article = db
            .list_recent(10, None)
            .await
            .unwrap()
            .into_iter()
            .find(|a| a.url == aid_url)
            .unwrap();
        assert_eq!(article.title, "Aid package approved");

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/articles/{}/fetch_full", article.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let enriched = db.get_article(article.id).await.unwrap().unwrap();
        assert_eq!(enriched.summary, "Lawmakers approved aid.");
    }

    #[tokio::test]
    async fn test_removed_source_not_fetched_next_pass() {
        let server = start_sources().await;
        let db = create_db(&server).await;
        let ingestor = Ingestor::from_config(db.clone(), &test_config()).unwrap();

        let front = db
            .list_sources()
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.kind == SourceKind::Html)
            .unwrap();
        db.remove_source(front.id).await.unwrap();

        assert_eq!(inserted(ingestor.run_pass().await.unwrap()), 2);
    }
}
