//! Geowatch - a keyword-filtered news collector
//!
//! Periodically fetches RSS/Atom feeds and HTML front pages, keeps the items
//! that mention configured keywords, and stores them in a URL-deduplicated
//! SQLite table served over a small JSON/CSV API.

pub mod auth;
pub mod config;
pub mod db;
pub mod enricher;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod ingest;
pub mod relevance;
pub mod routes;
pub mod scheduler;
