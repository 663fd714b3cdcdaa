use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::auth::check_admin_token;
use crate::db::{Article, Database, Source, SourceKind};
use crate::enricher::ARTICLE_ACTION_PARAGRAPHS;
use crate::error::ApiError;
use crate::export::articles_to_csv;
use crate::ingest::{EnrichOutcome, Ingestor, PassOutcome, PassReport};

/// Articles shown on the index.
pub const DISPLAY_LIMIT: i64 = 300;
/// Articles returned by the JSON API.
pub const API_LIMIT: i64 = 500;

pub struct AppState {
    pub db: Arc<Database>,
    pub ingestor: Arc<Ingestor>,
    pub admin_token: Option<String>,
}

impl AppState {
    fn authorize(&self, token: Option<&str>) -> Result<(), ApiError> {
        if check_admin_token(self.admin_token.as_deref(), token) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/articles", get(api_articles))
        .route("/articles/:id", get(article))
        .route("/articles/:id/fetch_full", post(fetch_full))
        .route("/export.csv", get(export_csv))
        .route("/scrape_now", post(scrape_now))
        .route("/refresh/status", get(refresh_status))
        .route("/health", get(health))
        .route("/admin/sources", get(admin_sources).post(admin_add))
        .route("/admin/sources/toggle", post(admin_toggle))
        .route("/admin/sources/delete", post(admin_delete))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

impl SearchQuery {
    fn normalized(&self) -> String {
        self.q.trim().to_lowercase()
    }
}

#[derive(Serialize)]
pub struct IndexResponse {
    pub q: String,
    /// Comma-joined names of the enabled sources
    pub sources: String,
    pub articles: Vec<Article>,
}

pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<IndexResponse>, ApiError> {
    let q = query.normalized();
    let articles = state.db.list_recent(DISPLAY_LIMIT, Some(q.as_str())).await?;
    let sources = state
        .db
        .list_enabled_sources()
        .await?
        .into_iter()
        .map(|s| s.name)
        .collect::<Vec<_>>()
        .join(", ");

    Ok(Json(IndexResponse {
        q,
        sources,
        articles,
    }))
}

pub async fn api_articles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Article>>, ApiError> {
    let articles = state
        .db
        .list_recent(API_LIMIT, Some(query.normalized().as_str()))
        .await?;
    Ok(Json(articles))
}

pub async fn article(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
) -> Result<Json<Article>, ApiError> {
    let article = state
        .db
        .get_article(article_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(article))
}

#[derive(Serialize)]
pub struct FetchFullResponse {
    pub id: i64,
    pub updated: bool,
}

pub async fn fetch_full(
    State(state): State<Arc<AppState>>,
    Path(article_id): Path<i64>,
) -> Result<Json<FetchFullResponse>, ApiError> {
    let outcome = state
        .ingestor
        .enrich_article(article_id, ARTICLE_ACTION_PARAGRAPHS)
        .await?;

    match outcome {
        EnrichOutcome::NotFound => Err(ApiError::NotFound),
        EnrichOutcome::Updated | EnrichOutcome::NoContent => Ok(Json(FetchFullResponse {
            id: article_id,
            updated: outcome == EnrichOutcome::Updated,
        })),
    }
}

pub async fn export_csv(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let articles = state.db.list_all_articles().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment;filename=geowatch_articles.csv",
            ),
        ],
        articles_to_csv(&articles),
    ))
}

#[derive(Serialize)]
pub struct ScrapeResponse {
    pub inserted: usize,
}

pub async fn scrape_now(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    match state.ingestor.run_pass().await? {
        PassOutcome::Completed(report) => Ok(Json(ScrapeResponse {
            inserted: report.inserted,
        })),
        PassOutcome::AlreadyRunning => Err(ApiError::Conflict(
            "An ingestion pass is already running".to_string(),
        )),
    }
}

#[derive(Serialize)]
pub struct RefreshStatus {
    pub running: bool,
    pub last_pass: Option<PassReport>,
}

pub async fn refresh_status(State(state): State<Arc<AppState>>) -> Json<RefreshStatus> {
    Json(RefreshStatus {
        running: state.ingestor.is_running().await,
        last_pass: state.ingestor.last_report().await,
    })
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}

pub async fn admin_sources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Source>>, ApiError> {
    Ok(Json(state.db.list_sources().await?))
}

#[derive(Deserialize)]
pub struct AddSourceForm {
    pub token: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub url: Option<String>,
}

pub async fn admin_add(
    State(state): State<Arc<AppState>>,
    Form(form): Form<AddSourceForm>,
) -> Result<impl IntoResponse, ApiError> {
    state.authorize(form.token.as_deref())?;

    let name = form.name.as_deref().map(str::trim).unwrap_or_default();
    let url = form.url.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() || url.is_empty() {
        return Err(ApiError::BadRequest("name+url required".to_string()));
    }
    let kind = match form.kind.as_deref() {
        Some(kind) if !kind.trim().is_empty() => kind
            .parse::<SourceKind>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        _ => SourceKind::Feed,
    };

    let id = state
        .db
        .add_source(name, kind, url)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Error adding source: {}", e)))?;
    let source = state.db.get_source(id).await?.ok_or(ApiError::NotFound)?;

    Ok((StatusCode::CREATED, Json(source)))
}

#[derive(Deserialize)]
pub struct SourceIdForm {
    pub token: Option<String>,
    pub id: Option<i64>,
}

impl SourceIdForm {
    fn id(&self) -> Result<i64, ApiError> {
        self.id
            .ok_or_else(|| ApiError::BadRequest("id required".to_string()))
    }
}

#[derive(Serialize)]
pub struct ToggleResponse {
    pub id: i64,
    pub enabled: bool,
}

pub async fn admin_toggle(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SourceIdForm>,
) -> Result<Json<ToggleResponse>, ApiError> {
    state.authorize(form.token.as_deref())?;
    let id = form.id()?;

    let enabled = state
        .db
        .toggle_source(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(ToggleResponse { id, enabled }))
}

pub async fn admin_delete(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SourceIdForm>,
) -> Result<StatusCode, ApiError> {
    state.authorize(form.token.as_deref())?;
    let id = form.id()?;

    if state.db.remove_source(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}
