use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Failure while fetching or parsing a remote resource.
///
/// Fetchers never hand these to the ingestion pass; they are logged and the
/// source yields no items.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("feed parse failed: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error("Invalid admin token")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(err) => {
                tracing::error!("Request failed: {:#}", err);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                    .into_response();
            }
        };
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRequest("name+url required".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("busy".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_error_body_is_generic() {
        use http_body_util::BodyExt;

        let response =
            ApiError::from(anyhow::anyhow!("no such table: articles")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"Internal server error");
    }

    #[test]
    fn test_invalid_url_message() {
        let err = FetchError::from(url::Url::parse("not a url").unwrap_err());
        assert!(err.to_string().starts_with("invalid url"));
    }
}
