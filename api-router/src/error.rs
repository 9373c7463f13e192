use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::{AppError, ProviderErrorKind};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Missing or invalid setting '{0}'")]
    Configuration(String),

    #[error("Workspace mixes embedding models; reprocess these documents or restore the previous settings: {}", .0.join(", "))]
    IncompatibleEmbeddings(Vec<String>),

    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Upstream provider failure: {0}")]
    Upstream(String),

    #[error("Internal server error")]
    Internal(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Validation(msg) => Self::Validation(msg),
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Configuration(field) => Self::Configuration(field),
            AppError::IncompatibleEmbeddings { documents } => {
                Self::IncompatibleEmbeddings(documents)
            }
            AppError::Provider { kind, message } => match kind {
                ProviderErrorKind::Auth => Self::ProviderAuth(message),
                ProviderErrorKind::RateLimit => Self::ProviderRateLimit(message),
                ProviderErrorKind::BadRequest => Self::Validation(message),
                ProviderErrorKind::NotFound => Self::NotFound(message),
                ProviderErrorKind::Network | ProviderErrorKind::Server => Self::Upstream(message),
            },
            AppError::Generation(msg) => Self::Upstream(msg),
            other => {
                tracing::error!("Internal error: {:?}", other);
                Self::Internal(other.to_string())
            }
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Configuration(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IncompatibleEmbeddings(_) => StatusCode::CONFLICT,
            Self::ProviderAuth(_) => StatusCode::UNAUTHORIZED,
            Self::ProviderRateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// All errors serialize as `{"detail": "..."}` with the mapped status.
#[derive(Serialize, Debug)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            // Internals keep their specifics in the logs, not the wire
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn app_error_mapping() {
        assert!(matches!(
            ApiError::from(AppError::Validation("bad".into())),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::NotFound("missing".into())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::Configuration("openai_api_key".into())),
            ApiError::Configuration(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::IncompatibleEmbeddings {
                documents: vec!["a.pdf".into()]
            }),
            ApiError::IncompatibleEmbeddings(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::provider(ProviderErrorKind::Auth, "no key")),
            ApiError::ProviderAuth(_)
        ));
        assert!(matches!(
            ApiError::from(AppError::Generation("schema".into())),
            ApiError::Upstream(_)
        ));
    }

    #[test]
    fn status_codes_follow_the_error_contract() {
        assert_eq!(status_of(ApiError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::Configuration("f".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ApiError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ApiError::IncompatibleEmbeddings(vec!["a.pdf".into()])),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(ApiError::ProviderAuth("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(ApiError::ProviderRateLimit("x".into())),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status_of(ApiError::Upstream("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(ApiError::Internal("secret".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn conflict_detail_names_documents() {
        let err = ApiError::IncompatibleEmbeddings(vec!["hf-doc.pdf".into()]);
        assert!(err.to_string().contains("hf-doc.pdf"));
    }

    #[test]
    fn internal_detail_is_sanitized() {
        let err = ApiError::Internal("db password incorrect".into());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
