use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Transport-level failure classes shared by every provider adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Auth,
    RateLimit,
    Network,
    Server,
    BadRequest,
    NotFound,
}

impl ProviderErrorKind {
    /// Only rate limits, network failures and 5xx responses are worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Server)
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Network => "network",
            Self::Server => "server",
            Self::BadRequest => "bad_request",
            Self::NotFound => "not_found",
        };
        write!(f, "{label}")
    }
}

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: missing or invalid setting '{0}'")]
    Configuration(String),
    #[error("Incompatible embeddings for documents: {}", documents.join(", "))]
    IncompatibleEmbeddings { documents: Vec<String> },
    #[error("Generation error: {0}")]
    Generation(String),
    #[error("Ingestion processing error: {0}")]
    Processing(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Whether a retry at the adapter level may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { kind, .. } if kind.is_retryable())
    }
}

/// Maps async-openai transport failures onto the provider taxonomy.
impl From<OpenAIError> for AppError {
    fn from(err: OpenAIError) -> Self {
        match &err {
            OpenAIError::ApiError(api) => {
                let code = api.code.as_deref().unwrap_or_default();
                let kind = match code {
                    "invalid_api_key" | "invalid_organization" => ProviderErrorKind::Auth,
                    "rate_limit_exceeded" | "insufficient_quota" => ProviderErrorKind::RateLimit,
                    "model_not_found" => ProviderErrorKind::NotFound,
                    _ => match api.r#type.as_deref() {
                        Some("invalid_request_error") => ProviderErrorKind::BadRequest,
                        Some("authentication_error") => ProviderErrorKind::Auth,
                        Some("rate_limit_error") => ProviderErrorKind::RateLimit,
                        _ => ProviderErrorKind::Server,
                    },
                };
                Self::provider(kind, api.message.clone())
            }
            OpenAIError::Reqwest(_) | OpenAIError::StreamError(_) => {
                Self::provider(ProviderErrorKind::Network, err.to_string())
            }
            OpenAIError::JSONDeserialize(_) => {
                Self::provider(ProviderErrorKind::Server, err.to_string())
            }
            _ => Self::provider(ProviderErrorKind::BadRequest, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ProviderErrorKind::RateLimit.is_retryable());
        assert!(ProviderErrorKind::Network.is_retryable());
        assert!(ProviderErrorKind::Server.is_retryable());
        assert!(!ProviderErrorKind::Auth.is_retryable());
        assert!(!ProviderErrorKind::BadRequest.is_retryable());
        assert!(!ProviderErrorKind::NotFound.is_retryable());
    }

    #[test]
    fn provider_error_display_includes_kind() {
        let err = AppError::provider(ProviderErrorKind::RateLimit, "slow down");
        assert_eq!(err.to_string(), "Provider error (rate_limit): slow down");
        assert!(err.is_retryable());
    }

    #[test]
    fn incompatible_embeddings_lists_documents() {
        let err = AppError::IncompatibleEmbeddings {
            documents: vec!["notes.pdf".into(), "slides.pptx".into()],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("notes.pdf"));
        assert!(rendered.contains("slides.pptx"));
        assert!(!err.is_retryable());
    }
}
