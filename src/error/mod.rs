use std::backtrace::Backtrace;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::continuation::ContinuationError;
use crate::lease::LeaseError;
use crate::registry::RegistryError;
use crate::router::RouterError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),

    #[error("Continuation error: {0}")]
    Continuation(#[from] ContinuationError),

    /// Malformed event or unrecognized routing combination. Fatal for the
    /// invocation that carried it.
    #[error("Protocol error: {message}")]
    Protocol { message: String, stack: String },

    /// A panic intercepted at the work-task boundary.
    #[error("Invocation panicked: {detail}")]
    Panic { detail: String, stack: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            stack: Backtrace::force_capture().to_string(),
        }
    }

    /// Convert a joined background task's failure into a structured error.
    pub fn from_join_error(err: tokio::task::JoinError) -> Self {
        let detail = match err.try_into_panic() {
            Ok(payload) => {
                if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "non-string panic payload".to_string()
                }
            }
            Err(join_err) => format!("work task aborted: {}", join_err),
        };
        Self::Panic {
            detail,
            stack: Backtrace::force_capture().to_string(),
        }
    }
}

impl From<RouterError> for AppError {
    fn from(err: RouterError) -> Self {
        match err {
            RouterError::Malformed(e) => Self::protocol(format!("malformed event: {}", e)),
            RouterError::Unrecognized(detail) => {
                Self::protocol(format!("unrecognized event: {}", detail))
            }
            RouterError::Registry(e) => Self::Registry(e),
            RouterError::Continuation(e) => Self::Continuation(e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let production = is_production();
        let (status, code, client_message, stack) = match &self {
            AppError::Config(e) => {
                let msg = if production {
                    "Configuration error".to_string()
                } else {
                    e.to_string()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", msg, None)
            }
            AppError::Registry(e) => {
                let msg = if production {
                    "Registry store unavailable".to_string()
                } else {
                    e.to_string()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "REGISTRY_ERROR", msg, None)
            }
            AppError::Lease(e) => {
                let msg = if production {
                    "Lease store unavailable".to_string()
                } else {
                    e.to_string()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "LEASE_ERROR", msg, None)
            }
            AppError::Continuation(e) => {
                let msg = if production {
                    "Continuation dispatch failed".to_string()
                } else {
                    e.to_string()
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONTINUATION_ERROR",
                    msg,
                    None,
                )
            }
            AppError::Protocol { message, stack } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROTOCOL_ERROR",
                message.clone(),
                (!production).then(|| stack.clone()),
            ),
            AppError::Panic { detail, stack } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PANIC",
                detail.clone(),
                (!production).then(|| stack.clone()),
            ),
            AppError::Internal(msg) => {
                let client = if production {
                    "Internal server error".to_string()
                } else {
                    msg.clone()
                };
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client, None)
            }
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %self,
            "Invocation error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
                stack,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
