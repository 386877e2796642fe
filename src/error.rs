use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::allocator::AllocationError;

/// Shared user-facing error messages.
pub mod msg {
    pub const RAFFLE_NOT_FOUND: &str = "Raffle not found";
    pub const RAFFLE_NOT_ACTIVE: &str = "Raffle is not accepting purchases";
    pub const PACKAGE_NOT_FOUND: &str = "Package not found";
    pub const CONFIRMATION_NOT_FOUND: &str = "Purchase confirmation not found";
    pub const NO_PENDING_PURCHASE: &str = "No pending purchase found";
    pub const INSTANT_PRIZE_NOT_FOUND: &str = "Instant prize not found";
    pub const INVALID_EMAIL: &str = "A valid buyer email is required";
    pub const INVALID_QUANTITY: &str = "Quantity must be greater than zero";
    pub const BUYER_NAME_REQUIRED: &str = "Buyer name is required";
    pub const DATAFAST_NOT_CONFIGURED: &str = "DataFast is not configured";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not enough numbers available: requested {requested}, available {available}")]
    InsufficientNumbers { requested: i64, available: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::InvalidQuantity => AppError::BadRequest(msg::INVALID_QUANTITY.into()),
            AllocationError::Insufficient {
                requested,
                available,
            } => AppError::InsufficientNumbers {
                requested,
                available,
            },
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::InsufficientNumbers { .. } => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match &self {
            AppError::NotFound(msg) => ("Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => ("Bad request", Some(msg.clone())),
            AppError::Conflict(msg) => ("Conflict", Some(msg.clone())),
            AppError::InsufficientNumbers { .. } => {
                ("Insufficient numbers", Some(self.to_string()))
            }
            AppError::Json(e) => ("Invalid JSON", Some(e.to_string())),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {}", msg);
                ("Payment provider error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                ("Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                ("Internal server error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Converts `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, message: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(message.to_string()))
    }
}
