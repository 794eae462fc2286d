//! Failure taxonomy for tenant and identity resolution.

use std::fmt;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

/// Broad class of a resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Store not ready. Retry after a delay.
    Unavailable,
    /// Missing or invalid credential, or inactive account.
    Unauthenticated,
    /// Tenant/theme ownership mismatch or no tenant assigned.
    Unauthorized,
    /// The requested tenant or theme does not resolve.
    NotFound,
    /// Unexpected collaborator failure.
    Internal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Errors that stop a request before it reaches downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Store connection or schema setup still in progress
    StoreInitializing,
    /// Store startup failed
    StoreUnavailable,
    /// No API key and no tenant id were supplied
    MissingAuth,
    /// Key matched neither a tenant API key nor an active access key
    InvalidApiKey,
    /// Access key owner is deactivated
    UserInactive,
    /// Tenant id candidate is not in the directory
    TenantNotFound,
    /// No tenant is bound to the requested theme
    ThemeNotFound,
    /// User's tenant is not bound to the requested theme
    TenantThemeMismatch,
    /// User has no tenant to act on
    NoTenantAssociated,
    /// Anything else. The message is logged, never returned to the caller.
    Internal(String),
}

impl ResolutionError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::StoreInitializing | Self::StoreUnavailable => ErrorClass::Unavailable,
            Self::MissingAuth | Self::InvalidApiKey | Self::UserInactive => {
                ErrorClass::Unauthenticated
            }
            Self::TenantThemeMismatch | Self::NoTenantAssociated => ErrorClass::Unauthorized,
            Self::TenantNotFound | Self::ThemeNotFound => ErrorClass::NotFound,
            Self::Internal(_) => ErrorClass::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.class() {
            ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorClass::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorClass::Unauthorized => StatusCode::FORBIDDEN,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code carried in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreInitializing => "STORE_INITIALIZING",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::MissingAuth => "MISSING_AUTH",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::UserInactive => "USER_INACTIVE",
            Self::TenantNotFound => "TENANT_NOT_FOUND",
            Self::ThemeNotFound => "THEME_NOT_FOUND",
            Self::TenantThemeMismatch => "TENANT_THEME_MISMATCH",
            Self::NoTenantAssociated => "NO_TENANT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Classify a store or collaborator failure.
    ///
    /// Missing-table and not-yet-connected errors only happen while startup is
    /// still applying the schema, so they surface as `StoreInitializing`.
    pub fn from_store(err: &anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        let lowered = message.to_lowercase();
        if lowered.contains("does not exist")
            || lowered.contains("connection uninitialised")
            || lowered.contains("connection uninitialized")
        {
            Self::StoreInitializing
        } else {
            Self::Internal(message)
        }
    }
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StoreInitializing => write!(f, "Service is initializing, please retry shortly"),
            Self::StoreUnavailable => write!(f, "Service unavailable: data store failed to start"),
            Self::MissingAuth => write!(f, "API key or tenant id is required"),
            Self::InvalidApiKey => write!(f, "Invalid or unknown API key"),
            Self::UserInactive => write!(f, "User account is inactive"),
            Self::TenantNotFound => write!(f, "Tenant not found"),
            Self::ThemeNotFound => write!(f, "No tenant is bound to this theme"),
            Self::TenantThemeMismatch => write!(f, "Tenant does not have access to this theme"),
            Self::NoTenantAssociated => write!(f, "No tenant associated with this user"),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ResolutionError {}

impl IntoResponse for ResolutionError {
    fn into_response(self) -> Response {
        if let Self::Internal(msg) = &self {
            error!(error = %msg, "tenant resolution failed");
        }

        let body = json!({
            "success": false,
            "error": self.public_message(),
            "code": self.code(),
        });
        (self.status(), Json(body)).into_response()
    }
}
