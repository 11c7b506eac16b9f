//! Storefront E-commerce Backend
//!
//! Catalogue, shopping carts and orders behind token authentication.
//!
//! ## Features
//! - Product catalogue with privileged mutation
//! - Per-user carts priced from the live catalogue
//! - Orders with snapshot pricing and atomic item replacement
//! - Stock reservation inside single-writer transactions
//! - Owner scoping on every cart and order read

pub mod access;
pub mod config;
pub mod domain;
pub mod http;
pub mod publisher;
pub mod services;
pub mod store;

use thiserror::Error;

pub use access::{Principal, Scope};
pub use config::AppConfig;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    /// Rejected input, reported against the offending field.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// Missing resource. Rows outside the caller's scope land here too.
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("you do not have permission to perform this action")]
    Forbidden,

    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Failure inside the service itself, such as password hashing.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl EcommerceError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Config(_) | Self::Storage(_) | Self::Internal(_) | Self::Database(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
