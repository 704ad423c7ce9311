//! Persistence Error Types
//!
//! `StoreError` is what every `MemberStore` write or read can fail with.
//! `DatabaseError` covers opening and initializing the SQLite backend.

use crate::models::ScopeId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the persistence collaborator
///
/// Cloneable so the same failure can be logged, returned and published to views.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The write's ordering key is currently held by another member of the scope
    #[error("Ordering key {ordering_key} in scope {scope} is already held by '{holder_id}'")]
    Conflict {
        scope: ScopeId,
        ordering_key: i64,
        holder_id: String,
    },

    /// No member with this id exists in the scope
    #[error("Member '{id}' not found in scope {scope}")]
    NotFound { scope: ScopeId, id: String },

    /// A member with this id already exists in the scope
    #[error("Member '{id}' already exists in scope {scope}")]
    DuplicateId { scope: ScopeId, id: String },

    /// Backend or transport failure
    #[error("Store unavailable: {0}")]
    Network(String),
}

impl StoreError {
    pub fn conflict(scope: ScopeId, ordering_key: i64, holder_id: impl Into<String>) -> Self {
        Self::Conflict {
            scope,
            ordering_key,
            holder_id: holder_id.into(),
        }
    }

    pub fn not_found(scope: ScopeId, id: impl Into<String>) -> Self {
        Self::NotFound {
            scope,
            id: id.into(),
        }
    }

    pub fn duplicate_id(scope: ScopeId, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            scope,
            id: id.into(),
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Database setup errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[cfg(feature = "sqlite")]
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),
}

impl DatabaseError {
    #[cfg(feature = "sqlite")]
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }
}
