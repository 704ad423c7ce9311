//! Listshare Ordering Core
//!
//! Users own ordered collections: lists on a board, items inside a list. Each
//! collection (a *scope*) keeps a unique integer ordering key per member, and
//! the backend enforces that uniqueness on every write. This crate reorders
//! such collections without ever tripping the constraint, while keeping the
//! client view responsive.
//!
//! # Modules
//!
//! - [`models`] - `Member`, `ScopeId`, ordering helpers and invariant checks, `StreamState`
//! - [`db`] - `MemberStore` persistence contract with in-memory and SQLite backends
//! - [`operations`] - two-phase `ReorderExecutor` and optimistic `ReorderCoordinator`
//! - [`config`] - `ReorderConfig` and temp key strategies
//! - [`http`] - axum invocation boundary for the executor

pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod operations;

// Re-export commonly used types
pub use config::{ReorderConfig, TempKeyStrategy};
pub use models::*;
pub use operations::{
    KeyAssignment, ReorderCoordinator, ReorderError, ReorderExecutor, ReorderPhase, ReorderReport,
};
