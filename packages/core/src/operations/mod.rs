//! Reorder Operations
//!
//! - [`ReorderExecutor`] - stateless two-phase key migration against a `MemberStore`
//! - [`ReorderCoordinator`] - optimistic client-side driver with confirm-or-resync
//! - [`ReorderError`] - what either of them can fail with

mod coordinator;
pub mod error;
mod executor;

pub use coordinator::{ReorderCoordinator, ScopeState};
pub use error::{ReorderError, ReorderPhase};
pub use executor::{KeyAssignment, ReorderExecutor, ReorderReport};
