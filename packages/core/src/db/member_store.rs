//! MemberStore Trait - Persistence Abstraction
//!
//! The reorder core never talks to a database directly. It relies on this
//! contract: list and update rows scoped to one collection, filtered by
//! equality predicates, with a live unique index on `(scope, ordering_key)`.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded (SQLite) and remote
//!    backends share one interface
//! 2. **Per-write constraint**: `update_member` must reject a key held by
//!    another member of the same scope *at the time of the write*
//! 3. **Generations are optional**: backends that can't count writes per scope
//!    keep the default `generation` and the staleness check is skipped
//!
//! # Examples
//!
//! ```rust,no_run
//! use listshare_core::db::{InMemoryMemberStore, MemberStore};
//! use listshare_core::models::{MemberQuery, NewMember, ScopeId};
//!
//! # async fn example() -> Result<(), listshare_core::db::StoreError> {
//! let store = InMemoryMemberStore::new();
//! let scope = ScopeId::lists("user-1");
//!
//! store.create_member(&scope, NewMember::titled("Groceries")).await?;
//! let lists = store.list_members(&scope, &MemberQuery::all()).await?;
//! assert_eq!(lists[0].ordering_key, 1);
//! # Ok(())
//! # }
//! ```

use crate::db::StoreError;
use crate::models::{Member, MemberQuery, MemberUpdate, NewMember, ScopeId};
use async_trait::async_trait;

/// Abstraction layer for member persistence
///
/// Implementations must be `Send + Sync` so executors and coordinators can
/// share them across tasks.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// List members of `scope` matching `query`, ascending by ordering key
    async fn list_members(
        &self,
        scope: &ScopeId,
        query: &MemberQuery,
    ) -> Result<Vec<Member>, StoreError>;

    /// Apply a sparse update to one member
    ///
    /// # Errors
    ///
    /// - `StoreError::Conflict` if `update.ordering_key` is held by another member of `scope`
    /// - `StoreError::NotFound` if `id` is not a member of `scope`
    /// - `StoreError::Network` on backend failure
    async fn update_member(
        &self,
        scope: &ScopeId,
        id: &str,
        update: MemberUpdate,
    ) -> Result<Member, StoreError>;

    /// Append a new member to the end of `scope`
    ///
    /// Fails with `StoreError::DuplicateId` if the id is already taken in `scope`.
    async fn create_member(&self, scope: &ScopeId, member: NewMember)
        -> Result<Member, StoreError>;

    /// Per-scope write counter, bumped by every successful write
    ///
    /// `Ok(None)` means the backend does not track generations.
    async fn generation(&self, _scope: &ScopeId) -> Result<Option<u64>, StoreError> {
        Ok(None)
    }
}
