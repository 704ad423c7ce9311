//! Two-phase reorder executor
//!
//! The store checks the `(scope, ordering_key)` unique index on every single
//! write, so writing target keys directly can collide with a key another
//! member of the same batch has not vacated yet. The executor avoids that:
//!
//! 1. **Displacement**: every member, in input order, moves to
//!    `temp_base + index`, a range disjoint from every live key
//! 2. **Settlement**: members sorted by target key ascending move to their
//!    real keys
//!
//! Writes are strictly sequential; each is awaited before the next is issued.
//! On the first failure the run stops and the error is returned as-is. Prior
//! writes are not undone.
//!
//! # Example
//!
//! ```rust,no_run
//! use listshare_core::db::{InMemoryMemberStore, MemberStore};
//! use listshare_core::models::ScopeId;
//! use listshare_core::operations::{KeyAssignment, ReorderExecutor};
//! use listshare_core::ReorderConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), listshare_core::operations::ReorderError> {
//! let store: Arc<dyn MemberStore> = Arc::new(InMemoryMemberStore::new());
//! let executor = ReorderExecutor::new(store, ReorderConfig::default())?;
//!
//! executor
//!     .reorder(
//!         &ScopeId::lists("user-1"),
//!         &[KeyAssignment::new("b", 1), KeyAssignment::new("a", 2)],
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ReorderConfig, TempKeyStrategy};
use crate::db::MemberStore;
use crate::models::{Member, MemberQuery, MemberUpdate, ScopeId};
use crate::operations::{ReorderError, ReorderPhase};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// One member's requested final key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAssignment {
    pub id: String,
    pub target_key: i64,
}

impl KeyAssignment {
    pub fn new(id: impl Into<String>, target_key: i64) -> Self {
        Self {
            id: id.into(),
            target_key,
        }
    }

    /// Assignments that move every member to the key it currently carries
    pub fn from_members(members: &[Member]) -> Vec<Self> {
        members
            .iter()
            .map(|m| Self::new(m.id.clone(), m.ordering_key))
            .collect()
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReorderReport {
    /// Store writes issued (twice the batch size, or 0 for an empty batch)
    pub writes: usize,
    /// Scope generation after the last write, if the store tracks one
    pub generation: Option<u64>,
}

pub struct ReorderExecutor {
    store: Arc<dyn MemberStore>,
    config: ReorderConfig,
}

impl ReorderExecutor {
    /// Fails with `ReorderError::Validation` if `config` does not pass
    /// [`ReorderConfig::validate`]
    pub fn new(store: Arc<dyn MemberStore>, config: ReorderConfig) -> Result<Self, ReorderError> {
        config.validate().map_err(ReorderError::validation)?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ReorderConfig {
        &self.config
    }

    /// Move every member in `updates` to its `target_key`
    ///
    /// Members of `scope` not named in `updates` are untouched. An empty batch
    /// succeeds without touching the store.
    pub async fn reorder(
        &self,
        scope: &ScopeId,
        updates: &[KeyAssignment],
    ) -> Result<ReorderReport, ReorderError> {
        self.reorder_checked(scope, updates, None).await
    }

    /// Like [`reorder`](Self::reorder), but first verify that the scope's
    /// generation still equals `expected_generation`
    ///
    /// The check is skipped when either side is unknown.
    pub async fn reorder_checked(
        &self,
        scope: &ScopeId,
        updates: &[KeyAssignment],
        expected_generation: Option<u64>,
    ) -> Result<ReorderReport, ReorderError> {
        if updates.is_empty() {
            return Ok(ReorderReport::default());
        }
        validate_assignments(updates)?;

        if let Some(expected) = expected_generation {
            let actual = self
                .store
                .generation(scope)
                .await
                .map_err(|e| ReorderError::read(scope.clone(), e))?;
            if let Some(actual) = actual {
                if actual != expected {
                    tracing::warn!(
                        "Refusing reorder of {}: generation moved from {} to {}",
                        scope,
                        expected,
                        actual
                    );
                    return Err(ReorderError::StaleScope {
                        scope: scope.clone(),
                        expected,
                        actual,
                    });
                }
            }
        }

        let temp_base = self.temp_base(scope, updates.len()).await?;
        tracing::debug!(
            "Reordering {} member(s) of {} via temp keys from {}",
            updates.len(),
            scope,
            temp_base
        );

        let mut writes = 0;

        for (index, assignment) in updates.iter().enumerate() {
            // temp_base was range-checked for the whole batch
            let temp_key = temp_base + index as i64;
            self.write(scope, assignment, temp_key, ReorderPhase::Displacement, writes)
                .await?;
            writes += 1;
        }

        let mut settlement: Vec<&KeyAssignment> = updates.iter().collect();
        settlement.sort_by_key(|a| a.target_key);

        for assignment in settlement {
            self.write(
                scope,
                assignment,
                assignment.target_key,
                ReorderPhase::Settlement,
                writes,
            )
            .await?;
            writes += 1;
        }

        // Every write landed; a failed read here only loses the generation
        let generation = match self.store.generation(scope).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!(
                    "Reorder of {} settled but its generation could not be read: {}",
                    scope,
                    e
                );
                None
            }
        };

        tracing::debug!("Reorder of {} settled after {} write(s)", scope, writes);
        Ok(ReorderReport { writes, generation })
    }

    async fn write(
        &self,
        scope: &ScopeId,
        assignment: &KeyAssignment,
        key: i64,
        phase: ReorderPhase,
        completed_writes: usize,
    ) -> Result<(), ReorderError> {
        tracing::trace!("{} write: '{}' -> {}", phase, assignment.id, key);

        self.store
            .update_member(scope, &assignment.id, MemberUpdate::ordering_key(key))
            .await
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(
                    "Reorder of {} stopped in {} phase after {} write(s): '{}' -> {} failed: {}",
                    scope,
                    phase,
                    completed_writes,
                    assignment.id,
                    key,
                    e
                );
                ReorderError::write(phase, completed_writes, e)
            })
    }

    /// First temp key of the batch; `base..base + count` fits in `i64`
    async fn temp_base(&self, scope: &ScopeId, count: usize) -> Result<i64, ReorderError> {
        let base = match self.config.temp_keys {
            TempKeyStrategy::AboveMax { margin } => {
                let live_max = self
                    .store
                    .list_members(scope, &MemberQuery::all())
                    .await
                    .map_err(|e| ReorderError::read(scope.clone(), e))?
                    .iter()
                    .map(|m| m.ordering_key)
                    .max()
                    .unwrap_or(0)
                    .max(0);
                live_max.checked_add(margin)
            }
            TempKeyStrategy::Jittered {
                large_constant,
                jitter_window,
                random_spread,
            } => jittered_base(large_constant, jitter_window, random_spread),
        };

        base.filter(|b| b.checked_add(count as i64).is_some())
            .ok_or_else(|| ReorderError::validation("temporary ordering keys overflow i64"))
    }
}

/// `large_constant + (now_millis mod jitter_window) + random(0..random_spread)`
fn jittered_base(large_constant: i64, jitter_window: i64, random_spread: i64) -> Option<i64> {
    let jitter = chrono::Utc::now()
        .timestamp_millis()
        .rem_euclid(jitter_window);
    let spread = rand::thread_rng().gen_range(0..random_spread);
    large_constant
        .checked_add(jitter)
        .and_then(|v| v.checked_add(spread))
}

fn validate_assignments(updates: &[KeyAssignment]) -> Result<(), ReorderError> {
    let mut ids = HashSet::with_capacity(updates.len());
    let mut keys = HashSet::with_capacity(updates.len());

    for assignment in updates {
        if !ids.insert(assignment.id.as_str()) {
            return Err(ReorderError::validation(format!(
                "member '{}' appears more than once",
                assignment.id
            )));
        }
        if !keys.insert(assignment.target_key) {
            return Err(ReorderError::validation(format!(
                "target key {} is assigned more than once",
                assignment.target_key
            )));
        }
    }

    Ok(())
}
