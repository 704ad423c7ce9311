//! In-memory `MemberStore`
//!
//! Enforces the same live per-scope unique index a real backend does, and adds
//! the instrumentation tests need: a log of every attempted update, injected
//! failures on a chosen write, failing reads, and an artificial write latency.

use crate::db::{MemberStore, StoreError, StoreEvent};
use crate::models::{Member, MemberQuery, MemberUpdate, NewMember, OrderCalculator, ScopeId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Broadcast channel capacity for store events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One attempted `update_member` call, in the order it reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub id: String,
    pub ordering_key: Option<i64>,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct ScopeState {
    members: Vec<Member>,
    generation: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    scopes: HashMap<ScopeId, ScopeState>,
    writes: Vec<WriteRecord>,
    write_attempts: usize,
    /// 1-based update attempt number -> error to return instead of applying
    injected_write_failures: HashMap<usize, StoreError>,
    read_failure: Option<StoreError>,
    generation_failure: Option<StoreError>,
    write_delay: Option<Duration>,
}

pub struct InMemoryMemberStore {
    state: RwLock<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for InMemoryMemberStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(StoreState::default()),
            events,
        }
    }

    /// Subscribe to `StoreEvent`s emitted after successful writes
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Insert members with explicit keys, bypassing the write log
    ///
    /// Fails with `Conflict` if any key is already taken in `scope`.
    pub async fn seed(&self, scope: &ScopeId, members: Vec<Member>) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let scope_state = state.scopes.entry(scope.clone()).or_default();

        for mut member in members {
            if let Some(holder) = scope_state
                .members
                .iter()
                .find(|m| m.ordering_key == member.ordering_key)
            {
                return Err(StoreError::conflict(
                    scope.clone(),
                    member.ordering_key,
                    holder.id.clone(),
                ));
            }
            member.scope = scope.clone();
            scope_state.members.push(member);
            scope_state.generation += 1;
        }

        Ok(())
    }

    /// Make the `attempt`-th `update_member` call (1-based, counted across
    /// the store's lifetime) fail with `error` without applying it
    pub async fn fail_nth_write(&self, attempt: usize, error: StoreError) {
        self.state
            .write()
            .await
            .injected_write_failures
            .insert(attempt, error);
    }

    /// Fail every `list_members` and `generation` call with `error` until
    /// cleared with `None`
    pub async fn set_read_failure(&self, error: Option<StoreError>) {
        self.state.write().await.read_failure = error;
    }

    /// Fail only `generation` calls; member reads keep working
    pub async fn set_generation_failure(&self, error: Option<StoreError>) {
        self.state.write().await.generation_failure = error;
    }

    /// Delay every `update_member` call before it is applied
    pub async fn set_write_delay(&self, delay: Option<Duration>) {
        self.state.write().await.write_delay = delay;
    }

    /// Every update attempt so far, in arrival order
    pub async fn writes(&self) -> Vec<WriteRecord> {
        self.state.read().await.writes.clone()
    }

    /// Forget recorded writes (the attempt counter keeps running)
    pub async fn clear_writes(&self) {
        self.state.write().await.writes.clear();
    }

    /// Current snapshot of a scope in display order, ignoring read failures
    pub async fn snapshot(&self, scope: &ScopeId) -> Vec<Member> {
        let state = self.state.read().await;
        let mut members = state
            .scopes
            .get(scope)
            .map(|s| s.members.clone())
            .unwrap_or_default();
        OrderCalculator::sort_for_display(&mut members);
        members
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn list_members(
        &self,
        scope: &ScopeId,
        query: &MemberQuery,
    ) -> Result<Vec<Member>, StoreError> {
        let state = self.state.read().await;
        if let Some(error) = &state.read_failure {
            return Err(error.clone());
        }

        let mut members: Vec<Member> = state
            .scopes
            .get(scope)
            .map(|s| {
                s.members
                    .iter()
                    .filter(|m| query.matches(m))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        OrderCalculator::sort_for_display(&mut members);
        Ok(members)
    }

    async fn update_member(
        &self,
        scope: &ScopeId,
        id: &str,
        update: MemberUpdate,
    ) -> Result<Member, StoreError> {
        let delay = self.state.read().await.write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        state.write_attempts += 1;
        let attempt = state.write_attempts;
        let mut record = WriteRecord {
            id: id.to_string(),
            ordering_key: update.ordering_key,
            succeeded: false,
        };

        let result = apply_update(&mut state, attempt, scope, id, update);
        record.succeeded = result.is_ok();
        state.writes.push(record);
        drop(state);

        if let Ok(member) = &result {
            self.emit(StoreEvent::MemberUpdated(member.clone()));
        }
        result
    }

    async fn create_member(
        &self,
        scope: &ScopeId,
        member: NewMember,
    ) -> Result<Member, StoreError> {
        let mut state = self.state.write().await;
        let scope_state = state.scopes.entry(scope.clone()).or_default();

        let id = member.resolve_id();
        if scope_state.members.iter().any(|m| m.id == id) {
            return Err(StoreError::duplicate_id(scope.clone(), id));
        }

        let keys: Vec<i64> = scope_state.members.iter().map(|m| m.ordering_key).collect();
        let created = Member::new(id, scope.clone(), OrderCalculator::next_key(&keys), member.title);
        scope_state.members.push(created.clone());
        scope_state.generation += 1;
        drop(state);

        self.emit(StoreEvent::MemberCreated(created.clone()));
        Ok(created)
    }

    async fn generation(&self, scope: &ScopeId) -> Result<Option<u64>, StoreError> {
        let state = self.state.read().await;
        if let Some(error) = state.generation_failure.as_ref().or(state.read_failure.as_ref()) {
            return Err(error.clone());
        }
        Ok(Some(state.scopes.get(scope).map_or(0, |s| s.generation)))
    }
}

fn apply_update(
    state: &mut StoreState,
    attempt: usize,
    scope: &ScopeId,
    id: &str,
    update: MemberUpdate,
) -> Result<Member, StoreError> {
    if let Some(error) = state.injected_write_failures.remove(&attempt) {
        return Err(error);
    }

    let scope_state = state
        .scopes
        .get_mut(scope)
        .ok_or_else(|| StoreError::not_found(scope.clone(), id))?;

    let index = scope_state
        .members
        .iter()
        .position(|m| m.id == id)
        .ok_or_else(|| StoreError::not_found(scope.clone(), id))?;

    if let Some(key) = update.ordering_key {
        if let Some(holder) = scope_state
            .members
            .iter()
            .find(|m| m.ordering_key == key && m.id != id)
        {
            return Err(StoreError::conflict(scope.clone(), key, holder.id.clone()));
        }
    }

    let member = &mut scope_state.members[index];
    if let Some(key) = update.ordering_key {
        member.ordering_key = key;
    }
    if let Some(title) = update.title {
        member.title = title;
    }
    let updated = member.clone();
    scope_state.generation += 1;
    Ok(updated)
}
