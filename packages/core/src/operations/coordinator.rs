//! Optimistic reorder coordinator
//!
//! Client-side driver for one view of one scope. A drag-and-drop gesture is
//! applied to the published state immediately; the remote two-phase run
//! follows in the background and the view either stays as it is (success) or
//! is replaced by a fresh authoritative read (failure).
//!
//! # Queueing
//!
//! At most one executor run is in flight per coordinator. A gesture arriving
//! mid-flight is queued behind it; a newer gesture replaces a queued one that
//! has not started, so the last intent wins. After a failed run every queued
//! gesture is dropped, since it was computed from the discarded optimistic
//! order.
//!
//! # Observing
//!
//! The view is a `StreamState<Vec<Member>>` published on a `tokio::sync::watch`
//! channel: [`subscribe`](ReorderCoordinator::subscribe) for a receiver,
//! [`states`](ReorderCoordinator::states) for a `Stream`.

use crate::config::ReorderConfig;
use crate::db::MemberStore;
use crate::models::{Member, MemberQuery, OrderCalculator, ScopeId, StreamState};
use crate::operations::{KeyAssignment, ReorderError, ReorderExecutor};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

pub type ScopeState = StreamState<Vec<Member>>;

struct ReorderJob {
    updates: Vec<KeyAssignment>,
}

#[derive(Default)]
struct Slot {
    running: bool,
    queued: Option<ReorderJob>,
    /// What the view currently shows (optimistic or authoritative)
    displayed: Vec<Member>,
    /// Scope generation as of the last authoritative read or own successful run
    generation: Option<u64>,
    /// Bumped by every gesture; a read that started under an older value is stale
    epoch: u64,
    /// `refresh` was asked for while a run was in flight
    refresh_owed: bool,
}

struct Inner {
    scope: ScopeId,
    store: Arc<dyn MemberStore>,
    executor: ReorderExecutor,
    check_generation: bool,
    slot: Mutex<Slot>,
    state: watch::Sender<ScopeState>,
    busy: watch::Sender<bool>,
}

impl Inner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: ScopeState) {
        self.state.send_replace(state);
    }

    /// Generation first, then members: a write landing in between makes the
    /// next run fail as stale instead of silently passing.
    async fn fetch(&self) -> Result<(Vec<Member>, Option<u64>), ReorderError> {
        let generation = self
            .store
            .generation(&self.scope)
            .await
            .map_err(|e| ReorderError::read(self.scope.clone(), e))?;
        let members = self
            .store
            .list_members(&self.scope, &MemberQuery::all())
            .await
            .map_err(|e| ReorderError::read(self.scope.clone(), e))?;
        Ok((members, generation))
    }
}

/// Per-scope optimistic reorder driver
///
/// Cheap to clone; clones share the same view and queue.
#[derive(Clone)]
pub struct ReorderCoordinator {
    inner: Arc<Inner>,
}

impl ReorderCoordinator {
    /// Fails with `ReorderError::Validation` on an invalid `config`
    pub fn new(
        store: Arc<dyn MemberStore>,
        scope: ScopeId,
        config: ReorderConfig,
    ) -> Result<Self, ReorderError> {
        let check_generation = config.check_generation;
        let executor = ReorderExecutor::new(store.clone(), config)?;
        let (state, _) = watch::channel(ScopeState::default());
        let (busy, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                scope,
                store,
                executor,
                check_generation,
                slot: Mutex::new(Slot::default()),
                state,
                busy,
            }),
        })
    }

    pub fn scope(&self) -> &ScopeId {
        &self.inner.scope
    }

    /// Snapshot of the published state
    pub fn current(&self) -> ScopeState {
        self.inner.state.borrow().clone()
    }

    /// Members currently displayed (optimistic or authoritative)
    pub fn displayed(&self) -> Vec<Member> {
        self.inner.slot().displayed.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ScopeState> {
        self.inner.state.subscribe()
    }

    pub fn states(&self) -> WatchStream<ScopeState> {
        WatchStream::new(self.subscribe())
    }

    /// Initial authoritative read of the scope
    pub async fn load(&self) -> Result<Vec<Member>, ReorderError> {
        self.refresh().await
    }

    /// Replace the view with a fresh authoritative read
    ///
    /// On failure the view becomes `StreamState::Error` with no data.
    ///
    /// While a run is in flight the view is left alone: the store may hold
    /// members on temporary keys, so the re-read happens once the run
    /// settles. The returned members are the raw read either way.
    pub async fn refresh(&self) -> Result<Vec<Member>, ReorderError> {
        let (epoch, started_mid_run) = {
            let mut slot = self.inner.slot();
            if slot.running {
                slot.refresh_owed = true;
            } else {
                let shown = (!slot.displayed.is_empty()).then(|| slot.displayed.clone());
                self.inner.publish(StreamState::Pending(shown));
            }
            (slot.epoch, slot.running)
        };

        let fetched = self.inner.fetch().await;

        let mut slot = self.inner.slot();
        if started_mid_run || slot.running || slot.epoch != epoch {
            // The read may have seen temp keys; the run re-reads once it settles
            slot.refresh_owed = slot.running;
            tracing::debug!(
                "Deferred refresh of {} until the in-flight reorder settles",
                self.inner.scope
            );
            return fetched.map(|(members, _)| members);
        }

        match fetched {
            Ok((members, generation)) => {
                slot.displayed = members.clone();
                slot.generation = generation;
                self.inner.publish(StreamState::Success(members.clone()));
                Ok(members)
            }
            Err(error) => {
                slot.displayed.clear();
                drop(slot);
                tracing::warn!("Failed to load {}: {}", self.inner.scope, error);
                self.inner.publish(StreamState::Error {
                    error: Arc::new(error.clone()),
                    data: None,
                });
                Err(error)
            }
        }
    }

    /// Apply a drag-and-drop move of `current_order[from]` to position `to`
    ///
    /// The reordered list, renumbered 1..=N, is published as
    /// `StreamState::Pending` before this returns; the remote run happens on
    /// a spawned task, so this must be called from within a tokio runtime.
    ///
    /// Out-of-range indices return `ReorderError::Validation` and change nothing.
    pub fn handle_reorder(
        &self,
        current_order: &[Member],
        from: usize,
        to: usize,
    ) -> Result<(), ReorderError> {
        let moved = OrderCalculator::move_element(current_order, from, to).ok_or_else(|| {
            ReorderError::validation(format!(
                "cannot move index {} to {} in a list of {}",
                from,
                to,
                current_order.len()
            ))
        })?;
        let reordered = OrderCalculator::assign_dense_keys(moved);
        let job = ReorderJob {
            updates: KeyAssignment::from_members(&reordered),
        };

        let mut slot = self.inner.slot();
        slot.epoch += 1;
        slot.displayed = reordered.clone();
        self.inner.publish(StreamState::Pending(Some(reordered)));

        if slot.running {
            if slot.queued.replace(job).is_some() {
                tracing::debug!(
                    "Superseded a queued reorder of {} before it started",
                    self.inner.scope
                );
            }
            return Ok(());
        }

        slot.running = true;
        self.inner.busy.send_replace(true);
        drop(slot);

        tokio::spawn(drive(self.inner.clone(), job));
        Ok(())
    }

    /// Wait until no run is in flight and none is queued
    pub async fn idle(&self) {
        let mut busy = self.inner.busy.subscribe();
        // The sender lives in `inner`, which we hold, so this can't close
        let _ = busy.wait_for(|busy| !*busy).await;
    }
}

async fn drive(inner: Arc<Inner>, mut job: ReorderJob) {
    loop {
        let expected = if inner.check_generation {
            inner.slot().generation
        } else {
            None
        };

        match inner
            .executor
            .reorder_checked(&inner.scope, &job.updates, expected)
            .await
        {
            Ok(report) => {
                let refresh_owed = {
                    let mut slot = inner.slot();
                    if report.generation.is_some() {
                        slot.generation = report.generation;
                    }
                    if let Some(next) = slot.queued.take() {
                        job = next;
                        continue;
                    }
                    std::mem::take(&mut slot.refresh_owed)
                };

                if refresh_owed {
                    match inner.fetch().await {
                        Ok((members, generation)) => {
                            let mut slot = inner.slot();
                            if let Some(next) = slot.queued.take() {
                                job = next;
                                continue;
                            }
                            slot.displayed = members;
                            slot.generation = generation;
                        }
                        Err(error) => {
                            tracing::warn!(
                                "Refresh of {} after reorder failed: {}",
                                inner.scope,
                                error
                            );
                            resync(&inner, error).await;
                            return;
                        }
                    }
                }

                let mut slot = inner.slot();
                if let Some(next) = slot.queued.take() {
                    job = next;
                    continue;
                }
                slot.running = false;
                inner.publish(StreamState::Success(slot.displayed.clone()));
                inner.busy.send_replace(false);
                return;
            }
            Err(error) => {
                tracing::warn!("Reorder of {} failed, resyncing: {}", inner.scope, error);
                resync(&inner, error).await;
                return;
            }
        }
    }
}

/// Discard the optimistic state and show what the store actually holds
async fn resync(inner: &Inner, error: ReorderError) {
    let error = Arc::new(error);
    let refreshed = inner.fetch().await;

    let mut slot = inner.slot();
    slot.refresh_owed = false;
    if slot.queued.take().is_some() {
        tracing::debug!(
            "Dropped queued reorder of {} computed from a failed optimistic order",
            inner.scope
        );
    }

    match refreshed {
        Ok((members, generation)) => {
            slot.displayed = members.clone();
            slot.generation = generation;
            inner.publish(StreamState::Error {
                error,
                data: Some(members),
            });
        }
        Err(refetch_error) => {
            tracing::warn!(
                "Resync of {} after failed reorder also failed: {}",
                inner.scope,
                refetch_error
            );
            slot.displayed.clear();
            slot.generation = None;
            inner.publish(StreamState::Error { error, data: None });
        }
    }

    slot.running = false;
    inner.busy.send_replace(false);
}
