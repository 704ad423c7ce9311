//! Reorder Scenario Tests
//!
//! End-to-end behavior of the executor and the coordinator against the
//! instrumented in-memory store: write ordering, partial failure, resync and
//! the optimistic view.

#[cfg(test)]
mod reorder_scenario_tests {
    use anyhow::Result;
    use listshare_core::db::{InMemoryMemberStore, MemberStore, StoreError};
    use listshare_core::models::{
        is_valid_ordering, preserves_membership, Member, MemberQuery, NewMember, ScopeId,
        StreamState,
    };
    use listshare_core::operations::{
        KeyAssignment, ReorderCoordinator, ReorderError, ReorderExecutor, ReorderPhase,
    };
    use listshare_core::{ReorderConfig, TempKeyStrategy};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn scope() -> ScopeId {
        ScopeId::lists("user-1")
    }

    /// Scope with A(1), B(2), C(3)
    async fn abc_store() -> Result<Arc<InMemoryMemberStore>> {
        let store = Arc::new(InMemoryMemberStore::new());
        store
            .seed(
                &scope(),
                vec![
                    Member::new("A", scope(), 1, "Groceries"),
                    Member::new("B", scope(), 2, "Hardware"),
                    Member::new("C", scope(), 3, "Gifts"),
                ],
            )
            .await?;
        Ok(store)
    }

    fn keys(members: &[Member]) -> Vec<(String, i64)> {
        members
            .iter()
            .map(|m| (m.id.clone(), m.ordering_key))
            .collect()
    }

    fn coordinator(store: &Arc<InMemoryMemberStore>, config: ReorderConfig) -> ReorderCoordinator {
        ReorderCoordinator::new(store.clone(), scope(), config).expect("valid config")
    }

    #[tokio::test]
    async fn test_empty_reorder_issues_no_writes() -> Result<()> {
        let store = abc_store().await?;
        let executor = ReorderExecutor::new(store.clone(), ReorderConfig::default())?;

        let report = executor.reorder(&scope(), &[]).await?;

        assert_eq!(report.writes, 0);
        assert!(store.writes().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_move_first_to_last_write_sequence() -> Result<()> {
        let store = abc_store().await?;
        let executor = ReorderExecutor::new(store.clone(), ReorderConfig::default())?;
        let before = store.snapshot(&scope()).await;

        executor
            .reorder(
                &scope(),
                &[
                    KeyAssignment::new("B", 1),
                    KeyAssignment::new("C", 2),
                    KeyAssignment::new("A", 3),
                ],
            )
            .await?;

        let writes = store.writes().await;
        assert_eq!(writes.len(), 6);
        assert!(writes.iter().all(|w| w.succeeded));

        // Every member parks on a temp key before any final key is written
        for write in &writes[..3] {
            assert!(write.ordering_key.unwrap() >= 1000);
        }
        let finals: Vec<(&str, i64)> = writes[3..]
            .iter()
            .map(|w| (w.id.as_str(), w.ordering_key.unwrap()))
            .collect();
        assert_eq!(finals, vec![("B", 1), ("C", 2), ("A", 3)]);

        let after = store.snapshot(&scope()).await;
        assert!(is_valid_ordering(&before));
        assert!(is_valid_ordering(&after));
        assert!(preserves_membership(&before, &after));
        assert_eq!(
            keys(&after),
            vec![("B".to_string(), 1), ("C".to_string(), 2), ("A".to_string(), 3)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_move_last_to_first_phase_ordering() -> Result<()> {
        let store = abc_store().await?;
        let executor = ReorderExecutor::new(store.clone(), ReorderConfig::default())?;

        executor
            .reorder(
                &scope(),
                &[
                    KeyAssignment::new("C", 1),
                    KeyAssignment::new("A", 2),
                    KeyAssignment::new("B", 3),
                ],
            )
            .await?;

        let writes = store.writes().await;
        let first_final = writes
            .iter()
            .position(|w| matches!(w.ordering_key, Some(1..=3)))
            .expect("final writes happened");
        let last_temp = writes
            .iter()
            .rposition(|w| w.ordering_key.unwrap() >= 1000)
            .expect("temp writes happened");

        assert_eq!(last_temp, 2);
        assert_eq!(first_final, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_settlement_write_stops_run() -> Result<()> {
        let store = abc_store().await?;
        // A, B, C to temp, B -> 1, then C -> 2 fails
        store
            .fail_nth_write(5, StoreError::network("connection reset"))
            .await;
        let executor = ReorderExecutor::new(store.clone(), ReorderConfig::default())?;

        let err = executor
            .reorder(
                &scope(),
                &[
                    KeyAssignment::new("B", 1),
                    KeyAssignment::new("C", 2),
                    KeyAssignment::new("A", 3),
                ],
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReorderError::WriteFailed {
                phase: ReorderPhase::Settlement,
                completed_writes: 4,
                ..
            }
        ));
        assert!(err.is_partial());

        let writes = store.writes().await;
        assert_eq!(writes.len(), 5, "no write after the failed one");
        assert_eq!(writes.iter().filter(|w| w.succeeded).count(), 4);

        // Mixed state: B settled, A and C still parked, still no duplicates
        let after = store.snapshot(&scope()).await;
        assert!(is_valid_ordering(&after));
        assert_eq!(after[0].id, "B");
        assert_eq!(after[0].ordering_key, 1);
        assert!(after[1..].iter().all(|m| m.ordering_key >= 1000));
        Ok(())
    }

    #[tokio::test]
    async fn test_optimistic_order_never_reverts_on_success() -> Result<()> {
        let store = abc_store().await?;
        store.set_write_delay(Some(Duration::from_millis(5))).await;
        let coordinator = coordinator(&store, ReorderConfig::default());
        let current = coordinator.load().await?;

        // A fresh receiver starts with the loaded state marked as seen
        let mut rx = coordinator.subscribe();
        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                let done = state.is_success();
                seen.push(state);
                if done {
                    break;
                }
            }
            seen
        });

        coordinator.handle_reorder(&current, 0, 2)?;
        coordinator.idle().await;

        let seen = timeout(Duration::from_secs(2), observer).await??;
        let expected = vec![("B".to_string(), 1), ("C".to_string(), 2), ("A".to_string(), 3)];
        assert!(!seen.is_empty());
        for state in &seen {
            assert!(!state.is_error());
            assert_eq!(keys(state.data().expect("data shown")), expected);
        }
        assert!(seen.last().map_or(false, |s| s.is_success()));
        assert_eq!(keys(&store.snapshot(&scope()).await), expected);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_resyncs_to_authoritative_order() -> Result<()> {
        let store = abc_store().await?;
        let coordinator = coordinator(&store, ReorderConfig::default());
        let current = coordinator.load().await?;
        store
            .fail_nth_write(5, StoreError::network("connection reset"))
            .await;

        coordinator.handle_reorder(&current, 0, 2)?;
        coordinator.idle().await;

        let state = coordinator.current();
        let authoritative = store.snapshot(&scope()).await;
        match &state {
            StreamState::Error { error, data } => {
                assert!(matches!(
                    error.as_ref(),
                    ReorderError::WriteFailed {
                        phase: ReorderPhase::Settlement,
                        ..
                    }
                ));
                assert_eq!(data.as_ref(), Some(&authoritative));
            }
            other => panic!("Expected Error state, got {:?}", other),
        }

        // Not the optimistic B, C, A guess
        assert_eq!(
            keys(&coordinator.displayed()),
            keys(&authoritative),
            "view shows what the store holds"
        );
        assert_ne!(coordinator.displayed()[1].ordering_key, 2);
        assert_eq!(store.writes().await.len(), 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_resync_failure_reports_error_without_data() -> Result<()> {
        let store = abc_store().await?;
        let config = ReorderConfig {
            temp_keys: TempKeyStrategy::jittered(),
            check_generation: false,
        };
        let coordinator = coordinator(&store, config);
        let current = coordinator.load().await?;

        store
            .fail_nth_write(1, StoreError::network("connection reset"))
            .await;
        store
            .set_read_failure(Some(StoreError::network("offline")))
            .await;

        coordinator.handle_reorder(&current, 2, 0)?;
        coordinator.idle().await;

        let state = coordinator.current();
        assert!(matches!(
            state.error(),
            Some(ReorderError::WriteFailed {
                phase: ReorderPhase::Displacement,
                completed_writes: 0,
                ..
            })
        ));
        assert!(state.data().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_queued_gesture_is_superseded() -> Result<()> {
        let store = abc_store().await?;
        store.set_write_delay(Some(Duration::from_millis(5))).await;
        let coordinator = coordinator(&store, ReorderConfig::default());
        let current = coordinator.load().await?;

        // Starts immediately: B, C, A
        coordinator.handle_reorder(&current, 0, 2)?;
        // Queued behind the first run: C, B, A
        coordinator.handle_reorder(&coordinator.displayed(), 1, 0)?;
        // Replaces the queued one: C, A, B
        coordinator.handle_reorder(&coordinator.displayed(), 2, 1)?;

        coordinator.idle().await;

        let expected = vec![("C".to_string(), 1), ("A".to_string(), 2), ("B".to_string(), 3)];
        assert_eq!(keys(&store.snapshot(&scope()).await), expected);
        assert!(coordinator.current().is_success());
        assert_eq!(keys(coordinator.current().data().unwrap()), expected);
        // Two runs of six writes; the superseded gesture never ran
        assert_eq!(store.writes().await.len(), 12);
        Ok(())
    }

    #[tokio::test]
    async fn test_external_write_detected_as_stale_scope() -> Result<()> {
        let store = abc_store().await?;
        let coordinator = coordinator(&store, ReorderConfig::default());
        let current = coordinator.load().await?;

        // Another client appends a list after our read
        store
            .create_member(&scope(), NewMember::with_id("D", "Books"))
            .await?;

        coordinator.handle_reorder(&current, 0, 1)?;
        coordinator.idle().await;

        let state = coordinator.current();
        assert!(matches!(
            state.error(),
            Some(ReorderError::StaleScope { .. })
        ));
        assert!(store.writes().await.is_empty());
        let ids: Vec<&str> = state
            .data()
            .unwrap()
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C", "D"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_consecutive_reorders_keep_generation_in_step() -> Result<()> {
        let store = abc_store().await?;
        let coordinator = coordinator(&store, ReorderConfig::default());
        let current = coordinator.load().await?;

        coordinator.handle_reorder(&current, 0, 2)?;
        coordinator.idle().await;
        coordinator.handle_reorder(&coordinator.displayed(), 0, 1)?;
        coordinator.idle().await;

        assert!(coordinator.current().is_success());
        let members = store
            .list_members(&scope(), &MemberQuery::all())
            .await?;
        assert_eq!(
            keys(&members),
            vec![("C".to_string(), 1), ("B".to_string(), 2), ("A".to_string(), 3)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_during_run_never_confirms_temp_keys() -> Result<()> {
        let store = abc_store().await?;
        store.set_write_delay(Some(Duration::from_millis(20))).await;
        let coordinator = coordinator(&store, ReorderConfig::default());
        let current = coordinator.load().await?;

        coordinator.handle_reorder(&current, 0, 2)?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        coordinator.refresh().await?;
        coordinator.idle().await;

        let state = coordinator.current();
        let durable = store.snapshot(&scope()).await;
        assert!(state.is_success());
        assert_eq!(state.data(), Some(&durable));
        assert_eq!(
            keys(&durable),
            vec![("B".to_string(), 1), ("C".to_string(), 2), ("A".to_string(), 3)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_generation_after_run_still_confirms() -> Result<()> {
        let store = abc_store().await?;
        let config = ReorderConfig {
            check_generation: false,
            ..Default::default()
        };
        let coordinator = coordinator(&store, config);
        let current = coordinator.load().await?;
        store
            .set_generation_failure(Some(StoreError::network("blip")))
            .await;

        coordinator.handle_reorder(&current, 0, 2)?;
        coordinator.idle().await;

        let state = coordinator.current();
        assert!(state.is_success());
        let expected = vec![("B".to_string(), 1), ("C".to_string(), 2), ("A".to_string(), 3)];
        assert_eq!(keys(state.data().expect("data shown")), expected);
        assert_eq!(keys(&store.snapshot(&scope()).await), expected);
        Ok(())
    }
}
