//! SQLite-backed `MemberStore` (libsql)
//!
//! # Schema
//!
//! - `members`: one row per member, primary key `(scope_kind, owner_id, id)`
//! - `idx_members_scope_order`: UNIQUE `(scope_kind, owner_id, ordering_key)`,
//!   the live constraint the reorder executor works around
//! - `scope_generations`: per-scope write counter, bumped in the same
//!   transaction as every member write
//!
//! All statements run on a single connection guarded by a mutex, so an
//! in-memory database (`:memory:`) behaves like a file-backed one.

use crate::db::{DatabaseError, MemberStore, StoreError, StoreEvent};
use crate::models::{Member, MemberQuery, MemberUpdate, NewMember, OrderCalculator, ScopeId};
use async_trait::async_trait;
use libsql::{Builder, Connection};
use std::path::PathBuf;
use tokio::sync::{broadcast, Mutex};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// SQLite error text for a violated UNIQUE index
const UNIQUE_VIOLATION: &str = "UNIQUE constraint failed";

pub struct SqliteMemberStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    events: broadcast::Sender<StoreEvent>,
}

impl SqliteMemberStore {
    /// Open (or create) the database at `db_path` and initialize the schema
    ///
    /// Idempotent: safe to call on an existing database.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        initialize_schema(&conn).await?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            events,
        })
    }

    /// In-memory database, mostly for tests
    pub async fn new_in_memory() -> Result<Self, DatabaseError> {
        Self::new(PathBuf::from(":memory:")).await
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn subscribe_to_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

async fn initialize_schema(conn: &Connection) -> Result<(), DatabaseError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS members (
            id TEXT NOT NULL,
            scope_kind TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            ordering_key INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (scope_kind, owner_id, id)
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_members_scope_order
            ON members(scope_kind, owner_id, ordering_key)",
        "CREATE TABLE IF NOT EXISTS scope_generations (
            scope_kind TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            generation INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (scope_kind, owner_id)
        )",
    ];

    for sql in statements {
        conn.execute(sql, ()).await.map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to execute '{}': {}", sql, e))
        })?;
    }

    Ok(())
}

fn store_error(context: &str, e: libsql::Error) -> StoreError {
    StoreError::network(format!("{}: {}", context, e))
}

fn row_to_member(scope: &ScopeId, row: &libsql::Row) -> Result<Member, StoreError> {
    let id: String = row.get(0).map_err(|e| store_error("Failed to read id", e))?;
    let ordering_key: i64 = row
        .get(1)
        .map_err(|e| store_error("Failed to read ordering_key", e))?;
    let title: String = row
        .get(2)
        .map_err(|e| store_error("Failed to read title", e))?;
    Ok(Member::new(id, scope.clone(), ordering_key, title))
}

async fn select_members(
    conn: &Connection,
    scope: &ScopeId,
    query: &MemberQuery,
) -> Result<Vec<Member>, StoreError> {
    let mut rows = conn
        .query(
            "SELECT id, ordering_key, title FROM members
             WHERE scope_kind = ?1 AND owner_id = ?2
               AND (?3 IS NULL OR id = ?3)
               AND (?4 IS NULL OR ordering_key = ?4)
             ORDER BY ordering_key, id",
            (
                scope.kind.as_str(),
                scope.owner_id.as_str(),
                query.id.as_deref(),
                query.ordering_key,
            ),
        )
        .await
        .map_err(|e| store_error("Failed to list members", e))?;

    let mut members = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| store_error("Failed to read member row", e))?
    {
        members.push(row_to_member(scope, &row)?);
    }
    Ok(members)
}

async fn bump_generation(conn: &Connection, scope: &ScopeId) -> Result<(), libsql::Error> {
    conn.execute(
        "INSERT INTO scope_generations (scope_kind, owner_id, generation) VALUES (?1, ?2, 1)
         ON CONFLICT(scope_kind, owner_id) DO UPDATE SET generation = generation + 1",
        (scope.kind.as_str(), scope.owner_id.as_str()),
    )
    .await
    .map(|_| ())
}

async fn rollback(conn: &Connection) {
    if let Err(e) = conn.execute("ROLLBACK", ()).await {
        tracing::warn!("Failed to roll back member write: {}", e);
    }
}

#[async_trait]
impl MemberStore for SqliteMemberStore {
    async fn list_members(
        &self,
        scope: &ScopeId,
        query: &MemberQuery,
    ) -> Result<Vec<Member>, StoreError> {
        let conn = self.conn.lock().await;
        select_members(&conn, scope, query).await
    }

    async fn update_member(
        &self,
        scope: &ScopeId,
        id: &str,
        update: MemberUpdate,
    ) -> Result<Member, StoreError> {
        let conn = self.conn.lock().await;

        conn.execute("BEGIN TRANSACTION", ())
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        let result = conn
            .execute(
                "UPDATE members
                 SET ordering_key = COALESCE(?1, ordering_key), title = COALESCE(?2, title)
                 WHERE scope_kind = ?3 AND owner_id = ?4 AND id = ?5",
                (
                    update.ordering_key,
                    update.title.as_deref(),
                    scope.kind.as_str(),
                    scope.owner_id.as_str(),
                    id,
                ),
            )
            .await;

        let changed = match result {
            Ok(changed) => changed,
            Err(e) => {
                rollback(&conn).await;
                let message = e.to_string();
                if let (true, Some(key)) = (message.contains(UNIQUE_VIOLATION), update.ordering_key)
                {
                    let holder = select_members(&conn, scope, &MemberQuery::by_ordering_key(key))
                        .await?
                        .into_iter()
                        .next()
                        .map(|m| m.id)
                        .unwrap_or_default();
                    return Err(StoreError::conflict(scope.clone(), key, holder));
                }
                return Err(StoreError::network(format!(
                    "Failed to update member '{}': {}",
                    id, message
                )));
            }
        };

        if changed == 0 {
            rollback(&conn).await;
            return Err(StoreError::not_found(scope.clone(), id));
        }

        if let Err(e) = bump_generation(&conn, scope).await {
            rollback(&conn).await;
            return Err(store_error("Failed to bump scope generation", e));
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            rollback(&conn).await;
            return Err(store_error("Failed to commit member update", e));
        }

        let updated = select_members(&conn, scope, &MemberQuery::by_id(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(scope.clone(), id))?;
        drop(conn);

        self.emit(StoreEvent::MemberUpdated(updated.clone()));
        Ok(updated)
    }

    async fn create_member(
        &self,
        scope: &ScopeId,
        member: NewMember,
    ) -> Result<Member, StoreError> {
        let conn = self.conn.lock().await;

        let keys: Vec<i64> = select_members(&conn, scope, &MemberQuery::all())
            .await?
            .iter()
            .map(|m| m.ordering_key)
            .collect();
        let created = Member::new(
            member.resolve_id(),
            scope.clone(),
            OrderCalculator::next_key(&keys),
            member.title,
        );

        conn.execute("BEGIN TRANSACTION", ())
            .await
            .map_err(|e| store_error("Failed to begin transaction", e))?;

        if let Err(e) = conn
            .execute(
                "INSERT INTO members (id, scope_kind, owner_id, ordering_key, title)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    created.id.as_str(),
                    scope.kind.as_str(),
                    scope.owner_id.as_str(),
                    created.ordering_key,
                    created.title.as_str(),
                ),
            )
            .await
        {
            rollback(&conn).await;
            if e.to_string().contains(UNIQUE_VIOLATION) {
                return Err(StoreError::duplicate_id(scope.clone(), created.id));
            }
            return Err(store_error("Failed to insert member", e));
        }

        if let Err(e) = bump_generation(&conn, scope).await {
            rollback(&conn).await;
            return Err(store_error("Failed to bump scope generation", e));
        }

        if let Err(e) = conn.execute("COMMIT", ()).await {
            rollback(&conn).await;
            return Err(store_error("Failed to commit member insert", e));
        }
        drop(conn);

        self.emit(StoreEvent::MemberCreated(created.clone()));
        Ok(created)
    }

    async fn generation(&self, scope: &ScopeId) -> Result<Option<u64>, StoreError> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query(
                "SELECT generation FROM scope_generations WHERE scope_kind = ?1 AND owner_id = ?2",
                (scope.kind.as_str(), scope.owner_id.as_str()),
            )
            .await
            .map_err(|e| store_error("Failed to read scope generation", e))?;

        let generation = match rows
            .next()
            .await
            .map_err(|e| store_error("Failed to read scope generation", e))?
        {
            Some(row) => row
                .get::<i64>(0)
                .map_err(|e| store_error("Failed to read scope generation", e))?,
            None => 0,
        };

        Ok(Some(generation.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_index_maps_to_conflict() {
        let store = SqliteMemberStore::new_in_memory().await.unwrap();
        let scope = ScopeId::lists("u1");
        let a = store
            .create_member(&scope, NewMember::with_id("a", "A"))
            .await
            .unwrap();
        store
            .create_member(&scope, NewMember::with_id("b", "B"))
            .await
            .unwrap();

        let err = store
            .update_member(&scope, &a.id, MemberUpdate::ordering_key(2))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::conflict(scope.clone(), 2, "b"));
    }

    #[tokio::test]
    async fn test_missing_member_maps_to_not_found() {
        let store = SqliteMemberStore::new_in_memory().await.unwrap();
        let err = store
            .update_member(&ScopeId::items("l1"), "ghost", MemberUpdate::ordering_key(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_id_maps_to_duplicate_id() {
        let store = SqliteMemberStore::new_in_memory().await.unwrap();
        let scope = ScopeId::lists("u1");
        store
            .create_member(&scope, NewMember::with_id("a", "A"))
            .await
            .unwrap();

        let err = store
            .create_member(&scope, NewMember::with_id("a", "Again"))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::duplicate_id(scope, "a"));
    }

    #[tokio::test]
    async fn test_failed_writes_leave_no_open_transaction() {
        let store = SqliteMemberStore::new_in_memory().await.unwrap();
        let scope = ScopeId::lists("u1");
        for id in ["a", "b"] {
            store
                .create_member(&scope, NewMember::with_id(id, id))
                .await
                .unwrap();
        }

        // One failure per rollback path
        assert!(store
            .update_member(&scope, "a", MemberUpdate::ordering_key(2))
            .await
            .is_err());
        assert!(store
            .update_member(&scope, "ghost", MemberUpdate::ordering_key(9))
            .await
            .is_err());
        assert!(store
            .create_member(&scope, NewMember::with_id("a", "Again"))
            .await
            .is_err());

        // A dangling transaction would make the next BEGIN fail
        let moved = store
            .update_member(&scope, "a", MemberUpdate::ordering_key(10))
            .await
            .unwrap();
        assert_eq!(moved.ordering_key, 10);
        let created = store
            .create_member(&scope, NewMember::with_id("c", "C"))
            .await
            .unwrap();
        assert_eq!(created.ordering_key, 11);
        assert_eq!(store.generation(&scope).await.unwrap(), Some(4));
    }
}
