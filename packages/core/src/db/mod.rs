//! Persistence Layer
//!
//! The reorder core treats persistence as an external collaborator behind the
//! [`MemberStore`] trait. Two backends ship with the crate:
//!
//! - [`InMemoryMemberStore`] - live unique-key enforcement plus test
//!   instrumentation (write log, fault injection, latency)
//! - `SqliteMemberStore` - libsql database with a real UNIQUE index
//!   (`sqlite` feature, on by default)
//!
//! Both emit [`StoreEvent`]s on a tokio broadcast channel after every
//! successful write.

mod error;
pub mod events;
mod member_store;
mod memory_store;
#[cfg(feature = "sqlite")]
mod sqlite_store;

pub use error::{DatabaseError, StoreError};
pub use events::StoreEvent;
pub use member_store::MemberStore;
pub use memory_store::{InMemoryMemberStore, WriteRecord};
#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteMemberStore;
