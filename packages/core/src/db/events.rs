//! Domain Events for member stores
//!
//! Stores emit a `StoreEvent` on a tokio broadcast channel after every
//! successful write, so other parts of the system can follow changes without
//! coupling to the backend.

use crate::models::Member;
use serde::{Deserialize, Serialize};

/// Domain events emitted by member stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StoreEvent {
    /// A new member was created
    #[serde(rename = "member:created")]
    MemberCreated(Member),

    /// A member's fields (usually its ordering key) changed
    #[serde(rename = "member:updated")]
    MemberUpdated(Member),
}

impl StoreEvent {
    pub fn event_type(&self) -> &str {
        match self {
            StoreEvent::MemberCreated(_) => "member:created",
            StoreEvent::MemberUpdated(_) => "member:updated",
        }
    }

    pub fn member(&self) -> &Member {
        match self {
            StoreEvent::MemberCreated(member) | StoreEvent::MemberUpdated(member) => member,
        }
    }
}
