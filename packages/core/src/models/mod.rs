//! Data Models
//!
//! This module contains the data structures shared by every ordered collection:
//!
//! - `Member` / `ScopeId` - an entry and the set its ordering key is unique within
//! - `MemberQuery`, `MemberUpdate`, `NewMember` - persistence parameters
//! - `OrderCalculator` and the invariant checks in [`ordering`]
//! - `StreamState` - the tri-state wrapper views observe

mod member;
pub mod ordering;
mod stream_state;

pub use member::{Member, MemberQuery, MemberUpdate, NewMember, ScopeId, ScopeKind};
pub use ordering::{
    check_membership, check_ordering, is_valid_ordering, preserves_membership, OrderCalculator,
    OrderingViolation,
};
pub use stream_state::StreamState;
