//! Member Data Structures
//!
//! A `Member` is one entry of an ordered collection: a list on a user's board,
//! or an item inside a list. Every member belongs to exactly one `ScopeId`, and
//! within that scope its `ordering_key` is unique.
//!
//! # Examples
//!
//! ```rust
//! use listshare_core::models::{Member, ScopeId};
//!
//! let scope = ScopeId::items("list-42");
//! let member = Member::new("item-1", scope.clone(), 1, "Milk");
//!
//! assert_eq!(member.scope, scope);
//! assert_eq!(scope.to_string(), "items:list-42");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of collection a scope refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeKind {
    /// All lists owned by one user
    Lists,
    /// All items inside one list
    Items,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Lists => "lists",
            ScopeKind::Items => "items",
        }
    }

    /// Parse the string form produced by `as_str`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lists" => Some(ScopeKind::Lists),
            "items" => Some(ScopeKind::Items),
            _ => None,
        }
    }
}

/// Identifies the set within which `ordering_key` must be unique
///
/// `owner_id` is the user id for `ScopeKind::Lists` and the list id for
/// `ScopeKind::Items`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeId {
    pub kind: ScopeKind,
    pub owner_id: String,
}

impl ScopeId {
    pub fn new(kind: ScopeKind, owner_id: impl Into<String>) -> Self {
        Self {
            kind,
            owner_id: owner_id.into(),
        }
    }

    /// Scope of all lists owned by `user_id`
    pub fn lists(user_id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Lists, user_id)
    }

    /// Scope of all items inside `list_id`
    pub fn items(list_id: impl Into<String>) -> Self {
        Self::new(ScopeKind::Items, list_id)
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.owner_id)
    }
}

/// One entry of an ordered collection
///
/// # Fields
///
/// - `id`: Stable identity, unique within the scope
/// - `scope`: Owning collection; never changes during a reorder
/// - `ordering_key`: Display position, ascending; unique within `scope`
/// - `title`: Display payload, opaque to the ordering core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub scope: ScopeId,
    pub ordering_key: i64,
    #[serde(default)]
    pub title: String,
}

impl Member {
    pub fn new(
        id: impl Into<String>,
        scope: ScopeId,
        ordering_key: i64,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            scope,
            ordering_key,
            title: title.into(),
        }
    }
}

/// Equality predicates for `MemberStore::list_members`
///
/// Unset fields match everything. `MemberQuery::all()` returns the whole scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering_key: Option<i64>,
}

impl MemberQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_ordering_key(ordering_key: i64) -> Self {
        Self {
            ordering_key: Some(ordering_key),
            ..Default::default()
        }
    }

    pub fn matches(&self, member: &Member) -> bool {
        self.id.as_deref().map_or(true, |id| member.id == id)
            && self
                .ordering_key
                .map_or(true, |key| member.ordering_key == key)
    }
}

/// Sparse update for a member (only provided fields change)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering_key: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl MemberUpdate {
    pub fn ordering_key(ordering_key: i64) -> Self {
        Self {
            ordering_key: Some(ordering_key),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ordering_key.is_none() && self.title.is_none()
    }
}

/// Parameters for creating a member
///
/// The store assigns the ordering key (`max + 1`, or 1 for an empty scope).
/// When `id` is `None` a UUID v4 is generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
}

impl NewMember {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            title: title.into(),
        }
    }

    /// Resolve the id, generating one if the caller didn't supply it
    pub fn resolve_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}
