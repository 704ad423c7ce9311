//! Tri-state result wrapper observed by views and tests
//!
//! A view of an ordered collection is always in exactly one of three states:
//! a remote operation is in flight, the last operation succeeded, or it failed.

use crate::operations::ReorderError;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum StreamState<T> {
    /// A fetch or reorder is in flight. Carries what is currently displayed,
    /// which after a reorder gesture is the optimistic guess.
    Pending(Option<T>),

    /// Authoritative (or confirmed) data
    Success(T),

    /// The last operation failed. `data` is the authoritative state fetched
    /// after the failure, or `None` if that fetch failed too.
    Error {
        error: Arc<ReorderError>,
        data: Option<T>,
    },
}

impl<T> StreamState<T> {
    /// Data currently presented, regardless of state
    pub fn data(&self) -> Option<&T> {
        match self {
            StreamState::Pending(data) => data.as_ref(),
            StreamState::Success(data) => Some(data),
            StreamState::Error { data, .. } => data.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&ReorderError> {
        match self {
            StreamState::Error { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, StreamState::Pending(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StreamState::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StreamState::Error { .. })
    }
}

impl<T> Default for StreamState<T> {
    fn default() -> Self {
        StreamState::Pending(None)
    }
}
