//! Ordering helpers and invariant checks shared by every ordered collection
//!
//! Display order is ascending `ordering_key`. Within a scope keys are unique;
//! gaps are legal (deletion leaves them), ties never are.

use crate::models::{Member, ScopeId};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Ways a member set can break the ordering invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderingViolation {
    #[error("Members '{first}' and '{second}' in scope {scope} share ordering key {ordering_key}")]
    DuplicateKey {
        scope: ScopeId,
        ordering_key: i64,
        first: String,
        second: String,
    },

    #[error("Member '{id}' appears more than once in scope {scope}")]
    DuplicateId { scope: ScopeId, id: String },

    #[error("Member set changed: {missing} missing, {added} added")]
    MembershipChanged { missing: usize, added: usize },
}

/// Calculates ordering keys for new and moved members
pub struct OrderCalculator;

impl OrderCalculator {
    /// Key for a member appended to the end of a scope
    ///
    /// ```
    /// use listshare_core::models::OrderCalculator;
    ///
    /// assert_eq!(OrderCalculator::next_key(&[]), 1);
    /// assert_eq!(OrderCalculator::next_key(&[1, 7, 3]), 8);
    /// ```
    pub fn next_key(existing: &[i64]) -> i64 {
        existing.iter().max().map_or(1, |max| max.saturating_add(1))
    }

    /// Move the element at `from` to `to`, shifting the ones in between
    ///
    /// Returns `None` when either index is out of range.
    pub fn move_element<T: Clone>(order: &[T], from: usize, to: usize) -> Option<Vec<T>> {
        if from >= order.len() || to >= order.len() {
            return None;
        }

        let mut reordered = order.to_vec();
        let moved = reordered.remove(from);
        reordered.insert(to, moved);
        Some(reordered)
    }

    /// Renumber members by position: the first gets key 1, the next 2, and so on
    pub fn assign_dense_keys(members: Vec<Member>) -> Vec<Member> {
        members
            .into_iter()
            .zip(1i64..)
            .map(|(mut member, key)| {
                member.ordering_key = key;
                member
            })
            .collect()
    }

    /// Sort members into display order
    pub fn sort_for_display(members: &mut [Member]) {
        members.sort_by(|a, b| {
            a.ordering_key
                .cmp(&b.ordering_key)
                .then_with(|| a.id.cmp(&b.id))
        });
    }
}

/// Check that no two members of the same scope share an ordering key or an id
pub fn check_ordering(members: &[Member]) -> Result<(), OrderingViolation> {
    let mut keys: HashMap<(&ScopeId, i64), &str> = HashMap::new();
    let mut ids: HashSet<(&ScopeId, &str)> = HashSet::new();

    for member in members {
        if !ids.insert((&member.scope, member.id.as_str())) {
            return Err(OrderingViolation::DuplicateId {
                scope: member.scope.clone(),
                id: member.id.clone(),
            });
        }

        if let Some(holder) = keys.insert((&member.scope, member.ordering_key), &member.id) {
            return Err(OrderingViolation::DuplicateKey {
                scope: member.scope.clone(),
                ordering_key: member.ordering_key,
                first: holder.to_string(),
                second: member.id.clone(),
            });
        }
    }

    Ok(())
}

/// `true` when no scope holds a duplicated ordering key or id
pub fn is_valid_ordering(members: &[Member]) -> bool {
    check_ordering(members).is_ok()
}

/// Check that `after` holds exactly the same member ids as `before`
pub fn check_membership(before: &[Member], after: &[Member]) -> Result<(), OrderingViolation> {
    let before_ids: HashSet<&str> = before.iter().map(|m| m.id.as_str()).collect();
    let after_ids: HashSet<&str> = after.iter().map(|m| m.id.as_str()).collect();

    let missing = before_ids.difference(&after_ids).count();
    let added = after_ids.difference(&before_ids).count();

    if missing == 0 && added == 0 {
        Ok(())
    } else {
        Err(OrderingViolation::MembershipChanged { missing, added })
    }
}

/// `true` when a before/after pair is a pure permutation of keys
pub fn preserves_membership(before: &[Member], after: &[Member]) -> bool {
    check_membership(before, after).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, key: i64) -> Member {
        Member::new(id, ScopeId::lists("u1"), key, id.to_uppercase())
    }

    #[test]
    fn test_next_key_after_gaps() {
        assert_eq!(OrderCalculator::next_key(&[2, 5]), 6);
    }

    #[test]
    fn test_move_element_forward_and_back() {
        let order = vec!["a", "b", "c", "d"];

        assert_eq!(
            OrderCalculator::move_element(&order, 0, 2),
            Some(vec!["b", "c", "a", "d"])
        );
        assert_eq!(
            OrderCalculator::move_element(&order, 3, 0),
            Some(vec!["d", "a", "b", "c"])
        );
        assert_eq!(
            OrderCalculator::move_element(&order, 1, 1),
            Some(order.clone())
        );
    }

    #[test]
    fn test_move_element_out_of_range() {
        let order = vec![1, 2, 3];
        assert_eq!(OrderCalculator::move_element(&order, 3, 0), None);
        assert_eq!(OrderCalculator::move_element(&order, 0, 3), None);
        assert_eq!(OrderCalculator::move_element::<i32>(&[], 0, 0), None);
    }

    #[test]
    fn test_assign_dense_keys() {
        let renumbered =
            OrderCalculator::assign_dense_keys(vec![member("b", 9), member("a", 4), member("c", 1)]);
        let keys: Vec<(&str, i64)> = renumbered
            .iter()
            .map(|m| (m.id.as_str(), m.ordering_key))
            .collect();
        assert_eq!(keys, vec![("b", 1), ("a", 2), ("c", 3)]);
    }

    #[test]
    fn test_duplicate_key_is_invalid() {
        let members = vec![member("a", 1), member("b", 2), member("c", 2)];
        assert!(!is_valid_ordering(&members));
        assert!(matches!(
            check_ordering(&members),
            Err(OrderingViolation::DuplicateKey { ordering_key: 2, .. })
        ));
    }

    #[test]
    fn test_gaps_are_valid() {
        assert!(is_valid_ordering(&[member("a", 1), member("b", 10)]));
    }

    #[test]
    fn test_same_key_in_different_scopes_is_valid() {
        let other = Member::new("x", ScopeId::items("list-1"), 1, "X");
        assert!(is_valid_ordering(&[member("a", 1), other]));
    }

    #[test]
    fn test_membership_preserved_only_for_permutations() {
        let before = vec![member("a", 1), member("b", 2)];
        let permuted = vec![member("b", 1), member("a", 2)];
        let swapped = vec![member("a", 1), member("c", 2)];

        assert!(preserves_membership(&before, &permuted));
        assert_eq!(
            check_membership(&before, &swapped),
            Err(OrderingViolation::MembershipChanged {
                missing: 1,
                added: 1
            })
        );
    }
}
