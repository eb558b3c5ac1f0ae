//! Specificity order over [`TypeKey`]s.
//!
//! Shared by the handler table and the exception table so both resolve the most
//! specific declaration the same way.

use std::cmp::Ordering;

use crate::typing::TypeKey;

/// Compares two types by specificity.
///
/// `Less` means `a` is more specific (a strict subtype of `b`). `Equal` is
/// returned for mutual subtypes, `None` for unrelated types.
pub fn compare(a: &TypeKey, b: &TypeKey) -> Option<Ordering> {
    match (a.is_subtype_of(b), b.is_subtype_of(a)) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Less),
        (false, true) => Some(Ordering::Greater),
        (false, false) => None,
    }
}

/// Reorders declarations so every subtype precedes each of its supertypes.
///
/// Stable: among entries with no specificity constraint between them the
/// declaration order is kept. At each step the earliest remaining entry with no
/// more specific remaining entry is emitted.
pub fn order_most_specific_first<T, F>(entries: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> TypeKey,
{
    let mut remaining: Vec<(TypeKey, T)> = entries.into_iter().map(|e| (key(&e), e)).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let next = remaining
            .iter()
            .position(|(candidate, _)| {
                !remaining
                    .iter()
                    .any(|(other, _)| compare(other, candidate) == Some(Ordering::Less))
            })
            // A declared hierarchy cannot make every entry strictly more specific
            // than another, but fall back to declaration order if it ever does.
            .unwrap_or(0);
        ordered.push(remaining.remove(next).1);
    }

    ordered
}
