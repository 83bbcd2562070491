//! Coalescing of redundant counter updates.
//!
//! Only `EXISTS` and `RECENT` merge. They track independent counters, so
//! each may look past the other while searching for an earlier copy of
//! itself. Every other response is a barrier: an `EXPUNGE` in particular
//! shifts sequence numbers and must never be absorbed.

use crate::{Error, Result};

use super::Response;

/// How a response takes part in merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeClass {
    /// Never merged; stops any backward scan.
    Atomic,
    /// `EXISTS` count.
    MessageCount,
    /// `RECENT` count.
    RecentCount,
}

impl MergeClass {
    /// Returns true if responses of this class merge at all.
    #[must_use]
    pub const fn is_mergeable(self) -> bool {
        !matches!(self, Self::Atomic)
    }

    /// Returns true if a response of class `self` may be scanned past while
    /// looking for an earlier response of class `other`.
    #[must_use]
    pub const fn can_skip(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::MessageCount, Self::RecentCount) | (Self::RecentCount, Self::MessageCount)
        )
    }
}

fn counter(response: &Response) -> Option<u32> {
    match response {
        Response::Exists(n) | Response::Recent(n) => Some(*n),
        _ => None,
    }
}

/// Collapses redundant counter updates while keeping order.
///
/// Returns [`Error::MergeInvariant`] if a counter decreases within an
/// uninterrupted run.
pub fn merge(responses: impl IntoIterator<Item = Response>) -> Result<Vec<Response>> {
    let mut merged: Vec<Response> = Vec::new();

    'next: for response in responses {
        let class = response.merge_class();
        if class.is_mergeable() {
            for slot in merged.iter_mut().rev() {
                let existing = slot.merge_class();
                if existing == class {
                    let previous = counter(slot).unwrap_or(0);
                    let next = counter(&response).unwrap_or(0);
                    if next < previous {
                        return Err(Error::MergeInvariant {
                            class,
                            previous,
                            next,
                        });
                    }
                    *slot = response;
                    continue 'next;
                }
                if !existing.can_skip(class) {
                    break;
                }
            }
        }
        merged.push(response);
    }

    Ok(merged)
}
