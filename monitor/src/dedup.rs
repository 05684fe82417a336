//! At-most-once gate in front of the notifier.
//!
//! [`DedupStore`] remembers, per [`TransitionKind`], every entity id that has
//! already been notified in this session. Sets only grow; they are bounded by
//! the number of distinct entities seen, not by the number of polls.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::types::{EntityId, Transition, TransitionKind};

/// Per-kind sets of already-notified entity ids.
#[derive(Debug, Default, Clone)]
pub struct DedupStore {
    seen: HashMap<TransitionKind, HashSet<EntityId>>,
}

impl DedupStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the transition as notified.
    ///
    /// Returns `true` the first time a `(kind, entity_id)` pair is seen and
    /// `false` on every later call. Check and insert are one step.
    pub fn admit(&mut self, transition: &Transition) -> bool {
        let fresh = self
            .seen
            .entry(transition.kind)
            .or_default()
            .insert(transition.entity_id);

        if !fresh {
            trace!(
                entity_id = transition.entity_id,
                kind = %transition.kind,
                "Dropping already-notified transition"
            );
        }
        fresh
    }

    /// Whether the pair has already been admitted.
    #[must_use]
    pub fn contains(&self, kind: TransitionKind, entity_id: EntityId) -> bool {
        self.seen
            .get(&kind)
            .is_some_and(|ids| ids.contains(&entity_id))
    }

    /// Number of ids admitted for `kind`.
    #[must_use]
    pub fn len(&self, kind: TransitionKind) -> usize {
        self.seen.get(&kind).map_or(0, HashSet::len)
    }

    /// Returns true if nothing has been admitted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.values().all(HashSet::is_empty)
    }
}
