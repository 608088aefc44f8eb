//! Handle recorder (C3): tracks which per-term-field match-data handles the
//! ranking program actually consumes, so iterators can skip unpacking the rest.

use std::collections::HashMap;

use crate::types::{Handle, HandleUse};

/// Collects `register_handle` calls made during ranking-program setup. Threaded
/// through feature setup as an explicit parameter (§9: the thread-local binder
/// pattern is deliberately not used here — there is no legacy feature API that
/// requires it).
#[derive(Debug, Default)]
pub struct HandleRecorder {
    requests: HashMap<Handle, HandleUse>,
}

impl HandleRecorder {
    pub fn new() -> Self {
        HandleRecorder::default()
    }

    /// OR-merges `details` into the handle's recorded usage.
    pub fn register_handle(&mut self, handle: Handle, details: HandleUse) {
        self.requests.entry(handle).or_default().merge(details);
    }

    pub fn usage_of(&self, handle: Handle) -> HandleUse {
        self.requests.get(&handle).copied().unwrap_or_default()
    }

    /// The full set of handles that were registered at all (needed or not).
    pub fn registered_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.requests.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Per-thread match-data tagging produced by [`HandleRecorder::tag_match_data`].
/// Iterators consult this at match time to skip unpack work for handles nobody
/// downstream needs.
#[derive(Debug, Clone, Default)]
pub struct MatchDataTags {
    tags: HashMap<Handle, HandleUse>,
}

impl MatchDataTags {
    pub fn needed(&self, handle: Handle) -> bool {
        self.tags.get(&handle).map(|u| u.needed()).unwrap_or(false)
    }

    pub fn usage(&self, handle: Handle) -> HandleUse {
        self.tags.get(&handle).copied().unwrap_or_default()
    }
}

impl HandleRecorder {
    /// Marks every handle seen so far as needed-for-normal / needed-for-interleaved
    /// / both / not-needed. Idempotent: calling this again with the same recorded
    /// set produces identical tags (§8 round-trip property).
    pub fn tag_match_data(&self, all_handles: &[Handle]) -> MatchDataTags {
        let tags = all_handles
            .iter()
            .map(|&h| (h, self.usage_of(h)))
            .collect();
        MatchDataTags { tags }
    }
}
