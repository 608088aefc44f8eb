//! The boundary this crate consumes from indexing/attribute storage: posting-list
//! iteration and attribute range search are out of scope (§1) and specified here
//! only by the behavioral contract a real backend must satisfy.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::types::{DocId, Handle};

/// Per-thread scratch storage that iterators populate during `unpack`. Storage
/// for positions/weights is the concrete backend's business; this crate only
/// needs to know which handles were touched, for handle-recorder bookkeeping
/// and for tests.
#[derive(Debug, Default)]
pub struct MatchData {
    touched: Vec<Handle>,
}

impl MatchData {
    pub fn new() -> Self {
        MatchData::default()
    }

    pub fn record_unpack(&mut self, handle: Handle) {
        self.touched.push(handle);
    }

    pub fn touched_handles(&self) -> &[Handle] {
        &self.touched
    }

    pub fn reset(&mut self) {
        self.touched.clear();
    }
}

/// A materialized per-thread search primitive. `seek` must return monotonically
/// non-decreasing docids within one `init_range` session (§5 ordering guarantee).
pub trait SearchIterator: Send {
    fn init_range(&mut self, begin: DocId, end: DocId);
    /// Returns the next matching docid `>= docid`, or the range end if exhausted.
    fn seek(&mut self, docid: DocId) -> DocId;
    fn unpack(&mut self, docid: DocId, match_data: &mut MatchData);
    fn is_strict(&self) -> bool {
        true
    }
}

/// An iterator that never matches anything; the realization of `EmptyBlueprint`.
pub struct EmptySearch {
    end: DocId,
}

impl Default for EmptySearch {
    fn default() -> Self {
        EmptySearch { end: DocId::new(0) }
    }
}

impl SearchIterator for EmptySearch {
    fn init_range(&mut self, _begin: DocId, end: DocId) {
        self.end = end;
    }
    fn seek(&mut self, _docid: DocId) -> DocId {
        self.end
    }
    fn unpack(&mut self, _docid: DocId, _match_data: &mut MatchData) {}
}

/// An iterator that matches every docid in range (the `AlwaysTrue` primitive).
pub struct FullSearch {
    current: DocId,
    end: DocId,
}

impl Default for FullSearch {
    fn default() -> Self {
        FullSearch { current: DocId::new(0), end: DocId::new(0) }
    }
}

impl SearchIterator for FullSearch {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.current = begin;
        self.end = end;
    }
    fn seek(&mut self, docid: DocId) -> DocId {
        self.current = docid.value().max(self.current.value()).into();
        if self.current.value() >= self.end.value() { self.end } else { self.current }
    }
    fn unpack(&mut self, _docid: DocId, _match_data: &mut MatchData) {}
}

/// Created once per `Blueprint` (`fetchPostings`), and cloned into one
/// [`SearchIterator`] per thread via [`Searchable::create_iterator`].
pub trait Postings: Send + Sync {
    fn create_iterator(&self, handle: Handle) -> Box<dyn SearchIterator>;
    fn estimated_hits(&self) -> u64;
}

/// The attribute-vector or posting-list backend a leaf term resolves against.
/// Out of scope per §1; this crate only calls `fetch_postings` exactly once per
/// leaf (enforced by the leaf blueprint, not by this trait).
pub trait Searchable: Send + Sync {
    /// Cheap dictionary-only estimate, used by the plan builder before freeze.
    fn estimate_hits(&self, field: &str, term: &str) -> u64;
    fn fetch_postings(&self, field: &str, term: &str, strict: bool) -> Box<dyn Postings>;
}

/// A minimal, deterministic in-memory `Searchable` used by this crate's own
/// tests, mirroring the role `FakeSearchable` plays in the reference matcher.
pub struct FakeSearchable {
    postings: Mutex<BTreeMap<(String, String), Vec<DocId>>>,
}

impl FakeSearchable {
    pub fn new() -> Self {
        FakeSearchable { postings: Mutex::new(BTreeMap::new()) }
    }

    pub fn add_term(&self, field: &str, term: &str, docids: Vec<DocId>) {
        self.postings
            .lock()
            .unwrap()
            .insert((field.to_string(), term.to_string()), docids);
    }
}

impl Default for FakeSearchable {
    fn default() -> Self {
        FakeSearchable::new()
    }
}

struct FakePostings {
    docids: Vec<DocId>,
}

impl Postings for FakePostings {
    fn create_iterator(&self, _handle: Handle) -> Box<dyn SearchIterator> {
        Box::new(FakeIterator { docids: self.docids.clone(), pos: 0, end: DocId::new(0) })
    }
    fn estimated_hits(&self) -> u64 {
        self.docids.len() as u64
    }
}

struct FakeIterator {
    docids: Vec<DocId>,
    pos: usize,
    end: DocId,
}

impl SearchIterator for FakeIterator {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.pos = self.docids.partition_point(|d| d.value() < begin.value());
        self.end = end;
    }
    fn seek(&mut self, docid: DocId) -> DocId {
        while self.pos < self.docids.len() && self.docids[self.pos].value() < docid.value() {
            self.pos += 1;
        }
        if self.pos >= self.docids.len() || self.docids[self.pos].value() >= self.end.value() {
            self.end
        } else {
            self.docids[self.pos]
        }
    }
    fn unpack(&mut self, _docid: DocId, match_data: &mut MatchData) {
        match_data.record_unpack(Handle(0));
    }
}

impl Searchable for FakeSearchable {
    fn estimate_hits(&self, field: &str, term: &str) -> u64 {
        self.postings
            .lock()
            .unwrap()
            .get(&(field.to_string(), term.to_string()))
            .map(|v| v.len() as u64)
            .unwrap_or(0)
    }

    fn fetch_postings(&self, field: &str, term: &str, _strict: bool) -> Box<dyn Postings> {
        let docids = self
            .postings
            .lock()
            .unwrap()
            .get(&(field.to_string(), term.to_string()))
            .cloned()
            .unwrap_or_default();
        Box::new(FakePostings { docids })
    }
}
