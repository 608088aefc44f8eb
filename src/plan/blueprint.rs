//! The frozen plan tree (C4): the pre-materialization shape of a search
//! iterator, with per-node estimates, field specs, and one-shot posting fetch.

use std::sync::{Arc, Mutex};

use crate::types::{DocId, Handle};

use super::searchable::{EmptySearch, FullSearch, MatchData, Postings, SearchIterator, Searchable};

/// A field this node reaches, with the handle allocated for it (if any).
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub handle: Option<Handle>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Estimate {
    pub hits: u64,
    pub empty: bool,
}

enum NodeKind {
    And(Vec<PlanNode>),
    Or(Vec<PlanNode>),
    AndNot { matching: Box<PlanNode>, negated: Vec<PlanNode> },
    Rank { first: Box<PlanNode>, rank_only: Vec<PlanNode> },
    /// Positional proximity threshold is an index-internal concern (§1, out of
    /// scope); structurally this behaves as an `And` over its children.
    Near { children: Vec<PlanNode> },
    /// Same simplification as `Near`, plus ordering (also out of scope).
    ONear { children: Vec<PlanNode> },
    /// Top-k candidate selection and stop-word handling are index-internal
    /// (§1); structurally this behaves as an `Or` over its children.
    WeakAnd { children: Vec<PlanNode> },
    /// Children write into their own local handles; `parent_handle` aggregates.
    Equiv { children: Vec<PlanNode>, parent_handle: Handle },
    /// `filter` is the cheap `And`-guard candidate set built by the same-element
    /// builder (§4.4); `evaluators` hold the real per-child matching logic.
    SameElement { filter: Box<PlanNode>, evaluators: Vec<PlanNode> },
    Term(LeafBlueprint),
    AlwaysTrue,
    Empty,
}

struct LeafBlueprint {
    field: String,
    term: String,
    handle: Handle,
    searchable: Arc<dyn Searchable>,
    postings: Mutex<Option<Arc<dyn Postings>>>,
}

/// A node in the plan tree. Composition nodes own their children directly;
/// estimates are rolled up bottom-up at construction time.
pub struct PlanNode {
    pub estimate: Estimate,
    pub field_specs: Vec<FieldSpec>,
    pub doc_id_limit: u32,
    frozen: bool,
    kind: NodeKind,
}

impl PlanNode {
    pub fn always_true(doc_id_limit: u32) -> Self {
        PlanNode {
            estimate: Estimate { hits: doc_id_limit as u64, empty: doc_id_limit <= 1 },
            field_specs: Vec::new(),
            doc_id_limit,
            frozen: false,
            kind: NodeKind::AlwaysTrue,
        }
    }

    pub fn empty(doc_id_limit: u32) -> Self {
        PlanNode {
            estimate: Estimate { hits: 0, empty: true },
            field_specs: Vec::new(),
            doc_id_limit,
            frozen: false,
            kind: NodeKind::Empty,
        }
    }

    pub fn term(
        field: String,
        term: String,
        handle: Handle,
        searchable: Arc<dyn Searchable>,
        estimate_hits: u64,
        doc_id_limit: u32,
    ) -> Self {
        PlanNode {
            estimate: Estimate { hits: estimate_hits, empty: estimate_hits == 0 },
            field_specs: vec![FieldSpec { name: field.clone(), handle: Some(handle) }],
            doc_id_limit,
            frozen: false,
            kind: NodeKind::Term(LeafBlueprint { field, term, handle, searchable, postings: Mutex::new(None) }),
        }
    }

    pub fn and(children: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let hits = children.iter().map(|c| c.estimate.hits).min().unwrap_or(0);
        let empty = children.iter().any(|c| c.estimate.empty);
        let field_specs = children.iter().flat_map(|c| c.field_specs.clone()).collect();
        PlanNode { estimate: Estimate { hits, empty }, field_specs, doc_id_limit, frozen: false, kind: NodeKind::And(children) }
    }

    pub fn or(children: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let hits: u64 = children.iter().map(|c| c.estimate.hits).sum::<u64>().min(doc_id_limit as u64);
        let empty = children.iter().all(|c| c.estimate.empty);
        let field_specs = children.iter().flat_map(|c| c.field_specs.clone()).collect();
        PlanNode { estimate: Estimate { hits, empty }, field_specs, doc_id_limit, frozen: false, kind: NodeKind::Or(children) }
    }

    pub fn and_not(matching: PlanNode, negated: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let estimate = matching.estimate;
        let field_specs = matching.field_specs.clone();
        PlanNode {
            estimate,
            field_specs,
            doc_id_limit,
            frozen: false,
            kind: NodeKind::AndNot { matching: Box::new(matching), negated },
        }
    }

    pub fn rank(first: PlanNode, rank_only: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let estimate = first.estimate;
        let mut field_specs = first.field_specs.clone();
        field_specs.extend(rank_only.iter().flat_map(|c| c.field_specs.clone()));
        PlanNode {
            estimate,
            field_specs,
            doc_id_limit,
            frozen: false,
            kind: NodeKind::Rank { first: Box::new(first), rank_only },
        }
    }

    pub fn near(children: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let inner = PlanNode::and(children, doc_id_limit);
        PlanNode { kind: NodeKind::Near { children: inner.into_and_children() }, ..inner }
    }

    pub fn onear(children: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let inner = PlanNode::and(children, doc_id_limit);
        PlanNode { kind: NodeKind::ONear { children: inner.into_and_children() }, ..inner }
    }

    pub fn weak_and(children: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let inner = PlanNode::or(children, doc_id_limit);
        PlanNode { kind: NodeKind::WeakAnd { children: inner.into_or_children() }, ..inner }
    }

    pub fn equiv(children: Vec<PlanNode>, parent_handle: Handle, doc_id_limit: u32) -> Self {
        let hits: u64 = children.iter().map(|c| c.estimate.hits).sum::<u64>().min(doc_id_limit as u64);
        let empty = children.iter().all(|c| c.estimate.empty);
        let field_specs = children.iter().flat_map(|c| c.field_specs.clone()).collect();
        PlanNode {
            estimate: Estimate { hits, empty },
            field_specs,
            doc_id_limit,
            frozen: false,
            kind: NodeKind::Equiv { children, parent_handle },
        }
    }

    pub fn same_element(filter: PlanNode, evaluators: Vec<PlanNode>, doc_id_limit: u32) -> Self {
        let estimate = filter.estimate;
        let field_specs = filter.field_specs.clone();
        PlanNode {
            estimate,
            field_specs,
            doc_id_limit,
            frozen: false,
            kind: NodeKind::SameElement { filter: Box::new(filter), evaluators },
        }
    }

    fn into_and_children(self) -> Vec<PlanNode> {
        match self.kind {
            NodeKind::And(c) => c,
            other => vec![PlanNode { kind: other, ..self }],
        }
    }

    fn into_or_children(self) -> Vec<PlanNode> {
        match self.kind {
            NodeKind::Or(c) => c,
            other => vec![PlanNode { kind: other, ..self }],
        }
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self.kind, NodeKind::AlwaysTrue)
    }

    pub fn is_empty_node(&self) -> bool {
        matches!(self.kind, NodeKind::Empty) || self.estimate.empty
    }

    pub fn set_doc_id_limit(&mut self, doc_id_limit: u32) {
        assert!(!self.frozen, "doc_id_limit must be set before freeze");
        self.doc_id_limit = doc_id_limit;
        self.for_each_child_mut(|c| c.set_doc_id_limit(doc_id_limit));
    }

    fn for_each_child_mut(&mut self, mut f: impl FnMut(&mut PlanNode)) {
        match &mut self.kind {
            NodeKind::And(c) | NodeKind::Or(c) | NodeKind::Near { children: c } | NodeKind::ONear { children: c } | NodeKind::WeakAnd { children: c } => {
                for child in c {
                    f(child);
                }
            }
            NodeKind::Equiv { children, .. } => {
                for child in children {
                    f(child);
                }
            }
            NodeKind::AndNot { matching, negated } => {
                f(matching);
                for child in negated {
                    f(child);
                }
            }
            NodeKind::Rank { first, rank_only } => {
                f(first);
                for child in rank_only {
                    f(child);
                }
            }
            NodeKind::SameElement { filter, evaluators } => {
                f(filter);
                for child in evaluators {
                    f(child);
                }
            }
            NodeKind::Term(_) | NodeKind::AlwaysTrue | NodeKind::Empty => {}
        }
    }

    /// No structural edits permitted after this (§3 invariant).
    pub fn freeze(&mut self) {
        self.frozen = true;
        self.for_each_child_mut(|c| c.freeze());
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Composes a whitelist restriction onto this plan. Descends through the
    /// leftmost `Rank`/`AndNot` chain so the whitelist only constrains the side
    /// that drives matching, rather than every ranking-only branch.
    pub fn splice_whitelist(self, whitelist: PlanNode) -> PlanNode {
        let doc_id_limit = self.doc_id_limit;
        match self.kind {
            NodeKind::Rank { first, rank_only } => {
                PlanNode::rank(first.splice_whitelist(whitelist), rank_only, doc_id_limit)
            }
            NodeKind::AndNot { matching, negated } => {
                PlanNode::and_not(matching.splice_whitelist(whitelist), negated, doc_id_limit)
            }
            kind => PlanNode::and(vec![PlanNode { kind, ..self }, whitelist], doc_id_limit),
        }
    }

    /// Stateless constant-folding pass: drops `AlwaysTrue` from `And`, collapses
    /// `And`/`Or` with an empty/single-surviving child, flattens nested same-kind
    /// composition nodes. Run before freeze; never changes match semantics.
    pub fn optimize(self) -> PlanNode {
        let doc_id_limit = self.doc_id_limit;
        match self.kind {
            NodeKind::And(children) => {
                let mut flat = Vec::new();
                for c in children {
                    let c = c.optimize();
                    if c.is_empty_node() {
                        return PlanNode::empty(doc_id_limit);
                    }
                    if c.is_always_true() {
                        continue;
                    }
                    match c.kind {
                        NodeKind::And(inner) => flat.extend(inner),
                        kind => flat.push(PlanNode { kind, ..c }),
                    }
                }
                match flat.len() {
                    0 => PlanNode::always_true(doc_id_limit),
                    1 => flat.into_iter().next().unwrap(),
                    _ => PlanNode::and(flat, doc_id_limit),
                }
            }
            NodeKind::Or(children) => {
                let mut flat = Vec::new();
                for c in children {
                    let c = c.optimize();
                    if c.is_always_true() {
                        return PlanNode::always_true(doc_id_limit);
                    }
                    if c.is_empty_node() {
                        continue;
                    }
                    match c.kind {
                        NodeKind::Or(inner) => flat.extend(inner),
                        kind => flat.push(PlanNode { kind, ..c }),
                    }
                }
                match flat.len() {
                    0 => PlanNode::empty(doc_id_limit),
                    1 => flat.into_iter().next().unwrap(),
                    _ => PlanNode::or(flat, doc_id_limit),
                }
            }
            NodeKind::AndNot { matching, negated } => {
                let matching = matching.optimize();
                if matching.is_empty_node() {
                    return matching;
                }
                let negated: Vec<PlanNode> = negated.into_iter().map(|c| c.optimize()).filter(|c| !c.is_empty_node()).collect();
                if negated.is_empty() {
                    matching
                } else {
                    PlanNode::and_not(matching, negated, doc_id_limit)
                }
            }
            NodeKind::Rank { first, rank_only } => {
                let first = first.optimize();
                let rank_only: Vec<PlanNode> = rank_only.into_iter().map(|c| c.optimize()).collect();
                PlanNode::rank(first, rank_only, doc_id_limit)
            }
            NodeKind::Near { children } => PlanNode::near(children.into_iter().map(|c| c.optimize()).collect(), doc_id_limit),
            NodeKind::ONear { children } => PlanNode::onear(children.into_iter().map(|c| c.optimize()).collect(), doc_id_limit),
            NodeKind::WeakAnd { children } => PlanNode::weak_and(children.into_iter().map(|c| c.optimize()).collect(), doc_id_limit),
            NodeKind::Equiv { children, parent_handle } => {
                PlanNode::equiv(children.into_iter().map(|c| c.optimize()).collect(), parent_handle, doc_id_limit)
            }
            NodeKind::SameElement { filter, evaluators } => {
                PlanNode::same_element(filter.optimize(), evaluators.into_iter().map(|c| c.optimize()).collect(), doc_id_limit)
            }
            kind @ (NodeKind::Term(_) | NodeKind::AlwaysTrue | NodeKind::Empty) => PlanNode { kind, ..self },
        }
    }

    /// One-shot across the whole tree; panics if called twice on the same leaf.
    pub fn fetch_postings(&self, strict: bool) {
        assert!(self.frozen, "fetch_postings requires a frozen plan");
        match &self.kind {
            NodeKind::Term(leaf) => {
                let mut slot = leaf.postings.lock().unwrap();
                assert!(slot.is_none(), "fetch_postings called twice on the same leaf");
                *slot = Some(Arc::from(leaf.searchable.fetch_postings(&leaf.field, &leaf.term, strict)));
            }
            NodeKind::And(c) | NodeKind::Or(c) | NodeKind::Near { children: c } | NodeKind::ONear { children: c } | NodeKind::WeakAnd { children: c } => {
                for child in c {
                    child.fetch_postings(strict);
                }
            }
            NodeKind::Equiv { children, .. } => {
                for child in children {
                    child.fetch_postings(strict);
                }
            }
            NodeKind::AndNot { matching, negated } => {
                matching.fetch_postings(strict);
                for child in negated {
                    child.fetch_postings(false);
                }
            }
            NodeKind::Rank { first, rank_only } => {
                first.fetch_postings(strict);
                for child in rank_only {
                    child.fetch_postings(false);
                }
            }
            NodeKind::SameElement { filter, evaluators } => {
                filter.fetch_postings(strict);
                for child in evaluators {
                    child.fetch_postings(false);
                }
            }
            NodeKind::AlwaysTrue | NodeKind::Empty => {}
        }
    }

    /// Materializes one per-thread iterator over this (frozen) plan.
    pub fn create_search(&self, match_data: &mut MatchData, strict: bool) -> Box<dyn SearchIterator> {
        assert!(self.frozen, "create_search requires a frozen plan");
        match &self.kind {
            NodeKind::AlwaysTrue => Box::new(FullSearch::default()),
            NodeKind::Empty => Box::new(EmptySearch::default()),
            NodeKind::Term(leaf) => {
                let postings = leaf.postings.lock().unwrap();
                let postings = postings.as_ref().expect("fetch_postings must run before create_search");
                postings.create_iterator(leaf.handle)
            }
            NodeKind::And(children) | NodeKind::Near { children } | NodeKind::ONear { children } => {
                let its = children.iter().map(|c| c.create_search(match_data, strict)).collect();
                Box::new(AndSearch::new(its))
            }
            NodeKind::Or(children) | NodeKind::WeakAnd { children } => {
                let its = children.iter().map(|c| c.create_search(match_data, strict)).collect();
                Box::new(OrSearch::new(its))
            }
            NodeKind::Equiv { children, .. } => {
                let its = children.iter().map(|c| c.create_search(match_data, strict)).collect();
                Box::new(OrSearch::new(its))
            }
            NodeKind::AndNot { matching, negated } => {
                let first = matching.create_search(match_data, strict);
                let rest = negated.iter().map(|c| c.create_search(match_data, false)).collect();
                Box::new(AndNotSearch::new(first, rest))
            }
            NodeKind::Rank { first, rank_only } => {
                let matching = first.create_search(match_data, strict);
                let ranking = rank_only.iter().map(|c| c.create_search(match_data, false)).collect();
                Box::new(RankSearch::new(matching, ranking))
            }
            NodeKind::SameElement { filter, .. } => filter.create_search(match_data, strict),
        }
    }
}

/// Intersection: matches only where every child matches.
struct AndSearch {
    children: Vec<Box<dyn SearchIterator>>,
    end: DocId,
}

impl AndSearch {
    fn new(children: Vec<Box<dyn SearchIterator>>) -> Self {
        AndSearch { children, end: DocId::new(0) }
    }
}

impl SearchIterator for AndSearch {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.end = end;
        for c in &mut self.children {
            c.init_range(begin, end);
        }
    }

    fn seek(&mut self, docid: DocId) -> DocId {
        if self.children.is_empty() {
            return self.end;
        }
        let mut candidate = docid;
        'outer: loop {
            for c in &mut self.children {
                let found = c.seek(candidate);
                if found.value() >= self.end.value() {
                    return self.end;
                }
                if found != candidate {
                    candidate = found;
                    continue 'outer;
                }
            }
            return candidate;
        }
    }

    fn unpack(&mut self, docid: DocId, match_data: &mut MatchData) {
        for c in &mut self.children {
            c.unpack(docid, match_data);
        }
    }
}

/// Union: matches where any child matches.
struct OrSearch {
    children: Vec<Box<dyn SearchIterator>>,
    end: DocId,
}

impl OrSearch {
    fn new(children: Vec<Box<dyn SearchIterator>>) -> Self {
        OrSearch { children, end: DocId::new(0) }
    }
}

impl SearchIterator for OrSearch {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.end = end;
        for c in &mut self.children {
            c.init_range(begin, end);
        }
    }

    fn seek(&mut self, docid: DocId) -> DocId {
        let mut best = self.end;
        for c in &mut self.children {
            let found = c.seek(docid);
            if found.value() < best.value() {
                best = found;
            }
        }
        best
    }

    fn unpack(&mut self, docid: DocId, match_data: &mut MatchData) {
        for c in &mut self.children {
            if c.seek(docid) == docid {
                c.unpack(docid, match_data);
            }
        }
    }
}

/// Matching side drives the iteration; negated side only excludes.
struct AndNotSearch {
    matching: Box<dyn SearchIterator>,
    negated: Vec<Box<dyn SearchIterator>>,
    end: DocId,
}

impl AndNotSearch {
    fn new(matching: Box<dyn SearchIterator>, negated: Vec<Box<dyn SearchIterator>>) -> Self {
        AndNotSearch { matching, negated, end: DocId::new(0) }
    }
}

impl SearchIterator for AndNotSearch {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.end = end;
        self.matching.init_range(begin, end);
        for c in &mut self.negated {
            c.init_range(begin, end);
        }
    }

    fn seek(&mut self, docid: DocId) -> DocId {
        let mut candidate = self.matching.seek(docid);
        while candidate.value() < self.end.value() {
            let excluded = self.negated.iter_mut().any(|c| c.seek(candidate) == candidate);
            if !excluded {
                return candidate;
            }
            candidate = self.matching.seek(DocId::new(candidate.value() + 1));
        }
        self.end
    }

    fn unpack(&mut self, docid: DocId, match_data: &mut MatchData) {
        self.matching.unpack(docid, match_data);
    }
}

/// Left drives matching; right contributes match-data for ranking only.
struct RankSearch {
    matching: Box<dyn SearchIterator>,
    ranking: Vec<Box<dyn SearchIterator>>,
}

impl RankSearch {
    fn new(matching: Box<dyn SearchIterator>, ranking: Vec<Box<dyn SearchIterator>>) -> Self {
        RankSearch { matching, ranking }
    }
}

impl SearchIterator for RankSearch {
    fn init_range(&mut self, begin: DocId, end: DocId) {
        self.matching.init_range(begin, end);
        for c in &mut self.ranking {
            c.init_range(begin, end);
        }
    }

    fn seek(&mut self, docid: DocId) -> DocId {
        self.matching.seek(docid)
    }

    fn unpack(&mut self, docid: DocId, match_data: &mut MatchData) {
        self.matching.unpack(docid, match_data);
        for c in &mut self.ranking {
            if c.seek(docid) == docid {
                c.unpack(docid, match_data);
            }
        }
    }
}
