//! Plan builder (C4): walks a parsed query tree plus view resolution into a
//! frozen-ready [`PlanNode`] tree, allocating match-data handles as it goes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::types::Handle;

use super::ast::{QueryNode, TermKind};
use super::blueprint::PlanNode;
use super::searchable::Searchable;

/// How a view-resolved physical field is stored; determines which backend
/// serves the query against it (both ultimately call into [`Searchable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Attribute,
    Index,
}

/// Resolves a query-level field name to the physical fields that actually back
/// it. A field backed by more than one physical source becomes an `Or` of
/// per-source leaves at build time (the "mixer" step).
pub trait ViewResolver: Send + Sync {
    fn resolve(&self, field: &str) -> Vec<(String, FieldKind)>;
}

/// A resolver driven by an explicit field -> sources table, falling back to a
/// field resolving to itself (as an index field) when unregistered.
#[derive(Default)]
pub struct SimpleViewResolver {
    views: HashMap<String, Vec<(String, FieldKind)>>,
}

impl SimpleViewResolver {
    pub fn new() -> Self {
        SimpleViewResolver::default()
    }

    pub fn register(&mut self, field: impl Into<String>, sources: Vec<(String, FieldKind)>) {
        self.views.insert(field.into(), sources);
    }
}

impl ViewResolver for SimpleViewResolver {
    fn resolve(&self, field: &str) -> Vec<(String, FieldKind)> {
        self.views
            .get(field)
            .cloned()
            .unwrap_or_else(|| vec![(field.to_string(), FieldKind::Index)])
    }
}

/// A problem found during build that was handled by substituting a degenerate
/// node rather than failing the whole build.
#[derive(Debug, Clone, PartialEq)]
pub enum Issue {
    /// A `SAME-ELEMENT` spanned more than one field; replaced with `Empty`.
    SameElementMultiField { fields: Vec<String> },
    /// An `EQUIV` reached the builder still spanning more than one field; the
    /// field splitter should have already broken it into one `Equiv` per
    /// field, so this means a caller built a tree by hand without splitting.
    EquivMultiField { fields: Vec<String> },
}

pub struct PlanBuilder {
    searchable: Arc<dyn Searchable>,
    view_resolver: Arc<dyn ViewResolver>,
    doc_id_limit: u32,
    next_handle: AtomicU32,
}

impl PlanBuilder {
    pub fn new(searchable: Arc<dyn Searchable>, view_resolver: Arc<dyn ViewResolver>, doc_id_limit: u32) -> Self {
        PlanBuilder { searchable, view_resolver, doc_id_limit, next_handle: AtomicU32::new(1) }
    }

    pub fn build(&self, query: &QueryNode) -> (PlanNode, Vec<Issue>) {
        let mut issues = Vec::new();
        let node = self.build_node(query, &mut issues);
        (node, issues)
    }

    fn alloc_handle(&self) -> Handle {
        Handle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn build_node(&self, node: &QueryNode, issues: &mut Vec<Issue>) -> PlanNode {
        match node {
            QueryNode::And(children) => PlanNode::and(self.build_all(children, issues), self.doc_id_limit),
            QueryNode::Or(children) => PlanNode::or(self.build_all(children, issues), self.doc_id_limit),
            QueryNode::AndNot { matching, negated } => {
                let matching = self.build_node(matching, issues);
                PlanNode::and_not(matching, self.build_all(negated, issues), self.doc_id_limit)
            }
            QueryNode::Rank { first, rank_only } => {
                let first = self.build_node(first, issues);
                PlanNode::rank(first, self.build_all(rank_only, issues), self.doc_id_limit)
            }
            QueryNode::Near { children, .. } => PlanNode::near(self.build_all(children, issues), self.doc_id_limit),
            QueryNode::ONear { children, .. } => PlanNode::onear(self.build_all(children, issues), self.doc_id_limit),
            QueryNode::WeakAnd { children, .. } => PlanNode::weak_and(self.build_all(children, issues), self.doc_id_limit),
            QueryNode::Equiv(children) => {
                let built = self.build_all(children, issues);
                let mut fields: Vec<String> = built.iter().flat_map(|c| c.field_specs.iter().map(|fs| fs.name.clone())).collect();
                fields.sort();
                fields.dedup();
                if fields.len() > 1 {
                    issues.push(Issue::EquivMultiField { fields });
                    return PlanNode::empty(self.doc_id_limit);
                }
                // Exactly one field reaches this Equiv (the splitter guarantees
                // that), so the single handle allocated here is that field's
                // parent handle, aggregating every child's contribution into it.
                let handle = self.alloc_handle();
                PlanNode::equiv(built, handle, self.doc_id_limit)
            }
            QueryNode::SameElement { fields, children } => {
                if fields.len() != 1 {
                    issues.push(Issue::SameElementMultiField { fields: fields.clone() });
                    return PlanNode::empty(self.doc_id_limit);
                }
                let filter = PlanNode::and(self.build_all(children, issues), self.doc_id_limit);
                let evaluators = self.build_all(children, issues);
                PlanNode::same_element(filter, evaluators, self.doc_id_limit)
            }
            QueryNode::Phrase { fields, terms } => self.build_phrase(fields, terms),
            QueryNode::Term { fields, kind } => self.build_term(fields, kind),
            QueryNode::AlwaysTrue => PlanNode::always_true(self.doc_id_limit),
            QueryNode::AlwaysFalse => PlanNode::empty(self.doc_id_limit),
        }
    }

    fn build_all(&self, children: &[QueryNode], issues: &mut Vec<Issue>) -> Vec<PlanNode> {
        children.iter().map(|c| self.build_node(c, issues)).collect()
    }

    fn build_term(&self, fields: &[String], kind: &TermKind) -> PlanNode {
        assert_eq!(fields.len(), 1, "multi-field terms must be split before building (field_splitter)");
        let repr = term_repr(kind);
        let sources = self.view_resolver.resolve(&fields[0]);
        let leaves: Vec<PlanNode> = sources
            .iter()
            .map(|(source, _kind)| self.leaf(source, &repr))
            .collect();
        match leaves.len() {
            0 => PlanNode::empty(self.doc_id_limit),
            1 => leaves.into_iter().next().unwrap(),
            _ => PlanNode::or(leaves, self.doc_id_limit),
        }
    }

    fn build_phrase(&self, fields: &[String], terms: &[String]) -> PlanNode {
        assert_eq!(fields.len(), 1, "multi-field phrases must be split before building (field_splitter)");
        let sources = self.view_resolver.resolve(&fields[0]);
        let per_source: Vec<PlanNode> = sources
            .iter()
            .map(|(source, _kind)| {
                let term_nodes: Vec<PlanNode> = terms.iter().map(|t| self.leaf(source, t)).collect();
                PlanNode::and(term_nodes, self.doc_id_limit)
            })
            .collect();
        match per_source.len() {
            0 => PlanNode::empty(self.doc_id_limit),
            1 => per_source.into_iter().next().unwrap(),
            _ => PlanNode::or(per_source, self.doc_id_limit),
        }
    }

    fn leaf(&self, field: &str, term: &str) -> PlanNode {
        let handle = self.alloc_handle();
        let estimate = self.searchable.estimate_hits(field, term);
        PlanNode::term(field.to_string(), term.to_string(), handle, self.searchable.clone(), estimate, self.doc_id_limit)
    }
}

fn term_repr(kind: &TermKind) -> String {
    match kind {
        TermKind::Plain(t) => t.clone(),
        TermKind::WeightedSet(items) => format!("weightedset({items:?})"),
        TermKind::DotProduct(items) => format!("dotproduct({items:?})"),
        TermKind::Wand { terms, target_hits } => format!("wand({terms:?},{target_hits})"),
        TermKind::InTerms(terms) => format!("in({terms:?})"),
        TermKind::Fuzzy { term, max_edits } => format!("fuzzy({term},{max_edits})"),
        TermKind::Regex(r) => format!("regex({r})"),
        TermKind::Prefix(p) => format!("prefix({p})"),
        TermKind::Substring(s) => format!("substring({s})"),
        TermKind::Suffix(s) => format!("suffix({s})"),
        TermKind::Range { low, high } => format!("range({low},{high})"),
        TermKind::Location { x, y, radius } => format!("location({x},{y},{radius})"),
        TermKind::NearestNeighbor { query_tensor, target_hits } => format!("nns({query_tensor},{target_hits})"),
        TermKind::Predicate(p) => format!("predicate({p})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::searchable::FakeSearchable;
    use crate::types::DocId;

    #[test]
    fn builds_and_freezes_a_simple_term() {
        let fake = Arc::new(FakeSearchable::new());
        fake.add_term("title", "rust", vec![DocId::new(1), DocId::new(2)]);
        let resolver = Arc::new(SimpleViewResolver::new());
        let builder = PlanBuilder::new(fake, resolver, 10);
        let (node, issues) = builder.build(&QueryNode::term("title", "rust"));
        assert!(issues.is_empty());
        assert_eq!(node.estimate.hits, 2);
    }

    #[test]
    fn same_element_with_multiple_fields_becomes_empty_with_issue() {
        let fake = Arc::new(FakeSearchable::new());
        let resolver = Arc::new(SimpleViewResolver::new());
        let builder = PlanBuilder::new(fake, resolver, 10);
        let query = QueryNode::SameElement {
            fields: vec!["a".into(), "b".into()],
            children: vec![QueryNode::term("a", "x")],
        };
        let (node, issues) = builder.build(&query);
        assert!(node.is_empty_node());
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], Issue::SameElementMultiField { .. }));
    }

    #[test]
    fn mixer_step_ors_multiple_resolved_sources() {
        let fake = Arc::new(FakeSearchable::new());
        fake.add_term("title_idx", "rust", vec![DocId::new(1)]);
        fake.add_term("title_attr", "rust", vec![DocId::new(2)]);
        let mut resolver = SimpleViewResolver::new();
        resolver.register("title", vec![("title_idx".into(), FieldKind::Index), ("title_attr".into(), FieldKind::Attribute)]);
        let builder = PlanBuilder::new(fake, Arc::new(resolver), 10);
        let (node, _) = builder.build(&QueryNode::term("title", "rust"));
        assert_eq!(node.field_specs.len(), 2);
    }

    #[test]
    fn equiv_allocates_one_parent_handle_per_field_and_keeps_child_specs() {
        let fake = Arc::new(FakeSearchable::new());
        fake.add_term("title", "rust", vec![DocId::new(1)]);
        fake.add_term("title", "rustlang", vec![DocId::new(2)]);
        let resolver = Arc::new(SimpleViewResolver::new());
        let builder = PlanBuilder::new(fake, resolver, 10);
        let query = QueryNode::Equiv(vec![QueryNode::term("title", "rust"), QueryNode::term("title", "rustlang")]);
        let (node, issues) = builder.build(&query);
        assert!(issues.is_empty());
        assert_eq!(node.field_specs.len(), 2);
    }

    #[test]
    fn equiv_spanning_multiple_fields_is_rejected_as_not_yet_split() {
        let fake = Arc::new(FakeSearchable::new());
        fake.add_term("title", "rust", vec![DocId::new(1)]);
        fake.add_term("body", "rust", vec![DocId::new(2)]);
        let resolver = Arc::new(SimpleViewResolver::new());
        let builder = PlanBuilder::new(fake, resolver, 10);
        // A caller that builds straight from an un-split tree (bypassing the
        // field splitter) should not get a silently merged handle.
        let query = QueryNode::Equiv(vec![QueryNode::term("title", "rust"), QueryNode::term("body", "rust")]);
        let (node, issues) = builder.build(&query);
        assert!(node.is_empty_node());
        assert_eq!(issues.len(), 1);
        assert!(matches!(&issues[0], Issue::EquivMultiField { fields } if fields.len() == 2));
    }
}
