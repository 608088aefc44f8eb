//! The parsed query tree handed to the plan builder. Wire framing for
//! `stackRef` deserialization is the caller's business (§6); this is the
//! already-parsed shape the builder walks.

/// Kinds of multi-term leaf a single field position can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum TermKind {
    Plain(String),
    WeightedSet(Vec<(String, i64)>),
    DotProduct(Vec<(String, f64)>),
    Wand { terms: Vec<(String, i64)>, target_hits: u32 },
    InTerms(Vec<String>),
    Fuzzy { term: String, max_edits: u8 },
    Regex(String),
    Prefix(String),
    Substring(String),
    Suffix(String),
    Range { low: f64, high: f64 },
    Location { x: f64, y: f64, radius: f64 },
    NearestNeighbor { query_tensor: String, target_hits: u32 },
    Predicate(String),
}

/// One query node. Composition nodes carry their children directly; term nodes
/// carry every field they were written against (multi-field terms are split
/// into per-field `OR` groups by the field splitter before plan building, §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    /// Left drives matching; right contributes only to ranking.
    AndNot { matching: Box<QueryNode>, negated: Vec<QueryNode> },
    Rank { first: Box<QueryNode>, rank_only: Vec<QueryNode> },
    Near { distance: u32, children: Vec<QueryNode> },
    ONear { distance: u32, children: Vec<QueryNode> },
    WeakAnd { target_hits: u32, children: Vec<QueryNode> },
    Equiv(Vec<QueryNode>),
    SameElement { fields: Vec<String>, children: Vec<QueryNode> },
    Phrase { fields: Vec<String>, terms: Vec<String> },
    Term { fields: Vec<String>, kind: TermKind },
    AlwaysTrue,
    AlwaysFalse,
}

impl QueryNode {
    pub fn term(field: impl Into<String>, term: impl Into<String>) -> Self {
        QueryNode::Term { fields: vec![field.into()], kind: TermKind::Plain(term.into()) }
    }

    pub fn and(children: Vec<QueryNode>) -> Self {
        QueryNode::And(children)
    }

    pub fn or(children: Vec<QueryNode>) -> Self {
        QueryNode::Or(children)
    }

    /// Every field this node (and its descendants) refers to, in first-seen order.
    pub fn fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields(&self, out: &mut Vec<String>) {
        let push_all = |fields: &[String], out: &mut Vec<String>| {
            for f in fields {
                if !out.contains(f) {
                    out.push(f.clone());
                }
            }
        };
        match self {
            QueryNode::Term { fields, .. } | QueryNode::Phrase { fields, .. } | QueryNode::SameElement { fields, .. } => {
                push_all(fields, out)
            }
            QueryNode::And(cs) | QueryNode::Or(cs) | QueryNode::Equiv(cs) => {
                for c in cs {
                    c.collect_fields(out);
                }
            }
            QueryNode::Near { children, .. } | QueryNode::ONear { children, .. } | QueryNode::WeakAnd { children, .. } => {
                for c in children {
                    c.collect_fields(out);
                }
            }
            QueryNode::AndNot { matching, negated } => {
                matching.collect_fields(out);
                for c in negated {
                    c.collect_fields(out);
                }
            }
            QueryNode::Rank { first, rank_only } => {
                first.collect_fields(out);
                for c in rank_only {
                    c.collect_fields(out);
                }
            }
            QueryNode::AlwaysTrue | QueryNode::AlwaysFalse => {}
        }
    }
}
