//! Rewrites a query tree so every `Term`/`Phrase`/`SameElement` leaf refers to
//! exactly one field, splitting multi-field leaves into an `Or` of per-field
//! copies before the plan builder ever sees them (§4.4).

use std::collections::HashMap;

use super::ast::QueryNode;

/// Result of a (possibly no-op) split pass.
pub struct SplitOutcome {
    pub tree: QueryNode,
    pub changed: bool,
}

/// Idempotent: a tree with no multi-field leaves is returned unchanged, and
/// running this again on an already-split tree is a no-op.
pub fn split_fields(node: &QueryNode) -> SplitOutcome {
    let (tree, changed) = split(node);
    SplitOutcome { tree, changed }
}

fn split(node: &QueryNode) -> (QueryNode, bool) {
    match node {
        QueryNode::Term { fields, kind } if fields.len() > 1 => {
            let variants = fields
                .iter()
                .map(|f| QueryNode::Term { fields: vec![f.clone()], kind: kind.clone() })
                .collect();
            (QueryNode::Or(variants), true)
        }
        QueryNode::Phrase { fields, terms } if fields.len() > 1 => {
            let variants = fields
                .iter()
                .map(|f| QueryNode::Phrase { fields: vec![f.clone()], terms: terms.clone() })
                .collect();
            (QueryNode::Or(variants), true)
        }
        QueryNode::SameElement { fields, children } if fields.len() > 1 && children_share_all_fields(children, fields) => {
            let split_children: Vec<QueryNode> = children.iter().map(|c| split(c).0).collect();
            let variants = fields
                .iter()
                .map(|f| QueryNode::SameElement { fields: vec![f.clone()], children: split_children.clone() })
                .collect();
            (QueryNode::Or(variants), true)
        }
        QueryNode::SameElement { fields, children } => {
            let mut changed = false;
            let split_children = split_all(children, &mut changed);
            (QueryNode::SameElement { fields: fields.clone(), children: split_children }, changed)
        }
        QueryNode::And(children) => {
            let mut changed = false;
            (QueryNode::And(split_all(children, &mut changed)), changed)
        }
        QueryNode::Or(children) => {
            let mut changed = false;
            (QueryNode::Or(split_all(children, &mut changed)), changed)
        }
        QueryNode::Equiv(children) => {
            let mut child_changed = false;
            let split_children = split_all(children, &mut child_changed);

            let mut field_order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, Vec<QueryNode>> = HashMap::new();
            for child in &split_children {
                for field in child.fields() {
                    if let Some(restricted) = restrict_to_field(child, &field) {
                        if !groups.contains_key(&field) {
                            field_order.push(field.clone());
                        }
                        groups.entry(field).or_default().push(restricted);
                    }
                }
            }

            if field_order.len() <= 1 {
                (QueryNode::Equiv(split_children), child_changed)
            } else {
                let variants: Vec<QueryNode> =
                    field_order.into_iter().map(|f| QueryNode::Equiv(groups.remove(&f).expect("field was just recorded"))).collect();
                (QueryNode::Or(variants), true)
            }
        }
        QueryNode::Near { distance, children } => {
            let mut changed = false;
            (QueryNode::Near { distance: *distance, children: split_all(children, &mut changed) }, changed)
        }
        QueryNode::ONear { distance, children } => {
            let mut changed = false;
            (QueryNode::ONear { distance: *distance, children: split_all(children, &mut changed) }, changed)
        }
        QueryNode::WeakAnd { target_hits, children } => {
            let mut changed = false;
            (QueryNode::WeakAnd { target_hits: *target_hits, children: split_all(children, &mut changed) }, changed)
        }
        QueryNode::AndNot { matching, negated } => {
            let (matching, c1) = split(matching);
            let mut changed = c1;
            let negated = split_all(negated, &mut changed);
            (QueryNode::AndNot { matching: Box::new(matching), negated }, changed)
        }
        QueryNode::Rank { first, rank_only } => {
            let (first, c1) = split(first);
            let mut changed = c1;
            let rank_only = split_all(rank_only, &mut changed);
            (QueryNode::Rank { first: Box::new(first), rank_only }, changed)
        }
        other => (other.clone(), false),
    }
}

/// `SAME-ELEMENT` can only be split field-by-field when every child already
/// touches exactly the same field set as the node itself; a child narrower or
/// wider than that set would change meaning if pulled apart per field.
fn children_share_all_fields(children: &[QueryNode], fields: &[String]) -> bool {
    let mut expected = fields.to_vec();
    expected.sort();
    children.iter().all(|c| {
        let mut child_fields = c.fields();
        child_fields.sort();
        child_fields == expected
    })
}

/// Narrows `node` to the contribution it makes to a single `field`, the way
/// the original forces a field id while revisiting an `Equiv` child. Returns
/// `None` when `node` doesn't resolve to exactly that field (e.g. it spans
/// other fields too, or carries no field info at all).
fn restrict_to_field(node: &QueryNode, field: &str) -> Option<QueryNode> {
    match node {
        QueryNode::Term { fields, kind } if fields.iter().any(|f| f == field) => {
            Some(QueryNode::Term { fields: vec![field.to_string()], kind: kind.clone() })
        }
        QueryNode::Phrase { fields, terms } if fields.iter().any(|f| f == field) => {
            Some(QueryNode::Phrase { fields: vec![field.to_string()], terms: terms.clone() })
        }
        QueryNode::SameElement { fields, children } if fields.iter().any(|f| f == field) => {
            Some(QueryNode::SameElement { fields: vec![field.to_string()], children: children.clone() })
        }
        other => {
            let fields = other.fields();
            (fields.len() == 1 && fields[0] == field).then(|| other.clone())
        }
    }
}

fn split_all(children: &[QueryNode], changed: &mut bool) -> Vec<QueryNode> {
    children
        .iter()
        .map(|c| {
            let (tree, c_changed) = split(c);
            *changed |= c_changed;
            tree
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ast::TermKind;

    #[test]
    fn splits_multi_field_term_into_or() {
        let node = QueryNode::Term { fields: vec!["title".into(), "body".into()], kind: TermKind::Plain("rust".into()) };
        let out = split_fields(&node);
        assert!(out.changed);
        match out.tree {
            QueryNode::Or(children) => assert_eq!(children.len(), 2),
            _ => panic!("expected Or"),
        }
    }

    #[test]
    fn single_field_term_is_untouched() {
        let node = QueryNode::term("title", "rust");
        let out = split_fields(&node);
        assert!(!out.changed);
        assert_eq!(out.tree, node);
    }

    #[test]
    fn is_idempotent() {
        let node = QueryNode::Term { fields: vec!["title".into(), "body".into()], kind: TermKind::Plain("rust".into()) };
        let once = split_fields(&node);
        let twice = split_fields(&once.tree);
        assert!(!twice.changed);
        assert_eq!(once.tree, twice.tree);
    }

    #[test]
    fn recurses_into_composition_nodes() {
        let node = QueryNode::and(vec![
            QueryNode::Term { fields: vec!["a".into(), "b".into()], kind: TermKind::Plain("x".into()) },
            QueryNode::term("c", "y"),
        ]);
        let out = split_fields(&node);
        assert!(out.changed);
    }

    #[test]
    fn equiv_groups_children_by_field_into_one_equiv_per_field() {
        let node = QueryNode::Equiv(vec![QueryNode::term("title", "rust"), QueryNode::term("body", "rust")]);
        let out = split_fields(&node);
        assert!(out.changed);
        match out.tree {
            QueryNode::Or(variants) => {
                assert_eq!(variants.len(), 2);
                for v in variants {
                    match v {
                        QueryNode::Equiv(children) => assert_eq!(children.len(), 1),
                        other => panic!("expected per-field Equiv, got {other:?}"),
                    }
                }
            }
            other => panic!("expected Or of per-field Equiv, got {other:?}"),
        }
    }

    #[test]
    fn equiv_with_all_children_on_one_field_is_untouched() {
        let node = QueryNode::Equiv(vec![QueryNode::term("title", "rust"), QueryNode::term("title", "rustlang")]);
        let out = split_fields(&node);
        assert!(!out.changed);
        match out.tree {
            QueryNode::Equiv(children) => assert_eq!(children.len(), 2),
            other => panic!("expected untouched Equiv, got {other:?}"),
        }
    }

    #[test]
    fn same_element_splits_when_every_child_shares_its_full_field_set() {
        let node = QueryNode::SameElement {
            fields: vec!["a".into(), "b".into()],
            children: vec![
                QueryNode::Term { fields: vec!["a".into(), "b".into()], kind: TermKind::Plain("x".into()) },
                QueryNode::Term { fields: vec!["a".into(), "b".into()], kind: TermKind::Plain("y".into()) },
            ],
        };
        let out = split_fields(&node);
        assert!(out.changed);
        match out.tree {
            QueryNode::Or(variants) => assert_eq!(variants.len(), 2),
            other => panic!("expected Or, got {other:?}"),
        }
    }

    #[test]
    fn same_element_is_not_split_when_children_have_incompatible_fields() {
        let node = QueryNode::SameElement {
            fields: vec!["a".into(), "b".into()],
            children: vec![QueryNode::term("a", "x"), QueryNode::term("b", "y")],
        };
        let out = split_fields(&node);
        match out.tree {
            QueryNode::SameElement { fields, .. } => assert_eq!(fields, vec!["a".to_string(), "b".to_string()]),
            other => panic!("expected unsplit SameElement, got {other:?}"),
        }
    }
}
