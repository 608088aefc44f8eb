//! Composes the visibility whitelist (live, non-removed docids) onto a built
//! plan, without constraining ranking-only branches it doesn't need to.

use super::blueprint::PlanNode;

/// See [`PlanNode::splice_whitelist`].
pub fn compose(plan: PlanNode, whitelist: PlanNode) -> PlanNode {
    plan.splice_whitelist(whitelist)
}
