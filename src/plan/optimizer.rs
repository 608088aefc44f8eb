//! Stateless constant-folding rewrites over a built (pre-freeze) plan tree.

use super::blueprint::PlanNode;

/// See [`PlanNode::optimize`].
pub fn optimize(plan: PlanNode) -> PlanNode {
    plan.optimize()
}
