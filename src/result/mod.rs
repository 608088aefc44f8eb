//! Result processor (C7): per-thread hit collection, grouping hooks, and the
//! final dual-merge + reply assembly.

pub mod grouping;
pub mod hit_collector;
pub mod merge;
pub mod partial_result;
pub mod reply;

pub use grouping::GroupingContext;
pub use hit_collector::{rank_order_cmp, HitCollector};
pub use merge::{MergeOrder, ResultProcessor};
pub use partial_result::PartialResult;
pub use reply::{assemble_reply, LidToGidResolver, Reply, ReplyHit};
