//! Query plan builder (C4): compiles a parsed query into a frozen plan tree
//! ready for per-thread iterator materialization.

pub mod ast;
pub mod blueprint;
pub mod builder;
pub mod field_splitter;
pub mod optimizer;
pub mod searchable;
pub mod whitelist;

pub use ast::{QueryNode, TermKind};
pub use blueprint::{Estimate, FieldSpec, PlanNode};
pub use builder::{FieldKind, Issue, PlanBuilder, SimpleViewResolver, ViewResolver};
pub use field_splitter::{split_fields, SplitOutcome};
pub use searchable::{EmptySearch, FakeSearchable, FullSearch, MatchData, Postings, SearchIterator, Searchable};
