//! Docsum-time matching (§4.10): re-runs matching for `getSummaryFeatures`,
//! `getRankFeatures`, and `getMatchingElements` over a fixed docid list,
//! reusing a frozen plan instead of building one per summary request.

use crate::plan::{MatchData, PlanNode};
use crate::thread::RankProgram;
use crate::types::{normalize_score, DocId, Handle};

/// One docid's outcome: its score under the given rank program, plus which
/// handles its iterators actually touched (the out-of-scope feature evaluator
/// would key its own per-feature values off the same handle set).
pub struct DocsumMatch {
    pub docid: DocId,
    pub score: f64,
    pub touched_handles: Vec<Handle>,
}

/// Wraps a single frozen plan + rank program for repeated docsum-time lookups.
/// A real backend builds one of these per `(rank profile, summary class)` pair,
/// caching it on the `SearchSession` it was born from rather than rebuilding
/// per request.
pub struct DocsumMatcher<'a> {
    plan: &'a PlanNode,
    rank_program: &'a dyn RankProgram,
    doc_id_limit: u32,
}

impl<'a> DocsumMatcher<'a> {
    pub fn new(plan: &'a PlanNode, rank_program: &'a dyn RankProgram, doc_id_limit: u32) -> Self {
        DocsumMatcher { plan, rank_program, doc_id_limit }
    }

    /// Runs every docid through a fresh iterator over the full range. Docids
    /// not found by the plan's own postings (filtered out, e.g. by ACLs before
    /// this summary request runs) are skipped, not scored as zero.
    pub fn run(&self, docids: &[DocId]) -> Vec<DocsumMatch> {
        let mut match_data = MatchData::new();
        let mut iterator = self.plan.create_search(&mut match_data, false);
        iterator.init_range(DocId::new(0), DocId::new(self.doc_id_limit));

        let mut results = Vec::with_capacity(docids.len());
        for &docid in docids {
            match_data.reset();
            if iterator.seek(docid) != docid {
                continue;
            }
            iterator.unpack(docid, &mut match_data);
            let score = normalize_score(self.rank_program.score(docid, &match_data));
            results.push(DocsumMatch { docid, score, touched_handles: match_data.touched_handles().to_vec() });
        }
        results
    }

    /// `getSummaryFeatures`/`getRankFeatures` both want the same scored,
    /// handle-tagged pass; only the caller's downstream feature renderer
    /// differs, and that renderer lives outside this crate's scope (§1).
    pub fn summary_features(&self, docids: &[DocId]) -> Vec<DocsumMatch> {
        self.run(docids)
    }

    pub fn rank_features(&self, docids: &[DocId]) -> Vec<DocsumMatch> {
        self.run(docids)
    }

    /// `getMatchingElements`: same re-match, callers only care which handles
    /// (i.e. which struct-field elements) actually matched, not the score.
    pub fn matching_elements(&self, docids: &[DocId]) -> Vec<(DocId, Vec<Handle>)> {
        self.run(docids).into_iter().map(|m| (m.docid, m.touched_handles)).collect()
    }
}
