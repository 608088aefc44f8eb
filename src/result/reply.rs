//! Reply assembly: resolves local docids to global ids and packages the final
//! merged result with its coverage.

use crate::types::{Coverage, DocId, Gid};

use super::partial_result::PartialResult;

/// Out-of-scope collaborator: the document meta store (§1).
pub trait LidToGidResolver: Send + Sync {
    fn resolve(&self, docid: DocId) -> Gid;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplyHit {
    pub gid: Gid,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub hits: Vec<ReplyHit>,
    pub total_hit_count: u64,
    pub coverage: Coverage,
}

pub fn assemble_reply(merged: &PartialResult, resolver: &dyn LidToGidResolver, coverage: Coverage) -> Reply {
    let hits = merged.hits.iter().map(|h| ReplyHit { gid: resolver.resolve(h.docid), score: h.score }).collect();
    Reply { hits, total_hit_count: merged.total_hit_count, coverage }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DegradedReasons, Hit};

    struct IdentityResolver;
    impl LidToGidResolver for IdentityResolver {
        fn resolve(&self, docid: DocId) -> Gid {
            let mut bytes = [0u8; 12];
            bytes[..4].copy_from_slice(&docid.value().to_be_bytes());
            Gid(bytes)
        }
    }

    #[test]
    fn assembles_hits_with_resolved_gids() {
        let merged = PartialResult {
            hits: vec![Hit::new(DocId::new(7), 1.5)],
            total_hit_count: 1,
            score_range: None,
            sort_data: None,
        };
        let coverage = Coverage { covered: 1, active: 1, target_active: 1, degraded: DegradedReasons::default() };
        let reply = assemble_reply(&merged, &IdentityResolver, coverage);
        assert_eq!(reply.hits.len(), 1);
        assert_eq!(reply.hits[0].score, 1.5);
    }
}
