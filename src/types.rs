use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// 32-bit local document id. `0` is reserved and never returned by a scheduler
/// or iterator; valid ids lie in `[1, doc_id_limit)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u32);

impl DocId {
    pub const RESERVED: DocId = DocId(0);

    pub fn new(id: u32) -> Self {
        DocId(id)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for DocId {
    fn from(id: u32) -> Self {
        DocId(id)
    }
}

/// Global document id, resolved from a `DocId` via the (out-of-scope) document meta store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Gid(pub [u8; 12]);

/// Half-open docid interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocidRange {
    pub begin: u32,
    pub end: u32,
}

impl DocidRange {
    pub fn new(begin: u32, end: u32) -> Self {
        DocidRange { begin, end }
    }

    pub fn empty() -> Self {
        DocidRange { begin: 0, end: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    pub fn size(&self) -> u32 {
        if self.is_empty() { 0 } else { self.end - self.begin }
    }

    /// Splits `[begin, end)` into `count` parts as evenly as possible: the first
    /// `size % count` parts get one extra docid. Returns the boundary before part `i`.
    fn offset(&self, count: u32, i: u32) -> u32 {
        if count == 0 {
            return self.end;
        }
        let size = self.size() as u64;
        let step = size / count as u64;
        let skew = size % count as u64;
        let raw = self.begin as u64 + step * i as u64 + i.min(skew as u32) as u64;
        raw.min(self.end as u64) as u32
    }

    /// Splits this range into `count` near-equal contiguous pieces.
    pub fn split(&self, count: u32) -> Vec<DocidRange> {
        if count == 0 || self.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|i| DocidRange::new(self.offset(count, i), self.offset(count, i + 1)))
            .collect()
    }
}

/// Soft/hard deadline pair driving time-bounded matching.
#[derive(Debug, Clone, Copy)]
pub struct Doom {
    soft_deadline: Instant,
    hard_deadline: Instant,
}

impl Doom {
    pub fn new(soft_deadline: Instant, hard_deadline: Instant) -> Self {
        Doom { soft_deadline, hard_deadline }
    }

    pub fn from_timeout(now: Instant, timeout: Duration, soft_factor: f64) -> Self {
        let soft = Duration::from_secs_f64(timeout.as_secs_f64() * soft_factor.clamp(0.0, 1.0));
        Doom { soft_deadline: now + soft, hard_deadline: now + timeout }
    }

    pub fn soft_doom(&self, now: Instant) -> bool {
        now >= self.soft_deadline
    }

    pub fn hard_doom(&self, now: Instant) -> bool {
        now >= self.hard_deadline
    }

    pub fn soft_deadline(&self) -> Instant {
        self.soft_deadline
    }

    pub fn hard_deadline(&self) -> Instant {
        self.hard_deadline
    }
}

/// Normalizes a first/second phase score: `NaN` and infinities become `-∞` so they
/// always sort below any finite score.
pub fn normalize_score(score: f64) -> f64 {
    if score.is_nan() || score.is_infinite() {
        f64::NEG_INFINITY
    } else {
        score
    }
}

/// A fingerprinted hit: docid plus its (already-normalized) rank score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub docid: DocId,
    pub score: f64,
}

impl Hit {
    pub fn new(docid: DocId, score: f64) -> Self {
        Hit { docid, score: normalize_score(score) }
    }
}

impl Eq for Hit {}

/// Rank order: score descending, docid ascending as tiebreak.
impl Ord for Hit {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.docid.cmp(&other.docid))
    }
}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A small integer identifying a slot in a per-thread match-data record, allocated
/// once per (query term, field) pair that can feed ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u32);

/// How a registered handle is consumed by feature setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleUse {
    pub normal: bool,
    pub interleaved: bool,
}

impl HandleUse {
    pub fn merge(&mut self, other: HandleUse) {
        self.normal |= other.normal;
        self.interleaved |= other.interleaved;
    }

    pub fn needed(&self) -> bool {
        self.normal || self.interleaved
    }
}

/// Score range reported on a reply's coverage/ranking metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreRange {
    pub high: f64,
    pub low: f64,
}

/// Reasons a reply's coverage may be less than 100%.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DegradedReasons {
    pub match_phase: bool,
    pub timeout: bool,
    pub adaptive_timeout: bool,
}

impl DegradedReasons {
    pub fn any(&self) -> bool {
        self.match_phase || self.timeout || self.adaptive_timeout
    }
}

/// Reply-level coverage accounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Coverage {
    pub covered: u64,
    pub active: u64,
    pub target_active: u64,
    pub degraded: DegradedReasons,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_split_distributes_remainder() {
        let r = DocidRange::new(1, 11); // size 10
        let parts = r.split(3);
        assert_eq!(parts.len(), 3);
        let sizes: Vec<u32> = parts.iter().map(|p| p.size()).collect();
        assert_eq!(sizes.iter().sum::<u32>(), 10);
        assert!(sizes.iter().all(|&s| s == 3 || s == 4));
    }

    #[test]
    fn range_split_is_contiguous_and_covers_exactly() {
        let r = DocidRange::new(1, 1000);
        let parts = r.split(7);
        let mut prev_end = r.begin;
        for p in &parts {
            assert_eq!(p.begin, prev_end);
            prev_end = p.end;
        }
        assert_eq!(prev_end, r.end);
    }

    #[test]
    fn empty_range_has_zero_size() {
        assert!(DocidRange::empty().is_empty());
        assert_eq!(DocidRange::new(5, 5).size(), 0);
        assert_eq!(DocidRange::new(5, 3).size(), 0);
    }

    #[test]
    fn hit_normalizes_nan_and_infinities() {
        let h = Hit::new(DocId::new(1), f64::NAN);
        assert_eq!(h.score, f64::NEG_INFINITY);
        let h = Hit::new(DocId::new(1), f64::INFINITY);
        assert_eq!(h.score, f64::NEG_INFINITY);
        let h = Hit::new(DocId::new(1), f64::NEG_INFINITY);
        assert_eq!(h.score, f64::NEG_INFINITY);
    }

    #[test]
    fn hit_order_is_score_desc_then_docid_asc() {
        let a = Hit::new(DocId::new(1), 5.0);
        let b = Hit::new(DocId::new(2), 5.0);
        let c = Hit::new(DocId::new(1), 10.0);
        assert!(c < a); // higher score sorts first
        assert!(a < b); // tie broken by docid ascending
    }
}
