use thiserror::Error;

/// Errors that abort construction outright rather than degrading in-band on a reply.
///
/// Everything else in the matcher's error taxonomy (field resolution misses, soft/hard
/// doom, throttling) is represented as data on `SearchReply`/`Issue`, never as an `Err`.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("query build failed: {0}")]
    QueryBuild(String),

    #[error("rank setup compilation failed for profile {profile:?}: {reason}")]
    RankSetupCompile { profile: String, reason: String },

    #[error("structural assertion failed: {0}")]
    StructuralAssertion(String),

    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("a lock guarding shared matcher state was poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, MatchError>;
