use thiserror::Error;

/// Construction-time failures. Nothing in the match loop returns these:
/// run-time edge cases are resolved in place (clamp, reject, skip).
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum UrningsError {
    /// Initial score larger than the urn can hold.
    #[error("entity {id}: score {score} exceeds urn size {urn_size}")]
    ScoreExceedsUrn { id: i64, score: u32, urn_size: u32 },

    #[error("entity {id}: urn size must be positive")]
    InvalidUrnSize { id: i64 },

    #[error("entity {id}: true value {value} must lie strictly between 0 and 1")]
    InvalidTrueValue { id: i64, value: f64 },

    #[error("entity {id}: stake must be positive")]
    InvalidStake { id: i64 },

    #[error("roster has no {0}")]
    EmptyRoster(&'static str),

    #[error("duplicate {kind} ID: {id}")]
    DuplicateId { kind: &'static str, id: i64 },

    #[error("unknown {kind} ID: {id}")]
    UnknownId { kind: &'static str, id: i64 },

    /// Items must share one urn size so they can be binned by score.
    #[error("all items must share one urn size (found {first} and {other})")]
    MixedItemUrnSizes { first: u32, other: u32 },

    /// Without urn-size adaptation the first player's urn is the reference scale.
    #[error("all players must share one urn size when urn adaptation is off (found {first} and {other})")]
    MixedPlayerUrnSizes { first: u32, other: u32 },

    #[error("invalid rule configuration: {0}")]
    InvalidConfig(String),
}
