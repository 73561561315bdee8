use thiserror::Error;

/// Errors reported by the downsampling engine and its data adapters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A threshold of 1 or below zero. Zero is the no-op sentinel and is accepted.
    #[error("invalid threshold {0}: must be 0 (no downsampling) or at least 2")]
    InvalidArgument(i64),

    #[error("bad threshold {0:?}: expected an integer")]
    BadThreshold(String),

    #[error("bad key {0:?}: expected a number or an RFC 3339 timestamp")]
    BadKey(String),

    #[error("record {record}: {found} key in a {expected} series")]
    MixedKeyDomain {
        record: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("window bound is a {found} key but the series keys are {expected}")]
    WindowBound {
        expected: &'static str,
        found: &'static str,
    },

    #[error("record {record}: value {value} is not finite")]
    NonFiniteValue { record: usize, value: f64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
