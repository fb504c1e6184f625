//! Address validation error types

use thiserror::Error;

/// Reason a candidate string was rejected as an IPv4 or IPv6 address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("length out of range: {0}")]
    Length(usize),

    #[error("expected 3 separators, found {0}")]
    SeparatorCount(usize),

    #[error("invalid octet: {0:?}")]
    Octet(String),

    #[error("prohibited byte")]
    ProhibitedByte,

    #[error("wrong sep found")]
    WrongSeparator,

    #[error("double jump found")]
    DoubleJump,

    #[error("less than 16 bytes")]
    TooShort,

    #[error("tokens overflow")]
    TokensOverflow,

    #[error("more than 4 bytes")]
    HextetTooLong,
}
