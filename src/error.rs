//! # Error handling utilities.
//! Typed error enum so callers can match on failure kinds instead of
//! probing an opaque error type.

use thiserror::Error;

use crate::bdaddr::Bdaddr;
use crate::proto::enums::CreateConnectionChannelError;

pub type Result<T> = std::result::Result<T, FlicError>;

#[derive(Debug, Error)]
pub enum FlicError {
    /// An address was constructed from a slice that is not 6 bytes long.
    #[error("invalid address length: expected 6 bytes, got {0}")]
    InvalidAddressLength(usize),

    /// An address string did not match the xx:xx:xx:xx:xx:xx form.
    #[error("invalid address format: {0:?}")]
    InvalidAddressFormat(String),

    /// A payload ended before a field could be fully read.
    /// Fatal to the connection: framing cannot be resynchronized.
    #[error("unexpected end of payload")]
    UnexpectedEndOfPayload,

    /// A payload decoded to an impossible value (unknown opcode or
    /// out-of-range enum discriminant). Fatal to the connection.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The TCP connection to the server could not be established.
    #[error("failed to connect to the flicd server")]
    Connect(#[source] std::io::Error),

    /// The connection is closed. Every request that was pending when the
    /// socket went down resolves with this exactly once.
    #[error("connection to the flicd server is closed")]
    Disconnected,

    /// The server rejected a connection channel request.
    #[error("create connection channel failed: {0:?}")]
    CreateConnectionChannelFailed(CreateConnectionChannelError),

    /// A second address-keyed request was issued while one for the same
    /// address was still in flight.
    #[error("a request for {0} is already pending")]
    DuplicateRequest(Bdaddr),
}
