//! Client, call, and transport errors.

use std::time::Duration;

use cubelink_core::{EnvelopeError, SubscriberId};
use thiserror::Error;

/// Errors returned synchronously by [`RemoteClient`](crate::RemoteClient) operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request was not intercepted and the connection is not usable.
    #[error("not connected")]
    NotConnected,
    /// A tracked call named an owner that is not a registered subscriber.
    #[error("subscriber {0} is not registered")]
    UnregisteredSubscriber(SubscriberId),
    /// The dispatch task has stopped.
    #[error("client dispatch loop has stopped")]
    Closed,
    /// The envelope could not be encoded.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Terminal failure of a tracked call.
///
/// Every tracked call ends with exactly one response or one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CallError {
    /// The owning subscriber was removed.
    #[error("owning subscriber was removed")]
    OwnerRemoved,
    /// No response arrived within the call timeout.
    #[error("call timed out")]
    Timeout,
    /// The connection dropped before a response arrived.
    #[error("connection lost")]
    ConnectionLost,
    /// The call was cancelled explicitly.
    #[error("call cancelled")]
    Cancelled,
    /// The client shut down.
    #[error("client shut down")]
    Shutdown,
}

/// Failures opening or using a transport link.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server address is missing or malformed.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    /// The socket could not be opened.
    #[error("connect failed: {0}")]
    Connect(String),
    /// TLS setup or negotiation failed.
    #[error("tls error: {0}")]
    Tls(String),
    /// Opening the socket took too long.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    /// The link is already closed.
    #[error("link closed")]
    Closed,
}
