//! # cubelink-core
//!
//! Foundation types for the cubelink remote-control client.
//!
//! - **Envelope**: [`Envelope`] with [`MessageKind`], builder, typed option accessors,
//!   and the JSON wire encoding
//! - **IDs**: process-monotonic [`MessageId`] correlation ids, plus UUID v7
//!   [`SubscriberId`] and [`InterceptorId`] newtypes
//! - **Errors**: [`EnvelopeError`] for wire decoding
//! - **Constants**: protocol names, close codes, and default timings
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stack

#![deny(unsafe_code)]

pub mod constants;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;

pub use envelope::{Envelope, EnvelopeBuilder, MessageKind};
pub use errors::EnvelopeError;
pub use ids::{InterceptorId, MessageId, SubscriberId};
