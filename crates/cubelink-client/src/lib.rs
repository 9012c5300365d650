//! # cubelink-client
//!
//! A persistent, auto-reconnecting WebSocket client that multiplexes many
//! subscribers and their request/response calls over one authenticated
//! connection.
//!
//! - **Client**: [`RemoteClient`] handle; calls resolve through [`PendingResponse`]
//! - **Lifecycle**: [`ConnectionState`] and [`StateChange`] notifications,
//!   heartbeat, auto-reconnect, idle auto-disconnect
//! - **Subscribers**: [`Subscription`] receiving [`SubscriberEvent`]s
//! - **Interceptors**: [`Interceptor`]s that answer requests locally via a [`Responder`]
//! - **Transport**: the [`Connector`] seam, [`WebSocketConnector`] for real
//!   sockets, and [`testing::MemoryConnector`] for tests
//!
//! All state lives in one dispatch task; handles talk to it over channels.

#![deny(unsafe_code)]

mod client;
mod dispatch;
pub mod errors;
mod interceptor;
mod registry;
mod state;
mod subscribers;
pub mod testing;
mod timers;
pub mod transport;

pub use client::{EventStream, PendingResponse, RemoteClient};
pub use cubelink_core::{Envelope, EnvelopeBuilder, InterceptorId, MessageId, MessageKind, SubscriberId};
pub use errors::{CallError, ClientError, TransportError};
pub use interceptor::{Interceptor, Responder};
pub use state::{ConnectionState, StateChange};
pub use subscribers::{SubscriberEvent, Subscription};
pub use transport::{Connector, InboundSink, Link, LinkEvent, Outbound, WebSocketConnector};
