//! Transport seam between the dispatch loop and a concrete socket.
//!
//! A [`Connector`] opens one [`Link`] per connect attempt. Outbound frames go
//! through the link's channel to a writer task; inbound frames and the final
//! close are reported through the [`InboundSink`] handed to `open`, tagged with
//! the attempt's generation so late events from an abandoned socket are
//! ignored.

mod websocket;

pub use websocket::WebSocketConnector;

use async_trait::async_trait;
use cubelink_settings::ClientSettings;
use tokio::sync::mpsc;

use crate::dispatch::Event;
use crate::errors::TransportError;

/// Opens links to the server.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a socket for `settings` and start forwarding inbound frames to
    /// `inbound`. The connect timeout is enforced by the caller.
    async fn open(
        &self,
        settings: &ClientSettings,
        inbound: InboundSink,
    ) -> Result<Link, TransportError>;
}

/// Something a transport reports about its socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A text frame arrived.
    Text(String),
    /// The socket closed, with the peer's close code if one was sent.
    Closed {
        /// WebSocket close code.
        code: Option<u16>,
    },
}

/// Where a transport posts inbound frames and its close.
#[derive(Clone, Debug)]
pub struct InboundSink {
    generation: u64,
    events: mpsc::UnboundedSender<Event>,
}

impl InboundSink {
    pub(crate) fn new(generation: u64, events: mpsc::UnboundedSender<Event>) -> Self {
        Self { generation, events }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Post a text frame. Returns `false` once the client has stopped.
    pub fn text(&self, frame: impl Into<String>) -> bool {
        self.deliver(LinkEvent::Text(frame.into()))
    }

    /// Report that the socket closed.
    pub fn closed(&self, code: Option<u16>) -> bool {
        self.deliver(LinkEvent::Closed { code })
    }

    /// Whether the client has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn deliver(&self, event: LinkEvent) -> bool {
        self.events
            .send(Event::Link {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Item consumed by a transport's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Send a text frame.
    Text(String),
    /// Close the socket gracefully.
    Close,
}

/// Client end of an open socket.
///
/// Cloning shares the same writer. The socket is considered dead once the
/// writer task has dropped its receiver.
#[derive(Clone, Debug)]
pub struct Link {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Link {
    /// A link plus the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { outbound }, rx)
    }

    /// Queue a text frame.
    pub fn send_text(&self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Text(frame))
            .map_err(|_| TransportError::Closed)
    }

    /// Ask the writer to close the socket.
    pub fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }

    /// Whether the writer is still accepting frames.
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn link_send_and_close() {
        let (link, mut rx) = Link::channel();
        assert!(link.is_open());
        link.send_text("hello".into()).unwrap();
        link.close();
        assert_eq!(rx.try_recv().unwrap(), Outbound::Text("hello".into()));
        assert_eq!(rx.try_recv().unwrap(), Outbound::Close);
    }

    #[test]
    fn dead_writer_fails_send() {
        let (link, rx) = Link::channel();
        drop(rx);
        assert!(!link.is_open());
        assert_eq!(link.send_text("x".into()), Err(TransportError::Closed));
    }

    #[test]
    fn sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = InboundSink::new(7, tx);
        assert!(sink.text("{}"));
        assert!(sink.closed(Some(1008)));
        assert_matches!(
            rx.try_recv(),
            Ok(Event::Link { generation: 7, event: LinkEvent::Text(t) }) if t == "{}"
        );
        assert_matches!(
            rx.try_recv(),
            Ok(Event::Link { generation: 7, event: LinkEvent::Closed { code: Some(1008) } })
        );
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.text("late"));
    }
}
