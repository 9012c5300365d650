//! In-memory transport for exercising a [`RemoteClient`](crate::RemoteClient)
//! without a server.
//!
//! [`MemoryConnector::new`] returns the connector and a [`MemoryServer`] that
//! yields one [`MemoryPeer`] per successful connect. The peer sees what the
//! client writes and can push frames or close codes back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use cubelink_core::Envelope;
use cubelink_core::constants::names;
use cubelink_settings::ClientSettings;
use tokio::sync::{Mutex, mpsc};

use crate::errors::TransportError;
use crate::transport::{Connector, InboundSink, Link, Outbound};

#[derive(Debug, Default)]
struct Shared {
    refusing: AtomicBool,
    attempts: AtomicUsize,
}

/// [`Connector`] that hands each link to a [`MemoryServer`].
#[derive(Debug)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

impl MemoryConnector {
    /// A connector and the server end that accepts its links.
    pub fn new() -> (Self, MemoryServer) {
        let shared = Arc::new(Shared::default());
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            shared: shared.clone(),
            peers,
        };
        let server = MemoryServer {
            shared,
            peers: Mutex::new(rx),
        };
        (connector, server)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(
        &self,
        settings: &ClientSettings,
        inbound: InboundSink,
    ) -> Result<Link, TransportError> {
        let _ = self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }
        let (link, outbound) = Link::channel();
        let peer = MemoryPeer {
            url: settings.connection.url(),
            inbound,
            outbound,
            closed: false,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("server gone".into()))?;
        Ok(link)
    }
}

/// Accepting end of a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryServer {
    shared: Arc<Shared>,
    peers: Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
}

impl MemoryServer {
    /// Next accepted link; `None` once the connector is gone.
    pub async fn accept(&self) -> Option<MemoryPeer> {
        self.peers.lock().await.recv().await
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Connect attempts seen so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// Server side of one in-memory link.
///
/// Dropping the peer reports an abnormal close to the client.
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    inbound: InboundSink,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    closed: bool,
}

impl MemoryPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next envelope written by the client. `None` once the client closed
    /// the link. Frames that do not decode are skipped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.outbound.recv().await? {
                Outbound::Text(frame) => {
                    if let Ok(envelope) = Envelope::decode(&frame) {
                        return Some(envelope);
                    }
                }
                Outbound::Close => return None,
            }
        }
    }

    /// Receive the authentication request and accept it.
    ///
    /// Returns the request so its password can be inspected.
    pub async fn accept_auth(&mut self) -> Option<Envelope> {
        let request = self.recv().await?;
        if !request.is_named(names::AUTHENTICATE) {
            return None;
        }
        let _ = self.reply(&request);
        Some(request)
    }

    /// Push an envelope to the client.
    pub fn send(&self, envelope: &Envelope) -> bool {
        envelope
            .encode()
            .is_ok_and(|frame| self.inbound.text(frame))
    }

    /// Push an empty response to `request`.
    pub fn reply(&self, request: &Envelope) -> bool {
        self.send(&Envelope::response_to(request).build())
    }

    /// Push a raw text frame.
    pub fn send_text(&self, frame: impl Into<String>) -> bool {
        self.inbound.text(frame)
    }

    /// Close the link with `code`.
    pub fn close(mut self, code: Option<u16>) {
        self.closed = true;
        let _ = self.inbound.closed(code);
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.inbound.closed(None);
        }
    }
}
