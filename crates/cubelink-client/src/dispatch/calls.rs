//! Submission and inbound routing.

use cubelink_core::{Envelope, MessageKind};
use tracing::{debug, instrument, warn};

use super::{Dispatcher, Tracking};
use crate::errors::ClientError;
use crate::interceptor::Responder;
use crate::registry::{Completion, Owner, Resolution};
use crate::state::ConnectionState;
use crate::subscribers::SubscriberEvent;
use crate::transport::Link;

impl Dispatcher {
    /// Offer `envelope` to the interceptors, then to the wire.
    ///
    /// The pending entry is recorded before this returns, so a responder that
    /// answers synchronously still finds it.
    #[instrument(skip_all, fields(id = %envelope.id(), name = envelope.name()))]
    pub(super) fn submit(
        &mut self,
        envelope: Envelope,
        tracking: Option<Tracking>,
    ) -> Result<(), ClientError> {
        if let Some(tracking) = &tracking {
            if !self.subscribers.contains(&tracking.owner) {
                return Err(ClientError::UnregisteredSubscriber(tracking.owner.clone()));
            }
        }

        let responder = Responder::new(self.events_tx.clone());
        let intercepted = self.interceptors.offer(&envelope, &responder);

        let frame = if intercepted {
            debug!("request satisfied locally");
            None
        } else {
            if self.state.get() != ConnectionState::Connected {
                debug!(state = %self.state.get(), "rejecting request while not connected");
                return Err(ClientError::NotConnected);
            }
            if !self.link.as_ref().is_some_and(Link::is_open) {
                warn!("link is dead, forcing reconnect");
                self.disconnect(true);
                return Err(ClientError::NotConnected);
            }
            Some(envelope.encode()?)
        };

        if let Some(Tracking { owner, completion }) = tracking {
            self.pending.register(
                envelope.id().clone(),
                Owner::Subscriber(owner),
                Completion::Caller(completion),
                intercepted,
            );
        }

        match frame {
            Some(frame) => self.transmit(frame),
            None => Ok(()),
        }
    }

    /// Write one frame. A dead link forces a reconnect.
    pub(super) fn transmit(&mut self, frame: String) -> Result<(), ClientError> {
        let sent = self
            .link
            .as_ref()
            .is_some_and(|link| link.send_text(frame).is_ok());
        if sent {
            Ok(())
        } else {
            warn!("write to dead link, forcing reconnect");
            self.disconnect(true);
            Err(ClientError::NotConnected)
        }
    }

    /// Match an inbound envelope to its call, or route it as unsolicited.
    #[instrument(skip_all, fields(id = %envelope.id(), name = envelope.name()))]
    pub(super) fn on_inbound(&mut self, envelope: Envelope) {
        match self.pending.resolve(envelope) {
            Resolution::Completed => debug!("call completed"),
            Resolution::Heartbeat => self.on_heartbeat(),
            Resolution::Unmatched(envelope) => {
                debug!(kind = ?envelope.kind(), "unsolicited message");
                if envelope.kind() == MessageKind::Broadcast {
                    let _ = self.channels.broadcasts.send(envelope.clone());
                }
                self.subscribers
                    .broadcast(&SubscriberEvent::Message(envelope));
            }
        }
    }
}
