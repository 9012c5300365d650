//! Connection lifecycle: subscribers, connect attempts, authentication,
//! heartbeat, and teardown.

use cubelink_core::constants::{CLOSE_POLICY_VIOLATION, PASSWORD_OPTION, names};
use cubelink_core::{Envelope, SubscriberId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Attempt, Dispatcher, worker};
use crate::errors::{CallError, TransportError};
use crate::registry::{Completion, Owner};
use crate::state::{ConnectionState, StateChange};
use crate::subscribers::SubscriberEvent;
use crate::timers::TimerKind;
use crate::transport::{InboundSink, Link, LinkEvent};

impl Dispatcher {
    pub(super) fn set_state(&mut self, new: ConnectionState) {
        let Some(change) = self.state.set(new) else {
            return;
        };
        info!(
            new = %change.new,
            old = %change.old,
            generation = self.generation,
            "connection state changed"
        );
        self.subscribers
            .broadcast(&SubscriberEvent::StateChanged(change));
        let _ = self.channels.lifecycle.send(change);
    }

    // ── Subscribers ─────────────────────────────────────────────────

    pub(super) fn add_subscriber(
        &mut self,
        id: SubscriberId,
        events: mpsc::UnboundedSender<SubscriberEvent>,
    ) {
        if !self.subscribers.insert(id.clone(), events) {
            debug!(subscriber = %id, "subscriber already registered");
            return;
        }
        debug!(subscriber = %id, total = self.subscribers.len(), "subscriber added");

        // A connect started here already announces itself to the new
        // subscriber, so only a pre-existing state gets a snapshot.
        let was = self.state.get();
        if !self.watching_network {
            self.watch_network();
        }
        if was == ConnectionState::Disconnected {
            self.reconnect();
        }
        let _ = self.timers.cancel(TimerKind::AutoDisconnect);

        if was != ConnectionState::Disconnected {
            self.subscribers
                .notify(&id, SubscriberEvent::StateChanged(StateChange::snapshot(was)));
        }
    }

    pub(super) fn remove_subscriber(&mut self, id: &SubscriberId) {
        if !self.subscribers.remove(id) {
            return;
        }
        let aborted = self.pending.abort_owner(id, CallError::OwnerRemoved);
        debug!(subscriber = %id, aborted, "subscriber removed");

        if self.subscribers.is_empty() {
            self.unwatch_network();
            self.timers.schedule(
                TimerKind::AutoDisconnect,
                self.settings.timing.auto_disconnect_delay(),
            );
        }
    }

    fn watch_network(&mut self) {
        self.watching_network = true;
        self.timers.schedule(
            TimerKind::ReconnectFailsafe,
            self.settings.timing.reconnect_failsafe(),
        );
    }

    fn unwatch_network(&mut self) {
        self.watching_network = false;
        let _ = self.timers.cancel(TimerKind::ReconnectFailsafe);
    }

    pub(super) fn network_available(&mut self) {
        if !self.watching_network {
            debug!("network change ignored without subscribers");
            return;
        }
        if self.auto_reconnect {
            self.connect_if_not_connected();
        }
    }

    // ── Connect ─────────────────────────────────────────────────────

    pub(super) fn reconnect(&mut self) {
        self.auto_reconnect = true;
        self.connect_if_not_connected();
    }

    fn connect_if_not_connected(&mut self) {
        if self.state.get() != ConnectionState::Disconnected {
            return;
        }
        self.disconnect(self.auto_reconnect);
        let _ = self.timers.cancel(TimerKind::AutoReconnect);

        if self.subscribers.is_empty() {
            return;
        }
        let _ = self.timers.cancel(TimerKind::AutoDisconnect);
        self.start_attempt();
    }

    fn start_attempt(&mut self) {
        let auth = Envelope::request(names::AUTHENTICATE)
            .option(PASSWORD_OPTION, self.settings.connection.password.clone())
            .build();
        let frame = match auth.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "could not encode authentication request");
                self.disconnect(self.auto_reconnect);
                return;
            }
        };

        self.generation += 1;
        let inbound = InboundSink::new(self.generation, self.events_tx.clone());
        let worker = tokio::spawn(worker::connect(
            self.connector.clone(),
            self.settings.clone(),
            frame,
            inbound,
            self.events_tx.clone(),
        ));
        self.attempt = Some(Attempt {
            auth_id: auth.id().clone(),
            worker,
        });
        info!(
            generation = self.generation,
            url = %self.settings.connection.url(),
            "connecting"
        );
        self.set_state(ConnectionState::Connecting);
    }

    pub(super) fn on_connect_finished(
        &mut self,
        generation: u64,
        result: Result<Link, TransportError>,
    ) {
        if generation != self.generation || self.state.get() != ConnectionState::Connecting {
            debug!(generation, current = self.generation, "stale connect result");
            if let Ok(link) = result {
                link.close();
            }
            return;
        }
        match result {
            Ok(link) => {
                debug!(generation, "socket open, awaiting authentication");
                self.link = Some(link);
                self.timers.schedule(
                    TimerKind::AuthExpired,
                    self.settings.timing.connect_timeout(),
                );
            }
            Err(err) => {
                info!(generation, %err, "connect attempt failed");
                self.disconnect(self.auto_reconnect);
            }
        }
    }

    // ── Link events ─────────────────────────────────────────────────

    pub(super) fn on_link_event(&mut self, generation: u64, event: LinkEvent) {
        if generation != self.generation || self.state.get() == ConnectionState::Disconnected {
            debug!(generation, current = self.generation, "stale link event");
            return;
        }
        match event {
            LinkEvent::Text(frame) => self.on_frame(&frame),
            LinkEvent::Closed { code } => self.on_link_closed(code),
        }
    }

    fn on_frame(&mut self, frame: &str) {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "dropping undecodable frame");
                return;
            }
        };
        if self.state.get() == ConnectionState::Connecting && self.is_auth_reply(&envelope) {
            self.on_authenticated();
            return;
        }
        self.on_inbound(envelope);
    }

    /// The reply either echoes the outstanding authentication id or carries
    /// the authentication name.
    fn is_auth_reply(&self, envelope: &Envelope) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|attempt| envelope.id() == &attempt.auth_id)
            || envelope.is_named(names::AUTHENTICATE)
    }

    fn on_authenticated(&mut self) {
        let _ = self.timers.cancel(TimerKind::AuthExpired);
        self.attempt = None;
        if self.link.is_none() {
            warn!("authentication reply arrived without an open link");
            self.disconnect(self.auto_reconnect);
            return;
        }
        self.set_state(ConnectionState::Connected);
        self.ping();
    }

    fn on_link_closed(&mut self, code: Option<u16>) {
        if code == Some(CLOSE_POLICY_VIOLATION) {
            warn!(generation = self.generation, "server rejected credentials");
            self.disconnect(false);
            self.subscribers
                .broadcast(&SubscriberEvent::InvalidCredentials);
            let _ = self.channels.auth_failures.send(());
        } else {
            info!(?code, "connection closed");
            self.disconnect(self.auto_reconnect);
        }
    }

    pub(super) fn on_auth_expired(&mut self) {
        if self.state.get() == ConnectionState::Connecting {
            warn!(generation = self.generation, "authentication reply timed out");
            self.disconnect(self.auto_reconnect);
        }
    }

    // ── Heartbeat ───────────────────────────────────────────────────

    pub(super) fn ping(&mut self) {
        if self.state.get() != ConnectionState::Connected {
            return;
        }
        let _ = self.pending.abort_internal(CallError::Cancelled);
        self.timers
            .schedule(TimerKind::PingExpired, self.settings.timing.ping_interval());

        let ping = Envelope::request(names::PING).build();
        let frame = match ping.encode() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "could not encode ping");
                return;
            }
        };
        self.pending
            .register(ping.id().clone(), Owner::Internal, Completion::Heartbeat, false);
        if self.transmit(frame).is_err() {
            debug!("ping not sent");
        }
    }

    pub(super) fn on_heartbeat(&mut self) {
        let _ = self.timers.cancel(TimerKind::PingExpired);
        self.timers
            .schedule(TimerKind::PingSchedule, self.settings.timing.ping_interval());
    }

    pub(super) fn on_ping_expired(&mut self) {
        let _ = self.pending.abort_internal(CallError::Timeout);
        let reconnect = self.state.get() == ConnectionState::Connected || self.auto_reconnect;
        warn!(reconnect, "heartbeat unanswered, dropping connection");
        self.disconnect(reconnect);
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Close the socket, fail calls that needed it, and settle in
    /// `Disconnected`, scheduling a retry when `auto_reconnect` is set.
    pub(super) fn disconnect(&mut self, auto_reconnect: bool) {
        self.teardown();
        self.auto_reconnect = auto_reconnect;
        let _ = self.pending.abort_connection_loss();
        self.set_state(ConnectionState::Disconnected);

        if auto_reconnect {
            self.timers.schedule(
                TimerKind::AutoReconnect,
                self.settings.timing.auto_reconnect_interval(),
            );
        } else {
            let _ = self.timers.cancel(TimerKind::AutoReconnect);
        }
    }

    /// Drop the link and any attempt in flight. Events they post later are
    /// stale.
    pub(super) fn teardown(&mut self) {
        self.generation += 1;
        if let Some(attempt) = self.attempt.take() {
            attempt.worker.abort();
        }
        if let Some(link) = self.link.take() {
            link.close();
        }
        let _ = self.timers.cancel(TimerKind::PingSchedule);
        let _ = self.timers.cancel(TimerKind::PingExpired);
        let _ = self.timers.cancel(TimerKind::AuthExpired);
    }
}
