//! The dispatch task: single owner of all client state.
//!
//! Handles from [`RemoteClient`](crate::RemoteClient) post [`Command`]s;
//! transports, connect workers and interceptor responders post [`Event`]s;
//! timers fire from a keyed delay queue. One biased `select!` loop applies
//! them one at a time, so every state transition and its notifications
//! happen atomically with respect to everything else. The loop ends when every
//! client handle has been dropped.

mod calls;
mod lifecycle;
mod worker;

use std::sync::Arc;

use cubelink_core::{Envelope, InterceptorId, MessageId, SubscriberId};
use cubelink_settings::ClientSettings;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::errors::{CallError, ClientError, TransportError};
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::registry::{CallSender, PendingRegistry};
use crate::state::{ConnectionState, StateCell, StateChange};
use crate::subscribers::{SubscriberEvent, SubscriberRegistry};
use crate::timers::{TimerKind, Timers};
use crate::transport::{Connector, Link, LinkEvent};

/// Requests from client handles.
pub(crate) enum Command {
    AddSubscriber {
        id: SubscriberId,
        events: mpsc::UnboundedSender<SubscriberEvent>,
    },
    RemoveSubscriber(SubscriberId),
    HasSubscriber {
        id: SubscriberId,
        reply: oneshot::Sender<bool>,
    },
    Reconnect,
    Disconnect,
    NetworkAvailable,
    State(oneshot::Sender<ConnectionState>),
    Submit {
        envelope: Envelope,
        tracking: Option<Tracking>,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Cancel(MessageId),
    CancelCalls(SubscriberId),
    ObserveLifecycle(oneshot::Sender<(StateChange, broadcast::Receiver<StateChange>)>),
    AddInterceptor {
        id: InterceptorId,
        interceptor: Arc<dyn Interceptor>,
    },
    RemoveInterceptor(InterceptorId),
}

/// Completion target of a tracked submission.
pub(crate) struct Tracking {
    pub(crate) owner: SubscriberId,
    pub(crate) completion: CallSender,
}

/// Events from transports, connect workers and responders.
#[derive(Debug)]
pub(crate) enum Event {
    Link {
        generation: u64,
        event: LinkEvent,
    },
    ConnectFinished {
        generation: u64,
        result: Result<Link, TransportError>,
    },
    Respond(Envelope),
}

/// One unit of work for the loop; `Command(None)` means every handle is gone.
enum Input {
    Event(Event),
    Command(Option<Command>),
    Timer(TimerKind),
}

/// Broadcast senders shared with client handles.
#[derive(Clone)]
pub(crate) struct Channels {
    pub(crate) lifecycle: broadcast::Sender<StateChange>,
    pub(crate) broadcasts: broadcast::Sender<Envelope>,
    pub(crate) auth_failures: broadcast::Sender<()>,
}

/// The connect attempt currently in flight.
struct Attempt {
    auth_id: MessageId,
    worker: tokio::task::JoinHandle<()>,
}

pub(crate) struct Dispatcher {
    settings: Arc<ClientSettings>,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events: mpsc::UnboundedReceiver<Event>,
    channels: Channels,

    state: StateCell,
    auto_reconnect: bool,
    /// Bumped on every attempt and every teardown; events tagged with an
    /// older value are stale.
    generation: u64,
    attempt: Option<Attempt>,
    link: Option<Link>,
    watching_network: bool,

    subscribers: SubscriberRegistry,
    pending: PendingRegistry,
    interceptors: InterceptorChain,
    timers: Timers,
}

impl Dispatcher {
    pub(crate) fn new(
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
        commands: mpsc::UnboundedReceiver<Command>,
        channels: Channels,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            settings: Arc::new(settings),
            connector,
            commands,
            events_tx,
            events,
            channels,
            state: StateCell::default(),
            auto_reconnect: false,
            generation: 0,
            attempt: None,
            link: None,
            watching_network: false,
            subscribers: SubscriberRegistry::default(),
            pending: PendingRegistry::default(),
            interceptors: InterceptorChain::default(),
            timers: Timers::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!(url = %self.settings.connection.url(), "dispatch loop started");
        self.timers
            .schedule(TimerKind::StaleSweep, self.settings.timing.call_timeout());

        loop {
            match self.next_input().await {
                Input::Event(event) => self.handle_event(event),
                Input::Command(Some(command)) => self.handle_command(command),
                Input::Command(None) => break,
                Input::Timer(kind) => self.handle_timer(kind),
            }
        }

        self.shutdown();
    }

    /// Queued events win over commands, and both win over timers, so a
    /// reply that already arrived is seen before its expiry fires.
    async fn next_input(&mut self) -> Input {
        tokio::select! {
            biased;
            Some(event) = self.events.recv() => Input::Event(event),
            command = self.commands.recv() => Input::Command(command),
            kind = self.timers.expired() => Input::Timer(kind),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::AddSubscriber { id, events } => self.add_subscriber(id, events),
            Command::RemoveSubscriber(id) => self.remove_subscriber(&id),
            Command::HasSubscriber { id, reply } => {
                let _ = reply.send(self.subscribers.contains(&id));
            }
            Command::Reconnect => self.reconnect(),
            Command::Disconnect => self.disconnect(false),
            Command::NetworkAvailable => self.network_available(),
            Command::State(reply) => {
                let _ = reply.send(self.state.get());
            }
            Command::Submit {
                envelope,
                tracking,
                reply,
            } => {
                let _ = reply.send(self.submit(envelope, tracking));
            }
            Command::Cancel(id) => {
                if self.pending.cancel(&id) {
                    debug!(%id, "call cancelled");
                }
            }
            Command::CancelCalls(owner) => {
                let _ = self.pending.abort_owner(&owner, CallError::Cancelled);
            }
            Command::ObserveLifecycle(reply) => {
                let _ = reply.send((self.state.last(), self.channels.lifecycle.subscribe()));
            }
            Command::AddInterceptor { id, interceptor } => self.interceptors.add(id, interceptor),
            Command::RemoveInterceptor(id) => {
                let _ = self.interceptors.remove(&id);
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Link { generation, event } => self.on_link_event(generation, event),
            Event::ConnectFinished { generation, result } => {
                self.on_connect_finished(generation, result);
            }
            Event::Respond(envelope) => self.on_inbound(envelope),
        }
    }

    fn handle_timer(&mut self, kind: TimerKind) {
        debug!(?kind, "timer fired");
        match kind {
            TimerKind::PingSchedule => self.ping(),
            TimerKind::PingExpired => self.on_ping_expired(),
            TimerKind::AuthExpired => self.on_auth_expired(),
            TimerKind::StaleSweep => {
                let _ = self
                    .pending
                    .abort_stale(tokio::time::Instant::now(), self.settings.timing.call_timeout());
                self.timers
                    .schedule(TimerKind::StaleSweep, self.settings.timing.call_timeout());
            }
            TimerKind::AutoReconnect | TimerKind::ReconnectFailsafe => {
                if self.auto_reconnect && self.state.get() == ConnectionState::Disconnected {
                    self.reconnect();
                }
            }
            TimerKind::AutoDisconnect => {
                info!("no subscribers left, closing idle connection");
                self.disconnect(false);
            }
        }
    }

    fn shutdown(&mut self) {
        info!(pending = self.pending.len(), "dispatch loop stopping");
        let _ = self.pending.abort_all(CallError::Shutdown);
        self.teardown();
    }
}
