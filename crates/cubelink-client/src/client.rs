//! The cloneable client handle.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use cubelink_core::{Envelope, InterceptorId, MessageId, MessageKind, SubscriberId};
use cubelink_settings::ClientSettings;
use futures::Stream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::dispatch::{Channels, Command, Dispatcher, Tracking};
use crate::errors::{CallError, ClientError};
use crate::interceptor::Interceptor;
use crate::state::{ConnectionState, StateChange};
use crate::subscribers::Subscription;
use crate::transport::Connector;

/// Capacity of the lifecycle, broadcast, and auth-failure fan-out channels.
const FANOUT_CAPACITY: usize = 256;

/// Boxed stream returned by the `observe_*` methods.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Handle to one server connection and everything multiplexed over it.
///
/// Cheap to clone; every clone talks to the same dispatch task. The task
/// stops, aborting outstanding calls with [`CallError::Shutdown`], once the
/// last handle is dropped.
#[derive(Clone)]
pub struct RemoteClient {
    commands: mpsc::UnboundedSender<Command>,
    channels: Channels,
}

impl RemoteClient {
    /// Spawn the dispatch task on the current Tokio runtime.
    ///
    /// Nothing connects until the first subscriber is added.
    pub fn spawn(settings: ClientSettings, connector: impl Connector) -> Self {
        Self::spawn_with(settings, Arc::new(connector))
    }

    /// [`spawn`](Self::spawn) with a shared connector.
    pub fn spawn_with(settings: ClientSettings, connector: Arc<dyn Connector>) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let channels = Channels {
            lifecycle: broadcast::channel(FANOUT_CAPACITY).0,
            broadcasts: broadcast::channel(FANOUT_CAPACITY).0,
            auth_failures: broadcast::channel(FANOUT_CAPACITY).0,
        };
        let dispatcher = Dispatcher::new(settings, connector, rx, channels.clone());
        let _ = tokio::spawn(dispatcher.run());
        Self { commands, channels }
    }

    fn post(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).map_err(|_| ClientError::Closed)
    }

    async fn ask<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.post(command(tx))?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    // ── Subscribers ─────────────────────────────────────────────────

    /// Register a new subscriber.
    ///
    /// The first subscriber starts a connection. A subscriber added while
    /// connecting or connected first receives a `(current, current)`
    /// snapshot.
    pub fn add_subscriber(&self) -> Result<Subscription, ClientError> {
        let id = SubscriberId::new();
        let (events, rx) = mpsc::unbounded_channel();
        self.post(Command::AddSubscriber {
            id: id.clone(),
            events,
        })?;
        Ok(Subscription::new(id, rx, self.commands.downgrade()))
    }

    /// Unregister a subscriber, aborting its calls with
    /// [`CallError::OwnerRemoved`]. Removing the last one schedules an idle
    /// disconnect. Dropping the [`Subscription`] does the same.
    pub fn remove_subscriber(&self, id: &SubscriberId) -> Result<(), ClientError> {
        self.post(Command::RemoveSubscriber(id.clone()))
    }

    /// Whether `id` is registered.
    pub async fn has_subscriber(&self, id: &SubscriberId) -> Result<bool, ClientError> {
        let id = id.clone();
        self.ask(|reply| Command::HasSubscriber { id, reply }).await
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Enable auto-reconnect and connect if disconnected.
    pub fn reconnect(&self) -> Result<(), ClientError> {
        self.post(Command::Reconnect)
    }

    /// Close the connection and disable auto-reconnect.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.post(Command::Disconnect)
    }

    /// Signal that network connectivity was restored.
    ///
    /// Ignored while there are no subscribers.
    pub fn network_available(&self) -> Result<(), ClientError> {
        self.post(Command::NetworkAvailable)
    }

    /// Current connection state.
    pub async fn state(&self) -> Result<ConnectionState, ClientError> {
        self.ask(Command::State).await
    }

    /// Stream of transitions, starting with the most recent one.
    pub async fn observe_lifecycle(&self) -> Result<EventStream<StateChange>, ClientError> {
        let (last, rx) = self.ask(Command::ObserveLifecycle).await?;
        let rest = BroadcastStream::new(rx).filter_map(|item| skip_lagged("lifecycle", item));
        Ok(Box::pin(tokio_stream::once(last).chain(rest)))
    }

    /// Stream of unsolicited broadcasts named `name`.
    pub fn observe_broadcast(&self, name: impl Into<String>) -> EventStream<Envelope> {
        let name = name.into();
        let stream = BroadcastStream::new(self.channels.broadcasts.subscribe())
            .filter_map(|item| skip_lagged("broadcast", item))
            .filter(move |envelope| {
                envelope.kind() == MessageKind::Broadcast && envelope.name() == name
            });
        Box::pin(stream)
    }

    /// Stream that yields once per rejected authentication attempt.
    pub fn observe_auth_failures(&self) -> EventStream<()> {
        let stream = BroadcastStream::new(self.channels.auth_failures.subscribe())
            .filter_map(|item| skip_lagged("auth failure", item));
        Box::pin(stream)
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// Send `envelope` without tracking a response.
    ///
    /// Fails with [`ClientError::NotConnected`] unless an interceptor claims it
    /// or the client is connected.
    pub async fn send(&self, envelope: Envelope) -> Result<MessageId, ClientError> {
        let id = envelope.id().clone();
        self.ask(|reply| Command::Submit {
            envelope,
            tracking: None,
            reply,
        })
        .await??;
        Ok(id)
    }

    /// Send `envelope` on behalf of `owner` and track its response.
    ///
    /// The returned future resolves exactly once: with the response, or with
    /// the reason the call ended without one.
    pub async fn call(
        &self,
        envelope: Envelope,
        owner: &SubscriberId,
    ) -> Result<PendingResponse, ClientError> {
        let id = envelope.id().clone();
        let (completion, response) = oneshot::channel();
        let tracking = Tracking {
            owner: owner.clone(),
            completion,
        };
        self.ask(|reply| Command::Submit {
            envelope,
            tracking: Some(tracking),
            reply,
        })
        .await??;
        Ok(PendingResponse { id, response })
    }

    /// Abort one outstanding call with [`CallError::Cancelled`].
    pub fn cancel(&self, id: &MessageId) -> Result<(), ClientError> {
        self.post(Command::Cancel(id.clone()))
    }

    /// Abort every outstanding call of `owner` without unregistering it.
    pub fn cancel_calls(&self, owner: &SubscriberId) -> Result<(), ClientError> {
        self.post(Command::CancelCalls(owner.clone()))
    }

    // ── Interceptors ────────────────────────────────────────────────

    /// Append an interceptor to the chain.
    pub fn add_interceptor(&self, interceptor: impl Interceptor) -> Result<InterceptorId, ClientError> {
        let id = InterceptorId::new();
        self.post(Command::AddInterceptor {
            id: id.clone(),
            interceptor: Arc::new(interceptor),
        })?;
        Ok(id)
    }

    /// Remove an interceptor.
    pub fn remove_interceptor(&self, id: &InterceptorId) -> Result<(), ClientError> {
        self.post(Command::RemoveInterceptor(id.clone()))
    }
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

fn skip_lagged<T>(stream: &'static str, item: Result<T, BroadcastStreamRecvError>) -> Option<T> {
    match item {
        Ok(value) => Some(value),
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            warn!(stream, missed, "observer fell behind, events dropped");
            None
        }
    }
}

/// Response of a tracked call.
#[derive(Debug)]
#[must_use = "dropping a PendingResponse discards the call's outcome"]
pub struct PendingResponse {
    id: MessageId,
    response: oneshot::Receiver<Result<Envelope, CallError>>,
}

impl PendingResponse {
    /// Correlation id of the call.
    pub fn id(&self) -> &MessageId {
        &self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<Envelope, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.response).poll(cx).map(|outcome| match outcome {
            Ok(result) => result,
            Err(_) => Err(CallError::Shutdown),
        })
    }
}
