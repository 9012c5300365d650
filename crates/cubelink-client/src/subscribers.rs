//! Subscriber registrations and their event channels.

use std::pin::Pin;
use std::task::{Context, Poll};

use cubelink_core::{Envelope, SubscriberId};
use futures::Stream;
use tokio::sync::mpsc::{self, WeakUnboundedSender};
use tracing::debug;

use crate::dispatch::Command;
use crate::state::StateChange;

/// Notification delivered to a subscriber.
#[derive(Clone, Debug)]
pub enum SubscriberEvent {
    /// The connection state changed (or the snapshot on registration).
    StateChanged(StateChange),
    /// An inbound envelope no tracked call was waiting for.
    Message(Envelope),
    /// The server rejected the configured password.
    InvalidCredentials,
}

/// A registered subscriber: its id plus the receiving end of its events.
///
/// Dropping a `Subscription` unregisters it, aborting its outstanding calls
/// with [`CallError::OwnerRemoved`](crate::CallError::OwnerRemoved). It
/// does not keep the dispatch task alive on its own.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    events: mpsc::UnboundedReceiver<SubscriberEvent>,
    commands: WeakUnboundedSender<Command>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriberId,
        events: mpsc::UnboundedReceiver<SubscriberEvent>,
        commands: WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            events,
            commands,
        }
    }

    /// Owner id to pass to [`RemoteClient::call`](crate::RemoteClient::call).
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Next event; `None` once the client has stopped.
    pub async fn recv(&mut self) -> Option<SubscriberEvent> {
        self.events.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<SubscriberEvent> {
        self.events.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = SubscriberEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::RemoveSubscriber(self.id.clone()));
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct SubscriberRegistry {
    entries: Vec<(SubscriberId, mpsc::UnboundedSender<SubscriberEvent>)>,
}

impl SubscriberRegistry {
    /// Returns `false` if `id` is already registered.
    pub(crate) fn insert(
        &mut self,
        id: SubscriberId,
        events: mpsc::UnboundedSender<SubscriberEvent>,
    ) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.entries.push((id, events));
        true
    }

    pub(crate) fn remove(&mut self, id: &SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != id);
        self.entries.len() != before
    }

    pub(crate) fn contains(&self, id: &SubscriberId) -> bool {
        self.entries.iter().any(|(existing, _)| existing == id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn notify(&self, id: &SubscriberId, event: SubscriberEvent) {
        if let Some((_, tx)) = self.entries.iter().find(|(existing, _)| existing == id) {
            if tx.send(event).is_err() {
                debug!(subscriber = %id, "subscription dropped without removal");
            }
        }
    }

    /// Deliver `event` to every subscriber in registration order.
    pub(crate) fn broadcast(&self, event: &SubscriberEvent) {
        for (id, tx) in &self.entries {
            if tx.send(event.clone()).is_err() {
                debug!(subscriber = %id, "subscription dropped without removal");
            }
        }
    }
}
