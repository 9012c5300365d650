//! Outstanding tracked calls keyed by correlation id.
//!
//! Owned and mutated only by the dispatch task. Each entry holds a single-use
//! completion, so removing an entry is the only way to finish a call and a
//! call can finish at most once.

use std::collections::HashMap;
use std::time::Duration;

use cubelink_core::{Envelope, MessageId, SubscriberId};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::CallError;

/// Sender half of a caller's [`PendingResponse`](crate::PendingResponse).
pub(crate) type CallSender = oneshot::Sender<Result<Envelope, CallError>>;

/// Who a tracked call belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Owner {
    /// A registered subscriber.
    Subscriber(SubscriberId),
    /// The client itself (heartbeat).
    Internal,
}

/// How a tracked call is completed.
#[derive(Debug)]
pub(crate) enum Completion {
    /// Hand the outcome to an awaiting caller.
    Caller(CallSender),
    /// A heartbeat ping; the dispatcher reacts to the reply itself.
    Heartbeat,
}

#[derive(Debug)]
struct PendingCall {
    owner: Owner,
    enqueued: Instant,
    completion: Completion,
    satisfied_locally: bool,
}

/// Result of matching an inbound envelope against the registry.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// A caller's call was completed.
    Completed,
    /// The outstanding heartbeat was answered.
    Heartbeat,
    /// No call has this id.
    Unmatched(Envelope),
}

#[derive(Debug, Default)]
pub(crate) struct PendingRegistry {
    calls: HashMap<MessageId, PendingCall>,
}

impl PendingRegistry {
    pub(crate) fn len(&self) -> usize {
        self.calls.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &MessageId) -> bool {
        self.calls.contains_key(id)
    }

    /// Track a call. A previous call with the same id is cancelled.
    pub(crate) fn register(
        &mut self,
        id: MessageId,
        owner: Owner,
        completion: Completion,
        satisfied_locally: bool,
    ) {
        let call = PendingCall {
            owner,
            enqueued: Instant::now(),
            completion,
            satisfied_locally,
        };
        if let Some(previous) = self.calls.insert(id.clone(), call) {
            warn!(%id, "correlation id reused, cancelling earlier call");
            abort(previous, CallError::Cancelled);
        }
    }

    /// Complete the call matching `envelope`'s id.
    pub(crate) fn resolve(&mut self, envelope: Envelope) -> Resolution {
        if envelope.id().is_empty() {
            return Resolution::Unmatched(envelope);
        }
        let Some(call) = self.calls.remove(envelope.id()) else {
            return Resolution::Unmatched(envelope);
        };
        match call.completion {
            Completion::Caller(tx) => {
                if tx.send(Ok(envelope)).is_err() {
                    debug!("caller dropped its pending response");
                }
                Resolution::Completed
            }
            Completion::Heartbeat => Resolution::Heartbeat,
        }
    }

    /// Remove and abort every call matching `predicate`. Returns the count.
    fn abort_where(&mut self, reason: CallError, predicate: impl Fn(&PendingCall) -> bool) -> usize {
        let doomed: Vec<MessageId> = self
            .calls
            .iter()
            .filter(|(_, call)| predicate(call))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &doomed {
            if let Some(call) = self.calls.remove(id) {
                abort(call, reason);
            }
        }
        if !doomed.is_empty() {
            debug!(count = doomed.len(), %reason, "aborted pending calls");
        }
        doomed.len()
    }

    /// Abort one call by id.
    pub(crate) fn cancel(&mut self, id: &MessageId) -> bool {
        match self.calls.remove(id) {
            Some(call) => {
                abort(call, CallError::Cancelled);
                true
            }
            None => false,
        }
    }

    pub(crate) fn abort_owner(&mut self, owner: &SubscriberId, reason: CallError) -> usize {
        self.abort_where(reason, |call| {
            matches!(&call.owner, Owner::Subscriber(id) if id == owner)
        })
    }

    pub(crate) fn abort_internal(&mut self, reason: CallError) -> usize {
        self.abort_where(reason, |call| call.owner == Owner::Internal)
    }

    /// Abort everything that needed the wire. Locally satisfied calls stay.
    pub(crate) fn abort_connection_loss(&mut self) -> usize {
        self.abort_where(CallError::ConnectionLost, |call| !call.satisfied_locally)
    }

    /// Abort calls older than `max_age` as of `now`.
    pub(crate) fn abort_stale(&mut self, now: Instant, max_age: Duration) -> usize {
        self.abort_where(CallError::Timeout, |call| {
            now.saturating_duration_since(call.enqueued) > max_age
        })
    }

    pub(crate) fn abort_all(&mut self, reason: CallError) -> usize {
        self.abort_where(reason, |_| true)
    }
}

fn abort(call: PendingCall, reason: CallError) {
    if let Completion::Caller(tx) = call.completion {
        let _ = tx.send(Err(reason));
    }
}
