//! Interceptors that can satisfy a request locally.
//!
//! Interceptors are offered each outgoing request in registration order. The
//! first one that returns `true` claims it: the request never reaches the wire
//! and the claimer answers through the [`Responder`], now or later.

use std::fmt;
use std::sync::Arc;

use cubelink_core::{Envelope, InterceptorId};
use tokio::sync::mpsc;

use crate::dispatch::Event;

/// Claims requests before they are transmitted.
pub trait Interceptor: Send + Sync + 'static {
    /// Return `true` to claim `request`.
    fn intercept(&self, request: &Envelope, responder: &Responder) -> bool;
}

impl<F> Interceptor for F
where
    F: Fn(&Envelope, &Responder) -> bool + Send + Sync + 'static,
{
    fn intercept(&self, request: &Envelope, responder: &Responder) -> bool {
        self(request, responder)
    }
}

/// Delivers synthesized responses back into the dispatch queue.
///
/// Responses travel the same path as frames from the server, so they are
/// processed after the submission that produced them has been recorded.
#[derive(Clone)]
pub struct Responder {
    events: mpsc::UnboundedSender<Event>,
}

impl Responder {
    pub(crate) fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self { events }
    }

    /// Post `response`. Returns `false` if the client has shut down.
    pub fn respond(&self, response: Envelope) -> bool {
        self.events.send(Event::Respond(response)).is_ok()
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("closed", &self.events.is_closed())
            .finish()
    }
}

#[derive(Default)]
pub(crate) struct InterceptorChain {
    entries: Vec<(InterceptorId, Arc<dyn Interceptor>)>,
}

impl InterceptorChain {
    pub(crate) fn add(&mut self, id: InterceptorId, interceptor: Arc<dyn Interceptor>) {
        self.entries.push((id, interceptor));
    }

    pub(crate) fn remove(&mut self, id: &InterceptorId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| existing != id);
        self.entries.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Offer `request` down the chain; stops at the first claim.
    pub(crate) fn offer(&self, request: &Envelope, responder: &Responder) -> bool {
        self.entries
            .iter()
            .any(|(_, interceptor)| interceptor.intercept(request, responder))
    }
}
