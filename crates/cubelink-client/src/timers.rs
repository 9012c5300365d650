//! Keyed one-shot timers for the dispatch loop.
//!
//! At most one timer per [`TimerKind`] is pending; scheduling a kind again
//! replaces the earlier deadline.

use std::collections::HashMap;
use std::future::{pending, poll_fn};
use std::time::Duration;

use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum TimerKind {
    /// Send the next heartbeat.
    PingSchedule,
    /// The outstanding heartbeat went unanswered.
    PingExpired,
    /// The authentication reply did not arrive in time.
    AuthExpired,
    /// Abort calls older than the call timeout.
    StaleSweep,
    /// Retry after a dropped or failed connection.
    AutoReconnect,
    /// Reconnect in case no connectivity notification arrives.
    ReconnectFailsafe,
    /// Close the idle connection after the last subscriber left.
    AutoDisconnect,
}

#[derive(Default)]
pub(crate) struct Timers {
    queue: DelayQueue<TimerKind>,
    keys: HashMap<TimerKind, Key>,
}

impl Timers {
    pub(crate) fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        let _ = self.cancel(kind);
        let key = self.queue.insert(kind, delay);
        let _ = self.keys.insert(kind, key);
    }

    pub(crate) fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.keys.remove(&kind) {
            Some(key) => self.queue.try_remove(&key).is_some(),
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.keys.contains_key(&kind)
    }

    /// Wait for the next timer to fire. Never resolves while none are pending.
    pub(crate) async fn expired(&mut self) -> TimerKind {
        if self.queue.is_empty() {
            return pending().await;
        }
        match poll_fn(|cx| self.queue.poll_expired(cx)).await {
            Some(expired) => {
                let kind = expired.into_inner();
                let _ = self.keys.remove(&kind);
                kind
            }
            None => pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Instant, timeout};

    #[tokio::test(start_paused = true)]
    async fn fires_in_deadline_order() {
        let mut timers = Timers::default();
        timers.schedule(TimerKind::StaleSweep, Duration::from_secs(30));
        timers.schedule(TimerKind::PingExpired, Duration::from_millis(3_500));

        let start = Instant::now();
        assert_eq!(timers.expired().await, TimerKind::PingExpired);
        assert!(start.elapsed() >= Duration::from_millis(3_500));
        assert!(start.elapsed() < Duration::from_secs(30));
        assert!(!timers.is_scheduled(TimerKind::PingExpired));
        assert_eq!(timers.expired().await, TimerKind::StaleSweep);
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_replaces_deadline() {
        let mut timers = Timers::default();
        timers.schedule(TimerKind::AutoReconnect, Duration::from_secs(1));
        timers.schedule(TimerKind::AutoReconnect, Duration::from_secs(5));

        let start = Instant::now();
        assert_eq!(timers.expired().await, TimerKind::AutoReconnect);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(timeout(Duration::from_secs(60), timers.expired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let mut timers = Timers::default();
        timers.schedule(TimerKind::AutoDisconnect, Duration::from_secs(10));
        assert!(timers.is_scheduled(TimerKind::AutoDisconnect));
        assert!(timers.cancel(TimerKind::AutoDisconnect));
        assert!(!timers.cancel(TimerKind::AutoDisconnect));
        assert!(timeout(Duration::from_secs(20), timers.expired()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_stays_pending() {
        let mut timers = Timers::default();
        assert!(timeout(Duration::from_secs(1), timers.expired()).await.is_err());
        timers.schedule(TimerKind::PingSchedule, Duration::from_millis(10));
        assert_eq!(timers.expired().await, TimerKind::PingSchedule);
    }
}
