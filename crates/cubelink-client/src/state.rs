//! Connection state and transitions.

use std::fmt;

/// Lifecycle state of the single server connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No socket, no attempt in flight.
    #[default]
    Disconnected,
    /// Socket opening or authentication outstanding.
    Connecting,
    /// Authenticated and heartbeating.
    Connected,
}

impl ConnectionState {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(new, old)` state pair delivered to observers.
///
/// `new == old` only for the synthetic snapshot a late subscriber receives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateChange {
    /// State after the change.
    pub new: ConnectionState,
    /// State before the change.
    pub old: ConnectionState,
}

impl StateChange {
    /// Snapshot of `state` with no transition.
    pub fn snapshot(state: ConnectionState) -> Self {
        Self {
            new: state,
            old: state,
        }
    }

    /// Whether this is a real transition.
    pub fn is_transition(&self) -> bool {
        self.new != self.old
    }
}

/// Current state plus the most recent transition.
#[derive(Debug, Default)]
pub(crate) struct StateCell {
    current: ConnectionState,
    last: StateChange,
}

impl StateCell {
    pub(crate) fn get(&self) -> ConnectionState {
        self.current
    }

    pub(crate) fn last(&self) -> StateChange {
        self.last
    }

    /// Move to `new`. Returns the transition, or `None` when unchanged.
    pub(crate) fn set(&mut self, new: ConnectionState) -> Option<StateChange> {
        if self.current == new {
            return None;
        }
        let change = StateChange {
            new,
            old: self.current,
        };
        self.current = new;
        self.last = change;
        Some(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), ConnectionState::Disconnected);
        assert_eq!(cell.last(), StateChange::snapshot(ConnectionState::Disconnected));
    }

    #[test]
    fn set_records_transition() {
        let mut cell = StateCell::default();
        let change = cell.set(ConnectionState::Connecting).unwrap();
        assert_eq!(change.new, ConnectionState::Connecting);
        assert_eq!(change.old, ConnectionState::Disconnected);
        assert!(change.is_transition());
        assert_eq!(cell.last(), change);
    }

    #[test]
    fn same_state_is_noop() {
        let mut cell = StateCell::default();
        let _ = cell.set(ConnectionState::Connecting);
        let before = cell.last();
        assert!(cell.set(ConnectionState::Connecting).is_none());
        assert_eq!(cell.last(), before);
    }

    #[test]
    fn display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert!(!StateChange::snapshot(ConnectionState::Connected).is_transition());
    }
}
