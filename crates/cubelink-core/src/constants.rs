//! Protocol names, close codes, and default timings.

/// Request names understood by the server that the client itself issues.
pub mod names {
    /// First request on every connection; carries the `password` option.
    pub const AUTHENTICATE: &str = "authenticate";
    /// Heartbeat request.
    pub const PING: &str = "ping";
    /// Broadcast pushed when the remote play queue changes.
    pub const PLAY_QUEUE_CHANGED: &str = "play_queue_changed";
}

/// Option key carrying the credential in the authentication request.
pub const PASSWORD_OPTION: &str = "password";

/// WebSocket close code the server uses to reject credentials.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Default WebSocket port of the remote server.
pub const DEFAULT_PORT: u16 = 7905;

/// Time allowed for opening the socket, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Delay between heartbeat pings, and the window a ping has to be answered.
pub const DEFAULT_PING_INTERVAL_MS: u64 = 3_500;
/// Delay before an automatic reconnect attempt after a drop.
pub const DEFAULT_AUTO_RECONNECT_INTERVAL_MS: u64 = 2_000;
/// Failsafe reconnect delay in case no connectivity notification arrives.
pub const DEFAULT_RECONNECT_FAILSAFE_MS: u64 = 2_000;
/// Grace period between the last subscriber leaving and the socket closing.
pub const DEFAULT_AUTO_DISCONNECT_DELAY_MS: u64 = 10_000;
/// Age after which an unanswered call is aborted; also the sweep interval.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
