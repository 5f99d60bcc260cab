//! Connection state model.
//!
//! [`DetailedState`] is the fine-grained lifecycle state of the transport;
//! [`ConnectionStatus`] is the coarse view callers observe. Every state
//! change goes through the transition table in
//! [`DetailedState::can_transition_to`]; [`TransportState`] is the
//! thread-safe snapshot of the current state, written only by the
//! orchestrator's worker and readable from any thread.

use std::fmt;

use parking_lot::Mutex;

/// Why the connection state last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangedReason {
    /// No particular reason recorded.
    #[default]
    None,
    /// The operation completed normally.
    Success,
    /// The caller asked for the change (explicit disconnect).
    ClientRequest,
    /// The server directed the client to another endpoint.
    ServerEndpointChanged,
    /// Credentials were missing or rejected. Terminal, never retried.
    InvalidAuth,
    /// Unclassified permanent failure. Terminal.
    UnrecoverableError,
    /// Connection establishment timed out.
    ConnectionTimeout,
    /// The underlying connection failed.
    ConnectionError,
    /// The session health check stopped answering.
    PingTimeout,
    /// The server closed the connection.
    ServerSideDisconnect,
    /// Something broke inside the client.
    InternalError,
}

/// Coarse connection status exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connection attempt (or reconnect/handoff) is in progress.
    Connecting,
    /// The gateway session is established.
    Connected,
    /// No usable connection exists.
    Disconnected,
}

/// Fine-grained connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailedState {
    /// Initial state. Never a transition target.
    Idle,
    /// A connect attempt has started.
    Connecting,
    /// Waiting for the registry to resolve a routing policy.
    ConnectingRegistry,
    /// Opening a gateway session against a resolved policy.
    ConnectingGateway,
    /// A server-directed endpoint migration has started.
    Handoff,
    /// The gateway session is established.
    Connected,
    /// The session dropped and a new attempt is being made.
    Reconnecting,
    /// The caller asked to disconnect; waiting for the session to close.
    Disconnecting,
    /// The session closed.
    Disconnected,
    /// The connection failed terminally.
    Failed,
}

impl DetailedState {
    /// Returns whether the transition table allows moving to `target`.
    ///
    /// A transition to the current state is not covered here; the caller
    /// treats it as a no-op success before consulting the table.
    pub fn can_transition_to(self, target: DetailedState) -> bool {
        use DetailedState::*;
        match target {
            Idle => false,
            Connecting => self == Idle,
            ConnectingRegistry => matches!(self, Connecting | Reconnecting),
            ConnectingGateway => {
                matches!(self, ConnectingRegistry | Handoff | Connecting | Reconnecting)
            }
            // The handoff directive arrives on a live connection; Idle is
            // kept as a source so a transport can also be born handing off.
            Handoff => matches!(self, Idle | Connected),
            Connected => matches!(self, ConnectingGateway | Reconnecting),
            Disconnecting => !matches!(self, Disconnected | Failed | Idle),
            Disconnected => matches!(self, Connected | Disconnecting),
            Reconnecting => matches!(self, ConnectingGateway | Connected),
            Failed => true,
        }
    }

    /// Maps this detailed state to the coarse status callers observe.
    pub fn status(self) -> ConnectionStatus {
        use DetailedState::*;
        match self {
            Connecting | ConnectingRegistry | ConnectingGateway | Handoff | Reconnecting => {
                ConnectionStatus::Connecting
            }
            Connected => ConnectionStatus::Connected,
            Idle | Disconnecting | Disconnected | Failed => ConnectionStatus::Disconnected,
        }
    }
}

impl fmt::Display for DetailedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    detailed: DetailedState,
    reason: ChangedReason,
    handoff: bool,
}

/// Thread-safe snapshot of the current connection state.
///
/// Writes are confined to the orchestrator's single worker; the mutex only
/// guards the copy so any thread can take a consistent read.
pub struct TransportState {
    inner: Mutex<Snapshot>,
}

impl TransportState {
    /// Creates a state snapshot starting at [`DetailedState::Idle`].
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Snapshot {
                detailed: DetailedState::Idle,
                reason: ChangedReason::None,
                handoff: false,
            }),
        }
    }

    /// Current detailed state.
    pub fn detailed_state(&self) -> DetailedState {
        self.inner.lock().detailed
    }

    /// Reason recorded with the last state change.
    pub fn reason(&self) -> ChangedReason {
        self.inner.lock().reason
    }

    /// Whether the current connection attempt originates from a handoff.
    pub fn handoff(&self) -> bool {
        self.inner.lock().handoff
    }

    /// True if the detailed state is [`DetailedState::Connected`].
    pub fn is_connected(&self) -> bool {
        self.detailed_state() == DetailedState::Connected
    }

    /// True if connected or any connect/reconnect/handoff is in progress.
    pub fn is_connected_or_connecting(&self) -> bool {
        !matches!(
            self.detailed_state().status(),
            ConnectionStatus::Disconnected
        )
    }

    /// Applies a validated transition. Same-state is a no-op success;
    /// a transition the table forbids is a no-op failure.
    pub(crate) fn transition(&self, target: DetailedState, reason: ChangedReason) -> bool {
        let mut inner = self.inner.lock();
        if inner.detailed == target {
            tracing::debug!(state = %target, "already in state");
            return true;
        }
        if !inner.detailed.can_transition_to(target) {
            tracing::debug!(from = %inner.detailed, to = %target, "transition rejected");
            return false;
        }
        inner.detailed = target;
        inner.reason = reason;
        true
    }

    /// Forces the state without consulting the table. Shutdown-only.
    pub(crate) fn force(&self, target: DetailedState, reason: ChangedReason) {
        let mut inner = self.inner.lock();
        inner.detailed = target;
        inner.reason = reason;
    }

    pub(crate) fn set_handoff(&self, handoff: bool) {
        self.inner.lock().handoff = handoff;
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TransportState")
            .field("detailed", &inner.detailed)
            .field("reason", &inner.reason)
            .field("handoff", &inner.handoff)
            .finish()
    }
}
