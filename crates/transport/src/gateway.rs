//! Gateway session boundary.
//!
//! A [`GatewaySession`] owns one lifetime of a streaming connection to a
//! specific endpoint. The orchestrator destroys and replaces the session on
//! every reconnect or handoff and never shares it across attempts. The
//! session reports back through [`SessionEvents`], a generation-tagged
//! sender that re-enters the orchestrator's serialized worker; events from
//! a session that has already been replaced are discarded there.

use std::sync::Arc;

use nara_protocol::{Directive, Policy};

use crate::auth::AuthProvider;
use crate::call::Call;
use crate::state::ChangedReason;

/// Consumes inbound directives delivered by the gateway session.
pub trait MessageSink: Send + Sync {
    /// Handles one server-initiated directive.
    fn consume(&self, directive: Directive);
}

/// Events a gateway session reports to the transport.
///
/// Each logical event is delivered at most once per session; ordering is
/// preserved by the worker's FIFO queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The streaming connection is established and usable.
    Connected,
    /// The session failed. [`ChangedReason::Success`] is a no-op by
    /// contract; anything else ends or retries the attempt.
    Error(ChangedReason),
    /// The session lost its stream and is re-establishing it internally.
    Reconnecting(ChangedReason),
    /// The session closed after a requested disconnect.
    Disconnected(ChangedReason),
}

/// Generation-tagged event sender handed to each session.
///
/// Cloneable so session internals (reader task, health checker) can emit
/// independently. Delivery is best-effort: once the transport is gone the
/// events go nowhere.
#[derive(Clone)]
pub struct SessionEvents {
    pub(crate) session_id: u64,
    // Weak on purpose: the worker owns the session and the session holds
    // this handle, so a strong sender would keep the worker alive forever.
    pub(crate) tx: tokio::sync::mpsc::WeakUnboundedSender<crate::transport::Command>,
}

impl SessionEvents {
    /// Reports a session event to the transport worker.
    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(crate::transport::Command::Session {
                id: self.session_id,
                event,
            });
        }
    }
}

/// Everything a connector needs to build one session.
pub struct SessionContext {
    /// Routing policy the session should connect with.
    pub policy: Policy,
    /// Authorization source for the session's own calls.
    pub auth: Arc<dyn AuthProvider>,
    /// Where inbound directives go.
    pub sink: Arc<dyn MessageSink>,
    /// Event channel back into the transport worker.
    pub events: SessionEvents,
    /// Whether the server-initiated directives channel should start enabled.
    pub directives_enabled: bool,
}

/// Result of handing a call to a session.
pub enum SendOutcome {
    /// The session took the call and will complete it.
    Accepted,
    /// The session is not ready; the call is handed back untouched.
    Rejected(Call),
}

/// One lifetime of a streaming connection to a specific gateway endpoint.
///
/// All methods are invoked from the transport worker, never concurrently.
/// `connect` only means the attempt was accepted; success or failure
/// arrives later as a [`SessionEvent`].
pub trait GatewaySession: Send {
    /// Starts connecting. Returns false if the attempt could not even be
    /// scheduled (the session is then discarded).
    fn connect(&mut self) -> bool;

    /// Hands an outbound call to the session.
    fn send(&mut self, call: Call) -> SendOutcome;

    /// Starts a graceful close; a [`SessionEvent::Disconnected`] follows.
    fn disconnect(&mut self);

    /// Releases all transport resources. Idempotent. No events are
    /// delivered after this returns.
    fn shutdown(&mut self);

    /// Opens the server-initiated directives channel on the established
    /// session.
    fn start_directives_service(&mut self);

    /// Closes the server-initiated directives channel.
    fn stop_directives_service(&mut self);
}

/// Creates gateway sessions; the injection seam between the transport and
/// the wire-level streaming client.
pub trait GatewayConnector: Send + Sync {
    /// Builds a session for one connection attempt.
    fn create_session(&self, ctx: SessionContext) -> Box<dyn GatewaySession>;
}
