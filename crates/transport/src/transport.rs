//! Transport orchestrator.
//!
//! [`GatewayTransport`] sequences policy resolution, gateway connection, and
//! handoff/reconnect cycles. Every mutation funnels through one worker task
//! consuming a FIFO command channel - the sole synchronization mechanism.
//! Public entry points, resolver completions, and session events all
//! re-enter through that channel before touching state, so no two
//! transitions can race and no locks are held across the transition table.
//!
//! # Command Flow
//!
//! 1. Caller invokes `connect()` - a `Connect` command is queued
//! 2. Worker transitions to `Connecting` and starts policy resolution
//! 3. Resolution completes on its own task and queues `PolicyResolved`
//! 4. Worker transitions to `ConnectingGateway` and opens a session
//! 5. The session's `Connected` event is queued and the worker transitions
//!    to `Connected`, notifying the observer
//!
//! Late resolver completions and events from replaced sessions are tagged
//! with sequence numbers and discarded if the world has moved on.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use nara_protocol::{
    HealthCheckPolicy, MessageRequest, Policy, Protocol, ServerInfo, ServerPolicy, Status,
};

use crate::auth::{AuthProvider, non_blank_authorization};
use crate::call::{Call, CallCompletion};
use crate::gateway::{
    GatewayConnector, GatewaySession, MessageSink, SendOutcome, SessionContext, SessionEvent,
    SessionEvents,
};
use crate::registry::{POLICY_RESOLVE_TIMEOUT, PolicyResolver, default_policy};
use crate::state::{ChangedReason, ConnectionStatus, DetailedState, TransportState};

/// Receives coarse connection status changes.
///
/// Callbacks run on the transport worker; implementations should hand off
/// anything slow. After `shutdown()` completes no further callbacks occur.
pub trait TransportObserver: Send + Sync {
    /// A connection attempt (or reconnect/handoff) started.
    fn on_connecting(&self, reason: ChangedReason);
    /// The gateway session is established.
    fn on_connected(&self);
    /// The connection ended; `reason` says why.
    fn on_disconnected(&self, reason: ChangedReason);
}

/// Predicate deciding whether the server-initiated directives channel is
/// wanted. Consulted on every resolution attempt, so the answer may change
/// between reconnects.
pub type DirectivesPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Endpoint parameters carried by a server-directed handoff directive.
#[derive(Debug, Clone)]
pub struct HandoffParams {
    /// Protocol the new endpoint speaks.
    pub protocol: Protocol,
    /// New endpoint hostname.
    pub hostname: String,
    /// Resolved address of the new endpoint (informational).
    pub address: String,
    /// New endpoint port.
    pub port: u16,
    /// Connection attempts allowed against the new endpoint.
    pub retry_count_limit: u32,
    /// Milliseconds allowed for connection establishment.
    pub connection_timeout_ms: u32,
    /// Charge/tier tag for the new endpoint.
    pub charge: String,
}

/// Everything the transport needs wired in.
pub struct TransportContext {
    /// Statically configured gateway endpoint.
    pub server_info: ServerInfo,
    /// Authorization source.
    pub auth: Arc<dyn AuthProvider>,
    /// Where inbound directives go.
    pub sink: Arc<dyn MessageSink>,
    /// Registry boundary.
    pub resolver: Arc<dyn PolicyResolver>,
    /// Gateway session factory.
    pub connector: Arc<dyn GatewayConnector>,
    /// Whether server-initiated directives are wanted.
    pub directives_enabled: DirectivesPredicate,
    /// Soft timeout for policy resolution. Expiry logs and keeps waiting.
    pub policy_timeout: Duration,
}

impl TransportContext {
    /// Creates a context with the default policy-resolution timeout.
    pub fn new(
        server_info: ServerInfo,
        auth: Arc<dyn AuthProvider>,
        sink: Arc<dyn MessageSink>,
        resolver: Arc<dyn PolicyResolver>,
        connector: Arc<dyn GatewayConnector>,
        directives_enabled: DirectivesPredicate,
    ) -> Self {
        Self {
            server_info,
            auth,
            sink,
            resolver,
            connector,
            directives_enabled,
            policy_timeout: POLICY_RESOLVE_TIMEOUT,
        }
    }
}

/// Commands consumed by the transport worker.
pub(crate) enum Command {
    Connect(oneshot::Sender<bool>),
    Disconnect,
    Send {
        call: Call,
        reply: Option<oneshot::Sender<bool>>,
    },
    Shutdown(oneshot::Sender<()>),
    Handoff(HandoffParams),
    StartDirectives,
    StopDirectives,
    PolicyResolved {
        seq: u64,
        policy: Policy,
    },
    PolicyFailed {
        seq: u64,
        reason: ChangedReason,
    },
    Session {
        id: u64,
        event: SessionEvent,
    },
}

/// Connection-management core: owns the state machine and the single live
/// gateway session.
///
/// Cheap to hand around behind an `Arc`; all methods take `&self`. Dropping
/// the last handle lets the worker wind down once in-flight resolver tasks
/// and sessions are gone.
pub struct GatewayTransport {
    state: Arc<TransportState>,
    commands: mpsc::UnboundedSender<Command>,
}

impl GatewayTransport {
    /// Creates the transport and spawns its worker. Requires a Tokio
    /// runtime.
    pub fn create(ctx: TransportContext, observer: Arc<dyn TransportObserver>) -> Self {
        let state = Arc::new(TransportState::new());
        let (commands, rx) = mpsc::unbounded_channel();

        let worker = Worker {
            state: Arc::clone(&state),
            reentry: commands.downgrade(),
            ctx,
            observer: Some(observer),
            session: None,
            session_seq: 0,
            resolve_seq: 0,
            cached_policy: None,
            shut_down: false,
        };
        tokio::spawn(worker.run(rx));

        Self { state, commands }
    }

    /// Starts a connection attempt.
    ///
    /// Returns false if already connected/connecting, if the transport has
    /// reached a terminal state, or if the policy path could not start.
    pub async fn connect(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Connect(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Requests a graceful disconnect. No-op unless connected/connecting;
    /// the `Disconnected` state follows later from the session, never
    /// synchronously.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// True if the detailed state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// True if connected or any connect/reconnect/handoff is in progress.
    pub fn is_connected_or_connecting(&self) -> bool {
        self.state.is_connected_or_connecting()
    }

    /// Current detailed state snapshot.
    pub fn detailed_state(&self) -> DetailedState {
        self.state.detailed_state()
    }

    /// Reason recorded with the last state change.
    pub fn reason(&self) -> ChangedReason {
        self.state.reason()
    }

    /// Sends a call through the current session.
    ///
    /// Connected: delegates and returns whether the session accepted it.
    /// Not connected: queues a best-effort attempt and returns true; the
    /// call completes `FailedPrecondition` if no session takes it.
    pub async fn send(&self, call: Call) -> bool {
        if !self.state.is_connected() {
            tracing::debug!(
                state = %self.state.detailed_state(),
                request = %call.request().name,
                "send while not connected; queueing best-effort"
            );
            return self
                .commands
                .send(Command::Send { call, reply: None })
                .is_ok();
        }

        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Send {
                call,
                reply: Some(tx),
            })
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Creates a call for `request` plus its completion handle.
    pub fn new_call(
        &self,
        request: MessageRequest,
        headers: Option<HashMap<String, String>>,
    ) -> (Call, CallCompletion) {
        Call::new(request, headers)
    }

    /// Shuts the transport down: resolver and session resources are
    /// released, the observer is cleared, and the state is forced to
    /// `Disconnected` without notification. Idempotent and safe to call
    /// from anywhere.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Migrates to a server-directed endpoint, reusing the cached
    /// health-check policy from the last successful resolution.
    pub fn handoff_connection(&self, params: HandoffParams) {
        let _ = self.commands.send(Command::Handoff(params));
    }

    /// Opens the server-initiated directives channel on the live session.
    pub fn start_directives_service(&self) {
        let _ = self.commands.send(Command::StartDirectives);
    }

    /// Closes the server-initiated directives channel on the live session.
    pub fn stop_directives_service(&self) {
        let _ = self.commands.send(Command::StopDirectives);
    }
}

impl std::fmt::Debug for GatewayTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayTransport")
            .field("state", &self.state)
            .finish()
    }
}

/// Single-task owner of all mutable transport state.
struct Worker {
    state: Arc<TransportState>,
    /// Weak re-entry sender: resolver tasks upgrade it to strong clones,
    /// the worker itself must not keep its own channel alive.
    reentry: mpsc::WeakUnboundedSender<Command>,
    ctx: TransportContext,
    observer: Option<Arc<dyn TransportObserver>>,
    session: Option<Box<dyn GatewaySession>>,
    /// Generation of the current session; events from older ones are stale.
    session_seq: u64,
    /// Generation of the current resolution attempt.
    resolve_seq: u64,
    /// Last successful policy, kept so handoff can reuse its health-check
    /// parameters without a fresh registry round-trip.
    cached_policy: Option<Policy>,
    shut_down: bool,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        tracing::debug!("transport worker stopped");
    }

    fn handle(&mut self, cmd: Command) {
        if self.shut_down {
            match cmd {
                Command::Shutdown(done) => {
                    let _ = done.send(());
                }
                Command::Send { call, reply } => {
                    call.complete(
                        Status::FAILED_PRECONDITION.with_description("transport is shut down"),
                    );
                    if let Some(reply) = reply {
                        let _ = reply.send(false);
                    }
                }
                _ => tracing::debug!("command ignored after shutdown"),
            }
            return;
        }

        match cmd {
            Command::Connect(reply) => {
                let _ = reply.send(self.connect());
            }
            Command::Disconnect => self.disconnect(),
            Command::Send { call, reply } => self.send(call, reply),
            Command::Shutdown(done) => {
                self.shutdown();
                let _ = done.send(());
            }
            Command::Handoff(params) => self.handoff(params),
            Command::StartDirectives => self.toggle_directives(true),
            Command::StopDirectives => self.toggle_directives(false),
            Command::PolicyResolved { seq, policy } => self.policy_resolved(seq, policy),
            Command::PolicyFailed { seq, reason } => self.policy_failed(seq, reason),
            Command::Session { id, event } => self.session_event(id, event),
        }
    }

    fn connect(&mut self) -> bool {
        if self.state.is_connected_or_connecting() {
            tracing::debug!(state = %self.state.detailed_state(), "connect rejected");
            return false;
        }
        if !self.set_state(DetailedState::Connecting, ChangedReason::None) {
            return false;
        }
        self.try_get_policy()
    }

    /// Starts the policy path: registry lookup, or the local default policy
    /// when server-push mode is disabled.
    fn try_get_policy(&mut self) -> bool {
        if self.state.detailed_state() == DetailedState::ConnectingRegistry {
            tracing::warn!("policy resolution already in progress; duplicate attempt rejected");
            return false;
        }

        if !(self.ctx.directives_enabled)() {
            let policy = default_policy(&self.ctx.server_info);
            self.cached_policy = Some(policy.clone());
            return self.try_connect_gateway(policy);
        }

        if !self.set_state(DetailedState::ConnectingRegistry, ChangedReason::None) {
            return false;
        }

        self.resolve_seq += 1;
        let seq = self.resolve_seq;
        let Some(tx) = self.reentry.upgrade() else {
            return false;
        };

        let resolver = Arc::clone(&self.ctx.resolver);
        let server_info = self.ctx.server_info.clone();
        let authorization = self.ctx.auth.authorization().unwrap_or_default();
        let soft_timeout = self.ctx.policy_timeout;

        tokio::spawn(async move {
            let fut = async move { resolver.resolve(server_info, authorization).await };
            tokio::pin!(fut);

            // Soft timeout: log and keep waiting. The request is never
            // hard-cancelled; a late completion is validated against the
            // current attempt sequence before it can touch state.
            let result = match tokio::time::timeout(soft_timeout, &mut fut).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = soft_timeout.as_millis() as u64,
                        "timed out waiting for policy resolution"
                    );
                    fut.await
                }
            };

            let cmd = match result {
                Ok(policy) => Command::PolicyResolved { seq, policy },
                Err(err) => {
                    tracing::debug!(error = %err, "policy resolution failed");
                    Command::PolicyFailed {
                        seq,
                        reason: err.reason(),
                    }
                }
            };
            let _ = tx.send(cmd);
        });

        true
    }

    fn policy_resolved(&mut self, seq: u64, policy: Policy) {
        if seq != self.resolve_seq {
            tracing::debug!(seq, current = self.resolve_seq, "stale policy resolution ignored");
            return;
        }
        self.cached_policy = Some(policy.clone());
        self.try_connect_gateway(policy);
    }

    fn policy_failed(&mut self, seq: u64, reason: ChangedReason) {
        if seq != self.resolve_seq {
            tracing::debug!(seq, current = self.resolve_seq, "stale policy failure ignored");
            return;
        }
        self.set_state(DetailedState::Failed, reason);
    }

    /// Opens a gateway session against `policy`, replacing any prior one.
    fn try_connect_gateway(&mut self, policy: Policy) -> bool {
        if non_blank_authorization(self.ctx.auth.as_ref()).is_none() {
            self.set_state(DetailedState::Failed, ChangedReason::InvalidAuth);
            return false;
        }

        // Whether this attempt is a handoff decides how a later session
        // failure is handled, so capture it before leaving the state.
        let handoff = self.state.detailed_state() == DetailedState::Handoff;
        self.state.set_handoff(handoff);

        if !self.set_state(DetailedState::ConnectingGateway, ChangedReason::None) {
            return false;
        }

        if let Some(mut old) = self.session.take() {
            tracing::debug!("shutting down previous gateway session");
            old.shutdown();
        }

        self.session_seq += 1;
        let events = SessionEvents {
            session_id: self.session_seq,
            tx: self.reentry.clone(),
        };

        let mut session = self.ctx.connector.create_session(SessionContext {
            policy,
            auth: Arc::clone(&self.ctx.auth),
            sink: Arc::clone(&self.ctx.sink),
            events,
            directives_enabled: (self.ctx.directives_enabled)(),
        });
        let accepted = session.connect();
        if !accepted {
            tracing::debug!("gateway session refused the connect attempt");
        }
        self.session = Some(session);
        accepted
    }

    fn session_event(&mut self, id: u64, event: SessionEvent) {
        if id != self.session_seq {
            tracing::debug!(id, current = self.session_seq, "event from replaced session ignored");
            return;
        }

        match event {
            SessionEvent::Connected => {
                self.set_state(DetailedState::Connected, ChangedReason::None);
                if self.state.handoff() {
                    self.state.set_handoff(false);
                    tracing::debug!("handoff completed");
                }
            }
            SessionEvent::Error(reason) => match reason {
                ChangedReason::Success => {}
                ChangedReason::InvalidAuth => {
                    self.set_state(DetailedState::Failed, reason);
                }
                _ => {
                    if self.state.handoff() {
                        // A failed handoff falls back to normal
                        // reconnection through the registry.
                        self.set_state(DetailedState::Reconnecting, reason);
                        self.try_get_policy();
                    } else {
                        self.set_state(DetailedState::Failed, reason);
                    }
                }
            },
            SessionEvent::Reconnecting(reason) => {
                self.set_state(DetailedState::Reconnecting, reason);
            }
            SessionEvent::Disconnected(reason) => {
                self.set_state(DetailedState::Disconnected, reason);
            }
        }
    }

    fn disconnect(&mut self) {
        if !self.state.is_connected_or_connecting() {
            tracing::debug!(state = %self.state.detailed_state(), "disconnect ignored");
            return;
        }
        // Disconnected follows later from the session's event; invalidate
        // any in-flight resolution so a late policy cannot revive the
        // attempt.
        self.resolve_seq += 1;
        self.set_state(DetailedState::Disconnecting, ChangedReason::ClientRequest);
        if let Some(session) = self.session.as_mut() {
            session.disconnect();
        }
    }

    fn send(&mut self, call: Call, reply: Option<oneshot::Sender<bool>>) {
        let accepted = match self.session.as_mut() {
            Some(session) => match session.send(call) {
                SendOutcome::Accepted => true,
                SendOutcome::Rejected(call) => {
                    call.complete(
                        Status::FAILED_PRECONDITION
                            .with_description("send() called while not connected"),
                    );
                    false
                }
            },
            None => {
                call.complete(
                    Status::FAILED_PRECONDITION
                        .with_description("send() called while not connected"),
                );
                false
            }
        };
        if let Some(reply) = reply {
            let _ = reply.send(accepted);
        }
    }

    fn shutdown(&mut self) {
        tracing::debug!("shutting down transport");
        self.ctx.resolver.shutdown();
        if let Some(mut session) = self.session.take() {
            session.shutdown();
        }
        // Observer is cleared first: the forced Disconnected is recorded
        // but never delivered.
        self.observer = None;
        self.state.force(DetailedState::Disconnected, ChangedReason::None);
        self.state.set_handoff(false);
        self.shut_down = true;
    }

    fn handoff(&mut self, params: HandoffParams) {
        if !self.set_state(DetailedState::Handoff, ChangedReason::ServerEndpointChanged) {
            tracing::warn!(state = %self.state.detailed_state(), "handoff rejected");
            return;
        }

        let Some(health_check_policy) = self
            .cached_policy
            .as_ref()
            .map(|p| p.health_check_policy)
        else {
            tracing::debug!("no cached health-check policy; handoff cannot proceed");
            self.set_state(DetailedState::Failed, ChangedReason::UnrecoverableError);
            return;
        };

        tracing::debug!(
            hostname = %params.hostname,
            address = %params.address,
            port = params.port,
            charge = %params.charge,
            "handing off to new gateway endpoint"
        );
        let policy = handoff_policy(health_check_policy, params);
        self.try_connect_gateway(policy);
    }

    fn toggle_directives(&mut self, start: bool) {
        if self.session.is_none() {
            tracing::warn!("no gateway session; directives toggle ignored");
            return;
        }
        self.set_state(
            DetailedState::Reconnecting,
            ChangedReason::ServerEndpointChanged,
        );
        if let Some(session) = self.session.as_mut() {
            if start {
                session.start_directives_service();
            } else {
                session.stop_directives_service();
            }
        }
    }

    /// Applies a transition and notifies the observer when the coarse
    /// status changes. Returns whether the transition was applied.
    fn set_state(&mut self, target: DetailedState, reason: ChangedReason) -> bool {
        let previous = self.state.detailed_state();
        if !self.state.transition(target, reason) {
            return false;
        }
        if previous == target {
            return true;
        }

        tracing::debug!(
            from = %previous,
            to = %target,
            reason = ?reason,
            delivered = self.observer.is_some(),
            "state changed"
        );

        let status = target.status();
        if status == previous.status() {
            return true;
        }
        if let Some(observer) = self.observer.as_ref() {
            match status {
                ConnectionStatus::Connecting => observer.on_connecting(reason),
                ConnectionStatus::Connected => observer.on_connected(),
                ConnectionStatus::Disconnected => observer.on_disconnected(reason),
            }
        }
        true
    }
}

/// Builds the single-candidate policy for a handoff target, reusing the
/// cached health-check parameters.
fn handoff_policy(health_check_policy: HealthCheckPolicy, params: HandoffParams) -> Policy {
    Policy {
        health_check_policy,
        server_policies: vec![ServerPolicy {
            protocol: params.protocol,
            hostname: params.hostname,
            port: params.port,
            retry_count_limit: params.retry_count_limit,
            connection_timeout_ms: params.connection_timeout_ms,
            charge: params.charge,
        }],
    }
}
