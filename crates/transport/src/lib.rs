//! Connection management for the Nara gateway.
//!
//! This crate owns the device-side connection lifecycle: resolving a
//! routing policy from the registry, establishing a streaming gateway
//! session, and driving reconnects, server-directed handoffs, and
//! shutdown through one serialized state machine.
//!
//! The wire-level pieces are injected: a [`PolicyResolver`] answers
//! registry lookups, a [`GatewayConnector`] builds [`GatewaySession`]s,
//! and an [`AuthProvider`] supplies credentials. [`GatewayTransport`]
//! orchestrates them.

pub mod auth;
pub mod call;
pub mod gateway;
pub mod registry;
pub mod state;
pub mod transport;

pub use auth::AuthProvider;
pub use call::{Call, CallCompletion};
pub use gateway::{
    GatewayConnector, GatewaySession, MessageSink, SendOutcome, SessionContext, SessionEvent,
    SessionEvents,
};
pub use registry::{PolicyError, PolicyFuture, PolicyResolver, default_policy};
pub use state::{ChangedReason, ConnectionStatus, DetailedState, TransportState};
pub use transport::{
    DirectivesPredicate, GatewayTransport, HandoffParams, TransportContext, TransportObserver,
};
