//! Wire types shared across the Nara device client.
//!
//! This crate holds the pure data model for talking to the registry and the
//! device gateway:
//!
//! - **Routing policy**: [`Policy`], [`ServerPolicy`], [`HealthCheckPolicy`] -
//!   the routing directive resolved by the registry (or synthesized locally)
//! - **Server addressing**: [`ServerInfo`], [`Protocol`]
//! - **Messages**: [`MessageRequest`] (outbound events), [`Directive`]
//!   (inbound server-initiated messages)
//! - **Call status**: [`Status`], [`StatusCode`] - completion results for
//!   send attempts
//!
//! No I/O happens here; the transport crate owns all connection logic.

pub mod message;
pub mod policy;

pub use message::{Directive, MessageRequest, Status, StatusCode};
pub use policy::{
    HealthCheckPolicy, Policy, Protocol, ProtocolParseError, ServerInfo, ServerPolicy,
};
