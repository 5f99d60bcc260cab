//! Policy resolver boundary.
//!
//! The registry RPC client itself lives outside this crate; the transport
//! only depends on the [`PolicyResolver`] trait. When server-initiated
//! directives are disabled the transport skips the registry entirely and
//! synthesizes a [`default_policy`] from the statically configured server.
//!
//! The 5-second resolution timeout is enforced by the orchestrator, not
//! here: expiry only logs and unblocks the waiting worker, the in-flight
//! request is never hard-cancelled and its late completion is still
//! delivered (and checked against current state) when it eventually fires.

use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;

use nara_protocol::{HealthCheckPolicy, Policy, ServerInfo, ServerPolicy};

use crate::state::ChangedReason;

/// How long the orchestrator waits for a registry resolution before logging
/// a timeout. The request itself keeps running.
pub const POLICY_RESOLVE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Health-check parameters used when no registry policy is available.
pub const DEFAULT_HEALTH_CHECK_POLICY: HealthCheckPolicy = HealthCheckPolicy {
    interval_ms: 30_000,
    timeout_ms: 15_000,
    retry_count_limit: 3,
    retry_delay_ms: 1_000,
};

const DEFAULT_RETRY_COUNT_LIMIT: u32 = 2;
const DEFAULT_CONNECTION_TIMEOUT_MS: u32 = 10_000;
const DEFAULT_CHARGE: &str = "Normal";

/// Why a registry resolution failed.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The registry rejected the provided credentials.
    #[error("registry rejected the provided credentials")]
    InvalidAuth,
    /// The lookup failed for a reason other than credentials.
    #[error("registry lookup failed: {0}")]
    Lookup(String),
    /// The registry answered but named no candidate endpoints.
    #[error("registry response contained no server policies")]
    EmptyPolicy,
}

impl PolicyError {
    /// Maps this failure to the reason reported through the observer.
    pub fn reason(&self) -> ChangedReason {
        match self {
            PolicyError::InvalidAuth => ChangedReason::InvalidAuth,
            PolicyError::Lookup(_) | PolicyError::EmptyPolicy => {
                ChangedReason::UnrecoverableError
            }
        }
    }
}

/// Future returned by [`PolicyResolver::resolve`].
pub type PolicyFuture<'a> = BoxFuture<'a, Result<Policy, PolicyError>>;

/// Resolves a routing policy from the registry service.
///
/// Implementations run their own I/O; the orchestrator drives `resolve` on
/// an independent task and re-enters its serialized worker with the result.
pub trait PolicyResolver: Send + Sync {
    /// Requests a routing policy for `server_info` using `authorization`.
    fn resolve(&self, server_info: ServerInfo, authorization: String) -> PolicyFuture<'_>;

    /// Releases resolver resources. Idempotent; in-flight requests may
    /// still complete (their results are discarded by the caller).
    fn shutdown(&self);
}

/// Synthesizes the single-candidate policy used when server-push mode is
/// disabled: the statically configured server plus default health-check
/// parameters. Never touches the registry.
pub fn default_policy(server_info: &ServerInfo) -> Policy {
    Policy {
        health_check_policy: DEFAULT_HEALTH_CHECK_POLICY,
        server_policies: vec![ServerPolicy {
            protocol: server_info.protocol,
            hostname: server_info.hostname.clone(),
            port: server_info.port,
            retry_count_limit: DEFAULT_RETRY_COUNT_LIMIT,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            charge: DEFAULT_CHARGE.to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nara_protocol::Protocol;

    #[test]
    fn default_policy_wraps_the_configured_server() {
        let info = ServerInfo::new(Protocol::H2, "gw.nara.example", 443);
        let policy = default_policy(&info);

        assert_eq!(policy.health_check_policy, DEFAULT_HEALTH_CHECK_POLICY);
        assert_eq!(policy.server_policies.len(), 1);
        let server = &policy.server_policies[0];
        assert_eq!(server.protocol, Protocol::H2);
        assert_eq!(server.hostname, "gw.nara.example");
        assert_eq!(server.port, 443);
        assert_eq!(server.charge, DEFAULT_CHARGE);
    }

    #[test]
    fn policy_error_reason_mapping() {
        assert_eq!(PolicyError::InvalidAuth.reason(), ChangedReason::InvalidAuth);
        assert_eq!(
            PolicyError::Lookup("registry unreachable".to_string()).reason(),
            ChangedReason::UnrecoverableError
        );
        assert_eq!(
            PolicyError::EmptyPolicy.reason(),
            ChangedReason::UnrecoverableError
        );
    }
}
