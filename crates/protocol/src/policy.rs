//! Routing policy types resolved by the registry.
//!
//! A [`Policy`] is the registry's answer to "where should this device
//! connect": an ordered list of candidate gateway endpoints plus the
//! health-check parameters the session should run against whichever
//! endpoint it lands on. Policies are immutable once constructed; the
//! transport replaces them wholesale on every resolution or handoff.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport protocol a gateway endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    /// HTTP/2 over TLS.
    #[serde(rename = "H2")]
    H2,
    /// HTTP/2 cleartext (development and on-premise setups).
    #[serde(rename = "H2C")]
    H2c,
}

/// Error returned when parsing a [`Protocol`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown gateway protocol: {0:?}")]
pub struct ProtocolParseError(pub String);

impl FromStr for Protocol {
    type Err = ProtocolParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "H2" | "h2" => Ok(Protocol::H2),
            "H2C" | "h2c" => Ok(Protocol::H2c),
            other => Err(ProtocolParseError(other.to_string())),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::H2 => write!(f, "H2"),
            Protocol::H2c => write!(f, "H2C"),
        }
    }
}

/// Statically configured gateway endpoint for this device.
///
/// Used to address the registry and to synthesize the default policy when
/// server-initiated directives are disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Protocol the configured endpoint speaks.
    pub protocol: Protocol,
    /// Gateway hostname.
    pub hostname: String,
    /// Gateway port.
    pub port: u16,
}

impl ServerInfo {
    /// Creates server info for the given endpoint.
    pub fn new(protocol: Protocol, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            protocol,
            hostname: hostname.into(),
            port,
        }
    }
}

/// Health-check parameters for an established gateway session.
///
/// The session pings the gateway at `interval_ms` and treats a ping that
/// takes longer than `timeout_ms` as a failure, retrying up to
/// `retry_count_limit` times with `retry_delay_ms` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckPolicy {
    /// Milliseconds between pings.
    pub interval_ms: u32,
    /// Milliseconds before an unanswered ping counts as failed.
    pub timeout_ms: u32,
    /// How many consecutive ping failures are tolerated.
    pub retry_count_limit: u32,
    /// Milliseconds between ping retries.
    pub retry_delay_ms: u32,
}

/// One candidate gateway endpoint in a resolved policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPolicy {
    /// Protocol this endpoint speaks.
    pub protocol: Protocol,
    /// Endpoint hostname.
    pub hostname: String,
    /// Endpoint port.
    pub port: u16,
    /// Connection attempts allowed against this endpoint before moving on.
    pub retry_count_limit: u32,
    /// Milliseconds allowed for connection establishment.
    pub connection_timeout_ms: u32,
    /// Charge/tier tag assigned by the registry (e.g. "Normal", "Free").
    pub charge: String,
}

/// Routing directive: health-check parameters plus ordered endpoint
/// candidates.
///
/// Produced by the registry or synthesized locally from [`ServerInfo`].
/// The transport caches the last successful policy so a server-directed
/// handoff can reuse its health-check parameters without a fresh registry
/// round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Health-check parameters for whichever endpoint is used.
    pub health_check_policy: HealthCheckPolicy,
    /// Candidate endpoints in preference order.
    pub server_policies: Vec<ServerPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_parses_both_cases() {
        assert_eq!("H2".parse::<Protocol>().unwrap(), Protocol::H2);
        assert_eq!("h2c".parse::<Protocol>().unwrap(), Protocol::H2c);
        assert!("spdy".parse::<Protocol>().is_err());
    }

    #[test]
    fn protocol_display_matches_wire_form() {
        assert_eq!(Protocol::H2.to_string(), "H2");
        assert_eq!(Protocol::H2c.to_string(), "H2C");
    }

    #[test]
    fn policy_deserializes_from_registry_response() {
        let json = r#"{
            "healthCheckPolicy": {
                "intervalMs": 30000,
                "timeoutMs": 15000,
                "retryCountLimit": 3,
                "retryDelayMs": 1000
            },
            "serverPolicies": [
                {
                    "protocol": "H2",
                    "hostname": "gw1.nara.example",
                    "port": 443,
                    "retryCountLimit": 2,
                    "connectionTimeoutMs": 10000,
                    "charge": "Normal"
                },
                {
                    "protocol": "H2C",
                    "hostname": "gw2.nara.example",
                    "port": 8080,
                    "retryCountLimit": 2,
                    "connectionTimeoutMs": 10000,
                    "charge": "Free"
                }
            ]
        }"#;

        let policy: Policy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.health_check_policy.interval_ms, 30000);
        assert_eq!(policy.server_policies.len(), 2);
        assert_eq!(policy.server_policies[0].hostname, "gw1.nara.example");
        assert_eq!(policy.server_policies[1].protocol, Protocol::H2c);
        assert_eq!(policy.server_policies[1].charge, "Free");
    }
}
