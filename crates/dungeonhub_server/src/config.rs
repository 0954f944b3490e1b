//! Core configuration.
//!
//! Plain structs with sensible development defaults. The binary crate owns
//! file formats and CLI overrides and converts into these at startup.

use std::time::Duration;

use crate::session::OverflowPolicy;

/// Per-session tunables applied at session creation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the transport should emit a heartbeat on an idle link.
    pub heartbeat_interval: Duration,
    /// Receive-idle window after which a session is disconnected.
    pub timeout: Duration,
    /// Cap on the total bytes queued for sending to this session.
    pub send_queue_limit_bytes: usize,
    /// What to do when an enqueue would exceed the cap.
    pub overflow_policy: OverflowPolicy,
    /// Token bucket burst capacity in bytes.
    pub rate_limit_capacity: f64,
    /// Token bucket refill rate in bytes per second.
    pub rate_limit_refill_per_sec: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(15_000),
            timeout: Duration::from_millis(45_000),
            send_queue_limit_bytes: 256 * 1024,
            overflow_policy: OverflowPolicy::DropNewest,
            rate_limit_capacity: 65_536.0,
            rate_limit_refill_per_sec: 32_768.0,
        }
    }
}

/// Matchmaking compatibility rule.
///
/// Two candidates pair when both party sizes are inside
/// `[min_party_size, max_party_size]` and their MMR difference is within
/// `max_mmr_delta` plus `expansion_per_second` for every second the
/// shorter-waiting candidate has been queued.
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    pub max_mmr_delta: i32,
    pub expansion_per_second: i32,
    pub min_party_size: usize,
    pub max_party_size: usize,
}

impl Default for MatchRule {
    fn default() -> Self {
        Self {
            max_mmr_delta: 100,
            expansion_per_second: 5,
            min_party_size: 1,
            max_party_size: 5,
        }
    }
}

/// Server-wide configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Defaults for newly created sessions.
    pub session: SessionConfig,
    /// Protocol version window accepted by the dispatcher.
    pub min_protocol_version: u16,
    pub max_protocol_version: u16,
    /// How long a party invite stays valid.
    pub invite_timeout: Duration,
    /// Bearer token lifetime.
    pub token_ttl: Duration,
    /// Matchmaking rule for the queue.
    pub match_rule: MatchRule,
    /// Endpoint handed to clients in `MatchFoundNotify`.
    pub dungeon_endpoint: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            min_protocol_version: dungeonhub_protocol::MIN_PROTOCOL_VERSION,
            max_protocol_version: dungeonhub_protocol::MAX_PROTOCOL_VERSION,
            invite_timeout: Duration::from_secs(300),
            token_ttl: Duration::from_secs(300),
            match_rule: MatchRule::default(),
            dungeon_endpoint: "dungeon.local:7777".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_window() {
        let config = ServerConfig::default();
        assert_eq!(config.min_protocol_version, 1);
        assert_eq!(config.max_protocol_version, 3);
        assert_eq!(config.invite_timeout, Duration::from_secs(300));
        assert_eq!(config.session.send_queue_limit_bytes, 262_144);
    }
}
