//! Application configuration loaded from TOML.
//!
//! File-facing settings use plain integers (milliseconds/seconds) and get
//! converted into the core's typed `ServerConfig`/`SessionConfig` at
//! startup. A missing configuration file is created with defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use dungeonhub_server::session::OverflowPolicy;
use dungeonhub_server::{MatchRule, ServerConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub matchmaking: MatchSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address, e.g. "127.0.0.1:7000"
    pub bind_address: String,
    /// Accepted protocol version window
    pub min_protocol_version: u16,
    pub max_protocol_version: u16,
    /// Party invite lifetime in seconds
    pub invite_timeout_secs: u64,
    /// Bearer token lifetime in seconds
    pub token_ttl_secs: u64,
    /// Endpoint handed to clients when a match fires
    pub dungeon_endpoint: String,
    /// Cadence of the timeout/invite-expiry tick in milliseconds
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    pub heartbeat_interval_ms: u64,
    pub timeout_ms: u64,
    pub send_queue_limit_bytes: usize,
    /// One of "drop_newest", "drop_oldest", "disconnect"
    pub overflow_policy: String,
    pub rate_limit_capacity: f64,
    pub rate_limit_refill_per_sec: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSettings {
    pub max_mmr_delta: i32,
    pub expansion_per_second: i32,
    pub min_party_size: usize,
    pub max_party_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter
    pub level: String,
    /// JSON formatting
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        let match_rule = MatchRule::default();
        Self {
            server: ServerSettings {
                bind_address: "127.0.0.1:7000".to_string(),
                min_protocol_version: dungeonhub_protocol::MIN_PROTOCOL_VERSION,
                max_protocol_version: dungeonhub_protocol::MAX_PROTOCOL_VERSION,
                invite_timeout_secs: 300,
                token_ttl_secs: 300,
                dungeon_endpoint: "dungeon.local:7777".to_string(),
                tick_interval_ms: 1000,
            },
            session: SessionSettings {
                heartbeat_interval_ms: session.heartbeat_interval.as_millis() as u64,
                timeout_ms: session.timeout.as_millis() as u64,
                send_queue_limit_bytes: session.send_queue_limit_bytes,
                overflow_policy: "drop_newest".to_string(),
                rate_limit_capacity: session.rate_limit_capacity,
                rate_limit_refill_per_sec: session.rate_limit_refill_per_sec,
            },
            matchmaking: MatchSettings {
                max_mmr_delta: match_rule.max_mmr_delta,
                expansion_per_second: match_rule.expansion_per_second,
                min_party_size: match_rule.min_party_size,
                max_party_size: match_rule.max_party_size,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads the configuration file, creating it with defaults when absent.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn to_server_config(&self) -> anyhow::Result<ServerConfig> {
        Ok(ServerConfig {
            session: self.to_session_config()?,
            min_protocol_version: self.server.min_protocol_version,
            max_protocol_version: self.server.max_protocol_version,
            invite_timeout: Duration::from_secs(self.server.invite_timeout_secs),
            token_ttl: Duration::from_secs(self.server.token_ttl_secs),
            match_rule: MatchRule {
                max_mmr_delta: self.matchmaking.max_mmr_delta,
                expansion_per_second: self.matchmaking.expansion_per_second,
                min_party_size: self.matchmaking.min_party_size,
                max_party_size: self.matchmaking.max_party_size,
            },
            dungeon_endpoint: self.server.dungeon_endpoint.clone(),
        })
    }

    pub fn to_session_config(&self) -> anyhow::Result<SessionConfig> {
        let overflow_policy = match self.session.overflow_policy.as_str() {
            "drop_newest" => OverflowPolicy::DropNewest,
            "drop_oldest" => OverflowPolicy::DropOldest,
            "disconnect" => OverflowPolicy::Disconnect,
            other => anyhow::bail!("unknown overflow policy {other:?}"),
        };
        Ok(SessionConfig {
            heartbeat_interval: Duration::from_millis(self.session.heartbeat_interval_ms),
            timeout: Duration::from_millis(self.session.timeout_ms),
            send_queue_limit_bytes: self.session.send_queue_limit_bytes,
            overflow_policy,
            rate_limit_capacity: self.session.rate_limit_capacity,
            rate_limit_refill_per_sec: self.session.rate_limit_refill_per_sec,
        })
    }
}
