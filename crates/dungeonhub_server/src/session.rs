//! Per-connection session state.
//!
//! A session owns everything the server tracks for one live connection:
//! the byte-based rate limiter, the bounded outbound queue, the liveness
//! clocks, the authenticated user context, and the resume sequence used by
//! reconnect. All time-dependent behavior takes `now` as an argument.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;

/// Monotonic session identifier assigned by the server at creation.
pub type SessionId = u64;

/// What a session does when an enqueue would push the outbound queue past
/// its byte cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Refuse the new payload and keep the queue as is.
    DropNewest,
    /// Evict from the front until the new payload fits, then append it.
    DropOldest,
    /// Disconnect the session outright.
    Disconnect,
}

/// Authenticated identity bound to a session after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub token: String,
}

/// Byte-based rate limiter with continuous refill.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: now,
        }
    }

    /// Refills for the elapsed time, then takes `amount` tokens if enough
    /// are available. A failed consume deducts nothing.
    pub fn consume(&mut self, amount: f64, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= amount {
            self.tokens -= amount;
            true
        } else {
            false
        }
    }

    /// Tokens currently available without refilling.
    pub fn available(&self) -> f64 {
        self.tokens
    }
}

/// One live connection's server-side state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    trace_id: String,
    config: SessionConfig,
    bucket: TokenBucket,
    connected: bool,
    last_activity: Instant,
    last_receive: Instant,
    last_heartbeat: Instant,
    send_queue: VecDeque<Vec<u8>>,
    queued_bytes: usize,
    user_context: Option<UserContext>,
    protocol_version: u16,
    last_seq: u64,
}

impl Session {
    pub fn new(id: SessionId, config: SessionConfig, now: Instant) -> Self {
        let bucket = TokenBucket::new(
            config.rate_limit_capacity,
            config.rate_limit_refill_per_sec,
            now,
        );
        Self {
            id,
            trace_id: Uuid::new_v4().simple().to_string(),
            config,
            bucket,
            connected: true,
            last_activity: now,
            last_receive: now,
            last_heartbeat: now,
            send_queue: VecDeque::new(),
            queued_bytes: 0,
            user_context: None,
            protocol_version: 0,
            last_seq: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// 32-hex-char trace identifier minted at session creation.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Touches the liveness clocks for an inbound packet.
    pub fn on_receive(&mut self, now: Instant) {
        self.last_receive = now;
        self.last_activity = now;
    }

    /// Queues a payload for the transport writer.
    ///
    /// The payload first pays its size into the rate bucket; a rate-limited
    /// payload is refused before the queue cap is even considered. On cap
    /// overflow the configured [`OverflowPolicy`] decides the outcome.
    pub fn enqueue_send(&mut self, payload: Vec<u8>, now: Instant) -> bool {
        if !self.connected {
            return false;
        }

        if !self.bucket.consume(payload.len() as f64, now) {
            warn!(
                event = "session_rate_limited",
                session_id = self.id,
                session_trace_id = %self.trace_id,
                bytes = payload.len(),
                "session rate limited"
            );
            return false;
        }

        let mut next_bytes = self.queued_bytes + payload.len();
        if next_bytes > self.config.send_queue_limit_bytes {
            match self.config.overflow_policy {
                OverflowPolicy::Disconnect => {
                    self.disconnect("send queue overflow");
                    return false;
                }
                OverflowPolicy::DropOldest => {
                    while let Some(front) = self.send_queue.front() {
                        if next_bytes <= self.config.send_queue_limit_bytes {
                            break;
                        }
                        next_bytes -= front.len();
                        self.queued_bytes -= front.len();
                        self.send_queue.pop_front();
                    }
                }
                OverflowPolicy::DropNewest => {
                    warn!(
                        event = "session_queue_overflow",
                        session_id = self.id,
                        session_trace_id = %self.trace_id,
                        bytes = payload.len(),
                        "session send queue overflow"
                    );
                    return false;
                }
            }
        }

        self.queued_bytes = next_bytes;
        self.send_queue.push_back(payload);
        self.last_activity = now;
        true
    }

    /// FIFO removal used by the transport writer.
    pub fn dequeue_send(&mut self) -> Option<Vec<u8>> {
        let payload = self.send_queue.pop_front()?;
        self.queued_bytes -= payload.len();
        Some(payload)
    }

    /// Total bytes currently queued.
    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn should_send_heartbeat(&self, now: Instant) -> bool {
        self.connected
            && now.saturating_duration_since(self.last_heartbeat) >= self.config.heartbeat_interval
    }

    pub fn mark_heartbeat_sent(&mut self, now: Instant) {
        self.last_heartbeat = now;
    }

    /// Evaluates the receive-idle timeout. Returns whether the session is
    /// still connected afterwards.
    ///
    /// The predicate looks at `last_receive` only; outbound traffic does
    /// not keep a session alive.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.connected {
            return false;
        }
        if now.saturating_duration_since(self.last_receive) >= self.config.timeout {
            self.disconnect("timeout");
        }
        self.connected
    }

    pub fn attach_user_context(&mut self, context: UserContext) {
        self.user_context = Some(context);
    }

    pub fn clear_user_context(&mut self) {
        self.user_context = None;
    }

    pub fn user_context(&self) -> Option<&UserContext> {
        self.user_context.as_ref()
    }

    pub fn set_protocol_version(&mut self, version: u16) {
        self.protocol_version = version;
    }

    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    /// Sequence of the last acknowledged server-to-client packet.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn set_last_seq(&mut self, seq: u64) {
        self.last_seq = seq;
    }

    fn disconnect(&mut self, reason: &str) {
        if !self.connected {
            return;
        }
        self.connected = false;
        info!(
            event = "session_disconnected",
            session_id = self.id,
            session_trace_id = %self.trace_id,
            reason,
            "session disconnected"
        );
    }
}
