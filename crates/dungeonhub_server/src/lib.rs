//! # DungeonHub Server Core
//!
//! The transport-agnostic core of the DungeonHub game backend. The I/O
//! layer hands decoded frames to [`server::Server::handle_packet`] one at a
//! time; everything else - authentication, party formation, matchmaking,
//! dungeon instance lifecycle, and transactional reward grants - happens
//! synchronously inside that call against an injected `Instant`.
//!
//! ## Components
//!
//! * [`session`] - per-connection state: byte token bucket, bounded send
//!   queue with three overflow policies, liveness clocks, resume sequence.
//! * [`registry`] / [`auth`] - user-to-session uniqueness and opaque bearer
//!   tokens with TTL.
//! * [`party`], [`guild`], [`chat`] - membership services with synchronous
//!   event sinks; the server wires the sinks to per-session frame enqueue.
//! * [`matchmaking`] - MMR-windowed pair finder with wait-time expansion.
//! * [`instance`] - the dungeon instance state machine.
//! * [`reward`] - idempotent multi-item grants with reverse rollback, plus
//!   drop tables.
//! * [`inventory`] - the transactional item store behind a trait, with
//!   in-memory, persistent and cached implementations.
//! * [`server`] - the dispatcher that composes all of the above per packet.
//!
//! ## Concurrency model
//!
//! Packet handling is serialized: the transport must funnel frames through
//! one dispatcher (or hold a server-wide lock across `handle_packet`).
//! Sessions are shared with the I/O layer through `Arc<Mutex<_>>`; the
//! inventory stores carry their own interior locking so each operation is
//! individually atomic. No operation blocks or sleeps; time is always an
//! argument.

pub mod auth;
pub mod chat;
pub mod config;
pub mod guild;
pub mod instance;
pub mod inventory;
pub mod matchmaking;
pub mod metrics;
pub mod party;
pub mod registry;
pub mod reward;
pub mod server;
pub mod session;

pub use config::{MatchRule, ServerConfig, SessionConfig};
pub use metrics::Metrics;
pub use server::{Server, SharedSession};
pub use session::{OverflowPolicy, Session, SessionId};
