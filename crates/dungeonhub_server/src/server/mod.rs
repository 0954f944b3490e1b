//! The server: session ownership and the per-packet dispatcher.
//!
//! [`core`] holds the [`Server`] itself - session lifecycle, event-sink
//! wiring, periodic tick, cross-service side tables. [`dispatch`] is the
//! request/response state machine that `handle_packet` runs for every
//! inbound frame.

mod core;
mod dispatch;

pub use core::{Server, SharedSession};
