//! Dispatcher counters.

/// Read-only snapshot of the dispatcher's counters.
///
/// Updated synchronously inside `handle_packet`, so a snapshot taken after
/// a call reflects that call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Packets that entered the dispatcher, valid or not.
    pub packets_total: u64,
    /// Payload bytes that entered the dispatcher.
    pub bytes_total: u64,
    /// Rejections of any kind: bad version, malformed payload, failed
    /// domain preconditions, store failures.
    pub error_total: u64,
}
