//! Connection statistics.
//!
//! The server is single-threaded, so these are plain counters rather than
//! atomics. A snapshot is handed out by value.

use crate::client::CloseReason;

/// Lifetime counters for the client table and the loop driving it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Total number of connections admitted into a slot
    pub connections_accepted: u64,
    /// Currently active connections
    pub active_connections: usize,
    /// Accept attempts refused because every slot was taken
    pub rejected_table_full: u64,
    /// `accept(2)` failures
    pub accept_failures: u64,
    /// Polls that returned without any ready entry
    pub poll_timeouts: u64,
    /// Polls that failed at the OS level
    pub poll_faults: u64,
    /// Connections closed because of an error condition
    pub closed_error: u64,
    /// Connections closed because the peer hung up
    pub closed_hangup: u64,
    /// Connections closed because the descriptor was invalid
    pub closed_invalid: u64,
    /// Connections ended on purpose by a handler or the server
    pub closed_shutdown: u64,
    /// Total bytes read
    pub bytes_read: u64,
    /// Total bytes written
    pub bytes_written: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&mut self) {
        self.connections_accepted += 1;
        self.active_connections += 1;
    }

    pub fn connection_closed(&mut self, reason: CloseReason, bytes_read: u64, bytes_written: u64) {
        self.active_connections = self.active_connections.saturating_sub(1);
        self.bytes_read += bytes_read;
        self.bytes_written += bytes_written;

        match reason {
            CloseReason::Error => self.closed_error += 1,
            CloseReason::HungUp => self.closed_hangup += 1,
            CloseReason::Invalid => self.closed_invalid += 1,
            CloseReason::Shutdown | CloseReason::ServerStopping => self.closed_shutdown += 1,
        }
    }

    /// Connections closed for any reason.
    pub fn connections_closed(&self) -> u64 {
        self.closed_error + self.closed_hangup + self.closed_invalid + self.closed_shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_accounting() {
        let mut stats = ConnectionStats::new();

        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed(CloseReason::HungUp, 10, 4);

        assert_eq!(stats.connections_accepted, 2);
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.closed_hangup, 1);
        assert_eq!(stats.connections_closed(), 1);
        assert_eq!(stats.bytes_read, 10);
        assert_eq!(stats.bytes_written, 4);
    }
}
