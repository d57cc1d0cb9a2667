//! Client Table
//!
//! A fixed-capacity array of [`ClientRecord`]s with a parallel array of
//! `pollfd` entries, so the whole table can be handed to `poll(2)` in one
//! call. Record `i` always owns poll entry `i`; an inactive record keeps a
//! vacant entry that the kernel skips.
//!
//! Free slots are kept in an ordered set. Allocation returns the lowest free
//! index in O(log N), which matches a front-to-back linear scan without
//! paying for one.

use crate::client::{ClientRecord, CloseReason, ConnectionStats};
use crate::server::ServerError;
use crate::sys::poll::{self, PollOutcome, Readiness};
use libc::pollfd;
use std::collections::BTreeSet;
use std::fmt;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fixed-capacity set of client slots.
pub struct ClientTable {
    records: Vec<ClientRecord>,

    /// Poll entries, indexed like `records`
    pollfds: Vec<pollfd>,

    /// Indices of inactive records
    free: BTreeSet<usize>,

    /// Number of active records
    active: usize,

    stats: ConnectionStats,
}

impl ClientTable {
    /// Creates a table with `capacity` inactive slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: (0..capacity).map(ClientRecord::new).collect(),
            pollfds: vec![poll::vacant(); capacity],
            free: (0..capacity).collect(),
            active: 0,
            stats: ConnectionStats::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    pub fn active_count(&self) -> usize {
        self.active
    }

    /// Number of slots still available for admission.
    pub fn free_capacity(&self) -> usize {
        self.capacity() - self.active
    }

    pub fn is_full(&self) -> bool {
        self.active == self.capacity()
    }

    /// Returns the lowest inactive slot, or `None` when the table is full.
    pub fn find_free_slot(&self) -> Option<usize> {
        self.free.first().copied()
    }

    /// Binds `stream` to an inactive `slot` and starts watching it for read
    /// and write readiness.
    pub fn activate(
        &mut self,
        slot: usize,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        if !self.free.remove(&slot) {
            return Err(ServerError::SlotUnavailable { slot });
        }

        self.pollfds[slot] = poll::entry(
            stream.as_raw_fd(),
            Readiness::READABLE | Readiness::WRITABLE,
        );
        self.records[slot].bind(stream, addr);
        self.active += 1;
        self.stats.connection_opened();

        debug!(slot, client = %addr, active = self.active, "Slot activated");
        Ok(())
    }

    /// Closes the connection in `slot` and returns the slot to the free set.
    ///
    /// This is the only path that releases a client socket. Returns `false`
    /// when the slot was not active.
    pub fn deactivate(&mut self, slot: usize, reason: CloseReason) -> bool {
        match self.records.get(slot) {
            Some(record) if record.is_active() => {}
            _ => return false,
        }

        let addr = self.records[slot].peer_addr();
        let (bytes_read, bytes_written) = self.records[slot].release();
        self.pollfds[slot] = poll::vacant();
        self.free.insert(slot);
        self.active -= 1;
        self.stats
            .connection_closed(reason, bytes_read, bytes_written);

        match reason {
            CloseReason::Error | CloseReason::HungUp | CloseReason::Invalid => {
                warn!(slot, client = ?addr, bytes_read, bytes_written, "{}", reason)
            }
            CloseReason::Shutdown | CloseReason::ServerStopping => {
                info!(slot, client = ?addr, bytes_read, bytes_written, "{}", reason)
            }
        }

        true
    }

    /// Deactivates every active slot. Returns how many were closed.
    pub fn close_all(&mut self, reason: CloseReason) -> usize {
        self.active_slots()
            .into_iter()
            .filter(|&slot| self.deactivate(slot, reason))
            .count()
    }

    /// Returns the record in `slot`, active or not.
    pub fn get(&self, slot: usize) -> Option<&ClientRecord> {
        self.records.get(slot)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut ClientRecord> {
        self.records.get_mut(slot)
    }

    /// Whether `slot` currently holds a connection.
    pub fn is_active(&self, slot: usize) -> bool {
        self.records.get(slot).is_some_and(ClientRecord::is_active)
    }

    /// Iterates over the active records in slot order.
    pub fn iter_active(&self) -> impl Iterator<Item = &ClientRecord> {
        self.records.iter().filter(|r| r.is_active())
    }

    /// Snapshot of the active slot indices, in slot order.
    pub fn active_slots(&self) -> Vec<usize> {
        self.iter_active().map(ClientRecord::slot).collect()
    }

    /// Readiness reported for `slot` by the most recent poll covering it.
    pub fn revents(&self, slot: usize) -> Readiness {
        self.pollfds
            .get(slot)
            .map(poll::revents)
            .unwrap_or(Readiness::EMPTY)
    }

    /// Polls every slot in one call. Inactive slots never report events.
    pub fn poll_all(&mut self, timeout: Duration) -> PollOutcome {
        poll::poll(&mut self.pollfds, Some(timeout)).into()
    }

    /// Polls a single slot in isolation.
    pub fn poll_one(&mut self, slot: usize, timeout: Duration) -> PollOutcome {
        match self.pollfds.get_mut(slot) {
            Some(entry) => poll::poll(std::slice::from_mut(entry), Some(timeout)).into(),
            None => PollOutcome::Fault(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("slot {} out of range", slot),
            )),
        }
    }

    /// Counters including the bytes moved by still-active connections.
    pub fn stats(&self) -> ConnectionStats {
        let mut stats = self.stats;
        for record in self.iter_active() {
            stats.bytes_read += record.bytes_read();
            stats.bytes_written += record.bytes_written();
        }
        stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ConnectionStats {
        &mut self.stats
    }

    #[cfg(test)]
    pub(crate) fn set_revents(&mut self, slot: usize, readiness: Readiness) {
        self.pollfds[slot].revents = readiness.bits();
    }
}

impl fmt::Debug for ClientTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientTable")
            .field("capacity", &self.capacity())
            .field("active", &self.active)
            .field("records", &self.records)
            .finish()
    }
}
