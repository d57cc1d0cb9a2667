//! Read/write handler registration.
//!
//! A handler is any `FnMut(&mut Connection<'_>)`. It is called with a
//! short-lived [`Connection`] view into the server: the record that became
//! ready, the table-level teardown for that slot, and the stop handle.
//! Handlers may end the session; the dispatcher re-checks the slot before
//! every further callback.

use crate::client::{ClientRecord, ClientTable, CloseReason};
use crate::server::StopHandle;
use crate::sys::PollOutcome;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// A registered read or write callback.
pub type Handler = Box<dyn FnMut(&mut Connection<'_>)>;

/// Which readiness direction a handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// The client a handler was invoked for.
pub struct Connection<'a> {
    table: &'a mut ClientTable,
    slot: usize,
    stop: &'a StopHandle,
    poll_timeout: Duration,
}

impl<'a> Connection<'a> {
    pub(crate) fn new(
        table: &'a mut ClientTable,
        slot: usize,
        stop: &'a StopHandle,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            table,
            slot,
            stop,
            poll_timeout,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The underlying record. Reflects teardown done by this handler.
    pub fn record(&self) -> Option<&ClientRecord> {
        self.table.get(self.slot)
    }

    pub fn is_active(&self) -> bool {
        self.table.is_active(self.slot)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.record().and_then(ClientRecord::peer_addr)
    }

    pub fn bytes_read(&self) -> u64 {
        self.record().map_or(0, ClientRecord::bytes_read)
    }

    pub fn bytes_written(&self) -> u64 {
        self.record().map_or(0, ClientRecord::bytes_written)
    }

    /// See [`ClientRecord::read`].
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.record_mut()?.read(buf)
    }

    /// See [`ClientRecord::write`].
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.record_mut()?.write(buf)
    }

    /// Polls only this client, with the client poll timeout.
    pub fn poll(&mut self) -> PollOutcome {
        self.table.poll_one(self.slot, self.poll_timeout)
    }

    /// Shuts the connection down, closes it and frees the slot.
    ///
    /// Returns `false` if the connection was already closed.
    pub fn shutdown(&mut self) -> bool {
        self.table.deactivate(self.slot, CloseReason::Shutdown)
    }

    /// Asks the control loop to stop after the current iteration.
    pub fn request_stop(&self) {
        self.stop.request_stop();
    }

    fn record_mut(&mut self) -> io::Result<&mut ClientRecord> {
        self.table
            .get_mut(self.slot)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "unknown slot"))
    }
}
