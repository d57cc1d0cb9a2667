//! Client Record
//!
//! One slot of the client table. A record is either `Inactive` (no socket,
//! zeroed counters, free for reuse) or `Active` (owns exactly one open
//! socket). The socket is released in one place, [`ClientRecord::release`],
//! whatever the reason for closing.
//!
//! ## Lifecycle
//!
//! ```text
//!               bind (admission)
//!   ┌──────────┐ ─────────────────> ┌──────────┐
//!   │ Inactive │                    │  Active  │
//!   └──────────┘ <───────────────── └──────────┘
//!        release (error / hangup / invalid / shutdown)
//! ```

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use tracing::trace;

/// State of a client slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientStatus {
    #[default]
    Inactive,
    Active,
}

/// Why a record went back to `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// The poll set reported an error condition on the socket
    Error,
    /// The peer hung up
    HungUp,
    /// The descriptor was not valid for polling
    Invalid,
    /// A handler or the server ended the session on purpose
    Shutdown,
    /// The server is stopping and closes every remaining client
    ServerStopping,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Error => "client error",
            CloseReason::HungUp => "client closed",
            CloseReason::Invalid => "client invalid",
            CloseReason::Shutdown => "client shutdown",
            CloseReason::ServerStopping => "server stopping",
        };
        f.write_str(s)
    }
}

/// Per-connection state.
#[derive(Debug, Default)]
pub struct ClientRecord {
    /// Index of this record and of its entry in the poll set
    slot: usize,

    /// The connection, present only while `Active`
    stream: Option<TcpStream>,

    /// Peer address captured at accept time
    addr: Option<SocketAddr>,

    status: ClientStatus,

    bytes_read: u64,

    bytes_written: u64,
}

impl ClientRecord {
    /// Creates an inactive record for `slot`.
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            ..Self::default()
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn status(&self) -> ClientStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// The OS handle of the connection, if active.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Reads from the connection into `buf`.
    ///
    /// `bytes_read` grows only on a strictly positive count. `Ok(0)` (the
    /// peer closed its write side) and errors are returned unchanged. No
    /// retry is attempted on a partial read.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let n = stream.read(buf)?;

        if n > 0 {
            self.bytes_read += n as u64;
            trace!(slot = self.slot, bytes = n, "Read data");
        }

        Ok(n)
    }

    /// Writes `buf` to the connection.
    ///
    /// Same contract as [`ClientRecord::read`]: partial writes are returned
    /// as-is and looping is up to the caller.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        let n = stream.write(buf)?;

        if n > 0 {
            self.bytes_written += n as u64;
            trace!(slot = self.slot, bytes = n, "Wrote data");
        }

        Ok(n)
    }

    /// Takes ownership of an accepted connection and marks the record active.
    pub(crate) fn bind(&mut self, stream: TcpStream, addr: SocketAddr) {
        self.stream = Some(stream);
        self.addr = Some(addr);
        self.status = ClientStatus::Active;
        self.bytes_read = 0;
        self.bytes_written = 0;
    }

    /// Shuts the connection down in both directions, closes it and resets
    /// the record to its zero value.
    ///
    /// Returns the final `(bytes_read, bytes_written)` of the session.
    pub(crate) fn release(&mut self) -> (u64, u64) {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone; the close below still happens.
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                trace!(slot = self.slot, error = %e, "Shutdown before close failed");
            }
            drop(stream);
        }

        let totals = (self.bytes_read, self.bytes_written);
        *self = Self::new(self.slot);
        totals
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "client slot is inactive")
}
