//! Connection Acceptor
//!
//! Two admission strategies, picked by the control loop from the current load:
//!
//! - **Opportunistic**: poll only the listening socket with the short accept
//!   timeout and admit one connection if it is readable. The loop repeats
//!   this up to `capacity - active` times and stops at the first attempt that
//!   admits nothing, so an empty backlog never stalls dispatch.
//! - **Blocking**: used only when no client is connected. The loop waits with
//!   no timeout until a connection arrives or a stop is requested.
//!
//! Capacity is checked before `accept(2)` is called. On a full table the
//! connection stays in the kernel backlog and is picked up once a slot frees.

use crate::server::{Server, ServerError};
use crate::sys::poll::{self, Readiness};
use crate::sys::PollOutcome;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::fd::AsRawFd;
use tracing::{debug, info, warn};

/// How the control loop admits connections in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptStrategy {
    /// Short polls on the listener while clients are being served
    Opportunistic,
    /// A wait with no timeout while the table is empty
    Blocking,
}

impl AcceptStrategy {
    /// Picks the strategy for a table with `active` connected clients.
    pub fn for_load(active: usize) -> Self {
        if active == 0 {
            AcceptStrategy::Blocking
        } else {
            AcceptStrategy::Opportunistic
        }
    }
}

/// Result of one opportunistic accept attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A connection was admitted into this slot
    Admitted(usize),
    /// Nothing was pending
    Idle,
    /// The table is full; pending connections stay queued
    Deferred,
    /// The poll or the accept failed
    Failed,
}

impl Server {
    /// Polls the listening socket once and admits at most one connection.
    pub fn accept_nonblocking(&mut self) -> Admission {
        if self.table.is_full() {
            return Admission::Deferred;
        }

        let mut fds = [poll::entry(self.listener.as_raw_fd(), Readiness::READABLE)];
        let outcome = PollOutcome::from(poll::poll(&mut fds, Some(self.config.accept_timeout)));

        match outcome {
            PollOutcome::Fault(e) => {
                warn!(error = %e, "Accept poll failed");
                self.table.stats_mut().poll_faults += 1;
                Admission::Failed
            }
            PollOutcome::Timeout => {
                debug!("Accept poll timed out");
                self.table.stats_mut().poll_timeouts += 1;
                Admission::Idle
            }
            PollOutcome::Ready(_) => {
                let revents = poll::revents(&fds[0]);
                if !revents.is_readable() {
                    warn!(revents = ?revents, "Listener ready without a pending connection");
                    return Admission::Idle;
                }

                match self.accept_one() {
                    Ok(slot) => Admission::Admitted(slot),
                    Err(ServerError::TableFull { .. }) => Admission::Deferred,
                    Err(ServerError::Accept(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                        Admission::Idle
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        Admission::Failed
                    }
                }
            }
        }
    }

    /// Waits without a timeout until a connection can be admitted.
    ///
    /// Fails with [`ServerError::TableFull`] before touching the listener if
    /// every slot is taken, and with [`ServerError::Stopped`] when woken by a
    /// stop request.
    pub fn accept_blocking(&mut self) -> Result<usize, ServerError> {
        if self.table.is_full() {
            self.table.stats_mut().rejected_table_full += 1;
            warn!(capacity = self.table.capacity(), "client table full");
            return Err(ServerError::TableFull {
                capacity: self.table.capacity(),
            });
        }

        loop {
            if !self.is_running() {
                self.wake_rx.drain();
                return Err(ServerError::Stopped);
            }

            let mut fds = [
                poll::entry(self.listener.as_raw_fd(), Readiness::READABLE),
                poll::entry(self.wake_rx.as_raw_fd(), Readiness::READABLE),
            ];

            if let Err(e) = poll::poll(&mut fds, None) {
                self.table.stats_mut().poll_faults += 1;
                return Err(ServerError::Poll(e));
            }

            if !poll::revents(&fds[1]).is_empty() {
                self.wake_rx.drain();
                continue;
            }

            let revents = poll::revents(&fds[0]);
            if revents.is_readable() {
                match self.accept_one() {
                    // Another process sharing the socket may have taken it.
                    Err(ServerError::Accept(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                        continue
                    }
                    result => return result,
                }
            }

            if !revents.is_empty() {
                warn!(revents = ?revents, "Listener ready without a pending connection");
                return Err(ServerError::Poll(io::Error::other(
                    "listening socket reported an error condition",
                )));
            }
        }
    }

    /// Accepts one pending connection and admits it.
    fn accept_one(&mut self) -> Result<usize, ServerError> {
        if self.table.is_full() {
            self.table.stats_mut().rejected_table_full += 1;
            return Err(ServerError::TableFull {
                capacity: self.table.capacity(),
            });
        }

        match self.listener.accept() {
            Ok((stream, addr)) => self.admit(stream, addr),
            Err(e) => {
                if e.kind() != io::ErrorKind::WouldBlock {
                    self.table.stats_mut().accept_failures += 1;
                }
                Err(ServerError::Accept(e))
            }
        }
    }

    /// Binds an accepted connection to the lowest free slot.
    ///
    /// The stream is switched to non-blocking mode so handlers never stall
    /// the loop. On a full table the stream is dropped, which closes it, and
    /// the table is left untouched.
    pub fn admit(&mut self, stream: TcpStream, addr: SocketAddr) -> Result<usize, ServerError> {
        let Some(slot) = self.table.find_free_slot() else {
            self.table.stats_mut().rejected_table_full += 1;
            warn!(client = %addr, capacity = self.table.capacity(), "client table full");
            return Err(ServerError::TableFull {
                capacity: self.table.capacity(),
            });
        };

        stream
            .set_nonblocking(true)
            .map_err(|source| ServerError::Io { addr, source })?;
        self.table.activate(slot, stream, addr)?;

        info!(
            client = %addr,
            slot,
            active = self.table.active_count(),
            "Client connected"
        );
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use std::net::TcpListener;
    use std::time::Duration;

    fn test_server(capacity: usize) -> Server {
        let config = ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_capacity(capacity)
            .with_accept_timeout(Duration::from_millis(20));
        Server::bind(config).unwrap()
    }

    /// Connections accepted by a side listener, ready to be admitted by hand.
    fn accepted(count: usize) -> (Vec<(TcpStream, SocketAddr)>, Vec<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let clients: Vec<_> = (0..count).map(|_| TcpStream::connect(addr).unwrap()).collect();
        let streams = (0..count).map(|_| listener.accept().unwrap()).collect();
        (streams, clients)
    }

    #[test]
    fn test_strategy_for_load() {
        assert_eq!(AcceptStrategy::for_load(0), AcceptStrategy::Blocking);
        assert_eq!(AcceptStrategy::for_load(1), AcceptStrategy::Opportunistic);
    }

    #[test]
    fn test_nonblocking_accept_on_empty_backlog() {
        let mut server = test_server(4);

        assert_eq!(server.accept_nonblocking(), Admission::Idle);
        assert_eq!(server.active_count(), 0);
        assert_eq!(server.stats().poll_timeouts, 1);
    }

    #[test]
    fn test_nonblocking_accept_admits_pending() {
        let mut server = test_server(4);
        let _client = TcpStream::connect(server.local_addr()).unwrap();

        let mut admission = Admission::Idle;
        for _ in 0..10 {
            admission = server.accept_nonblocking();
            if admission != Admission::Idle {
                break;
            }
        }

        assert_eq!(admission, Admission::Admitted(0));
        assert_eq!(server.active_count(), 1);
    }

    #[test]
    fn test_admit_rejects_when_full() {
        let mut server = test_server(4);
        let (streams, _clients) = accepted(5);
        let mut streams = streams.into_iter();

        for expected in 0..4 {
            let (stream, addr) = streams.next().unwrap();
            assert_eq!(server.admit(stream, addr).unwrap(), expected);
        }
        let before: Vec<_> = server.table().iter_active().map(|r| r.raw_fd()).collect();

        let (stream, addr) = streams.next().unwrap();
        let err = server.admit(stream, addr).unwrap_err();

        assert!(matches!(err, ServerError::TableFull { capacity: 4 }));
        assert_eq!(server.active_count(), 4);
        let after: Vec<_> = server.table().iter_active().map(|r| r.raw_fd()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_blocking_accept_on_full_table_fails_gracefully() {
        let mut server = test_server(4);
        let (streams, _clients) = accepted(4);
        for (stream, addr) in streams {
            server.admit(stream, addr).unwrap();
        }

        let _fifth = TcpStream::connect(server.local_addr()).unwrap();

        let err = server.accept_blocking().unwrap_err();
        assert!(matches!(err, ServerError::TableFull { capacity: 4 }));
        assert_eq!(server.accept_nonblocking(), Admission::Deferred);

        let iteration = server.run_once();
        assert_eq!(iteration.accepted, 0);
        assert_eq!(server.active_count(), 4);
        assert!(server.stats().rejected_table_full >= 1);
    }

    #[test]
    fn test_deferred_connection_admitted_after_slot_frees() {
        let mut server = test_server(1);
        let (streams, _clients) = accepted(1);
        for (stream, addr) in streams {
            server.admit(stream, addr).unwrap();
        }

        let _waiting = TcpStream::connect(server.local_addr()).unwrap();
        server.table.deactivate(0, crate::client::CloseReason::Shutdown);

        assert_eq!(server.accept_blocking().unwrap(), 0);
        assert_eq!(server.active_count(), 1);
    }

    #[test]
    fn test_admitted_stream_is_nonblocking() {
        let mut server = test_server(1);
        let (mut streams, _clients) = accepted(1);
        let (stream, addr) = streams.remove(0);
        server.admit(stream, addr).unwrap();

        let mut buf = [0u8; 8];
        let record = server.table.get_mut(0).unwrap();
        let err = record.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(record.bytes_read(), 0);
    }
}
