//! I/O Multiplexer & Dispatcher
//!
//! After the aggregate poll, every active slot is examined, not only the ones
//! that reported something. Per slot the first matching rule wins:
//!
//! 1. error condition → close the client
//! 2. peer hangup → close the client
//! 3. invalid descriptor → close the client
//! 4. writable, and still active → write handler
//! 5. readable, and still active → read handler
//!
//! A direction with no registered handler is ignored.

use crate::client::CloseReason;
use crate::server::handler::{Connection, Direction};
use crate::server::Server;
use crate::sys::{PollOutcome, Readiness};
use tracing::{debug, warn};

/// What the dispatcher does with one slot's readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Tear the connection down; no handler runs
    Close(CloseReason),
    /// Notify the handlers for the ready directions, write first
    Notify { writable: bool, readable: bool },
}

impl Dispatch {
    /// Applies the priority rules to a set of readiness flags.
    pub fn classify(readiness: Readiness) -> Self {
        if readiness.is_error() {
            Dispatch::Close(CloseReason::Error)
        } else if readiness.is_hangup() {
            Dispatch::Close(CloseReason::HungUp)
        } else if readiness.is_invalid() {
            Dispatch::Close(CloseReason::Invalid)
        } else {
            Dispatch::Notify {
                writable: readiness.is_writable(),
                readable: readiness.is_readable(),
            }
        }
    }
}

impl Server {
    /// Polls every active client in one call, with the client timeout.
    pub fn poll_all_clients(&mut self) -> PollOutcome {
        let outcome = self.table.poll_all(self.config.client_timeout);
        self.record_poll(&outcome);
        outcome
    }

    /// Dispatches the latest readiness of every active slot.
    ///
    /// Returns the number of slots examined.
    pub fn handle_all_clients(&mut self) -> usize {
        let slots = self.table.active_slots();
        for &slot in &slots {
            // An earlier handler may have closed this one.
            if self.table.is_active(slot) {
                self.handle_client_events(slot);
            }
        }
        slots.len()
    }

    /// Polls one client in isolation and dispatches what it reports.
    pub fn handle_client(&mut self, slot: usize) -> PollOutcome {
        if !self.table.is_active(slot) {
            debug!(slot, "Skipping poll of inactive slot");
            return PollOutcome::Timeout;
        }

        let outcome = self.table.poll_one(slot, self.config.client_timeout);
        self.record_poll(&outcome);

        match &outcome {
            PollOutcome::Ready(_) => self.handle_client_events(slot),
            PollOutcome::Timeout => debug!(slot, "Client poll timed out"),
            PollOutcome::Fault(e) => warn!(slot, error = %e, "Client poll failed"),
        }

        outcome
    }

    /// Applies the priority rules to the last readiness seen for `slot`.
    pub fn handle_client_events(&mut self, slot: usize) {
        match Dispatch::classify(self.table.revents(slot)) {
            Dispatch::Close(reason) => {
                self.table.deactivate(slot, reason);
            }
            Dispatch::Notify { writable, readable } => {
                if writable && self.table.is_active(slot) {
                    self.notify(Direction::Write, slot);
                }
                if readable && self.table.is_active(slot) {
                    self.notify(Direction::Read, slot);
                }
            }
        }
    }

    fn notify(&mut self, direction: Direction, slot: usize) {
        let handler = match direction {
            Direction::Read => &mut self.read_handler,
            Direction::Write => &mut self.write_handler,
        };

        if let Some(handler) = handler.as_mut() {
            let mut conn = Connection::new(
                &mut self.table,
                slot,
                &self.stop,
                self.config.client_timeout,
            );
            handler(&mut conn);
        }
    }

    fn record_poll(&mut self, outcome: &PollOutcome) {
        match outcome {
            PollOutcome::Ready(_) => {}
            PollOutcome::Timeout => self.table.stats_mut().poll_timeouts += 1,
            PollOutcome::Fault(_) => self.table.stats_mut().poll_faults += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerConfig;
    use std::cell::RefCell;
    use std::io::Write;
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::rc::Rc;
    use std::time::Duration;

    /// Records every handler invocation as `(direction, slot)`.
    type Calls = Rc<RefCell<Vec<(Direction, usize)>>>;

    fn test_server(capacity: usize) -> (Server, Calls) {
        let config = ServerConfig::default()
            .with_host("127.0.0.1")
            .with_port(0)
            .with_capacity(capacity)
            .with_client_timeout(Duration::from_millis(50));
        let mut server = Server::bind(config).unwrap();
        let calls: Calls = Rc::default();

        let log = Rc::clone(&calls);
        server.register_read_handler(move |conn: &mut Connection<'_>| {
            log.borrow_mut().push((Direction::Read, conn.slot()));
        });
        let log = Rc::clone(&calls);
        server.register_write_handler(move |conn: &mut Connection<'_>| {
            log.borrow_mut().push((Direction::Write, conn.slot()));
        });

        (server, calls)
    }

    fn connect(server: &mut Server, listener: &TcpListener) -> (usize, TcpStream) {
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, addr): (TcpStream, SocketAddr) = listener.accept().unwrap();
        let slot = server.admit(stream, addr).unwrap();
        (slot, client)
    }

    #[test]
    fn test_classify_priority() {
        let all = Readiness::ERROR | Readiness::HANGUP | Readiness::READABLE;
        assert_eq!(Dispatch::classify(all), Dispatch::Close(CloseReason::Error));

        let hup = Readiness::HANGUP | Readiness::INVALID | Readiness::WRITABLE;
        assert_eq!(Dispatch::classify(hup), Dispatch::Close(CloseReason::HungUp));

        assert_eq!(
            Dispatch::classify(Readiness::INVALID | Readiness::READABLE),
            Dispatch::Close(CloseReason::Invalid)
        );
        assert_eq!(
            Dispatch::classify(Readiness::READABLE | Readiness::WRITABLE),
            Dispatch::Notify {
                writable: true,
                readable: true
            }
        );
        assert_eq!(
            Dispatch::classify(Readiness::EMPTY),
            Dispatch::Notify {
                writable: false,
                readable: false
            }
        );
    }

    #[test]
    fn test_error_wins_over_hangup_and_read() {
        let (mut server, calls) = test_server(4);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (slot, _client) = connect(&mut server, &listener);

        server.table.set_revents(
            slot,
            Readiness::ERROR | Readiness::HANGUP | Readiness::READABLE,
        );
        server.handle_all_clients();

        assert!(calls.borrow().is_empty());
        assert!(!server.table().is_active(slot));
        let stats = server.stats();
        assert_eq!(stats.closed_error, 1);
        assert_eq!(stats.closed_hangup, 0);
    }

    #[test]
    fn test_hangup_deactivates_without_handlers() {
        let (mut server, calls) = test_server(4);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (first, _a) = connect(&mut server, &listener);
        let (second, _b) = connect(&mut server, &listener);
        assert_eq!(server.active_count(), 2);

        server.table.set_revents(first, Readiness::HANGUP);
        server.table.set_revents(second, Readiness::EMPTY);
        let examined = server.handle_all_clients();

        assert_eq!(examined, 2);
        assert_eq!(server.active_count(), 1);
        assert!(!server.table().is_active(first));
        assert!(server.table().is_active(second));
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_write_handler_runs_before_read_handler() {
        let (mut server, calls) = test_server(4);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (slot, _client) = connect(&mut server, &listener);

        server
            .table
            .set_revents(slot, Readiness::READABLE | Readiness::WRITABLE);
        server.handle_client_events(slot);

        assert_eq!(
            *calls.borrow(),
            vec![(Direction::Write, slot), (Direction::Read, slot)]
        );
    }

    #[test]
    fn test_read_skipped_after_write_handler_closes() {
        let config = ServerConfig::default().with_host("127.0.0.1").with_port(0);
        let mut server = Server::bind(config).unwrap();
        let reads = Rc::new(RefCell::new(0));

        server.register_write_handler(|conn: &mut Connection<'_>| {
            conn.shutdown();
        });
        let counter = Rc::clone(&reads);
        server.register_read_handler(move |_: &mut Connection<'_>| {
            *counter.borrow_mut() += 1;
        });

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (slot, _client) = connect(&mut server, &listener);
        server
            .table
            .set_revents(slot, Readiness::READABLE | Readiness::WRITABLE);
        server.handle_client_events(slot);

        assert_eq!(*reads.borrow(), 0);
        assert_eq!(server.active_count(), 0);
        assert_eq!(server.stats().closed_shutdown, 1);
    }

    #[test]
    fn test_last_registration_wins() {
        let (mut server, calls) = test_server(2);
        let replaced = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&replaced);
        server.register_read_handler(move |_: &mut Connection<'_>| {
            *counter.borrow_mut() += 1;
        });

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (slot, _client) = connect(&mut server, &listener);
        server.table.set_revents(slot, Readiness::READABLE);
        server.handle_client_events(slot);

        assert_eq!(*replaced.borrow(), 1);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_handler_is_ignored() {
        let config = ServerConfig::default().with_host("127.0.0.1").with_port(0);
        let mut server = Server::bind(config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (slot, _client) = connect(&mut server, &listener);

        server
            .table
            .set_revents(slot, Readiness::READABLE | Readiness::WRITABLE);
        server.handle_client_events(slot);

        assert!(server.table().is_active(slot));
    }

    #[test]
    fn test_per_client_poll_dispatches_read() {
        let (mut server, calls) = test_server(2);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (slot, mut client) = connect(&mut server, &listener);
        client.write_all(b"hello").unwrap();

        for _ in 0..20 {
            server.handle_client(slot);
            if calls.borrow().contains(&(Direction::Read, slot)) {
                break;
            }
        }

        assert!(calls.borrow().contains(&(Direction::Read, slot)));
        assert!(calls.borrow().contains(&(Direction::Write, slot)));
    }

    #[test]
    fn test_aggregate_poll_reaches_every_active_slot() {
        let (mut server, calls) = test_server(3);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (first, _a) = connect(&mut server, &listener);
        let (second, _b) = connect(&mut server, &listener);

        assert!(server.poll_all_clients().is_ready());
        assert_eq!(server.handle_all_clients(), 2);

        let calls = calls.borrow();
        assert!(calls.contains(&(Direction::Write, first)));
        assert!(calls.contains(&(Direction::Write, second)));
    }
}
