//! Server Module
//!
//! The control loop that owns the listening socket and the client table.
//! Each iteration first fills idle capacity, then polls every active client
//! once and dispatches what it finds.
//!
//! ## Control Loop
//!
//! ```text
//!   ┌─────────────────────────────────────────────────────────┐
//!   │ running?  ── no ──> close every client, return          │
//!   │    │ yes                                                │
//!   │    ▼                                                    │
//!   │ active == 0 ?                                           │
//!   │    ├── yes ──> blocking accept (listener + waker)       │
//!   │    └── no  ──> opportunistic accept, up to N - active   │
//!   │    │                                                    │
//!   │    ▼                                                    │
//!   │ aggregate poll over all slots                           │
//!   │    │ ready                                              │
//!   │    ▼                                                    │
//!   │ dispatch each active slot:                              │
//!   │   error > hangup > invalid > writable > readable        │
//!   └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on the calling thread. The only waits are the poll calls
//! and the blocking accept, and the latter is entered only when no client is
//! connected. [`StopHandle::request_stop`] is the one operation meant to be
//! called from elsewhere; it wakes a blocking accept.

pub mod acceptor;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handler;

pub use acceptor::{AcceptStrategy, Admission};
pub use config::ServerConfig;
pub use dispatch::Dispatch;
pub use error::ServerError;
pub use handler::{Connection, Direction, Handler};

use crate::client::{ClientTable, CloseReason, ConnectionStats};
use crate::sys::poll::{self, WakeReceiver, Waker};
use crate::sys::PollOutcome;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Thread-safe handle that stops a running [`Server`].
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    waker: Waker,
}

impl StopHandle {
    /// Clears the running flag and wakes the loop if it is blocked in accept.
    ///
    /// The loop finishes its current iteration, then closes every client.
    pub fn request_stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Stop requested");
        }
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake the server loop");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// What one control-loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iteration {
    /// The admission strategy chosen for this iteration
    pub strategy: AcceptStrategy,
    /// Connections admitted
    pub accepted: usize,
    /// Active records examined by the dispatcher
    pub dispatched: usize,
}

/// The TCP connection server.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    table: ClientTable,
    read_handler: Option<Handler>,
    write_handler: Option<Handler>,
    stop: StopHandle,
    wake_rx: WakeReceiver,
}

impl Server {
    /// Binds the listening socket.
    ///
    /// Failing here is fatal for the process; see [`ServerError::is_fatal`].
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.bind_address();
        let bind_err = |source: std::io::Error| ServerError::Bind {
            addr: addr.clone(),
            source,
        };

        let listener = TcpListener::bind(&addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        let (waker, wake_rx) = poll::waker().map_err(bind_err)?;

        info!(address = %local_addr, capacity = config.capacity, "Listening");

        Ok(Self {
            table: ClientTable::new(config.capacity),
            config,
            listener,
            local_addr,
            read_handler: None,
            write_handler: None,
            stop: StopHandle {
                running: Arc::new(AtomicBool::new(true)),
                waker,
            },
            wake_rx,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The address actually bound, useful when the port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn table(&self) -> &ClientTable {
        &self.table
    }

    pub fn active_count(&self) -> usize {
        self.table.active_count()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.table.stats()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_running()
    }

    /// Sets the read handler, replacing any previous one.
    pub fn register_read_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Connection<'_>) + 'static,
    {
        self.read_handler = Some(Box::new(handler));
    }

    /// Sets the write handler, replacing any previous one.
    pub fn register_write_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&mut Connection<'_>) + 'static,
    {
        self.write_handler = Some(Box::new(handler));
    }

    /// Runs until a stop is requested, then closes every client.
    pub fn run(&mut self) {
        info!("Server loop started");

        while self.is_running() {
            self.run_once();
        }

        self.shutdown();
        info!("Server loop stopped");
    }

    /// Runs a single control-loop iteration.
    pub fn run_once(&mut self) -> Iteration {
        let strategy = AcceptStrategy::for_load(self.table.active_count());
        let mut iteration = Iteration {
            strategy,
            accepted: 0,
            dispatched: 0,
        };

        match strategy {
            AcceptStrategy::Blocking => {
                debug!("accept blocking");
                match self.accept_blocking() {
                    Ok(_) => iteration.accepted = 1,
                    Err(ServerError::Stopped) => return iteration,
                    Err(e) => warn!(error = %e, "Blocking accept failed"),
                }
            }
            AcceptStrategy::Opportunistic => {
                for _ in 0..self.table.free_capacity() {
                    match self.accept_nonblocking() {
                        Admission::Admitted(_) => iteration.accepted += 1,
                        _ => break,
                    }
                }
            }
        }

        debug!(active = self.table.active_count(), "active clients");

        if self.table.active_count() == 0 {
            return iteration;
        }

        match self.poll_all_clients() {
            PollOutcome::Ready(_) => iteration.dispatched = self.handle_all_clients(),
            PollOutcome::Timeout => debug!("Client poll timed out"),
            PollOutcome::Fault(e) => warn!(error = %e, "Client poll failed"),
        }

        iteration
    }

    /// Closes every active client. Returns how many were closed.
    pub fn shutdown(&mut self) -> usize {
        let closed = self.table.close_all(CloseReason::ServerStopping);
        if closed > 0 {
            info!(closed, "Closed remaining clients");
        }
        closed
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}
