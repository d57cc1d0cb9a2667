//! # Plexor - A Minimal Poll-Driven TCP Connection Server
//!
//! Plexor listens on one port, admits connections into a fixed number of
//! slots, and multiplexes readiness events for all of them through a single
//! `poll(2)` call per iteration, on a single thread. What to do with the bytes
//! is left to registered read and write handlers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               Server                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐ │
//! │  │  Listener   │───>│  Acceptor   │───>│       ClientTable        │ │
//! │  │ (TcpListener│    │ blocking /  │    │ records[N] + pollfds[N]  │ │
//! │  │  + waker)   │    │opportunistic│    │ free slots, active count │ │
//! │  └─────────────┘    └─────────────┘    └────────────┬─────────────┘ │
//! │                                                     │ poll(2)       │
//! │                                                     ▼               │
//! │                     ┌───────────────────────────────────────────┐   │
//! │                     │                Dispatcher                 │   │
//! │                     │ error > hangup > invalid > write > read   │   │
//! │                     └──────────────┬──────────────┬─────────────┘   │
//! │                                    │              │                 │
//! │                        close slot  ▼              ▼  handlers       │
//! │                              ┌──────────┐   ┌──────────────────┐    │
//! │                              │ teardown │   │ read / write fn  │    │
//! │                              └──────────┘   └──────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use plexor::server::{Connection, Server, ServerConfig};
//!
//! let mut server = Server::bind(ServerConfig::default()).unwrap();
//!
//! server.register_read_handler(|conn: &mut Connection<'_>| {
//!     let mut buf = [0u8; 1024];
//!     match conn.read(&mut buf) {
//!         Ok(0) => {
//!             conn.shutdown();
//!         }
//!         Ok(n) => {
//!             let _ = conn.write(&buf[..n]);
//!         }
//!         Err(_) => {}
//!     }
//! });
//!
//! // Blocks until a StopHandle asks it to stop.
//! server.run();
//! ```
//!
//! ## Module Overview
//!
//! - [`sys`]: `poll(2)` wrapper, readiness flags and the stop waker
//! - [`client`]: Client records and the fixed-capacity client table
//! - [`server`]: Acceptor, dispatcher, handler registration and control loop
//! - [`handlers`]: Handlers used by the `plexor` binary
//!
//! ## Design Highlights
//!
//! ### One Owner
//!
//! The [`server::Server`] owns the listener and the table and is passed
//! explicitly; there is no global state. Handlers get a borrowed
//! [`server::Connection`] for the duration of one callback.
//!
//! ### One Teardown Path
//!
//! Every way a connection can end (error, hangup, invalid handle, handler
//! decision, server stop) goes through [`client::ClientTable::deactivate`],
//! which shuts the socket down and closes it.
//!
//! ### Full Table Is An Answer
//!
//! When every slot is taken, admission fails with
//! [`server::ServerError::TableFull`] and the pending connection waits in the
//! kernel backlog.

pub mod client;
pub mod handlers;
pub mod server;
pub mod sys;

// Re-export commonly used types for convenience
pub use client::{ClientRecord, ClientStatus, ClientTable, CloseReason, ConnectionStats};
pub use server::{Connection, Server, ServerConfig, ServerError, StopHandle};
pub use sys::{PollOutcome, Readiness};

/// The default port Plexor listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host Plexor binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// The default number of client slots
pub const DEFAULT_CAPACITY: usize = 16;

/// Version of Plexor
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
