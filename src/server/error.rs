//! Server errors.
//!
//! Only [`ServerError::Bind`] is fatal. Everything else is a warning: the
//! control loop logs it and moves on to the next iteration.

use std::io;
use std::net::SocketAddr;

/// Errors raised by the server core.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listening socket could not be set up
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The configuration cannot produce a working server
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `poll(2)` failed
    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    /// `accept(2)` failed
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// Every slot is taken
    #[error("client table full ({capacity} slots)")]
    TableFull { capacity: usize },

    /// The slot is out of range or already active
    #[error("slot {slot} is not available")]
    SlotUnavailable { slot: usize },

    /// A stop was requested while waiting
    #[error("server is stopping")]
    Stopped,

    /// Socket setup on an accepted connection failed
    #[error("I/O error on {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl ServerError {
    /// Whether the error should terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ServerError::Bind { .. } | ServerError::InvalidConfig(_))
    }
}
