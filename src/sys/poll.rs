//! `poll(2)` Wrapper
//!
//! A `pollfd` entry with a negative descriptor is ignored by the kernel and
//! always reports empty `revents`. The client table relies on this: inactive
//! slots keep a vacant entry in the poll set instead of being removed.

use libc::{c_int, c_short, nfds_t, pollfd, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

/// Readiness flags as reported in `pollfd::revents` (or requested in `events`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Readiness(c_short);

impl Readiness {
    pub const EMPTY: Readiness = Readiness(0);
    pub const READABLE: Readiness = Readiness(POLLIN);
    pub const WRITABLE: Readiness = Readiness(POLLOUT);
    pub const ERROR: Readiness = Readiness(POLLERR);
    pub const HANGUP: Readiness = Readiness(POLLHUP);
    pub const INVALID: Readiness = Readiness(POLLNVAL);

    pub const fn from_bits(bits: c_short) -> Self {
        Readiness(bits)
    }

    pub const fn bits(self) -> c_short {
        self.0
    }

    pub const fn contains(self, other: Readiness) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }

    pub const fn is_error(self) -> bool {
        self.contains(Self::ERROR)
    }

    pub const fn is_hangup(self) -> bool {
        self.contains(Self::HANGUP)
    }

    pub const fn is_invalid(self) -> bool {
        self.contains(Self::INVALID)
    }
}

impl std::ops::BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Readiness {
    fn bitor_assign(&mut self, rhs: Readiness) {
        self.0 |= rhs.0;
    }
}

/// Result of one `poll(2)` call.
///
/// Mirrors the raw return value: `-1` is a [`PollOutcome::Fault`], `0` a
/// [`PollOutcome::Timeout`], anything positive is [`PollOutcome::Ready`] with
/// the number of entries that have non-empty `revents`.
#[derive(Debug)]
pub enum PollOutcome {
    Ready(usize),
    Timeout,
    Fault(io::Error),
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }
}

impl From<io::Result<usize>> for PollOutcome {
    fn from(result: io::Result<usize>) -> Self {
        match result {
            Ok(0) => PollOutcome::Timeout,
            Ok(n) => PollOutcome::Ready(n),
            Err(e) => PollOutcome::Fault(e),
        }
    }
}

/// Builds a poll entry watching `fd` for `interest`.
pub fn entry(fd: RawFd, interest: Readiness) -> pollfd {
    pollfd {
        fd,
        events: interest.bits(),
        revents: 0,
    }
}

/// Builds an entry the kernel skips.
pub const fn vacant() -> pollfd {
    pollfd {
        fd: -1,
        events: 0,
        revents: 0,
    }
}

/// Readiness reported for an entry by the last poll over it.
pub fn revents(entry: &pollfd) -> Readiness {
    Readiness::from_bits(entry.revents)
}

/// Converts an optional timeout into the millisecond argument of `poll(2)`.
///
/// `None` blocks indefinitely.
pub fn timeout_millis(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        Some(d) => d.as_millis().min(c_int::MAX as u128) as c_int,
    }
}

/// Waits until one of `fds` is ready or `timeout` elapses.
///
/// Returns the number of entries with non-empty `revents`.
pub fn poll(fds: &mut [pollfd], timeout: Option<Duration>) -> io::Result<usize> {
    for fd in fds.iter_mut() {
        fd.revents = 0;
    }

    // SAFETY: the pointer and length come from a live, exclusively borrowed slice.
    let rc = unsafe {
        libc::poll(
            fds.as_mut_ptr(),
            fds.len() as nfds_t,
            timeout_millis(timeout),
        )
    };

    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc as usize)
    }
}

/// Write half of a self-pipe. Cloneable and shareable across threads.
#[derive(Debug, Clone)]
pub struct Waker {
    tx: Arc<UnixStream>,
}

/// Read half of a self-pipe, placed in a poll set next to the descriptor
/// being waited on.
#[derive(Debug)]
pub struct WakeReceiver {
    rx: UnixStream,
}

/// Creates a connected waker pair. Both ends are non-blocking.
pub fn waker() -> io::Result<(Waker, WakeReceiver)> {
    let (tx, rx) = UnixStream::pair()?;
    tx.set_nonblocking(true)?;
    rx.set_nonblocking(true)?;

    Ok((Waker { tx: Arc::new(tx) }, WakeReceiver { rx }))
}

impl Waker {
    /// Makes the receiving end readable.
    pub fn wake(&self) -> io::Result<()> {
        match (&*self.tx).write(&[1]) {
            Ok(_) => Ok(()),
            // The pipe is full, so a wakeup is already pending.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl WakeReceiver {
    /// Consumes every pending wakeup.
    pub fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            match (&self.rx).read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }
}

impl AsRawFd for WakeReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.rx.as_raw_fd()
    }
}
