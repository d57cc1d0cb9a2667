//! Operating System Primitives
//!
//! The only OS-level building block the server needs beyond `std::net` is
//! `poll(2)`. This module wraps it, together with the readiness flags it
//! reports and a self-pipe waker used to interrupt a blocking wait.

pub mod poll;

pub use poll::{PollOutcome, Readiness, WakeReceiver, Waker};
