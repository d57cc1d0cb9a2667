//! Ready-made handlers for the binary.
//!
//! The core server has no protocol of its own; these give the `plexor`
//! binary something useful to do with the bytes it receives.

pub mod echo;

pub use echo::{echo, install as install_echo};
