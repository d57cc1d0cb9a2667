//! Client Module
//!
//! Per-connection state and the fixed-capacity table that holds it.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       ClientTable                         │
//! │                                                           │
//! │  records:  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐    │
//! │            │ slot 0 │ │ slot 1 │ │ slot 2 │ │ ...N-1 │    │
//! │            │ Active │ │Inactive│ │ Active │ │        │    │
//! │            └───┬────┘ └────────┘ └───┬────┘ └────────┘    │
//! │                │                     │                    │
//! │  pollfds:  ┌───▼────┐ ┌────────┐ ┌───▼────┐ ┌────────┐    │
//! │            │ fd, RW │ │ vacant │ │ fd, RW │ │ vacant │    │
//! │            └────────┘ └────────┘ └────────┘ └────────┘    │
//! │                                                           │
//! │  free: {1, 3, ...}         active: 2                      │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod record;
pub mod stats;
pub mod table;

pub use record::{ClientRecord, ClientStatus, CloseReason};
pub use stats::ConnectionStats;
pub use table::ClientTable;
