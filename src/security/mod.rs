//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → limits.rs (method allowed? declared length within maximum?)
//!     → limits.rs (spool unknown-length body, bounded)
//!     → Pass to routing
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject before a handler process exists
//! - No trust in client input

pub mod limits;

pub use limits::RequestLimits;
