//! Conformance harness.
//!
//! A black-box client that drives a running gateway over plain HTTP and
//! checks protocol-level outcomes. It shares no code path with the gateway
//! itself beyond this crate's name.
//!
//! # Flow
//! ```text
//! probe (short timeout) ──unreachable──→ RunOutcome::Unreachable
//!     │
//!     → basic GET → methods → upload → body limit → concurrency
//!     → multiple endpoints → CGI execution → crash resilience
//!     → RunOutcome::Completed(Report)
//! ```

pub mod report;
pub mod suites;

pub use report::{Report, TestResult, Verdict};
pub use suites::{Harness, HarnessConfig, RunOutcome, BASE_URL_1, BASE_URL_2};
