//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → resolver.rs (normalize, join onto document root, canonicalize)
//!     → extension lookup (interpreter table)
//!     → Return: Handler (script + interpreter) or ResolveError
//! ```
//!
//! # Design Decisions
//! - Interpreter table built at startup, immutable at runtime
//! - `..` segments are rejected before touching the filesystem
//! - The canonical script path must stay under the canonical document root,
//!   which also catches symlinks pointing outside it

pub mod resolver;

pub use resolver::{Handler, ResolveError, ScriptResolver};
