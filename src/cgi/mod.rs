//! CGI gateway subsystem.
//!
//! # Data Flow
//! ```text
//! CgiRequest + Handler
//!     → env.rs (GatewayEnvironment: fixed CGI variables + HTTP_* map)
//!     → supervisor.rs (spawn, deadline, outcome)
//!         ├→ body.rs (request body → handler stdin, exactly CONTENT_LENGTH)
//!         ├→ body.rs (handler stdout → raw output, until EOF)
//!         └→ body.rs (handler stderr → log)
//!     → decoder.rs (raw output → status, headers, body)
//!     → coordinator.rs (stage machine, error → status mapping)
//!     → GatewayResponse
//! ```
//!
//! # Design Decisions
//! - One process per request, no pooling
//! - No retry anywhere; every failure is terminal for its request
//! - The live-handler registry is the only state shared across requests

pub mod body;
pub mod coordinator;
pub mod decoder;
pub mod env;
pub mod error;
pub mod registry;
pub mod request;
pub mod supervisor;
pub mod upload;

pub use coordinator::{GatewayCoordinator, GatewayResponse, Stage};
pub use decoder::{decode, DecodeError, DecodedResponse};
pub use env::{GatewayEnvironment, ServerMeta};
pub use error::GatewayError;
pub use registry::HandlerRegistry;
pub use request::CgiRequest;
pub use supervisor::{HandlerCommand, HandlerRun, ProcessSupervisor, Termination};
pub use upload::{UploadError, UploadStore};
