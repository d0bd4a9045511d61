//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, one router per listener)
//!     → request.rs (add request ID)
//!     → security (method, body size)
//!     → routing (script + interpreter) or upload store
//!     → cgi coordinator
//!     → response.rs (status, headers, Content-Length)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::HttpServer;
