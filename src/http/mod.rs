//! HTTP plumbing shared by both tiers.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs     (request ID, trace span, peer address)
//!     → instrument.rs (golden signals per endpoint)
//!     → tier handler  (api::handlers | web::handlers)
//!     → response.rs   (failure → status + error_type)
//!     → Send to client
//! ```

pub mod instrument;
pub mod request;
pub mod response;
pub mod server;

pub use instrument::{instrument, Instrumented};
pub use request::{request_id, UuidRequestId, X_REQUEST_ID};
pub use response::HandlerError;
pub use server::HttpServer;
