//! Core
//!
//! Data types shared across the opclink OPC UA client: status codes,
//! the service error type, the session record, session configuration,
//! and the boundary request/response messages the session layer exchanges
//! with a transport.
//!
//! Wire encoding is out of scope here - these types describe the messages
//! at the service boundary, and a transport implementation maps them onto
//! whatever encoding it speaks.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod session;
pub mod status;
pub mod types;

pub use config::SessionConfig;
pub use error::ServiceError;
pub use session::Session;
pub use status::StatusCode;
