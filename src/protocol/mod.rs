//! CVS client/server wire protocol
//!
//! Requests and responses are newline-terminated ASCII lines. File payloads
//! follow a decimal length line as raw bytes.
//!
//! # Example Usage
//!
//! ```ignore
//! use cvsr::protocol::{Request, ResponseKind};
//!
//! writer.write_all(Request::Command("update".into()).serialize().as_bytes()).await?;
//! while let Some(token) = reader.read_token().await? {
//!     let outcome = ResponseKind::from_token(&token)?.process(&mut reader, &mut services).await?;
//! }
//! ```

pub mod error;
pub mod request;
pub mod response;
pub mod services;
pub mod wire;

// Re-export public API
pub use error::ProtocolError;
pub use request::{FileDetails, Request, StreamMutator};
pub use response::{ResponseKind, ResponseOutcome};
pub use services::ResponseServices;
pub use wire::{BoxedReader, BoxedWriter, ByteCounter, WireReader, WireWriter};

// vim: ts=4
