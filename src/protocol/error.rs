//! Protocol error types
//!
//! Errors raised while encoding requests or decoding the server's
//! response stream. Any of these leaves the transport in an unknown
//! position, so callers should close it.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error from async operations
	Io(io::Error),
	/// The stream ended before a token, line or payload was complete
	UnexpectedEndOfFile { context: String },
	/// Response name the dispatcher does not know
	UnknownResponse(String),
	/// Response payload in an unexpected shape
	Malformed { message: String },
}

impl ProtocolError {
	pub fn eof(context: impl Into<String>) -> Self {
		ProtocolError::UnexpectedEndOfFile { context: context.into() }
	}

	pub fn malformed(message: impl Into<String>) -> Self {
		ProtocolError::Malformed { message: message.into() }
	}

	/// True if the error came from an interrupted read or write.
	pub fn is_interrupted(&self) -> bool {
		matches!(self, ProtocolError::Io(e) if e.kind() == io::ErrorKind::Interrupted)
	}
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::UnexpectedEndOfFile { context } => {
				write!(f, "Unexpected end of stream while reading {}", context)
			}
			ProtocolError::UnknownResponse(token) => {
				write!(f, "Unknown response from server: '{}'", token)
			}
			ProtocolError::Malformed { message } => write!(f, "Malformed response: {}", message),
		}
	}
}

impl std::error::Error for ProtocolError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ProtocolError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		if e.kind() == io::ErrorKind::UnexpectedEof {
			ProtocolError::eof(e.to_string())
		} else {
			ProtocolError::Io(e)
		}
	}
}

// vim: ts=4
