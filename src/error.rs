//! Error types for cvsr operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::protocol::ProtocolError;

/// Main error type for client operations
#[derive(Debug)]
pub enum ClientError {
	/// Operation aborted through the session's abort handle
	Aborted,

	/// Caller supplied an empty or invalid request list
	Unconfigured { message: String },

	/// Connection could not be established or the server refused it
	AuthenticationFailed(ConnectionError),

	/// Malformed or truncated byte stream
	Protocol(ProtocolError),

	/// The server answered with a terminal `error` response
	ServerError { message: String },

	/// Local file operation failed while writing or reading a payload
	LocalIo { path: PathBuf, source: io::Error },

	/// Working-copy metadata error (nested)
	Admin(AdminError),

	/// Invalid configuration
	InvalidConfig { message: String },
}

impl ClientError {
	pub fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		ClientError::LocalIo { path: path.into(), source }
	}

	/// True when the failure came from a cooperative abort rather than an error.
	pub fn is_aborted(&self) -> bool {
		matches!(self, ClientError::Aborted)
	}
}

impl fmt::Display for ClientError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ClientError::Aborted => write!(f, "Operation aborted by user"),
			ClientError::Unconfigured { message } => write!(f, "Client not configured: {}", message),
			ClientError::AuthenticationFailed(e) => write!(f, "Authentication failed: {}", e),
			ClientError::Protocol(e) => write!(f, "Protocol error: {}", e),
			ClientError::ServerError { message } => write!(f, "Server error: {}", message),
			ClientError::LocalIo { path, source } => {
				write!(f, "I/O error on {}: {}", path.display(), source)
			}
			ClientError::Admin(e) => write!(f, "Working copy error: {}", e),
			ClientError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
		}
	}
}

impl Error for ClientError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			ClientError::AuthenticationFailed(e) => Some(e),
			ClientError::Protocol(e) => Some(e),
			ClientError::LocalIo { source, .. } => Some(source),
			ClientError::Admin(e) => Some(e),
			_ => None,
		}
	}
}

impl From<ProtocolError> for ClientError {
	fn from(e: ProtocolError) -> Self {
		ClientError::Protocol(e)
	}
}

impl From<AdminError> for ClientError {
	fn from(e: AdminError) -> Self {
		ClientError::Admin(e)
	}
}

impl From<ConnectionError> for ClientError {
	fn from(e: ConnectionError) -> Self {
		ClientError::AuthenticationFailed(e)
	}
}

/// Connection-specific errors
#[derive(Debug)]
pub enum ConnectionError {
	/// CVSROOT string could not be parsed
	InvalidRoot { root: String, message: String },

	/// Subprocess spawn failed
	SpawnFailed { cmd: String, source: io::Error },

	/// TCP connect failed
	ConnectFailed { host: String, port: u16, source: io::Error },

	/// The server refused the authentication handshake
	Rejected { message: String },

	/// Connection attempt did not finish in time
	Timeout,

	/// Stdio unavailable
	StdioUnavailable { what: String },

	/// Operation needs an open connection
	NotOpen,

	/// I/O error on an established connection
	Io(io::Error),
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::InvalidRoot { root, message } => {
				write!(f, "Invalid CVSROOT '{}': {}", root, message)
			}
			ConnectionError::SpawnFailed { cmd, source } => {
				write!(f, "Failed to spawn '{}': {}", cmd, source)
			}
			ConnectionError::ConnectFailed { host, port, source } => {
				write!(f, "Cannot connect to {}:{}: {}", host, port, source)
			}
			ConnectionError::Rejected { message } => write!(f, "Server rejected login: {}", message),
			ConnectionError::Timeout => write!(f, "Connection timeout"),
			ConnectionError::StdioUnavailable { what } => {
				write!(f, "Stdio unavailable: {}", what)
			}
			ConnectionError::NotOpen => write!(f, "Connection is not open"),
			ConnectionError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
	fn from(e: io::Error) -> Self {
		ConnectionError::Io(e)
	}
}

/// Working-copy metadata errors
#[derive(Debug)]
pub enum AdminError {
	/// The directory or file referenced by the metadata does not exist
	NotFound { path: PathBuf },

	/// Reading or writing an administrative file failed
	Io { path: PathBuf, source: io::Error },

	/// An administrative file contains a line that cannot be parsed
	Corrupted { path: PathBuf, line: String },
}

impl AdminError {
	pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
		let path = path.into();
		if source.kind() == io::ErrorKind::NotFound {
			AdminError::NotFound { path }
		} else {
			AdminError::Io { path, source }
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, AdminError::NotFound { .. })
	}
}

impl fmt::Display for AdminError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AdminError::NotFound { path } => write!(f, "Not found: {}", path.display()),
			AdminError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
			AdminError::Corrupted { path, line } => {
				write!(f, "Corrupted entry in {}: {:?}", path.display(), line)
			}
		}
	}
}

impl Error for AdminError {}


// vim: ts=4
