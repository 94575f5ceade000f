//! Transports carrying the protocol byte stream
//!
//! A [`Connection`] only has to deliver an ordered duplex byte channel. The
//! session takes both halves once the connection is open and owns them
//! until it closes the connection again.

pub mod pserver;
pub mod root;

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::logging::*;
use crate::protocol::{BoxedReader, BoxedWriter};

pub use pserver::PServerConnection;
pub use root::{CvsRoot, Method};

#[async_trait]
pub trait Connection: Send {
	/// Establish the channel. Authentication happens here.
	async fn open(&mut self) -> Result<(), ConnectionError>;

	async fn close(&mut self) -> Result<(), ConnectionError>;

	fn is_open(&self) -> bool;

	/// Repository root path on the server
	fn repository(&self) -> &str;

	/// Hand the reader and writer to the caller. `None` once taken.
	fn take_streams(&mut self) -> Option<(BoxedReader, BoxedWriter)>;
}

/// Runs the server over a remote shell, or locally for `:fork:` roots.
pub struct ExtConnection {
	root: CvsRoot,
	rsh: String,
	server: String,
	child: Option<Child>,
	streams: Option<(BoxedReader, BoxedWriter)>,
}

impl ExtConnection {
	pub fn new(root: CvsRoot, rsh: impl Into<String>, server: impl Into<String>) -> Self {
		Self { root, rsh: rsh.into(), server: server.into(), child: None, streams: None }
	}

	/// Program and arguments to spawn.
	pub fn command_line(&self) -> Vec<String> {
		let mut args = Vec::new();
		if let Some(host) = &self.root.host {
			args.extend(self.rsh.split_whitespace().map(str::to_string));
			if let Some(user) = &self.root.user {
				args.push("-l".to_string());
				args.push(user.clone());
			}
			if let Some(port) = self.root.port {
				args.push("-p".to_string());
				args.push(port.to_string());
			}
			args.push(host.clone());
		}
		args.extend(self.server.split_whitespace().map(str::to_string));
		args.push("server".to_string());
		args
	}
}

#[async_trait]
impl Connection for ExtConnection {
	async fn open(&mut self) -> Result<(), ConnectionError> {
		let args = self.command_line();
		let (program, rest) = args.split_first().ok_or_else(|| ConnectionError::SpawnFailed {
			cmd: String::new(),
			source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
		})?;

		info!("Starting {}", args.join(" "));
		let mut child = Command::new(program)
			.args(rest)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| ConnectionError::SpawnFailed { cmd: args.join(" "), source: e })?;

		let send = child
			.stdin
			.take()
			.ok_or(ConnectionError::StdioUnavailable { what: "stdin".to_string() })?;

		let recv = child
			.stdout
			.take()
			.ok_or(ConnectionError::StdioUnavailable { what: "stdout".to_string() })?;

		self.streams = Some((Box::new(recv), Box::new(send)));
		self.child = Some(child);
		Ok(())
	}

	async fn close(&mut self) -> Result<(), ConnectionError> {
		// Closing stdin lets the server exit on its own
		self.streams = None;
		if let Some(mut child) = self.child.take() {
			match tokio::time::timeout(Duration::from_secs(5), child.wait()).await {
				Ok(status) => debug!("Server exited: {}", status?),
				Err(_) => {
					warn!("Server did not exit, killing it");
					child.kill().await?;
				}
			}
		}
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.child.is_some()
	}

	fn repository(&self) -> &str {
		&self.root.repository
	}

	fn take_streams(&mut self) -> Option<(BoxedReader, BoxedWriter)> {
		self.streams.take()
	}
}

/// Wraps an already established reader/writer pair. It can be opened once.
pub struct StreamConnection {
	repository: String,
	streams: Option<(BoxedReader, BoxedWriter)>,
	open: bool,
	used: bool,
}

impl StreamConnection {
	pub fn new(repository: impl Into<String>, reader: BoxedReader, writer: BoxedWriter) -> Self {
		Self { repository: repository.into(), streams: Some((reader, writer)), open: false, used: false }
	}
}

#[async_trait]
impl Connection for StreamConnection {
	async fn open(&mut self) -> Result<(), ConnectionError> {
		if self.used {
			return Err(ConnectionError::StdioUnavailable { what: "stream already consumed".to_string() });
		}
		self.used = true;
		self.open = true;
		Ok(())
	}

	async fn close(&mut self) -> Result<(), ConnectionError> {
		self.streams = None;
		self.open = false;
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.open
	}

	fn repository(&self) -> &str {
		&self.repository
	}

	fn take_streams(&mut self) -> Option<(BoxedReader, BoxedWriter)> {
		self.streams.take()
	}
}

/// Pick the dialect matching the root's access method.
pub fn connect(root: &CvsRoot, config: &ConnectionConfig) -> Box<dyn Connection> {
	match root.method {
		Method::Pserver => Box::new(PServerConnection::new(root.clone(), config.password.clone())),
		Method::Ext | Method::Fork | Method::Local => {
			Box::new(ExtConnection::new(root.clone(), config.rsh.clone(), config.server.clone()))
		}
	}
}


// vim: ts=4
