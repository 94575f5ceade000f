//! CVSROOT parsing
//!
//! Accepted forms:
//!
//! ```text
//! /path/to/repo
//! :local:/path/to/repo
//! :fork:/path/to/repo
//! :ext:user@host:/path/to/repo
//! :pserver:user:password@host:2401/path/to/repo
//! user@host:/path/to/repo          (same as :ext:)
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
	Local,
	Fork,
	Ext,
	Pserver,
}

impl Method {
	pub fn name(&self) -> &'static str {
		match self {
			Method::Local => "local",
			Method::Fork => "fork",
			Method::Ext => "ext",
			Method::Pserver => "pserver",
		}
	}

	pub fn is_remote(&self) -> bool {
		matches!(self, Method::Ext | Method::Pserver)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvsRoot {
	pub method: Method,
	pub user: Option<String>,
	pub password: Option<String>,
	pub host: Option<String>,
	pub port: Option<u16>,
	/// Repository path on the server
	pub repository: String,
}

impl CvsRoot {
	fn invalid(root: &str, message: &str) -> ConnectionError {
		ConnectionError::InvalidRoot { root: root.to_string(), message: message.to_string() }
	}

	fn local(method: Method, path: &str, root: &str) -> Result<Self, ConnectionError> {
		if !path.starts_with('/') {
			return Err(Self::invalid(root, "repository path must be absolute"));
		}
		Ok(Self { method, user: None, password: None, host: None, port: None, repository: path.to_string() })
	}

	fn remote(method: Method, rest: &str, root: &str) -> Result<Self, ConnectionError> {
		let (userinfo, hostpart) = match rest.rfind('@') {
			Some(i) => (Some(&rest[..i]), &rest[i + 1..]),
			None => (None, rest),
		};
		let slash = hostpart.find('/').ok_or_else(|| Self::invalid(root, "missing repository path"))?;
		let host_port = hostpart[..slash].trim_end_matches(':');
		let repository = hostpart[slash..].to_string();

		let (host, port) = match host_port.split_once(':') {
			Some((host, "")) => (host, None),
			Some((host, port)) => {
				(host, Some(port.parse::<u16>().map_err(|_| Self::invalid(root, "invalid port"))?))
			}
			None => (host_port, None),
		};
		if host.is_empty() {
			return Err(Self::invalid(root, "missing host"));
		}

		let (user, password) = match userinfo {
			Some(info) => match info.split_once(':') {
				Some((user, password)) => (Some(user.to_string()), Some(password.to_string())),
				None => (Some(info.to_string()), None),
			},
			None => (None, None),
		};

		Ok(Self { method, user, password, host: Some(host.to_string()), port, repository })
	}
}

impl FromStr for CvsRoot {
	type Err = ConnectionError;

	fn from_str(root: &str) -> Result<Self, Self::Err> {
		let root = root.trim();
		if root.is_empty() {
			return Err(Self::invalid(root, "empty CVSROOT"));
		}

		if let Some(rest) = root.strip_prefix(':') {
			let (method, rest) = rest.split_once(':').ok_or_else(|| Self::invalid(root, "unterminated method"))?;
			return match method {
				"local" => Self::local(Method::Local, rest, root),
				"fork" => Self::local(Method::Fork, rest, root),
				"ext" => Self::remote(Method::Ext, rest, root),
				"pserver" => Self::remote(Method::Pserver, rest, root),
				other => Err(Self::invalid(root, &format!("unsupported method '{}'", other))),
			};
		}

		if root.starts_with('/') {
			return Self::local(Method::Local, root, root);
		}
		Self::remote(Method::Ext, root, root)
	}
}

/// Canonical form written to `CVS/Root`. The password is never included.
impl fmt::Display for CvsRoot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.method {
			Method::Local => write!(f, "{}", self.repository),
			Method::Fork => write!(f, ":fork:{}", self.repository),
			Method::Ext | Method::Pserver => {
				write!(f, ":{}:", self.method.name())?;
				if let Some(user) = &self.user {
					write!(f, "{}@", user)?;
				}
				write!(f, "{}:", self.host.as_deref().unwrap_or_default())?;
				if let Some(port) = self.port {
					write!(f, "{}", port)?;
				}
				write!(f, "{}", self.repository)
			}
		}
	}
}


// vim: ts=4
