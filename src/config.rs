//! Client configuration
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, `.json` or `.json5`)
//! 3. Environment variables (CVSROOT, CVS_RSH, CVS_SERVER, CVSIGNORE, CVSREAD, CVS_PASSWORD)
//! 4. CLI flags (highest priority)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::connection::CvsRoot;
use crate::error::ClientError;
use crate::protocol::Request;

/// Configuration of one client session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Repository location, e.g. `:pserver:anonymous@cvs.example.org:/cvsroot`
	pub cvsroot: Option<String>,

	/// Top of the working copy
	pub local_path: PathBuf,

	pub global: GlobalOptions,

	pub connection: ConnectionConfig,

	pub ignore: IgnoreConfig,

	pub files: FileConfig,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			cvsroot: None,
			local_path: PathBuf::from("."),
			global: GlobalOptions::default(),
			connection: ConnectionConfig::default(),
			ignore: IgnoreConfig::default(),
			files: FileConfig::default(),
		}
	}
}

impl Config {
	/// Load a config file, picking the format from its extension.
	pub fn load(path: &Path) -> Result<Config, ClientError> {
		let text = fs::read_to_string(path).map_err(|e| ClientError::local_io(path, e))?;
		let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
		let invalid = |message: String| ClientError::InvalidConfig {
			message: format!("{}: {}", path.display(), message),
		};

		match ext {
			"toml" => toml::from_str(&text).map_err(|e| invalid(e.to_string())),
			"json" | "json5" => json5::from_str(&text).map_err(|e| invalid(e.to_string())),
			other => Err(invalid(format!("unsupported config format '{}'", other))),
		}
	}

	/// Apply the process environment on top of the loaded values.
	pub fn apply_env(&mut self) {
		self.apply_env_from(|name| std::env::var(name).ok());
	}

	pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
		if let Some(root) = lookup("CVSROOT") {
			self.cvsroot = Some(root);
		}
		if let Some(rsh) = lookup("CVS_RSH") {
			self.connection.rsh = rsh;
		}
		if let Some(server) = lookup("CVS_SERVER") {
			self.connection.server = server;
		}
		if let Some(password) = lookup("CVS_PASSWORD") {
			self.connection.password = Some(password);
		}
		if let Some(patterns) = lookup("CVSIGNORE") {
			self.ignore.patterns.extend(patterns.split_whitespace().map(str::to_string));
		}
		if lookup("CVSREAD").is_some() {
			self.global.checked_out_files_read_only = true;
		}
	}

	/// Parsed repository root.
	pub fn root(&self) -> Result<CvsRoot, ClientError> {
		let root = self.cvsroot.as_deref().ok_or_else(|| ClientError::InvalidConfig {
			message: "no CVSROOT given".to_string(),
		})?;
		root.parse().map_err(|e| ClientError::InvalidConfig { message: format!("{}", e) })
	}

	pub fn validate(&self) -> Result<(), ClientError> {
		self.root()?;
		if self.global.compression_level > 9 {
			return Err(ClientError::InvalidConfig {
				message: format!("compression level {} is out of range 0-9", self.global.compression_level),
			});
		}
		if self.connection.probe_timeout_secs == 0 {
			return Err(ClientError::InvalidConfig { message: "probe timeout must be positive".to_string() });
		}
		Ok(())
	}

	pub fn to_json(&self) -> Result<String, ClientError> {
		serde_json::to_string_pretty(self).map_err(|e| ClientError::InvalidConfig { message: e.to_string() })
	}
}

/// How compression is negotiated with the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionMode {
	/// Whole stream compressed (`Gzip-stream`)
	#[default]
	Stream,
	/// Only file payloads compressed (`gzip-file-contents`)
	FileContents,
}

/// Options sent ahead of the first command on a connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalOptions {
	/// User variables, `NAME=VALUE`
	pub variables: Vec<String>,

	/// -l
	pub no_history_logging: bool,

	/// -n
	pub do_no_changes: bool,

	/// -q
	pub moderately_quiet: bool,

	/// -Q
	pub very_quiet: bool,

	/// -t
	pub trace_execution: bool,

	/// -r: checked out files are made read-only
	pub checked_out_files_read_only: bool,

	/// 0 disables compression
	pub compression_level: u32,

	pub compression: CompressionMode,

	/// Where temporary files for transfers are created
	pub temp_dir: Option<PathBuf>,
}

impl GlobalOptions {
	pub fn requests(&self) -> Vec<Request> {
		let mut requests: Vec<Request> = self.variables.iter().map(|v| Request::Set(v.clone())).collect();

		let flags = [
			(self.no_history_logging, "-l"),
			(self.do_no_changes, "-n"),
			(self.moderately_quiet, "-q"),
			(self.very_quiet, "-Q"),
			(self.trace_execution, "-t"),
		];
		for (enabled, flag) in flags {
			if enabled {
				requests.push(Request::GlobalOption(flag.to_string()));
			}
		}

		if let Some(request) = self.compression_request() {
			requests.push(request);
		}
		requests
	}

	pub fn compression_request(&self) -> Option<Request> {
		match (self.compression_level, self.compression) {
			(0, _) => None,
			(level, CompressionMode::Stream) => Some(Request::GzipStream(level)),
			(level, CompressionMode::FileContents) => Some(Request::GzipFileContents(level)),
		}
	}
}

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionConfig {
	/// Remote shell for `:ext:` roots
	pub rsh: String,

	/// Server program started by `:ext:` and `:fork:` roots
	pub server: String,

	/// pserver password; overrides one embedded in the root
	#[serde(skip_serializing)]
	pub password: Option<String>,

	/// How long to wait for the connection to come up (seconds)
	pub probe_timeout_secs: u64,
}

impl Default for ConnectionConfig {
	fn default() -> Self {
		ConnectionConfig { rsh: "ssh".to_string(), server: "cvs".to_string(), password: None, probe_timeout_secs: 60 }
	}
}

/// Which unknown files are not reported to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IgnoreConfig {
	/// Extra patterns on top of the defaults
	pub patterns: Vec<String>,

	/// Start from the built-in ignore list
	pub use_defaults: bool,

	/// Honor per-directory `.cvsignore` files
	pub read_cvsignore: bool,
}

impl Default for IgnoreConfig {
	fn default() -> Self {
		IgnoreConfig { patterns: vec![], use_defaults: true, read_cvsignore: true }
	}
}

/// File transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
	/// Convert between platform and wire line endings for text files
	pub normalize_line_endings: bool,
}

impl Default for FileConfig {
	fn default() -> Self {
		FileConfig { normalize_line_endings: true }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert!(config.cvsroot.is_none());
		assert_eq!(config.connection.rsh, "ssh");
		assert_eq!(config.connection.probe_timeout_secs, 60);
		assert!(config.ignore.use_defaults);
		assert!(config.global.requests().is_empty());
	}

	#[test]
	fn test_global_option_requests() {
		let global = GlobalOptions {
			variables: vec!["EDITOR=vi".to_string()],
			moderately_quiet: true,
			trace_execution: true,
			compression_level: 6,
			..Default::default()
		};
		assert_eq!(
			global.requests(),
			vec![
				Request::Set("EDITOR=vi".to_string()),
				Request::GlobalOption("-q".to_string()),
				Request::GlobalOption("-t".to_string()),
				Request::GzipStream(6),
			]
		);

		let global = GlobalOptions {
			compression_level: 3,
			compression: CompressionMode::FileContents,
			..Default::default()
		};
		assert_eq!(global.requests(), vec![Request::GzipFileContents(3)]);
	}

	#[test]
	fn test_env_overrides() {
		let mut config = Config::default();
		config.apply_env_from(|name| match name {
			"CVSROOT" => Some(":ext:me@host:/cvs".to_string()),
			"CVS_RSH" => Some("rsh".to_string()),
			"CVSIGNORE" => Some("*.log build".to_string()),
			"CVSREAD" => Some(String::new()),
			_ => None,
		});
		assert_eq!(config.cvsroot.as_deref(), Some(":ext:me@host:/cvs"));
		assert_eq!(config.connection.rsh, "rsh");
		assert_eq!(config.connection.server, "cvs");
		assert_eq!(config.ignore.patterns, vec!["*.log", "build"]);
		assert!(config.global.checked_out_files_read_only);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_validate() {
		let mut config = Config::default();
		assert!(config.validate().is_err());

		config.cvsroot = Some("/var/cvs".to_string());
		assert!(config.validate().is_ok());

		config.global.compression_level = 10;
		assert!(config.validate().is_err());

		config.global.compression_level = 9;
		config.connection.probe_timeout_secs = 0;
		assert!(config.validate().is_err());
	}

	#[test]
	fn test_config_serialization() {
		let mut config = Config::default();
		config.connection.password = Some("secret".to_string());
		let json = config.to_json().unwrap();
		assert!(!json.contains("secret"));
		let deserialized: Config = serde_json::from_str(&json).unwrap();
		assert_eq!(deserialized.connection.server, config.connection.server);
		assert_eq!(deserialized.global, config.global);
	}
}

// vim: ts=4
