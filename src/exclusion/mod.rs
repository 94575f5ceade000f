//! Ignore predicate consulted before reporting unknown files
//!
//! Files matching an ignore pattern are not sent as `Questionable`.

mod ignore;
mod patterns;

pub use ignore::{DefaultIgnoreFilter, CVSIGNORE_FILE};
pub use patterns::{collect_patterns, PatternMatcher, DEFAULT_IGNORES};

use std::path::Path;

pub trait IgnoreFilter: Send + Sync {
	/// True when `name` inside `directory` must not be reported.
	fn should_be_ignored(&self, directory: &Path, name: &str) -> bool;
}

/// Reports every file
pub struct NoIgnores;

impl IgnoreFilter for NoIgnores {
	fn should_be_ignored(&self, _directory: &Path, _name: &str) -> bool {
		false
	}
}

/// Errors that can occur while building ignore patterns
#[derive(Debug)]
pub enum ExclusionError {
	/// Failed to parse a glob pattern
	InvalidPattern(String),

	/// Failed to read an ignore file
	IgnoreFileError(String),
}

impl std::fmt::Display for ExclusionError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ExclusionError::InvalidPattern(msg) => {
				write!(f, "Invalid ignore pattern: {}", msg)
			}
			ExclusionError::IgnoreFileError(msg) => {
				write!(f, "Ignore file error: {}", msg)
			}
		}
	}
}

impl std::error::Error for ExclusionError {}

impl From<ExclusionError> for crate::error::ClientError {
	fn from(e: ExclusionError) -> Self {
		crate::error::ClientError::InvalidConfig { message: e.to_string() }
	}
}

// vim: ts=4
