//! Ignore filter combining built-in, configured and `.cvsignore` patterns

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::patterns::{collect_patterns, PatternMatcher, DEFAULT_IGNORES};
use super::{ExclusionError, IgnoreFilter};
use crate::config::IgnoreConfig;
use crate::logging::*;

/// Name of the per-directory ignore file
pub const CVSIGNORE_FILE: &str = ".cvsignore";

pub struct DefaultIgnoreFilter {
	/// Built-in and configured patterns, after `!` resets
	global: Vec<String>,

	/// Global matcher, used for directories without `.cvsignore`
	matcher: PatternMatcher,

	read_cvsignore: bool,

	/// Matchers of directories that have their own `.cvsignore`
	per_directory: Mutex<HashMap<PathBuf, Option<PatternMatcher>>>,
}

impl DefaultIgnoreFilter {
	pub fn new(config: &IgnoreConfig) -> Result<Self, ExclusionError> {
		let defaults: &[&str] = if config.use_defaults { DEFAULT_IGNORES } else { &[] };
		let global =
			collect_patterns(defaults.iter().copied().chain(config.patterns.iter().map(String::as_str)));
		let matcher = PatternMatcher::new(&global)?;

		Ok(Self { global, matcher, read_cvsignore: config.read_cvsignore, per_directory: Mutex::new(HashMap::new()) })
	}

	/// Matcher for `dir` if it carries its own `.cvsignore`.
	fn directory_matcher(&self, dir: &Path) -> Result<Option<PatternMatcher>, ExclusionError> {
		let path = dir.join(CVSIGNORE_FILE);
		let text = match fs::read_to_string(&path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(ExclusionError::IgnoreFileError(format!("{}: {}", path.display(), e)));
			}
		};

		let patterns = collect_patterns(self.global.iter().map(String::as_str).chain(text.lines()));
		Ok(Some(PatternMatcher::new(&patterns)?))
	}
}

impl IgnoreFilter for DefaultIgnoreFilter {
	fn should_be_ignored(&self, directory: &Path, name: &str) -> bool {
		if !self.read_cvsignore {
			return self.matcher.is_match(name);
		}

		let mut cache = match self.per_directory.lock() {
			Ok(cache) => cache,
			Err(poisoned) => poisoned.into_inner(),
		};
		if !cache.contains_key(directory) {
			let matcher = self.directory_matcher(directory).unwrap_or_else(|e| {
				warn!("Ignoring unreadable ignore file: {}", e);
				None
			});
			cache.insert(directory.to_path_buf(), matcher);
		}

		match cache.get(directory) {
			Some(Some(matcher)) => matcher.is_match(name),
			_ => self.matcher.is_match(name),
		}
	}
}


// vim: ts=4
