//! Glob matching of file names against ignore patterns

use super::ExclusionError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Names never reported as unknown files, unless a `!` clears the list
pub const DEFAULT_IGNORES: &[&str] = &[
	"RCS", "SCCS", "CVS", "CVS.adm", "RCSLOG", "cvslog.*", "tags", "TAGS", ".make.state", ".nse_depinfo", "*~",
	"#*", ".#*", ",*", "_$*", "*$", "*.old", "*.bak", "*.BAK", "*.orig", "*.rej", ".del-*", "*.a", "*.olb", "*.o",
	"*.obj", "*.so", "*.exe", "*.Z", "*.elc", "*.ln", "core",
];

/// Apply the list semantics of ignore files: whitespace separates
/// patterns and a lone `!` drops every pattern collected before it.
pub fn collect_patterns<'a, I>(patterns: I) -> Vec<String>
where
	I: IntoIterator<Item = &'a str>,
{
	let mut out = Vec::new();
	for chunk in patterns {
		for pattern in chunk.split_whitespace() {
			if pattern == "!" {
				out.clear();
			} else {
				out.push(pattern.to_string());
			}
		}
	}
	out
}

/// Compiled set of file name patterns
pub struct PatternMatcher {
	set: GlobSet,
	len: usize,
}

impl PatternMatcher {
	pub fn new(patterns: &[String]) -> Result<Self, ExclusionError> {
		let mut builder = GlobSetBuilder::new();

		for pattern in patterns {
			let glob = GlobBuilder::new(pattern)
				.literal_separator(true)
				.backslash_escape(true)
				.build()
				.map_err(|e| ExclusionError::InvalidPattern(format!("{}: {}", pattern, e)))?;
			builder.add(glob);
		}

		let set = builder
			.build()
			.map_err(|e| ExclusionError::InvalidPattern(format!("Failed to build pattern set: {}", e)))?;
		Ok(Self { set, len: patterns.len() })
	}

	/// True when `name` (a bare file name) matches any pattern.
	pub fn is_match(&self, name: &str) -> bool {
		self.set.is_match(name)
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}
}


// vim: ts=4
