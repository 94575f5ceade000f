//! Per-file working-copy records
//!
//! An [`Entry`] is one line of a directory's `CVS/Entries` file:
//!
//! ```text
//! /name/revision/timestamp/options/tagdate
//! D/subdir////
//! ```
//!
//! The timestamp column carries either a real modification time or one of
//! several markers (conflicts, merges, dummy values). [`LastKnownState`]
//! keeps these apart so that a marker is never mistaken for a date.

use std::fmt;
use std::fs::Metadata;
use std::str::FromStr;

use chrono::{NaiveDateTime, TimeZone, Utc};
use filetime::FileTime;

/// Revision recorded for a file that was added but never committed
pub const NEW_FILE_REVISION: &str = "0";

const MERGE_MARKER: &str = "Result of merge";
const ASCTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// What the client last knew about the file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastKnownState {
	/// File matched the repository at this mtime (seconds since the epoch)
	Clean(i64),
	/// A merge left conflict markers; the time of that merge if recorded
	Conflicted(Option<i64>),
	/// A merge succeeded without conflicts; the file differs from its revision
	Merged,
	/// Any other text in the timestamp column (`dummy timestamp`, empty, ...)
	Dummy(String),
}

impl LastKnownState {
	fn parse(field: &str) -> Self {
		if let Some(rest) = field.strip_prefix(MERGE_MARKER) {
			return match rest.strip_prefix('+') {
				Some(date) => LastKnownState::Conflicted(parse_asctime(date)),
				None => LastKnownState::Merged,
			};
		}
		match parse_asctime(field) {
			Some(secs) => LastKnownState::Clean(secs),
			None => LastKnownState::Dummy(field.to_string()),
		}
	}
}

impl fmt::Display for LastKnownState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LastKnownState::Clean(secs) => write!(f, "{}", format_asctime(*secs)),
			LastKnownState::Conflicted(Some(secs)) => {
				write!(f, "{}+{}", MERGE_MARKER, format_asctime(*secs))
			}
			LastKnownState::Conflicted(None) => write!(f, "{}+", MERGE_MARKER),
			LastKnownState::Merged => write!(f, "{}", MERGE_MARKER),
			LastKnownState::Dummy(text) => write!(f, "{}", text),
		}
	}
}

/// Conflict column of an `Entry` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireConflict {
	/// Nothing to report
	None,
	/// Conflict markers still in the file, untouched since the merge
	Pending,
	/// The file was edited after a conflicting merge
	Modified,
}

/// One versioned path in a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	pub name: String,
	pub revision: String,
	pub state: LastKnownState,
	/// Keyword substitution options, e.g. `-kb`
	pub options: String,
	/// Sticky tag (`T`/`N` prefix) or date (`D` prefix)
	pub tag_date: String,
	pub directory: bool,
}

impl Entry {
	pub fn new(name: impl Into<String>, revision: impl Into<String>, state: LastKnownState) -> Self {
		Self {
			name: name.into(),
			revision: revision.into(),
			state,
			options: String::new(),
			tag_date: String::new(),
			directory: false,
		}
	}

	pub fn new_directory(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			revision: String::new(),
			state: LastKnownState::Dummy(String::new()),
			options: String::new(),
			tag_date: String::new(),
			directory: true,
		}
	}

	/// Added locally, not yet committed
	pub fn is_new_user_file(&self) -> bool {
		self.revision == NEW_FILE_REVISION
	}

	/// Scheduled for removal on the next commit
	pub fn is_user_file_to_be_removed(&self) -> bool {
		self.revision.starts_with('-')
	}

	pub fn is_binary(&self) -> bool {
		self.options == "-kb"
	}

	pub fn had_conflicts(&self) -> bool {
		matches!(self.state, LastKnownState::Conflicted(_))
	}

	/// Recorded modification time, if the entry carries a real one.
	pub fn last_modified(&self) -> Option<i64> {
		match self.state {
			LastKnownState::Clean(secs) => Some(secs),
			_ => None,
		}
	}

	pub fn conflict_time(&self) -> Option<i64> {
		match self.state {
			LastKnownState::Conflicted(time) => time,
			_ => None,
		}
	}

	pub fn sticky_tag(&self) -> Option<&str> {
		match self.tag_date.chars().next() {
			Some('T') | Some('N') => Some(&self.tag_date[1..]),
			_ => None,
		}
	}

	pub fn sticky_date(&self) -> Option<&str> {
		self.tag_date.strip_prefix('D')
	}

	/// Form sent in an `Entry` request.
	///
	/// The server never needs the local timestamp, so the column only
	/// carries the conflict state.
	pub fn to_wire(&self, conflict: WireConflict) -> String {
		let column = match conflict {
			WireConflict::None => "",
			WireConflict::Pending => "+=",
			WireConflict::Modified => "+modified",
		};
		format!("/{}/{}/{}/{}/{}", self.name, self.revision, column, self.options, self.tag_date)
	}
}

impl fmt::Display for Entry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.directory {
			return write!(f, "D/{}////", self.name);
		}
		write!(f, "/{}/{}/{}/{}/{}", self.name, self.revision, self.state, self.options, self.tag_date)
	}
}

impl FromStr for Entry {
	type Err = String;

	fn from_str(line: &str) -> Result<Self, Self::Err> {
		let line = line.trim_end_matches(['\r', '\n']);
		let (directory, body) = match line.strip_prefix('D') {
			Some(rest) => (true, rest),
			None => (false, line),
		};
		let body = body.strip_prefix('/').ok_or_else(|| format!("entry must start with '/': {}", line))?;
		let fields: Vec<&str> = body.splitn(5, '/').collect();
		if fields.len() < 5 || fields[0].is_empty() {
			return Err(format!("expected 5 fields in entry: {}", line));
		}
		let mut entry = if directory {
			Entry::new_directory(fields[0])
		} else {
			Entry::new(fields[0], fields[1], LastKnownState::parse(fields[2]))
		};
		entry.options = fields[3].to_string();
		entry.tag_date = fields[4].to_string();
		Ok(entry)
	}
}

/// Parse the asctime-style UTC dates used in `CVS/Entries`.
pub fn parse_asctime(text: &str) -> Option<i64> {
	let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
	if normalized.is_empty() {
		return None;
	}
	NaiveDateTime::parse_from_str(&normalized, "%a %b %d %H:%M:%S %Y")
		.ok()
		.map(|naive| Utc.from_utc_datetime(&naive).timestamp())
}

pub fn format_asctime(secs: i64) -> String {
	match Utc.timestamp_opt(secs, 0).single() {
		Some(time) => time.format(ASCTIME_FORMAT).to_string(),
		None => String::new(),
	}
}

/// Modification time truncated to whole seconds.
pub fn mtime_secs(meta: &Metadata) -> i64 {
	FileTime::from_last_modification_time(meta).unix_seconds()
}


// vim: ts=4
