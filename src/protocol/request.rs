//! Requests sent from client to server
//!
//! Each [`Request`] knows its wire form, whether it carries a file
//! payload, whether it switches a stream transformation on, and whether
//! the server answers it. Requests without a reply are pipelined.

use std::fmt;
use std::path::{Path, PathBuf};

use super::response::ResponseKind;
use super::wire::{WireReader, WireWriter};
use crate::admin::{Entry, WireConflict};
use crate::file::mode::FileMode;

/// File attached to a request, sent right after the request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDetails {
	pub file: PathBuf,
	pub binary: bool,
}

/// Transformation of the byte stream switched on by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMutator {
	/// zlib compression at the given level
	Compression(u32),
}

impl StreamMutator {
	pub fn apply_output(&self, writer: &mut WireWriter) {
		match self {
			StreamMutator::Compression(level) => writer.enable_deflate(*level),
		}
	}

	pub fn apply_input(&self, reader: &mut WireReader) {
		match self {
			StreamMutator::Compression(_) => reader.enable_inflate(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
	/// Repository root announcement
	Root(String),
	UseUnchanged,
	/// Ask for the list of requests the server supports
	ValidRequests,
	/// Tell the server which responses this client handles
	ValidResponses,
	Directory { local: String, repository: String },
	Sticky(String),
	Entry { entry: Entry, conflict: WireConflict },
	Modified { file: PathBuf, binary: bool },
	Unchanged(String),
	Questionable(String),
	Argument(String),
	GlobalOption(String),
	/// User variable, `NAME=VALUE`
	Set(String),
	KeywordOption(String),
	GzipStream(u32),
	GzipFileContents(u32),
	ExpandModules,
	WrapperSendme,
	/// The command itself (`update`, `ci`, `status`, ...)
	Command(String),
}

impl Request {
	/// Name under which the server lists this request in `Valid-requests`.
	pub fn name(&self) -> &str {
		match self {
			Request::Root(_) => "Root",
			Request::UseUnchanged => "UseUnchanged",
			Request::ValidRequests => "valid-requests",
			Request::ValidResponses => "Valid-responses",
			Request::Directory { .. } => "Directory",
			Request::Sticky(_) => "Sticky",
			Request::Entry { .. } => "Entry",
			Request::Modified { .. } => "Modified",
			Request::Unchanged(_) => "Unchanged",
			Request::Questionable(_) => "Questionable",
			Request::Argument(_) => "Argument",
			Request::GlobalOption(_) => "Global_option",
			Request::Set(_) => "Set",
			Request::KeywordOption(_) => "Kopt",
			Request::GzipStream(_) => "Gzip-stream",
			Request::GzipFileContents(_) => "gzip-file-contents",
			Request::ExpandModules => "expand-modules",
			Request::WrapperSendme => "wrapper-sendme-rcsOptions",
			Request::Command(name) => name,
		}
	}

	/// Shorthand for an `Entry` request with no conflict to report.
	pub fn entry(entry: Entry) -> Self {
		Request::Entry { entry, conflict: WireConflict::None }
	}

	/// Wire form, including the trailing newline.
	pub fn serialize(&self) -> String {
		match self {
			Request::Root(root) => format!("Root {}\n", root),
			Request::UseUnchanged => "UseUnchanged\n".to_string(),
			Request::ValidRequests => "valid-requests\n".to_string(),
			Request::ValidResponses => {
				let names: Vec<&str> = ResponseKind::ALL.iter().map(|kind| kind.name()).collect();
				format!("Valid-responses {}\n", names.join(" "))
			}
			Request::Directory { local, repository } => format!("Directory {}\n{}\n", local, repository),
			Request::Sticky(tag) => format!("Sticky {}\n", tag),
			Request::Entry { entry, conflict } => format!("Entry {}\n", entry.to_wire(*conflict)),
			Request::Modified { file, .. } => {
				format!("Modified {}\n{}\n", file_name(file), FileMode::of_file(file))
			}
			Request::Unchanged(name) => format!("Unchanged {}\n", name),
			Request::Questionable(name) => format!("Questionable {}\n", name),
			Request::Argument(arg) => {
				let mut lines = arg.split('\n');
				let mut out = format!("Argument {}\n", lines.next().unwrap_or_default());
				for line in lines {
					out.push_str(&format!("Argumentx {}\n", line));
				}
				out
			}
			Request::GlobalOption(flag) => format!("Global_option {}\n", flag),
			Request::Set(assignment) => format!("Set {}\n", assignment),
			Request::KeywordOption(option) => format!("Kopt {}\n", option),
			Request::GzipStream(level) => format!("Gzip-stream {}\n", level),
			Request::GzipFileContents(level) => format!("gzip-file-contents {}\n", level),
			Request::ExpandModules | Request::WrapperSendme | Request::Command(_) => {
				format!("{}\n", self.name())
			}
		}
	}

	pub fn file_to_send(&self) -> Option<FileDetails> {
		match self {
			Request::Modified { file, binary } => Some(FileDetails { file: file.clone(), binary: *binary }),
			_ => None,
		}
	}

	pub fn output_mutator(&self) -> Option<StreamMutator> {
		match self {
			Request::GzipStream(level) => Some(StreamMutator::Compression(*level)),
			_ => None,
		}
	}

	pub fn input_mutator(&self) -> Option<StreamMutator> {
		match self {
			Request::GzipStream(level) => Some(StreamMutator::Compression(*level)),
			_ => None,
		}
	}

	pub fn expects_reply(&self) -> bool {
		matches!(
			self,
			Request::ValidRequests | Request::ExpandModules | Request::WrapperSendme | Request::Command(_)
		)
	}
}

impl fmt::Display for Request {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.serialize().trim_end())
	}
}

fn file_name(path: &Path) -> String {
	path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}


// vim: ts=4
