//! Working copy traversal
//!
//! [`SyncPlanner`] walks local directories and appends the requests that
//! describe their state to the server: one `Directory` per visited
//! directory, then `Entry` plus `Modified`/`Unchanged` for known files and
//! `Questionable` for unknown ones.

use std::fs;
use std::path::{Path, PathBuf};

use crate::admin::{entry::mtime_secs, AdminStore, Entry, WireConflict, ADMIN_DIR};
use crate::callbacks::EventDispatcher;
use crate::error::ClientError;
use crate::exclusion::IgnoreFilter;
use crate::logging::*;
use crate::protocol::Request;
use crate::session::AbortHandle;

/// Decides whether a file travels as binary.
pub trait BinaryDetector: Send + Sync {
	fn is_binary(&self, file: &Path, entry: Option<&Entry>) -> bool;
}

/// Trusts the keyword options of the entry (`-kb`); unknown files are text.
pub struct EntryBinaryDetector;

impl BinaryDetector for EntryBinaryDetector {
	fn is_binary(&self, _file: &Path, entry: Option<&Entry>) -> bool {
		entry.map(Entry::is_binary).unwrap_or(false)
	}
}

#[derive(Debug, Clone, Copy)]
pub struct PlannerOptions {
	/// Descend into subdirectories
	pub recursive: bool,
	/// Send `Unchanged` for files whose mtime matches their entry
	pub check_file_time: bool,
}

impl Default for PlannerOptions {
	fn default() -> Self {
		Self { recursive: true, check_file_time: true }
	}
}

pub struct SyncPlanner<'a> {
	admin: &'a dyn AdminStore,
	ignore: &'a dyn IgnoreFilter,
	binary: &'a dyn BinaryDetector,
	local_path: &'a Path,
	repository: &'a str,
	options: PlannerOptions,
	events: Option<&'a EventDispatcher>,
	abort: Option<&'a AbortHandle>,
}

impl<'a> SyncPlanner<'a> {
	/// `repository` is the root repository path; directories without a
	/// recorded repository are mapped below it.
	pub fn new(
		admin: &'a dyn AdminStore,
		ignore: &'a dyn IgnoreFilter,
		local_path: &'a Path,
		repository: &'a str,
	) -> Self {
		Self {
			admin,
			ignore,
			binary: &EntryBinaryDetector,
			local_path,
			repository,
			options: PlannerOptions::default(),
			events: None,
			abort: None,
		}
	}

	pub fn with_options(mut self, options: PlannerOptions) -> Self {
		self.options = options;
		self
	}

	pub fn with_binary_detector(mut self, binary: &'a dyn BinaryDetector) -> Self {
		self.binary = binary;
		self
	}

	pub fn with_events(mut self, events: &'a EventDispatcher) -> Self {
		self.events = Some(events);
		self
	}

	pub fn with_abort(mut self, abort: &'a AbortHandle) -> Self {
		self.abort = Some(abort);
		self
	}

	/// Requests for `paths`, files first and directories after. With no
	/// paths the whole working copy is described.
	pub fn plan(&self, paths: &[PathBuf]) -> Result<Vec<Request>, ClientError> {
		let mut out = Vec::new();
		if paths.is_empty() {
			self.add_requests(self.local_path, &mut out)?;
			return Ok(out);
		}

		let (dirs, files): (Vec<&PathBuf>, Vec<&PathBuf>) = paths.iter().partition(|p| p.is_dir());
		for path in files.into_iter().chain(dirs) {
			self.add_requests(path, &mut out)?;
		}
		Ok(out)
	}

	pub fn add_requests(&self, path: &Path, out: &mut Vec<Request>) -> Result<(), ClientError> {
		if !path.exists() || path.is_file() {
			self.add_requests_for_file(path, out);
			Ok(())
		} else {
			self.add_requests_for_directory(path, out)
		}
	}

	fn diagnostic(&self, message: String) {
		match self.events {
			Some(events) => events.diagnostic(message),
			None => warn!("{}", message),
		}
	}

	fn add_requests_for_directory(&self, dir: &Path, out: &mut Vec<Request>) -> Result<(), ClientError> {
		if !self.admin.exists(dir) {
			return Ok(());
		}
		if self.abort.map(AbortHandle::is_aborted).unwrap_or(false) {
			return Err(ClientError::Aborted);
		}
		if is_symlink(dir) {
			self.diagnostic(format!("Not following symbolic link {}", dir.display()));
			return Ok(());
		}

		self.add_directory_request(dir, out);

		let mut local_files = list_directory(dir);
		let mut subdirectories = Vec::new();

		let entries = match self.admin.entries(dir) {
			Ok(entries) => entries,
			Err(e) => {
				self.diagnostic(format!("Cannot read entries of {}: {}", dir.display(), e));
				Vec::new()
			}
		};
		for entry in &entries {
			let file = dir.join(&entry.name);
			if is_symlink(&file) {
				self.diagnostic(format!("Not following symbolic link {}", file.display()));
			} else if entry.directory {
				if self.options.recursive {
					subdirectories.push(file.clone());
				}
			} else {
				self.send_entry_and_modified(entry, &file, out);
			}
			local_files.retain(|name| name != &entry.name);
		}

		// Without our own admin directory, pick up nested working copies
		if self.options.recursive && !dir.join(ADMIN_DIR).exists() {
			for name in &local_files {
				let child = dir.join(name);
				if child.is_dir() && child.join(ADMIN_DIR).exists() {
					subdirectories.push(child);
				}
			}
		}

		for name in &local_files {
			if !self.ignore.should_be_ignored(dir, name) {
				out.push(Request::Questionable(name.clone()));
			}
		}

		for subdirectory in subdirectories {
			if self.admin.exists(&subdirectory.join(ADMIN_DIR)) {
				self.add_requests_for_directory(&subdirectory, out)?;
			}
		}
		Ok(())
	}

	fn add_requests_for_file(&self, file: &Path, out: &mut Vec<Request>) {
		let dir = match file.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent,
			_ => Path::new("."),
		};
		self.add_directory_request(dir, out);

		match self.admin.entry(file) {
			Ok(Some(entry)) => self.send_entry_and_modified(&entry, file, out),
			Ok(None) if file.exists() => {
				// Named explicitly but not versioned
				out.push(Request::Modified { file: file.to_path_buf(), binary: self.binary.is_binary(file, None) });
			}
			Ok(None) => {}
			Err(e) => self.diagnostic(format!("Cannot read the entry of {}: {}", file.display(), e)),
		}
	}

	fn send_entry_and_modified(&self, entry: &Entry, file: &Path, out: &mut Vec<Request>) {
		let meta = fs::metadata(file).ok();
		// Added, then deleted before it was ever sent
		if meta.is_none() && entry.is_new_user_file() {
			return;
		}

		let had_conflicts = entry.had_conflicts();
		let conflict = if !had_conflicts {
			WireConflict::None
		} else if requires_conflict_resolution(entry, meta.as_ref()) {
			WireConflict::Pending
		} else {
			WireConflict::Modified
		};
		out.push(Request::Entry { entry: entry.clone(), conflict });

		let meta = match meta {
			Some(meta) if !entry.is_user_file_to_be_removed() => meta,
			_ => return,
		};

		if self.options.check_file_time && !had_conflicts {
			if let Some(recorded) = entry.last_modified() {
				if mtime_secs(&meta) == recorded {
					out.push(Request::Unchanged(entry.name.clone()));
					return;
				}
			}
		}

		out.push(Request::Modified { file: file.to_path_buf(), binary: self.binary.is_binary(file, Some(entry)) });
	}

	fn add_directory_request(&self, dir: &Path, out: &mut Vec<Request>) {
		if is_symlink(dir) {
			self.diagnostic(format!("Not following symbolic link {}", dir.display()));
			return;
		}

		let local = self.relative_to_local_path(dir);
		let repository = match self.admin.repository_for_directory(dir, self.repository) {
			Ok(Some(repository)) => repository,
			Ok(None) => self.guess_repository(dir),
			// Deleted by the user but still listed in the parent's entries
			Err(e) if e.is_not_found() => return,
			Err(e) => {
				self.diagnostic(format!("Cannot read the repository of {}: {}", local, e));
				return;
			}
		};
		out.push(Request::Directory { local, repository });

		match self.admin.sticky_tag_for_directory(dir) {
			Ok(Some(tag)) => out.push(Request::Sticky(tag)),
			Ok(None) => {}
			Err(e) if e.is_not_found() => {}
			Err(e) => self.diagnostic(format!("Cannot read the sticky tag of {}: {}", dir.display(), e)),
		}
	}

	/// Repository path for a directory with no record: the mapping of the
	/// nearest recorded ancestor inside the working copy plus the skipped
	/// segments, or the root when no ancestor has a record.
	fn guess_repository(&self, dir: &Path) -> String {
		let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
		let local = self.local_path.canonicalize().unwrap_or_else(|_| self.local_path.to_path_buf());
		let root = self.repository.trim_end_matches('/');
		if !dir.starts_with(&local) {
			return root.to_string();
		}

		for ancestor in dir.ancestors().skip(1) {
			if !ancestor.starts_with(&local) {
				break;
			}
			if let Ok(Some(base)) = self.admin.repository_for_directory(ancestor, self.repository) {
				let rest = dir.strip_prefix(ancestor).map(unix_style).unwrap_or_default();
				return format!("{}/{}", base.trim_end_matches('/'), rest);
			}
		}

		match dir.strip_prefix(&local) {
			Ok(rest) if rest.as_os_str().is_empty() => root.to_string(),
			Ok(rest) => format!("{}/{}", root, unix_style(rest)),
			Err(_) => root.to_string(),
		}
	}

	/// `dir` relative to the top of the working copy, `/`-separated, `.` for the top.
	pub fn relative_to_local_path(&self, path: &Path) -> String {
		let relative = match path.strip_prefix(self.local_path) {
			Ok(rest) => unix_style(rest),
			Err(_) => {
				let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
				let local = self.local_path.canonicalize().unwrap_or_else(|_| self.local_path.to_path_buf());
				match path.strip_prefix(&local) {
					Ok(rest) => unix_style(rest),
					Err(_) => unix_style(&path),
				}
			}
		};
		if relative.is_empty() {
			".".to_string()
		} else {
			relative
		}
	}
}

fn unix_style(path: &Path) -> String {
	path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}

/// Conflict markers are still unresolved if the file has not been touched
/// since the merge. Both times are compared in whole seconds.
fn requires_conflict_resolution(entry: &Entry, meta: Option<&fs::Metadata>) -> bool {
	match (entry.conflict_time(), meta) {
		(Some(merged), Some(meta)) => mtime_secs(meta) <= merged,
		_ => false,
	}
}

/// Names in `dir` other than the admin directory, sorted.
fn list_directory(dir: &Path) -> Vec<String> {
	let mut names: Vec<String> = match fs::read_dir(dir) {
		Ok(iter) => iter
			.filter_map(|e| e.ok())
			.map(|e| e.file_name().to_string_lossy().into_owned())
			.filter(|name| name != ADMIN_DIR)
			.collect(),
		Err(_) => Vec::new(),
	};
	names.sort();
	names
}

/// True when `path` resolves somewhere else than its parent-resolved
/// absolute location.
pub fn is_symlink(path: &Path) -> bool {
	let name = match path.file_name() {
		Some(name) => name,
		None => return false,
	};
	let parent = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	let candidate = match parent.canonicalize() {
		Ok(parent) => parent.join(name),
		Err(_) => return false,
	};
	match candidate.canonicalize() {
		Ok(resolved) => resolved != candidate,
		Err(_) => fs::symlink_metadata(&candidate).map(|m| m.file_type().is_symlink()).unwrap_or(false),
	}
}


// vim: ts=4
