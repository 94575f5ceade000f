//! State shared by response handlers
//!
//! Response handlers mutate the working copy through this context: the
//! metadata store, the file codec, the event channel, and what the server
//! told us about itself.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::admin::AdminStore;
use crate::callbacks::EventDispatcher;
use crate::error::ClientError;
use crate::file::FileHandler;

pub struct ResponseServices {
	/// Top of the working copy
	pub local_path: PathBuf,
	/// Repository root path on the server, e.g. `/cvsroot`
	pub repository: String,
	/// CVSROOT string recorded in `CVS/Root`
	pub root: String,
	pub admin: Box<dyn AdminStore>,
	pub files: FileHandler,
	pub events: EventDispatcher,
	valid_requests: BTreeSet<String>,
	wrappers: Vec<String>,
	warned_root_prefix: bool,
}

impl ResponseServices {
	pub fn new(
		local_path: impl Into<PathBuf>,
		repository: impl Into<String>,
		root: impl Into<String>,
		admin: Box<dyn AdminStore>,
	) -> Self {
		Self {
			local_path: local_path.into(),
			repository: repository.into(),
			root: root.into(),
			admin,
			files: FileHandler::new(),
			events: EventDispatcher::new(),
			valid_requests: BTreeSet::new(),
			wrappers: Vec::new(),
			warned_root_prefix: false,
		}
	}

	/// Record the request names listed in a `Valid-requests` response.
	pub fn set_valid_requests(&mut self, line: &str) {
		self.valid_requests = line.split_whitespace().map(str::to_string).collect();
	}

	/// False only if the server sent its list and `name` is missing from it.
	pub fn is_valid_request(&self, name: &str) -> bool {
		self.valid_requests.is_empty() || self.valid_requests.contains(name)
	}

	pub fn valid_requests(&self) -> impl Iterator<Item = &str> {
		self.valid_requests.iter().map(String::as_str)
	}

	pub fn add_wrapper(&mut self, wrapper: String) {
		self.wrappers.push(wrapper);
	}

	/// `Wrapper-rcsOption` lines received so far.
	pub fn wrappers(&self) -> &[String] {
		&self.wrappers
	}

	/// Local directory named by a response, relative to the working copy.
	pub fn local_directory(&self, local_directory: &str) -> PathBuf {
		let relative = local_directory.trim_start_matches("./").trim_start_matches('/');
		let relative = relative.trim_end_matches('/');
		if relative.is_empty() || relative == "." {
			self.local_path.clone()
		} else {
			self.local_path.join(relative)
		}
	}

	/// Local file named by a response: its directory plus the last segment
	/// of the repository path.
	pub fn convert_pathname(&self, local_directory: &str, repository_path: &str) -> PathBuf {
		let file_name = repository_path.rsplit('/').next().unwrap_or(repository_path);
		self.local_directory(local_directory).join(file_name)
	}

	/// Make the directory holding `repository_path` a working directory.
	///
	/// `repository_path` names a file; its directory part is recorded.
	pub fn update_admin_data(&mut self, local_directory: &str, repository_path: &str) -> Result<(), ClientError> {
		let root = self.repository.trim_end_matches('/');
		if !repository_path.starts_with(root) && !self.warned_root_prefix {
			self.warned_root_prefix = true;
			self.events.diagnostic(format!(
				"Repository path '{}' is outside the root '{}'; recording it as is",
				repository_path, self.repository
			));
		}
		let dir = self.local_directory(local_directory);
		let repository_dir = match repository_path.rfind('/') {
			Some(i) if i > 0 => &repository_path[..i],
			_ => repository_path,
		};
		self.admin.update_admin_data(&dir, repository_dir, &self.root)?;
		Ok(())
	}

	/// Guards against server-supplied paths escaping the working copy.
	pub fn is_within_working_copy(&self, path: &Path) -> bool {
		path.starts_with(&self.local_path) && !path.components().any(|c| c == Component::ParentDir)
	}
}


// vim: ts=4
