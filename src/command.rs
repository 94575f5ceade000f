//! Generic command built on the working copy traversal

use std::path::PathBuf;

use crate::error::ClientError;
use crate::planner::PlannerOptions;
use crate::protocol::Request;
use crate::session::Session;

/// A command sent with the state of the named files (or the whole working
/// copy) followed by its options and file arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCommand {
	/// Request name, e.g. `update`, `ci`, `status`
	pub name: String,
	/// Sent as `Argument`s ahead of the file arguments
	pub options: Vec<String>,
	pub files: Vec<PathBuf>,
	pub recursive: bool,
}

impl BasicCommand {
	pub fn new(name: impl Into<String>) -> Self {
		Self { name: name.into(), options: Vec::new(), files: Vec::new(), recursive: true }
	}

	pub fn option(mut self, option: impl Into<String>) -> Self {
		self.options.push(option.into());
		self
	}

	pub fn file(mut self, file: impl Into<PathBuf>) -> Self {
		self.files.push(file.into());
		self
	}

	pub fn recursive(mut self, recursive: bool) -> Self {
		self.recursive = recursive;
		self
	}

	/// Requests for this command on `session`'s working copy.
	pub fn requests(&self, session: &Session) -> Result<Vec<Request>, ClientError> {
		let mut requests = Vec::new();
		if session.is_first_command() {
			requests.push(Request::Root(session.repository().to_string()));
		}

		let planner = session.planner(PlannerOptions { recursive: self.recursive, ..Default::default() });
		requests.extend(planner.plan(&self.files)?);

		if !self.recursive {
			requests.push(Request::Argument("-l".to_string()));
		}
		for option in &self.options {
			requests.push(Request::Argument(option.clone()));
		}
		for file in &self.files {
			requests.push(Request::Argument(planner.relative_to_local_path(file)));
		}

		let local_path = session.local_path();
		let repository = match session.services().admin.repository_for_directory(local_path, session.repository()) {
			Ok(Some(repository)) => repository,
			Ok(None) => session.repository().to_string(),
			Err(e) => return Err(e.into()),
		};
		requests.push(Request::Directory { local: ".".to_string(), repository });
		requests.push(Request::Command(self.name.clone()));
		Ok(requests)
	}
}


// vim: ts=4
