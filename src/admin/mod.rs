//! Working-copy metadata
//!
//! The session engine only talks to metadata through [`AdminStore`], so it
//! never depends on how records are laid out on disk.
//! [`StandardAdminStore`] is the usual `CVS/` directory layout.

use std::path::{Path, PathBuf};

use crate::error::AdminError;

pub mod entry;
pub mod standard;

pub use entry::{Entry, LastKnownState, WireConflict};
pub use standard::StandardAdminStore;

/// Name of the per-directory administrative subdirectory
pub const ADMIN_DIR: &str = "CVS";

/// Per-directory record of versioned files.
pub trait AdminStore: Send {
	/// Entry for `file`, looked up in its parent directory.
	fn entry(&self, file: &Path) -> Result<Option<Entry>, AdminError>;

	/// Insert or replace the entry for `file`.
	fn set_entry(&mut self, file: &Path, entry: &Entry) -> Result<(), AdminError>;

	fn remove_entry(&mut self, file: &Path) -> Result<(), AdminError>;

	/// All entries of `dir`, in recorded order. Empty when `dir` is not a working directory.
	fn entries(&self, dir: &Path) -> Result<Vec<Entry>, AdminError>;

	/// Absolute repository path recorded for `dir`.
	///
	/// `Ok(None)` means the directory exists but has no record;
	/// [`AdminError::NotFound`] means the directory itself is gone.
	fn repository_for_directory(&self, dir: &Path, root_repository: &str) -> Result<Option<String>, AdminError>;

	/// Raw sticky spec of `dir` (`Tbranch`, `D2002.11.10.12.00.00`, ...).
	fn sticky_tag_for_directory(&self, dir: &Path) -> Result<Option<String>, AdminError>;

	fn exists(&self, path: &Path) -> bool;

	/// Paths of every file recorded in `dir`.
	fn all_files(&self, dir: &Path) -> Result<Vec<PathBuf>, AdminError> {
		Ok(self.entries(dir)?.into_iter().filter(|e| !e.directory).map(|e| dir.join(&e.name)).collect())
	}

	/// Make sure `dir` is a working directory mapped to `repository`.
	fn update_admin_data(&mut self, dir: &Path, repository: &str, root: &str) -> Result<(), AdminError>;

	fn set_sticky_tag(&mut self, dir: &Path, tag: Option<&str>) -> Result<(), AdminError>;

	fn set_static_directory(&mut self, dir: &Path, is_static: bool) -> Result<(), AdminError>;

	fn set_template(&mut self, dir: &Path, contents: Option<&[u8]>) -> Result<(), AdminError>;
}

// vim: ts=4
