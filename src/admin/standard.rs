//! `CVS/` directory layout
//!
//! Files kept per working directory:
//! - `Entries`: one [`Entry`] per line, plus pending changes in `Entries.Log`
//! - `Repository`: repository path, relative to the root when possible
//! - `Root`: the CVSROOT string the directory was checked out from
//! - `Tag`: sticky tag or date
//! - `Entries.Static`, `Template`: optional markers

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::entry::Entry;
use super::{AdminStore, ADMIN_DIR};
use crate::error::AdminError;
use crate::logging::*;

const ENTRIES: &str = "Entries";
const ENTRIES_LOG: &str = "Entries.Log";
const ENTRIES_STATIC: &str = "Entries.Static";
const REPOSITORY: &str = "Repository";
const ROOT: &str = "Root";
const TAG: &str = "Tag";
const TEMPLATE: &str = "Template";

#[derive(Debug, Default, Clone)]
pub struct StandardAdminStore;

impl StandardAdminStore {
	pub fn new() -> Self {
		Self
	}

	fn admin_file(dir: &Path, name: &str) -> PathBuf {
		dir.join(ADMIN_DIR).join(name)
	}

	fn file_parts(file: &Path) -> Result<(&Path, String), AdminError> {
		let dir = file.parent().unwrap_or_else(|| Path::new("."));
		let name = file
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.ok_or_else(|| AdminError::NotFound { path: file.to_path_buf() })?;
		Ok((dir, name))
	}

	fn read_optional(path: &Path) -> Result<Option<String>, AdminError> {
		match fs::read_to_string(path) {
			Ok(text) => Ok(Some(text)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(AdminError::io(path, e)),
		}
	}

	fn parse_lines(path: &Path, text: &str, mut apply: impl FnMut(Entry)) {
		for line in text.lines() {
			if line.is_empty() || line == "D" {
				continue;
			}
			match line.parse::<Entry>() {
				Ok(entry) => apply(entry),
				Err(e) => warn!("Skipping bad line in {}: {}", path.display(), e),
			}
		}
	}

	fn read_entries(dir: &Path) -> Result<Vec<Entry>, AdminError> {
		let mut entries: Vec<Entry> = Vec::new();
		let path = Self::admin_file(dir, ENTRIES);
		if let Some(text) = Self::read_optional(&path)? {
			Self::parse_lines(&path, &text, |entry| entries.push(entry));
		}

		// Pending changes appended as "A <entry>" / "R <entry>"
		let log_path = Self::admin_file(dir, ENTRIES_LOG);
		if let Some(text) = Self::read_optional(&log_path)? {
			for line in text.lines() {
				let (op, rest) = match line.split_once(' ') {
					Some(parts) => parts,
					None => continue,
				};
				Self::parse_lines(&log_path, rest, |entry| {
					entries.retain(|e| e.name != entry.name || e.directory != entry.directory);
					if op == "A" {
						entries.push(entry);
					}
				});
			}
		}
		Ok(entries)
	}

	fn write_entries(dir: &Path, entries: &[Entry]) -> Result<(), AdminError> {
		let admin_dir = dir.join(ADMIN_DIR);
		fs::create_dir_all(&admin_dir).map_err(|e| AdminError::io(&admin_dir, e))?;

		let path = admin_dir.join(ENTRIES);
		let mut temp = NamedTempFile::new_in(&admin_dir).map_err(|e| AdminError::io(&admin_dir, e))?;
		for entry in entries {
			writeln!(temp, "{}", entry).map_err(|e| AdminError::io(temp.path(), e))?;
		}
		temp.persist(&path).map_err(|e| AdminError::io(&path, e.error))?;

		let log_path = admin_dir.join(ENTRIES_LOG);
		match fs::remove_file(&log_path) {
			Err(e) if e.kind() != io::ErrorKind::NotFound => Err(AdminError::io(&log_path, e)),
			_ => Ok(()),
		}
	}

	fn write_admin_file(dir: &Path, name: &str, contents: &[u8]) -> Result<(), AdminError> {
		let path = Self::admin_file(dir, name);
		fs::write(&path, contents).map_err(|e| AdminError::io(&path, e))
	}

	fn remove_admin_file(dir: &Path, name: &str) -> Result<(), AdminError> {
		let path = Self::admin_file(dir, name);
		match fs::remove_file(&path) {
			Err(e) if e.kind() != io::ErrorKind::NotFound => Err(AdminError::io(&path, e)),
			_ => Ok(()),
		}
	}
}

impl AdminStore for StandardAdminStore {
	fn entry(&self, file: &Path) -> Result<Option<Entry>, AdminError> {
		let (dir, name) = Self::file_parts(file)?;
		Ok(Self::read_entries(dir)?.into_iter().find(|e| e.name == name))
	}

	fn set_entry(&mut self, file: &Path, entry: &Entry) -> Result<(), AdminError> {
		let (dir, _) = Self::file_parts(file)?;
		let mut entries = Self::read_entries(dir)?;
		match entries.iter_mut().find(|e| e.name == entry.name && e.directory == entry.directory) {
			Some(existing) => *existing = entry.clone(),
			None => entries.push(entry.clone()),
		}
		Self::write_entries(dir, &entries)
	}

	fn remove_entry(&mut self, file: &Path) -> Result<(), AdminError> {
		let (dir, name) = Self::file_parts(file)?;
		let mut entries = Self::read_entries(dir)?;
		let before = entries.len();
		entries.retain(|e| e.name != name);
		if entries.len() != before {
			Self::write_entries(dir, &entries)?;
		}
		Ok(())
	}

	fn entries(&self, dir: &Path) -> Result<Vec<Entry>, AdminError> {
		Self::read_entries(dir)
	}

	fn repository_for_directory(&self, dir: &Path, root_repository: &str) -> Result<Option<String>, AdminError> {
		if !dir.exists() {
			return Err(AdminError::NotFound { path: dir.to_path_buf() });
		}
		let path = Self::admin_file(dir, REPOSITORY);
		let text = match Self::read_optional(&path)? {
			Some(text) => text,
			None => return Ok(None),
		};
		let repository = text.trim_end();
		if repository.is_empty() {
			return Err(AdminError::Corrupted { path, line: text });
		}
		if repository.starts_with('/') {
			Ok(Some(repository.to_string()))
		} else {
			Ok(Some(format!("{}/{}", root_repository.trim_end_matches('/'), repository)))
		}
	}

	fn sticky_tag_for_directory(&self, dir: &Path) -> Result<Option<String>, AdminError> {
		let text = Self::read_optional(&Self::admin_file(dir, TAG))?;
		Ok(text.map(|t| t.trim_end().to_string()).filter(|t| !t.is_empty()))
	}

	fn exists(&self, path: &Path) -> bool {
		path.exists()
	}

	fn update_admin_data(&mut self, dir: &Path, repository: &str, root: &str) -> Result<(), AdminError> {
		let admin_dir = dir.join(ADMIN_DIR);
		let created = !admin_dir.exists();
		fs::create_dir_all(&admin_dir).map_err(|e| AdminError::io(&admin_dir, e))?;

		if !Self::admin_file(dir, ROOT).exists() {
			Self::write_admin_file(dir, ROOT, format!("{}\n", root).as_bytes())?;
		}
		if !Self::admin_file(dir, REPOSITORY).exists() {
			let root_path = match root.find('/') {
				Some(i) => &root[i..],
				None => root,
			};
			let relative = repository
				.strip_prefix(root_path.trim_end_matches('/'))
				.map(|rest| rest.trim_start_matches('/'))
				.filter(|rest| !rest.is_empty())
				.unwrap_or(repository);
			Self::write_admin_file(dir, REPOSITORY, format!("{}\n", relative).as_bytes())?;
		}
		if !Self::admin_file(dir, ENTRIES).exists() {
			Self::write_entries(dir, &[])?;
		}

		if created {
			if let (Some(parent), Some(name)) = (dir.parent(), dir.file_name()) {
				if Self::admin_file(parent, ENTRIES).exists() {
					let name = name.to_string_lossy();
					let mut entries = Self::read_entries(parent)?;
					if !entries.iter().any(|e| e.directory && e.name == name) {
						debug!("Registering {} in {}", name, parent.display());
						entries.push(Entry::new_directory(name.into_owned()));
						Self::write_entries(parent, &entries)?;
					}
				}
			}
		}
		Ok(())
	}

	fn set_sticky_tag(&mut self, dir: &Path, tag: Option<&str>) -> Result<(), AdminError> {
		match tag {
			Some(tag) => Self::write_admin_file(dir, TAG, format!("{}\n", tag).as_bytes()),
			None => Self::remove_admin_file(dir, TAG),
		}
	}

	fn set_static_directory(&mut self, dir: &Path, is_static: bool) -> Result<(), AdminError> {
		if is_static {
			Self::write_admin_file(dir, ENTRIES_STATIC, b"")
		} else {
			Self::remove_admin_file(dir, ENTRIES_STATIC)
		}
	}

	fn set_template(&mut self, dir: &Path, contents: Option<&[u8]>) -> Result<(), AdminError> {
		match contents {
			Some(contents) => Self::write_admin_file(dir, TEMPLATE, contents),
			None => Self::remove_admin_file(dir, TEMPLATE),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::admin::LastKnownState;
	use tempfile::TempDir;

	#[test]
	fn test_entries_roundtrip_and_remove() {
		let tmp = TempDir::new().unwrap();
		let mut store = StandardAdminStore::new();
		let file = tmp.path().join("a.txt");

		assert!(store.entries(tmp.path()).unwrap().is_empty());
		store.set_entry(&file, &Entry::new("a.txt", "1.1", LastKnownState::Clean(1036929600))).unwrap();
		store.set_entry(&file, &Entry::new("a.txt", "1.2", LastKnownState::Clean(1036929600))).unwrap();

		let entry = store.entry(&file).unwrap().unwrap();
		assert_eq!(entry.revision, "1.2");
		assert_eq!(store.all_files(tmp.path()).unwrap(), vec![file.clone()]);

		store.remove_entry(&file).unwrap();
		assert!(store.entry(&file).unwrap().is_none());
	}

	#[test]
	fn test_entries_log_is_applied() {
		let tmp = TempDir::new().unwrap();
		fs::create_dir(tmp.path().join(ADMIN_DIR)).unwrap();
		fs::write(tmp.path().join("CVS/Entries"), "/a.txt/1.1///\n/b.txt/1.1///\nD\n").unwrap();
		fs::write(tmp.path().join("CVS/Entries.Log"), "A /c.txt/0/dummy timestamp//\nR /a.txt/1.1///\n").unwrap();

		let store = StandardAdminStore::new();
		let names: Vec<String> = store.entries(tmp.path()).unwrap().into_iter().map(|e| e.name).collect();
		assert_eq!(names, vec!["b.txt", "c.txt"]);
	}

	#[test]
	fn test_repository_lookup() {
		let tmp = TempDir::new().unwrap();
		let store = StandardAdminStore::new();

		assert!(store.repository_for_directory(&tmp.path().join("gone"), "/cvsroot").unwrap_err().is_not_found());
		assert_eq!(store.repository_for_directory(tmp.path(), "/cvsroot").unwrap(), None);

		fs::create_dir(tmp.path().join(ADMIN_DIR)).unwrap();
		fs::write(tmp.path().join("CVS/Repository"), "module/sub\n").unwrap();
		assert_eq!(
			store.repository_for_directory(tmp.path(), "/cvsroot/").unwrap().as_deref(),
			Some("/cvsroot/module/sub")
		);
	}

	#[test]
	fn test_update_admin_data_registers_subdirectory() {
		let tmp = TempDir::new().unwrap();
		let mut store = StandardAdminStore::new();
		let root = ":ext:user@host:/cvsroot";

		store.update_admin_data(tmp.path(), "/cvsroot/module", root).unwrap();
		let sub = tmp.path().join("sub");
		store.update_admin_data(&sub, "/cvsroot/module/sub", root).unwrap();

		assert_eq!(fs::read_to_string(sub.join("CVS/Repository")).unwrap(), "module/sub\n");
		assert_eq!(fs::read_to_string(sub.join("CVS/Root")).unwrap(), format!("{}\n", root));
		let parent_entries = store.entries(tmp.path()).unwrap();
		assert_eq!(parent_entries, vec![Entry::new_directory("sub")]);
	}

	#[test]
	fn test_sticky_static_and_template() {
		let tmp = TempDir::new().unwrap();
		let mut store = StandardAdminStore::new();
		store.update_admin_data(tmp.path(), "/cvsroot/m", "/cvsroot").unwrap();

		store.set_sticky_tag(tmp.path(), Some("Tbranch")).unwrap();
		assert_eq!(store.sticky_tag_for_directory(tmp.path()).unwrap().as_deref(), Some("Tbranch"));
		store.set_sticky_tag(tmp.path(), None).unwrap();
		assert_eq!(store.sticky_tag_for_directory(tmp.path()).unwrap(), None);

		store.set_static_directory(tmp.path(), true).unwrap();
		assert!(tmp.path().join("CVS/Entries.Static").exists());
		store.set_static_directory(tmp.path(), false).unwrap();
		assert!(!tmp.path().join("CVS/Entries.Static").exists());

		store.set_template(tmp.path(), Some(b"CVS: template\n")).unwrap();
		assert!(tmp.path().join("CVS/Template").exists());
	}
}

// vim: ts=4
