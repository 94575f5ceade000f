//! Permission strings of the form `u=rwx,g=rx,o=r`

use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Owner/group/other permission bits (`rwx` = 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode {
	pub user: u32,
	pub group: u32,
	pub other: u32,
}

impl Default for FileMode {
	fn default() -> Self {
		Self { user: 6, group: 4, other: 4 }
	}
}

impl FileMode {
	#[cfg(unix)]
	pub fn from_metadata(meta: &Metadata) -> Self {
		use std::os::unix::fs::PermissionsExt;
		let mode = meta.permissions().mode();
		Self { user: (mode >> 6) & 7, group: (mode >> 3) & 7, other: mode & 7 }
	}

	#[cfg(not(unix))]
	pub fn from_metadata(meta: &Metadata) -> Self {
		if meta.permissions().readonly() {
			Self { user: 4, group: 4, other: 4 }
		} else {
			Self::default()
		}
	}

	/// Mode of `path`, or the default for a file that cannot be inspected.
	pub fn of_file(path: &Path) -> Self {
		fs::metadata(path).map(|meta| Self::from_metadata(&meta)).unwrap_or_default()
	}

	pub fn user_can_write(&self) -> bool {
		self.user & 2 != 0
	}

	#[cfg(unix)]
	pub fn apply(&self, path: &Path) -> io::Result<()> {
		use std::os::unix::fs::PermissionsExt;
		let bits = (self.user << 6) | (self.group << 3) | self.other;
		fs::set_permissions(path, fs::Permissions::from_mode(bits))
	}

	#[cfg(not(unix))]
	pub fn apply(&self, path: &Path) -> io::Result<()> {
		set_writable(path, self.user_can_write())
	}
}

fn bits_to_string(bits: u32) -> String {
	let mut s = String::new();
	if bits & 4 != 0 {
		s.push('r');
	}
	if bits & 2 != 0 {
		s.push('w');
	}
	if bits & 1 != 0 {
		s.push('x');
	}
	s
}

impl fmt::Display for FileMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"u={},g={},o={}",
			bits_to_string(self.user),
			bits_to_string(self.group),
			bits_to_string(self.other)
		)
	}
}

impl FromStr for FileMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let mut mode = FileMode { user: 0, group: 0, other: 0 };
		for part in s.trim().split(',').filter(|p| !p.is_empty()) {
			let (class, perms) = part.split_once('=').ok_or_else(|| format!("bad mode segment '{}'", part))?;
			let mut bits = 0;
			for c in perms.chars() {
				bits |= match c {
					'r' => 4,
					'w' => 2,
					'x' => 1,
					_ => return Err(format!("bad permission '{}' in '{}'", c, s)),
				};
			}
			match class {
				"u" => mode.user = bits,
				"g" => mode.group = bits,
				"o" => mode.other = bits,
				_ => return Err(format!("bad mode class '{}' in '{}'", class, s)),
			}
		}
		Ok(mode)
	}
}

/// Add or remove write permission.
///
/// Adding only grants it to the owner; removing takes it from everyone.
pub fn set_writable(path: &Path, writable: bool) -> io::Result<()> {
	let mut perms = fs::metadata(path)?.permissions();
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		let mode = perms.mode();
		perms.set_mode(if writable { mode | 0o200 } else { mode & !0o222 });
	}
	#[cfg(not(unix))]
	perms.set_readonly(!writable);
	fs::set_permissions(path, perms)
}

pub fn is_read_only(path: &Path) -> bool {
	fs::metadata(path).map(|m| m.permissions().readonly()).unwrap_or(false)
}


// vim: ts=4
