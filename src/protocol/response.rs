//! Responses sent from server to client
//!
//! Dispatch is a closed enum: the name token read off the wire maps to a
//! [`ResponseKind`] or fails with [`ProtocolError::UnknownResponse`].
//! Every kind listed here is announced in `Valid-responses`.
//!
//! Most file responses start with the same two lines:
//!
//! ```text
//! <local directory>/
//! <repository path of the file>
//! ```

use chrono::DateTime;

use super::error::ProtocolError;
use super::services::ResponseServices;
use super::wire::WireReader;
use crate::admin::entry::mtime_secs;
use crate::admin::{Entry, LastKnownState};
use crate::callbacks::{ClientEvent, FileChange};
use crate::error::ClientError;
use crate::file::{PayloadLength, WriteMode};
use crate::logging::*;

/// What the read loop does after a response was processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
	Continue,
	/// `ok`: the reply to the current request is complete
	Terminal,
	/// `error`: the command failed on the server
	Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
	Ok,
	Error,
	Message,
	ErrorMessage,
	TaggedMessage,
	BinaryMessage,
	Flush,
	ValidRequests,
	CheckedIn,
	NewEntry,
	Updated,
	Created,
	UpdateExisting,
	Merged,
	RcsDiff,
	ModTime,
	Mode,
	Checksum,
	CopyFile,
	Removed,
	RemoveEntry,
	SetStaticDirectory,
	ClearStaticDirectory,
	SetSticky,
	ClearSticky,
	Template,
	ClearTemplate,
	Notified,
	ModuleExpansion,
	WrapperRcsOption,
	SetCheckinProg,
	SetUpdateProg,
}

impl ResponseKind {
	pub const ALL: [ResponseKind; 32] = [
		ResponseKind::Ok,
		ResponseKind::Error,
		ResponseKind::Message,
		ResponseKind::ErrorMessage,
		ResponseKind::TaggedMessage,
		ResponseKind::BinaryMessage,
		ResponseKind::Flush,
		ResponseKind::ValidRequests,
		ResponseKind::CheckedIn,
		ResponseKind::NewEntry,
		ResponseKind::Updated,
		ResponseKind::Created,
		ResponseKind::UpdateExisting,
		ResponseKind::Merged,
		ResponseKind::RcsDiff,
		ResponseKind::ModTime,
		ResponseKind::Mode,
		ResponseKind::Checksum,
		ResponseKind::CopyFile,
		ResponseKind::Removed,
		ResponseKind::RemoveEntry,
		ResponseKind::SetStaticDirectory,
		ResponseKind::ClearStaticDirectory,
		ResponseKind::SetSticky,
		ResponseKind::ClearSticky,
		ResponseKind::Template,
		ResponseKind::ClearTemplate,
		ResponseKind::Notified,
		ResponseKind::ModuleExpansion,
		ResponseKind::WrapperRcsOption,
		ResponseKind::SetCheckinProg,
		ResponseKind::SetUpdateProg,
	];

	pub fn name(&self) -> &'static str {
		match self {
			ResponseKind::Ok => "ok",
			ResponseKind::Error => "error",
			ResponseKind::Message => "M",
			ResponseKind::ErrorMessage => "E",
			ResponseKind::TaggedMessage => "MT",
			ResponseKind::BinaryMessage => "Mbinary",
			ResponseKind::Flush => "F",
			ResponseKind::ValidRequests => "Valid-requests",
			ResponseKind::CheckedIn => "Checked-in",
			ResponseKind::NewEntry => "New-entry",
			ResponseKind::Updated => "Updated",
			ResponseKind::Created => "Created",
			ResponseKind::UpdateExisting => "Update-existing",
			ResponseKind::Merged => "Merged",
			ResponseKind::RcsDiff => "Rcs-diff",
			ResponseKind::ModTime => "Mod-time",
			ResponseKind::Mode => "Mode",
			ResponseKind::Checksum => "Checksum",
			ResponseKind::CopyFile => "Copy-file",
			ResponseKind::Removed => "Removed",
			ResponseKind::RemoveEntry => "Remove-entry",
			ResponseKind::SetStaticDirectory => "Set-static-directory",
			ResponseKind::ClearStaticDirectory => "Clear-static-directory",
			ResponseKind::SetSticky => "Set-sticky",
			ResponseKind::ClearSticky => "Clear-sticky",
			ResponseKind::Template => "Template",
			ResponseKind::ClearTemplate => "Clear-template",
			ResponseKind::Notified => "Notified",
			ResponseKind::ModuleExpansion => "Module-expansion",
			ResponseKind::WrapperRcsOption => "Wrapper-rcsOption",
			ResponseKind::SetCheckinProg => "Set-checkin-prog",
			ResponseKind::SetUpdateProg => "Set-update-prog",
		}
	}

	pub fn from_token(token: &str) -> Result<Self, ProtocolError> {
		ResponseKind::ALL
			.iter()
			.copied()
			.find(|kind| kind.name() == token)
			.ok_or_else(|| ProtocolError::UnknownResponse(token.to_string()))
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, ResponseKind::Ok | ResponseKind::Error)
	}

	/// Consume this response's payload and apply its effects.
	pub async fn process(
		self,
		reader: &mut WireReader,
		services: &mut ResponseServices,
	) -> Result<ResponseOutcome, ClientError> {
		match self {
			ResponseKind::Ok => return Ok(ResponseOutcome::Terminal),
			ResponseKind::Error => {
				let line = reader.read_token_line().await?;
				return Ok(ResponseOutcome::Failed(error_message(&line)));
			}
			ResponseKind::Message | ResponseKind::ErrorMessage => {
				let line = reader.read_token_line().await?;
				services.events.message(line, self == ResponseKind::ErrorMessage, None);
			}
			ResponseKind::TaggedMessage => {
				let line = reader.read_token_line().await?;
				let (tag, text) = line.split_once(' ').unwrap_or((line.as_str(), ""));
				services.events.message(text, false, Some(tag.to_string()));
			}
			ResponseKind::BinaryMessage => {
				let length = PayloadLength::parse(&reader.read_line().await?)?;
				let data = reader.read_exact_vec(length.len() as usize).await?;
				services.events.message(String::from_utf8_lossy(&data), false, None);
			}
			ResponseKind::Flush => {}
			ResponseKind::ValidRequests => {
				let line = reader.read_line().await?;
				services.set_valid_requests(&line);
			}
			ResponseKind::CheckedIn | ResponseKind::NewEntry => {
				let (local_dir, repository) = read_location(reader).await?;
				let entry_line = reader.read_line().await?;
				let path = checked_path(services, &local_dir, &repository)?;
				let mut entry = parse_entry(&entry_line)?;
				entry.state = if self == ResponseKind::NewEntry {
					LastKnownState::Dummy("dummy timestamp from new-entry".to_string())
				} else {
					match std::fs::metadata(&path) {
						Ok(meta) => LastKnownState::Clean(mtime_secs(&meta)),
						Err(_) => LastKnownState::Dummy("dummy timestamp".to_string()),
					}
				};
				record_entry(services, &local_dir, &repository, &path, &entry);
				if self == ResponseKind::CheckedIn {
					services.events.file_written(&path, FileChange::CheckedIn);
				}
			}
			ResponseKind::Updated
			| ResponseKind::Created
			| ResponseKind::UpdateExisting
			| ResponseKind::Merged
			| ResponseKind::RcsDiff => {
				let (local_dir, repository) = read_location(reader).await?;
				let entry_line = reader.read_line().await?;
				let mode = reader.read_line().await?;
				let length_line = reader.read_line().await?;
				let path = checked_path(services, &local_dir, &repository)?;
				let mut entry = parse_entry(&entry_line)?;

				let write_mode = if self == ResponseKind::RcsDiff {
					WriteMode::RcsDiff
				} else if entry.is_binary() {
					WriteMode::Binary
				} else {
					WriteMode::Text
				};
				services.files.receive_file(&path, Some(&mode), &length_line, write_mode, reader).await?;

				let mtime = std::fs::metadata(&path).map(|m| mtime_secs(&m)).map_err(|e| ClientError::local_io(&path, e))?;
				let server_conflict = matches!(&entry.state, LastKnownState::Dummy(text) if text.starts_with('+'));
				entry.state = if server_conflict {
					LastKnownState::Conflicted(Some(mtime))
				} else if self == ResponseKind::Merged {
					LastKnownState::Merged
				} else {
					LastKnownState::Clean(mtime)
				};
				record_entry(services, &local_dir, &repository, &path, &entry);

				let change = match self {
					ResponseKind::Merged => FileChange::Merged,
					ResponseKind::RcsDiff => FileChange::Patched,
					_ => FileChange::Updated,
				};
				services.events.file_written(&path, change);
			}
			ResponseKind::ModTime => {
				let line = reader.read_line().await?;
				match parse_mod_time(&line) {
					Some(secs) => services.files.set_next_file_date(secs),
					None => services.events.diagnostic(format!("Ignoring unparsable Mod-time '{}'", line)),
				}
			}
			ResponseKind::Mode | ResponseKind::Checksum => {
				let line = reader.read_line().await?;
				debug!("{} {} (ignored)", self.name(), line);
			}
			ResponseKind::CopyFile => {
				let (local_dir, repository) = read_location(reader).await?;
				let new_name = reader.read_line().await?;
				let path = checked_path(services, &local_dir, &repository)?;
				if new_name.contains('/') {
					return Err(ProtocolError::malformed(format!("Copy-file target '{}' is not a file name", new_name)).into());
				}
				if let Err(e) = services.files.copy_local_file(&path, &new_name) {
					services.events.diagnostic(e.to_string());
				}
			}
			ResponseKind::Removed | ResponseKind::RemoveEntry => {
				let (local_dir, repository) = read_location(reader).await?;
				let path = checked_path(services, &local_dir, &repository)?;
				if self == ResponseKind::Removed {
					services.files.remove_local_file(&path)?;
				}
				if let Err(e) = services.admin.remove_entry(&path) {
					services.events.diagnostic(e.to_string());
				}
				if self == ResponseKind::Removed {
					services.events.file_written(&path, FileChange::Removed);
				}
			}
			ResponseKind::SetStaticDirectory | ResponseKind::ClearStaticDirectory => {
				let (local_dir, _) = read_location(reader).await?;
				let dir = checked_directory(services, &local_dir)?;
				let is_static = self == ResponseKind::SetStaticDirectory;
				if let Err(e) = services.admin.set_static_directory(&dir, is_static) {
					services.events.diagnostic(e.to_string());
				}
			}
			ResponseKind::SetSticky | ResponseKind::ClearSticky => {
				let (local_dir, _) = read_location(reader).await?;
				let tag = match self {
					ResponseKind::SetSticky => Some(reader.read_line().await?),
					_ => None,
				};
				let dir = checked_directory(services, &local_dir)?;
				if let Err(e) = services.admin.set_sticky_tag(&dir, tag.as_deref()) {
					services.events.diagnostic(e.to_string());
				}
			}
			ResponseKind::Template => {
				let (local_dir, _) = read_location(reader).await?;
				let length = PayloadLength::parse(&reader.read_line().await?)?;
				let data = reader.read_exact_vec(length.len() as usize).await?;
				let dir = checked_directory(services, &local_dir)?;
				let data = crate::file::text::to_platform_line_endings(&data);
				if let Err(e) = services.admin.set_template(&dir, Some(&data)) {
					services.events.diagnostic(e.to_string());
				}
			}
			ResponseKind::ClearTemplate => {
				let (local_dir, _) = read_location(reader).await?;
				let dir = checked_directory(services, &local_dir)?;
				if let Err(e) = services.admin.set_template(&dir, None) {
					services.events.diagnostic(e.to_string());
				}
			}
			ResponseKind::Notified => {
				let (local_dir, repository) = read_location(reader).await?;
				debug!("Notified {}{}", local_dir, repository);
			}
			ResponseKind::ModuleExpansion => {
				let name = reader.read_line().await?;
				services.events.fire(ClientEvent::ModuleExpansion { name });
			}
			ResponseKind::WrapperRcsOption => {
				let line = reader.read_line().await?;
				services.add_wrapper(line);
			}
			ResponseKind::SetCheckinProg | ResponseKind::SetUpdateProg => {
				let dir = reader.read_line().await?;
				let prog = reader.read_line().await?;
				debug!("{} {} {} (ignored)", self.name(), dir, prog);
			}
		}
		Ok(ResponseOutcome::Continue)
	}
}

async fn read_location(reader: &mut WireReader) -> Result<(String, String), ProtocolError> {
	let local_dir = reader.read_line().await?;
	let repository = reader.read_line().await?;
	Ok((local_dir, repository))
}

fn checked_path(
	services: &ResponseServices,
	local_dir: &str,
	repository: &str,
) -> Result<std::path::PathBuf, ClientError> {
	let path = services.convert_pathname(local_dir, repository);
	if !services.is_within_working_copy(&path) {
		return Err(ProtocolError::malformed(format!("path '{}' leaves the working copy", path.display())).into());
	}
	Ok(path)
}

fn checked_directory(services: &ResponseServices, local_dir: &str) -> Result<std::path::PathBuf, ClientError> {
	let dir = services.local_directory(local_dir);
	if !services.is_within_working_copy(&dir) {
		return Err(ProtocolError::malformed(format!("directory '{}' leaves the working copy", dir.display())).into());
	}
	Ok(dir)
}

fn parse_entry(line: &str) -> Result<Entry, ProtocolError> {
	line.parse::<Entry>().map_err(ProtocolError::malformed)
}

/// Store `entry` after making sure its directory is a working directory.
/// Failures here only cost the metadata touch-up, so they are reported
/// and skipped.
fn record_entry(
	services: &mut ResponseServices,
	local_dir: &str,
	repository: &str,
	path: &std::path::Path,
	entry: &Entry,
) {
	let result = services
		.update_admin_data(local_dir, repository)
		.and_then(|_| services.admin.set_entry(path, entry).map_err(ClientError::from));
	if let Err(e) = result {
		services.events.diagnostic(format!("Cannot record entry for {}: {}", path.display(), e));
	}
}

/// Message of an `error` response: `error <errno-code> <text>`.
fn error_message(line: &str) -> String {
	let text = match line.split_once(' ') {
		Some((code, rest)) if code.is_empty() || code.chars().all(|c| c.is_ascii_digit()) => rest,
		_ => line,
	};
	let text = text.trim();
	if text.is_empty() {
		"server reported an error".to_string()
	} else {
		text.to_string()
	}
}

/// `Mod-time` dates, e.g. `10 Nov 2002 12:00:00 -0000`.
fn parse_mod_time(text: &str) -> Option<i64> {
	let text = text.trim();
	DateTime::parse_from_str(text, "%d %b %Y %H:%M:%S %z")
		.or_else(|_| DateTime::parse_from_rfc2822(text))
		.ok()
		.map(|time| time.timestamp())
}


// vim: ts=4
