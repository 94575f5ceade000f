//! Shared helpers for integration tests
//!
//! A scripted transport replays canned server output in segments and
//! records everything the client writes, so tests can check what was on
//! the wire when each reply started being read.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use filetime::FileTime;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use cvsr::admin::entry::format_asctime;
use cvsr::connection::StreamConnection;
use cvsr::{AbortHandle, Session};

pub const REPOSITORY: &str = "/cvsroot";

/// Fixed modification time used for versioned files (Sun Nov 10 12:00:00 2002)
pub const CLEAN_TIME: i64 = 1036929600;

/// Server greeting answering `valid-requests`.
pub const VALID_REQUESTS: &str =
	"Valid-requests Root Valid-responses valid-requests Directory Entry Modified Unchanged Questionable Argument Argumentx Global_option UseUnchanged status update ci\nok\n";

// ============================================================================
// Scripted transport
// ============================================================================

#[derive(Default)]
struct Shared {
	written: Vec<u8>,
	/// Length of `written` when each segment started being read
	written_at_segment: Vec<usize>,
}

/// What the client sent, shared with the transport halves.
#[derive(Clone, Default)]
pub struct Transcript(Arc<Mutex<Shared>>);

impl Transcript {
	pub fn written(&self) -> Vec<u8> {
		self.0.lock().unwrap().written.clone()
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.written()).into_owned()
	}

	/// For every segment served so far, how many bytes the client had
	/// written when the first byte of it was handed out.
	pub fn written_at_segment(&self) -> Vec<usize> {
		self.0.lock().unwrap().written_at_segment.clone()
	}

	pub fn contains(&self, needle: &str) -> bool {
		self.text().contains(needle)
	}

	/// Offset just past the first occurrence of `needle` in the raw bytes.
	pub fn find_end(&self, needle: &[u8]) -> Option<usize> {
		let written = self.written();
		written.windows(needle.len()).position(|w| w == needle).map(|at| at + needle.len())
	}
}

/// What the transport does once every segment has been served.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
	Eof,
	/// Stay pending forever
	Hang,
	/// Fail the read with `ErrorKind::Interrupted`
	Interrupted,
}

/// Serves one segment per read cycle; never mixes two segments in one read.
pub struct ScriptedReader {
	segments: Vec<Vec<u8>>,
	current: usize,
	pos: usize,
	started: bool,
	end: ScriptEnd,
	transcript: Transcript,
}

impl AsyncRead for ScriptedReader {
	fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
		let this = &mut *self;
		while this.current < this.segments.len() && this.pos >= this.segments[this.current].len() {
			this.current += 1;
			this.pos = 0;
			this.started = false;
		}
		if this.current >= this.segments.len() {
			return match this.end {
				ScriptEnd::Eof => Poll::Ready(Ok(())),
				ScriptEnd::Hang => Poll::Pending,
				ScriptEnd::Interrupted => {
					Poll::Ready(Err(io::Error::new(io::ErrorKind::Interrupted, "interrupted by signal")))
				}
			};
		}

		if !this.started {
			this.started = true;
			let mut shared = this.transcript.0.lock().unwrap();
			let len = shared.written.len();
			shared.written_at_segment.push(len);
		}
		let segment = &this.segments[this.current];
		let n = buf.remaining().min(segment.len() - this.pos);
		buf.put_slice(&segment[this.pos..this.pos + n]);
		this.pos += n;
		Poll::Ready(Ok(()))
	}
}

/// Records writes; optionally aborts the session once a pattern shows up.
pub struct RecordingWriter {
	transcript: Transcript,
	abort_on: Option<(String, AbortHandle)>,
}

impl AsyncWrite for RecordingWriter {
	fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, data: &[u8]) -> Poll<io::Result<usize>> {
		let mut shared = self.transcript.0.lock().unwrap();
		shared.written.extend_from_slice(data);
		if let Some((pattern, abort)) = &self.abort_on {
			if String::from_utf8_lossy(&shared.written).contains(pattern.as_str()) {
				abort.abort();
			}
		}
		Poll::Ready(Ok(data.len()))
	}

	fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}

	fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
		Poll::Ready(Ok(()))
	}
}

/// Builder for a session over a scripted transport.
pub struct ScriptedServer {
	segments: Vec<Vec<u8>>,
	end: ScriptEnd,
	abort_on: Option<String>,
}

impl ScriptedServer {
	pub fn new() -> Self {
		Self { segments: Vec::new(), end: ScriptEnd::Eof, abort_on: None }
	}

	/// Server output for one reply cycle.
	pub fn reply(mut self, bytes: impl AsRef<[u8]>) -> Self {
		self.segments.push(bytes.as_ref().to_vec());
		self
	}

	pub fn hang_at_end(mut self) -> Self {
		self.end = ScriptEnd::Hang;
		self
	}

	pub fn interrupt_at_end(mut self) -> Self {
		self.end = ScriptEnd::Interrupted;
		self
	}

	/// Abort the session as soon as the client has written `pattern`.
	pub fn abort_when_written(mut self, pattern: &str) -> Self {
		self.abort_on = Some(pattern.to_string());
		self
	}

	pub fn session(self, local_path: &Path) -> (Session, Transcript) {
		let transcript = Transcript::default();
		let reader = ScriptedReader {
			segments: self.segments,
			current: 0,
			pos: 0,
			started: false,
			end: self.end,
			transcript: transcript.clone(),
		};
		let abort = AbortHandle::new();
		let writer = RecordingWriter {
			transcript: transcript.clone(),
			abort_on: self.abort_on.map(|pattern| (pattern, abort.clone())),
		};
		let connection = StreamConnection::new(REPOSITORY, Box::new(reader), Box::new(writer));
		let session = Session::new(Box::new(connection), local_path, REPOSITORY).with_abort_handle(abort);
		(session, transcript)
	}
}

// ============================================================================
// Working copy setup
// ============================================================================

/// Create `dir/CVS` mapped to `repository` (relative to the root) with the given entry lines.
pub fn working_dir(dir: &Path, repository: &str, entries: &[String]) {
	let admin = dir.join("CVS");
	fs::create_dir_all(&admin).unwrap();
	fs::write(admin.join("Root"), format!("{}\n", REPOSITORY)).unwrap();
	fs::write(admin.join("Repository"), format!("{}\n", repository)).unwrap();
	let mut text = String::new();
	for line in entries {
		text.push_str(line);
		text.push('\n');
	}
	fs::write(admin.join("Entries"), text).unwrap();
}

/// Entry line for a file checked out clean at `secs`.
pub fn clean_entry(name: &str, revision: &str, secs: i64) -> String {
	format!("/{}/{}/{}//", name, revision, format_asctime(secs))
}

pub fn create_file(path: &Path, content: &[u8]) {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).unwrap();
	}
	fs::write(path, content).unwrap();
}

pub fn set_mtime(path: &Path, secs: i64) {
	filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

/// A file whose mtime matches its entry.
pub fn clean_file(dir: &Path, name: &str, content: &[u8]) {
	let path = dir.join(name);
	create_file(&path, content);
	set_mtime(&path, CLEAN_TIME);
}
