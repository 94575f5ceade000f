//! File transfer codec
//!
//! Sending: a decimal length line followed by the raw bytes, streamed in
//! [`CHUNK_SIZE`] pieces. Text files go through a
//! [`TransmitTextPreprocessor`] first and the length covers the
//! transformed bytes. With gzip file contents enabled the payload is
//! gzip-compressed and the length line gets a `z` prefix.
//!
//! Receiving: the payload lands in a temporary file, is post-processed
//! into its destination, and then the staged modification time, the
//! server's permission string and the read-only policy are applied.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;

use crate::error::ClientError;
use crate::logging::*;
use crate::protocol::{ProtocolError, WireReader, WireWriter};

pub mod mode;
pub mod rcs_diff;
pub mod text;

use mode::FileMode;
pub use text::{
	IdentityPostprocessor, IdentityPreprocessor, LineEndingPostprocessor, LineEndingPreprocessor,
	RcsDiffPostprocessor, TransmitTextPreprocessor, WriteTextPostprocessor,
};

/// Size of the pieces a payload is streamed in
pub const CHUNK_SIZE: usize = 32768;

/// Parsed payload length line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLength {
	Plain(u64),
	/// `z<len>`: gzip-compressed payload of `len` bytes
	Gzipped(u64),
}

impl PayloadLength {
	pub fn parse(line: &str) -> Result<Self, ProtocolError> {
		let line = line.trim();
		let (gzipped, digits) = match line.strip_prefix('z') {
			Some(rest) => (true, rest),
			None => (false, line),
		};
		let len = digits
			.parse::<u64>()
			.map_err(|_| ProtocolError::malformed(format!("invalid payload length '{}'", line)))?;
		Ok(if gzipped { PayloadLength::Gzipped(len) } else { PayloadLength::Plain(len) })
	}

	pub fn len(&self) -> u64 {
		match self {
			PayloadLength::Plain(len) | PayloadLength::Gzipped(len) => *len,
		}
	}
}

/// How a received payload becomes the destination file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
	Text,
	Binary,
	RcsDiff,
}

pub struct FileHandler {
	transmit_text: Box<dyn TransmitTextPreprocessor>,
	write_text: Box<dyn WriteTextPostprocessor>,
	write_rcs_diff: Box<dyn WriteTextPostprocessor>,
	next_file_date: Option<i64>,
	read_only_checkout: bool,
	temp_dir: Option<PathBuf>,
	gzip_level: Option<u32>,
}

impl Default for FileHandler {
	fn default() -> Self {
		Self::new()
	}
}

impl FileHandler {
	pub fn new() -> Self {
		Self {
			transmit_text: Box::new(LineEndingPreprocessor),
			write_text: Box::new(LineEndingPostprocessor),
			write_rcs_diff: Box::new(RcsDiffPostprocessor),
			next_file_date: None,
			read_only_checkout: false,
			temp_dir: None,
			gzip_level: None,
		}
	}

	pub fn with_transmit_preprocessor(mut self, processor: Box<dyn TransmitTextPreprocessor>) -> Self {
		self.transmit_text = processor;
		self
	}

	pub fn with_text_postprocessor(mut self, processor: Box<dyn WriteTextPostprocessor>) -> Self {
		self.write_text = processor;
		self
	}

	pub fn with_rcs_diff_postprocessor(mut self, processor: Box<dyn WriteTextPostprocessor>) -> Self {
		self.write_rcs_diff = processor;
		self
	}

	/// Make every checked-out file read-only (`-r`, `$CVSREAD`).
	pub fn set_read_only_checkout(&mut self, read_only: bool) {
		self.read_only_checkout = read_only;
	}

	pub fn set_temp_dir(&mut self, dir: Option<PathBuf>) {
		self.temp_dir = dir;
	}

	/// Gzip outgoing payloads at `level`, or send them plain with `None`.
	pub fn set_gzip_file_contents(&mut self, level: Option<u32>) {
		self.gzip_level = level.filter(|l| *l > 0);
	}

	/// Stage the modification time of the next written file.
	pub fn set_next_file_date(&mut self, secs: i64) {
		self.next_file_date = Some(secs);
	}

	pub fn take_next_file_date(&mut self) -> Option<i64> {
		self.next_file_date.take()
	}

	fn temp_dir(&self) -> PathBuf {
		self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
	}

	fn temp_file(&self) -> Result<NamedTempFile, ClientError> {
		let dir = self.temp_dir();
		tempfile::Builder::new().prefix("cvsr").tempfile_in(&dir).map_err(|e| ClientError::local_io(dir, e))
	}

	// ========================================================================
	// Transmit
	// ========================================================================

	/// Send a text file, returning the number of payload bytes.
	pub async fn transmit_text_file(&self, file: &Path, writer: &mut WireWriter) -> Result<u64, ClientError> {
		let temp_dir = self.temp_dir();
		let prepared = self
			.transmit_text
			.preprocess(file, &temp_dir)
			.map_err(|e| ClientError::local_io(file, e))?;
		match prepared {
			Some(temp) => self.transmit(temp.path(), writer).await,
			None => self.transmit(file, writer).await,
		}
	}

	pub async fn transmit_binary_file(&self, file: &Path, writer: &mut WireWriter) -> Result<u64, ClientError> {
		self.transmit(file, writer).await
	}

	async fn transmit(&self, path: &Path, writer: &mut WireWriter) -> Result<u64, ClientError> {
		let io_err = |e| ClientError::local_io(path, e);
		let proto_err = |e: io::Error| ClientError::Protocol(ProtocolError::Io(e));

		if let Some(level) = self.gzip_level {
			let data = tokio::fs::read(path).await.map_err(io_err)?;
			let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
			encoder.write_all(&data).map_err(io_err)?;
			let compressed = encoder.finish().map_err(io_err)?;
			writer.write_line(&format!("z{}", compressed.len())).await.map_err(proto_err)?;
			for chunk in compressed.chunks(CHUNK_SIZE) {
				writer.write_all(chunk).await.map_err(proto_err)?;
			}
			trace!("Sent {} ({} bytes, {} compressed)", path.display(), data.len(), compressed.len());
			return Ok(compressed.len() as u64);
		}

		let mut file = tokio::fs::File::open(path).await.map_err(io_err)?;
		let len = file.metadata().await.map_err(io_err)?.len();
		writer.write_line(&len.to_string()).await.map_err(proto_err)?;

		let mut buf = vec![0u8; CHUNK_SIZE];
		let mut remaining = len;
		while remaining > 0 {
			let want = remaining.min(CHUNK_SIZE as u64) as usize;
			let n = file.read(&mut buf[..want]).await.map_err(io_err)?;
			if n == 0 {
				return Err(io_err(io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while sending")));
			}
			writer.write_all(&buf[..n]).await.map_err(proto_err)?;
			remaining -= n as u64;
		}
		trace!("Sent {} ({} bytes)", path.display(), len);
		Ok(len)
	}

	// ========================================================================
	// Receive
	// ========================================================================

	/// Read a payload announced by `length_line` and write it to `path`.
	///
	/// The whole payload is consumed even when the local write fails, so the
	/// stream stays in step with the server.
	pub async fn receive_file(
		&mut self,
		path: &Path,
		file_mode: Option<&str>,
		length_line: &str,
		write_mode: WriteMode,
		reader: &mut WireReader,
	) -> Result<(), ClientError> {
		let length = PayloadLength::parse(length_line)?;
		let mut temp = self.temp_file()?;

		let mut write_error = None;
		let mut remaining = length.len();
		while remaining > 0 {
			let want = remaining.min(CHUNK_SIZE as u64) as usize;
			let chunk = reader.read_chunk(want).await?;
			remaining -= chunk.len() as u64;
			if write_error.is_none() {
				write_error = temp.write_all(chunk).err();
			}
		}
		if let Some(e) = write_error {
			return Err(ClientError::local_io(temp.path(), e));
		}

		let server_read_only = file_mode.map(|m| !mode_allows_user_write(m)).unwrap_or(false);
		self.reset_read_only(path)?;
		self.write_destination(&mut temp, path, length, write_mode)?;

		if let Some(secs) = self.take_next_file_date() {
			if let Err(e) = filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)) {
				warn!("Cannot set modification time of {}: {}", path.display(), e);
			}
		}
		if let Some(text) = file_mode {
			match text.parse::<FileMode>() {
				Ok(parsed) => {
					if let Err(e) = parsed.apply(path) {
						debug!("Cannot apply mode to {}: {}", path.display(), e);
					}
				}
				Err(e) => debug!("Ignoring file mode of {}: {}", path.display(), e),
			}
		}
		if self.read_only_checkout || server_read_only {
			mode::set_writable(path, false).map_err(|e| ClientError::local_io(path, e))?;
		}
		trace!("Received {} ({:?}, {} bytes)", path.display(), write_mode, length.len());
		Ok(())
	}

	fn reset_read_only(&self, path: &Path) -> Result<(), ClientError> {
		if mode::is_read_only(path) {
			mode::set_writable(path, true).map_err(|e| ClientError::local_io(path, e))?;
		}
		Ok(())
	}

	fn write_destination(
		&self,
		temp: &mut NamedTempFile,
		path: &Path,
		length: PayloadLength,
		write_mode: WriteMode,
	) -> Result<(), ClientError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(|e| ClientError::local_io(parent, e))?;
		}
		let file = temp.as_file_mut();
		file.seek(SeekFrom::Start(0)).map_err(|e| ClientError::local_io(path, e))?;
		let mut payload: Box<dyn Read + '_> = match length {
			PayloadLength::Plain(_) => Box::new(file),
			PayloadLength::Gzipped(_) => Box::new(GzDecoder::new(file)),
		};
		let result = match write_mode {
			WriteMode::Text => self.write_text.copy_to_location(&mut payload, path),
			WriteMode::RcsDiff => self.write_rcs_diff.copy_to_location(&mut payload, path),
			WriteMode::Binary => IdentityPostprocessor.copy_to_location(&mut payload, path),
		};
		result.map_err(|e| ClientError::local_io(path, e))
	}

	// ========================================================================
	// Local file operations requested by the server
	// ========================================================================

	pub fn remove_local_file(&self, path: &Path) -> Result<(), ClientError> {
		if !path.exists() {
			return Ok(());
		}
		self.reset_read_only(path)?;
		fs::remove_file(path).map_err(|e| ClientError::local_io(path, e))
	}

	/// Copy `path` to `new_name` in the same directory.
	pub fn copy_local_file(&self, path: &Path, new_name: &str) -> Result<PathBuf, ClientError> {
		let target = path.with_file_name(new_name);
		if target.exists() {
			self.reset_read_only(&target)?;
		}
		fs::copy(path, &target).map_err(|e| ClientError::local_io(path, e))?;
		Ok(target)
	}
}

/// True unless the owner section of a `u=..,g=..,o=..` string lacks `w`.
fn mode_allows_user_write(mode: &str) -> bool {
	let first = mode.split(',').next().unwrap_or_default();
	match first.split_once('=') {
		Some((_, perms)) => perms.contains('w'),
		None => true,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::ByteCounter;
	use std::io::Cursor;
	use tempfile::TempDir;

	fn reader(data: Vec<u8>) -> WireReader {
		WireReader::new(Box::new(Cursor::new(data)), ByteCounter::new())
	}

	#[test]
	fn test_payload_length() {
		assert_eq!(PayloadLength::parse("42").unwrap(), PayloadLength::Plain(42));
		assert_eq!(PayloadLength::parse("z7").unwrap(), PayloadLength::Gzipped(7));
		assert!(PayloadLength::parse("x7").is_err());
	}

	#[test]
	fn test_mode_allows_user_write() {
		assert!(mode_allows_user_write("u=rw,g=r,o=r"));
		assert!(!mode_allows_user_write("u=r,g=r,o=r"));
		assert!(mode_allows_user_write(""));
	}

	#[tokio::test]
	async fn test_receive_applies_date_once() {
		let tmp = TempDir::new().unwrap();
		let mut handler = FileHandler::new();
		handler.set_temp_dir(Some(tmp.path().to_path_buf()));
		handler.set_next_file_date(1036929600);

		let dest = tmp.path().join("a.txt");
		let mut r = reader(b"hello\nsecond".to_vec());
		handler.receive_file(&dest, Some("u=rw,g=r,o=r"), "6", WriteMode::Text, &mut r).await.unwrap();
		assert_eq!(fs::read(&dest).unwrap(), b"hello\n");
		let meta = fs::metadata(&dest).unwrap();
		assert_eq!(FileTime::from_last_modification_time(&meta).unix_seconds(), 1036929600);
		assert_eq!(handler.take_next_file_date(), None);
	}

	#[tokio::test]
	async fn test_receive_gzipped_binary() {
		let tmp = TempDir::new().unwrap();
		let mut handler = FileHandler::new();
		handler.set_temp_dir(Some(tmp.path().to_path_buf()));

		let content = b"\x00\x01binary\r\n\xff".to_vec();
		let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(&content).unwrap();
		let compressed = encoder.finish().unwrap();

		let dest = tmp.path().join("sub/b.bin");
		let line = format!("z{}", compressed.len());
		let mut r = reader(compressed);
		handler.receive_file(&dest, None, &line, WriteMode::Binary, &mut r).await.unwrap();
		assert_eq!(fs::read(&dest).unwrap(), content);
	}

	#[tokio::test]
	async fn test_short_payload_leaves_destination_untouched() {
		let tmp = TempDir::new().unwrap();
		let mut handler = FileHandler::new();
		handler.set_temp_dir(Some(tmp.path().to_path_buf()));
		let dest = tmp.path().join("c.txt");

		let mut r = reader(b"abc".to_vec());
		let err = handler.receive_file(&dest, None, "10", WriteMode::Text, &mut r).await.unwrap_err();
		assert!(matches!(err, ClientError::Protocol(ProtocolError::UnexpectedEndOfFile { .. })));
		assert!(!dest.exists());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_read_only_checkout() {
		let tmp = TempDir::new().unwrap();
		let mut handler = FileHandler::new();
		handler.set_temp_dir(Some(tmp.path().to_path_buf()));
		handler.set_read_only_checkout(true);
		let dest = tmp.path().join("ro.txt");

		let mut r = reader(b"x\n".to_vec());
		handler.receive_file(&dest, Some("u=rw,g=r,o=r"), "2", WriteMode::Text, &mut r).await.unwrap();
		assert!(mode::is_read_only(&dest));

		// A second write must get past the read-only bit
		handler.set_read_only_checkout(false);
		let mut r = reader(b"y\n".to_vec());
		handler.receive_file(&dest, Some("u=rw,g=r,o=r"), "2", WriteMode::Text, &mut r).await.unwrap();
		assert_eq!(fs::read(&dest).unwrap(), b"y\n");
		assert!(!mode::is_read_only(&dest));
	}
}

// vim: ts=4
