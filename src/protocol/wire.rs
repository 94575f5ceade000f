//! Byte-counted wire streams
//!
//! [`WireReader`] and [`WireWriter`] sit directly on the transport halves.
//! Both count the raw bytes that cross the transport and can switch on
//! zlib compression mid-stream when a `Gzip-stream` request asks for it.
//! The reader keeps its own buffer so that a response token, a line and
//! a length-prefixed payload can be pulled from the same stream without
//! losing read-ahead bytes.

use std::cmp;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::ProtocolError;

/// Reading half of a transport
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Writing half of a transport
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

const BUFFER_SIZE: usize = 32 * 1024;

/// Shared byte counter, readable from other tasks.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self) -> u64 {
		self.0.load(Ordering::Relaxed)
	}

	pub fn reset(&self) {
		self.0.store(0, Ordering::Relaxed);
	}

	fn add(&self, n: usize) {
		self.0.fetch_add(n as u64, Ordering::Relaxed);
	}
}

fn zlib_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> io::Error {
	io::Error::new(io::ErrorKind::InvalidData, e)
}

// ============================================================================
// Reader
// ============================================================================

struct Inflater {
	state: Decompress,
	raw: Box<[u8]>,
	raw_pos: usize,
	raw_len: usize,
	finished: bool,
}

impl Inflater {
	async fn fill(
		&mut self,
		inner: &mut BoxedReader,
		out: &mut [u8],
		counter: &ByteCounter,
	) -> io::Result<usize> {
		loop {
			if self.finished {
				return Ok(0);
			}
			if self.raw_pos < self.raw_len {
				let before_in = self.state.total_in();
				let before_out = self.state.total_out();
				let status = self
					.state
					.decompress(&self.raw[self.raw_pos..self.raw_len], out, FlushDecompress::None)
					.map_err(zlib_error)?;
				let consumed = (self.state.total_in() - before_in) as usize;
				let produced = (self.state.total_out() - before_out) as usize;
				self.raw_pos += consumed;
				if status == Status::StreamEnd {
					self.finished = true;
				}
				if produced > 0 {
					return Ok(produced);
				}
				if consumed > 0 {
					continue;
				}
			}

			// Need more compressed input
			if self.raw_pos > 0 {
				self.raw.copy_within(self.raw_pos..self.raw_len, 0);
				self.raw_len -= self.raw_pos;
				self.raw_pos = 0;
			}
			if self.raw_len == self.raw.len() {
				return Err(io::Error::new(
					io::ErrorKind::InvalidData,
					"compressed stream made no progress",
				));
			}
			let n = inner.read(&mut self.raw[self.raw_len..]).await?;
			counter.add(n);
			if n == 0 {
				return Ok(0);
			}
			self.raw_len += n;
		}
	}
}

/// Buffered, byte-counted reader over the transport's input side.
pub struct WireReader {
	inner: BoxedReader,
	buf: Box<[u8]>,
	pos: usize,
	len: usize,
	inflate: Option<Inflater>,
	counter: ByteCounter,
	/// The last token was ended by a newline, so it has no payload line
	line_ended: bool,
}

impl WireReader {
	pub fn new(inner: BoxedReader, counter: ByteCounter) -> Self {
		Self {
			inner,
			buf: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
			pos: 0,
			len: 0,
			inflate: None,
			counter,
			line_ended: false,
		}
	}

	pub fn counter(&self) -> &ByteCounter {
		&self.counter
	}

	pub fn is_compressed(&self) -> bool {
		self.inflate.is_some()
	}

	/// Decompress everything read from now on.
	///
	/// Bytes already buffered but not yet consumed are treated as the start
	/// of the compressed stream.
	pub fn enable_inflate(&mut self) {
		if self.inflate.is_some() {
			return;
		}
		let mut raw = vec![0u8; BUFFER_SIZE].into_boxed_slice();
		let leftover = self.len - self.pos;
		raw[..leftover].copy_from_slice(&self.buf[self.pos..self.len]);
		self.pos = 0;
		self.len = 0;
		self.inflate = Some(Inflater {
			state: Decompress::new(true),
			raw,
			raw_pos: 0,
			raw_len: leftover,
			finished: false,
		});
	}

	async fn fill(&mut self) -> io::Result<bool> {
		if self.pos < self.len {
			return Ok(true);
		}
		self.pos = 0;
		self.len = 0;
		let n = match self.inflate.as_mut() {
			None => {
				let n = self.inner.read(&mut self.buf).await?;
				self.counter.add(n);
				n
			}
			Some(inflater) => inflater.fill(&mut self.inner, &mut self.buf, &self.counter).await?,
		};
		self.len = n;
		Ok(n > 0)
	}

	pub async fn read_byte(&mut self) -> io::Result<Option<u8>> {
		if !self.fill().await? {
			return Ok(None);
		}
		let byte = self.buf[self.pos];
		self.pos += 1;
		Ok(Some(byte))
	}

	/// Read a response name up to the first space or newline.
	///
	/// Returns `None` if the stream ends before any byte of a new token.
	pub async fn read_token(&mut self) -> Result<Option<String>, ProtocolError> {
		let mut token = Vec::new();
		loop {
			match self.read_byte().await? {
				None if token.is_empty() => return Ok(None),
				None => {
					return Err(ProtocolError::eof(format!(
						"response name '{}'",
						String::from_utf8_lossy(&token)
					)))
				}
				Some(b' ') => {
					self.line_ended = false;
					break;
				}
				Some(b'\n') => {
					self.line_ended = true;
					break;
				}
				Some(b) => token.push(b),
			}
		}
		Ok(Some(String::from_utf8_lossy(&token).into_owned()))
	}

	/// Rest of the line a token started: empty when the token ended it.
	pub async fn read_token_line(&mut self) -> Result<String, ProtocolError> {
		if self.line_ended {
			self.line_ended = false;
			return Ok(String::new());
		}
		self.read_line().await
	}

	/// Read one newline-terminated line, without the newline.
	pub async fn read_line(&mut self) -> Result<String, ProtocolError> {
		let mut line = Vec::new();
		loop {
			if !self.fill().await? {
				return Err(ProtocolError::eof("response line"));
			}
			let avail = &self.buf[self.pos..self.len];
			if let Some(i) = avail.iter().position(|&b| b == b'\n') {
				line.extend_from_slice(&avail[..i]);
				self.pos += i + 1;
				break;
			}
			line.extend_from_slice(avail);
			self.pos = self.len;
		}
		Ok(String::from_utf8_lossy(&line).into_owned())
	}

	/// Borrow up to `max` buffered bytes of a payload.
	pub async fn read_chunk(&mut self, max: usize) -> Result<&[u8], ProtocolError> {
		if !self.fill().await? {
			return Err(ProtocolError::eof("file payload"));
		}
		let n = cmp::min(max, self.len - self.pos);
		let start = self.pos;
		self.pos += n;
		Ok(&self.buf[start..start + n])
	}

	/// Read exactly `len` bytes into memory.
	pub async fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
		let mut data = Vec::with_capacity(len);
		while data.len() < len {
			let chunk = self.read_chunk(len - data.len()).await?;
			data.extend_from_slice(chunk);
		}
		Ok(data)
	}
}

// ============================================================================
// Writer
// ============================================================================

/// Byte-counted writer over the transport's output side.
pub struct WireWriter {
	inner: BoxedWriter,
	deflate: Option<Compress>,
	out: Vec<u8>,
	counter: ByteCounter,
}

impl WireWriter {
	pub fn new(inner: BoxedWriter, counter: ByteCounter) -> Self {
		Self { inner, deflate: None, out: Vec::with_capacity(BUFFER_SIZE), counter }
	}

	pub fn counter(&self) -> &ByteCounter {
		&self.counter
	}

	pub fn is_compressed(&self) -> bool {
		self.deflate.is_some()
	}

	/// Compress everything written from now on.
	pub fn enable_deflate(&mut self, level: u32) {
		if self.deflate.is_none() {
			self.deflate = Some(Compress::new(Compression::new(level.min(9)), true));
		}
	}

	pub async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
		match self.deflate.as_mut() {
			None => {
				self.inner.write_all(data).await?;
				self.counter.add(data.len());
			}
			Some(deflate) => {
				let mut input = data;
				while !input.is_empty() {
					self.out.clear();
					let before = deflate.total_in();
					deflate
						.compress_vec(input, &mut self.out, FlushCompress::None)
						.map_err(zlib_error)?;
					let consumed = (deflate.total_in() - before) as usize;
					input = &input[consumed..];
					if !self.out.is_empty() {
						self.inner.write_all(&self.out).await?;
						self.counter.add(self.out.len());
					}
				}
			}
		}
		Ok(())
	}

	pub async fn write_line(&mut self, line: &str) -> io::Result<()> {
		self.write_all(line.as_bytes()).await?;
		self.write_all(b"\n").await
	}

	/// Push everything written so far to the peer.
	pub async fn flush(&mut self) -> io::Result<()> {
		if let Some(deflate) = self.deflate.as_mut() {
			loop {
				self.out.clear();
				deflate.compress_vec(&[], &mut self.out, FlushCompress::Sync).map_err(zlib_error)?;
				let n = self.out.len();
				if n > 0 {
					self.inner.write_all(&self.out).await?;
					self.counter.add(n);
				}
				if n < self.out.capacity() {
					break;
				}
			}
		}
		self.inner.flush().await
	}

	pub async fn shutdown(&mut self) -> io::Result<()> {
		self.flush().await?;
		self.inner.shutdown().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	fn reader(data: &[u8]) -> WireReader {
		WireReader::new(Box::new(Cursor::new(data.to_vec())), ByteCounter::new())
	}

	#[tokio::test]
	async fn test_read_token_and_line() {
		let mut r = reader(b"M hello world\nok\n");
		assert_eq!(r.read_token().await.unwrap().as_deref(), Some("M"));
		assert_eq!(r.read_line().await.unwrap(), "hello world");
		assert_eq!(r.read_token().await.unwrap().as_deref(), Some("ok"));
		assert_eq!(r.read_token().await.unwrap(), None);
		assert_eq!(r.counter().get(), 17);
	}

	#[tokio::test]
	async fn test_bare_token_has_empty_line() {
		let mut r = reader(b"error\nM next\n");
		assert_eq!(r.read_token().await.unwrap().as_deref(), Some("error"));
		assert_eq!(r.read_token_line().await.unwrap(), "");
		assert_eq!(r.read_token().await.unwrap().as_deref(), Some("M"));
		assert_eq!(r.read_token_line().await.unwrap(), "next");
	}

	#[tokio::test]
	async fn test_eof_inside_token_is_error() {
		let mut r = reader(b"Updat");
		match r.read_token().await {
			Err(ProtocolError::UnexpectedEndOfFile { .. }) => {}
			other => panic!("expected UnexpectedEndOfFile, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_short_payload_is_error() {
		let mut r = reader(b"abc");
		assert!(matches!(r.read_exact_vec(10).await, Err(ProtocolError::UnexpectedEndOfFile { .. })));
	}

	#[tokio::test]
	async fn test_deflate_then_inflate() {
		let (client, server) = tokio::io::duplex(256 * 1024);
		let mut writer = WireWriter::new(Box::new(client), ByteCounter::new());
		let mut reader = WireReader::new(Box::new(server), ByteCounter::new());

		writer.write_line("plain").await.unwrap();
		writer.flush().await.unwrap();
		assert_eq!(reader.read_line().await.unwrap(), "plain");

		writer.enable_deflate(6);
		let payload = "compressed line\n".repeat(500);
		writer.write_all(payload.as_bytes()).await.unwrap();
		writer.write_line("ok").await.unwrap();
		writer.flush().await.unwrap();
		assert!(writer.counter().get() < payload.len() as u64);

		reader.enable_inflate();
		let data = reader.read_exact_vec(payload.len()).await.unwrap();
		assert_eq!(data, payload.as_bytes());
		assert_eq!(reader.read_token().await.unwrap().as_deref(), Some("ok"));
	}
}

// vim: ts=4
