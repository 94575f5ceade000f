//! Pluggable text transforms around file transfers
//!
//! Text travels over the wire with `\n` line endings. A
//! [`TransmitTextPreprocessor`] prepares a local file for sending, and a
//! [`WriteTextPostprocessor`] turns a received payload into the final
//! local file.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::rcs_diff;

/// Line separator of this platform
pub const LINE_SEPARATOR: &[u8] = if cfg!(windows) { b"\r\n" } else { b"\n" };

pub trait TransmitTextPreprocessor: Send + Sync {
	/// Transformed copy of `source` placed in `temp_dir`, or `None` to send
	/// the file as it is.
	fn preprocess(&self, source: &Path, temp_dir: &Path) -> io::Result<Option<NamedTempFile>>;
}

pub trait WriteTextPostprocessor: Send + Sync {
	/// Write `payload` (already decompressed) to `destination`.
	fn copy_to_location(&self, payload: &mut dyn Read, destination: &Path) -> io::Result<()>;
}

/// Sends files verbatim
pub struct IdentityPreprocessor;

impl TransmitTextPreprocessor for IdentityPreprocessor {
	fn preprocess(&self, _source: &Path, _temp_dir: &Path) -> io::Result<Option<NamedTempFile>> {
		Ok(None)
	}
}

/// Turns every `\r\n` into `\n`
pub struct LineEndingPreprocessor;

impl TransmitTextPreprocessor for LineEndingPreprocessor {
	fn preprocess(&self, source: &Path, temp_dir: &Path) -> io::Result<Option<NamedTempFile>> {
		let data = fs::read(source)?;
		if !data.contains(&b'\r') {
			return Ok(None);
		}
		let mut out = Vec::with_capacity(data.len());
		let mut iter = data.iter().peekable();
		while let Some(&b) = iter.next() {
			if b == b'\r' && iter.peek() == Some(&&b'\n') {
				continue;
			}
			out.push(b);
		}
		let mut temp = NamedTempFile::new_in(temp_dir)?;
		temp.write_all(&out)?;
		temp.flush()?;
		Ok(Some(temp))
	}
}

/// Writes payloads verbatim
pub struct IdentityPostprocessor;

impl WriteTextPostprocessor for IdentityPostprocessor {
	fn copy_to_location(&self, payload: &mut dyn Read, destination: &Path) -> io::Result<()> {
		let mut file = fs::File::create(destination)?;
		io::copy(payload, &mut file)?;
		file.flush()
	}
}

pub fn to_platform_line_endings(data: &[u8]) -> Vec<u8> {
	if LINE_SEPARATOR == b"\n" {
		return data.to_vec();
	}
	let mut out = Vec::with_capacity(data.len() + data.len() / 16);
	for &b in data {
		if b == b'\n' {
			out.extend_from_slice(LINE_SEPARATOR);
		} else {
			out.push(b);
		}
	}
	out
}

/// Restores the platform line separator
pub struct LineEndingPostprocessor;

impl WriteTextPostprocessor for LineEndingPostprocessor {
	fn copy_to_location(&self, payload: &mut dyn Read, destination: &Path) -> io::Result<()> {
		let mut data = Vec::new();
		payload.read_to_end(&mut data)?;
		fs::write(destination, to_platform_line_endings(&data))
	}
}

/// Merges an RCS diff into the existing destination file
pub struct RcsDiffPostprocessor;

impl WriteTextPostprocessor for RcsDiffPostprocessor {
	fn copy_to_location(&self, payload: &mut dyn Read, destination: &Path) -> io::Result<()> {
		let mut diff = Vec::new();
		payload.read_to_end(&mut diff)?;
		let original: Vec<u8> = fs::read(destination)?.into_iter().filter(|&b| b != b'\r').collect();
		let patched =
			rcs_diff::apply(&original, &diff).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
		fs::write(destination, to_platform_line_endings(&patched))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn test_line_ending_preprocessor() {
		let tmp = TempDir::new().unwrap();
		let source = tmp.path().join("mixed.txt");
		fs::write(&source, b"a\r\nb\nc\r\n").unwrap();

		let temp = LineEndingPreprocessor.preprocess(&source, tmp.path()).unwrap().unwrap();
		assert_eq!(fs::read(temp.path()).unwrap(), b"a\nb\nc\n");

		fs::write(&source, b"clean\n").unwrap();
		assert!(LineEndingPreprocessor.preprocess(&source, tmp.path()).unwrap().is_none());
	}

	#[test]
	fn test_rcs_diff_postprocessor() {
		let tmp = TempDir::new().unwrap();
		let dest = tmp.path().join("f.txt");
		fs::write(&dest, b"one\ntwo\n").unwrap();

		let mut diff: &[u8] = b"a2 1\nthree\n";
		RcsDiffPostprocessor.copy_to_location(&mut diff, &dest).unwrap();
		assert_eq!(fs::read(&dest).unwrap(), to_platform_line_endings(b"one\ntwo\nthree\n"));
	}
}

// vim: ts=4
