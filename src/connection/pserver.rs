//! Password-authenticated socket dialect (`:pserver:`)

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

use super::root::CvsRoot;
use super::Connection;
use crate::error::ConnectionError;
use crate::logging::*;
use crate::protocol::{BoxedReader, BoxedWriter};

pub const DEFAULT_PORT: u16 = 2401;

/// Substitution table of the pserver password scrambling. It is its own
/// inverse; bytes outside the printable range map to themselves.
#[rustfmt::skip]
const SHIFTS: [u8; 256] = [
	0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
	16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
	114, 120, 53, 79, 96, 109, 72, 108, 70, 64, 76, 67, 116, 74, 68, 87,
	111, 52, 75, 119, 49, 34, 82, 81, 95, 65, 112, 86, 118, 110, 122, 105,
	41, 57, 83, 43, 46, 102, 40, 89, 38, 103, 45, 50, 42, 123, 91, 35,
	125, 55, 54, 66, 124, 126, 59, 47, 92, 71, 115, 78, 88, 107, 106, 56,
	36, 121, 117, 104, 101, 100, 69, 73, 99, 63, 94, 93, 39, 37, 61, 48,
	58, 113, 32, 90, 44, 98, 60, 51, 33, 97, 62, 77, 84, 80, 85, 223,
	225, 216, 187, 166, 229, 189, 222, 188, 141, 249, 148, 200, 184, 136, 248, 190,
	199, 170, 181, 204, 138, 232, 218, 183, 255, 234, 220, 247, 213, 203, 226, 193,
	174, 172, 228, 252, 217, 201, 131, 230, 197, 211, 145, 238, 161, 179, 160, 212,
	207, 221, 254, 173, 202, 146, 224, 151, 140, 196, 205, 130, 135, 133, 143, 246,
	192, 159, 244, 239, 185, 168, 215, 144, 139, 165, 180, 157, 147, 186, 214, 176,
	227, 231, 219, 169, 175, 156, 206, 198, 129, 164, 150, 210, 154, 177, 134, 127,
	182, 128, 158, 208, 162, 132, 167, 209, 149, 241, 153, 251, 237, 236, 171, 195,
	243, 233, 253, 240, 194, 250, 191, 155, 142, 137, 245, 235, 163, 242, 178, 152,
];

/// Scrambled form of a password as sent in the auth block (and stored in `.cvspass`).
///
/// Works on raw bytes; non-ASCII passwords scramble to non-UTF-8 output.
pub fn scramble(password: &str) -> Vec<u8> {
	let mut out = Vec::with_capacity(password.len() + 1);
	out.push(b'A');
	out.extend(password.bytes().map(|b| SHIFTS[b as usize]));
	out
}

pub struct PServerConnection {
	root: CvsRoot,
	password: String,
	streams: Option<(BoxedReader, BoxedWriter)>,
	open: bool,
}

impl PServerConnection {
	/// `password` overrides the one embedded in the root.
	pub fn new(root: CvsRoot, password: Option<String>) -> Self {
		let password = password.or_else(|| root.password.clone()).unwrap_or_default();
		Self { root, password, streams: None, open: false }
	}

	fn auth_block(&self) -> Vec<u8> {
		let mut block = format!(
			"BEGIN AUTH REQUEST\n{}\n{}\n",
			self.root.repository,
			self.root.user.as_deref().unwrap_or("anonymous")
		)
		.into_bytes();
		block.extend_from_slice(&scramble(&self.password));
		block.extend_from_slice(b"\nEND AUTH REQUEST\n");
		block
	}
}

/// Read one `\n`-terminated line byte by byte, so nothing past the
/// authentication reply is consumed.
async fn read_auth_line(reader: &mut OwnedReadHalf) -> Result<Option<String>, ConnectionError> {
	let mut line = Vec::new();
	loop {
		match reader.read_u8().await {
			Ok(b'\n') => break,
			Ok(b) => line.push(b),
			Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
				if line.is_empty() {
					return Ok(None);
				}
				break;
			}
			Err(e) => return Err(e.into()),
		}
	}
	Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

#[async_trait]
impl Connection for PServerConnection {
	async fn open(&mut self) -> Result<(), ConnectionError> {
		let host = self.root.host.clone().ok_or_else(|| ConnectionError::InvalidRoot {
			root: self.root.to_string(),
			message: "pserver needs a host".to_string(),
		})?;
		let port = self.root.port.unwrap_or(DEFAULT_PORT);

		info!("Connecting to {}:{}", host, port);
		let stream = TcpStream::connect((host.as_str(), port))
			.await
			.map_err(|e| ConnectionError::ConnectFailed { host: host.clone(), port, source: e })?;
		let (mut reader, mut writer) = stream.into_split();

		writer.write_all(&self.auth_block()).await?;
		writer.flush().await?;

		let mut errors = Vec::new();
		loop {
			let line = match read_auth_line(&mut reader).await? {
				Some(line) => line,
				None => {
					let message = if errors.is_empty() {
						"connection closed during authentication".to_string()
					} else {
						errors.join("\n")
					};
					return Err(ConnectionError::Rejected { message });
				}
			};
			match line.as_str() {
				"I LOVE YOU" => break,
				"I HATE YOU" => {
					return Err(ConnectionError::Rejected {
						message: format!("authorization failed for {}", self.root),
					});
				}
				_ => {
					if let Some(text) = line.strip_prefix("E ") {
						errors.push(text.to_string());
					} else if let Some(text) = line.strip_prefix("error") {
						errors.push(text.trim().to_string());
						return Err(ConnectionError::Rejected { message: errors.join("\n") });
					} else {
						debug!("Ignoring authentication line: {}", line);
					}
				}
			}
		}

		info!("Authenticated as {}", self.root.user.as_deref().unwrap_or("anonymous"));
		self.streams = Some((Box::new(reader), Box::new(writer)));
		self.open = true;
		Ok(())
	}

	async fn close(&mut self) -> Result<(), ConnectionError> {
		if let Some((_, mut writer)) = self.streams.take() {
			let _ = writer.shutdown().await;
		}
		self.open = false;
		Ok(())
	}

	fn is_open(&self) -> bool {
		self.open
	}

	fn repository(&self) -> &str {
		&self.root.repository
	}

	fn take_streams(&mut self) -> Option<(BoxedReader, BoxedWriter)> {
		self.streams.take()
	}
}


// vim: ts=4
