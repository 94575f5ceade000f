//! Protocol session engine
//!
//! A [`Session`] owns one transport and drives request/response cycles
//! over it. Requests are written in order and pipelined; responses are
//! read only after a request that expects a reply.
//!
//! # Example Usage
//!
//! ```ignore
//! use cvsr::{BasicCommand, Config, Session};
//!
//! let mut session = Session::from_config(&config)?;
//! session.execute(&BasicCommand::new("update")).await?;
//! session.close().await?;
//! ```

mod abort;

pub use abort::AbortHandle;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::admin::{AdminStore, StandardAdminStore};
use crate::callbacks::{ClientCallbacks, ClientEvent, Progress};
use crate::command::BasicCommand;
use crate::config::{Config, GlobalOptions};
use crate::connection::{self, Connection};
use crate::error::{ClientError, ConnectionError};
use crate::exclusion::{DefaultIgnoreFilter, IgnoreFilter, NoIgnores};
use crate::file::{FileHandler, IdentityPostprocessor, IdentityPreprocessor};
use crate::logging::*;
use crate::planner::{BinaryDetector, EntryBinaryDetector, PlannerOptions, SyncPlanner};
use crate::protocol::{
	ByteCounter, ProtocolError, Request, ResponseKind, ResponseOutcome, ResponseServices, StreamMutator, WireReader,
	WireWriter,
};

/// How long opening a connection may take before it counts as failed
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Session {
	connection: Box<dyn Connection>,
	streams: Option<(WireReader, WireWriter)>,
	services: ResponseServices,
	global: GlobalOptions,
	ignore: Box<dyn IgnoreFilter>,
	binary: Box<dyn BinaryDetector>,
	abort: AbortHandle,
	sent: ByteCounter,
	received: ByteCounter,
	first_command: bool,
	initial_requests_sent: bool,
	probe_timeout: Duration,
}

impl Session {
	/// Session over `connection` for the working copy at `local_path`.
	///
	/// `root` is the CVSROOT string recorded in new `CVS/Root` files. Every
	/// unknown file is reported until an ignore filter is set.
	pub fn new(connection: Box<dyn Connection>, local_path: impl Into<PathBuf>, root: impl Into<String>) -> Self {
		let repository = connection.repository().to_string();
		Self {
			connection,
			streams: None,
			services: ResponseServices::new(local_path, repository, root, Box::new(StandardAdminStore::new())),
			global: GlobalOptions::default(),
			ignore: Box::new(NoIgnores),
			binary: Box::new(EntryBinaryDetector),
			abort: AbortHandle::new(),
			sent: ByteCounter::new(),
			received: ByteCounter::new(),
			first_command: true,
			initial_requests_sent: false,
			probe_timeout: DEFAULT_PROBE_TIMEOUT,
		}
	}

	/// Build a session from a validated configuration.
	pub fn from_config(config: &Config) -> Result<Self, ClientError> {
		config.validate()?;
		let root = config.root()?;
		let connection = connection::connect(&root, &config.connection);

		let mut files = FileHandler::new();
		if !config.files.normalize_line_endings {
			files = files
				.with_transmit_preprocessor(Box::new(IdentityPreprocessor))
				.with_text_postprocessor(Box::new(IdentityPostprocessor));
		}
		files.set_read_only_checkout(config.global.checked_out_files_read_only);
		files.set_temp_dir(config.global.temp_dir.clone());

		let mut session = Session::new(connection, config.local_path.clone(), root.to_string())
			.with_ignore_filter(Box::new(DefaultIgnoreFilter::new(&config.ignore)?))
			.with_global_options(config.global.clone())
			.with_probe_timeout(Duration::from_secs(config.connection.probe_timeout_secs));
		session.services.files = files;
		Ok(session)
	}

	pub fn with_admin_store(mut self, admin: Box<dyn AdminStore>) -> Self {
		self.services.admin = admin;
		self
	}

	pub fn with_ignore_filter(mut self, ignore: Box<dyn IgnoreFilter>) -> Self {
		self.ignore = ignore;
		self
	}

	pub fn with_binary_detector(mut self, binary: Box<dyn BinaryDetector>) -> Self {
		self.binary = binary;
		self
	}

	pub fn with_global_options(mut self, global: GlobalOptions) -> Self {
		self.services.files.set_read_only_checkout(global.checked_out_files_read_only);
		self.global = global;
		self
	}

	pub fn with_file_handler(mut self, files: FileHandler) -> Self {
		self.services.files = files;
		self
	}

	/// Share an abort handle created before the session.
	pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
		self.abort = abort;
		self
	}

	pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
		self.probe_timeout = timeout;
		self
	}

	pub fn add_listener(&mut self, listener: Arc<dyn ClientCallbacks>) {
		self.services.events.add_listener(listener);
	}

	/// Handle that can abort this session from another task.
	pub fn abort_handle(&self) -> AbortHandle {
		self.abort.clone()
	}

	pub fn abort(&self) {
		self.abort.abort();
	}

	pub fn is_aborted(&self) -> bool {
		self.abort.is_aborted()
	}

	pub fn local_path(&self) -> &Path {
		&self.services.local_path
	}

	/// Repository root path on the server
	pub fn repository(&self) -> &str {
		&self.services.repository
	}

	pub fn is_first_command(&self) -> bool {
		self.first_command
	}

	pub fn bytes_sent(&self) -> u64 {
		self.sent.get()
	}

	pub fn bytes_received(&self) -> u64 {
		self.received.get()
	}

	/// Counters shared with the transport, readable from other tasks.
	pub fn counters(&self) -> (ByteCounter, ByteCounter) {
		(self.sent.clone(), self.received.clone())
	}

	pub fn wrappers(&self) -> &[String] {
		self.services.wrappers()
	}

	pub fn valid_requests(&self) -> Vec<String> {
		self.services.valid_requests().map(str::to_string).collect()
	}

	pub fn services(&self) -> &ResponseServices {
		&self.services
	}

	pub fn services_mut(&mut self) -> &mut ResponseServices {
		&mut self.services
	}

	/// Planner over this session's working copy.
	pub fn planner(&self, options: PlannerOptions) -> SyncPlanner<'_> {
		SyncPlanner::new(&*self.services.admin, &*self.ignore, &self.services.local_path, &self.services.repository)
			.with_options(options)
			.with_binary_detector(&*self.binary)
			.with_events(&self.services.events)
			.with_abort(&self.abort)
	}

	/// Replace the transport. The old one is closed first.
	pub async fn set_connection(&mut self, connection: Box<dyn Connection>) -> Result<(), ClientError> {
		self.close().await?;
		self.services.repository = connection.repository().to_string();
		self.connection = connection;
		Ok(())
	}

	/// Open the transport if needed and take over its streams.
	///
	/// Opening races the probe timeout and the abort handle.
	pub async fn ensure_connection(&mut self) -> Result<(), ClientError> {
		if self.streams.is_some() && self.connection.is_open() {
			return Ok(());
		}

		if !self.connection.is_open() {
			let abort = self.abort.clone();
			let timeout = self.probe_timeout;
			let connection = &mut self.connection;
			tokio::select! {
				result = tokio::time::timeout(timeout, connection.open()) => match result {
					Ok(opened) => opened?,
					Err(_) => {
						warn!("No answer from the server within {:?}", timeout);
						return Err(ClientError::AuthenticationFailed(ConnectionError::Timeout));
					}
				},
				_ = abort.aborted() => return Err(ClientError::Aborted),
			}
		}

		let (reader, writer) =
			self.connection.take_streams().ok_or(ClientError::AuthenticationFailed(ConnectionError::NotOpen))?;
		self.sent.reset();
		self.received.reset();
		self.streams =
			Some((WireReader::new(reader, self.received.clone()), WireWriter::new(writer, self.sent.clone())));
		self.first_command = true;
		self.initial_requests_sent = false;
		self.services.files.set_gzip_file_contents(None);
		info!("Connected to {}", self.services.repository);
		Ok(())
	}

	/// Flush what is pending and close the transport.
	pub async fn close(&mut self) -> Result<(), ClientError> {
		if let Some((_, mut writer)) = self.streams.take() {
			if let Err(e) = writer.shutdown().await {
				debug!("Shutdown of the output failed: {}", e);
			}
		}
		if self.connection.is_open() {
			self.connection.close().await?;
		}
		self.first_command = true;
		self.initial_requests_sent = false;
		Ok(())
	}

	/// Send `requests` and read the replies of those that expect one.
	pub async fn process_requests(&mut self, requests: Vec<Request>) -> Result<(), ClientError> {
		if requests.is_empty() {
			return Err(ClientError::Unconfigured { message: "request list is empty".to_string() });
		}
		if self.abort.is_aborted() {
			return Err(ClientError::Aborted);
		}
		self.ensure_connection().await?;

		let mut filter_root = true;
		let mut queue = Vec::with_capacity(requests.len() + 8);
		if self.first_command {
			self.first_command = false;
			if !self.initial_requests_sent {
				queue.push(Request::Root(self.services.repository.clone()));
				queue.push(Request::UseUnchanged);
				queue.push(Request::ValidRequests);
				queue.push(Request::ValidResponses);
				self.initial_requests_sent = true;
				filter_root = false;
			}
			queue.extend(self.global.requests());
		}
		queue.extend(requests);

		let progress = self.services.events.has_listeners();
		let mut pending_files =
			queue.iter().filter_map(Request::file_to_send).filter(|details| details.file.exists()).count();
		if progress {
			self.services.events.fire(ClientEvent::Progress(Progress::RequestsCount(pending_files)));
		}

		let mut input_mutators: Vec<StreamMutator> = Vec::new();
		for request in queue {
			if self.abort.is_aborted() {
				return Err(ClientError::Aborted);
			}

			match &request {
				Request::Root(_) => {
					if filter_root {
						continue;
					}
					// Only the handshake's root goes out
					filter_root = true;
				}
				Request::GzipStream(_) | Request::GzipFileContents(_)
					if !self.services.is_valid_request(request.name()) =>
				{
					debug!("Server does not support {}, not compressing", request.name());
					continue;
				}
				_ => {}
			}

			let details = request.file_to_send();
			if let Some(details) = &details {
				if !details.file.exists() {
					debug!("Skipping {}: {} is gone", request.name(), details.file.display());
					continue;
				}
			}

			let (reader, writer) =
				self.streams.as_mut().ok_or(ClientError::AuthenticationFailed(ConnectionError::NotOpen))?;

			debug!("Request: {}", request);
			writer.write_all(request.serialize().as_bytes()).await.map_err(ProtocolError::from)?;

			if let Some(mutator) = request.output_mutator() {
				mutator.apply_output(writer);
			}
			if let Some(mutator) = request.input_mutator() {
				input_mutators.push(mutator);
			}
			if let Request::GzipFileContents(level) = &request {
				self.services.files.set_gzip_file_contents(Some(*level));
			}

			if let Some(details) = details {
				if progress {
					self.services.events.fire(ClientEvent::Progress(Progress::FileSending(details.file.clone())));
				}
				if details.binary {
					self.services.files.transmit_binary_file(&details.file, writer).await?;
				} else {
					self.services.files.transmit_text_file(&details.file, writer).await?;
				}
				pending_files = pending_files.saturating_sub(1);
				if progress && pending_files == 0 {
					self.services.events.fire(ClientEvent::Progress(Progress::RequestsSent));
				}
			}

			if request.expects_reply() {
				writer.flush().await.map_err(ProtocolError::from)?;
				for mutator in input_mutators.drain(..) {
					mutator.apply_input(reader);
				}
				read_responses(reader, &mut self.services, &self.abort).await?;
			}
		}

		if let Some((_, writer)) = self.streams.as_mut() {
			writer.flush().await.map_err(ProtocolError::from)?;
		}
		Ok(())
	}

	/// Run one command: describe the working copy, send, read the replies.
	pub async fn execute(&mut self, command: &BasicCommand) -> Result<(), ClientError> {
		self.abort.reset();
		let result = self.run(command).await;
		if let Err(e) = &result {
			if !e.is_aborted() {
				error!("{} failed: {}", command.name, e);
			}
		}
		self.services.events.fire(ClientEvent::Terminated { error: result.is_err() });
		result
	}

	async fn run(&mut self, command: &BasicCommand) -> Result<(), ClientError> {
		self.ensure_connection().await?;
		let requests = command.requests(self)?;
		self.process_requests(requests).await
	}
}

/// Read responses until a terminal one, the end of the stream, or an abort.
async fn read_responses(
	reader: &mut WireReader,
	services: &mut ResponseServices,
	abort: &AbortHandle,
) -> Result<(), ClientError> {
	loop {
		if abort.is_aborted() {
			return Err(ClientError::Aborted);
		}

		let token = tokio::select! {
			biased;
			_ = abort.aborted() => return Err(ClientError::Aborted),
			token = reader.read_token() => token,
		};
		let token = match token {
			Ok(Some(token)) => token,
			Ok(None) => {
				debug!("Server closed the stream");
				return Ok(());
			}
			Err(e) if e.is_interrupted() => {
				abort.abort();
				return Err(ClientError::Aborted);
			}
			Err(e) => return Err(e.into()),
		};

		debug!("Response: {}", token);
		let kind = ResponseKind::from_token(&token)?;
		match kind.process(reader, services).await? {
			ResponseOutcome::Continue => {}
			ResponseOutcome::Terminal => return Ok(()),
			ResponseOutcome::Failed(message) => return Err(ClientError::ServerError { message }),
		}
	}
}

// vim: ts=4
