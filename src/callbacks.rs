//! Callback traits for events raised during a session
//!
//! Response handlers and the planner never print anything themselves.
//! They raise a [`ClientEvent`] on the session's [`EventDispatcher`],
//! which hands it to every registered [`ClientCallbacks`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::logging::*;

// Type aliases to reduce complexity
type FileWrittenFn = dyn Fn(&Path, FileChange) + Send + Sync;
type MessageFn = dyn Fn(&ServerMessage) + Send + Sync;
type ProgressFn = dyn Fn(&Progress) + Send + Sync;
type DiagnosticFn = dyn Fn(&str) + Send + Sync;
type TerminatedFn = dyn Fn(bool) + Send + Sync;

/// How a local file was touched by a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChange {
	Updated,
	Merged,
	Patched,
	CheckedIn,
	Removed,
}

/// Text sent by the server through `M`, `E`, `MT` or `Mbinary`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
	pub text: String,
	/// Came through the error channel (`E`)
	pub error: bool,
	/// Tag of an `MT` message (`text`, `fname`, `newline`, `+updated`, ...)
	pub tag: Option<String>,
}

/// Progress of file transmission inside one request cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
	/// Number of file payloads about to be sent
	RequestsCount(usize),
	FileSending(PathBuf),
	/// Every file payload has been sent
	RequestsSent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
	FileWritten { path: PathBuf, change: FileChange },
	Message(ServerMessage),
	Progress(Progress),
	ModuleExpansion { name: String },
	Diagnostic { message: String },
	Terminated { error: bool },
}

/// Combined callback handler for all events
pub trait ClientCallbacks: Send + Sync {
	/// Entry point used by the dispatcher. Forwards to the specific methods.
	fn on_event(&self, event: &ClientEvent) {
		match event {
			ClientEvent::FileWritten { path, change } => self.on_file_written(path, *change),
			ClientEvent::Message(message) => self.on_message(message),
			ClientEvent::Progress(progress) => self.on_progress(progress),
			ClientEvent::ModuleExpansion { name } => self.on_module_expansion(name),
			ClientEvent::Diagnostic { message } => self.on_diagnostic(message),
			ClientEvent::Terminated { error } => self.on_terminated(*error),
		}
	}

	fn on_file_written(&self, _path: &Path, _change: FileChange) {}

	fn on_message(&self, _message: &ServerMessage) {}

	fn on_progress(&self, _progress: &Progress) {}

	fn on_module_expansion(&self, _name: &str) {}

	/// Called on non-fatal problems (unreadable metadata, skipped symlinks, ...)
	fn on_diagnostic(&self, _message: &str) {}

	fn on_terminated(&self, _error: bool) {}
}

/// Default callback implementation that does nothing
pub struct NoCallbacks;

impl ClientCallbacks for NoCallbacks {}

/// Builder for callbacks using function closures
#[derive(Default)]
pub struct CallbackBuilder {
	file_written: Option<Box<FileWrittenFn>>,
	message: Option<Box<MessageFn>>,
	progress: Option<Box<ProgressFn>>,
	diagnostic: Option<Box<DiagnosticFn>>,
	terminated: Option<Box<TerminatedFn>>,
}

impl CallbackBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_file_written<F>(mut self, callback: F) -> Self
	where
		F: Fn(&Path, FileChange) + Send + Sync + 'static,
	{
		self.file_written = Some(Box::new(callback));
		self
	}

	pub fn on_message<F>(mut self, callback: F) -> Self
	where
		F: Fn(&ServerMessage) + Send + Sync + 'static,
	{
		self.message = Some(Box::new(callback));
		self
	}

	pub fn on_progress<F>(mut self, callback: F) -> Self
	where
		F: Fn(&Progress) + Send + Sync + 'static,
	{
		self.progress = Some(Box::new(callback));
		self
	}

	pub fn on_diagnostic<F>(mut self, callback: F) -> Self
	where
		F: Fn(&str) + Send + Sync + 'static,
	{
		self.diagnostic = Some(Box::new(callback));
		self
	}

	pub fn on_terminated<F>(mut self, callback: F) -> Self
	where
		F: Fn(bool) + Send + Sync + 'static,
	{
		self.terminated = Some(Box::new(callback));
		self
	}

	pub fn build(self) -> Arc<dyn ClientCallbacks> {
		Arc::new(CompositeCallbacks {
			file_written: self.file_written,
			message: self.message,
			progress: self.progress,
			diagnostic: self.diagnostic,
			terminated: self.terminated,
		})
	}
}

/// Internal composite callbacks implementation
struct CompositeCallbacks {
	file_written: Option<Box<FileWrittenFn>>,
	message: Option<Box<MessageFn>>,
	progress: Option<Box<ProgressFn>>,
	diagnostic: Option<Box<DiagnosticFn>>,
	terminated: Option<Box<TerminatedFn>>,
}

impl ClientCallbacks for CompositeCallbacks {
	fn on_file_written(&self, path: &Path, change: FileChange) {
		if let Some(ref callback) = self.file_written {
			callback(path, change);
		}
	}

	fn on_message(&self, message: &ServerMessage) {
		if let Some(ref callback) = self.message {
			callback(message);
		}
	}

	fn on_progress(&self, progress: &Progress) {
		if let Some(ref callback) = self.progress {
			callback(progress);
		}
	}

	fn on_diagnostic(&self, message: &str) {
		if let Some(ref callback) = self.diagnostic {
			callback(message);
		}
	}

	fn on_terminated(&self, error: bool) {
		if let Some(ref callback) = self.terminated {
			callback(error);
		}
	}
}

/// Fans events out to the registered listeners.
#[derive(Clone, Default)]
pub struct EventDispatcher {
	listeners: Vec<Arc<dyn ClientCallbacks>>,
}

impl EventDispatcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_listener(&mut self, listener: Arc<dyn ClientCallbacks>) {
		self.listeners.push(listener);
	}

	pub fn has_listeners(&self) -> bool {
		!self.listeners.is_empty()
	}

	pub fn fire(&self, event: ClientEvent) {
		for listener in &self.listeners {
			listener.on_event(&event);
		}
	}

	/// Report a non-fatal problem to listeners and the log.
	pub fn diagnostic(&self, message: impl Into<String>) {
		let message = message.into();
		warn!("{}", message);
		self.fire(ClientEvent::Diagnostic { message });
	}

	pub fn file_written(&self, path: &Path, change: FileChange) {
		self.fire(ClientEvent::FileWritten { path: path.to_path_buf(), change });
	}

	pub fn message(&self, text: impl Into<String>, error: bool, tag: Option<String>) {
		self.fire(ClientEvent::Message(ServerMessage { text: text.into(), error, tag }));
	}
}


// vim: ts=4
