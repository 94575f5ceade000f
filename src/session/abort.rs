//! Cooperative cancellation of an in-flight session

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable handle; any clone may abort the session that owns it.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
	inner: Arc<AbortInner>,
}

#[derive(Debug, Default)]
struct AbortInner {
	flag: AtomicBool,
	notify: Notify,
}

impl AbortHandle {
	pub fn new() -> Self {
		Self::default()
	}

	/// Request cancellation. Takes effect at the next request boundary or read.
	pub fn abort(&self) {
		self.inner.flag.store(true, Ordering::SeqCst);
		self.inner.notify.notify_waiters();
	}

	pub fn is_aborted(&self) -> bool {
		self.inner.flag.load(Ordering::SeqCst)
	}

	/// Cleared when a new top-level command starts.
	pub fn reset(&self) {
		self.inner.flag.store(false, Ordering::SeqCst);
	}

	/// Resolves once [`abort`](Self::abort) has been called.
	pub async fn aborted(&self) {
		loop {
			let notified = self.inner.notify.notified();
			if self.is_aborted() {
				return;
			}
			notified.await;
		}
	}
}


// vim: ts=4
