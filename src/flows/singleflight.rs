//! Single-slot future cache: callers that arrive while a computation is running share its result.

// std
use std::sync::Weak;
// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared},
};
use tokio::runtime::Handle;
// self
use crate::_prelude::*;

/// Future handed to every caller of [`SingleFlight::run`].
pub type Flight<T> = Shared<BoxFuture<'static, T>>;

type Slot<T> = Arc<Mutex<Option<Flight<T>>>>;

/// Coalesces concurrent computations into one.
///
/// The slot is emptied by the computation itself, before its output reaches any caller, so a
/// caller that observes the output and immediately calls [`run`](Self::run) again starts a new
/// computation. When a Tokio runtime is available the computation is also driven by a detached
/// task; dropping every caller then does not cancel it.
pub struct SingleFlight<T>
where
	T: 'static + Clone + Send + Sync,
{
	slot: Slot<T>,
}
impl<T> SingleFlight<T>
where
	T: 'static + Clone + Send + Sync,
{
	/// Creates an idle slot.
	pub fn new() -> Self {
		Self { slot: Arc::new(Mutex::new(None)) }
	}

	/// Joins the in-flight computation, or starts `start()` when idle.
	///
	/// `start` is only invoked when no computation is in flight.
	pub fn run<F, Fut>(&self, start: F) -> Flight<T>
	where
		F: FnOnce() -> Fut,
		Fut: 'static + Future<Output = T> + Send,
	{
		let mut slot = self.slot.lock();

		if let Some(flight) = slot.as_ref() {
			return flight.clone();
		}

		let weak = Arc::downgrade(&self.slot);
		let work = start();
		let flight = async move {
			let output = work.await;

			release(&weak);

			output
		}
		.boxed()
		.shared();

		*slot = Some(flight.clone());

		drop(slot);

		if let Ok(handle) = Handle::try_current() {
			handle.spawn(flight.clone());
		}

		flight
	}

	/// Returns `true` while a computation is running.
	pub fn in_flight(&self) -> bool {
		self.slot.lock().is_some()
	}
}
impl<T> Default for SingleFlight<T>
where
	T: 'static + Clone + Send + Sync,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<T> Debug for SingleFlight<T>
where
	T: 'static + Clone + Send + Sync,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlight").field("in_flight", &self.in_flight()).finish()
	}
}

fn release<T>(weak: &Weak<Mutex<Option<Flight<T>>>>)
where
	T: 'static + Clone + Send + Sync,
{
	if let Some(slot) = weak.upgrade() {
		let _finished = slot.lock().take();
	}
}
