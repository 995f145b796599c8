//! Ordered, synchronous observer registry.
//!
//! Events are queued and delivered one at a time, in the order they were queued, to listeners in
//! registration order. A listener that triggers another event while handling one does not re-enter
//! the fan-out; the new event is delivered after every listener has seen the current one. A
//! caller on another thread that dispatches while delivery is running blocks until delivery
//! finishes, so when [`ObserverRegistry::dispatch`] returns, every event queued before the call
//! has reached every listener.

// std
use std::{
	collections::VecDeque,
	sync::{
		Weak,
		atomic::{AtomicU64, Ordering},
	},
};
// crates.io
use parking_lot::ReentrantMutex;
// self
use crate::_prelude::*;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Fan-out registry that delivers events to listeners in a deterministic order.
pub struct ObserverRegistry<E> {
	inner: Arc<RegistryInner<E>>,
}
impl<E> ObserverRegistry<E>
where
	E: 'static + Send,
{
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(RegistryInner {
				listeners: RwLock::new(BTreeMap::new()),
				next_id: AtomicU64::new(0),
				delivery: ReentrantMutex::new(()),
				queue: Mutex::new(DispatchQueue { pending: VecDeque::new(), dispatching: false }),
			}),
		}
	}

	/// Registers `listener`; it receives every event dispatched after this call.
	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: 'static + Fn(&E) + Send + Sync,
	{
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

		self.inner.listeners.write().insert(id, Arc::new(listener));

		let registry: Arc<dyn Detach> = self.inner.clone();

		Subscription { id, registry: Arc::downgrade(&registry) }
	}

	/// Queues `event` without delivering it.
	///
	/// Callers that must order events with another critical section enqueue while holding
	/// their lock and call [`dispatch`](Self::dispatch) after releasing it.
	pub fn enqueue(&self, event: E) {
		self.inner.queue.lock().pending.push_back(event);
	}

	/// Delivers queued events.
	///
	/// Called from inside a listener, it returns at once and the outer frame delivers the queue.
	/// Called while another thread is delivering, it waits for that thread and then delivers
	/// whatever is still queued.
	pub fn dispatch(&self) {
		let _delivery = self.inner.delivery.lock();

		{
			let mut queue = self.inner.queue.lock();

			// Only this thread can hold `delivery`, so a set flag means a listener re-entered.
			if queue.dispatching {
				return;
			}

			queue.dispatching = true;
		}

		let _reset = DispatchReset(&self.inner.queue);

		loop {
			let event = {
				let mut queue = self.inner.queue.lock();
				let Some(event) = queue.pending.pop_front() else {
					queue.dispatching = false;

					break;
				};

				event
			};
			let listeners = self.inner.listeners.read().values().cloned().collect::<Vec<_>>();

			for listener in listeners {
				listener(&event);
			}
		}
	}
}
impl<E> Default for ObserverRegistry<E>
where
	E: 'static + Send,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<E> Debug for ObserverRegistry<E> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ObserverRegistry")
			.field("listeners", &self.inner.listeners.read().len())
			.finish()
	}
}

/// Handle returned by [`ObserverRegistry::subscribe`].
///
/// Dropping the handle keeps the listener registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
#[derive(Debug)]
pub struct Subscription {
	id: u64,
	registry: Weak<dyn Detach>,
}
impl Subscription {
	/// Removes the listener. Returns `false` if it was already gone.
	pub fn unsubscribe(self) -> bool {
		match self.registry.upgrade() {
			Some(registry) => registry.detach(self.id),
			None => false,
		}
	}
}

trait Detach
where
	Self: Send + Sync,
{
	fn detach(&self, id: u64) -> bool;
}

struct RegistryInner<E> {
	listeners: RwLock<BTreeMap<u64, Listener<E>>>,
	next_id: AtomicU64,
	delivery: ReentrantMutex<()>,
	queue: Mutex<DispatchQueue<E>>,
}
impl<E> Detach for RegistryInner<E>
where
	E: Send,
{
	fn detach(&self, id: u64) -> bool {
		self.listeners.write().remove(&id).is_some()
	}
}

struct DispatchQueue<E> {
	pending: VecDeque<E>,
	dispatching: bool,
}

// Releases the dispatch flag when a listener panics.
struct DispatchReset<'a, E>(&'a Mutex<DispatchQueue<E>>);
impl<E> Drop for DispatchReset<'_, E> {
	fn drop(&mut self) {
		self.0.lock().dispatching = false;
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{
		sync::{Barrier, mpsc},
		thread,
		time::Duration as StdDuration,
	};
	// self
	use super::*;

	fn publish<E>(registry: &ObserverRegistry<E>, event: E)
	where
		E: 'static + Send,
	{
		registry.enqueue(event);
		registry.dispatch();
	}

	#[test]
	fn listeners_run_in_registration_order() {
		let registry = ObserverRegistry::<u32>::new();
		let seen = Arc::new(Mutex::new(Vec::new()));

		for tag in ["a", "b", "c"] {
			let seen = seen.clone();

			registry.subscribe(move |event: &u32| seen.lock().push(format!("{tag}{event}")));
		}

		publish(&registry, 1);
		publish(&registry, 2);

		assert_eq!(*seen.lock(), ["a1", "b1", "c1", "a2", "b2", "c2"]);
	}

	#[test]
	fn unsubscribe_stops_delivery() {
		let registry = ObserverRegistry::<u32>::new();
		let count = Arc::new(AtomicU64::new(0));
		let counter = count.clone();
		let subscription = registry.subscribe(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		publish(&registry, 1);

		assert!(subscription.unsubscribe());

		publish(&registry, 2);

		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn reentrant_publish_is_delivered_after_current_event() {
		let registry = Arc::new(ObserverRegistry::<u32>::new());
		let seen = Arc::new(Mutex::new(Vec::new()));
		let weak = Arc::downgrade(&registry);
		let first = seen.clone();

		registry.subscribe(move |event: &u32| {
			first.lock().push(format!("first:{event}"));

			if *event == 1
				&& let Some(registry) = weak.upgrade()
			{
				publish(&registry, 2);
			}
		});

		let second = seen.clone();

		registry.subscribe(move |event: &u32| second.lock().push(format!("second:{event}")));
		publish(&registry, 1);

		assert_eq!(*seen.lock(), ["first:1", "second:1", "first:2", "second:2"]);
	}

	#[test]
	fn dispatch_from_another_thread_waits_for_delivery() {
		let registry = Arc::new(ObserverRegistry::<u32>::new());
		let seen = Arc::new(Mutex::new(Vec::new()));
		let (started_tx, started_rx) = mpsc::channel();
		let (resume_tx, resume_rx) = mpsc::channel::<()>();
		let resume_rx = Mutex::new(resume_rx);
		let sink = seen.clone();

		registry.subscribe(move |event: &u32| {
			if *event == 1 {
				let _ = started_tx.send(());
				let _ = resume_rx.lock().recv();
			}

			sink.lock().push(*event);
		});

		let slow = {
			let registry = registry.clone();

			thread::spawn(move || publish(&registry, 1))
		};

		started_rx.recv().expect("First delivery should start.");

		let fast = {
			let registry = registry.clone();
			let seen = seen.clone();

			thread::spawn(move || {
				publish(&registry, 2);

				seen.lock().contains(&2)
			})
		};

		thread::sleep(StdDuration::from_millis(20));
		resume_tx.send(()).expect("Slow listener should still be waiting.");
		slow.join().expect("Slow publisher should finish.");

		assert!(fast.join().expect("Fast publisher should finish."));
		assert_eq!(*seen.lock(), [1, 2]);
	}

	#[test]
	fn concurrent_publishers_never_strand_events() {
		const ROUNDS: u64 = 2_000;

		let registry = Arc::new(ObserverRegistry::<u64>::new());
		let delivered = Arc::new(AtomicU64::new(0));
		let counter = delivered.clone();

		registry.subscribe(move |_| {
			counter.fetch_add(1, Ordering::SeqCst);
		});

		for round in 0..ROUNDS {
			let barrier = Arc::new(Barrier::new(2));
			let workers = (0..2)
				.map(|_| {
					let registry = registry.clone();
					let barrier = barrier.clone();

					thread::spawn(move || {
						barrier.wait();
						publish(&registry, round);
					})
				})
				.collect::<Vec<_>>();

			for worker in workers {
				worker.join().expect("Publisher thread should finish.");
			}

			assert_eq!(delivered.load(Ordering::SeqCst), (round + 1) * 2, "round {round}");
		}
	}

	#[test]
	fn unsubscribe_after_registry_drop_is_harmless() {
		let registry = ObserverRegistry::<u32>::new();
		let subscription = registry.subscribe(|_| {});

		drop(registry);

		assert!(!subscription.unsubscribe());
	}
}
