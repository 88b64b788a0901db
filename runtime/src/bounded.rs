use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A bounded multi-producer, single-consumer queue whose remaining capacity
/// can be inspected by producers.
///
/// `std::sync::mpsc::sync_channel` is bounded but exposes no way to ask "how
/// full are you", which the event loop's backpressure rule needs (hold the
/// reader while the event channel has fewer than 16 free slots). A small
/// mutex/condvar queue gives us that for the price of one lock per push/pop.
struct Shared<T> {
	queue: Mutex<VecDeque<T>>,
	capacity: usize,
	not_empty: Condvar,
	not_full: Condvar,
	closed: Mutex<bool>,
}

pub struct Sender<T>(Arc<Shared<T>>);

pub struct Receiver<T>(Arc<Shared<T>>);

pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
	let shared = Arc::new(Shared {
		queue: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
		capacity,
		not_empty: Condvar::new(),
		not_full: Condvar::new(),
		closed: Mutex::new(false),
	});

	(Sender(shared.clone()), Receiver(shared))
}

impl<T> Sender<T> {
	/// Push a value, blocking while the queue is at capacity.
	pub fn send(&self, value: T) {
		let mut queue = self.0.queue.lock().unwrap();

		while queue.len() >= self.0.capacity {
			queue = self.0.not_full.wait(queue).unwrap();
		}

		queue.push_back(value);
		self.0.not_empty.notify_one();
	}

	/// Number of free slots left in the queue.
	pub fn free_capacity(&self) -> usize {
		let queue = self.0.queue.lock().unwrap();
		self.0.capacity.saturating_sub(queue.len())
	}

	/// Block the calling thread until at least `slots` are free.
	///
	/// Used by the reader loop to implement backpressure: it holds off
	/// forwarding a parsed DATA packet until the event channel has room.
	pub fn wait_until_free(&self, slots: usize, poll: Duration) {
		loop {
			if self.free_capacity() >= slots {
				return;
			}

			std::thread::sleep(poll);
		}
	}

	pub fn len(&self) -> usize {
		self.0.queue.lock().unwrap().len()
	}

	/// Mark the channel closed so a blocked `Receiver::recv` wakes with `None`
	/// once the queue drains, instead of waiting forever.
	pub fn close(&self) {
		*self.0.closed.lock().unwrap() = true;
		self.0.not_empty.notify_all();
	}
}

impl<T> Clone for Sender<T> {
	fn clone(&self) -> Self {
		Sender(self.0.clone())
	}
}

impl<T> Receiver<T> {
	pub fn recv(&self) -> Option<T> {
		let mut queue = self.0.queue.lock().unwrap();

		loop {
			if let Some(value) = queue.pop_front() {
				self.0.not_full.notify_one();
				return Some(value);
			}

			if *self.0.closed.lock().unwrap() {
				return None;
			}

			queue = self.0.not_empty.wait(queue).unwrap();
		}
	}

	pub fn try_recv(&self) -> Option<T> {
		let mut queue = self.0.queue.lock().unwrap();
		let value = queue.pop_front();

		if value.is_some() {
			self.0.not_full.notify_one();
		}

		value
	}
}
