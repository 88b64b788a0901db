//! The public transport handle: binds a UDP socket and runs the worker
//! threads that drive every [`Channel`](crate::channel::Channel).
//!
//! Four threads per endpoint, matching the single-writer rule for mutable
//! state:
//!
//! - **reader**: blocks on `UdpSocket::recv_from`, forwards raw datagrams.
//! - **writer**: drains an outbound queue and calls `UdpSocket::send_to`.
//! - **ticker**: wakes every [`config::TICK`] and asks the event loop to
//!   run retransmission, keepalive and queue adaptation.
//! - **event loop**: the only thread that ever touches the channel table.
//!   Reader, writer-facing API calls, and the ticker all talk to it through
//!   one bounded `Work` channel; it is the `kernel` every mutation funnels
//!   through.
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use runtime::bounded::{self, Receiver, Sender};
use runtime::time;
use utils::error::Ext;

use crate::channel::Channel;
use crate::config::Config;
use crate::event::{Event, EventKind};
use crate::key::ChannelKey;
use crate::packet;

const WORK_QUEUE_CAPACITY: usize = 1024;
const EVENT_QUEUE_CAPACITY: usize = 1024;
const READER_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum EndpointError {
	Io(io::Error),
	UnknownChannel(ChannelKey),
}

impl fmt::Display for EndpointError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EndpointError::Io(e) => write!(f, "io error: {e}"),
			EndpointError::UnknownChannel(key) => write!(f, "no channel for {key}"),
		}
	}
}

impl std::error::Error for EndpointError {}

impl From<io::Error> for EndpointError {
	fn from(e: io::Error) -> Self {
		EndpointError::Io(e)
	}
}

enum Work {
	Incoming { from: SocketAddr, bytes: Vec<u8> },
	Write { key: ChannelKey, payload: Vec<u8> },
	Connect { key: ChannelKey },
	ResetChannel { key: ChannelKey },
	SetDefaultQueueSize(usize),
	SetShowStatistics(bool),
	Tick,
	Shutdown,
}

/// One bound UDP socket multiplexing up to 16 channels per remote address.
pub struct Endpoint {
	local_addr: SocketAddr,
	work_tx: Sender<Work>,
	events_rx: Receiver<Event>,
	running: Arc<AtomicBool>,
	threads: Vec<JoinHandle<()>>,
}

impl Endpoint {
	/// Binds a UDP socket on `config.port` and starts the worker threads.
	pub fn bind(config: Config) -> Result<Self, EndpointError> {
		let socket = UdpSocket::bind((config.bind_addr, config.port))?;
		socket.set_read_timeout(Some(READER_TIMEOUT))?;
		let local_addr = socket.local_addr()?;
		let socket = Arc::new(socket);

		let (work_tx, work_rx) = bounded::bounded::<Work>(WORK_QUEUE_CAPACITY);
		let (out_tx, out_rx) = bounded::bounded::<(SocketAddr, Vec<u8>)>(WORK_QUEUE_CAPACITY);
		let (events_tx, events_rx) = bounded::bounded::<Event>(EVENT_QUEUE_CAPACITY);

		let running = Arc::new(AtomicBool::new(true));

		let mut threads = Vec::with_capacity(4);
		threads.push(spawn_reader(socket.clone(), work_tx.clone(), running.clone()));
		threads.push(spawn_writer(socket.clone(), out_rx, running.clone()));
		threads.push(spawn_ticker(work_tx.clone(), running.clone()));
		threads.push(spawn_event_loop(config, local_addr, work_rx, out_tx, events_tx));

		info!("trudp endpoint bound on {local_addr}");

		Ok(Endpoint { local_addr, work_tx, events_rx, running, threads })
	}

	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	pub fn running(&self) -> bool {
		self.running.load(Ordering::Relaxed)
	}

	/// Queues `payload` for delivery on `remote`'s channel `ch`, creating the
	/// channel on first use.
	pub fn send(&self, remote: SocketAddr, ch: u8, payload: Vec<u8>) {
		let key = ChannelKey::new(remote, ch);
		self.work_tx.send(Work::Write { key, payload });
	}

	/// Opens a channel to `remote` eagerly instead of waiting for the first
	/// `send`, by sending an initial PING to establish liveness.
	pub fn connect_channel(&self, remote: SocketAddr, ch: u8) {
		let key = ChannelKey::new(remote, ch);
		self.work_tx.send(Work::Connect { key });
	}

	/// Forces a reset handshake on a channel, dropping its unacknowledged sends.
	pub fn reset_channel(&self, remote: SocketAddr, ch: u8) {
		let key = ChannelKey::new(remote, ch);
		self.work_tx.send(Work::ResetChannel { key });
	}

	pub fn set_default_queue_size(&self, size: usize) {
		self.work_tx.send(Work::SetDefaultQueueSize(size));
	}

	pub fn set_show_statistics(&self, show: bool) {
		self.work_tx.send(Work::SetShowStatistics(show));
	}

	/// Blocks until the next event is available, or returns `None` once the
	/// endpoint has shut down and its event queue has drained.
	pub fn next_event(&self) -> Option<Event> {
		self.events_rx.recv()
	}

	/// Non-blocking version of [`Self::next_event`].
	pub fn try_next_event(&self) -> Option<Event> {
		self.events_rx.try_recv()
	}

	/// Stops all worker threads and joins them. Idempotent.
	pub fn close(&mut self) {
		if !self.running.swap(false, Ordering::AcqRel) {
			return;
		}

		self.work_tx.send(Work::Shutdown);

		for handle in self.threads.drain(..) {
			let _ = handle.join();
		}
	}
}

impl Drop for Endpoint {
	fn drop(&mut self) {
		self.close();
	}
}

fn spawn_reader(socket: Arc<UdpSocket>, work_tx: Sender<Work>, running: Arc<AtomicBool>) -> JoinHandle<()> {
	thread::Builder::new()
		.name("trudp-reader".into())
		.spawn(move || {
			let mut buf = [0u8; crate::config::MAX_BUFFER_SIZE];

			while running.load(Ordering::Relaxed) {
				match socket.recv_from(&mut buf) {
					Ok((n, from)) => {
						work_tx.send(Work::Incoming { from, bytes: buf[..n].to_vec() });
					}
					Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
					Err(e) => {
						warn!("trudp reader: {e}");
					}
				}
			}
		})
		.expect("failed to spawn trudp-reader thread")
}

fn spawn_writer(socket: Arc<UdpSocket>, out_rx: Receiver<(SocketAddr, Vec<u8>)>, running: Arc<AtomicBool>) -> JoinHandle<()> {
	thread::Builder::new()
		.name("trudp-writer".into())
		.spawn(move || {
			while let Some((to, bytes)) = out_rx.recv() {
				if !running.load(Ordering::Relaxed) {
					break;
				}

				socket.send_to(&bytes, to).ok_or(|e| warn!("trudp writer: {e}"));
			}
		})
		.expect("failed to spawn trudp-writer thread")
}

fn spawn_ticker(work_tx: Sender<Work>, running: Arc<AtomicBool>) -> JoinHandle<()> {
	thread::Builder::new()
		.name("trudp-ticker".into())
		.spawn(move || {
			while running.load(Ordering::Relaxed) {
				thread::sleep(crate::config::TICK);
				work_tx.send(Work::Tick);
			}
		})
		.expect("failed to spawn trudp-ticker thread")
}

fn spawn_event_loop(
	mut config: Config,
	local_addr: SocketAddr,
	work_rx: Receiver<Work>,
	out_tx: Sender<(SocketAddr, Vec<u8>)>,
	events_tx: Sender<Event>,
) -> JoinHandle<()> {
	let self_key = ChannelKey::new(local_addr, 0);

	thread::Builder::new()
		.name("trudp-event-loop".into())
		.spawn(move || {
			let mut channels: HashMap<ChannelKey, Channel> = HashMap::new();
			publish(&events_tx, &config, Event::new(self_key, EventKind::Initialize));

			while let Some(work) = work_rx.recv() {
				match work {
					Work::Incoming { from, bytes } => on_incoming(&mut channels, &config, &out_tx, &events_tx, from, bytes),
					Work::Write { key, payload } => on_write(&mut channels, &config, &out_tx, &events_tx, key, payload),
					Work::Connect { key } => on_connect(&mut channels, &config, &out_tx, key),
					Work::ResetChannel { key } => on_reset_channel(&mut channels, &out_tx, &events_tx, &config, key),
					Work::SetDefaultQueueSize(size) => config.default_queue_size = size,
					Work::SetShowStatistics(show) => config.show_statistics = show,
					Work::Tick => on_tick(&mut channels, &config, &out_tx, &events_tx),
					Work::Shutdown => break,
				}
			}

			for key in channels.keys() {
				debug!("trudp endpoint shutting down with live channel {key}");
			}

			publish(&events_tx, &config, Event::new(self_key, EventKind::Destroy));
			events_tx.close();
			out_tx.close();
		})
		.expect("failed to spawn trudp-event-loop thread")
}

fn publish(events_tx: &Sender<Event>, config: &Config, event: Event) {
	if config.allow_events.contains(event.kind) {
		events_tx.send(event);
	}
}

fn channel_entry<'a>(channels: &'a mut HashMap<ChannelKey, Channel>, config: &Config, key: ChannelKey) -> &'a mut Channel {
	channels.entry(key).or_insert_with(|| {
		debug!("trudp: new channel {key}");
		Channel::new(key, config, time::now_micros())
	})
}

fn dispatch(out_tx: &Sender<(SocketAddr, Vec<u8>)>, events_tx: &Sender<Event>, config: &Config, remote: SocketAddr, outcome: crate::channel::Outcome) {
	for bytes in outcome.to_send {
		out_tx.send((remote, bytes));
	}
	for event in outcome.events {
		publish(events_tx, config, event);
	}
}

fn on_incoming(
	channels: &mut HashMap<ChannelKey, Channel>,
	config: &Config,
	out_tx: &Sender<(SocketAddr, Vec<u8>)>,
	events_tx: &Sender<Event>,
	from: SocketAddr,
	bytes: Vec<u8>,
) {
	if bytes.is_empty() {
		debug!("trudp: dropping zero-length datagram from {from}");
		return;
	}

	let Some(packet) = packet::decode(&bytes) else {
		on_non_trudp(channels, config, events_tx, from, bytes);
		return;
	};

	let key = ChannelKey::new(from, packet.ch);
	let channel = channel_entry(channels, config, key);
	let outcome = channel.on_packet(packet, time::now_micros());
	let dead = outcome.dead;

	dispatch(out_tx, events_tx, config, from, outcome);

	if dead {
		channels.remove(&key);
	}
}

/// Bytes that failed the TRUDP checksum check. If any channel is already
/// open to this remote, surface them as a pass-through `GotDataNoTrudp`
/// event on its first channel; otherwise they're silently dropped.
fn on_non_trudp(channels: &HashMap<ChannelKey, Channel>, config: &Config, events_tx: &Sender<Event>, from: SocketAddr, bytes: Vec<u8>) {
	let Some(key) = channels.keys().find(|key| key.remote == from).copied() else {
		debug!("trudp: dropping non-trudp datagram from unknown {from}");
		return;
	};

	publish(events_tx, config, Event::with_payload(key, EventKind::GotDataNoTrudp, bytes));
}

fn on_write(
	channels: &mut HashMap<ChannelKey, Channel>,
	config: &Config,
	out_tx: &Sender<(SocketAddr, Vec<u8>)>,
	events_tx: &Sender<Event>,
	key: ChannelKey,
	payload: Vec<u8>,
) {
	let channel = channel_entry(channels, config, key);
	if !channel.queue_send(payload) {
		warn!("trudp: write queue full for {key}, dropping payload");
		return;
	}

	let outcome = channel.flush_writes(time::now_micros());
	dispatch(out_tx, events_tx, config, key.remote, outcome);
}

fn on_connect(channels: &mut HashMap<ChannelKey, Channel>, config: &Config, out_tx: &Sender<(SocketAddr, Vec<u8>)>, key: ChannelKey) {
	channel_entry(channels, config, key);
	out_tx.send((key.remote, packet::encode_ping(key.ch, &[])));
}

fn on_reset_channel(
	channels: &mut HashMap<ChannelKey, Channel>,
	out_tx: &Sender<(SocketAddr, Vec<u8>)>,
	events_tx: &Sender<Event>,
	config: &Config,
	key: ChannelKey,
) {
	let Some(channel) = channels.get_mut(&key) else {
		warn!("trudp: reset requested for unknown channel {key}");
		return;
	};

	let outcome = channel.local_reset(time::now_micros());
	dispatch(out_tx, events_tx, config, key.remote, outcome);
}

fn on_tick(channels: &mut HashMap<ChannelKey, Channel>, config: &Config, out_tx: &Sender<(SocketAddr, Vec<u8>)>, events_tx: &Sender<Event>) {
	let now = time::now_micros();
	let mut dead = Vec::new();

	for (key, channel) in channels.iter_mut() {
		let outcome = channel.tick(now);
		if outcome.dead {
			dead.push(*key);
		}

		for bytes in outcome.to_send {
			out_tx.send((key.remote, bytes));
		}
		for event in outcome.events {
			publish(events_tx, config, event);
		}
	}

	for key in dead {
		channels.remove(&key);
	}

	if config.show_statistics {
		for (key, channel) in channels.iter() {
			debug!(
				"{key}: sent={} recv={} resent={} rtt_avg={:.1}ms send_rate={:.0}B/s recv_rate={:.0}B/s",
				channel.stats.packets_sent,
				channel.stats.packets_received,
				channel.stats.packets_resent,
				channel.rtt_avg_ms,
				channel.stats.send_rate_bps,
				channel.stats.receive_rate_bps,
			);
		}
	}
}
