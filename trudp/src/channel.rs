//! Per-channel sequence state: id tracking, the reset handshake, RTT
//! estimation, and the glue between the three queues and the wire.

use log::debug;

use crate::config::{self, Config};
use crate::event::{Event, EventKind};
use crate::key::ChannelKey;
use crate::packet::{self, Packet, PacketType};
use crate::queue::{ReceiveQueue, SendQueue, WriteQueue};
use crate::stats::Stats;

pub type ChannelNum = u8;

/// Signed distance from `expected` to `id` in modular 32-bit id space.
///
/// Positive means `id` is at or ahead of `expected` (in order, or an
/// out-of-order arrival ahead of it); negative means `id` is behind
/// `expected` (a duplicate or a stale retransmit already delivered).
pub fn distance(expected: u32, id: u32) -> i32 {
	id.wrapping_sub(expected) as i32
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetState {
	/// Sequence state in sync with the remote; normal operation.
	Established,
	/// We sent RESET and are waiting for ACK_RESET.
	AwaitingAckReset { since_us: u32 },
}

/// Side effects produced by feeding a packet or a tick into a [`Channel`].
/// The event loop drains this and forwards `to_send` to the writer thread
/// and `events` to the user event channel.
#[derive(Default)]
pub struct Outcome {
	pub to_send: Vec<Vec<u8>>,
	pub events: Vec<Event>,
	/// Set when the channel should be torn down: too many failed resends,
	/// or silence past `DISCONNECT_AFTER_MS`.
	pub dead: bool,
}

impl Outcome {
	fn event(&mut self, key: ChannelKey, kind: EventKind) {
		self.events.push(Event::new(key, kind));
	}
}

pub struct Channel {
	pub key: ChannelKey,
	pub next_send_id: u32,
	pub expected_id: u32,
	pub rtt_avg_ms: f32,
	pub last_rx_us: u32,
	pub reset_state: ResetState,
	pub send_queue: SendQueue,
	pub receive_queue: ReceiveQueue,
	pub write_queue: WriteQueue,
	pub stats: Stats,

	connected: bool,
	last_ping_sent_us: Option<u32>,
	ticks_since_adapt: u64,
}

impl Channel {
	pub fn new(key: ChannelKey, config: &Config, now_us: u32) -> Self {
		Channel {
			key,
			next_send_id: 0,
			expected_id: 0,
			rtt_avg_ms: config::DEFAULT_RTT_MS as f32,
			last_rx_us: now_us,
			reset_state: ResetState::Established,
			send_queue: SendQueue::new(config.default_queue_size),
			receive_queue: ReceiveQueue::new(),
			write_queue: WriteQueue::new(config.default_queue_size),
			stats: Stats::new(now_us / 1000),
			connected: false,
			last_ping_sent_us: None,
			ticks_since_adapt: 0,
		}
	}

	/// Resend timeout: the measured RTT plus the default margin, clamped to
	/// `MAX_RTT_MS` so a single bad sample can't stall retransmission.
	fn resend_timeout_ms(&self) -> f32 {
		(self.rtt_avg_ms + config::DEFAULT_RTT_MS as f32).min(config::MAX_RTT_MS as f32)
	}

	fn record_rtt(&mut self, sample_ms: f32) {
		self.rtt_avg_ms = (self.rtt_avg_ms * 0.7 + sample_ms * 0.3).min(config::MAX_RTT_MS as f32);
	}

	fn mark_alive(&mut self, outcome: &mut Outcome) {
		if !self.connected {
			self.connected = true;
			outcome.event(self.key, EventKind::Connected);
		}
	}

	pub fn is_connected(&self) -> bool {
		self.connected
	}

	/// Queues `payload` for delivery. It's handed to [`Self::drain_write_queue`]
	/// on the next tick; this just buffers it, preferring the write queue so
	/// ids are assigned in call order. Returns `false` if the write queue is
	/// also full and the payload was dropped.
	pub fn queue_send(&mut self, payload: Vec<u8>) -> bool {
		self.write_queue.push(payload)
	}

	/// Accepts a decoded, checksum-valid packet and returns its side effects.
	pub fn on_packet(&mut self, packet: Packet, now_us: u32) -> Outcome {
		let mut outcome = Outcome::default();
		self.last_rx_us = now_us;
		self.stats.on_receive(packet::HEADER_LEN + packet.payload.len());

		match packet.kind {
			PacketType::Data => self.on_data(packet, &mut outcome),
			PacketType::Ack => self.on_ack(packet, now_us, &mut outcome),
			PacketType::Reset => self.on_reset(packet, &mut outcome),
			PacketType::AckReset => self.on_ack_reset(&mut outcome),
			PacketType::Ping => self.on_ping(packet, &mut outcome),
			PacketType::AckPing => self.on_ack_ping(packet, &mut outcome),
		}

		outcome
	}

	/// Implements the five-case table on DATA receipt: in-order delivery,
	/// the peer's implicit reset, our own freshness against a non-fresh
	/// peer, stale duplicates, and out-of-order buffering.
	fn on_data(&mut self, packet: Packet, outcome: &mut Outcome) {
		outcome.to_send.push(packet::encode_ack(&packet));
		self.mark_alive(outcome);

		let delta = distance(self.expected_id, packet.id);

		if delta == 0 {
			self.deliver_in_order(packet, outcome);
			return;
		}

		if packet.id == 0 {
			debug!("{}: peer implicitly reset (id 0, expected {})", self.key, self.expected_id);
			self.expected_id = 0;
			self.receive_queue.clear();
			self.deliver_in_order(packet, outcome);
			return;
		}

		if self.expected_id == 0 && delta > 0 {
			outcome.to_send.push(packet::encode_reset(self.next_send_id, self.key.ch));
			outcome.event(self.key, EventKind::SendReset);
			return;
		}

		if delta < 0 {
			self.stats.on_drop();
			return;
		}

		if !self.receive_queue.insert(packet) {
			self.stats.on_drop();
		}
	}

	fn deliver_in_order(&mut self, packet: Packet, outcome: &mut Outcome) {
		self.expected_id = self.expected_id.wrapping_add(1);
		outcome.events.push(Event::with_payload(self.key, EventKind::GotData, packet.payload));

		for ready in self.receive_queue.drain_ready(&mut self.expected_id) {
			outcome.events.push(Event::with_payload(self.key, EventKind::GotData, ready.payload));
		}
	}

	fn on_ack(&mut self, packet: Packet, now_us: u32, outcome: &mut Outcome) {
		self.mark_alive(outcome);
		self.stats.on_ack();

		if let Some(rtt) = self.send_queue.ack(packet.id, now_us) {
			self.record_rtt(rtt);
		}

		outcome.event(self.key, EventKind::GotAck);
	}

	fn on_reset(&mut self, packet: Packet, outcome: &mut Outcome) {
		self.expected_id = packet.id;
		self.receive_queue.clear();
		self.next_send_id = 0;
		self.send_queue.clear();
		self.write_queue.clear();
		outcome.to_send.push(packet::encode_ack_reset(&packet));
		outcome.event(self.key, EventKind::GotReset);
	}

	fn on_ack_reset(&mut self, outcome: &mut Outcome) {
		if matches!(self.reset_state, ResetState::AwaitingAckReset { .. }) {
			self.reset_state = ResetState::Established;
			self.next_send_id = 0;
			self.send_queue.clear();
			outcome.event(self.key, EventKind::GotAckReset);
		}
	}

	fn on_ping(&mut self, packet: Packet, outcome: &mut Outcome) {
		self.mark_alive(outcome);
		outcome.to_send.push(packet::encode_ack_ping(&packet));
		outcome.event(self.key, EventKind::GotPing);
	}

	fn on_ack_ping(&mut self, packet: Packet, outcome: &mut Outcome) {
		self.mark_alive(outcome);
		self.record_rtt(packet.triptime_ms());
		outcome.event(self.key, EventKind::GotAckPing);
	}

	/// Initiates a local reset: drops all outstanding sends and asks the
	/// remote to resynchronize its expected id to ours.
	pub fn local_reset(&mut self, now_us: u32) -> Outcome {
		let mut outcome = Outcome::default();

		let id = self.next_send_id;
		self.reset_state = ResetState::AwaitingAckReset { since_us: now_us };
		self.send_queue.clear();
		outcome.to_send.push(packet::encode_reset(id, self.key.ch));
		outcome.event(self.key, EventKind::SendReset);
		outcome.event(self.key, EventKind::ResetLocal);

		outcome
	}

	/// Drains queued writes into the send queue right away, instead of
	/// waiting for the next tick. Called after [`Self::queue_send`] so a
	/// write is put on the wire as soon as there's room.
	pub fn flush_writes(&mut self, now_us: u32) -> Outcome {
		let mut outcome = Outcome::default();
		self.drain_write_queue(now_us, &mut outcome);
		outcome
	}

	/// Drains queued writes into the send queue, encoding each as a DATA
	/// packet while there's room.
	fn drain_write_queue(&mut self, now_us: u32, outcome: &mut Outcome) {
		while !self.send_queue.is_full() {
			let Some(payload) = self.write_queue.pop() else { break };
			let id = self.next_send_id;
			self.next_send_id = self.next_send_id.wrapping_add(1);

			let bytes = packet::encode_data(id, self.key.ch, &payload);
			self.stats.on_send(bytes.len());
			self.send_queue.push(id, bytes.clone(), now_us);
			outcome.to_send.push(bytes);
		}
	}

	/// Called once per tick: resends overdue packets, sends a keepalive PING
	/// when the channel has gone quiet, adapts queue capacity, and detects
	/// connection death.
	pub fn tick(&mut self, now_us: u32) -> Outcome {
		let mut outcome = Outcome::default();

		self.drain_write_queue(now_us, &mut outcome);

		let timeout = self.resend_timeout_ms();
		let (resend, expired) = self.send_queue.due_for_resend(now_us, timeout);
		for sent in resend {
			self.stats.on_resend();
			outcome.to_send.push(sent.bytes);
		}
		if !expired.is_empty() {
			outcome.dead = true;
			outcome.event(self.key, EventKind::Disconnected);
			self.stats.tick(now_us / 1000);
			return outcome;
		}

		let quiet_us = now_us.wrapping_sub(self.last_rx_us);
		if quiet_us as u64 > config::DISCONNECT_AFTER_MS * 1000 && self.connected {
			outcome.dead = true;
			outcome.event(self.key, EventKind::Disconnected);
			self.stats.tick(now_us / 1000);
			return outcome;
		}

		let should_ping = quiet_us as u64 > config::PING_AFTER_MS * 1000
			&& self
				.last_ping_sent_us
				.map_or(true, |sent| now_us.wrapping_sub(sent) as u64 > config::PING_AFTER_MS * 1000);
		if should_ping {
			outcome.to_send.push(packet::encode_ping(self.key.ch, &[]));
			self.last_ping_sent_us = Some(now_us);
		}

		if let ResetState::AwaitingAckReset { since_us } = self.reset_state {
			let waited_ms = now_us.wrapping_sub(since_us) as f32 / 1000.0;
			if waited_ms > self.resend_timeout_ms() {
				outcome.to_send.push(packet::encode_reset(self.next_send_id, self.key.ch));
				self.reset_state = ResetState::AwaitingAckReset { since_us: now_us };
			}
		}

		self.ticks_since_adapt += 1;
		if self.ticks_since_adapt >= config::ADAPT_QUEUE_TICKS {
			self.send_queue.adapt();
			self.ticks_since_adapt = 0;
		}

		self.stats.tick(now_us / 1000);
		outcome
	}
}
