//! Per-channel and endpoint-wide traffic counters, with a rolling
//! one-second window used to compute throughput rates for the optional
//! statistics log line (`Config::show_statistics`).

/// Cumulative counters plus a derived send/receive rate, refreshed once per
/// second of wall time rather than every tick.
#[derive(Clone, Debug, Default)]
pub struct Stats {
	pub packets_sent: u64,
	pub packets_received: u64,
	pub packets_resent: u64,
	pub packets_dropped: u64,
	pub acks_received: u64,
	pub bytes_sent: u64,
	pub bytes_received: u64,

	window_sent: u64,
	window_received: u64,
	window_started_ms: u32,

	pub send_rate_bps: f32,
	pub receive_rate_bps: f32,
}

impl Stats {
	pub fn new(now_ms: u32) -> Self {
		Stats { window_started_ms: now_ms, ..Default::default() }
	}

	pub fn on_send(&mut self, bytes: usize) {
		self.packets_sent += 1;
		self.bytes_sent += bytes as u64;
		self.window_sent += bytes as u64;
	}

	pub fn on_resend(&mut self) {
		self.packets_resent += 1;
	}

	/// A duplicate or stale DATA packet, dropped instead of delivered or buffered.
	pub fn on_drop(&mut self) {
		self.packets_dropped += 1;
	}

	pub fn on_receive(&mut self, bytes: usize) {
		self.packets_received += 1;
		self.bytes_received += bytes as u64;
		self.window_received += bytes as u64;
	}

	pub fn on_ack(&mut self) {
		self.acks_received += 1;
	}

	/// Rolls the one-second window over if at least 1000ms have elapsed
	/// since it opened, updating the derived byte rates.
	pub fn tick(&mut self, now_ms: u32) {
		let elapsed = now_ms.wrapping_sub(self.window_started_ms);
		if elapsed < 1000 {
			return;
		}

		let seconds = elapsed as f32 / 1000.0;
		self.send_rate_bps = self.window_sent as f32 / seconds;
		self.receive_rate_bps = self.window_received as f32 / seconds;

		self.window_sent = 0;
		self.window_received = 0;
		self.window_started_ms = now_ms;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rate_is_zero_before_a_second_elapses() {
		let mut stats = Stats::new(0);
		stats.on_send(100);
		stats.tick(500);
		assert_eq!(stats.send_rate_bps, 0.0);
	}

	#[test]
	fn rate_reflects_bytes_over_the_window() {
		let mut stats = Stats::new(0);
		stats.on_send(1000);
		stats.tick(1000);
		assert_eq!(stats.send_rate_bps, 1000.0);
	}

	#[test]
	fn cumulative_counters_survive_window_rollover() {
		let mut stats = Stats::new(0);
		stats.on_send(10);
		stats.tick(1000);
		stats.on_send(20);
		assert_eq!(stats.packets_sent, 2);
		assert_eq!(stats.bytes_sent, 30);
	}
}
