use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
	*EPOCH.get_or_init(Instant::now)
}

/// Microseconds elapsed since the process-wide epoch, truncated to 32 bits.
///
/// This wraps roughly every 71 minutes; packet timestamps are only ever
/// compared against a recently-stamped header, so the wraparound is benign.
pub fn now_micros() -> u32 {
	epoch().elapsed().as_micros() as u32
}

/// Milliseconds between `now_micros()` and an earlier timestamp produced by it.
///
/// Performs the subtraction in wrapping 32-bit arithmetic so a timestamp
/// taken just before a wrap still yields a small, correct trip time.
pub fn elapsed_ms(earlier: u32) -> f32 {
	now_micros().wrapping_sub(earlier) as f32 / 1000.0
}
