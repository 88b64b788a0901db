use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install a Ctrl+C handler that flips `flag` to `true`.
///
/// Mirrors the single process-wide handler a long-running endpoint installs
/// so a bare `cargo run` of a demo binary can be interrupted cleanly; library
/// consumers that manage their own signal handling should not call this.
pub fn on_interrupt(flag: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
	ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
}
