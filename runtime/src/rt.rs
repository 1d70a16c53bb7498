use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use stakker::Stakker;

use crate::error::Result;

static EXIT: AtomicBool = AtomicBool::new(false);

/// Creates a fresh `Stakker` core with its monotonic and wall-clock time
/// synchronised to now.
pub fn init() -> Stakker {
	let now = Instant::now();
	let now_sys = SystemTime::now();

	let mut s = Stakker::new(now);
	s.set_systime(Some(now_sys));
	s
}

/// Runs the cooperative event loop until `stakker` shuts down or the process
/// receives Ctrl+C, in which case `exit_fn` is called to let the embedder
/// defer any cleanup before the final drain.
///
/// This is the "host application's event loop" the library itself does not
/// provide: an embedder is free to drive `stakker` and [`crate::poll`] some
/// other way (e.g. integrating with an existing reactor) as long as it keeps
/// calling `stakker.run` after every batch of ready sockets/timers.
pub fn exec(stakker: &mut Stakker, exit_fn: impl FnOnce()) -> Result {
	ctrlc::set_handler(|| EXIT.store(true, Ordering::Relaxed)).map_err(|err| log::error!("error setting Ctrl+C handler: {err}"))?;

	let mut t = Instant::now();
	let mut idle_pending = stakker.run(t, false);

	while stakker.not_shutdown() {
		if EXIT.load(Ordering::Relaxed) {
			exit_fn();
			stakker.run(t, false);
			break;
		}

		let timeout = if idle_pending { Some(Duration::from_secs(0)) } else { stakker.next_wait(t) };

		if timeout.is_none() && !crate::is_io() {
			break;
		}

		log::trace!("idle_pending: {idle_pending}, timeout: {timeout:?}");

		let Ok(is_io) = crate::poll(timeout) else {
			EXIT.store(true, Ordering::Relaxed);
			continue;
		};

		t = Instant::now();
		idle_pending = stakker.run(t, idle_pending && !is_io);
	}

	Ok(())
}
