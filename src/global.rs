use std::io;
use std::io::Write;
use std::sync::{Arc,Mutex,MutexGuard,PoisonError};

use tracing::{trace,warn};

use crate::job;
use crate::ledger::{HistoryEntry,Ledger};

/// Interpreter state. The ledger is shared with the signal thread, which
/// only ever reads it.
pub struct State {
	pub ledger: Arc<Mutex<Ledger>>,
	pub job_set: job::JobSet,
}

impl State {
	pub fn new(ledger: Arc<Mutex<Ledger>>, job_set: job::JobSet) -> State {
		State { ledger: ledger, job_set: job_set }
	}

	pub fn with_capacity(capacity: usize) -> State {
		State::new(Arc::new(Mutex::new(Ledger::new(capacity))), job::JobSet::new())
	}

	pub fn ledger(&self) -> MutexGuard<'_, Ledger> {
		lock_ledger(&self.ledger)
	}

	pub fn record(&self, entry: HistoryEntry) {
		let mut ledger = self.ledger();
		match ledger.push(entry) {
			Ok(()) => trace!(entries = ledger.len(), "recorded command"),
			Err(e) => {
				warn!(capacity = e.capacity, "ledger full");
				eprintln!("pipeish: {}", e);
			},
		}
	}

	pub fn write_ledger(&self, out: &mut dyn Write) -> io::Result<()> {
		write_ledger(&self.ledger, out)
	}
}

pub fn lock_ledger(ledger: &Mutex<Ledger>) -> MutexGuard<'_, Ledger> {
	ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Renders under the ledger lock and writes after releasing it. Nothing may
/// hold the ledger while waiting on an output stream.
pub fn write_ledger(ledger: &Mutex<Ledger>, out: &mut dyn Write) -> io::Result<()> {
	let dump = lock_ledger(ledger).render();
	out.write_all(&dump)?;
	out.flush()
}
