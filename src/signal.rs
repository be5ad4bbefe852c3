use std::{io,process,thread};
use std::io::Write;
use std::sync::{Arc,Mutex};

use signal_hook::consts::{SIGCHLD,SIGINT};
use signal_hook::iterator::Signals;
use tracing::debug;

use crate::global;
use crate::job::JobSet;
use crate::ledger::Ledger;

/// Starts the thread that receives SIGCHLD and SIGINT. SIGCHLD only reaps
/// registered background groups; SIGINT dumps the ledger and ends the shell.
pub fn spawn_handler(ledger: Arc<Mutex<Ledger>>, job_set: JobSet) -> io::Result<thread::JoinHandle<()>> {
	let mut signals = Signals::new([SIGCHLD, SIGINT])?;
	thread::Builder::new()
		.name("signals".to_owned())
		.spawn(move || {
			for sig in signals.forever() {
				match sig {
					SIGCHLD => {
						let collected = job_set.reap();
						if collected > 0 {
							debug!(collected, "reaped background children");
						}
					},
					SIGINT => interrupt(&ledger),
					_ => {},
				}
			}
		})
}

// The ledger lock is released before stdout is taken, in the same order the
// interpreter's own dumps use.
fn final_dump(ledger: &Mutex<Ledger>) -> Vec<u8> {
	let mut dump = b"\n".to_vec();
	dump.extend(global::lock_ledger(ledger).render());
	dump
}

/// Interrupting always exits the shell, it never cancels just the current job.
pub fn interrupt(ledger: &Mutex<Ledger>) -> ! {
	let dump = final_dump(ledger);
	let stdout = io::stdout();
	let mut out = stdout.lock();
	let _ = out.write_all(&dump);
	let _ = out.flush();
	process::exit(0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::mpsc;
	use std::time::Duration;
	use chrono::Local;
	use nix::unistd;
	use crate::builtin;
	use crate::ledger::HistoryEntry;

	// Stands in for a stdout that another thread has locked.
	struct GatedWriter {
		gate: Arc<Mutex<()>>,
		written: Vec<u8>,
	}

	impl Write for GatedWriter {
		fn write(&mut self, data: &[u8]) -> io::Result<usize> {
			let _held = self.gate.lock().unwrap_or_else(|e| e.into_inner());
			self.written.extend_from_slice(data);
			Ok(data.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	#[test]
	fn interrupt_dump_proceeds_while_history_waits_for_output() {
		let mut state = global::State::with_capacity(4);
		state.record(HistoryEntry::new(vec![unistd::getpid()], Local::now(), "pwd", None));
		let ledger = state.ledger.clone();

		let gate = Arc::new(Mutex::new(()));
		let held = gate.lock().unwrap();
		let writer_gate = gate.clone();
		let history = thread::spawn(move || {
			let mut out = GatedWriter { gate: writer_gate, written: vec![] };
			builtin::builtin_history(&mut state, &[], &mut out).unwrap();
			out.written
		});
		thread::sleep(Duration::from_millis(100));

		let (tx, rx) = mpsc::channel();
		thread::spawn(move || {
			let _ = tx.send(final_dump(&ledger));
		});
		let dump = rx.recv_timeout(Duration::from_secs(3)).expect("interrupt dump blocked on the ledger");
		let text = String::from_utf8(dump).unwrap();
		assert!(text.starts_with("\nNo."));
		assert_eq!(text.lines().count(), 3);

		drop(held);
		let written = history.join().unwrap();
		assert_eq!(String::from_utf8(written).unwrap().lines().count(), 2);
	}
}
