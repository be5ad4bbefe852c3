use std::io;
use std::io::Write;
use std::time::Duration;

use chrono::{DateTime,Local};
use nix::unistd::Pid;
use thiserror::Error;

pub const DEFAULT_CAPACITY: usize = 1000;

const START_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, PartialEq, Eq, Error)]
#[error("history is full ({capacity} entries), command not recorded")]
pub struct LedgerFull {
	pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
	pub pids: Vec<Pid>,
	pub started: DateTime<Local>,
	pub command: String,
	/// `None` for background pipelines, whose duration is never measured.
	pub duration: Option<Duration>,
}

impl HistoryEntry {
	pub fn new(pids: Vec<Pid>, started: DateTime<Local>, command: &str, duration: Option<Duration>) -> HistoryEntry {
		HistoryEntry { pids: pids, started: started, command: command.to_owned(), duration: duration }
	}

	pub fn execution_seconds(&self) -> f64 {
		self.duration.map_or(0.0, |d| d.as_secs_f64())
	}

	fn pid_column(&self) -> String {
		if self.pids.is_empty() {
			return "-".to_owned();
		}
		let pids: Vec<String> = self.pids.iter().map(|p| p.to_string()).collect();
		pids.join(",")
	}
}

/// Append-only, bounded record of dispatched commands. Never evicts.
#[derive(Debug)]
pub struct Ledger {
	entries: Vec<HistoryEntry>,
	capacity: usize,
}

impl Ledger {
	pub fn new(capacity: usize) -> Ledger {
		Ledger { entries: Vec::with_capacity(capacity.min(DEFAULT_CAPACITY)), capacity: capacity }
	}

	pub fn push(&mut self, entry: HistoryEntry) -> Result<(), LedgerFull> {
		if self.entries.len() >= self.capacity {
			return Err(LedgerFull { capacity: self.capacity });
		}
		self.entries.push(entry);
		Ok(())
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	#[cfg(test)]
	pub fn entries(&self) -> &[HistoryEntry] {
		&self.entries
	}

	/// The dump as bytes, so that callers can release the lock before writing it out.
	pub fn render(&self) -> Vec<u8> {
		let mut out: Vec<u8> = vec![];
		// Writing into a Vec cannot fail.
		let _ = self.dump(&mut out);
		out
	}

	pub fn dump(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "{:<6}{:<16}{:<32}{:<28}{}", "No.", "PID", "Command", "Start Time", "Execution Time")?;
		for (i, entry) in self.entries.iter().enumerate() {
			writeln!(out, "{:<6}{:<16}{:<32}{:<28}{:.6}",
			         i + 1,
			         entry.pid_column(),
			         entry.command,
			         entry.started.format(START_TIME_FORMAT).to_string(),
			         entry.execution_seconds())?;
		}
		out.flush()
	}
}

impl Default for Ledger {
	fn default() -> Ledger {
		Ledger::new(DEFAULT_CAPACITY)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(command: &str, millis: Option<u64>) -> HistoryEntry {
		HistoryEntry::new(vec![Pid::from_raw(42)], Local::now(), command, millis.map(Duration::from_millis))
	}

	#[test]
	fn keeps_dispatch_order() {
		let mut ledger = Ledger::new(5);
		for c in &["ls", "pwd", "cd /tmp"] {
			ledger.push(entry(c, Some(1))).unwrap();
		}
		let commands: Vec<&str> = ledger.entries().iter().map(|e| e.command.as_str()).collect();
		assert_eq!(commands, vec!["ls", "pwd", "cd /tmp"]);
	}

	#[test]
	fn rejects_beyond_capacity_without_eviction() {
		let mut ledger = Ledger::new(2);
		ledger.push(entry("one", Some(1))).unwrap();
		ledger.push(entry("two", Some(1))).unwrap();
		assert_eq!(ledger.push(entry("three", Some(1))), Err(LedgerFull { capacity: 2 }));
		assert_eq!(ledger.len(), 2);
		assert_eq!(ledger.entries()[0].command, "one");
		assert_eq!(ledger.entries()[1].command, "two");
	}

	#[test]
	fn background_duration_reads_as_zero() {
		let e = entry("sleep 1 &", None);
		assert_eq!(e.execution_seconds(), 0.0);
	}

	#[test]
	fn dump_prints_header_and_one_row_per_entry() {
		let mut ledger = Ledger::new(10);
		ledger.push(entry("ls -l", Some(1500))).unwrap();
		let mut bg = entry("sleep 5 | cat &", None);
		bg.pids = vec![Pid::from_raw(100), Pid::from_raw(101)];
		ledger.push(bg).unwrap();

		let mut out: Vec<u8> = vec![];
		ledger.dump(&mut out).unwrap();
		let text = String::from_utf8(out).unwrap();
		let lines: Vec<&str> = text.lines().collect();
		assert_eq!(lines.len(), 3);
		assert!(lines[0].starts_with("No."));
		assert!(lines[0].contains("Execution Time"));
		assert!(lines[1].starts_with("1 "));
		assert!(lines[1].contains("ls -l"));
		assert!(lines[1].ends_with("1.500000"));
		assert!(lines[2].contains("100,101"));
		assert!(lines[2].ends_with("0.000000"));
	}

	#[test]
	fn render_matches_dump() {
		let mut ledger = Ledger::new(2);
		ledger.push(entry("ls", Some(3))).unwrap();
		let mut out: Vec<u8> = vec![];
		ledger.dump(&mut out).unwrap();
		assert_eq!(ledger.render(), out);
	}

	#[test]
	fn empty_dump_is_just_the_header() {
		let mut out: Vec<u8> = vec![];
		Ledger::default().dump(&mut out).unwrap();
		assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
	}
}
