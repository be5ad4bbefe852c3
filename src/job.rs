use std::sync::{Arc,Mutex,MutexGuard,PoisonError};

use nix::errno::Errno;
use nix::sys::signal::{self,Signal};
use nix::sys::wait::{waitpid,WaitPidFlag,WaitStatus};
use nix::unistd::{self,ForkResult,Pid};
use tracing::{debug,trace,warn};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum State { Active, Terminated }

pub trait WaitStatusExt {
	fn state(self) -> State;
	fn code(self) -> Option<i32>;
}

impl WaitStatusExt for WaitStatus {
	fn state(self) -> State {
		match self {
			WaitStatus::Exited(..) | WaitStatus::Signaled(..) => State::Terminated,
			_ => State::Active,
		}
	}

	fn code(self) -> Option<i32> {
		match self {
			WaitStatus::Exited(_, code) => Some(code),
			WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
			_ => None,
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Exit {
	Status(WaitStatus),
	/// The status was already collected by someone else.
	Unknown,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Process {
	pub pid: Pid,
	pub exit: Option<Exit>,
}

impl Process {
	pub fn state(&self) -> State {
		if self.exit.is_some() { State::Terminated } else { State::Active }
	}

	pub fn code(&self) -> Option<i32> {
		match self.exit {
			Some(Exit::Status(status)) => status.code(),
			_ => None,
		}
	}
}

#[derive(Debug)]
pub struct Job {
	/// Set for background jobs only; foreground children share the shell's group.
	pub pgid: Option<Pid>,
	pub processes: Vec<Process>,
}

impl Job {
	pub fn state(&self) -> State {
		self.processes.iter().map(Process::state).min().unwrap_or(State::Terminated)
	}

	pub fn pids(&self) -> Vec<Pid> {
		self.processes.iter().map(|pr| pr.pid).collect()
	}

	/// Blocks until every process has been collected, in whatever order they exit.
	pub fn wait(&mut self) {
		for pr in self.processes.iter_mut().filter(|pr| pr.exit.is_none()) {
			pr.exit = Some(wait_for(pr.pid));
		}
	}

	/// Terminates what is still running and collects it.
	pub fn abort(&mut self) {
		if self.state() == State::Terminated {
			return;
		}
		for pr in self.processes.iter().filter(|pr| pr.exit.is_none()) {
			if let Err(e) = signal::kill(pr.pid, Signal::SIGTERM) {
				warn!(pid = %pr.pid, error = %e, "cannot terminate child");
			}
		}
		self.wait();
	}
}

fn wait_for(pid: Pid) -> Exit {
	loop {
		match waitpid(pid, None) {
			Ok(status) if status.state() == State::Terminated => {
				trace!(%pid, ?status, "collected child");
				return Exit::Status(status);
			},
			Ok(_) | Err(Errno::EINTR) => {},
			Err(Errno::ECHILD) => {
				warn!(%pid, "child was collected elsewhere");
				return Exit::Unknown;
			},
			Err(e) => {
				warn!(%pid, error = %e, "wait failed");
				return Exit::Unknown;
			},
		}
	}
}

#[derive(Debug)]
pub struct JobBuilder {
	imp: Job,
	is_background: bool,
}

impl JobBuilder {
	pub fn new(size_hint: usize, is_background: bool) -> JobBuilder {
		JobBuilder {
			imp: Job { pgid: None, processes: Vec::with_capacity(size_hint) },
			is_background: is_background,
		}
	}

	/// Forks one stage. Background stages join a group led by the first one;
	/// both sides call setpgid so the group exists before either proceeds.
	pub fn push_fork(&mut self) -> nix::Result<ForkResult> {
		let r = unsafe { unistd::fork() }?;
		match r {
			ForkResult::Parent { child: pid } => {
				if self.is_background {
					let pgid = *self.imp.pgid.get_or_insert(pid);
					let _ = unistd::setpgid(pid, pgid);
				}
				debug!(%pid, stage = self.imp.processes.len(), background = self.is_background, "forked stage");
				self.imp.processes.push(Process { pid: pid, exit: None });
			},
			ForkResult::Child => {
				if self.is_background {
					let pgid = self.imp.pgid.unwrap_or(Pid::from_raw(0));
					let _ = unistd::setpgid(Pid::from_raw(0), pgid);
				}
			},
		}
		Ok(r)
	}

	pub fn is_empty(&self) -> bool {
		self.imp.processes.is_empty()
	}

	pub fn build(self) -> Job {
		self.imp
	}
}

#[derive(Debug)]
struct BackgroundJob {
	pgid: Pid,
	pending: Vec<Pid>,
	command: String,
}

impl BackgroundJob {
	// Only this job's process group is waited on, never a foreground child.
	fn reap(&mut self) -> usize {
		let group = Pid::from_raw(-self.pgid.as_raw());
		let mut collected = 0;
		loop {
			match waitpid(group, Some(WaitPidFlag::WNOHANG)) {
				Ok(WaitStatus::StillAlive) => break,
				Ok(status) => {
					if let (State::Terminated, Some(pid)) = (status.state(), status.pid()) {
						trace!(%pid, ?status, "reaped background child");
						self.pending.retain(|&p| p != pid);
						collected += 1;
					}
				},
				Err(Errno::EINTR) => {},
				Err(Errno::ECHILD) => {
					self.pending.clear();
					break;
				},
				Err(e) => {
					warn!(pgid = %self.pgid, error = %e, "cannot reap background job");
					break;
				},
			}
		}
		if self.pending.is_empty() {
			debug!(pgid = %self.pgid, command = %self.command, "background job finished");
		}
		collected
	}
}

/// Background jobs awaiting asynchronous reaping. Cloning shares the set.
#[derive(Debug, Clone, Default)]
pub struct JobSet {
	jobs: Arc<Mutex<Vec<BackgroundJob>>>,
}

impl JobSet {
	pub fn new() -> JobSet {
		JobSet::default()
	}

	fn lock(&self) -> MutexGuard<'_, Vec<BackgroundJob>> {
		self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Registers a launched background job, then reaps once in case its
	/// children exited before registration.
	pub fn push(&self, job: Job, command: &str) {
		let pids = job.pids();
		let pgid = match (job.pgid, pids.first()) {
			(Some(pgid), _) => pgid,
			(None, Some(&pid)) => pid,
			(None, None) => return,
		};
		self.lock().push(BackgroundJob { pgid: pgid, pending: pids, command: command.to_owned() });
		self.reap();
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	/// Non-blocking: collects every exited background child, returns how many.
	pub fn reap(&self) -> usize {
		let mut collected = 0;
		self.lock().retain_mut(|job| {
			collected += job.reap();
			!job.pending.is_empty()
		});
		collected
	}
}
