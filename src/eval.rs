use std::{fmt,io};
use std::ffi::{CString,NulError};
use std::io::Write;
use std::time::Instant;

use chrono::Local;
use nix::errno::Errno;
use nix::unistd::{self,ForkResult,Pid};
use thiserror::Error;
use tracing::{debug,trace,warn};

use crate::builtin::{self,Flow};
use crate::global;
use crate::job;
use crate::ledger::HistoryEntry;
use crate::parser;
use crate::pipe::PipeLinks;
use crate::types::*;

const EXIT_NOT_FOUND: i32 = 127;
const EXIT_CANNOT_EXEC: i32 = 126;

#[derive(Debug, Error)]
pub enum ExecError {
	#[error("cannot create pipe: {0}")]
	Pipe(#[source] nix::Error),
	#[error("cannot fork stage {stage}: {source}")]
	Fork { stage: usize, #[source] source: nix::Error },
	#[error("argument contains a nul byte: {0}")]
	Nul(#[from] NulError),
	#[error("stage {0} has no program")]
	EmptyStage(usize),
}

// Everything a child needs is built before forking; the child itself
// neither allocates nor locks.
struct PreparedStage {
	argv: Vec<CString>,
	diagnostic_prefix: Vec<u8>,
}

impl PreparedStage {
	fn new(stage: &Stage) -> Result<PreparedStage, NulError> {
		Ok(PreparedStage {
			argv: stage.to_cstrings()?,
			diagnostic_prefix: format!("pipeish: {}: ", stage.program()).into_bytes(),
		})
	}
}

fn write_stderr(bytes: &[u8]) {
	let _ = unistd::write(io::stderr(), bytes);
}

fn child_exit(code: i32) -> ! {
	unsafe { libc::_exit(code) }
}

fn exec_stage(stage: &PreparedStage) -> ! {
	let e = match unistd::execvp(&stage.argv[0], &stage.argv) {
		Ok(never) => match never {},
		Err(e) => e,
	};
	write_stderr(&stage.diagnostic_prefix);
	if e == Errno::ENOENT {
		write_stderr(b"command not found\n");
		child_exit(EXIT_NOT_FOUND)
	} else {
		write_stderr(e.desc().as_bytes());
		write_stderr(b"\n");
		child_exit(EXIT_CANNOT_EXEC)
	}
}

fn spawn_commands(pipeline: &PipelineSpec, job_builder: &mut job::JobBuilder) -> Result<(), ExecError> {
	if let Some(i) = pipeline.stages.iter().position(|s| s.argv.is_empty()) {
		return Err(ExecError::EmptyStage(i + 1));
	}
	let stages: Vec<PreparedStage> = pipeline.stages.iter()
		.map(PreparedStage::new)
		.collect::<Result<_, _>>()?;
	let mut links = PipeLinks::allocate(stages.len()).map_err(ExecError::Pipe)?;
	debug!(stages = stages.len(), links = links.len(), "allocated pipe links");
	for (i, stage) in stages.iter().enumerate() {
		let forked = job_builder.push_fork().map_err(|e| ExecError::Fork { stage: i + 1, source: e })?;
		match forked {
			ForkResult::Parent { .. } => {},
			ForkResult::Child => {
				if let Err(e) = links.wire(i) {
					write_stderr(&stage.diagnostic_prefix);
					write_stderr(e.desc().as_bytes());
					write_stderr(b"\n");
					child_exit(EXIT_CANNOT_EXEC);
				}
				exec_stage(stage);
			},
		}
	}
	links.close();
	Ok(())
}

pub enum EvalResult {
	Done(job::Job),
	Running(Vec<Pid>),
}

/// Launches a pipeline. Foreground pipelines are waited on; background ones
/// are handed to the job set and reaped asynchronously.
pub fn eval_pipeline(state: &mut global::State, pipeline: &PipelineSpec, command: &str) -> Result<EvalResult, ExecError> {
	let mut job_builder = job::JobBuilder::new(pipeline.len(), pipeline.is_background);
	if let Err(e) = spawn_commands(pipeline, &mut job_builder) {
		if !job_builder.is_empty() {
			let mut job = job_builder.build();
			warn!(launched = job.processes.len(), error = %e, "aborting partially launched pipeline");
			job.abort();
		}
		return Err(e);
	}

	let mut job = job_builder.build();
	if pipeline.is_background {
		let pids = job.pids();
		state.job_set.push(job, command);
		Ok(EvalResult::Running(pids))
	} else {
		job.wait();
		trace!(codes = ?job.processes.iter().map(job::Process::code).collect::<Vec<_>>(), "pipeline finished");
		Ok(EvalResult::Done(job))
	}
}

fn report<E: fmt::Display>(e: E) {
	eprintln!("pipeish: {}", e);
}

/// Dispatches one raw line and records it in the ledger.
pub fn eval(state: &mut global::State, line: &str, out: &mut dyn Write) -> Flow {
	let pipeline = match parser::parse(line) {
		Ok(Some(pipeline)) => pipeline,
		Ok(None) => return Flow::Continue,
		Err(e) => {
			report(e);
			return Flow::Continue;
		},
	};
	let command = line.trim();
	let started = Local::now();
	let clock = Instant::now();

	if pipeline.len() == 1 {
		let stage = &pipeline.stages[0];
		if let Some(func) = builtin::match_builtin(stage.program()) {
			let flow = func(state, stage.arguments(), out).unwrap_or_else(|e| {
				report(e);
				Flow::Continue
			});
			if flow == Flow::Exit {
				return Flow::Exit;
			}
			state.record(HistoryEntry::new(vec![unistd::getpid()], started, command, Some(clock.elapsed())));
			return Flow::Continue;
		}
	}

	let (pids, duration) = match eval_pipeline(state, &pipeline, command) {
		Ok(EvalResult::Done(job)) => (job.pids(), Some(clock.elapsed())),
		Ok(EvalResult::Running(pids)) => {
			for pid in &pids {
				let _ = writeln!(out, "process {} moved to background", pid);
			}
			let _ = out.flush();
			(pids, None)
		},
		Err(e) => {
			report(e);
			(vec![], Some(clock.elapsed()))
		},
	};
	state.record(HistoryEntry::new(pids, started, command, duration));
	Flow::Continue
}
