mod types;
mod parser;
mod builtin;
mod eval;
mod global;
mod input;
mod job;
mod ledger;
mod pipe;
mod signal;

use std::{env,io};
use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tracing::{debug,error};
use tracing_subscriber::EnvFilter;

use crate::input::{InputError,Line};

#[derive(Debug, Parser)]
#[command(name = "pipeish", version, about = "A pipeline shell that keeps a ledger of every command it runs")]
struct Args {
	/// Maximum number of entries kept in the history ledger
	#[arg(long, default_value_t = ledger::DEFAULT_CAPACITY)]
	history_capacity: usize,

	/// Log filter for diagnostics written to stderr
	#[arg(long, env = "PIPEISH_LOG", default_value = "warn")]
	log: String,
}

fn prompt() -> String {
	match env::current_dir() {
		Ok(cwd) => match cwd.file_name() {
			Some(name) => format!("pipeish:{}$ ", name.to_string_lossy()),
			None => format!("pipeish:{}$ ", cwd.display()),
		},
		Err(_) => "pipeish$ ".to_owned(),
	}
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::new(&args.log))
		.with_writer(io::stderr)
		.with_target(false)
		.init();

	let mut state = global::State::with_capacity(args.history_capacity);
	signal::spawn_handler(state.ledger.clone(), state.job_set.clone())
		.context("cannot install signal handlers")?;
	let mut input = input::Input::new().context("cannot open line input")?;
	debug!(capacity = args.history_capacity, "pipeish started");

	run(&mut state, || input.read_line(&prompt()), &mut io::stdout()).context("cannot read input")?;
	Ok(())
}

/// Reads and dispatches lines until `exit`. End of input and read errors
/// both leave through `exit`, so the ledger is dumped either way.
fn run<F>(state: &mut global::State, mut read_line: F, out: &mut dyn Write) -> Result<(), InputError>
	where F: FnMut() -> Result<Line, InputError>
{
	let result = loop {
		match read_line() {
			Ok(Line::Text(line)) => {
				if eval::eval(state, &line, out) == builtin::Flow::Exit {
					break Ok(());
				}
			},
			Ok(Line::Eof) => {
				eval::eval(state, "exit", out);
				break Ok(());
			},
			Ok(Line::Interrupted) => signal::interrupt(&state.ledger),
			Err(e) => {
				error!(error = %e, "input failed");
				eval::eval(state, "exit", out);
				break Err(e);
			},
		}
	};
	if !state.job_set.is_empty() {
		debug!("leaving background jobs running");
	}
	result
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn read_error_dumps_the_ledger_before_failing() {
		let mut state = global::State::with_capacity(4);
		let mut lines = vec![
			Ok(Line::Text("pwd\n".to_owned())),
			Err(InputError::Io(io::Error::new(io::ErrorKind::Other, "terminal went away"))),
			Ok(Line::Text("pwd\n".to_owned())),
		].into_iter();
		let mut out: Vec<u8> = vec![];

		let r = run(&mut state, || lines.next().unwrap_or(Ok(Line::Eof)), &mut out);
		assert!(matches!(r, Err(InputError::Io(_))));
		let text = String::from_utf8(out).unwrap();
		let dump: Vec<&str> = text.lines().skip_while(|l| !l.starts_with("No.")).collect();
		assert_eq!(dump.len(), 2, "{}", text);
		assert!(dump[1].contains("pwd"));
		assert_eq!(lines.count(), 1);
	}

	#[test]
	fn end_of_input_behaves_like_exit() {
		let mut state = global::State::with_capacity(4);
		let mut lines = vec![Ok(Line::Text("pwd\n".to_owned()))].into_iter();
		let mut out: Vec<u8> = vec![];

		run(&mut state, || lines.next().unwrap_or(Ok(Line::Eof)), &mut out).unwrap();
		assert!(String::from_utf8(out).unwrap().contains("No."));
		assert_eq!(state.ledger().len(), 1);
	}
}
