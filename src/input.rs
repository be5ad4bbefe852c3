use std::io;
use std::io::{BufRead,IsTerminal};

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
	#[error("line editor: {0}")]
	Editor(#[from] ReadlineError),
	#[error("cannot read input: {0}")]
	Io(#[from] io::Error),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Line {
	Text(String),
	Eof,
	/// Ctrl-C typed at the prompt while the editor owns the terminal.
	Interrupted,
}

pub enum Input {
	Editor(DefaultEditor),
	Plain(io::StdinLock<'static>),
}

impl Input {
	/// An editor on a terminal, a plain reader with no prompt otherwise.
	pub fn new() -> Result<Input, InputError> {
		if io::stdin().is_terminal() {
			Ok(Input::Editor(DefaultEditor::new()?))
		} else {
			Ok(Input::Plain(io::stdin().lock()))
		}
	}

	pub fn read_line(&mut self, prompt: &str) -> Result<Line, InputError> {
		match *self {
			Input::Editor(ref mut rl) => match rl.readline(prompt) {
				Ok(line) => {
					if !line.trim().is_empty() {
						let _ = rl.add_history_entry(line.as_str());
					}
					Ok(Line::Text(line))
				},
				Err(ReadlineError::Interrupted) => Ok(Line::Interrupted),
				Err(ReadlineError::Eof) => Ok(Line::Eof),
				Err(e) => Err(e.into()),
			},
			Input::Plain(ref mut stdin) => read_plain(stdin),
		}
	}
}

fn read_plain<R: BufRead>(reader: &mut R) -> Result<Line, InputError> {
	let mut line: Vec<u8> = vec![];
	loop {
		match reader.read_until(b'\n', &mut line) {
			Ok(0) if line.is_empty() => return Ok(Line::Eof),
			Ok(_) => return Ok(Line::Text(String::from_utf8_lossy(&line).into_owned())),
			Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {},
			Err(e) => return Err(e.into()),
		}
	}
}
