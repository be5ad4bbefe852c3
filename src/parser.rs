use thiserror::Error;

use crate::types::*;

#[derive(Debug, PartialEq, Eq, Error)]
pub enum ParseError {
	/// Carries the 1-based position of the offending stage.
	#[error("empty command in stage {0} of the pipeline")]
	EmptyStage(usize),
}

pub type ParseResult<T> = Result<T, ParseError>;

const PIPE: char = '|';
const BACKGROUND: char = '&';

struct Parser<'a> {
	line: &'a str,
	i: usize,
}

impl<'a> Parser<'a> {
	fn new(line: &'a str) -> Parser<'a> {
		Parser { line: line, i: 0 }
	}

	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.as_bytes().get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		match c {
			b' ' | b'\t' | b'\n' | b'\r' => true,
			_ => false,
		}
	}

	fn is_letter(c: u8) -> bool {
		!Parser::is_whitespace(c)
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	// Delimiters are ASCII, so `i` always sits on a char boundary.
	fn read_word(&mut self) -> &'a str {
		let orig = self.i;
		self.proceed_while(Parser::is_letter);
		&self.line[orig .. self.i]
	}

	fn read_words(&mut self) -> Vec<&'a str> {
		let mut words: Vec<&'a str> = vec![];
		loop {
			self.skip_whitespaces();
			let word = self.read_word();
			if word.is_empty() {
				break;
			}
			words.push(word);
		}
		words
	}
}

/// Splits one stage on runs of whitespace. No quoting: every delimiter splits.
pub fn tokenize(stage: &str) -> Vec<&str> {
	Parser::new(stage).read_words()
}

pub fn has_pipe(line: &str) -> bool {
	line.contains(PIPE)
}

/// Splits a line on the pipe delimiter without trimming the pieces.
pub fn split_stages(line: &str) -> Vec<&str> {
	line.split(PIPE).collect()
}

/// Trims the line and removes one trailing background marker.
pub fn strip_background(line: &str) -> (&str, bool) {
	let trimmed = line.trim();
	match trimmed.strip_suffix(BACKGROUND) {
		Some(rest) => (rest, true),
		None => (trimmed, false),
	}
}

/// Turns a raw line into a pipeline. `Ok(None)` means there is nothing to run.
pub fn parse(line: &str) -> ParseResult<Option<PipelineSpec>> {
	let (body, is_background) = strip_background(line);
	if tokenize(body).is_empty() && !has_pipe(body) {
		return Ok(None);
	}

	let pieces = if has_pipe(body) { split_stages(body) } else { vec![body] };
	let mut stages: Vec<Stage> = Vec::with_capacity(pieces.len());
	for (i, piece) in pieces.into_iter().enumerate() {
		let argv = tokenize(piece);
		if argv.is_empty() {
			return Err(ParseError::EmptyStage(i + 1));
		}
		stages.push(Stage::new(argv));
	}
	Ok(Some(PipelineSpec::new(stages, is_background)))
}
