use std::{env,io};
use std::io::Write;

use thiserror::Error;

use crate::global;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow { Continue, Exit }

#[derive(Debug, Error)]
pub enum BuiltinError {
	#[error("{0}: expected argument")]
	MissingArgument(&'static str),
	#[error("cd: {path}: {source}")]
	ChangeDir { path: String, source: io::Error },
	#[error("pwd: {0}")]
	CurrentDir(#[source] io::Error),
	#[error("{0}: cannot write output: {1}")]
	Output(&'static str, #[source] io::Error),
}

pub type Builtin = fn(&mut global::State, &[String], &mut dyn Write) -> Result<Flow, BuiltinError>;

const CLEAR_SCREEN: &[u8] = b"\x1b[H\x1b[J";

pub fn builtin_cd(_: &mut global::State, args: &[String], _: &mut dyn Write) -> Result<Flow, BuiltinError> {
	let path = args.first().ok_or(BuiltinError::MissingArgument("cd"))?;
	env::set_current_dir(path).map_err(|e| BuiltinError::ChangeDir { path: path.clone(), source: e })?;
	Ok(Flow::Continue)
}

pub fn builtin_pwd(_: &mut global::State, _: &[String], out: &mut dyn Write) -> Result<Flow, BuiltinError> {
	let cwd = env::current_dir().map_err(BuiltinError::CurrentDir)?;
	writeln!(out, "{}", cwd.display()).map_err(|e| BuiltinError::Output("pwd", e))?;
	Ok(Flow::Continue)
}

pub fn builtin_clear(_: &mut global::State, _: &[String], out: &mut dyn Write) -> Result<Flow, BuiltinError> {
	out.write_all(CLEAR_SCREEN)
		.and_then(|_| out.flush())
		.map_err(|e| BuiltinError::Output("clear", e))?;
	Ok(Flow::Continue)
}

pub fn builtin_history(state: &mut global::State, _: &[String], out: &mut dyn Write) -> Result<Flow, BuiltinError> {
	state.write_ledger(out).map_err(|e| BuiltinError::Output("history", e))?;
	Ok(Flow::Continue)
}

/// Dumps the ledger; the caller terminates without recording this line.
pub fn builtin_exit(state: &mut global::State, _: &[String], out: &mut dyn Write) -> Result<Flow, BuiltinError> {
	state.write_ledger(out).map_err(|e| BuiltinError::Output("exit", e))?;
	Ok(Flow::Exit)
}

const BUILTINS: [(&str, Builtin); 5] = [
	("cd", builtin_cd as Builtin),
	("pwd", builtin_pwd as Builtin),
	("clear", builtin_clear as Builtin),
	("history", builtin_history as Builtin),
	("exit", builtin_exit as Builtin),
];

pub fn match_builtin(name: &str) -> Option<Builtin> {
	BUILTINS.iter().find(|&&(n, _)| n == name).map(|&(_, func)| func)
}
