use std::ffi::{CString,NulError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
	pub argv: Vec<String>,
}

impl Stage {
	pub fn new<S: Into<String>>(argv: Vec<S>) -> Stage {
		Stage { argv: argv.into_iter().map(Into::into).collect() }
	}

	pub fn program(&self) -> &str {
		self.argv.first().map_or("", String::as_str)
	}

	pub fn arguments(&self) -> &[String] {
		self.argv.get(1..).unwrap_or(&[])
	}

	pub fn to_cstrings(&self) -> Result<Vec<CString>, NulError> {
		self.argv.iter().map(|a| CString::new(a.as_bytes())).collect()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
	pub stages: Vec<Stage>,
	pub is_background: bool,
}

impl PipelineSpec {
	pub fn new(stages: Vec<Stage>, is_background: bool) -> PipelineSpec {
		PipelineSpec { stages: stages, is_background: is_background }
	}

	pub fn len(&self) -> usize {
		self.stages.len()
	}
}
