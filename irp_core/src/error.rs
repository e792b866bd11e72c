use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;

use crate::Position;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum IrpError {
	#[error(transparent)]
	#[diagnostic(code(irp::io_error))]
	Io(#[from] std::io::Error),

	#[error("{file}:{line}:{column}: {message}")]
	#[diagnostic(
		code(irp::syntax),
		help("fix the source before compiling; no output is written for malformed input")
	)]
	Syntax {
		file: String,
		line: usize,
		column: usize,
		message: String,
	},

	#[error("duplicate definition of `{name}`: defined at {first} and {second}")]
	#[diagnostic(
		code(irp::duplicate_definition),
		help("each variable may be produced by exactly one provider")
	)]
	DuplicateDefinition {
		name: String,
		first: String,
		second: String,
	},

	#[error("cyclic dependency between providers: {}", .cycle.join(" -> "))]
	#[diagnostic(
		code(irp::cyclic_dependency),
		help("a provider cannot depend on itself, even through other providers")
	)]
	CyclicDependency { cycle: Vec<String> },

	#[error("{location}: touch of `{name}` which has no provider and is never assigned")]
	#[diagnostic(
		code(irp::unknown_touch_target),
		help("declare a provider for `{name}` or check the spelling of the touch call")
	)]
	UnknownTouchTarget { name: String, location: String },

	#[error("{location}: provider for `{name}` does not assign it on every path")]
	#[diagnostic(
		code(irp::incomplete_provider),
		help("assign `{name}` unconditionally before the provider returns")
	)]
	IncompleteProvider { name: String, location: String },

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(irp::config_parse),
		help("check that irp.toml is valid TOML with [naming], [output], [include] or [exclude] sections")
	)]
	ConfigParse(String),

	#[error("file too large: `{path}` is {size} bytes (limit: {limit} bytes)")]
	#[diagnostic(
		code(irp::file_too_large),
		help("raise `max_file_size` in irp.toml or exclude this file")
	)]
	FileTooLarge { path: String, size: u64, limit: u64 },

	#[error("no input files found under `{0}`")]
	#[diagnostic(
		code(irp::no_input_files),
		help("pass source files explicitly or adjust the [include] patterns in irp.toml")
	)]
	NoInputFiles(String),
}

impl IrpError {
	/// Build a [`IrpError::Syntax`] error pointing at `position` in `file`.
	pub fn syntax(file: &Path, position: Position, message: impl Into<String>) -> Self {
		Self::Syntax {
			file: file.display().to_string(),
			line: position.start.line,
			column: position.start.column,
			message: message.into(),
		}
	}
}

/// Render a `file:line:column` location string for diagnostics.
pub fn location(file: &Path, position: Position) -> String {
	format!(
		"{}:{}:{}",
		file.display(),
		position.start.line,
		position.start.column
	)
}

pub type IrpResult<T> = Result<T, IrpError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
