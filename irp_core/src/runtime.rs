//! An executable model of the generated program.
//!
//! Generated code keeps one boolean flag per provider variable, a guard before
//! every use and a touch routine per touched variable. [`Evaluator`] does the
//! same over Rust closures, so memoization and invalidation can be exercised
//! without compiling the generated source.

use std::collections::HashMap;

use miette::Diagnostic;
use thiserror::Error;

use crate::Compilation;

/// State of a variable's cached value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Freshness {
	/// Not computed yet, or invalidated by a touch.
	#[default]
	Stale,
	/// Computed and not invalidated since.
	Fresh,
}

/// Per-variable staleness flags. Every variable starts out stale.
#[derive(Debug, Clone, Default)]
pub struct FlagRegistry {
	flags: HashMap<String, Freshness>,
}

impl FlagRegistry {
	pub fn get(&self, variable: &str) -> Freshness {
		self.flags.get(variable).copied().unwrap_or_default()
	}

	pub fn mark_fresh(&mut self, variable: &str) {
		self.flags.insert(variable.to_string(), Freshness::Fresh);
	}

	/// Reset a flag. Resetting a stale flag does nothing.
	pub fn invalidate(&mut self, variable: &str) {
		self.flags.insert(variable.to_string(), Freshness::Stale);
	}
}

#[derive(Debug, Diagnostic, Error)]
pub enum EvalError {
	#[error("`{0}` has no provider and no value")]
	#[diagnostic(code(irp::eval::unknown_variable))]
	UnknownVariable(String),

	#[error("provider for `{0}` was re-entered while it was running")]
	#[diagnostic(
		code(irp::eval::reentrant),
		help("providers form a cycle; the compiler rejects these graphs")
	)]
	Reentrant(String),

	#[error("provider for `{name}` failed: {message}")]
	#[diagnostic(code(irp::eval::provider_failed))]
	ProviderFailed { name: String, message: String },
}

impl EvalError {
	pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
		Self::ProviderFailed {
			name: name.into(),
			message: message.into(),
		}
	}
}

/// The body of a provider: computes the variable's value, possibly reading
/// other variables through the evaluator.
pub type ProviderFn<T> = Box<dyn FnMut(&mut Evaluator<T>) -> Result<T, EvalError>>;

/// Runs providers lazily with memoization and touch-driven invalidation.
///
/// Single-threaded: every operation takes `&mut self`.
pub struct Evaluator<T> {
	flags: FlagRegistry,
	values: HashMap<String, T>,
	/// `None` while the provider is running.
	providers: HashMap<String, Option<ProviderFn<T>>>,
	/// Transitive dependents of each variable.
	dependents: HashMap<String, Vec<String>>,
	invocations: HashMap<String, usize>,
}

impl<T> Default for Evaluator<T> {
	fn default() -> Self {
		Self {
			flags: FlagRegistry::default(),
			values: HashMap::new(),
			providers: HashMap::new(),
			dependents: HashMap::new(),
			invocations: HashMap::new(),
		}
	}
}

impl<T: Clone> Evaluator<T> {
	pub fn new() -> Self {
		Self::default()
	}

	/// An evaluator whose touch cascades follow the invalidation sets of a
	/// compilation. Provider bodies still have to be registered.
	pub fn from_compilation(compilation: &Compilation) -> Self {
		let mut evaluator = Self::new();
		let variables = compilation
			.graph
			.ids()
			.map(|id| compilation.graph.name(id).to_string())
			.chain(compilation.graph.inputs().keys().cloned());

		for variable in variables {
			let dependents = compilation
				.invalidation
				.dependents_of(&variable)
				.into_iter()
				.map(ToString::to_string)
				.collect();
			evaluator.dependents.insert(variable, dependents);
		}

		evaluator
	}

	/// Register the provider of `variable`.
	pub fn provider(
		&mut self,
		variable: &str,
		body: impl FnMut(&mut Evaluator<T>) -> Result<T, EvalError> + 'static,
	) -> &mut Self {
		self.providers
			.insert(variable.to_string(), Some(Box::new(body)));
		self
	}

	/// Set the variables that a touch of `variable` invalidates.
	pub fn dependents<I, S>(&mut self, variable: &str, dependents: I) -> &mut Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.dependents.insert(
			variable.to_string(),
			dependents.into_iter().map(Into::into).collect(),
		);
		self
	}

	/// The guard: return the cached value when fresh, otherwise run the
	/// provider. The flag is set only after the provider succeeds, so a failed
	/// provider is retried on the next access.
	pub fn get(&mut self, variable: &str) -> Result<T, EvalError> {
		if self.flags.get(variable) == Freshness::Fresh {
			if let Some(value) = self.values.get(variable) {
				return Ok(value.clone());
			}
		}

		let Some(slot) = self.providers.get_mut(variable) else {
			return self
				.values
				.get(variable)
				.cloned()
				.ok_or_else(|| EvalError::UnknownVariable(variable.to_string()));
		};

		let Some(mut body) = slot.take() else {
			return Err(EvalError::Reentrant(variable.to_string()));
		};

		*self.invocations.entry(variable.to_string()).or_default() += 1;
		let result = body(self);
		self.providers.insert(variable.to_string(), Some(body));

		let value = result?;
		self.values.insert(variable.to_string(), value.clone());
		self.flags.mark_fresh(variable);

		Ok(value)
	}

	/// Overwrite a variable outside its provider. A stale provider variable is
	/// provided first, so the next guard keeps the assigned value.
	pub fn assign(&mut self, variable: &str, value: T) -> Result<(), EvalError> {
		if self.providers.contains_key(variable) && self.flags.get(variable) == Freshness::Stale {
			self.get(variable)?;
		}

		self.values.insert(variable.to_string(), value);
		Ok(())
	}

	/// Invalidate every transitive dependent of `variable`. The variable's own
	/// flag is left alone.
	pub fn touch(&mut self, variable: &str) {
		let Some(dependents) = self.dependents.get(variable) else {
			return;
		};

		for dependent in dependents {
			self.flags.invalidate(dependent);
		}
	}

	pub fn freshness(&self, variable: &str) -> Freshness {
		self.flags.get(variable)
	}

	/// How often the provider of `variable` has run.
	pub fn invocations(&self, variable: &str) -> usize {
		self.invocations.get(variable).copied().unwrap_or_default()
	}
}
