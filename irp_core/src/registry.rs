use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use crate::IrpError;
use crate::IrpResult;
use crate::NamingConfig;
use crate::Position;
use crate::location;
use crate::scanner::writes_name;
use crate::syntax::Declaration;
use crate::syntax::Expr;
use crate::syntax::ForInit;
use crate::syntax::Function;
use crate::syntax::SourceUnit;
use crate::syntax::Statement;

/// A function that computes exactly one managed variable.
#[derive(Debug, Clone)]
pub struct Provider {
	/// The variable this provider owns, e.g. `x` for `provide_x`.
	pub variable: String,
	pub function: Function,
	/// The declaration of the variable inside the body. It is hoisted to
	/// global storage by the generator.
	pub declaration: Declaration,
	/// Index of `declaration` among the top-level statements of the body.
	pub declaration_index: usize,
	pub file: PathBuf,
}

impl Provider {
	/// The declared type of the variable, e.g. `float`.
	pub fn declared_type(&self) -> &str {
		&self.declaration.specifiers
	}

	pub fn location(&self) -> String {
		location(&self.file, self.function.position)
	}
}

/// A `touch_<var>()` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TouchPoint {
	pub variable: String,
	pub file: PathBuf,
	pub position: Position,
	/// Name of the function containing the touch.
	pub function: String,
}

#[derive(Debug, Clone)]
struct Global {
	file: PathBuf,
	position: Position,
}

/// The table of declared providers, global declarations and touch points of a
/// compilation.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
	providers: Vec<Provider>,
	by_name: HashMap<String, usize>,
	touches: Vec<TouchPoint>,
	globals: BTreeMap<String, Global>,
}

impl ProviderRegistry {
	/// Collect and validate providers across every unit.
	///
	/// Validation runs in a fixed order and stops at the first failure:
	/// provider shape, duplicate definitions, completeness, then touch targets.
	pub fn build(units: &[SourceUnit], naming: &NamingConfig) -> IrpResult<Self> {
		let mut registry = Self::default();
		let mut candidates = Vec::new();

		for unit in units {
			for declaration in unit.declarations() {
				for declarator in &declaration.declarators {
					registry
						.globals
						.entry(declarator.name.clone())
						.or_insert_with(|| {
							Global {
								file: unit.file.clone(),
								position: declarator.position,
							}
						});
				}
			}

			for function in unit.functions() {
				if function.name.starts_with(naming.touch_prefix.as_str()) {
					return Err(IrpError::syntax(
						&unit.file,
						function.position,
						format!("`{}` is generated and cannot be defined", function.name),
					));
				}

				for statement in function.body.iter() {
					statement.for_each_touch(&mut |variable, position| {
						registry.touches.push(TouchPoint {
							variable: variable.to_string(),
							file: unit.file.clone(),
							position,
							function: function.name.clone(),
						});
					});
				}

				if let Some(variable) = naming.provided_variable(&function.name) {
					candidates.push(provider_shape(&unit.file, function, variable)?);
				}
			}
		}

		for provider in candidates {
			registry.insert(provider)?;
		}

		for provider in &registry.providers {
			check_complete(provider)?;
		}

		registry.check_touch_targets(units)?;

		tracing::debug!(
			providers = registry.providers.len(),
			touches = registry.touches.len(),
			"registered providers"
		);

		Ok(registry)
	}

	fn insert(&mut self, provider: Provider) -> IrpResult<()> {
		if let Some(&existing) = self.by_name.get(&provider.variable) {
			return Err(IrpError::DuplicateDefinition {
				name: provider.variable.clone(),
				first: self.providers[existing].location(),
				second: provider.location(),
			});
		}

		if let Some(global) = self.globals.get(&provider.variable) {
			return Err(IrpError::DuplicateDefinition {
				name: provider.variable.clone(),
				first: location(&global.file, global.position),
				second: provider.location(),
			});
		}

		self.by_name
			.insert(provider.variable.clone(), self.providers.len());
		self.providers.push(provider);

		Ok(())
	}

	fn check_touch_targets(&self, units: &[SourceUnit]) -> IrpResult<()> {
		for touch in &self.touches {
			if self.by_name.contains_key(&touch.variable)
				|| self.globals.contains_key(&touch.variable)
			{
				continue;
			}

			let mut assigned = false;
			for function in units.iter().flat_map(SourceUnit::functions) {
				for statement in function.body.iter() {
					statement.for_each_expr(&mut |expr| {
						assigned = assigned || writes_name(expr, &touch.variable);
					});
				}
			}

			if !assigned {
				return Err(IrpError::UnknownTouchTarget {
					name: touch.variable.clone(),
					location: location(&touch.file, touch.position),
				});
			}
		}

		Ok(())
	}

	/// Providers in declaration order.
	pub fn providers(&self) -> &[Provider] {
		&self.providers
	}

	pub fn get(&self, variable: &str) -> Option<&Provider> {
		self.by_name.get(variable).map(|&index| &self.providers[index])
	}

	pub fn is_provided(&self, variable: &str) -> bool {
		self.by_name.contains_key(variable)
	}

	/// The provider defined by the function named `function`, if any.
	pub fn by_function(&self, function: &str) -> Option<&Provider> {
		self.providers.iter().find(|p| p.function.name == function)
	}

	/// Every touch point in source order.
	pub fn touches(&self) -> &[TouchPoint] {
		&self.touches
	}

	/// Distinct touched variables in order of first touch.
	pub fn touched_variables(&self) -> Vec<&str> {
		let mut variables: Vec<&str> = Vec::new();
		for touch in &self.touches {
			if !variables.contains(&touch.variable.as_str()) {
				variables.push(&touch.variable);
			}
		}
		variables
	}

	pub fn len(&self) -> usize {
		self.providers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.providers.is_empty()
	}
}

/// Check the calling convention of a provider and find its hoisted
/// declaration.
fn provider_shape(file: &Path, function: &Function, variable: &str) -> IrpResult<Provider> {
	let fail = |message: String| Err(IrpError::syntax(file, function.position, message));

	if !function.params.is_empty() {
		return fail(format!("provider `{}` must not take parameters", function.name));
	}

	let returns_void = function
		.specifiers
		.split_whitespace()
		.any(|word| word == "void");
	if !returns_void || function.specifiers.contains('*') {
		return fail(format!("provider `{}` must return `void`", function.name));
	}

	let found = function
		.body
		.iter()
		.enumerate()
		.find_map(|(index, statement)| {
			match statement {
				Statement::Declaration(declaration)
					if declaration.names().any(|name| name == variable) =>
				{
					Some((index, declaration))
				}
				_ => None,
			}
		});

	let Some((declaration_index, declaration)) = found else {
		return fail(format!(
			"provider `{}` does not declare `{variable}` in its body",
			function.name
		));
	};

	if declaration.declarators.len() != 1 {
		return Err(IrpError::syntax(
			file,
			declaration.position,
			format!("the declaration of `{variable}` must not declare other names"),
		));
	}

	check_assignable(file, declaration, variable)?;

	Ok(Provider {
		variable: variable.to_string(),
		function: function.clone(),
		declaration: declaration.clone(),
		declaration_index,
		file: file.to_path_buf(),
	})
}

/// The hoisted declaration becomes a plain global and its initializer an
/// assignment, so the variable has to be assignable with that initializer.
fn check_assignable(file: &Path, declaration: &Declaration, variable: &str) -> IrpResult<()> {
	let fail = |message: String| Err(IrpError::syntax(file, declaration.position, message));
	let Some(declarator) = declaration.declarators.first() else {
		return Ok(());
	};

	// Qualifiers after the last `*` apply to the pointer itself.
	let qualifiers = match declarator.text.rfind('*') {
		Some(star) => &declarator.text[star + 1..],
		None => declaration.specifiers.as_str(),
	};
	if qualifiers.split_whitespace().any(|word| word == "const") {
		return fail(format!("provided variable `{variable}` must not be `const`"));
	}

	let Some(init) = &declarator.init else {
		return Ok(());
	};
	if init.text.trim_start().starts_with('{') {
		return fail(format!(
			"`{variable}` has a brace initializer; assign its members in the provider body instead"
		));
	}
	if declarator.text.contains('[') {
		return fail(format!(
			"array `{variable}` cannot be initialized in its declaration; assign its elements instead"
		));
	}

	Ok(())
}

/// How control leaves a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
	/// Falls through to the next statement; `true` when the variable is
	/// definitely assigned by then.
	Falls(bool),
	Returns,
}

fn check_complete(provider: &Provider) -> IrpResult<()> {
	let incomplete = || {
		IrpError::IncompleteProvider {
			name: provider.variable.clone(),
			location: provider.location(),
		}
	};

	match sequence(&provider.function.body, Some(&provider.variable), false, true) {
		Ok(Reach::Falls(true) | Reach::Returns) => Ok(()),
		Ok(Reach::Falls(false)) => Err(incomplete()),
		Err(position) => {
			Err(IrpError::IncompleteProvider {
				name: provider.variable.clone(),
				location: location(&provider.file, position),
			})
		}
	}
}

/// Fold a statement sequence. Statements after a `return` are dead and
/// ignored. `Err` carries the position of a `return` reached before the
/// variable is assigned.
///
/// `name` is `None` where a local declaration shadows the variable. Only in
/// the `top` level of the body does a declaration of the name refer to the
/// variable itself.
fn sequence(
	statements: &[Statement],
	name: Option<&str>,
	assigned: bool,
	top: bool,
) -> Result<Reach, Position> {
	let mut name = name;
	let mut assigned = assigned;

	for statement in statements {
		if !top && declares(statement, name) {
			name = None;
		}

		match reach(statement, name, assigned)? {
			Reach::Falls(now) => assigned = now,
			Reach::Returns => return Ok(Reach::Returns),
		}
	}

	Ok(Reach::Falls(assigned))
}

fn declares(statement: &Statement, name: Option<&str>) -> bool {
	match statement {
		Statement::Declaration(declaration) => declares_name(declaration, name),
		_ => false,
	}
}

fn declares_name(declaration: &Declaration, name: Option<&str>) -> bool {
	name.is_some_and(|name| declaration.names().any(|declared| declared == name))
}

fn writes(expr: &Expr, name: Option<&str>) -> bool {
	name.is_some_and(|name| writes_name(expr, name))
}

fn reach(statement: &Statement, name: Option<&str>, assigned: bool) -> Result<Reach, Position> {
	let writes_any = |statement: &Statement| {
		let mut found = false;
		statement.for_each_expr(&mut |expr| found = found || writes(expr, name));
		found
	};

	match statement {
		Statement::Block(block) => sequence(block, name, assigned, false),
		Statement::Declaration(declaration) => {
			let own = name.is_some_and(|name| {
				declaration
					.declarators
					.iter()
					.any(|d| d.name == name && d.init.is_some())
			});
			Ok(Reach::Falls(assigned || own || writes_any(statement)))
		}
		Statement::Expression(_) => Ok(Reach::Falls(assigned || writes_any(statement))),
		Statement::Return { position, .. } => {
			if assigned || writes_any(statement) {
				Ok(Reach::Returns)
			} else {
				Err(*position)
			}
		}
		Statement::If {
			condition,
			then_branch,
			else_branch,
			..
		} => {
			let assigned = assigned || writes(condition, name);
			let then_reach = reach(then_branch, name, assigned)?;
			let else_reach = match else_branch {
				Some(else_branch) => reach(else_branch, name, assigned)?,
				None => Reach::Falls(assigned),
			};

			Ok(match (then_reach, else_reach) {
				(Reach::Returns, Reach::Returns) => Reach::Returns,
				(Reach::Falls(left), Reach::Falls(right)) => Reach::Falls(left && right),
				(Reach::Falls(only), Reach::Returns) | (Reach::Returns, Reach::Falls(only)) => {
					Reach::Falls(only)
				}
			})
		}
		Statement::While {
			condition, body, ..
		}
		| Statement::Switch {
			condition, body, ..
		} => {
			let assigned = assigned || writes(condition, name);
			reach(body, name, assigned)?;
			Ok(Reach::Falls(assigned))
		}
		Statement::DoWhile {
			body, condition, ..
		} => {
			// The body runs at least once, unless a `break` or `continue`
			// leaves it early.
			let body_reach = reach(body, name, assigned)?;
			if escapes_loop(body) {
				return Ok(Reach::Falls(assigned));
			}
			Ok(match body_reach {
				Reach::Returns => Reach::Returns,
				Reach::Falls(now) => Reach::Falls(now || writes(condition, name)),
			})
		}
		Statement::For {
			init,
			condition,
			body,
			..
		} => {
			let mut inner = name;
			let init_writes = match init {
				Some(ForInit::Declaration(declaration)) => {
					if declares_name(declaration, name) {
						inner = None;
					}
					let mut found = false;
					declaration.for_each_init(&mut |expr| found = found || writes(expr, inner));
					found
				}
				Some(ForInit::Expression(expr)) => writes(expr, name),
				None => false,
			};
			let assigned = assigned
				|| init_writes
				|| condition.as_ref().is_some_and(|c| writes(c, inner));
			reach(body, inner, assigned)?;
			Ok(Reach::Falls(assigned))
		}
		Statement::Touch { .. }
		| Statement::Break(_)
		| Statement::Continue(_)
		| Statement::Label { .. }
		| Statement::Comment { .. }
		| Statement::Empty(_) => Ok(Reach::Falls(assigned)),
	}
}

/// Whether `statement` contains a `break` or `continue` that applies to the
/// loop enclosing it.
fn escapes_loop(statement: &Statement) -> bool {
	match statement {
		Statement::Break(_) | Statement::Continue(_) => true,
		Statement::Block(block) => block.iter().any(escapes_loop),
		Statement::If {
			then_branch,
			else_branch,
			..
		} => escapes_loop(then_branch) || else_branch.as_deref().is_some_and(escapes_loop),
		// A `break` here leaves the switch, but `continue` still targets the loop.
		Statement::Switch { body, .. } => continues_loop(body),
		_ => false,
	}
}

fn continues_loop(statement: &Statement) -> bool {
	match statement {
		Statement::Continue(_) => true,
		Statement::Block(block) => block.iter().any(continues_loop),
		Statement::If {
			then_branch,
			else_branch,
			..
		} => continues_loop(then_branch) || else_branch.as_deref().is_some_and(continues_loop),
		Statement::Switch { body, .. } => continues_loop(body),
		_ => false,
	}
}
