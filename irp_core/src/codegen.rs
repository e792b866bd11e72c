use std::collections::HashSet;

use crate::IrpConfig;
use crate::NamingConfig;
use crate::OutputConfig;
use crate::cycles::TopologicalOrder;
use crate::graph::DependencyGraph;
use crate::invalidation::InvalidationSets;
use crate::registry::Provider;
use crate::registry::ProviderRegistry;
use crate::scanner::Scanner;
use crate::scanner::Usage;
use crate::syntax::Block;
use crate::syntax::Expr;
use crate::syntax::ForInit;
use crate::syntax::Function;
use crate::syntax::Item;
use crate::syntax::SourceUnit;
use crate::syntax::Statement;

/// Everything the generator needs from the earlier pipeline stages.
#[derive(Clone, Copy)]
pub struct Analysis<'a> {
	pub registry: &'a ProviderRegistry,
	pub graph: &'a DependencyGraph,
	pub order: &'a TopologicalOrder,
	pub invalidation: &'a InvalidationSets,
}

/// Emit one translation unit for `units` with staleness flags, guarded reads
/// and writes of provider variables, and one invalidation routine per touched
/// variable.
pub fn generate(units: &[SourceUnit], analysis: Analysis<'_>, config: &IrpConfig) -> String {
	let tracked: HashSet<String> = analysis
		.registry
		.providers()
		.iter()
		.map(|provider| provider.variable.clone())
		.collect();

	let mut generator = Generator {
		analysis,
		naming: &config.naming,
		output: &config.output,
		tracked: &tracked,
		out: String::new(),
		guards: 0,
		loops: Vec::new(),
		stored: false,
	};

	generator.header(units);
	generator.prototypes();
	for unit in units {
		generator.unit(unit);
	}
	if !generator.stored {
		generator.storage();
	}
	generator.touch_routines();

	let mut out = generator.out.trim_end().to_string();
	out.push('\n');
	out
}

struct Generator<'a> {
	analysis: Analysis<'a>,
	naming: &'a NamingConfig,
	output: &'a OutputConfig,
	/// Provider variables.
	tracked: &'a HashSet<String>,
	out: String,
	/// Number of guards emitted so far.
	guards: usize,
	/// Guards re-evaluated by each enclosing loop, innermost last.
	loops: Vec<Vec<String>>,
	/// Whether the hoisted storage has been emitted.
	stored: bool,
}

impl<'a> Generator<'a> {
	fn line(&mut self, depth: usize, text: &str) {
		for _ in 0..depth {
			self.out.push_str(&self.output.indent);
		}
		self.out.push_str(text);
		self.out.push('\n');
	}

	fn blank(&mut self) {
		if !self.out.is_empty() && !self.out.ends_with("\n\n") {
			self.out.push('\n');
		}
	}

	fn header(&mut self, units: &[SourceUnit]) {
		let mut seen: Vec<String> = Vec::new();
		if self.output.stdbool {
			seen.push("#include <stdbool.h>".into());
		}

		for unit in units {
			for item in &unit.items {
				match item {
					Item::Directive { text, .. } if is_include(text) && !seen.contains(text) => {
						seen.push(text.clone());
					}
					_ => {}
				}
			}
		}

		for include in &seen {
			self.line(0, include);
		}
		self.blank();
	}

	fn prototypes(&mut self) {
		if !self.output.prototypes {
			return;
		}

		let registry = self.analysis.registry;
		for &id in self.analysis.order.ids() {
			let variable = self.analysis.graph.name(id);
			if let Some(provider) = registry.get(variable) {
				let prototype = format!(
					"{} {}(void);",
					provider.function.specifiers.trim(),
					provider.function.name
				);
				self.line(0, &prototype);
			}
		}

		for variable in registry.touched_variables() {
			let prototype = format!("void {}(void);", self.naming.touch(variable));
			self.line(0, &prototype);
		}

		self.blank();
	}

	/// Hoisted provider variables and their flags. Emitted right before the
	/// first function definition so that types and macros declared above it
	/// are in scope.
	fn storage(&mut self) {
		self.stored = true;
		self.blank();

		let registry = self.analysis.registry;
		for &id in self.analysis.order.ids() {
			let Some(provider) = registry.get(self.analysis.graph.name(id)) else {
				continue;
			};
			let Some(declarator) = provider.declaration.declarators.first() else {
				continue;
			};

			let storage = format!("{} {};", provider.declared_type(), declarator.text);
			let flag = format!("bool {} = false;", self.naming.flag(&provider.variable));
			self.line(0, &storage);
			self.line(0, &flag);
		}

		self.blank();
	}

	fn unit(&mut self, unit: &SourceUnit) {
		for item in &unit.items {
			match item {
				Item::Directive { text, .. } if is_include(text) => {}
				Item::Directive { text, .. } | Item::Comment { text, .. } => self.line(0, text),
				Item::Declaration(declaration) => self.line(0, &declaration.text),
				Item::Function(function) => {
					if !self.stored {
						self.storage();
					}
					self.blank();
					self.function(function);
					self.blank();
				}
			}
		}
	}

	fn function(&mut self, function: &Function) {
		let registry = self.analysis.registry;
		let provider = registry.by_function(&function.name);
		let own = provider.map(|provider| provider.variable.as_str());
		let mut scanner = Scanner::for_function(self.tracked, function, own);

		self.line(0, &function.signature);
		self.line(0, "{");
		for (index, statement) in function.body.iter().enumerate() {
			match provider {
				Some(provider) if index == provider.declaration_index => {
					self.hoisted(provider, &mut scanner);
				}
				_ => self.statement(statement, 1, &mut scanner),
			}
		}
		self.line(0, "}");
	}

	/// The provider's own declaration was moved to global storage. Only its
	/// initializer, if any, stays behind as an assignment.
	fn hoisted(&mut self, provider: &Provider, scanner: &mut Scanner<'_>) {
		let usage = scanner.declaration(&provider.declaration);
		let Some(init) = provider
			.declaration
			.declarators
			.first()
			.and_then(|declarator| declarator.init.as_ref())
		else {
			return;
		};

		self.guard_usage(1, &usage, &provider.function.name);
		let assignment = format!("{} = {};", provider.variable, init.text);
		self.line(1, &assignment);
	}

	fn statement(&mut self, statement: &Statement, depth: usize, scanner: &mut Scanner<'_>) {
		match statement {
			Statement::Block(block) => self.block(block, depth, scanner, &[]),
			Statement::Declaration(declaration) => {
				let usage = scanner.declaration(declaration);
				self.guard_usage(depth, &usage, "declaration");
				self.line(depth, &declaration.text);
			}
			Statement::Expression(expr) => {
				let usage = scanner.expression(expr);
				self.guard_usage(depth, &usage, "expression");
				self.line(depth, &format!("{};", expr.text));
			}
			Statement::Touch { variable, .. } => {
				let call = format!("{}();", self.naming.touch(variable));
				self.line(depth, &call);
			}
			Statement::If { .. } => self.if_statement(statement, depth, scanner, ""),
			Statement::While {
				condition, body, ..
			} => {
				let guards = self.guard_expr(depth, condition, scanner);
				self.line(depth, &format!("while ({})", condition.text));
				self.loop_body(body, depth, scanner, guards);
			}
			Statement::DoWhile {
				body, condition, ..
			} => {
				let guards = self.ordered(&scanner.expression(condition));
				self.line(depth, "do");
				self.loop_body(body, depth, scanner, guards);
				self.line(depth, &format!("while ({});", condition.text));
			}
			Statement::For {
				init,
				condition,
				step,
				body,
				..
			} => {
				scanner.enter();

				let mut before = match init {
					Some(ForInit::Declaration(declaration)) => scanner.declaration(declaration),
					Some(ForInit::Expression(expr)) => scanner.expression(expr),
					None => Usage::default(),
				};
				let mut repeated = Usage::default();
				for expr in step.iter().chain(condition) {
					repeated.extend(scanner.expression(expr));
				}
				if let Some(condition) = condition {
					before.extend(scanner.expression(condition));
				}
				self.guard_usage(depth, &before, "for");

				let mut header = String::from("for (");
				match init {
					Some(ForInit::Declaration(declaration)) => header.push_str(&declaration.text),
					Some(ForInit::Expression(expr)) => {
						header.push_str(&expr.text);
						header.push(';');
					}
					None => header.push(';'),
				}
				if let Some(condition) = condition {
					header.push(' ');
					header.push_str(&condition.text);
				}
				header.push(';');
				if let Some(step) = step {
					header.push(' ');
					header.push_str(&step.text);
				}
				header.push(')');
				self.line(depth, &header);

				let guards = self.ordered(&repeated);
				self.loop_body(body, depth, scanner, guards);
				scanner.leave();
			}
			Statement::Switch {
				condition, body, ..
			} => {
				self.guard_expr(depth, condition, scanner);
				self.line(depth, &format!("switch ({})", condition.text));
				self.nested(body, depth, scanner, &[]);
			}
			Statement::Return { value, .. } => {
				match value {
					Some(value) => {
						self.guard_expr(depth, value, scanner);
						self.line(depth, &format!("return {};", value.text));
					}
					None => self.line(depth, "return;"),
				}
			}
			Statement::Break(_) => self.line(depth, "break;"),
			Statement::Continue(_) => {
				if let Some(guards) = self.loops.last().cloned() {
					self.guard_all(depth, &guards, "continue");
				}
				self.line(depth, "continue;");
			}
			Statement::Label { text, .. } | Statement::Comment { text, .. } => {
				self.line(depth, text);
			}
			Statement::Empty(_) => self.line(depth, ";"),
		}
	}

	/// Emit an `if` statement. `prefix` is `"else "` when the statement
	/// continues an `else if` chain.
	fn if_statement(
		&mut self,
		statement: &Statement,
		depth: usize,
		scanner: &mut Scanner<'_>,
		prefix: &str,
	) {
		let Statement::If {
			condition,
			then_branch,
			else_branch,
			..
		} = statement
		else {
			return;
		};

		self.guard_expr(depth, condition, scanner);
		self.line(depth, &format!("{prefix}if ({})", condition.text));
		self.nested(then_branch, depth, scanner, &[]);

		let Some(else_branch) = else_branch else {
			return;
		};

		let chained = match else_branch.as_ref() {
			Statement::If {
				condition: nested, ..
			} => scanner.expression(nested).is_empty(),
			_ => false,
		};
		if chained {
			self.if_statement(else_branch, depth, scanner, "else ");
			return;
		}

		self.line(depth, "else");
		self.nested(else_branch, depth, scanner, &[]);
	}

	fn loop_body(
		&mut self,
		body: &Statement,
		depth: usize,
		scanner: &mut Scanner<'_>,
		guards: Vec<String>,
	) {
		self.loops.push(guards.clone());
		self.nested(body, depth, scanner, &guards);
		self.loops.pop();
	}

	/// Emit a branch or loop body. A single statement is wrapped in braces when
	/// guards have to be placed around it.
	fn nested(
		&mut self,
		statement: &Statement,
		depth: usize,
		scanner: &mut Scanner<'_>,
		tail: &[String],
	) {
		if let Statement::Block(block) = statement {
			self.block(block, depth, scanner, tail);
			return;
		}

		let saved = std::mem::take(&mut self.out);
		let guards_before = self.guards;
		scanner.enter();
		self.statement(statement, depth + 1, scanner);
		scanner.leave();
		let rendered = std::mem::replace(&mut self.out, saved);

		if self.guards == guards_before && tail.is_empty() {
			self.out.push_str(&rendered);
			return;
		}

		self.line(depth, "{");
		self.out.push_str(&rendered);
		self.guard_all(depth + 1, tail, "loop condition");
		self.line(depth, "}");
	}

	/// Emit a block. `tail` guards are placed after its last statement.
	fn block(&mut self, block: &Block, depth: usize, scanner: &mut Scanner<'_>, tail: &[String]) {
		self.line(depth, "{");
		scanner.enter();
		for statement in block.iter() {
			self.statement(statement, depth + 1, scanner);
		}
		scanner.leave();
		self.guard_all(depth + 1, tail, "loop condition");
		self.line(depth, "}");
	}

	/// Guard the variables `expr` references and return them in guard order.
	fn guard_expr(&mut self, depth: usize, expr: &Expr, scanner: &Scanner<'_>) -> Vec<String> {
		let guards = self.ordered(&scanner.expression(expr));
		self.guard_all(depth, &guards, "condition");
		guards
	}

	fn guard_usage(&mut self, depth: usize, usage: &Usage, site: &str) {
		let guards = self.ordered(usage);
		self.guard_all(depth, &guards, site);
	}

	/// Referenced provider variables sorted by topological rank, then by
	/// declaration order.
	fn ordered(&self, usage: &Usage) -> Vec<String> {
		let graph = self.analysis.graph;
		let order = self.analysis.order;
		let mut ids: Vec<_> = usage
			.names()
			.into_iter()
			.filter_map(|name| graph.id(name))
			.collect();
		ids.sort_by_key(|&id| (order.rank(id), id));

		ids.into_iter()
			.map(|id| graph.name(id).to_string())
			.collect()
	}

	fn guard_all(&mut self, depth: usize, variables: &[String], site: &str) {
		for variable in variables {
			self.guard(depth, variable, site);
		}
	}

	fn guard(&mut self, depth: usize, variable: &str, site: &str) {
		tracing::trace!(variable, site, "inserting guard");
		let flag = self.naming.flag(variable);
		let check = format!("if (!{flag})");
		let call = format!("{}();", self.naming.provider(variable));
		let set = format!("{flag} = true;");

		self.line(depth, &check);
		self.line(depth, "{");
		self.line(depth + 1, &call);
		self.line(depth + 1, &set);
		self.line(depth, "}");
		self.guards += 1;
	}

	/// One routine per touched variable. It assigns the shared flags of every
	/// transitive dependent and leaves the touched variable's own flag alone.
	fn touch_routines(&mut self) {
		let registry = self.analysis.registry;
		let invalidation = self.analysis.invalidation;

		for variable in registry.touched_variables() {
			self.blank();
			let signature = format!("void {}(void)", self.naming.touch(variable));
			self.line(0, &signature);
			self.line(0, "{");
			for dependent in invalidation.dependents_of(variable) {
				let reset = format!("{} = false;", self.naming.flag(dependent));
				self.line(1, &reset);
			}
			self.line(0, "}");
		}
	}
}

fn is_include(directive: &str) -> bool {
	directive
		.trim_start_matches('#')
		.trim_start()
		.starts_with("include")
}
