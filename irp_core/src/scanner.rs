use std::collections::HashSet;

use crate::syntax::Declaration;
use crate::syntax::Expr;
use crate::syntax::ForInit;
use crate::syntax::Function;
use crate::syntax::Statement;
use crate::tokens::Spanned;
use crate::tokens::Token;

/// Managed names referenced by a piece of code, each list in order of first
/// occurrence without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
	pub reads: Vec<String>,
	pub writes: Vec<String>,
}

impl Usage {
	pub fn is_empty(&self) -> bool {
		self.reads.is_empty() && self.writes.is_empty()
	}

	/// Every referenced name, reads and writes, in first-occurrence order.
	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = Vec::new();
		for name in self.reads.iter().chain(&self.writes) {
			if !names.contains(&name.as_str()) {
				names.push(name);
			}
		}
		names
	}

	pub fn extend(&mut self, other: Usage) {
		for name in other.reads {
			push_unique(&mut self.reads, name);
		}
		for name in other.writes {
			push_unique(&mut self.writes, name);
		}
	}
}

fn push_unique(names: &mut Vec<String>, name: String) {
	if !names.contains(&name) {
		names.push(name);
	}
}

/// Extracts references to managed variables from statements, tracking the
/// local bindings that shadow them.
pub struct Scanner<'a> {
	tracked: &'a HashSet<String>,
	/// The variable owned by the function being scanned. It is never reported
	/// and its hoisted declaration does not shadow it.
	own: Option<&'a str>,
	scopes: Vec<HashSet<String>>,
}

impl<'a> Scanner<'a> {
	pub fn new(tracked: &'a HashSet<String>) -> Self {
		Self {
			tracked,
			own: None,
			scopes: vec![HashSet::new()],
		}
	}

	/// A scanner for the body of `function`, with its parameters bound.
	pub fn for_function(
		tracked: &'a HashSet<String>,
		function: &Function,
		own: Option<&'a str>,
	) -> Self {
		let mut scanner = Self {
			tracked,
			own,
			scopes: vec![HashSet::new()],
		};
		for param in &function.params {
			scanner.bind(param);
		}
		scanner
	}

	pub fn enter(&mut self) {
		self.scopes.push(HashSet::new());
	}

	pub fn leave(&mut self) {
		if self.scopes.len() > 1 {
			self.scopes.pop();
		}
	}

	pub fn bind(&mut self, name: &str) {
		if let Some(scope) = self.scopes.last_mut() {
			scope.insert(name.to_string());
		}
	}

	pub fn is_shadowed(&self, name: &str) -> bool {
		self.scopes.iter().any(|scope| scope.contains(name))
	}

	fn is_visible(&self, name: &str) -> bool {
		self.tracked.contains(name) && self.own != Some(name) && !self.is_shadowed(name)
	}

	/// References in a single expression.
	pub fn expression(&self, expr: &Expr) -> Usage {
		let tokens = &expr.tokens;
		let mut usage = Usage::default();

		for (index, spanned) in tokens.iter().enumerate() {
			let Some(name) = spanned.token.ident() else {
				continue;
			};

			if !self.is_visible(name) || is_member(tokens, index) || is_call(tokens, index) {
				continue;
			}

			match target_kind(tokens, index) {
				Target::Simple => push_unique(&mut usage.writes, name.to_string()),
				Target::Modified => {
					push_unique(&mut usage.reads, name.to_string());
					push_unique(&mut usage.writes, name.to_string());
				}
				Target::None => push_unique(&mut usage.reads, name.to_string()),
			}
		}

		usage
	}

	/// References in the initializers of a declaration. The declared names
	/// are bound in the current scope afterwards.
	pub fn declaration(&mut self, declaration: &Declaration) -> Usage {
		let mut usage = Usage::default();

		for declarator in &declaration.declarators {
			if let Some(init) = &declarator.init {
				usage.extend(self.expression(init));
			}

			if self.own == Some(declarator.name.as_str()) {
				continue;
			}

			self.bind(&declarator.name);
		}

		usage
	}

	/// References anywhere in `statements`, including nested statements.
	pub fn statements(&mut self, statements: &[Statement]) -> Usage {
		let mut usage = Usage::default();
		for statement in statements {
			self.statement(statement, &mut usage);
		}
		usage
	}

	fn statement(&mut self, statement: &Statement, usage: &mut Usage) {
		match statement {
			Statement::Block(block) => {
				self.enter();
				usage.extend(self.statements(block));
				self.leave();
			}
			Statement::Declaration(declaration) => usage.extend(self.declaration(declaration)),
			Statement::Expression(expr) => usage.extend(self.expression(expr)),
			Statement::If {
				condition,
				then_branch,
				else_branch,
				..
			} => {
				usage.extend(self.expression(condition));
				self.nested(then_branch, usage);
				if let Some(else_branch) = else_branch {
					self.nested(else_branch, usage);
				}
			}
			Statement::While {
				condition, body, ..
			}
			| Statement::Switch {
				condition, body, ..
			} => {
				usage.extend(self.expression(condition));
				self.nested(body, usage);
			}
			Statement::DoWhile {
				body, condition, ..
			} => {
				self.nested(body, usage);
				usage.extend(self.expression(condition));
			}
			Statement::For {
				init,
				condition,
				step,
				body,
				..
			} => {
				self.enter();
				match init {
					Some(ForInit::Declaration(declaration)) => {
						usage.extend(self.declaration(declaration));
					}
					Some(ForInit::Expression(expr)) => usage.extend(self.expression(expr)),
					None => {}
				}
				if let Some(condition) = condition {
					usage.extend(self.expression(condition));
				}
				self.nested(body, usage);
				if let Some(step) = step {
					usage.extend(self.expression(step));
				}
				self.leave();
			}
			Statement::Return {
				value: Some(value),
				..
			} => usage.extend(self.expression(value)),
			Statement::Touch { .. }
			| Statement::Return { value: None, .. }
			| Statement::Break(_)
			| Statement::Continue(_)
			| Statement::Label { .. }
			| Statement::Comment { .. }
			| Statement::Empty(_) => {}
		}
	}

	/// A sub-statement gets its own scope.
	fn nested(&mut self, statement: &Statement, usage: &mut Usage) {
		self.enter();
		self.statement(statement, usage);
		self.leave();
	}
}

/// The managed variables `function` reads, in order of first occurrence,
/// excluding `own`.
pub fn scan_reads(function: &Function, tracked: &HashSet<String>, own: Option<&str>) -> Vec<String> {
	Scanner::for_function(tracked, function, own)
		.statements(&function.body)
		.reads
}

/// Whether `expr` assigns to `name` in any way, including element, member and
/// increment writes.
pub fn writes_name(expr: &Expr, name: &str) -> bool {
	let tracked = HashSet::from([name.to_string()]);
	Scanner::new(&tracked)
		.expression(expr)
		.writes
		.iter()
		.any(|written| written == name)
}

enum Target {
	/// `name = ...`
	Simple,
	/// `name += ...`, `name[i] = ...`, `name++`, `++name` and friends.
	Modified,
	None,
}

fn is_member(tokens: &[Spanned], index: usize) -> bool {
	index
		.checked_sub(1)
		.is_some_and(|previous| tokens[previous].token.is_symbol(".") || tokens[previous].token.is_symbol("->"))
}

fn is_call(tokens: &[Spanned], index: usize) -> bool {
	tokens
		.get(index + 1)
		.is_some_and(|next| next.token.is_symbol("("))
}

/// Tokens after which a new operand starts.
fn is_boundary(token: &Token) -> bool {
	token.is_assignment()
		|| ["(", ",", "?", ":", "{", ";"]
			.iter()
			.any(|symbol| token.is_symbol(symbol))
}

fn target_kind(tokens: &[Spanned], index: usize) -> Target {
	// Skip a postfix chain of `[...]`, `.member` and `->member`.
	let mut cursor = index + 1;
	let mut chained = false;
	loop {
		let Some(next) = tokens.get(cursor) else {
			break;
		};

		if next.token.is_symbol("[") {
			let mut depth = 0_usize;
			while let Some(spanned) = tokens.get(cursor) {
				if spanned.token.opens() {
					depth += 1;
				} else if spanned.token.closes() {
					depth = depth.saturating_sub(1);
				}
				cursor += 1;
				if depth == 0 {
					break;
				}
			}
			chained = true;
		} else if next.token.is_symbol(".") || next.token.is_symbol("->") {
			cursor += 2;
			chained = true;
		} else {
			break;
		}
	}

	let previous = index.checked_sub(1).map(|i| &tokens[i].token);
	let next = tokens.get(cursor).map(|spanned| &spanned.token);

	if previous.is_some_and(Token::is_increment) || next.is_some_and(Token::is_increment) {
		return Target::Modified;
	}

	if previous.is_some_and(|token| !is_boundary(token)) {
		return Target::None;
	}

	match next {
		Some(token) if token.is_symbol("=") && !chained => Target::Simple,
		Some(token) if token.is_assignment() => Target::Modified,
		_ => Target::None,
	}
}
