use std::path::PathBuf;

use derive_more::Deref;

use crate::Position;
use crate::tokens::Spanned;

/// One parsed input file.
#[derive(Debug, Clone)]
pub struct SourceUnit {
	/// Path the unit was read from. Used in diagnostics.
	pub file: PathBuf,
	/// Top-level items in source order.
	pub items: Vec<Item>,
}

impl SourceUnit {
	/// Iterate over every function definition in the unit.
	pub fn functions(&self) -> impl Iterator<Item = &Function> {
		self.items.iter().filter_map(|item| {
			match item {
				Item::Function(function) => Some(function),
				_ => None,
			}
		})
	}

	/// Iterate over every top-level declaration in the unit.
	pub fn declarations(&self) -> impl Iterator<Item = &Declaration> {
		self.items.iter().filter_map(|item| {
			match item {
				Item::Declaration(declaration) => Some(declaration),
				_ => None,
			}
		})
	}
}

#[derive(Debug, Clone)]
pub enum Item {
	/// A preprocessor line such as `#include <math.h>`.
	Directive { text: String, position: Position },
	/// A comment between top-level items.
	Comment { text: String, position: Position },
	/// A global declaration, prototype, or type definition.
	Declaration(Declaration),
	/// A function definition.
	Function(Function),
}

/// An opaque expression: its significant tokens for scanning and its original
/// text for re-emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
	/// Tokens of the expression with comments removed.
	pub tokens: Vec<Spanned>,
	/// The verbatim source text of the expression.
	pub text: String,
	pub position: Position,
}

#[derive(Debug, Clone)]
pub struct Function {
	/// The function name, e.g. `provide_x`.
	pub name: String,
	/// Everything before the function name, e.g. `static void`.
	pub specifiers: String,
	/// The verbatim signature, e.g. `void provide_x()`.
	pub signature: String,
	/// Names of the declared parameters.
	pub params: Vec<String>,
	pub body: Block,
	pub position: Position,
}

/// A `{ ... }` compound statement.
#[derive(Debug, Clone, Deref)]
pub struct Block {
	#[deref]
	pub statements: Vec<Statement>,
	pub position: Position,
}

/// A declaration such as `float x = 1, y;`.
#[derive(Debug, Clone)]
pub struct Declaration {
	/// The type and storage specifiers, e.g. `static const float`.
	pub specifiers: String,
	pub declarators: Vec<Declarator>,
	/// The verbatim declaration including the trailing `;`.
	pub text: String,
	pub position: Position,
}

impl Declaration {
	/// Names introduced by this declaration, in order.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.declarators.iter().map(|d| d.name.as_str())
	}

	pub fn for_each_init(&self, visit: &mut impl FnMut(&Expr)) {
		for init in self.declarators.iter().filter_map(|d| d.init.as_ref()) {
			visit(init);
		}
	}
}

#[derive(Debug, Clone)]
pub struct Declarator {
	/// The declared name.
	pub name: String,
	/// The declarator without initializer, e.g. `*p` or `values[3]`.
	pub text: String,
	pub init: Option<Expr>,
	pub position: Position,
}

#[derive(Debug, Clone)]
pub enum ForInit {
	Declaration(Declaration),
	Expression(Expr),
}

#[derive(Debug, Clone)]
pub enum Statement {
	Block(Block),
	Declaration(Declaration),
	/// An expression statement; the trailing `;` is not part of the expression.
	Expression(Expr),
	/// An explicit invalidation request, e.g. `touch_x();`.
	Touch {
		variable: String,
		position: Position,
	},
	If {
		condition: Expr,
		then_branch: Box<Statement>,
		else_branch: Option<Box<Statement>>,
		position: Position,
	},
	While {
		condition: Expr,
		body: Box<Statement>,
		position: Position,
	},
	DoWhile {
		body: Box<Statement>,
		condition: Expr,
		position: Position,
	},
	For {
		init: Option<ForInit>,
		condition: Option<Expr>,
		step: Option<Expr>,
		body: Box<Statement>,
		position: Position,
	},
	Switch {
		condition: Expr,
		body: Box<Statement>,
		position: Position,
	},
	Return {
		value: Option<Expr>,
		position: Position,
	},
	Break(Position),
	Continue(Position),
	/// `case 1:`, `default:` or a goto label, kept verbatim.
	Label {
		text: String,
		position: Position,
	},
	Comment {
		text: String,
		position: Position,
	},
	Empty(Position),
}

impl Statement {
	pub fn position(&self) -> Position {
		match self {
			Statement::Block(block) => block.position,
			Statement::Declaration(declaration) => declaration.position,
			Statement::Expression(expr) => expr.position,
			Statement::Touch { position, .. }
			| Statement::If { position, .. }
			| Statement::While { position, .. }
			| Statement::DoWhile { position, .. }
			| Statement::For { position, .. }
			| Statement::Switch { position, .. }
			| Statement::Return { position, .. }
			| Statement::Label { position, .. }
			| Statement::Comment { position, .. }
			| Statement::Break(position)
			| Statement::Continue(position)
			| Statement::Empty(position) => *position,
		}
	}

	/// Call `visit` on every expression in this statement and its nested
	/// statements, including declaration initializers.
	pub fn for_each_expr(&self, visit: &mut impl FnMut(&Expr)) {
		match self {
			Statement::Block(block) => {
				for statement in &block.statements {
					statement.for_each_expr(visit);
				}
			}
			Statement::Declaration(decl) => decl.for_each_init(visit),
			Statement::Expression(expr) => visit(expr),
			Statement::If {
				condition,
				then_branch,
				else_branch,
				..
			} => {
				visit(condition);
				then_branch.for_each_expr(visit);
				if let Some(else_branch) = else_branch {
					else_branch.for_each_expr(visit);
				}
			}
			Statement::While {
				condition, body, ..
			}
			| Statement::DoWhile {
				condition, body, ..
			}
			| Statement::Switch {
				condition, body, ..
			} => {
				visit(condition);
				body.for_each_expr(visit);
			}
			Statement::For {
				init,
				condition,
				step,
				body,
				..
			} => {
				match init {
					Some(ForInit::Declaration(decl)) => decl.for_each_init(visit),
					Some(ForInit::Expression(expr)) => visit(expr),
					None => {}
				}
				for expr in condition.iter().chain(step) {
					visit(expr);
				}
				body.for_each_expr(visit);
			}
			Statement::Return {
				value: Some(value),
				..
			} => visit(value),
			_ => {}
		}
	}

	/// Call `visit` on every touch statement nested in this statement.
	pub fn for_each_touch(&self, visit: &mut impl FnMut(&str, Position)) {
		match self {
			Statement::Touch { variable, position } => visit(variable, *position),
			Statement::Block(block) => {
				for statement in &block.statements {
					statement.for_each_touch(visit);
				}
			}
			Statement::If {
				then_branch,
				else_branch,
				..
			} => {
				then_branch.for_each_touch(visit);
				if let Some(else_branch) = else_branch {
					else_branch.for_each_touch(visit);
				}
			}
			Statement::While { body, .. }
			| Statement::DoWhile { body, .. }
			| Statement::For { body, .. }
			| Statement::Switch { body, .. } => body.for_each_touch(visit),
			_ => {}
		}
	}
}
