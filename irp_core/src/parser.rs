use std::collections::HashSet;
use std::path::Path;

use crate::IrpError;
use crate::IrpResult;
use crate::Position;
use crate::lexer::tokenize;
use crate::syntax::Block;
use crate::syntax::Declaration;
use crate::syntax::Declarator;
use crate::syntax::Expr;
use crate::syntax::ForInit;
use crate::syntax::Function;
use crate::syntax::Item;
use crate::syntax::SourceUnit;
use crate::syntax::Statement;
use crate::tokens::Spanned;
use crate::tokens::Token;

/// Words that can only start a declaration.
const DECLARATION_WORDS: &[&str] = &[
	"_Bool", "_Complex", "auto", "bool", "char", "const", "double", "enum", "extern", "float",
	"inline", "int", "long", "register", "restrict", "short", "signed", "static", "struct",
	"typedef", "union", "unsigned", "void", "volatile",
];

/// Qualifiers that may sit between a pointer star and the declared name.
const QUALIFIERS: &[&str] = &["const", "volatile", "restrict"];

/// Parse one source file into a [`SourceUnit`].
///
/// `touch_prefix` decides which call statements are recorded as
/// [`Statement::Touch`].
pub fn parse(source: &str, file: &Path, touch_prefix: &str) -> IrpResult<SourceUnit> {
	let tokens = tokenize(source, file)?;
	let parser = Parser {
		source,
		file,
		touch_prefix,
		tokens,
		cursor: 0,
		typedefs: HashSet::new(),
	};

	parser.parse_unit()
}

struct Parser<'a> {
	source: &'a str,
	file: &'a Path,
	touch_prefix: &'a str,
	tokens: Vec<Spanned>,
	/// Index of the next unconsumed token (which may be a comment).
	cursor: usize,
	/// Type names introduced by `typedef`, so `name x;` parses as a
	/// declaration.
	typedefs: HashSet<String>,
}

impl Parser<'_> {
	fn parse_unit(mut self) -> IrpResult<SourceUnit> {
		let mut items = Vec::new();

		loop {
			if let Some(comment) = self.take_comment() {
				items.push(Item::Comment {
					text: comment.token.to_string(),
					position: comment.position,
				});
				continue;
			}

			let Some(next) = self.peek() else {
				break;
			};

			if let Token::Directive(text) = &next.token {
				let item = Item::Directive {
					text: text.clone(),
					position: next.position,
				};
				self.bump()?;
				items.push(item);
				continue;
			}

			items.push(self.parse_external()?);
		}

		Ok(SourceUnit {
			file: self.file.to_path_buf(),
			items,
		})
	}

	/// Parse a top-level function definition or declaration.
	fn parse_external(&mut self) -> IrpResult<Item> {
		let start = self.next_index()?;
		let mut depth = 0_usize;
		let mut index = start;

		let brace = loop {
			let Some(spanned) = self.tokens.get(index) else {
				return Err(self.error_at_end("expected `;` or a function body"));
			};

			let token = &spanned.token;
			if token.is_comment() {
				index += 1;
				continue;
			}

			if token.is_symbol("(") || token.is_symbol("[") {
				depth += 1;
			} else if token.is_symbol(")") || token.is_symbol("]") {
				depth = depth
					.checked_sub(1)
					.ok_or_else(|| self.error(spanned.position, format!("unexpected `{token}`")))?;
			} else if depth == 0 && token.is_symbol("{") {
				break Some(index);
			} else if depth == 0 && token.is_symbol(";") {
				break None;
			} else if token.is_symbol("}") {
				return Err(self.error(spanned.position, "unexpected `}`"));
			}

			index += 1;
		};

		match brace {
			Some(brace) if self.previous_significant(brace).is_some_and(|i| self.tokens[i].token.is_symbol(")")) => {
				self.parse_function(start, brace).map(Item::Function)
			}
			_ => self.parse_declaration().map(Item::Declaration),
		}
	}

	fn parse_function(&mut self, start: usize, brace: usize) -> IrpResult<Function> {
		let significant = self.significant_between(start, brace);
		let Some(open) = significant
			.iter()
			.position(|&i| self.tokens[i].token.is_symbol("("))
		else {
			return Err(self.error(self.tokens[start].position, "expected a parameter list"));
		};

		let Some(name_index) = open.checked_sub(1).map(|i| significant[i]) else {
			return Err(self.error(self.tokens[start].position, "expected a function name"));
		};
		let Some(name) = self.tokens[name_index].token.ident().map(ToString::to_string) else {
			return Err(self.error(
				self.tokens[name_index].position,
				"expected a function name",
			));
		};

		let specifiers = if name_index == start {
			String::new()
		} else {
			self.text(start, name_index - 1)
		};
		let signature = self.text(start, significant[significant.len() - 1]);

		// Everything between the first `(` and the final `)` are parameters.
		let params_range = &significant[open + 1..significant.len() - 1];
		let params = self
			.split_top_level(params_range, ",")
			.into_iter()
			.filter_map(|segment| self.parameter_name(&segment))
			.collect();

		self.cursor = brace;
		let body = self.parse_block()?;
		let position = self.tokens[start].position.to(body.position);

		Ok(Function {
			name,
			specifiers,
			signature,
			params,
			body,
			position,
		})
	}

	fn parameter_name(&self, segment: &[usize]) -> Option<String> {
		if segment.len() == 1 {
			let token = &self.tokens[segment[0]].token;
			if token.is_ident("void") || token.is_symbol("...") {
				return None;
			}
		}

		self.last_top_level_ident(segment)
	}

	fn parse_block(&mut self) -> IrpResult<Block> {
		let open = self.expect_symbol("{")?;
		let mut statements = Vec::new();

		loop {
			if let Some(comment) = self.take_comment() {
				statements.push(Statement::Comment {
					text: comment.token.to_string(),
					position: comment.position,
				});
				continue;
			}

			match self.peek() {
				Some(next) if next.token.is_symbol("}") => {
					let close = self.bump()?.position;
					return Ok(Block {
						statements,
						position: open.to(close),
					});
				}
				Some(_) => statements.push(self.parse_statement()?),
				None => return Err(self.error_at_end("expected `}`")),
			}
		}
	}

	fn parse_statement(&mut self) -> IrpResult<Statement> {
		if let Some(comment) = self.take_comment() {
			return Ok(Statement::Comment {
				text: comment.token.to_string(),
				position: comment.position,
			});
		}

		let Some(next) = self.peek() else {
			return Err(self.error_at_end("expected a statement"));
		};
		let start = next.position;

		if next.token.is_symbol("{") {
			return self.parse_block().map(Statement::Block);
		}

		if next.token.is_symbol(";") {
			self.bump()?;
			return Ok(Statement::Empty(start));
		}

		let Some(keyword) = next.token.ident().map(ToString::to_string) else {
			return self.parse_expression_statement();
		};

		match keyword.as_str() {
			"if" => {
				self.bump()?;
				let condition = self.parse_condition()?;
				let then_branch = Box::new(self.parse_statement()?);
				let else_branch = if self.peek().is_some_and(|t| t.token.is_ident("else")) {
					self.bump()?;
					Some(Box::new(self.parse_statement()?))
				} else {
					None
				};

				Ok(Statement::If {
					condition,
					then_branch,
					else_branch,
					position: start.to(self.previous_position()),
				})
			}
			"while" => {
				self.bump()?;
				let condition = self.parse_condition()?;
				let body = Box::new(self.parse_statement()?);

				Ok(Statement::While {
					condition,
					body,
					position: start.to(self.previous_position()),
				})
			}
			"do" => {
				self.bump()?;
				let body = Box::new(self.parse_statement()?);
				match self.bump()? {
					Spanned {
						token: Token::Ident(word),
						..
					} if word == "while" => {}
					other => return Err(self.error(other.position, "expected `while` after `do` body")),
				}
				let condition = self.parse_condition()?;
				self.expect_symbol(";")?;

				Ok(Statement::DoWhile {
					body,
					condition,
					position: start.to(self.previous_position()),
				})
			}
			"for" => self.parse_for(start),
			"switch" => {
				self.bump()?;
				let condition = self.parse_condition()?;
				let body = Box::new(self.parse_statement()?);

				Ok(Statement::Switch {
					condition,
					body,
					position: start.to(self.previous_position()),
				})
			}
			"return" => {
				self.bump()?;
				let value = if self.peek().is_some_and(|t| t.token.is_symbol(";")) {
					None
				} else {
					let begin = self.next_index()?;
					let end = self.scan_until(";")?;
					self.cursor = end;
					self.expr(begin, end)
				};
				self.expect_symbol(";")?;

				Ok(Statement::Return {
					value,
					position: start.to(self.previous_position()),
				})
			}
			"break" | "continue" => {
				self.bump()?;
				self.expect_symbol(";")?;
				let position = start.to(self.previous_position());
				if keyword == "break" {
					Ok(Statement::Break(position))
				} else {
					Ok(Statement::Continue(position))
				}
			}
			"case" | "default" => {
				let begin = self.next_index()?;
				let colon = self.scan_until(":")?;
				self.cursor = colon + 1;

				Ok(Statement::Label {
					text: self.text(begin, colon),
					position: start.to(self.tokens[colon].position),
				})
			}
			_ if self.peek_nth(1).is_some_and(|t| t.token.is_symbol(":")) => {
				let begin = self.next_index()?;
				self.bump()?;
				let colon = self.bump()?;

				Ok(Statement::Label {
					text: self.text(begin, self.cursor - 1),
					position: start.to(colon.position),
				})
			}
			_ if self.looks_like_declaration() => {
				self.parse_declaration().map(Statement::Declaration)
			}
			_ => self.parse_expression_statement(),
		}
	}

	fn parse_for(&mut self, start: Position) -> IrpResult<Statement> {
		self.bump()?;
		self.expect_symbol("(")?;

		let init = if self.peek().is_some_and(|t| t.token.is_symbol(";")) {
			self.bump()?;
			None
		} else if self.looks_like_declaration() {
			Some(ForInit::Declaration(self.parse_declaration()?))
		} else {
			let begin = self.next_index()?;
			let end = self.scan_until(";")?;
			self.cursor = end + 1;
			self.expr(begin, end).map(ForInit::Expression)
		};

		let condition = if self.peek().is_some_and(|t| t.token.is_symbol(";")) {
			self.bump()?;
			None
		} else {
			let begin = self.next_index()?;
			let end = self.scan_until(";")?;
			self.cursor = end + 1;
			self.expr(begin, end)
		};

		let step = if self.peek().is_some_and(|t| t.token.is_symbol(")")) {
			self.bump()?;
			None
		} else {
			let begin = self.next_index()?;
			let end = self.scan_until(")")?;
			self.cursor = end + 1;
			self.expr(begin, end)
		};

		let body = Box::new(self.parse_statement()?);

		Ok(Statement::For {
			init,
			condition,
			step,
			body,
			position: start.to(self.previous_position()),
		})
	}

	/// Parse a parenthesized, non-empty condition.
	fn parse_condition(&mut self) -> IrpResult<Expr> {
		let open = self.expect_symbol("(")?;
		let begin = self.next_index()?;
		let end = self.scan_until(")")?;
		self.cursor = end + 1;

		self.expr(begin, end)
			.ok_or_else(|| self.error(open, "expected a condition"))
	}

	fn parse_expression_statement(&mut self) -> IrpResult<Statement> {
		let begin = self.next_index()?;
		let end = self.scan_until(";")?;
		self.cursor = end + 1;

		let Some(expr) = self.expr(begin, end) else {
			return Ok(Statement::Empty(self.tokens[end].position));
		};

		if let Some(variable) = self.touch_target(&expr) {
			return Ok(Statement::Touch {
				variable,
				position: expr.position,
			});
		}

		Ok(Statement::Expression(expr))
	}

	/// `touch_x()` with no arguments names the variable `x`.
	fn touch_target(&self, expr: &Expr) -> Option<String> {
		let [callee, open, close] = expr.tokens.as_slice() else {
			return None;
		};

		if !open.token.is_symbol("(") || !close.token.is_symbol(")") {
			return None;
		}

		callee
			.token
			.ident()
			.and_then(|name| name.strip_prefix(self.touch_prefix))
			.filter(|variable| !variable.is_empty())
			.map(ToString::to_string)
	}

	fn parse_declaration(&mut self) -> IrpResult<Declaration> {
		let begin = self.next_index()?;
		let end = self.scan_until(";")?;
		self.cursor = end + 1;

		let significant = self.significant_between(begin, end);
		let mut declarators = Vec::new();
		let mut specifiers = String::new();

		for (segment_index, segment) in self
			.split_top_level(&significant, ",")
			.into_iter()
			.enumerate()
		{
			let Some(&first) = segment.first() else {
				return Err(self.error(self.tokens[begin].position, "expected a declarator"));
			};

			let equals = segment
				.iter()
				.position(|&i| self.tokens[i].token.is_symbol("="))
				.filter(|&at| self.depth_at(&segment, at) == 0);
			let declarator_part = &segment[..equals.unwrap_or(segment.len())];

			let Some(name_at) = self.last_top_level_ident_index(declarator_part) else {
				return Err(self.error(self.tokens[first].position, "expected a declarator"));
			};
			let name = self.tokens[declarator_part[name_at]]
				.token
				.to_string();

			let mut declarator_start = name_at;
			if segment_index == 0 {
				while declarator_start > 1 {
					let previous = &self.tokens[declarator_part[declarator_start - 1]].token;
					let is_pointer = previous.is_symbol("*");
					let is_qualifier = QUALIFIERS.iter().any(|q| previous.is_ident(q));
					if !is_pointer && !(is_qualifier && declarator_start > 2) {
						break;
					}
					declarator_start -= 1;
				}

				if declarator_start > 0 {
					specifiers = self.text(first, declarator_part[declarator_start - 1]);
				}
			} else {
				declarator_start = 0;
			}

			let text = self.text(
				declarator_part[declarator_start],
				declarator_part[declarator_part.len() - 1],
			);
			let init = equals.and_then(|at| {
				let rest = &segment[at + 1..];
				rest.first()
					.and_then(|&from| rest.last().and_then(|&to| self.expr(from, to + 1)))
			});
			let last = segment[segment.len() - 1];
			let position = self.tokens[declarator_part[declarator_start]]
				.position
				.to(self.tokens[last].position);

			declarators.push(Declarator {
				name,
				text,
				init,
				position,
			});
		}

		if specifiers.split_whitespace().any(|word| word == "typedef") {
			self.typedefs
				.extend(declarators.iter().map(|d| d.name.clone()));
		}

		Ok(Declaration {
			specifiers,
			declarators,
			text: self.text(begin, end),
			position: self.tokens[begin].position.to(self.tokens[end].position),
		})
	}

	/// Guess whether the statement at the cursor is a declaration.
	fn looks_like_declaration(&self) -> bool {
		let Some(first) = self.peek().and_then(|t| t.token.ident()) else {
			return false;
		};

		if DECLARATION_WORDS.contains(&first) || self.typedefs.contains(first) {
			return true;
		}

		// `name other` can only be a typedef name followed by a declarator.
		if self.peek_nth(1).is_some_and(|t| t.token.ident().is_some()) {
			return true;
		}

		// `FILE *f;` style declarations with a conventional type name.
		let looks_like_type = first.ends_with("_t") || first.starts_with(char::is_uppercase);
		looks_like_type
			&& self.peek_nth(1).is_some_and(|t| t.token.is_symbol("*"))
			&& self.peek_nth(2).is_some_and(|t| t.token.ident().is_some())
	}

	// --- token navigation ---

	/// Index of the first non-comment token at or after `from`.
	fn significant_from(&self, from: usize) -> Option<usize> {
		(from..self.tokens.len()).find(|&i| !self.tokens[i].token.is_comment())
	}

	fn previous_significant(&self, before: usize) -> Option<usize> {
		(0..before)
			.rev()
			.find(|&i| !self.tokens[i].token.is_comment())
	}

	/// Indices of the non-comment tokens in `from..to`.
	fn significant_between(&self, from: usize, to: usize) -> Vec<usize> {
		(from..to)
			.filter(|&i| !self.tokens[i].token.is_comment())
			.collect()
	}

	fn peek(&self) -> Option<&Spanned> {
		self.significant_from(self.cursor).map(|i| &self.tokens[i])
	}

	fn peek_nth(&self, n: usize) -> Option<&Spanned> {
		let mut index = self.significant_from(self.cursor)?;
		for _ in 0..n {
			index = self.significant_from(index + 1)?;
		}
		Some(&self.tokens[index])
	}

	fn next_index(&self) -> IrpResult<usize> {
		self.significant_from(self.cursor)
			.ok_or_else(|| self.error_at_end("unexpected end of input"))
	}

	fn bump(&mut self) -> IrpResult<Spanned> {
		let index = self.next_index()?;
		self.cursor = index + 1;
		Ok(self.tokens[index].clone())
	}

	fn expect_symbol(&mut self, symbol: &str) -> IrpResult<Position> {
		let index = self.next_index()?;
		let spanned = &self.tokens[index];
		if !spanned.token.is_symbol(symbol) {
			return Err(self.error(
				spanned.position,
				format!("expected `{symbol}`, found `{}`", spanned.token),
			));
		}

		self.cursor = index + 1;
		Ok(spanned.position)
	}

	/// Consume a comment sitting directly at the cursor.
	fn take_comment(&mut self) -> Option<Spanned> {
		let spanned = self.tokens.get(self.cursor)?;
		if !spanned.token.is_comment() {
			return None;
		}

		self.cursor += 1;
		Some(spanned.clone())
	}

	fn previous_position(&self) -> Position {
		self.previous_significant(self.cursor)
			.map(|i| self.tokens[i].position)
			.unwrap_or_default()
	}

	/// Find the first token at nesting depth zero that is `stop`, starting at
	/// the cursor. Closing brackets that do not match an opening one are
	/// errors.
	fn scan_until(&self, stop: &str) -> IrpResult<usize> {
		let mut stack: Vec<&str> = Vec::new();

		for index in self.cursor..self.tokens.len() {
			let token = &self.tokens[index].token;
			if token.is_comment() {
				continue;
			}

			if stack.is_empty() && token.is_symbol(stop) {
				return Ok(index);
			}

			if let Token::Symbol(symbol) = token {
				match symbol.as_str() {
					"(" => stack.push(")"),
					"[" => stack.push("]"),
					"{" => stack.push("}"),
					")" | "]" | "}" => {
						if stack.pop() != Some(symbol.as_str()) {
							return Err(self.error(
								self.tokens[index].position,
								format!("expected `{stop}` before `{symbol}`"),
							));
						}
					}
					_ => {}
				}
			}
		}

		Err(self.error_at_end(format!("expected `{stop}`")))
	}

	/// Split significant token indices on `separator` at depth zero.
	fn split_top_level(&self, indices: &[usize], separator: &str) -> Vec<Vec<usize>> {
		let mut segments = vec![Vec::new()];
		let mut depth = 0_usize;

		for &index in indices {
			let token = &self.tokens[index].token;
			if token.opens() {
				depth += 1;
			} else if token.closes() {
				depth = depth.saturating_sub(1);
			} else if depth == 0 && token.is_symbol(separator) {
				segments.push(Vec::new());
				continue;
			}

			if let Some(segment) = segments.last_mut() {
				segment.push(index);
			}
		}

		segments.retain(|segment| !segment.is_empty());
		segments
	}

	/// Nesting depth just before position `at` within `indices`.
	fn depth_at(&self, indices: &[usize], at: usize) -> usize {
		indices[..at].iter().fold(0_usize, |depth, &i| {
			let token = &self.tokens[i].token;
			if token.opens() {
				depth + 1
			} else if token.closes() {
				depth.saturating_sub(1)
			} else {
				depth
			}
		})
	}

	/// Position within `indices` of the last identifier at depth zero.
	fn last_top_level_ident_index(&self, indices: &[usize]) -> Option<usize> {
		let mut depth = 0_usize;
		let mut found = None;

		for (at, &index) in indices.iter().enumerate() {
			let token = &self.tokens[index].token;
			if token.opens() {
				depth += 1;
			} else if token.closes() {
				depth = depth.saturating_sub(1);
			} else if depth == 0 && token.ident().is_some() {
				found = Some(at);
			}
		}

		found
	}

	fn last_top_level_ident(&self, indices: &[usize]) -> Option<String> {
		self.last_top_level_ident_index(indices)
			.map(|at| self.tokens[indices[at]].token.to_string())
	}

	/// Verbatim source text from token `from` through token `to` inclusive.
	fn text(&self, from: usize, to: usize) -> String {
		let start = self.tokens[from].position.start.offset;
		let end = self.tokens[to].position.end.offset;
		self.source[start..end].to_string()
	}

	/// Build an expression from tokens `from..to`, or `None` if empty.
	fn expr(&self, from: usize, to: usize) -> Option<Expr> {
		let significant = self.significant_between(from, to);
		let (&first, &last) = (significant.first()?, significant.last()?);

		Some(Expr {
			tokens: significant
				.iter()
				.map(|&i| self.tokens[i].clone())
				.collect(),
			text: self.text(first, last),
			position: self.tokens[first].position.to(self.tokens[last].position),
		})
	}

	fn error(&self, position: Position, message: impl Into<String>) -> IrpError {
		IrpError::syntax(self.file, position, message)
	}

	fn error_at_end(&self, message: impl Into<String>) -> IrpError {
		let position = self
			.tokens
			.last()
			.map(|t| {
				Position {
					start: t.position.end,
					end: t.position.end,
				}
			})
			.unwrap_or_default();
		self.error(position, message)
	}
}
