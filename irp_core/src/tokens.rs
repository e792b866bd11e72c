use std::fmt::Display;

use crate::Position;

/// A lexical token of the host language.
///
/// Expressions are never parsed beyond their tokens, so the token set only
/// distinguishes what statement parsing and identifier scanning need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
	/// An identifier or keyword, e.g. `x_next` or `while`.
	Ident(String),
	/// A numeric literal, e.g. `10`, `1.e-9` or `0xffu`.
	Number(String),
	/// A string literal including its quotes, e.g. `"x %f\n"`.
	Str(String),
	/// A character literal including its quotes, e.g. `'a'`.
	Char(String),
	/// Punctuation or an operator, e.g. `;`, `->` or `+=`.
	Symbol(String),
	/// A `//` or `/* */` comment.
	Comment(String),
	/// A preprocessor directive spanning one logical line, e.g.
	/// `#include <stdio.h>`.
	Directive(String),
}

impl Token {
	/// The identifier text if this is an identifier.
	pub fn ident(&self) -> Option<&str> {
		match self {
			Token::Ident(ident) => Some(ident),
			_ => None,
		}
	}

	pub fn is_ident(&self, name: &str) -> bool {
		matches!(self, Token::Ident(ident) if ident == name)
	}

	pub fn is_symbol(&self, symbol: &str) -> bool {
		matches!(self, Token::Symbol(value) if value == symbol)
	}

	pub fn is_comment(&self) -> bool {
		matches!(self, Token::Comment(_))
	}

	/// Opening brackets increase nesting depth.
	pub fn opens(&self) -> bool {
		matches!(self, Token::Symbol(s) if s == "(" || s == "[" || s == "{")
	}

	/// Closing brackets decrease nesting depth.
	pub fn closes(&self) -> bool {
		matches!(self, Token::Symbol(s) if s == ")" || s == "]" || s == "}")
	}

	/// Assignment operators, simple or compound.
	pub fn is_assignment(&self) -> bool {
		matches!(
			self,
			Token::Symbol(s) if matches!(
				s.as_str(),
				"=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>="
			)
		)
	}

	pub fn is_increment(&self) -> bool {
		self.is_symbol("++") || self.is_symbol("--")
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Token::Ident(text)
			| Token::Number(text)
			| Token::Str(text)
			| Token::Char(text)
			| Token::Symbol(text)
			| Token::Comment(text)
			| Token::Directive(text) => write!(f, "{text}"),
		}
	}
}

/// A token together with its location in the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned {
	pub token: Token,
	pub position: Position,
}

impl Spanned {
	pub fn new(token: Token, position: Position) -> Self {
		Self { token, position }
	}
}
