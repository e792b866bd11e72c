use std::path::Path;

use logos::Logos;

use crate::IrpError;
use crate::IrpResult;
use crate::position::LineTable;
use crate::tokens::Spanned;
use crate::tokens::Token;

/// Raw tokens produced by logos for flat tokenization of a source file.
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
	#[regex(r"//[^\n]*", allow_greedy = true)]
	LineComment,
	#[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
	BlockComment,
	#[regex(r"#([^\n\\]|\\[^\n]|\\\n)*")]
	Directive,
	#[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
	Ident,
	#[regex(r"([0-9]+(\.[0-9]*)?|\.[0-9]+)([eEpP][+-]?[0-9]+)?[A-Za-z0-9_]*")]
	Number,
	#[regex(r#""([^"\\\n]|\\.)*""#)]
	Str,
	#[regex(r"'([^'\\\n]|\\.)*'")]
	Char,
	#[token("<<=")]
	#[token(">>=")]
	#[token("...")]
	#[token("->")]
	#[token("++")]
	#[token("--")]
	#[token("<<")]
	#[token(">>")]
	#[token("<=")]
	#[token(">=")]
	#[token("==")]
	#[token("!=")]
	#[token("&&")]
	#[token("||")]
	#[token("+=")]
	#[token("-=")]
	#[token("*=")]
	#[token("/=")]
	#[token("%=")]
	#[token("&=")]
	#[token("^=")]
	#[token("|=")]
	#[regex(r"[-+*/%<>=!&|^~?:;,.(){}\[\]]")]
	Symbol,
}

/// Walks the logos token stream, attaching positions and turning raw tokens
/// into [`Token`]s.
struct TokenWalker<'a> {
	/// The source text being tokenized.
	source: &'a str,
	/// The file the source was read from, for diagnostics.
	file: &'a Path,
	/// Line-start table used to convert byte offsets into positions.
	lines: LineTable,
	/// Collected tokens.
	tokens: Vec<Spanned>,
}

impl<'a> TokenWalker<'a> {
	fn new(source: &'a str, file: &'a Path) -> Self {
		Self {
			source,
			file,
			lines: LineTable::new(source),
			tokens: Vec::new(),
		}
	}

	fn process(mut self) -> IrpResult<Vec<Spanned>> {
		let mut lexer = RawToken::lexer(self.source);

		while let Some(result) = lexer.next() {
			let span = lexer.span();
			let slice = lexer.slice();
			let position = self.lines.position(span.clone());

			let Ok(raw) = result else {
				let message = match slice.chars().next() {
					Some('/') if slice.starts_with("/*") => "unterminated block comment".to_string(),
					Some('"') => "unterminated string literal".to_string(),
					Some('\'') => "unterminated character literal".to_string(),
					Some(ch) => format!("unexpected character `{ch}`"),
					None => "unexpected end of input".to_string(),
				};
				return Err(IrpError::syntax(self.file, position, message));
			};

			let text = slice.to_string();
			let token = match raw {
				RawToken::LineComment | RawToken::BlockComment => Token::Comment(text),
				RawToken::Directive => Token::Directive(text.trim_end().to_string()),
				RawToken::Ident => Token::Ident(text),
				RawToken::Number => Token::Number(text),
				RawToken::Str => Token::Str(text),
				RawToken::Char => Token::Char(text),
				RawToken::Symbol => {
					// A lone `/*` means the comment regex failed to find its end.
					if text == "*" && self.follows_slash(span.start) {
						let start = self.tokens.pop().map_or(position, |t| t.position);
						return Err(IrpError::syntax(
							self.file,
							start,
							"unterminated block comment",
						));
					}
					Token::Symbol(text)
				}
			};

			self.tokens.push(Spanned::new(token, position));
		}

		Ok(self.tokens)
	}

	fn follows_slash(&self, offset: usize) -> bool {
		self.tokens.last().is_some_and(|previous| {
			previous.token.is_symbol("/") && previous.position.end.offset == offset
		})
	}
}

/// Split `source` into tokens. Comments and directives are kept so they can
/// be re-emitted; whitespace is dropped.
pub fn tokenize(source: &str, file: &Path) -> IrpResult<Vec<Spanned>> {
	TokenWalker::new(source, file).process()
}
