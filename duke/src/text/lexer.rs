//! Splitting the textual format into lines of tokens.
//!
//! The format is line based, so tokens never span lines. A line consists of words, quoted strings and the punctuation
//! characters `{ } , = :`. Comments start with `//` and run to the end of the line.

use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaString;
use crate::error::{OrTranslationError, TranslationError};
use crate::jstring;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
	Word(String),
	String(JavaString),
	Punct(char),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
	pub(crate) kind: TokenKind,
	/// The column of the first character, starting at `1`.
	pub(crate) column: usize,
}

const PUNCTUATION: [char; 5] = ['{', '}', ',', '=', ':'];

/// The tokens of a single non-empty line, together with a cursor.
#[derive(Debug)]
pub(crate) struct Line {
	/// The line number, starting at `1`.
	pub(crate) number: usize,
	tokens: Vec<Token>,
	position: usize,
	/// The column after the last character of the line.
	end_column: usize,
}

impl Line {
	/// The column of the token at the cursor, or the end of the line.
	fn column(&self) -> usize {
		self.tokens.get(self.position).map_or(self.end_column, |token| token.column)
	}

	pub(crate) fn syntax_error(&self) -> TranslationError {
		TranslationError::Syntax { line: self.number, column: self.column() }
	}

	/// Runs `f` on this line, and requires it to consume every token. Errors get a [`TranslationError::Syntax`] pointing
	/// at the token the cursor stopped at.
	pub(crate) fn parse<T>(&mut self, f: impl FnOnce(&mut Line) -> Result<T>) -> Result<T> {
		let result = f(self).and_then(|value| {
			if let Some(token) = self.peek() {
				bail!("unexpected {} at the end of the line", describe(token));
			}
			Ok(value)
		});
		result.or_translation_error(|| self.syntax_error())
	}

	pub(crate) fn len(&self) -> usize {
		self.tokens.len()
	}

	pub(crate) fn peek(&self) -> Option<&TokenKind> {
		self.tokens.get(self.position).map(|token| &token.kind)
	}

	pub(crate) fn peek_word(&self) -> Option<&str> {
		match self.peek() {
			Some(TokenKind::Word(word)) => Some(word),
			_ => None,
		}
	}

	pub(crate) fn is_at_end(&self) -> bool {
		self.position >= self.tokens.len()
	}

	pub(crate) fn is_punct(&self, c: char) -> bool {
		self.peek() == Some(&TokenKind::Punct(c))
	}

	/// The token `n` tokens after the cursor.
	pub(crate) fn peek_nth(&self, n: usize) -> Option<&TokenKind> {
		self.tokens.get(self.position + n).map(|token| &token.kind)
	}

	pub(crate) fn advance(&mut self) {
		self.position += 1;
	}

	pub(crate) fn next_token(&mut self) -> Result<TokenKind> {
		let token = self.tokens.get(self.position)
			.map(|token| token.kind.clone())
			.context("unexpected end of the line")?;
		self.advance();
		Ok(token)
	}

	pub(crate) fn next_word(&mut self) -> Result<String> {
		match self.peek() {
			Some(TokenKind::Word(word)) => {
				let word = word.clone();
				self.advance();
				Ok(word)
			},
			Some(token) => bail!("expected a word, got {}", describe(token)),
			None => bail!("expected a word, got the end of the line"),
		}
	}

	/// Parses the next word with the given function, leaving the cursor on it if that fails.
	pub(crate) fn next_parsed<T>(&mut self, f: impl FnOnce(&str) -> Result<T>) -> Result<T> {
		let value = match self.peek() {
			Some(TokenKind::Word(word)) => f(word)?,
			Some(token) => bail!("expected a word, got {}", describe(token)),
			None => bail!("expected a word, got the end of the line"),
		};
		self.advance();
		Ok(value)
	}

	/// Like [`Line::next_parsed`], also accepting a quoted string for names that can't be written as a word.
	pub(crate) fn next_name<T>(&mut self, f: impl FnOnce(&str) -> Result<T>) -> Result<T> {
		let value = match self.peek() {
			Some(TokenKind::Word(word)) => f(word)?,
			Some(TokenKind::String(string)) => f(jstring::to_rust_str(string)?)?,
			Some(token) => bail!("expected a name, got {}", describe(token)),
			None => bail!("expected a name, got the end of the line"),
		};
		self.advance();
		Ok(value)
	}

	/// Checks if the next token is a word or a quoted string.
	pub(crate) fn is_name(&self) -> bool {
		matches!(self.peek(), Some(TokenKind::Word(_) | TokenKind::String(_)))
	}

	pub(crate) fn next_string(&mut self) -> Result<JavaString> {
		match self.peek() {
			Some(TokenKind::String(string)) => {
				let string = string.clone();
				self.advance();
				Ok(string)
			},
			Some(token) => bail!("expected a string, got {}", describe(token)),
			None => bail!("expected a string, got the end of the line"),
		}
	}

	/// Like [`Line::next_string`], for strings that can't hold unpaired surrogates.
	pub(crate) fn next_rust_string(&mut self) -> Result<String> {
		match self.peek() {
			Some(TokenKind::String(string)) => {
				let string = jstring::to_rust_str(string)?.to_owned();
				self.advance();
				Ok(string)
			},
			Some(token) => bail!("expected a string, got {}", describe(token)),
			None => bail!("expected a string, got the end of the line"),
		}
	}

	pub(crate) fn expect_word(&mut self, expected: &str) -> Result<()> {
		match self.peek() {
			Some(TokenKind::Word(word)) if word == expected => {
				self.advance();
				Ok(())
			},
			Some(token) => bail!("expected `{expected}`, got {}", describe(token)),
			None => bail!("expected `{expected}`, got the end of the line"),
		}
	}

	pub(crate) fn expect_punct(&mut self, expected: char) -> Result<()> {
		match self.peek() {
			Some(TokenKind::Punct(c)) if *c == expected => {
				self.advance();
				Ok(())
			},
			Some(token) => bail!("expected `{expected}`, got {}", describe(token)),
			None => bail!("expected `{expected}`, got the end of the line"),
		}
	}

	/// Consumes the word if it's the next token.
	pub(crate) fn eat_word(&mut self, word: &str) -> bool {
		let matches = self.peek_word() == Some(word);
		if matches {
			self.advance();
		}
		matches
	}

	/// Consumes the punctuation character if it's the next token.
	pub(crate) fn eat_punct(&mut self, c: char) -> bool {
		let matches = self.is_punct(c);
		if matches {
			self.advance();
		}
		matches
	}

	/// Parses a comma separated list in braces, like `{ a, b, c }`.
	pub(crate) fn braced_list<T>(&mut self, mut element: impl FnMut(&mut Line) -> Result<T>) -> Result<Vec<T>> {
		self.expect_punct('{')?;
		let mut vec = Vec::new();
		if self.eat_punct('}') {
			return Ok(vec);
		}
		loop {
			vec.push(element(self)?);
			if self.eat_punct('}') {
				return Ok(vec);
			}
			self.expect_punct(',')?;
		}
	}
}

fn describe(token: &TokenKind) -> String {
	match token {
		TokenKind::Word(word) => format!("`{word}`"),
		TokenKind::String(_) => "a string".to_owned(),
		TokenKind::Punct(c) => format!("`{c}`"),
	}
}

/// Splits the text into its non-empty lines of tokens.
pub(crate) fn lines(text: &str) -> Result<Vec<Line>> {
	let mut lines = Vec::new();
	for (index, line) in text.lines().enumerate() {
		let number = index + 1;
		let tokens = tokenize(line)
			.map_err(|(column, e)| e.context(TranslationError::Syntax { line: number, column }))?;
		if !tokens.is_empty() {
			lines.push(Line {
				number,
				tokens,
				position: 0,
				end_column: line.chars().count() + 1,
			});
		}
	}
	Ok(lines)
}

/// Tokenizes one line. Errors carry the column they occurred at.
fn tokenize(line: &str) -> Result<Vec<Token>, (usize, anyhow::Error)> {
	let chars: Vec<char> = line.chars().collect();
	let mut tokens = Vec::new();
	let mut i = 0;
	while i < chars.len() {
		let c = chars[i];
		let column = i + 1;
		if c.is_whitespace() {
			i += 1;
		} else if c == '/' && chars.get(i + 1) == Some(&'/') {
			break;
		} else if PUNCTUATION.contains(&c) {
			tokens.push(Token { kind: TokenKind::Punct(c), column });
			i += 1;
		} else if c == '"' {
			let start = i + 1;
			let mut end = start;
			loop {
				match chars.get(end) {
					None => return Err((column, anyhow!("string isn't closed"))),
					Some('\\') => end += 2,
					Some('"') => break,
					Some(_) => end += 1,
				}
			}
			let raw: String = chars[start..end.min(chars.len())].iter().collect();
			let string = jstring::unescape(&raw).map_err(|e| (column, e))?;
			tokens.push(Token { kind: TokenKind::String(string), column });
			i = end + 1;
		} else {
			let start = i;
			while i < chars.len() {
				let c = chars[i];
				if c.is_whitespace() || c == '"' || PUNCTUATION.contains(&c) || (c == '/' && chars.get(i + 1) == Some(&'/')) {
					break;
				}
				i += 1;
			}
			tokens.push(Token { kind: TokenKind::Word(chars[start..i].iter().collect()), column });
		}
	}
	Ok(tokens)
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaString;
	use pretty_assertions::assert_eq;
	use crate::error::TranslationError;
	use crate::text::lexer::{lines, TokenKind};

	fn word(s: &str) -> TokenKind {
		TokenKind::Word(s.to_owned())
	}

	#[test]
	fn words_strings_and_punctuation() -> Result<()> {
		let text = "\n\tGETSTATIC java/lang/System.out : Ljava/io/PrintStream; // a comment\n\n  LDC \"a \\\"b\\\"\"\n";
		let mut lines = lines(text)?;
		assert_eq!(lines.len(), 2);

		let line = &mut lines[0];
		assert_eq!(line.number, 2);
		assert_eq!(line.next_token()?, word("GETSTATIC"));
		assert_eq!(line.next_token()?, word("java/lang/System.out"));
		assert_eq!(line.next_token()?, TokenKind::Punct(':'));
		assert_eq!(line.next_token()?, word("Ljava/io/PrintStream;"));
		assert!(line.is_at_end());

		let line = &mut lines[1];
		assert_eq!(line.number, 4);
		assert_eq!(line.next_word()?, "LDC");
		assert_eq!(line.next_string()?, JavaString::from("a \"b\""));
		Ok(())
	}

	#[test]
	fn punctuation_splits_words() -> Result<()> {
		let mut lines = lines("LOOKUPSWITCH {1:L0,2 : L1} default L2")?;
		let line = &mut lines[0];
		let mut tokens = Vec::new();
		while !line.is_at_end() {
			tokens.push(line.next_token()?);
		}
		assert_eq!(tokens, vec![
			word("LOOKUPSWITCH"), TokenKind::Punct('{'), word("1"), TokenKind::Punct(':'), word("L0"),
			TokenKind::Punct(','), word("2"), TokenKind::Punct(':'), word("L1"), TokenKind::Punct('}'),
			word("default"), word("L2"),
		]);
		Ok(())
	}

	#[test]
	fn unclosed_string() {
		let e = lines("ok\n  LDC \"abc").unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Syntax { line: 2, column: 7 }));
	}

	#[test]
	fn leftover_tokens_are_reported() -> Result<()> {
		let mut lines = lines("MAXSTACK = 1 2")?;
		let e = lines[0].parse(|line| {
			line.expect_word("MAXSTACK")?;
			line.expect_punct('=')?;
			line.next_parsed(|s| Ok(s.parse::<u16>()?))
		}).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Syntax { line: 1, column: 14 }));
		Ok(())
	}
}
