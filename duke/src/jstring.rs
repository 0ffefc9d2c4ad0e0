//! Conversions of strings to and from the two external forms they have: the modified UTF-8 of the class file format, and
//! the quoted, escaped form of the textual format.
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.4.7> for the modified UTF-8 format.

use std::borrow::Cow;
use std::fmt::Write;
use anyhow::{anyhow, bail, Context, Result};
use java_string::{JavaCodePoint, JavaStr, JavaString};

/// Takes in a vec of data, tries to read it into a [`JavaString`].
pub(crate) fn from_vec_to_string(vec: Vec<u8>) -> Result<JavaString> {
	JavaString::from_modified_utf8(vec)
		.with_context(|| anyhow!("invalid java utf8 contents"))
}

/// Takes in a string and writes it out into a vec.
pub(crate) fn from_string_to_vec(string: &JavaStr) -> Cow<[u8]> {
	string.to_modified_utf8()
}

/// Gets the contents of a [`JavaStr`] as a rust string, failing if it contains unpaired surrogates.
pub(crate) fn to_rust_str(string: &JavaStr) -> Result<&str> {
	string.as_str().ok()
		.with_context(|| anyhow!("string {string:?} contains unpaired surrogates"))
}

/// Writes the string in double quotes, escaping quotes, backslashes, control characters and unpaired surrogates.
pub(crate) fn escape(string: &JavaStr, out: &mut String) {
	out.push('"');
	for code_point in string.chars() {
		match code_point.as_char() {
			Some('"') => out.push_str("\\\""),
			Some('\\') => out.push_str("\\\\"),
			Some('\n') => out.push_str("\\n"),
			Some('\t') => out.push_str("\\t"),
			Some('\r') => out.push_str("\\r"),
			Some('\u{8}') => out.push_str("\\b"),
			Some('\u{c}') => out.push_str("\\f"),
			Some(ch) if !ch.is_control() => out.push(ch),
			_ => {
				// writing to a String never fails
				let _ = write!(out, "\\u{:04x}", code_point.as_u32());
			},
		}
	}
	out.push('"');
}

/// Resolves the escape sequences of the contents of a quoted string. The quotes must already be removed.
///
/// An `\uXXXX` escape of a high surrogate directly followed by one of a low surrogate results in a single code point.
pub(crate) fn unescape(raw: &str) -> Result<JavaString> {
	let mut s = JavaString::with_capacity(raw.len());
	let mut chars = raw.chars().peekable();

	let mut pending_high_surrogate: Option<u32> = None;

	while let Some(ch) = chars.next() {
		if ch != '\\' {
			flush_surrogate(&mut s, &mut pending_high_surrogate)?;
			s.push(ch);
			continue;
		}

		let escaped = chars.next().context("string ends in the middle of an escape sequence")?;
		let value = match escaped {
			'n' => '\n' as u32,
			't' => '\t' as u32,
			'r' => '\r' as u32,
			'b' => 0x8,
			'f' => 0xc,
			'"' => '"' as u32,
			'\'' => '\'' as u32,
			'\\' => '\\' as u32,
			'u' => {
				let mut value = 0;
				for _ in 0..4 {
					let digit = chars.next()
						.and_then(|x| x.to_digit(16))
						.context("expected four hex digits after `\\u`")?;
					value = value * 16 + digit;
				}
				value
			},
			x => bail!("unknown escape sequence `\\{x}`"),
		};

		match value {
			0xd800..=0xdbff => {
				flush_surrogate(&mut s, &mut pending_high_surrogate)?;
				pending_high_surrogate = Some(value);
			},
			0xdc00..=0xdfff => {
				if let Some(high) = pending_high_surrogate.take() {
					let combined = 0x10000 + ((high - 0xd800) << 10) + (value - 0xdc00);
					s.push(char::from_u32(combined).context("invalid surrogate pair")?);
				} else {
					s.push_java(JavaCodePoint::from_u32(value).context("invalid code point")?);
				}
			},
			value => {
				flush_surrogate(&mut s, &mut pending_high_surrogate)?;
				s.push(char::from_u32(value).with_context(|| anyhow!("invalid code point {value:#x}"))?);
			},
		}
	}
	flush_surrogate(&mut s, &mut pending_high_surrogate)?;

	Ok(s)
}

fn flush_surrogate(s: &mut JavaString, pending: &mut Option<u32>) -> Result<()> {
	if let Some(high) = pending.take() {
		s.push_java(JavaCodePoint::from_u32(high).context("invalid code point")?);
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::{JavaCodePoint, JavaStr, JavaString};
	use pretty_assertions::assert_eq;
	use crate::jstring::{escape, from_string_to_vec, from_vec_to_string, unescape};

	fn round_trip_str(raw: &[u8], string: &str) -> Result<()> {
		let str = JavaStr::from_str(string);
		assert_eq!(from_string_to_vec(str), raw);
		assert_eq!(from_vec_to_string(raw.to_owned())?, str);
		Ok(())
	}

	fn escaped(string: &JavaStr) -> String {
		let mut s = String::new();
		escape(string, &mut s);
		s
	}

	#[test]
	fn zero() -> Result<()> {
		round_trip_str(&[0b1100_0000, 0b1000_0000, 0b1100_0000, 0b1000_0000], "\0\0")
	}

	#[test]
	fn three_bytes() -> Result<()> {
		let vec = &[
			0b1110_0000, 0b1010_0000, 0b1000_0000,
			0b1110_1100, 0b1010_1011, 0b1011_1110,
			0b1110_1111, 0b1011_1111, 0b1011_1111,
		];
		round_trip_str(vec, "\u{0800}\u{cafe}\u{ffff}")
	}

	#[test]
	fn six_bytes() -> Result<()> {
		let vec = &[
			0b1110_1101, 0b1010_0000, 0b1000_0000, 0b1110_1101, 0b1011_0000, 0b1000_0000,
			0b1110_1101, 0b1010_1111, 0b1011_1111, 0b1110_1101, 0b1011_1111, 0b1011_1111,
		];
		round_trip_str(vec, "\u{010000}\u{10ffff}")
	}

	#[test]
	fn unmatched_surrogate() -> Result<()> {
		let vec = vec![ 0b1110_1101, 0b1010_0000, 0b1000_0000 ];
		assert_eq!(from_string_to_vec(&from_vec_to_string(vec.clone())?), vec);
		let vec = vec![ 0b1110_1101, 0b1011_1111, 0b1011_1111 ];
		assert_eq!(from_string_to_vec(&from_vec_to_string(vec.clone())?), vec);
		Ok(())
	}

	#[test]
	fn escape_plain_and_special() {
		assert_eq!(escaped(JavaStr::from_str("hello")), "\"hello\"");
		assert_eq!(escaped(JavaStr::from_str("a\"b\\c\nd\te")), r#""a\"b\\c\nd\te""#);
		assert_eq!(escaped(JavaStr::from_str("\u{1}")), r#""\u0001""#);
		assert_eq!(escaped(JavaStr::from_str("äö€")), "\"äö€\"");
	}

	#[test]
	fn unescape_inverts_escape() -> Result<()> {
		for s in ["", "hello", "a\"b\\c\nd\te", "\u{1}\u{7f}", "\u{010000}x"] {
			let java = JavaStr::from_str(s);
			let escaped = escaped(java);
			let inner = &escaped[1..escaped.len() - 1];
			assert_eq!(unescape(inner)?, java);
		}
		Ok(())
	}

	#[test]
	fn lone_surrogate_survives_text() -> Result<()> {
		let mut lone = JavaString::new();
		lone.push('a');
		lone.push_java(JavaCodePoint::from_u32(0xd800).unwrap());
		lone.push('b');

		let escaped = escaped(&lone);
		assert_eq!(escaped, r#""a\ud800b""#);
		assert_eq!(unescape(&escaped[1..escaped.len() - 1])?, lone);
		Ok(())
	}

	#[test]
	fn surrogate_pair_escape_combines() -> Result<()> {
		assert_eq!(unescape(r"\ud83d\ude00")?, JavaStr::from_str("\u{1f600}"));
		Ok(())
	}

	#[test]
	fn bad_escape() {
		assert!(unescape(r"\q").is_err());
		assert!(unescape(r"\u12").is_err());
		assert!(unescape("\\").is_err());
	}
}
