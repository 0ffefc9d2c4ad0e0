//! The kinds of failures a translation can end in.
//!
//! Every error returned by this crate is an [`anyhow::Error`]. The kind of the failure is attached to the error chain as a
//! [`TranslationError`], and can be recovered with [`TranslationError::of`].

use std::fmt::{Display, Formatter};
use anyhow::{Error, Result};

/// The kind of failure of translating one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
	/// The textual input is malformed.
	Syntax {
		/// The line of the offending token, starting at `1`.
		line: usize,
		/// The column of the offending token, starting at `1`.
		column: usize,
	},
	/// The binary input is malformed.
	MalformedClass {
		/// The byte offset into the class file where reading failed.
		offset: u64,
	},
	/// A label is used but never bound inside the same method.
	UnresolvedLabel {
		label: String,
	},
	/// The stack or local variable types don't allow an instruction to execute.
	Verification {
		/// The index of the instruction in the instruction list of the method.
		instruction: usize,
	},
	/// A value doesn't fit into the binary format, or a structural limit is exceeded.
	Encoding,
	/// The constant pool has more than [`u16::MAX`] slots.
	ConstantPoolOverflow,
}

impl TranslationError {
	/// Finds the kind of failure attached to an error, if there is one.
	pub fn of(error: &Error) -> Option<&TranslationError> {
		error.downcast_ref()
	}

	/// A short name for the kind, as printed by command line tools.
	pub fn kind(&self) -> &'static str {
		match self {
			TranslationError::Syntax { .. } => "syntax",
			TranslationError::MalformedClass { .. } => "malformed-class",
			TranslationError::UnresolvedLabel { .. } => "unresolved-label",
			TranslationError::Verification { .. } => "verification",
			TranslationError::Encoding => "encoding",
			TranslationError::ConstantPoolOverflow => "constant-pool-overflow",
		}
	}

	/// The process exit code for this kind. `1` is left for errors without a kind, like I/O failures.
	pub fn exit_code(&self) -> i32 {
		match self {
			TranslationError::Syntax { .. } => 2,
			TranslationError::MalformedClass { .. } => 3,
			TranslationError::UnresolvedLabel { .. } => 4,
			TranslationError::Verification { .. } => 5,
			TranslationError::Encoding => 6,
			TranslationError::ConstantPoolOverflow => 7,
		}
	}
}

impl Display for TranslationError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			TranslationError::Syntax { line, column } => write!(f, "syntax error at line {line}, column {column}"),
			TranslationError::MalformedClass { offset } => write!(f, "malformed class file at byte offset {offset}"),
			TranslationError::UnresolvedLabel { label } => write!(f, "label {label} is never bound"),
			TranslationError::Verification { instruction } => write!(f, "verification failed at instruction {instruction}"),
			TranslationError::Encoding => write!(f, "cannot encode class file"),
			TranslationError::ConstantPoolOverflow => write!(f, "constant pool overflow"),
		}
	}
}

impl std::error::Error for TranslationError {}

/// Attaches a [`TranslationError`] to an error chain, unless an inner error already carries one.
///
/// The innermost kind wins, so that the first error encountered determines the kind.
pub(crate) trait OrTranslationError<T> {
	fn or_translation_error(self, kind: impl FnOnce() -> TranslationError) -> Result<T>;
}

impl<T> OrTranslationError<T> for Result<T> {
	fn or_translation_error(self, kind: impl FnOnce() -> TranslationError) -> Result<T> {
		self.map_err(|e| {
			if TranslationError::of(&e).is_some() {
				e
			} else {
				e.context(kind())
			}
		})
	}
}

#[cfg(test)]
mod testing {
	use anyhow::{anyhow, Context, Result};
	use pretty_assertions::assert_eq;
	use crate::error::{OrTranslationError, TranslationError};

	#[test]
	fn innermost_kind_wins() {
		let result: Result<()> = Err(anyhow!("inner"))
			.or_translation_error(|| TranslationError::Encoding)
			.context("some layer")
			.or_translation_error(|| TranslationError::ConstantPoolOverflow);

		let e = result.unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Encoding));
	}

	#[test]
	fn kind_found_below_context() {
		let result: Result<()> = Err(anyhow!("inner"))
			.or_translation_error(|| TranslationError::Syntax { line: 3, column: 7 })
			.context("while parsing");

		let e = result.unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Syntax { line: 3, column: 7 }));
		assert_eq!(format!("{e:#}"), "while parsing: syntax error at line 3, column 7: inner");
	}
}
