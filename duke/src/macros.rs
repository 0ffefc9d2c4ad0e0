/// Creates a [`String`] newtype that only holds contents that pass a validity check.
///
/// The check is given as an expression over the name bound in `is_valid(name)`:
/// ```ignore
/// make_string_like! {
///     /// Some doc.
///     pub Name;
///     is_valid(s) = !s.is_empty();
/// }
/// ```
///
/// The type gets [`TryFrom<String>`] and [`TryFrom<&str>`] implementations that run the check, and dereferences to [`str`].
macro_rules! make_string_like {
	(
		$( #[$doc:meta] )*
		$vis:vis $name:ident ;
		is_valid($s:ident) = $is_valid:expr ;
	) => {
		$( #[$doc] )*
		#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
		$vis struct $name(String);

		impl $name {
			pub fn as_str(&self) -> &str {
				&self.0
			}

			pub fn into_inner(self) -> String {
				self.0
			}

			/// Checks if a given value is valid for being represented by this type.
			pub fn is_valid($s: &str) -> bool {
				$is_valid
			}

			#[doc = concat!("Constructs [`", stringify!($name), "`] without checking the content.")]
			///
			/// Only for contents that are known to be valid, like constants or parts of an already checked value.
			#[allow(dead_code)]
			pub(crate) fn new_unchecked(s: impl Into<String>) -> $name {
				$name(s.into())
			}
		}

		impl std::ops::Deref for $name {
			type Target = str;

			fn deref(&self) -> &str {
				&self.0
			}
		}

		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}

		impl std::fmt::Display for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl TryFrom<String> for $name {
			type Error = anyhow::Error;

			fn try_from(value: String) -> anyhow::Result<$name> {
				if $name::is_valid(&value) {
					Ok($name(value))
				} else {
					anyhow::bail!(concat!("invalid ", stringify!($name), ": {:?}"), value)
				}
			}
		}
		impl TryFrom<&str> for $name {
			type Error = anyhow::Error;

			fn try_from(value: &str) -> anyhow::Result<$name> {
				$name::try_from(value.to_owned())
			}
		}

		impl From<$name> for String {
			fn from(value: $name) -> String {
				value.0
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				self.0 == other
			}
		}
		impl<'a> PartialEq<&'a str> for $name {
			fn eq(&self, other: &&'a str) -> bool {
				self.0 == *other
			}
		}
	}
}

/// Creates a struct of `bool`s for access flags, together with the conversions from and to the `u16` flag word, and a
/// [`Debug`][std::fmt::Debug] implementation listing the set flags.
///
/// Flag bits not listed are kept in the `other` field, so that no information is lost.
macro_rules! make_access_flags {
	(
		$( #[$doc:meta] )*
		$vis:vis $name:ident {
			$( $flag:ident : $keyword:literal = $bit:literal ),* $(,)?
		}
	) => {
		$( #[$doc] )*
		#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
		$vis struct $name {
			$( pub $flag: bool, )*
			/// All the bits without a name in this context.
			pub other: u16,
		}

		impl $name {
			/// The flag keywords, in the order of their bits.
			pub const KEYWORDS: &'static [&'static str] = &[ $( $keyword, )* ];

			/// Sets the flag named by `keyword`. Returns `false` if there's no such flag.
			pub fn set_keyword(&mut self, keyword: &str) -> bool {
				match keyword {
					$( $keyword => self.$flag = true, )*
					_ => return false,
				}
				true
			}

			/// The names of all set flags, in the order of their bits.
			pub fn keywords(&self) -> Vec<&'static str> {
				let mut vec = Vec::new();
				$( if self.$flag { vec.push($keyword); } )*
				vec
			}
		}

		impl std::fmt::Debug for $name {
			fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
				write!(f, concat!(stringify!($name), " {{ "))?;
				for keyword in self.keywords() {
					write!(f, "{keyword} ")?;
				}
				if self.other != 0 {
					write!(f, "{:#06x} ", self.other)?;
				}
				write!(f, "}}")
			}
		}

		impl From<u16> for $name {
			fn from(value: u16) -> Self {
				let mut other = value;
				$( other &= !$bit; )*
				$name {
					$( $flag: value & $bit != 0, )*
					other,
				}
			}
		}

		impl From<$name> for u16 {
			fn from(value: $name) -> Self {
				let mut flags = value.other;
				$( if value.$flag { flags |= $bit; } )*
				flags
			}
		}
	}
}

pub(crate) use make_string_like;
pub(crate) use make_access_flags;
