//! Type annotations, as found in the `RuntimeVisibleTypeAnnotations` and `RuntimeInvisibleTypeAnnotations` attributes.
//!
//! The target of a type annotation depends on where the attribute is, so [`TypeAnnotation`] is generic over one of
//! the `TargetInfo*` enums.

use std::fmt::{Display, Formatter};
use anyhow::{bail, Result};
use crate::tree::annotation::Annotation;
use crate::tree::method::code::{Label, LabelRange, LvIndex};

/// Targets of type annotations on a class.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TargetInfoClass {
	ClassTypeParameter {
		index: u8,
	},
	Extends,
	Implements {
		index: u16,
	},
	ClassTypeParameterBound {
		type_parameter_index: u8,
		bound_index: u8,
	},
}

/// Targets of type annotations on a field or record component.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TargetInfoField {
	Field,
}

/// Targets of type annotations on a method.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TargetInfoMethod {
	MethodTypeParameter {
		index: u8,
	},
	MethodTypeParameterBound {
		type_parameter_index: u8,
		bound_index: u8,
	},
	Return,
	Receiver,
	FormalParameter {
		index: u8,
	},
	Throws {
		index: u16,
	},
}

/// Targets of type annotations in the code of a method. Bytecode offsets are [`Label`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetInfoCode {
	LocalVariable {
		table: Vec<(LabelRange, LvIndex)>,
	},
	ResourceVariable {
		table: Vec<(LabelRange, LvIndex)>,
	},
	/// The index is into the exception table of the code.
	ExceptionParameter {
		index: u16,
	},
	InstanceOf(Label),
	New(Label),
	ConstructorReference(Label),
	MethodReference(Label),
	Cast {
		label: Label,
		index: u8,
	},
	ConstructorInvocationTypeArgument {
		label: Label,
		index: u8,
	},
	MethodInvocationTypeArgument {
		label: Label,
		index: u8,
	},
	ConstructorReferenceTypeArgument {
		label: Label,
		index: u8,
	},
	MethodReferenceTypeArgument {
		label: Label,
		index: u8,
	},
}

impl TargetInfoCode {
	pub fn for_each_label(&self, mut f: impl FnMut(Label)) {
		match self {
			TargetInfoCode::LocalVariable { table } | TargetInfoCode::ResourceVariable { table } => {
				for (range, _) in table {
					f(range.start);
					f(range.end);
				}
			},
			TargetInfoCode::ExceptionParameter { .. } => {},
			TargetInfoCode::InstanceOf(label) | TargetInfoCode::New(label) |
			TargetInfoCode::ConstructorReference(label) | TargetInfoCode::MethodReference(label) |
			TargetInfoCode::Cast { label, .. } |
			TargetInfoCode::ConstructorInvocationTypeArgument { label, .. } |
			TargetInfoCode::MethodInvocationTypeArgument { label, .. } |
			TargetInfoCode::ConstructorReferenceTypeArgument { label, .. } |
			TargetInfoCode::MethodReferenceTypeArgument { label, .. } => f(*label),
		}
	}

	pub(crate) fn for_each_label_mut(&mut self, mut f: impl FnMut(&mut Label)) {
		match self {
			TargetInfoCode::LocalVariable { table } | TargetInfoCode::ResourceVariable { table } => {
				for (range, _) in table {
					f(&mut range.start);
					f(&mut range.end);
				}
			},
			TargetInfoCode::ExceptionParameter { .. } => {},
			TargetInfoCode::InstanceOf(label) | TargetInfoCode::New(label) |
			TargetInfoCode::ConstructorReference(label) | TargetInfoCode::MethodReference(label) |
			TargetInfoCode::Cast { label, .. } |
			TargetInfoCode::ConstructorInvocationTypeArgument { label, .. } |
			TargetInfoCode::MethodInvocationTypeArgument { label, .. } |
			TargetInfoCode::ConstructorReferenceTypeArgument { label, .. } |
			TargetInfoCode::MethodReferenceTypeArgument { label, .. } => f(label),
		}
	}
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypePathKind {
	ArrayDeeper,
	NestedDeeper,
	WildcardBound,
	TypeArgument {
		index: u8,
	},
}

/// The path to the annotated part of a type.
///
/// Written as a string like `[*0;`: `[` steps into an array, `.` into a nested type, `*` into a wildcard bound and
/// `N;` into the type argument `N`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypePath {
	pub path: Vec<TypePathKind>,
}

impl TypePath {
	pub fn is_empty(&self) -> bool {
		self.path.is_empty()
	}

	pub fn parse(s: &str) -> Result<TypePath> {
		let mut path = Vec::new();
		let mut rest = s;
		while let Some(c) = rest.chars().next() {
			match c {
				'[' => path.push(TypePathKind::ArrayDeeper),
				'.' => path.push(TypePathKind::NestedDeeper),
				'*' => path.push(TypePathKind::WildcardBound),
				'0'..='9' => {
					let Some((index, tail)) = rest.split_once(';') else {
						bail!("type argument without `;` in type path {s:?}");
					};
					let index = index.parse()
						.map_err(|e| anyhow::anyhow!("invalid type argument index in type path {s:?}: {e}"))?;
					path.push(TypePathKind::TypeArgument { index });
					rest = tail;
					continue;
				},
				c => bail!("unexpected {c:?} in type path {s:?}"),
			}
			rest = &rest[1..];
		}
		Ok(TypePath { path })
	}
}

impl Display for TypePath {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		for kind in &self.path {
			match kind {
				TypePathKind::ArrayDeeper => f.write_str("[")?,
				TypePathKind::NestedDeeper => f.write_str(".")?,
				TypePathKind::WildcardBound => f.write_str("*")?,
				TypePathKind::TypeArgument { index } => write!(f, "{index};")?,
			}
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation<T> {
	pub type_reference: T,
	pub type_path: TypePath,
	pub annotation: Annotation,
}

impl<T> TypeAnnotation<T> {
	pub fn new(type_reference: T, type_path: TypePath, annotation: Annotation) -> TypeAnnotation<T> {
		TypeAnnotation { type_reference, type_path, annotation }
	}
}

/// The type annotations of one place, split by their retention.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotations<T> {
	pub visible: Vec<TypeAnnotation<T>>,
	pub invisible: Vec<TypeAnnotation<T>>,
}

impl<T> Default for TypeAnnotations<T> {
	fn default() -> Self {
		TypeAnnotations { visible: Vec::new(), invisible: Vec::new() }
	}
}

impl<T> TypeAnnotations<T> {
	pub fn is_empty(&self) -> bool {
		self.visible.is_empty() && self.invisible.is_empty()
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::tree::type_annotation::{TypePath, TypePathKind};

	#[test]
	fn type_path_text() -> Result<()> {
		let path = TypePath::parse("[.*12;0;")?;
		assert_eq!(path.path, vec![
			TypePathKind::ArrayDeeper,
			TypePathKind::NestedDeeper,
			TypePathKind::WildcardBound,
			TypePathKind::TypeArgument { index: 12 },
			TypePathKind::TypeArgument { index: 0 },
		]);
		assert_eq!(path.to_string(), "[.*12;0;");
		assert!(TypePath::parse("")?.is_empty());

		assert!(TypePath::parse("3").is_err());
		assert!(TypePath::parse("256;").is_err());
		assert!(TypePath::parse("x").is_err());
		Ok(())
	}
}
