pub mod code;

use crate::macros::{make_access_flags, make_string_like};
use crate::tree::annotation::{Annotation, Annotations, ElementValue};
use crate::tree::attribute::Attribute;
use crate::tree::class::ClassName;
use crate::tree::method::code::Code;
use crate::tree::type_annotation::{TargetInfoMethod, TypeAnnotations};

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
	pub access: MethodAccess,
	pub name: MethodName,
	pub descriptor: MethodDescriptor,

	pub has_deprecated_attribute: bool,
	pub has_synthetic_attribute: bool,

	pub code: Option<Code>,
	pub exceptions: Vec<ClassName>,
	pub signature: Option<String>,

	pub annotations: Annotations,
	pub type_annotations: TypeAnnotations<TargetInfoMethod>,
	pub parameter_annotations: ParameterAnnotations,
	/// The `AnnotationDefault` attribute of a method of an annotation interface.
	pub annotation_default: Option<ElementValue>,
	/// The `MethodParameters` attribute.
	pub parameters: Option<Vec<MethodParameter>>,

	pub attributes: Vec<Attribute>,
}

impl Method {
	pub fn new(access: MethodAccess, name: MethodName, descriptor: MethodDescriptor) -> Method {
		Method {
			access,
			name,
			descriptor,

			has_deprecated_attribute: false,
			has_synthetic_attribute: false,

			code: None,
			exceptions: Vec::new(),
			signature: None,

			annotations: Annotations::default(),
			type_annotations: TypeAnnotations::default(),
			parameter_annotations: ParameterAnnotations::default(),
			annotation_default: None,
			parameters: None,

			attributes: Vec::new(),
		}
	}

	pub fn is_constructor(&self) -> bool {
		self.name == "<init>"
	}
}

make_access_flags! {
	pub MethodAccess {
		is_public: "public" = 0x0001,
		is_private: "private" = 0x0002,
		is_protected: "protected" = 0x0004,
		is_static: "static" = 0x0008,
		is_final: "final" = 0x0010,
		is_synchronized: "synchronized" = 0x0020,
		is_bridge: "bridge" = 0x0040,
		is_varargs: "varargs" = 0x0080,
		is_native: "native" = 0x0100,
		is_abstract: "abstract" = 0x0400,
		is_strict: "strict" = 0x0800,
		is_synthetic: "synthetic" = 0x1000,
	}
}

/// The `RuntimeVisibleParameterAnnotations` and `RuntimeInvisibleParameterAnnotations` attributes.
///
/// Each holds one list per parameter. The number of lists may differ from the number of parameters in the descriptor,
/// so it is kept as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterAnnotations {
	pub visible: Option<Vec<Vec<Annotation>>>,
	pub invisible: Option<Vec<Vec<Annotation>>>,
}

impl ParameterAnnotations {
	pub fn is_empty(&self) -> bool {
		self.visible.is_none() && self.invisible.is_none()
	}
}

/// An entry of the `MethodParameters` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodParameter {
	pub name: Option<String>,
	pub flags: ParameterFlags,
}

make_access_flags! {
	/// The `access_flags` of an entry of the `MethodParameters` attribute.
	pub ParameterFlags {
		is_final: "final" = 0x0010,
		is_synthetic: "synthetic" = 0x1000,
		is_mandated: "mandated" = 0x8000,
	}
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MethodRef {
	pub class: ClassName,
	pub name: MethodName,
	pub desc: MethodDescriptor,
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MethodNameAndDesc {
	pub name: MethodName,
	pub desc: MethodDescriptor,
}

make_string_like! {
	pub MethodName;
	is_valid(s) = super::names::is_valid_method_name(s);
}

make_string_like! {
	/// A method descriptor, like `(I[J)V`.
	pub MethodDescriptor;
	is_valid(s) = crate::tree::descriptor::parse_method_descriptor(s).is_ok();
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::tree::method::{MethodAccess, MethodDescriptor, MethodName};

	#[test]
	fn method_names() -> Result<()> {
		assert_eq!(MethodName::try_from("<init>")?, "<init>");
		assert_eq!(MethodName::try_from("run")?, "run");
		assert!(MethodName::try_from("<foo>").is_err());
		assert!(MethodDescriptor::try_from("(II)V").is_ok());
		assert!(MethodDescriptor::try_from("(V)V").is_err());
		Ok(())
	}

	#[test]
	fn method_access() {
		let access = MethodAccess::from(0x0109);
		assert_eq!(access.keywords(), vec!["public", "static", "native"]);
		assert_eq!(u16::from(access), 0x0109);
	}
}
