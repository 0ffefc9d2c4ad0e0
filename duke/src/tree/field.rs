use java_string::JavaString;
use crate::macros::{make_access_flags, make_string_like};
use crate::tree::annotation::Annotations;
use crate::tree::attribute::Attribute;
use crate::tree::class::ClassName;
use crate::tree::type_annotation::{TargetInfoField, TypeAnnotations};

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
	pub access: FieldAccess,
	pub name: FieldName,
	pub descriptor: FieldDescriptor,

	pub has_deprecated_attribute: bool,
	pub has_synthetic_attribute: bool,

	pub constant_value: Option<ConstantValue>,
	pub signature: Option<String>,

	pub annotations: Annotations,
	pub type_annotations: TypeAnnotations<TargetInfoField>,

	pub attributes: Vec<Attribute>,
}

impl Field {
	pub fn new(access: FieldAccess, name: FieldName, descriptor: FieldDescriptor) -> Field {
		Field {
			access,
			name,
			descriptor,

			has_deprecated_attribute: false,
			has_synthetic_attribute: false,

			constant_value: None,
			signature: None,

			annotations: Annotations::default(),
			type_annotations: TypeAnnotations::default(),

			attributes: Vec::new(),
		}
	}
}

make_access_flags! {
	pub FieldAccess {
		is_public: "public" = 0x0001,
		is_private: "private" = 0x0002,
		is_protected: "protected" = 0x0004,
		is_static: "static" = 0x0008,
		is_final: "final" = 0x0010,
		is_volatile: "volatile" = 0x0040,
		is_transient: "transient" = 0x0080,
		is_synthetic: "synthetic" = 0x1000,
		is_enum: "enum" = 0x4000,
	}
}

/// The value of a `ConstantValue` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
	/// Also represents the value for a field of type `byte`, `char`, `short`, `boolean`.
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	String(JavaString),
}

impl ConstantValue {
	/// Checks if this value may be the constant value of a field with the given descriptor.
	pub fn fits(&self, descriptor: &FieldDescriptor) -> bool {
		match self {
			ConstantValue::Integer(_) => matches!(descriptor.as_str(), "I" | "S" | "C" | "B" | "Z"),
			ConstantValue::Float(_) => descriptor == "F",
			ConstantValue::Long(_) => descriptor == "J",
			ConstantValue::Double(_) => descriptor == "D",
			ConstantValue::String(_) => descriptor == "Ljava/lang/String;",
		}
	}
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldRef {
	pub class: ClassName,
	pub name: FieldName,
	pub desc: FieldDescriptor,
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldNameAndDesc {
	pub name: FieldName,
	pub desc: FieldDescriptor,
}

make_string_like! {
	pub FieldName;
	is_valid(s) = super::names::is_valid_unqualified_name(s);
}

make_string_like! {
	/// A field descriptor, like `I` or `[Ljava/lang/String;`.
	pub FieldDescriptor;
	is_valid(s) = crate::tree::descriptor::parse_field_descriptor(s).is_ok();
}

#[cfg(test)]
mod testing {
	use crate::tree::field::{ConstantValue, FieldAccess, FieldDescriptor};

	#[test]
	fn constant_value_fits() {
		let int = FieldDescriptor::new_unchecked("I");
		let boolean = FieldDescriptor::new_unchecked("Z");
		let string = FieldDescriptor::new_unchecked("Ljava/lang/String;");
		assert!(ConstantValue::Integer(1).fits(&int));
		assert!(ConstantValue::Integer(1).fits(&boolean));
		assert!(!ConstantValue::Long(1).fits(&int));
		assert!(ConstantValue::String("x".into()).fits(&string));
		assert!(!ConstantValue::String("x".into()).fits(&int));
	}

	#[test]
	fn field_access() {
		let access = FieldAccess::from(0x001a);
		assert_eq!(access.keywords(), vec!["private", "static", "final"]);
	}
}
