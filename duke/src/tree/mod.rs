//! The structured model of a class file.
//!
//! Constant pool indices and bytecode offsets never appear here: references are stored by value, and positions in the
//! bytecode are [`Label`][method::code::Label]s.

pub mod class;
pub mod field;
pub mod method;
pub mod attribute;
pub mod version;
pub mod annotation;
pub mod type_annotation;
pub mod record;
pub mod descriptor;

/// The name rules of JVMS 4.2.
mod names {
	/// A binary class name like `java/lang/Object`, or the field descriptor of an array class.
	pub(super) fn is_valid_class_name(x: &str) -> bool {
		match x.strip_prefix('[') {
			Some(_) => crate::tree::descriptor::parse_field_descriptor(x).is_ok(),
			None => x.split('/').all(is_valid_unqualified_name),
		}
	}

	/// Field names, and the parts of a class name.
	pub(super) fn is_valid_unqualified_name(x: &str) -> bool {
		!x.is_empty() && !x.contains(['.', ';', '[', '/'])
	}

	pub(super) fn is_valid_method_name(x: &str) -> bool {
		matches!(x, "<init>" | "<clinit>") || (is_valid_unqualified_name(x) && !x.contains(['<', '>']))
	}
}
