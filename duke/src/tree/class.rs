use crate::macros::{make_access_flags, make_string_like};
use crate::tree::annotation::Annotations;
use crate::tree::attribute::Attribute;
use crate::tree::field::Field;
use crate::tree::method::{Method, MethodNameAndDesc};
use crate::tree::record::RecordComponent;
use crate::tree::type_annotation::{TargetInfoClass, TypeAnnotations};
use crate::tree::version::Version;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassFile {
	pub version: Version,
	pub access: ClassAccess,
	pub name: ClassName,
	pub super_class: Option<ClassName>,
	pub interfaces: Vec<ClassName>,

	pub fields: Vec<Field>,
	pub methods: Vec<Method>,

	pub has_deprecated_attribute: bool,
	pub has_synthetic_attribute: bool,

	pub inner_classes: Vec<InnerClass>,
	pub enclosing_method: Option<EnclosingMethod>,
	pub signature: Option<String>,
	pub source_file: Option<String>,

	pub nest_host_class: Option<ClassName>,
	pub nest_members: Vec<ClassName>,

	/// The components of the `Record` attribute. An empty list still has the attribute.
	pub record_components: Option<Vec<RecordComponent>>,

	pub annotations: Annotations,
	pub type_annotations: TypeAnnotations<TargetInfoClass>,

	pub attributes: Vec<Attribute>,
}

impl ClassFile {
	pub fn new(version: Version, access: ClassAccess, name: ClassName, super_class: Option<ClassName>, interfaces: Vec<ClassName>) -> ClassFile {
		ClassFile {
			version,
			access,
			name,
			super_class,
			interfaces,

			fields: Vec::new(),
			methods: Vec::new(),

			has_deprecated_attribute: false,
			has_synthetic_attribute: false,

			inner_classes: Vec::new(),
			enclosing_method: None,
			signature: None,
			source_file: None,

			nest_host_class: None,
			nest_members: Vec::new(),

			record_components: None,

			annotations: Annotations::default(),
			type_annotations: TypeAnnotations::default(),

			attributes: Vec::new(),
		}
	}
}

make_access_flags! {
	/// The `access_flags` item of the `ClassFile` structure of the Java Virtual Machine Specification.
	pub ClassAccess {
		is_public: "public" = 0x0001,
		is_final: "final" = 0x0010,
		is_super: "super" = 0x0020,
		is_interface: "interface" = 0x0200,
		is_abstract: "abstract" = 0x0400,
		is_synthetic: "synthetic" = 0x1000,
		is_annotation: "annotation" = 0x2000,
		is_enum: "enum" = 0x4000,
		is_module: "module" = 0x8000,
	}
}

make_string_like! {
	/// Represents a class name. This is the "internal" form, like `java/lang/Object`, or the descriptor of an array
	/// class, like `[[I`.
	pub ClassName;
	is_valid(s) = super::names::is_valid_class_name(s);
}

impl ClassName {
	pub const JAVA_LANG_OBJECT: &'static str = "java/lang/Object";
	pub const JAVA_LANG_THROWABLE: &'static str = "java/lang/Throwable";

	pub fn java_lang_object() -> ClassName {
		ClassName::new_unchecked(ClassName::JAVA_LANG_OBJECT)
	}

	pub fn is_array(&self) -> bool {
		self.starts_with('[')
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
	pub inner_class: ClassName,
	pub outer_class: Option<ClassName>,
	pub inner_name: Option<String>,
	pub flags: InnerClassFlags,
}

make_access_flags! {
	/// The `inner_class_access_flags` item of an entry of the `InnerClasses` attribute.
	pub InnerClassFlags {
		is_public: "public" = 0x0001,
		is_private: "private" = 0x0002,
		is_protected: "protected" = 0x0004,
		is_static: "static" = 0x0008,
		is_final: "final" = 0x0010,
		is_interface: "interface" = 0x0200,
		is_abstract: "abstract" = 0x0400,
		is_synthetic: "synthetic" = 0x1000,
		is_annotation: "annotation" = 0x2000,
		is_enum: "enum" = 0x4000,
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnclosingMethod {
	pub class: ClassName,
	pub method: Option<MethodNameAndDesc>,
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::tree::class::{ClassAccess, ClassName, InnerClassFlags};

	#[test]
	fn access_flags_round_trip() {
		let access = ClassAccess::from(0x0421);
		assert!(access.is_public);
		assert!(access.is_super);
		assert!(access.is_abstract);
		assert!(!access.is_final);
		assert_eq!(access.keywords(), vec!["public", "super", "abstract"]);
		assert_eq!(u16::from(access), 0x0421);
	}

	#[test]
	fn unknown_access_bits_are_kept() {
		let access = InnerClassFlags::from(0x0108);
		assert!(access.is_static);
		assert_eq!(access.other, 0x0100);
		assert_eq!(u16::from(access), 0x0108);
	}

	#[test]
	fn set_keyword() {
		let mut access = ClassAccess::default();
		assert!(access.set_keyword("final"));
		assert!(!access.set_keyword("static"));
		assert_eq!(u16::from(access), 0x0010);
	}

	#[test]
	fn class_name_checks() -> Result<()> {
		assert!(ClassName::try_from("java/lang/Object")?.as_str() == ClassName::JAVA_LANG_OBJECT);
		assert!(ClassName::try_from("[[I")?.is_array());
		assert!(ClassName::try_from("a//b").is_err());
		assert!(ClassName::try_from("").is_err());
		Ok(())
	}
}
