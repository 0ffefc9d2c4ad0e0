use crate::macros::make_string_like;
use crate::tree::annotation::Annotations;
use crate::tree::attribute::Attribute;
use crate::tree::field::FieldDescriptor;
use crate::tree::type_annotation::{TargetInfoField, TypeAnnotations};

/// A component of a record class, an entry of the `Record` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordComponent {
	pub name: RecordName,
	pub descriptor: FieldDescriptor,

	pub signature: Option<String>,

	pub annotations: Annotations,
	pub type_annotations: TypeAnnotations<TargetInfoField>,

	pub attributes: Vec<Attribute>,
}

impl RecordComponent {
	pub fn new(name: RecordName, descriptor: FieldDescriptor) -> RecordComponent {
		RecordComponent {
			name,
			descriptor,

			signature: None,

			annotations: Annotations::default(),
			type_annotations: TypeAnnotations::default(),

			attributes: Vec::new(),
		}
	}
}

make_string_like! {
	pub RecordName;
	is_valid(s) = super::names::is_valid_unqualified_name(s);
}
