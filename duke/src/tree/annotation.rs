use java_string::JavaString;
use crate::tree::field::FieldDescriptor;

/// An annotation, as found in the `RuntimeVisibleAnnotations` and `RuntimeInvisibleAnnotations` attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
	pub annotation_type: FieldDescriptor,
	pub element_value_pairs: Vec<ElementValuePair>,
}

impl Annotation {
	pub fn new(annotation_type: FieldDescriptor) -> Annotation {
		Annotation {
			annotation_type,
			element_value_pairs: Vec::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementValuePair {
	pub name: String,
	pub value: ElementValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
	Object(Object),
	Enum {
		type_name: FieldDescriptor,
		const_name: String,
	},
	/// A class literal. The descriptor is a return descriptor, so `V` is allowed here.
	Class(String),
	AnnotationInterface(Annotation),
	ArrayType(Vec<ElementValue>),
}

/// A constant value of an annotation element.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
	Byte(i8),
	Char(u16),
	Double(f64),
	Float(f32),
	Integer(i32),
	Long(i64),
	Short(i16),
	Boolean(bool),
	String(JavaString),
}

/// The annotations of a class, field or method, split by their retention.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotations {
	pub visible: Vec<Annotation>,
	pub invisible: Vec<Annotation>,
}

impl Annotations {
	pub fn is_empty(&self) -> bool {
		self.visible.is_empty() && self.invisible.is_empty()
	}
}
