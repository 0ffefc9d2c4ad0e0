use std::iter::Peekable;
use std::str::Chars;
use anyhow::{anyhow, bail, Context, Result};
use crate::tree::class::ClassName;
use crate::tree::field::FieldDescriptor;
use crate::tree::method::MethodDescriptor;

/// Represents a type.
///
/// In case of an array, use the [`Type::Array`] variant.
///
/// ```
/// use duke::tree::descriptor::{ArrayType, Type};
///
/// // the type of a java `int`
/// let int_type = Type::I;
///
/// // the type of a java `int[][]`
/// let int_array_type = Type::Array(2, ArrayType::I);
///
/// assert_ne!(int_type, int_array_type);
/// ```
///
/// Note: you should never construct the [`Type::Array`] variant with a dimension of zero.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Type {
	/// A `byte`. In rust, this is a `i8`.
	B,
	/// A `char`.
	C,
	/// A `double`. In rust, this is a `f64`.
	D,
	/// A `float`. In rust, this is a `f32`.
	F,
	/// An `int`. In rust, this is a `i32`.
	I,
	/// A `long`. In rust, this is a `i64`.
	J,
	/// A `short`. In rust, this is a `i16`.
	S,
	/// A `boolean`. In rust, this is a `bool`.
	Z,
	/// An instance of the class specified by [`ClassName`].
	Object(ClassName),
	/// An array type, represented by the dimension and the inner [`ArrayType`].
	Array(u8, ArrayType),
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ArrayType {
	B,
	C,
	D,
	F,
	I,
	J,
	S,
	Z,
	Object(ClassName),
}

impl Type {
	/// The number of local variable slots (and operand stack entries) a value of this type takes up.
	pub fn size(&self) -> u16 {
		match self {
			Type::D | Type::J => 2,
			_ => 1,
		}
	}

	/// The type an array class name (like `[[I`) or an object class name (like `java/lang/String`) stands for.
	pub fn from_class_name(class_name: &ClassName) -> Result<Type> {
		if class_name.starts_with('[') {
			parse_field_descriptor(class_name.as_str())
		} else {
			Ok(Type::Object(class_name.clone()))
		}
	}

	/// The type of the elements of this array type, or [`None`] if this is not an array type.
	pub fn array_component(&self) -> Option<Type> {
		let Type::Array(dimension, array_type) = self else {
			return None;
		};
		if *dimension > 1 {
			return Some(Type::Array(dimension - 1, array_type.clone()));
		}
		Some(match array_type {
			ArrayType::B => Type::B,
			ArrayType::C => Type::C,
			ArrayType::D => Type::D,
			ArrayType::F => Type::F,
			ArrayType::I => Type::I,
			ArrayType::J => Type::J,
			ArrayType::S => Type::S,
			ArrayType::Z => Type::Z,
			ArrayType::Object(class_name) => Type::Object(class_name.clone()),
		})
	}

	/// Converts this type into a class name as used by `checkcast` and friends: `java/lang/String` for objects, the
	/// descriptor for arrays. Returns [`None`] for primitive types.
	pub fn to_class_name(&self) -> Option<ClassName> {
		match self {
			Type::Object(class_name) => Some(class_name.clone()),
			Type::Array(..) => {
				let mut s = String::new();
				write_field_type(self, &mut s);
				Some(ClassName::new_unchecked(s))
			},
			_ => None,
		}
	}

	pub fn write(&self) -> FieldDescriptor {
		let mut s = String::new();
		write_field_type(self, &mut s);
		FieldDescriptor::new_unchecked(s)
	}
}

// The grammar for descriptors is:
//   FieldDescriptor:
//     FieldType
//
//   MethodDescriptor:
//     "(" FieldType* ")" ReturnDescriptor
//
//   ReturnDescriptor:
//     FieldType | "V"
//
//   FieldType:
//     "B" | "C" | "D" | "F" | "I" | "J" | "S" | "Z" |
//     "L" ClassName ";" |
//     "[" FieldType
fn read_field_type(chars: &mut Peekable<Chars>) -> Result<Type> {
	let mut array_dimension: u8 = 0;
	while chars.next_if_eq(&'[').is_some() {
		array_dimension = array_dimension.checked_add(1)
			.context("array dimension larger than 255")?;
	}

	let char = chars.next().context("unexpected abrupt ending of descriptor")?;
	let array_type = match char {
		'B' => ArrayType::B,
		'C' => ArrayType::C,
		'D' => ArrayType::D,
		'F' => ArrayType::F,
		'I' => ArrayType::I,
		'J' => ArrayType::J,
		'S' => ArrayType::S,
		'Z' => ArrayType::Z,
		'L' => {
			let mut s = String::new();

			let mut char = chars.next().context("unexpected abrupt ending of descriptor")?;
			while char != ';' {
				s.push(char);

				char = chars.next().context("unexpected abrupt ending of descriptor")?;
			}

			if s.starts_with('[') || !ClassName::is_valid(&s) {
				bail!("invalid class name {s:?} in descriptor");
			}
			ArrayType::Object(ClassName::new_unchecked(s))
		},
		x => {
			bail!("unexpected char {x:?} in descriptor");
		}
	};

	if array_dimension == 0 {
		Ok(match array_type {
			ArrayType::B => Type::B,
			ArrayType::C => Type::C,
			ArrayType::D => Type::D,
			ArrayType::F => Type::F,
			ArrayType::I => Type::I,
			ArrayType::J => Type::J,
			ArrayType::S => Type::S,
			ArrayType::Z => Type::Z,
			ArrayType::Object(class_name) => Type::Object(class_name),
		})
	} else {
		Ok(Type::Array(array_dimension, array_type))
	}
}

fn write_array_type(t: &ArrayType, string: &mut String) {
	match t {
		ArrayType::B => string.push('B'),
		ArrayType::C => string.push('C'),
		ArrayType::D => string.push('D'),
		ArrayType::F => string.push('F'),
		ArrayType::I => string.push('I'),
		ArrayType::J => string.push('J'),
		ArrayType::S => string.push('S'),
		ArrayType::Z => string.push('Z'),
		ArrayType::Object(class_name) => {
			string.push('L');
			string.push_str(class_name);
			string.push(';');
		},
	}
}

fn write_field_type(t: &Type, string: &mut String) {
	match t {
		Type::B => string.push('B'),
		Type::C => string.push('C'),
		Type::D => string.push('D'),
		Type::F => string.push('F'),
		Type::I => string.push('I'),
		Type::J => string.push('J'),
		Type::S => string.push('S'),
		Type::Z => string.push('Z'),
		Type::Object(class_name) => {
			string.push('L');
			string.push_str(class_name);
			string.push(';');
		},
		Type::Array(array_dimension, array_type) => {
			for _ in 0..*array_dimension {
				string.push('[');
			}
			write_array_type(array_type, string);
		},
	}
}

/// Attempts to parse a field descriptor.
///
/// A field descriptor is defined by the [grammar](https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.3.2) in the
/// Java Virtual Machine Specification.
pub(crate) fn parse_field_descriptor(s: &str) -> Result<Type> {
	let mut chars = s.chars().peekable();

	let descriptor = read_field_type(&mut chars)
		.with_context(|| anyhow!("failed to read field descriptor {s:?}"))?;

	if chars.peek().is_some() {
		bail!("expected end of field descriptor {s:?}, got {:?} remaining", chars.collect::<String>());
	}

	Ok(descriptor)
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParsedMethodDescriptor {
	pub parameter_descriptors: Vec<Type>,
	/// [`None`] stands for `void`.
	pub return_descriptor: Option<Type>,
}

pub(crate) fn parse_method_descriptor(s: &str) -> Result<ParsedMethodDescriptor> {
	let mut chars = s.chars().peekable();

	if chars.next_if_eq(&'(').is_none() {
		bail!("method descriptor {s:?} doesn't start with '('");
	}

	let mut parameter_descriptors = Vec::new();
	loop {
		if chars.next_if_eq(&')').is_some() {
			break;
		}

		let descriptor = read_field_type(&mut chars)
			.with_context(|| anyhow!("failed to read parameter descriptor of {s:?}"))?;
		parameter_descriptors.push(descriptor);
	}

	let return_descriptor = if chars.next_if_eq(&'V').is_some() {
		None
	} else {
		let descriptor = read_field_type(&mut chars)
			.with_context(|| anyhow!("failed to read return descriptor of {s:?}"))?;

		Some(descriptor)
	};

	if chars.peek().is_some() {
		bail!("expected end of method descriptor {s:?}, got {:?} remaining", chars.collect::<String>());
	}

	Ok(ParsedMethodDescriptor {
		parameter_descriptors,
		return_descriptor,
	})
}

/// Checks a return descriptor: a field descriptor or `V`.
pub(crate) fn is_valid_return_descriptor(s: &str) -> bool {
	s == "V" || parse_field_descriptor(s).is_ok()
}

impl FieldDescriptor {
	/// Parses the descriptor. Construction of a [`FieldDescriptor`] already checks this succeeds.
	pub fn parse(&self) -> Result<Type> {
		parse_field_descriptor(self.as_str())
	}

	/// The descriptor for an object of the given class, or the class name itself for array classes.
	pub fn from_class(class_name: &ClassName) -> FieldDescriptor {
		if class_name.starts_with('[') {
			FieldDescriptor::new_unchecked(class_name.as_str())
		} else {
			FieldDescriptor::new_unchecked(format!("L{class_name};"))
		}
	}
}

impl MethodDescriptor {
	/// Parses the descriptor. Construction of a [`MethodDescriptor`] already checks this succeeds.
	pub fn parse(&self) -> Result<ParsedMethodDescriptor> {
		parse_method_descriptor(self.as_str())
	}

	/// Returns the argument size + 1 (for the implicit `this`).
	/// Double and longs count 2 instead of 1.
	///
	/// Does not look at the return descriptor.
	pub(crate) fn get_arguments_size(&self) -> Result<u8> {
		let parsed = self.parse()?;
		let size = parsed.parameter_descriptors.iter()
			.map(|x| x.size())
			.sum::<u16>() + 1;
		u8::try_from(size)
			.with_context(|| anyhow!("argument size {size} of {self:?} doesn't fit into u8"))
	}
}

impl ParsedMethodDescriptor {
	pub fn write(&self) -> MethodDescriptor {
		let mut s = String::new();
		s.push('(');
		for parameter_descriptor in &self.parameter_descriptors {
			write_field_type(parameter_descriptor, &mut s);
		}
		s.push(')');
		if let Some(return_descriptor) = &self.return_descriptor {
			write_field_type(return_descriptor, &mut s);
		} else {
			s.push('V');
		}
		MethodDescriptor::new_unchecked(s)
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::tree::class::ClassName;
	use crate::tree::descriptor::{ArrayType, is_valid_return_descriptor, parse_field_descriptor, parse_method_descriptor, ParsedMethodDescriptor, Type};
	use crate::tree::method::MethodDescriptor;

	fn object(name: &str) -> Type {
		Type::Object(ClassName::new_unchecked(name))
	}

	#[test]
	fn field_parse() -> Result<()> {
		assert_eq!(parse_field_descriptor("I")?, Type::I);
		assert_eq!(parse_field_descriptor("J")?, Type::J);
		assert_eq!(parse_field_descriptor("Ljava/lang/Object;")?, object("java/lang/Object"));
		assert_eq!(parse_field_descriptor("[[[D")?, Type::Array(3, ArrayType::D));
		assert_eq!(
			parse_field_descriptor("[Ljava/lang/String;")?,
			Type::Array(1, ArrayType::Object(ClassName::new_unchecked("java/lang/String")))
		);
		Ok(())
	}

	#[test]
	fn field_parse_err() {
		for s in ["", "V", "[", "L;", "Ljava/lang/Object", "II", "Q", "La.b;", "[V"] {
			assert!(parse_field_descriptor(s).is_err(), "{s:?} must not parse");
		}
	}

	#[test]
	fn method_parse() -> Result<()> {
		assert_eq!(parse_method_descriptor("()V")?, ParsedMethodDescriptor {
			parameter_descriptors: vec![],
			return_descriptor: None,
		});
		assert_eq!(parse_method_descriptor("(IJLjava/lang/String;[[Z)[I")?, ParsedMethodDescriptor {
			parameter_descriptors: vec![Type::I, Type::J, object("java/lang/String"), Type::Array(2, ArrayType::Z)],
			return_descriptor: Some(Type::Array(1, ArrayType::I)),
		});
		Ok(())
	}

	#[test]
	fn method_parse_err() {
		for s in ["", "V", "()", "(V)V", "(I", "()VV", "I()V"] {
			assert!(parse_method_descriptor(s).is_err(), "{s:?} must not parse");
		}
	}

	#[test]
	fn write_inverts_parse() -> Result<()> {
		for s in ["I", "[[[D", "Ljava/lang/Object;", "[Ljava/util/List;"] {
			assert_eq!(parse_field_descriptor(s)?.write().as_str(), s);
		}
		for s in ["()V", "(IDJ)Ljava/lang/String;", "([Ljava/lang/String;)V"] {
			assert_eq!(parse_method_descriptor(s)?.write().as_str(), s);
		}
		Ok(())
	}

	#[test]
	fn method_get_arguments_size() -> Result<()> {
		assert_eq!(MethodDescriptor::try_from("()V")?.get_arguments_size()?, 1);
		assert_eq!(MethodDescriptor::try_from("(I)V")?.get_arguments_size()?, 2);
		assert_eq!(MethodDescriptor::try_from("(JD)V")?.get_arguments_size()?, 5);
		assert_eq!(MethodDescriptor::try_from("([J[DLjava/lang/Object;)J")?.get_arguments_size()?, 4);
		Ok(())
	}

	#[test]
	fn array_component_and_class_names() -> Result<()> {
		let int_2d = Type::from_class_name(&ClassName::try_from("[[I")?)?;
		assert_eq!(int_2d, Type::Array(2, ArrayType::I));
		assert_eq!(int_2d.array_component(), Some(Type::Array(1, ArrayType::I)));
		assert_eq!(Type::Array(1, ArrayType::I).array_component(), Some(Type::I));
		assert_eq!(Type::I.array_component(), None);
		assert_eq!(int_2d.to_class_name(), Some(ClassName::try_from("[[I")?));
		assert_eq!(object("a/B").to_class_name(), Some(ClassName::try_from("a/B")?));
		Ok(())
	}

	#[test]
	fn return_descriptors() {
		assert!(is_valid_return_descriptor("V"));
		assert!(is_valid_return_descriptor("Ljava/lang/Object;"));
		assert!(!is_valid_return_descriptor("VV"));
	}
}
