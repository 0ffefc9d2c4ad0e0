use anyhow::Result;
use pretty_assertions::assert_eq;
use duke::tree::descriptor::{ArrayType, Type};
use duke::tree::field::FieldDescriptor;
use duke::tree::method::MethodDescriptor;

#[test]
fn valid_field_descriptors() {
	let valid_field_descriptors = [
		"B",
		"C",
		"D",
		"F",
		"I",
		"J",
		"Ljava/lang/Object;",
		"Lorg/example/MyClassName;",
		"S",
		"Z",
		"[[[D",
	];

	for i in valid_field_descriptors {
		assert!(FieldDescriptor::is_valid(i), "{:?} is a valid field desc", i);
	}
}

#[test]
fn invalid_field_descriptors() {
	let invalid_field_descriptors = [
		"",
		"V",
		"(",
		")",
		"()",
		"[V",
		"L;",
		"()V",
		"foo",
		"(D)I",
		"L;DV",
		"L[I;",
		"Ljava/lang/Object",
	];

	for i in invalid_field_descriptors {
		assert!(!FieldDescriptor::is_valid(i), "{:?} is an invalid field desc", i);
	}
}

#[test]
fn array_dimensions() {
	let max = format!("{}I", "[".repeat(255));
	assert!(FieldDescriptor::is_valid(&max));

	let too_many = format!("{}I", "[".repeat(256));
	assert!(!FieldDescriptor::is_valid(&too_many));
}

#[test]
fn valid_method_descriptors() {
	let valid_method_descriptors = [
		"()V",
		"(D)I",
		"(Ljava/lang/Object;)Ljava/lang/Object;",
		"(IJ[[Ljava/lang/String;)[B",
	];

	for i in valid_method_descriptors {
		assert!(MethodDescriptor::is_valid(i), "{:?} is a valid method desc", i);
	}
}

#[test]
fn invalid_method_descriptors() {
	let invalid_method_descriptors = [
		"B",
		"C",
		"D",
		"F",
		"I",
		"J",
		"Ljava/lang/Object;",
		"Lorg/example/MyClassName;",
		"S",
		"Z",
		"[[[D",
		"",
		"V",
		"(",
		")",
		"()",
		"[V",
		"L;",
		"foo",
		"L;DV",
		"(L;)V",
		"(V)V",
		"()VV",
	];

	for i in invalid_method_descriptors {
		assert!(!MethodDescriptor::is_valid(i), "{:?} is an invalid method desc", i);
	}
}

#[test]
fn parsed_descriptors() -> Result<()> {
	let descriptor = MethodDescriptor::try_from("(I[[Ljava/lang/String;J)V")?;
	let parsed = descriptor.parse()?;
	assert_eq!(parsed.parameter_descriptors, vec![
		Type::I,
		Type::Array(2, ArrayType::Object("java/lang/String".try_into()?)),
		Type::J,
	]);
	assert_eq!(parsed.return_descriptor, None);
	assert_eq!(parsed.write(), descriptor);

	let field = FieldDescriptor::try_from("[D")?;
	assert_eq!(field.parse()?.array_component(), Some(Type::D));
	Ok(())
}
