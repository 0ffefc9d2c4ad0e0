use duke::tree::class::ClassName;
use duke::tree::field::FieldName;
use duke::tree::method::MethodName;

#[test]
fn valid_class_names() {
	let valid_class_names = [
		"foo",
		"foo$bar",
		"1234", // yes numbers are allowed at the start, only the java language denies it
		"---",
		"java/lang/Object",
		"org/example/MyClassName",
		"[[[D",
		"[[Ljava/lang/Integer;",
	];

	for i in valid_class_names {
		assert!(ClassName::is_valid(i), "{:?} is a valid class name", i);
	}
}

#[test]
fn invalid_class_names() {
	let invalid_class_names = [
		"",
		".",
		"/",
		";",
		"[",
		"a/",
		"/a",
		"[V",
		"L;",
		"//a",
		"a//",
		"a.b",
		"a;b",
		"a[b",
		"L;DV",
		"a//a",
		"[Ljava.lang.Object;",
	];

	for i in invalid_class_names {
		assert!(!ClassName::is_valid(i), "{:?} is an invalid class name", i);
	}
}

#[test]
fn checked_construction() {
	assert!(ClassName::try_from("java/lang/String").is_ok());
	assert!(ClassName::try_from("java.lang.String").is_err());
	assert!(FieldName::try_from(String::from("")).is_err());
}

#[test]
fn valid_field_names() {
	let valid_field_names = [
		"foo",
		"bar",
		"L<foo>",
		"---",
		"1234",
		"do",
		"while",
	];

	for i in valid_field_names {
		assert!(FieldName::is_valid(i), "{:?} is a valid field name", i);
	}
}

#[test]
fn invalid_field_names() {
	let invalid_field_names = [
		"",
		".",
		";",
		"[",
		"/",
	];

	for i in invalid_field_names {
		assert!(!FieldName::is_valid(i), "{:?} is an invalid field name", i);
	}
}

#[test]
fn valid_method_names() {
	let valid_method_names = [
		"foo",
		"<init>",
		"<clinit>",
		"123",
		"---",
		"bar",
		"$foo$",
	];

	for i in valid_method_names {
		assert!(MethodName::is_valid(i), "{:?} is a valid method name", i);
	}
}

#[test]
fn invalid_method_names() {
	let invalid_method_names = [
		"",
		"<foo>",
		"<clinit",
		"clinit>",
		".",
		";",
		"[",
		"/",
		"<",
		">",
	];

	for i in invalid_method_names {
		assert!(!MethodName::is_valid(i), "{:?} is an invalid method name", i);
	}
}
