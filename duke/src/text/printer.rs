use std::borrow::Cow;
use std::io::Write;
use anyhow::{anyhow, Context, Result};
use java_string::JavaStr;
use crate::jstring;
use crate::tree::annotation::{Annotation, Annotations, ElementValue, Object};
use crate::tree::attribute::Attribute;
use crate::tree::class::ClassFile;
use crate::tree::field::{ConstantValue, Field, FieldRef};
use crate::tree::method::code::{Code, Handle, Instruction, Label, Loadable};
use crate::tree::method::{Method, MethodRef};
use crate::tree::record::RecordComponent;
use crate::tree::type_annotation::{TargetInfoClass, TargetInfoCode, TargetInfoField, TargetInfoMethod, TypeAnnotation, TypeAnnotations};

/// Writes the class in the canonical textual format.
pub(crate) fn write(class: &ClassFile, w: &mut impl Write) -> Result<()> {
	writeln!(w, "version {} {}", class.version.major, class.version.minor)?;
	if let Some(source_file) = &class.source_file {
		writeln!(w, "source {}", quoted(source_file))?;
	}
	let type_annotations = type_annotation_lines(&class.type_annotations, class_target);
	write_prefix(w, "", class.signature.as_deref(), class.has_deprecated_attribute, class.has_synthetic_attribute, &class.annotations, &type_annotations, &class.attributes)?;

	let mut header = flags(class.access.keywords(), class.access.other);
	header.push("class".to_owned());
	header.push(name(&class.name).into_owned());
	if let Some(super_class) = &class.super_class {
		header.push("extends".to_owned());
		header.push(name(super_class).into_owned());
	}
	if !class.interfaces.is_empty() {
		header.push("implements".to_owned());
		header.extend(class.interfaces.iter().map(|x| name(x).into_owned()));
	}
	header.push("{".to_owned());
	writeln!(w, "{}", header.join(" "))?;

	let mut empty = true;
	if let Some(nest_host_class) = &class.nest_host_class {
		writeln!(w, "\tnesthost {}", name(nest_host_class))?;
		empty = false;
	}
	for nest_member in &class.nest_members {
		writeln!(w, "\tnestmember {}", name(nest_member))?;
		empty = false;
	}
	if let Some(enclosing_method) = &class.enclosing_method {
		match &enclosing_method.method {
			Some(method) => writeln!(w, "\tenclosing {} {} {}", name(&enclosing_method.class), name(&method.name), name(&method.desc))?,
			None => writeln!(w, "\tenclosing {}", name(&enclosing_method.class))?,
		}
		empty = false;
	}
	for inner_class in &class.inner_classes {
		let mut line = vec!["innerclass".to_owned(), name(&inner_class.inner_class).into_owned()];
		if let Some(outer_class) = &inner_class.outer_class {
			line.push("outer".to_owned());
			line.push(name(outer_class).into_owned());
		}
		if let Some(inner_name) = &inner_class.inner_name {
			line.push("name".to_owned());
			line.push(name(inner_name).into_owned());
		}
		line.extend(flags(inner_class.flags.keywords(), inner_class.flags.other));
		writeln!(w, "\t{}", line.join(" "))?;
		empty = false;
	}
	if let Some(record_components) = &class.record_components {
		if !empty {
			writeln!(w)?;
		}
		writeln!(w, "\trecord {{")?;
		for component in record_components {
			write_record_component(w, component)?;
		}
		writeln!(w, "\t}}")?;
		empty = false;
	}

	for field in &class.fields {
		if !empty {
			writeln!(w)?;
		}
		write_field(w, field)
			.with_context(|| anyhow!("failed to print field {}", field.name))?;
		empty = false;
	}
	for method in &class.methods {
		if !empty {
			writeln!(w)?;
		}
		write_method(w, method)
			.with_context(|| anyhow!("failed to print method {}{}", method.name, method.descriptor))?;
		empty = false;
	}

	writeln!(w, "}}")?;
	Ok(())
}

/// The directives written before a class or member.
fn write_prefix(
	w: &mut impl Write,
	indent: &str,
	signature: Option<&str>,
	deprecated: bool,
	synthetic: bool,
	annotations: &Annotations,
	type_annotations: &[String],
	attributes: &[Attribute],
) -> Result<()> {
	if let Some(signature) = signature {
		writeln!(w, "{indent}signature {}", quoted(signature))?;
	}
	if deprecated {
		writeln!(w, "{indent}deprecated")?;
	}
	if synthetic {
		writeln!(w, "{indent}synthetic")?;
	}
	for annotation in &annotations.visible {
		writeln!(w, "{indent}{}", annotation_to_string(annotation))?;
	}
	for annotation in &annotations.invisible {
		writeln!(w, "{indent}invisible {}", annotation_to_string(annotation))?;
	}
	for type_annotation in type_annotations {
		writeln!(w, "{indent}{type_annotation}")?;
	}
	for attribute in attributes {
		writeln!(w, "{indent}{}", attribute_to_string(attribute))?;
	}
	Ok(())
}

fn write_field(w: &mut impl Write, field: &Field) -> Result<()> {
	let type_annotations = type_annotation_lines(&field.type_annotations, field_target);
	write_prefix(w, "\t", field.signature.as_deref(), field.has_deprecated_attribute, field.has_synthetic_attribute, &field.annotations, &type_annotations, &field.attributes)?;

	let mut line = flags(field.access.keywords(), field.access.other);
	line.push(field_header_name(&field.descriptor).into_owned());
	line.push(field_header_name(&field.name).into_owned());
	if let Some(constant_value) = &field.constant_value {
		line.push("=".to_owned());
		line.push(match constant_value {
			&ConstantValue::Integer(x) => x.to_string(),
			&ConstantValue::Long(x) => long(x),
			&ConstantValue::Float(x) => float(x),
			&ConstantValue::Double(x) => double(x),
			ConstantValue::String(x) => quoted_java(x),
		});
	}
	writeln!(w, "\t{}", line.join(" "))?;
	Ok(())
}

fn write_method(w: &mut impl Write, method: &Method) -> Result<()> {
	let type_annotations = type_annotation_lines(&method.type_annotations, method_target);
	write_prefix(w, "\t", method.signature.as_deref(), method.has_deprecated_attribute, method.has_synthetic_attribute, &method.annotations, &type_annotations, &method.attributes)?;
	let parameter_annotations = [
		("", &method.parameter_annotations.visible),
		("invisible ", &method.parameter_annotations.invisible),
	];
	for (visibility, parameters) in parameter_annotations {
		if let Some(parameters) = parameters {
			writeln!(w, "\t{visibility}params {}", parameters.len())?;
			for (index, annotations) in parameters.iter().enumerate() {
				for annotation in annotations {
					writeln!(w, "\t{visibility}param {index} {}", annotation_to_string(annotation))?;
				}
			}
		}
	}
	if let Some(value) = &method.annotation_default {
		writeln!(w, "\tdefault {}", element_value_to_string(value))?;
	}
	if let Some(parameters) = &method.parameters {
		let parameters: Vec<String> = parameters.iter()
			.map(|parameter| {
				let mut words = vec![match &parameter.name {
					Some(parameter_name) if parameter_name == "-" => quoted(parameter_name),
					Some(parameter_name) => name(parameter_name).into_owned(),
					None => "-".to_owned(),
				}];
				words.extend(flags(parameter.flags.keywords(), parameter.flags.other));
				words.join(" ")
			})
			.collect();
		if parameters.is_empty() {
			writeln!(w, "\tparameters {{ }}")?;
		} else {
			writeln!(w, "\tparameters {{ {} }}", parameters.join(", "))?;
		}
	}

	let mut line = flags(method.access.keywords(), method.access.other);
	if needs_quotes(&method.name) || method.name.contains('(') || needs_quotes(&method.descriptor) {
		line.push(quoted(&method.name));
		line.push(name(&method.descriptor).into_owned());
	} else {
		line.push(format!("{}{}", method.name, method.descriptor));
	}
	if !method.exceptions.is_empty() {
		line.push("throws".to_owned());
		line.extend(method.exceptions.iter().map(|x| name(x).into_owned()));
	}

	if let Some(code) = &method.code {
		line.push("{".to_owned());
		writeln!(w, "\t{}", line.join(" "))?;
		write_code(w, code)?;
		writeln!(w, "\t}}")?;
	} else {
		writeln!(w, "\t{}", line.join(" "))?;
	}
	Ok(())
}

fn write_code(w: &mut impl Write, code: &Code) -> Result<()> {
	code.check_labels()?;

	let write_label = |w: &mut dyn Write, label: Label| -> Result<()> {
		writeln!(w, "\t\t{label}")?;
		for (_, line) in code.line_numbers.iter().filter(|(l, _)| *l == label) {
			writeln!(w, "\t\t\tLINENUMBER {line} {label}")?;
		}
		Ok(())
	};

	for (index, entry) in code.instructions.iter().enumerate() {
		if let Some(label) = entry.label {
			write_label(w, label)?;
		}
		writeln!(w, "\t\t\t{}", instruction_to_string(&entry.instruction)
			.with_context(|| anyhow!("failed to print instruction {index}"))?)?;
	}
	if let Some(label) = code.last_label {
		write_label(w, label)?;
	}

	for lv in &code.local_variables {
		let descriptor = lv.descriptor.as_ref().map_or(Cow::Borrowed("-"), |x| name(x));
		write!(w, "\t\tLOCALVARIABLE {} {descriptor} {} {} {}", name(&lv.name), lv.range.start, lv.range.end, lv.index.index)?;
		if let Some(signature) = &lv.signature {
			write!(w, " {}", quoted(signature))?;
		}
		writeln!(w)?;
	}
	for exception in &code.exception_table {
		let catch = exception.catch.as_ref().map_or(Cow::Borrowed("*"), |x| name(x));
		writeln!(w, "\t\tTRYCATCHBLOCK {} {} {} {catch}", exception.start, exception.end, exception.handler)?;
	}
	for (visibility, type_annotations) in [("", &code.type_annotations.visible), ("invisible ", &code.type_annotations.invisible)] {
		for type_annotation in type_annotations {
			writeln!(w, "\t\tTYPEANNOTATION {visibility}{}", type_annotation_to_string(type_annotation, code_target))?;
		}
	}
	if let Some(max_stack) = code.max_stack {
		writeln!(w, "\t\tMAXSTACK = {max_stack}")?;
	}
	if let Some(max_locals) = code.max_locals {
		writeln!(w, "\t\tMAXLOCALS = {max_locals}")?;
	}
	for attribute in &code.attributes {
		writeln!(w, "\t\t{}", attribute_to_string(attribute))?;
	}
	Ok(())
}

fn write_record_component(w: &mut impl Write, component: &RecordComponent) -> Result<()> {
	let type_annotations = type_annotation_lines(&component.type_annotations, field_target);
	write_prefix(w, "\t\t", component.signature.as_deref(), false, false, &component.annotations, &type_annotations, &component.attributes)?;
	writeln!(w, "\t\t{} {}", name(&component.descriptor), name(&component.name))?;
	Ok(())
}

/// The `type` directives of the type annotations, the invisible ones after the visible ones.
fn type_annotation_lines<T>(type_annotations: &TypeAnnotations<T>, target: impl Fn(&T) -> String) -> Vec<String> {
	let visible = type_annotations.visible.iter()
		.map(|x| format!("type {}", type_annotation_to_string(x, &target)));
	let invisible = type_annotations.invisible.iter()
		.map(|x| format!("invisible type {}", type_annotation_to_string(x, &target)));
	visible.chain(invisible).collect()
}

/// The target, the path if there is one, and the annotation.
fn type_annotation_to_string<T>(type_annotation: &TypeAnnotation<T>, target: impl Fn(&T) -> String) -> String {
	let target = target(&type_annotation.type_reference);
	let annotation = annotation_to_string(&type_annotation.annotation);
	if type_annotation.type_path.is_empty() {
		format!("{target} {annotation}")
	} else {
		format!("{target} path {} {annotation}", type_annotation.type_path)
	}
}

fn class_target(target: &TargetInfoClass) -> String {
	match *target {
		TargetInfoClass::ClassTypeParameter { index } => format!("typeparam {index}"),
		TargetInfoClass::Extends => "extends".to_owned(),
		TargetInfoClass::Implements { index } => format!("implements {index}"),
		TargetInfoClass::ClassTypeParameterBound { type_parameter_index, bound_index } => format!("typebound {type_parameter_index} {bound_index}"),
	}
}

fn field_target(target: &TargetInfoField) -> String {
	match target {
		TargetInfoField::Field => "field".to_owned(),
	}
}

fn method_target(target: &TargetInfoMethod) -> String {
	match *target {
		TargetInfoMethod::MethodTypeParameter { index } => format!("typeparam {index}"),
		TargetInfoMethod::MethodTypeParameterBound { type_parameter_index, bound_index } => format!("typebound {type_parameter_index} {bound_index}"),
		TargetInfoMethod::Return => "return".to_owned(),
		TargetInfoMethod::Receiver => "receiver".to_owned(),
		TargetInfoMethod::FormalParameter { index } => format!("param {index}"),
		TargetInfoMethod::Throws { index } => format!("throws {index}"),
	}
}

fn code_target(target: &TargetInfoCode) -> String {
	match target {
		TargetInfoCode::LocalVariable { table } | TargetInfoCode::ResourceVariable { table } => {
			let keyword = if matches!(target, TargetInfoCode::LocalVariable { .. }) { "local" } else { "resource" };
			let entries: Vec<String> = table.iter()
				.map(|(range, index)| format!("{} {} {}", range.start, range.end, index.index))
				.collect();
			if entries.is_empty() {
				format!("{keyword} {{ }}")
			} else {
				format!("{keyword} {{ {} }}", entries.join(", "))
			}
		},
		TargetInfoCode::ExceptionParameter { index } => format!("catch {index}"),
		TargetInfoCode::InstanceOf(label) => format!("instanceof {label}"),
		TargetInfoCode::New(label) => format!("new {label}"),
		TargetInfoCode::ConstructorReference(label) => format!("constructorref {label}"),
		TargetInfoCode::MethodReference(label) => format!("methodref {label}"),
		TargetInfoCode::Cast { label, index } => format!("cast {label} {index}"),
		TargetInfoCode::ConstructorInvocationTypeArgument { label, index } => format!("constructorcall {label} {index}"),
		TargetInfoCode::MethodInvocationTypeArgument { label, index } => format!("methodcall {label} {index}"),
		TargetInfoCode::ConstructorReferenceTypeArgument { label, index } => format!("constructorreftype {label} {index}"),
		TargetInfoCode::MethodReferenceTypeArgument { label, index } => format!("methodreftype {label} {index}"),
	}
}

/// The flag keywords, followed by the unknown bits as a hex word if there are any.
fn flags(keywords: Vec<&'static str>, other: u16) -> Vec<String> {
	let mut vec: Vec<String> = keywords.into_iter().map(str::to_owned).collect();
	if other != 0 {
		vec.push(format!("{other:#06x}"));
	}
	vec
}

/// Checks if a name can't be written as a word: the lexer would split it or read it as something else.
fn needs_quotes(s: &str) -> bool {
	s.is_empty() || s.starts_with('@') || s == "*" || s.contains("//") ||
		s.chars().any(|c| c.is_whitespace() || c.is_control() || matches!(c, '{' | '}' | ',' | '=' | ':' | '"'))
}

/// A name, quoted if it can't be written as a word.
fn name(s: &str) -> Cow<'_, str> {
	if needs_quotes(s) {
		Cow::Owned(quoted(s))
	} else {
		Cow::Borrowed(s)
	}
}

/// A field descriptor or name in a field header. These are also quoted if they contain `(`, so that the header can't be
/// mistaken for a method header.
fn field_header_name(s: &str) -> Cow<'_, str> {
	if s.contains('(') {
		Cow::Owned(quoted(s))
	} else {
		name(s)
	}
}

fn quoted(s: &str) -> String {
	quoted_java(JavaStr::from_str(s))
}

fn quoted_java(s: &JavaStr) -> String {
	let mut out = String::with_capacity(s.len() + 2);
	jstring::escape(s, &mut out);
	out
}

fn long(x: i64) -> String {
	format!("{x}L")
}

/// A `float` literal. A NaN other than the canonical one is written with its bits.
fn float(x: f32) -> String {
	if x.is_nan() && x.to_bits() == f32::NAN.to_bits() {
		"NaNF".to_owned()
	} else if x.is_nan() {
		format!("NaN({:#010x})F", x.to_bits())
	} else if x.is_infinite() {
		if x > 0.0 { "InfinityF".to_owned() } else { "-InfinityF".to_owned() }
	} else {
		format!("{x:?}F")
	}
}

/// Like [`float`], for `double`s.
fn double(x: f64) -> String {
	if x.is_nan() && x.to_bits() == f64::NAN.to_bits() {
		"NaND".to_owned()
	} else if x.is_nan() {
		format!("NaN({:#018x})D", x.to_bits())
	} else if x.is_infinite() {
		if x > 0.0 { "InfinityD".to_owned() } else { "-InfinityD".to_owned() }
	} else {
		format!("{x:?}D")
	}
}

fn attribute_to_string(attribute: &Attribute) -> String {
	let hex: String = attribute.bytes.iter().map(|byte| format!("{byte:02x}")).collect();
	format!("attribute {} \"{hex}\"", quoted(&attribute.name))
}

fn annotation_to_string(annotation: &Annotation) -> String {
	let pairs: Vec<String> = annotation.element_value_pairs.iter()
		.map(|pair| format!("{} = {}", name(&pair.name), element_value_to_string(&pair.value)))
		.collect();
	let annotation_type = name(&annotation.annotation_type);
	if pairs.is_empty() {
		format!("@{annotation_type} {{ }}")
	} else {
		format!("@{annotation_type} {{ {} }}", pairs.join(", "))
	}
}

fn element_value_to_string(value: &ElementValue) -> String {
	match value {
		ElementValue::Object(object) => match object {
			Object::Byte(x) => format!("byte {x}"),
			Object::Char(x) => format!("char {x}"),
			Object::Short(x) => format!("short {x}"),
			Object::Boolean(x) => x.to_string(),
			Object::Integer(x) => x.to_string(),
			&Object::Long(x) => long(x),
			&Object::Float(x) => float(x),
			&Object::Double(x) => double(x),
			Object::String(x) => quoted_java(x),
		},
		ElementValue::Enum { type_name, const_name } => format!("enum {} {}", name(type_name), name(const_name)),
		ElementValue::Class(class) => format!("class {}", name(class)),
		ElementValue::AnnotationInterface(annotation) => annotation_to_string(annotation),
		ElementValue::ArrayType(values) if values.is_empty() => "array { }".to_owned(),
		ElementValue::ArrayType(values) => {
			let values: Vec<String> = values.iter().map(element_value_to_string).collect();
			format!("array {{ {} }}", values.join(", "))
		},
	}
}

/// The `owner.name` of a member reference, quoted as a whole if needed.
fn member(class: &str, member_name: &str) -> String {
	name(&format!("{class}.{member_name}")).into_owned()
}

fn field_ref_to_string(field_ref: &FieldRef) -> String {
	format!("{} : {}", member(&field_ref.class, &field_ref.name), name(&field_ref.desc))
}

fn method_ref_to_string(method_ref: &MethodRef) -> String {
	format!("{} {}", member(&method_ref.class, &method_ref.name), name(&method_ref.desc))
}

fn with_interface(s: String, is_interface: bool) -> String {
	if is_interface { s + " itf" } else { s }
}

fn handle_to_string(handle: &Handle) -> String {
	let (kind, reference) = match handle {
		Handle::GetField(x) => ("H_GETFIELD", field_ref_to_string(x)),
		Handle::GetStatic(x) => ("H_GETSTATIC", field_ref_to_string(x)),
		Handle::PutField(x) => ("H_PUTFIELD", field_ref_to_string(x)),
		Handle::PutStatic(x) => ("H_PUTSTATIC", field_ref_to_string(x)),
		Handle::InvokeVirtual(x) => ("H_INVOKEVIRTUAL", method_ref_to_string(x)),
		&Handle::InvokeStatic(ref x, is_interface) => ("H_INVOKESTATIC", with_interface(method_ref_to_string(x), is_interface)),
		&Handle::InvokeSpecial(ref x, is_interface) => ("H_INVOKESPECIAL", with_interface(method_ref_to_string(x), is_interface)),
		Handle::NewInvokeSpecial(x) => ("H_NEWINVOKESPECIAL", method_ref_to_string(x)),
		Handle::InvokeInterface(x) => ("H_INVOKEINTERFACE", method_ref_to_string(x)),
	};
	format!("handle {kind} {reference}")
}

fn arguments_to_string(arguments: &[Loadable]) -> String {
	if arguments.is_empty() {
		"{ }".to_owned()
	} else {
		let arguments: Vec<String> = arguments.iter().map(loadable_to_string).collect();
		format!("{{ {} }}", arguments.join(", "))
	}
}

fn loadable_to_string(loadable: &Loadable) -> String {
	match loadable {
		Loadable::Integer(x) => x.to_string(),
		&Loadable::Float(x) => float(x),
		&Loadable::Long(x) => long(x),
		&Loadable::Double(x) => double(x),
		Loadable::Class(x) => format!("{}.class", name(x)),
		Loadable::String(x) => quoted_java(x),
		Loadable::MethodHandle(x) => handle_to_string(x),
		Loadable::MethodType(x) if needs_quotes(x) => format!("type {}", quoted(x)),
		Loadable::MethodType(x) => x.to_string(),
		Loadable::Dynamic(x) => {
			format!("dynamic {} {} {} {}", name(&x.name), name(&x.descriptor), handle_to_string(&x.handle), arguments_to_string(&x.arguments))
		},
	}
}

fn instruction_to_string(instruction: &Instruction) -> Result<String> {
	let mnemonic = mnemonic(instruction);
	let operands = match instruction {
		Instruction::BiPush(x) => x.to_string(),
		Instruction::SiPush(x) => x.to_string(),
		Instruction::Ldc(x) => loadable_to_string(x),
		Instruction::ILoad(lv) | Instruction::LLoad(lv) | Instruction::FLoad(lv) | Instruction::DLoad(lv) | Instruction::ALoad(lv) |
		Instruction::IStore(lv) | Instruction::LStore(lv) | Instruction::FStore(lv) | Instruction::DStore(lv) | Instruction::AStore(lv) |
		Instruction::Ret(lv) => lv.index.to_string(),
		Instruction::IInc(lv, value) => format!("{} {value}", lv.index),
		Instruction::IfEq(l) | Instruction::IfNe(l) | Instruction::IfLt(l) | Instruction::IfGe(l) | Instruction::IfGt(l) | Instruction::IfLe(l) |
		Instruction::IfICmpEq(l) | Instruction::IfICmpNe(l) | Instruction::IfICmpLt(l) | Instruction::IfICmpGe(l) |
		Instruction::IfICmpGt(l) | Instruction::IfICmpLe(l) | Instruction::IfACmpEq(l) | Instruction::IfACmpNe(l) |
		Instruction::IfNull(l) | Instruction::IfNonNull(l) | Instruction::Goto(l) | Instruction::Jsr(l) => l.to_string(),
		Instruction::TableSwitch { default, low, high, table } => {
			if *high as i64 - *low as i64 + 1 != table.len() as i64 {
				return Err(anyhow!("tableswitch from {low} to {high} has {} targets", table.len()));
			}
			let table: Vec<String> = table.iter().map(|l| l.to_string()).collect();
			if table.is_empty() {
				format!("{low} {{ }} default {default}")
			} else {
				format!("{low} {{ {} }} default {default}", table.join(", "))
			}
		},
		Instruction::LookupSwitch { default, pairs } => {
			let pairs: Vec<String> = pairs.iter().map(|(key, l)| format!("{key} : {l}")).collect();
			if pairs.is_empty() {
				format!("{{ }} default {default}")
			} else {
				format!("{{ {} }} default {default}", pairs.join(", "))
			}
		},
		Instruction::GetStatic(x) | Instruction::PutStatic(x) | Instruction::GetField(x) | Instruction::PutField(x) => field_ref_to_string(x),
		Instruction::InvokeVirtual(x) | Instruction::InvokeInterface(x) => method_ref_to_string(x),
		&Instruction::InvokeSpecial(ref x, is_interface) | &Instruction::InvokeStatic(ref x, is_interface) => {
			with_interface(method_ref_to_string(x), is_interface)
		},
		Instruction::InvokeDynamic(x) => {
			format!("{} {} {} {}", name(&x.name), name(&x.descriptor), handle_to_string(&x.handle), arguments_to_string(&x.arguments))
		},
		Instruction::New(x) | Instruction::ANewArray(x) | Instruction::CheckCast(x) | Instruction::InstanceOf(x) => name(x).into_owned(),
		Instruction::NewArray(x) => x.keyword().to_owned(),
		Instruction::MultiANewArray(x, dimensions) => format!("{} {dimensions}", name(x)),
		_ => return Ok(mnemonic.to_owned()),
	};
	Ok(format!("{mnemonic} {operands}"))
}

pub(super) fn mnemonic(instruction: &Instruction) -> &'static str {
	match instruction {
		Instruction::Nop => "NOP",
		Instruction::AConstNull => "ACONST_NULL",
		Instruction::IConstM1 => "ICONST_M1",
		Instruction::IConst0 => "ICONST_0",
		Instruction::IConst1 => "ICONST_1",
		Instruction::IConst2 => "ICONST_2",
		Instruction::IConst3 => "ICONST_3",
		Instruction::IConst4 => "ICONST_4",
		Instruction::IConst5 => "ICONST_5",
		Instruction::LConst0 => "LCONST_0",
		Instruction::LConst1 => "LCONST_1",
		Instruction::FConst0 => "FCONST_0",
		Instruction::FConst1 => "FCONST_1",
		Instruction::FConst2 => "FCONST_2",
		Instruction::DConst0 => "DCONST_0",
		Instruction::DConst1 => "DCONST_1",
		Instruction::BiPush(_) => "BIPUSH",
		Instruction::SiPush(_) => "SIPUSH",
		Instruction::Ldc(_) => "LDC",
		Instruction::ILoad(_) => "ILOAD",
		Instruction::LLoad(_) => "LLOAD",
		Instruction::FLoad(_) => "FLOAD",
		Instruction::DLoad(_) => "DLOAD",
		Instruction::ALoad(_) => "ALOAD",
		Instruction::IALoad => "IALOAD",
		Instruction::LALoad => "LALOAD",
		Instruction::FALoad => "FALOAD",
		Instruction::DALoad => "DALOAD",
		Instruction::AALoad => "AALOAD",
		Instruction::BALoad => "BALOAD",
		Instruction::CALoad => "CALOAD",
		Instruction::SALoad => "SALOAD",
		Instruction::IStore(_) => "ISTORE",
		Instruction::LStore(_) => "LSTORE",
		Instruction::FStore(_) => "FSTORE",
		Instruction::DStore(_) => "DSTORE",
		Instruction::AStore(_) => "ASTORE",
		Instruction::IAStore => "IASTORE",
		Instruction::LAStore => "LASTORE",
		Instruction::FAStore => "FASTORE",
		Instruction::DAStore => "DASTORE",
		Instruction::AAStore => "AASTORE",
		Instruction::BAStore => "BASTORE",
		Instruction::CAStore => "CASTORE",
		Instruction::SAStore => "SASTORE",
		Instruction::Pop => "POP",
		Instruction::Pop2 => "POP2",
		Instruction::Dup => "DUP",
		Instruction::DupX1 => "DUP_X1",
		Instruction::DupX2 => "DUP_X2",
		Instruction::Dup2 => "DUP2",
		Instruction::Dup2X1 => "DUP2_X1",
		Instruction::Dup2X2 => "DUP2_X2",
		Instruction::Swap => "SWAP",
		Instruction::IAdd => "IADD",
		Instruction::LAdd => "LADD",
		Instruction::FAdd => "FADD",
		Instruction::DAdd => "DADD",
		Instruction::ISub => "ISUB",
		Instruction::LSub => "LSUB",
		Instruction::FSub => "FSUB",
		Instruction::DSub => "DSUB",
		Instruction::IMul => "IMUL",
		Instruction::LMul => "LMUL",
		Instruction::FMul => "FMUL",
		Instruction::DMul => "DMUL",
		Instruction::IDiv => "IDIV",
		Instruction::LDiv => "LDIV",
		Instruction::FDiv => "FDIV",
		Instruction::DDiv => "DDIV",
		Instruction::IRem => "IREM",
		Instruction::LRem => "LREM",
		Instruction::FRem => "FREM",
		Instruction::DRem => "DREM",
		Instruction::INeg => "INEG",
		Instruction::LNeg => "LNEG",
		Instruction::FNeg => "FNEG",
		Instruction::DNeg => "DNEG",
		Instruction::IShl => "ISHL",
		Instruction::LShl => "LSHL",
		Instruction::IShr => "ISHR",
		Instruction::LShr => "LSHR",
		Instruction::IUShr => "IUSHR",
		Instruction::LUShr => "LUSHR",
		Instruction::IAnd => "IAND",
		Instruction::LAnd => "LAND",
		Instruction::IOr => "IOR",
		Instruction::LOr => "LOR",
		Instruction::IXor => "IXOR",
		Instruction::LXor => "LXOR",
		Instruction::IInc(_, _) => "IINC",
		Instruction::I2L => "I2L",
		Instruction::I2F => "I2F",
		Instruction::I2D => "I2D",
		Instruction::L2I => "L2I",
		Instruction::L2F => "L2F",
		Instruction::L2D => "L2D",
		Instruction::F2I => "F2I",
		Instruction::F2L => "F2L",
		Instruction::F2D => "F2D",
		Instruction::D2I => "D2I",
		Instruction::D2L => "D2L",
		Instruction::D2F => "D2F",
		Instruction::I2B => "I2B",
		Instruction::I2C => "I2C",
		Instruction::I2S => "I2S",
		Instruction::LCmp => "LCMP",
		Instruction::FCmpL => "FCMPL",
		Instruction::FCmpG => "FCMPG",
		Instruction::DCmpL => "DCMPL",
		Instruction::DCmpG => "DCMPG",
		Instruction::IfEq(_) => "IFEQ",
		Instruction::IfNe(_) => "IFNE",
		Instruction::IfLt(_) => "IFLT",
		Instruction::IfGe(_) => "IFGE",
		Instruction::IfGt(_) => "IFGT",
		Instruction::IfLe(_) => "IFLE",
		Instruction::IfICmpEq(_) => "IF_ICMPEQ",
		Instruction::IfICmpNe(_) => "IF_ICMPNE",
		Instruction::IfICmpLt(_) => "IF_ICMPLT",
		Instruction::IfICmpGe(_) => "IF_ICMPGE",
		Instruction::IfICmpGt(_) => "IF_ICMPGT",
		Instruction::IfICmpLe(_) => "IF_ICMPLE",
		Instruction::IfACmpEq(_) => "IF_ACMPEQ",
		Instruction::IfACmpNe(_) => "IF_ACMPNE",
		Instruction::Goto(_) => "GOTO",
		Instruction::Jsr(_) => "JSR",
		Instruction::Ret(_) => "RET",
		Instruction::TableSwitch { .. } => "TABLESWITCH",
		Instruction::LookupSwitch { .. } => "LOOKUPSWITCH",
		Instruction::IReturn => "IRETURN",
		Instruction::LReturn => "LRETURN",
		Instruction::FReturn => "FRETURN",
		Instruction::DReturn => "DRETURN",
		Instruction::AReturn => "ARETURN",
		Instruction::Return => "RETURN",
		Instruction::GetStatic(_) => "GETSTATIC",
		Instruction::PutStatic(_) => "PUTSTATIC",
		Instruction::GetField(_) => "GETFIELD",
		Instruction::PutField(_) => "PUTFIELD",
		Instruction::InvokeVirtual(_) => "INVOKEVIRTUAL",
		Instruction::InvokeSpecial(_, _) => "INVOKESPECIAL",
		Instruction::InvokeStatic(_, _) => "INVOKESTATIC",
		Instruction::InvokeInterface(_) => "INVOKEINTERFACE",
		Instruction::InvokeDynamic(_) => "INVOKEDYNAMIC",
		Instruction::New(_) => "NEW",
		Instruction::NewArray(_) => "NEWARRAY",
		Instruction::ANewArray(_) => "ANEWARRAY",
		Instruction::ArrayLength => "ARRAYLENGTH",
		Instruction::AThrow => "ATHROW",
		Instruction::CheckCast(_) => "CHECKCAST",
		Instruction::InstanceOf(_) => "INSTANCEOF",
		Instruction::MonitorEnter => "MONITORENTER",
		Instruction::MonitorExit => "MONITOREXIT",
		Instruction::MultiANewArray(_, _) => "MULTIANEWARRAY",
		Instruction::IfNull(_) => "IFNULL",
		Instruction::IfNonNull(_) => "IFNONNULL",
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::text::printer::{double, float, instruction_to_string, name};
	use crate::tree::class::ClassName;
	use crate::tree::method::code::{Handle, Instruction, InvokeDynamic, Label, Loadable, LvIndex};
	use crate::tree::method::{MethodDescriptor, MethodName, MethodRef};

	#[test]
	fn float_literals() {
		assert_eq!(float(1.0), "1.0F");
		assert_eq!(float(-0.5), "-0.5F");
		assert_eq!(float(f32::NAN), "NaNF");
		assert_eq!(float(f32::from_bits(0x7f800001)), "NaN(0x7f800001)F");
		assert_eq!(float(f32::from_bits(0xffc00000)), "NaN(0xffc00000)F");
		assert_eq!(float(f32::NEG_INFINITY), "-InfinityF");
		assert_eq!(double(1e300), "1e300D");
		assert_eq!(double(f64::INFINITY), "InfinityD");
		assert_eq!(double(f64::NAN), "NaND");
		assert_eq!(double(f64::from_bits(0x7ff0000000000001)), "NaN(0x7ff0000000000001)D");
	}

	#[test]
	fn names() {
		assert_eq!(name("java/lang/Object"), "java/lang/Object");
		assert_eq!(name("my test"), "\"my test\"");
		assert_eq!(name("a//b"), "\"a//b\"");
		assert_eq!(name("*"), "\"*\"");
		assert_eq!(name("@x"), "\"@x\"");
		assert_eq!(name("a=b"), "\"a=b\"");
		assert_eq!(name("say\"hi\""), "\"say\\\"hi\\\"\"");
	}

	#[test]
	fn operands() -> Result<()> {
		assert_eq!(instruction_to_string(&Instruction::IInc(LvIndex { index: 3 }, -7))?, "IINC 3 -7");
		assert_eq!(instruction_to_string(&Instruction::LookupSwitch {
			default: Label::new(2),
			pairs: vec![(-1, Label::new(0)), (5, Label::new(1))],
		})?, "LOOKUPSWITCH { -1 : L0, 5 : L1 } default L2");
		assert_eq!(instruction_to_string(&Instruction::Ldc(Loadable::Class(ClassName::try_from("[I")?)))?, "LDC [I.class");

		let bootstrap = MethodRef {
			class: ClassName::try_from("a/Boot")?,
			name: MethodName::try_from("boot")?,
			desc: MethodDescriptor::try_from("()Ljava/lang/invoke/CallSite;")?,
		};
		let instruction = Instruction::InvokeDynamic(InvokeDynamic {
			name: MethodName::try_from("run")?,
			descriptor: MethodDescriptor::try_from("()Ljava/lang/Runnable;")?,
			handle: Handle::InvokeStatic(bootstrap, true),
			arguments: vec![Loadable::Integer(4), Loadable::MethodType(MethodDescriptor::try_from("()V")?)],
		});
		assert_eq!(
			instruction_to_string(&instruction)?,
			"INVOKEDYNAMIC run ()Ljava/lang/Runnable; handle H_INVOKESTATIC a/Boot.boot ()Ljava/lang/invoke/CallSite; itf { 4, ()V }"
		);
		Ok(())
	}
}
