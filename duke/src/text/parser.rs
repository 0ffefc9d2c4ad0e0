use std::collections::{HashMap, HashSet};
use anyhow::{anyhow, bail, Context, Result};
use crate::error::{OrTranslationError, TranslationError};
use crate::text::lexer::{self, Line, TokenKind};
use crate::tree::annotation::{Annotation, Annotations, ElementValue, ElementValuePair, Object};
use crate::tree::attribute::Attribute;
use crate::tree::class::{ClassAccess, ClassFile, ClassName, EnclosingMethod, InnerClass, InnerClassFlags};
use crate::tree::descriptor::is_valid_return_descriptor;
use crate::tree::field::{ConstantValue, Field, FieldAccess, FieldDescriptor, FieldName, FieldRef};
use crate::tree::method::code::{ArrayType, Code, ConstantDynamic, Exception, Handle, Instruction, InstructionListEntry, InvokeDynamic, Label, LabelRange, Loadable, Lv, LvIndex};
use crate::tree::method::{Method, MethodAccess, MethodDescriptor, MethodName, MethodNameAndDesc, MethodParameter, MethodRef, ParameterAnnotations, ParameterFlags};
use crate::tree::record::{RecordComponent, RecordName};
use crate::tree::type_annotation::{TargetInfoClass, TargetInfoCode, TargetInfoField, TargetInfoMethod, TypeAnnotation, TypeAnnotations, TypePath};
use crate::tree::version::Version;

/// Parses a class from the textual format.
pub(crate) fn parse(text: &str) -> Result<ClassFile> {
	let mut parser = Parser {
		lines: lexer::lines(text)?.into_iter(),
		end_line: text.lines().count() + 1,
	};
	let class = parser.class()?;
	if let Some(mut line) = parser.lines.next() {
		return line.parse(|_| -> Result<ClassFile> { bail!("expected the end of the input") });
	}
	Ok(class)
}

struct Parser {
	lines: std::vec::IntoIter<Line>,
	/// The number of the line after the last one.
	end_line: usize,
}

impl Parser {
	fn next_line(&mut self, expected: &str) -> Result<Line> {
		let end_line = self.end_line;
		self.lines.next()
			.with_context(|| anyhow!("expected {expected}, got the end of the input"))
			.or_translation_error(|| TranslationError::Syntax { line: end_line, column: 1 })
	}

	fn class(&mut self) -> Result<ClassFile> {
		let mut version = None;
		let mut source_file = None;
		let mut prefix = Prefix::default();

		let mut line = loop {
			let mut line = self.next_line("a class header")?;
			if prefix.parse_line(&mut line)? {
				continue;
			}
			match line.peek_word() {
				Some("version") => line.parse(|line| {
					line.advance();
					let major = line.next_parsed(|s| Ok(s.parse::<u16>()?))?;
					let minor = line.next_parsed(|s| Ok(s.parse::<u16>()?))?;
					if version.replace(Version::new(major, minor)).is_some() {
						bail!("the version is given twice");
					}
					Ok(())
				})?,
				Some("source") => line.parse(|line| {
					line.advance();
					if source_file.replace(line.next_rust_string()?).is_some() {
						bail!("the source file is given twice");
					}
					Ok(())
				})?,
				_ => break line,
			}
		};

		let mut class = line.parse(|line| {
			let access = flags(line, ClassAccess::set_keyword)?;
			line.expect_word("class")?;
			let name = class_name(line)?;
			let super_class = if line.eat_word("extends") { Some(class_name(line)?) } else { None };
			let mut interfaces = Vec::new();
			if line.eat_word("implements") {
				while line.is_name() {
					interfaces.push(class_name(line)?);
				}
			}
			line.expect_punct('{')?;
			Ok(ClassFile::new(version.unwrap_or_default(), access, name, super_class, interfaces))
		})?;
		class.source_file = source_file;
		std::mem::take(&mut prefix).apply_class(&mut class)?;

		loop {
			let mut line = self.next_line("`}`")?;
			if line.len() == 1 && line.is_punct('}') {
				if let Some(number) = prefix.line {
					return Err(anyhow!("directive isn't followed by a field or method")
						.context(TranslationError::Syntax { line: number, column: 1 }));
				}
				return Ok(class);
			}
			if prefix.parse_line(&mut line)? {
				continue;
			}
			match line.peek_word() {
				Some("record") if line.len() == 2 && line.peek_nth(1) == Some(&TokenKind::Punct('{')) => {
					if let Some(number) = prefix.line {
						return Err(anyhow!("directive isn't followed by a field or method")
							.context(TranslationError::Syntax { line: number, column: 1 }));
					}
					if class.record_components.is_some() {
						return Err(anyhow!("the record components are given twice").context(line.syntax_error()));
					}
					class.record_components = Some(self.record_components()?);
				},
				Some("nesthost") => line.parse(|line| {
					line.advance();
					if class.nest_host_class.replace(class_name(line)?).is_some() {
						bail!("the nest host is given twice");
					}
					Ok(())
				})?,
				Some("nestmember") => line.parse(|line| {
					line.advance();
					class.nest_members.push(class_name(line)?);
					Ok(())
				})?,
				Some("enclosing") => line.parse(|line| {
					line.advance();
					let enclosing_class = class_name(line)?;
					let method = if line.is_at_end() {
						None
					} else {
						let name = line.next_name(|s| MethodName::try_from(s))?;
						let desc = line.next_name(|s| MethodDescriptor::try_from(s))?;
						Some(MethodNameAndDesc { name, desc })
					};
					let enclosing_method = EnclosingMethod { class: enclosing_class, method };
					if class.enclosing_method.replace(enclosing_method).is_some() {
						bail!("the enclosing method is given twice");
					}
					Ok(())
				})?,
				Some("innerclass") => line.parse(|line| {
					line.advance();
					let inner_class = class_name(line)?;
					let outer_class = if line.eat_word("outer") { Some(class_name(line)?) } else { None };
					let inner_name = if line.eat_word("name") { Some(line.next_name(|s| Ok(s.to_owned()))?) } else { None };
					let flags = flags(line, InnerClassFlags::set_keyword)?;
					class.inner_classes.push(InnerClass { inner_class, outer_class, inner_name, flags });
					Ok(())
				})?,
				_ => self.member(&mut class, &mut line, std::mem::take(&mut prefix))?,
			}
		}
	}

	fn member(&mut self, class: &mut ClassFile, line: &mut Line, prefix: Prefix) -> Result<()> {
		if is_method_header(line) {
			let (mut method, has_code) = line.parse(method_header)?;
			prefix.apply_method(&mut method)?;
			if has_code {
				method.code = Some(self.code()?);
			}
			class.methods.push(method);
		} else {
			let mut field = line.parse(field_header)?;
			prefix.apply_field(&mut field)?;
			class.fields.push(field);
		}
		Ok(())
	}

	/// Parses the lines after `record {`, up to the closing `}`.
	fn record_components(&mut self) -> Result<Vec<RecordComponent>> {
		let mut components = Vec::new();
		let mut prefix = Prefix::default();
		loop {
			let mut line = self.next_line("`}`")?;
			if line.len() == 1 && line.is_punct('}') {
				if let Some(number) = prefix.line {
					return Err(anyhow!("directive isn't followed by a record component")
						.context(TranslationError::Syntax { line: number, column: 1 }));
				}
				return Ok(components);
			}
			if prefix.parse_line(&mut line)? {
				continue;
			}
			let mut component = line.parse(|line| {
				let descriptor = line.next_name(|s| FieldDescriptor::try_from(s))?;
				let name = line.next_name(|s| RecordName::try_from(s))?;
				Ok(RecordComponent::new(name, descriptor))
			})?;
			std::mem::take(&mut prefix).apply_record_component(&mut component)?;
			components.push(component);
		}
	}

	fn code(&mut self) -> Result<Code> {
		let mut builder = CodeBuilder::default();
		loop {
			let mut line = self.next_line("`}`")?;
			if line.len() == 1 && line.is_punct('}') {
				let number = line.number;
				return builder.finish()
					.or_translation_error(|| TranslationError::Syntax { line: number, column: 1 });
			}
			line.parse(|line| builder.line(line))?;
		}
	}
}

/// The directives that apply to the class or member following them.
#[derive(Debug, Default)]
struct Prefix {
	/// The first line holding one of the directives.
	line: Option<usize>,
	signature: Option<String>,
	deprecated: bool,
	synthetic: bool,
	annotations: Annotations,
	/// Type annotations with their visibility and line, checked against the member once it's known.
	type_annotations: Vec<(bool, usize, TypeAnnotation<MemberTarget>)>,
	attributes: Vec<Attribute>,

	/// The first line holding a directive only methods may have.
	method_line: Option<usize>,
	parameter_annotations: ParameterAnnotations,
	annotation_default: Option<ElementValue>,
	parameters: Option<Vec<MethodParameter>>,
}

impl Prefix {
	/// Parses the line if it's one of the directives. Returns `false` if it isn't.
	fn parse_line(&mut self, line: &mut Line) -> Result<bool> {
		let is_prefix = match line.peek_word() {
			Some("signature" | "invisible" | "attribute" | "type" | "params" | "param" | "default" | "parameters") => true,
			Some("deprecated" | "synthetic") => line.len() == 1,
			Some(word) => word.starts_with('@'),
			None => false,
		};
		if !is_prefix {
			return Ok(false);
		}

		let line_number = line.number;
		let method_only = line.parse(|line| {
			let visible = !line.eat_word("invisible");
			match line.peek_word() {
				Some("signature") if visible => {
					line.advance();
					if self.signature.replace(line.next_rust_string()?).is_some() {
						bail!("the signature is given twice");
					}
				},
				Some("deprecated") if visible => {
					line.advance();
					self.deprecated = true;
				},
				Some("synthetic") if visible => {
					line.advance();
					self.synthetic = true;
				},
				Some("attribute") if visible => {
					line.advance();
					self.attributes.push(attribute(line)?);
				},
				Some("type") => {
					line.advance();
					let type_reference = member_target(line)?;
					let type_path = type_path(line)?;
					let annotation = annotation(line)?;
					self.type_annotations.push((visible, line_number, TypeAnnotation::new(type_reference, type_path, annotation)));
				},
				Some("params") => {
					line.advance();
					let count: u8 = number(line)?;
					let list = if visible { &mut self.parameter_annotations.visible } else { &mut self.parameter_annotations.invisible };
					if list.replace(vec![Vec::new(); count as usize]).is_some() {
						bail!("the number of annotated parameters is given twice");
					}
					return Ok(true);
				},
				Some("param") => {
					line.advance();
					let index: usize = number(line)?;
					let list = if visible { &mut self.parameter_annotations.visible } else { &mut self.parameter_annotations.invisible };
					let list = list.as_mut().context("parameter annotations need a `params` line before them")?;
					let count = list.len();
					let annotations = list.get_mut(index)
						.with_context(|| anyhow!("parameter {index} is out of bounds for {count} annotated parameters"))?;
					annotations.push(annotation(line)?);
					return Ok(true);
				},
				Some("default") if visible => {
					line.advance();
					if self.annotation_default.replace(element_value(line)?).is_some() {
						bail!("the annotation default is given twice");
					}
					return Ok(true);
				},
				Some("parameters") if visible => {
					line.advance();
					let parameters = line.braced_list(|line| {
						let name = if line.eat_word("-") { None } else { Some(line.next_name(|s| Ok(s.to_owned()))?) };
						let flags = flags(line, ParameterFlags::set_keyword)?;
						Ok(MethodParameter { name, flags })
					})?;
					if self.parameters.replace(parameters).is_some() {
						bail!("the method parameters are given twice");
					}
					return Ok(true);
				},
				_ => {
					let annotation = annotation(line)?;
					if visible {
						self.annotations.visible.push(annotation);
					} else {
						self.annotations.invisible.push(annotation);
					}
				},
			}
			Ok(false)
		})?;
		self.line.get_or_insert(line_number);
		if method_only {
			self.method_line.get_or_insert(line_number);
		}
		Ok(true)
	}

	fn not_for_methods_only(&self, place: &str) -> Result<()> {
		match self.method_line {
			Some(line) => Err(anyhow!("directive only applies to methods, not to {place}")
				.context(TranslationError::Syntax { line, column: 1 })),
			None => Ok(()),
		}
	}

	/// Sorts the type annotations by visibility, converting their targets with `convert`.
	fn type_annotations<T>(
		list: Vec<(bool, usize, TypeAnnotation<MemberTarget>)>,
		convert: impl Fn(MemberTarget) -> Option<T>,
		place: &str,
	) -> Result<TypeAnnotations<T>> {
		let mut type_annotations = TypeAnnotations::default();
		for (visible, line, type_annotation) in list {
			let Some(type_reference) = convert(type_annotation.type_reference) else {
				return Err(anyhow!("type annotation target {:?} doesn't apply to {place}", type_annotation.type_reference)
					.context(TranslationError::Syntax { line, column: 1 }));
			};
			let type_annotation = TypeAnnotation::new(type_reference, type_annotation.type_path, type_annotation.annotation);
			if visible {
				type_annotations.visible.push(type_annotation);
			} else {
				type_annotations.invisible.push(type_annotation);
			}
		}
		Ok(type_annotations)
	}

	fn apply_class(self, class: &mut ClassFile) -> Result<()> {
		self.not_for_methods_only("a class")?;
		class.type_annotations = Prefix::type_annotations(self.type_annotations, MemberTarget::for_class, "a class")?;
		class.signature = self.signature;
		class.has_deprecated_attribute = self.deprecated;
		class.has_synthetic_attribute = self.synthetic;
		class.annotations = self.annotations;
		class.attributes = self.attributes;
		Ok(())
	}

	fn apply_field(self, field: &mut Field) -> Result<()> {
		self.not_for_methods_only("a field")?;
		field.type_annotations = Prefix::type_annotations(self.type_annotations, MemberTarget::for_field, "a field")?;
		field.signature = self.signature;
		field.has_deprecated_attribute = self.deprecated;
		field.has_synthetic_attribute = self.synthetic;
		field.annotations = self.annotations;
		field.attributes = self.attributes;
		Ok(())
	}

	fn apply_method(self, method: &mut Method) -> Result<()> {
		method.type_annotations = Prefix::type_annotations(self.type_annotations, MemberTarget::for_method, "a method")?;
		method.signature = self.signature;
		method.has_deprecated_attribute = self.deprecated;
		method.has_synthetic_attribute = self.synthetic;
		method.annotations = self.annotations;
		method.parameter_annotations = self.parameter_annotations;
		method.annotation_default = self.annotation_default;
		method.parameters = self.parameters;
		method.attributes = self.attributes;
		Ok(())
	}

	fn apply_record_component(self, component: &mut RecordComponent) -> Result<()> {
		self.not_for_methods_only("a record component")?;
		if self.deprecated || self.synthetic {
			let line = self.line.unwrap_or_default();
			return Err(anyhow!("a record component can't be deprecated or synthetic")
				.context(TranslationError::Syntax { line, column: 1 }));
		}
		component.type_annotations = Prefix::type_annotations(self.type_annotations, MemberTarget::for_field, "a record component")?;
		component.signature = self.signature;
		component.annotations = self.annotations;
		component.attributes = self.attributes;
		Ok(())
	}
}

/// The target of a type annotation written before a class or member, before it's known which one it is.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MemberTarget {
	TypeParameter(u8),
	TypeParameterBound(u8, u8),
	Extends,
	Implements(u16),
	Field,
	Return,
	Receiver,
	Parameter(u8),
	Throws(u16),
}

impl MemberTarget {
	fn for_class(self) -> Option<TargetInfoClass> {
		Some(match self {
			MemberTarget::TypeParameter(index) => TargetInfoClass::ClassTypeParameter { index },
			MemberTarget::TypeParameterBound(type_parameter_index, bound_index) =>
				TargetInfoClass::ClassTypeParameterBound { type_parameter_index, bound_index },
			MemberTarget::Extends => TargetInfoClass::Extends,
			MemberTarget::Implements(index) => TargetInfoClass::Implements { index },
			_ => return None,
		})
	}

	fn for_field(self) -> Option<TargetInfoField> {
		match self {
			MemberTarget::Field => Some(TargetInfoField::Field),
			_ => None,
		}
	}

	fn for_method(self) -> Option<TargetInfoMethod> {
		Some(match self {
			MemberTarget::TypeParameter(index) => TargetInfoMethod::MethodTypeParameter { index },
			MemberTarget::TypeParameterBound(type_parameter_index, bound_index) =>
				TargetInfoMethod::MethodTypeParameterBound { type_parameter_index, bound_index },
			MemberTarget::Return => TargetInfoMethod::Return,
			MemberTarget::Receiver => TargetInfoMethod::Receiver,
			MemberTarget::Parameter(index) => TargetInfoMethod::FormalParameter { index },
			MemberTarget::Throws(index) => TargetInfoMethod::Throws { index },
			_ => return None,
		})
	}
}

fn member_target(line: &mut Line) -> Result<MemberTarget> {
	let word = line.next_word()?;
	Ok(match word.as_str() {
		"typeparam" => MemberTarget::TypeParameter(number(line)?),
		"typebound" => MemberTarget::TypeParameterBound(number(line)?, number(line)?),
		"extends" => MemberTarget::Extends,
		"implements" => {
			let index = number(line)?;
			if index == u16::MAX {
				bail!("interface index {index} is reserved for the super class");
			}
			MemberTarget::Implements(index)
		},
		"field" => MemberTarget::Field,
		"return" => MemberTarget::Return,
		"receiver" => MemberTarget::Receiver,
		"param" => MemberTarget::Parameter(number(line)?),
		"throws" => MemberTarget::Throws(number(line)?),
		_ => bail!("unknown type annotation target {word:?}"),
	})
}

/// Parses the optional `path` of a type annotation.
fn type_path(line: &mut Line) -> Result<TypePath> {
	if line.eat_word("path") {
		line.next_parsed(TypePath::parse)
	} else {
		Ok(TypePath::default())
	}
}

/// Parses flag keywords and hex words holding further bits, until a word that is neither.
fn flags<A>(line: &mut Line, set_keyword: impl Fn(&mut A, &str) -> bool) -> Result<A>
where
	A: Copy + Default + From<u16> + Into<u16>,
{
	let mut access = A::default();
	while let Some(word) = line.peek_word().map(str::to_owned) {
		if let Some(bits) = word.strip_prefix("0x").and_then(|hex| u16::from_str_radix(hex, 16).ok()) {
			let current: u16 = access.into();
			access = A::from(current | bits);
		} else if !set_keyword(&mut access, &word) {
			break;
		}
		line.advance();
	}
	Ok(access)
}

fn is_flag_word(word: &str) -> bool {
	FieldAccess::KEYWORDS.contains(&word) || MethodAccess::KEYWORDS.contains(&word) ||
		word.strip_prefix("0x").is_some_and(|hex| u16::from_str_radix(hex, 16).is_ok())
}

/// Checks if the flags are followed by a method name joined with its descriptor, or by a quoted method name and then
/// a descriptor.
///
/// A field header may start with a quoted descriptor followed by a quoted name starting with `(`. Such a descriptor
/// ends with `;`, which no method name contains.
fn is_method_header(line: &Line) -> bool {
	let mut n = 0;
	loop {
		match line.peek_nth(n) {
			Some(TokenKind::Word(word)) if is_flag_word(word) => n += 1,
			Some(TokenKind::Word(word)) => return word.contains('('),
			Some(TokenKind::String(name)) => {
				let descriptor_follows = match line.peek_nth(n + 1) {
					Some(TokenKind::Word(word)) => word.starts_with('('),
					Some(TokenKind::String(string)) => string.starts_with('('),
					_ => false,
				};
				return descriptor_follows && !name.ends_with(';');
			},
			_ => return false,
		}
	}
}

fn field_header(line: &mut Line) -> Result<Field> {
	let access = flags(line, FieldAccess::set_keyword)?;
	let descriptor = line.next_name(|s| FieldDescriptor::try_from(s))?;
	let name = line.next_name(|s| FieldName::try_from(s))?;
	let mut field = Field::new(access, name, descriptor);

	if line.eat_punct('=') {
		let check = |value: ConstantValue| -> Result<ConstantValue> {
			if !value.fits(&field.descriptor) {
				bail!("constant value {value:?} doesn't fit a field of type {}", field.descriptor);
			}
			Ok(value)
		};
		let value = if let Some(TokenKind::String(string)) = line.peek() {
			let value = check(ConstantValue::String(string.clone()))?;
			line.advance();
			value
		} else {
			line.next_parsed(|s| check(match literal(s)? {
				Literal::Integer(x) => ConstantValue::Integer(x),
				Literal::Long(x) => ConstantValue::Long(x),
				Literal::Float(x) => ConstantValue::Float(x),
				Literal::Double(x) => ConstantValue::Double(x),
			}))?
		};
		field.constant_value = Some(value);
	}
	Ok(field)
}

/// Parses a method header, and returns if the code follows on the next lines.
fn method_header(line: &mut Line) -> Result<(Method, bool)> {
	let access = flags(line, MethodAccess::set_keyword)?;
	let (name, descriptor) = if let Some(TokenKind::String(_)) = line.peek() {
		let name = line.next_name(|s| MethodName::try_from(s))?;
		(name, line.next_name(|s| MethodDescriptor::try_from(s))?)
	} else {
		line.next_parsed(|s| {
			let index = s.find('(').with_context(|| anyhow!("expected a method name followed by its descriptor, got {s:?}"))?;
			let (name, descriptor) = s.split_at(index);
			Ok((MethodName::try_from(name)?, MethodDescriptor::try_from(descriptor)?))
		})?
	};
	let mut method = Method::new(access, name, descriptor);

	if line.eat_word("throws") {
		while line.is_name() {
			method.exceptions.push(class_name(line)?);
		}
	}
	let has_code = line.eat_punct('{');
	Ok((method, has_code))
}

fn class_name(line: &mut Line) -> Result<ClassName> {
	line.next_name(|s| ClassName::try_from(s))
}

fn number<T: std::str::FromStr>(line: &mut Line) -> Result<T>
where
	T::Err: std::error::Error + Send + Sync + 'static,
{
	line.next_parsed(|s| s.parse::<T>().with_context(|| anyhow!("invalid number {s:?}")))
}

/// Splits `owner.name` at the last dot.
fn split_member(s: &str) -> Result<(&str, &str)> {
	s.rsplit_once('.').with_context(|| anyhow!("expected `owner.name`, got {s:?}"))
}

fn field_ref(line: &mut Line) -> Result<FieldRef> {
	let (class, name) = line.next_name(|s| {
		let (class, name) = split_member(s)?;
		Ok((ClassName::try_from(class)?, FieldName::try_from(name)?))
	})?;
	line.expect_punct(':')?;
	let desc = line.next_name(|s| FieldDescriptor::try_from(s))?;
	Ok(FieldRef { class, name, desc })
}

fn method_ref(line: &mut Line) -> Result<MethodRef> {
	let (class, name) = line.next_name(|s| {
		let (class, name) = split_member(s)?;
		Ok((ClassName::try_from(class)?, MethodName::try_from(name)?))
	})?;
	let desc = line.next_name(|s| MethodDescriptor::try_from(s))?;
	Ok(MethodRef { class, name, desc })
}

fn handle(line: &mut Line) -> Result<Handle> {
	line.expect_word("handle")?;
	let kind = line.next_parsed(|s| Ok(s.to_owned()))?;
	Ok(match kind.as_str() {
		"H_GETFIELD" => Handle::GetField(field_ref(line)?),
		"H_GETSTATIC" => Handle::GetStatic(field_ref(line)?),
		"H_PUTFIELD" => Handle::PutField(field_ref(line)?),
		"H_PUTSTATIC" => Handle::PutStatic(field_ref(line)?),
		"H_INVOKEVIRTUAL" => Handle::InvokeVirtual(method_ref(line)?),
		"H_INVOKESTATIC" => Handle::InvokeStatic(method_ref(line)?, line.eat_word("itf")),
		"H_INVOKESPECIAL" => Handle::InvokeSpecial(method_ref(line)?, line.eat_word("itf")),
		"H_NEWINVOKESPECIAL" => Handle::NewInvokeSpecial(method_ref(line)?),
		"H_INVOKEINTERFACE" => Handle::InvokeInterface(method_ref(line)?),
		_ => bail!("unknown method handle kind {kind:?}"),
	})
}

fn arguments(line: &mut Line) -> Result<Vec<Loadable>> {
	line.braced_list(loadable)
}

fn loadable(line: &mut Line) -> Result<Loadable> {
	if let Some(TokenKind::String(_)) = line.peek() {
		if line.peek_nth(1) == Some(&TokenKind::Word(".class".to_owned())) {
			let class = class_name(line)?;
			line.advance();
			return Ok(Loadable::Class(class));
		}
		return Ok(Loadable::String(line.next_string()?));
	}
	let word = line.peek_word().map(str::to_owned).context("expected a constant")?;
	Ok(match word.as_str() {
		"handle" => Loadable::MethodHandle(handle(line)?),
		"type" => {
			line.advance();
			Loadable::MethodType(line.next_name(|s| MethodDescriptor::try_from(s))?)
		},
		"dynamic" => {
			line.advance();
			let name = line.next_name(|s| FieldName::try_from(s))?;
			let descriptor = line.next_name(|s| FieldDescriptor::try_from(s))?;
			let handle = handle(line)?;
			let arguments = arguments(line)?;
			Loadable::Dynamic(ConstantDynamic { name, descriptor, handle, arguments })
		},
		word if word.starts_with('(') => Loadable::MethodType(line.next_parsed(|s| MethodDescriptor::try_from(s))?),
		word if word.ends_with(".class") => {
			Loadable::Class(line.next_parsed(|s| ClassName::try_from(&s[..s.len() - ".class".len()]))?)
		},
		_ => match line.next_parsed(literal)? {
			Literal::Integer(x) => Loadable::Integer(x),
			Literal::Long(x) => Loadable::Long(x),
			Literal::Float(x) => Loadable::Float(x),
			Literal::Double(x) => Loadable::Double(x),
		},
	})
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Literal {
	Integer(i32),
	Long(i64),
	Float(f32),
	Double(f64),
}

/// Parses a numeric literal.
///
/// A suffix of `L`, `F` or `D` (in any case) makes it a `long`, `float` or `double`. Without a suffix, a literal with a
/// `.` or an exponent is a `double`, and any other one is an `int`. `NaN` and `Infinity` always need a suffix.
///
/// A NaN with other bits than the canonical one is written as `NaN(0x7f800001)F`, with the bits in hex.
fn literal(s: &str) -> Result<Literal> {
	let (body, suffix) = match s.chars().last() {
		Some(c @ ('L' | 'l' | 'F' | 'f' | 'D' | 'd')) => (&s[..s.len() - 1], Some(c.to_ascii_uppercase())),
		_ => (s, None),
	};
	let invalid = || anyhow!("invalid numeric literal {s:?}");
	if let Some(hex) = body.strip_prefix("NaN(0x").and_then(|x| x.strip_suffix(')')) {
		let literal = match suffix {
			Some('F') => Literal::Float(f32::from_bits(u32::from_str_radix(hex, 16).with_context(invalid)?)),
			Some('D') => Literal::Double(f64::from_bits(u64::from_str_radix(hex, 16).with_context(invalid)?)),
			_ => bail!("NaN bits need a suffix of `F` or `D`, got {s:?}"),
		};
		let is_nan = match literal {
			Literal::Float(x) => x.is_nan(),
			Literal::Double(x) => x.is_nan(),
			_ => false,
		};
		if !is_nan {
			bail!("the bits of {s:?} aren't a NaN");
		}
		return Ok(literal);
	}
	Ok(match suffix {
		Some('L') => Literal::Long(body.parse().with_context(invalid)?),
		Some('F') => Literal::Float(body.parse().with_context(invalid)?),
		Some('D') => Literal::Double(body.parse().with_context(invalid)?),
		_ if body.contains(|c| matches!(c, '.' | 'e' | 'E')) => Literal::Double(body.parse().with_context(invalid)?),
		_ => Literal::Integer(body.parse().with_context(invalid)?),
	})
}

fn annotation(line: &mut Line) -> Result<Annotation> {
	// a quoted type follows a lone `@`
	let annotation_type = if line.eat_word("@") {
		line.next_name(|s| FieldDescriptor::try_from(s))?
	} else {
		line.next_parsed(|s| {
			let descriptor = s.strip_prefix('@').with_context(|| anyhow!("expected an annotation, got {s:?}"))?;
			FieldDescriptor::try_from(descriptor)
		})?
	};
	let element_value_pairs = line.braced_list(|line| {
		let name = line.next_name(|s| Ok(s.to_owned()))?;
		line.expect_punct('=')?;
		let value = element_value(line)?;
		Ok(ElementValuePair { name, value })
	})?;
	Ok(Annotation { annotation_type, element_value_pairs })
}

fn element_value(line: &mut Line) -> Result<ElementValue> {
	if let Some(TokenKind::String(_)) = line.peek() {
		return Ok(ElementValue::Object(Object::String(line.next_string()?)));
	}
	let word = line.peek_word().map(str::to_owned).context("expected an element value")?;
	let object = match word.as_str() {
		"true" | "false" => {
			line.advance();
			Object::Boolean(word == "true")
		},
		"byte" => {
			line.advance();
			Object::Byte(number(line)?)
		},
		"char" => {
			line.advance();
			Object::Char(number(line)?)
		},
		"short" => {
			line.advance();
			Object::Short(number(line)?)
		},
		"enum" => {
			line.advance();
			let type_name = line.next_name(|s| FieldDescriptor::try_from(s))?;
			let const_name = line.next_name(|s| Ok(s.to_owned()))?;
			return Ok(ElementValue::Enum { type_name, const_name });
		},
		"class" => {
			line.advance();
			return line.next_name(|s| {
				if !is_valid_return_descriptor(s) {
					bail!("invalid class literal {s:?}");
				}
				Ok(ElementValue::Class(s.to_owned()))
			});
		},
		"array" => {
			line.advance();
			return Ok(ElementValue::ArrayType(line.braced_list(element_value)?));
		},
		word if word.starts_with('@') => return Ok(ElementValue::AnnotationInterface(annotation(line)?)),
		_ => match line.next_parsed(literal)? {
			Literal::Integer(x) => Object::Integer(x),
			Literal::Long(x) => Object::Long(x),
			Literal::Float(x) => Object::Float(x),
			Literal::Double(x) => Object::Double(x),
		},
	};
	Ok(ElementValue::Object(object))
}

/// Parses the `"Name" "hex"` following the `attribute` keyword.
fn attribute(line: &mut Line) -> Result<Attribute> {
	let name = line.next_rust_string()?;
	let hex = line.next_rust_string()?;
	if !hex.is_ascii() || hex.len() % 2 != 0 {
		bail!("attribute contents must be pairs of hex digits, got {hex:?}");
	}
	let bytes = (0..hex.len()).step_by(2)
		.map(|i| u8::from_str_radix(&hex[i..i + 2], 16))
		.collect::<Result<Vec<u8>, _>>()
		.with_context(|| anyhow!("attribute contents must be pairs of hex digits, got {hex:?}"))?;
	Ok(Attribute::new(name, bytes))
}

fn is_label_name(s: &str) -> bool {
	s.strip_prefix('L').is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Collects the lines of a method body into its [`Code`].
#[derive(Debug, Default)]
struct CodeBuilder {
	code: Code,
	/// The label for each name, with ids given out in the order the names first appear.
	labels: HashMap<String, Label>,
	names: Vec<String>,
	bound: HashSet<Label>,
	/// Labels bound since the last instruction.
	pending: Vec<Label>,
	/// Labels bound at the same position as an earlier one, mapped to that one.
	aliases: HashMap<Label, Label>,
}

impl CodeBuilder {
	fn label(&mut self, name: &str) -> Result<Label> {
		if !is_label_name(name) {
			bail!("expected a label like `L0`, got {name:?}");
		}
		if let Some(&label) = self.labels.get(name) {
			return Ok(label);
		}
		let id = u16::try_from(self.names.len()).context("too many labels")?;
		let label = Label::new(id);
		self.labels.insert(name.to_owned(), label);
		self.names.push(name.to_owned());
		Ok(label)
	}

	fn next_label(&mut self, line: &mut Line) -> Result<Label> {
		line.next_parsed(|s| self.label(s))
	}

	fn line(&mut self, line: &mut Line) -> Result<()> {
		let word = line.peek_word().map(str::to_owned).context("expected an instruction")?;
		if line.len() == 1 && is_label_name(&word) {
			let label = self.next_label(line)?;
			if !self.bound.insert(label) {
				bail!("label {word} is bound twice");
			}
			self.pending.push(label);
			return Ok(());
		}

		match word.to_ascii_uppercase().as_str() {
			"LINENUMBER" => {
				line.advance();
				let number = number(line)?;
				let label = self.next_label(line)?;
				self.code.line_numbers.push((label, number));
			},
			"LOCALVARIABLE" => {
				line.advance();
				let name = line.next_name(|s| Ok(s.to_owned()))?;
				let descriptor = if line.eat_word("-") {
					None
				} else {
					Some(line.next_name(|s| FieldDescriptor::try_from(s))?)
				};
				let start = self.next_label(line)?;
				let end = self.next_label(line)?;
				let index = LvIndex { index: number(line)? };
				let signature = if line.is_at_end() { None } else { Some(line.next_rust_string()?) };
				self.code.local_variables.push(Lv { range: LabelRange { start, end }, name, descriptor, signature, index });
			},
			"TRYCATCHBLOCK" => {
				line.advance();
				let start = self.next_label(line)?;
				let end = self.next_label(line)?;
				let handler = self.next_label(line)?;
				let catch = if line.eat_word("*") { None } else { Some(class_name(line)?) };
				self.code.exception_table.push(Exception { start, end, handler, catch });
			},
			"MAXSTACK" => {
				line.advance();
				line.expect_punct('=')?;
				if self.code.max_stack.replace(number(line)?).is_some() {
					bail!("MAXSTACK is given twice");
				}
			},
			"MAXLOCALS" => {
				line.advance();
				line.expect_punct('=')?;
				if self.code.max_locals.replace(number(line)?).is_some() {
					bail!("MAXLOCALS is given twice");
				}
			},
			"ATTRIBUTE" => {
				line.advance();
				self.code.attributes.push(attribute(line)?);
			},
			"TYPEANNOTATION" => {
				line.advance();
				let visible = !line.eat_word("invisible");
				let type_reference = self.code_target(line)?;
				let type_path = type_path(line)?;
				let annotation = TypeAnnotation::new(type_reference, type_path, annotation(line)?);
				if visible {
					self.code.type_annotations.visible.push(annotation);
				} else {
					self.code.type_annotations.invisible.push(annotation);
				}
			},
			_ => {
				let instruction = instruction(line, self)?;
				let mut entry = InstructionListEntry::new(instruction);
				entry.label = self.take_pending();
				self.code.instructions.push(entry);
			},
		}
		Ok(())
	}

	fn code_target(&mut self, line: &mut Line) -> Result<TargetInfoCode> {
		let word = line.next_word()?;
		Ok(match word.as_str() {
			"local" | "resource" => {
				let table = line.braced_list(|line| {
					let start = self.next_label(line)?;
					let end = self.next_label(line)?;
					let index = LvIndex { index: number(line)? };
					Ok((LabelRange { start, end }, index))
				})?;
				if word == "local" {
					TargetInfoCode::LocalVariable { table }
				} else {
					TargetInfoCode::ResourceVariable { table }
				}
			},
			"catch" => TargetInfoCode::ExceptionParameter { index: number(line)? },
			"instanceof" => TargetInfoCode::InstanceOf(self.next_label(line)?),
			"new" => TargetInfoCode::New(self.next_label(line)?),
			"constructorref" => TargetInfoCode::ConstructorReference(self.next_label(line)?),
			"methodref" => TargetInfoCode::MethodReference(self.next_label(line)?),
			"cast" => TargetInfoCode::Cast { label: self.next_label(line)?, index: number(line)? },
			"constructorcall" => TargetInfoCode::ConstructorInvocationTypeArgument { label: self.next_label(line)?, index: number(line)? },
			"methodcall" => TargetInfoCode::MethodInvocationTypeArgument { label: self.next_label(line)?, index: number(line)? },
			"constructorreftype" => TargetInfoCode::ConstructorReferenceTypeArgument { label: self.next_label(line)?, index: number(line)? },
			"methodreftype" => TargetInfoCode::MethodReferenceTypeArgument { label: self.next_label(line)?, index: number(line)? },
			_ => bail!("unknown type annotation target {word:?}"),
		})
	}

	/// Takes the labels bound since the last instruction. The first one is returned, the others become its aliases.
	fn take_pending(&mut self) -> Option<Label> {
		let pending = std::mem::take(&mut self.pending);
		let (&first, rest) = pending.split_first()?;
		for &alias in rest {
			self.aliases.insert(alias, first);
		}
		Some(first)
	}

	fn finish(mut self) -> Result<Code> {
		self.code.last_label = self.take_pending();

		for name in &self.names {
			if !self.bound.contains(&self.labels[name]) {
				return Err(anyhow::Error::new(TranslationError::UnresolvedLabel { label: name.clone() }));
			}
		}

		let aliases = &self.aliases;
		let rename = |label: &mut Label| {
			if let Some(&to) = aliases.get(label) {
				*label = to;
			}
		};
		for entry in &mut self.code.instructions {
			entry.instruction.for_each_label_mut(rename);
		}
		for exception in &mut self.code.exception_table {
			rename(&mut exception.start);
			rename(&mut exception.end);
			rename(&mut exception.handler);
		}
		for (label, _) in &mut self.code.line_numbers {
			rename(label);
		}
		for lv in &mut self.code.local_variables {
			rename(&mut lv.range.start);
			rename(&mut lv.range.end);
		}
		let exceptions = self.code.exception_table.len();
		let type_annotations = &mut self.code.type_annotations;
		for annotation in type_annotations.visible.iter_mut().chain(&mut type_annotations.invisible) {
			if let TargetInfoCode::ExceptionParameter { index } = annotation.type_reference {
				if index as usize >= exceptions {
					bail!("type annotation on exception parameter {index}, but there are only {exceptions} TRYCATCHBLOCK lines");
				}
			}
			annotation.type_reference.for_each_label_mut(rename);
		}

		self.code.canonicalize_labels()?;
		Ok(self.code)
	}
}

/// The instructions without operands.
fn simple_instruction(mnemonic: &str) -> Option<Instruction> {
	Some(match mnemonic {
		"NOP" => Instruction::Nop,
		"ACONST_NULL" => Instruction::AConstNull,
		"ICONST_M1" => Instruction::IConstM1,
		"ICONST_0" => Instruction::IConst0,
		"ICONST_1" => Instruction::IConst1,
		"ICONST_2" => Instruction::IConst2,
		"ICONST_3" => Instruction::IConst3,
		"ICONST_4" => Instruction::IConst4,
		"ICONST_5" => Instruction::IConst5,
		"LCONST_0" => Instruction::LConst0,
		"LCONST_1" => Instruction::LConst1,
		"FCONST_0" => Instruction::FConst0,
		"FCONST_1" => Instruction::FConst1,
		"FCONST_2" => Instruction::FConst2,
		"DCONST_0" => Instruction::DConst0,
		"DCONST_1" => Instruction::DConst1,
		"IALOAD" => Instruction::IALoad,
		"LALOAD" => Instruction::LALoad,
		"FALOAD" => Instruction::FALoad,
		"DALOAD" => Instruction::DALoad,
		"AALOAD" => Instruction::AALoad,
		"BALOAD" => Instruction::BALoad,
		"CALOAD" => Instruction::CALoad,
		"SALOAD" => Instruction::SALoad,
		"IASTORE" => Instruction::IAStore,
		"LASTORE" => Instruction::LAStore,
		"FASTORE" => Instruction::FAStore,
		"DASTORE" => Instruction::DAStore,
		"AASTORE" => Instruction::AAStore,
		"BASTORE" => Instruction::BAStore,
		"CASTORE" => Instruction::CAStore,
		"SASTORE" => Instruction::SAStore,
		"POP" => Instruction::Pop,
		"POP2" => Instruction::Pop2,
		"DUP" => Instruction::Dup,
		"DUP_X1" => Instruction::DupX1,
		"DUP_X2" => Instruction::DupX2,
		"DUP2" => Instruction::Dup2,
		"DUP2_X1" => Instruction::Dup2X1,
		"DUP2_X2" => Instruction::Dup2X2,
		"SWAP" => Instruction::Swap,
		"IADD" => Instruction::IAdd,
		"LADD" => Instruction::LAdd,
		"FADD" => Instruction::FAdd,
		"DADD" => Instruction::DAdd,
		"ISUB" => Instruction::ISub,
		"LSUB" => Instruction::LSub,
		"FSUB" => Instruction::FSub,
		"DSUB" => Instruction::DSub,
		"IMUL" => Instruction::IMul,
		"LMUL" => Instruction::LMul,
		"FMUL" => Instruction::FMul,
		"DMUL" => Instruction::DMul,
		"IDIV" => Instruction::IDiv,
		"LDIV" => Instruction::LDiv,
		"FDIV" => Instruction::FDiv,
		"DDIV" => Instruction::DDiv,
		"IREM" => Instruction::IRem,
		"LREM" => Instruction::LRem,
		"FREM" => Instruction::FRem,
		"DREM" => Instruction::DRem,
		"INEG" => Instruction::INeg,
		"LNEG" => Instruction::LNeg,
		"FNEG" => Instruction::FNeg,
		"DNEG" => Instruction::DNeg,
		"ISHL" => Instruction::IShl,
		"LSHL" => Instruction::LShl,
		"ISHR" => Instruction::IShr,
		"LSHR" => Instruction::LShr,
		"IUSHR" => Instruction::IUShr,
		"LUSHR" => Instruction::LUShr,
		"IAND" => Instruction::IAnd,
		"LAND" => Instruction::LAnd,
		"IOR" => Instruction::IOr,
		"LOR" => Instruction::LOr,
		"IXOR" => Instruction::IXor,
		"LXOR" => Instruction::LXor,
		"I2L" => Instruction::I2L,
		"I2F" => Instruction::I2F,
		"I2D" => Instruction::I2D,
		"L2I" => Instruction::L2I,
		"L2F" => Instruction::L2F,
		"L2D" => Instruction::L2D,
		"F2I" => Instruction::F2I,
		"F2L" => Instruction::F2L,
		"F2D" => Instruction::F2D,
		"D2I" => Instruction::D2I,
		"D2L" => Instruction::D2L,
		"D2F" => Instruction::D2F,
		"I2B" => Instruction::I2B,
		"I2C" => Instruction::I2C,
		"I2S" => Instruction::I2S,
		"LCMP" => Instruction::LCmp,
		"FCMPL" => Instruction::FCmpL,
		"FCMPG" => Instruction::FCmpG,
		"DCMPL" => Instruction::DCmpL,
		"DCMPG" => Instruction::DCmpG,
		"IRETURN" => Instruction::IReturn,
		"LRETURN" => Instruction::LReturn,
		"FRETURN" => Instruction::FReturn,
		"DRETURN" => Instruction::DReturn,
		"ARETURN" => Instruction::AReturn,
		"RETURN" => Instruction::Return,
		"ARRAYLENGTH" => Instruction::ArrayLength,
		"ATHROW" => Instruction::AThrow,
		"MONITORENTER" => Instruction::MonitorEnter,
		"MONITOREXIT" => Instruction::MonitorExit,
		_ => return None,
	})
}

/// The instructions with operands. The wide forms are accepted and mean the same as the short ones.
const OPERAND_MNEMONICS: &[&str] = &[
	"BIPUSH", "SIPUSH", "LDC", "LDC_W", "LDC2_W",
	"ILOAD", "LLOAD", "FLOAD", "DLOAD", "ALOAD", "ISTORE", "LSTORE", "FSTORE", "DSTORE", "ASTORE", "IINC", "RET",
	"IFEQ", "IFNE", "IFLT", "IFGE", "IFGT", "IFLE",
	"IF_ICMPEQ", "IF_ICMPNE", "IF_ICMPLT", "IF_ICMPGE", "IF_ICMPGT", "IF_ICMPLE", "IF_ACMPEQ", "IF_ACMPNE",
	"IFNULL", "IFNONNULL", "GOTO", "GOTO_W", "JSR", "JSR_W", "TABLESWITCH", "LOOKUPSWITCH",
	"GETSTATIC", "PUTSTATIC", "GETFIELD", "PUTFIELD",
	"INVOKEVIRTUAL", "INVOKESPECIAL", "INVOKESTATIC", "INVOKEINTERFACE", "INVOKEDYNAMIC",
	"NEW", "NEWARRAY", "ANEWARRAY", "CHECKCAST", "INSTANCEOF", "MULTIANEWARRAY",
];

fn instruction(line: &mut Line, builder: &mut CodeBuilder) -> Result<Instruction> {
	let mnemonic = line.next_parsed(|s| {
		let mnemonic = s.to_ascii_uppercase();
		if simple_instruction(&mnemonic).is_none() && !OPERAND_MNEMONICS.contains(&mnemonic.as_str()) {
			bail!("unknown instruction {s:?}");
		}
		Ok(mnemonic)
	})?;
	if let Some(instruction) = simple_instruction(&mnemonic) {
		return Ok(instruction);
	}

	let lv = |line: &mut Line| -> Result<LvIndex> { Ok(LvIndex { index: number(line)? }) };

	Ok(match mnemonic.as_str() {
		"BIPUSH" => Instruction::BiPush(number(line)?),
		"SIPUSH" => Instruction::SiPush(number(line)?),
		"LDC" | "LDC_W" | "LDC2_W" => Instruction::Ldc(loadable(line)?),
		"ILOAD" => Instruction::ILoad(lv(line)?),
		"LLOAD" => Instruction::LLoad(lv(line)?),
		"FLOAD" => Instruction::FLoad(lv(line)?),
		"DLOAD" => Instruction::DLoad(lv(line)?),
		"ALOAD" => Instruction::ALoad(lv(line)?),
		"ISTORE" => Instruction::IStore(lv(line)?),
		"LSTORE" => Instruction::LStore(lv(line)?),
		"FSTORE" => Instruction::FStore(lv(line)?),
		"DSTORE" => Instruction::DStore(lv(line)?),
		"ASTORE" => Instruction::AStore(lv(line)?),
		"IINC" => Instruction::IInc(lv(line)?, number(line)?),
		"RET" => Instruction::Ret(lv(line)?),
		"IFEQ" => Instruction::IfEq(builder.next_label(line)?),
		"IFNE" => Instruction::IfNe(builder.next_label(line)?),
		"IFLT" => Instruction::IfLt(builder.next_label(line)?),
		"IFGE" => Instruction::IfGe(builder.next_label(line)?),
		"IFGT" => Instruction::IfGt(builder.next_label(line)?),
		"IFLE" => Instruction::IfLe(builder.next_label(line)?),
		"IF_ICMPEQ" => Instruction::IfICmpEq(builder.next_label(line)?),
		"IF_ICMPNE" => Instruction::IfICmpNe(builder.next_label(line)?),
		"IF_ICMPLT" => Instruction::IfICmpLt(builder.next_label(line)?),
		"IF_ICMPGE" => Instruction::IfICmpGe(builder.next_label(line)?),
		"IF_ICMPGT" => Instruction::IfICmpGt(builder.next_label(line)?),
		"IF_ICMPLE" => Instruction::IfICmpLe(builder.next_label(line)?),
		"IF_ACMPEQ" => Instruction::IfACmpEq(builder.next_label(line)?),
		"IF_ACMPNE" => Instruction::IfACmpNe(builder.next_label(line)?),
		"IFNULL" => Instruction::IfNull(builder.next_label(line)?),
		"IFNONNULL" => Instruction::IfNonNull(builder.next_label(line)?),
		"GOTO" | "GOTO_W" => Instruction::Goto(builder.next_label(line)?),
		"JSR" | "JSR_W" => Instruction::Jsr(builder.next_label(line)?),
		"TABLESWITCH" => {
			let low: i32 = number(line)?;
			let table = line.braced_list(|line| builder.next_label(line))?;
			line.expect_word("default")?;
			let default = builder.next_label(line)?;
			let high = i32::try_from(low as i64 + table.len() as i64 - 1)
				.with_context(|| anyhow!("tableswitch starting at {low} with {} targets is too large", table.len()))?;
			Instruction::TableSwitch { default, low, high, table }
		},
		"LOOKUPSWITCH" => {
			let pairs = line.braced_list(|line| {
				let key: i32 = number(line)?;
				line.expect_punct(':')?;
				Ok((key, builder.next_label(line)?))
			})?;
			line.expect_word("default")?;
			let default = builder.next_label(line)?;
			Instruction::LookupSwitch { default, pairs }
		},
		"GETSTATIC" => Instruction::GetStatic(field_ref(line)?),
		"PUTSTATIC" => Instruction::PutStatic(field_ref(line)?),
		"GETFIELD" => Instruction::GetField(field_ref(line)?),
		"PUTFIELD" => Instruction::PutField(field_ref(line)?),
		"INVOKEVIRTUAL" => Instruction::InvokeVirtual(method_ref(line)?),
		"INVOKESPECIAL" => Instruction::InvokeSpecial(method_ref(line)?, line.eat_word("itf")),
		"INVOKESTATIC" => Instruction::InvokeStatic(method_ref(line)?, line.eat_word("itf")),
		"INVOKEINTERFACE" => Instruction::InvokeInterface(method_ref(line)?),
		"INVOKEDYNAMIC" => {
			let name = line.next_name(|s| MethodName::try_from(s))?;
			let descriptor = line.next_name(|s| MethodDescriptor::try_from(s))?;
			let handle = handle(line)?;
			let arguments = arguments(line)?;
			Instruction::InvokeDynamic(InvokeDynamic { name, descriptor, handle, arguments })
		},
		"NEW" => Instruction::New(class_name(line)?),
		"NEWARRAY" => Instruction::NewArray(line.next_parsed(|s| {
			ArrayType::from_keyword(s).with_context(|| anyhow!("unknown array type {s:?}"))
		})?),
		"ANEWARRAY" => Instruction::ANewArray(class_name(line)?),
		"CHECKCAST" => Instruction::CheckCast(class_name(line)?),
		"INSTANCEOF" => Instruction::InstanceOf(class_name(line)?),
		"MULTIANEWARRAY" => Instruction::MultiANewArray(class_name(line)?, number(line)?),
		_ => bail!("unknown instruction {mnemonic:?}"),
	})
}

#[cfg(test)]
mod testing {
	use anyhow::{Context, Result};
	use pretty_assertions::assert_eq;
	use crate::error::TranslationError;
	use crate::text::parser::{literal, parse, Literal};
	use crate::tree::annotation::{ElementValue, Object};
	use crate::tree::field::ConstantValue;
	use crate::tree::method::code::{Instruction, Label};
	use crate::tree::version::Version;

	#[test]
	fn literals() -> Result<()> {
		assert_eq!(literal("12")?, Literal::Integer(12));
		assert_eq!(literal("-12L")?, Literal::Long(-12));
		assert_eq!(literal("1.5")?, Literal::Double(1.5));
		assert_eq!(literal("1e3")?, Literal::Double(1000.0));
		assert_eq!(literal("2f")?, Literal::Float(2.0));
		assert_eq!(literal("-InfinityD")?, Literal::Double(f64::NEG_INFINITY));
		assert!(matches!(literal("NaNF")?, Literal::Float(x) if x.is_nan()));
		assert!(matches!(literal("NaN(0x7f800001)F")?, Literal::Float(x) if x.to_bits() == 0x7f800001));
		assert!(matches!(literal("NaN(0xfff8000000000123)D")?, Literal::Double(x) if x.to_bits() == 0xfff8000000000123));
		assert!(literal("NaN(0x3f800000)F").is_err());
		assert!(literal("NaN(0x7f800001)").is_err());
		assert!(literal("NaN(0x7f800001)L").is_err());
		assert!(literal("NaN").is_err());
		assert!(literal("2147483648").is_err());
		Ok(())
	}

	#[test]
	fn minimal_class() -> Result<()> {
		let class = parse("public super class a/B extends java/lang/Object {\n}\n")?;
		assert_eq!(class.version, Version::V1_8);
		assert!(class.access.is_public && class.access.is_super);
		assert_eq!(class.name, "a/B");
		assert_eq!(class.super_class.as_ref().map(|x| x.as_str()), Some("java/lang/Object"));
		assert!(class.fields.is_empty() && class.methods.is_empty());
		Ok(())
	}

	#[test]
	fn members_and_prefixes() -> Result<()> {
		let text = r#"version 49 0
class A {
	signature "TT;"
	@LAnno; { value = array { 1, byte -2, enum LE; X, "s" } }
	private static final I COUNT = 7
	synthetic
	public volatile 0x8000 J time

	abstract run()V throws java/lang/Exception
}
"#;
		let class = parse(text)?;
		assert_eq!(class.version, Version::V1_5);
		assert_eq!(class.fields.len(), 2);

		let count = &class.fields[0];
		assert!(count.access.is_private && count.access.is_static && count.access.is_final);
		assert_eq!(count.constant_value, Some(ConstantValue::Integer(7)));
		assert_eq!(count.signature.as_deref(), Some("TT;"));
		let pair = &count.annotations.visible[0].element_value_pairs[0];
		assert_eq!(pair.name, "value");
		assert_eq!(pair.value, ElementValue::ArrayType(vec![
			ElementValue::Object(Object::Integer(1)),
			ElementValue::Object(Object::Byte(-2)),
			ElementValue::Enum { type_name: "LE;".try_into()?, const_name: "X".to_owned() },
			ElementValue::Object(Object::String("s".into())),
		]));

		let time = &class.fields[1];
		assert!(time.has_synthetic_attribute);
		assert!(time.access.is_volatile);
		assert_eq!(time.access.other, 0x8000);

		let run = &class.methods[0];
		assert!(run.access.is_abstract);
		assert_eq!(run.exceptions.len(), 1);
		assert!(run.code.is_none());
		Ok(())
	}

	#[test]
	fn quoted_names() -> Result<()> {
		let text = r#"class "a b/C" implements "x y/I" {
	"La b/D;" "my field"
	"La(b;" "(x"
	@ "La b/Anno;" { "the value" = enum "La b/E;" "A B" }
	static "my test" ()V throws "a b/Ex" {
			return
	}
}
"#;
		let class = parse(text)?;
		assert_eq!(class.name, "a b/C");
		assert_eq!(class.interfaces[0], "x y/I");
		assert_eq!(class.fields.len(), 2);
		assert_eq!(class.fields[0].descriptor, "La b/D;");
		assert_eq!(class.fields[0].name, "my field");
		assert_eq!(class.fields[1].name, "(x");

		let method = &class.methods[0];
		assert_eq!(method.name, "my test");
		assert_eq!(method.exceptions[0], "a b/Ex");
		let annotation = &method.annotations.visible[0];
		assert_eq!(annotation.annotation_type, "La b/Anno;");
		assert_eq!(annotation.element_value_pairs[0].name, "the value");
		assert_eq!(annotation.element_value_pairs[0].value, ElementValue::Enum {
			type_name: "La b/E;".try_into()?,
			const_name: "A B".to_owned(),
		});
		Ok(())
	}

	#[test]
	fn labels_are_canonical() -> Result<()> {
		let text = "class A {
	static f(I)I {
		L7
		L3
			iload 0
			ifeq L9
			iconst_1
			ireturn
		L9
			LINENUMBER 4 L9
			iconst_0
			ireturn
		L100
		LOCALVARIABLE x I L3 L100 0
	}
}";
		let class = parse(text)?;
		let code = class.methods[0].code.as_ref().context("method has no code")?;
		assert_eq!(code.instructions[0].label, Some(Label::new(0)));
		assert_eq!(code.instructions[1].instruction, Instruction::IfEq(Label::new(1)));
		assert_eq!(code.instructions[4].label, Some(Label::new(1)));
		assert_eq!(code.last_label, Some(Label::new(2)));
		assert_eq!(code.line_numbers, vec![(Label::new(1), 4)]);
		assert_eq!(code.local_variables[0].range.start, Label::new(0));
		Ok(())
	}

	#[test]
	fn unresolved_label() {
		let text = "class A {\n\tf()V {\n\t\tgoto L5\n\t}\n}\n";
		let e = parse(text).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::UnresolvedLabel { label: "L5".to_owned() }));
	}

	#[test]
	fn parameter_annotations_need_a_count() {
		let cases = [
			"class A {\n\tparam 0 @LT; { }\n\tf()V\n}\n",
			"class A {\n\tparams 1\n\tparam 1 @LT; { }\n\tf()V\n}\n",
			"class A {\n\tparams 1\n\tinvisible param 0 @LT; { }\n\tf()V\n}\n",
		];
		for text in cases {
			let e = parse(text).unwrap_err();
			assert!(matches!(TranslationError::of(&e), Some(TranslationError::Syntax { line: 2 | 3, .. })), "{text:?}: {e:#}");
		}
	}

	#[test]
	fn syntax_errors() {
		let cases = [
			("class A {\n\tf()V {\n\t\tFROB 1\n\t}\n}\n", 3, 3),
			("class A {\n\tI x = 1.5\n}\n", 2, 8),
			("class A {\n\tf()V {\n\t\tbipush 300\n\t}\n}\n", 3, 10),
			("class A {\n", 2, 1),
			("class A {\n\tdeprecated\n}\n", 2, 1),
			("class A {\n}\n}\n", 3, 1),
			("class A {\n\tdefault 1\n\tI x\n}\n", 2, 1),
			("class A {\n\trecord {\n\t\tparameters { }\n\t\tI x\n\t}\n}\n", 3, 1),
			("class A {\n\tI x\n\ttype return @LT; { }\n\tI y\n}\n", 3, 1),
			("type field @LT; { }\nclass A {\n}\n", 1, 1),
			("class A {\n\trecord {\n\t\tsynthetic\n\t\tI x\n\t}\n}\n", 3, 1),
			("class A {\n\tf()V {\n\t\t\treturn\n\t\tTYPEANNOTATION catch 0 @LT; { }\n\t}\n}\n", 5, 1),
		];
		for (text, line, column) in cases {
			let e = parse(text).unwrap_err();
			assert_eq!(TranslationError::of(&e), Some(&TranslationError::Syntax { line, column }), "{text:?}: {e:#}");
		}
	}
}
