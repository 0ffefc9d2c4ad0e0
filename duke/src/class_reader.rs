use std::collections::HashSet;
use std::io::Cursor;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, trace};
use crate::class_constants::{attribute, element_value, opcode, type_annotation};
use crate::class_reader::labels::Labels;
use crate::class_reader::pool::{BootstrapMethodRead, PoolRead};
use crate::{class_constants, ClassRead, OptionExpansion};
use crate::error::{OrTranslationError, TranslationError};
use crate::tree::annotation::{Annotation, ElementValue, ElementValuePair, Object};
use crate::tree::attribute::Attribute;
use crate::tree::class::{ClassAccess, ClassFile, EnclosingMethod, InnerClass};
use crate::tree::descriptor::is_valid_return_descriptor;
use crate::tree::field::{Field, FieldAccess, FieldDescriptor, FieldName};
use crate::tree::method::{Method, MethodAccess, MethodDescriptor, MethodName, MethodNameAndDesc, MethodParameter, ParameterFlags};
use crate::tree::method::code::{ArrayType, Code, Exception, Instruction, InstructionListEntry, LabelRange, Lv, LvIndex};
use crate::tree::record::{RecordComponent, RecordName};
use crate::tree::type_annotation::{TargetInfoClass, TargetInfoCode, TargetInfoField, TargetInfoMethod, TypeAnnotation, TypeAnnotations, TypePath, TypePathKind};
use crate::tree::version::Version;

pub(crate) mod pool;
mod labels;

/// How deep annotations may be nested inside of each other.
const MAX_ANNOTATION_DEPTH: usize = 64;

/// Skips the `attributes_count` and `attributes` items of the structs.
///
/// This is needed whenever we skip reading something, like a field or method.
fn skip_attributes(reader: &mut impl ClassRead) -> Result<()> {
	let attributes_count = reader.read_u16()?;

	for _ in 0..attributes_count {
		let _attribute_name_index = reader.read_u16()?;
		let attribute_length = reader.read_u32()?;

		// Skip the attribute data
		reader.skip(attribute_length as i64)?;
	}

	Ok(())
}

/// Reads the contents of an attribute with `f`, checking that exactly `length` bytes are used.
fn read_attribute<R: ClassRead, T>(reader: &mut R, name: &str, length: u32, f: impl FnOnce(&mut R) -> Result<T>) -> Result<T> {
	let start = reader.marker()?;
	let value = f(reader).with_context(|| anyhow!("failed to read {name:?} attribute"))?;
	let read = reader.marker()? - start;
	if read != length as u64 {
		bail!("{name:?} attribute has a length of {length} bytes, but its contents take up {read} bytes");
	}
	Ok(value)
}

fn read_unknown_attribute(reader: &mut impl ClassRead, name: String, length: u32) -> Result<Attribute> {
	let bytes = reader.read_u8_vec(length as usize)
		.with_context(|| anyhow!("failed to read contents of attribute {name:?}"))?;
	trace!("keeping unknown attribute {name:?} of {length} bytes");
	Ok(Attribute::new(name, bytes))
}

/// Reads a class file from a reader.
pub(crate) fn read(reader: &mut impl ClassRead) -> Result<ClassFile> {
	let class_start = reader.marker()?;

	let magic = reader.read_u32()?;
	if magic != class_constants::MAGIC {
		bail!("wrong magic: got {magic:#x}, expected 0xCAFEBABE");
	}

	let minor = reader.read_u16()?;
	let major = reader.read_u16()?;
	let version = Version::new(major, minor);

	if major > Version::LATEST.major || major < 45 {
		bail!("unsupported class file version: {version}");
	}

	let pool = &PoolRead::read(reader)?;

	let access = ClassAccess::from(reader.read_u16()?);
	let this_class = pool.get_class(reader.read_u16()?)?;
	let super_class = pool.get_optional(reader.read_u16()?, PoolRead::get_class)?;
	let interfaces = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| pool.get_class(r.read_u16()?)
	)?;

	debug!("reading class {this_class} of version {version}");

	// We take a reference to the start of the fields and methods items so that we can read them after we've read the
	// attributes of the class itself.
	let fields_start = reader.marker()?;

	// We skip the fields.
	for _ in 0..reader.read_u16()? {
		// Per field we skip 2 bytes for the access flags, another 2 for the name, and another 2 for the descriptor.
		reader.skip(2 + 2 + 2)?;

		skip_attributes(reader)?;
	}
	// Methods have the same structure as fields.
	for _ in 0..reader.read_u16()? {
		reader.skip(2 + 2 + 2)?;

		skip_attributes(reader)?;
	}

	let mut class = ClassFile::new(version, access, this_class, super_class, interfaces);

	// The BootstrapMethods attribute must be parsed fully before any attempt at loading a loadable constant pool entry.
	// The attribute is used in the arguments for the bootstrap methods, and the ldc and invokedynamic instructions.
	// This means that we need to first read the class attributes and then the fields and methods.
	let mut bootstrap_methods = None;

	let mut inner_classes = None;
	let mut enclosing_method = None;
	let mut signature = None;
	let mut source_file = None;
	let mut nest_host_class = None;
	let mut nest_members = None;
	let mut record_components = None;
	let mut visible_annotations = None;
	let mut invisible_annotations = None;
	let mut visible_type_annotations = None;
	let mut invisible_type_annotations = None;

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::DEPRECATED => {
				read_attribute(reader, attribute::DEPRECATED, length, |_| Ok(()))?;
				class.has_deprecated_attribute = true;
			},
			attribute::SYNTHETIC => {
				read_attribute(reader, attribute::SYNTHETIC, length, |_| Ok(()))?;
				class.has_synthetic_attribute = true;
			},
			attribute::INNER_CLASSES => {
				let value = read_attribute(reader, attribute::INNER_CLASSES, length, |r| r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| Ok(InnerClass {
						inner_class: pool.get_class(r.read_u16()?)?,
						outer_class: pool.get_optional(r.read_u16()?, PoolRead::get_class)?,
						inner_name: pool.get_optional(r.read_u16()?, PoolRead::get_utf8)?,
						flags: r.read_u16()?.into(),
					})
				))?;
				inner_classes.insert_if_empty(value).context("only one InnerClasses attribute is allowed")?;
			},
			attribute::ENCLOSING_METHOD => {
				let value = read_attribute(reader, attribute::ENCLOSING_METHOD, length, |r| {
					let class = pool.get_class(r.read_u16()?)?;
					let method = pool.get_optional(r.read_u16()?, |pool, index| {
						let (name, desc) = pool.get_name_and_type::<MethodName, MethodDescriptor>(index)?;
						Ok(MethodNameAndDesc { name, desc })
					})?;
					Ok(EnclosingMethod { class, method })
				})?;
				enclosing_method.insert_if_empty(value).context("only one EnclosingMethod attribute is allowed")?;
			},
			attribute::SIGNATURE => {
				let value = read_attribute(reader, attribute::SIGNATURE, length, |r| pool.get_utf8(r.read_u16()?))?;
				signature.insert_if_empty(value).context("only one Signature attribute is allowed")?;
			},
			attribute::SOURCE_FILE => {
				let value = read_attribute(reader, attribute::SOURCE_FILE, length, |r| pool.get_utf8(r.read_u16()?))?;
				source_file.insert_if_empty(value).context("only one SourceFile attribute is allowed")?;
			},
			attribute::NEST_HOST => {
				let value = read_attribute(reader, attribute::NEST_HOST, length, |r| pool.get_class(r.read_u16()?))?;
				nest_host_class.insert_if_empty(value).context("only one NestHost attribute is allowed")?;
			},
			attribute::NEST_MEMBERS => {
				let value = read_attribute(reader, attribute::NEST_MEMBERS, length, |r| r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| pool.get_class(r.read_u16()?)
				))?;
				nest_members.insert_if_empty(value).context("only one NestMembers attribute is allowed")?;
			},
			attribute::RECORD => {
				let value = read_attribute(reader, attribute::RECORD, length, |r| r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| read_record_component(r, pool),
				))?;
				record_components.insert_if_empty(value).context("only one Record attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_class))?;
				visible_type_annotations.insert_if_empty(value).context("only one RuntimeVisibleTypeAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_class))?;
				invisible_type_annotations.insert_if_empty(value).context("only one RuntimeInvisibleTypeAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				visible_annotations.insert_if_empty(value).context("only one RuntimeVisibleAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				invisible_annotations.insert_if_empty(value).context("only one RuntimeInvisibleAnnotations attribute is allowed")?;
			},
			attribute::BOOTSTRAP_METHODS => {
				let methods = read_attribute(reader, attribute::BOOTSTRAP_METHODS, length, |r| r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| Ok(BootstrapMethodRead {
						handle: pool.get_method_handle(r.read_u16()?)?,
						arguments: r.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?,
					})
				))?;
				bootstrap_methods.insert_if_empty(methods).context("only one BootstrapMethods attribute is allowed")?;
			},
			_ => {
				let attribute = read_unknown_attribute(reader, attribute_name, length)?;
				class.attributes.push(attribute);
			},
		}
	}

	class.inner_classes = inner_classes.unwrap_or_default();
	class.enclosing_method = enclosing_method;
	class.signature = signature;
	class.source_file = source_file;
	class.nest_host_class = nest_host_class;
	class.nest_members = nest_members.unwrap_or_default();
	class.record_components = record_components;
	class.annotations.visible = visible_annotations.unwrap_or_default();
	class.annotations.invisible = invisible_annotations.unwrap_or_default();
	class.type_annotations.visible = visible_type_annotations.unwrap_or_default();
	class.type_annotations.invisible = invisible_type_annotations.unwrap_or_default();

	// Read the fields and methods. We jump back to the end of the class file afterwards.
	reader.with_pos(fields_start, |reader| {
		let fields_count = reader.read_u16()?;
		for _ in 0..fields_count {
			let field = read_field(reader, pool)
				.with_context(|| anyhow!("failed to read field of class {}", class.name))?;
			class.fields.push(field);
		}

		let methods_count = reader.read_u16()?;
		for _ in 0..methods_count {
			let method = read_method(reader, pool, &bootstrap_methods, class_start)
				.with_context(|| anyhow!("failed to read method of class {}", class.name))?;
			class.methods.push(method);
		}

		Ok(())
	})?;

	Ok(class)
}

fn read_field(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<Field> {
	let access = FieldAccess::from(reader.read_u16()?);
	let name = FieldName::try_from(pool.get_utf8(reader.read_u16()?)?)?;
	let descriptor = FieldDescriptor::try_from(pool.get_utf8(reader.read_u16()?)?)?;

	let mut field = Field::new(access, name, descriptor);

	let mut constant_value = None;
	let mut signature = None;
	let mut visible_annotations = None;
	let mut invisible_annotations = None;
	let mut visible_type_annotations = None;
	let mut invisible_type_annotations = None;

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::DEPRECATED => {
				read_attribute(reader, attribute::DEPRECATED, length, |_| Ok(()))?;
				field.has_deprecated_attribute = true;
			},
			attribute::SYNTHETIC => {
				read_attribute(reader, attribute::SYNTHETIC, length, |_| Ok(()))?;
				field.has_synthetic_attribute = true;
			},
			attribute::CONSTANT_VALUE => {
				let value = read_attribute(reader, attribute::CONSTANT_VALUE, length, |r| pool.get_constant_value(r.read_u16()?))?;
				if !value.fits(&field.descriptor) {
					bail!("constant value {value:?} doesn't fit field {} of type {}", field.name, field.descriptor);
				}
				constant_value.insert_if_empty(value).context("only one ConstantValue attribute is allowed")?;
			},
			attribute::SIGNATURE => {
				let value = read_attribute(reader, attribute::SIGNATURE, length, |r| pool.get_utf8(r.read_u16()?))?;
				signature.insert_if_empty(value).context("only one Signature attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				visible_annotations.insert_if_empty(value).context("only one RuntimeVisibleAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				invisible_annotations.insert_if_empty(value).context("only one RuntimeInvisibleAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_field))?;
				visible_type_annotations.insert_if_empty(value).context("only one RuntimeVisibleTypeAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_field))?;
				invisible_type_annotations.insert_if_empty(value).context("only one RuntimeInvisibleTypeAnnotations attribute is allowed")?;
			},
			_ => {
				let attribute = read_unknown_attribute(reader, attribute_name, length)?;
				field.attributes.push(attribute);
			},
		}
	}

	field.constant_value = constant_value;
	field.signature = signature;
	field.annotations.visible = visible_annotations.unwrap_or_default();
	field.annotations.invisible = invisible_annotations.unwrap_or_default();
	field.type_annotations.visible = visible_type_annotations.unwrap_or_default();
	field.type_annotations.invisible = invisible_type_annotations.unwrap_or_default();

	Ok(field)
}

fn read_method(
	reader: &mut impl ClassRead,
	pool: &PoolRead,
	bootstrap_methods: &Option<Vec<BootstrapMethodRead>>,
	class_start: u64,
) -> Result<Method> {
	let access = MethodAccess::from(reader.read_u16()?);
	let name = MethodName::try_from(pool.get_utf8(reader.read_u16()?)?)?;
	let descriptor = MethodDescriptor::try_from(pool.get_utf8(reader.read_u16()?)?)?;

	trace!("reading method {name}{descriptor}");

	let mut method = Method::new(access, name, descriptor);

	let mut code = None;
	let mut exceptions = None;
	let mut signature = None;
	let mut visible_annotations = None;
	let mut invisible_annotations = None;
	let mut visible_type_annotations = None;
	let mut invisible_type_annotations = None;
	let mut visible_parameter_annotations = None;
	let mut invisible_parameter_annotations = None;
	let mut annotation_default = None;
	let mut parameters = None;

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::DEPRECATED => {
				read_attribute(reader, attribute::DEPRECATED, length, |_| Ok(()))?;
				method.has_deprecated_attribute = true;
			},
			attribute::SYNTHETIC => {
				read_attribute(reader, attribute::SYNTHETIC, length, |_| Ok(()))?;
				method.has_synthetic_attribute = true;
			},
			attribute::CODE => {
				let value = read_attribute(reader, attribute::CODE, length, |r| read_code(r, pool, bootstrap_methods, class_start))
					.with_context(|| anyhow!("failed to read code of method {}{}", method.name, method.descriptor))?;
				code.insert_if_empty(value).context("only one Code attribute is allowed")?;
			},
			attribute::EXCEPTIONS => {
				let value = read_attribute(reader, attribute::EXCEPTIONS, length, |r| r.read_vec(
					|r| r.read_u16_as_usize(),
					|r| pool.get_class(r.read_u16()?)
				))?;
				exceptions.insert_if_empty(value).context("only one Exceptions attribute is allowed")?;
			},
			attribute::SIGNATURE => {
				let value = read_attribute(reader, attribute::SIGNATURE, length, |r| pool.get_utf8(r.read_u16()?))?;
				signature.insert_if_empty(value).context("only one Signature attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				visible_annotations.insert_if_empty(value).context("only one RuntimeVisibleAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				invisible_annotations.insert_if_empty(value).context("only one RuntimeInvisibleAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_method))?;
				visible_type_annotations.insert_if_empty(value).context("only one RuntimeVisibleTypeAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_method))?;
				invisible_type_annotations.insert_if_empty(value).context("only one RuntimeInvisibleTypeAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS, length, |r| read_parameter_annotations_attribute(r, pool))?;
				visible_parameter_annotations.insert_if_empty(value).context("only one RuntimeVisibleParameterAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS, length, |r| read_parameter_annotations_attribute(r, pool))?;
				invisible_parameter_annotations.insert_if_empty(value).context("only one RuntimeInvisibleParameterAnnotations attribute is allowed")?;
			},
			attribute::ANNOTATION_DEFAULT => {
				let value = read_attribute(reader, attribute::ANNOTATION_DEFAULT, length, |r| read_element_value(r, pool, 0))?;
				annotation_default.insert_if_empty(value).context("only one AnnotationDefault attribute is allowed")?;
			},
			attribute::METHOD_PARAMETERS => {
				let value = read_attribute(reader, attribute::METHOD_PARAMETERS, length, |r| r.read_vec(
					|r| r.read_u8_as_usize(),
					|r| Ok(MethodParameter {
						name: pool.get_optional(r.read_u16()?, PoolRead::get_utf8)?,
						flags: ParameterFlags::from(r.read_u16()?),
					})
				))?;
				parameters.insert_if_empty(value).context("only one MethodParameters attribute is allowed")?;
			},
			_ => {
				let attribute = read_unknown_attribute(reader, attribute_name, length)?;
				method.attributes.push(attribute);
			},
		}
	}

	method.code = code;
	method.exceptions = exceptions.unwrap_or_default();
	method.signature = signature;
	method.annotations.visible = visible_annotations.unwrap_or_default();
	method.annotations.invisible = invisible_annotations.unwrap_or_default();
	method.type_annotations.visible = visible_type_annotations.unwrap_or_default();
	method.type_annotations.invisible = invisible_type_annotations.unwrap_or_default();
	method.parameter_annotations.visible = visible_parameter_annotations;
	method.parameter_annotations.invisible = invisible_parameter_annotations;
	method.annotation_default = annotation_default;
	method.parameters = parameters;

	Ok(method)
}

/// A helper trait for the [`read_code`] method.
trait CodeReadHelper: ClassRead {
	fn read_u8_as_local_variable(&mut self) -> Result<LvIndex> {
		Ok(LvIndex { index: self.read_u8()? as u16 })
	}
	fn read_u16_as_local_variable(&mut self) -> Result<LvIndex> {
		Ok(LvIndex { index: self.read_u16()? })
	}

	fn read_i16_as_branch_target_label(&mut self, opcode_pos: u16) -> Result<u16> {
		let branch = self.read_i16()
			.with_context(|| anyhow!("couldn't read i16 for branch based on opcode {opcode_pos:?}"))?;
		let target = opcode_pos.checked_add_signed(branch)
			.with_context(|| anyhow!("can't add branch offset (i16) of {branch:?} to opcode position (u16) {opcode_pos:?}"))?;
		Ok(target)
	}

	fn read_i32_as_branch_target_label(&mut self, opcode_pos: u16) -> Result<u16> {
		let branch = self.read_i32()
			.with_context(|| anyhow!("couldn't read i32 for branch based on opcode {opcode_pos:?}"))?;
		let target = (opcode_pos as u32).checked_add_signed(branch)
			.with_context(|| anyhow!("can't add branch offset (i32) of {branch:?} to opcode position (u16) {opcode_pos:?}"))?;
		let target: u16 = target.try_into()
			.with_context(|| anyhow!("branch target {target} is larger than any bytecode offset"))?;
		Ok(target)
	}

	/// Skips over `n` bytes of operands, failing if the code ends before.
	fn skip_operands(&mut self, n: usize) -> Result<()> {
		for _ in 0..n {
			self.read_u8().context("instruction operands run past the end of the code")?;
		}
		Ok(())
	}
}

impl<T: ClassRead> CodeReadHelper for T {}

/// Reads the padding bytes of `tableswitch` and `lookupswitch`. The reader must be relative to the start of the code.
fn align_to_4_byte_boundary(reader: &mut impl ClassRead) -> Result<()> {
	let padding = (4 - (reader.marker()? & 0b11)) & 0b11;
	reader.skip_operands(padding as usize)
}

/// The number of entries of a `tableswitch`, for `low` and `high` read from the class file.
fn table_switch_length(low: i32, high: i32) -> Result<usize> {
	if low > high {
		bail!("in tableswitch `low` must be lower or equal to `high`, it's low={low:?} and high={high:?}");
	}
	Ok((high as i64 - low as i64 + 1) as usize)
}

/// Walks over the bytecode, creating the labels of all branch targets. Returns the offsets of all instructions.
fn create_branch_labels(bytecode: &[u8], labels: &mut Labels, code_start: u64) -> Result<HashSet<u16>> {
	let mut instruction_starts = HashSet::new();

	// We do this so that we can't read more than the bytecode
	let mut r = Cursor::new(bytecode);
	while (r.position() as usize) < bytecode.len() {
		// We may cast this to an u16, since we checked that the length of the bytecode is less than 65536.
		let opcode_pos = r.position() as u16;
		instruction_starts.insert(opcode_pos);

		(|| -> Result<()> {
			match r.read_u8()? {
				opcode::NOP..=opcode::DCONST_1 |
				opcode::ILOAD_0..=opcode::SALOAD |
				opcode::ISTORE_0..=opcode::LXOR |
				opcode::I2L..=opcode::DCMPG |
				opcode::IRETURN..=opcode::RETURN |
				opcode::ARRAYLENGTH |
				opcode::ATHROW |
				opcode::MONITORENTER |
				opcode::MONITOREXIT => {
					// no operands
				},
				opcode::BIPUSH |
				opcode::LDC |
				opcode::ILOAD..=opcode::ALOAD |
				opcode::ISTORE..=opcode::ASTORE |
				opcode::RET |
				opcode::NEWARRAY => {
					r.skip_operands(1)?;
				},
				opcode::SIPUSH |
				opcode::LDC_W |
				opcode::LDC2_W |
				opcode::IINC |
				opcode::GETSTATIC..=opcode::INVOKESTATIC |
				opcode::NEW |
				opcode::ANEWARRAY |
				opcode::CHECKCAST |
				opcode::INSTANCEOF => {
					r.skip_operands(2)?;
				},
				opcode::MULTIANEWARRAY => {
					r.skip_operands(3)?;
				},
				opcode::INVOKEINTERFACE |
				opcode::INVOKEDYNAMIC => {
					r.skip_operands(4)?;
				},
				opcode::WIDE => {
					match r.read_u8()? {
						opcode::ILOAD..=opcode::ALOAD |
						opcode::ISTORE..=opcode::ASTORE |
						opcode::RET => {
							r.skip_operands(2)?;
						},
						opcode::IINC => {
							r.skip_operands(4)?;
						},
						wide_opcode => bail!("unknown wide opcode {wide_opcode:#04x}"),
					}
				},
				opcode::IFEQ..=opcode::JSR |
				opcode::IFNULL |
				opcode::IFNONNULL => {
					labels.create(r.read_i16_as_branch_target_label(opcode_pos)?)?;
				},
				opcode::GOTO_W |
				opcode::JSR_W => {
					labels.create(r.read_i32_as_branch_target_label(opcode_pos)?)?;
				},
				opcode::TABLESWITCH => {
					align_to_4_byte_boundary(&mut r)?;

					labels.create(r.read_i32_as_branch_target_label(opcode_pos)?)?;

					let low = r.read_i32()?;
					let high = r.read_i32()?;

					for _ in 0..table_switch_length(low, high)? {
						labels.create(r.read_i32_as_branch_target_label(opcode_pos)?)?;
					}
				},
				opcode::LOOKUPSWITCH => {
					align_to_4_byte_boundary(&mut r)?;

					labels.create(r.read_i32_as_branch_target_label(opcode_pos)?)?;

					let n = r.read_i32()?;
					if n < 0 { bail!("in lookupswitch the `npairs` must be positive, it's npairs={n:?}"); }

					for _ in 0..n {
						let _key = r.read_i32()?;

						labels.create(r.read_i32_as_branch_target_label(opcode_pos)?)?;
					}
				},
				opcode => bail!("unknown opcode {opcode:#04x}"),
			};
			Ok(())
		})()
			.with_context(|| anyhow!("at bytecode offset {opcode_pos}"))
			.or_translation_error(|| TranslationError::MalformedClass { offset: code_start + opcode_pos as u64 })?;
	}

	Ok(instruction_starts)
}

fn read_code(
	reader: &mut impl ClassRead,
	pool: &PoolRead,
	bootstrap_methods: &Option<Vec<BootstrapMethodRead>>,
	class_start: u64,
) -> Result<Code> {
	let max_stack = reader.read_u16()?;
	let max_locals = reader.read_u16()?;

	let code_length = reader.read_u32()?;

	// This limit here is defined by the Java Virtual Machine Specification, and this allows us to store label offsets in an u16.
	if code_length == 0 || code_length > u16::MAX as u32 {
		bail!("`code_length` must be greater than zero and less than 65536, got {code_length:?}");
	}
	let code_length = code_length as u16; // can't fail, see checks above

	let code_start = reader.marker()? - class_start;
	let bytecode = reader.read_u8_vec(code_length as usize)?;

	let mut labels = Labels::new(code_length);

	// Create all the labels referenced by any branching instruction.
	let instruction_starts = create_branch_labels(&bytecode, &mut labels, code_start)?;

	let exception_table = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| {
			let start_pc = r.read_u16()?;
			let end_pc = r.read_u16()?;
			if start_pc >= end_pc {
				bail!("exception range from {start_pc} to {end_pc} is empty");
			}
			Ok(Exception {
				start: labels.get_or_create(start_pc)?,
				end: labels.get_or_create_exclusive(end_pc)?,
				handler: labels.get_or_create(r.read_u16()?)?,
				catch: pool.get_optional(r.read_u16()?, PoolRead::get_class)?,
			})
		}
	)?;

	let mut line_numbers = Vec::new();
	let mut local_variables: Vec<Lv> = Vec::new();
	let mut local_variable_types: Vec<Lv> = Vec::new();
	let mut type_annotations = TypeAnnotations::default();
	let mut attributes = Vec::new();

	let attribute_count = reader.read_u16()?;
	for _ in 0..attribute_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::STACK_MAP_TABLE => {
				// frames are computed again when writing
				debug!("dropping StackMapTable attribute of {length} bytes");
				reader.skip(length as i64)?;
			},
			attribute::LINE_NUMBER_TABLE => {
				read_attribute(reader, attribute::LINE_NUMBER_TABLE, length, |r| {
					let line_number_table_length = r.read_u16()?;
					for _ in 0..line_number_table_length {
						let start = labels.get_or_create(r.read_u16()?)?;
						let line_number = r.read_u16()?;

						line_numbers.push((start, line_number));
					}
					Ok(())
				})?;
			},
			attribute::LOCAL_VARIABLE_TABLE => {
				read_attribute(reader, attribute::LOCAL_VARIABLE_TABLE, length, |r| {
					let local_variable_table_length = r.read_u16()?;
					for _ in 0..local_variable_table_length {
						let start_pc = r.read_u16()?;
						let length = r.read_u16()?;
						let range = labels.get_or_create_range(start_pc, length)?;
						let name = pool.get_utf8(r.read_u16()?)?;
						let descriptor = FieldDescriptor::try_from(pool.get_utf8(r.read_u16()?)?)?;
						let index = r.read_u16_as_local_variable()?;
						local_variables.push(Lv {
							range,
							name,
							descriptor: Some(descriptor),
							signature: None,
							index,
						});
					}
					Ok(())
				})?;
			},
			attribute::LOCAL_VARIABLE_TYPE_TABLE => {
				read_attribute(reader, attribute::LOCAL_VARIABLE_TYPE_TABLE, length, |r| {
					let local_variable_type_table_length = r.read_u16()?;
					for _ in 0..local_variable_type_table_length {
						let start_pc = r.read_u16()?;
						let length = r.read_u16()?;
						let range = labels.get_or_create_range(start_pc, length)?;
						let name = pool.get_utf8(r.read_u16()?)?;
						let signature = pool.get_utf8(r.read_u16()?)?;
						let index = r.read_u16_as_local_variable()?;
						local_variable_types.push(Lv {
							range,
							name,
							descriptor: None,
							signature: Some(signature),
							index,
						});
					}
					Ok(())
				})?;
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, length, |r| {
					read_type_annotations_attribute(r, pool, |r| read_target_code(r, &mut labels, exception_table.len()))
				})?;
				type_annotations.visible.extend(value);
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, length, |r| {
					read_type_annotations_attribute(r, pool, |r| read_target_code(r, &mut labels, exception_table.len()))
				})?;
				type_annotations.invisible.extend(value);
			},
			_ => {
				let attribute = read_unknown_attribute(reader, attribute_name, length)?;
				attributes.push(attribute);
			},
		}
	}

	// A LocalVariableTypeTable entry belongs to the LocalVariableTable entry with the same range, name and index.
	for lv_type in local_variable_types {
		let matching = local_variables.iter_mut()
			.find(|lv| lv.signature.is_none() && lv.range == lv_type.range && lv.name == lv_type.name && lv.index == lv_type.index);
		if let Some(lv) = matching {
			lv.signature = lv_type.signature;
		} else {
			local_variables.push(lv_type);
		}
	}

	labels.check_boundaries(&instruction_starts)
		.or_translation_error(|| TranslationError::MalformedClass { offset: code_start })?;

	// At this point all the labels are stored:
	let labels = labels; // remove the mutability

	let mut instructions = Vec::new();

	// We do this so that we can't read more than the bytecode
	let mut r = Cursor::new(&bytecode[..]);
	while (r.position() as usize) < bytecode.len() {
		// See the comment above for why we may do this.
		let opcode_pos = r.position() as u16;

		let instruction = read_instruction(&mut r, opcode_pos, pool, bootstrap_methods, &labels)
			.with_context(|| anyhow!("at bytecode offset {opcode_pos}"))
			.or_translation_error(|| TranslationError::MalformedClass { offset: code_start + opcode_pos as u64 })?;

		instructions.push(InstructionListEntry {
			label: labels.get(opcode_pos),
			instruction,
		});
	}

	let mut code = Code {
		max_stack: Some(max_stack),
		max_locals: Some(max_locals),
		instructions,
		exception_table,
		last_label: labels.get(code_length),
		line_numbers,
		local_variables,
		type_annotations,
		attributes,
	};
	code.canonicalize_labels()?;

	Ok(code)
}

fn read_instruction(
	r: &mut Cursor<&[u8]>,
	opcode_pos: u16,
	pool: &PoolRead,
	bootstrap_methods: &Option<Vec<BootstrapMethodRead>>,
	labels: &Labels,
) -> Result<Instruction> {
	Ok(match r.read_u8()? {
		opcode::NOP         => Instruction::Nop,
		opcode::ACONST_NULL => Instruction::AConstNull,
		opcode::ICONST_M1   => Instruction::IConstM1,
		opcode::ICONST_0    => Instruction::IConst0,
		opcode::ICONST_1    => Instruction::IConst1,
		opcode::ICONST_2    => Instruction::IConst2,
		opcode::ICONST_3    => Instruction::IConst3,
		opcode::ICONST_4    => Instruction::IConst4,
		opcode::ICONST_5    => Instruction::IConst5,
		opcode::LCONST_0    => Instruction::LConst0,
		opcode::LCONST_1    => Instruction::LConst1,
		opcode::FCONST_0    => Instruction::FConst0,
		opcode::FCONST_1    => Instruction::FConst1,
		opcode::FCONST_2    => Instruction::FConst2,
		opcode::DCONST_0    => Instruction::DConst0,
		opcode::DCONST_1    => Instruction::DConst1,
		opcode::BIPUSH      => Instruction::BiPush(r.read_i8()?),
		opcode::SIPUSH      => Instruction::SiPush(r.read_i16()?),
		opcode::LDC         => Instruction::Ldc(pool.get_loadable(r.read_u8()? as u16, bootstrap_methods)?),
		opcode::LDC_W       => Instruction::Ldc(pool.get_loadable(r.read_u16()?, bootstrap_methods)?),
		opcode::LDC2_W      => Instruction::Ldc(pool.get_loadable(r.read_u16()?, bootstrap_methods)?),
		opcode::ILOAD       => Instruction::ILoad(r.read_u8_as_local_variable()?),
		opcode::LLOAD       => Instruction::LLoad(r.read_u8_as_local_variable()?),
		opcode::FLOAD       => Instruction::FLoad(r.read_u8_as_local_variable()?),
		opcode::DLOAD       => Instruction::DLoad(r.read_u8_as_local_variable()?),
		opcode::ALOAD       => Instruction::ALoad(r.read_u8_as_local_variable()?),
		opcode @ opcode::ILOAD_0..=opcode::ALOAD_3 => { // 0x1a..=0x2d aka 26..=45
			let shifted = opcode - opcode::ILOAD_0; // 0..=19
			let index = LvIndex { index: (shifted & 0b11) as u16 }; // 0, 1, 2 or 3

			match opcode::ILOAD + (shifted >> 2) { // 21..=25
				opcode::ILOAD => Instruction::ILoad(index),
				opcode::LLOAD => Instruction::LLoad(index),
				opcode::FLOAD => Instruction::FLoad(index),
				opcode::DLOAD => Instruction::DLoad(index),
				_ => Instruction::ALoad(index),
			}
		},
		opcode::IALOAD => Instruction::IALoad,
		opcode::LALOAD => Instruction::LALoad,
		opcode::FALOAD => Instruction::FALoad,
		opcode::DALOAD => Instruction::DALoad,
		opcode::AALOAD => Instruction::AALoad,
		opcode::BALOAD => Instruction::BALoad,
		opcode::CALOAD => Instruction::CALoad,
		opcode::SALOAD => Instruction::SALoad,
		opcode::ISTORE => Instruction::IStore(r.read_u8_as_local_variable()?),
		opcode::LSTORE => Instruction::LStore(r.read_u8_as_local_variable()?),
		opcode::FSTORE => Instruction::FStore(r.read_u8_as_local_variable()?),
		opcode::DSTORE => Instruction::DStore(r.read_u8_as_local_variable()?),
		opcode::ASTORE => Instruction::AStore(r.read_u8_as_local_variable()?),
		opcode @ opcode::ISTORE_0..=opcode::ASTORE_3 => { // 0x3b..=0x4e aka 59..=78
			let shifted = opcode - opcode::ISTORE_0; // 0..=19
			let index = LvIndex { index: (shifted & 0b11) as u16 }; // 0, 1, 2 or 3

			match opcode::ISTORE + (shifted >> 2) { // 54..=58
				opcode::ISTORE => Instruction::IStore(index),
				opcode::LSTORE => Instruction::LStore(index),
				opcode::FSTORE => Instruction::FStore(index),
				opcode::DSTORE => Instruction::DStore(index),
				_ => Instruction::AStore(index),
			}
		},
		opcode::IASTORE => Instruction::IAStore,
		opcode::LASTORE => Instruction::LAStore,
		opcode::FASTORE => Instruction::FAStore,
		opcode::DASTORE => Instruction::DAStore,
		opcode::AASTORE => Instruction::AAStore,
		opcode::BASTORE => Instruction::BAStore,
		opcode::CASTORE => Instruction::CAStore,
		opcode::SASTORE => Instruction::SAStore,
		opcode::POP     => Instruction::Pop,
		opcode::POP2    => Instruction::Pop2,
		opcode::DUP     => Instruction::Dup,
		opcode::DUP_X1  => Instruction::DupX1,
		opcode::DUP_X2  => Instruction::DupX2,
		opcode::DUP2    => Instruction::Dup2,
		opcode::DUP2_X1 => Instruction::Dup2X1,
		opcode::DUP2_X2 => Instruction::Dup2X2,
		opcode::SWAP    => Instruction::Swap,
		opcode::IADD    => Instruction::IAdd,
		opcode::LADD    => Instruction::LAdd,
		opcode::FADD    => Instruction::FAdd,
		opcode::DADD    => Instruction::DAdd,
		opcode::ISUB    => Instruction::ISub,
		opcode::LSUB    => Instruction::LSub,
		opcode::FSUB    => Instruction::FSub,
		opcode::DSUB    => Instruction::DSub,
		opcode::IMUL    => Instruction::IMul,
		opcode::LMUL    => Instruction::LMul,
		opcode::FMUL    => Instruction::FMul,
		opcode::DMUL    => Instruction::DMul,
		opcode::IDIV    => Instruction::IDiv,
		opcode::LDIV    => Instruction::LDiv,
		opcode::FDIV    => Instruction::FDiv,
		opcode::DDIV    => Instruction::DDiv,
		opcode::IREM    => Instruction::IRem,
		opcode::LREM    => Instruction::LRem,
		opcode::FREM    => Instruction::FRem,
		opcode::DREM    => Instruction::DRem,
		opcode::INEG    => Instruction::INeg,
		opcode::LNEG    => Instruction::LNeg,
		opcode::FNEG    => Instruction::FNeg,
		opcode::DNEG    => Instruction::DNeg,
		opcode::ISHL    => Instruction::IShl,
		opcode::LSHL    => Instruction::LShl,
		opcode::ISHR    => Instruction::IShr,
		opcode::LSHR    => Instruction::LShr,
		opcode::IUSHR   => Instruction::IUShr,
		opcode::LUSHR   => Instruction::LUShr,
		opcode::IAND    => Instruction::IAnd,
		opcode::LAND    => Instruction::LAnd,
		opcode::IOR     => Instruction::IOr,
		opcode::LOR     => Instruction::LOr,
		opcode::IXOR    => Instruction::IXor,
		opcode::LXOR    => Instruction::LXor,
		opcode::IINC => {
			let index = r.read_u8_as_local_variable()?;
			let value = r.read_i8()?;
			Instruction::IInc(index, value as i16)
		},
		opcode::I2L   => Instruction::I2L,
		opcode::I2F   => Instruction::I2F,
		opcode::I2D   => Instruction::I2D,
		opcode::L2I   => Instruction::L2I,
		opcode::L2F   => Instruction::L2F,
		opcode::L2D   => Instruction::L2D,
		opcode::F2I   => Instruction::F2I,
		opcode::F2L   => Instruction::F2L,
		opcode::F2D   => Instruction::F2D,
		opcode::D2I   => Instruction::D2I,
		opcode::D2L   => Instruction::D2L,
		opcode::D2F   => Instruction::D2F,
		opcode::I2B   => Instruction::I2B,
		opcode::I2C   => Instruction::I2C,
		opcode::I2S   => Instruction::I2S,
		opcode::LCMP  => Instruction::LCmp,
		opcode::FCMPL => Instruction::FCmpL,
		opcode::FCMPG => Instruction::FCmpG,
		opcode::DCMPL => Instruction::DCmpL,
		opcode::DCMPG => Instruction::DCmpG,
		opcode::IFEQ      => Instruction::IfEq(    labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IFNE      => Instruction::IfNe(    labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IFLT      => Instruction::IfLt(    labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IFGE      => Instruction::IfGe(    labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IFGT      => Instruction::IfGt(    labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IFLE      => Instruction::IfLe(    labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ICMPEQ => Instruction::IfICmpEq(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ICMPNE => Instruction::IfICmpNe(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ICMPLT => Instruction::IfICmpLt(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ICMPGE => Instruction::IfICmpGe(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ICMPGT => Instruction::IfICmpGt(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ICMPLE => Instruction::IfICmpLe(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ACMPEQ => Instruction::IfACmpEq(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IF_ACMPNE => Instruction::IfACmpNe(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::GOTO      => Instruction::Goto(    labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::JSR       => Instruction::Jsr(     labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::RET       => Instruction::Ret(r.read_u8_as_local_variable()?),
		opcode::TABLESWITCH => {
			align_to_4_byte_boundary(r)?;

			let default = labels.try_get(r.read_i32_as_branch_target_label(opcode_pos)?)?;
			let low = r.read_i32()?;
			let high = r.read_i32()?;

			let n = table_switch_length(low, high)?;

			let mut table = Vec::with_capacity(n.min(1 << 14));
			for _ in 0..n {
				let entry = labels.try_get(r.read_i32_as_branch_target_label(opcode_pos)?)?;
				table.push(entry);
			}

			Instruction::TableSwitch { default, low, high, table }
		},
		opcode::LOOKUPSWITCH => {
			align_to_4_byte_boundary(r)?;

			let default = labels.try_get(r.read_i32_as_branch_target_label(opcode_pos)?)?;

			let n = r.read_i32()?;
			if n < 0 { bail!("in lookupswitch the `npairs` must be positive, it's npairs={n:?}"); }

			let mut pairs: Vec<(i32, _)> = Vec::with_capacity((n as usize).min(1 << 14));
			for _ in 0..n {
				let key = r.read_i32()?;
				let value = labels.try_get(r.read_i32_as_branch_target_label(opcode_pos)?)?;
				if pairs.last().is_some_and(|&(last, _)| last >= key) {
					bail!("keys of lookupswitch must be sorted in increasing order, but {key} follows {:?}", pairs.last().map(|&(last, _)| last));
				}
				pairs.push((key, value));
			}

			Instruction::LookupSwitch { default, pairs }
		},
		opcode::IRETURN => Instruction::IReturn,
		opcode::LRETURN => Instruction::LReturn,
		opcode::FRETURN => Instruction::FReturn,
		opcode::DRETURN => Instruction::DReturn,
		opcode::ARETURN => Instruction::AReturn,
		opcode::RETURN  => Instruction::Return,
		opcode::GETSTATIC => Instruction::GetStatic(pool.get_field_ref(r.read_u16()?)?),
		opcode::PUTSTATIC => Instruction::PutStatic(pool.get_field_ref(r.read_u16()?)?),
		opcode::GETFIELD  => Instruction::GetField(pool.get_field_ref(r.read_u16()?)?),
		opcode::PUTFIELD  => Instruction::PutField(pool.get_field_ref(r.read_u16()?)?),
		opcode::INVOKEVIRTUAL => Instruction::InvokeVirtual(pool.get_method_ref(r.read_u16()?)?),
		opcode::INVOKESPECIAL => {
			let (method_ref, is_interface) = pool.get_method_ref_or_interface_method_ref(r.read_u16()?)?;
			Instruction::InvokeSpecial(method_ref, is_interface)
		},
		opcode::INVOKESTATIC => {
			let (method_ref, is_interface) = pool.get_method_ref_or_interface_method_ref(r.read_u16()?)?;
			Instruction::InvokeStatic(method_ref, is_interface)
		},
		opcode::INVOKEINTERFACE => {
			let method_ref = pool.get_interface_method_ref(r.read_u16()?)?;
			let count = r.read_u8()?;
			let expected = method_ref.desc.get_arguments_size()?;
			if count != expected {
				bail!("invokeinterface of {}.{}{} has a count of {count}, expected {expected}", method_ref.class, method_ref.name, method_ref.desc);
			}
			let _zero = r.read_u8()?;
			Instruction::InvokeInterface(method_ref)
		},
		opcode::INVOKEDYNAMIC => {
			let invoke_dynamic = pool.get_invoke_dynamic(r.read_u16()?, bootstrap_methods)?;
			let _zero = r.read_u8()?;
			let _zero = r.read_u8()?;
			Instruction::InvokeDynamic(invoke_dynamic)
		},
		opcode::NEW          => Instruction::New(pool.get_class(r.read_u16()?)?),
		opcode::NEWARRAY     => Instruction::NewArray(ArrayType::from_atype(r.read_u8()?)?),
		opcode::ANEWARRAY    => Instruction::ANewArray(pool.get_class(r.read_u16()?)?),
		opcode::ARRAYLENGTH  => Instruction::ArrayLength,
		opcode::ATHROW       => Instruction::AThrow,
		opcode::CHECKCAST    => Instruction::CheckCast(pool.get_class(r.read_u16()?)?),
		opcode::INSTANCEOF   => Instruction::InstanceOf(pool.get_class(r.read_u16()?)?),
		opcode::MONITORENTER => Instruction::MonitorEnter,
		opcode::MONITOREXIT  => Instruction::MonitorExit,
		opcode::WIDE => {
			match r.read_u8()? {
				opcode::ILOAD  => Instruction::ILoad( r.read_u16_as_local_variable()?),
				opcode::LLOAD  => Instruction::LLoad( r.read_u16_as_local_variable()?),
				opcode::FLOAD  => Instruction::FLoad( r.read_u16_as_local_variable()?),
				opcode::DLOAD  => Instruction::DLoad( r.read_u16_as_local_variable()?),
				opcode::ALOAD  => Instruction::ALoad( r.read_u16_as_local_variable()?),
				opcode::ISTORE => Instruction::IStore(r.read_u16_as_local_variable()?),
				opcode::LSTORE => Instruction::LStore(r.read_u16_as_local_variable()?),
				opcode::FSTORE => Instruction::FStore(r.read_u16_as_local_variable()?),
				opcode::DSTORE => Instruction::DStore(r.read_u16_as_local_variable()?),
				opcode::ASTORE => Instruction::AStore(r.read_u16_as_local_variable()?),
				opcode::RET    => Instruction::Ret(   r.read_u16_as_local_variable()?),
				opcode::IINC => {
					let index = r.read_u16_as_local_variable()?;
					let value = r.read_i16()?;

					Instruction::IInc(index, value)
				},
				wide_opcode => bail!("unknown wide opcode {wide_opcode:#04x}"),
			}
		},
		opcode::MULTIANEWARRAY => {
			let class = pool.get_class(r.read_u16()?)?;
			let dimensions = r.read_u8()?;
			if dimensions == 0 {
				bail!("multianewarray of {class} must create at least one dimension");
			}
			Instruction::MultiANewArray(class, dimensions)
		},
		opcode::IFNULL    => Instruction::IfNull(   labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::IFNONNULL => Instruction::IfNonNull(labels.try_get(r.read_i16_as_branch_target_label(opcode_pos)?)?),
		opcode::GOTO_W    => Instruction::Goto(     labels.try_get(r.read_i32_as_branch_target_label(opcode_pos)?)?),
		opcode::JSR_W     => Instruction::Jsr(      labels.try_get(r.read_i32_as_branch_target_label(opcode_pos)?)?),

		opcode => bail!("unknown opcode {opcode:#04x}"),
	})
}

fn read_annotations_attribute(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<Vec<Annotation>> {
	reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| read_annotation(r, pool, 0),
	)
}

fn read_annotation(reader: &mut impl ClassRead, pool: &PoolRead, depth: usize) -> Result<Annotation> {
	let annotation_type = FieldDescriptor::try_from(pool.get_utf8(reader.read_u16()?)?)?;
	let element_value_pairs = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| Ok(ElementValuePair {
			name: pool.get_utf8(r.read_u16()?)?,
			value: read_element_value(r, pool, depth)?,
		}),
	)?;
	Ok(Annotation { annotation_type, element_value_pairs })
}

fn read_element_value(reader: &mut impl ClassRead, pool: &PoolRead, depth: usize) -> Result<ElementValue> {
	if depth > MAX_ANNOTATION_DEPTH {
		bail!("annotation element values nested more than {MAX_ANNOTATION_DEPTH} levels deep");
	}

	Ok(match reader.read_u8()? {
		element_value::BYTE => ElementValue::Object(Object::Byte(pool.get_integer_as_byte(reader.read_u16()?)?)),
		element_value::CHAR => ElementValue::Object(Object::Char(pool.get_integer_as_char(reader.read_u16()?)?)),
		element_value::DOUBLE => ElementValue::Object(Object::Double(pool.get_double(reader.read_u16()?)?)),
		element_value::FLOAT => ElementValue::Object(Object::Float(pool.get_float(reader.read_u16()?)?)),
		element_value::INT => ElementValue::Object(Object::Integer(pool.get_integer(reader.read_u16()?)?)),
		element_value::LONG => ElementValue::Object(Object::Long(pool.get_long(reader.read_u16()?)?)),
		element_value::SHORT => ElementValue::Object(Object::Short(pool.get_integer_as_short(reader.read_u16()?)?)),
		element_value::BOOLEAN => ElementValue::Object(Object::Boolean(pool.get_integer_as_boolean(reader.read_u16()?)?)),
		element_value::STRING => ElementValue::Object(Object::String(pool.get_java_utf8(reader.read_u16()?)?.clone())),
		element_value::ENUM => {
			let type_name = FieldDescriptor::try_from(pool.get_utf8(reader.read_u16()?)?)?;
			let const_name = pool.get_utf8(reader.read_u16()?)?;
			ElementValue::Enum { type_name, const_name }
		},
		element_value::CLASS => {
			let class = pool.get_utf8(reader.read_u16()?)?;
			if !is_valid_return_descriptor(&class) {
				bail!("invalid class literal {class:?} in annotation");
			}
			ElementValue::Class(class)
		},
		element_value::ANNOTATION => ElementValue::AnnotationInterface(read_annotation(reader, pool, depth + 1)?),
		element_value::ARRAY => ElementValue::ArrayType(reader.read_vec(
			|r| r.read_u16_as_usize(),
			|r| read_element_value(r, pool, depth + 1),
		)?),
		tag => bail!("unknown `element_value` tag {tag:?}"),
	})
}

fn read_record_component(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<RecordComponent> {
	let name = RecordName::try_from(pool.get_utf8(reader.read_u16()?)?)?;
	let descriptor = FieldDescriptor::try_from(pool.get_utf8(reader.read_u16()?)?)?;

	let mut component = RecordComponent::new(name, descriptor);

	let mut signature = None;
	let mut visible_annotations = None;
	let mut invisible_annotations = None;
	let mut visible_type_annotations = None;
	let mut invisible_type_annotations = None;

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::SIGNATURE => {
				let value = read_attribute(reader, attribute::SIGNATURE, length, |r| pool.get_utf8(r.read_u16()?))?;
				signature.insert_if_empty(value).context("only one Signature attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				visible_annotations.insert_if_empty(value).context("only one RuntimeVisibleAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, length, |r| read_annotations_attribute(r, pool))?;
				invisible_annotations.insert_if_empty(value).context("only one RuntimeInvisibleAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_field))?;
				visible_type_annotations.insert_if_empty(value).context("only one RuntimeVisibleTypeAnnotations attribute is allowed")?;
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				let value = read_attribute(reader, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, length, |r| read_type_annotations_attribute(r, pool, read_target_field))?;
				invisible_type_annotations.insert_if_empty(value).context("only one RuntimeInvisibleTypeAnnotations attribute is allowed")?;
			},
			_ => {
				let attribute = read_unknown_attribute(reader, attribute_name, length)?;
				component.attributes.push(attribute);
			},
		}
	}

	component.signature = signature;
	component.annotations.visible = visible_annotations.unwrap_or_default();
	component.annotations.invisible = invisible_annotations.unwrap_or_default();
	component.type_annotations.visible = visible_type_annotations.unwrap_or_default();
	component.type_annotations.invisible = invisible_type_annotations.unwrap_or_default();

	Ok(component)
}

/// Reads the `num_parameters` and `parameter_annotations` items of a parameter annotations attribute.
fn read_parameter_annotations_attribute(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<Vec<Vec<Annotation>>> {
	reader.read_vec(
		|r| r.read_u8_as_usize(),
		|r| read_annotations_attribute(r, pool),
	)
}

/// Reads a type annotations attribute, with `read_target` reading the `target_type` and `target_info` items.
fn read_type_annotations_attribute<R: ClassRead, T>(
	reader: &mut R,
	pool: &PoolRead,
	mut read_target: impl FnMut(&mut R) -> Result<T>,
) -> Result<Vec<TypeAnnotation<T>>> {
	let num_annotations = reader.read_u16()?;
	let mut annotations = Vec::with_capacity(num_annotations as usize);
	for _ in 0..num_annotations {
		let type_reference = read_target(reader)?;
		let type_path = read_type_path(reader)?;
		let annotation = read_annotation(reader, pool, 0)?;
		annotations.push(TypeAnnotation { type_reference, type_path, annotation });
	}
	Ok(annotations)
}

fn read_target_class(reader: &mut impl ClassRead) -> Result<TargetInfoClass> {
	Ok(match reader.read_u8()? {
		type_annotation::CLASS_TYPE_PARAMETER => TargetInfoClass::ClassTypeParameter { index: reader.read_u8()? },
		type_annotation::CLASS_EXTENDS => match reader.read_u16()? {
			type_annotation::SUPER_CLASS => TargetInfoClass::Extends,
			index => TargetInfoClass::Implements { index },
		},
		type_annotation::CLASS_TYPE_PARAMETER_BOUND => {
			let type_parameter_index = reader.read_u8()?;
			let bound_index = reader.read_u8()?;
			TargetInfoClass::ClassTypeParameterBound { type_parameter_index, bound_index }
		},
		tag => bail!("type annotation target {tag:#04x} is not allowed on a class"),
	})
}

fn read_target_field(reader: &mut impl ClassRead) -> Result<TargetInfoField> {
	Ok(match reader.read_u8()? {
		type_annotation::FIELD => TargetInfoField::Field,
		tag => bail!("type annotation target {tag:#04x} is not allowed on a field or record component"),
	})
}

fn read_target_method(reader: &mut impl ClassRead) -> Result<TargetInfoMethod> {
	Ok(match reader.read_u8()? {
		type_annotation::METHOD_TYPE_PARAMETER => TargetInfoMethod::MethodTypeParameter { index: reader.read_u8()? },
		type_annotation::METHOD_TYPE_PARAMETER_BOUND => {
			let type_parameter_index = reader.read_u8()?;
			let bound_index = reader.read_u8()?;
			TargetInfoMethod::MethodTypeParameterBound { type_parameter_index, bound_index }
		},
		type_annotation::METHOD_RETURN => TargetInfoMethod::Return,
		type_annotation::METHOD_RECEIVER => TargetInfoMethod::Receiver,
		type_annotation::METHOD_FORMAL_PARAMETER => TargetInfoMethod::FormalParameter { index: reader.read_u8()? },
		type_annotation::THROWS => TargetInfoMethod::Throws { index: reader.read_u16()? },
		tag => bail!("type annotation target {tag:#04x} is not allowed on a method"),
	})
}

/// Reads the target of a type annotation in a `Code` attribute, creating labels for its bytecode offsets.
fn read_target_code(reader: &mut impl ClassRead, labels: &mut Labels, exception_table_length: usize) -> Result<TargetInfoCode> {
	fn read_table(reader: &mut impl ClassRead, labels: &mut Labels) -> Result<Vec<(LabelRange, LvIndex)>> {
		let table_length = reader.read_u16()?;
		let mut table = Vec::with_capacity(table_length as usize);
		for _ in 0..table_length {
			let start_pc = reader.read_u16()?;
			let length = reader.read_u16()?;
			let range = labels.get_or_create_range(start_pc, length)?;
			let index = reader.read_u16_as_local_variable()?;
			table.push((range, index));
		}
		Ok(table)
	}

	let target_type = reader.read_u8()?;
	Ok(match target_type {
		type_annotation::LOCAL_VARIABLE => TargetInfoCode::LocalVariable { table: read_table(reader, labels)? },
		type_annotation::RESOURCE_VARIABLE => TargetInfoCode::ResourceVariable { table: read_table(reader, labels)? },
		type_annotation::EXCEPTION_PARAMETER => {
			let index = reader.read_u16()?;
			if index as usize >= exception_table_length {
				bail!("exception parameter type annotation refers to entry {index} of an exception table with {exception_table_length} entries");
			}
			TargetInfoCode::ExceptionParameter { index }
		},
		type_annotation::INSTANCE_OF => TargetInfoCode::InstanceOf(labels.get_or_create(reader.read_u16()?)?),
		type_annotation::NEW => TargetInfoCode::New(labels.get_or_create(reader.read_u16()?)?),
		type_annotation::CONSTRUCTOR_REFERENCE => TargetInfoCode::ConstructorReference(labels.get_or_create(reader.read_u16()?)?),
		type_annotation::METHOD_REFERENCE => TargetInfoCode::MethodReference(labels.get_or_create(reader.read_u16()?)?),
		type_annotation::CAST..=type_annotation::METHOD_REFERENCE_TYPE_ARGUMENT => {
			let label = labels.get_or_create(reader.read_u16()?)?;
			let index = reader.read_u8()?;
			match target_type {
				type_annotation::CAST => TargetInfoCode::Cast { label, index },
				type_annotation::CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT => TargetInfoCode::ConstructorInvocationTypeArgument { label, index },
				type_annotation::METHOD_INVOCATION_TYPE_ARGUMENT => TargetInfoCode::MethodInvocationTypeArgument { label, index },
				type_annotation::CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT => TargetInfoCode::ConstructorReferenceTypeArgument { label, index },
				_ => TargetInfoCode::MethodReferenceTypeArgument { label, index },
			}
		},
		tag => bail!("type annotation target {tag:#04x} is not allowed in code"),
	})
}

fn read_type_path(reader: &mut impl ClassRead) -> Result<TypePath> {
	let path = reader.read_vec(
		|r| r.read_u8_as_usize(),
		|r| {
			let type_path_kind = r.read_u8()?;
			let type_argument_index = r.read_u8()?;
			let kind = match type_path_kind {
				type_annotation::PATH_ARRAY => TypePathKind::ArrayDeeper,
				type_annotation::PATH_NESTED => TypePathKind::NestedDeeper,
				type_annotation::PATH_WILDCARD => TypePathKind::WildcardBound,
				type_annotation::PATH_TYPE_ARGUMENT => return Ok(TypePathKind::TypeArgument { index: type_argument_index }),
				kind => bail!("`type_path_kind` must be between 0 and 3, got {kind}"),
			};
			if type_argument_index != 0 {
				bail!("for {kind:?} the `type_argument_index` must be zero, got {type_argument_index}");
			}
			Ok(kind)
		},
	)?;
	Ok(TypePath { path })
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::error::TranslationError;
	use crate::tree::method::code::{Instruction, Label};

	/// A class `A` extending `java/lang/Object` with a single method `m()V`, with the given code.
	fn class_with_code(code: &[u8]) -> Vec<u8> {
		let mut bytes = vec![
			0xca, 0xfe, 0xba, 0xbe,
			0, 0, 0, 52,
			0, 8,
			1, 0, 1, b'A', // 1
			7, 0, 1, // 2
			1, 0, 16, // 3
		];
		bytes.extend_from_slice(b"java/lang/Object");
		bytes.extend_from_slice(&[
			7, 0, 3, // 4
			1, 0, 1, b'm', // 5
			1, 0, 3, b'(', b')', b'V', // 6
			1, 0, 4, b'C', b'o', b'd', b'e', // 7
			0, 0x21, // access
			0, 2, // this
			0, 4, // super
			0, 0, // interfaces
			0, 0, // fields
			0, 1, // methods
			0, 0x09, 0, 5, 0, 6, // public static m()V
			0, 1, // attributes
			0, 7, // Code
		]);
		let length = 2 + 2 + 4 + code.len() + 2 + 2;
		bytes.extend_from_slice(&(length as u32).to_be_bytes());
		bytes.extend_from_slice(&[0, 1, 0, 0]); // max stack, max locals
		bytes.extend_from_slice(&(code.len() as u32).to_be_bytes());
		bytes.extend_from_slice(code);
		bytes.extend_from_slice(&[0, 0, 0, 0]); // exception table, attributes
		bytes.extend_from_slice(&[0, 0]); // class attributes
		bytes
	}

	#[test]
	fn read_branches() -> Result<()> {
		// L0: goto L1; L1: return; goto L0
		let class = crate::decode(&class_with_code(&[0xa7, 0, 3, 0xb1, 0xa7, 0xff, 0xfc]))?;
		let code = class.methods[0].code.as_ref().unwrap();
		let instructions: Vec<_> = code.instructions.iter().map(|x| (x.label, x.instruction.clone())).collect();
		assert_eq!(instructions, vec![
			(Some(Label::new(0)), Instruction::Goto(Label::new(1))),
			(Some(Label::new(1)), Instruction::Return),
			(None, Instruction::Goto(Label::new(0))),
		]);
		Ok(())
	}

	#[test]
	fn branch_into_instruction() {
		// goto into the middle of the goto itself
		let e = crate::decode(&class_with_code(&[0xa7, 0, 1, 0xb1])).unwrap_err();
		assert!(matches!(TranslationError::of(&e), Some(TranslationError::MalformedClass { .. })));
	}

	#[test]
	fn truncated_operands() {
		let e = crate::decode(&class_with_code(&[0x10])).unwrap_err();
		assert!(matches!(TranslationError::of(&e), Some(TranslationError::MalformedClass { .. })));
	}

	#[test]
	fn unknown_opcode_offset() {
		let bytes = class_with_code(&[0x00, 0xcb]);
		let e = crate::decode(&bytes).unwrap_err();
		let code_start = bytes.len() as u64 - 2 - 4 - 2;
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::MalformedClass { offset: code_start + 1 }));
	}

	#[test]
	fn wrong_magic() {
		let mut bytes = class_with_code(&[0xb1]);
		bytes[0] = 0;
		let e = crate::decode(&bytes).unwrap_err();
		assert!(matches!(TranslationError::of(&e), Some(TranslationError::MalformedClass { .. })));
	}
}
