use std::collections::{BTreeMap, HashSet};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use crate::{class_constants, ClassWrite, WriteOptions};
use crate::class_constants::{attribute, element_value, opcode, type_annotation};
use crate::class_writer::labels::Labels;
use crate::class_writer::stack_map::{Item, StackMapFrame};
use crate::frames::{compute_frames, ComputedFrames};
use crate::pool::ConstantPool;
use crate::tree::annotation::{Annotation, ElementValue, ElementValuePair, Object};
use crate::tree::attribute::Attribute;
use crate::tree::class::{ClassFile, ClassName};
use crate::tree::field::Field;
use crate::tree::method::code::{Code, Instruction, Label, Loadable};
use crate::tree::method::Method;
use crate::tree::record::RecordComponent;
use crate::tree::type_annotation::{TargetInfoClass, TargetInfoCode, TargetInfoField, TargetInfoMethod, TypeAnnotation, TypeAnnotations, TypePath, TypePathKind};
use crate::tree::version::Version;

mod labels;
mod stack_map;

fn write_attribute<'a, F>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, name: &'a str, f: F) -> Result<()>
where
	F: FnOnce(&mut Vec<u8>, &mut ConstantPool<'a>) -> Result<()>,
{
	let mut buffer = Vec::new();
	f(&mut buffer, pool)?;
	writer.write_u16(pool.put_utf8(name)?)?;
	writer.write_usize_as_u32(buffer.len()).with_context(|| anyhow!("attribute {name:?} is too large"))?;
	writer.write_u8_slice(&buffer)
}

fn write_attribute_fix_length<'a>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, name: &'a str, length: usize) -> Result<()> {
	writer.write_u16(pool.put_utf8(name)?)?;
	writer.write_usize_as_u32(length).with_context(|| anyhow!("attribute {name:?} is too large"))
}

fn write_unknown_attributes<'a>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, attributes: &'a [Attribute]) -> Result<()> {
	for attribute in attributes {
		writer.write_u16(pool.put_utf8(&attribute.name)?)?;
		writer.write_usize_as_u32(attribute.bytes.len()).with_context(|| anyhow!("unknown attribute {:?} is too large", attribute.name))?;
		writer.write_u8_slice(&attribute.bytes)?;
	}
	Ok(())
}

/// What is known about the code of a method before writing it.
#[derive(Default)]
struct Analysis {
	/// Present if either frames or the maximums of the stack and local variables are needed.
	computed: Option<ComputedFrames>,
	/// Whether a `StackMapTable` attribute is written.
	write_frames: bool,
}

fn analyze(class: &ClassFile, method: &Method, options: &WriteOptions) -> Result<Analysis> {
	let Some(code) = &method.code else {
		return Ok(Analysis::default());
	};

	let has_subroutines = code.instructions.iter()
		.any(|entry| matches!(entry.instruction, Instruction::Jsr(_) | Instruction::Ret(_)));

	let mut write_frames = options.compute_frames && class.version.has_stack_map_frames();
	if write_frames && has_subroutines && class.version.allows_subroutines() {
		warn!("method {}{} of class {} uses jsr or ret, writing it without stack map frames", method.name, method.descriptor, class.name);
		write_frames = false;
	}

	let needs_maxs = code.max_stack.is_none() || code.max_locals.is_none();
	if needs_maxs && !options.compute_maxs {
		bail!("method {}{} has no max stack or max locals given, and computing them is turned off", method.name, method.descriptor);
	}

	let computed = if write_frames || needs_maxs {
		Some(compute_frames(class, method, options.hierarchy)?)
	} else {
		None
	};
	Ok(Analysis { computed, write_frames })
}

pub(crate) fn write(class_writer: &mut impl ClassWrite, class: &ClassFile, options: &WriteOptions) -> Result<()> {
	if class.version > Version::LATEST {
		bail!("class file version {} is newer than the supported {}", class.version, Version::LATEST);
	}
	if class.version.has_stack_map_frames() && !options.compute_frames && class.methods.iter().any(|m| m.code.is_some()) {
		warn!("writing class {} of version {} without stack map frames", class.name, class.version);
	}

	// The pool borrows from these, so they must be computed before it exists.
	let analyses = class.methods.iter()
		.map(|method| analyze(class, method, options)
			.with_context(|| anyhow!("failed to analyze method {}{}", method.name, method.descriptor)))
		.collect::<Result<Vec<_>>>()?;
	let throwable = ClassName::new_unchecked(ClassName::JAVA_LANG_THROWABLE);

	class_writer.write_u32(class_constants::MAGIC)?;

	class_writer.write_u16(class.version.minor)?;
	class_writer.write_u16(class.version.major)?;

	// The constant pool. Any constant pool item is added to it.
	let mut pool_ = ConstantPool::new();
	let pool = &mut pool_;
	// The buffer for the rest of the class file.
	let mut writer = Vec::new();

	writer.write_u16(class.access.into())?;
	writer.write_u16(pool.put_class(&class.name)?)?;
	writer.write_u16(pool.put_optional(class.super_class.as_ref(), ConstantPool::put_class)?)?;
	writer.write_slice(
		&class.interfaces,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("failed to write the number of interfaces of class {}", class.name)),
		|w, interface| w.write_u16(pool.put_class(interface)?)
	)?;

	// The BootstrapMethods attribute is written after everything else that could intern a loadable constant, which are
	// the `ConstantValue` attributes of fields, and the `ldc` and `invokedynamic` instructions.

	writer.write_slice(
		&class.fields,
		|w, size| w.write_usize_as_u16(size).with_context(|| anyhow!("failed to write the number of fields of class {}", class.name)),
		|w, field| write_field(w, field, pool)
			.with_context(|| anyhow!("failed to write field {} of class {}", field.name, class.name))
	)?;

	writer.write_usize_as_u16(class.methods.len())
		.with_context(|| anyhow!("failed to write the number of methods of class {}", class.name))?;
	for (method, analysis) in class.methods.iter().zip(&analyses) {
		write_method(&mut writer, class, method, analysis, &throwable, pool)
			.with_context(|| anyhow!("failed to write method {}{} of class {}", method.name, method.descriptor, class.name))?;
	}

	// We write the attributes into a buffer and count them.
	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if class.has_deprecated_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::DEPRECATED, 0)?;
	}
	if class.has_synthetic_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SYNTHETIC, 0)?;
	}

	if !class.inner_classes.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::INNER_CLASSES, |w, pool| {
			w.write_usize_as_u16(class.inner_classes.len()).context("too many inner classes")?;
			for inner_class in &class.inner_classes {
				w.write_u16(pool.put_class(&inner_class.inner_class)?)?;
				w.write_u16(pool.put_optional(inner_class.outer_class.as_ref(), ConstantPool::put_class)?)?;
				w.write_u16(pool.put_optional(inner_class.inner_name.as_deref(), ConstantPool::put_utf8)?)?;
				w.write_u16(inner_class.flags.into())?;
			}
			Ok(())
		})?;
	}
	if let Some(enclosing_method) = &class.enclosing_method {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::ENCLOSING_METHOD, 4)?;
		buffer.write_u16(pool.put_class(&enclosing_method.class)?)?;
		buffer.write_u16(pool.put_optional(enclosing_method.method.as_ref(), |pool, x| pool.put_name_and_type(&x.name, &x.desc))?)?;
	}
	if let Some(signature) = &class.signature {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SIGNATURE, 2)?;
		buffer.write_u16(pool.put_utf8(signature)?)?;
	}
	if let Some(source_file) = &class.source_file {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SOURCE_FILE, 2)?;
		buffer.write_u16(pool.put_utf8(source_file)?)?;
	}

	if let Some(nest_host_class) = &class.nest_host_class {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::NEST_HOST, 2)?;
		buffer.write_u16(pool.put_class(nest_host_class)?)?;
	}
	if !class.nest_members.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::NEST_MEMBERS, |w, pool| {
			w.write_slice(&class.nest_members,
				|w, len| w.write_usize_as_u16(len).context("too many nest members"),
				|w, member| w.write_u16(pool.put_class(member)?)
			)
		})?;
	}

	if !class.annotations.visible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_VISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &class.annotations.visible)
		})?;
	}
	if !class.annotations.invisible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &class.annotations.invisible)
		})?;
	}
	attribute_count += write_type_annotations(&mut buffer, pool, &class.type_annotations, |_| true, write_target_class)?;

	if let Some(record_components) = &class.record_components {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RECORD, |w, pool| {
			w.write_usize_as_u16(record_components.len()).context("too many record components")?;
			for component in record_components {
				write_record_component(w, component, pool)
					.with_context(|| anyhow!("failed to write record component {}", component.name))?;
			}
			Ok(())
		})?;
	}

	let bootstrap_methods = pool.bootstrap_methods().to_vec();
	if !bootstrap_methods.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::BOOTSTRAP_METHODS, |w, pool| {
			w.write_usize_as_u16(bootstrap_methods.len()).context("too many bootstrap methods")?;
			for bootstrap_method in &bootstrap_methods {
				w.write_u16(pool.put_method_handle(bootstrap_method.handle)?)?;
				w.write_slice(&bootstrap_method.arguments,
					|w, len| w.write_usize_as_u16(len).context("too many bootstrap method arguments"),
					|w, &argument| w.write_u16(argument),
				)?;
			}
			Ok(())
		})?;
	}

	attribute_count += class.attributes.len();
	write_unknown_attributes(&mut buffer, pool, &class.attributes)?;

	// Write the attribute count and then put the buffer containing the attributes.
	writer.write_usize_as_u16(attribute_count).context("too many attributes on class")?;
	writer.write_u8_slice(&buffer)?;

	debug!("writing class {} with {} constant pool entries", class.name, pool.len());

	// Write the pool as the last thing, as any other writing can add pool entries.
	pool_.write(class_writer)?;
	// The rest of the class file comes after the constant pool.
	class_writer.write_u8_slice(&writer)?;

	Ok(())
}

fn write_field<'a>(writer: &mut impl ClassWrite, field: &'a Field, pool: &mut ConstantPool<'a>) -> Result<()> {
	writer.write_u16(field.access.into())?;
	writer.write_u16(pool.put_utf8(field.name.as_str())?)?;
	writer.write_u16(pool.put_utf8(field.descriptor.as_str())?)?;

	// We write the attributes into a buffer and count them.
	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if field.has_deprecated_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::DEPRECATED, 0)?;
	}
	if field.has_synthetic_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SYNTHETIC, 0)?;
	}

	if let Some(constant_value) = &field.constant_value {
		if !constant_value.fits(&field.descriptor) {
			bail!("constant value {constant_value:?} doesn't fit a field of type {}", field.descriptor);
		}
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::CONSTANT_VALUE, 2)?;
		buffer.write_u16(pool.put_constant_value(constant_value)?)?;
	}
	if let Some(signature) = &field.signature {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SIGNATURE, 2)?;
		buffer.write_u16(pool.put_utf8(signature)?)?;
	}

	if !field.annotations.visible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_VISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &field.annotations.visible)
		})?;
	}
	if !field.annotations.invisible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &field.annotations.invisible)
		})?;
	}
	attribute_count += write_type_annotations(&mut buffer, pool, &field.type_annotations, |_| true, write_target_field)?;

	attribute_count += field.attributes.len();
	write_unknown_attributes(&mut buffer, pool, &field.attributes)?;

	// Write the attribute count and then put the buffer containing the attributes.
	writer.write_usize_as_u16(attribute_count).context("too many attributes on field")?;
	writer.write_u8_slice(&buffer)?;

	Ok(())
}

fn write_method<'a>(
	writer: &mut impl ClassWrite,
	class: &ClassFile,
	method: &'a Method,
	analysis: &'a Analysis,
	throwable: &'a ClassName,
	pool: &mut ConstantPool<'a>,
) -> Result<()> {
	writer.write_u16(method.access.into())?;
	writer.write_u16(pool.put_utf8(method.name.as_str())?)?;
	writer.write_u16(pool.put_utf8(method.descriptor.as_str())?)?;

	// We write the attributes into a buffer and count them.
	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if method.has_deprecated_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::DEPRECATED, 0)?;
	}
	if method.has_synthetic_attribute {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SYNTHETIC, 0)?;
	}

	if let Some(code) = &method.code {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::CODE, |w, pool| {
			write_code(w, class.version, code, analysis, throwable, pool)
				.context("failed to write `Code` attribute")
		})?;
	}
	if !method.exceptions.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::EXCEPTIONS, |w, pool| {
			w.write_slice(&method.exceptions,
				|w, len| w.write_usize_as_u16(len).context("too many exceptions"),
				|w, exception| w.write_u16(pool.put_class(exception)?)
			)
		})?;
	}
	if let Some(signature) = &method.signature {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SIGNATURE, 2)?;
		buffer.write_u16(pool.put_utf8(signature)?)?;
	}

	if !method.annotations.visible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_VISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &method.annotations.visible)
		})?;
	}
	if !method.annotations.invisible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &method.annotations.invisible)
		})?;
	}
	attribute_count += write_type_annotations(&mut buffer, pool, &method.type_annotations, |_| true, write_target_method)?;

	if let Some(parameters) = &method.parameter_annotations.visible {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS, |w, pool| {
			write_parameter_annotations_attribute(w, pool, parameters)
		})?;
	}
	if let Some(parameters) = &method.parameter_annotations.invisible {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS, |w, pool| {
			write_parameter_annotations_attribute(w, pool, parameters)
		})?;
	}
	if let Some(value) = &method.annotation_default {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::ANNOTATION_DEFAULT, |w, pool| {
			write_element_value(w, pool, value)
		})?;
	}
	if let Some(parameters) = &method.parameters {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::METHOD_PARAMETERS, |w, pool| {
			w.write_usize_as_u8(parameters.len()).context("too many method parameters")?;
			for parameter in parameters {
				w.write_u16(pool.put_optional(parameter.name.as_deref(), ConstantPool::put_utf8)?)?;
				w.write_u16(parameter.flags.into())?;
			}
			Ok(())
		})?;
	}

	attribute_count += method.attributes.len();
	write_unknown_attributes(&mut buffer, pool, &method.attributes)?;

	// Write the attribute count and then put the buffer containing the attributes.
	writer.write_usize_as_u16(attribute_count).context("too many attributes on method")?;
	writer.write_u8_slice(&buffer)?;

	Ok(())
}

fn align_to_4_byte_boundary(writer: &mut Vec<u8>) -> Result<()> {
	let padding = (4 - writer.len() % 4) % 4;
	writer.write_u8_slice(&[0; 3][..padding])
}

/// The number of local variable slots needed by the instructions, regardless of whether they can be reached.
fn locals_used(code: &Code) -> Result<u16> {
	let mut max = 0u32;
	for entry in &code.instructions {
		let end = match &entry.instruction {
			Instruction::ILoad(lv) | Instruction::FLoad(lv) | Instruction::ALoad(lv) |
			Instruction::IStore(lv) | Instruction::FStore(lv) | Instruction::AStore(lv) |
			Instruction::IInc(lv, _) | Instruction::Ret(lv) => lv.index as u32 + 1,
			Instruction::LLoad(lv) | Instruction::DLoad(lv) | Instruction::LStore(lv) | Instruction::DStore(lv) => lv.index as u32 + 2,
			_ => continue,
		};
		max = max.max(end);
	}
	u16::try_from(max).with_context(|| anyhow!("instructions use {max} local variable slots, more than fit into max_locals"))
}

/// The position of the `goto_w` of an inverted conditional branch: +1 for the opcode, +2 for the branch.
fn goto_w_pos(opcode_pos: u16) -> Result<u16> {
	opcode_pos.checked_add(1 + 2)
		.with_context(|| anyhow!("conditional branch at {opcode_pos} leaves no room for a goto_w before the code size limit"))
}

fn compute_signed_offset(opcode_pos: u16, target: u16) -> i32 {
	(target as i32) - (opcode_pos as i32)
}

fn put_i16_at(writer: &mut [u8], pos: usize, value: i16) {
	writer[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_i32_at(writer: &mut [u8], pos: usize, value: i32) {
	writer[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
}

/// Stores the information necessary for later inserting a [`Label`] as an [`i16`] or [`i32`].
struct UnwrittenLabel<'a> {
	/// The bytecode position of the instruction containing the label.
	///
	/// Based on this we compute the branch offset.
	opcode_pos: u16,
	/// The index of the instruction being written.
	///
	/// This index is in the instruction list input.
	instruction_index: usize,
	/// The label that needs to be written there.
	label: &'a Label,
	/// The position to put the resolved label [`i16`] or [`i32`] at.
	label_write_pos: usize,
	/// If true, use an [`i32`], if false use an [`i16`] for the label.
	wide: bool,
}

/// One attempt at laying out the bytecode of a method.
struct Attempt<'a> {
	w: Vec<u8>,
	labels: Labels,
	/// Branches whose target wasn't known when they were written.
	unwritten: Vec<UnwrittenLabel<'a>>,
	/// The indices of conditional branches written as the opposite condition jumping over a `goto_w`.
	inverted: HashSet<usize>,
}

impl<'a> Attempt<'a> {
	fn new(code: &Code) -> Attempt<'a> {
		Attempt {
			w: Vec::new(),
			labels: Labels::new(code.instructions.len()),
			unwritten: Vec::new(),
			inverted: HashSet::new(),
		}
	}

	/// Writes a conditional branch. If its offset doesn't fit into an [`i16`], it's written as
	/// ```txt,ignore
	///     if_not_x L_next
	///     goto_w L_target
	/// L_next:
	/// ```
	fn conditional(&mut self, wide: &HashSet<usize>, opcode_pos: u16, instruction_index: usize, label: &'a Label, opcode: u8, opposite_opcode: u8) -> Result<()> {
		// +1 for the opcode, +2 for the branch, +1 for the GOTO_W opcode, +4 for that branch
		const INVERTED_LENGTH: i16 = 1 + 2 + 1 + 4;

		if let Some(target) = self.labels.get(label) {
			let branch = compute_signed_offset(opcode_pos, target);

			if let Ok(branch) = i16::try_from(branch) {
				self.w.write_u8(opcode)?;
				self.w.write_i16(branch)?;
			} else {
				let branch = compute_signed_offset(goto_w_pos(opcode_pos)?, target);

				self.w.write_u8(opposite_opcode)?;
				self.w.write_i16(INVERTED_LENGTH)?;
				self.w.write_u8(opcode::GOTO_W)?;
				self.w.write_i32(branch)?;
				self.inverted.insert(instruction_index);
			}
		} else if wide.contains(&instruction_index) {
			self.unwritten.push(UnwrittenLabel {
				// the offset is relative to the goto_w instruction
				opcode_pos: goto_w_pos(opcode_pos)?,
				instruction_index,
				label,
				label_write_pos: opcode_pos as usize + 1 + 2 + 1,
				wide: true,
			});

			self.w.write_u8(opposite_opcode)?;
			self.w.write_i16(INVERTED_LENGTH)?;
			self.w.write_u8(opcode::GOTO_W)?;
			self.w.write_i32(i32::MAX)?;
			self.inverted.insert(instruction_index);
		} else {
			self.unwritten.push(UnwrittenLabel {
				opcode_pos,
				instruction_index,
				label,
				label_write_pos: opcode_pos as usize + 1,
				wide: false,
			});

			self.w.write_u8(opcode)?;
			self.w.write_i16(i16::MAX)?;
		}
		Ok(())
	}

	/// Writes `goto` or `jsr`, using their wide form if the offset doesn't fit into an [`i16`].
	fn unconditional(&mut self, wide: &HashSet<usize>, opcode_pos: u16, instruction_index: usize, label: &'a Label, opcode: u8, wide_opcode: u8) -> Result<()> {
		if let Some(target) = self.labels.get(label) {
			let branch = compute_signed_offset(opcode_pos, target);

			if let Ok(branch) = i16::try_from(branch) {
				self.w.write_u8(opcode)?;
				self.w.write_i16(branch)?;
			} else {
				self.w.write_u8(wide_opcode)?;
				self.w.write_i32(branch)?;
			}
		} else {
			let is_wide = wide.contains(&instruction_index);
			self.unwritten.push(UnwrittenLabel {
				opcode_pos,
				instruction_index,
				label,
				label_write_pos: opcode_pos as usize + 1,
				wide: is_wide,
			});

			if is_wide {
				self.w.write_u8(wide_opcode)?;
				self.w.write_i32(i32::MAX)?;
			} else {
				self.w.write_u8(opcode)?;
				self.w.write_i16(i16::MAX)?;
			}
		}
		Ok(())
	}

	/// Writes a switch target as an [`i32`], at the current end of the bytecode.
	fn switch_target(&mut self, opcode_pos: u16, instruction_index: usize, label: &'a Label) -> Result<()> {
		let branch = if let Some(target) = self.labels.get(label) {
			compute_signed_offset(opcode_pos, target)
		} else {
			self.unwritten.push(UnwrittenLabel {
				opcode_pos,
				instruction_index,
				label,
				label_write_pos: self.w.len(),
				wide: true,
			});

			i32::MAX
		};
		self.w.write_i32(branch)
	}

	/// Fills in the branches to labels that were unknown when writing them. Returns `false` if a branch needs to be wide
	/// and the attempt has to be repeated.
	fn resolve(&mut self, wide: &mut HashSet<usize>) -> Result<bool> {
		for unwritten in std::mem::take(&mut self.unwritten) {
			let target = self.labels.try_get(unwritten.label).context("no instruction has the label")?;
			let branch = compute_signed_offset(unwritten.opcode_pos, target);

			if unwritten.wide {
				put_i32_at(&mut self.w, unwritten.label_write_pos, branch);
			} else if let Ok(branch) = i16::try_from(branch) {
				put_i16_at(&mut self.w, unwritten.label_write_pos, branch);
			} else {
				// The branch doesn't fit into the space reserved for it, so we try again, writing this one wide.
				debug!("branch of instruction {} to {} doesn't fit into 16 bits, widening it", unwritten.instruction_index, unwritten.label);
				wide.insert(unwritten.instruction_index);
				return Ok(false);
			}
		}
		Ok(true)
	}

	fn write_local_variable_instruction(&mut self, opcode: u8, opcode_0: u8, base: u8, index: u16) -> Result<()> {
		if index < 4 {
			self.w.write_u8(((opcode - base) << 2 | index as u8) + opcode_0)
		} else if let Ok(index) = u8::try_from(index) {
			self.w.write_u8(opcode)?;
			self.w.write_u8(index)
		} else {
			self.w.write_u8(opcode::WIDE)?;
			self.w.write_u8(opcode)?;
			self.w.write_u16(index)
		}
	}

	fn write_instruction(
		&mut self,
		pool: &mut ConstantPool<'a>,
		wide: &HashSet<usize>,
		opcode_pos: u16,
		instruction_index: usize,
		instruction: &'a Instruction,
	) -> Result<()> {
		let w = &mut self.w;
		match instruction {
			Instruction::Nop => w.write_u8(opcode::NOP)?,
			Instruction::AConstNull => w.write_u8(opcode::ACONST_NULL)?,
			Instruction::IConstM1 => w.write_u8(opcode::ICONST_M1)?,
			Instruction::IConst0 => w.write_u8(opcode::ICONST_0)?,
			Instruction::IConst1 => w.write_u8(opcode::ICONST_1)?,
			Instruction::IConst2 => w.write_u8(opcode::ICONST_2)?,
			Instruction::IConst3 => w.write_u8(opcode::ICONST_3)?,
			Instruction::IConst4 => w.write_u8(opcode::ICONST_4)?,
			Instruction::IConst5 => w.write_u8(opcode::ICONST_5)?,
			Instruction::LConst0 => w.write_u8(opcode::LCONST_0)?,
			Instruction::LConst1 => w.write_u8(opcode::LCONST_1)?,
			Instruction::FConst0 => w.write_u8(opcode::FCONST_0)?,
			Instruction::FConst1 => w.write_u8(opcode::FCONST_1)?,
			Instruction::FConst2 => w.write_u8(opcode::FCONST_2)?,
			Instruction::DConst0 => w.write_u8(opcode::DCONST_0)?,
			Instruction::DConst1 => w.write_u8(opcode::DCONST_1)?,
			&Instruction::BiPush(byte) => {
				w.write_u8(opcode::BIPUSH)?;
				w.write_i8(byte)?;
			},
			&Instruction::SiPush(short) => {
				w.write_u8(opcode::SIPUSH)?;
				w.write_i16(short)?;
			},
			Instruction::Ldc(loadable) => {
				let is_long_or_double = match loadable {
					Loadable::Double(_) | Loadable::Long(_) => true,
					Loadable::Dynamic(x) => matches!(x.descriptor.as_str(), "D" | "J"),
					_ => false,
				};

				let index = pool.put_loadable(loadable)?;
				if is_long_or_double {
					w.write_u8(opcode::LDC2_W)?;
					w.write_u16(index)?;
				} else if let Ok(index) = u8::try_from(index) {
					w.write_u8(opcode::LDC)?;
					w.write_u8(index)?;
				} else {
					w.write_u8(opcode::LDC_W)?;
					w.write_u16(index)?;
				}
			},
			Instruction::ILoad(lv) => self.write_local_variable_instruction(opcode::ILOAD, opcode::ILOAD_0, opcode::ILOAD, lv.index)?,
			Instruction::LLoad(lv) => self.write_local_variable_instruction(opcode::LLOAD, opcode::ILOAD_0, opcode::ILOAD, lv.index)?,
			Instruction::FLoad(lv) => self.write_local_variable_instruction(opcode::FLOAD, opcode::ILOAD_0, opcode::ILOAD, lv.index)?,
			Instruction::DLoad(lv) => self.write_local_variable_instruction(opcode::DLOAD, opcode::ILOAD_0, opcode::ILOAD, lv.index)?,
			Instruction::ALoad(lv) => self.write_local_variable_instruction(opcode::ALOAD, opcode::ILOAD_0, opcode::ILOAD, lv.index)?,
			Instruction::IALoad => w.write_u8(opcode::IALOAD)?,
			Instruction::LALoad => w.write_u8(opcode::LALOAD)?,
			Instruction::FALoad => w.write_u8(opcode::FALOAD)?,
			Instruction::DALoad => w.write_u8(opcode::DALOAD)?,
			Instruction::AALoad => w.write_u8(opcode::AALOAD)?,
			Instruction::BALoad => w.write_u8(opcode::BALOAD)?,
			Instruction::CALoad => w.write_u8(opcode::CALOAD)?,
			Instruction::SALoad => w.write_u8(opcode::SALOAD)?,
			Instruction::IStore(lv) => self.write_local_variable_instruction(opcode::ISTORE, opcode::ISTORE_0, opcode::ISTORE, lv.index)?,
			Instruction::LStore(lv) => self.write_local_variable_instruction(opcode::LSTORE, opcode::ISTORE_0, opcode::ISTORE, lv.index)?,
			Instruction::FStore(lv) => self.write_local_variable_instruction(opcode::FSTORE, opcode::ISTORE_0, opcode::ISTORE, lv.index)?,
			Instruction::DStore(lv) => self.write_local_variable_instruction(opcode::DSTORE, opcode::ISTORE_0, opcode::ISTORE, lv.index)?,
			Instruction::AStore(lv) => self.write_local_variable_instruction(opcode::ASTORE, opcode::ISTORE_0, opcode::ISTORE, lv.index)?,
			Instruction::IAStore => w.write_u8(opcode::IASTORE)?,
			Instruction::LAStore => w.write_u8(opcode::LASTORE)?,
			Instruction::FAStore => w.write_u8(opcode::FASTORE)?,
			Instruction::DAStore => w.write_u8(opcode::DASTORE)?,
			Instruction::AAStore => w.write_u8(opcode::AASTORE)?,
			Instruction::BAStore => w.write_u8(opcode::BASTORE)?,
			Instruction::CAStore => w.write_u8(opcode::CASTORE)?,
			Instruction::SAStore => w.write_u8(opcode::SASTORE)?,
			Instruction::Pop     => w.write_u8(opcode::POP)?,
			Instruction::Pop2    => w.write_u8(opcode::POP2)?,
			Instruction::Dup     => w.write_u8(opcode::DUP)?,
			Instruction::DupX1   => w.write_u8(opcode::DUP_X1)?,
			Instruction::DupX2   => w.write_u8(opcode::DUP_X2)?,
			Instruction::Dup2    => w.write_u8(opcode::DUP2)?,
			Instruction::Dup2X1  => w.write_u8(opcode::DUP2_X1)?,
			Instruction::Dup2X2  => w.write_u8(opcode::DUP2_X2)?,
			Instruction::Swap    => w.write_u8(opcode::SWAP)?,
			Instruction::IAdd    => w.write_u8(opcode::IADD)?,
			Instruction::LAdd    => w.write_u8(opcode::LADD)?,
			Instruction::FAdd    => w.write_u8(opcode::FADD)?,
			Instruction::DAdd    => w.write_u8(opcode::DADD)?,
			Instruction::ISub    => w.write_u8(opcode::ISUB)?,
			Instruction::LSub    => w.write_u8(opcode::LSUB)?,
			Instruction::FSub    => w.write_u8(opcode::FSUB)?,
			Instruction::DSub    => w.write_u8(opcode::DSUB)?,
			Instruction::IMul    => w.write_u8(opcode::IMUL)?,
			Instruction::LMul    => w.write_u8(opcode::LMUL)?,
			Instruction::FMul    => w.write_u8(opcode::FMUL)?,
			Instruction::DMul    => w.write_u8(opcode::DMUL)?,
			Instruction::IDiv    => w.write_u8(opcode::IDIV)?,
			Instruction::LDiv    => w.write_u8(opcode::LDIV)?,
			Instruction::FDiv    => w.write_u8(opcode::FDIV)?,
			Instruction::DDiv    => w.write_u8(opcode::DDIV)?,
			Instruction::IRem    => w.write_u8(opcode::IREM)?,
			Instruction::LRem    => w.write_u8(opcode::LREM)?,
			Instruction::FRem    => w.write_u8(opcode::FREM)?,
			Instruction::DRem    => w.write_u8(opcode::DREM)?,
			Instruction::INeg    => w.write_u8(opcode::INEG)?,
			Instruction::LNeg    => w.write_u8(opcode::LNEG)?,
			Instruction::FNeg    => w.write_u8(opcode::FNEG)?,
			Instruction::DNeg    => w.write_u8(opcode::DNEG)?,
			Instruction::IShl    => w.write_u8(opcode::ISHL)?,
			Instruction::LShl    => w.write_u8(opcode::LSHL)?,
			Instruction::IShr    => w.write_u8(opcode::ISHR)?,
			Instruction::LShr    => w.write_u8(opcode::LSHR)?,
			Instruction::IUShr   => w.write_u8(opcode::IUSHR)?,
			Instruction::LUShr   => w.write_u8(opcode::LUSHR)?,
			Instruction::IAnd    => w.write_u8(opcode::IAND)?,
			Instruction::LAnd    => w.write_u8(opcode::LAND)?,
			Instruction::IOr     => w.write_u8(opcode::IOR)?,
			Instruction::LOr     => w.write_u8(opcode::LOR)?,
			Instruction::IXor    => w.write_u8(opcode::IXOR)?,
			Instruction::LXor    => w.write_u8(opcode::LXOR)?,
			&Instruction::IInc(lv, value) => {
				if let (Ok(index), Ok(value)) = (u8::try_from(lv.index), i8::try_from(value)) {
					w.write_u8(opcode::IINC)?;
					w.write_u8(index)?;
					w.write_i8(value)?;
				} else {
					w.write_u8(opcode::WIDE)?;
					w.write_u8(opcode::IINC)?;
					w.write_u16(lv.index)?;
					w.write_i16(value)?;
				}
			},
			Instruction::I2L   => w.write_u8(opcode::I2L)?,
			Instruction::I2F   => w.write_u8(opcode::I2F)?,
			Instruction::I2D   => w.write_u8(opcode::I2D)?,
			Instruction::L2I   => w.write_u8(opcode::L2I)?,
			Instruction::L2F   => w.write_u8(opcode::L2F)?,
			Instruction::L2D   => w.write_u8(opcode::L2D)?,
			Instruction::F2I   => w.write_u8(opcode::F2I)?,
			Instruction::F2L   => w.write_u8(opcode::F2L)?,
			Instruction::F2D   => w.write_u8(opcode::F2D)?,
			Instruction::D2I   => w.write_u8(opcode::D2I)?,
			Instruction::D2L   => w.write_u8(opcode::D2L)?,
			Instruction::D2F   => w.write_u8(opcode::D2F)?,
			Instruction::I2B   => w.write_u8(opcode::I2B)?,
			Instruction::I2C   => w.write_u8(opcode::I2C)?,
			Instruction::I2S   => w.write_u8(opcode::I2S)?,
			Instruction::LCmp  => w.write_u8(opcode::LCMP)?,
			Instruction::FCmpL => w.write_u8(opcode::FCMPL)?,
			Instruction::FCmpG => w.write_u8(opcode::FCMPG)?,
			Instruction::DCmpL => w.write_u8(opcode::DCMPL)?,
			Instruction::DCmpG => w.write_u8(opcode::DCMPG)?,
			Instruction::IfEq(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFEQ, opcode::IFNE)?,
			Instruction::IfNe(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFNE, opcode::IFEQ)?,
			Instruction::IfLt(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFLT, opcode::IFGE)?,
			Instruction::IfGe(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFGE, opcode::IFLT)?,
			Instruction::IfGt(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFGT, opcode::IFLE)?,
			Instruction::IfLe(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFLE, opcode::IFGT)?,
			Instruction::IfICmpEq(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ICMPEQ, opcode::IF_ICMPNE)?,
			Instruction::IfICmpNe(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ICMPNE, opcode::IF_ICMPEQ)?,
			Instruction::IfICmpLt(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ICMPLT, opcode::IF_ICMPGE)?,
			Instruction::IfICmpGe(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ICMPGE, opcode::IF_ICMPLT)?,
			Instruction::IfICmpGt(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ICMPGT, opcode::IF_ICMPLE)?,
			Instruction::IfICmpLe(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ICMPLE, opcode::IF_ICMPGT)?,
			Instruction::IfACmpEq(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ACMPEQ, opcode::IF_ACMPNE)?,
			Instruction::IfACmpNe(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IF_ACMPNE, opcode::IF_ACMPEQ)?,
			Instruction::IfNull(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFNULL, opcode::IFNONNULL)?,
			Instruction::IfNonNull(label) => self.conditional(wide, opcode_pos, instruction_index, label, opcode::IFNONNULL, opcode::IFNULL)?,
			Instruction::Goto(label) => self.unconditional(wide, opcode_pos, instruction_index, label, opcode::GOTO, opcode::GOTO_W)?,
			Instruction::Jsr(label) => self.unconditional(wide, opcode_pos, instruction_index, label, opcode::JSR, opcode::JSR_W)?,
			&Instruction::Ret(lv) => {
				if let Ok(index) = u8::try_from(lv.index) {
					w.write_u8(opcode::RET)?;
					w.write_u8(index)?;
				} else {
					w.write_u8(opcode::WIDE)?;
					w.write_u8(opcode::RET)?;
					w.write_u16(lv.index)?;
				}
			},
			Instruction::TableSwitch { default, low, high, table } => {
				if low > high {
					bail!("`low` must be lower or equal to `high`, got {low} and {high}");
				}
				let n = *high as i64 - *low as i64 + 1;
				if table.len() as i64 != n {
					bail!("`low` and `high` bounds don't span a range of the size of the table: table has {}, high and low define {n}", table.len());
				}

				w.write_u8(opcode::TABLESWITCH)?;
				align_to_4_byte_boundary(w)?;

				self.switch_target(opcode_pos, instruction_index, default)?;
				self.w.write_i32(*low)?;
				self.w.write_i32(*high)?;
				for entry in table {
					self.switch_target(opcode_pos, instruction_index, entry)?;
				}
			},
			Instruction::LookupSwitch { default, pairs } => {
				if !pairs.windows(2).all(|x| x[0].0 < x[1].0) {
					bail!("the keys of `lookupswitch` must be strictly increasing");
				}

				w.write_u8(opcode::LOOKUPSWITCH)?;
				align_to_4_byte_boundary(w)?;

				self.switch_target(opcode_pos, instruction_index, default)?;

				let n = i32::try_from(pairs.len())
					.with_context(|| anyhow!("`npairs` doesn't fit in i32, it's {:?}", pairs.len()))?;
				self.w.write_i32(n)?;

				for (key, label) in pairs {
					self.w.write_i32(*key)?;
					self.switch_target(opcode_pos, instruction_index, label)?;
				}
			},
			Instruction::IReturn => w.write_u8(opcode::IRETURN)?,
			Instruction::LReturn => w.write_u8(opcode::LRETURN)?,
			Instruction::FReturn => w.write_u8(opcode::FRETURN)?,
			Instruction::DReturn => w.write_u8(opcode::DRETURN)?,
			Instruction::AReturn => w.write_u8(opcode::ARETURN)?,
			Instruction::Return  => w.write_u8(opcode::RETURN)?,
			Instruction::GetStatic(field_ref) => {
				w.write_u8(opcode::GETSTATIC)?;
				w.write_u16(pool.put_field_ref(field_ref)?)?;
			},
			Instruction::PutStatic(field_ref) => {
				w.write_u8(opcode::PUTSTATIC)?;
				w.write_u16(pool.put_field_ref(field_ref)?)?;
			},
			Instruction::GetField(field_ref) => {
				w.write_u8(opcode::GETFIELD)?;
				w.write_u16(pool.put_field_ref(field_ref)?)?;
			},
			Instruction::PutField(field_ref) => {
				w.write_u8(opcode::PUTFIELD)?;
				w.write_u16(pool.put_field_ref(field_ref)?)?;
			},
			Instruction::InvokeVirtual(method_ref) => {
				w.write_u8(opcode::INVOKEVIRTUAL)?;
				w.write_u16(pool.put_method_ref(method_ref)?)?;
			},
			Instruction::InvokeSpecial(method_ref, is_interface) => {
				w.write_u8(opcode::INVOKESPECIAL)?;
				w.write_u16(pool.put_method_ref_or_interface_method_ref(method_ref, *is_interface)?)?;
			},
			Instruction::InvokeStatic(method_ref, is_interface) => {
				w.write_u8(opcode::INVOKESTATIC)?;
				w.write_u16(pool.put_method_ref_or_interface_method_ref(method_ref, *is_interface)?)?;
			},
			Instruction::InvokeInterface(method_ref) => {
				w.write_u8(opcode::INVOKEINTERFACE)?;
				w.write_u16(pool.put_interface_method_ref(method_ref)?)?;
				w.write_u8(method_ref.desc.get_arguments_size()?)?;
				w.write_u8(0)?;
			},
			Instruction::InvokeDynamic(invoke_dynamic) => {
				w.write_u8(opcode::INVOKEDYNAMIC)?;
				w.write_u16(pool.put_invoke_dynamic(invoke_dynamic)?)?;
				w.write_u16(0)?;
			},
			Instruction::New(class) => {
				w.write_u8(opcode::NEW)?;
				w.write_u16(pool.put_class(class)?)?;
			},
			Instruction::NewArray(array_type) => {
				w.write_u8(opcode::NEWARRAY)?;
				w.write_u8(array_type.to_atype())?;
			},
			Instruction::ANewArray(class) => {
				w.write_u8(opcode::ANEWARRAY)?;
				w.write_u16(pool.put_class(class)?)?;
			},
			Instruction::ArrayLength => w.write_u8(opcode::ARRAYLENGTH)?,
			Instruction::AThrow      => w.write_u8(opcode::ATHROW)?,
			Instruction::CheckCast(class) => {
				w.write_u8(opcode::CHECKCAST)?;
				w.write_u16(pool.put_class(class)?)?;
			},
			Instruction::InstanceOf(class) => {
				w.write_u8(opcode::INSTANCEOF)?;
				w.write_u16(pool.put_class(class)?)?;
			},
			Instruction::MonitorEnter => w.write_u8(opcode::MONITORENTER)?,
			Instruction::MonitorExit  => w.write_u8(opcode::MONITOREXIT)?,
			Instruction::MultiANewArray(class, dimensions) => {
				if *dimensions == 0 {
					bail!("`multianewarray` needs at least one dimension");
				}
				w.write_u8(opcode::MULTIANEWARRAY)?;
				w.write_u16(pool.put_class(class)?)?;
				w.write_u8(*dimensions)?;
			},
		}
		Ok(())
	}
}

/// Writes the content of the `Code` attribute to the writer.
///
/// # Branch offsets
///
/// Instructions like `goto` or `ifeq` store their branch offset as an [`i16`], but the code of a method can be up to
/// [`u16::MAX`] bytes long. `goto` and `jsr` have the wide forms `goto_w` and `jsr_w`. A conditional branch that doesn't
/// reach is written as the opposite condition jumping over a `goto_w` to the target. Switches always use [`i32`] offsets.
///
/// Widening a branch makes the code longer, which may push other branches out of reach. So the bytecode is written in
/// attempts: branches are written narrow unless they are known to need the wide form, and whenever a narrow branch turns
/// out not to reach, it's remembered as wide and the whole code is written again. Each attempt widens at least one more
/// branch, so this ends.
///
/// # Frames
///
/// Frames are written at the offsets of the instructions that need them, and after each widened conditional branch, as
/// the instruction after the `goto_w` is now a branch target. Code that can't be reached is overwritten with `nop`s and a
/// final `athrow`, getting a full frame with just a [`java/lang/Throwable`][ClassName::JAVA_LANG_THROWABLE] on the
/// stack, and is removed from the ranges of exception handlers.
fn write_code<'a>(
	writer: &mut impl ClassWrite,
	version: Version,
	code: &'a Code,
	analysis: &'a Analysis,
	throwable: &'a ClassName,
	pool: &mut ConstantPool<'a>,
) -> Result<()> {
	code.check_labels()?;
	if code.instructions.is_empty() {
		bail!("code must contain at least one instruction");
	}
	if !version.allows_subroutines() {
		if let Some(index) = code.instructions.iter().position(|entry| matches!(entry.instruction, Instruction::Jsr(_) | Instruction::Ret(_))) {
			bail!("instruction {index} is a jsr or ret, which class files of version {version} can't use");
		}
	}

	// The indices of all instructions that need to use their "wide" form. These stay the same over multiple attempts.
	let mut wide: HashSet<usize> = HashSet::new();

	let mut attempt = loop {
		let mut attempt = Attempt::new(code);

		for (instruction_index, entry) in code.instructions.iter().enumerate() {
			let opcode_pos = u16::try_from(attempt.w.len())
				.with_context(|| anyhow!("cannot write code: code size exceeded u16::MAX: {}", attempt.w.len()))?;

			attempt.labels.add_instruction(opcode_pos);
			if let Some(label) = entry.label {
				attempt.labels.add_opcode_pos_label(label, opcode_pos);
			}

			attempt.write_instruction(pool, &wide, opcode_pos, instruction_index, &entry.instruction)
				.with_context(|| anyhow!("while writing instruction {instruction_index}: {:?}", entry.instruction))?;
		}

		let code_length = u16::try_from(attempt.w.len())
			.with_context(|| anyhow!("`code_length` must be less than 65536, got {}", attempt.w.len()))?;
		attempt.labels.finish(code.last_label, code_length);

		if attempt.resolve(&mut wide)? {
			break attempt;
		}
	};

	let computed = analysis.computed.as_ref();
	let frames = if analysis.write_frames {
		let computed = computed.context("frames to write weren't computed")?;
		Some(collect_frames(computed, &mut attempt, throwable)?)
	} else {
		None
	};
	let has_unreachable_code = analysis.write_frames && computed.is_some_and(ComputedFrames::has_unreachable_code);

	let max_stack = code.max_stack.or(computed.map(|c| c.max_stack))
		.context("no max stack given or computed")?;
	// the stack of rewritten unreachable code holds the thrown value
	let max_stack = if has_unreachable_code { max_stack.max(1) } else { max_stack };
	let max_locals = match code.max_locals {
		Some(max_locals) => max_locals,
		None => {
			let computed = computed.context("no max locals given or computed")?.max_locals;
			if analysis.write_frames {
				computed
			} else {
				// unreachable code is kept as is, and the verifier still checks its local variable indices
				computed.max(locals_used(code)?)
			}
		},
	};

	writer.write_u16(max_stack)?;
	writer.write_u16(max_locals)?;

	let labels = &attempt.labels;
	writer.write_usize_as_u32(attempt.w.len())?;
	writer.write_u8_slice(&attempt.w)?;

	let mut exception_table = Vec::with_capacity(code.exception_table.len());
	// for each entry of the code, the index of the first entry written for it
	let mut exception_indices = Vec::with_capacity(code.exception_table.len());
	let positions = code.label_positions();
	for exception in &code.exception_table {
		let written_before = exception_table.len();
		let start_pc = labels.try_get(&exception.start)?;
		let end_pc = labels.try_get(&exception.end)?;
		if start_pc >= end_pc {
			bail!("exception range from {} to {} is empty", exception.start, exception.end);
		}
		let handler_pc = labels.try_get(&exception.handler)?;
		let catch_type = pool.put_optional(exception.catch.as_ref(), ConstantPool::put_class)?;

		match computed {
			Some(computed) if has_unreachable_code => {
				// only keep the parts of the range that can be reached
				let start = positions[&exception.start];
				let end = positions[&exception.end];
				let mut run_start = None;
				for index in start..=end {
					let reachable = index < end && computed.is_reachable(index);
					match (run_start, reachable) {
						(None, true) => run_start = Some(index),
						(Some(run), false) => {
							exception_table.push((labels.offset_of(run)?, labels.offset_of(index)?, handler_pc, catch_type));
							run_start = None;
						},
						_ => {},
					}
				}
			},
			_ => exception_table.push((start_pc, end_pc, handler_pc, catch_type)),
		}
		let written = exception_table.len() > written_before;
		exception_indices.push(written.then(|| u16::try_from(written_before).ok()).flatten());
	}
	writer.write_usize_as_u16(exception_table.len()).context("too many exception table entries")?;
	for (start_pc, end_pc, handler_pc, catch_type) in exception_table {
		writer.write_u16(start_pc)?;
		writer.write_u16(end_pc)?;
		writer.write_u16(handler_pc)?;
		writer.write_u16(catch_type)?;
	}

	// We write the attributes into a buffer and count them.
	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if let Some((entry_locals, frames)) = &frames {
		if !frames.is_empty() {
			attribute_count += 1;
			write_attribute(&mut buffer, pool, attribute::STACK_MAP_TABLE, |w, pool| {
				stack_map::write_stack_map_table(w, pool, entry_locals, frames)
			})?;
		}
	}

	if !code.line_numbers.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::LINE_NUMBER_TABLE, |w, _| {
			w.write_slice(&code.line_numbers,
				|w, len| w.write_usize_as_u16(len).context("too many line numbers"),
				|w, &(ref start, line_number)| {
					w.write_u16(labels.try_get(start)?)?;
					w.write_u16(line_number)
				}
			)
		})?;
	}

	let descriptors = code.local_variables.iter().filter(|lv| lv.descriptor.is_some()).count();
	let signatures = code.local_variables.iter().filter(|lv| lv.signature.is_some()).count();
	if descriptors > 0 {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::LOCAL_VARIABLE_TABLE, |w, pool| {
			w.write_usize_as_u16(descriptors).context("too many local variables")?;
			for lv in &code.local_variables {
				if let Some(descriptor) = &lv.descriptor {
					let (start, length) = labels.try_get_range(&lv.range)?;
					w.write_u16(start)?;
					w.write_u16(length)?;
					w.write_u16(pool.put_utf8(&lv.name)?)?;
					w.write_u16(pool.put_utf8(descriptor.as_str())?)?;
					w.write_u16(lv.index.index)?;
				}
			}
			Ok(())
		})?;
	}
	if signatures > 0 {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::LOCAL_VARIABLE_TYPE_TABLE, |w, pool| {
			w.write_usize_as_u16(signatures).context("too many local variables")?;
			for lv in &code.local_variables {
				if let Some(signature) = &lv.signature {
					let (start, length) = labels.try_get_range(&lv.range)?;
					w.write_u16(start)?;
					w.write_u16(length)?;
					w.write_u16(pool.put_utf8(&lv.name)?)?;
					w.write_u16(pool.put_utf8(signature)?)?;
					w.write_u16(lv.index.index)?;
				}
			}
			Ok(())
		})?;
	}

	let keep = |target: &TargetInfoCode| match target {
		&TargetInfoCode::ExceptionParameter { index } => {
			let kept = exception_indices.get(index as usize).copied().flatten().is_some();
			if !kept {
				warn!("dropping type annotation on exception parameter {index}, its exception table entry only covers unreachable code");
			}
			kept
		},
		_ => true,
	};
	attribute_count += write_type_annotations(&mut buffer, pool, &code.type_annotations, keep, |w, target| {
		write_target_code(w, target, labels, &exception_indices)
	})?;

	attribute_count += code.attributes.len();
	write_unknown_attributes(&mut buffer, pool, &code.attributes)?;

	// Write the attribute count and then put the buffer containing the attributes.
	writer.write_usize_as_u16(attribute_count).context("too many attributes on code")?;
	writer.write_u8_slice(&buffer)?;

	Ok(())
}

/// Collects the frames to write, ordered by offset, and overwrites unreachable code. Returns the locals of the entry
/// frame together with the frames.
fn collect_frames<'a>(computed: &'a ComputedFrames, attempt: &mut Attempt<'_>, throwable: &'a ClassName) -> Result<(Vec<Item<'a>>, Vec<StackMapFrame<'a>>)> {
	let labels = &attempt.labels;
	let offset_of = |index| labels.offset_of(index);

	let mut frames = BTreeMap::new();
	let mut add = |index: usize| -> Result<()> {
		let offset = labels.offset_of(index)?;
		if let Some(frame) = computed.frames.get(index).and_then(Option::as_ref) {
			frames.insert(offset, StackMapFrame {
				offset,
				locals: Item::from_types(&frame.locals, true, offset_of)?,
				stack: Item::from_types(&frame.stack, false, offset_of)?,
			});
		}
		Ok(())
	};
	for (index, _) in computed.explicit_frames() {
		add(index)?;
	}
	for &index in &attempt.inverted {
		add(index + 1)?;
	}

	let mut dead_ranges = Vec::new();
	let mut index = 0;
	while index < computed.frames.len() {
		if computed.is_reachable(index) {
			index += 1;
			continue;
		}
		let start = index;
		while index < computed.frames.len() && !computed.is_reachable(index) {
			index += 1;
		}
		let start_pc = labels.offset_of(start)?;
		let end_pc = labels.offset_of(index)?;
		debug!("replacing unreachable instructions {start} to {index} (bytes {start_pc} to {end_pc})");
		dead_ranges.push((start_pc as usize, end_pc as usize));
		frames.insert(start_pc, StackMapFrame {
			offset: start_pc,
			locals: Vec::new(),
			stack: vec![Item::Object(throwable)],
		});
	}
	for (start, end) in dead_ranges {
		attempt.w[start..end - 1].fill(opcode::NOP);
		attempt.w[end - 1] = opcode::ATHROW;
	}

	let entry_locals = Item::from_types(&computed.entry.locals, true, |index| attempt.labels.offset_of(index))?;
	Ok((entry_locals, frames.into_values().collect()))
}

fn write_annotations_attribute<'a>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, annotations: &'a [Annotation]) -> Result<()> {
	writer.write_usize_as_u16(annotations.len()).context("too many annotations")?;

	for annotation in annotations {
		write_annotation(writer, pool, annotation)?;
	}

	Ok(())
}

fn write_annotation<'a>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, annotation: &'a Annotation) -> Result<()> {
	writer.write_u16(pool.put_utf8(annotation.annotation_type.as_str())?)?;
	write_element_values_named(writer, pool, &annotation.element_value_pairs)
}

fn write_element_values_named<'a>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, pairs: &'a [ElementValuePair]) -> Result<()> {
	writer.write_usize_as_u16(pairs.len()).context("too many annotation element values")?;

	for pair in pairs {
		writer.write_u16(pool.put_utf8(&pair.name)?)?;
		write_element_value(writer, pool, &pair.value)?;
	}

	Ok(())
}

fn write_element_value<'a>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, value: &'a ElementValue) -> Result<()> {
	match value {
		ElementValue::Object(object) => {
			let (tag, index) = match object {
				&Object::Byte(byte) => (element_value::BYTE, pool.put_integer(byte as i32)?),
				&Object::Char(char) => (element_value::CHAR, pool.put_integer(char as i32)?),
				&Object::Double(double) => (element_value::DOUBLE, pool.put_double(double)?),
				&Object::Float(float) => (element_value::FLOAT, pool.put_float(float)?),
				&Object::Integer(integer) => (element_value::INT, pool.put_integer(integer)?),
				&Object::Long(long) => (element_value::LONG, pool.put_long(long)?),
				&Object::Short(short) => (element_value::SHORT, pool.put_integer(short as i32)?),
				&Object::Boolean(boolean) => (element_value::BOOLEAN, pool.put_integer(boolean as i32)?),
				Object::String(string) => (element_value::STRING, pool.put_java_utf8(string)?),
			};
			writer.write_u8(tag)?;
			writer.write_u16(index)
		},
		ElementValue::Enum { type_name, const_name } => {
			writer.write_u8(element_value::ENUM)?;
			writer.write_u16(pool.put_utf8(type_name.as_str())?)?;
			writer.write_u16(pool.put_utf8(const_name)?)
		},
		ElementValue::Class(class) => {
			writer.write_u8(element_value::CLASS)?;
			writer.write_u16(pool.put_utf8(class)?)
		},
		ElementValue::AnnotationInterface(annotation) => {
			writer.write_u8(element_value::ANNOTATION)?;
			write_annotation(writer, pool, annotation)
		},
		ElementValue::ArrayType(element_values) => {
			writer.write_u8(element_value::ARRAY)?;
			writer.write_usize_as_u16(element_values.len()).context("too many array elements in annotation")?;
			for value in element_values {
				write_element_value(writer, pool, value)?;
			}
			Ok(())
		},
	}
}

fn write_record_component<'a>(writer: &mut impl ClassWrite, component: &'a RecordComponent, pool: &mut ConstantPool<'a>) -> Result<()> {
	writer.write_u16(pool.put_utf8(component.name.as_str())?)?;
	writer.write_u16(pool.put_utf8(component.descriptor.as_str())?)?;

	let mut attribute_count = 0;
	let mut buffer = Vec::new();

	if let Some(signature) = &component.signature {
		attribute_count += 1;
		write_attribute_fix_length(&mut buffer, pool, attribute::SIGNATURE, 2)?;
		buffer.write_u16(pool.put_utf8(signature)?)?;
	}

	if !component.annotations.visible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_VISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &component.annotations.visible)
		})?;
	}
	if !component.annotations.invisible.is_empty() {
		attribute_count += 1;
		write_attribute(&mut buffer, pool, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, |w, pool| {
			write_annotations_attribute(w, pool, &component.annotations.invisible)
		})?;
	}
	attribute_count += write_type_annotations(&mut buffer, pool, &component.type_annotations, |_| true, write_target_field)?;

	attribute_count += component.attributes.len();
	write_unknown_attributes(&mut buffer, pool, &component.attributes)?;

	writer.write_usize_as_u16(attribute_count).context("too many attributes on record component")?;
	writer.write_u8_slice(&buffer)?;

	Ok(())
}

fn write_parameter_annotations_attribute<'a>(writer: &mut impl ClassWrite, pool: &mut ConstantPool<'a>, parameters: &'a [Vec<Annotation>]) -> Result<()> {
	writer.write_usize_as_u8(parameters.len()).context("too many parameters with annotations")?;
	for annotations in parameters {
		write_annotations_attribute(writer, pool, annotations)?;
	}
	Ok(())
}

/// Writes the `RuntimeVisibleTypeAnnotations` and `RuntimeInvisibleTypeAnnotations` attributes, leaving out the type
/// annotations `keep` rejects. Returns the number of attributes written.
fn write_type_annotations<'a, T>(
	buffer: &mut Vec<u8>,
	pool: &mut ConstantPool<'a>,
	type_annotations: &'a TypeAnnotations<T>,
	keep: impl Fn(&T) -> bool,
	write_target: impl Fn(&mut Vec<u8>, &T) -> Result<()>,
) -> Result<usize> {
	let mut attribute_count = 0;
	let lists = [
		(attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, &type_annotations.visible),
		(attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, &type_annotations.invisible),
	];
	for (name, annotations) in lists {
		let annotations: Vec<&'a TypeAnnotation<T>> = annotations.iter()
			.filter(|annotation| keep(&annotation.type_reference))
			.collect();
		if annotations.is_empty() {
			continue;
		}
		attribute_count += 1;
		write_attribute(buffer, pool, name, |w, pool| {
			w.write_usize_as_u16(annotations.len()).context("too many type annotations")?;
			for &annotation in &annotations {
				write_target(w, &annotation.type_reference)?;
				write_type_path(w, &annotation.type_path)?;
				write_annotation(w, pool, &annotation.annotation)?;
			}
			Ok(())
		})?;
	}
	Ok(attribute_count)
}

fn write_target_class(writer: &mut impl ClassWrite, target: &TargetInfoClass) -> Result<()> {
	match *target {
		TargetInfoClass::ClassTypeParameter { index } => {
			writer.write_u8(type_annotation::CLASS_TYPE_PARAMETER)?;
			writer.write_u8(index)
		},
		TargetInfoClass::Extends => {
			writer.write_u8(type_annotation::CLASS_EXTENDS)?;
			writer.write_u16(type_annotation::SUPER_CLASS)
		},
		TargetInfoClass::Implements { index } => {
			if index == type_annotation::SUPER_CLASS {
				bail!("interface index {index} of a type annotation is reserved for the super class");
			}
			writer.write_u8(type_annotation::CLASS_EXTENDS)?;
			writer.write_u16(index)
		},
		TargetInfoClass::ClassTypeParameterBound { type_parameter_index, bound_index } => {
			writer.write_u8(type_annotation::CLASS_TYPE_PARAMETER_BOUND)?;
			writer.write_u8(type_parameter_index)?;
			writer.write_u8(bound_index)
		},
	}
}

fn write_target_field(writer: &mut impl ClassWrite, target: &TargetInfoField) -> Result<()> {
	match target {
		TargetInfoField::Field => writer.write_u8(type_annotation::FIELD),
	}
}

fn write_target_method(writer: &mut impl ClassWrite, target: &TargetInfoMethod) -> Result<()> {
	match *target {
		TargetInfoMethod::MethodTypeParameter { index } => {
			writer.write_u8(type_annotation::METHOD_TYPE_PARAMETER)?;
			writer.write_u8(index)
		},
		TargetInfoMethod::MethodTypeParameterBound { type_parameter_index, bound_index } => {
			writer.write_u8(type_annotation::METHOD_TYPE_PARAMETER_BOUND)?;
			writer.write_u8(type_parameter_index)?;
			writer.write_u8(bound_index)
		},
		TargetInfoMethod::Return => writer.write_u8(type_annotation::METHOD_RETURN),
		TargetInfoMethod::Receiver => writer.write_u8(type_annotation::METHOD_RECEIVER),
		TargetInfoMethod::FormalParameter { index } => {
			writer.write_u8(type_annotation::METHOD_FORMAL_PARAMETER)?;
			writer.write_u8(index)
		},
		TargetInfoMethod::Throws { index } => {
			writer.write_u8(type_annotation::THROWS)?;
			writer.write_u16(index)
		},
	}
}

/// Writes a target inside of code. `exception_indices` maps exception table entries of the code to the written ones.
fn write_target_code(writer: &mut impl ClassWrite, target: &TargetInfoCode, labels: &Labels, exception_indices: &[Option<u16>]) -> Result<()> {
	let (target_type, label, index) = match target {
		TargetInfoCode::LocalVariable { table } | TargetInfoCode::ResourceVariable { table } => {
			let target_type = if matches!(target, TargetInfoCode::LocalVariable { .. }) {
				type_annotation::LOCAL_VARIABLE
			} else {
				type_annotation::RESOURCE_VARIABLE
			};
			writer.write_u8(target_type)?;
			writer.write_usize_as_u16(table.len()).context("too many local variables in type annotation")?;
			for (range, lv_index) in table {
				let (start, length) = labels.try_get_range(range)?;
				writer.write_u16(start)?;
				writer.write_u16(length)?;
				writer.write_u16(lv_index.index)?;
			}
			return Ok(());
		},
		&TargetInfoCode::ExceptionParameter { index } => {
			let written = exception_indices.get(index as usize).copied().flatten()
				.with_context(|| anyhow!("exception parameter type annotation refers to missing exception table entry {index}"))?;
			writer.write_u8(type_annotation::EXCEPTION_PARAMETER)?;
			return writer.write_u16(written);
		},
		TargetInfoCode::InstanceOf(label) => (type_annotation::INSTANCE_OF, label, None),
		TargetInfoCode::New(label) => (type_annotation::NEW, label, None),
		TargetInfoCode::ConstructorReference(label) => (type_annotation::CONSTRUCTOR_REFERENCE, label, None),
		TargetInfoCode::MethodReference(label) => (type_annotation::METHOD_REFERENCE, label, None),
		TargetInfoCode::Cast { label, index } => (type_annotation::CAST, label, Some(*index)),
		TargetInfoCode::ConstructorInvocationTypeArgument { label, index } =>
			(type_annotation::CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT, label, Some(*index)),
		TargetInfoCode::MethodInvocationTypeArgument { label, index } =>
			(type_annotation::METHOD_INVOCATION_TYPE_ARGUMENT, label, Some(*index)),
		TargetInfoCode::ConstructorReferenceTypeArgument { label, index } =>
			(type_annotation::CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT, label, Some(*index)),
		TargetInfoCode::MethodReferenceTypeArgument { label, index } =>
			(type_annotation::METHOD_REFERENCE_TYPE_ARGUMENT, label, Some(*index)),
	};
	writer.write_u8(target_type)?;
	writer.write_u16(labels.try_get(label)?)?;
	if let Some(index) = index {
		writer.write_u8(index)?;
	}
	Ok(())
}

fn write_type_path(writer: &mut impl ClassWrite, type_path: &TypePath) -> Result<()> {
	writer.write_usize_as_u8(type_path.path.len()).context("type path is too long")?;
	for kind in &type_path.path {
		let (type_path_kind, type_argument_index) = match *kind {
			TypePathKind::ArrayDeeper => (type_annotation::PATH_ARRAY, 0),
			TypePathKind::NestedDeeper => (type_annotation::PATH_NESTED, 0),
			TypePathKind::WildcardBound => (type_annotation::PATH_WILDCARD, 0),
			TypePathKind::TypeArgument { index } => (type_annotation::PATH_TYPE_ARGUMENT, index),
		};
		writer.write_u8(type_path_kind)?;
		writer.write_u8(type_argument_index)?;
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use std::collections::HashSet;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::{decode, encode, WriteOptions};
	use crate::class_constants::opcode;
	use crate::class_writer::Attempt;
	use crate::error::TranslationError;
	use crate::frames::NoHierarchy;
	use crate::tree::attribute::Attribute;
	use crate::tree::class::{ClassAccess, ClassFile, ClassName};
	use crate::tree::method::{Method, MethodAccess, MethodDescriptor, MethodName};
	use crate::tree::annotation::Annotation;
	use crate::tree::field::FieldDescriptor;
	use crate::tree::method::code::{Code, Exception, Instruction, InstructionListEntry, Label, LvIndex};
	use crate::tree::type_annotation::{TargetInfoCode, TypeAnnotation, TypePath};
	use crate::tree::version::Version;

	fn class_with_method(version: Version, descriptor: &str, instructions: Vec<(Option<u16>, Instruction)>) -> ClassFile {
		let mut class = ClassFile::new(version, ClassAccess::from(0x21), ClassName::try_from("Test").unwrap(), Some(ClassName::java_lang_object()), Vec::new());
		let mut method = Method::new(MethodAccess::from(0x0009), MethodName::try_from("run").unwrap(), MethodDescriptor::try_from(descriptor).unwrap());
		method.code = Some(Code {
			instructions: instructions.into_iter()
				.map(|(label, instruction)| InstructionListEntry { label: label.map(Label::new), instruction })
				.collect(),
			..Code::default()
		});
		class.methods.push(method);
		class
	}

	fn code(class: &ClassFile) -> &Code {
		class.methods[0].code.as_ref().unwrap()
	}

	fn contains(haystack: &[u8], needle: &[u8]) -> bool {
		haystack.windows(needle.len()).any(|w| w == needle)
	}

	#[test]
	fn computed_maxs() -> Result<()> {
		let class = class_with_method(Version::V1_8, "()V", vec![
			(None, Instruction::IConst1),
			(None, Instruction::IConst2),
			(None, Instruction::IAdd),
			(None, Instruction::Return),
		]);
		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;

		assert_eq!(code(&decoded).max_stack, Some(2));
		assert_eq!(code(&decoded).max_locals, Some(0));
		assert_eq!(code(&decoded).instructions, code(&class).instructions);
		Ok(())
	}

	#[test]
	fn explicit_maxs_win() -> Result<()> {
		let mut class = class_with_method(Version::V1_8, "()V", vec![
			(None, Instruction::Return),
		]);
		class.methods[0].code.as_mut().unwrap().max_stack = Some(7);
		class.methods[0].code.as_mut().unwrap().max_locals = Some(3);
		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;
		assert_eq!(code(&decoded).max_stack, Some(7));
		assert_eq!(code(&decoded).max_locals, Some(3));

		class.methods[0].code.as_mut().unwrap().max_locals = None;
		let options = WriteOptions { compute_maxs: false, ..WriteOptions::default() };
		let e = encode(&class, &options).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Encoding));
		Ok(())
	}

	#[test]
	fn branch_widening() -> Result<()> {
		let mut instructions = vec![
			(None, Instruction::ILoad(LvIndex { index: 0 })),
			(None, Instruction::IfEq(Label::new(0))),
		];
		instructions.extend((0..40_000).map(|_| (None, Instruction::Nop)));
		instructions.push((None, Instruction::Return));
		instructions.push((Some(0), Instruction::Return));
		let class = class_with_method(Version::V1_8, "(I)V", instructions);

		let bytes = encode(&class, &WriteOptions::default())?;
		let decoded = decode(&bytes)?;
		let decoded = &code(&decoded).instructions;

		// ifeq became ifne over a goto_w
		assert_eq!(decoded.len(), 40_005);
		let Instruction::IfNe(skip) = decoded[1].instruction else { panic!("expected ifne, got {:?}", decoded[1]) };
		assert_eq!(decoded[3].label, Some(skip));
		let Instruction::Goto(target) = decoded[2].instruction else { panic!("expected goto, got {:?}", decoded[2]) };
		assert_eq!(decoded[40_004].label, Some(target));
		assert_eq!(decoded[40_004].instruction, Instruction::Return);
		assert!(contains(&bytes, b"StackMapTable"));
		Ok(())
	}

	#[test]
	fn backward_goto_widening() -> Result<()> {
		let mut instructions = vec![(Some(0), Instruction::Nop)];
		instructions.extend((0..40_000).map(|_| (None, Instruction::Nop)));
		instructions.push((None, Instruction::Goto(Label::new(0))));
		let class = class_with_method(Version::V1_8, "()V", instructions);

		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;
		assert_eq!(code(&decoded).instructions, code(&class).instructions);
		Ok(())
	}

	#[test]
	fn unreachable_code_is_replaced() -> Result<()> {
		let mut class = class_with_method(Version::V1_8, "()V", vec![
			(Some(0), Instruction::Nop),
			(None, Instruction::Return),
			(None, Instruction::IConst1),
			(Some(1), Instruction::IConst2),
			(None, Instruction::IAdd),
			(Some(2), Instruction::Return),
		]);
		class.methods[0].code.as_mut().unwrap().exception_table.push(Exception {
			start: Label::new(0),
			end: Label::new(2),
			handler: Label::new(2),
			catch: None,
		});
		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;
		let code = code(&decoded);

		let instructions: Vec<_> = code.instructions.iter().map(|entry| entry.instruction.clone()).collect();
		assert_eq!(instructions, vec![
			Instruction::Nop,
			Instruction::Return,
			Instruction::Nop,
			Instruction::Nop,
			Instruction::AThrow,
			Instruction::Return,
		]);
		// the range now only covers the reachable instructions
		assert_eq!(code.exception_table.len(), 1);
		assert_eq!(code.exception_table[0].start, code.instructions[0].label.unwrap());
		assert_eq!(code.exception_table[0].end, code.instructions[2].label.unwrap());
		assert!(code.max_stack >= Some(1));
		Ok(())
	}

	#[test]
	fn subroutines() -> Result<()> {
		let instructions = || vec![
			(None, Instruction::Jsr(Label::new(0))),
			(None, Instruction::Return),
			(Some(0), Instruction::AStore(LvIndex { index: 0 })),
			(None, Instruction::Ret(LvIndex { index: 0 })),
		];
		let mut class = class_with_method(Version::V1_6, "()V", instructions());
		class.methods[0].code.as_mut().unwrap().max_stack = Some(1);
		class.methods[0].code.as_mut().unwrap().max_locals = Some(1);
		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;
		assert_eq!(code(&decoded).instructions, code(&class).instructions);

		let class = class_with_method(Version::V1_8, "()V", instructions());
		let e = encode(&class, &WriteOptions::default()).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Verification { instruction: 0 }));
		Ok(())
	}

	#[test]
	fn verification_error_kind_survives() {
		let class = class_with_method(Version::V1_8, "()V", vec![
			(None, Instruction::IAdd),
			(None, Instruction::Return),
		]);
		let options = WriteOptions { hierarchy: &NoHierarchy, ..WriteOptions::default() };
		let e = encode(&class, &options).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Verification { instruction: 0 }));
	}

	#[test]
	fn unknown_attributes_survive() -> Result<()> {
		let mut class = class_with_method(Version::V1_5, "()V", vec![
			(None, Instruction::Return),
		]);
		class.attributes.push(Attribute::new("Custom", vec![1, 2, 3, 0xff]));
		class.methods[0].attributes.push(Attribute::new("Empty", Vec::new()));
		class.methods[0].code.as_mut().unwrap().attributes.push(Attribute::new("InCode", vec![9]));

		let bytes = encode(&class, &WriteOptions::default())?;
		assert!(!contains(&bytes, b"StackMapTable"));
		let decoded = decode(&bytes)?;
		assert_eq!(decoded.attributes, class.attributes);
		assert_eq!(decoded.methods[0].attributes, class.methods[0].attributes);
		assert_eq!(code(&decoded).attributes, code(&class).attributes);
		Ok(())
	}

	#[test]
	fn unbound_label() {
		let class = class_with_method(Version::V1_8, "()V", vec![
			(None, Instruction::Goto(Label::new(4))),
		]);
		let e = encode(&class, &WriteOptions::default()).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::UnresolvedLabel { label: "L4".to_owned() }));
	}

	#[test]
	fn unreachable_locals_count_without_frames() -> Result<()> {
		let instructions = || vec![
			(None, Instruction::Return),
			(None, Instruction::ILoad(LvIndex { index: 5 })),
			(None, Instruction::Pop),
			(None, Instruction::LLoad(LvIndex { index: 7 })),
			(None, Instruction::Pop2),
			(None, Instruction::Return),
		];

		let class = class_with_method(Version::V1_5, "()V", instructions());
		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;
		assert_eq!(code(&decoded).max_locals, Some(9));
		assert_eq!(code(&decoded).instructions, code(&class).instructions);

		let class = class_with_method(Version::V1_8, "()V", instructions());
		let options = WriteOptions { compute_frames: false, ..WriteOptions::default() };
		let decoded = decode(&encode(&class, &options)?)?;
		assert_eq!(code(&decoded).max_locals, Some(9));

		// with frames, the unreachable code is replaced, and needs no locals
		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;
		assert_eq!(code(&decoded).max_locals, Some(0));
		Ok(())
	}

	#[test]
	fn exception_parameter_annotations_follow_the_exception_table() -> Result<()> {
		let mut class = class_with_method(Version::V1_8, "()V", vec![
			(Some(0), Instruction::Nop),
			(None, Instruction::Return),
			(Some(1), Instruction::IConst1),
			(Some(2), Instruction::Pop),
			(Some(3), Instruction::AThrow),
		]);
		let body = class.methods[0].code.as_mut().unwrap();
		// the first entry only covers unreachable code, so it's not written
		body.exception_table.push(Exception { start: Label::new(1), end: Label::new(2), handler: Label::new(3), catch: None });
		body.exception_table.push(Exception { start: Label::new(0), end: Label::new(1), handler: Label::new(3), catch: None });
		for index in 0..2 {
			let annotation = Annotation::new(FieldDescriptor::try_from(format!("LA{index};"))?);
			body.type_annotations.visible.push(TypeAnnotation::new(TargetInfoCode::ExceptionParameter { index }, TypePath::default(), annotation));
		}

		let decoded = decode(&encode(&class, &WriteOptions::default())?)?;
		let code = code(&decoded);
		assert_eq!(code.exception_table.len(), 1);
		assert_eq!(code.type_annotations.visible.len(), 1);
		let type_annotation = &code.type_annotations.visible[0];
		assert_eq!(type_annotation.type_reference, TargetInfoCode::ExceptionParameter { index: 0 });
		assert_eq!(type_annotation.annotation.annotation_type.as_str(), "LA1;");
		Ok(())
	}

	#[test]
	fn inverted_branch_at_the_code_size_limit() {
		let code = Code::default();
		let label = Label::new(0);
		let mut wide = HashSet::new();
		wide.insert(0);

		let mut attempt = Attempt::new(&code);
		assert!(attempt.conditional(&wide, u16::MAX - 1, 0, &label, opcode::IFEQ, opcode::IFNE).is_err());

		let mut attempt = Attempt::new(&code);
		attempt.labels.add_opcode_pos_label(label, 0);
		assert!(attempt.conditional(&HashSet::new(), u16::MAX - 1, 0, &label, opcode::IFEQ, opcode::IFNE).is_err());

		let mut attempt = Attempt::new(&code);
		assert!(attempt.conditional(&wide, u16::MAX - 3, 0, &label, opcode::IFEQ, opcode::IFNE).is_ok());
	}
}
