//! Computes stack map frames, as well as `max_stack` and `max_locals` of methods.
//!
//! The types of the local variables and the operand stack are found by a dataflow pass over the instructions of a
//! method: starting with the frame given by the method descriptor, the effect of each instruction is applied and the
//! resulting frame is merged into all the instructions that may execute next, until nothing changes anymore.
//!
//! Merging two class types needs knowledge of the class hierarchy, which is asked from a [`HierarchyOracle`].

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, trace};
use crate::error::{OrTranslationError, TranslationError};
use crate::tree::class::{ClassFile, ClassName};
use crate::tree::descriptor::Type;
use crate::tree::field::FieldDescriptor;
use crate::tree::method::{Method, MethodRef};
use crate::tree::method::code::{Code, Instruction, Label, Loadable, LvIndex};

/// Answers questions about the class hierarchy.
pub trait HierarchyOracle {
	/// Finds the nearest common super class of two classes. Neither of them is an array class.
	///
	/// Returns [`None`] if the answer isn't known.
	fn common_super_class(&self, a: &ClassName, b: &ClassName) -> Result<Option<ClassName>>;
}

/// Answers every question with `java/lang/Object`.
///
/// This is always correct for the verifier as long as no value of the merged type is used as anything more specific
/// than an object.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectFallback;

impl HierarchyOracle for ObjectFallback {
	fn common_super_class(&self, _a: &ClassName, _b: &ClassName) -> Result<Option<ClassName>> {
		Ok(Some(ClassName::java_lang_object()))
	}
}

/// Knows nothing about the class hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHierarchy;

impl HierarchyOracle for NoHierarchy {
	fn common_super_class(&self, _a: &ClassName, _b: &ClassName) -> Result<Option<ClassName>> {
		Ok(None)
	}
}

/// A class hierarchy given by a map from each class to its super class.
#[derive(Debug, Clone, Default)]
pub struct MapHierarchy {
	super_classes: HashMap<ClassName, ClassName>,
}

impl MapHierarchy {
	pub fn new() -> MapHierarchy {
		MapHierarchy::default()
	}

	pub fn insert(&mut self, class: ClassName, super_class: ClassName) {
		self.super_classes.insert(class, super_class);
	}

	pub fn contains(&self, class: &ClassName) -> bool {
		self.super_classes.contains_key(class)
	}

	/// The class itself, followed by all its known super classes.
	fn chain(&self, class: &ClassName) -> Vec<ClassName> {
		let mut chain = vec![class.clone()];
		let mut current = class;
		while let Some(super_class) = self.super_classes.get(current) {
			if chain.contains(super_class) {
				break;
			}
			chain.push(super_class.clone());
			current = super_class;
		}
		chain
	}
}

impl HierarchyOracle for MapHierarchy {
	fn common_super_class(&self, a: &ClassName, b: &ClassName) -> Result<Option<ClassName>> {
		let chain_a = self.chain(a);
		Ok(self.chain(b).into_iter().find(|class| chain_a.contains(class)))
	}
}

/// The type of a local variable or of a value on the operand stack, as seen by the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationType {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	/// The `this` of a constructor, before the super constructor was called.
	UninitializedThis,
	Object(ClassName),
	/// An object created by the `new` instruction at this index in the instruction list, before its constructor was
	/// called.
	Uninitialized(usize),
}

type V = VerificationType;

impl VerificationType {
	/// The type of a value of the given field type.
	pub fn of_type(t: &Type) -> VerificationType {
		match t {
			Type::B | Type::C | Type::I | Type::S | Type::Z => V::Integer,
			Type::F => V::Float,
			Type::J => V::Long,
			Type::D => V::Double,
			Type::Object(class_name) => V::Object(class_name.clone()),
			Type::Array(..) => V::Object(ClassName::new_unchecked(t.write().into_inner())),
		}
	}

	/// The number of local variable slots or operand stack entries this type takes up.
	pub fn size(&self) -> u16 {
		if self.is_wide() { 2 } else { 1 }
	}

	fn is_wide(&self) -> bool {
		matches!(self, V::Long | V::Double)
	}

	fn is_reference(&self) -> bool {
		matches!(self, V::Null | V::Object(_) | V::UninitializedThis | V::Uninitialized(_))
	}
}

impl Display for VerificationType {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			V::Top => write!(f, "top"),
			V::Integer => write!(f, "int"),
			V::Float => write!(f, "float"),
			V::Long => write!(f, "long"),
			V::Double => write!(f, "double"),
			V::Null => write!(f, "null"),
			V::UninitializedThis => write!(f, "uninitializedThis"),
			V::Object(class_name) => write!(f, "{class_name}"),
			V::Uninitialized(index) => write!(f, "uninitialized({index})"),
		}
	}
}

/// The types of the local variables and the operand stack at a position in the code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
	/// One entry per local variable slot. A `long` or `double` is followed by a [`VerificationType::Top`] for its
	/// second slot. There are no trailing [`VerificationType::Top`]s other than such second slots.
	pub locals: Vec<VerificationType>,
	/// One entry per value, so that a `long` or `double` only takes up one entry.
	pub stack: Vec<VerificationType>,
}

impl Frame {
	/// The size of the operand stack, counting `long` and `double` twice.
	pub fn stack_size(&self) -> usize {
		self.stack.iter().map(|t| t.size() as usize).sum()
	}

	fn trim(&mut self) {
		while let Some(V::Top) = self.locals.last() {
			let len = self.locals.len();
			if len >= 2 && self.locals[len - 2].is_wide() {
				break;
			}
			self.locals.pop();
		}
	}

	fn push(&mut self, t: VerificationType) {
		self.stack.push(t);
	}

	fn pop(&mut self) -> Result<VerificationType> {
		self.stack.pop().context("operand stack is empty")
	}

	fn pop_exact(&mut self, expected: VerificationType) -> Result<()> {
		let t = self.pop()?;
		if t != expected {
			bail!("expected {expected} on the operand stack, got {t}");
		}
		Ok(())
	}

	fn pop_reference(&mut self) -> Result<VerificationType> {
		let t = self.pop()?;
		if !t.is_reference() {
			bail!("expected a reference on the operand stack, got {t}");
		}
		Ok(t)
	}

	fn pop_category_1(&mut self) -> Result<VerificationType> {
		let t = self.pop()?;
		if t.is_wide() || t == V::Top {
			bail!("expected a value of category 1 on the operand stack, got {t}");
		}
		Ok(t)
	}

	/// Pops a value of a type given in a descriptor.
	fn pop_type(&mut self, t: &Type) -> Result<()> {
		match VerificationType::of_type(t) {
			V::Object(_) => self.pop_reference().map(|_| ()),
			t => self.pop_exact(t),
		}
	}

	fn load(&self, index: LvIndex) -> Result<&VerificationType> {
		self.locals.get(index.index as usize)
			.with_context(|| anyhow!("local variable {} is unset", index.index))
	}

	fn load_exact(&self, index: LvIndex, expected: VerificationType) -> Result<()> {
		let t = self.load(index)?;
		if *t != expected {
			bail!("expected {expected} in local variable {}, got {t}", index.index);
		}
		Ok(())
	}

	fn load_reference(&self, index: LvIndex) -> Result<VerificationType> {
		let t = self.load(index)?;
		if !t.is_reference() {
			bail!("expected a reference in local variable {}, got {t}", index.index);
		}
		Ok(t.clone())
	}

	fn store(&mut self, index: LvIndex, t: VerificationType) {
		let index = index.index as usize;
		let size = t.size() as usize;
		if self.locals.len() < index + size {
			self.locals.resize(index + size, V::Top);
		}
		// overwriting the second half of a `long` or `double` invalidates it
		if index > 0 && self.locals[index - 1].is_wide() {
			self.locals[index - 1] = V::Top;
		}
		if t.is_wide() {
			self.locals[index + 1] = V::Top;
		}
		self.locals[index] = t;
	}

	fn replace(&mut self, from: &VerificationType, to: &VerificationType) {
		for t in self.locals.iter_mut().chain(self.stack.iter_mut()) {
			if t == from {
				*t = to.clone();
			}
		}
	}
}

/// The result of [`compute_frames`].
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedFrames {
	/// The frame given by the method descriptor.
	pub entry: Frame,
	/// The frame before each instruction, [`None`] if the instruction can never be executed.
	pub frames: Vec<Option<Frame>>,
	/// The indices of the instructions that need an explicit frame in the `StackMapTable` attribute.
	pub required: BTreeSet<usize>,
	pub max_stack: u16,
	pub max_locals: u16,
}

impl ComputedFrames {
	pub fn is_reachable(&self, index: usize) -> bool {
		self.frames.get(index).is_some_and(Option::is_some)
	}

	pub fn has_unreachable_code(&self) -> bool {
		self.frames.iter().any(Option::is_none)
	}

	/// The frames that need to be written, ordered by instruction index.
	pub fn explicit_frames(&self) -> impl Iterator<Item=(usize, &Frame)> + '_ {
		self.required.iter()
			.filter_map(|&index| Some((index, self.frames.get(index)?.as_ref()?)))
	}
}

/// Computes the frames of a method with code.
///
/// Fails with [`TranslationError::Verification`] if an instruction can't execute with the types it gets, or if two
/// frames can't be merged.
pub fn compute_frames(class: &ClassFile, method: &Method, hierarchy: &dyn HierarchyOracle) -> Result<ComputedFrames> {
	let code = method.code.as_ref()
		.with_context(|| anyhow!("method {}{} has no code", method.name, method.descriptor))?;
	code.check_labels()?;

	if code.instructions.is_empty() {
		return Err(anyhow!("method {}{} has no instructions", method.name, method.descriptor))
			.or_translation_error(|| TranslationError::Verification { instruction: 0 });
	}

	let entry = entry_frame(class, method)?;
	let positions = code.label_positions();

	let mut handlers = Vec::new();
	for exception in &code.exception_table {
		let position = |label: &Label| positions.get(label).copied()
			.with_context(|| anyhow!("no position for label {label}"));
		let handler = position(&exception.handler)?;
		if handler >= code.instructions.len() {
			return Err(anyhow!("exception handler {} is at the end of the code", exception.handler))
				.or_translation_error(|| TranslationError::Verification { instruction: handler });
		}
		handlers.push(Handler {
			start: position(&exception.start)?,
			end: position(&exception.end)?,
			handler,
			catch: exception.catch.clone()
				.unwrap_or_else(|| ClassName::new_unchecked(ClassName::JAVA_LANG_THROWABLE)),
		});
	}

	let mut analyzer = Analyzer {
		class,
		method,
		code,
		hierarchy,
		positions,
		handlers,
		frames: vec![None; code.instructions.len()],
		worklist: BTreeSet::new(),
		max_stack: 0,
		max_locals: entry.locals.len(),
	};
	analyzer.run(entry.clone())
		.with_context(|| anyhow!("failed to compute frames of method {}{}", method.name, method.descriptor))?;

	let mut required = BTreeSet::new();
	for (index, entry) in code.instructions.iter().enumerate() {
		if analyzer.frames[index].is_none() {
			continue;
		}
		entry.instruction.for_each_label(|label| {
			if let Some(&position) = analyzer.positions.get(&label) {
				required.insert(position);
			}
		});
		if entry.instruction.ends_flow() && analyzer.frames.get(index + 1).is_some_and(Option::is_some) {
			required.insert(index + 1);
		}
	}
	for handler in &analyzer.handlers {
		if analyzer.frames[handler.handler].is_some() {
			required.insert(handler.handler);
		}
	}

	let max_stack = u16::try_from(analyzer.max_stack)
		.with_context(|| anyhow!("max stack of {} doesn't fit into u16", analyzer.max_stack))
		.or_translation_error(|| TranslationError::Encoding)?;
	let max_locals = u16::try_from(analyzer.max_locals)
		.with_context(|| anyhow!("max locals of {} doesn't fit into u16", analyzer.max_locals))
		.or_translation_error(|| TranslationError::Encoding)?;

	debug!("computed {} frames for method {}{}, max stack {max_stack}, max locals {max_locals}",
		required.len(), method.name, method.descriptor);

	Ok(ComputedFrames {
		entry,
		frames: analyzer.frames,
		required,
		max_stack,
		max_locals,
	})
}

fn entry_frame(class: &ClassFile, method: &Method) -> Result<Frame> {
	let mut frame = Frame::default();
	if !method.access.is_static {
		if method.is_constructor() && class.name != ClassName::JAVA_LANG_OBJECT {
			frame.locals.push(V::UninitializedThis);
		} else {
			frame.locals.push(V::Object(class.name.clone()));
		}
	}
	for parameter in method.descriptor.parse()?.parameter_descriptors {
		let t = VerificationType::of_type(&parameter);
		let wide = t.is_wide();
		frame.locals.push(t);
		if wide {
			frame.locals.push(V::Top);
		}
	}
	Ok(frame)
}

struct Handler {
	start: usize,
	end: usize,
	handler: usize,
	catch: ClassName,
}

struct Analyzer<'a> {
	class: &'a ClassFile,
	method: &'a Method,
	code: &'a Code,
	hierarchy: &'a dyn HierarchyOracle,
	positions: HashMap<Label, usize>,
	handlers: Vec<Handler>,
	frames: Vec<Option<Frame>>,
	worklist: BTreeSet<usize>,
	max_stack: usize,
	max_locals: usize,
}

impl Analyzer<'_> {
	fn run(&mut self, entry: Frame) -> Result<()> {
		self.frames[0] = Some(entry);
		self.worklist.insert(0);

		while let Some(index) = self.worklist.pop_first() {
			self.step(index)
				.with_context(|| anyhow!("at instruction {index}: {:?}", self.code.instructions[index].instruction))
				.or_translation_error(|| TranslationError::Verification { instruction: index })?;
		}
		Ok(())
	}

	fn step(&mut self, index: usize) -> Result<()> {
		let Some(before) = self.frames[index].clone() else {
			return Ok(());
		};
		let instruction = &self.code.instructions[index].instruction;

		let mut after = before.clone();
		self.execute(index, instruction, &mut after)?;
		after.trim();

		self.max_stack = self.max_stack.max(before.stack_size()).max(after.stack_size());
		self.max_locals = self.max_locals.max(after.locals.len());

		let handlers: Vec<(usize, ClassName)> = self.handlers.iter()
			.filter(|handler| handler.start <= index && index < handler.end)
			.map(|handler| (handler.handler, handler.catch.clone()))
			.collect();
		for (handler, catch) in handlers {
			self.max_stack = self.max_stack.max(1);
			for locals in [&before.locals, &after.locals] {
				let frame = Frame {
					locals: locals.clone(),
					stack: vec![V::Object(catch.clone())],
				};
				self.merge_into(handler, frame)?;
			}
		}

		let mut targets = Vec::new();
		instruction.for_each_label(|label| targets.push(label));
		for label in targets {
			let target = self.position(label)?;
			self.merge_into(target, after.clone())?;
		}

		if !instruction.ends_flow() {
			let next = index + 1;
			if next >= self.code.instructions.len() {
				bail!("execution falls off the end of the code");
			}
			self.merge_into(next, after)?;
		}

		Ok(())
	}

	fn position(&self, label: Label) -> Result<usize> {
		let position = self.positions.get(&label).copied()
			.with_context(|| anyhow!("no position for label {label}"))?;
		if position >= self.code.instructions.len() {
			bail!("can't jump to label {label} at the end of the code");
		}
		Ok(position)
	}

	fn merge_into(&mut self, target: usize, mut frame: Frame) -> Result<()> {
		frame.trim();
		let merged = match &self.frames[target] {
			None => frame,
			Some(old) => {
				let merged = self.merge(old, &frame)
					.with_context(|| anyhow!("failed to merge frames at instruction {target}"))
					.or_translation_error(|| TranslationError::Verification { instruction: target })?;
				if &merged == old {
					return Ok(());
				}
				merged
			},
		};
		trace!("frame at instruction {target}: {merged:?}");
		self.frames[target] = Some(merged);
		self.worklist.insert(target);
		Ok(())
	}

	fn merge(&self, old: &Frame, new: &Frame) -> Result<Frame> {
		if old.stack.len() != new.stack.len() {
			bail!("operand stacks have different depths: {} and {}", old.stack.len(), new.stack.len());
		}
		let stack = old.stack.iter().zip(&new.stack)
			.map(|(a, b)| self.merge_stack_value(a, b))
			.collect::<Result<Vec<_>>>()?;

		let top = V::Top;
		let len = old.locals.len().max(new.locals.len());
		let mut locals = Vec::with_capacity(len);
		for i in 0..len {
			let a = old.locals.get(i).unwrap_or(&top);
			let b = new.locals.get(i).unwrap_or(&top);
			locals.push(self.merge_local(a, b)?);
		}
		// a `long` or `double` whose second half was lost is unusable
		for i in 0..locals.len() {
			if locals[i].is_wide() && locals.get(i + 1) != Some(&V::Top) {
				locals[i] = V::Top;
			}
		}

		let mut frame = Frame { locals, stack };
		frame.trim();
		Ok(frame)
	}

	fn merge_local(&self, a: &VerificationType, b: &VerificationType) -> Result<VerificationType> {
		if let (V::Object(x), V::Object(y)) = (a, b) {
			return Ok(V::Object(self.merge_classes(x, y)?));
		}
		Ok(merge_same_kind(a, b).unwrap_or(V::Top))
	}

	fn merge_stack_value(&self, a: &VerificationType, b: &VerificationType) -> Result<VerificationType> {
		if let (V::Object(x), V::Object(y)) = (a, b) {
			return Ok(V::Object(self.merge_classes(x, y)?));
		}
		merge_same_kind(a, b)
			.with_context(|| anyhow!("can't merge {a} and {b} on the operand stack"))
	}

	fn merge_classes(&self, a: &ClassName, b: &ClassName) -> Result<ClassName> {
		if a == b {
			return Ok(a.clone());
		}
		if a == ClassName::JAVA_LANG_OBJECT || b == ClassName::JAVA_LANG_OBJECT {
			return Ok(ClassName::java_lang_object());
		}
		match (a.is_array(), b.is_array()) {
			(true, true) => {
				let component_a = Type::from_class_name(a)?.array_component().and_then(|t| t.to_class_name());
				let component_b = Type::from_class_name(b)?.array_component().and_then(|t| t.to_class_name());
				match (component_a, component_b) {
					(Some(x), Some(y)) => {
						let merged = self.merge_classes(&x, &y)?;
						array_of(&merged)
					},
					// arrays of different primitives
					_ => Ok(ClassName::java_lang_object()),
				}
			},
			(false, false) => {
				let merged = self.hierarchy.common_super_class(a, b)?
					.with_context(|| anyhow!("no common super class of {a} and {b} is known"))?;
				trace!("common super class of {a} and {b} is {merged}");
				Ok(merged)
			},
			_ => Ok(ClassName::java_lang_object()),
		}
	}

	fn return_type(&self) -> Result<Option<Type>> {
		Ok(self.method.descriptor.parse()?.return_descriptor)
	}

	fn invoke(&self, method_ref: &MethodRef, has_receiver: bool, frame: &mut Frame) -> Result<Option<VerificationType>> {
		let descriptor = method_ref.desc.parse()?;
		for parameter in descriptor.parameter_descriptors.iter().rev() {
			frame.pop_type(parameter)?;
		}
		let receiver = if has_receiver { Some(frame.pop_reference()?) } else { None };
		if let Some(return_type) = &descriptor.return_descriptor {
			frame.push(VerificationType::of_type(return_type));
		}
		Ok(receiver)
	}

	fn execute(&self, index: usize, instruction: &Instruction, f: &mut Frame) -> Result<()> {
		match instruction {
			Instruction::Nop => {},
			Instruction::AConstNull => f.push(V::Null),
			Instruction::IConstM1 | Instruction::IConst0 | Instruction::IConst1 | Instruction::IConst2 |
			Instruction::IConst3 | Instruction::IConst4 | Instruction::IConst5 |
			Instruction::BiPush(_) | Instruction::SiPush(_) => f.push(V::Integer),
			Instruction::LConst0 | Instruction::LConst1 => f.push(V::Long),
			Instruction::FConst0 | Instruction::FConst1 | Instruction::FConst2 => f.push(V::Float),
			Instruction::DConst0 | Instruction::DConst1 => f.push(V::Double),
			Instruction::Ldc(loadable) => f.push(loadable_type(loadable)?),
			&Instruction::ILoad(lv) => {
				f.load_exact(lv, V::Integer)?;
				f.push(V::Integer);
			},
			&Instruction::LLoad(lv) => {
				f.load_exact(lv, V::Long)?;
				f.push(V::Long);
			},
			&Instruction::FLoad(lv) => {
				f.load_exact(lv, V::Float)?;
				f.push(V::Float);
			},
			&Instruction::DLoad(lv) => {
				f.load_exact(lv, V::Double)?;
				f.push(V::Double);
			},
			&Instruction::ALoad(lv) => {
				let t = f.load_reference(lv)?;
				f.push(t);
			},
			Instruction::IALoad | Instruction::BALoad | Instruction::CALoad | Instruction::SALoad => {
				array_load(f, V::Integer)?;
			},
			Instruction::LALoad => array_load(f, V::Long)?,
			Instruction::FALoad => array_load(f, V::Float)?,
			Instruction::DALoad => array_load(f, V::Double)?,
			Instruction::AALoad => {
				f.pop_exact(V::Integer)?;
				let array = f.pop_reference()?;
				f.push(array_component(&array)?);
			},
			&Instruction::IStore(lv) => {
				f.pop_exact(V::Integer)?;
				f.store(lv, V::Integer);
			},
			&Instruction::LStore(lv) => {
				f.pop_exact(V::Long)?;
				f.store(lv, V::Long);
			},
			&Instruction::FStore(lv) => {
				f.pop_exact(V::Float)?;
				f.store(lv, V::Float);
			},
			&Instruction::DStore(lv) => {
				f.pop_exact(V::Double)?;
				f.store(lv, V::Double);
			},
			&Instruction::AStore(lv) => {
				let t = f.pop_reference()?;
				f.store(lv, t);
			},
			Instruction::IAStore | Instruction::BAStore | Instruction::CAStore | Instruction::SAStore => {
				array_store(f, V::Integer)?;
			},
			Instruction::LAStore => array_store(f, V::Long)?,
			Instruction::FAStore => array_store(f, V::Float)?,
			Instruction::DAStore => array_store(f, V::Double)?,
			Instruction::AAStore => {
				f.pop_reference()?;
				f.pop_exact(V::Integer)?;
				f.pop_reference()?;
			},
			Instruction::Pop => {
				f.pop_category_1()?;
			},
			Instruction::Pop2 => {
				if !f.pop()?.is_wide() {
					f.pop_category_1()?;
				}
			},
			Instruction::Dup => {
				let v1 = f.pop_category_1()?;
				f.push(v1.clone());
				f.push(v1);
			},
			Instruction::DupX1 => {
				let v1 = f.pop_category_1()?;
				let v2 = f.pop_category_1()?;
				f.push(v1.clone());
				f.push(v2);
				f.push(v1);
			},
			Instruction::DupX2 => {
				let v1 = f.pop_category_1()?;
				let v2 = f.pop()?;
				if v2.is_wide() {
					f.push(v1.clone());
					f.push(v2);
					f.push(v1);
				} else {
					let v3 = f.pop_category_1()?;
					f.push(v1.clone());
					f.push(v3);
					f.push(v2);
					f.push(v1);
				}
			},
			Instruction::Dup2 => {
				let v1 = f.pop()?;
				if v1.is_wide() {
					f.push(v1.clone());
					f.push(v1);
				} else {
					let v2 = f.pop_category_1()?;
					f.push(v2.clone());
					f.push(v1.clone());
					f.push(v2);
					f.push(v1);
				}
			},
			Instruction::Dup2X1 => {
				let v1 = f.pop()?;
				if v1.is_wide() {
					let v2 = f.pop_category_1()?;
					f.push(v1.clone());
					f.push(v2);
					f.push(v1);
				} else {
					let v2 = f.pop_category_1()?;
					let v3 = f.pop_category_1()?;
					f.push(v2.clone());
					f.push(v1.clone());
					f.push(v3);
					f.push(v2);
					f.push(v1);
				}
			},
			Instruction::Dup2X2 => {
				let v1 = f.pop()?;
				if v1.is_wide() {
					let v2 = f.pop()?;
					if v2.is_wide() {
						f.push(v1.clone());
						f.push(v2);
						f.push(v1);
					} else {
						let v3 = f.pop_category_1()?;
						f.push(v1.clone());
						f.push(v3);
						f.push(v2);
						f.push(v1);
					}
				} else {
					let v2 = f.pop_category_1()?;
					let v3 = f.pop()?;
					if v3.is_wide() {
						f.push(v2.clone());
						f.push(v1.clone());
						f.push(v3);
						f.push(v2);
						f.push(v1);
					} else {
						let v4 = f.pop_category_1()?;
						f.push(v2.clone());
						f.push(v1.clone());
						f.push(v4);
						f.push(v3);
						f.push(v2);
						f.push(v1);
					}
				}
			},
			Instruction::Swap => {
				let v1 = f.pop_category_1()?;
				let v2 = f.pop_category_1()?;
				f.push(v1);
				f.push(v2);
			},
			Instruction::IAdd | Instruction::ISub | Instruction::IMul | Instruction::IDiv | Instruction::IRem |
			Instruction::IShl | Instruction::IShr | Instruction::IUShr |
			Instruction::IAnd | Instruction::IOr | Instruction::IXor => binary(f, V::Integer)?,
			Instruction::LAdd | Instruction::LSub | Instruction::LMul | Instruction::LDiv | Instruction::LRem |
			Instruction::LAnd | Instruction::LOr | Instruction::LXor => binary(f, V::Long)?,
			Instruction::FAdd | Instruction::FSub | Instruction::FMul | Instruction::FDiv | Instruction::FRem => binary(f, V::Float)?,
			Instruction::DAdd | Instruction::DSub | Instruction::DMul | Instruction::DDiv | Instruction::DRem => binary(f, V::Double)?,
			Instruction::LShl | Instruction::LShr | Instruction::LUShr => {
				f.pop_exact(V::Integer)?;
				f.pop_exact(V::Long)?;
				f.push(V::Long);
			},
			Instruction::INeg => convert(f, V::Integer, V::Integer)?,
			Instruction::LNeg => convert(f, V::Long, V::Long)?,
			Instruction::FNeg => convert(f, V::Float, V::Float)?,
			Instruction::DNeg => convert(f, V::Double, V::Double)?,
			&Instruction::IInc(lv, _) => f.load_exact(lv, V::Integer)?,
			Instruction::I2L => convert(f, V::Integer, V::Long)?,
			Instruction::I2F => convert(f, V::Integer, V::Float)?,
			Instruction::I2D => convert(f, V::Integer, V::Double)?,
			Instruction::L2I => convert(f, V::Long, V::Integer)?,
			Instruction::L2F => convert(f, V::Long, V::Float)?,
			Instruction::L2D => convert(f, V::Long, V::Double)?,
			Instruction::F2I => convert(f, V::Float, V::Integer)?,
			Instruction::F2L => convert(f, V::Float, V::Long)?,
			Instruction::F2D => convert(f, V::Float, V::Double)?,
			Instruction::D2I => convert(f, V::Double, V::Integer)?,
			Instruction::D2L => convert(f, V::Double, V::Long)?,
			Instruction::D2F => convert(f, V::Double, V::Float)?,
			Instruction::I2B | Instruction::I2C | Instruction::I2S => convert(f, V::Integer, V::Integer)?,
			Instruction::LCmp => compare(f, V::Long)?,
			Instruction::FCmpL | Instruction::FCmpG => compare(f, V::Float)?,
			Instruction::DCmpL | Instruction::DCmpG => compare(f, V::Double)?,
			Instruction::IfEq(_) | Instruction::IfNe(_) | Instruction::IfLt(_) |
			Instruction::IfGe(_) | Instruction::IfGt(_) | Instruction::IfLe(_) |
			Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => f.pop_exact(V::Integer)?,
			Instruction::IfICmpEq(_) | Instruction::IfICmpNe(_) | Instruction::IfICmpLt(_) |
			Instruction::IfICmpGe(_) | Instruction::IfICmpGt(_) | Instruction::IfICmpLe(_) => {
				f.pop_exact(V::Integer)?;
				f.pop_exact(V::Integer)?;
			},
			Instruction::IfACmpEq(_) | Instruction::IfACmpNe(_) => {
				f.pop_reference()?;
				f.pop_reference()?;
			},
			Instruction::IfNull(_) | Instruction::IfNonNull(_) => {
				f.pop_reference()?;
			},
			Instruction::Goto(_) => {},
			Instruction::Jsr(_) | Instruction::Ret(_) => {
				bail!("subroutines (jsr and ret) can't be described by stack map frames");
			},
			Instruction::IReturn | Instruction::LReturn | Instruction::FReturn |
			Instruction::DReturn | Instruction::AReturn => {
				let return_type = self.return_type()?
					.with_context(|| anyhow!("can't return a value from a void method"))?;
				let expected = match instruction {
					Instruction::IReturn => V::Integer,
					Instruction::LReturn => V::Long,
					Instruction::FReturn => V::Float,
					Instruction::DReturn => V::Double,
					_ => V::Null,
				};
				let declared = VerificationType::of_type(&return_type);
				let matches = match declared {
					V::Object(_) => expected == V::Null,
					declared => declared == expected,
				};
				if !matches {
					bail!("return instruction doesn't match the return type {}", return_type.write());
				}
				f.pop_type(&return_type)?;
			},
			Instruction::Return => {
				if self.return_type()?.is_some() {
					bail!("can't return without value from a method returning a value");
				}
			},
			Instruction::GetStatic(field_ref) => {
				f.push(VerificationType::of_type(&field_ref.desc.parse()?));
			},
			Instruction::PutStatic(field_ref) => {
				f.pop_type(&field_ref.desc.parse()?)?;
			},
			Instruction::GetField(field_ref) => {
				f.pop_reference()?;
				f.push(VerificationType::of_type(&field_ref.desc.parse()?));
			},
			Instruction::PutField(field_ref) => {
				f.pop_type(&field_ref.desc.parse()?)?;
				f.pop_reference()?;
			},
			Instruction::InvokeVirtual(method_ref) | Instruction::InvokeInterface(method_ref) => {
				self.invoke(method_ref, true, f)?;
			},
			Instruction::InvokeStatic(method_ref, _) => {
				self.invoke(method_ref, false, f)?;
			},
			Instruction::InvokeSpecial(method_ref, _) => {
				let receiver = self.invoke(method_ref, true, f)?;
				if method_ref.name == "<init>" {
					let receiver = receiver.context("constructor call without receiver")?;
					let initialized = match &receiver {
						V::UninitializedThis => V::Object(self.class.name.clone()),
						&V::Uninitialized(new_index) => {
							match self.code.instructions.get(new_index).map(|entry| &entry.instruction) {
								Some(Instruction::New(class_name)) => V::Object(class_name.clone()),
								_ => bail!("uninitialized value not created by a `new` instruction"),
							}
						},
						other => bail!("constructor {}.<init> called on initialized value {other}", method_ref.class),
					};
					f.replace(&receiver, &initialized);
				}
			},
			Instruction::InvokeDynamic(invoke_dynamic) => {
				let descriptor = invoke_dynamic.descriptor.parse()?;
				for parameter in descriptor.parameter_descriptors.iter().rev() {
					f.pop_type(parameter)?;
				}
				if let Some(return_type) = &descriptor.return_descriptor {
					f.push(VerificationType::of_type(return_type));
				}
			},
			Instruction::New(_) => f.push(V::Uninitialized(index)),
			Instruction::NewArray(array_type) => {
				f.pop_exact(V::Integer)?;
				f.push(V::Object(ClassName::new_unchecked(array_type.array_descriptor())));
			},
			Instruction::ANewArray(class_name) => {
				f.pop_exact(V::Integer)?;
				f.push(V::Object(array_of(class_name)?));
			},
			Instruction::ArrayLength => {
				f.pop_reference()?;
				f.push(V::Integer);
			},
			Instruction::AThrow => {
				f.pop_reference()?;
			},
			Instruction::CheckCast(class_name) => {
				f.pop_reference()?;
				f.push(V::Object(class_name.clone()));
			},
			Instruction::InstanceOf(_) => {
				f.pop_reference()?;
				f.push(V::Integer);
			},
			Instruction::MonitorEnter | Instruction::MonitorExit => {
				f.pop_reference()?;
			},
			Instruction::MultiANewArray(class_name, dimensions) => {
				for _ in 0..*dimensions {
					f.pop_exact(V::Integer)?;
				}
				f.push(V::Object(class_name.clone()));
			},
		}
		Ok(())
	}
}

fn merge_same_kind(a: &VerificationType, b: &VerificationType) -> Option<VerificationType> {
	match (a, b) {
		_ if a == b => Some(a.clone()),
		(V::Null, V::Object(_)) => Some(b.clone()),
		(V::Object(_), V::Null) => Some(a.clone()),
		_ => None,
	}
}

fn array_of(class_name: &ClassName) -> Result<ClassName> {
	ClassName::try_from(format!("[{}", FieldDescriptor::from_class(class_name)))
}

fn array_component(array: &VerificationType) -> Result<VerificationType> {
	match array {
		V::Null => Ok(V::Null),
		V::Object(class_name) if class_name.is_array() => {
			let component = Type::from_class_name(class_name)?.array_component()
				.with_context(|| anyhow!("{class_name} has no component type"))?;
			match component {
				Type::Object(_) | Type::Array(..) => Ok(VerificationType::of_type(&component)),
				_ => bail!("expected an array of references, got {class_name}"),
			}
		},
		other => bail!("expected an array of references, got {other}"),
	}
}

fn loadable_type(loadable: &Loadable) -> Result<VerificationType> {
	Ok(match loadable {
		Loadable::Integer(_) => V::Integer,
		Loadable::Float(_) => V::Float,
		Loadable::Long(_) => V::Long,
		Loadable::Double(_) => V::Double,
		Loadable::Class(_) => V::Object(ClassName::new_unchecked("java/lang/Class")),
		Loadable::String(_) => V::Object(ClassName::new_unchecked("java/lang/String")),
		Loadable::MethodHandle(_) => V::Object(ClassName::new_unchecked("java/lang/invoke/MethodHandle")),
		Loadable::MethodType(_) => V::Object(ClassName::new_unchecked("java/lang/invoke/MethodType")),
		Loadable::Dynamic(dynamic) => VerificationType::of_type(&dynamic.descriptor.parse()?),
	})
}

fn array_load(f: &mut Frame, element: VerificationType) -> Result<()> {
	f.pop_exact(V::Integer)?;
	f.pop_reference()?;
	f.push(element);
	Ok(())
}

fn array_store(f: &mut Frame, element: VerificationType) -> Result<()> {
	f.pop_exact(element)?;
	f.pop_exact(V::Integer)?;
	f.pop_reference()?;
	Ok(())
}

fn binary(f: &mut Frame, t: VerificationType) -> Result<()> {
	f.pop_exact(t.clone())?;
	f.pop_exact(t.clone())?;
	f.push(t);
	Ok(())
}

fn convert(f: &mut Frame, from: VerificationType, to: VerificationType) -> Result<()> {
	f.pop_exact(from)?;
	f.push(to);
	Ok(())
}

fn compare(f: &mut Frame, t: VerificationType) -> Result<()> {
	f.pop_exact(t.clone())?;
	f.pop_exact(t)?;
	f.push(V::Integer);
	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::error::TranslationError;
	use crate::frames::{compute_frames, Frame, MapHierarchy, NoHierarchy, ObjectFallback, VerificationType, HierarchyOracle};
	use crate::tree::class::{ClassAccess, ClassFile, ClassName};
	use crate::tree::method::{Method, MethodAccess, MethodDescriptor, MethodName, MethodRef};
	use crate::tree::method::code::{Code, Instruction, InstructionListEntry, Label, LvIndex};
	use crate::tree::version::Version;

	fn class_name(s: &str) -> ClassName {
		ClassName::try_from(s).unwrap()
	}

	fn method(access: u16, name: &str, descriptor: &str, instructions: Vec<(Option<u16>, Instruction)>) -> Method {
		let mut method = Method::new(
			MethodAccess::from(access),
			MethodName::try_from(name).unwrap(),
			MethodDescriptor::try_from(descriptor).unwrap()
		);
		method.code = Some(Code {
			instructions: instructions.into_iter()
				.map(|(label, instruction)| InstructionListEntry { label: label.map(Label::new), instruction })
				.collect(),
			..Code::default()
		});
		method
	}

	fn class() -> ClassFile {
		ClassFile::new(Version::V1_8, ClassAccess::from(0x21), class_name("Test"), Some(ClassName::java_lang_object()), Vec::new())
	}

	/// `static Object pick(boolean b) { return b ? new A() : new B(); }`, with the value in local 1.
	fn merging_method() -> Method {
		let constructor = |class: &str| Instruction::InvokeSpecial(MethodRef {
			class: class_name(class),
			name: MethodName::try_from("<init>").unwrap(),
			desc: MethodDescriptor::try_from("()V").unwrap(),
		}, false);
		method(0x0008, "pick", "(Z)Ljava/lang/Object;", vec![
			(None, Instruction::ILoad(LvIndex { index: 0 })),
			(None, Instruction::IfEq(Label::new(0))),
			(None, Instruction::New(class_name("A"))),
			(None, Instruction::Dup),
			(None, constructor("A")),
			(None, Instruction::AStore(LvIndex { index: 1 })),
			(None, Instruction::Goto(Label::new(1))),
			(Some(0), Instruction::New(class_name("B"))),
			(None, Instruction::Dup),
			(None, constructor("B")),
			(None, Instruction::AStore(LvIndex { index: 1 })),
			(Some(1), Instruction::ALoad(LvIndex { index: 1 })),
			(None, Instruction::AReturn),
		])
	}

	#[test]
	fn straight_line_maxs() -> Result<()> {
		let method = method(0x0008, "run", "()V", vec![
			(None, Instruction::IConst1),
			(None, Instruction::IConst2),
			(None, Instruction::IAdd),
			(None, Instruction::Pop),
			(None, Instruction::Return),
		]);
		let frames = compute_frames(&class(), &method, &ObjectFallback)?;
		assert_eq!(frames.max_stack, 2);
		assert_eq!(frames.max_locals, 0);
		assert!(frames.required.is_empty());
		Ok(())
	}

	#[test]
	fn merge_without_hierarchy() {
		let e = compute_frames(&class(), &merging_method(), &NoHierarchy).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Verification { instruction: 11 }));
	}

	#[test]
	fn merge_with_hierarchy() -> Result<()> {
		let mut hierarchy = MapHierarchy::new();
		hierarchy.insert(class_name("A"), class_name("Base"));
		hierarchy.insert(class_name("B"), class_name("Base"));
		hierarchy.insert(class_name("Base"), ClassName::java_lang_object());
		assert_eq!(hierarchy.common_super_class(&class_name("A"), &class_name("B"))?, Some(class_name("Base")));

		let frames = compute_frames(&class(), &merging_method(), &hierarchy)?;
		assert_eq!(frames.frames[11], Some(Frame {
			locals: vec![VerificationType::Integer, VerificationType::Object(class_name("Base"))],
			stack: vec![],
		}));
		assert_eq!(frames.required.iter().copied().collect::<Vec<_>>(), vec![7, 11]);
		assert_eq!(frames.max_stack, 2);
		assert_eq!(frames.max_locals, 2);
		Ok(())
	}

	#[test]
	fn different_kinds_in_locals_become_top() -> Result<()> {
		let method = method(0x0008, "run", "(Z)V", vec![
			(None, Instruction::ILoad(LvIndex { index: 0 })),
			(None, Instruction::IfEq(Label::new(0))),
			(None, Instruction::LConst0),
			(None, Instruction::LStore(LvIndex { index: 1 })),
			(None, Instruction::Goto(Label::new(1))),
			(Some(0), Instruction::FConst0),
			(None, Instruction::FStore(LvIndex { index: 1 })),
			(Some(1), Instruction::Return),
		]);
		let frames = compute_frames(&class(), &method, &NoHierarchy)?;
		assert_eq!(frames.frames[7], Some(Frame {
			locals: vec![VerificationType::Integer],
			stack: vec![],
		}));
		assert_eq!(frames.max_locals, 3);
		Ok(())
	}

	#[test]
	fn constructor_initializes_this() -> Result<()> {
		let mut method = method(0x0001, "<init>", "()V", vec![
			(None, Instruction::ALoad(LvIndex { index: 0 })),
			(None, Instruction::InvokeSpecial(MethodRef {
				class: ClassName::java_lang_object(),
				name: MethodName::try_from("<init>")?,
				desc: MethodDescriptor::try_from("()V")?,
			}, false)),
			(None, Instruction::Return),
		]);
		let frames = compute_frames(&class(), &method, &NoHierarchy)?;
		assert_eq!(frames.entry.locals, vec![VerificationType::UninitializedThis]);
		assert_eq!(frames.frames[2].as_ref().map(|f| f.locals.clone()), Some(vec![VerificationType::Object(class_name("Test"))]));

		// the stack underflows without the `aload_0`
		method.code.as_mut().unwrap().instructions.remove(0);
		let e = compute_frames(&class(), &method, &NoHierarchy).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Verification { instruction: 0 }));
		Ok(())
	}

	#[test]
	fn unreachable_code() -> Result<()> {
		let method = method(0x0008, "run", "()V", vec![
			(None, Instruction::Return),
			(None, Instruction::IAdd),
		]);
		let frames = compute_frames(&class(), &method, &NoHierarchy)?;
		assert!(frames.is_reachable(0));
		assert!(!frames.is_reachable(1));
		assert!(frames.has_unreachable_code());
		Ok(())
	}

	#[test]
	fn falls_off_the_end() {
		let method = method(0x0008, "run", "()V", vec![
			(None, Instruction::Nop),
		]);
		let e = compute_frames(&class(), &method, &NoHierarchy).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::Verification { instruction: 0 }));
	}
}
