use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use anyhow::{bail, Result};
use java_string::JavaString;
use crate::class_constants::atype;
use crate::error::TranslationError;
use crate::tree::attribute::Attribute;
use crate::tree::class::ClassName;
use crate::tree::field::{FieldDescriptor, FieldName, FieldRef};
use crate::tree::method::{MethodDescriptor, MethodName, MethodRef};
use crate::tree::type_annotation::{TargetInfoCode, TypeAnnotations};

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionListEntry {
	pub label: Option<Label>,
	pub instruction: Instruction,
}

impl InstructionListEntry {
	pub fn new(instruction: Instruction) -> InstructionListEntry {
		InstructionListEntry { label: None, instruction }
	}
}

/// Represents the code of a method.
///
/// Stack map frames are not part of this, they get computed when writing a class file.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Code {
	pub max_stack: Option<u16>,
	pub max_locals: Option<u16>,

	pub instructions: Vec<InstructionListEntry>,
	pub exception_table: Vec<Exception>,
	/// The label of the end of the code, used by exception ranges and local variables ending with the last instruction.
	pub last_label: Option<Label>,

	pub line_numbers: Vec<(Label, u16)>,
	pub local_variables: Vec<Lv>,

	pub type_annotations: TypeAnnotations<TargetInfoCode>,

	pub attributes: Vec<Attribute>,
}

impl Code {
	/// Maps every bound label to its position: the index of the instruction it's on, or the length of the instruction
	/// list for the [last label][Code::last_label].
	pub fn label_positions(&self) -> HashMap<Label, usize> {
		let mut map: HashMap<Label, usize> = self.instructions.iter()
			.enumerate()
			.filter_map(|(index, entry)| entry.label.map(|label| (label, index)))
			.collect();
		if let Some(last_label) = self.last_label {
			map.insert(last_label, self.instructions.len());
		}
		map
	}

	fn referenced_labels(&self) -> Vec<Label> {
		let mut labels = Vec::new();
		for entry in &self.instructions {
			entry.instruction.for_each_label(|l| labels.push(l));
		}
		for exception in &self.exception_table {
			labels.extend([exception.start, exception.end, exception.handler]);
		}
		labels.extend(self.line_numbers.iter().map(|&(label, _)| label));
		for lv in &self.local_variables {
			labels.extend([lv.range.start, lv.range.end]);
		}
		for annotation in self.type_annotations.visible.iter().chain(&self.type_annotations.invisible) {
			annotation.type_reference.for_each_label(|l| labels.push(l));
		}
		labels
	}

	/// Checks that every label used is also bound to a position.
	pub fn check_labels(&self) -> Result<()> {
		let positions = self.label_positions();
		for label in self.referenced_labels() {
			if !positions.contains_key(&label) {
				return Err(anyhow::Error::new(TranslationError::UnresolvedLabel { label: label.to_string() }));
			}
		}
		Ok(())
	}

	/// Brings the labels into their canonical form.
	///
	/// Labels nothing refers to are removed, and the remaining ones are numbered in the order of their positions, starting
	/// at zero. The line numbers are then sorted by the position of their label, keeping the order of line numbers of the
	/// same position.
	pub fn canonicalize_labels(&mut self) -> Result<()> {
		self.check_labels()?;

		let positions = self.label_positions();
		let mut used: Vec<(usize, Label)> = self.referenced_labels().into_iter()
			.map(|label| (positions[&label], label))
			.collect();
		used.sort();
		used.dedup_by_key(|(position, _)| *position);

		// each position gets exactly one label, so several labels at the same position are merged into one
		let mut renaming = HashMap::new();
		let mut at_position = HashMap::new();
		for (id, &(position, _)) in used.iter().enumerate() {
			let id = u16::try_from(id).map_err(|_| anyhow::Error::new(TranslationError::Encoding))?;
			at_position.insert(position, Label::new(id));
		}
		for (label, position) in &positions {
			if let Some(&new) = at_position.get(position) {
				renaming.insert(*label, new);
			}
		}
		let rename = |label: &mut Label| {
			// every referenced label is bound (checked above), so it has a renaming
			if let Some(&new) = renaming.get(label) {
				*label = new;
			}
		};

		for (index, entry) in self.instructions.iter_mut().enumerate() {
			entry.label = at_position.get(&index).copied();
			entry.instruction.for_each_label_mut(rename);
		}
		self.last_label = at_position.get(&self.instructions.len()).copied();

		for exception in &mut self.exception_table {
			rename(&mut exception.start);
			rename(&mut exception.end);
			rename(&mut exception.handler);
		}
		for (label, _) in &mut self.line_numbers {
			rename(label);
		}
		for lv in &mut self.local_variables {
			rename(&mut lv.range.start);
			rename(&mut lv.range.end);
		}
		for annotation in self.type_annotations.visible.iter_mut().chain(&mut self.type_annotations.invisible) {
			annotation.type_reference.for_each_label_mut(rename);
		}

		// label ids now increase with their position
		self.line_numbers.sort_by_key(|&(label, _)| label);

		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
	pub start: Label,
	pub end: Label,
	pub handler: Label,
	/// The caught class, [`None`] catches everything.
	pub catch: Option<ClassName>,
}

/// Represents an index of a local variable.
///
/// If the local variable is of type `double` or `long`, it also occupies
/// the [`LvIndex`] with `index = index + 1`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LvIndex {
	pub index: u16,
}

impl From<u16> for LvIndex {
	fn from(index: u16) -> Self {
		LvIndex { index }
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lv {
	pub range: LabelRange,
	pub name: String,
	pub descriptor: Option<FieldDescriptor>,
	pub signature: Option<String>,
	pub index: LvIndex,
}

/// Represents a position in the code of a method, using a method-local id.
///
/// Since the `code` array must have a size that fits in an `u16`, and each bytecode offset can at maximum be an instruction,
/// a label id also fits in an `u16`.
///
/// The id does **not** correspond to the bytecode offset in any direct way. Only after
/// [canonicalization][Code::canonicalize_labels] the ids are ordered by position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label {
	pub(crate) id: u16,
}

impl Label {
	pub fn new(id: u16) -> Label {
		Label { id }
	}

	pub fn id(&self) -> u16 {
		self.id
	}
}

impl Display for Label {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "L{}", self.id)
	}
}

/// Represents a range of positions.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LabelRange {
	/// The start label, inclusive.
	pub start: Label,
	/// The end label, exclusive.
	pub end: Label,
}

/// Represents an instruction of the JVM.
///
/// Each instruction can either:
/// - hold no additional data, like [`Instruction::Nop`],
/// - hold some immediate value, like [`Instruction::BiPush`],
/// - hold a [local variable index][LvIndex], like [`Instruction::ILoad`] (note that this also represents the `iload_0` instruction for example),
/// - hold a [`Label`] for jumps, like [`Instruction::IfEq`],
/// - or hold other data the instruction needs.
///
/// The wide forms of instructions, like `goto_w` or `ldc_w`, are not represented. The shortest encoding is chosen when writing.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
	Nop,
	AConstNull,
	IConstM1, IConst0, IConst1, IConst2, IConst3, IConst4, IConst5,
	LConst0, LConst1,
	FConst0, FConst1, FConst2,
	DConst0, DConst1,
	BiPush(i8),
	SiPush(i16),
	Ldc(Loadable),
	ILoad(LvIndex), LLoad(LvIndex), FLoad(LvIndex), DLoad(LvIndex), ALoad(LvIndex),
	IALoad, LALoad, FALoad, DALoad, AALoad, BALoad, CALoad, SALoad,
	IStore(LvIndex), LStore(LvIndex), FStore(LvIndex), DStore(LvIndex), AStore(LvIndex),
	IAStore, LAStore, FAStore, DAStore, AAStore, BAStore, CAStore, SAStore,
	Pop, Pop2,
	Dup, DupX1, DupX2,
	Dup2, Dup2X1, Dup2X2,
	Swap,
	IAdd, LAdd, FAdd, DAdd,
	ISub, LSub, FSub, DSub,
	IMul, LMul, FMul, DMul,
	IDiv, LDiv, FDiv, DDiv,
	IRem, LRem, FRem, DRem,
	INeg, LNeg, FNeg, DNeg,
	IShl, LShl,
	IShr, LShr,
	IUShr, LUShr,
	IAnd, LAnd,
	IOr, LOr,
	IXor, LXor,
	IInc(LvIndex, i16),
	I2L, I2F, I2D,
	L2I, L2F, L2D,
	F2I, F2L, F2D,
	D2I, D2L, D2F,
	I2B, I2C, I2S,
	LCmp,
	FCmpL, FCmpG,
	DCmpL, DCmpG,
	IfEq(Label), IfNe(Label), IfLt(Label), IfGe(Label), IfGt(Label), IfLe(Label),
	IfICmpEq(Label), IfICmpNe(Label), IfICmpLt(Label), IfICmpGe(Label), IfICmpGt(Label), IfICmpLe(Label),
	IfACmpEq(Label), IfACmpNe(Label),
	Goto(Label),
	Jsr(Label),
	Ret(LvIndex),
	TableSwitch {
		default: Label,
		low: i32,
		high: i32,
		table: Vec<Label>,
	},
	LookupSwitch {
		default: Label,
		/// Note that these must be ordered.
		pairs: Vec<(i32, Label)>
	},
	IReturn, LReturn, FReturn, DReturn, AReturn,
	Return,
	GetStatic(FieldRef),
	PutStatic(FieldRef),
	GetField(FieldRef),
	PutField(FieldRef),
	InvokeVirtual(MethodRef),
	/// The bool is `true` iff it's on an interface, so if it referenced an `InterfaceMethodRef` constant pool entry.
	InvokeSpecial(MethodRef, bool),
	/// The bool is `true` iff it's on an interface, so if it referenced an `InterfaceMethodRef` constant pool entry.
	InvokeStatic(MethodRef, bool),
	/// `invokeinterface` always uses an `InterfaceMethodRef` constant pool entry.
	InvokeInterface(MethodRef),
	InvokeDynamic(InvokeDynamic),
	New(ClassName),
	NewArray(ArrayType),
	ANewArray(ClassName),
	ArrayLength,
	AThrow,
	CheckCast(ClassName),
	InstanceOf(ClassName),
	MonitorEnter, MonitorExit,
	MultiANewArray(ClassName, u8),
	IfNull(Label), IfNonNull(Label),
}

impl Instruction {
	/// Calls `f` with every label this instruction jumps to.
	pub fn for_each_label(&self, mut f: impl FnMut(Label)) {
		match self {
			Instruction::IfEq(l) | Instruction::IfNe(l) | Instruction::IfLt(l) |
			Instruction::IfGe(l) | Instruction::IfGt(l) | Instruction::IfLe(l) |
			Instruction::IfICmpEq(l) | Instruction::IfICmpNe(l) | Instruction::IfICmpLt(l) |
			Instruction::IfICmpGe(l) | Instruction::IfICmpGt(l) | Instruction::IfICmpLe(l) |
			Instruction::IfACmpEq(l) | Instruction::IfACmpNe(l) |
			Instruction::IfNull(l) | Instruction::IfNonNull(l) |
			Instruction::Goto(l) | Instruction::Jsr(l) => f(*l),
			Instruction::TableSwitch { default, table, .. } => {
				f(*default);
				table.iter().copied().for_each(f);
			},
			Instruction::LookupSwitch { default, pairs } => {
				f(*default);
				pairs.iter().for_each(|&(_, l)| f(l));
			},
			_ => {},
		}
	}

	pub(crate) fn for_each_label_mut(&mut self, mut f: impl FnMut(&mut Label)) {
		match self {
			Instruction::IfEq(l) | Instruction::IfNe(l) | Instruction::IfLt(l) |
			Instruction::IfGe(l) | Instruction::IfGt(l) | Instruction::IfLe(l) |
			Instruction::IfICmpEq(l) | Instruction::IfICmpNe(l) | Instruction::IfICmpLt(l) |
			Instruction::IfICmpGe(l) | Instruction::IfICmpGt(l) | Instruction::IfICmpLe(l) |
			Instruction::IfACmpEq(l) | Instruction::IfACmpNe(l) |
			Instruction::IfNull(l) | Instruction::IfNonNull(l) |
			Instruction::Goto(l) | Instruction::Jsr(l) => f(l),
			Instruction::TableSwitch { default, table, .. } => {
				f(default);
				table.iter_mut().for_each(f);
			},
			Instruction::LookupSwitch { default, pairs } => {
				f(default);
				pairs.iter_mut().for_each(|(_, l)| f(l));
			},
			_ => {},
		}
	}

	/// Returns `true` if execution never continues with the next instruction.
	pub fn ends_flow(&self) -> bool {
		matches!(self,
			Instruction::Goto(_) | Instruction::Ret(_) |
			Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } |
			Instruction::IReturn | Instruction::LReturn | Instruction::FReturn |
			Instruction::DReturn | Instruction::AReturn | Instruction::Return |
			Instruction::AThrow
		)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loadable {
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class(ClassName),
	String(JavaString),
	MethodHandle(Handle),
	MethodType(MethodDescriptor),
	Dynamic(ConstantDynamic),
}

/// A method handle. The `bool` is `true` iff the method is on an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handle {
	GetField(FieldRef),
	GetStatic(FieldRef),
	PutField(FieldRef),
	PutStatic(FieldRef),
	InvokeVirtual(MethodRef),
	InvokeStatic(MethodRef, bool),
	InvokeSpecial(MethodRef, bool),
	NewInvokeSpecial(MethodRef),
	InvokeInterface(MethodRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
	pub name: FieldName,
	pub descriptor: FieldDescriptor,
	pub handle: Handle,
	pub arguments: Vec<Loadable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvokeDynamic {
	pub name: MethodName,
	pub descriptor: MethodDescriptor,
	pub handle: Handle,
	pub arguments: Vec<Loadable>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayType {
	Boolean,
	Char,
	Float,
	Double,
	Byte,
	Short,
	Int,
	Long,
}

impl ArrayType {
	pub(crate) fn from_atype(atype: u8) -> Result<ArrayType> {
		match atype {
			atype::T_BOOLEAN => Ok(ArrayType::Boolean),
			atype::T_CHAR    => Ok(ArrayType::Char),
			atype::T_FLOAT   => Ok(ArrayType::Float),
			atype::T_DOUBLE  => Ok(ArrayType::Double),
			atype::T_BYTE    => Ok(ArrayType::Byte),
			atype::T_SHORT   => Ok(ArrayType::Short),
			atype::T_INT     => Ok(ArrayType::Int),
			atype::T_LONG    => Ok(ArrayType::Long),
			_ => bail!("unknown array type {atype:x}"),
		}
	}

	pub(crate) fn to_atype(self) -> u8 {
		match self {
			ArrayType::Boolean => atype::T_BOOLEAN,
			ArrayType::Char    => atype::T_CHAR,
			ArrayType::Float   => atype::T_FLOAT,
			ArrayType::Double  => atype::T_DOUBLE,
			ArrayType::Byte    => atype::T_BYTE,
			ArrayType::Short   => atype::T_SHORT,
			ArrayType::Int     => atype::T_INT,
			ArrayType::Long    => atype::T_LONG,
		}
	}

	/// The java keyword of the element type.
	pub fn keyword(self) -> &'static str {
		match self {
			ArrayType::Boolean => "boolean",
			ArrayType::Char    => "char",
			ArrayType::Float   => "float",
			ArrayType::Double  => "double",
			ArrayType::Byte    => "byte",
			ArrayType::Short   => "short",
			ArrayType::Int     => "int",
			ArrayType::Long    => "long",
		}
	}

	pub fn from_keyword(keyword: &str) -> Option<ArrayType> {
		Some(match keyword {
			"boolean" => ArrayType::Boolean,
			"char"    => ArrayType::Char,
			"float"   => ArrayType::Float,
			"double"  => ArrayType::Double,
			"byte"    => ArrayType::Byte,
			"short"   => ArrayType::Short,
			"int"     => ArrayType::Int,
			"long"    => ArrayType::Long,
			_ => return None,
		})
	}

	/// The descriptor of an array with this element type.
	pub fn array_descriptor(self) -> &'static str {
		match self {
			ArrayType::Boolean => "[Z",
			ArrayType::Char    => "[C",
			ArrayType::Float   => "[F",
			ArrayType::Double  => "[D",
			ArrayType::Byte    => "[B",
			ArrayType::Short   => "[S",
			ArrayType::Int     => "[I",
			ArrayType::Long    => "[J",
		}
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::error::TranslationError;
	use crate::tree::method::code::{Code, Exception, Instruction, InstructionListEntry, Label};

	fn entry(label: Option<u16>, instruction: Instruction) -> InstructionListEntry {
		InstructionListEntry { label: label.map(Label::new), instruction }
	}

	#[test]
	fn canonicalize_renumbers_by_position() -> Result<()> {
		let mut code = Code {
			instructions: vec![
				entry(Some(7), Instruction::Goto(Label::new(3))),
				entry(Some(9), Instruction::Nop),
				entry(Some(3), Instruction::Return),
			],
			line_numbers: vec![(Label::new(3), 20), (Label::new(7), 10)],
			..Code::default()
		};
		code.canonicalize_labels()?;

		assert_eq!(code.instructions, vec![
			entry(Some(0), Instruction::Goto(Label::new(1))),
			entry(None, Instruction::Nop),
			entry(Some(1), Instruction::Return),
		]);
		assert_eq!(code.line_numbers, vec![(Label::new(0), 10), (Label::new(1), 20)]);
		Ok(())
	}

	#[test]
	fn canonicalize_merges_labels_and_keeps_last_label() -> Result<()> {
		let mut code = Code {
			instructions: vec![
				entry(Some(5), Instruction::Nop),
				entry(None, Instruction::Return),
			],
			exception_table: vec![Exception {
				start: Label::new(5),
				end: Label::new(2),
				handler: Label::new(5),
				catch: None,
			}],
			last_label: Some(Label::new(2)),
			..Code::default()
		};
		code.canonicalize_labels()?;

		assert_eq!(code.instructions[0].label, Some(Label::new(0)));
		assert_eq!(code.last_label, Some(Label::new(1)));
		assert_eq!(code.exception_table[0].end, Label::new(1));
		Ok(())
	}

	#[test]
	fn unbound_label() {
		let code = Code {
			instructions: vec![entry(None, Instruction::Goto(Label::new(4)))],
			..Code::default()
		};
		let e = code.check_labels().unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::UnresolvedLabel { label: "L4".to_owned() }));
	}
}
