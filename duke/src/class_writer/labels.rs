use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use crate::tree::method::code::{Label, LabelRange};

/// A helper struct for writing [`Label`]s as bytecode offsets.
pub(super) struct Labels {
	/// The bytecode offset of each instruction, by its index in the instruction list. After [`Labels::finish`], the last
	/// entry is the length of the code.
	offsets: Vec<u16>,
	/// [`Label`] to bytecode offsets mapping.
	labels: HashMap<Label, u16>,
}

impl Labels {
	pub(super) fn new(instructions: usize) -> Labels {
		Labels {
			offsets: Vec::with_capacity(instructions + 1),
			labels: HashMap::new(),
		}
	}

	/// Records the offset of the next instruction.
	pub(super) fn add_instruction(&mut self, opcode_pos: u16) {
		self.offsets.push(opcode_pos);
	}

	/// Adds a known [`Label`] to opcode position mapping for this writing attempt.
	pub(super) fn add_opcode_pos_label(&mut self, label: Label, opcode_pos: u16) {
		self.labels.insert(label, opcode_pos);
	}

	/// Records the end of the code, which is also where the last label points to.
	pub(super) fn finish(&mut self, last_label: Option<Label>, code_length: u16) {
		self.offsets.push(code_length);
		if let Some(last_label) = last_label {
			self.add_opcode_pos_label(last_label, code_length);
		}
	}

	pub(super) fn get(&self, target: &Label) -> Option<u16> {
		self.labels.get(target).copied()
	}

	pub(super) fn try_get(&self, target: &Label) -> Result<u16> {
		self.get(target).with_context(|| anyhow!("no bytecode offset for label {target}"))
	}

	/// Returns the start offset and the length of the range.
	pub(super) fn try_get_range(&self, range: &LabelRange) -> Result<(u16, u16)> {
		let start = self.try_get(&range.start)?;
		let end = self.try_get(&range.end)?;
		let length = end.checked_sub(start)
			.with_context(|| anyhow!("range from {} to {} ends before it starts", range.start, range.end))?;
		Ok((start, length))
	}

	/// The bytecode offset of the instruction at the given index. The index one after the last instruction gives the
	/// length of the code.
	pub(super) fn offset_of(&self, index: usize) -> Result<u16> {
		self.offsets.get(index).copied()
			.with_context(|| anyhow!("no bytecode offset for instruction {index}"))
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_writer::labels::Labels;
	use crate::tree::method::code::{Label, LabelRange};

	#[test]
	fn offsets_and_ranges() -> Result<()> {
		let mut labels = Labels::new(2);
		labels.add_instruction(0);
		labels.add_opcode_pos_label(Label::new(0), 0);
		labels.add_instruction(3);
		labels.add_opcode_pos_label(Label::new(1), 3);
		labels.finish(Some(Label::new(2)), 4);

		assert_eq!(labels.offset_of(1)?, 3);
		assert_eq!(labels.offset_of(2)?, 4);
		assert!(labels.offset_of(3).is_err());
		assert_eq!(labels.try_get(&Label::new(2))?, 4);
		assert_eq!(labels.try_get_range(&LabelRange { start: Label::new(1), end: Label::new(2) })?, (3, 1));
		assert!(labels.try_get_range(&LabelRange { start: Label::new(2), end: Label::new(0) }).is_err());
		assert!(labels.try_get(&Label::new(7)).is_err());
		Ok(())
	}
}
