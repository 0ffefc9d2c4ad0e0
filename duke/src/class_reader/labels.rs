use std::collections::{HashMap, HashSet};
use anyhow::{anyhow, bail, Context, Result};
use crate::tree::method::code::{Label, LabelRange};

/// A helper struct for reading bytecode offsets into [`Label`]s.
pub(crate) struct Labels {
	code_length: u16,
	labels: HashMap<u16, Label>,
	max_id: u16,
}

impl Labels {
	pub(crate) fn new(code_length: u16) -> Labels {
		Labels {
			code_length,
			labels: HashMap::with_capacity(code_length as usize / 3),
			max_id: 0,
		}
	}

	fn get_or_add_unchecked(&mut self, pc: u16) -> Label {
		*self.labels.entry(pc).or_insert_with(|| {
			let label = Label { id: self.max_id };
			// at most one label per offset, and there are less than u16::MAX offsets
			self.max_id = self.max_id.saturating_add(1);
			label
		})
	}

	pub(crate) fn create(&mut self, pc: u16) -> Result<()> {
		self.get_or_create(pc).map(|_| ())
	}

	pub(crate) fn get_or_create(&mut self, pc: u16) -> Result<Label> {
		if pc >= self.code_length {
			bail!("label for bytecode offset {pc:?} out of bounds for code length {:?}", self.code_length);
		}

		Ok(self.get_or_add_unchecked(pc))
	}

	/// Like [`Labels::get_or_create`], but also allows the offset right after the last instruction.
	pub(crate) fn get_or_create_exclusive(&mut self, pc: u16) -> Result<Label> {
		if pc > self.code_length {
			bail!("label for bytecode offset {pc:?} out of bounds for code length {:?}", self.code_length);
		}

		Ok(self.get_or_add_unchecked(pc))
	}

	pub(crate) fn get_or_create_range(&mut self, start_pc: u16, length: u16) -> Result<LabelRange> {
		let end_pc = start_pc.checked_add(length)
			.with_context(|| anyhow!("range starting at {start_pc:?} with length {length:?} ends after the code"))?;
		Ok(LabelRange {
			start: self.get_or_create(start_pc)?,
			end: self.get_or_create_exclusive(end_pc)?,
		})
	}

	pub(crate) fn try_get(&self, pc: u16) -> Result<Label> {
		self.get(pc).with_context(|| anyhow!("no label at bytecode offset {pc:?}"))
	}

	pub(crate) fn get(&self, pc: u16) -> Option<Label> {
		self.labels.get(&pc).copied()
	}

	/// Checks that every label sits at the start of an instruction or at the end of the code.
	pub(crate) fn check_boundaries(&self, instruction_starts: &HashSet<u16>) -> Result<()> {
		let mut offsets: Vec<u16> = self.labels.keys().copied().collect();
		offsets.sort_unstable();
		for pc in offsets {
			if pc != self.code_length && !instruction_starts.contains(&pc) {
				bail!("bytecode offset {pc:?} is referenced, but it's in the middle of an instruction");
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use std::collections::HashSet;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_reader::labels::Labels;

	#[test]
	fn bounds() -> Result<()> {
		let mut labels = Labels::new(10);
		assert!(labels.get_or_create(10).is_err());
		assert!(labels.get_or_create_exclusive(10).is_ok());
		assert!(labels.get_or_create_range(8, 3).is_err());
		assert!(labels.get_or_create_range(u16::MAX, 3).is_err());

		let a = labels.get_or_create(4)?;
		assert_eq!(labels.get_or_create(4)?, a);
		assert_eq!(labels.try_get(4)?, a);
		assert!(labels.try_get(5).is_err());
		Ok(())
	}

	#[test]
	fn boundaries() -> Result<()> {
		let mut labels = Labels::new(6);
		labels.create(3)?;
		labels.get_or_create_exclusive(6)?;
		assert!(labels.check_boundaries(&HashSet::from([0, 3])).is_ok());
		assert!(labels.check_boundaries(&HashSet::from([0, 2])).is_err());
		Ok(())
	}
}
