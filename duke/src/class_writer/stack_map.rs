//! Writing of the `StackMapTable` attribute.

use anyhow::{bail, Result};
use crate::class_constants::stack_map;
use crate::class_constants::stack_map::verification_type;
use crate::ClassWrite;
use crate::frames::VerificationType;
use crate::pool::ConstantPool;
use crate::tree::class::ClassName;

/// A `verification_type_info` item, with uninitialized values already pointing to the offset of their `new`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) enum Item<'a> {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	UninitializedThis,
	Object(&'a ClassName),
	Uninitialized(u16),
}

impl<'a> Item<'a> {
	/// Converts types into items. For local variables, the second slot of a `long` or `double` isn't written.
	pub(super) fn from_types(
		types: &'a [VerificationType],
		locals: bool,
		offset_of: impl Fn(usize) -> Result<u16>,
	) -> Result<Vec<Item<'a>>> {
		let mut items = Vec::with_capacity(types.len());
		let mut iter = types.iter();
		while let Some(t) = iter.next() {
			items.push(match t {
				VerificationType::Top => Item::Top,
				VerificationType::Integer => Item::Integer,
				VerificationType::Float => Item::Float,
				VerificationType::Long => Item::Long,
				VerificationType::Double => Item::Double,
				VerificationType::Null => Item::Null,
				VerificationType::UninitializedThis => Item::UninitializedThis,
				VerificationType::Object(class_name) => Item::Object(class_name),
				&VerificationType::Uninitialized(index) => Item::Uninitialized(offset_of(index)?),
			});
			if locals && t.size() == 2 {
				match iter.next() {
					Some(VerificationType::Top) => {},
					other => bail!("second slot of local variable of type {t} holds {other:?}"),
				}
			}
		}
		Ok(items)
	}
}

/// A frame at a bytecode offset, as written into the attribute.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct StackMapFrame<'a> {
	pub(super) offset: u16,
	pub(super) locals: Vec<Item<'a>>,
	pub(super) stack: Vec<Item<'a>>,
}

/// Writes the contents of the `StackMapTable` attribute.
///
/// The frames must be ordered by offset, with no two frames at the same offset. Each frame is written in the shortest
/// form that describes it relative to the previous frame, or to the locals of the entry frame for the first one.
pub(super) fn write_stack_map_table<'a>(
	w: &mut Vec<u8>,
	pool: &mut ConstantPool<'a>,
	entry_locals: &[Item<'a>],
	frames: &[StackMapFrame<'a>],
) -> Result<()> {
	w.write_usize_as_u16(frames.len())?;

	let mut previous_locals = entry_locals;
	let mut previous_offset = None;
	for frame in frames {
		let offset_delta = match previous_offset {
			None => frame.offset,
			Some(previous) if frame.offset > previous => frame.offset - previous - 1,
			Some(previous) => bail!("stack map frame at offset {} after frame at offset {previous}", frame.offset),
		};
		write_frame(w, pool, offset_delta, previous_locals, frame)?;

		previous_locals = &frame.locals;
		previous_offset = Some(frame.offset);
	}
	Ok(())
}

fn write_frame<'a>(w: &mut Vec<u8>, pool: &mut ConstantPool<'a>, offset_delta: u16, previous: &[Item<'a>], frame: &StackMapFrame<'a>) -> Result<()> {
	let locals = frame.locals.as_slice();
	let stack = frame.stack.as_slice();

	if stack.is_empty() && locals == previous {
		if offset_delta <= stack_map::SAME_MAX as u16 {
			w.write_u8(offset_delta as u8)?;
		} else {
			w.write_u8(stack_map::SAME_EXTENDED)?;
			w.write_u16(offset_delta)?;
		}
	} else if let ([item], true) = (stack, locals == previous) {
		let max = (stack_map::SAME_LOCALS_1_STACK_ITEM_MAX - stack_map::SAME_LOCALS_1_STACK_ITEM) as u16;
		if offset_delta <= max {
			w.write_u8(stack_map::SAME_LOCALS_1_STACK_ITEM + offset_delta as u8)?;
		} else {
			w.write_u8(stack_map::SAME_LOCALS_1_STACK_ITEM_EXTENDED)?;
			w.write_u16(offset_delta)?;
		}
		write_item(w, pool, item)?;
	} else if stack.is_empty() && locals.len() < previous.len() && previous.len() - locals.len() <= 3 && previous.starts_with(locals) {
		let chopped = (previous.len() - locals.len()) as u8;
		w.write_u8(stack_map::SAME_EXTENDED - chopped)?;
		w.write_u16(offset_delta)?;
	} else if stack.is_empty() && locals.len() > previous.len() && locals.len() - previous.len() <= 3 && locals.starts_with(previous) {
		let appended = (locals.len() - previous.len()) as u8;
		w.write_u8(stack_map::SAME_EXTENDED + appended)?;
		w.write_u16(offset_delta)?;
		for item in &locals[previous.len()..] {
			write_item(w, pool, item)?;
		}
	} else {
		w.write_u8(stack_map::FULL)?;
		w.write_u16(offset_delta)?;
		w.write_usize_as_u16(locals.len())?;
		for item in locals {
			write_item(w, pool, item)?;
		}
		w.write_usize_as_u16(stack.len())?;
		for item in stack {
			write_item(w, pool, item)?;
		}
	}
	Ok(())
}

fn write_item<'a>(w: &mut Vec<u8>, pool: &mut ConstantPool<'a>, item: &Item<'a>) -> Result<()> {
	match *item {
		Item::Top => w.write_u8(verification_type::TOP),
		Item::Integer => w.write_u8(verification_type::INTEGER),
		Item::Float => w.write_u8(verification_type::FLOAT),
		Item::Long => w.write_u8(verification_type::LONG),
		Item::Double => w.write_u8(verification_type::DOUBLE),
		Item::Null => w.write_u8(verification_type::NULL),
		Item::UninitializedThis => w.write_u8(verification_type::UNINITIALIZED_THIS),
		Item::Object(class_name) => {
			w.write_u8(verification_type::OBJECT)?;
			w.write_u16(pool.put_class(class_name)?)
		},
		Item::Uninitialized(offset) => {
			w.write_u8(verification_type::UNINITIALIZED)?;
			w.write_u16(offset)
		},
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_writer::stack_map::{Item, StackMapFrame, write_stack_map_table};
	use crate::frames::VerificationType;
	use crate::pool::ConstantPool;

	fn frame(offset: u16, locals: &[Item<'static>], stack: &[Item<'static>]) -> StackMapFrame<'static> {
		StackMapFrame { offset, locals: locals.to_vec(), stack: stack.to_vec() }
	}

	#[test]
	fn compressed_forms() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut w = Vec::new();
		write_stack_map_table(&mut w, &mut pool, &[Item::Integer], &[
			frame(5, &[Item::Integer], &[]),
			frame(8, &[Item::Integer], &[Item::Float]),
			frame(9, &[Item::Integer, Item::Long, Item::Float], &[]),
			frame(100, &[Item::Integer], &[]),
			frame(101, &[Item::Double], &[Item::Null, Item::Null]),
		])?;
		assert_eq!(w, vec![
			0, 5,
			5, // same
			64 + 2, 2, // same_locals_1_stack_item
			253, 0, 0, 4, 2, // append
			249, 0, 90, // chop
			255, 0, 0, 0, 1, 3, 0, 2, 5, 5, // full
		]);
		assert!(pool.is_empty());
		Ok(())
	}

	#[test]
	fn extended_offsets() -> Result<()> {
		let mut pool = ConstantPool::new();
		let mut w = Vec::new();
		write_stack_map_table(&mut w, &mut pool, &[], &[
			frame(64, &[], &[]),
			frame(200, &[], &[Item::Integer]),
		])?;
		assert_eq!(w, vec![
			0, 2,
			251, 0, 64,
			247, 0, 135, 1,
		]);
		Ok(())
	}

	#[test]
	fn unordered_frames() {
		let mut pool = ConstantPool::new();
		let mut w = Vec::new();
		assert!(write_stack_map_table(&mut w, &mut pool, &[], &[frame(4, &[], &[]), frame(4, &[], &[])]).is_err());
	}

	#[test]
	fn items_skip_second_slots() -> Result<()> {
		let types = [VerificationType::Long, VerificationType::Top, VerificationType::Uninitialized(3)];
		let items = Item::from_types(&types, true, |index| Ok(index as u16 * 2))?;
		assert_eq!(items, vec![Item::Long, Item::Uninitialized(6)]);

		let broken = [VerificationType::Double, VerificationType::Integer];
		assert!(Item::from_types(&broken, true, |index| Ok(index as u16)).is_err());
		Ok(())
	}
}
