//! A crate for assembling and disassembling [Java Class Files](https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html).
//!
//! The structured model of a class file lives in [`tree`]. It can be read from the binary format with [`read_class`] or
//! [`decode`], and written to it with [`write_class`] or [`encode`]. The textual format is handled by [`text`].
//!
//! All errors are [`anyhow::Error`]s, carrying a [`TranslationError`][error::TranslationError] that tells the kind of
//! the failure.

pub mod tree;
pub mod error;
pub mod pool;
pub mod frames;
pub mod text;
mod class_reader;
mod class_writer;
mod jstring;

mod macros;
mod class_constants;

use std::fmt::Debug;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use anyhow::{anyhow, bail, Context, Result};
use crate::error::{OrTranslationError, TranslationError};
use crate::frames::{HierarchyOracle, ObjectFallback};
use crate::tree::class::ClassFile;

/// Reads a single java class file from the reader.
///
/// Any failure is a [`TranslationError::MalformedClass`], carrying the offset the reader stopped at.
pub fn read_class(reader: &mut (impl Read + Seek)) -> Result<ClassFile> {
	let start = reader.marker()?;
	class_reader::read(reader)
		.or_translation_error(|| {
			let offset = reader.marker().unwrap_or(start).saturating_sub(start);
			TranslationError::MalformedClass { offset }
		})
}

/// Reads a single java class file from the given bytes. The class file must take up all of the bytes.
pub fn decode(bytes: &[u8]) -> Result<ClassFile> {
	let mut cursor = Cursor::new(bytes);
	let class = read_class(&mut cursor)?;

	let offset = cursor.position();
	if offset != bytes.len() as u64 {
		return Err(anyhow!("{} trailing bytes after the end of the class file", bytes.len() as u64 - offset))
			.or_translation_error(|| TranslationError::MalformedClass { offset });
	}
	Ok(class)
}

/// Options for writing class files.
#[derive(Clone, Copy)]
pub struct WriteOptions<'a> {
	/// Whether to compute and write the `StackMapTable` attribute. Only done for class files of version 50 or later.
	pub compute_frames: bool,
	/// Whether to compute `max_stack` and `max_locals` of methods that don't specify them.
	pub compute_maxs: bool,
	/// Answers questions about the class hierarchy when computing frames.
	pub hierarchy: &'a dyn HierarchyOracle,
}

impl Default for WriteOptions<'static> {
	fn default() -> Self {
		WriteOptions {
			compute_frames: true,
			compute_maxs: true,
			hierarchy: &ObjectFallback,
		}
	}
}

impl std::fmt::Debug for WriteOptions<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WriteOptions")
			.field("compute_frames", &self.compute_frames)
			.field("compute_maxs", &self.compute_maxs)
			.finish_non_exhaustive()
	}
}

/// Writes the class file into the writer. Nothing is written if the class can't be encoded.
pub fn write_class(writer: &mut impl Write, class: &ClassFile, options: &WriteOptions) -> Result<()> {
	let bytes = encode(class, options)?;
	writer.write_all(&bytes).context("failed to write class file")
}

/// Encodes the class file into bytes.
pub fn encode(class: &ClassFile, options: &WriteOptions) -> Result<Vec<u8>> {
	let mut vec = Vec::new();
	class_writer::write(&mut vec, class, options)
		.with_context(|| anyhow!("failed to encode class {}", class.name))
		.or_translation_error(|| TranslationError::Encoding)?;
	Ok(vec)
}

trait OptionExpansion<T> {
	fn insert_if_empty(&mut self, value: T) -> Result<()>;
}
impl<T> OptionExpansion<T> for Option<T> where T: Debug {
	fn insert_if_empty(&mut self, value: T) -> Result<()> {
		if let Some(old) = self {
			bail!("got {old:?} and {value:?}");
		} else {
			*self = Some(value);
			Ok(())
		}
	}
}

trait ClassRead {
	fn marker(&mut self) -> Result<u64>;
	fn skip(&mut self, n: i64) -> Result<()>;
	fn goto(&mut self, pos: u64) -> Result<()>;
	fn with_pos<T>(&mut self, pos: u64, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
		let marker = self.marker()?;
		self.goto(pos)?;
		let r = f(self)?;
		self.goto(marker)?;
		Ok(r)
	}

	fn read_n<const N: usize>(&mut self) -> Result<[u8; N]>;
	fn read_u8(&mut self) -> Result<u8> {
		Ok(u8::from_be_bytes(self.read_n().context("couldn't read u8, perhaps the data's end is reached?")?))
	}
	fn read_u16(&mut self) -> Result<u16> {
		Ok(u16::from_be_bytes(self.read_n().context("couldn't read u16, perhaps the data's end is reached?")?))
	}
	fn read_u32(&mut self) -> Result<u32> {
		Ok(u32::from_be_bytes(self.read_n().context("couldn't read u32, perhaps the data's end is reached?")?))
	}
	fn read_u64(&mut self) -> Result<u64> {
		Ok(u64::from_be_bytes(self.read_n().context("couldn't read u64, perhaps the data's end is reached?")?))
	}
	fn read_i8(&mut self) -> Result<i8> {
		Ok(i8::from_be_bytes(self.read_n().context("couldn't read i8, perhaps the data's end is reached?")?))
	}
	fn read_i16(&mut self) -> Result<i16> {
		Ok(i16::from_be_bytes(self.read_n().context("couldn't read i16, perhaps the data's end is reached?")?))
	}
	fn read_i32(&mut self) -> Result<i32> {
		Ok(i32::from_be_bytes(self.read_n().context("couldn't read i32, perhaps the data's end is reached?")?))
	}
	fn read_i64(&mut self) -> Result<i64> {
		Ok(i64::from_be_bytes(self.read_n().context("couldn't read i64, perhaps the data's end is reached?")?))
	}

	fn read_u8_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u8()? as usize)
	}
	fn read_u16_as_usize(&mut self) -> Result<usize> {
		Ok(self.read_u16()? as usize)
	}
	fn read_u8_vec(&mut self, size: usize) -> Result<Vec<u8>>;
	fn read_vec<T, S, E>(&mut self, get_size: S, mut get_element: E) -> Result<Vec<T>>
		where
			S: FnOnce(&mut Self) -> Result<usize>,
			E: FnMut(&mut Self) -> Result<T>
	{
		let size = get_size(self)?;
		let mut vec = Vec::with_capacity(size);
		for _ in 0..size {
			vec.push(get_element(self)?);
		}
		Ok(vec)
	}
}

impl<T: Read + Seek> ClassRead for T {
	fn marker(&mut self) -> Result<u64> {
		Ok(self.stream_position()?)
	}
	fn skip(&mut self, n: i64) -> Result<()> {
		self.seek(SeekFrom::Current(n))?;
		Ok(())
	}
	fn goto(&mut self, pos: u64) -> Result<()> {
		self.seek(SeekFrom::Start(pos))?;
		Ok(())
	}

	fn read_n<const N: usize>(&mut self) -> Result<[u8; N]> {
		let mut buf = [0u8; N];
		self.read_exact(&mut buf)?;
		Ok(buf)
	}
	fn read_u8_vec(&mut self, size: usize) -> Result<Vec<u8>> {
		// limit the allocation by what the reader actually has, as `size` comes from the (possibly malformed) input
		let mut vec = Vec::with_capacity(size.min(1 << 16));
		Read::by_ref(self).take(size as u64).read_to_end(&mut vec)?;
		if vec.len() != size {
			bail!("expected {size} bytes, but only got {}", vec.len());
		}
		Ok(vec)
	}
}

trait ClassWrite {
	fn write_u8(&mut self, a: u8) -> Result<()> {
		self.write_u8_slice(&[a]).context("couldn't write u8")
	}
	fn write_u16(&mut self, value: u16) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes()).context("couldn't write u16")
	}
	fn write_u32(&mut self, value: u32) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes()).context("couldn't write u32")
	}
	fn write_u64(&mut self, value: u64) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes()).context("couldn't write u64")
	}
	fn write_i8(&mut self, value: i8) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes()).context("couldn't write i8")
	}
	fn write_i16(&mut self, value: i16) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes()).context("couldn't write i16")
	}
	fn write_i32(&mut self, value: i32) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes()).context("couldn't write i32")
	}
	fn write_i64(&mut self, value: i64) -> Result<()> {
		self.write_u8_slice(&value.to_be_bytes()).context("couldn't write i64")
	}

	fn write_usize_as_u8(&mut self, value: usize) -> Result<()> {
		self.write_u8(u8::try_from(value).with_context(|| anyhow!("failed to convert {value} to u8 for writing: value too large"))?)
	}
	fn write_usize_as_u16(&mut self, value: usize) -> Result<()> {
		self.write_u16(u16::try_from(value).with_context(|| anyhow!("failed to convert {value} to u16 for writing: value too large"))?)
	}
	fn write_usize_as_u32(&mut self, value: usize) -> Result<()> {
		self.write_u32(u32::try_from(value).with_context(|| anyhow!("failed to convert {value} to u32 for writing: value too large"))?)
	}

	fn write_u8_slice(&mut self, buf: &[u8]) -> Result<()>;
	fn write_slice<'t, T>(
		&mut self,
		slice: &'t [T],
		put_size: impl FnOnce(&mut Self, usize) -> Result<()>,
		mut put_element: impl FnMut(&mut Self, &'t T) -> Result<()>
	) -> Result<()> {
		put_size(self, slice.len())?;
		for value in slice {
			put_element(self, value)?;
		}
		Ok(())
	}
}

impl<T: Write> ClassWrite for T {
	fn write_u8_slice(&mut self, buf: &[u8]) -> Result<()> {
		self.write_all(buf).context("failed to write &[u8]")
	}
}
