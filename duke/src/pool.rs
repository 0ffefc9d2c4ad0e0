//! Building of the constant pool of a class file.
//!
//! Entries are described by their logical value, a [`Constant`], and never by raw indices: interning an entry first
//! interns everything it refers to, so that each reference in the pool points to an already assigned index.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use java_string::JavaStr;
use log::trace;
use crate::class_constants::pool;
use crate::class_constants::pool::method_handle_reference;
use crate::error::TranslationError;
use crate::{ClassWrite, jstring};
use crate::tree::class::ClassName;
use crate::tree::field::{ConstantValue, FieldRef};
use crate::tree::method::{MethodDescriptor, MethodRef};
use crate::tree::method::code::{ConstantDynamic, Handle, InvokeDynamic, Loadable};

/// The logical value of a constant pool entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant<'a> {
	Utf8(&'a JavaStr),
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	Class(&'a ClassName),
	String(&'a JavaStr),
	FieldRef(&'a FieldRef),
	MethodRef(&'a MethodRef),
	InterfaceMethodRef(&'a MethodRef),
	NameAndType(&'a str, &'a str),
	MethodHandle(&'a Handle),
	MethodType(&'a MethodDescriptor),
	Dynamic(&'a ConstantDynamic),
	InvokeDynamic(&'a InvokeDynamic),
}

/// A bootstrap method with its arguments as pool indices, as written into the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct BootstrapMethodWrite<'a> {
	pub(crate) handle: &'a Handle,
	/// Each index is created from a call to [`ConstantPool::put_loadable`].
	pub(crate) arguments: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PoolEntry<'a> {
	Class { name_index: u16 },
	FieldRef { class_index: u16, name_and_type_index: u16 },
	MethodRef { class_index: u16, name_and_type_index: u16 },
	InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
	String { string_index: u16 },
	Integer { bytes: i32 },
	Float { bytes: u32 },
	Long { bytes: i64 },
	Double { bytes: u64 },
	NameAndType { name_index: u16, descriptor_index: u16 },
	Utf8 { string: &'a JavaStr },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	Dynamic { bootstrap_method_attribute_index: u16, name_and_type_index: u16 },
	InvokeDynamic { bootstrap_method_attribute_index: u16, name_and_type_index: u16 },
}

impl PoolEntry<'_> {
	fn size(&self) -> u16 {
		match self {
			// long and double take up two pool slots
			PoolEntry::Long { .. } | PoolEntry::Double { .. } => 2,
			_ => 1,
		}
	}
}

/// A constant pool under construction.
///
/// Structurally equal entries get the same index. Indices are given out in the order of first interning, starting at
/// `1`, with `long` and `double` entries taking up two indices.
#[derive(Debug)]
pub struct ConstantPool<'a> {
	/// The value written as `constant_pool_count` in the class file.
	///
	/// We start at `1` and increment this twice for [`PoolEntry::Double`] and [`PoolEntry::Long`].
	count: u16,
	/// All pool entries in the order of their indices.
	inner: Vec<PoolEntry<'a>>,
	/// Maps an [`PoolEntry`] to the corresponding index.
	map: HashMap<PoolEntry<'a>, u16>,

	/// For writing the bootstrap methods attribute.
	bootstrap_methods: Vec<BootstrapMethodWrite<'a>>,
	bootstrap_methods_map: HashMap<BootstrapMethodWrite<'a>, u16>,
}

impl Default for ConstantPool<'_> {
	fn default() -> Self {
		ConstantPool::new()
	}
}

impl<'a> ConstantPool<'a> {
	/// Creates an empty pool. The first index given out is `1`.
	pub fn new() -> ConstantPool<'a> {
		ConstantPool {
			count: 1,
			inner: Vec::new(),
			map: HashMap::new(),

			bootstrap_methods: Vec::new(),
			bootstrap_methods_map: HashMap::new(),
		}
	}

	/// The number of indices in use, including the unusable index `0` and the upper halves of `long` and `double` entries.
	pub fn count(&self) -> u16 {
		self.count
	}

	/// The number of distinct entries.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Interns a constant, returning its index.
	///
	/// Fails with [`TranslationError::ConstantPoolOverflow`] if the pool has no more indices for it.
	pub fn intern(&mut self, constant: Constant<'a>) -> Result<u16> {
		match constant {
			Constant::Utf8(string) => self.put_java_utf8(string),
			Constant::Integer(value) => self.put_integer(value),
			Constant::Float(value) => self.put_float(value),
			Constant::Long(value) => self.put_long(value),
			Constant::Double(value) => self.put_double(value),
			Constant::Class(class) => self.put_class(class),
			Constant::String(string) => self.put_string(string),
			Constant::FieldRef(field) => self.put_field_ref(field),
			Constant::MethodRef(method) => self.put_method_ref(method),
			Constant::InterfaceMethodRef(method) => self.put_interface_method_ref(method),
			Constant::NameAndType(name, descriptor) => self.put_name_and_type(name, descriptor),
			Constant::MethodHandle(handle) => self.put_method_handle(handle),
			Constant::MethodType(descriptor) => self.put_method_type(descriptor),
			Constant::Dynamic(dynamic) => self.put_dynamic(dynamic),
			Constant::InvokeDynamic(invoke_dynamic) => self.put_invoke_dynamic(invoke_dynamic),
		}
	}

	fn put(&mut self, entry: PoolEntry<'a>) -> Result<u16> {
		match self.map.entry(entry) {
			Entry::Occupied(entry) => Ok(*entry.get()),
			Entry::Vacant(entry) => {
				let index = self.count;

				self.count = self.count.checked_add(entry.key().size())
					.ok_or_else(|| anyhow::Error::new(TranslationError::ConstantPoolOverflow))
					.with_context(|| anyhow!("pool count overflowed while adding pool entry {:?} to pool at index {}", entry.key(), index))?;

				trace!("pool entry {index}: {:?}", entry.key());
				self.inner.push(entry.key().clone());
				entry.insert(index);

				Ok(index)
			},
		}
	}

	/// Puts an entry into the `BootstrapMethods` attribute.
	///
	/// Returns an index from inside that attribute.
	fn put_bootstrap_method(&mut self, handle: &'a Handle, arguments: &'a [Loadable]) -> Result<u16> {
		let mut vec = Vec::with_capacity(arguments.len());
		for argument in arguments {
			vec.push(self.put_loadable(argument)?);
		}
		// the handle is interned here already, so that writing the attribute doesn't add new entries
		self.put_method_handle(handle)?;

		let entry = BootstrapMethodWrite { handle, arguments: vec };

		match self.bootstrap_methods_map.entry(entry) {
			Entry::Occupied(entry) => Ok(*entry.get()),
			Entry::Vacant(entry) => {
				let index = self.bootstrap_methods.len().try_into()
					.map_err(|_| anyhow::Error::new(TranslationError::Encoding))
					.with_context(|| anyhow!("bootstrap methods attribute count overflowed while adding bootstrap method {:?}", entry.key()))?;

				self.bootstrap_methods.push(entry.key().clone());
				entry.insert(index);

				Ok(index)
			},
		}
	}

	pub(crate) fn bootstrap_methods(&self) -> &[BootstrapMethodWrite<'a>] {
		&self.bootstrap_methods
	}

	/// Returns zero if the value is [`None`], otherwise returns the result of the function `f` called on the value of [`Some`].
	pub(crate) fn put_optional<T: ?Sized>(&mut self, value: Option<&'a T>, f: impl Fn(&mut ConstantPool<'a>, &'a T) -> Result<u16>) -> Result<u16> {
		if let Some(value) = value {
			f(self, value)
		} else {
			Ok(0)
		}
	}

	pub(crate) fn put_utf8(&mut self, value: &'a str) -> Result<u16> {
		self.put_java_utf8(JavaStr::from_str(value))
	}

	pub(crate) fn put_java_utf8(&mut self, string: &'a JavaStr) -> Result<u16> {
		self.put(PoolEntry::Utf8 { string })
	}

	pub(crate) fn put_string(&mut self, value: &'a JavaStr) -> Result<u16> {
		let string_index = self.put_java_utf8(value)?;
		self.put(PoolEntry::String { string_index })
	}

	pub(crate) fn put_class(&mut self, value: &'a ClassName) -> Result<u16> {
		let name_index = self.put_utf8(value.as_str())?;
		self.put(PoolEntry::Class { name_index })
	}

	pub(crate) fn put_name_and_type(&mut self, name: &'a str, descriptor: &'a str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::NameAndType { name_index, descriptor_index })
	}

	pub(crate) fn put_field_ref(&mut self, value: &'a FieldRef) -> Result<u16> {
		let class_index = self.put_class(&value.class)?;
		let name_and_type_index = self.put_name_and_type(&value.name, &value.desc)?;
		self.put(PoolEntry::FieldRef { class_index, name_and_type_index })
	}

	pub(crate) fn put_method_ref(&mut self, value: &'a MethodRef) -> Result<u16> {
		self.put_method_ref_or_interface_method_ref(value, false)
	}

	pub(crate) fn put_interface_method_ref(&mut self, value: &'a MethodRef) -> Result<u16> {
		self.put_method_ref_or_interface_method_ref(value, true)
	}

	/// `true` indicates it's an `InterfaceMethodRef`, `false` that it's a `MethodRef`.
	pub(crate) fn put_method_ref_or_interface_method_ref(&mut self, value: &'a MethodRef, is_interface: bool) -> Result<u16> {
		let class_index = self.put_class(&value.class)?;
		let name_and_type_index = self.put_name_and_type(&value.name, &value.desc)?;
		if is_interface {
			self.put(PoolEntry::InterfaceMethodRef { class_index, name_and_type_index })
		} else {
			self.put(PoolEntry::MethodRef { class_index, name_and_type_index })
		}
	}

	pub(crate) fn put_integer(&mut self, value: i32) -> Result<u16> {
		self.put(PoolEntry::Integer { bytes: value })
	}
	pub(crate) fn put_double(&mut self, value: f64) -> Result<u16> {
		self.put(PoolEntry::Double { bytes: value.to_bits() })
	}
	pub(crate) fn put_float(&mut self, value: f32) -> Result<u16> {
		self.put(PoolEntry::Float { bytes: value.to_bits() })
	}
	pub(crate) fn put_long(&mut self, value: i64) -> Result<u16> {
		self.put(PoolEntry::Long { bytes: value })
	}

	pub(crate) fn put_method_handle(&mut self, value: &'a Handle) -> Result<u16> {
		let (reference_kind, reference_index) = match value {
			Handle::GetField(field) => (method_handle_reference::GET_FIELD, self.put_field_ref(field)?),
			Handle::GetStatic(field) => (method_handle_reference::GET_STATIC, self.put_field_ref(field)?),
			Handle::PutField(field) => (method_handle_reference::PUT_FIELD, self.put_field_ref(field)?),
			Handle::PutStatic(field) => (method_handle_reference::PUT_STATIC, self.put_field_ref(field)?),
			Handle::InvokeVirtual(method) => (method_handle_reference::INVOKE_VIRTUAL, self.put_method_ref(method)?),
			Handle::InvokeStatic(method, interface) => (method_handle_reference::INVOKE_STATIC, self.put_method_ref_or_interface_method_ref(method, *interface)?),
			Handle::InvokeSpecial(method, interface) => (method_handle_reference::INVOKE_SPECIAL, self.put_method_ref_or_interface_method_ref(method, *interface)?),
			Handle::NewInvokeSpecial(method) => (method_handle_reference::NEW_INVOKE_SPECIAL, self.put_method_ref(method)?),
			Handle::InvokeInterface(method) => (method_handle_reference::INVOKE_INTERFACE, self.put_interface_method_ref(method)?),
		};
		self.put(PoolEntry::MethodHandle { reference_kind, reference_index })
	}

	pub(crate) fn put_method_type(&mut self, value: &'a MethodDescriptor) -> Result<u16> {
		let descriptor_index = self.put_utf8(value.as_str())?;
		self.put(PoolEntry::MethodType { descriptor_index })
	}

	pub(crate) fn put_dynamic(&mut self, value: &'a ConstantDynamic) -> Result<u16> {
		let name_and_type_index = self.put_name_and_type(&value.name, &value.descriptor)?;
		let bootstrap_method_attribute_index = self.put_bootstrap_method(&value.handle, &value.arguments)?;
		self.put(PoolEntry::Dynamic { bootstrap_method_attribute_index, name_and_type_index })
	}

	pub(crate) fn put_invoke_dynamic(&mut self, value: &'a InvokeDynamic) -> Result<u16> {
		let name_and_type_index = self.put_name_and_type(&value.name, &value.descriptor)?;
		let bootstrap_method_attribute_index = self.put_bootstrap_method(&value.handle, &value.arguments)?;
		self.put(PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index })
	}

	/// Stores a loadable constant pool entry, as used by `ldc` and bootstrap method arguments.
	pub(crate) fn put_loadable(&mut self, value: &'a Loadable) -> Result<u16> {
		match value {
			&Loadable::Integer(value) => self.put_integer(value),
			&Loadable::Float(value) => self.put_float(value),
			&Loadable::Long(value) => self.put_long(value),
			&Loadable::Double(value) => self.put_double(value),
			Loadable::Class(value) => self.put_class(value),
			Loadable::String(value) => self.put_string(value),
			Loadable::MethodHandle(value) => self.put_method_handle(value),
			Loadable::MethodType(value) => self.put_method_type(value),
			Loadable::Dynamic(value) => self.put_dynamic(value),
		}
	}

	pub(crate) fn put_constant_value(&mut self, value: &'a ConstantValue) -> Result<u16> {
		match value {
			&ConstantValue::Integer(value) => self.put_integer(value),
			&ConstantValue::Float(value) => self.put_float(value),
			&ConstantValue::Long(value) => self.put_long(value),
			&ConstantValue::Double(value) => self.put_double(value),
			ConstantValue::String(value) => self.put_string(value),
		}
	}

	/// Writes the constant pool to the specified writer. The first thing written is an `u16` specifying the size of the constant pool.
	pub(crate) fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_u16(self.count)?;

		for entry in &self.inner {
			match *entry {
				PoolEntry::Utf8 { string } => {
					writer.write_u8(pool::UTF8)?;
					let vec = jstring::from_string_to_vec(string);
					writer.write_usize_as_u16(vec.len())
						.map_err(|e| e.context(TranslationError::Encoding))
						.context("failed to write length of string")?;
					writer.write_u8_slice(&vec)?;
				},
				PoolEntry::Integer { bytes } => {
					writer.write_u8(pool::INTEGER)?;
					writer.write_i32(bytes)?;
				},
				PoolEntry::Float { bytes } => {
					writer.write_u8(pool::FLOAT)?;
					writer.write_u32(bytes)?;
				},
				PoolEntry::Long { bytes } => {
					writer.write_u8(pool::LONG)?;
					writer.write_i64(bytes)?;
				},
				PoolEntry::Double { bytes } => {
					writer.write_u8(pool::DOUBLE)?;
					writer.write_u64(bytes)?;
				},
				PoolEntry::Class { name_index } => {
					writer.write_u8(pool::CLASS)?;
					writer.write_u16(name_index)?;
				},
				PoolEntry::String { string_index } => {
					writer.write_u8(pool::STRING)?;
					writer.write_u16(string_index)?;
				},
				PoolEntry::FieldRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::FIELD_REF)?;
					writer.write_u16(class_index)?;
					writer.write_u16(name_and_type_index)?;
				},
				PoolEntry::MethodRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::METHOD_REF)?;
					writer.write_u16(class_index)?;
					writer.write_u16(name_and_type_index)?;
				},
				PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => {
					writer.write_u8(pool::INTERFACE_METHOD_REF)?;
					writer.write_u16(class_index)?;
					writer.write_u16(name_and_type_index)?;
				},
				PoolEntry::NameAndType { name_index, descriptor_index } => {
					writer.write_u8(pool::NAME_AND_TYPE)?;
					writer.write_u16(name_index)?;
					writer.write_u16(descriptor_index)?;
				},
				PoolEntry::MethodHandle { reference_kind, reference_index } => {
					writer.write_u8(pool::METHOD_HANDLE)?;
					writer.write_u8(reference_kind)?;
					writer.write_u16(reference_index)?;
				},
				PoolEntry::MethodType { descriptor_index } => {
					writer.write_u8(pool::METHOD_TYPE)?;
					writer.write_u16(descriptor_index)?;
				},
				PoolEntry::Dynamic { bootstrap_method_attribute_index, name_and_type_index } => {
					writer.write_u8(pool::DYNAMIC)?;
					writer.write_u16(bootstrap_method_attribute_index)?;
					writer.write_u16(name_and_type_index)?;
				},
				PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index } => {
					writer.write_u8(pool::INVOKE_DYNAMIC)?;
					writer.write_u16(bootstrap_method_attribute_index)?;
					writer.write_u16(name_and_type_index)?;
				},
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::error::TranslationError;
	use crate::pool::{Constant, ConstantPool};
	use crate::tree::class::ClassName;
	use crate::tree::field::{FieldDescriptor, FieldName, FieldRef};

	#[test]
	fn dedup() -> Result<()> {
		let mut pool = ConstantPool::new();
		let a = pool.intern(Constant::Utf8(JavaStr::from_str("a")))?;
		let b = pool.intern(Constant::Utf8(JavaStr::from_str("b")))?;
		assert_eq!(pool.intern(Constant::Utf8(JavaStr::from_str("a")))?, a);
		assert_eq!((a, b), (1, 2));
		assert_eq!(pool.len(), 2);
		Ok(())
	}

	#[test]
	fn distinct_strings_in_order() -> Result<()> {
		let strings: Vec<String> = (0..10).map(|i| format!("string {i}")).collect();
		let mut pool = ConstantPool::new();
		let indices = strings.iter()
			.map(|s| pool.intern(Constant::Utf8(JavaStr::from_str(s))))
			.collect::<Result<Vec<_>>>()?;
		assert_eq!(indices, (1..=10).collect::<Vec<u16>>());
		Ok(())
	}

	#[test]
	fn long_and_double_take_two_slots() -> Result<()> {
		let mut pool = ConstantPool::new();
		assert_eq!(pool.intern(Constant::Long(5))?, 1);
		assert_eq!(pool.intern(Constant::Integer(5))?, 3);
		assert_eq!(pool.intern(Constant::Double(1.5))?, 4);
		assert_eq!(pool.intern(Constant::Float(1.5))?, 6);
		assert_eq!(pool.count(), 7);
		Ok(())
	}

	#[test]
	fn references_are_interned_first() -> Result<()> {
		let field = FieldRef {
			class: ClassName::try_from("a/B")?,
			name: FieldName::try_from("c")?,
			desc: FieldDescriptor::try_from("I")?,
		};
		let mut pool = ConstantPool::new();
		// utf8 a/B, class, utf8 c, utf8 I, name and type, field ref
		assert_eq!(pool.intern(Constant::FieldRef(&field))?, 6);
		assert_eq!(pool.intern(Constant::Class(&field.class))?, 2);
		assert_eq!(pool.intern(Constant::NameAndType("c", "I"))?, 5);
		Ok(())
	}

	#[test]
	fn overflow() -> Result<()> {
		let longs: Vec<i64> = (0..32767).collect();
		let mut pool = ConstantPool::new();
		for &long in &longs {
			pool.intern(Constant::Long(long))?;
		}
		assert_eq!(pool.count(), 65535);

		let e = pool.intern(Constant::Integer(0)).unwrap_err();
		assert_eq!(TranslationError::of(&e), Some(&TranslationError::ConstantPoolOverflow));
		Ok(())
	}
}
