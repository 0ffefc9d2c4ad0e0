use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaString;
use crate::class_constants::pool;
use crate::{ClassRead, jstring};
use crate::class_constants::pool::method_handle_reference;
use crate::tree::class::ClassName;
use crate::tree::field::{ConstantValue, FieldDescriptor, FieldName, FieldRef};
use crate::tree::method::{MethodDescriptor, MethodName, MethodRef};
use crate::tree::method::code::{ConstantDynamic, Handle, InvokeDynamic, Loadable};

/// How deep `Dynamic` constants may be nested in the arguments of bootstrap methods.
const MAX_DYNAMIC_DEPTH: usize = 32;

/// A small helper struct for reading. Represents a bootstrap method, but doesn't parse the arguments yet.
#[derive(Debug, PartialEq)]
pub(crate) struct BootstrapMethodRead {
	pub(crate) handle: Handle,
	/// The arguments to the bootstrap method. We store the raw constant pool indices here, since the argument of a
	/// bootstrap method may be a `Dynamic` constant using another bootstrap method.
	pub(crate) arguments: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq)]
enum PoolEntry {
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
	Utf8 { string: JavaString },
	MethodHandle { reference_kind: u8, reference_index: u16 },
	MethodType { descriptor_index: u16 },
	Dynamic { bootstrap_method_attribute_index: u16, name_and_type_index: u16 },
	InvokeDynamic { bootstrap_method_attribute_index: u16, name_and_type_index: u16 },
	/// Only used by the attributes of `module-info` classes, which are kept as raw bytes.
	Module,
	/// Only used by the attributes of `module-info` classes, which are kept as raw bytes.
	Package,
}

/// The constant pool of a class file being read.
#[derive(Debug)]
pub(crate) struct PoolRead {
	/// We store a [`None`] for the zero index, as well as for the upper indices of [`PoolEntry::Double`] and [`PoolEntry::Long`].
	inner: Vec<Option<PoolEntry>>,
}

impl PoolRead {
	/// Reads the constant pool from the specified reader. The first thing read is an `u16` specifying the size of the constant pool.
	pub(crate) fn read(reader: &mut impl ClassRead) -> Result<PoolRead> {
		let mut pool = vec![None];

		let constant_pool_count = reader.read_u16_as_usize()?;
		while pool.len() < constant_pool_count {
			let entry = match reader.read_u8()? {
				pool::UTF8 => {
					let length = reader.read_u16_as_usize()?;
					let vec = reader.read_u8_vec(length)?;
					let string = jstring::from_vec_to_string(vec)
						.with_context(|| anyhow!("while reading pool index {}", pool.len()))?;
					PoolEntry::Utf8 { string }
				},
				pool::INTEGER => PoolEntry::Integer { bytes: reader.read_i32()? },
				pool::FLOAT => PoolEntry::Float { bytes: reader.read_u32()? },
				pool::LONG => PoolEntry::Long { bytes: reader.read_i64()? },
				pool::DOUBLE => PoolEntry::Double { bytes: reader.read_u64()? },
				pool::CLASS => PoolEntry::Class { name_index: reader.read_u16()? },
				pool::STRING => PoolEntry::String { string_index: reader.read_u16()? },
				pool::FIELD_REF => PoolEntry::FieldRef {
					class_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::METHOD_REF => PoolEntry::MethodRef {
					class_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef {
					class_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::NAME_AND_TYPE => PoolEntry::NameAndType {
					name_index: reader.read_u16()?,
					descriptor_index: reader.read_u16()?,
				},
				pool::METHOD_HANDLE => PoolEntry::MethodHandle {
					reference_kind: reader.read_u8()?,
					reference_index: reader.read_u16()?,
				},
				pool::METHOD_TYPE => PoolEntry::MethodType { descriptor_index: reader.read_u16()? },
				pool::DYNAMIC => PoolEntry::Dynamic {
					bootstrap_method_attribute_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic {
					bootstrap_method_attribute_index: reader.read_u16()?,
					name_and_type_index: reader.read_u16()?,
				},
				pool::MODULE => {
					reader.read_u16()?;
					PoolEntry::Module
				},
				pool::PACKAGE => {
					reader.read_u16()?;
					PoolEntry::Package
				},
				tag => bail!("unknown constant pool tag {tag} at pool index {}", pool.len()),
			};

			let wide = matches!(entry, PoolEntry::Long { .. } | PoolEntry::Double { .. });
			pool.push(Some(entry));
			if wide {
				pool.push(None); // long and double take up two pool slots
			}
		}

		if pool.len() > constant_pool_count.max(1) {
			bail!("last constant pool entry is a long or double, and takes up a slot past the constant pool count {constant_pool_count}");
		}

		Ok(PoolRead { inner: pool })
	}

	fn get(&self, index: u16) -> Result<&PoolEntry> {
		if let Some(Some(entry)) = self.inner.get(index as usize) {
			Ok(entry)
		} else {
			bail!("pool entry at index {index:?} is not there: either index too large, zero or the upper half of long or double");
		}
	}

	/// Returns [`None`] if `index` is zero, otherwise returns [`Some`] of the result of the function `f`.
	pub(crate) fn get_optional<'a, T: 'a>(&'a self, index: u16, f: impl Fn(&'a PoolRead, u16) -> Result<T>) -> Result<Option<T>> {
		if index == 0 {
			Ok(None)
		} else {
			Ok(Some(f(self, index)?))
		}
	}

	pub(crate) fn get_java_utf8(&self, index: u16) -> Result<&JavaString> {
		let PoolEntry::Utf8 { string } = self.get(index)? else {
			bail!("pool entry not `Utf8`: {:?}", self.get(index)?);
		};
		Ok(string)
	}

	/// Gets an `Utf8` entry that must be valid unicode, like a name or a descriptor.
	pub(crate) fn get_utf8(&self, index: u16) -> Result<String> {
		self.get_java_utf8(index)
			.and_then(|string| jstring::to_rust_str(string))
			.map(|s| s.to_owned())
			.pool_context(index)
	}

	fn get_string(&self, index: u16) -> Result<JavaString> {
		let &PoolEntry::String { string_index } = self.get(index)? else {
			bail!("pool entry not `String`: {:?}", self.get(index)?);
		};
		self.get_java_utf8(string_index).cloned()
	}

	pub(crate) fn get_class(&self, index: u16) -> Result<ClassName> {
		(|| -> Result<_> {
			let &PoolEntry::Class { name_index } = self.get(index)? else {
				bail!("pool entry not `Class`: {:?}", self.get(index)?);
			};
			ClassName::try_from(self.get_utf8(name_index)?)
		})().pool_context(index)
	}

	pub(crate) fn get_name_and_type<A, B>(&self, index: u16) -> Result<(A, B)>
	where
		A: TryFrom<String, Error=anyhow::Error>,
		B: TryFrom<String, Error=anyhow::Error>,
	{
		(|| -> Result<_> {
			let &PoolEntry::NameAndType { name_index, descriptor_index } = self.get(index)? else {
				bail!("pool entry not `NameAndType`: {:?}", self.get(index)?);
			};
			let name = A::try_from(self.get_utf8(name_index)?)?;
			let descriptor = B::try_from(self.get_utf8(descriptor_index)?)?;
			Ok((name, descriptor))
		})().pool_context(index)
	}

	pub(crate) fn get_field_ref(&self, index: u16) -> Result<FieldRef> {
		(|| -> Result<_> {
			let &PoolEntry::FieldRef { class_index, name_and_type_index } = self.get(index)? else {
				bail!("pool entry not `FieldRef`: {:?}", self.get(index)?);
			};
			let class = self.get_class(class_index)?;
			let (name, desc) = self.get_name_and_type::<FieldName, FieldDescriptor>(name_and_type_index)?;
			Ok(FieldRef { class, name, desc })
		})().pool_context(index)
	}

	pub(crate) fn get_method_ref(&self, index: u16) -> Result<MethodRef> {
		match self.get_method_ref_or_interface_method_ref(index)? {
			(method, false) => Ok(method),
			(_, true) => bail!("pool entry at index {index} not `MethodRef` but `InterfaceMethodRef`"),
		}
	}

	pub(crate) fn get_interface_method_ref(&self, index: u16) -> Result<MethodRef> {
		match self.get_method_ref_or_interface_method_ref(index)? {
			(method, true) => Ok(method),
			(_, false) => bail!("pool entry at index {index} not `InterfaceMethodRef` but `MethodRef`"),
		}
	}

	/// `true` indicates it was an `InterfaceMethodRef`, `false` that it was a `MethodRef`.
	pub(crate) fn get_method_ref_or_interface_method_ref(&self, index: u16) -> Result<(MethodRef, bool)> {
		(|| -> Result<_> {
			let (class_index, name_and_type_index, is_interface) = match *self.get(index)? {
				PoolEntry::MethodRef { class_index, name_and_type_index } => (class_index, name_and_type_index, false),
				PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => (class_index, name_and_type_index, true),
				ref entry => bail!("pool entry not `MethodRef` or `InterfaceMethodRef`: {entry:?}"),
			};

			let class = self.get_class(class_index)?;
			let (name, desc) = self.get_name_and_type::<MethodName, MethodDescriptor>(name_and_type_index)?;
			Ok((MethodRef { class, name, desc }, is_interface))
		})().pool_context(index)
	}

	pub(crate) fn get_integer(&self, index: u16) -> Result<i32> {
		let &PoolEntry::Integer { bytes } = self.get(index)? else {
			bail!("pool entry at index {index} not `Integer`: {:?}", self.get(index)?);
		};
		Ok(bytes)
	}
	pub(crate) fn get_integer_as_byte(&self, index: u16) -> Result<i8> {
		Ok(self.get_integer(index)? as i8)
	}
	pub(crate) fn get_integer_as_char(&self, index: u16) -> Result<u16> {
		Ok(self.get_integer(index)? as u16)
	}
	pub(crate) fn get_integer_as_short(&self, index: u16) -> Result<i16> {
		Ok(self.get_integer(index)? as i16)
	}
	pub(crate) fn get_integer_as_boolean(&self, index: u16) -> Result<bool> {
		Ok(self.get_integer(index)? != 0)
	}
	pub(crate) fn get_double(&self, index: u16) -> Result<f64> {
		let &PoolEntry::Double { bytes } = self.get(index)? else {
			bail!("pool entry at index {index} not `Double`: {:?}", self.get(index)?);
		};
		Ok(f64::from_bits(bytes))
	}
	pub(crate) fn get_float(&self, index: u16) -> Result<f32> {
		let &PoolEntry::Float { bytes } = self.get(index)? else {
			bail!("pool entry at index {index} not `Float`: {:?}", self.get(index)?);
		};
		Ok(f32::from_bits(bytes))
	}
	pub(crate) fn get_long(&self, index: u16) -> Result<i64> {
		let &PoolEntry::Long { bytes } = self.get(index)? else {
			bail!("pool entry at index {index} not `Long`: {:?}", self.get(index)?);
		};
		Ok(bytes)
	}

	pub(crate) fn get_method_handle(&self, index: u16) -> Result<Handle> {
		(|| -> Result<_> {
			let &PoolEntry::MethodHandle { reference_kind, reference_index } = self.get(index)? else {
				bail!("pool entry not `MethodHandle`: {:?}", self.get(index)?);
			};

			Ok(match reference_kind {
				method_handle_reference::GET_FIELD => Handle::GetField(self.get_field_ref(reference_index)?),
				method_handle_reference::GET_STATIC => Handle::GetStatic(self.get_field_ref(reference_index)?),
				method_handle_reference::PUT_FIELD => Handle::PutField(self.get_field_ref(reference_index)?),
				method_handle_reference::PUT_STATIC => Handle::PutStatic(self.get_field_ref(reference_index)?),
				method_handle_reference::INVOKE_VIRTUAL => Handle::InvokeVirtual(self.get_method_ref(reference_index)?),
				method_handle_reference::INVOKE_STATIC => {
					let (method_ref, is_interface) = self.get_method_ref_or_interface_method_ref(reference_index)?;
					Handle::InvokeStatic(method_ref, is_interface)
				},
				method_handle_reference::INVOKE_SPECIAL => {
					let (method_ref, is_interface) = self.get_method_ref_or_interface_method_ref(reference_index)?;
					Handle::InvokeSpecial(method_ref, is_interface)
				},
				method_handle_reference::NEW_INVOKE_SPECIAL => Handle::NewInvokeSpecial(self.get_method_ref(reference_index)?),
				method_handle_reference::INVOKE_INTERFACE => Handle::InvokeInterface(self.get_interface_method_ref(reference_index)?),
				kind => bail!("unknown `reference_kind` {kind} for `MethodHandle` pool entry"),
			})
		})().pool_context(index)
	}

	fn get_method_type(&self, index: u16) -> Result<MethodDescriptor> {
		let &PoolEntry::MethodType { descriptor_index } = self.get(index)? else {
			bail!("pool entry not `MethodType`: {:?}", self.get(index)?);
		};
		MethodDescriptor::try_from(self.get_utf8(descriptor_index)?)
	}

	fn get_bootstrap_method<'b>(
		&self,
		bootstrap_method_attribute_index: u16,
		bootstrap_methods: &'b Option<Vec<BootstrapMethodRead>>,
	) -> Result<&'b BootstrapMethodRead> {
		let Some(bootstrap_methods) = bootstrap_methods.as_ref() else {
			bail!("cannot load dynamically computed pool entry, as there's no `BootstrapMethods` attribute");
		};
		bootstrap_methods.get(bootstrap_method_attribute_index as usize)
			.with_context(|| anyhow!("there's no bootstrap method at index {bootstrap_method_attribute_index}"))
	}

	fn get_bootstrap_arguments(&self, method: &BootstrapMethodRead, bootstrap_methods: &Option<Vec<BootstrapMethodRead>>, depth: usize) -> Result<Vec<Loadable>> {
		let mut vec = Vec::with_capacity(method.arguments.len());
		for &argument in &method.arguments {
			vec.push(self.get_loadable_nested(argument, bootstrap_methods, depth + 1)?);
		}
		Ok(vec)
	}

	fn get_dynamic(&self, index: u16, bootstrap_methods: &Option<Vec<BootstrapMethodRead>>, depth: usize) -> Result<ConstantDynamic> {
		let &PoolEntry::Dynamic { bootstrap_method_attribute_index, name_and_type_index } = self.get(index)? else {
			bail!("pool entry not `Dynamic`: {:?}", self.get(index)?);
		};
		if depth > MAX_DYNAMIC_DEPTH {
			bail!("`Dynamic` pool entries nested more than {MAX_DYNAMIC_DEPTH} levels deep, maybe they refer to themselves?");
		}

		let (name, descriptor): (FieldName, FieldDescriptor) = self.get_name_and_type(name_and_type_index)?;
		let method = self.get_bootstrap_method(bootstrap_method_attribute_index, bootstrap_methods)?;
		let arguments = self.get_bootstrap_arguments(method, bootstrap_methods, depth)
			.with_context(|| anyhow!("while reading arguments for `Dynamic` {name:?} {descriptor:?}"))?;

		Ok(ConstantDynamic { name, descriptor, handle: method.handle.clone(), arguments })
	}

	pub(crate) fn get_invoke_dynamic(&self, index: u16, bootstrap_methods: &Option<Vec<BootstrapMethodRead>>) -> Result<InvokeDynamic> {
		(|| -> Result<_> {
			let &PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index } = self.get(index)? else {
				bail!("pool entry not `InvokeDynamic`: {:?}", self.get(index)?);
			};

			let (name, descriptor): (MethodName, MethodDescriptor) = self.get_name_and_type(name_and_type_index)?;
			let method = self.get_bootstrap_method(bootstrap_method_attribute_index, bootstrap_methods)?;
			let arguments = self.get_bootstrap_arguments(method, bootstrap_methods, 0)
				.with_context(|| anyhow!("while reading arguments for `InvokeDynamic` {name:?} {descriptor:?}"))?;

			Ok(InvokeDynamic { name, descriptor, handle: method.handle.clone(), arguments })
		})().pool_context(index)
	}

	/// Gets a loadable constant pool entry.
	///
	/// Loadable entries are `Integer`, `Float`, `Long`, `Double`, `Class`, `String`, `MethodHandle`, `MethodType` and
	/// `Dynamic`. These are collected in the [`Loadable`] type.
	pub(crate) fn get_loadable(&self, index: u16, bootstrap_methods: &Option<Vec<BootstrapMethodRead>>) -> Result<Loadable> {
		self.get_loadable_nested(index, bootstrap_methods, 0)
	}

	fn get_loadable_nested(&self, index: u16, bootstrap_methods: &Option<Vec<BootstrapMethodRead>>, depth: usize) -> Result<Loadable> {
		(|| -> Result<_> {
			Ok(match self.get(index)? {
				PoolEntry::Integer { .. } => Loadable::Integer(self.get_integer(index)?),
				PoolEntry::Float { .. } => Loadable::Float(self.get_float(index)?),
				PoolEntry::Long { .. } => Loadable::Long(self.get_long(index)?),
				PoolEntry::Double { .. } => Loadable::Double(self.get_double(index)?),
				PoolEntry::Class { .. } => Loadable::Class(self.get_class(index)?),
				PoolEntry::String { .. } => Loadable::String(self.get_string(index)?),
				PoolEntry::MethodHandle { .. } => Loadable::MethodHandle(self.get_method_handle(index)?),
				PoolEntry::MethodType { .. } => Loadable::MethodType(self.get_method_type(index)?),
				PoolEntry::Dynamic { .. } => Loadable::Dynamic(self.get_dynamic(index, bootstrap_methods, depth)?),
				entry => bail!("pool entry is not loadable: {entry:?}"),
			})
		})().pool_context(index)
	}

	pub(crate) fn get_constant_value(&self, index: u16) -> Result<ConstantValue> {
		(|| -> Result<_> {
			Ok(match self.get(index)? {
				PoolEntry::Integer { .. } => ConstantValue::Integer(self.get_integer(index)?),
				PoolEntry::Float { .. } => ConstantValue::Float(self.get_float(index)?),
				PoolEntry::Long { .. } => ConstantValue::Long(self.get_long(index)?),
				PoolEntry::Double { .. } => ConstantValue::Double(self.get_double(index)?),
				PoolEntry::String { .. } => ConstantValue::String(self.get_string(index)?),
				entry => bail!("pool entry may not be used in a `ConstantValue` attribute: {entry:?}"),
			})
		})().pool_context(index)
	}
}

/// Tiny helper trait for adding pool indices to errors.
trait PoolContext {
	fn pool_context(self, index: u16) -> Self;
}
impl<T> PoolContext for Result<T> {
	fn pool_context(self, index: u16) -> Self {
		self.with_context(|| anyhow!("while getting pool index {index}"))
	}
}

#[cfg(test)]
mod testing {
	use std::io::Cursor;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::class_reader::pool::PoolRead;

	#[test]
	fn read_pool() -> Result<()> {
		let bytes = [
			0, 6,
			1, 0, 1, b'A', // 1: Utf8 "A"
			7, 0, 1, // 2: Class A
			5, 0, 0, 0, 0, 0, 0, 0, 7, // 3 and 4: Long 7
			3, 0, 0, 0, 9, // 5: Integer 9
		];
		let pool = PoolRead::read(&mut Cursor::new(&bytes[..]))?;
		assert_eq!(pool.get_class(2)?.as_str(), "A");
		assert_eq!(pool.get_long(3)?, 7);
		assert_eq!(pool.get_integer(5)?, 9);
		assert!(pool.get_long(4).is_err());
		assert!(pool.get_integer(0).is_err());
		Ok(())
	}

	#[test]
	fn class_with_invalid_name() -> Result<()> {
		let bytes = [
			0, 3,
			1, 0, 3, b'a', b'.', b'b',
			7, 0, 1,
		];
		let pool = PoolRead::read(&mut Cursor::new(&bytes[..]))?;
		assert!(pool.get_class(2).is_err());
		Ok(())
	}
}
