use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaString;
use crate::{ClassRead, jstring};
use crate::constants::{handle, pool};
use crate::event::{Constant, ConstantDynamic, Handle};

/// A bootstrap method with its arguments still as pool indices, since arguments may refer to other dynamic constants.
#[derive(Debug, PartialEq)]
pub(crate) struct BootstrapMethodRead {
	pub(crate) handle: Handle,
	pub(crate) arguments: Vec<u16>,
}

/// Dynamic constants may use dynamic constants as arguments; this bounds how deep we follow that.
const MAX_DYNAMIC_DEPTH: usize = 32;

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
	Module { name_index: u16 },
	Package { name_index: u16 },
}

/// The owner, name, descriptor and whether it was an interface method reference.
pub(crate) type MemberRef = (String, String, String, bool);

pub(crate) struct PoolRead {
	/// [`None`] for the zero index, and for the upper indices of [`PoolEntry::Double`] and [`PoolEntry::Long`].
	inner: Vec<Option<PoolEntry>>,
	pub(crate) bootstrap_methods: Vec<BootstrapMethodRead>,
}

impl PoolRead {
	/// Reads the constant pool, starting with its `u16` count.
	pub(crate) fn read(reader: &mut impl ClassRead) -> Result<PoolRead> {
		let mut pool = vec![None];

		let constant_pool_count = reader.read_u16_as_usize()?;
		while pool.len() < constant_pool_count {
			let entry = match reader.read_u8()? {
				pool::UTF8 => {
					let length = reader.read_u16_as_usize()?;
					let vec = reader.read_u8_vec(length)?;
					PoolEntry::Utf8 { string: jstring::from_vec_to_java_string(vec)? }
				},
				pool::INTEGER => PoolEntry::Integer { bytes: reader.read_i32()? },
				pool::FLOAT => PoolEntry::Float { bytes: reader.read_u32()? },
				pool::LONG => PoolEntry::Long { bytes: reader.read_i64()? },
				pool::DOUBLE => PoolEntry::Double { bytes: reader.read_i64()? as u64 },
				pool::CLASS => PoolEntry::Class { name_index: reader.read_u16()? },
				pool::STRING => PoolEntry::String { string_index: reader.read_u16()? },
				pool::FIELD_REF => PoolEntry::FieldRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
				pool::METHOD_REF => PoolEntry::MethodRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
				pool::INTERFACE_METHOD_REF => PoolEntry::InterfaceMethodRef { class_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
				pool::NAME_AND_TYPE => PoolEntry::NameAndType { name_index: reader.read_u16()?, descriptor_index: reader.read_u16()? },
				pool::METHOD_HANDLE => PoolEntry::MethodHandle { reference_kind: reader.read_u8()?, reference_index: reader.read_u16()? },
				pool::METHOD_TYPE => PoolEntry::MethodType { descriptor_index: reader.read_u16()? },
				pool::DYNAMIC => PoolEntry::Dynamic { bootstrap_method_attribute_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
				pool::INVOKE_DYNAMIC => PoolEntry::InvokeDynamic { bootstrap_method_attribute_index: reader.read_u16()?, name_and_type_index: reader.read_u16()? },
				pool::MODULE => PoolEntry::Module { name_index: reader.read_u16()? },
				pool::PACKAGE => PoolEntry::Package { name_index: reader.read_u16()? },
				tag => bail!("unknown constant pool tag {tag} at pool index {}", pool.len()),
			};
			let wide = matches!(entry, PoolEntry::Long { .. } | PoolEntry::Double { .. });
			pool.push(Some(entry));
			if wide {
				pool.push(None); // long and double take up two pool slots
			}
		}

		Ok(PoolRead { inner: pool, bootstrap_methods: Vec::new() })
	}

	fn get(&self, index: u16) -> Result<&PoolEntry> {
		if let Some(Some(entry)) = self.inner.get(index as usize) {
			Ok(entry)
		} else {
			bail!("pool entry at index {index:?} is not there: either index too large or the upper half of long or double");
		}
	}

	/// Returns [`None`] if `index` is zero, otherwise returns [`Some`] of the result of the function `f`.
	pub(crate) fn get_optional<T>(&self, index: u16, f: impl Fn(&PoolRead, u16) -> Result<T>) -> Result<Option<T>> {
		if index == 0 {
			Ok(None)
		} else {
			Ok(Some(f(self, index)?))
		}
	}

	pub(crate) fn get_java_string(&self, index: u16) -> Result<&JavaString> {
		let PoolEntry::Utf8 { string } = self.get(index)? else {
			bail!("pool entry not `Utf8`: {:?}", self.get(index)?);
		};
		Ok(string)
	}

	pub(crate) fn get_utf8(&self, index: u16) -> Result<String> {
		self.get_java_string(index)
			.and_then(|string| string.clone().into_string().map_err(|_| anyhow!("name contains an unpaired surrogate")))
			.pool_context(index)
	}

	pub(crate) fn get_class(&self, index: u16) -> Result<String> {
		match *self.get(index)? {
			PoolEntry::Class { name_index } => self.get_utf8(name_index),
			ref entry => bail!("pool entry not `Class`: {entry:?}"),
		}.pool_context(index)
	}

	pub(crate) fn get_module(&self, index: u16) -> Result<String> {
		match *self.get(index)? {
			PoolEntry::Module { name_index } => self.get_utf8(name_index),
			ref entry => bail!("pool entry not `Module`: {entry:?}"),
		}.pool_context(index)
	}

	pub(crate) fn get_package(&self, index: u16) -> Result<String> {
		match *self.get(index)? {
			PoolEntry::Package { name_index } => self.get_utf8(name_index),
			ref entry => bail!("pool entry not `Package`: {entry:?}"),
		}.pool_context(index)
	}

	pub(crate) fn get_name_and_type(&self, index: u16) -> Result<(String, String)> {
		match *self.get(index)? {
			PoolEntry::NameAndType { name_index, descriptor_index } => Ok((self.get_utf8(name_index)?, self.get_utf8(descriptor_index)?)),
			ref entry => bail!("pool entry not `NameAndType`: {entry:?}"),
		}.pool_context(index)
	}

	/// Reads a `FieldRef`, `MethodRef` or `InterfaceMethodRef`.
	pub(crate) fn get_member_ref(&self, index: u16) -> Result<MemberRef> {
		let (class_index, name_and_type_index, interface) = match *self.get(index)? {
			PoolEntry::FieldRef { class_index, name_and_type_index } => (class_index, name_and_type_index, false),
			PoolEntry::MethodRef { class_index, name_and_type_index } => (class_index, name_and_type_index, false),
			PoolEntry::InterfaceMethodRef { class_index, name_and_type_index } => (class_index, name_and_type_index, true),
			ref entry => bail!("pool entry not a member reference: {entry:?}"),
		};
		let owner = self.get_class(class_index)?;
		let (name, descriptor) = self.get_name_and_type(name_and_type_index)?;
		Ok((owner, name, descriptor, interface))
	}

	pub(crate) fn get_integer(&self, index: u16) -> Result<i32> {
		match *self.get(index)? {
			PoolEntry::Integer { bytes } => Ok(bytes),
			ref entry => bail!("pool entry not `Integer`: {entry:?}"),
		}.pool_context(index)
	}

	pub(crate) fn get_long(&self, index: u16) -> Result<i64> {
		match *self.get(index)? {
			PoolEntry::Long { bytes } => Ok(bytes),
			ref entry => bail!("pool entry not `Long`: {entry:?}"),
		}.pool_context(index)
	}

	pub(crate) fn get_float(&self, index: u16) -> Result<f32> {
		match *self.get(index)? {
			PoolEntry::Float { bytes } => Ok(f32::from_bits(bytes)),
			ref entry => bail!("pool entry not `Float`: {entry:?}"),
		}.pool_context(index)
	}

	pub(crate) fn get_double(&self, index: u16) -> Result<f64> {
		match *self.get(index)? {
			PoolEntry::Double { bytes } => Ok(f64::from_bits(bytes)),
			ref entry => bail!("pool entry not `Double`: {entry:?}"),
		}.pool_context(index)
	}

	pub(crate) fn get_method_handle(&self, index: u16) -> Result<Handle> {
		let PoolEntry::MethodHandle { reference_kind, reference_index } = *self.get(index)? else {
			bail!("pool entry not `MethodHandle`: {:?}", self.get(index)?);
		};
		if !(handle::GET_FIELD..=handle::INVOKE_INTERFACE).contains(&reference_kind) {
			bail!("unknown `reference_kind` {reference_kind} for `MethodHandle` pool entry at {index}");
		}
		let (owner, name, descriptor, interface) = self.get_member_ref(reference_index).pool_context(index)?;
		Ok(Handle { kind: reference_kind, owner, name, descriptor, interface })
	}

	pub(crate) fn get_constant(&self, index: u16) -> Result<Constant> {
		self.get_constant_with_depth(index, 0)
	}

	fn get_constant_with_depth(&self, index: u16, depth: usize) -> Result<Constant> {
		let constant = match *self.get(index)? {
			PoolEntry::Integer { bytes } => Constant::Integer(bytes),
			PoolEntry::Float { bytes } => Constant::Float(f32::from_bits(bytes)),
			PoolEntry::Long { bytes } => Constant::Long(bytes),
			PoolEntry::Double { bytes } => Constant::Double(f64::from_bits(bytes)),
			PoolEntry::Class { name_index } => Constant::Class(self.get_utf8(name_index)?),
			PoolEntry::String { string_index } => Constant::String(self.get_java_string(string_index)?.clone()),
			PoolEntry::MethodHandle { .. } => Constant::MethodHandle(self.get_method_handle(index)?),
			PoolEntry::MethodType { descriptor_index } => Constant::MethodType(self.get_utf8(descriptor_index)?),
			PoolEntry::Dynamic { bootstrap_method_attribute_index, name_and_type_index } => {
				let (name, descriptor) = self.get_name_and_type(name_and_type_index)?;
				let (bootstrap, arguments) = self.get_bootstrap_method(bootstrap_method_attribute_index, depth)?;
				Constant::Dynamic(Box::new(ConstantDynamic { name, descriptor, bootstrap, arguments }))
			},
			ref entry => bail!("pool entry is not loadable: {entry:?}"),
		};
		Ok(constant)
	}

	/// Reads an `InvokeDynamic` entry into its name, descriptor, bootstrap handle and arguments.
	pub(crate) fn get_invoke_dynamic(&self, index: u16) -> Result<(String, String, Handle, Vec<Constant>)> {
		let PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index } = *self.get(index)? else {
			bail!("pool entry not `InvokeDynamic`: {:?}", self.get(index)?);
		};
		let (name, descriptor) = self.get_name_and_type(name_and_type_index)?;
		let (bootstrap, arguments) = self.get_bootstrap_method(bootstrap_method_attribute_index, 0)
			.with_context(|| anyhow!("while reading `InvokeDynamic` {name:?} {descriptor:?}"))
			.pool_context(index)?;
		Ok((name, descriptor, bootstrap, arguments))
	}

	fn get_bootstrap_method(&self, index: u16, depth: usize) -> Result<(Handle, Vec<Constant>)> {
		if depth > MAX_DYNAMIC_DEPTH {
			bail!("dynamic constants nested deeper than {MAX_DYNAMIC_DEPTH}");
		}
		let Some(method) = self.bootstrap_methods.get(index as usize) else {
			bail!("there's no bootstrap method at index {index}");
		};
		let mut arguments = Vec::with_capacity(method.arguments.len());
		for &argument in &method.arguments {
			let value = self.get_constant_with_depth(argument, depth + 1)
				.with_context(|| anyhow!("while reading argument of bootstrap method {index}"))?;
			arguments.push(value);
		}
		Ok((method.handle.clone(), arguments))
	}

	/// Reads a `ConstantValue` attribute value.
	pub(crate) fn get_constant_value(&self, index: u16) -> Result<Constant> {
		match self.get(index)? {
			PoolEntry::Integer { .. } | PoolEntry::Float { .. } | PoolEntry::Long { .. } | PoolEntry::Double { .. } | PoolEntry::String { .. } => {
				self.get_constant(index)
			},
			entry => bail!("pool entry may not be used in a `ConstantValue` attribute: {entry:?}"),
		}
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
