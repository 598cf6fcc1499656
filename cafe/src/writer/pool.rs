use std::collections::hash_map::Entry;
use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};
use crate::{ClassWrite, jstring};
use crate::constants::{handle, pool};
use crate::event::{Constant, Handle};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
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

/// A bootstrap method with its handle and arguments as pool indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BootstrapMethodWrite {
	handle_index: u16,
	arguments: Vec<u16>,
}

#[derive(Debug)]
pub(crate) struct PoolWrite {
	/// The value written as `constant_pool_count` in the class file.
	///
	/// We start at `1` and increment this twice for [`PoolEntry::Double`] and [`PoolEntry::Long`].
	count: u16,
	inner: Vec<PoolEntry>,
	/// Maps an [`PoolEntry`] to its index, so that each entry is only written once.
	map: HashMap<PoolEntry, u16>,

	bootstrap_methods: Vec<BootstrapMethodWrite>,
	bootstrap_map: HashMap<BootstrapMethodWrite, u16>,
}

impl PoolWrite {
	pub(crate) fn new() -> PoolWrite {
		PoolWrite {
			count: 1, // first index given out is 1
			inner: Vec::new(),
			map: HashMap::new(),
			bootstrap_methods: Vec::new(),
			bootstrap_map: HashMap::new(),
		}
	}

	fn put(&mut self, entry: PoolEntry) -> Result<u16> {
		match self.map.entry(entry) {
			Entry::Occupied(entry) => Ok(*entry.get()),
			Entry::Vacant(entry) => {
				let index = self.count;

				let inc = if matches!(entry.key(), PoolEntry::Long { .. } | PoolEntry::Double { .. }) {
					2 // long and double take up two pool slots
				} else {
					1
				};
				self.count = self.count.checked_add(inc)
					.with_context(|| anyhow!("pool count overflowed while adding pool entry {:?} to pool at index {}", entry.key(), index))?;

				self.inner.push(entry.key().clone());
				entry.insert(index);

				Ok(index)
			},
		}
	}

	pub(crate) fn put_utf8(&mut self, value: &str) -> Result<u16> {
		self.put(PoolEntry::Utf8 { string: JavaString::from(value) })
	}

	pub(crate) fn put_java_utf8(&mut self, value: &JavaStr) -> Result<u16> {
		self.put(PoolEntry::Utf8 { string: value.to_owned() })
	}

	pub(crate) fn put_class(&mut self, name: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Class { name_index })
	}

	/// Returns zero for [`None`].
	pub(crate) fn put_optional_class(&mut self, name: Option<&str>) -> Result<u16> {
		name.map_or(Ok(0), |name| self.put_class(name))
	}

	pub(crate) fn put_module(&mut self, name: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Module { name_index })
	}

	pub(crate) fn put_package(&mut self, name: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		self.put(PoolEntry::Package { name_index })
	}

	pub(crate) fn put_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
		let name_index = self.put_utf8(name)?;
		let descriptor_index = self.put_utf8(descriptor)?;
		self.put(PoolEntry::NameAndType { name_index, descriptor_index })
	}

	pub(crate) fn put_field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> Result<u16> {
		let class_index = self.put_class(owner)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		self.put(PoolEntry::FieldRef { class_index, name_and_type_index })
	}

	/// Puts a `MethodRef`, or an `InterfaceMethodRef` if `interface` is set.
	pub(crate) fn put_method_ref(&mut self, owner: &str, name: &str, descriptor: &str, interface: bool) -> Result<u16> {
		let class_index = self.put_class(owner)?;
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		if interface {
			self.put(PoolEntry::InterfaceMethodRef { class_index, name_and_type_index })
		} else {
			self.put(PoolEntry::MethodRef { class_index, name_and_type_index })
		}
	}

	pub(crate) fn put_method_handle(&mut self, value: &Handle) -> Result<u16> {
		let reference_index = if handle::is_field(value.kind) {
			self.put_field_ref(&value.owner, &value.name, &value.descriptor)?
		} else {
			self.put_method_ref(&value.owner, &value.name, &value.descriptor, value.interface)?
		};
		self.put(PoolEntry::MethodHandle { reference_kind: value.kind, reference_index })
	}

	pub(crate) fn put_integer(&mut self, value: i32) -> Result<u16> {
		self.put(PoolEntry::Integer { bytes: value })
	}

	pub(crate) fn put_long(&mut self, value: i64) -> Result<u16> {
		self.put(PoolEntry::Long { bytes: value })
	}

	pub(crate) fn put_float(&mut self, value: f32) -> Result<u16> {
		self.put(PoolEntry::Float { bytes: value.to_bits() })
	}

	pub(crate) fn put_double(&mut self, value: f64) -> Result<u16> {
		self.put(PoolEntry::Double { bytes: value.to_bits() })
	}

	pub(crate) fn put_constant(&mut self, value: &Constant) -> Result<u16> {
		match value {
			&Constant::Integer(value) => self.put_integer(value),
			&Constant::Float(value) => self.put_float(value),
			&Constant::Long(value) => self.put_long(value),
			&Constant::Double(value) => self.put_double(value),
			Constant::String(value) => {
				let string_index = self.put_java_utf8(value)?;
				self.put(PoolEntry::String { string_index })
			},
			Constant::Class(value) => self.put_class(value),
			Constant::MethodType(value) => {
				let descriptor_index = self.put_utf8(value)?;
				self.put(PoolEntry::MethodType { descriptor_index })
			},
			Constant::MethodHandle(value) => self.put_method_handle(value),
			Constant::Dynamic(value) => {
				let name_and_type_index = self.put_name_and_type(&value.name, &value.descriptor)?;
				let bootstrap_method_attribute_index = self.put_bootstrap_method(&value.bootstrap, &value.arguments)?;
				self.put(PoolEntry::Dynamic { bootstrap_method_attribute_index, name_and_type_index })
			},
		}
	}

	pub(crate) fn put_invoke_dynamic(&mut self, name: &str, descriptor: &str, bootstrap: &Handle, arguments: &[Constant]) -> Result<u16> {
		let name_and_type_index = self.put_name_and_type(name, descriptor)?;
		let bootstrap_method_attribute_index = self.put_bootstrap_method(bootstrap, arguments)?;
		self.put(PoolEntry::InvokeDynamic { bootstrap_method_attribute_index, name_and_type_index })
	}

	/// Puts an entry into the `BootstrapMethods` attribute, returning its index in there.
	fn put_bootstrap_method(&mut self, bootstrap: &Handle, arguments: &[Constant]) -> Result<u16> {
		let handle_index = self.put_method_handle(bootstrap)?;
		let arguments = arguments.iter()
			.map(|argument| self.put_constant(argument))
			.collect::<Result<Vec<_>>>()?;
		let entry = BootstrapMethodWrite { handle_index, arguments };

		match self.bootstrap_map.entry(entry) {
			Entry::Occupied(entry) => Ok(*entry.get()),
			Entry::Vacant(entry) => {
				let index = self.bootstrap_methods.len().try_into()
					.with_context(|| anyhow!("bootstrap methods attribute count overflowed while adding bootstrap method {:?}", entry.key()))?;
				self.bootstrap_methods.push(entry.key().clone());
				entry.insert(index);
				Ok(index)
			},
		}
	}

	pub(crate) fn has_bootstrap_methods(&self) -> bool {
		!self.bootstrap_methods.is_empty()
	}

	/// Writes the body of the `BootstrapMethods` attribute.
	pub(crate) fn write_bootstrap_methods(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_slice(&self.bootstrap_methods, |w, size| w.write_usize_as_u16(size), |w, method| {
			w.write_u16(method.handle_index)?;
			w.write_slice(&method.arguments, |w, size| w.write_usize_as_u16(size), |w, &argument| w.write_u16(argument))
		})
	}

	/// Writes the constant pool, starting with its `u16` count.
	pub(crate) fn write(&self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_u16(self.count)?;

		for entry in &self.inner {
			match *entry {
				PoolEntry::Utf8 { ref string } => {
					writer.write_u8(pool::UTF8)?;
					let vec = jstring::from_string_to_vec(string);
					writer.write_usize_as_u16(vec.len()).context("failed to write length of string")?;
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
				PoolEntry::Module { name_index } => {
					writer.write_u8(pool::MODULE)?;
					writer.write_u16(name_index)?;
				},
				PoolEntry::Package { name_index } => {
					writer.write_u8(pool::PACKAGE)?;
					writer.write_u16(name_index)?;
				},
			}
		}

		Ok(())
	}
}
