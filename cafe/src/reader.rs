//! Reading class files into [`ClassEvent`]s.

mod code;
mod labels;
mod pool;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use crate::{ClassRead, descriptor, jstring};
use crate::constants::{attribute, type_target, MAGIC, MAX_MAJOR_VERSION};
use crate::event::{Annotation, ClassEvent, ClassHeader, ClassSink, ElementValue, FieldHeader, InnerClass, Label, LocalVariableRange, MethodHeader, Module, ModulePackage, ModuleProvide, ModuleRequire, RecordComponent, TypeAnnotation, TypePathStep, TypeTarget, Version};
use crate::reader::labels::Labels;
use crate::reader::pool::{BootstrapMethodRead, PoolRead};

fn skip_attributes(reader: &mut impl ClassRead) -> Result<()> {
	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let _attribute_name_index = reader.read_u16()?;
		let length = reader.read_u32()?;
		reader.skip(length as i64)?;
	}
	Ok(())
}

pub(crate) fn read(reader: &mut impl ClassRead, sink: &mut impl ClassSink) -> Result<()> {
	let magic = reader.read_u32()?;
	if magic != MAGIC {
		bail!("wrong magic: got {magic:#x}, expected 0xCAFEBABE");
	}

	let minor = reader.read_u16()?;
	let major = reader.read_u16()?;
	if major > MAX_MAJOR_VERSION {
		bail!("unsupported class file version: {major}.{minor}");
	}
	let version = Version { major, minor };

	let mut pool = PoolRead::read(reader)?;

	let access = reader.read_u16()?;
	let name = pool.get_class(reader.read_u16()?)?;
	let super_class = pool.get_optional(reader.read_u16()?, PoolRead::get_class)?;
	let interfaces = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| pool.get_class(r.read_u16()?)
	)?;

	// The BootstrapMethods attribute must be read before any loadable constant, so the fields and methods are
	// skipped here and read after the class attributes.
	let members_start = reader.marker()?;
	for _ in 0..reader.read_u16()? {
		// access flags, name and descriptor
		reader.skip(2 + 2 + 2)?;
		skip_attributes(reader)?;
	}
	for _ in 0..reader.read_u16()? {
		reader.skip(2 + 2 + 2)?;
		skip_attributes(reader)?;
	}

	let mut source_file = None;
	let mut source_debug = None;
	let mut events = Vec::new();
	let mut nest_members = Vec::new();
	let mut permitted_subclasses = Vec::new();
	let mut inner_classes = Vec::new();
	let mut markers = Markers::default();
	let mut annotations = Vec::new();
	let mut type_annotations = Vec::new();
	let mut record = None;
	let mut module = None;
	let mut module_packages = None;
	let mut module_main_class = None;

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::BOOTSTRAP_METHODS => {
				pool.bootstrap_methods = reader.read_vec(
					|r| r.read_u16_as_usize(),
					|r| Ok(BootstrapMethodRead {
						handle: pool.get_method_handle(r.read_u16()?)?,
						arguments: r.read_vec(|r| r.read_u16_as_usize(), |r| r.read_u16())?,
					})
				)?;
			},
			attribute::SOURCE_FILE => source_file = Some(pool.get_utf8(reader.read_u16()?)?),
			attribute::SOURCE_DEBUG_EXTENSION => {
				let vec = reader.read_u8_vec(length as usize)?;
				source_debug = Some(jstring::from_vec_to_string(vec)?);
			},
			attribute::SIGNATURE => events.push(ClassEvent::Signature(pool.get_utf8(reader.read_u16()?)?)),
			attribute::ENCLOSING_METHOD => {
				let class = pool.get_class(reader.read_u16()?)?;
				let method = pool.get_optional(reader.read_u16()?, PoolRead::get_name_and_type)?;
				let (name, descriptor) = method.unzip();
				events.push(ClassEvent::EnclosingMethod { class, name, descriptor });
			},
			attribute::NEST_HOST => events.push(ClassEvent::NestHost(pool.get_class(reader.read_u16()?)?)),
			attribute::NEST_MEMBERS => {
				nest_members = reader.read_vec(|r| r.read_u16_as_usize(), |r| pool.get_class(r.read_u16()?))?;
			},
			attribute::PERMITTED_SUBCLASSES => {
				permitted_subclasses = reader.read_vec(|r| r.read_u16_as_usize(), |r| pool.get_class(r.read_u16()?))?;
			},
			attribute::INNER_CLASSES => {
				inner_classes = reader.read_vec(
					|r| r.read_u16_as_usize(),
					|r| Ok(InnerClass {
						name: pool.get_class(r.read_u16()?)?,
						outer: pool.get_optional(r.read_u16()?, PoolRead::get_class)?,
						simple_name: pool.get_optional(r.read_u16()?, PoolRead::get_utf8)?,
						access: r.read_u16()?,
					})
				)?;
			},
			attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
				annotations.extend(read_annotations(reader, &pool)?.into_iter().map(|annotation| (true, annotation)));
			},
			attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
				annotations.extend(read_annotations(reader, &pool)?.into_iter().map(|annotation| (false, annotation)));
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				type_annotations.extend(read_type_annotations(reader, &pool, None)?.into_iter().map(|annotation| (true, annotation)));
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				type_annotations.extend(read_type_annotations(reader, &pool, None)?.into_iter().map(|annotation| (false, annotation)));
			},
			attribute::RECORD => {
				record = Some(reader.read_vec(|r| r.read_u16_as_usize(), |r| read_record_component(r, &pool))?);
			},
			attribute::MODULE => module = Some(read_module(reader, &pool)?),
			attribute::MODULE_PACKAGES => {
				module_packages = Some(reader.read_vec(|r| r.read_u16_as_usize(), |r| pool.get_package(r.read_u16()?))?);
			},
			attribute::MODULE_MAIN_CLASS => module_main_class = Some(pool.get_class(reader.read_u16()?)?),
			_ if markers.read(&attribute_name) => reader.skip(length as i64)?,
			_ => {
				warn!("skipping unsupported attribute {attribute_name:?} of class {name:?}");
				reader.skip(length as i64)?;
			},
		}
	}

	if let Some(module) = &mut module {
		module.packages = module_packages.unwrap_or_default();
		module.main_class = module_main_class;
	} else if module_packages.is_some() || module_main_class.is_some() {
		warn!("skipping the module packages and main class of {name:?}, as it has no module attribute");
	}

	debug!("reading class {name:?}");
	sink.accept(ClassEvent::Class(ClassHeader { version, access, name: name.clone(), super_class, interfaces }))?;
	if source_file.is_some() || source_debug.is_some() {
		sink.accept(ClassEvent::Source { file: source_file, debug: source_debug })?;
	}
	// Signature, then EnclosingMethod, then NestHost
	events.sort_by_key(|event| match event {
		ClassEvent::Signature(_) => 0,
		ClassEvent::EnclosingMethod { .. } => 1,
		_ => 2,
	});
	for event in events {
		sink.accept(event)?;
	}
	for member in nest_members {
		sink.accept(ClassEvent::NestMember(member))?;
	}
	for subclass in permitted_subclasses {
		sink.accept(ClassEvent::PermittedSubclass(subclass))?;
	}
	for inner_class in inner_classes {
		sink.accept(ClassEvent::InnerClass(inner_class))?;
	}
	markers.emit(sink)?;
	for (visible, annotation) in annotations {
		sink.accept(ClassEvent::Annotation { visible, annotation })?;
	}
	for (visible, annotation) in type_annotations {
		sink.accept(ClassEvent::TypeAnnotation { visible, annotation })?;
	}
	if let Some(components) = record {
		sink.accept(ClassEvent::Record(components))?;
	}
	if let Some(module) = module {
		sink.accept(ClassEvent::Module(Box::new(module)))?;
	}

	reader.with_pos(members_start, |reader| {
		for _ in 0..reader.read_u16()? {
			read_field(reader, &pool, sink)?;
		}
		for _ in 0..reader.read_u16()? {
			read_method(reader, &pool, sink)?;
		}
		Ok(())
	}).with_context(|| anyhow!("in class {name:?}"))?;

	sink.accept(ClassEvent::End)
}

fn read_field(reader: &mut impl ClassRead, pool: &PoolRead, sink: &mut impl ClassSink) -> Result<()> {
	let access = reader.read_u16()?;
	let name = pool.get_utf8(reader.read_u16()?)?;
	let descriptor = pool.get_utf8(reader.read_u16()?)?;

	(|| -> Result<()> {
		let mut value = None;
		let mut signature = None;
		let mut markers = Markers::default();
		let mut annotations = Vec::new();
		let mut type_annotations = Vec::new();

		let attributes_count = reader.read_u16()?;
		for _ in 0..attributes_count {
			let attribute_name = pool.get_utf8(reader.read_u16()?)?;
			let length = reader.read_u32()?;

			match attribute_name.as_str() {
				attribute::CONSTANT_VALUE => value = Some(pool.get_constant_value(reader.read_u16()?)?),
				attribute::SIGNATURE => signature = Some(pool.get_utf8(reader.read_u16()?)?),
				attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
					annotations.extend(read_annotations(reader, pool)?.into_iter().map(|annotation| (true, annotation)));
				},
				attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
					annotations.extend(read_annotations(reader, pool)?.into_iter().map(|annotation| (false, annotation)));
				},
				attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
					type_annotations.extend(read_type_annotations(reader, pool, None)?.into_iter().map(|annotation| (true, annotation)));
				},
				attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
					type_annotations.extend(read_type_annotations(reader, pool, None)?.into_iter().map(|annotation| (false, annotation)));
				},
				_ if markers.read(&attribute_name) => reader.skip(length as i64)?,
				_ => {
					warn!("skipping unsupported attribute {attribute_name:?} of field {name:?}");
					reader.skip(length as i64)?;
				},
			}
		}

		sink.accept(ClassEvent::Field(FieldHeader { access, name: name.clone(), descriptor: descriptor.clone(), value }))?;
		if let Some(signature) = signature {
			sink.accept(ClassEvent::Signature(signature))?;
		}
		markers.emit(sink)?;
		for (visible, annotation) in annotations {
			sink.accept(ClassEvent::Annotation { visible, annotation })?;
		}
		for (visible, annotation) in type_annotations {
			sink.accept(ClassEvent::TypeAnnotation { visible, annotation })?;
		}
		Ok(())
	})().with_context(|| anyhow!("in field {name:?} {descriptor:?}"))
}

fn read_method(reader: &mut impl ClassRead, pool: &PoolRead, sink: &mut impl ClassSink) -> Result<()> {
	let access = reader.read_u16()?;
	let name = pool.get_utf8(reader.read_u16()?)?;
	let descriptor = pool.get_utf8(reader.read_u16()?)?;

	(|| -> Result<()> {
		let mut code = None;
		let mut exceptions = Vec::new();
		let mut signature = None;
		let mut parameters = Vec::new();
		let mut markers = Markers::default();
		let mut annotations = Vec::new();
		let mut type_annotations = Vec::new();
		let mut parameter_annotations = Vec::new();
		let mut annotation_default = None;

		let attributes_count = reader.read_u16()?;
		for _ in 0..attributes_count {
			let attribute_name = pool.get_utf8(reader.read_u16()?)?;
			let length = reader.read_u32()?;

			match attribute_name.as_str() {
				attribute::CODE => {
					code = Some(reader.marker()?);
					reader.skip(length as i64)?;
				},
				attribute::EXCEPTIONS => {
					exceptions = reader.read_vec(|r| r.read_u16_as_usize(), |r| pool.get_class(r.read_u16()?))?;
				},
				attribute::SIGNATURE => signature = Some(pool.get_utf8(reader.read_u16()?)?),
				attribute::METHOD_PARAMETERS => {
					parameters = reader.read_vec(
						|r| Ok(r.read_u8()? as usize),
						|r| Ok(ClassEvent::Parameter {
							name: pool.get_optional(r.read_u16()?, PoolRead::get_utf8)?,
							access: r.read_u16()?,
						})
					)?;
				},
				attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
					annotations.extend(read_annotations(reader, pool)?.into_iter().map(|annotation| (true, annotation)));
				},
				attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
					annotations.extend(read_annotations(reader, pool)?.into_iter().map(|annotation| (false, annotation)));
				},
				attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
					type_annotations.extend(read_type_annotations(reader, pool, None)?.into_iter().map(|annotation| (true, annotation)));
				},
				attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
					type_annotations.extend(read_type_annotations(reader, pool, None)?.into_iter().map(|annotation| (false, annotation)));
				},
				attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS => {
					parameter_annotations.extend(read_parameter_annotations(reader, pool, true, &descriptor)?);
				},
				attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
					parameter_annotations.extend(read_parameter_annotations(reader, pool, false, &descriptor)?);
				},
				attribute::ANNOTATION_DEFAULT => annotation_default = Some(read_element_value(reader, pool)?),
				_ if markers.read(&attribute_name) => reader.skip(length as i64)?,
				_ => {
					warn!("skipping unsupported attribute {attribute_name:?} of method {name:?}{descriptor:?}");
					reader.skip(length as i64)?;
				},
			}
		}

		sink.accept(ClassEvent::Method(MethodHeader { access, name: name.clone(), descriptor: descriptor.clone(), exceptions }))?;
		if let Some(signature) = signature {
			sink.accept(ClassEvent::Signature(signature))?;
		}
		markers.emit(sink)?;
		for parameter in parameters {
			sink.accept(parameter)?;
		}
		for (visible, annotation) in annotations {
			sink.accept(ClassEvent::Annotation { visible, annotation })?;
		}
		for (visible, annotation) in type_annotations {
			sink.accept(ClassEvent::TypeAnnotation { visible, annotation })?;
		}
		for event in parameter_annotations {
			sink.accept(event)?;
		}
		if let Some(value) = annotation_default {
			sink.accept(ClassEvent::AnnotationDefault(value))?;
		}
		if let Some(code) = code {
			reader.with_pos(code, |reader| code::read_code(reader, pool, sink))?;
		}
		Ok(())
	})().with_context(|| anyhow!("in method {name:?}{descriptor:?}"))
}

fn read_annotations(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<Vec<Annotation>> {
	reader.read_vec(|r| r.read_u16_as_usize(), |r| read_annotation(r, pool))
}

fn read_parameter_annotations(reader: &mut impl ClassRead, pool: &PoolRead, visible: bool, descriptor: &str) -> Result<Vec<ClassEvent>> {
	let num_parameters = reader.read_u8()?;
	let mut events = Vec::new();
	if num_parameters as usize != descriptor::split_method(descriptor)?.0.len() {
		events.push(ClassEvent::AnnotableParameterCount { count: num_parameters, visible });
	}
	for parameter in 0..num_parameters {
		for annotation in read_annotations(reader, pool)? {
			events.push(ClassEvent::ParameterAnnotation { parameter, visible, annotation });
		}
	}
	Ok(events)
}

/// Reads a `Runtime[In]visibleTypeAnnotations` attribute.
///
/// Targets inside of code are only allowed if `labels` is given. Their offsets are added to it, and are kept as raw
/// offsets in the form of `Label(offset)`.
fn read_type_annotations(reader: &mut impl ClassRead, pool: &PoolRead, mut labels: Option<&mut Labels>) -> Result<Vec<TypeAnnotation>> {
	reader.read_vec(|r| r.read_u16_as_usize(), |r| read_type_annotation(r, pool, labels.as_deref_mut()))
}

fn read_type_annotation(reader: &mut impl ClassRead, pool: &PoolRead, mut labels: Option<&mut Labels>) -> Result<TypeAnnotation> {
	use type_target::*;

	let target_type = reader.read_u8()?;
	if is_code(target_type) && labels.is_none() {
		bail!("type annotation target type {target_type:#04x} is only allowed in code");
	}
	let mut offset = |pc: u16| -> Result<Label> {
		if let Some(labels) = labels.as_deref_mut() {
			labels.create(pc)?;
		}
		Ok(Label(pc as u32))
	};

	let target = match target_type {
		CLASS_TYPE_PARAMETER | METHOD_TYPE_PARAMETER => TypeTarget::TypeParameter(reader.read_u8()?),
		CLASS_EXTENDS => TypeTarget::Supertype(reader.read_u16()?),
		CLASS_TYPE_PARAMETER_BOUND | METHOD_TYPE_PARAMETER_BOUND => TypeTarget::TypeParameterBound {
			parameter: reader.read_u8()?,
			bound: reader.read_u8()?,
		},
		FIELD..=METHOD_RECEIVER => TypeTarget::Empty,
		METHOD_FORMAL_PARAMETER => TypeTarget::FormalParameter(reader.read_u8()?),
		THROWS => TypeTarget::Throws(reader.read_u16()?),
		LOCAL_VARIABLE | RESOURCE_VARIABLE => {
			let table_length = reader.read_u16()?;
			let mut ranges = Vec::with_capacity(table_length as usize);
			for _ in 0..table_length {
				let start = reader.read_u16()?;
				let length = reader.read_u16()?;
				let index = reader.read_u16()?;
				let end = start.checked_add(length).with_context(|| anyhow!("local variable range out of bounds"))?;
				ranges.push(LocalVariableRange { start: offset(start)?, end: offset(end)?, index });
			}
			TypeTarget::LocalVariable(ranges)
		},
		EXCEPTION_PARAMETER => TypeTarget::Catch(reader.read_u16()?),
		INSTANCEOF..=METHOD_REFERENCE => TypeTarget::Offset(offset(reader.read_u16()?)?),
		CAST..=METHOD_REFERENCE_TYPE_ARGUMENT => TypeTarget::TypeArgument {
			offset: offset(reader.read_u16()?)?,
			argument: reader.read_u8()?,
		},
		_ => bail!("unknown type annotation target type {target_type:#04x}"),
	};

	let path = reader.read_vec(
		|r| Ok(r.read_u8()? as usize),
		|r| Ok(TypePathStep { kind: r.read_u8()?, argument: r.read_u8()? })
	)?;
	let annotation = read_annotation(reader, pool)?;
	Ok(TypeAnnotation { target_type, target, path, annotation })
}

fn read_record_component(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<RecordComponent> {
	let name = pool.get_utf8(reader.read_u16()?)?;
	let descriptor = pool.get_utf8(reader.read_u16()?)?;
	let mut component = RecordComponent {
		name,
		descriptor,
		signature: None,
		annotations: Vec::new(),
		type_annotations: Vec::new(),
	};

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::SIGNATURE => component.signature = Some(pool.get_utf8(reader.read_u16()?)?),
			attribute::RUNTIME_VISIBLE_ANNOTATIONS => {
				component.annotations.extend(read_annotations(reader, pool)?.into_iter().map(|annotation| (true, annotation)));
			},
			attribute::RUNTIME_INVISIBLE_ANNOTATIONS => {
				component.annotations.extend(read_annotations(reader, pool)?.into_iter().map(|annotation| (false, annotation)));
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				component.type_annotations.extend(read_type_annotations(reader, pool, None)?.into_iter().map(|annotation| (true, annotation)));
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				component.type_annotations.extend(read_type_annotations(reader, pool, None)?.into_iter().map(|annotation| (false, annotation)));
			},
			_ => {
				warn!("skipping unsupported attribute {attribute_name:?} of record component {:?}", component.name);
				reader.skip(length as i64)?;
			},
		}
	}
	Ok(component)
}

fn read_module(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<Module> {
	let name = pool.get_module(reader.read_u16()?)?;
	let access = reader.read_u16()?;
	let version = pool.get_optional(reader.read_u16()?, PoolRead::get_utf8)?;

	let requires = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| Ok(ModuleRequire {
			module: pool.get_module(r.read_u16()?)?,
			access: r.read_u16()?,
			version: pool.get_optional(r.read_u16()?, PoolRead::get_utf8)?,
		})
	)?;
	let exports = reader.read_vec(|r| r.read_u16_as_usize(), |r| read_module_package(r, pool))?;
	let opens = reader.read_vec(|r| r.read_u16_as_usize(), |r| read_module_package(r, pool))?;
	let uses = reader.read_vec(|r| r.read_u16_as_usize(), |r| pool.get_class(r.read_u16()?))?;
	let provides = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| Ok(ModuleProvide {
			service: pool.get_class(r.read_u16()?)?,
			with: r.read_vec(|r| r.read_u16_as_usize(), |r| pool.get_class(r.read_u16()?))?,
		})
	)?;

	Ok(Module { name, access, version, requires, exports, opens, uses, provides, packages: Vec::new(), main_class: None })
}

fn read_module_package(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<ModulePackage> {
	Ok(ModulePackage {
		package: pool.get_package(reader.read_u16()?)?,
		access: reader.read_u16()?,
		to: reader.read_vec(|r| r.read_u16_as_usize(), |r| pool.get_module(r.read_u16()?))?,
	})
}

/// The attributes without content, which every class, field and method may have.
#[derive(Debug, Default)]
struct Markers {
	deprecated: bool,
	synthetic: bool,
}

impl Markers {
	/// Returns `false` if the attribute is not a marker.
	fn read(&mut self, attribute_name: &str) -> bool {
		match attribute_name {
			attribute::DEPRECATED => self.deprecated = true,
			attribute::SYNTHETIC => self.synthetic = true,
			_ => return false,
		}
		true
	}

	fn emit(self, sink: &mut impl ClassSink) -> Result<()> {
		if self.deprecated {
			sink.accept(ClassEvent::Deprecated)?;
		}
		if self.synthetic {
			sink.accept(ClassEvent::Synthetic)?;
		}
		Ok(())
	}
}

fn read_annotation(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<Annotation> {
	let descriptor = pool.get_utf8(reader.read_u16()?)?;
	let elements = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| Ok((pool.get_utf8(r.read_u16()?)?, read_element_value(r, pool)?))
	).with_context(|| anyhow!("in annotation {descriptor:?}"))?;
	Ok(Annotation { descriptor, elements })
}

fn read_element_value(reader: &mut impl ClassRead, pool: &PoolRead) -> Result<ElementValue> {
	Ok(match reader.read_u8()? {
		b'B' => ElementValue::Byte(pool.get_integer(reader.read_u16()?)? as i8),
		b'C' => ElementValue::Char(pool.get_integer(reader.read_u16()?)? as u16),
		b'D' => ElementValue::Double(pool.get_double(reader.read_u16()?)?),
		b'F' => ElementValue::Float(pool.get_float(reader.read_u16()?)?),
		b'I' => ElementValue::Int(pool.get_integer(reader.read_u16()?)?),
		b'J' => ElementValue::Long(pool.get_long(reader.read_u16()?)?),
		b'S' => ElementValue::Short(pool.get_integer(reader.read_u16()?)? as i16),
		b'Z' => ElementValue::Boolean(pool.get_integer(reader.read_u16()?)? != 0),
		b's' => ElementValue::String(pool.get_java_string(reader.read_u16()?)?.clone()),
		b'e' => ElementValue::Enum {
			descriptor: pool.get_utf8(reader.read_u16()?)?,
			name: pool.get_utf8(reader.read_u16()?)?,
		},
		b'c' => ElementValue::Class(pool.get_utf8(reader.read_u16()?)?),
		b'@' => ElementValue::Annotation(read_annotation(reader, pool)?),
		b'[' => ElementValue::Array(reader.read_vec(|r| r.read_u16_as_usize(), |r| read_element_value(r, pool))?),
		tag => bail!("unknown element value tag {:?}", tag as char),
	})
}
