mod code;
mod maxs;
mod pool;

use anyhow::{anyhow, bail, Context, Result};
use java_string::JavaStr;
use log::debug;
use crate::{ClassWrite, descriptor, jstring};
use crate::constants::{attribute, type_target, MAGIC};
use crate::event::{Annotation, ClassEvent, ClassSink, Constant, ElementValue, FieldHeader, InnerClass, Label, MethodHeader, Module, RecordComponent, TypeAnnotation, TypeTarget, Version};
use crate::writer::pool::PoolWrite;

/// Attributes collected before writing, as the count comes first.
pub(crate) struct Attributes(Vec<(u16, Vec<u8>)>);

impl Attributes {
	fn new() -> Attributes {
		Attributes(Vec::new())
	}

	fn add(&mut self, pool: &mut PoolWrite, name: &str, f: impl FnOnce(&mut Vec<u8>, &mut PoolWrite) -> Result<()>) -> Result<()> {
		let name_index = pool.put_utf8(name)?;
		let mut buffer = Vec::new();
		f(&mut buffer, pool).with_context(|| anyhow!("failed to write attribute {name:?}"))?;
		self.0.push((name_index, buffer));
		Ok(())
	}

	fn write(self, writer: &mut impl ClassWrite) -> Result<()> {
		writer.write_usize_as_u16(self.0.len())?;
		for (name_index, buffer) in self.0 {
			writer.write_u16(name_index)?;
			writer.write_usize_as_u32(buffer.len())?;
			writer.write_u8_slice(&buffer)?;
		}
		Ok(())
	}
}

#[derive(Debug, Default)]
struct AnnotationsWrite {
	visible: Vec<Annotation>,
	invisible: Vec<Annotation>,
	visible_types: Vec<TypeAnnotation>,
	invisible_types: Vec<TypeAnnotation>,
}

impl AnnotationsWrite {
	fn push(&mut self, visible: bool, annotation: Annotation) {
		if visible {
			self.visible.push(annotation);
		} else {
			self.invisible.push(annotation);
		}
	}

	fn push_type(&mut self, visible: bool, annotation: TypeAnnotation) {
		if visible {
			self.visible_types.push(annotation);
		} else {
			self.invisible_types.push(annotation);
		}
	}

	fn add_to(&self, attributes: &mut Attributes, pool: &mut PoolWrite) -> Result<()> {
		if !self.visible.is_empty() {
			attributes.add(pool, attribute::RUNTIME_VISIBLE_ANNOTATIONS, |w, pool| write_annotations(w, pool, &self.visible))?;
		}
		if !self.invisible.is_empty() {
			attributes.add(pool, attribute::RUNTIME_INVISIBLE_ANNOTATIONS, |w, pool| write_annotations(w, pool, &self.invisible))?;
		}
		if !self.visible_types.is_empty() {
			attributes.add(pool, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS, |w, pool| {
				write_type_annotations(w, pool, &self.visible_types, None)
			})?;
		}
		if !self.invisible_types.is_empty() {
			attributes.add(pool, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS, |w, pool| {
				write_type_annotations(w, pool, &self.invisible_types, None)
			})?;
		}
		Ok(())
	}
}

/// The `Deprecated` and `Synthetic` attributes.
#[derive(Debug, Default)]
struct Markers {
	deprecated: bool,
	synthetic: bool,
}

impl Markers {
	fn add_to(&self, attributes: &mut Attributes, pool: &mut PoolWrite) -> Result<()> {
		if self.deprecated {
			attributes.add(pool, attribute::DEPRECATED, |_, _| Ok(()))?;
		}
		if self.synthetic {
			attributes.add(pool, attribute::SYNTHETIC, |_, _| Ok(()))?;
		}
		Ok(())
	}
}

#[derive(Debug)]
struct FieldWrite {
	header: FieldHeader,
	signature: Option<String>,
	markers: Markers,
	annotations: AnnotationsWrite,
}

#[derive(Debug)]
struct MethodWrite {
	header: MethodHeader,
	signature: Option<String>,
	parameters: Vec<(Option<String>, u16)>,
	markers: Markers,
	annotations: AnnotationsWrite,
	/// The annotable parameter counts, visible and invisible, if they differ from the number of arguments.
	annotable_parameters: (Option<u8>, Option<u8>),
	parameter_annotations: Vec<(u8, bool, Annotation)>,
	annotation_default: Option<ElementValue>,
	code: Vec<crate::event::CodeEvent>,
}

#[derive(Debug)]
enum Member {
	Field(FieldWrite),
	Method(MethodWrite),
}

#[derive(Debug)]
struct HeaderWrite {
	version: Version,
	access: u16,
	this_class: u16,
	super_class: u16,
	interfaces: Vec<u16>,
}

#[derive(Debug, Default)]
struct ClassAttributesWrite {
	source_file: Option<String>,
	source_debug: Option<String>,
	signature: Option<String>,
	enclosing_method: Option<(String, Option<String>, Option<String>)>,
	nest_host: Option<String>,
	nest_members: Vec<String>,
	permitted_subclasses: Vec<String>,
	inner_classes: Vec<InnerClass>,
	markers: Markers,
	annotations: AnnotationsWrite,
	record: Option<Vec<RecordComponent>>,
	module: Option<Box<Module>>,
}

/// A [`ClassSink`] that assembles the events of one class into class file bytes.
///
/// Fields and methods are encoded as soon as the next member (or the end) starts, the header and the class level
/// attributes are only written by [`ClassWriter::finish`], after the constant pool is complete.
#[derive(Debug)]
pub struct ClassWriter {
	pool: PoolWrite,
	header: Option<HeaderWrite>,
	attributes: ClassAttributesWrite,
	member: Option<Member>,
	fields_count: usize,
	fields: Vec<u8>,
	methods_count: usize,
	methods: Vec<u8>,
	ended: bool,
}

impl Default for ClassWriter {
	fn default() -> Self {
		ClassWriter::new()
	}
}

impl ClassWriter {
	pub fn new() -> ClassWriter {
		ClassWriter {
			pool: PoolWrite::new(),
			header: None,
			attributes: ClassAttributesWrite::default(),
			member: None,
			fields_count: 0,
			fields: Vec::new(),
			methods_count: 0,
			methods: Vec::new(),
			ended: false,
		}
	}

	fn method(&mut self) -> Result<&mut MethodWrite> {
		match &mut self.member {
			Some(Member::Method(method)) => Ok(method),
			_ => bail!("got a method level event outside of a method"),
		}
	}

	/// The markers of the current element.
	fn markers(&mut self) -> &mut Markers {
		match &mut self.member {
			None => &mut self.attributes.markers,
			Some(Member::Field(field)) => &mut field.markers,
			Some(Member::Method(method)) => &mut method.markers,
		}
	}

	/// The annotations of the current element.
	fn annotations(&mut self) -> &mut AnnotationsWrite {
		match &mut self.member {
			None => &mut self.attributes.annotations,
			Some(Member::Field(field)) => &mut field.annotations,
			Some(Member::Method(method)) => &mut method.annotations,
		}
	}

	fn finish_member(&mut self) -> Result<()> {
		match self.member.take() {
			None => {},
			Some(Member::Field(field)) => {
				let name = field.header.name.clone();
				write_field(&mut self.fields, &mut self.pool, field)
					.with_context(|| anyhow!("failed to write field {name:?}"))?;
				self.fields_count += 1;
			},
			Some(Member::Method(method)) => {
				let name = format!("{}{}", method.header.name, method.header.descriptor);
				write_method(&mut self.methods, &mut self.pool, method)
					.with_context(|| anyhow!("failed to write method {name:?}"))?;
				self.methods_count += 1;
			},
		}
		Ok(())
	}

	fn accept_class_level(&mut self, event: ClassEvent) -> Result<()> {
		if self.member.is_some() {
			bail!("got class level event {event:?} after the first member");
		}
		let attributes = &mut self.attributes;
		match event {
			ClassEvent::Source { file, debug } => {
				attributes.source_file = file;
				attributes.source_debug = debug;
			},
			ClassEvent::EnclosingMethod { class, name, descriptor } => attributes.enclosing_method = Some((class, name, descriptor)),
			ClassEvent::NestHost(host) => attributes.nest_host = Some(host),
			ClassEvent::NestMember(member) => attributes.nest_members.push(member),
			ClassEvent::PermittedSubclass(subclass) => attributes.permitted_subclasses.push(subclass),
			ClassEvent::InnerClass(inner_class) => attributes.inner_classes.push(inner_class),
			ClassEvent::Record(components) => attributes.record = Some(components),
			ClassEvent::Module(module) => attributes.module = Some(module),
			event => bail!("unexpected event {event:?}"),
		}
		Ok(())
	}

	/// Returns the class file bytes. Fails if the class wasn't ended with [`ClassEvent::End`].
	pub fn finish(mut self) -> Result<Vec<u8>> {
		let Some(header) = self.header.take() else {
			bail!("no class header was written");
		};
		if !self.ended {
			bail!("class was not ended");
		}
		let pool = &mut self.pool;
		let class = &self.attributes;

		let mut attributes = Attributes::new();
		if let Some(source_file) = &class.source_file {
			attributes.add(pool, attribute::SOURCE_FILE, |w, pool| w.write_u16(pool.put_utf8(source_file)?))?;
		}
		if let Some(source_debug) = &class.source_debug {
			attributes.add(pool, attribute::SOURCE_DEBUG_EXTENSION, |w, _| {
				w.write_u8_slice(&jstring::from_string_to_vec(JavaStr::from_str(source_debug)))
			})?;
		}
		if let Some(signature) = &class.signature {
			attributes.add(pool, attribute::SIGNATURE, |w, pool| w.write_u16(pool.put_utf8(signature)?))?;
		}
		if let Some((owner, name, descriptor)) = &class.enclosing_method {
			attributes.add(pool, attribute::ENCLOSING_METHOD, |w, pool| {
				w.write_u16(pool.put_class(owner)?)?;
				match (name, descriptor) {
					(Some(name), Some(descriptor)) => w.write_u16(pool.put_name_and_type(name, descriptor)?),
					(None, None) => w.write_u16(0),
					_ => bail!("enclosing method needs both name and descriptor, or neither"),
				}
			})?;
		}
		if let Some(nest_host) = &class.nest_host {
			attributes.add(pool, attribute::NEST_HOST, |w, pool| w.write_u16(pool.put_class(nest_host)?))?;
		}
		if !class.nest_members.is_empty() {
			attributes.add(pool, attribute::NEST_MEMBERS, |w, pool| write_classes(w, pool, &class.nest_members))?;
		}
		if !class.permitted_subclasses.is_empty() {
			attributes.add(pool, attribute::PERMITTED_SUBCLASSES, |w, pool| write_classes(w, pool, &class.permitted_subclasses))?;
		}
		if !class.inner_classes.is_empty() {
			attributes.add(pool, attribute::INNER_CLASSES, |w, pool| {
				w.write_slice(&class.inner_classes, |w, size| w.write_usize_as_u16(size), |w, inner_class| {
					w.write_u16(pool.put_class(&inner_class.name)?)?;
					w.write_u16(pool.put_optional_class(inner_class.outer.as_deref())?)?;
					w.write_u16(match &inner_class.simple_name {
						Some(simple_name) => pool.put_utf8(simple_name)?,
						None => 0,
					})?;
					w.write_u16(inner_class.access)
				})
			})?;
		}
		class.markers.add_to(&mut attributes, pool)?;
		class.annotations.add_to(&mut attributes, pool)?;
		if let Some(components) = &class.record {
			attributes.add(pool, attribute::RECORD, |w, pool| {
				w.write_slice(components, |w, size| w.write_usize_as_u16(size), |w, component| {
					write_record_component(w, pool, component)
						.with_context(|| anyhow!("failed to write record component {:?}", component.name))
				})
			})?;
		}
		if let Some(module) = &class.module {
			attributes.add(pool, attribute::MODULE, |w, pool| write_module(w, pool, module))?;
			if !module.packages.is_empty() {
				attributes.add(pool, attribute::MODULE_PACKAGES, |w, pool| {
					w.write_slice(&module.packages, |w, size| w.write_usize_as_u16(size), |w, package| w.write_u16(pool.put_package(package)?))
				})?;
			}
			if let Some(main_class) = &module.main_class {
				attributes.add(pool, attribute::MODULE_MAIN_CLASS, |w, pool| w.write_u16(pool.put_class(main_class)?))?;
			}
		}
		// last, all other parts of the class may add bootstrap methods
		if pool.has_bootstrap_methods() {
			attributes.add(pool, attribute::BOOTSTRAP_METHODS, |w, pool| pool.write_bootstrap_methods(w))?;
		}

		let mut out = Vec::new();
		out.write_u32(MAGIC)?;
		out.write_u16(header.version.minor)?;
		out.write_u16(header.version.major)?;
		pool.write(&mut out)?;
		out.write_u16(header.access)?;
		out.write_u16(header.this_class)?;
		out.write_u16(header.super_class)?;
		out.write_slice(&header.interfaces, |w, size| w.write_usize_as_u16(size), |w, &interface| w.write_u16(interface))?;
		out.write_usize_as_u16(self.fields_count)?;
		out.write_u8_slice(&self.fields)?;
		out.write_usize_as_u16(self.methods_count)?;
		out.write_u8_slice(&self.methods)?;
		attributes.write(&mut out)?;

		debug!("wrote class of {} bytes with {} fields and {} methods", out.len(), self.fields_count, self.methods_count);
		Ok(out)
	}
}

impl ClassSink for ClassWriter {
	fn accept(&mut self, event: ClassEvent) -> Result<()> {
		if self.ended {
			bail!("got event {event:?} after the end of the class");
		}
		match event {
			ClassEvent::Class(header) => {
				if self.header.is_some() {
					bail!("got a second class header {header:?}");
				}
				let interfaces = header.interfaces.iter()
					.map(|interface| self.pool.put_class(interface))
					.collect::<Result<_>>()?;
				self.header = Some(HeaderWrite {
					version: header.version,
					access: header.access,
					this_class: self.pool.put_class(&header.name)?,
					super_class: self.pool.put_optional_class(header.super_class.as_deref())?,
					interfaces,
				});
			},
			event if self.header.is_none() => bail!("expected the class header first, got {event:?}"),
			ClassEvent::Field(header) => {
				self.finish_member()?;
				self.member = Some(Member::Field(FieldWrite {
					header,
					signature: None,
					markers: Markers::default(),
					annotations: AnnotationsWrite::default(),
				}));
			},
			ClassEvent::Method(header) => {
				self.finish_member()?;
				self.member = Some(Member::Method(MethodWrite {
					header,
					signature: None,
					parameters: Vec::new(),
					markers: Markers::default(),
					annotations: AnnotationsWrite::default(),
					annotable_parameters: (None, None),
					parameter_annotations: Vec::new(),
					annotation_default: None,
					code: Vec::new(),
				}));
			},
			ClassEvent::End => {
				self.finish_member()?;
				self.ended = true;
			},
			ClassEvent::Signature(signature) => match &mut self.member {
				None => self.attributes.signature = Some(signature),
				Some(Member::Field(field)) => field.signature = Some(signature),
				Some(Member::Method(method)) => method.signature = Some(signature),
			},
			ClassEvent::Annotation { visible, annotation } => self.annotations().push(visible, annotation),
			ClassEvent::TypeAnnotation { visible, annotation } => self.annotations().push_type(visible, annotation),
			ClassEvent::Deprecated => self.markers().deprecated = true,
			ClassEvent::Synthetic => self.markers().synthetic = true,
			ClassEvent::Parameter { name, access } => self.method()?.parameters.push((name, access)),
			ClassEvent::AnnotableParameterCount { count, visible } => {
				let counts = &mut self.method()?.annotable_parameters;
				if visible {
					counts.0 = Some(count);
				} else {
					counts.1 = Some(count);
				}
			},
			ClassEvent::ParameterAnnotation { parameter, visible, annotation } => {
				self.method()?.parameter_annotations.push((parameter, visible, annotation));
			},
			ClassEvent::AnnotationDefault(value) => self.method()?.annotation_default = Some(value),
			ClassEvent::Code(event) => self.method()?.code.push(event),
			event => self.accept_class_level(event)?,
		}
		Ok(())
	}
}

fn write_classes(w: &mut Vec<u8>, pool: &mut PoolWrite, classes: &[String]) -> Result<()> {
	w.write_slice(classes, |w, size| w.write_usize_as_u16(size), |w, class| w.write_u16(pool.put_class(class)?))
}

/// Returns zero for [`None`].
fn put_optional_utf8(pool: &mut PoolWrite, value: Option<&str>) -> Result<u16> {
	value.map_or(Ok(0), |value| pool.put_utf8(value))
}

fn write_record_component(w: &mut Vec<u8>, pool: &mut PoolWrite, component: &RecordComponent) -> Result<()> {
	descriptor::check_field(&component.descriptor)?;
	w.write_u16(pool.put_utf8(&component.name)?)?;
	w.write_u16(pool.put_utf8(&component.descriptor)?)?;

	let mut annotations = AnnotationsWrite::default();
	for (visible, annotation) in &component.annotations {
		annotations.push(*visible, annotation.clone());
	}
	for (visible, annotation) in &component.type_annotations {
		annotations.push_type(*visible, annotation.clone());
	}

	let mut attributes = Attributes::new();
	if let Some(signature) = &component.signature {
		attributes.add(pool, attribute::SIGNATURE, |w, pool| w.write_u16(pool.put_utf8(signature)?))?;
	}
	annotations.add_to(&mut attributes, pool)?;
	attributes.write(w)
}

fn write_module(w: &mut Vec<u8>, pool: &mut PoolWrite, module: &Module) -> Result<()> {
	w.write_u16(pool.put_module(&module.name)?)?;
	w.write_u16(module.access)?;
	w.write_u16(put_optional_utf8(pool, module.version.as_deref())?)?;

	w.write_slice(&module.requires, |w, size| w.write_usize_as_u16(size), |w, require| {
		w.write_u16(pool.put_module(&require.module)?)?;
		w.write_u16(require.access)?;
		w.write_u16(put_optional_utf8(pool, require.version.as_deref())?)
	})?;
	for packages in [&module.exports, &module.opens] {
		w.write_slice(packages, |w, size| w.write_usize_as_u16(size), |w, package| {
			w.write_u16(pool.put_package(&package.package)?)?;
			w.write_u16(package.access)?;
			w.write_slice(&package.to, |w, size| w.write_usize_as_u16(size), |w, to| w.write_u16(pool.put_module(to)?))
		})?;
	}
	write_classes(w, pool, &module.uses)?;
	w.write_slice(&module.provides, |w, size| w.write_usize_as_u16(size), |w, provide| {
		w.write_u16(pool.put_class(&provide.service)?)?;
		write_classes(w, pool, &provide.with)
	})
}

fn write_field(w: &mut Vec<u8>, pool: &mut PoolWrite, field: FieldWrite) -> Result<()> {
	let header = &field.header;
	descriptor::check_field(&header.descriptor)?;
	w.write_u16(header.access)?;
	w.write_u16(pool.put_utf8(&header.name)?)?;
	w.write_u16(pool.put_utf8(&header.descriptor)?)?;

	let mut attributes = Attributes::new();
	if let Some(value) = &header.value {
		if !matches!(value, Constant::Integer(_) | Constant::Float(_) | Constant::Long(_) | Constant::Double(_) | Constant::String(_)) {
			bail!("field constant value {value:?} must be a number or a string");
		}
		attributes.add(pool, attribute::CONSTANT_VALUE, |w, pool| w.write_u16(pool.put_constant(value)?))?;
	}
	if let Some(signature) = &field.signature {
		attributes.add(pool, attribute::SIGNATURE, |w, pool| w.write_u16(pool.put_utf8(signature)?))?;
	}
	field.markers.add_to(&mut attributes, pool)?;
	field.annotations.add_to(&mut attributes, pool)?;
	attributes.write(w)
}

fn write_method(w: &mut Vec<u8>, pool: &mut PoolWrite, method: MethodWrite) -> Result<()> {
	let header = &method.header;
	let (arguments, _) = descriptor::split_method(&header.descriptor)?;
	w.write_u16(header.access)?;
	w.write_u16(pool.put_utf8(&header.name)?)?;
	w.write_u16(pool.put_utf8(&header.descriptor)?)?;

	let mut attributes = Attributes::new();
	if !method.code.is_empty() {
		attributes.add(pool, attribute::CODE, |w, pool| code::write_code(w, pool, header.access, &header.descriptor, method.code))?;
	}
	if !header.exceptions.is_empty() {
		attributes.add(pool, attribute::EXCEPTIONS, |w, pool| write_classes(w, pool, &header.exceptions))?;
	}
	if let Some(signature) = &method.signature {
		attributes.add(pool, attribute::SIGNATURE, |w, pool| w.write_u16(pool.put_utf8(signature)?))?;
	}
	if !method.parameters.is_empty() {
		attributes.add(pool, attribute::METHOD_PARAMETERS, |w, pool| {
			w.write_usize_as_u8(method.parameters.len())?;
			for (name, access) in &method.parameters {
				w.write_u16(match name {
					Some(name) => pool.put_utf8(name)?,
					None => 0,
				})?;
				w.write_u16(*access)?;
			}
			Ok(())
		})?;
	}
	method.markers.add_to(&mut attributes, pool)?;
	method.annotations.add_to(&mut attributes, pool)?;
	let (visible_count, invisible_count) = method.annotable_parameters;
	for (visible, count, name) in [
		(true, visible_count, attribute::RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS),
		(false, invisible_count, attribute::RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS),
	] {
		if count.is_none() && !method.parameter_annotations.iter().any(|(_, v, _)| *v == visible) {
			continue;
		}
		let count = count.map_or(arguments.len(), |count| count as usize);
		let mut parameters = vec![Vec::new(); count];
		for (parameter, _, annotation) in method.parameter_annotations.iter().filter(|(_, v, _)| *v == visible) {
			parameters.get_mut(*parameter as usize)
				.with_context(|| anyhow!("annotation on parameter {parameter}, but only {count} parameters are annotable"))?
				.push(annotation);
		}
		attributes.add(pool, name, |w, pool| {
			w.write_usize_as_u8(parameters.len())?;
			for annotations in &parameters {
				w.write_usize_as_u16(annotations.len())?;
				for annotation in annotations {
					write_annotation(w, pool, annotation)?;
				}
			}
			Ok(())
		})?;
	}
	if let Some(value) = &method.annotation_default {
		attributes.add(pool, attribute::ANNOTATION_DEFAULT, |w, pool| write_element_value(w, pool, value))?;
	}
	attributes.write(w)
}

fn write_annotations(w: &mut Vec<u8>, pool: &mut PoolWrite, annotations: &[Annotation]) -> Result<()> {
	w.write_slice(annotations, |w, size| w.write_usize_as_u16(size), |w, annotation| write_annotation(w, pool, annotation))
}

/// Writes the body of a `Runtime[In]visibleTypeAnnotations` attribute.
///
/// Only the annotations inside of code have `offset`, giving the bytecode offset of a label.
fn write_type_annotations(
	w: &mut Vec<u8>,
	pool: &mut PoolWrite,
	annotations: &[TypeAnnotation],
	offset: Option<&dyn Fn(Label) -> Result<u16>>,
) -> Result<()> {
	let in_code = offset.is_some();
	let offset = |label: Label| -> Result<u16> {
		match offset {
			Some(offset) => offset(label),
			None => bail!("type annotation outside of code refers to label {label:?}"),
		}
	};
	w.write_slice(annotations, |w, size| w.write_usize_as_u16(size), |w, annotation| {
		let target_type = annotation.target_type;
		if !type_target::matches(target_type, &annotation.target) {
			bail!("type annotation target {:?} doesn't fit the target type {target_type:#04x}", annotation.target);
		}
		if type_target::is_code(target_type) != in_code {
			bail!("type annotation with target type {target_type:#04x} can't be {} code", if in_code { "inside of" } else { "outside of" });
		}
		w.write_u8(target_type)?;
		match &annotation.target {
			&TypeTarget::TypeParameter(index) | &TypeTarget::FormalParameter(index) => w.write_u8(index)?,
			&TypeTarget::Supertype(index) | &TypeTarget::Throws(index) | &TypeTarget::Catch(index) => w.write_u16(index)?,
			&TypeTarget::TypeParameterBound { parameter, bound } => {
				w.write_u8(parameter)?;
				w.write_u8(bound)?;
			},
			TypeTarget::Empty => {},
			TypeTarget::LocalVariable(ranges) => {
				w.write_usize_as_u16(ranges.len())?;
				for range in ranges {
					let start = offset(range.start)?;
					let end = offset(range.end)?;
					let length = end.checked_sub(start)
						.with_context(|| anyhow!("type annotated local variable {} ends before it starts", range.index))?;
					w.write_u16(start)?;
					w.write_u16(length)?;
					w.write_u16(range.index)?;
				}
			},
			&TypeTarget::Offset(label) => w.write_u16(offset(label)?)?,
			&TypeTarget::TypeArgument { offset: label, argument } => {
				w.write_u16(offset(label)?)?;
				w.write_u8(argument)?;
			},
		}
		w.write_usize_as_u8(annotation.path.len())?;
		for step in &annotation.path {
			w.write_u8(step.kind)?;
			w.write_u8(step.argument)?;
		}
		write_annotation(w, pool, &annotation.annotation)
	})
}

fn write_annotation(w: &mut Vec<u8>, pool: &mut PoolWrite, annotation: &Annotation) -> Result<()> {
	w.write_u16(pool.put_utf8(&annotation.descriptor)?)?;
	w.write_slice(&annotation.elements, |w, size| w.write_usize_as_u16(size), |w, (name, value)| {
		w.write_u16(pool.put_utf8(name)?)?;
		write_element_value(w, pool, value)
	})
}

fn write_element_value(w: &mut Vec<u8>, pool: &mut PoolWrite, value: &ElementValue) -> Result<()> {
	match value {
		&ElementValue::Byte(value) => {
			w.write_u8(b'B')?;
			w.write_u16(pool.put_integer(value as i32)?)
		},
		&ElementValue::Char(value) => {
			w.write_u8(b'C')?;
			w.write_u16(pool.put_integer(value as i32)?)
		},
		&ElementValue::Double(value) => {
			w.write_u8(b'D')?;
			w.write_u16(pool.put_double(value)?)
		},
		&ElementValue::Float(value) => {
			w.write_u8(b'F')?;
			w.write_u16(pool.put_float(value)?)
		},
		&ElementValue::Int(value) => {
			w.write_u8(b'I')?;
			w.write_u16(pool.put_integer(value)?)
		},
		&ElementValue::Long(value) => {
			w.write_u8(b'J')?;
			w.write_u16(pool.put_long(value)?)
		},
		&ElementValue::Short(value) => {
			w.write_u8(b'S')?;
			w.write_u16(pool.put_integer(value as i32)?)
		},
		&ElementValue::Boolean(value) => {
			w.write_u8(b'Z')?;
			w.write_u16(pool.put_integer(value as i32)?)
		},
		ElementValue::String(value) => {
			w.write_u8(b's')?;
			w.write_u16(pool.put_java_utf8(value)?)
		},
		ElementValue::Enum { descriptor, name } => {
			w.write_u8(b'e')?;
			w.write_u16(pool.put_utf8(descriptor)?)?;
			w.write_u16(pool.put_utf8(name)?)
		},
		ElementValue::Class(descriptor) => {
			w.write_u8(b'c')?;
			w.write_u16(pool.put_utf8(descriptor)?)
		},
		ElementValue::Annotation(annotation) => {
			w.write_u8(b'@')?;
			write_annotation(w, pool, annotation)
		},
		ElementValue::Array(values) => {
			w.write_u8(b'[')?;
			w.write_slice(values, |w, size| w.write_usize_as_u16(size), |w, value| write_element_value(w, pool, value))
		},
	}
}
