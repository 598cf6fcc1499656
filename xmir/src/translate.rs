//! Driving the class file layer: building a [`ClassModel`] from the events of a class file, and writing one back.

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use log::{debug, trace};
use cafe::{ClassEvent, ClassHeader, ClassSink, ClassWriter, CodeEvent, ElementValue, FieldHeader, Frame, Label, MethodHeader, VerificationType};
use cafe::constants::type_target;
use cafe::descriptor;
use crate::document::Document;
use crate::error::invalid;
use crate::insn::{from_constant, from_insn, to_constant, to_insn};
use crate::labels::{LabelId, LabelMap};
use crate::model::{Annotation, AnnotationValue, ClassModel, EnclosingMethod, FieldModel, FrameKind, FrameValue, InnerClass, LineMarker, LocalVariable, MethodEntry, MethodModel, Operand, Parameter, RecordComponent, StackFrame, TryCatch, TypeAnnotation, TypePathStep, Version, Visibility};
use crate::parse::parse;
use crate::serialize::{serialize, SerializeOptions};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
	AwaitingClass,
	/// Class level events, or the events of the last field.
	InClass { in_field: bool },
	InMethod,
	Closed,
}

/// Builds one [`ClassModel`] from a stream of class events.
///
/// Labels of the class file layer are replaced by fresh ids, numbered per method in the order they're first seen.
#[derive(Debug)]
pub struct ModelBuilder {
	state: State,
	class: ClassModel,
	labels: LabelMap<Label>,
}

impl Default for ModelBuilder {
	fn default() -> Self {
		ModelBuilder { state: State::AwaitingClass, class: ClassModel::default(), labels: LabelMap::default() }
	}
}

fn annotation_value_from_cafe(value: ElementValue) -> AnnotationValue {
	match value {
		ElementValue::Byte(v) => AnnotationValue::Value(Operand::Byte(v)),
		ElementValue::Char(v) => AnnotationValue::Value(Operand::Char(v)),
		ElementValue::Double(v) => AnnotationValue::Value(Operand::Double(v)),
		ElementValue::Float(v) => AnnotationValue::Value(Operand::Float(v)),
		ElementValue::Int(v) => AnnotationValue::Value(Operand::Int(v)),
		ElementValue::Long(v) => AnnotationValue::Value(Operand::Long(v)),
		ElementValue::Short(v) => AnnotationValue::Value(Operand::Short(v)),
		ElementValue::Boolean(v) => AnnotationValue::Value(Operand::Bool(v)),
		ElementValue::String(v) => AnnotationValue::Value(Operand::String(v)),
		ElementValue::Enum { descriptor, name } => AnnotationValue::Enum { descriptor, name },
		ElementValue::Class(descriptor) => AnnotationValue::Class(descriptor),
		ElementValue::Annotation(annotation) => AnnotationValue::Annotation {
			descriptor: annotation.descriptor,
			properties: properties_from_cafe(annotation.elements),
		},
		ElementValue::Array(values) => AnnotationValue::Array(values.into_iter().map(annotation_value_from_cafe).collect()),
	}
}

fn properties_from_cafe(elements: Vec<(String, ElementValue)>) -> IndexMap<String, AnnotationValue> {
	elements.into_iter().map(|(name, value)| (name, annotation_value_from_cafe(value))).collect()
}

fn annotation_from_cafe(visible: bool, annotation: cafe::Annotation) -> Annotation {
	Annotation {
		descriptor: annotation.descriptor,
		visibility: if visible { Visibility::Runtime } else { Visibility::Class },
		properties: properties_from_cafe(annotation.elements),
	}
}

fn type_path_step_from_cafe(step: cafe::TypePathStep) -> Result<TypePathStep> {
	Ok(match (step.kind, step.argument) {
		(0, 0) => TypePathStep::Array,
		(1, 0) => TypePathStep::Nested,
		(2, 0) => TypePathStep::Wildcard,
		(3, argument) => TypePathStep::TypeArgument(argument),
		(kind, argument) => bail!(invalid(format!("type path step of kind {kind} with argument {argument}"))),
	})
}

fn type_annotation_from_cafe(visible: bool, annotation: cafe::TypeAnnotation, labels: &mut LabelMap<Label>) -> Result<TypeAnnotation> {
	Ok(TypeAnnotation {
		target_type: annotation.target_type,
		target: annotation.target.map_labels(|label| Ok(labels.get(label)))?,
		path: annotation.path.into_iter().map(type_path_step_from_cafe).collect::<Result<_>>()?,
		annotation: annotation_from_cafe(visible, annotation.annotation),
	})
}

fn record_component_from_cafe(component: cafe::RecordComponent, labels: &mut LabelMap<Label>) -> Result<RecordComponent> {
	Ok(RecordComponent {
		name: component.name,
		descriptor: component.descriptor,
		signature: component.signature,
		annotations: component.annotations.into_iter()
			.map(|(visible, annotation)| annotation_from_cafe(visible, annotation))
			.collect(),
		type_annotations: component.type_annotations.into_iter()
			.map(|(visible, annotation)| type_annotation_from_cafe(visible, annotation, labels))
			.collect::<Result<_>>()?,
	})
}

fn frame_value_from_cafe(value: VerificationType, labels: &mut LabelMap<Label>) -> FrameValue {
	match value {
		VerificationType::Top => FrameValue::Top,
		VerificationType::Integer => FrameValue::Integer,
		VerificationType::Float => FrameValue::Float,
		VerificationType::Double => FrameValue::Double,
		VerificationType::Long => FrameValue::Long,
		VerificationType::Null => FrameValue::Null,
		VerificationType::UninitializedThis => FrameValue::UninitializedThis,
		VerificationType::Object(class) => FrameValue::Object(class),
		VerificationType::Uninitialized(label) => FrameValue::Uninitialized(labels.get(label)),
	}
}

fn frame_from_cafe(frame: Frame, labels: &mut LabelMap<Label>) -> StackFrame {
	let kind = match frame.kind {
		cafe::FrameKind::Same => FrameKind::Same,
		cafe::FrameKind::SameLocals1StackItem => FrameKind::SameLocals1StackItem,
		cafe::FrameKind::Chop(n) => FrameKind::Chop(n),
		cafe::FrameKind::Append => FrameKind::Append,
		cafe::FrameKind::Full => FrameKind::Full,
	};
	StackFrame {
		kind,
		locals: frame.locals.into_iter().map(|v| frame_value_from_cafe(v, labels)).collect(),
		stack: frame.stack.into_iter().map(|v| frame_value_from_cafe(v, labels)).collect(),
	}
}

impl ModelBuilder {
	pub fn new() -> ModelBuilder {
		ModelBuilder::default()
	}

	fn unexpected(&self, event: &ClassEvent) -> anyhow::Error {
		anyhow!(invalid(format!("unexpected event {event:?} while {:?}", self.state)))
	}

	fn method(&mut self) -> Result<&mut MethodModel> {
		self.class.methods.last_mut().context("no method started")
	}

	/// The index of a parameter of an annotation attribute, with the parameters that can't be annotated counted in.
	fn annotable_parameter(&mut self, index: u8, visible: bool) -> Result<u8> {
		let method = self.method()?;
		let count = if visible { method.visible_annotable_parameters } else { method.invisible_annotable_parameters };
		let Some(count) = count else {
			return Ok(index);
		};
		let arguments = descriptor::split_method(&method.descriptor)?.0.len();
		let skipped = arguments.checked_sub(count as usize)
			.ok_or_else(|| anyhow!(invalid(format!("{count} annotable parameters, but only {arguments} arguments"))))?;
		u8::try_from(index as usize + skipped)
			.map_err(|_| anyhow!(invalid(format!("annotated parameter {index} is out of range"))))
	}

	fn parameter(&mut self, index: u8) -> Result<&mut Parameter> {
		let method = self.method()?;
		if method.parameters.is_empty() {
			let count = descriptor::split_method(&method.descriptor)?.0.len();
			method.parameters.resize_with(count, Parameter::default);
		}
		let name = method.name.clone();
		method.parameters.get_mut(index as usize)
			.ok_or_else(|| anyhow!(invalid(format!("method {name:?} has no parameter {index}"))))
	}

	fn class_level(&mut self, event: ClassEvent) -> Result<()> {
		if !self.class.fields.is_empty() || !self.class.methods.is_empty() {
			return Err(self.unexpected(&event));
		}
		let class = &mut self.class;
		match event {
			ClassEvent::Source { file, debug } => {
				class.source_file = file;
				class.source_debug = debug;
			},
			ClassEvent::EnclosingMethod { class: outer, name, descriptor } => {
				class.enclosing_method = Some(EnclosingMethod { class: outer, method: name.zip(descriptor) });
			},
			ClassEvent::NestHost(host) => class.nest_host = Some(host),
			ClassEvent::NestMember(member) => class.nest_members.push(member),
			ClassEvent::PermittedSubclass(subclass) => class.permitted_subclasses.push(subclass),
			ClassEvent::InnerClass(inner) => class.inner_classes.push(InnerClass {
				name: inner.name,
				outer: inner.outer,
				simple_name: inner.simple_name,
				access: inner.access,
			}),
			ClassEvent::Record(components) => {
				class.record = Some(components.into_iter()
					.map(|component| record_component_from_cafe(component, &mut self.labels))
					.collect::<Result<_>>()?);
			},
			ClassEvent::Module(module) => class.module = Some(*module),
			event => return Err(self.unexpected(&event)),
		}
		Ok(())
	}

	fn code(&mut self, event: CodeEvent) -> Result<()> {
		let Some(method) = self.class.methods.last_mut() else {
			bail!("code without a method");
		};
		let labels = &mut self.labels;
		match event {
			CodeEvent::TryCatch { start, end, handler, catch } => method.entries.push(MethodEntry::TryCatch(TryCatch {
				start: labels.get(start),
				end: labels.get(end),
				handler: labels.get(handler),
				catch_type: catch,
			})),
			CodeEvent::Label(label) => method.entries.push(MethodEntry::Label(labels.get(label))),
			CodeEvent::LineNumber { line, start } => method.entries.push(MethodEntry::LineMarker(LineMarker {
				line,
				label: labels.get(start),
			})),
			CodeEvent::Frame(frame) => method.entries.push(MethodEntry::Frame(frame_from_cafe(frame, labels))),
			CodeEvent::Insn(insn) => method.entries.push(MethodEntry::Instruction(from_insn(insn, |label| labels.get(label)))),
			CodeEvent::LocalVariable(local) => method.local_variables.push(LocalVariable {
				name: local.name,
				descriptor: local.descriptor,
				signature: local.signature,
				start: labels.get(local.start),
				end: labels.get(local.end),
				index: local.index,
			}),
			CodeEvent::TypeAnnotation { visible, annotation } => {
				method.type_annotations.push(type_annotation_from_cafe(visible, annotation, labels)?);
			},
			CodeEvent::Maxs { max_stack, max_locals } => {
				method.max_stack = Some(max_stack);
				method.max_locals = Some(max_locals);
			},
		}
		Ok(())
	}

	/// The finished model, once the [`ClassEvent::End`] was seen.
	pub fn finish(self) -> Result<ClassModel> {
		if self.state != State::Closed {
			bail!(invalid(format!("class events ended while {:?}", self.state)));
		}
		Ok(self.class)
	}
}

impl ClassSink for ModelBuilder {
	fn accept(&mut self, event: ClassEvent) -> Result<()> {
		match (self.state, event) {
			(State::AwaitingClass, ClassEvent::Class(header)) => {
				trace!("reading class {:?}", header.name);
				self.class.name = header.name;
				self.class.access = header.access;
				self.class.version = Version { major: header.version.major, minor: header.version.minor };
				self.class.super_class = header.super_class;
				self.class.interfaces = header.interfaces;
				self.state = State::InClass { in_field: false };
			},
			(State::InClass { in_field: false }, ClassEvent::Signature(signature)) => self.class.signature = Some(signature),
			(State::InClass { in_field: true }, ClassEvent::Signature(signature)) => {
				if let Some(field) = self.class.fields.last_mut() {
					field.signature = Some(signature);
				}
			},
			(State::InMethod, ClassEvent::Signature(signature)) => self.method()?.signature = Some(signature),

			(State::InClass { in_field: false }, ClassEvent::Annotation { visible, annotation }) => {
				self.class.annotations.push(annotation_from_cafe(visible, annotation));
			},
			(State::InClass { in_field: true }, ClassEvent::Annotation { visible, annotation }) => {
				if let Some(field) = self.class.fields.last_mut() {
					field.annotations.push(annotation_from_cafe(visible, annotation));
				}
			},
			(State::InMethod, ClassEvent::Annotation { visible, annotation }) => {
				self.method()?.annotations.push(annotation_from_cafe(visible, annotation));
			},

			(State::InClass { in_field: false }, ClassEvent::TypeAnnotation { visible, annotation }) => {
				let annotation = type_annotation_from_cafe(visible, annotation, &mut self.labels)?;
				self.class.type_annotations.push(annotation);
			},
			(State::InClass { in_field: true }, ClassEvent::TypeAnnotation { visible, annotation }) => {
				let annotation = type_annotation_from_cafe(visible, annotation, &mut self.labels)?;
				if let Some(field) = self.class.fields.last_mut() {
					field.type_annotations.push(annotation);
				}
			},
			(State::InMethod, ClassEvent::TypeAnnotation { visible, annotation }) => {
				let annotation = type_annotation_from_cafe(visible, annotation, &mut self.labels)?;
				self.method()?.type_annotations.push(annotation);
			},

			(State::InClass { in_field: false }, ClassEvent::Deprecated) => self.class.deprecated = true,
			(State::InClass { in_field: false }, ClassEvent::Synthetic) => self.class.synthetic = true,
			(State::InClass { in_field: true }, event @ (ClassEvent::Deprecated | ClassEvent::Synthetic)) => {
				if let Some(field) = self.class.fields.last_mut() {
					match event {
						ClassEvent::Deprecated => field.deprecated = true,
						_ => field.synthetic = true,
					}
				}
			},
			(State::InMethod, ClassEvent::Deprecated) => self.method()?.deprecated = true,
			(State::InMethod, ClassEvent::Synthetic) => self.method()?.synthetic = true,

			(State::InClass { in_field: false }, event @ (
				ClassEvent::Source { .. } | ClassEvent::EnclosingMethod { .. } | ClassEvent::NestHost(_) |
				ClassEvent::NestMember(_) | ClassEvent::PermittedSubclass(_) | ClassEvent::InnerClass(_) |
				ClassEvent::Record(_) | ClassEvent::Module(_)
			)) => self.class_level(event)?,

			(State::InClass { .. } | State::InMethod, ClassEvent::Field(header)) => {
				let FieldHeader { access, name, descriptor, value } = header;
				trace!("field {name:?} {descriptor:?}");
				self.class.fields.push(FieldModel {
					name,
					descriptor,
					access,
					value: value.map(from_constant),
					..FieldModel::default()
				});
				self.state = State::InClass { in_field: true };
			},
			(State::InClass { .. } | State::InMethod, ClassEvent::Method(header)) => {
				let MethodHeader { access, name, descriptor, exceptions } = header;
				trace!("method {name:?}{descriptor}");
				self.class.methods.push(MethodModel { name, descriptor, access, exceptions, ..MethodModel::default() });
				self.labels = LabelMap::default();
				self.state = State::InMethod;
			},
			(State::InMethod, ClassEvent::Parameter { name, access }) => {
				self.method()?.parameters.push(Parameter { name, access, annotations: Vec::new() });
			},
			(State::InMethod, ClassEvent::AnnotableParameterCount { count, visible }) => {
				let method = self.method()?;
				if visible {
					method.visible_annotable_parameters = Some(count);
				} else {
					method.invisible_annotable_parameters = Some(count);
				}
			},
			(State::InMethod, ClassEvent::ParameterAnnotation { parameter, visible, annotation }) => {
				let index = self.annotable_parameter(parameter, visible)?;
				self.parameter(index)?.annotations.push(annotation_from_cafe(visible, annotation));
			},
			(State::InMethod, ClassEvent::AnnotationDefault(value)) => {
				self.method()?.annotation_default = Some(annotation_value_from_cafe(value));
			},
			(State::InMethod, ClassEvent::Code(event)) => self.code(event)?,

			(State::InClass { .. } | State::InMethod, ClassEvent::End) => self.state = State::Closed,
			(_, event) => return Err(self.unexpected(&event)),
		}
		Ok(())
	}
}

/// Reads a class file into a model. The model isn't validated yet.
pub fn read_model(bytes: &[u8]) -> Result<ClassModel> {
	let mut builder = ModelBuilder::new();
	cafe::read_class(bytes, &mut builder)?;
	builder.finish()
}

fn annotation_value_to_cafe(value: &AnnotationValue) -> Result<ElementValue> {
	Ok(match value {
		AnnotationValue::Value(operand) => match operand {
			&Operand::Byte(v) => ElementValue::Byte(v),
			&Operand::Char(v) => ElementValue::Char(v),
			&Operand::Double(v) => ElementValue::Double(v),
			&Operand::Float(v) => ElementValue::Float(v),
			&Operand::Int(v) => ElementValue::Int(v),
			&Operand::Long(v) => ElementValue::Long(v),
			&Operand::Short(v) => ElementValue::Short(v),
			&Operand::Bool(v) => ElementValue::Boolean(v),
			Operand::String(v) => ElementValue::String(v.clone()),
			operand => bail!(crate::error::CodecError::UnsupportedOperandType { tag: crate::value::tag(operand).to_owned() }),
		},
		AnnotationValue::Enum { descriptor, name } => ElementValue::Enum { descriptor: descriptor.clone(), name: name.clone() },
		AnnotationValue::Class(descriptor) => ElementValue::Class(descriptor.clone()),
		AnnotationValue::Annotation { descriptor, properties } => ElementValue::Annotation(cafe::Annotation {
			descriptor: descriptor.clone(),
			elements: properties_to_cafe(properties)?,
		}),
		AnnotationValue::Array(values) => ElementValue::Array(values.iter().map(annotation_value_to_cafe).collect::<Result<_>>()?),
	})
}

fn properties_to_cafe(properties: &IndexMap<String, AnnotationValue>) -> Result<Vec<(String, ElementValue)>> {
	properties.iter()
		.map(|(name, value)| Ok((name.clone(), annotation_value_to_cafe(value)?)))
		.collect()
}

fn annotation_to_cafe(annotation: &Annotation) -> Result<(bool, cafe::Annotation)> {
	let visible = annotation.visibility == Visibility::Runtime;
	Ok((visible, cafe::Annotation {
		descriptor: annotation.descriptor.clone(),
		elements: properties_to_cafe(&annotation.properties)?,
	}))
}

fn annotation_event(annotation: &Annotation) -> Result<ClassEvent> {
	let (visible, annotation) = annotation_to_cafe(annotation)?;
	Ok(ClassEvent::Annotation { visible, annotation })
}

fn label(label: LabelId) -> Label {
	Label(label.0)
}

fn type_annotation_to_cafe(annotation: &TypeAnnotation) -> Result<(bool, cafe::TypeAnnotation)> {
	let (visible, inner) = annotation_to_cafe(&annotation.annotation)?;
	Ok((visible, cafe::TypeAnnotation {
		target_type: annotation.target_type,
		target: annotation.target.clone().map_labels(|l| Ok(label(l)))?,
		path: annotation.path.iter()
			.map(|step| match *step {
				TypePathStep::Array => cafe::TypePathStep { kind: 0, argument: 0 },
				TypePathStep::Nested => cafe::TypePathStep { kind: 1, argument: 0 },
				TypePathStep::Wildcard => cafe::TypePathStep { kind: 2, argument: 0 },
				TypePathStep::TypeArgument(argument) => cafe::TypePathStep { kind: 3, argument },
			})
			.collect(),
		annotation: inner,
	}))
}

fn type_annotation_event(annotation: &TypeAnnotation) -> Result<ClassEvent> {
	let (visible, annotation) = type_annotation_to_cafe(annotation)?;
	Ok(ClassEvent::TypeAnnotation { visible, annotation })
}

fn markers(deprecated: bool, synthetic: bool, sink: &mut impl ClassSink) -> Result<()> {
	if deprecated {
		sink.accept(ClassEvent::Deprecated)?;
	}
	if synthetic {
		sink.accept(ClassEvent::Synthetic)?;
	}
	Ok(())
}

fn record_component_to_cafe(component: &RecordComponent) -> Result<cafe::RecordComponent> {
	Ok(cafe::RecordComponent {
		name: component.name.clone(),
		descriptor: component.descriptor.clone(),
		signature: component.signature.clone(),
		annotations: component.annotations.iter().map(annotation_to_cafe).collect::<Result<_>>()?,
		type_annotations: component.type_annotations.iter().map(type_annotation_to_cafe).collect::<Result<_>>()?,
	})
}

fn frame_value_to_cafe(value: &FrameValue) -> VerificationType {
	match value {
		FrameValue::Top => VerificationType::Top,
		FrameValue::Integer => VerificationType::Integer,
		FrameValue::Float => VerificationType::Float,
		FrameValue::Long => VerificationType::Long,
		FrameValue::Double => VerificationType::Double,
		FrameValue::Null => VerificationType::Null,
		FrameValue::UninitializedThis => VerificationType::UninitializedThis,
		FrameValue::Object(class) => VerificationType::Object(class.clone()),
		&FrameValue::Uninitialized(l) => VerificationType::Uninitialized(label(l)),
	}
}

fn code_events(method: &MethodModel, sink: &mut impl ClassSink) -> Result<()> {
	for (index, entry) in method.entries.iter().enumerate() {
		let event = match entry {
			MethodEntry::Instruction(instruction) => CodeEvent::Insn(to_insn(instruction)
				.with_context(|| anyhow!("in entry {index}, {}", instruction.mnemonic()))?),
			&MethodEntry::Label(l) => CodeEvent::Label(label(l)),
			MethodEntry::TryCatch(try_catch) => CodeEvent::TryCatch {
				start: label(try_catch.start),
				end: label(try_catch.end),
				handler: label(try_catch.handler),
				catch: try_catch.catch_type.clone(),
			},
			MethodEntry::Frame(frame) => CodeEvent::Frame(Frame {
				kind: match frame.kind {
					FrameKind::Same => cafe::FrameKind::Same,
					FrameKind::SameLocals1StackItem => cafe::FrameKind::SameLocals1StackItem,
					FrameKind::Chop(n) => cafe::FrameKind::Chop(n),
					FrameKind::Append => cafe::FrameKind::Append,
					FrameKind::Full => cafe::FrameKind::Full,
				},
				locals: frame.locals.iter().map(frame_value_to_cafe).collect(),
				stack: frame.stack.iter().map(frame_value_to_cafe).collect(),
			}),
			MethodEntry::LineMarker(line) => CodeEvent::LineNumber { line: line.line, start: label(line.label) },
		};
		sink.accept(ClassEvent::Code(event))?;
	}
	for local in &method.local_variables {
		sink.accept(ClassEvent::Code(CodeEvent::LocalVariable(cafe::LocalVariable {
			name: local.name.clone(),
			descriptor: local.descriptor.clone(),
			signature: local.signature.clone(),
			start: label(local.start),
			end: label(local.end),
			index: local.index,
		})))?;
	}
	for annotation in method.type_annotations.iter().filter(|a| type_target::is_code(a.target_type)) {
		let (visible, annotation) = type_annotation_to_cafe(annotation)?;
		sink.accept(ClassEvent::Code(CodeEvent::TypeAnnotation { visible, annotation }))?;
	}
	if let (Some(max_stack), Some(max_locals)) = (method.max_stack, method.max_locals) {
		sink.accept(ClassEvent::Code(CodeEvent::Maxs { max_stack, max_locals }))?;
	}
	Ok(())
}

fn method_events(method: &MethodModel, sink: &mut impl ClassSink) -> Result<()> {
	sink.accept(ClassEvent::Method(MethodHeader {
		access: method.access,
		name: method.name.clone(),
		descriptor: method.descriptor.clone(),
		exceptions: method.exceptions.clone(),
	}))?;
	if let Some(signature) = &method.signature {
		sink.accept(ClassEvent::Signature(signature.clone()))?;
	}
	markers(method.deprecated, method.synthetic, sink)?;
	if method.parameters.iter().any(|p| p.name.is_some() || p.access != 0) {
		for parameter in &method.parameters {
			sink.accept(ClassEvent::Parameter { name: parameter.name.clone(), access: parameter.access })?;
		}
	}
	for annotation in &method.annotations {
		sink.accept(annotation_event(annotation)?)?;
	}
	for annotation in method.type_annotations.iter().filter(|a| !type_target::is_code(a.target_type)) {
		sink.accept(type_annotation_event(annotation)?)?;
	}

	let arguments = descriptor::split_method(&method.descriptor)?.0.len();
	for (visibility, count) in [
		(Visibility::Runtime, method.visible_annotable_parameters),
		(Visibility::Class, method.invisible_annotable_parameters),
	] {
		let visible = visibility == Visibility::Runtime;
		let skipped = match count {
			Some(count) => {
				sink.accept(ClassEvent::AnnotableParameterCount { count, visible })?;
				arguments.checked_sub(count as usize)
					.ok_or_else(|| anyhow!(invalid(format!("{count} annotable parameters, but only {arguments} arguments"))))?
			},
			None => 0,
		};
		for (index, parameter) in method.parameters.iter().enumerate() {
			for annotation in parameter.annotations.iter().filter(|a| a.visibility == visibility) {
				let index = index.checked_sub(skipped)
					.ok_or_else(|| anyhow!(invalid(format!("parameter {index} is annotated, but isn't annotable"))))?;
				let index = u8::try_from(index).context("more than 255 parameters")?;
				let (visible, annotation) = annotation_to_cafe(annotation)?;
				sink.accept(ClassEvent::ParameterAnnotation { parameter: index, visible, annotation })?;
			}
		}
	}
	if let Some(default) = &method.annotation_default {
		sink.accept(ClassEvent::AnnotationDefault(annotation_value_to_cafe(default)?))?;
	}
	code_events(method, sink)
}

/// Feeds a model to a class sink, in the order the class file reader produces events.
pub fn model_events(class: &ClassModel, sink: &mut impl ClassSink) -> Result<()> {
	sink.accept(ClassEvent::Class(ClassHeader {
		version: cafe::Version { major: class.version.major, minor: class.version.minor },
		access: class.access,
		name: class.name.clone(),
		super_class: class.super_class.clone(),
		interfaces: class.interfaces.clone(),
	}))?;
	if class.source_file.is_some() || class.source_debug.is_some() {
		sink.accept(ClassEvent::Source { file: class.source_file.clone(), debug: class.source_debug.clone() })?;
	}
	if let Some(signature) = &class.signature {
		sink.accept(ClassEvent::Signature(signature.clone()))?;
	}
	if let Some(enclosing) = &class.enclosing_method {
		let (name, descriptor) = enclosing.method.clone().unzip();
		sink.accept(ClassEvent::EnclosingMethod { class: enclosing.class.clone(), name, descriptor })?;
	}
	if let Some(host) = &class.nest_host {
		sink.accept(ClassEvent::NestHost(host.clone()))?;
	}
	for member in &class.nest_members {
		sink.accept(ClassEvent::NestMember(member.clone()))?;
	}
	for subclass in &class.permitted_subclasses {
		sink.accept(ClassEvent::PermittedSubclass(subclass.clone()))?;
	}
	for inner in &class.inner_classes {
		sink.accept(ClassEvent::InnerClass(cafe::InnerClass {
			name: inner.name.clone(),
			outer: inner.outer.clone(),
			simple_name: inner.simple_name.clone(),
			access: inner.access,
		}))?;
	}
	markers(class.deprecated, class.synthetic, sink)?;
	for annotation in &class.annotations {
		sink.accept(annotation_event(annotation)?)?;
	}
	for annotation in &class.type_annotations {
		sink.accept(type_annotation_event(annotation)?)?;
	}
	if let Some(components) = &class.record {
		let components = components.iter()
			.map(|component| record_component_to_cafe(component).with_context(|| anyhow!("in record component {:?}", component.name)))
			.collect::<Result<_>>()?;
		sink.accept(ClassEvent::Record(components))?;
	}
	if let Some(module) = &class.module {
		sink.accept(ClassEvent::Module(Box::new(module.clone())))?;
	}

	for field in &class.fields {
		(|| -> Result<()> {
			sink.accept(ClassEvent::Field(FieldHeader {
				access: field.access,
				name: field.name.clone(),
				descriptor: field.descriptor.clone(),
				value: field.value.as_ref().map(to_constant).transpose()?,
			}))?;
			if let Some(signature) = &field.signature {
				sink.accept(ClassEvent::Signature(signature.clone()))?;
			}
			markers(field.deprecated, field.synthetic, sink)?;
			for annotation in &field.annotations {
				sink.accept(annotation_event(annotation)?)?;
			}
			for annotation in &field.type_annotations {
				sink.accept(type_annotation_event(annotation)?)?;
			}
			Ok(())
		})().with_context(|| anyhow!("in field {:?} {:?}", field.name, field.descriptor))?;
	}
	for method in &class.methods {
		method_events(method, sink).with_context(|| anyhow!("in method {:?}{}", method.name, method.descriptor))?;
	}
	sink.accept(ClassEvent::End)
}

/// Writes a model as class file bytes.
pub fn write_model(class: &ClassModel) -> Result<Vec<u8>> {
	let mut writer = ClassWriter::new();
	model_events(class, &mut writer)?;
	writer.finish()
}

/// Translates a class file into a document.
pub fn disassemble(bytes: &[u8], options: &SerializeOptions) -> Result<Document> {
	let model = read_model(bytes)?;
	model.validate()?;
	debug!("disassembled {:?}: {} fields, {} methods", model.name, model.fields.len(), model.methods.len());
	Ok(serialize(&model, options))
}

/// Translates a document back into a class file.
pub fn assemble(document: &Document) -> Result<Vec<u8>> {
	let model = parse(document)?;
	let bytes = write_model(&model).with_context(|| anyhow!("failed to write class {:?}", model.name))?;
	debug!("assembled {:?} into {} bytes", model.name, bytes.len());
	Ok(bytes)
}
