//! The in-memory model of one class.
//!
//! Models are plain values. They're built either from the events of a class file or by parsing a document, and are
//! checked with [`ClassModel::validate`] before being handed on.

use std::collections::HashSet;
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use java_string::JavaString;
use cafe::constants::{access, opcode, type_target};
use cafe::descriptor;
use crate::error::{invalid, CodecError};
use crate::labels::{self, LabelId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Version {
	pub major: u16,
	pub minor: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassModel {
	/// The internal name, like `java/lang/Object`.
	pub name: String,
	pub access: u16,
	pub version: Version,
	/// [`None`] only for `java/lang/Object` and `module-info`.
	pub super_class: Option<String>,
	pub interfaces: Vec<String>,
	pub signature: Option<String>,
	pub source_file: Option<String>,
	pub source_debug: Option<String>,
	pub enclosing_method: Option<EnclosingMethod>,
	pub nest_host: Option<String>,
	pub nest_members: Vec<String>,
	pub permitted_subclasses: Vec<String>,
	pub inner_classes: Vec<InnerClass>,
	pub deprecated: bool,
	pub synthetic: bool,
	pub annotations: Vec<Annotation>,
	pub type_annotations: Vec<TypeAnnotation>,
	/// The components, if the class is a record.
	pub record: Option<Vec<RecordComponent>>,
	/// Only for `module-info`.
	pub module: Option<cafe::Module>,
	pub fields: Vec<FieldModel>,
	pub methods: Vec<MethodModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnclosingMethod {
	pub class: String,
	/// The name and descriptor of the method, if the class is enclosed by one.
	pub method: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
	pub name: String,
	pub outer: Option<String>,
	pub simple_name: Option<String>,
	pub access: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldModel {
	pub name: String,
	pub descriptor: String,
	pub access: u16,
	pub signature: Option<String>,
	/// The initial value, from the `ConstantValue` attribute.
	pub value: Option<Operand>,
	pub deprecated: bool,
	pub synthetic: bool,
	pub annotations: Vec<Annotation>,
	pub type_annotations: Vec<TypeAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodModel {
	pub name: String,
	pub descriptor: String,
	pub access: u16,
	pub signature: Option<String>,
	pub exceptions: Vec<String>,
	/// Either empty, or one entry per argument of the descriptor.
	pub parameters: Vec<Parameter>,
	/// How many of the last parameters can carry runtime visible annotations, if not all of them.
	///
	/// Compilers leave out synthetic parameters, like the name and ordinal of an enum constructor.
	pub visible_annotable_parameters: Option<u8>,
	/// Like `visible_annotable_parameters`, for the class file only annotations.
	pub invisible_annotable_parameters: Option<u8>,
	pub deprecated: bool,
	pub synthetic: bool,
	pub annotations: Vec<Annotation>,
	/// Both those on the signature and those inside of the body.
	pub type_annotations: Vec<TypeAnnotation>,
	pub annotation_default: Option<AnnotationValue>,
	/// The body. Empty for abstract and native methods.
	pub entries: Vec<MethodEntry>,
	pub local_variables: Vec<LocalVariable>,
	pub max_stack: Option<u16>,
	pub max_locals: Option<u16>,
}

impl MethodModel {
	pub fn has_body(&self) -> bool {
		!self.entries.is_empty()
	}
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameter {
	pub name: Option<String>,
	pub access: u16,
	pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
	pub name: String,
	pub descriptor: String,
	pub signature: Option<String>,
	pub start: LabelId,
	pub end: LabelId,
	pub index: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Visibility {
	/// Retained at runtime, `RuntimeVisibleAnnotations`.
	Runtime,
	/// Only recorded in the class file, `RuntimeInvisibleAnnotations`.
	Class,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
	pub descriptor: String,
	pub visibility: Visibility,
	pub properties: IndexMap<String, AnnotationValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
	/// One of the constants in [`cafe::constants::type_target`].
	pub target_type: u8,
	pub target: cafe::TypeTarget<LabelId>,
	pub path: Vec<TypePathStep>,
	pub annotation: Annotation,
}

/// A step into a type, to reach the part a type annotation is on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypePathStep {
	Array,
	Nested,
	Wildcard,
	TypeArgument(u8),
}

/// The document names of the target types.
const TARGET_NAMES: [(u8, &str); 22] = [
	(type_target::CLASS_TYPE_PARAMETER, "class-type-parameter"),
	(type_target::METHOD_TYPE_PARAMETER, "method-type-parameter"),
	(type_target::CLASS_EXTENDS, "class-extends"),
	(type_target::CLASS_TYPE_PARAMETER_BOUND, "class-type-parameter-bound"),
	(type_target::METHOD_TYPE_PARAMETER_BOUND, "method-type-parameter-bound"),
	(type_target::FIELD, "field"),
	(type_target::METHOD_RETURN, "method-return"),
	(type_target::METHOD_RECEIVER, "method-receiver"),
	(type_target::METHOD_FORMAL_PARAMETER, "method-formal-parameter"),
	(type_target::THROWS, "throws"),
	(type_target::LOCAL_VARIABLE, "local-variable"),
	(type_target::RESOURCE_VARIABLE, "resource-variable"),
	(type_target::EXCEPTION_PARAMETER, "exception-parameter"),
	(type_target::INSTANCEOF, "instanceof"),
	(type_target::NEW, "new"),
	(type_target::CONSTRUCTOR_REFERENCE, "constructor-reference"),
	(type_target::METHOD_REFERENCE, "method-reference"),
	(type_target::CAST, "cast"),
	(type_target::CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT, "constructor-invocation-type-argument"),
	(type_target::METHOD_INVOCATION_TYPE_ARGUMENT, "method-invocation-type-argument"),
	(type_target::CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT, "constructor-reference-type-argument"),
	(type_target::METHOD_REFERENCE_TYPE_ARGUMENT, "method-reference-type-argument"),
];

impl TypeAnnotation {
	pub fn target_name(target_type: u8) -> Option<&'static str> {
		TARGET_NAMES.iter().find(|(t, _)| *t == target_type).map(|(_, name)| *name)
	}

	pub fn target_type_of(name: &str) -> Option<u8> {
		TARGET_NAMES.iter().find(|(_, n)| *n == name).map(|(t, _)| *t)
	}
}

impl TypePathStep {
	/// Writes a type path as text: `[` steps into an array, `.` into a nested type, `*` into a wildcard bound and
	/// `3;` into the type argument with index three.
	pub fn format_path(path: &[TypePathStep]) -> String {
		let mut s = String::new();
		for step in path {
			match step {
				TypePathStep::Array => s.push('['),
				TypePathStep::Nested => s.push('.'),
				TypePathStep::Wildcard => s.push('*'),
				TypePathStep::TypeArgument(index) => {
					s.push_str(&index.to_string());
					s.push(';');
				},
			}
		}
		s
	}

	pub fn parse_path(path: &str) -> Result<Vec<TypePathStep>, CodecError> {
		let malformed = |reason: &str| CodecError::MalformedValue {
			tag: "type path".to_owned(),
			data: path.to_owned(),
			reason: reason.to_owned(),
		};
		let mut steps = Vec::new();
		let mut rest = path;
		while let Some(c) = rest.chars().next() {
			let step = match c {
				'[' => TypePathStep::Array,
				'.' => TypePathStep::Nested,
				'*' => TypePathStep::Wildcard,
				'0'..='9' => {
					let (digits, tail) = rest.split_once(';').ok_or_else(|| malformed("type argument without `;`"))?;
					if !digits.bytes().all(|b| b.is_ascii_digit()) || (digits.len() > 1 && digits.starts_with('0')) {
						return Err(malformed("expected a decimal type argument index"));
					}
					let index = digits.parse().map_err(|_| malformed("type argument index out of range"))?;
					steps.push(TypePathStep::TypeArgument(index));
					rest = tail;
					continue;
				},
				_ => return Err(malformed("unknown step")),
			};
			steps.push(step);
			rest = &rest[1..];
		}
		Ok(steps)
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordComponent {
	pub name: String,
	pub descriptor: String,
	pub signature: Option<String>,
	pub annotations: Vec<Annotation>,
	pub type_annotations: Vec<TypeAnnotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
	/// A primitive or a string.
	Value(Operand),
	Enum { descriptor: String, name: String },
	Class(String),
	Annotation { descriptor: String, properties: IndexMap<String, AnnotationValue> },
	Array(Vec<AnnotationValue>),
}

/// One entry of a method body. The order of the entries is the order of the code.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodEntry {
	Instruction(Instruction),
	Label(LabelId),
	TryCatch(TryCatch),
	Frame(StackFrame),
	LineMarker(LineMarker),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
	pub opcode: u8,
	pub operands: Vec<Operand>,
}

impl Instruction {
	pub fn new(opcode: u8, operands: Vec<Operand>) -> Instruction {
		Instruction { opcode, operands }
	}

	pub fn mnemonic(&self) -> &'static str {
		opcode::name(self.opcode).unwrap_or("<unknown>")
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatch {
	pub start: LabelId,
	pub end: LabelId,
	pub handler: LabelId,
	/// The caught class, [`None`] for any (as used for `finally`).
	pub catch_type: Option<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameKind {
	Same,
	SameLocals1StackItem,
	/// Drops the given number of locals, from one to three.
	Chop(u8),
	Append,
	Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
	pub kind: FrameKind,
	pub locals: Vec<FrameValue>,
	pub stack: Vec<FrameValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameValue {
	Top,
	Integer,
	Float,
	Long,
	Double,
	Null,
	UninitializedThis,
	Object(String),
	/// Created by the `new` instruction following the label.
	Uninitialized(LabelId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineMarker {
	pub line: u16,
	pub label: LabelId,
}

/// A typed value, as used for instruction operands, constants and annotation values.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
	None,
	Bool(bool),
	Byte(i8),
	Short(i16),
	Char(u16),
	Int(i32),
	Long(i64),
	Float(f32),
	Double(f64),
	String(JavaString),
	/// An internal name or an array descriptor.
	Class(String),
	MethodType(String),
	Label(LabelId),
	Handle(Handle),
	Dynamic(Box<Dynamic>),
	Array(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
	/// The reference kind, from 1 to 9.
	pub kind: u8,
	pub owner: String,
	pub name: String,
	pub descriptor: String,
	pub interface: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dynamic {
	pub name: String,
	pub descriptor: String,
	pub bootstrap: Handle,
	pub arguments: Vec<Operand>,
}

fn check_visibility(access: u16) -> Result<()> {
	let visibility = access & (access::PUBLIC | access::PRIVATE | access::PROTECTED);
	if visibility.count_ones() > 1 {
		bail!(invalid(format!("at most one of public, private and protected may be set, got access {access:#06x}")));
	}
	Ok(())
}

fn check_annotations(annotations: &[Annotation]) -> Result<()> {
	for annotation in annotations {
		check_properties(&annotation.properties)
			.with_context(|| anyhow!("in annotation {:?}", annotation.descriptor))?;
	}
	Ok(())
}

/// Checks the type annotations of one element, `allowed` tells which target types may appear on it.
fn check_type_annotations(annotations: &[TypeAnnotation], allowed: impl Fn(u8) -> bool) -> Result<()> {
	for annotation in annotations {
		let target_type = annotation.target_type;
		if !allowed(target_type) {
			bail!(invalid(format!("a type annotation with target type {target_type:#04x} can't be here")));
		}
		if !type_target::matches(target_type, &annotation.target) {
			bail!(invalid(format!("type annotation target {:?} doesn't fit the target type {target_type:#04x}", annotation.target)));
		}
		check_properties(&annotation.annotation.properties)
			.with_context(|| anyhow!("in type annotation {:?}", annotation.annotation.descriptor))?;
	}
	Ok(())
}

fn check_properties(properties: &IndexMap<String, AnnotationValue>) -> Result<()> {
	for (name, value) in properties {
		check_annotation_value(value).with_context(|| anyhow!("in property {name:?}"))?;
	}
	Ok(())
}

fn check_annotation_value(value: &AnnotationValue) -> Result<()> {
	match value {
		AnnotationValue::Value(operand) => match operand {
			Operand::Bool(_) | Operand::Byte(_) | Operand::Short(_) | Operand::Char(_) | Operand::Int(_) |
			Operand::Long(_) | Operand::Float(_) | Operand::Double(_) | Operand::String(_) => Ok(()),
			operand => bail!(CodecError::UnsupportedOperandType { tag: crate::value::tag(operand).to_owned() }),
		},
		AnnotationValue::Enum { .. } | AnnotationValue::Class(_) => Ok(()),
		AnnotationValue::Annotation { properties, .. } => check_properties(properties),
		AnnotationValue::Array(values) => values.iter().try_for_each(check_annotation_value),
	}
}

impl ClassModel {
	/// Checks the structural rules a class file has to follow.
	///
	/// Fails with [`CodecError::InvalidClassStructure`] or [`CodecError::MalformedControlFlow`], with a context
	/// naming the class and the offending member.
	pub fn validate(&self) -> Result<()> {
		self.check().with_context(|| anyhow!("in class {:?}", self.name))
	}

	fn check(&self) -> Result<()> {
		check_visibility(self.access)?;
		if self.access & access::INTERFACE != 0 {
			if self.access & access::ABSTRACT == 0 {
				bail!(invalid("interfaces must be abstract"));
			}
			if self.access & access::FINAL != 0 {
				bail!(invalid("interfaces cannot be final"));
			}
		}
		if self.module.is_some() && self.access & access::MODULE == 0 {
			bail!(invalid(format!("only a class with the module flag can describe a module, got access {:#06x}", self.access)));
		}
		check_annotations(&self.annotations)?;
		check_type_annotations(&self.type_annotations, |t| matches!(t,
			type_target::CLASS_TYPE_PARAMETER | type_target::CLASS_EXTENDS | type_target::CLASS_TYPE_PARAMETER_BOUND
		))?;

		if let Some(components) = &self.record {
			let mut seen = HashSet::new();
			for component in components {
				component.validate().with_context(|| anyhow!("in record component {:?}", component.name))?;
				if !seen.insert(&component.name) {
					bail!(invalid(format!("duplicate record component {:?}", component.name)));
				}
			}
		}

		let mut seen = HashSet::new();
		for field in &self.fields {
			field.validate().with_context(|| anyhow!("in field {:?} {:?}", field.name, field.descriptor))?;
			if !seen.insert((&field.name, &field.descriptor)) {
				bail!(invalid(format!("duplicate field {:?} {:?}", field.name, field.descriptor)));
			}
		}

		let mut seen = HashSet::new();
		for method in &self.methods {
			method.validate().with_context(|| anyhow!("in method {:?}{}", method.name, method.descriptor))?;
			if !seen.insert((&method.name, &method.descriptor)) {
				bail!(invalid(format!("duplicate method {:?}{}", method.name, method.descriptor)));
			}
		}
		Ok(())
	}
}

impl RecordComponent {
	fn validate(&self) -> Result<()> {
		descriptor::check_field(&self.descriptor)
			.map_err(|e| invalid(format!("record component {:?} has an invalid descriptor: {e}", self.name)))?;
		check_annotations(&self.annotations)?;
		check_type_annotations(&self.type_annotations, |t| t == type_target::FIELD)
	}
}

impl FieldModel {
	fn validate(&self) -> Result<()> {
		check_visibility(self.access)?;
		if self.access & access::FINAL != 0 && self.access & access::VOLATILE != 0 {
			bail!(invalid(format!("field {:?} cannot be both final and volatile", self.name)));
		}
		descriptor::check_field(&self.descriptor)
			.map_err(|e| invalid(format!("field {:?} has an invalid descriptor: {e}", self.name)))?;

		if let Some(value) = &self.value {
			let matches = match (value, self.descriptor.as_str()) {
				(Operand::Int(_), "I" | "S" | "C" | "B" | "Z") => true,
				(Operand::Long(_), "J") => true,
				(Operand::Float(_), "F") => true,
				(Operand::Double(_), "D") => true,
				(Operand::String(_), "Ljava/lang/String;") => true,
				_ => false,
			};
			if !matches {
				bail!(invalid(format!("field {:?} of type {} cannot have the initial value {value:?}", self.name, self.descriptor)));
			}
		}
		check_annotations(&self.annotations)?;
		check_type_annotations(&self.type_annotations, |t| t == type_target::FIELD)
	}
}

impl MethodModel {
	fn validate(&self) -> Result<()> {
		check_visibility(self.access)?;
		let (arguments, _) = descriptor::split_method(&self.descriptor)
			.map_err(|e| invalid(format!("method {:?} has an invalid descriptor: {e}", self.name)))?;

		if self.access & access::ABSTRACT != 0 {
			let forbidden = access::PRIVATE | access::STATIC | access::FINAL | access::SYNCHRONIZED | access::NATIVE;
			if self.access & forbidden != 0 {
				bail!(invalid(format!("abstract method {:?} has conflicting access {:#06x}", self.name, self.access)));
			}
		}

		let needs_body = self.access & (access::ABSTRACT | access::NATIVE) == 0;
		if needs_body != self.has_body() {
			if needs_body {
				bail!(invalid(format!("method {:?} needs a body", self.name)));
			} else {
				bail!(invalid(format!("abstract or native method {:?} cannot have a body", self.name)));
			}
		}
		if !self.has_body() && (!self.local_variables.is_empty() || self.max_stack.is_some() || self.max_locals.is_some()) {
			bail!(invalid(format!("method {:?} has no body, but local variables or maxs", self.name)));
		}
		if self.max_stack.is_some() != self.max_locals.is_some() {
			bail!(invalid(format!("method {:?} must give both max stack and max locals, or neither", self.name)));
		}

		if !self.parameters.is_empty() && self.parameters.len() != arguments.len() {
			bail!(invalid(format!(
				"method {:?} has {} parameters, but its descriptor {} has {} arguments",
				self.name, self.parameters.len(), self.descriptor, arguments.len()
			)));
		}

		for (visibility, count) in [
			(Visibility::Runtime, self.visible_annotable_parameters),
			(Visibility::Class, self.invisible_annotable_parameters),
		] {
			let Some(count) = count else { continue };
			let Some(first) = arguments.len().checked_sub(count as usize) else {
				bail!(invalid(format!("{count} annotable parameters, but the descriptor {} has {} arguments", self.descriptor, arguments.len())));
			};
			let annotated = self.parameters.iter()
				.take(first)
				.position(|parameter| parameter.annotations.iter().any(|annotation| annotation.visibility == visibility));
			if let Some(index) = annotated {
				bail!(invalid(format!("parameter {index} is annotated, but only the last {count} parameters are annotable")));
			}
		}

		check_annotations(&self.annotations)?;
		for (index, parameter) in self.parameters.iter().enumerate() {
			check_annotations(&parameter.annotations).with_context(|| anyhow!("in parameter {index}"))?;
		}
		let has_body = self.has_body();
		check_type_annotations(&self.type_annotations, |t| match t {
			type_target::METHOD_TYPE_PARAMETER | type_target::METHOD_TYPE_PARAMETER_BOUND..=type_target::THROWS => true,
			t => has_body && type_target::is_code(t),
		})?;
		let try_catches = self.entries.iter().filter(|entry| matches!(entry, MethodEntry::TryCatch(_))).count();
		for annotation in &self.type_annotations {
			if let cafe::TypeTarget::Catch(index) = annotation.target {
				if index as usize >= try_catches {
					bail!(invalid(format!("type annotation on the exception of try-catch {index}, but there are only {try_catches}")));
				}
			}
		}
		if let Some(default) = &self.annotation_default {
			check_annotation_value(default).context("in annotation default")?;
		}

		labels::validate(&self.entries, &self.local_variables, &self.type_annotations)?;
		for (index, entry) in self.entries.iter().enumerate() {
			match entry {
				MethodEntry::Instruction(instruction) => {
					crate::insn::to_insn(instruction)
						.with_context(|| anyhow!("in entry {index}, {}", instruction.mnemonic()))?;
				},
				MethodEntry::Frame(frame) => {
					frame.validate().with_context(|| anyhow!("in entry {index}, a frame"))?;
				},
				MethodEntry::Label(_) | MethodEntry::TryCatch(_) | MethodEntry::LineMarker(_) => {},
			}
		}
		Ok(())
	}
}

impl StackFrame {
	fn validate(&self) -> Result<()> {
		let ok = match self.kind {
			FrameKind::Same => self.locals.is_empty() && self.stack.is_empty(),
			FrameKind::SameLocals1StackItem => self.locals.is_empty() && self.stack.len() == 1,
			FrameKind::Chop(n) => (1..=3).contains(&n) && self.locals.is_empty() && self.stack.is_empty(),
			FrameKind::Append => (1..=3).contains(&self.locals.len()) && self.stack.is_empty(),
			FrameKind::Full => true,
		};
		if !ok {
			bail!(invalid(format!(
				"a {:?} frame can't have {} locals and {} stack items",
				self.kind, self.locals.len(), self.stack.len()
			)));
		}
		Ok(())
	}
}
