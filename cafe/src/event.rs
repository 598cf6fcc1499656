//! The event vocabulary shared by the reader and the writer.
//!
//! A class is a flat sequence of [`ClassEvent`]s: one [`ClassEvent::Class`] header, class level events, then the
//! members, each member followed by the events that belong to it, and a final [`ClassEvent::End`]. Events that
//! "belong to the current element" (like [`ClassEvent::Annotation`] or [`ClassEvent::Signature`]) apply to the
//! class itself until the first member event, and to the most recently started member after that.

use java_string::JavaString;

/// A position inside the code of one method.
///
/// Labels are only meaningful within one method. The reader numbers them in ascending offset order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Version {
	pub major: u16,
	pub minor: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassHeader {
	pub version: Version,
	pub access: u16,
	pub name: String,
	pub super_class: Option<String>,
	pub interfaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldHeader {
	pub access: u16,
	pub name: String,
	pub descriptor: String,
	/// The value of the `ConstantValue` attribute.
	pub value: Option<Constant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodHeader {
	pub access: u16,
	pub name: String,
	pub descriptor: String,
	pub exceptions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InnerClass {
	pub name: String,
	pub outer: Option<String>,
	pub simple_name: Option<String>,
	pub access: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
	/// One of the constants in [`crate::constants::handle`].
	pub kind: u8,
	pub owner: String,
	pub name: String,
	pub descriptor: String,
	pub interface: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDynamic {
	pub name: String,
	pub descriptor: String,
	pub bootstrap: Handle,
	pub arguments: Vec<Constant>,
}

/// A loadable constant, as used by `ldc`, bootstrap method arguments and `ConstantValue`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
	Integer(i32),
	Float(f32),
	Long(i64),
	Double(f64),
	String(JavaString),
	/// An internal name or an array descriptor.
	Class(String),
	MethodType(String),
	MethodHandle(Handle),
	Dynamic(Box<ConstantDynamic>),
}

impl Constant {
	/// `true` if the constant takes up two slots on the operand stack.
	pub fn is_wide(&self) -> bool {
		match self {
			Constant::Long(_) | Constant::Double(_) => true,
			Constant::Dynamic(dynamic) => matches!(dynamic.descriptor.as_str(), "J" | "D"),
			_ => false,
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
	pub descriptor: String,
	pub elements: Vec<(String, ElementValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
	Byte(i8),
	Char(u16),
	Double(f64),
	Float(f32),
	Int(i32),
	Long(i64),
	Short(i16),
	Boolean(bool),
	String(JavaString),
	Enum { descriptor: String, name: String },
	Class(String),
	Annotation(Annotation),
	Array(Vec<ElementValue>),
}

/// Where a type annotation applies, the `target_info` of the class file.
///
/// Which variant goes with which `target_type` is fixed, see [`crate::constants::type_target`]. The labels are
/// generic so that other numberings of the code can reuse this.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeTarget<L = Label> {
	TypeParameter(u8),
	/// The index into the interfaces, or `65535` for the super class.
	Supertype(u16),
	TypeParameterBound { parameter: u8, bound: u8 },
	Empty,
	FormalParameter(u8),
	/// The index into the `Exceptions` attribute.
	Throws(u16),
	LocalVariable(Vec<LocalVariableRange<L>>),
	/// The index into the exception table.
	Catch(u16),
	/// The instruction following the label.
	Offset(L),
	TypeArgument { offset: L, argument: u8 },
}

impl<L> TypeTarget<L> {
	/// Replaces every label with the one `f` gives for it.
	pub fn map_labels<M>(self, mut f: impl FnMut(L) -> anyhow::Result<M>) -> anyhow::Result<TypeTarget<M>> {
		Ok(match self {
			TypeTarget::TypeParameter(index) => TypeTarget::TypeParameter(index),
			TypeTarget::Supertype(index) => TypeTarget::Supertype(index),
			TypeTarget::TypeParameterBound { parameter, bound } => TypeTarget::TypeParameterBound { parameter, bound },
			TypeTarget::Empty => TypeTarget::Empty,
			TypeTarget::FormalParameter(index) => TypeTarget::FormalParameter(index),
			TypeTarget::Throws(index) => TypeTarget::Throws(index),
			TypeTarget::LocalVariable(ranges) => TypeTarget::LocalVariable(ranges.into_iter()
				.map(|range| Ok(LocalVariableRange { start: f(range.start)?, end: f(range.end)?, index: range.index }))
				.collect::<anyhow::Result<_>>()?),
			TypeTarget::Catch(index) => TypeTarget::Catch(index),
			TypeTarget::Offset(offset) => TypeTarget::Offset(f(offset)?),
			TypeTarget::TypeArgument { offset, argument } => TypeTarget::TypeArgument { offset: f(offset)?, argument },
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariableRange<L = Label> {
	pub start: L,
	pub end: L,
	pub index: u16,
}

/// One step of a `type_path`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TypePathStep {
	/// `0` for an array, `1` for a nested type, `2` for a wildcard bound and `3` for a type argument.
	pub kind: u8,
	pub argument: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
	pub target_type: u8,
	pub target: TypeTarget,
	pub path: Vec<TypePathStep>,
	pub annotation: Annotation,
}

/// A component of the `Record` attribute, with its own attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordComponent {
	pub name: String,
	pub descriptor: String,
	pub signature: Option<String>,
	/// The annotations, each with whether it's visible at runtime.
	pub annotations: Vec<(bool, Annotation)>,
	pub type_annotations: Vec<(bool, TypeAnnotation)>,
}

/// The `Module` attribute, together with `ModulePackages` and `ModuleMainClass`.
///
/// Module names are dotted (`java.base`), package names are internal names (`java/lang`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
	pub name: String,
	pub access: u16,
	pub version: Option<String>,
	pub requires: Vec<ModuleRequire>,
	pub exports: Vec<ModulePackage>,
	pub opens: Vec<ModulePackage>,
	pub uses: Vec<String>,
	pub provides: Vec<ModuleProvide>,
	pub packages: Vec<String>,
	pub main_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleRequire {
	pub module: String,
	pub access: u16,
	pub version: Option<String>,
}

/// An `exports` or `opens` directive. An empty `to` means to all modules.
#[derive(Debug, Clone, PartialEq)]
pub struct ModulePackage {
	pub package: String,
	pub access: u16,
	pub to: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleProvide {
	pub service: String,
	pub with: Vec<String>,
}

/// A normalized instruction.
///
/// There's no distinction between compact and regular forms here: `aload_0` is `Var(ALOAD, 0)`, `ldc_w` and `ldc2_w`
/// are [`Insn::Ldc`], `goto_w` is a `Jump(GOTO, _)`, and the `wide` prefix is implied by large operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
	/// An instruction without operands.
	Simple(u8),
	/// `bipush`, `sipush` and `newarray`.
	Int(u8, i32),
	/// Local variable loads and stores, and `ret`.
	Var(u8, u16),
	/// `new`, `anewarray`, `checkcast` and `instanceof`.
	Type(u8, String),
	Field { opcode: u8, owner: String, name: String, descriptor: String },
	Method { opcode: u8, owner: String, name: String, descriptor: String, interface: bool },
	InvokeDynamic { name: String, descriptor: String, bootstrap: Handle, arguments: Vec<Constant> },
	Jump(u8, Label),
	Ldc(Constant),
	Iinc { var: u16, increment: i16 },
	TableSwitch { low: i32, high: i32, default: Label, labels: Vec<Label> },
	LookupSwitch { default: Label, pairs: Vec<(i32, Label)> },
	MultiANewArray { descriptor: String, dimensions: u8 },
}

impl Insn {
	pub fn opcode(&self) -> u8 {
		use crate::constants::opcode;
		match *self {
			Insn::Simple(opcode) | Insn::Int(opcode, _) | Insn::Var(opcode, _) | Insn::Type(opcode, _) => opcode,
			Insn::Field { opcode, .. } | Insn::Method { opcode, .. } | Insn::Jump(opcode, _) => opcode,
			Insn::InvokeDynamic { .. } => opcode::INVOKEDYNAMIC,
			Insn::Ldc(_) => opcode::LDC,
			Insn::Iinc { .. } => opcode::IINC,
			Insn::TableSwitch { .. } => opcode::TABLESWITCH,
			Insn::LookupSwitch { .. } => opcode::LOOKUPSWITCH,
			Insn::MultiANewArray { .. } => opcode::MULTIANEWARRAY,
		}
	}

	/// All the labels this instruction may continue at, other than the next instruction.
	pub fn targets(&self) -> Vec<Label> {
		match self {
			&Insn::Jump(_, label) => vec![label],
			Insn::TableSwitch { default, labels, .. } => std::iter::once(*default).chain(labels.iter().copied()).collect(),
			Insn::LookupSwitch { default, pairs } => std::iter::once(*default).chain(pairs.iter().map(|(_, l)| *l)).collect(),
			_ => Vec::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationType {
	Top,
	Integer,
	Float,
	Double,
	Long,
	Null,
	UninitializedThis,
	Object(String),
	/// The value created by the `new` instruction at the label.
	Uninitialized(Label),
}

/// How a frame relates to the previous one, mirroring the `StackMapTable` frame types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameKind {
	Same,
	SameLocals1StackItem,
	Chop(u8),
	Append,
	Full,
}

/// A stack map frame, applying to the instruction that directly follows it.
///
/// For [`FrameKind::Append`] the locals are only the appended ones, for [`FrameKind::SameLocals1StackItem`] the stack
/// holds the single item, and for [`FrameKind::Full`] both lists are complete.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
	pub kind: FrameKind,
	pub locals: Vec<VerificationType>,
	pub stack: Vec<VerificationType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
	pub name: String,
	pub descriptor: String,
	pub signature: Option<String>,
	pub start: Label,
	pub end: Label,
	pub index: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodeEvent {
	TryCatch { start: Label, end: Label, handler: Label, catch: Option<String> },
	Label(Label),
	LineNumber { line: u16, start: Label },
	Frame(Frame),
	Insn(Insn),
	LocalVariable(LocalVariable),
	/// A type annotation inside the code, like on a cast or a local variable.
	TypeAnnotation { visible: bool, annotation: TypeAnnotation },
	Maxs { max_stack: u16, max_locals: u16 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassEvent {
	Class(ClassHeader),
	Source { file: Option<String>, debug: Option<String> },
	Signature(String),
	EnclosingMethod { class: String, name: Option<String>, descriptor: Option<String> },
	NestHost(String),
	NestMember(String),
	PermittedSubclass(String),
	InnerClass(InnerClass),
	Annotation { visible: bool, annotation: Annotation },
	TypeAnnotation { visible: bool, annotation: TypeAnnotation },
	/// The `Deprecated` attribute of the current element.
	Deprecated,
	/// The `Synthetic` attribute of the current element, as opposed to the access flag.
	Synthetic,
	/// Marks the class as a record, even one without components.
	Record(Vec<RecordComponent>),
	Module(Box<Module>),
	Field(FieldHeader),
	Method(MethodHeader),
	/// One entry of the `MethodParameters` attribute, in order.
	Parameter { name: Option<String>, access: u16 },
	/// The number of parameters the following parameter annotations of this visibility are counted against.
	///
	/// Only given if it differs from the number of arguments in the descriptor, as `javac` writes for the
	/// constructors of enums and inner classes. The indices of [`ClassEvent::ParameterAnnotation`] are then relative
	/// to the last `count` parameters.
	AnnotableParameterCount { count: u8, visible: bool },
	ParameterAnnotation { parameter: u8, visible: bool, annotation: Annotation },
	AnnotationDefault(ElementValue),
	Code(CodeEvent),
	End,
}

/// Something consuming the events of one class.
pub trait ClassSink {
	fn accept(&mut self, event: ClassEvent) -> anyhow::Result<()>;
}

impl ClassSink for Vec<ClassEvent> {
	fn accept(&mut self, event: ClassEvent) -> anyhow::Result<()> {
		self.push(event);
		Ok(())
	}
}
