use anyhow::Result;
use java_string::JavaString;
use pretty_assertions::assert_eq;
use cafe::constants::{access, opcode, type_target};
use cafe::{Annotation, ClassEvent, ClassHeader, CodeEvent, Constant, ElementValue, FieldHeader, Frame, FrameKind, Handle, InnerClass, Insn, Label, LocalVariable, LocalVariableRange, MethodHeader, Module, ModulePackage, ModuleProvide, ModuleRequire, RecordComponent, TypeAnnotation, TypePathStep, TypeTarget, VerificationType, Version};

fn header(name: &str) -> ClassEvent {
	ClassEvent::Class(ClassHeader {
		version: Version { major: 52, minor: 0 },
		access: access::PUBLIC | access::SUPER,
		name: name.to_owned(),
		super_class: Some("java/lang/Object".to_owned()),
		interfaces: Vec::new(),
	})
}

fn method(access: u16, name: &str, descriptor: &str) -> ClassEvent {
	ClassEvent::Method(MethodHeader {
		access,
		name: name.to_owned(),
		descriptor: descriptor.to_owned(),
		exceptions: Vec::new(),
	})
}

fn code(event: CodeEvent) -> ClassEvent {
	ClassEvent::Code(event)
}

fn insn(insn: Insn) -> ClassEvent {
	code(CodeEvent::Insn(insn))
}

fn idiv() -> u8 {
	opcode::from_name("idiv").unwrap()
}

#[test]
fn straight_line_method() -> Result<()> {
	let events = vec![
		header("demo/Adder"),
		ClassEvent::Source { file: Some("Adder.java".to_owned()), debug: None },
		method(access::PUBLIC | access::STATIC, "add", "()I"),
		insn(Insn::Int(opcode::BIPUSH, 5)),
		insn(Insn::Int(opcode::BIPUSH, 7)),
		insn(Insn::Simple(opcode::IADD)),
		insn(Insn::Simple(opcode::IRETURN)),
		ClassEvent::End,
	];

	let bytes = cafe::write_events(events.clone())?;
	let read = cafe::read_events(&bytes)?;

	let mut expected = events;
	expected.insert(7, code(CodeEvent::Maxs { max_stack: 2, max_locals: 0 }));
	assert_eq!(read, expected);
	Ok(())
}

#[test]
fn try_catch_with_frame_and_lines() -> Result<()> {
	let events = vec![
		header("demo/Safe"),
		method(access::STATIC, "safe", "(I)I"),
		code(CodeEvent::TryCatch {
			start: Label(0),
			end: Label(1),
			handler: Label(2),
			catch: Some("java/lang/ArithmeticException".to_owned()),
		}),
		code(CodeEvent::Label(Label(0))),
		code(CodeEvent::LineNumber { line: 3, start: Label(0) }),
		insn(Insn::Int(opcode::BIPUSH, 10)),
		insn(Insn::Var(opcode::ILOAD, 0)),
		insn(Insn::Simple(idiv())),
		code(CodeEvent::Label(Label(1))),
		insn(Insn::Simple(opcode::IRETURN)),
		code(CodeEvent::Label(Label(2))),
		code(CodeEvent::Frame(Frame {
			kind: FrameKind::SameLocals1StackItem,
			locals: Vec::new(),
			stack: vec![VerificationType::Object("java/lang/ArithmeticException".to_owned())],
		})),
		insn(Insn::Simple(opcode::POP)),
		insn(Insn::Simple(opcode::ICONST_M1)),
		insn(Insn::Simple(opcode::IRETURN)),
		code(CodeEvent::LocalVariable(LocalVariable {
			name: "x".to_owned(),
			descriptor: "I".to_owned(),
			signature: None,
			start: Label(0),
			end: Label(1),
			index: 0,
		})),
		ClassEvent::End,
	];

	let bytes = cafe::write_events(events.clone())?;
	let read = cafe::read_events(&bytes)?;

	let mut expected = events;
	expected.insert(16, code(CodeEvent::Maxs { max_stack: 2, max_locals: 1 }));
	assert_eq!(read, expected);
	Ok(())
}

#[test]
fn labels_are_renumbered_in_offset_order() -> Result<()> {
	let events = vec![
		header("demo/Loop"),
		method(access::STATIC, "spin", "()V"),
		code(CodeEvent::Label(Label(41))),
		insn(Insn::Jump(opcode::GOTO, Label(7))),
		code(CodeEvent::Label(Label(7))),
		insn(Insn::Jump(opcode::GOTO, Label(41))),
		ClassEvent::End,
	];

	let read = cafe::read_events(&cafe::write_events(events)?)?;

	let body: Vec<_> = read.into_iter()
		.filter_map(|event| match event {
			ClassEvent::Code(event) => Some(event),
			_ => None,
		})
		.collect();
	assert_eq!(body, vec![
		CodeEvent::Label(Label(0)),
		CodeEvent::Insn(Insn::Jump(opcode::GOTO, Label(1))),
		CodeEvent::Label(Label(1)),
		CodeEvent::Insn(Insn::Jump(opcode::GOTO, Label(0))),
		CodeEvent::Maxs { max_stack: 0, max_locals: 0 },
	]);
	Ok(())
}

#[test]
fn far_conditional_jump_is_widened() -> Result<()> {
	let mut events = vec![
		header("demo/Far"),
		method(access::STATIC, "far", "(I)V"),
		insn(Insn::Var(opcode::ILOAD, 0)),
		insn(Insn::Jump(opcode::IFEQ, Label(0))),
	];
	events.extend(std::iter::repeat_with(|| insn(Insn::Simple(opcode::NOP))).take(40_000));
	events.push(code(CodeEvent::Label(Label(0))));
	events.push(insn(Insn::Simple(opcode::RETURN)));
	events.push(ClassEvent::End);

	let read = cafe::read_events(&cafe::write_events(events)?)?;

	let jumps: Vec<_> = read.iter()
		.filter_map(|event| match event {
			ClassEvent::Code(CodeEvent::Insn(insn @ Insn::Jump(..))) => Some(insn.clone()),
			_ => None,
		})
		.collect();
	// iload_0 is at 0, the inverted jump at 1 skips the goto_w at 4
	assert_eq!(jumps, vec![
		Insn::Jump(opcode::IFEQ + 1, Label(0)), // ifne
		Insn::Jump(opcode::GOTO, Label(1)),
	]);
	assert_eq!(read.iter().filter(|event| matches!(event, ClassEvent::Code(CodeEvent::Insn(Insn::Simple(opcode::NOP))))).count(), 40_000);
	assert!(read.contains(&code(CodeEvent::Maxs { max_stack: 1, max_locals: 1 })));
	Ok(())
}

#[test]
fn wide_operands_and_many_constants() -> Result<()> {
	let mut events = vec![
		header("demo/Wide"),
		method(access::STATIC, "wide", "()V"),
		insn(Insn::Iinc { var: 2, increment: 1000 }),
		insn(Insn::Var(opcode::LLOAD, 300)),
		insn(Insn::Simple(opcode::POP2)),
		insn(Insn::Ldc(Constant::Double(1.5))),
		insn(Insn::Simple(opcode::POP2)),
	];
	for i in 0..300 {
		events.push(insn(Insn::Ldc(Constant::String(JavaString::from(format!("constant {i}"))))));
		events.push(insn(Insn::Simple(opcode::POP)));
	}
	events.push(insn(Insn::Simple(opcode::RETURN)));
	events.push(ClassEvent::End);

	let read = cafe::read_events(&cafe::write_events(events.clone())?)?;

	let mut expected = events;
	let end = expected.len() - 1;
	expected.insert(end, code(CodeEvent::Maxs { max_stack: 2, max_locals: 302 }));
	assert_eq!(read, expected);
	Ok(())
}

#[test]
fn invoke_dynamic_and_handles() -> Result<()> {
	let bootstrap = Handle {
		kind: cafe::constants::handle::INVOKE_STATIC,
		owner: "java/lang/invoke/StringConcatFactory".to_owned(),
		name: "makeConcatWithConstants".to_owned(),
		descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)Ljava/lang/invoke/CallSite;".to_owned(),
		interface: false,
	};
	let events = vec![
		header("demo/Concat"),
		method(access::STATIC, "concat", "(Ljava/lang/String;)Ljava/lang/String;"),
		insn(Insn::Var(opcode::ALOAD, 0)),
		insn(Insn::InvokeDynamic {
			name: "makeConcatWithConstants".to_owned(),
			descriptor: "(Ljava/lang/String;)Ljava/lang/String;".to_owned(),
			bootstrap: bootstrap.clone(),
			arguments: vec![Constant::String(JavaString::from("hello \u{1}"))],
		}),
		insn(Insn::Method {
			opcode: opcode::INVOKEINTERFACE,
			owner: "java/lang/CharSequence".to_owned(),
			name: "toString".to_owned(),
			descriptor: "()Ljava/lang/String;".to_owned(),
			interface: true,
		}),
		insn(Insn::Ldc(Constant::MethodHandle(bootstrap))),
		insn(Insn::Simple(opcode::POP)),
		insn(Insn::Simple(opcode::ARETURN)),
		ClassEvent::End,
	];

	let read = cafe::read_events(&cafe::write_events(events.clone())?)?;

	let mut expected = events;
	expected.insert(8, code(CodeEvent::Maxs { max_stack: 2, max_locals: 1 }));
	assert_eq!(read, expected);
	Ok(())
}

#[test]
fn switches() -> Result<()> {
	let events = vec![
		header("demo/Switch"),
		method(access::STATIC, "pick", "(I)I"),
		insn(Insn::Var(opcode::ILOAD, 0)),
		insn(Insn::TableSwitch { low: 1, high: 2, default: Label(0), labels: vec![Label(1), Label(2)] }),
		code(CodeEvent::Label(Label(0))),
		insn(Insn::Var(opcode::ILOAD, 0)),
		insn(Insn::LookupSwitch { default: Label(1), pairs: vec![(-5, Label(2)), (1000, Label(1))] }),
		code(CodeEvent::Label(Label(1))),
		insn(Insn::Simple(opcode::ICONST_0)),
		insn(Insn::Simple(opcode::IRETURN)),
		code(CodeEvent::Label(Label(2))),
		insn(Insn::Simple(opcode::ICONST_1)),
		insn(Insn::Simple(opcode::IRETURN)),
		ClassEvent::End,
	];

	let read = cafe::read_events(&cafe::write_events(events.clone())?)?;

	let mut expected = events;
	expected.insert(13, code(CodeEvent::Maxs { max_stack: 1, max_locals: 1 }));
	assert_eq!(read, expected);
	Ok(())
}

#[test]
fn class_level_attributes_fields_and_annotations() -> Result<()> {
	let annotation = Annotation {
		descriptor: "Ldemo/Marker;".to_owned(),
		elements: vec![
			("count".to_owned(), ElementValue::Int(3)),
			("letter".to_owned(), ElementValue::Char(b'x' as u16)),
			("mode".to_owned(), ElementValue::Enum { descriptor: "Ldemo/Mode;".to_owned(), name: "FAST".to_owned() }),
			("type".to_owned(), ElementValue::Class("Ljava/lang/String;".to_owned())),
			("names".to_owned(), ElementValue::Array(vec![
				ElementValue::String(JavaString::from("a")),
				ElementValue::String(JavaString::from("b\0")),
			])),
			("nested".to_owned(), ElementValue::Annotation(Annotation { descriptor: "Ldemo/Inner;".to_owned(), elements: Vec::new() })),
		],
	};
	let events = vec![
		header("demo/Outer$Inner"),
		ClassEvent::Source { file: Some("Outer.java".to_owned()), debug: Some("SMAP".to_owned()) },
		ClassEvent::Signature("Ljava/lang/Object;".to_owned()),
		ClassEvent::EnclosingMethod { class: "demo/Outer".to_owned(), name: None, descriptor: None },
		ClassEvent::NestHost("demo/Outer".to_owned()),
		ClassEvent::InnerClass(InnerClass {
			name: "demo/Outer$Inner".to_owned(),
			outer: Some("demo/Outer".to_owned()),
			simple_name: Some("Inner".to_owned()),
			access: access::STATIC,
		}),
		ClassEvent::Annotation { visible: true, annotation: annotation.clone() },
		ClassEvent::Field(FieldHeader {
			access: access::STATIC | access::FINAL,
			name: "LIMIT".to_owned(),
			descriptor: "J".to_owned(),
			value: Some(Constant::Long(1 << 40)),
		}),
		ClassEvent::Annotation { visible: false, annotation: annotation.clone() },
		method(access::ABSTRACT | access::PUBLIC, "run", "(ILjava/lang/String;)V"),
		ClassEvent::Parameter { name: Some("count".to_owned()), access: 0 },
		ClassEvent::Parameter { name: None, access: access::FINAL },
		ClassEvent::ParameterAnnotation { parameter: 1, visible: true, annotation: annotation.clone() },
		ClassEvent::ParameterAnnotation { parameter: 0, visible: false, annotation },
		method(access::ABSTRACT | access::PUBLIC, "value", "()I"),
		ClassEvent::AnnotationDefault(ElementValue::Int(7)),
		ClassEvent::End,
	];

	let read = cafe::read_events(&cafe::write_events(events.clone())?)?;

	assert_eq!(read, events);
	Ok(())
}

#[test]
fn invalid_event_streams() {
	assert!(cafe::write_events([ClassEvent::End]).is_err());
	assert!(cafe::write_events([header("demo/A")]).is_err());
	assert!(cafe::write_events([
		header("demo/A"),
		method(access::STATIC, "a", "()V"),
		insn(Insn::Jump(opcode::GOTO, Label(3))),
		ClassEvent::End,
	]).is_err());
	assert!(cafe::write_events([
		header("demo/A"),
		method(access::STATIC, "a", "()V"),
		insn(Insn::Simple(opcode::RETURN)),
		ClassEvent::NestHost("demo/B".to_owned()),
		ClassEvent::End,
	]).is_err());
}

#[test]
fn unknown_magic_is_rejected() {
	assert!(cafe::read_events(&[0xCA, 0xFE, 0xD0, 0x0D, 0, 0, 0, 52]).is_err());
}

fn marker(descriptor: &str) -> Annotation {
	Annotation { descriptor: descriptor.to_owned(), elements: Vec::new() }
}

fn type_annotation(target_type: u8, target: TypeTarget, path: Vec<TypePathStep>) -> TypeAnnotation {
	TypeAnnotation { target_type, target, path, annotation: marker("Ldemo/NonNull;") }
}

#[test]
fn records_markers_and_type_annotations() -> Result<()> {
	let events = vec![
		ClassEvent::Class(ClassHeader {
			version: Version { major: 61, minor: 0 },
			access: access::PUBLIC | access::FINAL | access::SUPER,
			name: "demo/Point".to_owned(),
			super_class: Some("java/lang/Record".to_owned()),
			interfaces: vec!["java/lang/Comparable".to_owned()],
		}),
		ClassEvent::Deprecated,
		ClassEvent::Synthetic,
		ClassEvent::TypeAnnotation {
			visible: true,
			annotation: type_annotation(type_target::CLASS_EXTENDS, TypeTarget::Supertype(0), vec![TypePathStep { kind: 3, argument: 0 }]),
		},
		ClassEvent::TypeAnnotation {
			visible: false,
			annotation: type_annotation(type_target::CLASS_TYPE_PARAMETER_BOUND, TypeTarget::TypeParameterBound { parameter: 0, bound: 1 }, Vec::new()),
		},
		ClassEvent::Record(vec![
			RecordComponent {
				name: "x".to_owned(),
				descriptor: "I".to_owned(),
				signature: None,
				annotations: vec![(true, marker("Ldemo/Positive;"))],
				type_annotations: Vec::new(),
			},
			RecordComponent {
				name: "tags".to_owned(),
				descriptor: "[Ljava/lang/String;".to_owned(),
				signature: Some("[Ljava/lang/String;".to_owned()),
				annotations: Vec::new(),
				type_annotations: vec![(false, type_annotation(type_target::FIELD, TypeTarget::Empty, vec![TypePathStep { kind: 0, argument: 0 }]))],
			},
		]),
		ClassEvent::Field(FieldHeader {
			access: access::PRIVATE | access::FINAL,
			name: "x".to_owned(),
			descriptor: "I".to_owned(),
			value: None,
		}),
		ClassEvent::Deprecated,
		ClassEvent::TypeAnnotation { visible: true, annotation: type_annotation(type_target::FIELD, TypeTarget::Empty, Vec::new()) },
		ClassEvent::Method(MethodHeader {
			access: access::PUBLIC | access::ABSTRACT,
			name: "parse".to_owned(),
			descriptor: "(Ljava/lang/String;)Ljava/lang/Object;".to_owned(),
			exceptions: vec!["java/io/IOException".to_owned()],
		}),
		ClassEvent::Synthetic,
		ClassEvent::TypeAnnotation { visible: true, annotation: type_annotation(type_target::METHOD_RETURN, TypeTarget::Empty, Vec::new()) },
		ClassEvent::TypeAnnotation { visible: true, annotation: type_annotation(type_target::METHOD_FORMAL_PARAMETER, TypeTarget::FormalParameter(0), Vec::new()) },
		ClassEvent::TypeAnnotation { visible: false, annotation: type_annotation(type_target::THROWS, TypeTarget::Throws(0), Vec::new()) },
		ClassEvent::End,
	];

	let read = cafe::read_events(&cafe::write_events(events.clone())?)?;

	assert_eq!(read, events);
	Ok(())
}

#[test]
fn type_annotations_inside_of_code() -> Result<()> {
	let events = vec![
		header("demo/Maker"),
		method(access::STATIC, "make", "()Ljava/lang/Object;"),
		code(CodeEvent::TryCatch { start: Label(0), end: Label(1), handler: Label(2), catch: Some("java/lang/Error".to_owned()) }),
		code(CodeEvent::Label(Label(0))),
		insn(Insn::Type(opcode::NEW, "java/lang/Object".to_owned())),
		insn(Insn::Simple(opcode::DUP)),
		insn(Insn::Method {
			opcode: opcode::INVOKESPECIAL,
			owner: "java/lang/Object".to_owned(),
			name: "<init>".to_owned(),
			descriptor: "()V".to_owned(),
			interface: false,
		}),
		insn(Insn::Var(opcode::ASTORE, 0)),
		code(CodeEvent::Label(Label(1))),
		insn(Insn::Var(opcode::ALOAD, 0)),
		insn(Insn::Simple(opcode::ARETURN)),
		code(CodeEvent::Label(Label(2))),
		insn(Insn::Simple(opcode::ATHROW)),
		code(CodeEvent::LocalVariable(LocalVariable {
			name: "o".to_owned(),
			descriptor: "Ljava/lang/Object;".to_owned(),
			signature: None,
			start: Label(1),
			end: Label(2),
			index: 0,
		})),
		code(CodeEvent::TypeAnnotation {
			visible: true,
			annotation: type_annotation(
				type_target::LOCAL_VARIABLE,
				TypeTarget::LocalVariable(vec![LocalVariableRange { start: Label(1), end: Label(2), index: 0 }]),
				Vec::new(),
			),
		}),
		code(CodeEvent::TypeAnnotation {
			visible: true,
			annotation: type_annotation(type_target::EXCEPTION_PARAMETER, TypeTarget::Catch(0), Vec::new()),
		}),
		code(CodeEvent::TypeAnnotation {
			visible: false,
			annotation: type_annotation(type_target::NEW, TypeTarget::Offset(Label(0)), Vec::new()),
		}),
		ClassEvent::End,
	];

	let read = cafe::read_events(&cafe::write_events(events.clone())?)?;

	let mut expected = events;
	let end = expected.len() - 1;
	expected.insert(end, code(CodeEvent::Maxs { max_stack: 2, max_locals: 1 }));
	assert_eq!(read, expected);
	Ok(())
}

#[test]
fn misplaced_type_annotations() {
	let in_code = ClassEvent::TypeAnnotation {
		visible: true,
		annotation: type_annotation(type_target::CAST, TypeTarget::TypeArgument { offset: Label(0), argument: 0 }, Vec::new()),
	};
	assert!(cafe::write_events([header("demo/A"), in_code, ClassEvent::End]).is_err());

	let mismatched = ClassEvent::TypeAnnotation {
		visible: true,
		annotation: type_annotation(type_target::FIELD, TypeTarget::Throws(0), Vec::new()),
	};
	assert!(cafe::write_events([header("demo/A"), mismatched, ClassEvent::End]).is_err());
}

#[test]
fn module_info() -> Result<()> {
	let module = Module {
		name: "demo.app".to_owned(),
		access: 0,
		version: Some("1.0".to_owned()),
		requires: vec![ModuleRequire { module: "java.base".to_owned(), access: access::MANDATED, version: Some("21".to_owned()) }],
		exports: vec![ModulePackage { package: "demo/api".to_owned(), access: 0, to: Vec::new() }],
		opens: vec![ModulePackage { package: "demo/impl".to_owned(), access: 0, to: vec!["demo.test".to_owned()] }],
		uses: vec!["demo/api/Plugin".to_owned()],
		provides: vec![ModuleProvide { service: "demo/api/Plugin".to_owned(), with: vec!["demo/impl/Builtin".to_owned()] }],
		packages: vec!["demo/api".to_owned(), "demo/impl".to_owned()],
		main_class: Some("demo/impl/Main".to_owned()),
	};
	let events = vec![
		ClassEvent::Class(ClassHeader {
			version: Version { major: 53, minor: 0 },
			access: access::MODULE,
			name: "module-info".to_owned(),
			super_class: None,
			interfaces: Vec::new(),
		}),
		ClassEvent::Module(Box::new(module)),
		ClassEvent::End,
	];

	let read = cafe::read_events(&cafe::write_events(events.clone())?)?;

	assert_eq!(read, events);
	Ok(())
}

#[test]
fn parameter_annotations_of_the_last_parameters() -> Result<()> {
	let events = vec![
		header("demo/Color"),
		method(access::ABSTRACT, "<init>", "(Ljava/lang/String;ILjava/lang/String;)V"),
		ClassEvent::AnnotableParameterCount { count: 1, visible: true },
		ClassEvent::ParameterAnnotation { parameter: 0, visible: true, annotation: marker("Ldemo/P;") },
		ClassEvent::AnnotableParameterCount { count: 0, visible: false },
		ClassEvent::End,
	];

	let bytes = cafe::write_events(events.clone())?;
	let read = cafe::read_events(&bytes)?;

	assert_eq!(read, events);
	Ok(())
}

#[test]
fn attribute_lengths_past_the_end() -> Result<()> {
	let mut bytes = cafe::write_events([
		header("demo/A"),
		ClassEvent::Source { file: None, debug: Some("SMAP".to_owned()) },
		ClassEvent::End,
	])?;
	assert!(cafe::read_events(&bytes).is_ok());

	let at = bytes.windows(4).rposition(|w| w == b"SMAP").expect("the debug extension is written");
	bytes[at - 4..at].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xF0]);
	assert!(cafe::read_events(&bytes).is_err());
	Ok(())
}
