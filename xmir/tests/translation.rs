use anyhow::Result;
use java_string::JavaString;
use pretty_assertions::assert_eq;
use cafe::constants::{access, opcode, type_target};
use cafe::{Annotation, ClassEvent, ClassHeader, CodeEvent, Constant, ElementValue, FieldHeader, Frame, FrameKind, Insn, Label, LocalVariable, MethodHeader, Module, ModulePackage, ModuleRequire, RecordComponent, TypeAnnotation, TypePathStep, TypeTarget, VerificationType, Version};
use xmir::error::{self, CodecError};
use xmir::labels::LabelId;
use xmir::model::{self as model, MethodEntry, Operand, TryCatch};
use xmir::translate::read_model;
use xmir::{assemble, disassemble, parse, serialize, Document, Node, SerializeOptions};

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
	ClassEvent::Method(MethodHeader { access, name: name.to_owned(), descriptor: descriptor.to_owned(), exceptions: Vec::new() })
}

fn code(event: CodeEvent) -> ClassEvent {
	ClassEvent::Code(event)
}

fn insn(insn: Insn) -> ClassEvent {
	code(CodeEvent::Insn(insn))
}

fn simple(mnemonic: &str) -> ClassEvent {
	insn(Insn::Simple(opcode::from_name(mnemonic).expect("known mnemonic")))
}

fn adder() -> Result<Vec<u8>> {
	cafe::write_events([
		header("demo/Adder"),
		method(access::PUBLIC | access::STATIC, "add", "()I"),
		insn(Insn::Int(opcode::BIPUSH, 5)),
		insn(Insn::Int(opcode::BIPUSH, 7)),
		insn(Insn::Simple(opcode::IADD)),
		insn(Insn::Simple(opcode::IRETURN)),
		ClassEvent::End,
	])
}

fn safe_divider() -> Result<Vec<u8>> {
	let exception = "java/lang/ArithmeticException";
	cafe::write_events([
		header("demo/Safe"),
		ClassEvent::Method(MethodHeader {
			access: access::STATIC,
			name: "divide".to_owned(),
			descriptor: "(I)I".to_owned(),
			exceptions: vec![exception.to_owned()],
		}),
		code(CodeEvent::TryCatch { start: Label(0), end: Label(1), handler: Label(2), catch: Some(exception.to_owned()) }),
		insn(Insn::Int(opcode::BIPUSH, 100)),
		code(CodeEvent::Label(Label(0))),
		insn(Insn::Var(opcode::ILOAD, 0)),
		simple("idiv"),
		insn(Insn::Var(opcode::ISTORE, 1)),
		code(CodeEvent::Label(Label(1))),
		insn(Insn::Var(opcode::ILOAD, 1)),
		insn(Insn::Simple(opcode::IRETURN)),
		code(CodeEvent::Label(Label(2))),
		code(CodeEvent::Frame(Frame {
			kind: FrameKind::SameLocals1StackItem,
			locals: Vec::new(),
			stack: vec![VerificationType::Object(exception.to_owned())],
		})),
		insn(Insn::Simple(opcode::POP)),
		insn(Insn::Simple(opcode::ICONST_M1)),
		insn(Insn::Simple(opcode::IRETURN)),
		ClassEvent::End,
	])
}

fn body(document: &Document, method: &str) -> Option<Node> {
	document.root.children.iter()
		.find(|node| node.kind == "method" && node.attribute("name") == Some(method))?
		.children.iter()
		.find(|node| node.kind == "body")
		.cloned()
}

#[test]
fn int_addition_has_four_instructions_and_no_labels() -> Result<()> {
	let document = disassemble(&adder()?, &SerializeOptions::default())?;

	let methods: Vec<_> = document.root.children.iter().filter(|node| node.kind == "method").collect();
	assert_eq!(methods.len(), 1);

	let body = body(&document, "add").expect("method has a body");
	let kinds: Vec<_> = body.children.iter().map(|node| node.kind.as_str()).collect();
	assert_eq!(kinds, vec!["instruction"; 4]);
	let opcodes: Vec<_> = body.children.iter().map(|node| node.attribute("opcode")).collect();
	assert_eq!(opcodes, vec![Some("bipush"), Some("bipush"), Some("iadd"), Some("ireturn")]);

	let class = parse(&Document::from_xml(&document.to_xml()?)?)?;
	let entries = &class.methods[0].entries;
	assert_eq!(entries.len(), 4);
	match (&entries[0], &entries[1]) {
		(MethodEntry::Instruction(first), MethodEntry::Instruction(second)) => {
			assert_eq!(first.operands, vec![Operand::Int(5)]);
			assert_eq!(second.operands, vec![Operand::Int(7)]);
		},
		entries => panic!("expected two instructions, got {entries:?}"),
	}
	Ok(())
}

#[test]
fn removing_the_handler_label_is_a_missing_child() -> Result<()> {
	let document = disassemble(&safe_divider()?, &SerializeOptions::default())?;
	let body = body(&document, "divide").expect("method has a body");

	let try_catch = body.children.iter().find(|node| node.kind == "try-catch").expect("a try-catch node");
	assert_eq!(try_catch.attribute("type"), Some("java.lang.ArithmeticException"));
	let handler = try_catch.required("handler")?.to_owned();

	let labels: Vec<_> = body.children.iter()
		.filter(|node| node.kind == "label")
		.filter_map(|node| node.attribute("id"))
		.collect();
	assert_eq!(labels, vec!["L0", "L1", "L2"]);
	assert_eq!(handler, "L2");

	// the untouched document parses fine
	parse(&document)?;

	let mut edited = document.clone();
	for node in edited.root.children.iter_mut().filter(|node| node.kind == "method") {
		for body in node.children.iter_mut().filter(|node| node.kind == "body") {
			body.children.retain(|node| !(node.kind == "label" && node.attribute("id") == Some(handler.as_str())));
		}
	}
	let error = parse(&edited).unwrap_err();
	assert!(matches!(error::kind(&error), Some(CodecError::MissingRequiredChild { .. })), "{error:?}");
	Ok(())
}

#[test]
fn undefined_handler_label_in_a_model_is_malformed_control_flow() -> Result<()> {
	let mut class = read_model(&safe_divider()?)?;
	class.validate()?;

	let entries = &mut class.methods[0].entries;
	entries.retain(|entry| entry != &MethodEntry::Label(LabelId(2)));
	assert!(entries.iter().any(|entry| matches!(entry, MethodEntry::TryCatch(TryCatch { handler: LabelId(2), .. }))));

	let error = class.validate().unwrap_err();
	assert!(matches!(error::kind(&error), Some(CodecError::MalformedControlFlow(_))), "{error:?}");
	Ok(())
}

fn rich_class() -> Result<Vec<u8>> {
	let deprecated = Annotation { descriptor: "Ljava/lang/Deprecated;".to_owned(), elements: Vec::new() };
	let retention = Annotation {
		descriptor: "Ldemo/Info;".to_owned(),
		elements: vec![
			("names".to_owned(), ElementValue::Array(vec![
				ElementValue::String(JavaString::from("a")),
				ElementValue::String(JavaString::from("b\u{0}c")),
			])),
			("level".to_owned(), ElementValue::Enum { descriptor: "Ldemo/Level;".to_owned(), name: "HIGH".to_owned() }),
			("nested".to_owned(), ElementValue::Array(vec![
				ElementValue::Array(vec![ElementValue::Int(1)]),
				ElementValue::Annotation(deprecated.clone()),
			])),
		],
	};

	cafe::write_events([
		header("demo/inner/Rich$1"),
		ClassEvent::Source { file: Some("Rich.java".to_owned()), debug: None },
		ClassEvent::Signature("Ljava/lang/Object;".to_owned()),
		ClassEvent::Annotation { visible: true, annotation: retention },
		ClassEvent::Field(FieldHeader {
			access: access::PUBLIC | access::STATIC | access::FINAL,
			name: "LIMIT".to_owned(),
			descriptor: "J".to_owned(),
			value: Some(Constant::Long(-1)),
		}),
		ClassEvent::Annotation { visible: false, annotation: deprecated },
		method(access::PUBLIC, "<init>", "()V"),
		insn(Insn::Var(opcode::ALOAD, 0)),
		insn(Insn::Method {
			opcode: opcode::INVOKESPECIAL,
			owner: "java/lang/Object".to_owned(),
			name: "<init>".to_owned(),
			descriptor: "()V".to_owned(),
			interface: false,
		}),
		insn(Insn::Simple(opcode::RETURN)),
		method(access::PUBLIC, "run", "()V"),
		insn(Insn::Ldc(Constant::String(JavaString::from("hello, world")))),
		insn(Insn::Simple(opcode::POP)),
		insn(Insn::Simple(opcode::RETURN)),
		method(access::PUBLIC, "run", "(I)I"),
		insn(Insn::Var(opcode::ILOAD, 1)),
		insn(Insn::TableSwitch { low: 0, high: 1, default: Label(9), labels: vec![Label(3), Label(4)] }),
		code(CodeEvent::Label(Label(3))),
		code(CodeEvent::Frame(Frame { kind: FrameKind::Same, locals: Vec::new(), stack: Vec::new() })),
		insn(Insn::Ldc(Constant::Float(1.5))),
		simple("f2i"),
		insn(Insn::Simple(opcode::IRETURN)),
		code(CodeEvent::Label(Label(4))),
		code(CodeEvent::Frame(Frame { kind: FrameKind::Same, locals: Vec::new(), stack: Vec::new() })),
		insn(Insn::Iinc { var: 1, increment: -3 }),
		code(CodeEvent::Label(Label(9))),
		code(CodeEvent::Frame(Frame { kind: FrameKind::Same, locals: Vec::new(), stack: Vec::new() })),
		insn(Insn::Var(opcode::ILOAD, 1)),
		insn(Insn::Simple(opcode::IRETURN)),
		method(access::PUBLIC | access::ABSTRACT, "shape", "([Ljava/lang/String;)Ljava/lang/Object;"),
		ClassEvent::End,
	])
}

#[test]
fn binary_round_trip() -> Result<()> {
	let original = rich_class()?;

	let document = disassemble(&original, &SerializeOptions::default())?;
	let xml = document.to_xml()?;
	let assembled = assemble(&Document::from_xml(&xml)?)?;

	assert_eq!(cafe::read_events(&assembled)?, cafe::read_events(&original)?);
	assert_eq!(disassemble(&assembled, &SerializeOptions::default())?.to_xml()?, xml);
	Ok(())
}

#[test]
fn model_round_trip() -> Result<()> {
	for bytes in [adder()?, safe_divider()?, rich_class()?, color()?, point()?] {
		let class = read_model(&bytes)?;
		class.validate()?;
		let options = SerializeOptions { comments: true, listing: true };
		assert_eq!(parse(&serialize(&class, &options))?, class);
		assert_eq!(parse(&Document::from_xml(&serialize(&class, &options).to_xml()?)?)?, class);
	}
	Ok(())
}

#[test]
fn serializing_is_deterministic() -> Result<()> {
	let class = read_model(&rich_class()?)?;
	let rebuilt = parse(&serialize(&class, &SerializeOptions::default()))?;

	let first = serialize(&class, &SerializeOptions::default()).to_xml()?;
	let second = serialize(&class.clone(), &SerializeOptions::default()).to_xml()?;
	let third = serialize(&rebuilt, &SerializeOptions::default()).to_xml()?;
	assert_eq!(first, second);
	assert_eq!(first, third);
	Ok(())
}

#[test]
fn metadata_doesnt_change_the_class() -> Result<()> {
	let bytes = rich_class()?;
	let plain = disassemble(&bytes, &SerializeOptions::default())?;
	let annotated = disassemble(&bytes, &SerializeOptions { comments: true, listing: true })?;

	assert!(annotated.root.children.iter().any(|node| node.kind == "listing"));
	assert_eq!(parse(&annotated)?, parse(&plain)?);
	assert_eq!(assemble(&annotated)?, assemble(&plain)?);
	Ok(())
}

#[test]
fn overloads_and_special_names() -> Result<()> {
	let document = disassemble(&rich_class()?, &SerializeOptions::default())?;

	assert_eq!(document.root.attribute("name"), Some("demo.inner.Rich_d1"));
	let names: Vec<_> = document.root.children.iter()
		.filter(|node| node.kind == "method")
		.filter_map(|node| node.attribute("name"))
		.collect();
	assert_eq!(names, vec!["_linit_g", "run-_p_qV", "run-_pI_qI", "shape"]);
	Ok(())
}

#[test]
fn mismatching_overload_suffix_is_rejected() -> Result<()> {
	let mut document = disassemble(&rich_class()?, &SerializeOptions::default())?;
	for node in document.root.children.iter_mut().filter(|node| node.kind == "method") {
		for (name, value) in &mut node.attributes {
			if name == "name" && value == "run-_p_qV" {
				*value = "run-_pJ_qV".to_owned();
			}
		}
	}
	let error = parse(&document).unwrap_err();
	assert!(matches!(error::kind(&error), Some(CodecError::NameEscapingFailure { .. })), "{error:?}");
	Ok(())
}

#[test]
fn failures_name_their_method() -> Result<()> {
	let mut document = disassemble(&adder()?, &SerializeOptions::default())?;
	for node in document.root.children.iter_mut().filter(|node| node.kind == "method") {
		for body in node.children.iter_mut().filter(|node| node.kind == "body") {
			body.push(Node::new("instruction").with("opcode", "goto").child(Node::new("value").with("type", "int").with("data", "00000001")));
		}
	}
	let error = parse(&document).unwrap_err();
	assert!(matches!(error::kind(&error), Some(CodecError::MalformedControlFlow(_))), "{error:?}");
	let message = format!("{error:#}");
	assert!(message.contains("demo/Adder"), "{message}");
	assert!(message.contains("add"), "{message}");
	Ok(())
}

fn marker(descriptor: &str) -> Annotation {
	Annotation { descriptor: descriptor.to_owned(), elements: Vec::new() }
}

fn translates_back(original: &[u8]) -> Result<Document> {
	let document = disassemble(original, &SerializeOptions::default())?;
	let xml = document.to_xml()?;
	let assembled = assemble(&Document::from_xml(&xml)?)?;
	assert_eq!(cafe::read_events(&assembled)?, cafe::read_events(original)?);
	Ok(document)
}

fn child<'a>(node: &'a Node, kind: &str, attribute: &str, value: &str) -> Option<&'a Node> {
	node.children.iter().find(|child| child.kind == kind && child.attribute(attribute) == Some(value))
}

/// `enum Color { ...; Color(@P String code) {} }`, whose constructor also takes the name and ordinal.
fn color() -> Result<Vec<u8>> {
	cafe::write_events([
		ClassEvent::Class(ClassHeader {
			version: Version { major: 52, minor: 0 },
			access: access::FINAL | access::SUPER | access::ENUM,
			name: "demo/Color".to_owned(),
			super_class: Some("java/lang/Enum".to_owned()),
			interfaces: Vec::new(),
		}),
		method(access::PRIVATE, "<init>", "(Ljava/lang/String;ILjava/lang/String;)V"),
		ClassEvent::AnnotableParameterCount { count: 1, visible: true },
		ClassEvent::ParameterAnnotation { parameter: 0, visible: true, annotation: marker("Ldemo/P;") },
		insn(Insn::Var(opcode::ALOAD, 0)),
		insn(Insn::Var(opcode::ALOAD, 1)),
		insn(Insn::Var(opcode::ILOAD, 2)),
		insn(Insn::Method {
			opcode: opcode::INVOKESPECIAL,
			owner: "java/lang/Enum".to_owned(),
			name: "<init>".to_owned(),
			descriptor: "(Ljava/lang/String;I)V".to_owned(),
			interface: false,
		}),
		insn(Insn::Simple(opcode::RETURN)),
		ClassEvent::End,
	])
}

#[test]
fn enum_constructor_annotations_stay_on_their_parameter() -> Result<()> {
	let original = color()?;

	let class = read_model(&original)?;
	let constructor = &class.methods[0];
	assert_eq!(constructor.visible_annotable_parameters, Some(1));
	assert_eq!(constructor.invisible_annotable_parameters, None);
	let annotated: Vec<_> = constructor.parameters.iter().map(|parameter| parameter.annotations.len()).collect();
	assert_eq!(annotated, vec![0, 0, 1]);

	let document = translates_back(&original)?;
	let method = child(&document.root, "method", "descriptor", "(Ljava/lang/String;ILjava/lang/String;)V").expect("the constructor is in the document");
	assert_eq!(method.attribute("visible-annotable-parameters"), Some("1"));
	let parameter = method.children.iter()
		.find(|node| node.kind == "parameter" && node.attribute("index") == Some("2"))
		.expect("the annotated parameter is in the document");
	assert_eq!(parameter.children[0].attribute("descriptor"), Some("Ldemo/P;"));
	Ok(())
}

#[test]
fn annotating_a_parameter_that_isnt_annotable_is_invalid() -> Result<()> {
	let mut document = disassemble(&color()?, &SerializeOptions::default())?;
	for node in document.root.children.iter_mut().filter(|node| node.kind == "method") {
		for parameter in node.children.iter_mut().filter(|node| node.kind == "parameter") {
			if parameter.attribute("index") == Some("0") {
				parameter.push(Node::new("annotation").with("descriptor", "Ldemo/P;").with("visibility", "runtime"));
			}
		}
	}
	let error = parse(&document).unwrap_err();
	assert!(matches!(error::kind(&error), Some(CodecError::InvalidClassStructure(_))), "{error:?}");
	Ok(())
}

fn non_null(target_type: u8, target: TypeTarget, visible: bool) -> ClassEvent {
	let annotation = TypeAnnotation { target_type, target, path: Vec::new(), annotation: marker("Ldemo/NonNull;") };
	ClassEvent::TypeAnnotation { visible, annotation }
}

/// `record Point(int x, @NonNull String label)`, with a few more type annotations.
fn point() -> Result<Vec<u8>> {
	let type_use = |target_type, target| TypeAnnotation { target_type, target, path: Vec::new(), annotation: marker("Ldemo/NonNull;") };
	cafe::write_events([
		ClassEvent::Class(ClassHeader {
			version: Version { major: 61, minor: 0 },
			access: access::PUBLIC | access::FINAL | access::SUPER,
			name: "demo/Point".to_owned(),
			super_class: Some("java/lang/Record".to_owned()),
			interfaces: Vec::new(),
		}),
		ClassEvent::Record(vec![
			RecordComponent {
				name: "x".to_owned(),
				descriptor: "I".to_owned(),
				signature: None,
				annotations: Vec::new(),
				type_annotations: Vec::new(),
			},
			RecordComponent {
				name: "label".to_owned(),
				descriptor: "Ljava/lang/String;".to_owned(),
				signature: None,
				annotations: vec![(false, marker("Ldemo/Doc;"))],
				type_annotations: vec![(true, type_use(type_target::FIELD, TypeTarget::Empty))],
			},
		]),
		ClassEvent::Field(FieldHeader { access: access::PRIVATE | access::FINAL, name: "x".to_owned(), descriptor: "I".to_owned(), value: None }),
		ClassEvent::Field(FieldHeader {
			access: access::PRIVATE | access::FINAL,
			name: "label".to_owned(),
			descriptor: "Ljava/lang/String;".to_owned(),
			value: None,
		}),
		non_null(type_target::FIELD, TypeTarget::Empty, true),
		method(access::PUBLIC, "label", "()Ljava/lang/String;"),
		ClassEvent::Deprecated,
		non_null(type_target::METHOD_RETURN, TypeTarget::Empty, true),
		insn(Insn::Var(opcode::ALOAD, 0)),
		insn(Insn::Field {
			opcode: opcode::GETFIELD,
			owner: "demo/Point".to_owned(),
			name: "label".to_owned(),
			descriptor: "Ljava/lang/String;".to_owned(),
		}),
		insn(Insn::Simple(opcode::ARETURN)),
		method(access::STATIC, "origin", "()Ljava/lang/Object;"),
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
		code(CodeEvent::LocalVariable(LocalVariable {
			name: "o".to_owned(),
			descriptor: "Ljava/lang/Object;".to_owned(),
			signature: None,
			start: Label(1),
			end: Label(2),
			index: 0,
		})),
		code(CodeEvent::TypeAnnotation {
			visible: false,
			annotation: TypeAnnotation {
				target_type: type_target::NEW,
				target: TypeTarget::Offset(Label(0)),
				path: vec![TypePathStep { kind: 3, argument: 1 }],
				annotation: marker("Ldemo/Fresh;"),
			},
		}),
		ClassEvent::End,
	])
}

#[test]
fn records_and_type_annotations() -> Result<()> {
	let original = point()?;
	let document = translates_back(&original)?;

	let record = document.root.children.iter().find(|node| node.kind == "record").expect("the record is in the document");
	let components: Vec<_> = record.children.iter().filter_map(|node| node.attribute("name")).collect();
	assert_eq!(components, vec!["x", "label"]);

	let method = child(&document.root, "method", "name", "label").expect("the accessor is in the document");
	assert_eq!(method.attribute("deprecated"), Some("true"));
	let target = method.children.iter().find(|node| node.kind == "type-annotation").and_then(|node| node.attribute("target"));
	assert_eq!(target, Some("method-return"));

	let origin = child(&document.root, "method", "name", "origin").expect("the factory is in the document");
	let fresh = origin.children.iter().find(|node| node.kind == "type-annotation").expect("the code type annotation is in the document");
	assert_eq!(fresh.attribute("target"), Some("new"));
	assert_eq!(fresh.attribute("path"), Some("1;"));
	assert_eq!(fresh.attribute("label"), Some("L0"));

	let class = read_model(&original)?;
	let model::TypeAnnotation { target, .. } = &class.methods[1].type_annotations[0];
	assert_eq!(target, &TypeTarget::Offset(LabelId(0)));
	assert_eq!(parse(&serialize(&class, &SerializeOptions::default()))?, class);
	Ok(())
}

#[test]
fn type_annotation_on_an_undefined_label_is_a_missing_child() -> Result<()> {
	let mut document = disassemble(&point()?, &SerializeOptions::default())?;
	for node in document.root.children.iter_mut().filter(|node| node.kind == "method") {
		for annotation in node.children.iter_mut().filter(|node| node.kind == "type-annotation") {
			for (name, value) in &mut annotation.attributes {
				if name.as_str() == "label" {
					*value = "L9".to_owned();
				}
			}
		}
	}
	let error = parse(&document).unwrap_err();
	assert!(matches!(error::kind(&error), Some(CodecError::MissingRequiredChild { .. })), "{error:?}");
	Ok(())
}

#[test]
fn module_info() -> Result<()> {
	let original = cafe::write_events([
		ClassEvent::Class(ClassHeader {
			version: Version { major: 53, minor: 0 },
			access: access::MODULE,
			name: "module-info".to_owned(),
			super_class: None,
			interfaces: Vec::new(),
		}),
		ClassEvent::Module(Box::new(Module {
			name: "demo.app".to_owned(),
			access: 0,
			version: Some("1.0".to_owned()),
			requires: vec![ModuleRequire { module: "java.base".to_owned(), access: access::MANDATED, version: None }],
			exports: vec![ModulePackage { package: "demo/api".to_owned(), access: 0, to: vec!["demo.client".to_owned()] }],
			packages: vec!["demo/api".to_owned()],
			main_class: Some("demo/api/Main".to_owned()),
			..Module::default()
		})),
		ClassEvent::End,
	])?;

	let document = translates_back(&original)?;
	let module = document.root.children.iter().find(|node| node.kind == "module").expect("the module is in the document");
	assert_eq!(module.attribute("name"), Some("demo.app"));
	let kinds: Vec<_> = module.children.iter().map(|node| node.kind.as_str()).collect();
	assert_eq!(kinds, vec!["requires", "exports", "package", "main-class"]);
	assert_eq!(module.children[1].attribute("package"), Some("demo.api"));
	Ok(())
}
