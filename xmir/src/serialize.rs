//! Writing a [`ClassModel`] as a [`Document`].
//!
//! The node order only depends on the order of the model's lists, so the same model always gives the same document.

use indexmap::IndexMap;
use crate::document::{Document, Node};
use crate::listing;
use cafe::{Module, TypeTarget};
use crate::model::{Annotation, AnnotationValue, ClassModel, FieldModel, FrameKind, FrameValue, MethodEntry, MethodModel, RecordComponent, TypeAnnotation, TypePathStep, Visibility};
use crate::naming::{class_to_document, escape, member_names};
use crate::value;

/// The version of the document schema written, and the only one read.
pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SerializeOptions {
	/// Add a `comment` node with a readable rendition to each instruction.
	pub comments: bool,
	/// Add a `listing` node with the whole class as text.
	pub listing: bool,
}

pub fn serialize(class: &ClassModel, options: &SerializeOptions) -> Document {
	let mut root = Node::new("class")
		.with("schema", SCHEMA_VERSION)
		.with("name", class_to_document(&class.name))
		.with("access", class.access.to_string())
		.with("major", class.version.major.to_string())
		.with("minor", class.version.minor.to_string())
		.with_optional("super", class.super_class.as_deref().map(class_to_document))
		.with_optional("signature", class.signature.as_deref())
		.with_optional("source", class.source_file.as_deref())
		.with_optional("source-debug", class.source_debug.as_deref())
		.with_optional("deprecated", flag(class.deprecated))
		.with_optional("synthetic", flag(class.synthetic));

	if options.listing {
		root.push(Node::new("listing").with_text(listing::class(class)));
	}
	for interface in &class.interfaces {
		root.push(Node::new("interface").with("name", class_to_document(interface)));
	}
	if let Some(enclosing) = &class.enclosing_method {
		let mut node = Node::new("enclosing-method").with("class", class_to_document(&enclosing.class));
		if let Some((name, descriptor)) = &enclosing.method {
			node = node.with("name", escape(name)).with("descriptor", descriptor.as_str());
		}
		root.push(node);
	}
	if let Some(nest_host) = &class.nest_host {
		root.push(Node::new("nest-host").with("name", class_to_document(nest_host)));
	}
	for member in &class.nest_members {
		root.push(Node::new("nest-member").with("name", class_to_document(member)));
	}
	for subclass in &class.permitted_subclasses {
		root.push(Node::new("permitted-subclass").with("name", class_to_document(subclass)));
	}
	for inner in &class.inner_classes {
		root.push(Node::new("inner-class")
			.with("name", class_to_document(&inner.name))
			.with_optional("outer", inner.outer.as_deref().map(class_to_document))
			.with_optional("simple-name", inner.simple_name.as_deref().map(escape))
			.with("access", inner.access.to_string()));
	}
	for annotation in &class.annotations {
		root.push(annotation_node(annotation));
	}
	for annotation in &class.type_annotations {
		root.push(type_annotation_node(annotation));
	}
	if let Some(components) = &class.record {
		root.push(components.iter().fold(Node::new("record"), |node, component| node.child(record_component_node(component))));
	}
	if let Some(module) = &class.module {
		root.push(module_node(module));
	}

	let field_names = member_names(class.fields.iter().map(|f| (f.name.as_str(), f.descriptor.as_str())));
	for (field, name) in class.fields.iter().zip(field_names) {
		root.push(field_node(field, name));
	}
	let method_names = member_names(class.methods.iter().map(|m| (m.name.as_str(), m.descriptor.as_str())));
	for (method, name) in class.methods.iter().zip(method_names) {
		root.push(method_node(method, name, options));
	}

	Document::new(root)
}

fn flag(set: bool) -> Option<&'static str> {
	set.then_some("true")
}

fn visibility(visibility: Visibility) -> &'static str {
	match visibility {
		Visibility::Runtime => "runtime",
		Visibility::Class => "class",
	}
}

fn annotation_node(annotation: &Annotation) -> Node {
	properties(
		Node::new("annotation")
			.with("descriptor", annotation.descriptor.as_str())
			.with("visibility", visibility(annotation.visibility)),
		&annotation.properties,
	)
}

fn type_annotation_node(annotation: &TypeAnnotation) -> Node {
	let target = TypeAnnotation::target_name(annotation.target_type)
		.map_or_else(|| annotation.target_type.to_string(), str::to_owned);
	let mut node = Node::new("type-annotation")
		.with("descriptor", annotation.annotation.descriptor.as_str())
		.with("visibility", visibility(annotation.annotation.visibility))
		.with("target", target);
	if !annotation.path.is_empty() {
		node = node.with("path", TypePathStep::format_path(&annotation.path));
	}
	node = match &annotation.target {
		TypeTarget::TypeParameter(index) | TypeTarget::FormalParameter(index) => node.with("index", index.to_string()),
		TypeTarget::Supertype(index) | TypeTarget::Throws(index) | TypeTarget::Catch(index) => node.with("index", index.to_string()),
		TypeTarget::TypeParameterBound { parameter, bound } => node
			.with("index", parameter.to_string())
			.with("bound", bound.to_string()),
		TypeTarget::Empty => node,
		TypeTarget::LocalVariable(ranges) => ranges.iter().fold(node, |node, range| {
			node.child(Node::new("range")
				.with("start", range.start.to_string())
				.with("end", range.end.to_string())
				.with("index", range.index.to_string()))
		}),
		TypeTarget::Offset(label) => node.with("label", label.to_string()),
		TypeTarget::TypeArgument { offset, argument } => node
			.with("label", offset.to_string())
			.with("index", argument.to_string()),
	};
	properties(node, &annotation.annotation.properties)
}

fn record_component_node(component: &RecordComponent) -> Node {
	let node = Node::new("component")
		.with("name", escape(&component.name))
		.with("descriptor", component.descriptor.as_str())
		.with_optional("signature", component.signature.as_deref());
	let node = component.annotations.iter().fold(node, |node, a| node.child(annotation_node(a)));
	component.type_annotations.iter().fold(node, |node, a| node.child(type_annotation_node(a)))
}

/// Module names stay as they are, packages and classes are written like class names.
fn module_node(module: &Module) -> Node {
	let mut node = Node::new("module")
		.with("name", module.name.as_str())
		.with("access", module.access.to_string())
		.with_optional("version", module.version.as_deref());
	for require in &module.requires {
		node.push(Node::new("requires")
			.with("module", require.module.as_str())
			.with("access", require.access.to_string())
			.with_optional("version", require.version.as_deref()));
	}
	for (kind, packages) in [("exports", &module.exports), ("opens", &module.opens)] {
		for package in packages {
			node.push(package.to.iter().fold(
				Node::new(kind)
					.with("package", class_to_document(&package.package))
					.with("access", package.access.to_string()),
				|node, to| node.child(Node::new("to").with("module", to.as_str())),
			));
		}
	}
	for service in &module.uses {
		node.push(Node::new("uses").with("class", class_to_document(service)));
	}
	for provide in &module.provides {
		node.push(provide.with.iter().fold(
			Node::new("provides").with("service", class_to_document(&provide.service)),
			|node, with| node.child(Node::new("with").with("class", class_to_document(with))),
		));
	}
	for package in &module.packages {
		node.push(Node::new("package").with("name", class_to_document(package)));
	}
	if let Some(main_class) = &module.main_class {
		node.push(Node::new("main-class").with("name", class_to_document(main_class)));
	}
	node
}

fn properties(node: Node, properties: &IndexMap<String, AnnotationValue>) -> Node {
	properties.iter().fold(node, |node, (name, value)| {
		node.child(Node::new("property").with("name", escape(name)).child(annotation_value(value)))
	})
}

fn annotation_value(value: &AnnotationValue) -> Node {
	match value {
		AnnotationValue::Value(operand) => value::to_node(operand),
		AnnotationValue::Enum { descriptor, name } => Node::new("enum")
			.with("descriptor", descriptor.as_str())
			.with("name", escape(name)),
		AnnotationValue::Class(descriptor) => Node::new("class-ref").with("descriptor", descriptor.as_str()),
		AnnotationValue::Annotation { descriptor, properties: p } => {
			properties(Node::new("annotation").with("descriptor", descriptor.as_str()), p)
		},
		AnnotationValue::Array(values) => values.iter().fold(Node::new("array"), |node, v| node.child(annotation_value(v))),
	}
}

fn field_node(field: &FieldModel, name: String) -> Node {
	let mut node = Node::new("field")
		.with("name", name)
		.with("descriptor", field.descriptor.as_str())
		.with("access", field.access.to_string())
		.with_optional("signature", field.signature.as_deref())
		.with_optional("deprecated", flag(field.deprecated))
		.with_optional("synthetic", flag(field.synthetic));
	if let Some(value) = &field.value {
		node.push(value::to_node(value));
	}
	for annotation in &field.annotations {
		node.push(annotation_node(annotation));
	}
	for annotation in &field.type_annotations {
		node.push(type_annotation_node(annotation));
	}
	node
}

fn method_node(method: &MethodModel, name: String, options: &SerializeOptions) -> Node {
	let mut node = Node::new("method")
		.with("name", name)
		.with("descriptor", method.descriptor.as_str())
		.with("access", method.access.to_string())
		.with_optional("signature", method.signature.as_deref())
		.with_optional("deprecated", flag(method.deprecated))
		.with_optional("synthetic", flag(method.synthetic))
		.with_optional("visible-annotable-parameters", method.visible_annotable_parameters.map(|n| n.to_string()))
		.with_optional("invisible-annotable-parameters", method.invisible_annotable_parameters.map(|n| n.to_string()));
	if let (Some(max_stack), Some(max_locals)) = (method.max_stack, method.max_locals) {
		node = node.with("max-stack", max_stack.to_string()).with("max-locals", max_locals.to_string());
	}

	for exception in &method.exceptions {
		node.push(Node::new("throws").with("name", class_to_document(exception)));
	}
	for (index, parameter) in method.parameters.iter().enumerate() {
		let mut p = Node::new("parameter")
			.with("index", index.to_string())
			.with_optional("name", parameter.name.as_deref().map(escape));
		if parameter.access != 0 {
			p = p.with("access", parameter.access.to_string());
		}
		for annotation in &parameter.annotations {
			p.push(annotation_node(annotation));
		}
		node.push(p);
	}
	for annotation in &method.annotations {
		node.push(annotation_node(annotation));
	}
	for annotation in &method.type_annotations {
		node.push(type_annotation_node(annotation));
	}
	if let Some(default) = &method.annotation_default {
		node.push(Node::new("default").child(annotation_value(default)));
	}
	if method.has_body() {
		node.push(body(&method.entries, options));
	}
	for local in &method.local_variables {
		node.push(Node::new("local-variable")
			.with("name", escape(&local.name))
			.with("descriptor", local.descriptor.as_str())
			.with_optional("signature", local.signature.as_deref())
			.with("start", local.start.to_string())
			.with("end", local.end.to_string())
			.with("index", local.index.to_string()));
	}
	node
}

fn body(entries: &[MethodEntry], options: &SerializeOptions) -> Node {
	let mut body = Node::new("body");
	for entry in entries {
		body.push(match entry {
			MethodEntry::Instruction(instruction) => {
				let mut node = Node::new("instruction").with("opcode", instruction.mnemonic());
				if options.comments {
					node.push(Node::new("comment").with_text(listing::instruction(instruction)));
				}
				instruction.operands.iter().fold(node, |node, operand| node.child(value::to_node(operand)))
			},
			MethodEntry::Label(label) => Node::new("label").with("id", label.to_string()),
			MethodEntry::TryCatch(try_catch) => Node::new("try-catch")
				.with("start", try_catch.start.to_string())
				.with("end", try_catch.end.to_string())
				.with("handler", try_catch.handler.to_string())
				.with_optional("type", try_catch.catch_type.as_deref().map(class_to_document)),
			MethodEntry::Frame(frame) => {
				let kind = match frame.kind {
					FrameKind::Same => "same",
					FrameKind::SameLocals1StackItem => "same-locals-1-stack-item",
					FrameKind::Chop(_) => "chop",
					FrameKind::Append => "append",
					FrameKind::Full => "full",
				};
				let mut node = Node::new("frame").with("kind", kind);
				if let FrameKind::Chop(count) = frame.kind {
					node = node.with("count", count.to_string());
				}
				node
					.child(frame_values("locals", &frame.locals))
					.child(frame_values("stack", &frame.stack))
			},
			MethodEntry::LineMarker(line) => Node::new("line")
				.with("number", line.line.to_string())
				.with("label", line.label.to_string()),
		});
	}
	body
}

fn frame_values(kind: &str, values: &[FrameValue]) -> Node {
	values.iter().fold(Node::new(kind), |node, value| {
		node.child(match value {
			FrameValue::Top => Node::new("top"),
			FrameValue::Integer => Node::new("integer"),
			FrameValue::Float => Node::new("float"),
			FrameValue::Long => Node::new("long"),
			FrameValue::Double => Node::new("double"),
			FrameValue::Null => Node::new("null"),
			FrameValue::UninitializedThis => Node::new("uninitialized-this"),
			FrameValue::Object(class) => Node::new("object").with("type", class_to_document(class)),
			FrameValue::Uninitialized(label) => Node::new("uninitialized").with("label", label.to_string()),
		})
	})
}
