//! Reading a [`ClassModel`] from a [`Document`].
//!
//! Metadata nodes (like `comment` and `listing`) are skipped, any other unknown node is an error. The model is
//! validated after it's built, since a document edited by hand may break rules the serializer never breaks.

use std::str::FromStr;
use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use crate::document::{Document, Node};
use crate::error::{invalid, missing, CodecError};
use crate::labels::{self, LabelId};
use cafe::constants::type_target;
use cafe::{LocalVariableRange, Module, ModulePackage, ModuleProvide, ModuleRequire, TypeTarget};
use crate::model::{Annotation, AnnotationValue, ClassModel, EnclosingMethod, FieldModel, FrameKind, FrameValue, InnerClass, Instruction, LineMarker, LocalVariable, MethodEntry, MethodModel, Parameter, RecordComponent, StackFrame, TryCatch, TypeAnnotation, TypePathStep, Version, Visibility};
use crate::naming::{class_from_document, member_from_document, unescape};
use crate::serialize::SCHEMA_VERSION;
use crate::value;

fn unrecognized(node: &Node, parent: &Node) -> anyhow::Error {
	anyhow!(CodecError::UnrecognizedNodeKind { kind: node.kind.clone(), parent: parent.kind.clone() })
}

fn number<T: FromStr>(node: &Node, name: &str) -> Result<T> where T::Err: std::fmt::Display {
	let data = node.required(name)?;
	// only plain decimal digits, no signs or whitespace
	if data.is_empty() || !data.bytes().all(|b| b.is_ascii_digit()) {
		bail!(CodecError::MalformedValue { tag: name.to_owned(), data: data.to_owned(), reason: "expected a decimal number".to_owned() });
	}
	data.parse().map_err(|e: T::Err| anyhow!(CodecError::MalformedValue {
		tag: name.to_owned(),
		data: data.to_owned(),
		reason: e.to_string(),
	}))
}

fn class_name(node: &Node, name: &str) -> Result<String> {
	Ok(class_from_document(node.required(name)?)?)
}

fn optional_class_name(node: &Node, name: &str) -> Result<Option<String>> {
	node.attribute(name).map(class_from_document).transpose().map_err(Into::into)
}

fn label(node: &Node, name: &str) -> Result<LabelId> {
	Ok(node.required(name)?.parse()?)
}

/// A `true` or `false` attribute, absent means `false`.
fn flag(node: &Node, name: &str) -> Result<bool> {
	match node.attribute(name) {
		None | Some("false") => Ok(false),
		Some("true") => Ok(true),
		Some(other) => bail!(CodecError::MalformedValue {
			tag: name.to_owned(),
			data: other.to_owned(),
			reason: "expected true or false".to_owned(),
		}),
	}
}

fn optional_number<T: FromStr>(node: &Node, name: &str) -> Result<Option<T>> where T::Err: std::fmt::Display {
	node.attribute(name).map(|_| number(node, name)).transpose()
}

/// Reads and validates a class.
pub fn parse(document: &Document) -> Result<ClassModel> {
	let root = &document.root;
	if root.kind != "class" {
		bail!(CodecError::UnrecognizedNodeKind { kind: root.kind.clone(), parent: "document".to_owned() });
	}
	let schema = root.required("schema")?;
	if schema != SCHEMA_VERSION {
		bail!(CodecError::UnsupportedSchemaVersion(schema.to_owned()));
	}

	let class = parse_class(root)
		.with_context(|| anyhow!("in class {:?}", root.attribute("name").unwrap_or("<unnamed>")))?;
	check_labels_defined(&class).with_context(|| anyhow!("in class {:?}", class.name))?;
	class.validate()?;
	Ok(class)
}

fn parse_class(root: &Node) -> Result<ClassModel> {
	let mut class = ClassModel {
		name: class_name(root, "name")?,
		access: number(root, "access")?,
		version: Version { major: number(root, "major")?, minor: number(root, "minor")? },
		super_class: optional_class_name(root, "super")?,
		signature: root.attribute("signature").map(str::to_owned),
		source_file: root.attribute("source").map(str::to_owned),
		source_debug: root.attribute("source-debug").map(str::to_owned),
		deprecated: flag(root, "deprecated")?,
		synthetic: flag(root, "synthetic")?,
		..ClassModel::default()
	};

	for node in root.elements() {
		match node.kind.as_str() {
			"interface" => class.interfaces.push(class_name(node, "name")?),
			"enclosing-method" => {
				if class.enclosing_method.is_some() {
					bail!(invalid("more than one enclosing method"));
				}
				let method = match (node.attribute("name"), node.attribute("descriptor")) {
					(Some(name), Some(descriptor)) => Some((unescape(name)?, descriptor.to_owned())),
					(None, None) => None,
					(Some(_), None) => bail!(missing(&node.kind, "attribute \"descriptor\"")),
					(None, Some(_)) => bail!(missing(&node.kind, "attribute \"name\"")),
				};
				class.enclosing_method = Some(EnclosingMethod { class: class_name(node, "class")?, method });
			},
			"nest-host" => {
				if class.nest_host.is_some() {
					bail!(invalid("more than one nest host"));
				}
				class.nest_host = Some(class_name(node, "name")?);
			},
			"nest-member" => class.nest_members.push(class_name(node, "name")?),
			"permitted-subclass" => class.permitted_subclasses.push(class_name(node, "name")?),
			"inner-class" => class.inner_classes.push(InnerClass {
				name: class_name(node, "name")?,
				outer: optional_class_name(node, "outer")?,
				simple_name: node.attribute("simple-name").map(unescape).transpose()?,
				access: number(node, "access")?,
			}),
			"annotation" => class.annotations.push(parse_annotation(node)?),
			"type-annotation" => class.type_annotations.push(parse_type_annotation(node)?),
			"record" => {
				if class.record.is_some() {
					bail!(invalid("more than one record"));
				}
				let components = node.elements()
					.map(|component| match component.kind.as_str() {
						"component" => parse_record_component(component)
							.with_context(|| anyhow!("in record component {:?}", component.attribute("name").unwrap_or("<unnamed>"))),
						_ => Err(unrecognized(component, node)),
					})
					.collect::<Result<_>>()?;
				class.record = Some(components);
			},
			"module" => {
				if class.module.is_some() {
					bail!(invalid("more than one module"));
				}
				class.module = Some(parse_module(node).context("in module")?);
			},
			"field" => {
				let field = parse_field(node)
					.with_context(|| anyhow!("in field {:?}", node.attribute("name").unwrap_or("<unnamed>")))?;
				class.fields.push(field);
			},
			"method" => {
				let method = parse_method(node)
					.with_context(|| anyhow!("in method {:?}", node.attribute("name").unwrap_or("<unnamed>")))?;
				class.methods.push(method);
			},
			_ => return Err(unrecognized(node, root)),
		}
	}
	Ok(class)
}

fn parse_visibility(node: &Node) -> Result<Visibility> {
	Ok(match node.required("visibility")? {
		"runtime" => Visibility::Runtime,
		"class" => Visibility::Class,
		other => bail!(CodecError::MalformedValue {
			tag: "visibility".to_owned(),
			data: other.to_owned(),
			reason: "expected runtime or class".to_owned(),
		}),
	})
}

fn parse_annotation(node: &Node) -> Result<Annotation> {
	Ok(Annotation {
		descriptor: node.required("descriptor")?.to_owned(),
		visibility: parse_visibility(node)?,
		properties: parse_properties(node)?,
	})
}

fn parse_type_annotation(node: &Node) -> Result<TypeAnnotation> {
	let descriptor = node.required("descriptor")?.to_owned();
	(|| -> Result<TypeAnnotation> {
		let name = node.required("target")?;
		let target_type = TypeAnnotation::target_type_of(name).ok_or_else(|| CodecError::MalformedValue {
			tag: "target".to_owned(),
			data: name.to_owned(),
			reason: "unknown type annotation target".to_owned(),
		})?;
		let (ranges, others): (Vec<&Node>, Vec<&Node>) = node.elements().partition(|child| child.kind == "range");

		let target = match target_type {
			type_target::CLASS_TYPE_PARAMETER | type_target::METHOD_TYPE_PARAMETER => TypeTarget::TypeParameter(number(node, "index")?),
			type_target::CLASS_EXTENDS => TypeTarget::Supertype(number(node, "index")?),
			type_target::CLASS_TYPE_PARAMETER_BOUND | type_target::METHOD_TYPE_PARAMETER_BOUND => TypeTarget::TypeParameterBound {
				parameter: number(node, "index")?,
				bound: number(node, "bound")?,
			},
			type_target::METHOD_FORMAL_PARAMETER => TypeTarget::FormalParameter(number(node, "index")?),
			type_target::THROWS => TypeTarget::Throws(number(node, "index")?),
			type_target::LOCAL_VARIABLE | type_target::RESOURCE_VARIABLE => TypeTarget::LocalVariable(ranges.iter()
				.map(|range| Ok(LocalVariableRange {
					start: label(range, "start")?,
					end: label(range, "end")?,
					index: number(range, "index")?,
				}))
				.collect::<Result<_>>()?),
			type_target::EXCEPTION_PARAMETER => TypeTarget::Catch(number(node, "index")?),
			type_target::INSTANCEOF..=type_target::METHOD_REFERENCE => TypeTarget::Offset(label(node, "label")?),
			type_target::CAST..=type_target::METHOD_REFERENCE_TYPE_ARGUMENT => TypeTarget::TypeArgument {
				offset: label(node, "label")?,
				argument: number(node, "index")?,
			},
			_ => TypeTarget::Empty,
		};
		if !matches!(target, TypeTarget::LocalVariable(_)) {
			if let Some(range) = ranges.first() {
				return Err(unrecognized(range, node));
			}
		}

		Ok(TypeAnnotation {
			target_type,
			target,
			path: node.attribute("path").map(TypePathStep::parse_path).transpose()?.unwrap_or_default(),
			annotation: Annotation {
				descriptor: descriptor.clone(),
				visibility: parse_visibility(node)?,
				properties: properties_from(node, others.into_iter())?,
			},
		})
	})().with_context(|| anyhow!("in type annotation {descriptor:?}"))
}

fn parse_record_component(node: &Node) -> Result<RecordComponent> {
	let mut component = RecordComponent {
		name: unescape(node.required("name")?)?,
		descriptor: node.required("descriptor")?.to_owned(),
		signature: node.attribute("signature").map(str::to_owned),
		annotations: Vec::new(),
		type_annotations: Vec::new(),
	};
	for child in node.elements() {
		match child.kind.as_str() {
			"annotation" => component.annotations.push(parse_annotation(child)?),
			"type-annotation" => component.type_annotations.push(parse_type_annotation(child)?),
			_ => return Err(unrecognized(child, node)),
		}
	}
	Ok(component)
}

/// The module names of the `to` children of an `exports` or `opens` node.
fn module_targets(node: &Node) -> Result<Vec<String>> {
	node.elements()
		.map(|child| match child.kind.as_str() {
			"to" => Ok(child.required("module")?.to_owned()),
			_ => Err(unrecognized(child, node)),
		})
		.collect()
}

fn parse_module(node: &Node) -> Result<Module> {
	let mut module = Module {
		name: node.required("name")?.to_owned(),
		access: number(node, "access")?,
		version: node.attribute("version").map(str::to_owned),
		..Module::default()
	};
	for child in node.elements() {
		match child.kind.as_str() {
			"requires" => module.requires.push(ModuleRequire {
				module: child.required("module")?.to_owned(),
				access: number(child, "access")?,
				version: child.attribute("version").map(str::to_owned),
			}),
			kind @ ("exports" | "opens") => {
				let package = ModulePackage {
					package: class_name(child, "package")?,
					access: number(child, "access")?,
					to: module_targets(child)?,
				};
				if kind == "exports" {
					module.exports.push(package);
				} else {
					module.opens.push(package);
				}
			},
			"uses" => module.uses.push(class_name(child, "class")?),
			"provides" => {
				let with = child.elements()
					.map(|with| match with.kind.as_str() {
						"with" => class_name(with, "class"),
						_ => Err(unrecognized(with, child)),
					})
					.collect::<Result<_>>()?;
				module.provides.push(ModuleProvide { service: class_name(child, "service")?, with });
			},
			"package" => module.packages.push(class_name(child, "name")?),
			"main-class" => {
				if module.main_class.is_some() {
					bail!(invalid("more than one main class"));
				}
				module.main_class = Some(class_name(child, "name")?);
			},
			_ => return Err(unrecognized(child, node)),
		}
	}
	Ok(module)
}

fn parse_properties(node: &Node) -> Result<IndexMap<String, AnnotationValue>> {
	properties_from(node, node.elements())
}

/// Reads `children` of `node` as the properties of an annotation.
fn properties_from<'a>(node: &Node, children: impl Iterator<Item=&'a Node>) -> Result<IndexMap<String, AnnotationValue>> {
	let mut properties = IndexMap::new();
	for child in children {
		if child.kind != "property" {
			return Err(unrecognized(child, node));
		}
		let name = unescape(child.required("name")?)?;
		let value = single_element(child, "annotation value")
			.and_then(parse_annotation_value)
			.with_context(|| anyhow!("in property {name:?}"))?;
		if properties.insert(name.clone(), value).is_some() {
			bail!(invalid(format!("annotation {:?} has the property {name:?} twice", node.attribute("descriptor").unwrap_or(""))));
		}
	}
	Ok(properties)
}

fn single_element<'a>(node: &'a Node, what: &str) -> Result<&'a Node> {
	let mut elements = node.elements();
	let first = elements.next().ok_or_else(|| anyhow!(missing(&node.kind, what)))?;
	if let Some(extra) = elements.next() {
		return Err(unrecognized(extra, node));
	}
	Ok(first)
}

fn parse_annotation_value(node: &Node) -> Result<AnnotationValue> {
	Ok(match node.kind.as_str() {
		value::NODE => AnnotationValue::Value(value::from_node(node)?),
		"enum" => AnnotationValue::Enum {
			descriptor: node.required("descriptor")?.to_owned(),
			name: unescape(node.required("name")?)?,
		},
		"class-ref" => AnnotationValue::Class(node.required("descriptor")?.to_owned()),
		"annotation" => AnnotationValue::Annotation {
			descriptor: node.required("descriptor")?.to_owned(),
			properties: parse_properties(node)?,
		},
		"array" => AnnotationValue::Array(node.elements().map(parse_annotation_value).collect::<Result<_>>()?),
		_ => bail!(CodecError::UnrecognizedNodeKind { kind: node.kind.clone(), parent: "annotation value".to_owned() }),
	})
}

fn check_suffix(document_name: &str, suffix: Option<String>, descriptor: &str) -> Result<()> {
	match suffix {
		Some(suffix) if suffix != descriptor => bail!(CodecError::NameEscapingFailure {
			name: document_name.to_owned(),
			reason: format!("the overload suffix {suffix:?} doesn't match the descriptor {descriptor:?}"),
		}),
		_ => Ok(()),
	}
}

fn parse_field(node: &Node) -> Result<FieldModel> {
	let document_name = node.required("name")?;
	let (name, suffix) = member_from_document(document_name)?;
	let descriptor = node.required("descriptor")?.to_owned();
	check_suffix(document_name, suffix, &descriptor)?;

	let mut field = FieldModel {
		name,
		descriptor,
		access: number(node, "access")?,
		signature: node.attribute("signature").map(str::to_owned),
		deprecated: flag(node, "deprecated")?,
		synthetic: flag(node, "synthetic")?,
		..FieldModel::default()
	};
	for child in node.elements() {
		match child.kind.as_str() {
			value::NODE if field.value.is_none() => field.value = Some(value::from_node(child)?),
			"annotation" => field.annotations.push(parse_annotation(child)?),
			"type-annotation" => field.type_annotations.push(parse_type_annotation(child)?),
			_ => return Err(unrecognized(child, node)),
		}
	}
	Ok(field)
}

fn parse_method(node: &Node) -> Result<MethodModel> {
	let document_name = node.required("name")?;
	let (name, suffix) = member_from_document(document_name)?;
	let descriptor = node.required("descriptor")?.to_owned();
	check_suffix(document_name, suffix, &descriptor)?;

	let (max_stack, max_locals) = match (node.attribute("max-stack"), node.attribute("max-locals")) {
		(None, None) => (None, None),
		_ => (Some(number(node, "max-stack")?), Some(number(node, "max-locals")?)),
	};
	let mut method = MethodModel {
		name,
		descriptor,
		access: number(node, "access")?,
		signature: node.attribute("signature").map(str::to_owned),
		visible_annotable_parameters: optional_number(node, "visible-annotable-parameters")?,
		invisible_annotable_parameters: optional_number(node, "invisible-annotable-parameters")?,
		deprecated: flag(node, "deprecated")?,
		synthetic: flag(node, "synthetic")?,
		max_stack,
		max_locals,
		..MethodModel::default()
	};

	let mut has_body = false;
	for child in node.elements() {
		match child.kind.as_str() {
			"throws" => method.exceptions.push(class_name(child, "name")?),
			"parameter" => {
				let index: usize = number(child, "index")?;
				if index != method.parameters.len() {
					bail!(invalid(format!("expected parameter {}, got parameter {index}", method.parameters.len())));
				}
				let mut parameter = Parameter {
					name: child.attribute("name").map(unescape).transpose()?,
					access: match child.attribute("access") {
						Some(_) => number(child, "access")?,
						None => 0,
					},
					annotations: Vec::new(),
				};
				for annotation in child.elements() {
					if annotation.kind != "annotation" {
						return Err(unrecognized(annotation, child));
					}
					parameter.annotations.push(parse_annotation(annotation)?);
				}
				method.parameters.push(parameter);
			},
			"annotation" => method.annotations.push(parse_annotation(child)?),
			"type-annotation" => method.type_annotations.push(parse_type_annotation(child)?),
			"default" => {
				if method.annotation_default.is_some() {
					bail!(invalid("more than one annotation default"));
				}
				method.annotation_default = Some(parse_annotation_value(single_element(child, "annotation value")?)?);
			},
			"body" => {
				if has_body {
					bail!(invalid("more than one body"));
				}
				has_body = true;
				method.entries = parse_body(child)?;
			},
			"local-variable" => method.local_variables.push(LocalVariable {
				name: unescape(child.required("name")?)?,
				descriptor: child.required("descriptor")?.to_owned(),
				signature: child.attribute("signature").map(str::to_owned),
				start: label(child, "start")?,
				end: label(child, "end")?,
				index: number(child, "index")?,
			}),
			_ => return Err(unrecognized(child, node)),
		}
	}
	if has_body && method.entries.is_empty() {
		bail!(missing("body", "method entries"));
	}
	Ok(method)
}

fn parse_body(body: &Node) -> Result<Vec<MethodEntry>> {
	body.elements()
		.enumerate()
		.map(|(index, node)| parse_entry(node, body).with_context(|| anyhow!("in entry {index}, {:?}", node.kind)))
		.collect()
}

fn parse_entry(node: &Node, body: &Node) -> Result<MethodEntry> {
	Ok(match node.kind.as_str() {
		"label" => MethodEntry::Label(label(node, "id")?),
		"instruction" => {
			let mnemonic = node.required("opcode")?;
			let opcode = cafe::constants::opcode::from_name(mnemonic)
				.ok_or_else(|| anyhow!(invalid(format!("unknown opcode {mnemonic:?}"))))?;
			let operands = value::value_children(node)?
				.into_iter()
				.map(value::from_node)
				.collect::<Result<_>>()?;
			MethodEntry::Instruction(Instruction::new(opcode, operands))
		},
		"try-catch" => MethodEntry::TryCatch(TryCatch {
			start: label(node, "start")?,
			end: label(node, "end")?,
			handler: label(node, "handler")?,
			catch_type: optional_class_name(node, "type")?,
		}),
		"frame" => {
			let kind = match node.required("kind")? {
				"same" => FrameKind::Same,
				"same-locals-1-stack-item" => FrameKind::SameLocals1StackItem,
				"chop" => FrameKind::Chop(number(node, "count")?),
				"append" => FrameKind::Append,
				"full" => FrameKind::Full,
				other => bail!(CodecError::MalformedValue {
					tag: "frame kind".to_owned(),
					data: other.to_owned(),
					reason: "unknown frame kind".to_owned(),
				}),
			};
			let mut locals = None;
			let mut stack = None;
			for child in node.elements() {
				let slot = match child.kind.as_str() {
					"locals" => &mut locals,
					"stack" => &mut stack,
					_ => return Err(unrecognized(child, node)),
				};
				if slot.is_some() {
					bail!(invalid(format!("frame has more than one {:?}", child.kind)));
				}
				*slot = Some(child.elements().map(|value| parse_frame_value(value, child)).collect::<Result<Vec<_>>>()?);
			}
			MethodEntry::Frame(StackFrame {
				kind,
				locals: locals.unwrap_or_default(),
				stack: stack.unwrap_or_default(),
			})
		},
		"line" => MethodEntry::LineMarker(LineMarker {
			line: number(node, "number")?,
			label: label(node, "label")?,
		}),
		_ => return Err(unrecognized(node, body)),
	})
}

fn parse_frame_value(node: &Node, parent: &Node) -> Result<FrameValue> {
	Ok(match node.kind.as_str() {
		"top" => FrameValue::Top,
		"integer" => FrameValue::Integer,
		"float" => FrameValue::Float,
		"long" => FrameValue::Long,
		"double" => FrameValue::Double,
		"null" => FrameValue::Null,
		"uninitialized-this" => FrameValue::UninitializedThis,
		"object" => FrameValue::Object(class_name(node, "type")?),
		"uninitialized" => FrameValue::Uninitialized(label(node, "label")?),
		_ => return Err(unrecognized(node, parent)),
	})
}

/// Every label a method refers to must have its `label` node.
///
/// This is checked before the model is validated, so that a missing definition is reported as a missing node.
fn check_labels_defined(class: &ClassModel) -> Result<()> {
	for method in &class.methods {
		(|| -> Result<()> {
			let defined = labels::definitions(&method.entries)?;
			for (label, usage) in labels::references(&method.entries, &method.local_variables, &method.type_annotations)? {
				if !defined.contains(&label) {
					bail!(missing("body", format!("label {label}, used by {usage}")));
				}
			}
			Ok(())
		})().with_context(|| anyhow!("in method {:?}{}", method.name, method.descriptor))?;
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::document::{Document, Node};
	use crate::error::{self, CodecError};
	use super::parse;

	fn class(children: Vec<Node>) -> Node {
		children.into_iter().fold(
			Node::new("class")
				.with("schema", "1")
				.with("name", "demo.A")
				.with("access", "33")
				.with("major", "52")
				.with("minor", "0")
				.with("super", "java.lang.Object"),
			Node::child,
		)
	}

	fn kind(node: Node) -> Option<CodecError> {
		let error = parse(&Document::new(node)).unwrap_err();
		error::kind(&error).cloned()
	}

	#[test]
	fn minimal_class() -> Result<()> {
		let model = parse(&Document::new(class(vec![Node::new("comment").with_text("ignored")])))?;
		assert_eq!(model.name, "demo/A");
		assert_eq!(model.super_class.as_deref(), Some("java/lang/Object"));
		assert_eq!(model.version.major, 52);
		Ok(())
	}

	#[test]
	fn schema_version() {
		let mut node = class(vec![]);
		node.attributes.retain(|(name, _)| name != "schema");
		assert!(matches!(kind(node), Some(CodecError::MissingRequiredChild { .. })));

		let mut node = class(vec![]);
		node.attributes[0].1 = "2".to_owned();
		assert_eq!(kind(node), Some(CodecError::UnsupportedSchemaVersion("2".to_owned())));
	}

	#[test]
	fn unknown_nodes() {
		assert!(matches!(kind(class(vec![Node::new("bootstrap-method")])), Some(CodecError::UnrecognizedNodeKind { .. })));
		assert!(matches!(kind(Node::new("klass")), Some(CodecError::UnrecognizedNodeKind { .. })));

		let method = Node::new("method")
			.with("name", "run")
			.with("descriptor", "()V")
			.with("access", "1")
			.child(Node::new("body").child(Node::new("goto-label")));
		assert!(matches!(kind(class(vec![method])), Some(CodecError::UnrecognizedNodeKind { .. })));
	}

	#[test]
	fn markers_are_true_or_false() -> Result<()> {
		let model = parse(&Document::new(class(vec![]).with("deprecated", "true").with("synthetic", "false")))?;
		assert!(model.deprecated);
		assert!(!model.synthetic);
		assert!(matches!(kind(class(vec![]).with("deprecated", "yes")), Some(CodecError::MalformedValue { .. })));
		Ok(())
	}

	#[test]
	fn type_annotation_targets() -> Result<()> {
		let annotation = |target: &str| Node::new("type-annotation")
			.with("descriptor", "Ldemo/NonNull;")
			.with("visibility", "class")
			.with("target", target);

		let model = parse(&Document::new(class(vec![annotation("class-extends").with("index", "65535").with("path", "0;")])))?;
		assert_eq!(model.type_annotations.len(), 1);
		assert_eq!(model.type_annotations[0].target, cafe::TypeTarget::Supertype(65535));

		assert!(matches!(kind(class(vec![annotation("everywhere")])), Some(CodecError::MalformedValue { .. })));
		assert!(matches!(kind(class(vec![annotation("class-extends")])), Some(CodecError::MissingRequiredChild { .. })));
		let with_range = annotation("class-extends")
			.with("index", "0")
			.child(Node::new("range").with("start", "L0").with("end", "L1").with("index", "0"));
		assert!(matches!(kind(class(vec![with_range])), Some(CodecError::UnrecognizedNodeKind { .. })));
		Ok(())
	}

	#[test]
	fn module_directives() -> Result<()> {
		let module = Node::new("module")
			.with("name", "demo.app")
			.with("access", "0")
			.child(Node::new("requires").with("module", "java.base").with("access", "32768"))
			.child(Node::new("exports").with("package", "demo.api").with("access", "0").child(Node::new("to").with("module", "demo.client")))
			.child(Node::new("main-class").with("name", "demo.Main"));
		let mut root = class(vec![module]);
		root.attributes.retain(|(name, _)| name != "super");
		for (name, value) in &mut root.attributes {
			if name == "access" {
				*value = "32768".to_owned();
			}
		}
		let model = parse(&Document::new(root))?;

		let module = model.module.expect("a module");
		assert_eq!(module.name, "demo.app");
		assert_eq!(module.requires[0].module, "java.base");
		assert_eq!(module.exports[0].package, "demo/api");
		assert_eq!(module.exports[0].to, vec!["demo.client".to_owned()]);
		assert_eq!(module.main_class.as_deref(), Some("demo/Main"));

		let broken = class(vec![Node::new("module").with("name", "m").with("access", "0").child(Node::new("requires-all"))]);
		assert!(matches!(kind(broken), Some(CodecError::UnrecognizedNodeKind { .. })));
		Ok(())
	}

	#[test]
	fn bad_numbers() {
		let mut node = class(vec![]);
		node.attributes[2].1 = "-1".to_owned();
		assert!(matches!(kind(node), Some(CodecError::MalformedValue { .. })));
	}

	#[test]
	fn duplicate_annotation_property() {
		let property = || Node::new("property")
			.with("name", "value")
			.child(Node::new("value").with("type", "int").with("data", "00000001"));
		let annotation = Node::new("annotation")
			.with("descriptor", "Ldemo/Tag;")
			.with("visibility", "runtime")
			.child(property())
			.child(property());
		assert!(matches!(kind(class(vec![annotation])), Some(CodecError::InvalidClassStructure(_))));
	}
}
