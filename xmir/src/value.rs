//! The typed value codec.
//!
//! Every operand is written as a `value` node with a `type` attribute and, for scalars, a `data` attribute. The data is
//! fixed width upper case hex: two digits for `bool` and `byte`, four for `short` and `char`, eight for `int` and
//! `float`, sixteen for `long` and `double`. Floating point values are written as their raw bits, so all NaNs and
//! negative zero survive. Strings, class names and method types are written as the hex of their modified UTF-8 bytes.
//! Labels are written by their name. Handles, dynamic constants and arrays have child `value` nodes instead of data.

use std::fmt::Write;
use anyhow::{anyhow, bail, Context, Result};
use java_string::{JavaStr, JavaString};
use crate::document::Node;
use crate::error::{missing, CodecError};
use crate::labels::LabelId;
use crate::model::{Dynamic, Handle, Operand};

pub const NODE: &str = "value";

/// The type tag of an operand.
pub fn tag(operand: &Operand) -> &'static str {
	match operand {
		Operand::None => "none",
		Operand::Bool(_) => "bool",
		Operand::Byte(_) => "byte",
		Operand::Short(_) => "short",
		Operand::Char(_) => "char",
		Operand::Int(_) => "int",
		Operand::Long(_) => "long",
		Operand::Float(_) => "float",
		Operand::Double(_) => "double",
		Operand::String(_) => "string",
		Operand::Class(_) => "class",
		Operand::MethodType(_) => "method-type",
		Operand::Label(_) => "label",
		Operand::Handle(_) => "handle",
		Operand::Dynamic(_) => "dynamic",
		Operand::Array(_) => "array",
	}
}

fn hex(bytes: &[u8]) -> String {
	let mut s = String::with_capacity(bytes.len() * 2);
	for byte in bytes {
		// writing to a String can't fail
		let _ = write!(s, "{byte:02X}");
	}
	s
}

/// The text form of a scalar operand, or [`None`] for the operands that don't have one.
pub fn encode(operand: &Operand) -> Option<String> {
	match operand {
		Operand::None => None,
		&Operand::Bool(v) => Some(format!("{:02X}", v as u8)),
		&Operand::Byte(v) => Some(format!("{:02X}", v as u8)),
		&Operand::Short(v) => Some(format!("{:04X}", v as u16)),
		&Operand::Char(v) => Some(format!("{v:04X}")),
		&Operand::Int(v) => Some(format!("{:08X}", v as u32)),
		&Operand::Long(v) => Some(format!("{:016X}", v as u64)),
		&Operand::Float(v) => Some(format!("{:08X}", v.to_bits())),
		&Operand::Double(v) => Some(format!("{:016X}", v.to_bits())),
		Operand::String(v) => Some(hex(&v.to_modified_utf8())),
		Operand::Class(v) | Operand::MethodType(v) => Some(hex(&JavaStr::from_str(v).to_modified_utf8())),
		Operand::Label(v) => Some(v.to_string()),
		Operand::Handle(_) | Operand::Dynamic(_) | Operand::Array(_) => None,
	}
}

fn malformed(tag: &str, data: &str, reason: impl Into<String>) -> CodecError {
	CodecError::MalformedValue { tag: tag.to_owned(), data: data.to_owned(), reason: reason.into() }
}

fn unhex(tag: &str, data: &str, width: usize) -> Result<u64, CodecError> {
	if data.len() != width {
		return Err(malformed(tag, data, format!("expected {width} hex digits, got {}", data.len())));
	}
	if !data.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(malformed(tag, data, "expected hex digits"));
	}
	u64::from_str_radix(data, 16).map_err(|e| malformed(tag, data, e.to_string()))
}

fn unhex_bytes(tag: &str, data: &str) -> Result<Vec<u8>, CodecError> {
	if data.len() % 2 != 0 {
		return Err(malformed(tag, data, "odd number of hex digits"));
	}
	if !data.bytes().all(|b| b.is_ascii_hexdigit()) {
		return Err(malformed(tag, data, "expected hex digits"));
	}
	(0..data.len())
		.step_by(2)
		.map(|i| u8::from_str_radix(&data[i..i + 2], 16).map_err(|e| malformed(tag, data, e.to_string())))
		.collect()
}

fn java_string(tag: &str, data: &str) -> Result<JavaString, CodecError> {
	JavaString::from_modified_utf8(unhex_bytes(tag, data)?)
		.map_err(|_| malformed(tag, data, "invalid modified utf8"))
}

fn string(tag: &str, data: &str) -> Result<String, CodecError> {
	java_string(tag, data)?
		.into_string()
		.map_err(|_| malformed(tag, data, "contains an unpaired surrogate"))
}

/// Decodes a scalar operand from its type tag and text form.
///
/// Fails with [`CodecError::UnsupportedOperandType`] for unknown tags, and for the tags that need child nodes.
pub fn decode(tag: &str, data: Option<&str>) -> Result<Operand, CodecError> {
	let needs_data = || data.ok_or_else(|| missing(NODE, format!("attribute \"data\" for type {tag:?}")));
	Ok(match tag {
		"none" => match data {
			None => Operand::None,
			Some(data) => return Err(malformed(tag, data, "none has no data")),
		},
		"bool" => {
			let data = needs_data()?;
			match unhex(tag, data, 2)? {
				0 => Operand::Bool(false),
				1 => Operand::Bool(true),
				_ => return Err(malformed(tag, data, "expected 00 or 01")),
			}
		},
		"byte" => Operand::Byte(unhex(tag, needs_data()?, 2)? as u8 as i8),
		"short" => Operand::Short(unhex(tag, needs_data()?, 4)? as u16 as i16),
		"char" => Operand::Char(unhex(tag, needs_data()?, 4)? as u16),
		"int" => Operand::Int(unhex(tag, needs_data()?, 8)? as u32 as i32),
		"long" => Operand::Long(unhex(tag, needs_data()?, 16)? as i64),
		"float" => Operand::Float(f32::from_bits(unhex(tag, needs_data()?, 8)? as u32)),
		"double" => Operand::Double(f64::from_bits(unhex(tag, needs_data()?, 16)?)),
		"string" => Operand::String(java_string(tag, needs_data()?)?),
		"class" => Operand::Class(string(tag, needs_data()?)?),
		"method-type" => Operand::MethodType(string(tag, needs_data()?)?),
		"label" => Operand::Label(needs_data()?.parse::<LabelId>()?),
		_ => return Err(CodecError::UnsupportedOperandType { tag: tag.to_owned() }),
	})
}

/// Writes an operand as a `value` node.
pub fn to_node(operand: &Operand) -> Node {
	let node = Node::new(NODE).with("type", tag(operand));
	match operand {
		Operand::Handle(handle) => handle_children(node, handle),
		Operand::Dynamic(dynamic) => node
			.child(to_node(&Operand::String(JavaString::from(dynamic.name.as_str()))))
			.child(to_node(&Operand::String(JavaString::from(dynamic.descriptor.as_str()))))
			.child(handle_children(Node::new(NODE).with("type", "handle"), &dynamic.bootstrap))
			.child(to_node(&Operand::Array(dynamic.arguments.clone()))),
		Operand::Array(values) => values.iter().fold(node, |node, value| node.child(to_node(value))),
		operand => node.with_optional("data", encode(operand)),
	}
}

fn handle_children(node: Node, handle: &Handle) -> Node {
	node
		.child(to_node(&Operand::Int(handle.kind as i32)))
		.child(to_node(&Operand::Class(handle.owner.clone())))
		.child(to_node(&Operand::String(JavaString::from(handle.name.as_str()))))
		.child(to_node(&Operand::String(JavaString::from(handle.descriptor.as_str()))))
		.child(to_node(&Operand::Bool(handle.interface)))
}

/// The child `value` nodes of a node, rejecting anything else that isn't metadata.
pub fn value_children(node: &Node) -> Result<Vec<&Node>> {
	node.elements()
		.map(|child| {
			if child.kind == NODE {
				Ok(child)
			} else {
				Err(anyhow!(CodecError::UnrecognizedNodeKind { kind: child.kind.clone(), parent: node.kind.clone() }))
			}
		})
		.collect()
}

fn component<'a>(children: &[&'a Node], index: usize, tag: &str, what: &str) -> Result<&'a Node> {
	children.get(index).copied().ok_or_else(|| anyhow!(missing(NODE, format!("{what} of {tag}"))))
}

fn expect_string(node: &Node, tag: &str, what: &str) -> Result<String> {
	match from_node(node)? {
		Operand::String(s) => s.into_string().map_err(|_| anyhow!(malformed(tag, what, "contains an unpaired surrogate"))),
		operand => bail!(malformed(tag, what, format!("expected a string, got {}", self::tag(&operand)))),
	}
}

fn handle_from_children(node: &Node, tag: &str) -> Result<Handle> {
	let children = value_children(node)?;
	if children.len() > 5 {
		bail!(malformed(tag, "", format!("expected 5 components, got {}", children.len())));
	}
	let kind = match from_node(component(&children, 0, tag, "kind")?)? {
		Operand::Int(kind @ 1..=9) => kind as u8,
		operand => bail!(malformed(tag, "kind", format!("expected an int from 1 to 9, got {operand:?}"))),
	};
	let owner = match from_node(component(&children, 1, tag, "owner")?)? {
		Operand::Class(owner) => owner,
		operand => bail!(malformed(tag, "owner", format!("expected a class, got {}", self::tag(&operand)))),
	};
	let name = expect_string(component(&children, 2, tag, "name")?, tag, "name")?;
	let descriptor = expect_string(component(&children, 3, tag, "descriptor")?, tag, "descriptor")?;
	let interface = match from_node(component(&children, 4, tag, "interface")?)? {
		Operand::Bool(interface) => interface,
		operand => bail!(malformed(tag, "interface", format!("expected a bool, got {}", self::tag(&operand)))),
	};
	Ok(Handle { kind, owner, name, descriptor, interface })
}

/// Reads an operand from a `value` node.
pub fn from_node(node: &Node) -> Result<Operand> {
	if node.kind != NODE {
		bail!(CodecError::UnrecognizedNodeKind { kind: node.kind.clone(), parent: "operand".to_owned() });
	}
	let tag = node.required("type")?;
	Ok(match tag {
		"handle" => Operand::Handle(handle_from_children(node, tag)?),
		"dynamic" => {
			let children = value_children(node)?;
			if children.len() > 4 {
				bail!(malformed(tag, "", format!("expected 4 components, got {}", children.len())));
			}
			let name = expect_string(component(&children, 0, tag, "name")?, tag, "name")?;
			let descriptor = expect_string(component(&children, 1, tag, "descriptor")?, tag, "descriptor")?;
			let bootstrap = component(&children, 2, tag, "bootstrap method")?;
			if bootstrap.attribute("type") != Some("handle") {
				bail!(malformed(tag, "bootstrap method", "expected a handle"));
			}
			let bootstrap = handle_from_children(bootstrap, tag)?;
			let arguments = match from_node(component(&children, 3, tag, "arguments")?)? {
				Operand::Array(arguments) => arguments,
				operand => bail!(malformed(tag, "arguments", format!("expected an array, got {}", self::tag(&operand)))),
			};
			Operand::Dynamic(Box::new(Dynamic { name, descriptor, bootstrap, arguments }))
		},
		"array" => Operand::Array(value_children(node)?
			.into_iter()
			.enumerate()
			.map(|(index, child)| from_node(child).with_context(|| anyhow!("in array element {index}")))
			.collect::<Result<_>>()?),
		tag => decode(tag, node.attribute("data"))?,
	})
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaString;
	use pretty_assertions::assert_eq;
	use crate::error::{self, CodecError};
	use crate::labels::LabelId;
	use crate::model::{Dynamic, Handle, Operand};
	use super::{decode, encode, from_node, to_node};

	#[test]
	fn fixed_width_hex() {
		assert_eq!(encode(&Operand::Int(0)), Some("00000000".to_owned()));
		assert_eq!(encode(&Operand::Int(-1)), Some("FFFFFFFF".to_owned()));
		assert_eq!(encode(&Operand::Byte(-2)), Some("FE".to_owned()));
		assert_eq!(encode(&Operand::Short(0x1234)), Some("1234".to_owned()));
		assert_eq!(encode(&Operand::Char('A' as u16)), Some("0041".to_owned()));
		assert_eq!(encode(&Operand::Long(1)), Some("0000000000000001".to_owned()));
		assert_eq!(encode(&Operand::Float(1.0)), Some("3F800000".to_owned()));
		assert_eq!(encode(&Operand::Double(-0.0)), Some("8000000000000000".to_owned()));
		assert_eq!(encode(&Operand::Bool(true)), Some("01".to_owned()));
		assert_eq!(encode(&Operand::None), None);
	}

	#[test]
	fn zero_is_not_absence() -> Result<()> {
		assert_eq!(decode("int", Some("00000000"))?, Operand::Int(0));
		assert_eq!(decode("none", None)?, Operand::None);
		Ok(())
	}

	#[test]
	fn strings_are_modified_utf8() -> Result<()> {
		let s = Operand::String(JavaString::from("a\0\u{10000}"));
		assert_eq!(encode(&s), Some("61C080EDA080EDB080".to_owned()));
		assert_eq!(decode("string", Some("61C080EDA080EDB080"))?, s);
		assert_eq!(decode("class", Some("6A6176612F6C616E672F4F626A656374"))?, Operand::Class("java/lang/Object".to_owned()));
		Ok(())
	}

	#[test]
	fn scalars_survive() -> Result<()> {
		let values = [
			Operand::Bool(false), Operand::Byte(i8::MIN), Operand::Short(i16::MAX), Operand::Char(u16::MAX),
			Operand::Int(i32::MIN), Operand::Long(i64::MAX), Operand::Float(f32::MIN_POSITIVE), Operand::Double(f64::MAX),
			Operand::Float(f32::INFINITY), Operand::String(JavaString::new()), Operand::MethodType("(I)V".to_owned()),
			Operand::Label(LabelId(12)),
		];
		for value in values {
			assert_eq!(decode(super::tag(&value), encode(&value).as_deref())?, value);
		}

		let nan = decode("float", encode(&Operand::Float(f32::from_bits(0x7fc0_0001))).as_deref())?;
		assert!(matches!(nan, Operand::Float(f) if f.to_bits() == 0x7fc0_0001));
		Ok(())
	}

	#[test]
	fn composite_values() -> Result<()> {
		let handle = Handle {
			kind: 6,
			owner: "java/lang/invoke/LambdaMetafactory".to_owned(),
			name: "metafactory".to_owned(),
			descriptor: "()V".to_owned(),
			interface: false,
		};
		let value = Operand::Array(vec![
			Operand::Handle(handle.clone()),
			Operand::Dynamic(Box::new(Dynamic {
				name: "_".to_owned(),
				descriptor: "I".to_owned(),
				bootstrap: handle,
				arguments: vec![Operand::Int(3), Operand::Array(vec![])],
			})),
			Operand::None,
		]);
		assert_eq!(from_node(&to_node(&value))?, value);
		Ok(())
	}

	#[test]
	fn failures() {
		assert_eq!(decode("quad", Some("00")), Err(CodecError::UnsupportedOperandType { tag: "quad".to_owned() }));
		assert!(matches!(decode("int", Some("0")), Err(CodecError::MalformedValue { .. })));
		assert!(matches!(decode("int", Some("0000000G")), Err(CodecError::MalformedValue { .. })));
		assert!(matches!(decode("int", Some("+0000000")), Err(CodecError::MalformedValue { .. })));
		assert!(matches!(decode("bool", Some("02")), Err(CodecError::MalformedValue { .. })));
		assert!(matches!(decode("string", Some("ABC")), Err(CodecError::MalformedValue { .. })));
		assert!(matches!(decode("label", Some("X1")), Err(CodecError::MalformedValue { .. })));
		assert!(matches!(decode("int", None), Err(CodecError::MissingRequiredChild { .. })));

		let handle = crate::document::Node::new("value").with("type", "handle").child(to_node(&Operand::Int(6)));
		let error = from_node(&handle).unwrap_err();
		assert!(matches!(error::kind(&error), Some(CodecError::MissingRequiredChild { .. })));
	}
}
