//! The document tree, and its XML form.
//!
//! A document is a tree of [`Node`]s: each has a kind, ordered attributes and ordered children. The text content of a
//! node is only used by the metadata nodes (see [`METADATA`]); everything structural lives in attributes.

use anyhow::{anyhow, bail, Context, Result};
use xml::reader::{ParserConfig, XmlEvent as ReadEvent};
use xml::writer::{EmitterConfig, XmlEvent as WriteEvent};
use crate::error::{missing, CodecError};

/// Node kinds that only carry information for humans. They're skipped when parsing.
pub const METADATA: [&str; 2] = ["comment", "listing"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
	pub kind: String,
	pub attributes: Vec<(String, String)>,
	pub children: Vec<Node>,
	pub text: Option<String>,
}

impl Node {
	pub fn new(kind: &str) -> Node {
		Node { kind: kind.to_owned(), attributes: Vec::new(), children: Vec::new(), text: None }
	}

	pub fn with(mut self, name: &str, value: impl Into<String>) -> Node {
		self.attributes.push((name.to_owned(), value.into()));
		self
	}

	pub fn with_optional(self, name: &str, value: Option<impl Into<String>>) -> Node {
		match value {
			Some(value) => self.with(name, value),
			None => self,
		}
	}

	pub fn with_text(mut self, text: impl Into<String>) -> Node {
		self.text = Some(text.into());
		self
	}

	pub fn child(mut self, child: Node) -> Node {
		self.children.push(child);
		self
	}

	pub fn push(&mut self, child: Node) {
		self.children.push(child);
	}

	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.attributes.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}

	/// Gets an attribute that this kind of node must have.
	pub fn required(&self, name: &str) -> Result<&str, CodecError> {
		self.attribute(name).ok_or_else(|| missing(&self.kind, format!("attribute {name:?}")))
	}

	pub fn is_metadata(&self) -> bool {
		METADATA.contains(&self.kind.as_str())
	}

	/// The children, without the metadata nodes.
	pub fn elements(&self) -> impl Iterator<Item=&Node> {
		self.children.iter().filter(|node| !node.is_metadata())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
	pub root: Node,
}

impl Document {
	pub fn new(root: Node) -> Document {
		Document { root }
	}

	/// Writes the document as indented XML.
	pub fn to_xml(&self) -> Result<String> {
		let mut out = Vec::new();
		let mut writer = EmitterConfig::new()
			.perform_indent(true)
			.indent_string("  ")
			.create_writer(&mut out);

		fn write_node<W: std::io::Write>(writer: &mut xml::EventWriter<W>, node: &Node) -> Result<()> {
			let mut start = WriteEvent::start_element(node.kind.as_str());
			for (name, value) in &node.attributes {
				start = start.attr(name.as_str(), value.as_str());
			}
			writer.write(start)
				.with_context(|| anyhow!("failed to write start of node {:?}", node.kind))?;
			if let Some(text) = &node.text {
				writer.write(WriteEvent::characters(text))
					.with_context(|| anyhow!("failed to write text of node {:?}", node.kind))?;
			}
			for child in &node.children {
				write_node(writer, child)?;
			}
			writer.write(WriteEvent::end_element())
				.with_context(|| anyhow!("failed to write end of node {:?}", node.kind))?;
			Ok(())
		}

		write_node(&mut writer, &self.root)?;
		drop(writer);

		let mut xml = String::from_utf8(out).context("xml writer produced invalid utf8")?;
		xml.push('\n');
		Ok(xml)
	}

	/// Reads a document from XML. Comments are dropped, and CDATA sections are read as text.
	pub fn from_xml(xml: &str) -> Result<Document> {
		let reader = ParserConfig::new()
			.trim_whitespace(true)
			.ignore_comments(true)
			.cdata_to_characters(true)
			.create_reader(xml.as_bytes());

		let mut stack: Vec<Node> = Vec::new();
		let mut root = None;
		for event in reader {
			match event.context("failed to read xml")? {
				ReadEvent::StartElement { name, attributes, .. } => {
					if root.is_some() {
						bail!("xml contains more than one root node");
					}
					stack.push(Node {
						kind: name.local_name,
						attributes: attributes.into_iter()
							.map(|attribute| (attribute.name.local_name, attribute.value))
							.collect(),
						children: Vec::new(),
						text: None,
					});
				},
				ReadEvent::EndElement { .. } => {
					let node = stack.pop().context("unbalanced end of element")?;
					match stack.last_mut() {
						Some(parent) => parent.children.push(node),
						None => root = Some(node),
					}
				},
				ReadEvent::Characters(text) => {
					if let Some(node) = stack.last_mut() {
						node.text.get_or_insert_with(String::new).push_str(&text);
					}
				},
				_ => {},
			}
		}

		root.map(Document::new).context("xml doesn't contain a root node")
	}
}
