//! The failures of translating one class.
//!
//! All of them are raised as [`anyhow::Error`]s wrapping a [`CodecError`], with context layers naming the class and
//! member they happened in. Use [`kind`] to find out which one it was.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
	#[error("unsupported operand type {tag:?}")]
	UnsupportedOperandType { tag: String },
	#[error("malformed {tag} value {data:?}: {reason}")]
	MalformedValue { tag: String, data: String, reason: String },
	#[error("malformed control flow: {0}")]
	MalformedControlFlow(String),
	#[error("invalid class structure: {0}")]
	InvalidClassStructure(String),
	#[error("unrecognized node kind {kind:?} in {parent:?}")]
	UnrecognizedNodeKind { kind: String, parent: String },
	#[error("node {node:?} is missing required {child}")]
	MissingRequiredChild { node: String, child: String },
	#[error("unsupported schema version {0:?}")]
	UnsupportedSchemaVersion(String),
	#[error("failed to escape or unescape name {name:?}: {reason}")]
	NameEscapingFailure { name: String, reason: String },
}

impl CodecError {
	/// A short stable name of the variant, as used in reports.
	pub fn name(&self) -> &'static str {
		match self {
			CodecError::UnsupportedOperandType { .. } => "UnsupportedOperandType",
			CodecError::MalformedValue { .. } => "MalformedValue",
			CodecError::MalformedControlFlow(_) => "MalformedControlFlow",
			CodecError::InvalidClassStructure(_) => "InvalidClassStructure",
			CodecError::UnrecognizedNodeKind { .. } => "UnrecognizedNodeKind",
			CodecError::MissingRequiredChild { .. } => "MissingRequiredChild",
			CodecError::UnsupportedSchemaVersion(_) => "UnsupportedSchemaVersion",
			CodecError::NameEscapingFailure { .. } => "NameEscapingFailure",
		}
	}
}

/// Finds the [`CodecError`] somewhere in the chain of an error.
///
/// Returns [`None`] for failures of the binary layer, or of I/O.
pub fn kind(error: &anyhow::Error) -> Option<&CodecError> {
	error.chain().find_map(|e| e.downcast_ref::<CodecError>())
}

pub(crate) fn invalid(message: impl Into<String>) -> CodecError {
	CodecError::InvalidClassStructure(message.into())
}

pub(crate) fn missing(node: &str, child: impl Into<String>) -> CodecError {
	CodecError::MissingRequiredChild { node: node.to_owned(), child: child.into() }
}

#[cfg(test)]
mod testing {
	use anyhow::{anyhow, Context, Result};
	use pretty_assertions::assert_eq;
	use super::CodecError;

	#[test]
	fn kind_is_found_through_context() {
		let result: Result<()> = Err(CodecError::MalformedControlFlow("jump to nowhere".to_owned()).into());
		let error = result
			.context("in method \"a()V\"")
			.with_context(|| anyhow!("in class {:?}", "demo/A"))
			.unwrap_err();

		assert_eq!(super::kind(&error), Some(&CodecError::MalformedControlFlow("jump to nowhere".to_owned())));
		assert_eq!(super::kind(&error).map(CodecError::name), Some("MalformedControlFlow"));
		assert_eq!(super::kind(&anyhow!("bad magic")), None);
	}
}
