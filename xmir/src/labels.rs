//! Symbolic jump targets.
//!
//! Labels are plain per-method ids. A method's entry list defines each label it uses exactly once, by a
//! [`MethodEntry::Label`], and everything else (jumps, switches, try/catch ranges, frames, line markers, local
//! variable ranges) only refers to them.

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use anyhow::{bail, Result};
use cafe::constants::opcode;
use crate::error::CodecError;
use crate::model::{FrameValue, Instruction, LocalVariable, MethodEntry, Operand, TypeAnnotation};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl Display for LabelId {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "L{}", self.0)
	}
}

impl FromStr for LabelId {
	type Err = CodecError;

	/// Parses the canonical form `L<n>`, without leading zeros.
	fn from_str(s: &str) -> Result<LabelId, CodecError> {
		let malformed = |reason: &str| CodecError::MalformedValue {
			tag: "label".to_owned(),
			data: s.to_owned(),
			reason: reason.to_owned(),
		};

		let digits = s.strip_prefix('L').ok_or_else(|| malformed("doesn't start with `L`"))?;
		if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
			return Err(malformed("expected decimal digits after `L`"));
		}
		if digits.len() > 1 && digits.starts_with('0') {
			return Err(malformed("leading zeros are not allowed"));
		}
		digits.parse().map(LabelId).map_err(|_| malformed("label id out of range"))
	}
}

/// Hands out fresh labels for one method, on demand.
#[derive(Debug, Default)]
pub struct LabelAllocator {
	next: u32,
}

impl LabelAllocator {
	pub fn new() -> LabelAllocator {
		LabelAllocator::default()
	}

	pub fn fresh(&mut self) -> LabelId {
		let id = LabelId(self.next);
		self.next += 1;
		id
	}
}

/// Maps the labels of some other numbering to fresh [`LabelId`]s, in the order they're first seen.
#[derive(Debug)]
pub(crate) struct LabelMap<K> {
	allocator: LabelAllocator,
	map: HashMap<K, LabelId>,
}

impl<K> Default for LabelMap<K> {
	fn default() -> Self {
		LabelMap { allocator: LabelAllocator::new(), map: HashMap::new() }
	}
}

impl<K: std::hash::Hash + Eq> LabelMap<K> {
	pub(crate) fn get(&mut self, key: K) -> LabelId {
		*self.map.entry(key).or_insert_with(|| self.allocator.fresh())
	}
}

fn malformed(message: String) -> CodecError {
	CodecError::MalformedControlFlow(message)
}

fn label_operand(instruction: &Instruction, operand: &Operand) -> Result<LabelId> {
	match operand {
		&Operand::Label(label) => Ok(label),
		operand => bail!(malformed(format!("{} needs a label as jump target, got {operand:?}", instruction.mnemonic()))),
	}
}

fn label_array(instruction: &Instruction, operand: &Operand) -> Result<Vec<LabelId>> {
	match operand {
		Operand::Array(labels) => labels.iter().map(|label| label_operand(instruction, label)).collect(),
		operand => bail!(malformed(format!("{} needs an array of labels as jump targets, got {operand:?}", instruction.mnemonic()))),
	}
}

/// The labels an instruction may jump to.
///
/// Fails with [`CodecError::MalformedControlFlow`] if a jump or switch doesn't carry labels where it needs them.
pub fn jump_targets(instruction: &Instruction) -> Result<Vec<LabelId>> {
	let operands = instruction.operands.as_slice();
	Ok(match instruction.opcode {
		op if opcode::is_jump(op) => match operands {
			[target] => vec![label_operand(instruction, target)?],
			_ => bail!(malformed(format!("{} needs exactly one jump target, got {} operands", instruction.mnemonic(), operands.len()))),
		},
		opcode::TABLESWITCH => match operands {
			[_, _, default, labels] => {
				let mut targets = vec![label_operand(instruction, default)?];
				targets.extend(label_array(instruction, labels)?);
				targets
			},
			_ => bail!(malformed(format!("tableswitch needs low, high, default and labels, got {} operands", operands.len()))),
		},
		opcode::LOOKUPSWITCH => match operands {
			[default, _, labels] => {
				let mut targets = vec![label_operand(instruction, default)?];
				targets.extend(label_array(instruction, labels)?);
				targets
			},
			_ => bail!(malformed(format!("lookupswitch needs default, keys and labels, got {} operands", operands.len()))),
		},
		_ => Vec::new(),
	})
}

/// All label references of a method body, each with a description of where it's used.
pub fn references(
	entries: &[MethodEntry],
	local_variables: &[LocalVariable],
	type_annotations: &[TypeAnnotation],
) -> Result<Vec<(LabelId, String)>> {
	let mut references = Vec::new();
	for entry in entries {
		match entry {
			MethodEntry::Instruction(instruction) => {
				for target in jump_targets(instruction)? {
					references.push((target, instruction.mnemonic().to_owned()));
				}
			},
			MethodEntry::Label(_) => {},
			MethodEntry::TryCatch(try_catch) => {
				references.push((try_catch.start, "try-catch start".to_owned()));
				references.push((try_catch.end, "try-catch end".to_owned()));
				references.push((try_catch.handler, "try-catch handler".to_owned()));
			},
			MethodEntry::Frame(frame) => {
				for value in frame.locals.iter().chain(&frame.stack) {
					if let &FrameValue::Uninitialized(label) = value {
						references.push((label, "frame".to_owned()));
					}
				}
			},
			MethodEntry::LineMarker(line) => references.push((line.label, format!("line {}", line.line))),
		}
	}
	for local_variable in local_variables {
		references.push((local_variable.start, format!("local variable {:?}", local_variable.name)));
		references.push((local_variable.end, format!("local variable {:?}", local_variable.name)));
	}
	for annotation in type_annotations {
		let usage = || format!("type annotation {:?}", annotation.annotation.descriptor);
		match &annotation.target {
			cafe::TypeTarget::LocalVariable(ranges) => {
				for range in ranges {
					references.push((range.start, usage()));
					references.push((range.end, usage()));
				}
			},
			&cafe::TypeTarget::Offset(label) | &cafe::TypeTarget::TypeArgument { offset: label, .. } => references.push((label, usage())),
			_ => {},
		}
	}
	Ok(references)
}

/// The labels defined in a method body. Fails if one is defined twice.
pub fn definitions(entries: &[MethodEntry]) -> Result<HashSet<LabelId>> {
	let mut defined = HashSet::new();
	for entry in entries {
		if let &MethodEntry::Label(label) = entry {
			if !defined.insert(label) {
				bail!(malformed(format!("label {label} is defined more than once")));
			}
		}
	}
	Ok(defined)
}

/// Checks that every label used in a method body is defined exactly once in it.
pub fn validate(entries: &[MethodEntry], local_variables: &[LocalVariable], type_annotations: &[TypeAnnotation]) -> Result<()> {
	let defined = definitions(entries)?;
	for (label, usage) in references(entries, local_variables, type_annotations)? {
		if !defined.contains(&label) {
			bail!(malformed(format!("{usage} refers to undefined label {label}")));
		}
	}
	Ok(())
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use indexmap::IndexMap;
	use cafe::constants::{opcode, type_target};
	use cafe::TypeTarget;
	use crate::error::{self, CodecError};
	use crate::model::{Annotation, Instruction, LineMarker, MethodEntry, Operand, TryCatch, TypeAnnotation, Visibility};
	use super::{LabelAllocator, LabelId, LabelMap};

	#[test]
	fn label_names() -> Result<()> {
		assert_eq!("L0".parse::<LabelId>()?, LabelId(0));
		assert_eq!("L120".parse::<LabelId>()?, LabelId(120));
		assert_eq!(LabelId(7).to_string(), "L7");
		for bad in ["", "L", "7", "L07", "l1", "L-1", "L+1", "L1a", "L99999999999"] {
			assert!(bad.parse::<LabelId>().is_err(), "{bad:?} should be rejected");
		}
		Ok(())
	}

	#[test]
	fn fresh_labels() {
		let mut allocator = LabelAllocator::new();
		assert_eq!(allocator.fresh(), LabelId(0));
		assert_eq!(allocator.fresh(), LabelId(1));

		let mut map = LabelMap::default();
		assert_eq!(map.get(17), LabelId(0));
		assert_eq!(map.get(3), LabelId(1));
		assert_eq!(map.get(17), LabelId(0));
	}

	fn jump(target: Operand) -> MethodEntry {
		MethodEntry::Instruction(Instruction::new(opcode::GOTO, vec![target]))
	}

	#[test]
	fn undefined_jump_target() {
		let entries = [jump(Operand::Label(LabelId(3))), MethodEntry::Label(LabelId(2))];
		let error = super::validate(&entries, &[], &[]).unwrap_err();
		assert!(matches!(error::kind(&error), Some(CodecError::MalformedControlFlow(_))));
	}

	#[test]
	fn jump_without_label() {
		let entries = [jump(Operand::Int(3))];
		let error = super::validate(&entries, &[], &[]).unwrap_err();
		assert!(matches!(error::kind(&error), Some(CodecError::MalformedControlFlow(_))));
	}

	#[test]
	fn undefined_handler() {
		let entries = [
			MethodEntry::TryCatch(TryCatch { start: LabelId(0), end: LabelId(1), handler: LabelId(2), catch_type: None }),
			MethodEntry::Label(LabelId(0)),
			MethodEntry::Instruction(Instruction::new(opcode::NOP, Vec::new())),
			MethodEntry::Label(LabelId(1)),
			MethodEntry::Instruction(Instruction::new(opcode::RETURN, Vec::new())),
		];
		let error = super::validate(&entries, &[], &[]).unwrap_err();
		assert!(matches!(error::kind(&error), Some(CodecError::MalformedControlFlow(_))));
	}

	#[test]
	fn type_annotation_labels_are_references() {
		let annotation = TypeAnnotation {
			target_type: type_target::NEW,
			target: TypeTarget::Offset(LabelId(5)),
			path: Vec::new(),
			annotation: Annotation { descriptor: "Ldemo/NonNull;".to_owned(), visibility: Visibility::Class, properties: IndexMap::new() },
		};
		let entries = [MethodEntry::Label(LabelId(0)), MethodEntry::Instruction(Instruction::new(opcode::RETURN, Vec::new()))];
		let error = super::validate(&entries, &[], &[annotation]).unwrap_err();
		assert!(matches!(error::kind(&error), Some(CodecError::MalformedControlFlow(_))));
		assert!(error.to_string().contains("Ldemo/NonNull;"));
	}

	#[test]
	fn duplicate_definition() {
		let entries = [MethodEntry::Label(LabelId(0)), MethodEntry::Label(LabelId(0))];
		assert!(super::validate(&entries, &[], &[]).is_err());
	}

	#[test]
	fn valid_body() -> Result<()> {
		let entries = [
			MethodEntry::Label(LabelId(4)),
			MethodEntry::LineMarker(LineMarker { line: 1, label: LabelId(4) }),
			jump(Operand::Label(LabelId(4))),
		];
		super::validate(&entries, &[], &[])
	}
}
