//! Conversion between model instructions and the normalized instructions of the class file layer.
//!
//! The operands of an instruction have a fixed shape per opcode:
//!
//! | opcodes | operands |
//! |---|---|
//! | without operands | none |
//! | `bipush`, `sipush`, `newarray` | `int` |
//! | loads, stores, `ret` | `int` local variable index |
//! | `iinc` | `int` index, `int` increment |
//! | `ldc` | one loadable constant |
//! | `new`, `anewarray`, `checkcast`, `instanceof` | `class` |
//! | field instructions | `class` owner, `string` name, `string` descriptor |
//! | method invocations | `class` owner, `string` name, `string` descriptor, `bool` interface |
//! | `invokedynamic` | `string` name, `string` descriptor, `handle` bootstrap method, `array` of constants |
//! | jumps | `label` |
//! | `tableswitch` | `int` low, `int` high, `label` default, `array` of labels |
//! | `lookupswitch` | `label` default, `array` of `int` keys, `array` of labels |
//! | `multianewarray` | `class`, `int` dimensions |

use anyhow::{anyhow, bail, Result};
use java_string::JavaString;
use cafe::constants::opcode::{self, *};
use cafe::{Constant, ConstantDynamic, Insn, Label};
use crate::error::{invalid, CodecError};
use crate::labels::LabelId;
use crate::model::{Dynamic, Handle, Instruction, Operand};
use crate::value;

fn shape_error(instruction: &Instruction, expected: &str) -> anyhow::Error {
	let got: Vec<_> = instruction.operands.iter().map(value::tag).collect();
	anyhow!(invalid(format!("{} takes {expected}, got [{}]", instruction.mnemonic(), got.join(", "))))
}

fn label(instruction: &Instruction, operand: &Operand) -> Result<Label> {
	match operand {
		Operand::Label(LabelId(id)) => Ok(Label(*id)),
		operand => bail!(CodecError::MalformedControlFlow(
			format!("{} needs a label as jump target, got {}", instruction.mnemonic(), value::tag(operand))
		)),
	}
}

fn labels(instruction: &Instruction, operand: &Operand) -> Result<Vec<Label>> {
	match operand {
		Operand::Array(labels) => labels.iter().map(|l| label(instruction, l)).collect(),
		operand => bail!(CodecError::MalformedControlFlow(
			format!("{} needs an array of labels, got {}", instruction.mnemonic(), value::tag(operand))
		)),
	}
}

fn string(s: &JavaString) -> Result<String> {
	s.clone().into_string().map_err(|_| anyhow!(invalid(format!("name or descriptor {s:?} contains an unpaired surrogate"))))
}

fn handle_to_cafe(handle: &Handle) -> Result<cafe::Handle> {
	if !(1..=9).contains(&handle.kind) {
		bail!(invalid(format!("invalid method handle kind {}", handle.kind)));
	}
	Ok(cafe::Handle {
		kind: handle.kind,
		owner: handle.owner.clone(),
		name: handle.name.clone(),
		descriptor: handle.descriptor.clone(),
		interface: handle.interface,
	})
}

pub(crate) fn handle_from_cafe(handle: cafe::Handle) -> Handle {
	Handle {
		kind: handle.kind,
		owner: handle.owner,
		name: handle.name,
		descriptor: handle.descriptor,
		interface: handle.interface,
	}
}

/// Converts a loadable constant.
///
/// Fails with [`CodecError::UnsupportedOperandType`] for operands that can't be put in the constant pool.
pub(crate) fn to_constant(operand: &Operand) -> Result<Constant> {
	Ok(match operand {
		&Operand::Int(v) => Constant::Integer(v),
		&Operand::Float(v) => Constant::Float(v),
		&Operand::Long(v) => Constant::Long(v),
		&Operand::Double(v) => Constant::Double(v),
		Operand::String(v) => Constant::String(v.clone()),
		Operand::Class(v) => Constant::Class(v.clone()),
		Operand::MethodType(v) => Constant::MethodType(v.clone()),
		Operand::Handle(handle) => Constant::MethodHandle(handle_to_cafe(handle)?),
		Operand::Dynamic(dynamic) => Constant::Dynamic(Box::new(ConstantDynamic {
			name: dynamic.name.clone(),
			descriptor: dynamic.descriptor.clone(),
			bootstrap: handle_to_cafe(&dynamic.bootstrap)?,
			arguments: dynamic.arguments.iter().map(to_constant).collect::<Result<_>>()?,
		})),
		operand => bail!(CodecError::UnsupportedOperandType { tag: value::tag(operand).to_owned() }),
	})
}

pub(crate) fn from_constant(constant: Constant) -> Operand {
	match constant {
		Constant::Integer(v) => Operand::Int(v),
		Constant::Float(v) => Operand::Float(v),
		Constant::Long(v) => Operand::Long(v),
		Constant::Double(v) => Operand::Double(v),
		Constant::String(v) => Operand::String(v),
		Constant::Class(v) => Operand::Class(v),
		Constant::MethodType(v) => Operand::MethodType(v),
		Constant::MethodHandle(handle) => Operand::Handle(handle_from_cafe(handle)),
		Constant::Dynamic(dynamic) => Operand::Dynamic(Box::new(Dynamic {
			name: dynamic.name,
			descriptor: dynamic.descriptor,
			bootstrap: handle_from_cafe(dynamic.bootstrap),
			arguments: dynamic.arguments.into_iter().map(from_constant).collect(),
		})),
	}
}

fn int_in<T: TryFrom<i32>>(instruction: &Instruction, value: i32, what: &str) -> Result<T> {
	T::try_from(value).map_err(|_| anyhow!(invalid(format!("{} {what} {value} is out of range", instruction.mnemonic()))))
}

/// Converts an instruction to the class file layer, checking the shape of its operands.
pub fn to_insn(instruction: &Instruction) -> Result<Insn> {
	let op = instruction.opcode;
	if opcode::name(op).is_none() {
		bail!(invalid(format!("unknown opcode {op:#04x}")));
	}

	Ok(match (op, instruction.operands.as_slice()) {
		(BIPUSH, [Operand::Int(v)]) => Insn::Int(op, int_in::<i8>(instruction, *v, "operand")?.into()),
		(SIPUSH, [Operand::Int(v)]) => Insn::Int(op, int_in::<i16>(instruction, *v, "operand")?.into()),
		(NEWARRAY, [Operand::Int(v)]) => {
			// T_BOOLEAN to T_LONG
			if !(4..=11).contains(v) {
				bail!(invalid(format!("newarray type {v} is out of range")));
			}
			Insn::Int(op, *v)
		},
		(BIPUSH | SIPUSH | NEWARRAY, _) => return Err(shape_error(instruction, "[int]")),

		(ILOAD..=ALOAD | ISTORE..=ASTORE | RET, [Operand::Int(v)]) => Insn::Var(op, int_in(instruction, *v, "local variable")?),
		(ILOAD..=ALOAD | ISTORE..=ASTORE | RET, _) => return Err(shape_error(instruction, "[int]")),

		(IINC, [Operand::Int(var), Operand::Int(increment)]) => Insn::Iinc {
			var: int_in(instruction, *var, "local variable")?,
			increment: int_in(instruction, *increment, "increment")?,
		},
		(IINC, _) => return Err(shape_error(instruction, "[int, int]")),

		(LDC, [constant]) => Insn::Ldc(to_constant(constant)?),
		(LDC, _) => return Err(shape_error(instruction, "one constant")),

		(NEW | ANEWARRAY | CHECKCAST | INSTANCEOF, [Operand::Class(class)]) => Insn::Type(op, class.clone()),
		(NEW | ANEWARRAY | CHECKCAST | INSTANCEOF, _) => return Err(shape_error(instruction, "[class]")),

		(GETSTATIC..=PUTFIELD, [Operand::Class(owner), Operand::String(name), Operand::String(descriptor)]) => Insn::Field {
			opcode: op,
			owner: owner.clone(),
			name: string(name)?,
			descriptor: string(descriptor)?,
		},
		(GETSTATIC..=PUTFIELD, _) => return Err(shape_error(instruction, "[class, string, string]")),

		(INVOKEVIRTUAL..=INVOKEINTERFACE, [Operand::Class(owner), Operand::String(name), Operand::String(descriptor), Operand::Bool(interface)]) => Insn::Method {
			opcode: op,
			owner: owner.clone(),
			name: string(name)?,
			descriptor: string(descriptor)?,
			interface: *interface,
		},
		(INVOKEVIRTUAL..=INVOKEINTERFACE, _) => return Err(shape_error(instruction, "[class, string, string, bool]")),

		(INVOKEDYNAMIC, [Operand::String(name), Operand::String(descriptor), Operand::Handle(bootstrap), Operand::Array(arguments)]) => Insn::InvokeDynamic {
			name: string(name)?,
			descriptor: string(descriptor)?,
			bootstrap: handle_to_cafe(bootstrap)?,
			arguments: arguments.iter().map(to_constant).collect::<Result<_>>()?,
		},
		(INVOKEDYNAMIC, _) => return Err(shape_error(instruction, "[string, string, handle, array]")),

		(op, [target]) if opcode::is_jump(op) => Insn::Jump(op, label(instruction, target)?),
		(op, operands) if opcode::is_jump(op) => bail!(CodecError::MalformedControlFlow(
			format!("{} needs exactly one jump target, got {} operands", instruction.mnemonic(), operands.len())
		)),

		(TABLESWITCH, [Operand::Int(low), Operand::Int(high), default, targets]) => {
			let labels = labels(instruction, targets)?;
			if low > high || (*high as i64 - *low as i64 + 1) as usize != labels.len() {
				bail!(invalid(format!("tableswitch from {low} to {high} can't have {} targets", labels.len())));
			}
			Insn::TableSwitch { low: *low, high: *high, default: label(instruction, default)?, labels }
		},
		(TABLESWITCH, _) => return Err(shape_error(instruction, "[int, int, label, array]")),

		(LOOKUPSWITCH, [default, Operand::Array(keys), targets]) => {
			let labels = labels(instruction, targets)?;
			if keys.len() != labels.len() {
				bail!(invalid(format!("lookupswitch has {} keys but {} targets", keys.len(), labels.len())));
			}
			let pairs = keys.iter()
				.zip(labels)
				.map(|(key, label)| match key {
					&Operand::Int(key) => Ok((key, label)),
					key => Err(anyhow!(invalid(format!("lookupswitch keys must be int, got {}", value::tag(key))))),
				})
				.collect::<Result<_>>()?;
			Insn::LookupSwitch { default: label(instruction, default)?, pairs }
		},
		(LOOKUPSWITCH, _) => return Err(shape_error(instruction, "[label, array, array]")),

		(MULTIANEWARRAY, [Operand::Class(descriptor), Operand::Int(dimensions)]) => Insn::MultiANewArray {
			descriptor: descriptor.clone(),
			dimensions: match int_in::<u8>(instruction, *dimensions, "dimensions")? {
				0 => bail!(invalid("multianewarray needs at least one dimension")),
				dimensions => dimensions,
			},
		},
		(MULTIANEWARRAY, _) => return Err(shape_error(instruction, "[class, int]")),

		(op, []) => Insn::Simple(op),
		(_, _) => return Err(shape_error(instruction, "no operands")),
	})
}

/// Converts an instruction of the class file layer, mapping its labels with `label`.
pub fn from_insn(insn: Insn, mut label: impl FnMut(Label) -> LabelId) -> Instruction {
	let op = insn.opcode();
	let operands = match insn {
		Insn::Simple(_) => Vec::new(),
		Insn::Int(_, v) => vec![Operand::Int(v)],
		Insn::Var(_, var) => vec![Operand::Int(var as i32)],
		Insn::Type(_, class) => vec![Operand::Class(class)],
		Insn::Field { owner, name, descriptor, .. } => vec![
			Operand::Class(owner),
			Operand::String(JavaString::from(name)),
			Operand::String(JavaString::from(descriptor)),
		],
		Insn::Method { owner, name, descriptor, interface, .. } => vec![
			Operand::Class(owner),
			Operand::String(JavaString::from(name)),
			Operand::String(JavaString::from(descriptor)),
			Operand::Bool(interface),
		],
		Insn::InvokeDynamic { name, descriptor, bootstrap, arguments } => vec![
			Operand::String(JavaString::from(name)),
			Operand::String(JavaString::from(descriptor)),
			Operand::Handle(handle_from_cafe(bootstrap)),
			Operand::Array(arguments.into_iter().map(from_constant).collect()),
		],
		Insn::Jump(_, target) => vec![Operand::Label(label(target))],
		Insn::Ldc(constant) => vec![from_constant(constant)],
		Insn::Iinc { var, increment } => vec![Operand::Int(var as i32), Operand::Int(increment as i32)],
		Insn::TableSwitch { low, high, default, labels } => vec![
			Operand::Int(low),
			Operand::Int(high),
			Operand::Label(label(default)),
			Operand::Array(labels.into_iter().map(|l| Operand::Label(label(l))).collect()),
		],
		Insn::LookupSwitch { default, pairs } => {
			let default = Operand::Label(label(default));
			let (keys, labels): (Vec<_>, Vec<_>) = pairs.into_iter()
				.map(|(key, l)| (Operand::Int(key), Operand::Label(label(l))))
				.unzip();
			vec![default, Operand::Array(keys), Operand::Array(labels)]
		},
		Insn::MultiANewArray { descriptor, dimensions } => vec![Operand::Class(descriptor), Operand::Int(dimensions as i32)],
	};
	Instruction::new(op, operands)
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaString;
	use pretty_assertions::assert_eq;
	use cafe::constants::opcode;
	use cafe::{Constant, Insn, Label};
	use crate::error::{self, CodecError};
	use crate::labels::LabelId;
	use crate::model::{Instruction, Operand};
	use super::{from_insn, to_insn};

	fn same_label(label: Label) -> LabelId {
		LabelId(label.0)
	}

	#[test]
	fn instructions_survive() -> Result<()> {
		let insns = [
			Insn::Simple(opcode::IADD),
			Insn::Int(opcode::SIPUSH, -300),
			Insn::Var(opcode::ALOAD, 300),
			Insn::Iinc { var: 2, increment: -1 },
			Insn::Ldc(Constant::String(JavaString::from("hi"))),
			Insn::Ldc(Constant::Class("[I".to_owned())),
			Insn::Type(opcode::NEW, "java/lang/Object".to_owned()),
			Insn::Field { opcode: opcode::GETSTATIC, owner: "a/B".to_owned(), name: "c".to_owned(), descriptor: "I".to_owned() },
			Insn::Method {
				opcode: opcode::INVOKEINTERFACE,
				owner: "java/util/List".to_owned(),
				name: "size".to_owned(),
				descriptor: "()I".to_owned(),
				interface: true,
			},
			Insn::Jump(opcode::IFNULL, Label(3)),
			Insn::TableSwitch { low: -1, high: 0, default: Label(0), labels: vec![Label(1), Label(2)] },
			Insn::LookupSwitch { default: Label(0), pairs: vec![(-5, Label(1)), (100, Label(2))] },
			Insn::MultiANewArray { descriptor: "[[I".to_owned(), dimensions: 2 },
		];
		for insn in insns {
			let instruction = from_insn(insn.clone(), same_label);
			assert_eq!(to_insn(&instruction)?, insn);
		}
		Ok(())
	}

	#[test]
	fn operand_shapes() {
		let invalid = |opcode, operands| {
			let error = to_insn(&Instruction::new(opcode, operands)).unwrap_err();
			error::kind(&error).cloned()
		};

		assert!(matches!(invalid(opcode::IADD, vec![Operand::Int(1)]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(opcode::BIPUSH, vec![]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(opcode::ILOAD, vec![Operand::Int(-1)]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(opcode::BIPUSH, vec![Operand::Int(300)]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(opcode::SIPUSH, vec![Operand::Int(40000)]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(opcode::NEWARRAY, vec![Operand::Int(3)]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(opcode::NEWARRAY, vec![Operand::Int(12)]), Some(CodecError::InvalidClassStructure(_))));
		assert!(to_insn(&Instruction::new(opcode::BIPUSH, vec![Operand::Int(-128)])).is_ok());
		assert!(to_insn(&Instruction::new(opcode::NEWARRAY, vec![Operand::Int(11)])).is_ok());
		assert!(matches!(invalid(opcode::GOTO_W, vec![]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(0xfe, vec![]), Some(CodecError::InvalidClassStructure(_))));
		assert!(matches!(invalid(opcode::GOTO, vec![Operand::Int(1)]), Some(CodecError::MalformedControlFlow(_))));
		assert!(matches!(invalid(opcode::IFEQ, vec![]), Some(CodecError::MalformedControlFlow(_))));
		assert_eq!(invalid(opcode::LDC, vec![Operand::Byte(1)]), Some(CodecError::UnsupportedOperandType { tag: "byte".to_owned() }));
		assert!(matches!(
			invalid(opcode::TABLESWITCH, vec![Operand::Int(0), Operand::Int(1), Operand::Label(LabelId(0)), Operand::Array(vec![])]),
			Some(CodecError::InvalidClassStructure(_))
		));
	}
}
