use std::collections::HashMap;
use anyhow::{anyhow, bail, Context, Result};
use crate::constants::access::STATIC;
use crate::constants::opcode::*;
use crate::descriptor;
use crate::event::{Insn, Label, LocalVariable};
use super::code::Item;

/// The change in operand stack size (in slots) for an instruction without operands.
pub(super) fn simple_effect(opcode: u8) -> Option<i32> {
	Some(match opcode {
		NOP => 0,
		ACONST_NULL | ICONST_M1..=ICONST_5 | FCONST_0..=FCONST_2 => 1,
		LCONST_0 | LCONST_1 | DCONST_0 | DCONST_1 => 2,
		LALOAD | DALOAD => 0,
		IALOAD..=SALOAD => -1,
		LASTORE | DASTORE => -4,
		IASTORE..=SASTORE => -3,
		POP => -1,
		POP2 => -2,
		DUP | DUP_X1 | DUP_X2 => 1,
		DUP2 | DUP2_X1 | DUP2_X2 => 2,
		SWAP => 0,
		// int, long, float, double variants alternate
		IADD..=DREM => if (opcode - IADD) % 2 == 0 { -1 } else { -2 },
		INEG..=DNEG => 0,
		// the six shifts all pop an int, followed by and, or and xor
		ISHL..=LXOR => {
			let i = opcode - ISHL;
			if i < 6 || i % 2 == 0 { -1 } else { -2 }
		},
		I2L..=I2S => {
			const EFFECTS: [i32; 15] = [1, 0, 1, -1, -1, 0, 0, 1, 1, -1, 0, -1, 0, 0, 0];
			EFFECTS[(opcode - I2L) as usize]
		},
		LCMP..=DCMPG => {
			const EFFECTS: [i32; 5] = [-3, -1, -1, -3, -3];
			EFFECTS[(opcode - LCMP) as usize]
		},
		IRETURN | FRETURN | ARETURN => -1,
		LRETURN | DRETURN => -2,
		RETURN => 0,
		ARRAYLENGTH => 0,
		ATHROW => -1,
		MONITORENTER | MONITOREXIT => -1,
		_ => return None,
	})
}

fn stack_effect(insn: &Insn) -> Result<i32> {
	Ok(match insn {
		&Insn::Simple(opcode) => simple_effect(opcode)
			.with_context(|| anyhow!("opcode {opcode:#04x} is not an instruction without operands"))?,
		Insn::Int(NEWARRAY, _) => 0,
		Insn::Int(..) => 1,
		&Insn::Var(opcode, _) => match opcode {
			ILOAD | FLOAD | ALOAD => 1,
			LLOAD | DLOAD => 2,
			ISTORE | FSTORE | ASTORE => -1,
			LSTORE | DSTORE => -2,
			_ => 0,
		},
		Insn::Type(NEW, _) => 1,
		Insn::Type(..) => 0,
		Insn::Field { opcode, descriptor, .. } => {
			let size = descriptor::slots(descriptor) as i32;
			match *opcode {
				GETSTATIC => size,
				PUTSTATIC => -size,
				GETFIELD => size - 1,
				_ => -size - 1,
			}
		},
		Insn::Method { opcode, descriptor, .. } => {
			let arguments = descriptor::argument_slots(descriptor)? as i32;
			let result = descriptor::return_slots(descriptor)? as i32;
			if *opcode == INVOKESTATIC {
				result - arguments
			} else {
				result - arguments - 1
			}
		},
		Insn::InvokeDynamic { descriptor, .. } => {
			descriptor::return_slots(descriptor)? as i32 - descriptor::argument_slots(descriptor)? as i32
		},
		&Insn::Jump(opcode, _) => match opcode {
			GOTO => 0,
			JSR => 1,
			IFEQ..=IFLE | IFNULL | IFNONNULL => -1,
			_ => -2,
		},
		Insn::Ldc(constant) => if constant.is_wide() { 2 } else { 1 },
		Insn::Iinc { .. } => 0,
		Insn::TableSwitch { .. } | Insn::LookupSwitch { .. } => -1,
		Insn::MultiANewArray { dimensions, .. } => 1 - *dimensions as i32,
	})
}

/// Computes the maximum operand stack depth by following all paths through the code.
///
/// Exception handlers start with the caught exception on the stack.
pub(super) fn max_stack(items: &[Item], handlers: &[Label]) -> Result<u16> {
	let positions: HashMap<Label, usize> = items.iter()
		.enumerate()
		.filter_map(|(i, item)| match item {
			Item::Label(label) => Some((*label, i)),
			_ => None,
		})
		.collect();
	let position = |label: Label| positions.get(&label).copied()
		.with_context(|| anyhow!("reference to undefined label {label:?}"));

	let mut visited = vec![false; items.len()];
	let mut work = vec![(0, 0)];
	for &handler in handlers {
		work.push((position(handler)?, 1));
	}

	let mut max = 0;
	while let Some((start, mut depth)) = work.pop() {
		for (item, visited) in items[start..].iter().zip(&mut visited[start..]) {
			if *visited {
				break;
			}
			*visited = true;

			let Item::Insn(insn) = item else { continue };

			let after = depth + stack_effect(insn)?;
			if after < 0 {
				bail!("operand stack underflow at {insn:?}");
			}
			max = max.max(depth).max(after);

			for target in insn.targets() {
				work.push((position(target)?, after));
			}
			if ends_block(insn.opcode()) {
				break;
			}
			// returning from a subroutine leaves the stack as before the jsr
			if insn.opcode() != JSR {
				depth = after;
			}
		}
	}

	u16::try_from(max).with_context(|| anyhow!("max stack of {max} is too large"))
}

/// Computes the number of local variable slots used by the arguments, the instructions and the debug information.
pub(super) fn max_locals(access: u16, descriptor: &str, items: &[Item], local_variables: &[LocalVariable]) -> Result<u16> {
	let this = if access & STATIC == 0 { 1 } else { 0 };
	let mut max = descriptor::argument_slots(descriptor)? + this;

	for item in items {
		let end = match *item {
			Item::Insn(Insn::Var(opcode, var)) => {
				var as usize + if matches!(opcode, LLOAD | DLOAD | LSTORE | DSTORE) { 2 } else { 1 }
			},
			Item::Insn(Insn::Iinc { var, .. }) => var as usize + 1,
			_ => continue,
		};
		max = max.max(end);
	}
	for local_variable in local_variables {
		max = max.max(local_variable.index as usize + descriptor::slots(&local_variable.descriptor));
	}

	u16::try_from(max).with_context(|| anyhow!("max locals of {max} is too large"))
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::constants::{access, opcode::*};
	use crate::event::{Insn, Label};
	use super::super::code::Item;

	fn insn(insn: Insn) -> Item {
		Item::Insn(insn)
	}

	#[test]
	fn straight_line() -> Result<()> {
		let items = [
			insn(Insn::Int(BIPUSH, 5)),
			insn(Insn::Int(BIPUSH, 7)),
			insn(Insn::Simple(IADD)),
			insn(Insn::Simple(IRETURN)),
		];
		assert_eq!(super::max_stack(&items, &[])?, 2);
		assert_eq!(super::max_locals(access::STATIC, "()I", &items, &[])?, 0);
		assert_eq!(super::max_locals(0, "(JI)I", &items, &[])?, 4);
		Ok(())
	}

	#[test]
	fn branches_and_handlers() -> Result<()> {
		let items = [
			Item::Label(Label(0)),
			insn(Insn::Var(ILOAD, 0)),
			insn(Insn::Jump(IFEQ, Label(1))),
			insn(Insn::Ldc(crate::event::Constant::Long(1))),
			insn(Insn::Simple(LCONST_1)),
			insn(Insn::Simple(IADD + 1)), // ladd
			insn(Insn::Simple(POP2)),
			Item::Label(Label(1)),
			insn(Insn::Simple(RETURN)),
			Item::Label(Label(2)),
			insn(Insn::Simple(ATHROW)),
		];
		assert_eq!(super::max_stack(&items, &[Label(2)])?, 4);
		assert_eq!(super::max_locals(access::STATIC, "(I)V", &items, &[])?, 1);
		Ok(())
	}

	#[test]
	fn underflow() {
		let items = [insn(Insn::Simple(POP)), insn(Insn::Simple(RETURN))];
		assert!(super::max_stack(&items, &[]).is_err());
	}
}
