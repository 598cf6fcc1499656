use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Cursor;
use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use crate::ClassRead;
use crate::constants::{attribute, frame, opcode, verification};
use crate::event::{ClassEvent, ClassSink, CodeEvent, Frame, FrameKind, Insn, Label, LocalVariable, TypeAnnotation, VerificationType};
use crate::reader::labels::Labels;
use crate::reader::pool::PoolRead;

/// A helper trait for reading branch offsets.
trait CodeReadHelper: ClassRead {
	/// Reads a branch offset and returns the target as a label holding the raw offset.
	fn read_i16_as_branch_target(&mut self, opcode_pos: u16) -> Result<Label> {
		let branch = self.read_i16()
			.with_context(|| anyhow!("couldn't read i16 for branch based on opcode {opcode_pos:?}"))?;
		let target = opcode_pos.checked_add_signed(branch)
			.with_context(|| anyhow!("can't add branch offset (i16) of {branch:?} to opcode position (u16) {opcode_pos:?}"))?;
		Ok(Label(target as u32))
	}

	fn read_i32_as_branch_target(&mut self, opcode_pos: u16) -> Result<Label> {
		let branch = self.read_i32()
			.with_context(|| anyhow!("couldn't read i32 for branch based on opcode {opcode_pos:?}"))?;
		let target = (opcode_pos as u32).checked_add_signed(branch)
			.with_context(|| anyhow!("can't add branch offset (i32) of {branch:?} to opcode position (u16) {opcode_pos:?}"))?;
		let target = u16::try_from(target)?;
		Ok(Label(target as u32))
	}
}

impl<T: ClassRead> CodeReadHelper for T {}

/// Skips the padding of `tableswitch` and `lookupswitch`, relative to the start of the code.
fn align_to_4_byte_boundary(reader: &mut impl ClassRead) -> Result<()> {
	let padding = (4 - reader.marker()? % 4) % 4;
	reader.skip(padding as i64)
}

fn decode_instruction(r: &mut Cursor<&[u8]>, pool: &PoolRead, opcode_pos: u16) -> Result<Insn> {
	let insn = match r.read_u8()? {
		opcode @ (opcode::NOP..=opcode::DCONST_1 |
			opcode::IALOAD..=opcode::SALOAD |
			opcode::IASTORE..=opcode::LXOR |
			opcode::I2L..=opcode::DCMPG |
			opcode::IRETURN..=opcode::RETURN |
			opcode::ARRAYLENGTH |
			opcode::ATHROW |
			opcode::MONITORENTER |
			opcode::MONITOREXIT) => Insn::Simple(opcode),
		opcode::BIPUSH => Insn::Int(opcode::BIPUSH, r.read_i8()? as i32),
		opcode::SIPUSH => Insn::Int(opcode::SIPUSH, r.read_i16()? as i32),
		opcode::NEWARRAY => Insn::Int(opcode::NEWARRAY, r.read_u8()? as i32),
		opcode::LDC => Insn::Ldc(pool.get_constant(r.read_u8()? as u16)?),
		opcode::LDC_W | opcode::LDC2_W => Insn::Ldc(pool.get_constant(r.read_u16()?)?),
		opcode @ (opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET) => {
			Insn::Var(opcode, r.read_u8()? as u16)
		},
		opcode @ opcode::ILOAD_0..=opcode::ALOAD_3 => {
			let n = opcode - opcode::ILOAD_0;
			Insn::Var(opcode::ILOAD + n / 4, (n % 4) as u16)
		},
		opcode @ opcode::ISTORE_0..=opcode::ASTORE_3 => {
			let n = opcode - opcode::ISTORE_0;
			Insn::Var(opcode::ISTORE + n / 4, (n % 4) as u16)
		},
		opcode::IINC => Insn::Iinc { var: r.read_u8()? as u16, increment: r.read_i8()? as i16 },
		opcode @ (opcode::IFEQ..=opcode::JSR | opcode::IFNULL | opcode::IFNONNULL) => {
			Insn::Jump(opcode, r.read_i16_as_branch_target(opcode_pos)?)
		},
		opcode::GOTO_W => Insn::Jump(opcode::GOTO, r.read_i32_as_branch_target(opcode_pos)?),
		opcode::JSR_W => Insn::Jump(opcode::JSR, r.read_i32_as_branch_target(opcode_pos)?),
		opcode::TABLESWITCH => {
			align_to_4_byte_boundary(r)?;
			let default = r.read_i32_as_branch_target(opcode_pos)?;
			let low = r.read_i32()?;
			let high = r.read_i32()?;
			if low > high {
				bail!("in tableswitch `low` must be lower or equal to `high`, it's low={low:?} and high={high:?}");
			}
			let n = (high as i64 - low as i64 + 1) as usize;
			let labels = r.read_vec(|_| Ok(n), |r| r.read_i32_as_branch_target(opcode_pos))?;
			Insn::TableSwitch { low, high, default, labels }
		},
		opcode::LOOKUPSWITCH => {
			align_to_4_byte_boundary(r)?;
			let default = r.read_i32_as_branch_target(opcode_pos)?;
			let n = r.read_i32()?;
			if n < 0 {
				bail!("in lookupswitch the `npairs` must be positive, it's npairs={n:?}");
			}
			let pairs = r.read_vec(
				|_| Ok(n as usize),
				|r| Ok((r.read_i32()?, r.read_i32_as_branch_target(opcode_pos)?))
			)?;
			Insn::LookupSwitch { default, pairs }
		},
		opcode @ opcode::GETSTATIC..=opcode::PUTFIELD => {
			let (owner, name, descriptor, _) = pool.get_member_ref(r.read_u16()?)?;
			Insn::Field { opcode, owner, name, descriptor }
		},
		opcode @ opcode::INVOKEVIRTUAL..=opcode::INVOKESTATIC => {
			let (owner, name, descriptor, interface) = pool.get_member_ref(r.read_u16()?)?;
			Insn::Method { opcode, owner, name, descriptor, interface }
		},
		opcode::INVOKEINTERFACE => {
			let (owner, name, descriptor, interface) = pool.get_member_ref(r.read_u16()?)?;
			let _count = r.read_u8()?;
			let _zero = r.read_u8()?;
			Insn::Method { opcode: opcode::INVOKEINTERFACE, owner, name, descriptor, interface }
		},
		opcode::INVOKEDYNAMIC => {
			let (name, descriptor, bootstrap, arguments) = pool.get_invoke_dynamic(r.read_u16()?)?;
			let _zero = r.read_u16()?;
			Insn::InvokeDynamic { name, descriptor, bootstrap, arguments }
		},
		opcode @ (opcode::NEW | opcode::ANEWARRAY | opcode::CHECKCAST | opcode::INSTANCEOF) => {
			Insn::Type(opcode, pool.get_class(r.read_u16()?)?)
		},
		opcode::WIDE => match r.read_u8()? {
			opcode @ (opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET) => {
				Insn::Var(opcode, r.read_u16()?)
			},
			opcode::IINC => Insn::Iinc { var: r.read_u16()?, increment: r.read_i16()? },
			wide_opcode => bail!("unknown wide opcode {wide_opcode:x?}"),
		},
		opcode::MULTIANEWARRAY => Insn::MultiANewArray {
			descriptor: pool.get_class(r.read_u16()?)?,
			dimensions: r.read_u8()?,
		},
		opcode => bail!("unknown opcode {opcode:x?}"),
	};
	Ok(insn)
}

/// Replaces the raw offsets in the labels of an instruction by the numbered labels.
fn resolve_insn(insn: Insn, labels: &Labels) -> Result<Insn> {
	Ok(match insn {
		Insn::Jump(opcode, target) => Insn::Jump(opcode, labels.resolve(target)?),
		Insn::TableSwitch { low, high, default, labels: targets } => Insn::TableSwitch {
			low,
			high,
			default: labels.resolve(default)?,
			labels: targets.into_iter().map(|l| labels.resolve(l)).collect::<Result<_>>()?,
		},
		Insn::LookupSwitch { default, pairs } => Insn::LookupSwitch {
			default: labels.resolve(default)?,
			pairs: pairs.into_iter().map(|(key, l)| Ok((key, labels.resolve(l)?))).collect::<Result<_>>()?,
		},
		insn => insn,
	})
}

fn read_verification_type(reader: &mut impl ClassRead, pool: &PoolRead, labels: &mut Labels) -> Result<VerificationType> {
	Ok(match reader.read_u8()? {
		verification::TOP => VerificationType::Top,
		verification::INTEGER => VerificationType::Integer,
		verification::FLOAT => VerificationType::Float,
		verification::DOUBLE => VerificationType::Double,
		verification::LONG => VerificationType::Long,
		verification::NULL => VerificationType::Null,
		verification::UNINITIALIZED_THIS => VerificationType::UninitializedThis,
		verification::OBJECT => VerificationType::Object(pool.get_class(reader.read_u16()?)?),
		verification::UNINITIALIZED => {
			let offset = reader.read_u16()?;
			labels.create(offset)?;
			VerificationType::Uninitialized(Label(offset as u32))
		},
		tag => bail!("unknown verification type info tag {tag}"),
	})
}

fn resolve_verification_types(types: Vec<VerificationType>, labels: &Labels) -> Result<Vec<VerificationType>> {
	types.into_iter()
		.map(|t| match t {
			VerificationType::Uninitialized(raw) => Ok(VerificationType::Uninitialized(labels.resolve(raw)?)),
			t => Ok(t),
		})
		.collect()
}

/// Reads one `stack_map_frame`, returning its offset delta.
fn read_stack_map_frame(reader: &mut impl ClassRead, pool: &PoolRead, labels: &mut Labels) -> Result<(u16, Frame)> {
	let frame_type = reader.read_u8()?;
	let same = |kind| Frame { kind, locals: Vec::new(), stack: Vec::new() };
	Ok(match frame_type {
		0..=frame::SAME_MAX => (frame_type as u16, same(FrameKind::Same)),
		frame::SAME_LOCALS_1_STACK_ITEM_MIN..=frame::SAME_LOCALS_1_STACK_ITEM_MAX => {
			let stack = vec![read_verification_type(reader, pool, labels)?];
			((frame_type - frame::SAME_LOCALS_1_STACK_ITEM_MIN) as u16, Frame { stack, ..same(FrameKind::SameLocals1StackItem) })
		},
		frame::SAME_LOCALS_1_STACK_ITEM_EXTENDED => {
			let delta = reader.read_u16()?;
			let stack = vec![read_verification_type(reader, pool, labels)?];
			(delta, Frame { stack, ..same(FrameKind::SameLocals1StackItem) })
		},
		frame::CHOP_MIN..=frame::CHOP_MAX => (reader.read_u16()?, same(FrameKind::Chop(frame::SAME_EXTENDED - frame_type))),
		frame::SAME_EXTENDED => (reader.read_u16()?, same(FrameKind::Same)),
		frame::APPEND_MIN..=frame::APPEND_MAX => {
			let delta = reader.read_u16()?;
			let count = (frame_type - frame::SAME_EXTENDED) as usize;
			let locals = reader.read_vec(|_| Ok(count), |r| read_verification_type(r, pool, labels))?;
			(delta, Frame { locals, ..same(FrameKind::Append) })
		},
		frame::FULL => {
			let delta = reader.read_u16()?;
			let locals = reader.read_vec(|r| r.read_u16_as_usize(), |r| read_verification_type(r, pool, labels))?;
			let stack = reader.read_vec(|r| r.read_u16_as_usize(), |r| read_verification_type(r, pool, labels))?;
			(delta, Frame { kind: FrameKind::Full, locals, stack })
		},
		_ => bail!("reserved stack map frame type {frame_type}"),
	})
}

fn resolve_type_annotation(annotation: TypeAnnotation, labels: &Labels) -> Result<TypeAnnotation> {
	let target = annotation.target.map_labels(|label| labels.resolve(label))?;
	Ok(TypeAnnotation { target, ..annotation })
}

struct RawLocalVariable {
	start: u16,
	end: u16,
	name: String,
	descriptor: String,
	index: u16,
}

pub(super) fn read_code(reader: &mut impl ClassRead, pool: &PoolRead, sink: &mut impl ClassSink) -> Result<()> {
	let max_stack = reader.read_u16()?;
	let max_locals = reader.read_u16()?;

	let code_length = reader.read_u32()?;
	// This limit allows storing offsets (including the end of the code) in an u16.
	if code_length == 0 || code_length > u16::MAX as u32 {
		bail!("`code_length` must be greater than zero and less than 65536, got {code_length:?}");
	}
	let code_length = code_length as u16;

	let mut labels = Labels::new(code_length);

	let bytecode = reader.read_u8_vec(code_length as usize)?;

	let mut instructions = Vec::new();
	{
		let mut r = Cursor::new(bytecode.as_slice());
		while (r.position() as usize) < bytecode.len() {
			let opcode_pos = r.position() as u16;
			let insn = decode_instruction(&mut r, pool, opcode_pos)
				.with_context(|| anyhow!("at bytecode offset {opcode_pos}"))?;
			for target in insn.targets() {
				labels.create(target.0 as u16)?;
			}
			instructions.push((opcode_pos, insn));
		}
	}

	let exception_table = reader.read_vec(
		|r| r.read_u16_as_usize(),
		|r| {
			let start = r.read_u16()?;
			let end = r.read_u16()?;
			let handler = r.read_u16()?;
			let catch = pool.get_optional(r.read_u16()?, PoolRead::get_class)?;
			labels.create(start)?;
			labels.create(end)?;
			labels.create(handler)?;
			Ok((start, end, handler, catch))
		}
	)?;

	let mut frames = HashMap::new();
	let mut lines: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
	let mut local_variables = Vec::new();
	let mut local_variable_signatures = HashMap::new();
	let mut type_annotations = Vec::new();

	let attributes_count = reader.read_u16()?;
	for _ in 0..attributes_count {
		let attribute_name = pool.get_utf8(reader.read_u16()?)?;
		let length = reader.read_u32()?;

		match attribute_name.as_str() {
			attribute::STACK_MAP_TABLE => {
				let number_of_entries = reader.read_u16()?;
				let mut offset: Option<u16> = None;
				for _ in 0..number_of_entries {
					let (delta, frame) = read_stack_map_frame(reader, pool, &mut labels)?;
					let pc = match offset {
						None => Some(delta),
						Some(previous) => previous.checked_add(delta).and_then(|x| x.checked_add(1)),
					}.with_context(|| anyhow!("stack map frame offset out of range"))?;
					frames.insert(pc, frame);
					offset = Some(pc);
				}
			},
			attribute::LINE_NUMBER_TABLE => {
				let table = reader.read_vec(|r| r.read_u16_as_usize(), |r| Ok((r.read_u16()?, r.read_u16()?)))?;
				for (start_pc, line) in table {
					labels.create(start_pc)?;
					lines.entry(start_pc).or_default().push(line);
				}
			},
			attribute::LOCAL_VARIABLE_TABLE => {
				let table = reader.read_vec(
					|r| r.read_u16_as_usize(),
					|r| {
						let start = r.read_u16()?;
						let length = r.read_u16()?;
						let end = start.checked_add(length).with_context(|| anyhow!("local variable range out of bounds"))?;
						Ok(RawLocalVariable {
							start,
							end,
							name: pool.get_utf8(r.read_u16()?)?,
							descriptor: pool.get_utf8(r.read_u16()?)?,
							index: r.read_u16()?,
						})
					}
				)?;
				for variable in &table {
					labels.create(variable.start)?;
					labels.create(variable.end)?;
				}
				local_variables.extend(table);
			},
			attribute::LOCAL_VARIABLE_TYPE_TABLE => {
				for _ in 0..reader.read_u16()? {
					let start = reader.read_u16()?;
					let length = reader.read_u16()?;
					let name = pool.get_utf8(reader.read_u16()?)?;
					let signature = pool.get_utf8(reader.read_u16()?)?;
					let index = reader.read_u16()?;
					local_variable_signatures.insert((start, length, index, name), signature);
				}
			},
			attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS => {
				let read = super::read_type_annotations(reader, pool, Some(&mut labels))?;
				type_annotations.extend(read.into_iter().map(|annotation| (true, annotation)));
			},
			attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
				let read = super::read_type_annotations(reader, pool, Some(&mut labels))?;
				type_annotations.extend(read.into_iter().map(|annotation| (false, annotation)));
			},
			_ => {
				warn!("skipping unsupported code attribute {attribute_name:?}");
				reader.skip(length as i64)?;
			},
		}
	}

	labels.number();

	let starts: HashSet<u16> = instructions.iter().map(|(pc, _)| *pc).collect();
	for pc in labels.offsets() {
		if !starts.contains(&pc) && pc != code_length {
			bail!("label at offset {pc} which is not an instruction start");
		}
	}
	if let Some(pc) = frames.keys().find(|pc| !starts.contains(pc)) {
		bail!("stack map frame at offset {pc} which is not an instruction start");
	}

	let code = ClassEvent::Code;

	for (start, end, handler, catch) in exception_table {
		sink.accept(code(CodeEvent::TryCatch {
			start: labels.try_get(start)?,
			end: labels.try_get(end)?,
			handler: labels.try_get(handler)?,
			catch,
		}))?;
	}

	for (pc, insn) in instructions {
		if let Some(label) = labels.get(pc) {
			sink.accept(code(CodeEvent::Label(label)))?;
			for &line in lines.get(&pc).into_iter().flatten() {
				sink.accept(code(CodeEvent::LineNumber { line, start: label }))?;
			}
		}
		if let Some(frame) = frames.remove(&pc) {
			let frame = Frame {
				kind: frame.kind,
				locals: resolve_verification_types(frame.locals, &labels)?,
				stack: resolve_verification_types(frame.stack, &labels)?,
			};
			sink.accept(code(CodeEvent::Frame(frame)))?;
		}
		let insn = resolve_insn(insn, &labels).with_context(|| anyhow!("at bytecode offset {pc}"))?;
		sink.accept(code(CodeEvent::Insn(insn)))?;
	}
	if let Some(label) = labels.get(code_length) {
		sink.accept(code(CodeEvent::Label(label)))?;
	}

	for variable in local_variables {
		let key = (variable.start, variable.end - variable.start, variable.index, variable.name);
		let signature = local_variable_signatures.remove(&key);
		let (_, _, _, name) = key;
		sink.accept(code(CodeEvent::LocalVariable(LocalVariable {
			name,
			descriptor: variable.descriptor,
			signature,
			start: labels.try_get(variable.start)?,
			end: labels.try_get(variable.end)?,
			index: variable.index,
		})))?;
	}

	for (visible, annotation) in type_annotations {
		let annotation = resolve_type_annotation(annotation, &labels)?;
		sink.accept(code(CodeEvent::TypeAnnotation { visible, annotation }))?;
	}

	sink.accept(code(CodeEvent::Maxs { max_stack, max_locals }))
}
