use std::collections::{HashMap, HashSet};
use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use crate::ClassWrite;
use crate::constants::{attribute, frame, opcode, verification};
use crate::event::{CodeEvent, Frame, FrameKind, Insn, Label, LocalVariable, TypeAnnotation, TypeTarget, VerificationType};
use super::{Attributes, maxs, write_type_annotations};
use super::pool::PoolWrite;

/// The positional part of the code: labels, frames and instructions in the order they appear.
#[derive(Debug)]
pub(super) enum Item {
	Label(Label),
	Frame(Frame),
	Insn(Insn),
}

#[derive(Debug)]
struct TryCatchWrite {
	start: Label,
	end: Label,
	handler: Label,
	catch: Option<String>,
}

/// The bytecode offsets of all items and labels, for one choice of jump widths.
struct Layout {
	offsets: Vec<u32>,
	labels: HashMap<Label, u32>,
	/// Indices of the jumps that need a 32 bit offset.
	wide: HashSet<usize>,
	code_length: u32,
}

impl Layout {
	fn label(&self, label: Label) -> Result<u32> {
		self.labels.get(&label).copied().with_context(|| anyhow!("reference to undefined label {label:?}"))
	}

	fn label_u16(&self, label: Label) -> Result<u16> {
		let offset = self.label(label)?;
		u16::try_from(offset).with_context(|| anyhow!("offset {offset} of label {label:?} is too large"))
	}

	fn delta(&self, from: u32, to: Label) -> Result<i32> {
		Ok(self.label(to)? as i32 - from as i32)
	}
}

/// The number of padding bytes after a switch opcode at `pc`, so that the operands start 4 byte aligned.
fn switch_padding(pc: u32) -> u32 {
	3 - pc % 4
}

fn has_compact_form(opcode: u8, var: u16) -> bool {
	var < 4 && matches!(opcode, opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE)
}

fn fits_iinc(var: u16, increment: i16) -> bool {
	var <= u8::MAX as u16 && i8::try_from(increment).is_ok()
}

fn insn_size(insn: &Insn, pc: u32, wide: bool, pool: &mut PoolWrite) -> Result<u32> {
	Ok(match insn {
		Insn::Simple(_) => 1,
		Insn::Int(opcode::SIPUSH, _) => 3,
		Insn::Int(..) => 2,
		&Insn::Var(opcode, var) => {
			if has_compact_form(opcode, var) {
				1
			} else if var <= u8::MAX as u16 {
				2
			} else {
				4
			}
		},
		Insn::Type(..) | Insn::Field { .. } => 3,
		Insn::Method { opcode: opcode::INVOKEINTERFACE, .. } => 5,
		Insn::Method { .. } => 3,
		Insn::InvokeDynamic { .. } => 5,
		&Insn::Jump(opcode, _) => match (wide, opcode) {
			(false, _) => 3,
			(true, opcode::GOTO | opcode::JSR) => 5,
			// inverted condition jumping over a goto_w
			(true, _) => 8,
		},
		Insn::Ldc(constant) => {
			if constant.is_wide() || pool.put_constant(constant)? > u8::MAX as u16 {
				3
			} else {
				2
			}
		},
		&Insn::Iinc { var, increment } => if fits_iinc(var, increment) { 3 } else { 6 },
		Insn::TableSwitch { labels, .. } => 1 + switch_padding(pc) + 12 + 4 * labels.len() as u32,
		Insn::LookupSwitch { pairs, .. } => 1 + switch_padding(pc) + 8 + 8 * pairs.len() as u32,
		Insn::MultiANewArray { .. } => 4,
	})
}

/// Assigns offsets to all items, widening jumps until every jump offset fits.
///
/// Jumps only ever get wider, so this terminates.
fn layout(items: &[Item], pool: &mut PoolWrite) -> Result<Layout> {
	let mut wide = HashSet::new();
	loop {
		let mut offsets = Vec::with_capacity(items.len());
		let mut labels = HashMap::new();
		let mut pc = 0u32;
		for (i, item) in items.iter().enumerate() {
			offsets.push(pc);
			match item {
				&Item::Label(label) => {
					if labels.insert(label, pc).is_some() {
						bail!("label {label:?} is defined more than once");
					}
				},
				Item::Frame(_) => {},
				Item::Insn(insn) => pc += insn_size(insn, pc, wide.contains(&i), pool)?,
			}
		}

		let mut layout = Layout { offsets, labels, wide, code_length: pc };

		let mut changed = false;
		for (i, item) in items.iter().enumerate() {
			if let &Item::Insn(Insn::Jump(_, target)) = item {
				if !layout.wide.contains(&i) && i16::try_from(layout.delta(layout.offsets[i], target)?).is_err() {
					layout.wide.insert(i);
					changed = true;
				}
			}
		}

		if !changed {
			if layout.code_length == 0 || layout.code_length > u16::MAX as u32 {
				bail!("code length {} is out of range, must be in 1..=65535", layout.code_length);
			}
			if !layout.wide.is_empty() {
				debug!("widened {} jump(s) in code of length {}", layout.wide.len(), layout.code_length);
			}
			return Ok(layout);
		}
		wide = layout.wide;
	}
}

fn emit_insn(code: &mut Vec<u8>, insn: &Insn, i: usize, layout: &Layout, pool: &mut PoolWrite) -> Result<()> {
	let pc = layout.offsets[i];
	match insn {
		&Insn::Simple(opcode) => {
			if maxs::simple_effect(opcode).is_none() {
				bail!("opcode {opcode:#04x} is not an instruction without operands");
			}
			code.write_u8(opcode)?;
		},
		&Insn::Int(opcode, value) => {
			code.write_u8(opcode)?;
			match opcode {
				opcode::BIPUSH => code.write_i8(i8::try_from(value).with_context(|| anyhow!("bipush operand {value} out of range"))?)?,
				opcode::SIPUSH => code.write_i16(i16::try_from(value).with_context(|| anyhow!("sipush operand {value} out of range"))?)?,
				opcode::NEWARRAY if (4..=11).contains(&value) => code.write_u8(value as u8)?,
				opcode::NEWARRAY => bail!("invalid newarray type {value}"),
				_ => bail!("opcode {opcode:#04x} doesn't take an int operand"),
			}
		},
		&Insn::Var(opcode, var) => {
			if !matches!(opcode, opcode::ILOAD..=opcode::ALOAD | opcode::ISTORE..=opcode::ASTORE | opcode::RET) {
				bail!("opcode {opcode:#04x} doesn't take a local variable operand");
			}
			if has_compact_form(opcode, var) {
				let compact = if opcode <= opcode::ALOAD {
					opcode::ILOAD_0 + (opcode - opcode::ILOAD) * 4
				} else {
					opcode::ISTORE_0 + (opcode - opcode::ISTORE) * 4
				};
				code.write_u8(compact + var as u8)?;
			} else if var <= u8::MAX as u16 {
				code.write_u8(opcode)?;
				code.write_u8(var as u8)?;
			} else {
				code.write_u8(opcode::WIDE)?;
				code.write_u8(opcode)?;
				code.write_u16(var)?;
			}
		},
		Insn::Type(opcode, class) => {
			if !matches!(*opcode, opcode::NEW | opcode::ANEWARRAY | opcode::CHECKCAST | opcode::INSTANCEOF) {
				bail!("opcode {opcode:#04x} doesn't take a type operand");
			}
			code.write_u8(*opcode)?;
			code.write_u16(pool.put_class(class)?)?;
		},
		Insn::Field { opcode, owner, name, descriptor } => {
			if !(opcode::GETSTATIC..=opcode::PUTFIELD).contains(opcode) {
				bail!("opcode {opcode:#04x} is not a field instruction");
			}
			code.write_u8(*opcode)?;
			code.write_u16(pool.put_field_ref(owner, name, descriptor)?)?;
		},
		Insn::Method { opcode, owner, name, descriptor, interface } => {
			if !(opcode::INVOKEVIRTUAL..=opcode::INVOKEINTERFACE).contains(opcode) {
				bail!("opcode {opcode:#04x} is not a method instruction");
			}
			code.write_u8(*opcode)?;
			code.write_u16(pool.put_method_ref(owner, name, descriptor, *interface || *opcode == opcode::INVOKEINTERFACE)?)?;
			if *opcode == opcode::INVOKEINTERFACE {
				let count = crate::descriptor::argument_slots(descriptor)? + 1;
				code.write_usize_as_u8(count)?;
				code.write_u8(0)?;
			}
		},
		Insn::InvokeDynamic { name, descriptor, bootstrap, arguments } => {
			code.write_u8(opcode::INVOKEDYNAMIC)?;
			code.write_u16(pool.put_invoke_dynamic(name, descriptor, bootstrap, arguments)?)?;
			code.write_u16(0)?;
		},
		&Insn::Jump(opcode, target) => {
			if !opcode::is_jump(opcode) {
				bail!("opcode {opcode:#04x} is not a jump");
			}
			if !layout.wide.contains(&i) {
				code.write_u8(opcode)?;
				code.write_i16(layout.delta(pc, target)? as i16)?;
			} else if opcode == opcode::GOTO || opcode == opcode::JSR {
				code.write_u8(if opcode == opcode::GOTO { opcode::GOTO_W } else { opcode::JSR_W })?;
				code.write_i32(layout.delta(pc, target)?)?;
			} else {
				let inverted = opcode::invert_condition(opcode)
					.with_context(|| anyhow!("no inverted condition for opcode {opcode:#04x}"))?;
				code.write_u8(inverted)?;
				code.write_i16(8)?;
				code.write_u8(opcode::GOTO_W)?;
				code.write_i32(layout.delta(pc + 3, target)?)?;
			}
		},
		Insn::Ldc(constant) => {
			let index = pool.put_constant(constant)?;
			if constant.is_wide() {
				code.write_u8(opcode::LDC2_W)?;
				code.write_u16(index)?;
			} else if index <= u8::MAX as u16 {
				code.write_u8(opcode::LDC)?;
				code.write_u8(index as u8)?;
			} else {
				code.write_u8(opcode::LDC_W)?;
				code.write_u16(index)?;
			}
		},
		&Insn::Iinc { var, increment } => {
			if fits_iinc(var, increment) {
				code.write_u8(opcode::IINC)?;
				code.write_u8(var as u8)?;
				code.write_i8(increment as i8)?;
			} else {
				code.write_u8(opcode::WIDE)?;
				code.write_u8(opcode::IINC)?;
				code.write_u16(var)?;
				code.write_i16(increment)?;
			}
		},
		Insn::TableSwitch { low, high, default, labels } => {
			if *high < *low || (*high as i64 - *low as i64 + 1) != labels.len() as i64 {
				bail!("tableswitch from {low} to {high} has {} labels", labels.len());
			}
			code.write_u8(opcode::TABLESWITCH)?;
			code.write_u8_slice(&[0; 3][..switch_padding(pc) as usize])?;
			code.write_i32(layout.delta(pc, *default)?)?;
			code.write_i32(*low)?;
			code.write_i32(*high)?;
			for &label in labels {
				code.write_i32(layout.delta(pc, label)?)?;
			}
		},
		Insn::LookupSwitch { default, pairs } => {
			let mut pairs = pairs.clone();
			pairs.sort_by_key(|&(key, _)| key);
			if let Some(pair) = pairs.windows(2).find(|pair| pair[0].0 == pair[1].0) {
				bail!("lookupswitch has duplicate key {}", pair[0].0);
			}
			code.write_u8(opcode::LOOKUPSWITCH)?;
			code.write_u8_slice(&[0; 3][..switch_padding(pc) as usize])?;
			code.write_i32(layout.delta(pc, *default)?)?;
			code.write_usize_as_u32(pairs.len())?;
			for (key, label) in pairs {
				code.write_i32(key)?;
				code.write_i32(layout.delta(pc, label)?)?;
			}
		},
		Insn::MultiANewArray { descriptor, dimensions } => {
			if *dimensions == 0 {
				bail!("multianewarray of {descriptor:?} with zero dimensions");
			}
			code.write_u8(opcode::MULTIANEWARRAY)?;
			code.write_u16(pool.put_class(descriptor)?)?;
			code.write_u8(*dimensions)?;
		},
	}
	Ok(())
}

fn write_verification_type(w: &mut Vec<u8>, pool: &mut PoolWrite, layout: &Layout, t: &VerificationType) -> Result<()> {
	match t {
		VerificationType::Top => w.write_u8(verification::TOP),
		VerificationType::Integer => w.write_u8(verification::INTEGER),
		VerificationType::Float => w.write_u8(verification::FLOAT),
		VerificationType::Double => w.write_u8(verification::DOUBLE),
		VerificationType::Long => w.write_u8(verification::LONG),
		VerificationType::Null => w.write_u8(verification::NULL),
		VerificationType::UninitializedThis => w.write_u8(verification::UNINITIALIZED_THIS),
		VerificationType::Object(class) => {
			w.write_u8(verification::OBJECT)?;
			w.write_u16(pool.put_class(class)?)
		},
		&VerificationType::Uninitialized(label) => {
			w.write_u8(verification::UNINITIALIZED)?;
			w.write_u16(layout.label_u16(label)?)
		},
	}
}

fn write_verification_types(w: &mut Vec<u8>, pool: &mut PoolWrite, layout: &Layout, types: &[VerificationType]) -> Result<()> {
	for t in types {
		write_verification_type(w, pool, layout, t)?;
	}
	Ok(())
}

fn write_stack_map_frame(w: &mut Vec<u8>, pool: &mut PoolWrite, layout: &Layout, frame: &Frame, delta: u16) -> Result<()> {
	let short_delta = u8::try_from(delta).ok().filter(|&delta| delta <= frame::SAME_MAX);
	match frame.kind {
		FrameKind::Same => match short_delta {
			Some(delta) => w.write_u8(delta)?,
			None => {
				w.write_u8(frame::SAME_EXTENDED)?;
				w.write_u16(delta)?;
			},
		},
		FrameKind::SameLocals1StackItem => {
			let [item] = frame.stack.as_slice() else {
				bail!("same locals 1 stack item frame with {} stack items", frame.stack.len());
			};
			match short_delta {
				Some(delta) => w.write_u8(frame::SAME_LOCALS_1_STACK_ITEM_MIN + delta)?,
				None => {
					w.write_u8(frame::SAME_LOCALS_1_STACK_ITEM_EXTENDED)?;
					w.write_u16(delta)?;
				},
			}
			write_verification_type(w, pool, layout, item)?;
		},
		FrameKind::Chop(count) => {
			if !(1..=3).contains(&count) {
				bail!("chop frame removing {count} locals, must be 1 to 3");
			}
			w.write_u8(frame::SAME_EXTENDED - count)?;
			w.write_u16(delta)?;
		},
		FrameKind::Append => {
			let count = frame.locals.len();
			if !(1..=3).contains(&count) {
				bail!("append frame adding {count} locals, must be 1 to 3");
			}
			w.write_u8(frame::SAME_EXTENDED + count as u8)?;
			w.write_u16(delta)?;
			write_verification_types(w, pool, layout, &frame.locals)?;
		},
		FrameKind::Full => {
			w.write_u8(frame::FULL)?;
			w.write_u16(delta)?;
			w.write_usize_as_u16(frame.locals.len())?;
			write_verification_types(w, pool, layout, &frame.locals)?;
			w.write_usize_as_u16(frame.stack.len())?;
			write_verification_types(w, pool, layout, &frame.stack)?;
		},
	}
	Ok(())
}

fn write_stack_map_table(w: &mut Vec<u8>, pool: &mut PoolWrite, layout: &Layout, items: &[Item]) -> Result<()> {
	let frames: Vec<_> = items.iter()
		.enumerate()
		.filter_map(|(i, item)| match item {
			Item::Frame(frame) => Some((layout.offsets[i], frame)),
			_ => None,
		})
		.collect();

	w.write_usize_as_u16(frames.len())?;
	let mut previous: Option<u32> = None;
	for (offset, frame) in frames {
		if offset >= layout.code_length {
			bail!("frame at the end of the code doesn't describe an instruction");
		}
		let delta = match previous {
			None => offset,
			Some(previous) if offset > previous => offset - previous - 1,
			Some(_) => bail!("more than one frame at bytecode offset {offset}"),
		};
		write_stack_map_frame(w, pool, layout, frame, delta as u16)?;
		previous = Some(offset);
	}
	Ok(())
}

/// Writes the body of the `Code` attribute of a method.
pub(super) fn write_code(w: &mut Vec<u8>, pool: &mut PoolWrite, access: u16, descriptor: &str, events: Vec<CodeEvent>) -> Result<()> {
	let mut items = Vec::new();
	let mut try_catches = Vec::new();
	let mut line_numbers = Vec::new();
	let mut local_variables = Vec::new();
	let mut type_annotations: (Vec<TypeAnnotation>, Vec<TypeAnnotation>) = (Vec::new(), Vec::new());
	let mut maxs = None;

	for event in events {
		match event {
			CodeEvent::TryCatch { start, end, handler, catch } => try_catches.push(TryCatchWrite { start, end, handler, catch }),
			CodeEvent::Label(label) => items.push(Item::Label(label)),
			CodeEvent::LineNumber { line, start } => line_numbers.push((line, start)),
			CodeEvent::Frame(frame) => items.push(Item::Frame(frame)),
			CodeEvent::Insn(insn) => items.push(Item::Insn(insn)),
			CodeEvent::LocalVariable(local_variable) => local_variables.push(local_variable),
			CodeEvent::TypeAnnotation { visible: true, annotation } => type_annotations.0.push(annotation),
			CodeEvent::TypeAnnotation { visible: false, annotation } => type_annotations.1.push(annotation),
			CodeEvent::Maxs { max_stack, max_locals } => maxs = Some((max_stack, max_locals)),
		}
	}

	let layout = layout(&items, pool)?;

	let mut code = Vec::with_capacity(layout.code_length as usize);
	for (i, item) in items.iter().enumerate() {
		if let Item::Insn(insn) = item {
			emit_insn(&mut code, insn, i, &layout, pool)
				.with_context(|| anyhow!("failed to write instruction {insn:?} at bytecode offset {}", layout.offsets[i]))?;
		}
	}

	let (max_stack, max_locals) = match maxs {
		Some(maxs) => maxs,
		None => {
			let handlers: Vec<_> = try_catches.iter().map(|x| x.handler).collect();
			(
				maxs::max_stack(&items, &handlers)?,
				maxs::max_locals(access, descriptor, &items, &local_variables)?,
			)
		},
	};

	w.write_u16(max_stack)?;
	w.write_u16(max_locals)?;
	w.write_usize_as_u32(code.len())?;
	w.write_u8_slice(&code)?;

	w.write_usize_as_u16(try_catches.len())?;
	for try_catch in &try_catches {
		let start = layout.label_u16(try_catch.start)?;
		let end = layout.label_u16(try_catch.end)?;
		if start >= end {
			bail!("exception range from {start} to {end} is empty");
		}
		w.write_u16(start)?;
		w.write_u16(end)?;
		w.write_u16(layout.label_u16(try_catch.handler)?)?;
		w.write_u16(pool.put_optional_class(try_catch.catch.as_deref())?)?;
	}

	let mut attributes = Attributes::new();
	if items.iter().any(|item| matches!(item, Item::Frame(_))) {
		attributes.add(pool, attribute::STACK_MAP_TABLE, |w, pool| write_stack_map_table(w, pool, &layout, &items))?;
	}
	if !line_numbers.is_empty() {
		attributes.add(pool, attribute::LINE_NUMBER_TABLE, |w, _| {
			w.write_usize_as_u16(line_numbers.len())?;
			for &(line, start) in &line_numbers {
				w.write_u16(layout.label_u16(start)?)?;
				w.write_u16(line)?;
			}
			Ok(())
		})?;
	}
	if !local_variables.is_empty() {
		attributes.add(pool, attribute::LOCAL_VARIABLE_TABLE, |w, pool| {
			write_local_variables(w, pool, &layout, &local_variables, |local_variable| Some(&local_variable.descriptor))
		})?;
	}
	if local_variables.iter().any(|local_variable| local_variable.signature.is_some()) {
		attributes.add(pool, attribute::LOCAL_VARIABLE_TYPE_TABLE, |w, pool| {
			write_local_variables(w, pool, &layout, &local_variables, |local_variable| local_variable.signature.as_ref())
		})?;
	}
	let offset = |label: Label| layout.label_u16(label);
	for (annotations, name) in [
		(&type_annotations.0, attribute::RUNTIME_VISIBLE_TYPE_ANNOTATIONS),
		(&type_annotations.1, attribute::RUNTIME_INVISIBLE_TYPE_ANNOTATIONS),
	] {
		let catch = annotations.iter().find_map(|annotation| match annotation.target {
			TypeTarget::Catch(index) if index as usize >= try_catches.len() => Some(index),
			_ => None,
		});
		if let Some(index) = catch {
			bail!("type annotation refers to exception table entry {index}, but there are only {}", try_catches.len());
		}
		if !annotations.is_empty() {
			attributes.add(pool, name, |w, pool| write_type_annotations(w, pool, annotations, Some(&offset)))?;
		}
	}
	attributes.write(w)
}

/// Writes the entries for which `get_type` returns something, with that as the descriptor or signature.
fn write_local_variables(
	w: &mut Vec<u8>,
	pool: &mut PoolWrite,
	layout: &Layout,
	local_variables: &[LocalVariable],
	get_type: impl Fn(&LocalVariable) -> Option<&String>,
) -> Result<()> {
	let entries: Vec<_> = local_variables.iter()
		.filter_map(|local_variable| get_type(local_variable).map(|t| (local_variable, t)))
		.collect();

	w.write_usize_as_u16(entries.len())?;
	for (local_variable, t) in entries {
		let start = layout.label_u16(local_variable.start)?;
		let end = layout.label_u16(local_variable.end)?;
		let length = end.checked_sub(start)
			.with_context(|| anyhow!("local variable {:?} ends before it starts", local_variable.name))?;
		w.write_u16(start)?;
		w.write_u16(length)?;
		w.write_u16(pool.put_utf8(&local_variable.name)?)?;
		w.write_u16(pool.put_utf8(t)?)?;
		w.write_u16(local_variable.index)?;
	}
	Ok(())
}
