//! Human readable renditions of classes and instructions, used for the `comment` and `listing` nodes.

use std::fmt::Write;
use cafe::constants::access;
use crate::model::{ClassModel, FrameValue, Instruction, MethodEntry, MethodModel, Operand};

fn operand(value: &Operand) -> String {
	match value {
		Operand::None => "none".to_owned(),
		Operand::Bool(v) => v.to_string(),
		Operand::Byte(v) => v.to_string(),
		Operand::Short(v) => v.to_string(),
		Operand::Char(v) => match char::from_u32(*v as u32) {
			Some(c) => format!("{c:?}"),
			None => format!("'\\u{v:04x}'"),
		},
		Operand::Int(v) => v.to_string(),
		Operand::Long(v) => format!("{v}L"),
		Operand::Float(v) => format!("{v:?}f"),
		Operand::Double(v) => format!("{v:?}d"),
		Operand::String(v) => format!("{v:?}"),
		Operand::Class(v) => v.clone(),
		Operand::MethodType(v) => v.clone(),
		Operand::Label(v) => v.to_string(),
		Operand::Handle(h) => format!("{} {}.{}{}", h.kind, h.owner, h.name, h.descriptor),
		Operand::Dynamic(d) => format!("{}:{} via {}.{}", d.name, d.descriptor, d.bootstrap.owner, d.bootstrap.name),
		Operand::Array(values) => format!("[{}]", values.iter().map(operand).collect::<Vec<_>>().join(", ")),
	}
}

/// Renders an instruction like `invokevirtual java/io/PrintStream println (I)V false`.
pub fn instruction(instruction: &Instruction) -> String {
	let mut s = instruction.mnemonic().to_owned();
	for o in &instruction.operands {
		s.push(' ');
		s.push_str(&operand(o));
	}
	s
}

fn frame_value(value: &FrameValue) -> String {
	match value {
		FrameValue::Object(class) => class.clone(),
		FrameValue::Uninitialized(label) => format!("uninitialized {label}"),
		value => format!("{value:?}").to_lowercase(),
	}
}

fn modifiers(flags: u16, method: bool) -> String {
	let mut names = Vec::new();
	let mut add = |flag: u16, name: &'static str| {
		if flags & flag != 0 {
			names.push(name);
		}
	};
	add(access::PUBLIC, "public");
	add(access::PRIVATE, "private");
	add(access::PROTECTED, "protected");
	add(access::STATIC, "static");
	add(access::FINAL, "final");
	if method {
		add(access::SYNCHRONIZED, "synchronized");
		add(access::NATIVE, "native");
	}
	add(access::ABSTRACT, "abstract");
	names.iter().map(|name| format!("{name} ")).collect()
}

fn method(s: &mut String, method: &MethodModel) {
	let _ = writeln!(s, "  {}{}{};", modifiers(method.access, true), method.name, method.descriptor);
	if !method.has_body() {
		return;
	}
	let _ = writeln!(s, "    Code:");
	for entry in &method.entries {
		let _ = match entry {
			MethodEntry::Instruction(i) => writeln!(s, "        {}", instruction(i)),
			MethodEntry::Label(label) => writeln!(s, "      {label}:"),
			MethodEntry::TryCatch(t) => writeln!(s, "      try {} {} catch {} -> {}",
				t.start, t.end, t.catch_type.as_deref().unwrap_or("any"), t.handler),
			MethodEntry::Frame(f) => writeln!(s, "      frame {:?} locals [{}] stack [{}]",
				f.kind,
				f.locals.iter().map(frame_value).collect::<Vec<_>>().join(", "),
				f.stack.iter().map(frame_value).collect::<Vec<_>>().join(", ")),
			MethodEntry::LineMarker(l) => writeln!(s, "      line {} at {}", l.line, l.label),
		};
	}
}

/// Renders the whole class, in the spirit of `javap -c`.
pub fn class(class: &ClassModel) -> String {
	// writing to a String can't fail, so the results are ignored
	let mut s = String::new();
	let kind = if class.module.is_some() {
		"module"
	} else if class.record.is_some() {
		"record"
	} else if class.access & access::INTERFACE != 0 {
		"interface"
	} else {
		"class"
	};
	let _ = write!(s, "{}{kind} {}", modifiers(class.access & !access::ABSTRACT, false), class.name);
	if let Some(super_class) = &class.super_class {
		let _ = write!(s, " extends {super_class}");
	}
	if !class.interfaces.is_empty() {
		let _ = write!(s, " implements {}", class.interfaces.join(", "));
	}
	let _ = writeln!(s, " {{");
	for field in &class.fields {
		let _ = writeln!(s, "  {}{} {};", modifiers(field.access, false), field.descriptor, field.name);
	}
	for m in &class.methods {
		let _ = writeln!(s);
		method(&mut s, m);
	}
	let _ = writeln!(s, "}}");
	s
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use cafe::constants::opcode;
	use crate::labels::LabelId;
	use crate::model::{Instruction, Operand};

	#[test]
	fn instructions() {
		assert_eq!(super::instruction(&Instruction::new(opcode::BIPUSH, vec![Operand::Int(5)])), "bipush 5");
		assert_eq!(super::instruction(&Instruction::new(opcode::GOTO, vec![Operand::Label(LabelId(2))])), "goto L2");
		assert_eq!(super::instruction(&Instruction::new(opcode::LDC, vec![Operand::Long(3)])), "ldc 3L");
		let nested = Operand::Array(vec![Operand::Int(1), Operand::String("a".to_owned().into()), Operand::Array(Vec::new())]);
		assert_eq!(super::operand(&nested), "[1, \"a\", []]");
	}
}
