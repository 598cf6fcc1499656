//! Numeric constants of the class file format.

pub(crate) const MAGIC: u32 = 0xCAFE_BABE;

/// The highest major version this crate reads (Java 23).
pub const MAX_MAJOR_VERSION: u16 = 67;

pub mod access {
	pub const PUBLIC: u16 = 0x0001;
	pub const PRIVATE: u16 = 0x0002;
	pub const PROTECTED: u16 = 0x0004;
	pub const STATIC: u16 = 0x0008;
	pub const FINAL: u16 = 0x0010;
	pub const SUPER: u16 = 0x0020;
	pub const SYNCHRONIZED: u16 = 0x0020;
	pub const VOLATILE: u16 = 0x0040;
	pub const BRIDGE: u16 = 0x0040;
	pub const TRANSIENT: u16 = 0x0080;
	pub const VARARGS: u16 = 0x0080;
	pub const NATIVE: u16 = 0x0100;
	pub const INTERFACE: u16 = 0x0200;
	pub const ABSTRACT: u16 = 0x0400;
	pub const STRICT: u16 = 0x0800;
	pub const SYNTHETIC: u16 = 0x1000;
	pub const ANNOTATION: u16 = 0x2000;
	pub const ENUM: u16 = 0x4000;
	pub const MANDATED: u16 = 0x8000;
	pub const MODULE: u16 = 0x8000;
}

pub(crate) mod pool {
	pub(crate) const UTF8: u8 = 1;
	pub(crate) const INTEGER: u8 = 3;
	pub(crate) const FLOAT: u8 = 4;
	pub(crate) const LONG: u8 = 5;
	pub(crate) const DOUBLE: u8 = 6;
	pub(crate) const CLASS: u8 = 7;
	pub(crate) const STRING: u8 = 8;
	pub(crate) const FIELD_REF: u8 = 9;
	pub(crate) const METHOD_REF: u8 = 10;
	pub(crate) const INTERFACE_METHOD_REF: u8 = 11;
	pub(crate) const NAME_AND_TYPE: u8 = 12;
	pub(crate) const METHOD_HANDLE: u8 = 15;
	pub(crate) const METHOD_TYPE: u8 = 16;
	pub(crate) const DYNAMIC: u8 = 17;
	pub(crate) const INVOKE_DYNAMIC: u8 = 18;
	pub(crate) const MODULE: u8 = 19;
	pub(crate) const PACKAGE: u8 = 20;
}

/// Reference kinds of `CONSTANT_MethodHandle`.
pub mod handle {
	pub const GET_FIELD: u8 = 1;
	pub const GET_STATIC: u8 = 2;
	pub const PUT_FIELD: u8 = 3;
	pub const PUT_STATIC: u8 = 4;
	pub const INVOKE_VIRTUAL: u8 = 5;
	pub const INVOKE_STATIC: u8 = 6;
	pub const INVOKE_SPECIAL: u8 = 7;
	pub const NEW_INVOKE_SPECIAL: u8 = 8;
	pub const INVOKE_INTERFACE: u8 = 9;

	pub fn is_field(kind: u8) -> bool {
		(GET_FIELD..=PUT_STATIC).contains(&kind)
	}
}

pub(crate) mod attribute {
	pub(crate) const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
	pub(crate) const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
	pub(crate) const CODE: &str = "Code";
	pub(crate) const CONSTANT_VALUE: &str = "ConstantValue";
	pub(crate) const DEPRECATED: &str = "Deprecated";
	pub(crate) const ENCLOSING_METHOD: &str = "EnclosingMethod";
	pub(crate) const EXCEPTIONS: &str = "Exceptions";
	pub(crate) const INNER_CLASSES: &str = "InnerClasses";
	pub(crate) const LINE_NUMBER_TABLE: &str = "LineNumberTable";
	pub(crate) const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
	pub(crate) const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
	pub(crate) const METHOD_PARAMETERS: &str = "MethodParameters";
	pub(crate) const MODULE: &str = "Module";
	pub(crate) const MODULE_MAIN_CLASS: &str = "ModuleMainClass";
	pub(crate) const MODULE_PACKAGES: &str = "ModulePackages";
	pub(crate) const NEST_HOST: &str = "NestHost";
	pub(crate) const NEST_MEMBERS: &str = "NestMembers";
	pub(crate) const PERMITTED_SUBCLASSES: &str = "PermittedSubclasses";
	pub(crate) const RECORD: &str = "Record";
	pub(crate) const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
	pub(crate) const RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeInvisibleParameterAnnotations";
	pub(crate) const RUNTIME_INVISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeInvisibleTypeAnnotations";
	pub(crate) const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
	pub(crate) const RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS: &str = "RuntimeVisibleParameterAnnotations";
	pub(crate) const RUNTIME_VISIBLE_TYPE_ANNOTATIONS: &str = "RuntimeVisibleTypeAnnotations";
	pub(crate) const SIGNATURE: &str = "Signature";
	pub(crate) const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
	pub(crate) const SOURCE_FILE: &str = "SourceFile";
	pub(crate) const STACK_MAP_TABLE: &str = "StackMapTable";
	pub(crate) const SYNTHETIC: &str = "Synthetic";
}

/// The `target_type` values of type annotations.
pub mod type_target {
	use crate::event::TypeTarget;

	pub const CLASS_TYPE_PARAMETER: u8 = 0x00;
	pub const METHOD_TYPE_PARAMETER: u8 = 0x01;
	pub const CLASS_EXTENDS: u8 = 0x10;
	pub const CLASS_TYPE_PARAMETER_BOUND: u8 = 0x11;
	pub const METHOD_TYPE_PARAMETER_BOUND: u8 = 0x12;
	pub const FIELD: u8 = 0x13;
	pub const METHOD_RETURN: u8 = 0x14;
	pub const METHOD_RECEIVER: u8 = 0x15;
	pub const METHOD_FORMAL_PARAMETER: u8 = 0x16;
	pub const THROWS: u8 = 0x17;
	pub const LOCAL_VARIABLE: u8 = 0x40;
	pub const RESOURCE_VARIABLE: u8 = 0x41;
	pub const EXCEPTION_PARAMETER: u8 = 0x42;
	pub const INSTANCEOF: u8 = 0x43;
	pub const NEW: u8 = 0x44;
	pub const CONSTRUCTOR_REFERENCE: u8 = 0x45;
	pub const METHOD_REFERENCE: u8 = 0x46;
	pub const CAST: u8 = 0x47;
	pub const CONSTRUCTOR_INVOCATION_TYPE_ARGUMENT: u8 = 0x48;
	pub const METHOD_INVOCATION_TYPE_ARGUMENT: u8 = 0x49;
	pub const CONSTRUCTOR_REFERENCE_TYPE_ARGUMENT: u8 = 0x4A;
	pub const METHOD_REFERENCE_TYPE_ARGUMENT: u8 = 0x4B;

	/// `true` for the targets that only appear inside of code.
	pub fn is_code(target_type: u8) -> bool {
		(LOCAL_VARIABLE..=METHOD_REFERENCE_TYPE_ARGUMENT).contains(&target_type)
	}

	/// Whether the shape of `target` is the one the `target_type` has. Unknown target types never match.
	pub fn matches<L>(target_type: u8, target: &TypeTarget<L>) -> bool {
		matches!((target_type, target),
			(CLASS_TYPE_PARAMETER | METHOD_TYPE_PARAMETER, TypeTarget::TypeParameter(_)) |
			(CLASS_EXTENDS, TypeTarget::Supertype(_)) |
			(CLASS_TYPE_PARAMETER_BOUND | METHOD_TYPE_PARAMETER_BOUND, TypeTarget::TypeParameterBound { .. }) |
			(FIELD..=METHOD_RECEIVER, TypeTarget::Empty) |
			(METHOD_FORMAL_PARAMETER, TypeTarget::FormalParameter(_)) |
			(THROWS, TypeTarget::Throws(_)) |
			(LOCAL_VARIABLE | RESOURCE_VARIABLE, TypeTarget::LocalVariable(_)) |
			(EXCEPTION_PARAMETER, TypeTarget::Catch(_)) |
			(INSTANCEOF..=METHOD_REFERENCE, TypeTarget::Offset(_)) |
			(CAST..=METHOD_REFERENCE_TYPE_ARGUMENT, TypeTarget::TypeArgument { .. })
		)
	}
}

pub(crate) mod verification {
	pub(crate) const TOP: u8 = 0;
	pub(crate) const INTEGER: u8 = 1;
	pub(crate) const FLOAT: u8 = 2;
	pub(crate) const DOUBLE: u8 = 3;
	pub(crate) const LONG: u8 = 4;
	pub(crate) const NULL: u8 = 5;
	pub(crate) const UNINITIALIZED_THIS: u8 = 6;
	pub(crate) const OBJECT: u8 = 7;
	pub(crate) const UNINITIALIZED: u8 = 8;
}

pub(crate) mod frame {
	pub(crate) const SAME_MAX: u8 = 63;
	pub(crate) const SAME_LOCALS_1_STACK_ITEM_MIN: u8 = 64;
	pub(crate) const SAME_LOCALS_1_STACK_ITEM_MAX: u8 = 127;
	pub(crate) const SAME_LOCALS_1_STACK_ITEM_EXTENDED: u8 = 247;
	pub(crate) const CHOP_MIN: u8 = 248;
	pub(crate) const CHOP_MAX: u8 = 250;
	pub(crate) const SAME_EXTENDED: u8 = 251;
	pub(crate) const APPEND_MIN: u8 = 252;
	pub(crate) const APPEND_MAX: u8 = 254;
	pub(crate) const FULL: u8 = 255;
}

/// Instruction opcodes.
///
/// Only the normalized forms are given names here; the short forms (`iload_0`, `ldc_w`, `goto_w`, ...) are
/// read into their normalized form and picked again by the writer.
pub mod opcode {
	pub const NOP: u8 = 0x00;
	pub const ACONST_NULL: u8 = 0x01;
	pub const ICONST_M1: u8 = 0x02;
	pub const ICONST_0: u8 = 0x03;
	pub const ICONST_1: u8 = 0x04;
	pub const ICONST_2: u8 = 0x05;
	pub const ICONST_3: u8 = 0x06;
	pub const ICONST_4: u8 = 0x07;
	pub const ICONST_5: u8 = 0x08;
	pub const LCONST_0: u8 = 0x09;
	pub const LCONST_1: u8 = 0x0a;
	pub const FCONST_0: u8 = 0x0b;
	pub const FCONST_2: u8 = 0x0d;
	pub const DCONST_0: u8 = 0x0e;
	pub const DCONST_1: u8 = 0x0f;
	pub const BIPUSH: u8 = 0x10;
	pub const SIPUSH: u8 = 0x11;
	pub const LDC: u8 = 0x12;
	pub const LDC_W: u8 = 0x13;
	pub const LDC2_W: u8 = 0x14;
	pub const ILOAD: u8 = 0x15;
	pub const LLOAD: u8 = 0x16;
	pub const FLOAD: u8 = 0x17;
	pub const DLOAD: u8 = 0x18;
	pub const ALOAD: u8 = 0x19;
	pub const ILOAD_0: u8 = 0x1a;
	pub const ALOAD_3: u8 = 0x2d;
	pub const IALOAD: u8 = 0x2e;
	pub const LALOAD: u8 = 0x2f;
	pub const DALOAD: u8 = 0x31;
	pub const SALOAD: u8 = 0x35;
	pub const ISTORE: u8 = 0x36;
	pub const LSTORE: u8 = 0x37;
	pub const FSTORE: u8 = 0x38;
	pub const DSTORE: u8 = 0x39;
	pub const ASTORE: u8 = 0x3a;
	pub const ISTORE_0: u8 = 0x3b;
	pub const ASTORE_3: u8 = 0x4e;
	pub const IASTORE: u8 = 0x4f;
	pub const LASTORE: u8 = 0x50;
	pub const DASTORE: u8 = 0x52;
	pub const SASTORE: u8 = 0x56;
	pub const POP: u8 = 0x57;
	pub const POP2: u8 = 0x58;
	pub const DUP: u8 = 0x59;
	pub const DUP_X1: u8 = 0x5a;
	pub const DUP_X2: u8 = 0x5b;
	pub const DUP2: u8 = 0x5c;
	pub const DUP2_X1: u8 = 0x5d;
	pub const DUP2_X2: u8 = 0x5e;
	pub const SWAP: u8 = 0x5f;
	pub const IADD: u8 = 0x60;
	pub const DREM: u8 = 0x73;
	pub const INEG: u8 = 0x74;
	pub const DNEG: u8 = 0x77;
	pub const ISHL: u8 = 0x78;
	pub const LXOR: u8 = 0x83;
	pub const IINC: u8 = 0x84;
	pub const I2L: u8 = 0x85;
	pub const I2S: u8 = 0x93;
	pub const LCMP: u8 = 0x94;
	pub const DCMPG: u8 = 0x98;
	pub const IFEQ: u8 = 0x99;
	pub const IFLE: u8 = 0x9e;
	pub const IF_ICMPEQ: u8 = 0x9f;
	pub const IF_ACMPNE: u8 = 0xa6;
	pub const GOTO: u8 = 0xa7;
	pub const JSR: u8 = 0xa8;
	pub const RET: u8 = 0xa9;
	pub const TABLESWITCH: u8 = 0xaa;
	pub const LOOKUPSWITCH: u8 = 0xab;
	pub const IRETURN: u8 = 0xac;
	pub const LRETURN: u8 = 0xad;
	pub const FRETURN: u8 = 0xae;
	pub const DRETURN: u8 = 0xaf;
	pub const ARETURN: u8 = 0xb0;
	pub const RETURN: u8 = 0xb1;
	pub const GETSTATIC: u8 = 0xb2;
	pub const PUTSTATIC: u8 = 0xb3;
	pub const GETFIELD: u8 = 0xb4;
	pub const PUTFIELD: u8 = 0xb5;
	pub const INVOKEVIRTUAL: u8 = 0xb6;
	pub const INVOKESPECIAL: u8 = 0xb7;
	pub const INVOKESTATIC: u8 = 0xb8;
	pub const INVOKEINTERFACE: u8 = 0xb9;
	pub const INVOKEDYNAMIC: u8 = 0xba;
	pub const NEW: u8 = 0xbb;
	pub const NEWARRAY: u8 = 0xbc;
	pub const ANEWARRAY: u8 = 0xbd;
	pub const ARRAYLENGTH: u8 = 0xbe;
	pub const ATHROW: u8 = 0xbf;
	pub const CHECKCAST: u8 = 0xc0;
	pub const INSTANCEOF: u8 = 0xc1;
	pub const MONITORENTER: u8 = 0xc2;
	pub const MONITOREXIT: u8 = 0xc3;
	pub const WIDE: u8 = 0xc4;
	pub const MULTIANEWARRAY: u8 = 0xc5;
	pub const IFNULL: u8 = 0xc6;
	pub const IFNONNULL: u8 = 0xc7;
	pub const GOTO_W: u8 = 0xc8;
	pub const JSR_W: u8 = 0xc9;

	const MNEMONICS: [&str; 202] = [
		"nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3", "iconst_4",
		"iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2", "dconst_0", "dconst_1",
		"bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload", "fload",
		"dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0", "lload_1",
		"lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0", "dload_1",
		"dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload", "laload",
		"faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore",
		"fstore", "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0",
		"lstore_1", "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3", "dstore_0",
		"dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2", "astore_3", "iastore",
		"lastore", "fastore", "dastore", "aastore", "bastore", "castore", "sastore", "pop",
		"pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap",
		"iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub",
		"imul", "lmul", "fmul", "dmul", "idiv", "ldiv", "fdiv", "ddiv",
		"irem", "lrem", "frem", "drem", "ineg", "lneg", "fneg", "dneg",
		"ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land",
		"ior", "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d",
		"l2i", "l2f", "l2d", "f2i", "f2l", "f2d", "d2i", "d2l",
		"d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl",
		"dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq",
		"if_icmpne", "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto",
		"jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn",
		"areturn", "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual", "invokespecial",
		"invokestatic", "invokeinterface", "invokedynamic", "new", "newarray", "anewarray", "arraylength", "athrow",
		"checkcast", "instanceof", "monitorenter", "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull",
		"goto_w", "jsr_w",
	];

	/// Returns `true` for the opcodes that only exist as a compact encoding of another one.
	pub fn is_compact_form(opcode: u8) -> bool {
		matches!(opcode, LDC_W | LDC2_W | ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 | WIDE | GOTO_W | JSR_W)
	}

	/// The mnemonic of a normalized opcode.
	pub fn name(opcode: u8) -> Option<&'static str> {
		if is_compact_form(opcode) {
			return None;
		}
		MNEMONICS.get(opcode as usize).copied()
	}

	/// The normalized opcode with the given mnemonic.
	pub fn from_name(name: &str) -> Option<u8> {
		MNEMONICS.iter()
			.position(|&x| x == name)
			.and_then(|i| u8::try_from(i).ok())
			.filter(|&opcode| !is_compact_form(opcode))
	}

	/// Conditional and unconditional jumps with a single label operand.
	pub fn is_jump(opcode: u8) -> bool {
		matches!(opcode, IFEQ..=JSR | IFNULL | IFNONNULL)
	}

	/// The opcode of the conditional jump with the opposite condition.
	pub(crate) fn invert_condition(opcode: u8) -> Option<u8> {
		match opcode {
			IFNULL => Some(IFNONNULL),
			IFNONNULL => Some(IFNULL),
			// these come in pairs: ifeq/ifne, iflt/ifge, ..., if_acmpeq/if_acmpne
			IFEQ..=IF_ACMPNE => Some(if (opcode - IFEQ) % 2 == 0 { opcode + 1 } else { opcode - 1 }),
			_ => None,
		}
	}

	pub fn is_return(opcode: u8) -> bool {
		(IRETURN..=RETURN).contains(&opcode)
	}

	/// Opcodes after which execution never falls through to the next instruction.
	pub fn ends_block(opcode: u8) -> bool {
		is_return(opcode) || matches!(opcode, GOTO | ATHROW | RET | TABLESWITCH | LOOKUPSWITCH)
	}

	#[cfg(test)]
	mod testing {
		use pretty_assertions::assert_eq;
		use super::*;

		#[test]
		fn mnemonics() {
			assert_eq!(name(IADD), Some("iadd"));
			assert_eq!(name(GOTO_W), None);
			assert_eq!(name(JSR_W), None);
			assert_eq!(name(0xca), None);
			assert_eq!(from_name("invokedynamic"), Some(INVOKEDYNAMIC));
			assert_eq!(from_name("iload_0"), None);
			assert_eq!(from_name("frobnicate"), None);
			for opcode in 0..=JSR_W {
				if let Some(name) = name(opcode) {
					assert_eq!(from_name(name), Some(opcode));
				}
			}
		}

		#[test]
		fn inverted_conditions() {
			assert_eq!(invert_condition(IFEQ), Some(IFEQ + 1));
			assert_eq!(invert_condition(IFEQ + 1), Some(IFEQ));
			assert_eq!(invert_condition(IF_ACMPNE), Some(IF_ACMPNE - 1));
			assert_eq!(invert_condition(IFNULL), Some(IFNONNULL));
			assert_eq!(invert_condition(GOTO), None);
		}
	}
}
