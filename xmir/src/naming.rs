//! Names in documents.
//!
//! Document names only consist of ASCII letters, digits and escapes. An escape starts with `_`, followed by either a
//! single letter from [`ESCAPES`], or `x` and four upper case hex digits for other characters of the basic
//! multilingual plane, or `y` and six hex digits for the rest. Every name has exactly one escaped form.
//!
//! Class names are escaped per package segment, and the segments are joined with `.`. Overloaded members get the
//! escaped descriptor appended after a `-`.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Component, Path, PathBuf};
use anyhow::{bail, Result};
use crate::error::CodecError;

/// The characters with a short escape, and their escape letter.
pub const ESCAPES: [(char, char); 12] = [
	('_', '_'),
	('$', 'd'),
	('/', 's'),
	('<', 'l'),
	('>', 'g'),
	('(', 'p'),
	(')', 'q'),
	(';', 'e'),
	('[', 'a'),
	('.', 'o'),
	('-', 'h'),
	(' ', 'w'),
];

const ESCAPE: char = '_';
const BMP_ESCAPE: char = 'x';
const WIDE_ESCAPE: char = 'y';

const fn check_table() {
	let mut i = 0;
	while i < ESCAPES.len() {
		let (c, letter) = ESCAPES[i];
		assert!(!c.is_ascii_alphanumeric(), "letters and digits are never escaped");
		assert!(letter == ESCAPE || letter.is_ascii_lowercase(), "escape letters must be lower case ascii letters");
		assert!(letter != BMP_ESCAPE && letter != WIDE_ESCAPE, "x and y are reserved for code point escapes");
		let mut j = i + 1;
		while j < ESCAPES.len() {
			assert!(ESCAPES[j].0 != c, "a character has two escapes");
			assert!(ESCAPES[j].1 != letter, "an escape letter is used twice");
			j += 1;
		}
		i += 1;
	}
}

const _: () = check_table();

fn failure(name: &str, reason: impl Into<String>) -> CodecError {
	CodecError::NameEscapingFailure { name: name.to_owned(), reason: reason.into() }
}

fn short_escape(c: char) -> Option<char> {
	ESCAPES.iter().find(|(x, _)| *x == c).map(|(_, letter)| *letter)
}

fn short_unescape(letter: char) -> Option<char> {
	ESCAPES.iter().find(|(_, x)| *x == letter).map(|(c, _)| *c)
}

/// Escapes a name from a class file into a document name.
pub fn escape(name: &str) -> String {
	let mut s = String::with_capacity(name.len());
	for c in name.chars() {
		if c.is_ascii_alphanumeric() {
			s.push(c);
		} else if let Some(letter) = short_escape(c) {
			s.push(ESCAPE);
			s.push(letter);
		} else if (c as u32) <= 0xFFFF {
			// writing to a String can't fail
			let _ = write!(s, "{ESCAPE}{BMP_ESCAPE}{:04X}", c as u32);
		} else {
			let _ = write!(s, "{ESCAPE}{WIDE_ESCAPE}{:06X}", c as u32);
		}
	}
	s
}

/// Reverses [`escape`].
///
/// Fails with [`CodecError::NameEscapingFailure`] for empty names and for anything [`escape`] never produces.
pub fn unescape(name: &str) -> Result<String, CodecError> {
	if name.is_empty() {
		return Err(failure(name, "empty name"));
	}

	let mut s = String::with_capacity(name.len());
	let mut chars = name.chars();
	while let Some(c) = chars.next() {
		if c.is_ascii_alphanumeric() {
			s.push(c);
			continue;
		}
		if c != ESCAPE {
			return Err(failure(name, format!("character {c:?} must be escaped")));
		}

		let letter = chars.next().ok_or_else(|| failure(name, "truncated escape at the end"))?;
		let digits = match letter {
			BMP_ESCAPE => 4,
			WIDE_ESCAPE => 6,
			letter => {
				let c = short_unescape(letter).ok_or_else(|| failure(name, format!("unknown escape {ESCAPE}{letter}")))?;
				s.push(c);
				continue;
			},
		};

		let hex: String = chars.by_ref().take(digits).collect();
		if hex.len() != digits || !hex.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)) {
			return Err(failure(name, format!("expected {digits} upper case hex digits after {ESCAPE}{letter}")));
		}
		let code = u32::from_str_radix(&hex, 16).map_err(|e| failure(name, e.to_string()))?;
		let c = char::from_u32(code).ok_or_else(|| failure(name, format!("{code:#x} is not a valid character")))?;

		let non_canonical = c.is_ascii_alphanumeric() || short_escape(c).is_some() || (letter == WIDE_ESCAPE) != (code > 0xFFFF);
		if non_canonical {
			return Err(failure(name, format!("{ESCAPE}{letter}{hex} is not the canonical escape of {c:?}")));
		}
		s.push(c);
	}
	Ok(s)
}

/// The document name of an internal class name, like `java.lang.Object` for `java/lang/Object`.
pub fn class_to_document(internal: &str) -> String {
	internal.split('/').map(escape).collect::<Vec<_>>().join(".")
}

pub fn class_from_document(name: &str) -> Result<String, CodecError> {
	let segments = name.split('.')
		.map(unescape)
		.collect::<Result<Vec<_>, _>>()
		.map_err(|e| match e {
			CodecError::NameEscapingFailure { reason, .. } => failure(name, reason),
			e => e,
		})?;
	Ok(segments.join("/"))
}

/// The document names of a list of members, given by name and descriptor.
///
/// Members whose name is shared with another one get their escaped descriptor appended, so that every name is
/// distinct, and doesn't depend on the order of the members.
pub fn member_names<'a>(members: impl Iterator<Item=(&'a str, &'a str)> + Clone) -> Vec<String> {
	let mut counts: HashMap<&str, usize> = HashMap::new();
	for (name, _) in members.clone() {
		*counts.entry(name).or_default() += 1;
	}
	members
		.map(|(name, descriptor)| {
			if counts.get(name).copied().unwrap_or(0) > 1 {
				format!("{}-{}", escape(name), escape(descriptor))
			} else {
				escape(name)
			}
		})
		.collect()
}

/// Splits a member's document name into its name and, if present, its descriptor suffix.
pub fn member_from_document(name: &str) -> Result<(String, Option<String>), CodecError> {
	Ok(match name.split_once('-') {
		Some((member, descriptor)) => (unescape(member)?, Some(unescape(descriptor)?)),
		None => (unescape(name)?, None),
	})
}

const EXTENSION: &str = "xmir";

/// The relative path a class's document is stored at, one directory per package segment.
pub fn document_path(internal: &str) -> PathBuf {
	let mut path: PathBuf = internal.split('/').map(escape).collect();
	path.set_extension(EXTENSION);
	path
}

/// Reverses [`document_path`].
pub fn class_name_from_path(path: &Path) -> Result<String> {
	if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
		bail!(failure(&path.display().to_string(), format!("expected a .{EXTENSION} file")));
	}
	let path = path.with_extension("");

	let mut segments = Vec::new();
	for component in path.components() {
		match component {
			Component::Normal(segment) => {
				let Some(segment) = segment.to_str() else {
					bail!(failure(&path.display().to_string(), "path isn't valid unicode"));
				};
				segments.push(unescape(segment)?);
			},
			_ => bail!(failure(&path.display().to_string(), "expected a relative path without `.` and `..`")),
		}
	}
	Ok(segments.join("/"))
}

#[cfg(test)]
mod testing {
	use std::path::Path;
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::error::CodecError;
	use super::*;

	#[test]
	fn escaping() {
		assert_eq!(escape("<init>"), "_linit_g");
		assert_eq!(escape("Outer$Inner"), "Outer_dInner");
		assert_eq!(escape("a_b"), "a__b");
		assert_eq!(escape("(I)V"), "_pI_qV");
		assert_eq!(escape("über"), "_x00FCber");
		assert_eq!(escape("\u{1F600}"), "_y01F600");
	}

	#[test]
	fn bijective() -> Result<()> {
		let names = [
			"<clinit>", "lambda$main$0", "a_b__c", "_", "$", "-", "a-b", "[Ljava/lang/String;", "\u{0}", "ü\u{FFFF}\u{10FFFF}",
			"x", "_x0041", "...", "a b",
		];
		for name in names {
			assert_eq!(unescape(&escape(name))?, name);
		}
		for class in ["java/lang/Object", "Foo", "a/b$c/_d", "[[Ljava/util/Map$Entry;"] {
			assert_eq!(class_from_document(&class_to_document(class))?, class);
		}
		assert_eq!(class_to_document("java/lang/Object"), "java.lang.Object");
		Ok(())
	}

	#[test]
	fn malformed_names() {
		for name in ["", "_", "_z", "_x12", "_x00e9", "_x0041", "_y00005F", "_xD800", "a.b", "a-b", "_y110000", "_x005F"] {
			assert!(
				matches!(unescape(name), Err(CodecError::NameEscapingFailure { .. })),
				"{name:?} should be rejected"
			);
		}
		assert!(class_from_document("java..Object").is_err());
	}

	#[test]
	fn overloads() -> Result<()> {
		let members = [("<init>", "()V"), ("<init>", "(I)V"), ("run", "()V")];
		let names = member_names(members.iter().copied());
		assert_eq!(names, vec!["_linit_g-_p_qV", "_linit_g-_pI_qV", "run"]);

		let reversed = member_names(members.iter().rev().copied());
		assert_eq!(reversed, vec!["run", "_linit_g-_pI_qV", "_linit_g-_p_qV"]);

		assert_eq!(member_from_document(&names[1])?, ("<init>".to_owned(), Some("(I)V".to_owned())));
		assert_eq!(member_from_document("run")?, ("run".to_owned(), None));
		Ok(())
	}

	#[test]
	fn paths() -> Result<()> {
		let path = document_path("org/example/Main$1");
		assert_eq!(path, Path::new("org").join("example").join("Main_d1.xmir"));
		assert_eq!(class_name_from_path(&path)?, "org/example/Main$1");
		assert!(class_name_from_path(Path::new("org/Main.class")).is_err());
		assert!(class_name_from_path(Path::new("../Main.xmir")).is_err());
		Ok(())
	}
}
