//! Splitting field and method descriptors.

use anyhow::{bail, Result};

/// Returns the length of the field descriptor at the start of `s`.
fn field_descriptor_len(s: &str) -> Result<usize> {
	let bytes = s.as_bytes();
	let mut i = 0;
	while bytes.get(i) == Some(&b'[') {
		i += 1;
	}
	match bytes.get(i) {
		Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => Ok(i + 1),
		Some(b'L') => {
			let Some(end) = s[i..].find(';') else {
				bail!("unterminated class type in descriptor {s:?}");
			};
			if end == 1 {
				bail!("empty class name in descriptor {s:?}");
			}
			Ok(i + end + 1)
		},
		_ => bail!("invalid field descriptor {s:?}"),
	}
}

/// Checks that `descriptor` is exactly one field descriptor.
pub fn check_field(descriptor: &str) -> Result<()> {
	if field_descriptor_len(descriptor)? != descriptor.len() {
		bail!("trailing characters in field descriptor {descriptor:?}");
	}
	Ok(())
}

/// Splits a method descriptor into its argument descriptors and its return descriptor.
pub fn split_method(descriptor: &str) -> Result<(Vec<&str>, &str)> {
	let Some(mut rest) = descriptor.strip_prefix('(') else {
		bail!("method descriptor {descriptor:?} doesn't start with `(`");
	};
	let mut arguments = Vec::new();
	loop {
		if let Some(r) = rest.strip_prefix(')') {
			rest = r;
			break;
		}
		let len = field_descriptor_len(rest)?;
		arguments.push(&rest[..len]);
		rest = &rest[len..];
	}
	if rest != "V" {
		check_field(rest)?;
	}
	Ok((arguments, rest))
}

/// The number of local variable or stack slots a value of that type takes up.
pub fn slots(descriptor: &str) -> usize {
	match descriptor {
		"V" => 0,
		"J" | "D" => 2,
		_ => 1,
	}
}

/// The number of slots the arguments of a method descriptor take up, not counting `this`.
pub fn argument_slots(descriptor: &str) -> Result<usize> {
	let (arguments, _) = split_method(descriptor)?;
	Ok(arguments.into_iter().map(slots).sum())
}

pub fn return_slots(descriptor: &str) -> Result<usize> {
	let (_, return_type) = split_method(descriptor)?;
	Ok(slots(return_type))
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use super::*;

	#[test]
	fn method_descriptors() -> Result<()> {
		assert_eq!(split_method("()V")?, (vec![], "V"));
		assert_eq!(split_method("(I[[JLjava/lang/String;D)[Ljava/lang/Object;")?,
			(vec!["I", "[[J", "Ljava/lang/String;", "D"], "[Ljava/lang/Object;"));
		assert_eq!(argument_slots("(IJLjava/lang/Object;D)V")?, 6);
		assert_eq!(return_slots("()J")?, 2);
		assert_eq!(return_slots("()V")?, 0);
		Ok(())
	}

	#[test]
	fn invalid_descriptors() {
		assert!(split_method("I)V").is_err());
		assert!(split_method("(I").is_err());
		assert!(split_method("(Ljava/lang/String)V").is_err());
		assert!(split_method("(L;)V").is_err());
		assert!(split_method("()").is_err());
		assert!(check_field("II").is_err());
		assert!(check_field("V").is_err());
		assert!(check_field("[Ljava/lang/String;").is_ok());
	}
}
