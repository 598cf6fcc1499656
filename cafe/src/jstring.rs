//! Conversion between the modified UTF-8 of the constant pool and strings.
//!
//! Names and descriptors are read into [`String`]s, string constants stay [`JavaString`]s so that unpaired surrogates
//! survive.
//!
//! See <https://docs.oracle.com/javase/specs/jvms/se22/html/jvms-4.html#jvms-4.4.7>.

use std::borrow::Cow;
use anyhow::{anyhow, Context, Result};
use java_string::{JavaStr, JavaString};

pub(crate) fn from_vec_to_java_string(vec: Vec<u8>) -> Result<JavaString> {
	JavaString::from_modified_utf8(vec)
		.with_context(|| anyhow!("invalid java utf8 contents"))
}

pub(crate) fn from_vec_to_string(vec: Vec<u8>) -> Result<String> {
	from_vec_to_java_string(vec)?
		.into_string()
		.map_err(|_| anyhow!("name contains an unpaired surrogate"))
}

pub(crate) fn from_string_to_vec(string: &JavaStr) -> Cow<[u8]> {
	string.to_modified_utf8()
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use java_string::JavaStr;
	use pretty_assertions::assert_eq;
	use crate::jstring::{from_string_to_vec, from_vec_to_java_string, from_vec_to_string};

	#[test]
	fn nul_takes_two_bytes() -> Result<()> {
		let raw = vec![b'a', 0b1100_0000, 0b1000_0000, b'b'];
		assert_eq!(from_vec_to_string(raw.clone())?, "a\0b");
		assert_eq!(from_string_to_vec(JavaStr::from_str("a\0b")), raw);
		Ok(())
	}

	#[test]
	fn supplementary_characters_are_surrogate_pairs() -> Result<()> {
		let raw = vec![0b1110_1101, 0b1010_0000, 0b1000_0000, 0b1110_1101, 0b1011_0000, 0b1000_0000];
		assert_eq!(from_vec_to_string(raw.clone())?, "\u{010000}");
		assert_eq!(from_string_to_vec(JavaStr::from_str("\u{010000}")), raw);
		Ok(())
	}

	#[test]
	fn unpaired_surrogate() -> Result<()> {
		let raw = vec![0b1110_1101, 0b1010_0000, 0b1000_0000];
		let string = from_vec_to_java_string(raw.clone())?;
		assert_eq!(from_string_to_vec(&string), raw);
		assert!(from_vec_to_string(raw).is_err());
		Ok(())
	}
}
