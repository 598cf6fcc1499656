use std::collections::BTreeMap;
use anyhow::{anyhow, bail, Context, Result};
use crate::event::Label;

/// A helper struct for turning bytecode offsets into [`Label`]s.
///
/// Offsets are first collected with [`Labels::create`], then [`Labels::number`] gives them ids in ascending offset
/// order, so that the same code always gets the same labels.
pub(crate) struct Labels {
	code_length: u16,
	labels: BTreeMap<u16, Label>,
}

impl Labels {
	pub(crate) fn new(code_length: u16) -> Labels {
		Labels {
			code_length,
			labels: BTreeMap::new(),
		}
	}

	/// Marks the offset as needing a label. `pc` may be the end of the code.
	pub(crate) fn create(&mut self, pc: u16) -> Result<()> {
		if pc > self.code_length {
			bail!("label for bytecode offset {pc:?} out of bounds for code length {:?}", self.code_length);
		}
		self.labels.insert(pc, Label(0));
		Ok(())
	}

	pub(crate) fn number(&mut self) {
		for (id, label) in self.labels.values_mut().enumerate() {
			*label = Label(id as u32);
		}
	}

	pub(crate) fn offsets(&self) -> impl Iterator<Item=u16> + '_ {
		self.labels.keys().copied()
	}

	pub(crate) fn try_get(&self, pc: u16) -> Result<Label> {
		self.get(pc).with_context(|| anyhow!("no label at bytecode offset {pc:?}"))
	}

	pub(crate) fn get(&self, pc: u16) -> Option<Label> {
		self.labels.get(&pc).copied()
	}

	/// Maps a label created from a raw offset (as in `Label(offset)`) to its numbered label.
	pub(crate) fn resolve(&self, raw: Label) -> Result<Label> {
		let pc = u16::try_from(raw.0).with_context(|| anyhow!("bytecode offset {} too large", raw.0))?;
		self.try_get(pc)
	}
}

#[cfg(test)]
mod testing {
	use anyhow::Result;
	use pretty_assertions::assert_eq;
	use crate::event::Label;
	use super::Labels;

	#[test]
	fn numbered_in_offset_order() -> Result<()> {
		let mut labels = Labels::new(20);
		labels.create(17)?;
		labels.create(3)?;
		labels.create(20)?;
		labels.create(3)?;
		assert!(labels.create(21).is_err());
		labels.number();
		assert_eq!(labels.get(3), Some(Label(0)));
		assert_eq!(labels.get(17), Some(Label(1)));
		assert_eq!(labels.resolve(Label(20))?, Label(2));
		assert_eq!(labels.get(4), None);
		Ok(())
	}
}
