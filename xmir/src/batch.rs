//! Translating many classes at once.
//!
//! Each class is translated on its own blocking task. Classes share nothing, so a failing class never affects the
//! others, unless [`BatchPolicy::FailFast`] is asked for.

use std::collections::HashMap;
use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use tokio::task::{Id, JoinSet};
use crate::document::Document;
use crate::naming::class_from_document;
use crate::parse::parse;
use crate::serialize::SerializeOptions;
use crate::translate::{disassemble, write_model};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
	/// Class files to documents.
	ToDocument { options: SerializeOptions },
	/// Documents to class files.
	ToBinary,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BatchPolicy {
	/// Translate everything, and report every outcome.
	#[default]
	CollectAll,
	/// Stop at the first failure. Classes not translated by then are left out of the outcomes.
	FailFast,
}

/// A translated class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
	/// The internal name of the class.
	pub class_name: String,
	/// The class file, or the document as XML.
	pub bytes: Vec<u8>,
}

/// Translates a single input.
pub fn translate_one(bytes: &[u8], direction: Direction) -> Result<Artifact> {
	match direction {
		Direction::ToDocument { options } => {
			let document = disassemble(bytes, &options)?;
			let class_name = class_from_document(document.root.required("name")?)?;
			Ok(Artifact { class_name, bytes: document.to_xml()?.into_bytes() })
		},
		Direction::ToBinary => {
			let xml = std::str::from_utf8(bytes).context("document isn't valid utf8")?;
			let document = Document::from_xml(xml)?;
			let model = parse(&document)?;
			let bytes = write_model(&model).with_context(|| anyhow!("failed to write class {:?}", model.name))?;
			Ok(Artifact { class_name: model.name, bytes })
		},
	}
}

/// Translates all inputs, given by an identifier (like a file name) and their contents.
///
/// The outcomes are in the order of the inputs. With [`BatchPolicy::FailFast`], the remaining translations are
/// abandoned after the first failure, and only the outcomes finished until then are returned.
pub async fn translate_all(
	inputs: Vec<(String, Vec<u8>)>,
	direction: Direction,
	policy: BatchPolicy,
) -> Vec<(String, Result<Artifact>)> {
	translate_with(inputs, policy, move |bytes: &[u8]| translate_one(bytes, direction)).await
}

/// Runs `translate` for each input on a blocking task. A task that panics gives a failed outcome for its input.
async fn translate_with<F>(
	inputs: Vec<(String, Vec<u8>)>,
	policy: BatchPolicy,
	translate: F,
) -> Vec<(String, Result<Artifact>)>
where
	F: Fn(&[u8]) -> Result<Artifact> + Clone + Send + 'static,
{
	let mut tasks = JoinSet::new();
	let mut inputs_by_task: HashMap<Id, (usize, String)> = HashMap::new();
	for (index, (id, bytes)) in inputs.into_iter().enumerate() {
		let translate = translate.clone();
		let context = id.clone();
		let handle = tasks.spawn_blocking(move || {
			translate(&bytes).with_context(|| anyhow!("failed to translate {context:?}"))
		});
		inputs_by_task.insert(handle.id(), (index, id));
	}

	let mut outcomes = Vec::new();
	while let Some(joined) = tasks.join_next_with_id().await {
		let (task, outcome) = match joined {
			Ok((task, outcome)) => (task, outcome),
			Err(e) if e.is_cancelled() => continue,
			Err(e) => {
				let task = e.id();
				let id = inputs_by_task.get(&task).map_or("<unknown>", |(_, id)| id.as_str());
				warn!("translation of {id:?} panicked: {e}");
				let outcome = Err(anyhow!("translation of {id:?} panicked: {e}"));
				(task, outcome)
			},
		};
		let Some((index, id)) = inputs_by_task.remove(&task) else {
			warn!("got the outcome of unknown task {task}");
			continue;
		};

		let failed = outcome.is_err();
		match &outcome {
			Ok(artifact) => debug!("translated {id:?} ({:?})", artifact.class_name),
			Err(e) => debug!("{e:#}"),
		}
		outcomes.push((index, id, outcome));

		if failed && policy == BatchPolicy::FailFast {
			tasks.abort_all();
			break;
		}
	}

	outcomes.sort_by_key(|(index, _, _)| *index);
	outcomes.into_iter().map(|(_, id, outcome)| (id, outcome)).collect()
}

#[cfg(test)]
mod testing {
	use pretty_assertions::assert_eq;
	use super::{translate_all, translate_with, Artifact, BatchPolicy, Direction};

	#[tokio::test]
	async fn empty_batch() {
		let outcomes = translate_all(Vec::new(), Direction::ToBinary, BatchPolicy::FailFast).await;
		assert_eq!(outcomes.len(), 0);
	}

	#[tokio::test]
	async fn failures_stay_with_their_input() {
		let inputs = vec![
			("a.xmir".to_owned(), b"<class".to_vec()),
			("b.xmir".to_owned(), b"not xml at all".to_vec()),
		];
		let outcomes = translate_all(inputs, Direction::ToBinary, BatchPolicy::CollectAll).await;
		let ids: Vec<_> = outcomes.iter().map(|(id, outcome)| (id.as_str(), outcome.is_err())).collect();
		assert_eq!(ids, vec![("a.xmir", true), ("b.xmir", true)]);
	}

	#[tokio::test]
	async fn a_panicking_translation_is_a_failure() {
		let inputs = vec![
			("first".to_owned(), b"a".to_vec()),
			("broken".to_owned(), b"b".to_vec()),
			("last".to_owned(), b"c".to_vec()),
		];
		let outcomes = translate_with(inputs, BatchPolicy::CollectAll, |bytes: &[u8]| {
			if bytes == b"b" {
				panic!("can't translate this");
			}
			Ok(Artifact { class_name: String::from_utf8_lossy(bytes).into_owned(), bytes: bytes.to_vec() })
		}).await;

		let ids: Vec<_> = outcomes.iter().map(|(id, outcome)| (id.as_str(), outcome.is_ok())).collect();
		assert_eq!(ids, vec![("first", true), ("broken", false), ("last", true)]);
		let message = format!("{:#}", outcomes[1].1.as_ref().unwrap_err());
		assert!(message.contains("\"broken\" panicked"), "{message}");
	}
}
