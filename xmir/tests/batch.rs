use anyhow::Result;
use pretty_assertions::assert_eq;
use cafe::constants::{access, opcode};
use cafe::{ClassEvent, ClassHeader, CodeEvent, Insn, MethodHeader, Version};
use xmir::error::{self, CodecError};
use xmir::{translate_all, BatchPolicy, Direction, SerializeOptions};

fn constant_class(name: &str, value: i32) -> Result<Vec<u8>> {
	cafe::write_events([
		ClassEvent::Class(ClassHeader {
			version: Version { major: 52, minor: 0 },
			access: access::PUBLIC | access::SUPER,
			name: name.to_owned(),
			super_class: Some("java/lang/Object".to_owned()),
			interfaces: Vec::new(),
		}),
		ClassEvent::Method(MethodHeader {
			access: access::PUBLIC | access::STATIC,
			name: "get".to_owned(),
			descriptor: "()I".to_owned(),
			exceptions: Vec::new(),
		}),
		ClassEvent::Code(CodeEvent::Insn(Insn::Int(opcode::SIPUSH, value))),
		ClassEvent::Code(CodeEvent::Insn(Insn::Simple(opcode::IRETURN))),
		ClassEvent::End,
	])
}

fn to_document() -> Direction {
	Direction::ToDocument { options: SerializeOptions::default() }
}

#[tokio::test]
async fn outcomes_keep_the_input_order() -> Result<()> {
	let inputs = (0..20)
		.map(|i| Ok((format!("demo/C{i}.class"), constant_class(&format!("demo/C{i}"), i * 10)?)))
		.collect::<Result<Vec<_>>>()?;

	let outcomes = translate_all(inputs, to_document(), BatchPolicy::CollectAll).await;
	assert_eq!(outcomes.len(), 20);
	for (i, (id, outcome)) in outcomes.into_iter().enumerate() {
		assert_eq!(id, format!("demo/C{i}.class"));
		assert_eq!(outcome?.class_name, format!("demo/C{i}"));
	}
	Ok(())
}

#[tokio::test]
async fn there_and_back_again() -> Result<()> {
	let original = constant_class("demo/Both", 300)?;
	let documents = translate_all(vec![("demo/Both.class".to_owned(), original.clone())], to_document(), BatchPolicy::FailFast).await;

	let inputs = documents.into_iter()
		.map(|(_, outcome)| Ok(("demo/Both.xmir".to_owned(), outcome?.bytes)))
		.collect::<Result<Vec<_>>>()?;
	let classes = translate_all(inputs, Direction::ToBinary, BatchPolicy::FailFast).await;

	assert_eq!(classes.len(), 1);
	let (id, outcome) = classes.into_iter().next().expect("one outcome");
	assert_eq!(id, "demo/Both.xmir");
	let artifact = outcome?;
	assert_eq!(artifact.class_name, "demo/Both");
	assert_eq!(cafe::read_events(&artifact.bytes)?, cafe::read_events(&original)?);
	Ok(())
}

#[tokio::test]
async fn a_broken_class_doesnt_affect_the_others() -> Result<()> {
	let good = String::from_utf8(translate_all(
		vec![("good".to_owned(), constant_class("demo/Good", 1)?)],
		to_document(),
		BatchPolicy::CollectAll,
	).await.remove(0).1?.bytes)?;
	let future = good.replace("schema=\"1\"", "schema=\"2\"");

	let inputs = vec![
		("good.xmir".to_owned(), good.into_bytes()),
		("future.xmir".to_owned(), future.into_bytes()),
		("junk.xmir".to_owned(), b"\xFF\xFE".to_vec()),
	];
	let outcomes = translate_all(inputs, Direction::ToBinary, BatchPolicy::CollectAll).await;

	let ids: Vec<_> = outcomes.iter().map(|(id, outcome)| (id.as_str(), outcome.is_ok())).collect();
	assert_eq!(ids, vec![("good.xmir", true), ("future.xmir", false), ("junk.xmir", false)]);

	let future = outcomes[1].1.as_ref().unwrap_err();
	assert_eq!(error::kind(future), Some(&CodecError::UnsupportedSchemaVersion("2".to_owned())));
	assert!(format!("{future:#}").contains("future.xmir"));
	Ok(())
}

#[tokio::test]
async fn fail_fast_stops_at_a_failure() -> Result<()> {
	let mut inputs = vec![("broken.class".to_owned(), b"\xCA\xFE\xBA\xBE".to_vec())];
	for i in 0..50 {
		inputs.push((format!("demo/C{i}.class"), constant_class(&format!("demo/C{i}"), i)?));
	}

	let outcomes = translate_all(inputs, to_document(), BatchPolicy::FailFast).await;

	assert!(outcomes.len() <= 51);
	assert_eq!(outcomes.iter().filter(|(_, outcome)| outcome.is_err()).count(), 1);
	let (id, _) = outcomes.iter().find(|(_, outcome)| outcome.is_err()).expect("the failure is reported");
	assert_eq!(id, "broken.class");
	Ok(())
}
