use std::fs::File;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::{error, info, LevelFilter};
use serde::Serialize;
use walkdir::WalkDir;
use xmir::error;
use xmir::naming::document_path;
use xmir::{translate_all, Artifact, BatchPolicy, Direction, SerializeOptions};

#[derive(Debug, Parser)]
struct Cli {
	/// Be verbose. Give twice for even more output.
	#[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Translates all `.class` files below a directory into documents
	Disassemble {
		input: PathBuf,
		output: PathBuf,
		/// Add a readable comment to each instruction.
		#[arg(long)]
		comments: bool,
		/// Add a listing of the whole class to each document.
		#[arg(long)]
		listing: bool,
		/// Stop at the first class that fails to translate.
		#[arg(long)]
		fail_fast: bool,
		/// Write the outcome of each class as JSON to this file.
		#[arg(long)]
		report: Option<PathBuf>,
	},
	/// Translates all `.xmir` documents below a directory back into class files
	Assemble {
		input: PathBuf,
		output: PathBuf,
		/// Stop at the first document that fails to translate.
		#[arg(long)]
		fail_fast: bool,
		/// Write the outcome of each document as JSON to this file.
		#[arg(long)]
		report: Option<PathBuf>,
	},
}

fn setup_logging(verbose: u8) -> Result<()> {
	let level = match verbose {
		0 => LevelFilter::Info,
		1 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	fern::Dispatch::new()
		.format(|out, message, record| {
			out.finish(format_args!("[{} {}] {}", record.level(), record.target(), message))
		})
		.level(level)
		.chain(std::io::stderr())
		.apply()
		.context("failed to set up logging")
}

fn collect_files(base_directory: &Path, extension: &str) -> Result<Vec<(String, PathBuf)>> {
	let mut files = Vec::new();
	for entry in WalkDir::new(base_directory).sort_by_file_name() {
		let entry = entry.with_context(|| anyhow!("failed to walk directory {base_directory:?}"))?;
		let path = entry.path();
		if entry.file_type().is_file() && path.extension().is_some_and(|e| e == extension) {
			let relative = path.strip_prefix(base_directory)
				.with_context(|| anyhow!("{path:?} isn't inside of {base_directory:?}"))?;
			files.push((relative.display().to_string(), path.to_owned()));
		}
	}
	Ok(files)
}

async fn read_inputs(files: Vec<(String, PathBuf)>) -> Result<Vec<(String, Vec<u8>)>> {
	let mut inputs = Vec::with_capacity(files.len());
	for (id, path) in files {
		let bytes = tokio::fs::read(&path).await
			.with_context(|| anyhow!("failed to read {path:?}"))?;
		inputs.push((id, bytes));
	}
	Ok(inputs)
}

async fn write_artifact(output: &Path, relative: PathBuf, artifact: &Artifact) -> Result<()> {
	let path = output.join(relative);
	if let Some(parent) = path.parent() {
		tokio::fs::create_dir_all(parent).await
			.with_context(|| anyhow!("failed to create directory {parent:?}"))?;
	}
	tokio::fs::write(&path, &artifact.bytes).await
		.with_context(|| anyhow!("failed to write {path:?}"))
}

#[derive(Debug, Serialize)]
struct ReportEntry {
	input: String,
	class: Option<String>,
	/// The name of the error kind, or `binary` for failures outside of the documents.
	error: Option<&'static str>,
	message: Option<String>,
}

fn write_report(path: &Path, entries: &[ReportEntry]) -> Result<()> {
	let file = File::create(path).with_context(|| anyhow!("failed to create report file {path:?}"))?;
	serde_json::to_writer_pretty(file, entries).with_context(|| anyhow!("failed to write report to {path:?}"))
}

async fn run(
	input: &Path,
	output: &Path,
	direction: Direction,
	fail_fast: bool,
	report: Option<&Path>,
) -> Result<()> {
	let extension = match direction {
		Direction::ToDocument { .. } => "class",
		Direction::ToBinary => "xmir",
	};
	let files = collect_files(input, extension)?;
	info!("translating {} .{extension} files from {input:?}", files.len());

	let policy = if fail_fast { BatchPolicy::FailFast } else { BatchPolicy::CollectAll };
	let outcomes = translate_all(read_inputs(files).await?, direction, policy).await;

	let mut entries = Vec::with_capacity(outcomes.len());
	let mut failures = 0;
	for (id, outcome) in outcomes {
		match outcome {
			Ok(artifact) => {
				let relative = match direction {
					Direction::ToDocument { .. } => document_path(&artifact.class_name),
					Direction::ToBinary => PathBuf::from(format!("{}.class", artifact.class_name)),
				};
				write_artifact(output, relative, &artifact).await?;
				entries.push(ReportEntry { input: id, class: Some(artifact.class_name), error: None, message: None });
			},
			Err(e) => {
				failures += 1;
				error!("{e:#}");
				let kind = error::kind(&e).map_or("binary", |kind| kind.name());
				entries.push(ReportEntry { input: id, class: None, error: Some(kind), message: Some(format!("{e:#}")) });
			},
		}
	}

	if let Some(report) = report {
		write_report(report, &entries)?;
	}
	info!("translated {} of {} files into {output:?}", entries.len() - failures, entries.len());
	if failures > 0 {
		bail!("{failures} files failed to translate");
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	setup_logging(cli.verbose)?;

	match cli.command {
		Command::Disassemble { input, output, comments, listing, fail_fast, report } => {
			let direction = Direction::ToDocument { options: SerializeOptions { comments, listing } };
			run(&input, &output, direction, fail_fast, report.as_deref()).await
		},
		Command::Assemble { input, output, fail_fast, report } => {
			run(&input, &output, Direction::ToBinary, fail_fast, report.as_deref()).await
		},
	}
}
