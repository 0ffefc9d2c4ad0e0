use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, LevelFilter};
use duke::error::TranslationError;
use duke::frames::{HierarchyOracle, NoHierarchy, ObjectFallback};
use duke::tree::class::ClassFile;
use duke::WriteOptions;
use crate::hierarchy::ClassPathHierarchy;

mod hierarchy;

#[derive(Debug, Parser)]
#[command(version, about = "Assembles and disassembles JVM class files")]
struct Cli {
	/// Log more. Can be given up to three times.
	#[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
	verbose: u8,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Assembles textual class files into binary class files.
	Assemble {
		#[arg(required = true)]
		inputs: Vec<PathBuf>,

		/// The output file, or a directory to write `<ClassName>.class` files into.
		#[arg(short = 'o', long = "output")]
		output: Option<PathBuf>,

		/// Don't compute `StackMapTable` attributes.
		#[arg(long = "no-frames")]
		no_frames: bool,

		/// A directory of class files to look up super classes in when computing frames. Can be repeated.
		#[arg(long = "classpath")]
		classpath: Vec<PathBuf>,

		/// Fail on every merge of two different class types instead of widening them to `java/lang/Object`.
		#[arg(long = "strict-hierarchy", conflicts_with = "classpath")]
		strict_hierarchy: bool,
	},
	/// Disassembles binary class files into the textual format.
	Disassemble {
		#[arg(required = true)]
		inputs: Vec<PathBuf>,

		/// The output file, or a directory to write `<ClassName>.jasm` files into. Defaults to stdout.
		#[arg(short = 'o', long = "output")]
		output: Option<PathBuf>,
	},
}

fn main() -> ExitCode {
	let cli = Cli::parse();

	if let Err(e) = setup_logging(cli.verbose) {
		eprintln!("error: {e:#}");
		return ExitCode::FAILURE;
	}

	let result = match cli.command {
		Command::Assemble { inputs, output, no_frames, classpath, strict_hierarchy } => {
			assemble(&inputs, output.as_deref(), no_frames, &classpath, strict_hierarchy)
		},
		Command::Disassemble { inputs, output } => disassemble(&inputs, output.as_deref()),
	};

	match result {
		Ok(Status::Success) => ExitCode::SUCCESS,
		Ok(Status::Failed(code)) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
		Err(e) => {
			eprintln!("error: {e:#}");
			ExitCode::FAILURE
		},
	}
}

fn setup_logging(verbose: u8) -> Result<()> {
	let level = match verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		_ => LevelFilter::Trace,
	};
	fern::Dispatch::new()
		.format(|out, message, record| out.finish(format_args!("[{}] {message}", record.level())))
		.level(level)
		.chain(std::io::stderr())
		.apply()
		.context("failed to set up logging")
}

/// The outcome of translating all inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
	Success,
	/// At least one input failed, with the exit code of the first failure.
	Failed(i32),
}

impl Status {
	/// Reports the failure of one input, and keeps the exit code of the first failure.
	fn fail(&mut self, input: &Path, e: &anyhow::Error) {
		let kind = TranslationError::of(e);
		eprintln!("error[{}]: {}: {e:#}", kind.map_or("io", TranslationError::kind), input.display());
		if *self == Status::Success {
			*self = Status::Failed(kind.map_or(1, TranslationError::exit_code));
		}
	}
}

fn assemble(inputs: &[PathBuf], output: Option<&Path>, no_frames: bool, classpath: &[PathBuf], strict_hierarchy: bool) -> Result<Status> {
	// parse everything first, so that the class path hierarchy also knows the classes being assembled
	let parsed: Vec<Result<ClassFile>> = inputs.iter()
		.map(|input| {
			let text = std::fs::read_to_string(input)
				.with_context(|| anyhow!("failed to read {input:?}"))?;
			duke::text::parse(&text)
		})
		.collect();

	let class_path_hierarchy;
	let hierarchy: &dyn HierarchyOracle = if strict_hierarchy {
		&NoHierarchy
	} else if !classpath.is_empty() {
		let mut h = ClassPathHierarchy::new(classpath)?;
		for class in parsed.iter().flatten() {
			h.add(class);
		}
		class_path_hierarchy = h;
		&class_path_hierarchy
	} else {
		&ObjectFallback
	};
	let options = WriteOptions {
		compute_frames: !no_frames,
		compute_maxs: true,
		hierarchy,
	};

	let into_directory = inputs.len() > 1 || output.is_some_and(Path::is_dir);
	let mut status = Status::Success;
	for (input, class) in inputs.iter().zip(parsed) {
		let result = class.and_then(|class| {
			let bytes = duke::encode(&class, &options)?;
			let path = match output {
				Some(output) if into_directory => output.join(format!("{}.class", class.name)),
				Some(output) => output.to_owned(),
				None => input.with_extension("class"),
			};
			write_file(&path, &bytes)?;
			info!("assembled {input:?} into {path:?}");
			Ok(())
		});
		if let Err(e) = result {
			status.fail(input, &e);
		}
	}
	Ok(status)
}

fn disassemble(inputs: &[PathBuf], output: Option<&Path>) -> Result<Status> {
	let into_directory = inputs.len() > 1 || output.is_some_and(Path::is_dir);
	let mut status = Status::Success;
	for input in inputs {
		let result = std::fs::read(input)
			.with_context(|| anyhow!("failed to read {input:?}"))
			.and_then(|bytes| duke::decode(&bytes))
			.and_then(|class| {
				let text = duke::text::print(&class)?;
				match output {
					Some(output) if into_directory => {
						let path = output.join(format!("{}.jasm", class.name));
						write_file(&path, text.as_bytes())?;
						info!("disassembled {input:?} into {path:?}");
					},
					Some(output) => {
						write_file(output, text.as_bytes())?;
						info!("disassembled {input:?} into {output:?}");
					},
					None => {
						let mut stdout = std::io::stdout().lock();
						stdout.write_all(text.as_bytes())
							.and_then(|()| stdout.flush())
							.context("failed to write to stdout")?;
					},
				}
				Ok(())
			});
		if let Err(e) = result {
			status.fail(input, &e);
		}
	}
	Ok(status)
}

/// Writes the file, creating its parent directories.
fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
	if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
		std::fs::create_dir_all(parent)
			.with_context(|| anyhow!("failed to create directory {parent:?}"))?;
	}
	let mut writer = BufWriter::new(File::create(path).with_context(|| anyhow!("failed to create {path:?}"))?);
	writer.write_all(contents)
		.and_then(|()| writer.flush())
		.with_context(|| anyhow!("failed to write {path:?}"))
}

#[cfg(test)]
mod testing {
	use std::path::PathBuf;
	use anyhow::Result;
	use clap::Parser;
	use pretty_assertions::assert_eq;
	use crate::{assemble, Cli, Command, Status};

	#[test]
	fn arguments() {
		let cli = Cli::parse_from(["dukeasm", "-vv", "assemble", "a.jasm", "b.jasm", "-o", "out", "--classpath", "lib", "--no-frames"]);
		assert_eq!(cli.verbose, 2);
		match cli.command {
			Command::Assemble { inputs, output, no_frames, classpath, strict_hierarchy } => {
				assert_eq!(inputs.len(), 2);
				assert_eq!(output.as_deref(), Some(std::path::Path::new("out")));
				assert!(no_frames);
				assert_eq!(classpath.len(), 1);
				assert!(!strict_hierarchy);
			},
			command => panic!("wrong command {command:?}"),
		}

		assert!(Cli::try_parse_from(["dukeasm", "assemble", "a.jasm", "--classpath", "lib", "--strict-hierarchy"]).is_err());
		assert!(Cli::try_parse_from(["dukeasm", "disassemble"]).is_err());
	}

	#[test]
	fn assemble_keeps_going_after_a_syntax_error() -> Result<()> {
		let root = std::env::temp_dir().join(format!("dukeasm-assemble-{}", std::process::id()));
		let out = root.join("out");
		std::fs::create_dir_all(&out)?;
		let good = root.join("good.jasm");
		let bad = root.join("bad.jasm");
		std::fs::write(&good, "class a/Good extends java/lang/Object {\n}\n")?;
		std::fs::write(&bad, "class a/Bad extends java/lang/Object {\n\tf()V {\n\t\tFROB\n\t}\n}\n")?;

		let status = assemble(&[bad.clone(), good.clone()], Some(&out), false, &[], false)?;
		assert_eq!(status, Status::Failed(2));
		assert!(out.join("a/Good.class").is_file());
		assert!(!out.join("a/Bad.class").exists());

		// a single input is written beside it
		assert_eq!(assemble(&[good], None, false, &[], false)?, Status::Success);
		assert!(root.join("good.class").is_file());
		assert_eq!(assemble(&[PathBuf::from(&bad)], None, false, &[], false)?, Status::Failed(2));

		std::fs::remove_dir_all(&root)?;
		Ok(())
	}
}
