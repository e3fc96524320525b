//! dcpuasm binary.

use std::fs::File;
use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use dcpuasm::assembler::writer::{FileWriterFactory, MemoryWriterFactory, WriterFactory};
use dcpuasm::cli::{DcpuasmCli, OutputFormat};
use dcpuasm::{AssemblyCode, AssemblyError, FileResolver, buildinfo, compile, pretty_hex};
use log::LevelFilter;
use miette::IntoDiagnostic;

fn main() -> miette::Result<()> {
	human_panic::setup_panic!(human_panic::metadata!());
	miette::set_hook(Box::new(|_| {
		Box::new(
			miette::MietteHandlerOpts::new().unicode(true).context_lines(3).tab_width(4).with_cause_chain().build(),
		)
	}))?;

	let arguments = DcpuasmCli::parse();
	let log_level = match arguments.verbose {
		0 => LevelFilter::Warn,
		1 => LevelFilter::Info,
		2 => LevelFilter::Debug,
		3 .. => LevelFilter::Trace,
	};
	simple_logger::SimpleLogger::new().with_level(log_level).init().into_diagnostic()?;
	log::info!("dcpuasm version {}", buildinfo::PKG_VERSION);

	if arguments.writes_plain_output_to_stdout() && arguments.inputs.len() > 1 {
		miette::bail!(
			help = "write to a file with --output, or use --output-format hexdump",
			"plain output of {} units can't be written to standard output",
			arguments.inputs.len()
		);
	}

	let mut sources = Vec::with_capacity(arguments.inputs.len());
	for input in &arguments.inputs {
		let code = AssemblyCode::from_file(input).map_err(|os_error| {
			let file_name = input.to_string_lossy().to_string();
			AssemblyError::FileNotFound {
				os_error:  Arc::new(os_error),
				file_name: file_name.as_str().into(),
				location:  (0, file_name.len()).into(),
				src:       Arc::new(AssemblyCode::new(&file_name, "<<arguments>>")),
			}
		})?;
		sources.push(Arc::new(code));
	}

	// Plain output to a file is streamed; everything else is collected first.
	let file_output = arguments
		.output
		.as_ref()
		.filter(|output| arguments.output_format == OutputFormat::Plain && output.as_os_str() != "-");
	let mut memory_writers = MemoryWriterFactory::new();
	let mut file_writers = file_output.map(|output| FileWriterFactory::new(output.clone(), sources.len()));
	let writers: &mut dyn WriterFactory = match &mut file_writers {
		Some(file_writers) => file_writers,
		None => &mut memory_writers,
	};
	let mut result = compile(sources, arguments.options, &FileResolver, writers);

	let had_errors = result.has_errors();
	for unit in &mut result.units {
		for marker in std::mem::take(&mut unit.markers) {
			eprintln!("{:?}", miette::Report::new(marker.error));
		}
	}
	if had_errors {
		std::process::exit(1);
	}
	if file_writers.is_some() {
		return Ok(());
	}

	let mut output: Box<dyn Write> = match &arguments.output {
		Some(path) if path.as_os_str() != "-" => Box::new(std::io::BufWriter::new(File::create(path).into_diagnostic()?)),
		_ => Box::new(std::io::stdout()),
	};
	for unit in &result.units {
		let Some(data) = memory_writers.output(unit.index) else { continue };
		match arguments.output_format {
			OutputFormat::Plain => output.write_all(&data).into_diagnostic()?,
			OutputFormat::HexDump => {
				if result.units.len() > 1 {
					writeln!(output, "{}:", unit.source.file_name()).into_diagnostic()?;
				}
				#[allow(clippy::cast_possible_truncation)]
				let start_address = (unit.start_offset / 2) as u16;
				write!(output, "{}", pretty_hex(&data, start_address)).into_diagnostic()?;
			},
		}
	}
	output.flush().into_diagnostic()
}
