//! Command-line interface related structures.

#[cfg(feature = "binaries")] use clap::Args;

/// Options that influence how the compiler translates code. With the `binaries` feature, these are also command line
/// flags.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "binaries", derive(Args))]
#[allow(clippy::struct_excessive_bools)]
pub struct CompilerOptions {
	/// Never encode small literals inline; always use a trailing literal word.
	#[cfg_attr(feature = "binaries", arg(long))]
	pub disable_literal_inlining:        bool,
	/// Encode every operand value at full width so that the output can be relocated. Implies
	/// --disable-literal-inlining.
	#[cfg_attr(feature = "binaries", arg(long, short = 'r'))]
	pub generate_relocation_information: bool,
	/// Downgrade out-of-range values to warnings; such values are truncated to 16 bits.
	#[cfg_attr(feature = "binaries", arg(long))]
	pub relaxed_validation:              bool,
	/// Log symbol tables and addresses while compiling.
	#[cfg_attr(feature = "binaries", arg(long, short = 'd'))]
	pub debug_mode:                      bool,
	/// Whether `.name` local labels are allowed.
	#[cfg_attr(feature = "binaries", arg(long = "no-local-labels", action = clap::ArgAction::SetFalse))]
	pub local_labels_supported:          bool,
	/// Maximum nesting depth of macro expansions, which stops infinitely recursive macros.
	#[cfg_attr(feature = "binaries", arg(long, default_value_t = 16))]
	pub maximum_macro_expansion_depth:   usize,
}

impl Default for CompilerOptions {
	fn default() -> Self {
		Self {
			disable_literal_inlining:        false,
			generate_relocation_information: false,
			relaxed_validation:              false,
			debug_mode:                      false,
			local_labels_supported:          true,
			maximum_macro_expansion_depth:   16,
		}
	}
}

impl CompilerOptions {
	/// Whether small literals may be encoded inline.
	#[must_use]
	pub const fn inline_literals(&self) -> bool {
		!self.disable_literal_inlining && !self.generate_relocation_information
	}
}

#[cfg(feature = "binaries")]
mod clap_dependent {
	use std::path::PathBuf;

	use clap::{Parser, ValueEnum};

	use super::CompilerOptions;
	use crate::buildinfo;

	/// DCPU-16 assembler.
	#[derive(Parser)]
	#[command(version = buildinfo::PKG_VERSION, about, long_about = None)]
	pub struct DcpuasmCli {
		/// Assembly files to assemble. Each file is one compilation unit; all units share their symbols.
		#[arg(required = true)]
		pub inputs:        Vec<PathBuf>,
		/// Binary output file. With several inputs, each unit's output is written to this name with the unit's file
		/// stem appended. Use `-` for standard output, which only takes plain output of a single input.
		#[arg(long, short = 'o')]
		pub output:        Option<PathBuf>,
		#[command(flatten)]
		pub options:       CompilerOptions,
		/// Format to output to.
		///
		/// - plain: Output just the binary data.
		///
		/// - hexdump: Dump hexadecimal representation in a pretty format like in a hex editor.
		#[arg(value_enum, default_value = "plain", long, short = 'f')]
		pub output_format: OutputFormat,
		/// Increase logging verbosity; may be repeated.
		#[arg(long, short = 'v', action = clap::ArgAction::Count)]
		pub verbose:       u8,
	}

	impl DcpuasmCli {
		/// Whether the raw object code is written to standard output.
		#[must_use]
		pub fn writes_plain_output_to_stdout(&self) -> bool {
			self.output_format == OutputFormat::Plain
				&& self.output.as_ref().is_none_or(|output| output.as_os_str() == "-")
		}
	}

	/// Output formats of the binary.
	#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
	#[repr(u8)]
	pub enum OutputFormat {
		/// Raw big-endian words.
		Plain,
		/// Hexadecimal dump.
		#[value(name = "hexdump")]
		HexDump,
	}
}

#[cfg(feature = "binaries")]
pub use clap_dependent::*;

#[cfg(all(test, feature = "binaries"))]
mod test {
	use clap::Parser;

	use super::*;

	#[test]
	fn plain_output_destination() {
		let parse = |arguments: &[&str]| DcpuasmCli::try_parse_from(arguments).unwrap();
		assert!(parse(&["dcpuasm", "a.dasm"]).writes_plain_output_to_stdout());
		assert!(parse(&["dcpuasm", "a.dasm", "b.dasm", "-o", "-"]).writes_plain_output_to_stdout());
		assert!(!parse(&["dcpuasm", "a.dasm", "b.dasm", "-o", "out.bin"]).writes_plain_output_to_stdout());
		assert!(!parse(&["dcpuasm", "a.dasm", "b.dasm", "-f", "hexdump"]).writes_plain_output_to_stdout());
	}
}
