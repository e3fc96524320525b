//! DCPU-16 assembler.
//!
//! The assembler is a pipeline of named phases (see [`compiler`]) that runs over a batch of compilation units sharing
//! one symbol table. Most users only need [`compile`].

#![allow(clippy::module_name_repetitions)]

use std::fmt::Write;

pub mod address;
pub mod assembler;
pub mod change;
pub mod cli;
pub mod compiler;
mod error;
pub mod parser;
pub mod sema;
pub mod source;
#[cfg(test)] mod test;

pub use address::{Address, AddressRange, AddressRangeIndex, Size};
pub use cli::CompilerOptions;
pub use compiler::{CompilationResult, CompilationUnit, PhaseList, compile, compile_with};
pub use error::{AssemblyError, Marker};
pub use source::{AssemblyCode, FileResolver, MemoryResolver, ResourceResolver};

#[cfg(feature = "binaries")]
shadow_rs::shadow!(buildinfo);

/// Pretty-print byte data as hexadecimal, similar to hex editors. Each line starts with the word address of its first
/// byte, given the word address of the first byte in `bytes`.
#[must_use]
pub fn pretty_hex(bytes: &[u8], start_address: u16) -> String {
	let mut string = String::new();
	// need approximately high nibble + low nibble + ' ' per byte, plus the address
	string.reserve(bytes.len() * 3 + bytes.len() / 16 * 6);
	for (index, line) in bytes.chunks(16).enumerate() {
		#[allow(clippy::cast_possible_truncation)]
		let address = start_address.wrapping_add((index * 8) as u16);
		let _ = write!(string, "{address:04X}:");
		for byte in line {
			let _ = write!(string, " {byte:02X}");
		}
		string.push('\n');
	}
	string
}
