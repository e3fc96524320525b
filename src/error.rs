//! Error and diagnostic types.

use std::num::ParseIntError;
use std::sync::Arc;

use flexstr::SharedStr;
use miette::{Diagnostic, Severity, SourceSpan};
use thiserror::Error;

use crate::AssemblyCode;
use crate::address::AddressError;
use crate::assembler::writer::WriterError;
use crate::parser::Token;
use crate::sema::OperandPosition;
use crate::sema::instruction::Mnemonic;

/// All types of errors that the assembler can report to the user.
#[derive(Error, Debug, Diagnostic)]
#[allow(clippy::module_name_repetitions, missing_docs)]
pub enum AssemblyError {
	//#region Syntax errors: detected in the lexer and the parser
	#[error("Unexpected character {chr}")]
	#[diagnostic(code(dcpuasm::syntax::unexpected_character), severity(Error))]
	UnexpectedCharacter {
		chr:      char,
		#[label("Unexpected")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Invalid number: {error}")]
	#[diagnostic(code(dcpuasm::syntax::invalid_number), severity(Error))]
	InvalidNumber {
		error:    ParseIntError,
		#[label("{error}")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Unterminated string or character literal")]
	#[diagnostic(code(dcpuasm::syntax::unterminated_string), help("Add the missing closing quote"), severity(Error))]
	UnterminatedString {
		#[label("Literal starts here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Expected {expected}")]
	#[diagnostic(code(dcpuasm::syntax::expected_token), severity(Error))]
	ExpectedToken {
		expected: SharedStr,
		actual:   Token,
		#[label("This {actual} is invalid here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Expected {expected}, but the line ended")]
	#[diagnostic(code(dcpuasm::syntax::unexpected_end_of_line), severity(Error))]
	UnexpectedEndOfLine {
		expected: SharedStr,
		#[label("There should be more here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("`{constant}` is not valid for {typename}")]
	#[diagnostic(code(dcpuasm::syntax::invalid_constant), severity(Error))]
	InvalidConstant {
		constant: SharedStr,
		typename: SharedStr,
		#[label("Invalid {typename}")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Macro '{name}' is never closed")]
	#[diagnostic(code(dcpuasm::syntax::missing_endmacro), help("End the macro body with `.endmacro`"), severity(Error))]
	MissingEndMacro {
		name:     SharedStr,
		#[label("Macro defined here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Macros cannot be defined inside other macros")]
	#[diagnostic(code(dcpuasm::syntax::nested_macro_definition), severity(Error))]
	NestedMacroDefinition {
		#[label("Inner macro definition")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("`.endmacro` without a macro definition")]
	#[diagnostic(code(dcpuasm::syntax::stray_endmacro), severity(Error))]
	StrayEndMacro {
		#[label("Nothing to end here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},
	//#endregion

	//#region Resource errors
	#[error("File \"{file_name}\" was not found")]
	#[diagnostic(code(dcpuasm::file_not_found), severity(Error))]
	FileNotFound {
		#[source]
		os_error:  Arc<std::io::Error>,
		file_name: SharedStr,
		#[label("File was requested here")]
		location:  SourceSpan,
		#[source_code]
		src:       Arc<AssemblyCode>,
	},

	#[error("Include cycle detected while trying to include \"{cycle_trigger_file}\"")]
	#[diagnostic(
		code(dcpuasm::include_cycle),
		severity(Error),
		help(
			"This file was included:\n{}",
			src.include_path.iter().map(|path| format!("from {}", path.to_string_lossy())).collect::<Vec<_>>().join("\n")
		)
	)]
	IncludeCycle {
		cycle_trigger_file: SharedStr,
		#[label("While trying to include this file")]
		include:            SourceSpan,
		#[source_code]
		src:                Arc<AssemblyCode>,
	},
	//#endregion

	//#region Symbol errors
	#[error("Symbol '{name}' is not defined")]
	#[diagnostic(
		code(dcpuasm::unknown_symbol),
		severity(Error),
		help("Any symbol must be defined somewhere. Did you misspell its name?")
	)]
	UnknownSymbol {
		name:     SharedStr,
		#[label("Used here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("There is no global label defined before the local label '{local_label}'")]
	#[diagnostic(
		code(dcpuasm::missing_global),
		help("Add a global label before using this local label"),
		severity(Error)
	)]
	MissingGlobalLabel {
		local_label: SharedStr,
		#[label("Local label used here")]
		location:    SourceSpan,
		#[source_code]
		src:         Arc<AssemblyCode>,
	},

	#[error("Local labels are not supported")]
	#[diagnostic(
		code(dcpuasm::local_labels_disabled),
		help("Local label support was disabled in the compiler options; rename '.{local_label}' to a global label"),
		severity(Error)
	)]
	LocalLabelsDisabled {
		local_label: SharedStr,
		#[label("Local label")]
		location:    SourceSpan,
		#[source_code]
		src:         Arc<AssemblyCode>,
	},

	#[error("Symbol '{name}' is defined more than once")]
	#[diagnostic(code(dcpuasm::redefined_symbol), help("The first definition is at {first_definition}"), severity(Error))]
	RedefinedSymbol {
		name:             SharedStr,
		first_definition: SharedStr,
		#[label("Redefined here")]
		location:         SourceSpan,
		#[source_code]
		src:              Arc<AssemblyCode>,
	},

	#[error("Equation '{name}' depends on itself")]
	#[diagnostic(code(dcpuasm::cyclic_equation), help("The dependency cycle is {cycle}"), severity(Error))]
	CyclicEquation {
		name:     SharedStr,
		cycle:    SharedStr,
		#[label("Cyclic equation used here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("'{name}' is not a macro")]
	#[diagnostic(code(dcpuasm::unknown_macro), help("Define the macro with `.macro {name}` before using it"), severity(Error))]
	UnknownMacro {
		name:     SharedStr,
		#[label("Used as a macro here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Macro '{name}' takes {expected_number} arguments, but {actual_number} were supplied")]
	#[diagnostic(code(dcpuasm::argument_mismatch), severity(Error))]
	IncorrectNumberOfMacroArguments {
		name:            SharedStr,
		expected_number: usize,
		actual_number:   usize,
		#[label("In this macro call")]
		location:        SourceSpan,
		#[source_code]
		src:             Arc<AssemblyCode>,
	},

	#[error("Maximum macro expansion depth {depth} exceeded while expanding '{name}'")]
	#[diagnostic(
		code(dcpuasm::recursive_macro),
		help("This is most likely caused by an infinitely recursive macro definition"),
		severity(Error)
	)]
	RecursiveMacroUse {
		name:     SharedStr,
		depth:    usize,
		#[label("While trying to expand this macro")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Expansion of macro '{name}' failed")]
	#[diagnostic(code(dcpuasm::macro_expansion_failed), severity(Error))]
	MacroExpansionFailed {
		name:     SharedStr,
		#[related]
		errors:   Vec<AssemblyError>,
		#[label("In this macro call")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},
	//#endregion

	//#region Encoding and value errors
	#[error("`{mnemonic}` takes {expected} operand(s), but {actual} were given")]
	#[diagnostic(code(dcpuasm::wrong_operand_count), severity(Error))]
	WrongOperandCount {
		mnemonic: Mnemonic,
		expected: usize,
		actual:   usize,
		#[label("For this instruction")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Invalid addressing mode `{mode}` as {position} operand for `{mnemonic}`")]
	#[diagnostic(code(dcpuasm::invalid_addressing_mode), severity(Error))]
	IllegalAddressingMode {
		mode:     SharedStr,
		position: OperandPosition,
		mnemonic: Mnemonic,
		#[label("This operand")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("The value {value} does not fit into 16 bits")]
	#[diagnostic(
		code(dcpuasm::value_out_of_range),
		help("Values must lie between -32768 and 65535 inclusive"),
		severity(Error)
	)]
	ValueOutOfRange {
		value:    i64,
		#[label("This value")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("The value {value} does not fit into 16 bits and is truncated to {truncated:04X}")]
	#[diagnostic(code(dcpuasm::value_truncated), help("Remove the upper bits"), severity(Warning))]
	ValueTruncated {
		value:     i64,
		truncated: u16,
		#[label("This value")]
		location:  SourceSpan,
		#[source_code]
		src:       Arc<AssemblyCode>,
	},

	#[error("Origin {origin:04X} lies before the current address {current:04X}")]
	#[diagnostic(code(dcpuasm::origin_moves_backwards), help("Output is written in ascending order"), severity(Error))]
	OriginMovesBackwards {
		origin:   i64,
		current:  u32,
		#[label("Origin set here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("{error}")]
	#[diagnostic(code(dcpuasm::address_out_of_range), severity(Error))]
	AddressOutOfRange {
		error:    AddressError,
		#[label("Address computed here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Division by zero")]
	#[diagnostic(code(dcpuasm::division_by_zero), severity(Error))]
	DivisionByZero {
		#[label("In this expression")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Output at {range} overlaps previously written output")]
	#[diagnostic(code(dcpuasm::overlapping_output), severity(Warning))]
	OverlappingOutput {
		range:    SharedStr,
		#[label("Written here")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},
	//#endregion

	//#region Internal errors: these indicate bugs in the assembler
	#[error("Label is placed at the odd byte offset {offset:#x}")]
	#[diagnostic(
		code(dcpuasm::internal::odd_byte_offset),
		help("This is a bug in the assembler, please report it"),
		severity(Error)
	)]
	OddByteOffset {
		offset:   u32,
		#[label("This label")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Internal error: {cause}")]
	#[diagnostic(
		code(dcpuasm::internal::error),
		help("This is a bug in the assembler, please report it"),
		severity(Error)
	)]
	InternalError {
		cause:    SharedStr,
		#[label("While assembling this")]
		location: SourceSpan,
		#[source_code]
		src:      Arc<AssemblyCode>,
	},

	#[error("Writing object code failed")]
	#[diagnostic(code(dcpuasm::internal::output_failed), severity(Error))]
	OutputFailed {
		#[source]
		error: WriterError,
		#[source_code]
		src:   Arc<AssemblyCode>,
	},
	//#endregion
}

impl AssemblyError {
	/// The source code this error refers to.
	#[must_use]
	pub fn source_code(&self) -> &Arc<AssemblyCode> {
		match self {
			Self::UnexpectedCharacter { src, .. }
			| Self::InvalidNumber { src, .. }
			| Self::UnterminatedString { src, .. }
			| Self::ExpectedToken { src, .. }
			| Self::UnexpectedEndOfLine { src, .. }
			| Self::InvalidConstant { src, .. }
			| Self::MissingEndMacro { src, .. }
			| Self::NestedMacroDefinition { src, .. }
			| Self::StrayEndMacro { src, .. }
			| Self::FileNotFound { src, .. }
			| Self::IncludeCycle { src, .. }
			| Self::UnknownSymbol { src, .. }
			| Self::MissingGlobalLabel { src, .. }
			| Self::LocalLabelsDisabled { src, .. }
			| Self::RedefinedSymbol { src, .. }
			| Self::CyclicEquation { src, .. }
			| Self::UnknownMacro { src, .. }
			| Self::IncorrectNumberOfMacroArguments { src, .. }
			| Self::RecursiveMacroUse { src, .. }
			| Self::MacroExpansionFailed { src, .. }
			| Self::WrongOperandCount { src, .. }
			| Self::IllegalAddressingMode { src, .. }
			| Self::ValueOutOfRange { src, .. }
			| Self::ValueTruncated { src, .. }
			| Self::OriginMovesBackwards { src, .. }
			| Self::AddressOutOfRange { src, .. }
			| Self::DivisionByZero { src, .. }
			| Self::OverlappingOutput { src, .. }
			| Self::OddByteOffset { src, .. }
			| Self::InternalError { src, .. }
			| Self::OutputFailed { src, .. } => src,
		}
	}

	/// The main location of this error, if it has one.
	#[must_use]
	pub fn location(&self) -> Option<SourceSpan> {
		self.labels().and_then(|mut labels| labels.next()).map(|label| *label.inner())
	}

	/// Whether this error is an internal error, meaning a bug in the assembler instead of the user's code.
	#[must_use]
	pub const fn is_internal(&self) -> bool {
		matches!(self, Self::OddByteOffset { .. } | Self::InternalError { .. } | Self::OutputFailed { .. })
	}
}

/// A diagnostic attached to a compilation unit.
#[derive(Debug)]
pub struct Marker {
	/// Error or warning.
	pub severity: Severity,
	/// The underlying error.
	pub error:    AssemblyError,
	/// One-based line of the error location within its source, if the error has a location.
	pub line:     Option<usize>,
	/// One-based column of the error location within its source, if the error has a location.
	pub column:   Option<usize>,
}

impl Marker {
	/// Creates a marker for an error, computing its severity and position.
	#[must_use]
	pub fn new(error: AssemblyError) -> Self {
		let severity = error.severity().unwrap_or(Severity::Error);
		let position = error.location().map(|location| error.source_code().line_and_column(location.offset()));
		Self { severity, line: position.map(|(line, _)| line), column: position.map(|(_, column)| column), error }
	}

	/// Whether this marker is an error.
	#[must_use]
	pub fn is_error(&self) -> bool {
		self.severity == Severity::Error
	}

	/// The message of this marker.
	#[must_use]
	pub fn message(&self) -> String {
		self.error.to_string()
	}

	/// The underlying cause of this marker's error, if any.
	#[must_use]
	pub fn cause(&self) -> Option<String> {
		std::error::Error::source(&self.error).map(ToString::to_string)
	}
}

impl From<AssemblyError> for Marker {
	fn from(error: AssemblyError) -> Self {
		Self::new(error)
	}
}

impl From<Box<AssemblyError>> for Marker {
	fn from(error: Box<AssemblyError>) -> Self {
		Self::new(*error)
	}
}
