//! Assembler/codegen
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::sync::Arc;

use log::trace;
use miette::SourceSpan;

use crate::AssemblyCode;
use crate::address::{Address, AddressRange, AddressRangeIndex, advance_offset, words_to_bytes};
use crate::cli::CompilerOptions;
use crate::error::AssemblyError;
use crate::sema::directive::DirectiveValue;
use crate::sema::program::walk;
use crate::sema::{AssemblyTimeValue, ProgramElement, SymbolTable, SymbolView};

pub mod addresses;
pub mod decoder;
pub mod encoder;
pub mod table;
pub mod writer;

pub use addresses::{AddressCalculation, AddressSizing, calculate_addresses};
pub use decoder::{DecodeError, DecodedInstruction, decode};
pub use encoder::{Encoded, encode, encoded_size};
use writer::{ObjectCodeWriter, WriterError};

/// Generates the object code of one unit. Label addresses must be final, and `layout` holds the instruction sizes
/// found by the final address calculation; every instruction is encoded to exactly that size.
///
/// Every contiguous region of output is recorded in `occupied`; output that lands on a region written before (by this
/// or another unit) is reported as a warning.
pub fn generate_code(
	unit: usize,
	content: &[ProgramElement],
	src: &Arc<AssemblyCode>,
	symbols: &SymbolTable,
	options: &CompilerOptions,
	layout: &[u32],
	writer: &mut dyn ObjectCodeWriter,
	occupied: &AddressRangeIndex,
) -> Vec<AssemblyError> {
	let mut generator = CodeGenerator {
		unit,
		symbols,
		options,
		layout: layout.iter(),
		writer,
		occupied,
		errors: Vec::new(),
		region: None,
	};
	walk(content, src, &mut |element, src| generator.element(element, src));
	generator.end_region();
	generator.errors
}

/// Start of the output region currently being written, with the element that started it.
struct Region {
	start:    u32,
	location: SourceSpan,
	src:      Arc<AssemblyCode>,
}

struct CodeGenerator<'a> {
	unit:     usize,
	symbols:  &'a SymbolTable,
	options:  &'a CompilerOptions,
	layout:   std::slice::Iter<'a, u32>,
	writer:   &'a mut dyn ObjectCodeWriter,
	occupied: &'a AddressRangeIndex,
	errors:   Vec<AssemblyError>,
	region:   Option<Region>,
}

impl CodeGenerator<'_> {
	fn element(&mut self, element: &ProgramElement, src: &Arc<AssemblyCode>) {
		match element {
			ProgramElement::Label(label) => {
				let Some(key) = label.key() else { return };
				if self.symbols.get(&key).is_none_or(|symbol| symbol.unit != self.unit) {
					return;
				}
				let offset = self.writer.current_write_offset();
				if self.symbols.label_address(&key).map(|address| u32::from(address) * 2) != Some(offset) {
					self.errors.push(AssemblyError::InternalError {
						cause:    format!(
							"label {key} is placed at {:?}, but its code starts at word {:04X}",
							self.symbols.label_address(&key),
							offset / 2
						)
						.into(),
						location: label.span,
						src:      src.clone(),
					});
				}
			},
			ProgramElement::Instruction(instruction) => {
				let recorded_size = self.layout.next().copied();
				let view = SymbolView::new(self.symbols);
				let mut encoded = encode(instruction, &view, self.options, src);
				// Address calculation may have kept a label value at full width that turned out to be small.
				if let (Some(recorded_size), Ok(result)) = (recorded_size, &encoded)
					&& result.size_in_bytes().is_some_and(|size| size != recorded_size)
				{
					encoded = encode(instruction, &view.without_address_inlining(), self.options, src);
				}
				match encoded {
					Ok(Encoded::Words(words)) if recorded_size.is_none_or(|size| size as usize == words.len() * 2) => {
						trace!("{:04X}: {instruction} = {words:04X?}", self.writer.current_write_offset() / 2);
						self.write(&words, instruction.span, src);
					},
					Ok(Encoded::Words(words)) => self.errors.push(AssemblyError::InternalError {
						cause:    format!(
							"`{instruction}` was laid out with {} bytes, but encodes to {words:04X?}",
							recorded_size.unwrap_or_default()
						)
						.into(),
						location: instruction.span,
						src:      src.clone(),
					}),
					Ok(Encoded::Unknown) => self.errors.push(AssemblyError::InternalError {
						cause:    format!("operands of `{instruction}` are unknown during code generation").into(),
						location: instruction.span,
						src:      src.clone(),
					}),
					Err(error) => self.errors.push(*error),
				}
			},
			ProgramElement::Directive(directive) => match &directive.value {
				DirectiveValue::Origin(value) => {
					let Some(origin) = self.evaluate(value, directive.span, src) else { return };
					let offset = match Address::word(origin) {
						Ok(address) => address.to_byte(),
						Err(error) => {
							self.errors.push(AssemblyError::AddressOutOfRange {
								error,
								location: directive.span,
								src: src.clone(),
							});
							return;
						},
					};
					if offset != self.writer.current_write_offset() {
						self.end_region();
					}
					if let Err(error) = self.writer.advance_to_write_offset(offset) {
						self.output_failed(error, src);
					}
				},
				DirectiveValue::Data(values) => {
					let words = values
						.iter()
						.map(|value| self.evaluate(value, directive.span, src).map(|value| value as u16))
						.collect::<Option<Vec<_>>>();
					if let Some(words) = words {
						self.write(&words, directive.span, src);
					}
				},
				DirectiveValue::Reserve(value) => {
					let Some(length) = self.evaluate(value, directive.span, src) else { return };
					let bytes = words_to_bytes(length)
						.and_then(|bytes| advance_offset(self.writer.current_write_offset(), bytes).map(|_| bytes));
					match bytes {
						Ok(bytes) => self.write(&vec![0; bytes as usize / 2], directive.span, src),
						Err(error) => self.errors.push(AssemblyError::AddressOutOfRange {
							error,
							location: directive.span,
							src: src.clone(),
						}),
					}
				},
				DirectiveValue::Equation { .. } | DirectiveValue::MacroDefinition(_) => {},
			},
			ProgramElement::IncludeSource { .. }
			| ProgramElement::MacroCall(_)
			| ProgramElement::ExpandedMacro { .. }
			| ProgramElement::Unparsed { .. } => {},
		}
	}

	fn evaluate(&mut self, value: &AssemblyTimeValue, location: SourceSpan, src: &Arc<AssemblyCode>) -> Option<i64> {
		match self.symbols.evaluate(value) {
			Ok(value) => Some(value),
			Err(error) => {
				self.errors.push(error.into_assembly_error(location, src.clone()));
				None
			},
		}
	}

	fn write(&mut self, words: &[u16], location: SourceSpan, src: &Arc<AssemblyCode>) {
		if words.is_empty() {
			return;
		}
		if self.region.is_none() {
			self.region = Some(Region { start: self.writer.current_write_offset(), location, src: src.clone() });
		}
		let bytes = words.iter().flat_map(|word| word.to_be_bytes()).collect::<Vec<_>>();
		if let Err(error) = self.writer.write(&bytes) {
			self.output_failed(error, src);
		}
	}

	fn output_failed(&mut self, error: WriterError, src: &Arc<AssemblyCode>) {
		self.errors.push(AssemblyError::OutputFailed { error, src: src.clone() });
	}

	/// Records the current output region as occupied.
	fn end_region(&mut self) {
		let Some(Region { start, location, src }) = self.region.take() else { return };
		let end = self.writer.current_write_offset();
		let Ok(range) = AddressRange::from_bounds(Address::Byte(start), Address::Byte(end)) else { return };
		let overlaps = self.occupied.insert(range);
		if !overlaps.is_empty() {
			self.errors.push(AssemblyError::OverlappingOutput {
				range: overlaps.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ").into(),
				location,
				src,
			});
		}
	}
}

#[cfg(test)]
mod test {
	use std::mem::discriminant;

	use super::*;
	use crate::parser::parse;
	use crate::sema::reference::SymbolKey;
	use crate::sema::{AddressingMode, Register};

	fn parse_instruction(line: &str) -> (crate::sema::instruction::Instruction, Arc<AssemblyCode>) {
		let src = Arc::new(AssemblyCode::new(line, "test"));
		let parsed = parse(&src, None);
		assert!(parsed.errors.is_empty(), "{line}: {:?}", parsed.errors);
		let Some(ProgramElement::Instruction(instruction)) = parsed.elements.into_iter().next() else {
			panic!("{line} is not an instruction");
		};
		(instruction, src)
	}

	fn assemble_with(line: &str, options: &CompilerOptions) -> Result<Encoded, Box<AssemblyError>> {
		let (instruction, src) = parse_instruction(line);
		encode(&instruction, &SymbolView::new(&SymbolTable::new()), options, &src)
	}

	fn assemble(line: &str) -> Vec<u16> {
		match assemble_with(line, &CompilerOptions::default()) {
			Ok(Encoded::Words(words)) => words,
			other => panic!("{line} did not assemble: {other:?}"),
		}
	}

	#[test]
	fn small_literals_are_inlined() {
		assert_eq!(assemble("SET A, 10"), [0xac01]);
		assert_eq!(assemble("SET A, -1"), [0x8001]);
		assert_eq!(assemble("SET A, 30"), [0xfc01]);
		assert_eq!(assemble("SET A, 31"), [0x7c01, 0x001f]);
		assert_eq!(assemble("JSR 0x1000"), [0x7c20, 0x1000]);
		assert_eq!(assemble("JSR 4"), [0x9420]);
	}

	#[test]
	fn inlining_can_be_disabled() {
		for options in [
			CompilerOptions { disable_literal_inlining: true, ..Default::default() },
			CompilerOptions { generate_relocation_information: true, ..Default::default() },
		] {
			assert_eq!(assemble_with("SET A, 10", &options).unwrap(), Encoded::Words(vec![0x7c01, 0x000a]));
		}
	}

	#[test]
	fn trailing_word_order() {
		// Source first, then target.
		assert_eq!(assemble("SET [A+1], [B+2]"), [0x4601, 0x0002, 0x0001]);
		assert_eq!(assemble("ADD [0x1000], 0x2000"), [0x7fc2, 0x2000, 0x1000]);
		assert_eq!(assemble("SET PICK 3, PEEK"), [0x6741, 0x0003]);
	}

	#[test]
	fn stack_operands() {
		assert_eq!(assemble("SET PUSH, POP"), [0x6301]);
		assert_eq!(assemble("SET [--SP], [SP++]"), [0x6301]);
		assert_eq!(assemble("SET PC, POP"), [0x6381]);
		assert_eq!(assemble("SET [SP], EX"), [0x7721]);
		assert!(matches!(
			assemble_with("SET POP, A", &CompilerOptions::default()),
			Err(error) if matches!(*error, AssemblyError::IllegalAddressingMode { .. })
		));
		assert!(assemble_with("SET A, PUSH", &CompilerOptions::default()).is_err());
	}

	#[test]
	fn immediate_targets() {
		assert!(matches!(
			assemble_with("SET 10, A", &CompilerOptions::default()),
			Err(error) if matches!(*error, AssemblyError::IllegalAddressingMode { .. })
		));
		// Legality is checked even if values are unknown.
		assert!(assemble_with("SET unknown, A", &CompilerOptions::default()).is_err());
		assert_eq!(assemble("IFE 5, A"), [0x03f2, 0x0005]);
	}

	#[test]
	fn operand_count() {
		assert!(matches!(
			assemble_with("JSR A, B", &CompilerOptions::default()),
			Err(error) if matches!(*error, AssemblyError::WrongOperandCount { expected: 1, actual: 2, .. })
		));
		assert!(assemble_with("SET A", &CompilerOptions::default()).is_err());
	}

	#[test]
	fn unknown_values() {
		let options = CompilerOptions::default();
		assert_eq!(assemble_with("SET A, later", &options).unwrap(), Encoded::Unknown);
		let (instruction, src) = parse_instruction("SET A, later");
		assert_eq!(encoded_size(&instruction, &SymbolView::new(&SymbolTable::new()), &options, &src).unwrap(), None);
		assert!(matches!(
			assemble_with("SET A, 1/0", &options),
			Err(error) if matches!(*error, AssemblyError::DivisionByZero { .. })
		));
	}

	#[test]
	fn low_labels_are_inlined() {
		let src = Arc::new(AssemblyCode::new("start:\nSET A, start\nSET B, start+40", "test"));
		let parsed = parse(&src, None);
		let mut symbols = SymbolTable::new();
		assert!(symbols.declare_program(&parsed.elements, &src, 0, true).is_empty());
		symbols.resolve_label(&SymbolKey::global("start"), 5).unwrap();
		let options = CompilerOptions::default();
		let ProgramElement::Instruction(low) = &parsed.elements[1] else { panic!() };
		let ProgramElement::Instruction(high) = &parsed.elements[2] else { panic!() };

		assert_eq!(encode(low, &SymbolView::new(&symbols), &options, &src).unwrap(), Encoded::Words(vec![0x9801]));
		assert_eq!(
			encode(high, &SymbolView::new(&symbols), &options, &src).unwrap(),
			Encoded::Words(vec![0x7c21, 0x002d])
		);
		// Worst-case sizing keeps label operands in a trailing word.
		assert_eq!(
			encode(low, &SymbolView::new(&symbols).without_address_inlining(), &options, &src).unwrap(),
			Encoded::Words(vec![0x7c01, 0x0005])
		);
		let literal = parse_instruction("SET A, 5").0;
		assert_eq!(
			encode(&literal, &SymbolView::new(&symbols).without_address_inlining(), &options, &src).unwrap(),
			Encoded::Words(vec![0x9801])
		);
	}

	fn normalized(mode: &AddressingMode) -> (std::mem::Discriminant<AddressingMode>, Option<Register>, Option<u16>) {
		let register = match mode {
			AddressingMode::Register(register)
			| AddressingMode::Indirect(register)
			| AddressingMode::IndirectOffset(register, _) => Some(*register),
			_ => None,
		};
		let value = mode.value().map(|value| SymbolTable::new().evaluate(value).unwrap() as u16);
		(discriminant(mode), register, value)
	}

	#[test]
	fn decode_inverts_encode() {
		for line in [
			"SET A, 10",
			"SET B, -1",
			"ADD [C], 0x1234",
			"SUB [X+4], [0x8000]",
			"MUL PUSH, POP",
			"SET J, PEEK",
			"SET PICK 2, SP",
			"IFN 0xffff, PC",
			"ADX EX, [J+0xfffe]",
			"STD [I], -2",
			"JSR 0x4000",
			"HCF 3",
			"INT [A]",
			"IAG X",
			"HWI 31",
		] {
			let (instruction, src) = parse_instruction(line);
			let Encoded::Words(words) =
				encode(&instruction, &SymbolView::new(&SymbolTable::new()), &CompilerOptions::default(), &src).unwrap()
			else {
				panic!("{line} did not assemble");
			};
			let decoded = decode(&words).unwrap();
			assert_eq!(decoded.mnemonic, instruction.mnemonic, "{line}");
			assert_eq!(decoded.length, words.len(), "{line}");
			assert_eq!(
				decoded.operands.iter().map(normalized).collect::<Vec<_>>(),
				instruction.operands.iter().map(|operand| normalized(&operand.mode)).collect::<Vec<_>>(),
				"{line}"
			);
		}
	}

	#[test]
	fn decode_errors() {
		assert_eq!(decode(&[0x0000]), Err(DecodeError::InvalidOpcode(0)));
		assert_eq!(decode(&[0x7c01]), Err(DecodeError::Truncated(0x7c01)));
		assert_eq!(decode(&[]), Err(DecodeError::Truncated(0)));
	}
}
