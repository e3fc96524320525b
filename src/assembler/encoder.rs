//! Instruction encoding.
#![allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use std::sync::Arc;

use miette::SourceSpan;

use super::table::{InstructionKind, OpcodeEntry, opcode_entry};
use crate::AssemblyCode;
use crate::cli::CompilerOptions;
use crate::error::AssemblyError;
use crate::sema::instruction::{Instruction, Mnemonic};
use crate::sema::symbol::EvaluationError;
use crate::sema::{AddressingMode, AssemblyTimeValue, Operand, OperandPosition, Register, ValueResolver};

/// The longest instruction: one instruction word plus two trailing words.
pub const MAXIMUM_INSTRUCTION_BYTES: u32 = 6;

/// Operand field values that are not register-based.
pub(crate) mod field {
	pub const REGISTER_INDIRECT: u16 = 0x08;
	pub const REGISTER_INDIRECT_OFFSET: u16 = 0x10;
	pub const PUSH_POP: u16 = 0x18;
	pub const PEEK: u16 = 0x19;
	pub const PICK: u16 = 0x1a;
	pub const SP: u16 = 0x1b;
	pub const PC: u16 = 0x1c;
	pub const EX: u16 = 0x1d;
	pub const INDIRECT_NEXT_WORD: u16 = 0x1e;
	pub const NEXT_WORD: u16 = 0x1f;
	pub const INLINE_LITERAL: u16 = 0x20;
}

/// Smallest and largest value that can be encoded inline.
pub const INLINE_LITERAL_RANGE: std::ops::RangeInclusive<i64> = -1 ..= 30;

/// Result of encoding an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Encoded {
	/// Some operand value is not known yet, so neither the words nor the size can be determined.
	Unknown,
	/// The instruction words, in output order.
	Words(Vec<u16>),
}

impl Encoded {
	/// Size in bytes, if known.
	#[must_use]
	pub fn size_in_bytes(&self) -> Option<u32> {
		match self {
			Self::Unknown => None,
			Self::Words(words) => Some(words.len() as u32 * 2),
		}
	}
}

/// An encoded operand field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
	Unknown,
	Known { bits: u16, next_word: Option<u16> },
}

/// Encodes an instruction.
///
/// Addressing mode legality and operand count are always checked, even if some values are unknown; the result is
/// [`Encoded::Unknown`] only for legal instructions whose values can't be computed yet.
///
/// # Errors
/// If the instruction has the wrong number of operands, uses an addressing mode that is illegal in its position, or
/// an operand value divides by zero.
pub fn encode(
	instruction: &Instruction,
	resolver: &impl ValueResolver,
	options: &CompilerOptions,
	src: &Arc<AssemblyCode>,
) -> Result<Encoded, Box<AssemblyError>> {
	let entry = opcode_entry(instruction.mnemonic);
	if instruction.operands.len() != entry.arity() {
		return Err(AssemblyError::WrongOperandCount {
			mnemonic: instruction.mnemonic,
			expected: entry.arity(),
			actual:   instruction.operands.len(),
			location: instruction.span,
			src:      src.clone(),
		}
		.into());
	}

	let encoder = OperandEncoder { mnemonic: instruction.mnemonic, entry, resolver, options, src };
	let (first_word, trailing_words) = match entry.kind {
		InstructionKind::Basic => {
			let target = encoder.field(&instruction.operands[0], OperandPosition::Target)?;
			let source = encoder.field(&instruction.operands[1], OperandPosition::Source)?;
			let (
				Field::Known { bits: target_bits, next_word: target_word },
				Field::Known { bits: source_bits, next_word: source_word },
			) = (target, source)
			else {
				return Ok(Encoded::Unknown);
			};
			(
				(source_bits << 10) | (target_bits << 5) | u16::from(entry.code),
				// The source's trailing word comes first.
				[source_word, target_word],
			)
		},
		InstructionKind::Special => {
			let Field::Known { bits, next_word } = encoder.field(&instruction.operands[0], OperandPosition::Source)?
			else {
				return Ok(Encoded::Unknown);
			};
			((bits << 10) | (u16::from(entry.code) << 5), [next_word, None])
		},
	};

	let mut words = Vec::with_capacity(3);
	words.push(first_word);
	words.extend(trailing_words.into_iter().flatten());
	Ok(Encoded::Words(words))
}

/// Size of an instruction in bytes, or `None` if it can't be determined yet.
///
/// # Errors
/// See [`encode`].
pub fn encoded_size(
	instruction: &Instruction,
	resolver: &impl ValueResolver,
	options: &CompilerOptions,
	src: &Arc<AssemblyCode>,
) -> Result<Option<u32>, Box<AssemblyError>> {
	Ok(encode(instruction, resolver, options, src)?.size_in_bytes())
}

struct OperandEncoder<'a, R: ValueResolver> {
	mnemonic: Mnemonic,
	entry:    OpcodeEntry,
	resolver: &'a R,
	options:  &'a CompilerOptions,
	src:      &'a Arc<AssemblyCode>,
}

impl<R: ValueResolver> OperandEncoder<'_, R> {
	fn illegal(&self, operand: &Operand, position: OperandPosition) -> Box<AssemblyError> {
		AssemblyError::IllegalAddressingMode {
			mode: operand.mode.to_string().into(),
			position,
			mnemonic: self.mnemonic,
			location: operand.span,
			src: self.src.clone(),
		}
		.into()
	}

	/// Computes a value that is stored in a full word.
	fn value(&self, value: &AssemblyTimeValue, location: SourceSpan) -> Result<Option<i64>, Box<AssemblyError>> {
		match self.resolver.value_of(value) {
			Ok(value) => Ok(Some(value)),
			Err(EvaluationError::DivisionByZero) =>
				Err(AssemblyError::DivisionByZero { location, src: self.src.clone() }.into()),
			Err(_) => Ok(None),
		}
	}

	fn with_next_word(
		&self,
		bits: u16,
		value: &AssemblyTimeValue,
		location: SourceSpan,
	) -> Result<Field, Box<AssemblyError>> {
		Ok(match self.value(value, location)? {
			Some(value) => Field::Known { bits, next_word: Some(value as u16) },
			None => Field::Unknown,
		})
	}

	fn field(&self, operand: &Operand, position: OperandPosition) -> Result<Field, Box<AssemblyError>> {
		let known = |bits| Ok(Field::Known { bits, next_word: None });
		match (&operand.mode, position) {
			(AddressingMode::Register(register), _) => known(match register {
				Register::SP => field::SP,
				Register::PC => field::PC,
				Register::EX => field::EX,
				general => *general as u16,
			}),
			(AddressingMode::Indirect(register), _) if register.is_general_purpose() =>
				known(field::REGISTER_INDIRECT + *register as u16),
			(AddressingMode::IndirectOffset(register, offset), _) if register.is_general_purpose() =>
				self.with_next_word(field::REGISTER_INDIRECT_OFFSET + *register as u16, offset, operand.span),
			(AddressingMode::Push, OperandPosition::Target) | (AddressingMode::Pop, OperandPosition::Source) =>
				known(field::PUSH_POP),
			(AddressingMode::Peek, _) => known(field::PEEK),
			(AddressingMode::Pick(offset), _) => self.with_next_word(field::PICK, offset, operand.span),
			(AddressingMode::IndirectAddress(address), _) =>
				self.with_next_word(field::INDIRECT_NEXT_WORD, address, operand.span),
			(AddressingMode::Immediate(value), OperandPosition::Source) => self.source_immediate(value, operand.span),
			(AddressingMode::Immediate(value), OperandPosition::Target) if self.entry.is_conditional =>
				self.with_next_word(field::NEXT_WORD, value, operand.span),
			_ => Err(self.illegal(operand, position)),
		}
	}

	/// Source immediates use the inline form when their value is small, inlining is enabled, and the resolver allows it
	/// for this value.
	fn source_immediate(&self, value: &AssemblyTimeValue, location: SourceSpan) -> Result<Field, Box<AssemblyError>> {
		let Some(number) = self.value(value, location)? else {
			return Ok(Field::Unknown);
		};
		if self.options.inline_literals()
			&& INLINE_LITERAL_RANGE.contains(&number)
			&& self.resolver.may_inline(value)
		{
			Ok(Field::Known { bits: field::INLINE_LITERAL + (number + 1) as u16, next_word: None })
		} else {
			Ok(Field::Known { bits: field::NEXT_WORD, next_word: Some(number as u16) })
		}
	}
}
