//! Instruction decoding, the inverse of [`super::encoder`].
#![allow(clippy::cast_possible_truncation)]

use num_traits::FromPrimitive;
use thiserror::Error;

use super::encoder::field;
use super::table::{InstructionKind, mnemonic_for};
use crate::sema::instruction::Mnemonic;
use crate::sema::{AddressingMode, AssemblyTimeValue, OperandPosition, Register};

/// Errors while decoding object code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
	/// The opcode bits don't belong to any instruction.
	#[error("Word {0:04X} is not a valid instruction")]
	InvalidOpcode(u16),
	/// Trailing words are missing at the end of the input.
	#[error("Instruction {0:04X} is missing its trailing words")]
	Truncated(u16),
}

/// A decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedInstruction {
	/// The instruction mnemonic.
	pub mnemonic: Mnemonic,
	/// Operands in source order.
	pub operands: Vec<AddressingMode>,
	/// Number of words that the instruction occupies.
	pub length:   usize,
}

/// Decodes the instruction at the start of `words`.
///
/// # Errors
/// If the first word is not an instruction or the input ends before its trailing words.
pub fn decode(words: &[u16]) -> Result<DecodedInstruction, DecodeError> {
	let Some(&first) = words.first() else {
		return Err(DecodeError::Truncated(0));
	};
	let trailing = &words[1 ..];
	let mut consumed = 0;
	let mut next_word = || {
		let word = trailing.get(consumed).copied().ok_or(DecodeError::Truncated(first));
		consumed += 1;
		word
	};

	let basic_opcode = (first & 0x1f) as u8;
	let b = (first >> 5) & 0x1f;
	let a = first >> 10;
	let (mnemonic, operands) = if basic_opcode == 0 {
		let mnemonic = mnemonic_for(InstructionKind::Special, b as u8).ok_or(DecodeError::InvalidOpcode(first))?;
		(mnemonic, vec![decode_operand(a, OperandPosition::Source, &mut next_word)?])
	} else {
		let mnemonic = mnemonic_for(InstructionKind::Basic, basic_opcode).ok_or(DecodeError::InvalidOpcode(first))?;
		// The source's trailing word comes first.
		let source = decode_operand(a, OperandPosition::Source, &mut next_word)?;
		let target = decode_operand(b, OperandPosition::Target, &mut next_word)?;
		(mnemonic, vec![target, source])
	};

	Ok(DecodedInstruction { mnemonic, operands, length: 1 + consumed })
}

fn decode_operand(
	bits: u16,
	position: OperandPosition,
	next_word: &mut impl FnMut() -> Result<u16, DecodeError>,
) -> Result<AddressingMode, DecodeError> {
	let mut word_value = || next_word().map(|word| AssemblyTimeValue::Literal(i64::from(word)));
	let general_register = |bits: u16| Register::from_u16(bits & 0x07).unwrap_or(Register::A);
	Ok(match bits {
		0x00 ..= 0x07 => AddressingMode::Register(general_register(bits)),
		0x08 ..= 0x0f => AddressingMode::Indirect(general_register(bits)),
		0x10 ..= 0x17 => AddressingMode::IndirectOffset(general_register(bits), word_value()?),
		field::PUSH_POP => match position {
			OperandPosition::Target => AddressingMode::Push,
			OperandPosition::Source => AddressingMode::Pop,
		},
		field::PEEK => AddressingMode::Peek,
		field::PICK => AddressingMode::Pick(word_value()?),
		field::SP => AddressingMode::Register(Register::SP),
		field::PC => AddressingMode::Register(Register::PC),
		field::EX => AddressingMode::Register(Register::EX),
		field::INDIRECT_NEXT_WORD => AddressingMode::IndirectAddress(word_value()?),
		field::NEXT_WORD => AddressingMode::Immediate(word_value()?),
		inline => AddressingMode::Immediate(AssemblyTimeValue::Literal(i64::from(inline) - 0x21)),
	})
}
