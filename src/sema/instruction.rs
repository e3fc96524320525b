//! Instruction/AST-related structs created in the parser and consumed in the assembler.

use std::fmt::{Display, Formatter};

use dcpuasm_derive::{Parse, VariantName};
use miette::SourceSpan;

use super::addressing_mode::Operand;
use crate::parser::VariantName;

/// One CPU instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
	/// Opcode of this instruction (slightly misnamed).
	pub mnemonic: Mnemonic,
	/// Operands in source order: target then source for basic instructions, the single operand otherwise.
	pub operands: Vec<Operand>,
	/// Where the instruction is written.
	pub span:     SourceSpan,
	/// Expected words that this instruction assembles to, taken from a `;=` test comment.
	#[cfg(test)]
	pub expected_value: Option<Vec<u16>>,
}

impl Instruction {
	/// Creates an instruction.
	#[must_use]
	pub fn new(mnemonic: Mnemonic, operands: Vec<Operand>, span: SourceSpan) -> Self {
		Self {
			mnemonic,
			operands,
			span,
			#[cfg(test)]
			expected_value: None,
		}
	}
}

impl Display for Instruction {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.mnemonic)?;
		for (index, operand) in self.operands.iter().enumerate() {
			write!(f, "{} {}", if index == 0 { "" } else { "," }, operand.mode)?;
		}
		Ok(())
	}
}

/// Instruction mnemonics of the DCPU-16.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Parse, VariantName)]
#[allow(missing_docs)]
pub enum Mnemonic {
	Set,
	Add,
	Sub,
	Mul,
	Mli,
	Div,
	Dvi,
	Mod,
	Mdi,
	And,
	Bor,
	Xor,
	Shr,
	Asr,
	Shl,
	Ifb,
	Ifc,
	Ife,
	Ifn,
	Ifg,
	Ifa,
	Ifl,
	Ifu,
	Adx,
	Sbx,
	Sti,
	Std,
	Jsr,
	Hcf,
	Int,
	Iag,
	Ias,
	Rfi,
	Iaq,
	Hwn,
	Hwq,
	Hwi,
}

impl Display for Mnemonic {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.pad(&self.variant_name().to_uppercase())
	}
}
