//! Opcode table.
//!
//! Every mnemonic maps to a fixed table entry; the encoder and decoder derive everything they need to know about an
//! instruction (arity, word layout and operand legality) from this entry.

use crate::sema::instruction::Mnemonic;

/// The two instruction word layouts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionKind {
	/// Two operands: `aaaaaabbbbbooooo`.
	Basic,
	/// One operand: `aaaaaaooooo00000`.
	Special,
}

/// Encoding information for one mnemonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeEntry {
	/// The 5-bit opcode.
	pub code:           u8,
	/// Word layout.
	pub kind:           InstructionKind,
	/// Conditional instructions (`IFx`) also accept immediates as their target operand.
	pub is_conditional: bool,
}

impl OpcodeEntry {
	const fn basic(code: u8) -> Self {
		Self { code, kind: InstructionKind::Basic, is_conditional: false }
	}

	const fn conditional(code: u8) -> Self {
		Self { code, kind: InstructionKind::Basic, is_conditional: true }
	}

	const fn special(code: u8) -> Self {
		Self { code, kind: InstructionKind::Special, is_conditional: false }
	}

	/// Number of operands.
	#[must_use]
	pub const fn arity(self) -> usize {
		match self.kind {
			InstructionKind::Basic => 2,
			InstructionKind::Special => 1,
		}
	}
}

/// All mnemonics, basic instructions first.
pub const MNEMONICS: [Mnemonic; 37] = [
	Mnemonic::Set,
	Mnemonic::Add,
	Mnemonic::Sub,
	Mnemonic::Mul,
	Mnemonic::Mli,
	Mnemonic::Div,
	Mnemonic::Dvi,
	Mnemonic::Mod,
	Mnemonic::Mdi,
	Mnemonic::And,
	Mnemonic::Bor,
	Mnemonic::Xor,
	Mnemonic::Shr,
	Mnemonic::Asr,
	Mnemonic::Shl,
	Mnemonic::Ifb,
	Mnemonic::Ifc,
	Mnemonic::Ife,
	Mnemonic::Ifn,
	Mnemonic::Ifg,
	Mnemonic::Ifa,
	Mnemonic::Ifl,
	Mnemonic::Ifu,
	Mnemonic::Adx,
	Mnemonic::Sbx,
	Mnemonic::Sti,
	Mnemonic::Std,
	Mnemonic::Jsr,
	Mnemonic::Hcf,
	Mnemonic::Int,
	Mnemonic::Iag,
	Mnemonic::Ias,
	Mnemonic::Rfi,
	Mnemonic::Iaq,
	Mnemonic::Hwn,
	Mnemonic::Hwq,
	Mnemonic::Hwi,
];

/// Returns the table entry of a mnemonic.
#[must_use]
pub const fn opcode_entry(mnemonic: Mnemonic) -> OpcodeEntry {
	match mnemonic {
		Mnemonic::Set => OpcodeEntry::basic(0x01),
		Mnemonic::Add => OpcodeEntry::basic(0x02),
		Mnemonic::Sub => OpcodeEntry::basic(0x03),
		Mnemonic::Mul => OpcodeEntry::basic(0x04),
		Mnemonic::Mli => OpcodeEntry::basic(0x05),
		Mnemonic::Div => OpcodeEntry::basic(0x06),
		Mnemonic::Dvi => OpcodeEntry::basic(0x07),
		Mnemonic::Mod => OpcodeEntry::basic(0x08),
		Mnemonic::Mdi => OpcodeEntry::basic(0x09),
		Mnemonic::And => OpcodeEntry::basic(0x0a),
		Mnemonic::Bor => OpcodeEntry::basic(0x0b),
		Mnemonic::Xor => OpcodeEntry::basic(0x0c),
		Mnemonic::Shr => OpcodeEntry::basic(0x0d),
		Mnemonic::Asr => OpcodeEntry::basic(0x0e),
		Mnemonic::Shl => OpcodeEntry::basic(0x0f),
		Mnemonic::Ifb => OpcodeEntry::conditional(0x10),
		Mnemonic::Ifc => OpcodeEntry::conditional(0x11),
		Mnemonic::Ife => OpcodeEntry::conditional(0x12),
		Mnemonic::Ifn => OpcodeEntry::conditional(0x13),
		Mnemonic::Ifg => OpcodeEntry::conditional(0x14),
		Mnemonic::Ifa => OpcodeEntry::conditional(0x15),
		Mnemonic::Ifl => OpcodeEntry::conditional(0x16),
		Mnemonic::Ifu => OpcodeEntry::conditional(0x17),
		Mnemonic::Adx => OpcodeEntry::basic(0x1a),
		Mnemonic::Sbx => OpcodeEntry::basic(0x1b),
		Mnemonic::Sti => OpcodeEntry::basic(0x1e),
		Mnemonic::Std => OpcodeEntry::basic(0x1f),
		Mnemonic::Jsr => OpcodeEntry::special(0x01),
		Mnemonic::Hcf => OpcodeEntry::special(0x07),
		Mnemonic::Int => OpcodeEntry::special(0x08),
		Mnemonic::Iag => OpcodeEntry::special(0x09),
		Mnemonic::Ias => OpcodeEntry::special(0x0a),
		Mnemonic::Rfi => OpcodeEntry::special(0x0b),
		Mnemonic::Iaq => OpcodeEntry::special(0x0c),
		Mnemonic::Hwn => OpcodeEntry::special(0x10),
		Mnemonic::Hwq => OpcodeEntry::special(0x11),
		Mnemonic::Hwi => OpcodeEntry::special(0x12),
	}
}

/// Finds the mnemonic for an opcode of the given kind.
#[must_use]
pub fn mnemonic_for(kind: InstructionKind, code: u8) -> Option<Mnemonic> {
	MNEMONICS.into_iter().find(|mnemonic| {
		let entry = opcode_entry(*mnemonic);
		entry.kind == kind && entry.code == code
	})
}

#[cfg(test)]
mod test {
	use std::collections::HashSet;

	use super::*;

	#[test]
	fn opcodes_are_unique() {
		let mut seen = HashSet::new();
		for mnemonic in MNEMONICS {
			let entry = opcode_entry(mnemonic);
			assert!(seen.insert((entry.kind == InstructionKind::Basic, entry.code)), "{mnemonic} has a duplicate opcode");
			assert!(entry.code > 0 && entry.code < 0x20);
			assert_eq!(mnemonic_for(entry.kind, entry.code), Some(mnemonic));
		}
		assert_eq!(MNEMONICS.iter().filter(|mnemonic| opcode_entry(**mnemonic).is_conditional).count(), 8);
		assert_eq!(mnemonic_for(InstructionKind::Special, 0x02), None);
	}
}
