//! [`AddressingMode`] and operands.

use std::fmt::{Display, Formatter};

use miette::SourceSpan;

use super::register::Register;
use crate::sema::AssemblyTimeValue;

/// Addressing modes of the DCPU-16. Not all of these are supported everywhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressingMode {
	/// A, B, ..., J, SP, PC, EX
	Register(Register),
	/// [A]
	Indirect(Register),
	/// [A+next word]
	IndirectOffset(Register, AssemblyTimeValue),
	/// PUSH, [--SP]; only valid as a target.
	Push,
	/// POP, [SP++]; only valid as a source.
	Pop,
	/// PEEK, [SP]
	Peek,
	/// PICK n, [SP+n]
	Pick(AssemblyTimeValue),
	/// [next word]
	IndirectAddress(AssemblyTimeValue),
	/// next word, or an inline literal.
	Immediate(AssemblyTimeValue),
}

impl AddressingMode {
	/// The value this addressing mode carries, if any.
	#[must_use]
	pub const fn value(&self) -> Option<&AssemblyTimeValue> {
		match self {
			Self::IndirectOffset(_, value) | Self::Pick(value) | Self::IndirectAddress(value) | Self::Immediate(value) =>
				Some(value),
			Self::Register(_) | Self::Indirect(_) | Self::Push | Self::Pop | Self::Peek => None,
		}
	}

	/// Mutable access to the value this addressing mode carries, if any.
	pub fn value_mut(&mut self) -> Option<&mut AssemblyTimeValue> {
		match self {
			Self::IndirectOffset(_, value) | Self::Pick(value) | Self::IndirectAddress(value) | Self::Immediate(value) =>
				Some(value),
			Self::Register(_) | Self::Indirect(_) | Self::Push | Self::Pop | Self::Peek => None,
		}
	}
}

impl Display for AddressingMode {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Register(register) => write!(f, "{register}"),
			Self::Indirect(register) => write!(f, "[{register}]"),
			Self::IndirectOffset(register, value) => write!(f, "[{register}+{value}]"),
			Self::Push => f.write_str("PUSH"),
			Self::Pop => f.write_str("POP"),
			Self::Peek => f.write_str("PEEK"),
			Self::Pick(value) => write!(f, "PICK {value}"),
			Self::IndirectAddress(value) => write!(f, "[{value}]"),
			Self::Immediate(value) => write!(f, "{value}"),
		}
	}
}

/// An instruction operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operand {
	/// How the operand is accessed.
	pub mode: AddressingMode,
	/// Where the operand was written.
	pub span: SourceSpan,
}

/// The two operand slots of an instruction. The target is written first in source (`SET target, source`) and is
/// encoded in the 5-bit `b` field; the source is encoded in the 6-bit `a` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandPosition {
	/// The `b` operand.
	Target,
	/// The `a` operand.
	Source,
}

impl Display for OperandPosition {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Target => "target",
			Self::Source => "source",
		})
	}
}
