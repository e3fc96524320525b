//! The Register enum.
// this is a bug, see <https://github.com/rust-lang/rust-clippy/issues/6902>
#![allow(clippy::use_self)]

use std::fmt::Display;

use dcpuasm_derive::{Parse, VariantName};
use num_derive::{FromPrimitive, ToPrimitive};

use crate::parser::VariantName;

/// Registers. The discriminants of the general purpose registers are their operand encodings.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Parse, VariantName, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Register {
	/// General purpose register A.
	A = 0,
	/// General purpose register B.
	B = 1,
	/// General purpose register C.
	C = 2,
	/// General purpose register X.
	X = 3,
	/// General purpose register Y.
	Y = 4,
	/// General purpose register Z.
	Z = 5,
	/// General purpose register I, used by STI/STD.
	I = 6,
	/// General purpose register J, used by STI/STD.
	J = 7,
	/// Stack pointer.
	SP = 8,
	/// Program counter.
	PC = 9,
	/// Overflow ("excess") register.
	EX = 10,
}

impl Register {
	/// Whether this is one of A through J, which are the only registers usable for indirect addressing.
	#[must_use]
	pub const fn is_general_purpose(self) -> bool {
		(self as u8) < 8
	}
}

impl Display for Register {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
		write!(f, "{}", self.variant_name().to_uppercase())
	}
}
