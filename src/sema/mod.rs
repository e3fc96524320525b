//! Semantic analysis and AST datastructures.

mod addressing_mode;
pub mod directive;
pub mod expansion;
pub mod instruction;
pub mod program;
pub mod reference;
mod register;
pub mod symbol;
#[cfg(test)] mod test;
pub mod value;

pub use addressing_mode::{AddressingMode, Operand, OperandPosition};
pub use program::ProgramElement;
pub use reference::{Reference, SymbolKey};
pub use register::Register;
pub use symbol::{SymbolTable, SymbolView, ValueResolver};
pub use value::{AssemblyTimeValue, BinaryOperator, UnaryOperator};
