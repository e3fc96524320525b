//! Assembly directives.

use std::fmt::{Display, Formatter};

use dcpuasm_derive::{Parse, VariantName};
use flexstr::SharedStr;
use miette::SourceSpan;

use super::AssemblyTimeValue;
use super::reference::Reference;
use crate::parser::VariantName;

/// Directive keywords. In source they are written with or without a leading `.`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Parse, VariantName)]
pub enum DirectiveSymbol {
	/// `.org`
	Org,
	/// `.dat`
	Dat,
	/// `.word`, an alias of `.dat`
	Word,
	/// `.reserve`
	Reserve,
	/// `.equ`
	Equ,
	/// `.include`
	Include,
	/// `.macro`
	Macro,
	/// `.endmacro`
	EndMacro,
}

impl Display for DirectiveSymbol {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		write!(f, ".{}", self.variant_name())
	}
}

/// An assembly directive that doesn't map one-to-one to an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
	/// Actual data of the directive.
	pub value: DirectiveValue,
	/// Where the directive is written.
	pub span:  SourceSpan,
}

/// Directive contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectiveValue {
	/// Moves the output address to the given word address.
	Origin(AssemblyTimeValue),
	/// Literal data words. Strings are stored as one word per character.
	Data(Vec<AssemblyTimeValue>),
	/// A number of zero words.
	Reserve(AssemblyTimeValue),
	/// Defines a named constant.
	Equation {
		/// The symbol being defined.
		symbol: Reference,
		/// Its value.
		value:  AssemblyTimeValue,
	},
	/// Defines a macro.
	MacroDefinition(MacroDefinition),
}

impl DirectiveValue {
	/// All values of this directive.
	pub fn values_mut(&mut self) -> Vec<&mut AssemblyTimeValue> {
		match self {
			Self::Origin(value) | Self::Reserve(value) | Self::Equation { value, .. } => vec![value],
			Self::Data(values) => values.iter_mut().collect(),
			Self::MacroDefinition(_) => Vec::new(),
		}
	}

	/// All values of this directive.
	#[must_use]
	pub fn values(&self) -> Vec<&AssemblyTimeValue> {
		match self {
			Self::Origin(value) | Self::Reserve(value) | Self::Equation { value, .. } => vec![value],
			Self::Data(values) => values.iter().collect(),
			Self::MacroDefinition(_) => Vec::new(),
		}
	}
}

/// A user-defined macro. The body is kept as source text and only parsed once it is expanded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroDefinition {
	/// Name of the macro.
	pub name:       SharedStr,
	/// Names of the formal parameters.
	pub parameters: Vec<SharedStr>,
	/// Raw body text.
	pub body:       SharedStr,
}
