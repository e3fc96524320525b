//! [`ProgramElement`]

use std::sync::Arc;

use flexstr::SharedStr;
use miette::SourceSpan;

use super::AssemblyTimeValue;
use super::directive::{Directive, DirectiveValue};
use super::instruction::Instruction;
use super::reference::Reference;
use crate::AssemblyCode;

/// A program element of an assembled program. A list of program elements makes an assembled program itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramElement {
	/// A label definition, which assigns the current address to a symbol.
	Label(Reference),
	/// An assembly directive that doesn't necessarily correspond to assembled data directly.
	Directive(Directive),
	/// A processor instruction that corresponds to some assembled data.
	Instruction(Instruction),
	/// Include another source file.
	IncludeSource {
		/// The requested file name.
		file:    SharedStr,
		/// Where the include is written.
		span:    SourceSpan,
		/// The included code, once resolved.
		source:  Option<Arc<AssemblyCode>>,
		/// The parsed content of the included file.
		content: Vec<ProgramElement>,
	},
	/// Calling a user-defined macro.
	MacroCall(MacroCall),
	/// A macro call together with the program it expanded to.
	ExpandedMacro {
		/// The original call.
		call:  MacroCall,
		/// The synthetic global label that scopes local labels of this expansion.
		scope: SharedStr,
		/// The expanded and parsed body.
		body:  Vec<ProgramElement>,
	},
	/// A line that could not be parsed. Errors were already reported for it.
	Unparsed {
		/// The source line.
		span: SourceSpan,
	},
}

/// A call of a user-defined macro.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroCall {
	/// Name of the called macro.
	pub name:      SharedStr,
	/// Arguments as source text.
	pub arguments: Vec<SharedStr>,
	/// Where the call is written.
	pub span:      SourceSpan,
}

impl ProgramElement {
	/// Obtains a reference to the source span of this program element.
	#[must_use]
	pub const fn span(&self) -> &SourceSpan {
		match self {
			Self::Label(Reference { span, .. })
			| Self::Directive(Directive { span, .. })
			| Self::Instruction(Instruction { span, .. })
			| Self::IncludeSource { span, .. }
			| Self::MacroCall(MacroCall { span, .. })
			| Self::ExpandedMacro { call: MacroCall { span, .. }, .. }
			| Self::Unparsed { span } => span,
		}
	}

	/// All values directly held by this element, excluding nested elements.
	#[must_use]
	pub fn values(&self) -> Vec<&AssemblyTimeValue> {
		match self {
			Self::Directive(directive) => directive.value.values(),
			Self::Instruction(instruction) =>
				instruction.operands.iter().filter_map(|operand| operand.mode.value()).collect(),
			Self::Label(_)
			| Self::IncludeSource { .. }
			| Self::MacroCall(_)
			| Self::ExpandedMacro { .. }
			| Self::Unparsed { .. } => Vec::new(),
		}
	}

	/// All values directly held by this element, excluding nested elements.
	pub fn values_mut(&mut self) -> Vec<&mut AssemblyTimeValue> {
		match self {
			Self::Directive(directive) => directive.value.values_mut(),
			Self::Instruction(instruction) =>
				instruction.operands.iter_mut().filter_map(|operand| operand.mode.value_mut()).collect(),
			Self::Label(_)
			| Self::IncludeSource { .. }
			| Self::MacroCall(_)
			| Self::ExpandedMacro { .. }
			| Self::Unparsed { .. } => Vec::new(),
		}
	}

	/// Moves every span in this element and its children to the given span.
	pub fn relocate(&mut self, span: SourceSpan) {
		for value in self.values_mut() {
			for reference in value.references_mut() {
				reference.span = span;
			}
		}
		match self {
			Self::Label(reference) => reference.span = span,
			Self::Directive(directive) => {
				directive.span = span;
				if let DirectiveValue::Equation { symbol, .. } = &mut directive.value {
					symbol.span = span;
				}
			},
			Self::Instruction(instruction) => {
				instruction.span = span;
				for operand in &mut instruction.operands {
					operand.span = span;
				}
			},
			// Included files keep their own spans, since they refer to their own source.
			Self::IncludeSource { span: include_span, .. } => *include_span = span,
			Self::MacroCall(call) => call.span = span,
			Self::ExpandedMacro { call, body, .. } => {
				call.span = span;
				for element in body {
					element.relocate(span);
				}
			},
			Self::Unparsed { span: unparsed_span } => *unparsed_span = span,
		}
	}
}

/// Visits all elements of a program in document order, descending into included files and macro expansions. The
/// visitor also receives the source code that the element's spans refer to.
pub fn walk<'a>(
	elements: &'a [ProgramElement],
	source: &'a Arc<AssemblyCode>,
	visitor: &mut impl FnMut(&'a ProgramElement, &'a Arc<AssemblyCode>),
) {
	for element in elements {
		visitor(element, source);
		match element {
			ProgramElement::IncludeSource { source: Some(included), content, .. } => walk(content, included, visitor),
			ProgramElement::ExpandedMacro { body, .. } => walk(body, source, visitor),
			_ => {},
		}
	}
}

/// Mutable variant of [`walk`].
pub fn walk_mut(
	elements: &mut [ProgramElement],
	source: &Arc<AssemblyCode>,
	visitor: &mut impl FnMut(&mut ProgramElement, &Arc<AssemblyCode>),
) {
	for element in elements {
		visitor(element, source);
		match element {
			ProgramElement::IncludeSource { source: Some(included), content, .. } => {
				let included = included.clone();
				walk_mut(content, &included, visitor);
			},
			ProgramElement::ExpandedMacro { body, .. } => walk_mut(body, source, visitor),
			_ => {},
		}
	}
}
