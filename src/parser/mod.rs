//! Parser infrastructure: turns source code into program elements.
//!
//! Parsing works line by line with error recovery: a line that cannot be parsed is reported and replaced by
//! [`ProgramElement::Unparsed`], and parsing continues with the next line. Only macro definitions span multiple lines;
//! their body is kept as text and parsed once per expansion.

use std::sync::Arc;

use flexstr::SharedStr;
use miette::SourceSpan;

use crate::AssemblyCode;
use crate::error::AssemblyError;
use crate::sema::ProgramElement;

mod expression;
pub mod lexer;
mod statement;
pub mod token;

pub use lexer::lex;
pub use token::Token;

/// Anything that can be primitively parsed from a string into an enum variant.
/// This trait is intended to be derived with the macro from ``dcpuasm_derive``.
pub trait Parse
where
	Self: Sized,
{
	/// Parse this enum from the string representation.
	/// # Errors
	/// If the string doesn't correspond with any enum variant.
	fn parse(value: &str, location: SourceSpan, src: Arc<AssemblyCode>) -> Result<Self, Box<AssemblyError>>;

	/// Returns whether this string corresponds with an enum variant; i.e. parsing would succeed.
	fn is_valid(value: &str) -> bool;
}

/// Provides a name for enum variants.
pub trait VariantName {
	/// Returns the name of this variant.
	fn variant_name(&self) -> &'static str;
}

/// Result of parsing one piece of source code.
#[derive(Debug)]
pub struct ParsedSource {
	/// The program, including [`ProgramElement::Unparsed`] placeholders for lines with errors.
	pub elements: Vec<ProgramElement>,
	/// All syntax errors, in source order.
	pub errors:   Vec<AssemblyError>,
	/// Number of source lines.
	pub lines:    usize,
}

/// Parses source code into program elements.
///
/// `initial_scope` is the global label that local labels at the start of the source belong to; macro expansions use
/// this to give each expansion its own set of local labels.
#[must_use]
pub fn parse(source_code: &Arc<AssemblyCode>, initial_scope: Option<SharedStr>) -> ParsedSource {
	let (tokens, errors) = lex(source_code);
	let mut parser = statement::Parser::new(source_code, initial_scope, errors);
	let mut lines = split_lines(tokens, source_code.text.len()).into_iter();
	while let Some(line) = lines.next() {
		parser.line(line, &mut lines);
	}
	let (elements, errors) = parser.finish();
	ParsedSource { elements, errors, lines: source_code.text.lines().count() }
}

/// The tokens of one source line.
#[derive(Debug)]
struct Line {
	tokens: Vec<Token>,
	/// Byte offset of the first character of the line.
	start:  usize,
	/// Byte offset of the terminating newline, or the end of the text.
	end:    usize,
}

impl Line {
	fn span(&self) -> SourceSpan {
		(self.start, self.end - self.start).into()
	}
}

fn split_lines(tokens: Vec<Token>, text_length: usize) -> Vec<Line> {
	let mut lines = Vec::new();
	let mut current = Line { tokens: Vec::new(), start: 0, end: text_length };
	for token in tokens {
		if let Token::Newline(offset) = token {
			let next_start = offset.offset() + 1;
			current.end = offset.offset();
			lines.push(std::mem::replace(&mut current, Line { tokens: Vec::new(), start: next_start, end: text_length }));
		} else {
			current.tokens.push(token);
		}
	}
	if current.start < text_length || !current.tokens.is_empty() {
		lines.push(current);
	}
	lines
}

/// Sequential access to the tokens of one line.
#[derive(Debug)]
pub(crate) struct TokenCursor<'a> {
	tokens:   &'a [Token],
	position: usize,
	line_end: usize,
	src:      &'a Arc<AssemblyCode>,
	/// The enclosing global label; updated by label definitions.
	scope:    Option<SharedStr>,
}

impl<'a> TokenCursor<'a> {
	pub(crate) const fn new(
		tokens: &'a [Token],
		line_end: usize,
		src: &'a Arc<AssemblyCode>,
		scope: Option<SharedStr>,
	) -> Self {
		Self { tokens, position: 0, line_end, src, scope }
	}

	fn peek(&self) -> Option<&'a Token> {
		self.peek_nth(0)
	}

	fn peek_nth(&self, n: usize) -> Option<&'a Token> {
		self.tokens.get(self.position + n)
	}

	#[allow(clippy::should_implement_trait)]
	fn next(&mut self) -> Option<&'a Token> {
		let token = self.tokens.get(self.position);
		if token.is_some() {
			self.position += 1;
		}
		token
	}

	const fn is_at_end(&self) -> bool {
		self.position >= self.tokens.len()
	}

	/// Returns the next token, or an error naming what was expected if the line ends.
	fn expect_next(&mut self, expected: &str) -> Result<&'a Token, Box<AssemblyError>> {
		self.next().ok_or_else(|| self.end_of_line(expected))
	}

	fn end_of_line(&self, expected: &str) -> Box<AssemblyError> {
		AssemblyError::UnexpectedEndOfLine {
			expected: expected.into(),
			location: (self.line_end, 0).into(),
			src:      self.src.clone(),
		}
		.into()
	}

	fn unexpected(&self, actual: &Token, expected: &str) -> Box<AssemblyError> {
		AssemblyError::ExpectedToken {
			expected: expected.into(),
			actual:   actual.clone(),
			location: actual.source_span(),
			src:      self.src.clone(),
		}
		.into()
	}

	/// Requires that the line has ended.
	fn expect_end(&self) -> Result<(), Box<AssemblyError>> {
		match self.peek() {
			Some(token) => Err(self.unexpected(token, "end of line")),
			None => Ok(()),
		}
	}

	/// Byte offset of the next token, or of the line end.
	fn next_offset(&self) -> usize {
		self.peek().map_or(self.line_end, |token| token.source_span().offset())
	}

	/// Byte offset just after the most recently consumed token.
	fn previous_end(&self) -> usize {
		self.position
			.checked_sub(1)
			.and_then(|index| self.tokens.get(index))
			.map_or(self.line_end, |token| token.source_span().offset() + token.source_span().len())
	}

	/// The span from `start` up to the end of the most recently consumed token.
	fn span_from(&self, start: usize) -> SourceSpan {
		let end = self.previous_end().max(start);
		(start, end - start).into()
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::sema::directive::{DirectiveValue, MacroDefinition};
	use crate::sema::instruction::Mnemonic;
	use crate::sema::{
		AddressingMode, AssemblyTimeValue, BinaryOperator, Reference, Register, SymbolTable, UnaryOperator,
	};

	fn parse_str(text: &str) -> ParsedSource {
		parse(&Arc::new(AssemblyCode::new(text, "test")), None)
	}

	fn instruction_modes(element: &ProgramElement) -> Vec<AddressingMode> {
		match element {
			ProgramElement::Instruction(instruction) =>
				instruction.operands.iter().map(|operand| operand.mode.clone()).collect(),
			other => panic!("{other:?} is not an instruction"),
		}
	}

	fn reference(name: &str) -> AssemblyTimeValue {
		AssemblyTimeValue::Reference(Reference { name: name.into(), is_local: false, parent: None, span: (0, 0).into() })
	}

	#[test]
	fn addressing_modes() {
		let parsed = parse_str(
			"set a, [b]\nset [x+4], [4+y]\nset push, pop\nset [--sp], [sp++]\nset peek, [sp]\nset [sp+2], pick \
			 3\nset [0x1000], 0x1000\nset [j-1], ex",
		);
		assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
		let modes = parsed.elements.iter().map(instruction_modes).collect::<Vec<_>>();
		assert_eq!(modes, vec![
			vec![AddressingMode::Register(Register::A), AddressingMode::Indirect(Register::B)],
			vec![
				AddressingMode::IndirectOffset(Register::X, 4.into()),
				AddressingMode::IndirectOffset(Register::Y, 4.into())
			],
			vec![AddressingMode::Push, AddressingMode::Pop],
			vec![AddressingMode::Push, AddressingMode::Pop],
			vec![AddressingMode::Peek, AddressingMode::Peek],
			vec![AddressingMode::Pick(2.into()), AddressingMode::Pick(3.into())],
			vec![AddressingMode::IndirectAddress(0x1000.into()), AddressingMode::Immediate(0x1000.into())],
			vec![
				AddressingMode::IndirectOffset(
					Register::J,
					AssemblyTimeValue::UnaryOperation(Box::new(1.into()), UnaryOperator::Negate)
				),
				AddressingMode::Register(Register::EX)
			],
		]);
	}

	#[test]
	fn expression_precedence() {
		let parsed = parse_str("dat 1 + 2 * 3, (1 + 2) * 3, 1 | 2 & 3, 1 << 2 + 1");
		assert!(parsed.errors.is_empty());
		let ProgramElement::Directive(directive) = &parsed.elements[0] else { panic!() };
		let DirectiveValue::Data(values) = &directive.value else { panic!() };
		let symbols = SymbolTable::new();
		let literals = values.iter().map(|value| symbols.evaluate(value).ok()).collect::<Vec<_>>();
		assert_eq!(literals, vec![Some(7), Some(9), Some(1 | (2 & 3)), Some(1 << 3)]);
		assert_eq!(
			values[0],
			AssemblyTimeValue::BinaryOperation(
				Box::new(1.into()),
				Box::new(AssemblyTimeValue::BinaryOperation(
					Box::new(2.into()),
					Box::new(3.into()),
					BinaryOperator::Multiply
				)),
				BinaryOperator::Add
			)
		);
	}

	#[test]
	fn labels_and_scopes() {
		let parsed = parse_str("start:\n.loop: set pc, .loop\n:other .loop: ife a, start");
		assert!(parsed.errors.is_empty());
		let labels = parsed
			.elements
			.iter()
			.filter_map(|element| match element {
				ProgramElement::Label(label) => Some((label.name.to_string(), label.parent.clone().map(|p| p.to_string()))),
				_ => None,
			})
			.collect::<Vec<_>>();
		assert_eq!(labels, vec![
			("start".to_owned(), None),
			("loop".to_owned(), Some("start".to_owned())),
			("other".to_owned(), None),
			("loop".to_owned(), Some("other".to_owned())),
		]);
		let modes = instruction_modes(&parsed.elements[2]);
		let AddressingMode::Immediate(AssemblyTimeValue::Reference(target)) = &modes[1] else { panic!() };
		assert!(target.is_local);
		assert_eq!(target.parent.as_deref(), Some("start"));
		assert_eq!(modes, vec![AddressingMode::Register(Register::PC), modes[1].clone()]);
		assert_eq!(instruction_modes(&parsed.elements[5])[1], AddressingMode::Immediate(reference("start")));
	}

	#[test]
	fn directives() {
		let parsed = parse_str(".org 0x10\nsize .equ 4\n.equ twice, size * 2\n.reserve size\n.dat \"hi\", 0\n.include \"x.asm\"");
		assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
		assert_eq!(parsed.lines, 6);
		let values = parsed
			.elements
			.iter()
			.map(|element| match element {
				ProgramElement::Directive(directive) => directive.value.clone(),
				ProgramElement::IncludeSource { file, source, .. } => {
					assert_eq!(file.as_str(), "x.asm");
					assert!(source.is_none());
					DirectiveValue::Data(Vec::new())
				},
				other => panic!("{other:?}"),
			})
			.collect::<Vec<_>>();
		assert_eq!(values[0], DirectiveValue::Origin(0x10.into()));
		assert!(matches!(&values[1], DirectiveValue::Equation { symbol, value } if &*symbol.name == "size" && *value == 4.into()));
		assert!(matches!(&values[2], DirectiveValue::Equation { symbol, .. } if &*symbol.name == "twice"));
		assert_eq!(values[3], DirectiveValue::Reserve(reference("size")));
		assert_eq!(values[4], DirectiveValue::Data(vec![i64::from(b'h').into(), i64::from(b'i').into(), 0.into()]));
	}

	#[test]
	fn macros() {
		let parsed = parse_str(".macro store(target, value)\n  set target, value\n.endmacro\nstore(a, 1 + (2, 3))\nnop_like");
		assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
		let ProgramElement::Directive(directive) = &parsed.elements[0] else { panic!() };
		assert_eq!(
			directive.value,
			DirectiveValue::MacroDefinition(MacroDefinition {
				name:       "store".into(),
				parameters: vec!["target".into(), "value".into()],
				body:       "  set target, value\n".into(),
			})
		);
		let ProgramElement::MacroCall(call) = &parsed.elements[1] else { panic!() };
		assert_eq!(call.arguments, vec![SharedStr::from("a"), SharedStr::from("1 + (2, 3)")]);
		let ProgramElement::MacroCall(call) = &parsed.elements[2] else { panic!() };
		assert_eq!(&*call.name, "nop_like");
		assert!(call.arguments.is_empty());
	}

	#[test]
	fn macro_definition_errors() {
		let parsed = parse_str(".endmacro\n.macro outer\n.macro inner\n.endmacro\n.macro open\nset a, 1");
		assert_eq!(parsed.errors.len(), 3, "{:?}", parsed.errors);
		assert!(matches!(parsed.errors[0], AssemblyError::StrayEndMacro { .. }));
		assert!(matches!(parsed.errors[1], AssemblyError::NestedMacroDefinition { .. }));
		assert!(matches!(&parsed.errors[2], AssemblyError::MissingEndMacro { name, .. } if &**name == "open"));
	}

	#[test]
	fn error_recovery() {
		let parsed = parse_str("set a, 1\nset , b\nset b, [a+]\nadd a, b");
		assert_eq!(parsed.errors.len(), 2);
		assert!(matches!(parsed.elements[1], ProgramElement::Unparsed { .. }));
		assert!(matches!(parsed.elements[2], ProgramElement::Unparsed { .. }));
		assert!(matches!(&parsed.elements[3], ProgramElement::Instruction(instruction) if instruction.mnemonic == Mnemonic::Add));
	}

	#[test]
	fn test_comments_become_expected_values() {
		let parsed = parse_str("set a, 1 ;= 8801");
		let ProgramElement::Instruction(instruction) = &parsed.elements[0] else { panic!() };
		assert_eq!(instruction.expected_value, Some(vec![0x8801]));
	}
}
