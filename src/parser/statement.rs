//! Statements: labels, instructions, directives and macro uses.

use std::sync::Arc;

use flexstr::SharedStr;

use super::lexer::token_text;
use super::{Line, Token, TokenCursor};
use crate::AssemblyCode;
use crate::error::AssemblyError;
use crate::sema::directive::{Directive, DirectiveSymbol, DirectiveValue, MacroDefinition};
use crate::sema::instruction::{Instruction, Mnemonic};
use crate::sema::program::MacroCall;
use crate::sema::{AssemblyTimeValue, ProgramElement, Reference};

/// Line-by-line parser state.
pub(super) struct Parser<'a> {
	src:      &'a Arc<AssemblyCode>,
	/// The most recent global label.
	scope:    Option<SharedStr>,
	elements: Vec<ProgramElement>,
	errors:   Vec<AssemblyError>,
}

impl<'a> Parser<'a> {
	pub(super) const fn new(src: &'a Arc<AssemblyCode>, scope: Option<SharedStr>, errors: Vec<AssemblyError>) -> Self {
		Self { src, scope, elements: Vec::new(), errors }
	}

	pub(super) fn finish(self) -> (Vec<ProgramElement>, Vec<AssemblyError>) {
		(self.elements, self.errors)
	}

	/// Parses one line. Macro definitions take further lines from `remaining`.
	pub(super) fn line(&mut self, line: Line, remaining: &mut impl Iterator<Item = Line>) {
		let mut tokens = line.tokens;
		let expected_value = match tokens.last() {
			Some(Token::TestComment(words, _)) => {
				let words = words.clone();
				tokens.pop();
				Some(words)
			},
			_ => None,
		};

		let mut cursor = TokenCursor::new(&tokens, line.end, self.src, self.scope.clone());
		let mut elements = cursor.labels();
		let result = match cursor.peek() {
			None => Ok(()),
			Some(Token::Directive(DirectiveSymbol::Macro, _)) => {
				let end_of_header = line.end;
				self.macro_definition(&mut cursor, end_of_header, remaining).map(|definition| elements.push(definition))
			},
			Some(_) => cursor.statement().map(|mut element| {
				if let ProgramElement::Instruction(instruction) = &mut element {
					#[cfg(test)]
					{
						instruction.expected_value = expected_value;
					}
					#[cfg(not(test))]
					let _ = (instruction, expected_value);
				}
				elements.push(element);
			}),
		};
		self.scope = cursor.scope;

		match result {
			Ok(()) => self.elements.append(&mut elements),
			Err(error) => {
				self.errors.push(*error);
				self.elements.push(ProgramElement::Unparsed { span: (line.start, line.end - line.start).into() });
			},
		}
	}

	/// Parses a macro definition whose `.macro` header is at the cursor. The body extends to the next line starting with
	/// `.endmacro`.
	fn macro_definition(
		&mut self,
		cursor: &mut TokenCursor<'_>,
		end_of_header: usize,
		remaining: &mut impl Iterator<Item = Line>,
	) -> Result<ProgramElement, Box<AssemblyError>> {
		let start = cursor.next_offset();
		cursor.next();
		let name = match cursor.expect_next("macro name")? {
			Token::Identifier(name, _) => name.clone(),
			other => return Err(cursor.unexpected(other, "macro name")),
		};
		let parameters = cursor.macro_parameters()?;
		cursor.expect_end()?;
		let header_span = cursor.span_from(start);

		let body_start = (end_of_header + 1).min(self.src.text.len());
		for line in remaining.by_ref() {
			match line.tokens.first() {
				Some(Token::Directive(DirectiveSymbol::EndMacro, _)) => {
					if let Some(extra) = line.tokens.get(1) {
						self.errors.push(*TokenCursor::new(&line.tokens, line.end, self.src, None).unexpected(extra, "end of line"));
					}
					let body = self.src.text.get(body_start .. line.start.max(body_start)).unwrap_or_default();
					return Ok(ProgramElement::Directive(Directive {
						value: DirectiveValue::MacroDefinition(MacroDefinition { name, parameters, body: body.into() }),
						span:  header_span,
					}));
				},
				Some(Token::Directive(DirectiveSymbol::Macro, span)) =>
					self.errors.push(AssemblyError::NestedMacroDefinition { location: *span, src: self.src.clone() }),
				_ => {},
			}
		}
		Err(AssemblyError::MissingEndMacro { name, location: header_span, src: self.src.clone() }.into())
	}
}

impl TokenCursor<'_> {
	/// Parses all label definitions at the start of the line. Global labels open a new scope for local labels.
	fn labels(&mut self) -> Vec<ProgramElement> {
		let mut labels = Vec::new();
		loop {
			let name_token = match (self.peek(), self.peek_nth(1)) {
				(Some(name @ (Token::Identifier(..) | Token::LocalIdentifier(..))), Some(Token::Colon(_)))
				| (Some(Token::Colon(_)), Some(name @ (Token::Identifier(..) | Token::LocalIdentifier(..)))) => name,
				_ => break,
			};
			self.position += 2;
			let label = match name_token {
				Token::Identifier(name, span) => {
					self.scope = Some(name.clone());
					Reference { name: name.clone(), is_local: false, parent: None, span: *span }
				},
				Token::LocalIdentifier(name, span) =>
					Reference { name: name.clone(), is_local: true, parent: self.scope.clone(), span: *span },
				_ => break,
			};
			labels.push(ProgramElement::Label(label));
		}
		labels
	}

	/// Parses an instruction, directive or macro call, which must be the rest of the line.
	fn statement(&mut self) -> Result<ProgramElement, Box<AssemblyError>> {
		let start = self.next_offset();
		let element = match self.expect_next("statement")? {
			Token::Mnemonic(mnemonic, _) => self.instruction(*mnemonic, start)?,
			Token::Directive(directive, _) => self.directive(*directive, start)?,
			Token::Identifier(name, span) if matches!(self.peek(), Some(Token::Directive(DirectiveSymbol::Equ, _))) => {
				self.next();
				let symbol = Reference { name: name.clone(), is_local: false, parent: None, span: *span };
				self.equation(symbol, start)?
			},
			Token::LocalIdentifier(name, span) if matches!(self.peek(), Some(Token::Directive(DirectiveSymbol::Equ, _))) => {
				self.next();
				let symbol = Reference { name: name.clone(), is_local: true, parent: self.scope.clone(), span: *span };
				self.equation(symbol, start)?
			},
			Token::Identifier(name, _) => {
				let arguments = self.macro_arguments()?;
				ProgramElement::MacroCall(MacroCall { name: name.clone(), arguments, span: self.span_from(start) })
			},
			other => return Err(self.unexpected(other, "instruction, directive or macro call")),
		};
		self.expect_end()?;
		Ok(element)
	}

	fn instruction(&mut self, mnemonic: Mnemonic, start: usize) -> Result<ProgramElement, Box<AssemblyError>> {
		let mut operands = Vec::new();
		if !self.is_at_end() {
			operands.push(self.operand()?);
			while let Some(Token::Comma(_)) = self.peek() {
				self.next();
				operands.push(self.operand()?);
			}
		}
		Ok(ProgramElement::Instruction(Instruction::new(mnemonic, operands, self.span_from(start))))
	}

	fn directive(&mut self, directive: DirectiveSymbol, start: usize) -> Result<ProgramElement, Box<AssemblyError>> {
		let value = match directive {
			DirectiveSymbol::Org => DirectiveValue::Origin(self.expression()?),
			DirectiveSymbol::Reserve => DirectiveValue::Reserve(self.expression()?),
			DirectiveSymbol::Dat | DirectiveSymbol::Word => DirectiveValue::Data(self.data()?),
			DirectiveSymbol::Equ => {
				let symbol = match self.expect_next("equation name")? {
					Token::Identifier(name, span) =>
						Reference { name: name.clone(), is_local: false, parent: None, span: *span },
					Token::LocalIdentifier(name, span) =>
						Reference { name: name.clone(), is_local: true, parent: self.scope.clone(), span: *span },
					other => return Err(self.unexpected(other, "equation name")),
				};
				if let Some(Token::Comma(_)) = self.peek() {
					self.next();
				}
				return self.equation(symbol, start);
			},
			DirectiveSymbol::Include => {
				let file = match self.expect_next("file name")? {
					Token::String(file, _) => file.clone(),
					other => return Err(self.unexpected(other, "file name")),
				};
				return Ok(ProgramElement::IncludeSource {
					file,
					span: self.span_from(start),
					source: None,
					content: Vec::new(),
				});
			},
			DirectiveSymbol::Macro => {
				let location = self.span_from(start);
				return Err(AssemblyError::NestedMacroDefinition { location, src: self.src.clone() }.into());
			},
			DirectiveSymbol::EndMacro => {
				let location = self.span_from(start);
				return Err(AssemblyError::StrayEndMacro { location, src: self.src.clone() }.into());
			},
		};
		Ok(ProgramElement::Directive(Directive { value, span: self.span_from(start) }))
	}

	fn equation(&mut self, symbol: Reference, start: usize) -> Result<ProgramElement, Box<AssemblyError>> {
		let value = self.expression()?;
		Ok(ProgramElement::Directive(Directive {
			value: DirectiveValue::Equation { symbol, value },
			span:  self.span_from(start),
		}))
	}

	/// Comma-separated data words. Strings contribute one word per character.
	fn data(&mut self) -> Result<Vec<AssemblyTimeValue>, Box<AssemblyError>> {
		let mut values = Vec::new();
		loop {
			if let Some(Token::String(text, _)) = self.peek() {
				self.next();
				values.extend(text.chars().map(|chr| AssemblyTimeValue::Literal(i64::from(u32::from(chr)))));
			} else {
				values.push(self.expression()?);
			}
			match self.peek() {
				Some(Token::Comma(_)) => {
					self.next();
				},
				_ => break Ok(values),
			}
		}
	}

	/// Formal parameters of a macro definition, with or without parentheses.
	fn macro_parameters(&mut self) -> Result<Vec<SharedStr>, Box<AssemblyError>> {
		let parenthesized = matches!(self.peek(), Some(Token::OpenParenthesis(_)));
		if parenthesized {
			self.next();
			if let Some(Token::CloseParenthesis(_)) = self.peek() {
				self.next();
				return Ok(Vec::new());
			}
		} else if self.is_at_end() {
			return Ok(Vec::new());
		}

		let mut parameters = Vec::new();
		loop {
			match self.expect_next("parameter name")? {
				Token::Identifier(name, _) => parameters.push(name.clone()),
				other => return Err(self.unexpected(other, "parameter name")),
			}
			match self.next() {
				Some(Token::Comma(_)) => {},
				Some(Token::CloseParenthesis(_)) if parenthesized => break,
				None if !parenthesized => break,
				None => return Err(self.end_of_line("`)`")),
				Some(other) => return Err(self.unexpected(other, "`,`")),
			}
		}
		Ok(parameters)
	}

	/// Arguments of a macro call as source text, split at commas outside of parentheses. The argument list is either
	/// parenthesized or the rest of the line.
	fn macro_arguments(&mut self) -> Result<Vec<SharedStr>, Box<AssemblyError>> {
		let parenthesized = matches!(self.peek(), Some(Token::OpenParenthesis(_)));
		if parenthesized {
			self.next();
		}

		let mut arguments = Vec::new();
		let mut argument: Vec<&Token> = Vec::new();
		let mut depth = 0_usize;
		loop {
			let token = match self.next() {
				Some(token) => token,
				None if parenthesized => return Err(self.end_of_line("`)`")),
				None => break,
			};
			match token {
				Token::OpenParenthesis(_) => depth += 1,
				Token::CloseParenthesis(_) if depth == 0 && parenthesized => break,
				Token::CloseParenthesis(_) => depth = depth.saturating_sub(1),
				Token::Comma(_) if depth == 0 => {
					arguments.push(self.argument_text(&argument, token)?);
					argument.clear();
					continue;
				},
				_ => {},
			}
			argument.push(token);
		}

		if (!argument.is_empty() || !arguments.is_empty())
			&& let Some(delimiter) = self.tokens.get(self.position.saturating_sub(1))
		{
			arguments.push(self.argument_text(&argument, delimiter)?);
		}
		Ok(arguments)
	}

	/// The source text spanned by an argument's tokens. `delimiter` is the token after the argument.
	fn argument_text(&self, argument: &[&Token], delimiter: &Token) -> Result<SharedStr, Box<AssemblyError>> {
		let (Some(first), Some(last)) = (argument.first(), argument.last()) else {
			return Err(self.unexpected(delimiter, "macro argument"));
		};
		let start = first.source_span().offset();
		let end = last.source_span().offset() + last.source_span().len();
		let text = self.src.text.get(start .. end).unwrap_or_else(|| token_text(self.src, first));
		Ok(text.into())
	}
}
