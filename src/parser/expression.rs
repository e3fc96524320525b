//! Expressions and instruction operands.

use super::{Token, TokenCursor};
use crate::error::AssemblyError;
use crate::sema::{AddressingMode, AssemblyTimeValue, BinaryOperator, Operand, Reference, Register, UnaryOperator};

/// Binary operators by precedence level, loosest first.
const PRECEDENCE_LEVELS: usize = 6;

fn binary_operator(token: &Token, level: usize) -> Option<BinaryOperator> {
	Some(match (level, token) {
		(0, Token::Pipe(_)) => BinaryOperator::Or,
		(1, Token::Caret(_)) => BinaryOperator::Xor,
		(2, Token::Ampersand(_)) => BinaryOperator::And,
		(3, Token::DoubleOpenAngleBracket(_)) => BinaryOperator::LeftShift,
		(3, Token::DoubleCloseAngleBracket(_)) => BinaryOperator::RightShift,
		(4, Token::Plus(_)) => BinaryOperator::Add,
		(4, Token::Minus(_)) => BinaryOperator::Subtract,
		(5, Token::Star(_)) => BinaryOperator::Multiply,
		(5, Token::Slash(_)) => BinaryOperator::Divide,
		(5, Token::Percent(_)) => BinaryOperator::Modulus,
		_ => return None,
	})
}

impl TokenCursor<'_> {
	/// Parses an assembly-time expression.
	pub(super) fn expression(&mut self) -> Result<AssemblyTimeValue, Box<AssemblyError>> {
		self.binary_expression(0)
	}

	fn binary_expression(&mut self, level: usize) -> Result<AssemblyTimeValue, Box<AssemblyError>> {
		if level >= PRECEDENCE_LEVELS {
			return self.unary_expression();
		}
		let mut lhs = self.binary_expression(level + 1)?;
		while let Some(token) = self.peek()
			&& let Some(operator) = binary_operator(token, level)
		{
			// `[expression + register]`: the plus belongs to the operand, not the expression.
			if matches!(token, Token::Plus(_)) && matches!(self.peek_nth(1), Some(Token::Register(..))) {
				break;
			}
			self.next();
			let rhs = self.binary_expression(level + 1)?;
			lhs = AssemblyTimeValue::BinaryOperation(Box::new(lhs), Box::new(rhs), operator);
		}
		Ok(lhs)
	}

	fn unary_expression(&mut self) -> Result<AssemblyTimeValue, Box<AssemblyError>> {
		match self.peek() {
			Some(Token::Minus(_)) => {
				self.next();
				Ok(AssemblyTimeValue::UnaryOperation(Box::new(self.unary_expression()?), UnaryOperator::Negate))
			},
			Some(Token::Tilde(_)) => {
				self.next();
				Ok(AssemblyTimeValue::UnaryOperation(Box::new(self.unary_expression()?), UnaryOperator::Not))
			},
			Some(Token::Plus(_)) => {
				self.next();
				self.unary_expression()
			},
			_ => self.primary_expression(),
		}
	}

	fn primary_expression(&mut self) -> Result<AssemblyTimeValue, Box<AssemblyError>> {
		let token = self.expect_next("expression")?;
		Ok(match token {
			Token::Number(number, _) => AssemblyTimeValue::Literal(*number),
			Token::Identifier(name, span) =>
				AssemblyTimeValue::Reference(Reference { name: name.clone(), is_local: false, parent: None, span: *span }),
			Token::LocalIdentifier(name, span) => AssemblyTimeValue::Reference(Reference {
				name:     name.clone(),
				is_local: true,
				parent:   self.scope.clone(),
				span:     *span,
			}),
			Token::OpenParenthesis(_) => {
				let value = self.expression()?;
				match self.expect_next("`)`")? {
					Token::CloseParenthesis(_) => value,
					other => return Err(self.unexpected(other, "`)`")),
				}
			},
			other => return Err(self.unexpected(other, "expression")),
		})
	}

	/// Parses an instruction operand.
	pub(super) fn operand(&mut self) -> Result<Operand, Box<AssemblyError>> {
		let start = self.next_offset();
		let mode = match self.peek() {
			Some(Token::Register(register, _)) => {
				self.next();
				AddressingMode::Register(*register)
			},
			Some(Token::Identifier(name, _)) if stack_keyword(name).is_some() => {
				self.next();
				match stack_keyword(name) {
					Some(StackKeyword::Push) => AddressingMode::Push,
					Some(StackKeyword::Pop) => AddressingMode::Pop,
					Some(StackKeyword::Peek) => AddressingMode::Peek,
					_ => AddressingMode::Pick(self.expression()?),
				}
			},
			Some(Token::OpenBracket(_)) => {
				self.next();
				let mode = self.indirect_operand()?;
				match self.expect_next("`]`")? {
					Token::CloseBracket(_) => mode,
					other => return Err(self.unexpected(other, "`]`")),
				}
			},
			_ => AddressingMode::Immediate(self.expression()?),
		};
		Ok(Operand { mode, span: self.span_from(start) })
	}

	/// Parses the inside of `[...]`.
	fn indirect_operand(&mut self) -> Result<AddressingMode, Box<AssemblyError>> {
		match (self.peek(), self.peek_nth(1), self.peek_nth(2)) {
			(Some(Token::Minus(_)), Some(Token::Minus(_)), Some(Token::Register(Register::SP, _))) => {
				self.position += 3;
				Ok(AddressingMode::Push)
			},
			(Some(Token::Register(Register::SP, _)), Some(Token::Plus(_)), Some(Token::Plus(_))) => {
				self.position += 3;
				Ok(AddressingMode::Pop)
			},
			(Some(Token::Register(register, _)), ..) => {
				let register = *register;
				self.next();
				let offset = match self.peek() {
					Some(Token::Plus(_)) => {
						self.next();
						Some(self.expression()?)
					},
					// The minus stays part of the offset expression.
					Some(Token::Minus(_)) => Some(self.expression()?),
					_ => None,
				};
				Ok(match (register, offset) {
					(Register::SP, None) => AddressingMode::Peek,
					(Register::SP, Some(offset)) => AddressingMode::Pick(offset),
					(register, None) => AddressingMode::Indirect(register),
					(register, Some(offset)) => AddressingMode::IndirectOffset(register, offset),
				})
			},
			_ => {
				let value = self.expression()?;
				if let (Some(Token::Plus(_)), Some(Token::Register(register, _))) = (self.peek(), self.peek_nth(1)) {
					let register = *register;
					self.position += 2;
					Ok(if register == Register::SP {
						AddressingMode::Pick(value)
					} else {
						AddressingMode::IndirectOffset(register, value)
					})
				} else {
					Ok(AddressingMode::IndirectAddress(value))
				}
			},
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StackKeyword {
	Push,
	Pop,
	Peek,
	Pick,
}

fn stack_keyword(name: &str) -> Option<StackKeyword> {
	match name.to_lowercase().as_str() {
		"push" => Some(StackKeyword::Push),
		"pop" => Some(StackKeyword::Pop),
		"peek" => Some(StackKeyword::Peek),
		"pick" => Some(StackKeyword::Pick),
		_ => None,
	}
}
