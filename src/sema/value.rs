//! Assembly-time values.

use std::fmt::{Display, Formatter};

use miette::SourceSpan;

use super::reference::Reference;
use crate::change::Change;

/// Any numeric value that can be calculated at assembly time.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub enum AssemblyTimeValue {
	/// A literal.
	Literal(i64),
	/// A reference that will resolve later.
	Reference(Reference),
	/// A unary math operation.
	UnaryOperation(Box<AssemblyTimeValue>, UnaryOperator),
	/// A binary math operation.
	BinaryOperation(Box<AssemblyTimeValue>, Box<AssemblyTimeValue>, BinaryOperator),
}

impl AssemblyTimeValue {
	/// Returns all references in this expression.
	#[must_use]
	pub fn references(&self) -> Vec<&Reference> {
		match self {
			Self::Literal(..) => Vec::default(),
			Self::Reference(reference) => vec![reference],
			Self::UnaryOperation(value, _) => value.references(),
			Self::BinaryOperation(lhs, rhs, _) => {
				let mut references = lhs.references();
				references.append(&mut rhs.references());
				references
			},
		}
	}

	/// Mutable access to all references in this expression.
	pub fn references_mut(&mut self) -> Vec<&mut Reference> {
		match self {
			Self::Literal(..) => Vec::default(),
			Self::Reference(reference) => vec![reference],
			Self::UnaryOperation(value, _) => value.references_mut(),
			Self::BinaryOperation(lhs, rhs, _) => {
				let mut references = lhs.references_mut();
				references.append(&mut rhs.references_mut());
				references
			},
		}
	}

	/// The literal value, if this value is a plain literal.
	#[must_use]
	pub const fn as_literal(&self) -> Option<i64> {
		match self {
			Self::Literal(value) => Some(*value),
			_ => None,
		}
	}

	/// Resolve this value while using a provided resolver function to obtain values for references. If the resolver
	/// can't do that, then we cannot determine a value either.
	///
	/// # Errors
	/// Whatever error the resolver returns, and [`ValueError::DivisionByZero`].
	pub fn value_using_resolver<E: From<ValueError>>(
		&self,
		resolver: &mut impl FnMut(&Reference) -> Result<i64, E>,
	) -> Result<i64, E> {
		match self {
			Self::Literal(value) => Ok(*value),
			Self::Reference(reference) => resolver(reference),
			Self::UnaryOperation(value, operator) => Ok(operator.execute(value.value_using_resolver(resolver)?)),
			Self::BinaryOperation(lhs, rhs, operator) => {
				let lhs = lhs.value_using_resolver(resolver)?;
				let rhs = rhs.value_using_resolver(resolver)?;
				Ok(operator.execute(lhs, rhs)?)
			},
		}
	}

	/// Simplifies this value as far as possible. References for which `resolver` provides a value are replaced by
	/// that value, and operations on literals are computed.
	pub fn fold(&mut self, resolver: &impl Fn(&Reference) -> Option<i64>) -> Change {
		match self {
			Self::Literal(_) => Change::Unmodified,
			Self::Reference(reference) => match resolver(reference) {
				Some(value) => {
					*self = Self::Literal(value);
					Change::Modified
				},
				None => Change::Unmodified,
			},
			Self::UnaryOperation(value, operator) => {
				let change = value.fold(resolver);
				if let Some(literal) = value.as_literal() {
					*self = Self::Literal(operator.execute(literal));
					Change::Modified
				} else {
					change
				}
			},
			Self::BinaryOperation(lhs, rhs, operator) => {
				let change = lhs.fold(resolver) | rhs.fold(resolver);
				// Division by zero is left in place so that it is reported with the expression's location.
				if let (Some(lhs), Some(rhs)) = (lhs.as_literal(), rhs.as_literal())
					&& let Ok(result) = operator.execute(lhs, rhs)
				{
					*self = Self::Literal(result);
					Change::Modified
				} else {
					change
				}
			},
		}
	}

	/// The location of the first reference in this value, if any.
	#[must_use]
	pub fn first_reference_span(&self) -> Option<SourceSpan> {
		self.references().first().map(|reference| reference.span)
	}
}

impl From<i64> for AssemblyTimeValue {
	fn from(value: i64) -> Self {
		Self::Literal(value)
	}
}

impl Display for AssemblyTimeValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Literal(value) if *value < 0 => write!(f, "{value}"),
			Self::Literal(value) => write!(f, "{value:#x}"),
			Self::Reference(reference) => write!(f, "{reference}"),
			Self::UnaryOperation(value, operator) => write!(f, "{operator}{value}"),
			Self::BinaryOperation(lhs, rhs, operator) => write!(f, "({lhs} {operator} {rhs})"),
		}
	}
}

/// Errors of the arithmetic itself, independent of symbols.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueError {
	/// Division or modulus by zero.
	DivisionByZero,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
	/// -
	Negate,
	/// ~
	Not,
}

impl UnaryOperator {
	/// Run the math operation this operator represents.
	#[must_use]
	pub const fn execute(self, value: i64) -> i64 {
		match self {
			Self::Negate => value.wrapping_neg(),
			Self::Not => !value,
		}
	}
}

impl Display for UnaryOperator {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Negate => "-",
			Self::Not => "~",
		})
	}
}

/// Binary operators, in the C precedence order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
	/// *
	Multiply,
	/// /
	Divide,
	/// %
	Modulus,
	/// +
	Add,
	/// -
	Subtract,
	/// <<
	LeftShift,
	/// >>
	RightShift,
	/// &
	And,
	/// ^
	Xor,
	/// |
	Or,
}

impl BinaryOperator {
	/// Run the math operation this operator represents.
	///
	/// # Errors
	/// Division and modulus by zero.
	pub fn execute(self, lhs: i64, rhs: i64) -> Result<i64, ValueError> {
		// Shift amounts beyond the integer width shift out everything.
		let amount = u32::try_from(rhs).ok();
		Ok(match self {
			Self::Multiply => lhs.wrapping_mul(rhs),
			Self::Divide => lhs.checked_div(rhs).ok_or(ValueError::DivisionByZero)?,
			Self::Modulus => lhs.checked_rem(rhs).ok_or(ValueError::DivisionByZero)?,
			Self::Add => lhs.wrapping_add(rhs),
			Self::Subtract => lhs.wrapping_sub(rhs),
			Self::LeftShift => amount.and_then(|amount| lhs.checked_shl(amount)).unwrap_or(0),
			Self::RightShift =>
				amount.and_then(|amount| lhs.checked_shr(amount)).unwrap_or(if lhs < 0 { -1 } else { 0 }),
			Self::And => lhs & rhs,
			Self::Xor => lhs ^ rhs,
			Self::Or => lhs | rhs,
		})
	}
}

impl Display for BinaryOperator {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Self::Multiply => "*",
			Self::Divide => "/",
			Self::Modulus => "%",
			Self::Add => "+",
			Self::Subtract => "-",
			Self::LeftShift => "<<",
			Self::RightShift => ">>",
			Self::And => "&",
			Self::Xor => "^",
			Self::Or => "|",
		})
	}
}
