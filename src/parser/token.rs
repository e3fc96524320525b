//! The Token enum.

use std::fmt::Display;

use flexstr::SharedStr;
use miette::{SourceOffset, SourceSpan};

use crate::sema::Register;
use crate::sema::directive::DirectiveSymbol;
use crate::sema::instruction::Mnemonic;

/// Assembly language tokens.
#[derive(Debug, Clone)]
pub enum Token {
	/// Mnemonic, the start of an instruction.
	Mnemonic(Mnemonic, SourceSpan),
	/// Identifier, i.e. a label, equation or macro name.
	Identifier(SharedStr, SourceSpan),
	/// Identifier with a leading `.`, i.e. a local label. The name excludes the period.
	LocalIdentifier(SharedStr, SourceSpan),
	/// Register name (this can never be used as an identifier).
	Register(Register, SourceSpan),
	/// Directive keyword, with or without leading period.
	Directive(DirectiveSymbol, SourceSpan),
	/// Literal number which was already parsed. Character literals are numbers as well.
	Number(i64, SourceSpan),
	/// Text string delimited by "", with escapes already processed.
	String(SharedStr, SourceSpan),
	/// ','
	Comma(SourceOffset),
	/// ':'
	Colon(SourceOffset),
	/// '['
	OpenBracket(SourceOffset),
	/// ']'
	CloseBracket(SourceOffset),
	/// '('
	OpenParenthesis(SourceOffset),
	/// ')'
	CloseParenthesis(SourceOffset),
	/// '+'
	Plus(SourceOffset),
	/// '-'
	Minus(SourceOffset),
	/// '*'
	Star(SourceOffset),
	/// '/'
	Slash(SourceOffset),
	/// '%'
	Percent(SourceOffset),
	/// '&'
	Ampersand(SourceOffset),
	/// '|'
	Pipe(SourceOffset),
	/// '^'
	Caret(SourceOffset),
	/// '~'
	Tilde(SourceOffset),
	/// '<<'
	DoubleOpenAngleBracket(SourceOffset),
	/// '>>'
	DoubleCloseAngleBracket(SourceOffset),
	/// ASCII newline (\n).
	Newline(SourceOffset),
	/// Comments used for testing purposes: `;=` followed by the expected words in hexadecimal.
	TestComment(Vec<u16>, SourceSpan),
}

impl Eq for Token {}
impl PartialEq for Token {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Identifier(name, ..), Self::Identifier(other_name, ..))
			| (Self::LocalIdentifier(name, ..), Self::LocalIdentifier(other_name, ..))
			| (Self::String(name, ..), Self::String(other_name, ..)) => name == other_name,
			(Self::Number(value, ..), Self::Number(other_value, ..)) => value == other_value,
			(Self::Register(register, ..), Self::Register(other_register, ..)) => register == other_register,
			(Self::Mnemonic(mnemonic, ..), Self::Mnemonic(other_mnemonic, ..)) => mnemonic == other_mnemonic,
			(Self::Directive(directive, ..), Self::Directive(other_directive, ..)) => directive == other_directive,
			(Self::TestComment(words, ..), Self::TestComment(other_words, ..)) => words == other_words,
			_ => std::mem::discriminant(self) == std::mem::discriminant(other),
		}
	}
}

impl Token {
	/// Returns the source span where this token is located in the file.
	#[must_use]
	pub fn source_span(&self) -> SourceSpan {
		match self {
			Self::Mnemonic(_, span)
			| Self::Identifier(_, span)
			| Self::LocalIdentifier(_, span)
			| Self::Register(_, span)
			| Self::Directive(_, span)
			| Self::Number(_, span)
			| Self::String(_, span)
			| Self::TestComment(_, span) => *span,
			Self::Comma(offset)
			| Self::Colon(offset)
			| Self::OpenBracket(offset)
			| Self::CloseBracket(offset)
			| Self::OpenParenthesis(offset)
			| Self::CloseParenthesis(offset)
			| Self::Plus(offset)
			| Self::Minus(offset)
			| Self::Star(offset)
			| Self::Slash(offset)
			| Self::Percent(offset)
			| Self::Ampersand(offset)
			| Self::Pipe(offset)
			| Self::Caret(offset)
			| Self::Tilde(offset)
			| Self::Newline(offset) => SourceSpan::new(*offset, 1),
			Self::DoubleOpenAngleBracket(offset) | Self::DoubleCloseAngleBracket(offset) => SourceSpan::new(*offset, 2),
		}
	}

	/// Parse a single-character token.
	pub(super) fn parse_single_char(value: char, location: SourceOffset) -> Option<Self> {
		Some(match value {
			',' => Self::Comma(location),
			':' => Self::Colon(location),
			'[' => Self::OpenBracket(location),
			']' => Self::CloseBracket(location),
			'(' => Self::OpenParenthesis(location),
			')' => Self::CloseParenthesis(location),
			'+' => Self::Plus(location),
			'-' => Self::Minus(location),
			'*' => Self::Star(location),
			'/' => Self::Slash(location),
			'%' => Self::Percent(location),
			'&' => Self::Ampersand(location),
			'|' => Self::Pipe(location),
			'^' => Self::Caret(location),
			'~' => Self::Tilde(location),
			_ => return None,
		})
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", match self {
			Self::Mnemonic(..) => "mnemonic",
			Self::Identifier(..) => "identifier",
			Self::LocalIdentifier(..) => "local identifier",
			Self::Register(..) => "register name",
			Self::Directive(..) => "directive",
			Self::Number(..) => "number",
			Self::String(..) => "string",
			Self::Comma(..) => "`,`",
			Self::Colon(..) => "`:`",
			Self::OpenBracket(..) => "`[`",
			Self::CloseBracket(..) => "`]`",
			Self::OpenParenthesis(..) => "`(`",
			Self::CloseParenthesis(..) => "`)`",
			Self::Plus(..) => "`+`",
			Self::Minus(..) => "`-`",
			Self::Star(..) => "`*`",
			Self::Slash(..) => "`/`",
			Self::Percent(..) => "`%`",
			Self::Ampersand(..) => "`&`",
			Self::Pipe(..) => "`|`",
			Self::Caret(..) => "`^`",
			Self::Tilde(..) => "`~`",
			Self::DoubleOpenAngleBracket(..) => "`<<`",
			Self::DoubleCloseAngleBracket(..) => "`>>`",
			Self::Newline(..) => "new line",
			Self::TestComment(..) => "test comment (;=)",
		})
	}
}
