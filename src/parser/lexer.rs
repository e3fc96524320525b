//! Lexing.

use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::Arc;

use super::Parse;
use super::token::Token;
use crate::AssemblyCode;
use crate::error::AssemblyError;
use crate::sema::Register;
use crate::sema::directive::DirectiveSymbol;
use crate::sema::instruction::Mnemonic;

type Chars<'a> = Peekable<CharIndices<'a>>;

/// Lex the given assembly into a list of tokens.
///
/// Lexing does not stop at errors: invalid characters and literals are reported and skipped, so that the parser can
/// still make sense of the rest of the line.
#[allow(clippy::too_many_lines)]
pub fn lex(source_code: &Arc<AssemblyCode>) -> (Vec<Token>, Vec<AssemblyError>) {
	let text = source_code.text.clone();
	let mut chars = text.char_indices().peekable();
	let mut tokens = Vec::new();
	let mut errors = Vec::new();

	while let Some((index, chr)) = chars.next() {
		match chr {
			'\n' => tokens.push(Token::Newline(index.into())),
			// \r was already removed, other white space is insignificant.
			_ if chr.is_whitespace() => {},
			';' =>
				if cfg!(test) && chars.peek().is_some_and(|(_, next)| *next == '=') {
					chars.next();
					let (contents, end) = until_line_end(&mut chars, &text, index + 2);
					let location = (index, end - index).into();
					match contents.split_whitespace().map(|word| u16::from_str_radix(word, 16)).collect() {
						Ok(words) => tokens.push(Token::TestComment(words, location)),
						Err(error) => errors.push(AssemblyError::InvalidNumber { error, location, src: source_code.clone() }),
					}
				} else {
					until_line_end(&mut chars, &text, index + 1);
				},
			'"' => match next_string(&mut chars, '"', index + 1) {
				Ok((string, end)) => tokens.push(Token::String(string.into(), (index, end - index).into())),
				Err(end) => errors.push(AssemblyError::UnterminatedString {
					location: (index, end - index).into(),
					src:      source_code.clone(),
				}),
			},
			'\'' => match next_string(&mut chars, '\'', index + 1) {
				Ok((string, end)) if string.chars().count() == 1 => tokens.push(Token::Number(
					string.chars().next().map_or(0, |chr| i64::from(u32::from(chr))),
					(index, end - index).into(),
				)),
				Ok((string, end)) => errors.push(AssemblyError::InvalidConstant {
					constant: string.into(),
					typename: "character literal".into(),
					location: (index, end - index).into(),
					src:      source_code.clone(),
				}),
				Err(end) => errors.push(AssemblyError::UnterminatedString {
					location: (index, end - index).into(),
					src:      source_code.clone(),
				}),
			},
			'A' ..= 'Z' | 'a' ..= 'z' | '_' => {
				let identifier = next_identifier(&mut chars, &text, index);
				let identifier_span = (index, identifier.len()).into();
				let lowercase = identifier.to_lowercase();
				tokens.push(if let Ok(register) = Register::parse(&lowercase, identifier_span, source_code.clone()) {
					Token::Register(register, identifier_span)
				} else if let Ok(mnemonic) = Mnemonic::parse(&lowercase, identifier_span, source_code.clone()) {
					Token::Mnemonic(mnemonic, identifier_span)
				} else if let Ok(directive) = DirectiveSymbol::parse(&lowercase, identifier_span, source_code.clone()) {
					Token::Directive(directive, identifier_span)
				} else {
					Token::Identifier(identifier.into(), identifier_span)
				});
			},
			'.' if chars.peek().is_some_and(|(_, next)| next.is_alphabetic() || *next == '_') => {
				let identifier = next_identifier(&mut chars, &text, index + 1);
				let span = (index, identifier.len() + 1).into();
				tokens.push(match DirectiveSymbol::parse(&identifier.to_lowercase(), span, source_code.clone()) {
					Ok(directive) => Token::Directive(directive, span),
					Err(_) => Token::LocalIdentifier(identifier.into(), span),
				});
			},
			'0' ..= '9' | '$' => {
				let (radix, digits_start) = match (chr, chars.peek().map(|(_, next)| next.to_ascii_lowercase())) {
					('$', _) => (16, index + 1),
					('0', Some('x')) => {
						chars.next();
						(16, index + 2)
					},
					('0', Some('b')) => {
						chars.next();
						(2, index + 2)
					},
					_ => (10, index),
				};
				let end = next_word_end(&mut chars, &text, index + chr.len_utf8());
				let location = (index, end - index).into();
				let digits = text[digits_start .. end].replace('_', "");
				match i64::from_str_radix(&digits, radix) {
					Ok(number) => tokens.push(Token::Number(number, location)),
					Err(error) => errors.push(AssemblyError::InvalidNumber { error, location, src: source_code.clone() }),
				}
			},
			'<' | '>' if chars.peek().is_some_and(|(_, next)| *next == chr) => {
				chars.next();
				tokens.push(if chr == '<' {
					Token::DoubleOpenAngleBracket(index.into())
				} else {
					Token::DoubleCloseAngleBracket(index.into())
				});
			},
			_ => match Token::parse_single_char(chr, index.into()) {
				Some(token) => tokens.push(token),
				None => errors.push(AssemblyError::UnexpectedCharacter {
					chr,
					location: (index, chr.len_utf8()).into(),
					src: source_code.clone(),
				}),
			},
		}
	}

	(tokens, errors)
}

/// Reads the rest of an identifier whose first character (at `start`) was already consumed.
fn next_identifier<'a>(chars: &mut Chars<'_>, text: &'a str, start: usize) -> &'a str {
	let end = next_word_end(chars, text, start + 1);
	&text[start .. end]
}

/// Consumes alphanumeric characters and underscores, returning the byte offset after the last one.
fn next_word_end(chars: &mut Chars<'_>, text: &str, mut end: usize) -> usize {
	while let Some((index, chr)) = chars.peek().copied()
		&& (chr.is_alphanumeric() || chr == '_')
	{
		chars.next();
		end = index + chr.len_utf8();
	}
	end.min(text.len())
}

/// Consumes everything up to (not including) the next newline. Returns the consumed text and its end offset.
fn until_line_end<'a>(chars: &mut Chars<'_>, text: &'a str, start: usize) -> (&'a str, usize) {
	let mut end = start;
	while let Some((index, chr)) = chars.peek().copied()
		&& chr != '\n'
	{
		chars.next();
		end = index + chr.len_utf8();
	}
	let end = end.max(start).min(text.len());
	(&text[start.min(end) .. end], end)
}

/// Reads a string or character literal whose opening quote was already consumed. On success, returns the unescaped
/// contents and the offset after the closing quote; on failure, returns the offset where the literal ended. `start` is
/// the offset after the opening quote.
fn next_string(chars: &mut Chars<'_>, quote: char, start: usize) -> Result<(String, usize), usize> {
	let mut string = String::new();
	let mut last_end = start;
	while let Some((index, chr)) = chars.peek().copied() {
		if chr == '\n' {
			return Err(index);
		}
		chars.next();
		last_end = index + chr.len_utf8();
		match chr {
			_ if chr == quote => return Ok((string, last_end)),
			'\\' => {
				let Some((escape_index, escaped)) = chars.next() else { break };
				last_end = escape_index + escaped.len_utf8();
				string.push(match escaped {
					'n' => '\n',
					't' => '\t',
					'r' => '\r',
					'0' => '\0',
					other => other,
				});
			},
			_ => string.push(chr),
		}
	}
	Err(last_end)
}

/// The source text of a token.
pub(crate) fn token_text<'a>(source_code: &'a AssemblyCode, token: &Token) -> &'a str {
	let span = token.source_span();
	source_code.text.get(span.offset() .. span.offset() + span.len()).unwrap_or_default()
}

#[cfg(test)]
mod test {
	use super::*;

	fn lex_str(text: &str) -> (Vec<Token>, Vec<AssemblyError>) {
		lex(&Arc::new(AssemblyCode::new(text, "test")))
	}

	#[test]
	fn instruction_line() {
		let (tokens, errors) = lex_str("loop: SET [A+0x10], 'x' ; comment\n");
		assert!(errors.is_empty());
		assert_eq!(tokens, vec![
			Token::Identifier("loop".into(), (0, 4).into()),
			Token::Colon(4.into()),
			Token::Mnemonic(Mnemonic::Set, (6, 3).into()),
			Token::OpenBracket(10.into()),
			Token::Register(Register::A, (11, 1).into()),
			Token::Plus(12.into()),
			Token::Number(0x10, (13, 4).into()),
			Token::CloseBracket(17.into()),
			Token::Comma(18.into()),
			Token::Number(i64::from(b'x'), (20, 3).into()),
			Token::Newline(33.into()),
		]);
		assert_eq!(tokens[6].source_span(), (13, 4).into());
	}

	#[test]
	fn numbers_and_operators() {
		let (tokens, errors) = lex_str("$ff 0b101 1_000 1 << 2 >> ~3");
		assert!(errors.is_empty());
		let numbers = tokens
			.iter()
			.filter_map(|token| match token {
				Token::Number(number, _) => Some(*number),
				_ => None,
			})
			.collect::<Vec<_>>();
		assert_eq!(numbers, vec![0xff, 0b101, 1000, 1, 2, 3]);
		assert!(tokens.contains(&Token::DoubleOpenAngleBracket(0.into())));
		assert!(tokens.contains(&Token::DoubleCloseAngleBracket(0.into())));
		assert!(tokens.contains(&Token::Tilde(0.into())));
	}

	#[test]
	fn directives_and_local_labels() {
		let (tokens, errors) = lex_str(".org dat .loop .ENDMACRO");
		assert!(errors.is_empty());
		assert_eq!(tokens, vec![
			Token::Directive(DirectiveSymbol::Org, (0, 4).into()),
			Token::Directive(DirectiveSymbol::Dat, (5, 3).into()),
			Token::LocalIdentifier("loop".into(), (9, 5).into()),
			Token::Directive(DirectiveSymbol::EndMacro, (15, 9).into()),
		]);
	}

	#[test]
	fn strings() {
		let (tokens, errors) = lex_str(r#".dat "a\"b\n", "unterminated"#);
		assert_eq!(tokens[1], Token::String("a\"b\n".into(), (0, 0).into()));
		assert_eq!(errors.len(), 1);
		assert!(matches!(errors[0], AssemblyError::UnterminatedString { .. }));
	}

	#[test]
	fn literals_unterminated_at_end_of_file() {
		for text in [".dat \"", "SET A, '", ".dat \"\\"] {
			let (_, errors) = lex_str(text);
			let [AssemblyError::UnterminatedString { location, .. }] = &errors[..] else {
				panic!("{text:?}: {errors:?}");
			};
			assert!(location.offset() + location.len() <= text.len());
		}
	}

	#[test]
	fn errors_do_not_stop_lexing() {
		let (tokens, errors) = lex_str("set a, 0xZZ\nset b, #1\nset c, 1");
		assert_eq!(errors.len(), 2);
		assert!(matches!(errors[0], AssemblyError::InvalidNumber { .. }));
		assert!(matches!(errors[1], AssemblyError::UnexpectedCharacter { chr: '#', .. }));
		assert_eq!(tokens.iter().filter(|token| matches!(token, Token::Mnemonic(..))).count(), 3);
	}

	#[test]
	fn test_comments() {
		let (tokens, errors) = lex_str("set a, 1 ;= 8801\n");
		assert!(errors.is_empty());
		assert!(tokens.contains(&Token::TestComment(vec![0x8801], (0, 0).into())));
	}
}
