//! Macro expansion by textual substitution and re-parsing.

use std::collections::HashSet;
use std::sync::Arc;

use flexstr::SharedStr;
use log::trace;
use miette::SourceSpan;

use super::directive::MacroDefinition;
use super::program::MacroCall;
use super::reference::{Reference, SymbolKey};
use super::{ProgramElement, SymbolTable};
use crate::AssemblyCode;
use crate::change::Change;
use crate::error::AssemblyError;
use crate::parser::{Token, lex, parse};

/// Substitutes the arguments of a macro call into the macro body.
///
/// The body is lexed and every identifier token equal to a parameter name is replaced by the corresponding argument
/// text. Everything else, including strings, comments and white space, is copied verbatim.
///
/// # Errors
/// If the number of arguments does not match the number of parameters.
pub fn substitute(
	definition: &MacroDefinition,
	arguments: &[SharedStr],
	location: SourceSpan,
	src: &Arc<AssemblyCode>,
) -> Result<String, Box<AssemblyError>> {
	if arguments.len() != definition.parameters.len() {
		return Err(AssemblyError::IncorrectNumberOfMacroArguments {
			name: definition.name.clone(),
			expected_number: definition.parameters.len(),
			actual_number: arguments.len(),
			location,
			src: src.clone(),
		}
		.into());
	}

	let body: &str = &definition.body;
	let body_code = Arc::new(AssemblyCode::new(body, &definition.name));
	// Lexer errors are reported when the substituted text is parsed.
	let (tokens, _) = lex(&body_code);

	let mut result = String::with_capacity(body.len());
	let mut copied_until = 0;
	for token in &tokens {
		let Token::Identifier(name, span) = token else { continue };
		let Some(index) = definition.parameters.iter().position(|parameter| parameter == name) else { continue };
		result.push_str(&body[copied_until .. span.offset()]);
		result.push_str(&arguments[index]);
		copied_until = span.offset() + span.len();
	}
	result.push_str(&body[copied_until ..]);
	Ok(result)
}

/// Expands macro calls, including calls inside of macro bodies.
#[derive(Debug)]
pub struct MacroExpander<'a> {
	symbols:       &'a SymbolTable,
	maximum_depth: usize,
	/// Synthetic scopes handed out so far.
	scopes:        HashSet<SharedStr>,
}

impl<'a> MacroExpander<'a> {
	/// Creates an expander that takes macro definitions from the given table.
	#[must_use]
	pub fn new(symbols: &'a SymbolTable, maximum_depth: usize) -> Self {
		Self { symbols, maximum_depth, scopes: HashSet::new() }
	}

	/// Replaces every macro call in the program by its expansion. Calls that fail to expand are replaced by
	/// [`ProgramElement::Unparsed`] and their errors are returned.
	pub fn expand_program(
		&mut self,
		elements: &mut [ProgramElement],
		src: &Arc<AssemblyCode>,
	) -> (Change, Vec<AssemblyError>) {
		let mut errors = Vec::new();
		let change = self.expand_elements(elements, src, 1, &mut errors);
		(change, errors)
	}

	fn expand_elements(
		&mut self,
		elements: &mut [ProgramElement],
		src: &Arc<AssemblyCode>,
		depth: usize,
		errors: &mut Vec<AssemblyError>,
	) -> Change {
		let mut change = Change::Unmodified;
		for element in elements {
			match element {
				ProgramElement::MacroCall(call) => {
					change = Change::Modified;
					let span = call.span;
					let expanded = self.expand_call(call, src, depth);
					*element = expanded.unwrap_or_else(|error| {
						errors.push(*error);
						ProgramElement::Unparsed { span }
					});
				},
				ProgramElement::IncludeSource { source: Some(included), content, .. } => {
					let included = included.clone();
					change |= self.expand_elements(content, &included, depth, errors);
				},
				_ => {},
			}
		}
		change
	}

	/// Expands a single macro call at the given nesting depth (top-level calls have depth 1).
	///
	/// # Errors
	/// If the macro is unknown, the depth limit is exceeded, the arguments don't match, or the expanded body contains
	/// errors.
	pub fn expand_call(
		&mut self,
		call: &MacroCall,
		src: &Arc<AssemblyCode>,
		depth: usize,
	) -> Result<ProgramElement, Box<AssemblyError>> {
		let symbols = self.symbols;
		let definition = symbols.macro_definition(&call.name).ok_or_else(|| AssemblyError::UnknownMacro {
			name:     call.name.clone(),
			location: call.span,
			src:      src.clone(),
		})?;
		if depth > self.maximum_depth {
			return Err(AssemblyError::RecursiveMacroUse {
				name:     call.name.clone(),
				depth:    self.maximum_depth,
				location: call.span,
				src:      src.clone(),
			}
			.into());
		}

		let text = substitute(definition, &call.arguments, call.span, src)?;
		let scope = self.new_scope(&call.name, call.span.offset());
		trace!("expanding {} as {scope} at depth {depth}", call.name);

		let expansion_code = Arc::new(AssemblyCode::new(&text, &format!("{} ({})", src.file_name(), call.name)));
		let parsed = parse(&expansion_code, Some(scope.clone()));
		let mut errors = parsed.errors;
		let mut body = Vec::with_capacity(parsed.elements.len() + 1);
		body.push(ProgramElement::Label(Reference {
			name:     scope.clone(),
			is_local: false,
			parent:   None,
			span:     call.span,
		}));
		body.extend(parsed.elements);
		self.expand_elements(&mut body, &expansion_code, depth + 1, &mut errors);

		if !errors.is_empty() {
			return Err(AssemblyError::MacroExpansionFailed {
				name: call.name.clone(),
				errors,
				location: call.span,
				src: src.clone(),
			}
			.into());
		}

		let mut expanded = ProgramElement::ExpandedMacro { call: call.clone(), scope, body };
		expanded.relocate(call.span);
		Ok(expanded)
	}

	/// A global label name for local labels of one expansion. Such names cannot be written in source code, so they
	/// never collide with user symbols.
	fn new_scope(&mut self, name: &str, offset: usize) -> SharedStr {
		let base = format!("{name}@{offset}");
		let mut candidate: SharedStr = base.as_str().into();
		let mut counter = 1;
		while self.scopes.contains(&candidate) || self.symbols.get(&SymbolKey::global(candidate.clone())).is_some() {
			candidate = format!("{base}#{counter}").into();
			counter += 1;
		}
		self.scopes.insert(candidate.clone());
		candidate
	}
}
