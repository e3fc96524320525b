//! The symbol table: labels, equations and macros, and the evaluation of values that refer to them.

use std::collections::HashMap;
use std::sync::Arc;

use flexstr::SharedStr;
use miette::SourceSpan;
use thiserror::Error;

use super::AssemblyTimeValue;
use super::directive::{DirectiveValue, MacroDefinition};
use super::program::{ProgramElement, walk};
use super::reference::{Reference, SymbolKey};
use super::value::ValueError;
use crate::AssemblyCode;
use crate::error::AssemblyError;

/// A lazily computed value. The only legal transition is from unresolved to resolved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Resolution<T> {
	/// No value yet.
	#[default]
	Unresolved,
	/// The final value.
	Resolved(T),
}

impl<T: Copy> Resolution<T> {
	/// Resolves to the given value.
	///
	/// # Errors
	/// If the value was already resolved.
	pub fn resolve(&mut self, value: T) -> Result<(), ResolutionError> {
		match self {
			Self::Unresolved => {
				*self = Self::Resolved(value);
				Ok(())
			},
			Self::Resolved(_) => Err(ResolutionError::AlreadyResolved),
		}
	}

	/// The value, if resolved.
	#[must_use]
	pub const fn get(&self) -> Option<T> {
		match self {
			Self::Unresolved => None,
			Self::Resolved(value) => Some(*value),
		}
	}

	/// Whether a value is present.
	#[must_use]
	pub const fn is_resolved(&self) -> bool {
		matches!(self, Self::Resolved(_))
	}
}

/// Misuse of symbol resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
	/// A value was resolved twice.
	#[error("value was already resolved")]
	AlreadyResolved,
	/// A label that was never declared was resolved.
	#[error("label '{0}' does not exist")]
	UnknownLabel(SymbolKey),
}

/// The different kinds of symbols.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
	/// An address-valued label, resolved by address calculation.
	Label {
		/// Word address of the label.
		address: Resolution<u16>,
	},
	/// A named constant expression.
	Equation {
		/// The defining expression.
		value: AssemblyTimeValue,
	},
	/// A user-defined macro.
	Macro(MacroDefinition),
}

/// A named, resolvable quantity.
#[derive(Clone, Debug)]
pub struct Symbol {
	/// What this symbol is.
	pub kind:       SymbolKind,
	/// Index of the compilation unit that defines the symbol.
	pub unit:       usize,
	/// Where the symbol is defined.
	pub definition: SourceSpan,
	/// The source code that [`Self::definition`] refers to.
	pub src:        Arc<AssemblyCode>,
}

impl Symbol {
	/// Human-readable definition position, like `file.dasm:3:1`.
	#[must_use]
	pub fn describe_location(&self) -> SharedStr {
		let (line, column) = self.src.line_and_column(self.definition.offset());
		format!("{}:{line}:{column}", self.src.file_name()).into()
	}
}

/// Reasons why a value cannot be computed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvaluationError {
	/// The reference does not name any symbol.
	Unknown(Reference),
	/// The label has no address yet.
	Unresolved(SymbolKey),
	/// The equations form a cycle; the first and last entries are the same.
	Cyclic(Vec<SymbolKey>),
	/// A macro name was used as a value.
	NotAValue(SymbolKey),
	/// Division or modulus by zero.
	DivisionByZero,
}

impl From<ValueError> for EvaluationError {
	fn from(error: ValueError) -> Self {
		match error {
			ValueError::DivisionByZero => Self::DivisionByZero,
		}
	}
}

impl EvaluationError {
	/// Converts this error into a user-facing error at the given location.
	#[must_use]
	pub fn into_assembly_error(self, location: SourceSpan, src: Arc<AssemblyCode>) -> AssemblyError {
		match self {
			Self::Unknown(reference) if reference.is_local && reference.parent.is_none() =>
				AssemblyError::MissingGlobalLabel { local_label: reference.name, location, src },
			Self::Unknown(reference) => AssemblyError::UnknownSymbol { name: reference.to_string().into(), location, src },
			Self::Unresolved(key) => AssemblyError::InternalError {
				cause: format!("label '{key}' has no address at this point").into(),
				location,
				src,
			},
			Self::Cyclic(cycle) => AssemblyError::CyclicEquation {
				name: cycle.first().map(ToString::to_string).unwrap_or_default().into(),
				cycle: cycle.iter().map(ToString::to_string).collect::<Vec<_>>().join(" -> ").into(),
				location,
				src,
			},
			Self::NotAValue(key) => AssemblyError::InvalidConstant {
				constant: key.to_string().into(),
				typename: "value (it is a macro)".into(),
				location,
				src,
			},
			Self::DivisionByZero => AssemblyError::DivisionByZero { location, src },
		}
	}
}

/// All symbols visible to one compilation run.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
	symbols: HashMap<SymbolKey, Symbol>,
}

impl SymbolTable {
	/// Creates an empty table.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares a new symbol.
	///
	/// # Errors
	/// If a symbol with the same key already exists.
	pub fn declare(&mut self, key: SymbolKey, symbol: Symbol) -> Result<(), Box<AssemblyError>> {
		if let Some(existing) = self.symbols.get(&key) {
			return Err(AssemblyError::RedefinedSymbol {
				name:             key.to_string().into(),
				first_definition: existing.describe_location(),
				location:         symbol.definition,
				src:              symbol.src,
			}
			.into());
		}
		self.symbols.insert(key, symbol);
		Ok(())
	}

	/// Declares the labels, equations and macros of a program. Nested elements (included files and macro expansions)
	/// are declared as well.
	pub fn declare_program(
		&mut self,
		elements: &[ProgramElement],
		source: &Arc<AssemblyCode>,
		unit: usize,
		local_labels_supported: bool,
	) -> Vec<AssemblyError> {
		let mut errors = Vec::new();
		walk(elements, source, &mut |element, src| {
			let (symbol, kind) = match element {
				ProgramElement::Label(label) => (label, SymbolKind::Label { address: Resolution::Unresolved }),
				ProgramElement::Directive(directive) => match &directive.value {
					DirectiveValue::Equation { symbol, value } => (symbol, SymbolKind::Equation { value: value.clone() }),
					DirectiveValue::MacroDefinition(definition) => {
						let key = SymbolKey::global(definition.name.clone());
						let symbol =
							Symbol { kind: SymbolKind::Macro(definition.clone()), unit, definition: directive.span, src: src.clone() };
						if let Err(error) = self.declare(key, symbol) {
							errors.push(*error);
						}
						return;
					},
					_ => return,
				},
				_ => return,
			};

			if symbol.is_local && !local_labels_supported {
				errors.push(AssemblyError::LocalLabelsDisabled {
					local_label: symbol.name.clone(),
					location:    symbol.span,
					src:         src.clone(),
				});
				return;
			}
			let Some(key) = symbol.key() else {
				errors.push(AssemblyError::MissingGlobalLabel {
					local_label: symbol.name.clone(),
					location:    symbol.span,
					src:         src.clone(),
				});
				return;
			};
			if let Err(error) = self.declare(key, Symbol { kind, unit, definition: symbol.span, src: src.clone() }) {
				errors.push(*error);
			}
		});
		errors
	}

	/// Returns the symbol with the given key.
	#[must_use]
	pub fn get(&self, key: &SymbolKey) -> Option<&Symbol> {
		self.symbols.get(key)
	}

	/// Returns the symbol a reference refers to.
	#[must_use]
	pub fn lookup(&self, reference: &Reference) -> Option<&Symbol> {
		reference.key().and_then(|key| self.symbols.get(&key))
	}

	/// Returns the macro with the given name.
	#[must_use]
	pub fn macro_definition(&self, name: &str) -> Option<&MacroDefinition> {
		match self.symbols.get(&SymbolKey::global(name)) {
			Some(Symbol { kind: SymbolKind::Macro(definition), .. }) => Some(definition),
			_ => None,
		}
	}

	/// Returns the address of a label, if it is resolved.
	#[must_use]
	pub fn label_address(&self, key: &SymbolKey) -> Option<u16> {
		match self.symbols.get(key) {
			Some(Symbol { kind: SymbolKind::Label { address }, .. }) => address.get(),
			_ => None,
		}
	}

	/// Assigns an address to a label.
	///
	/// # Errors
	/// If the label does not exist or already has an address.
	pub fn resolve_label(&mut self, key: &SymbolKey, address: u16) -> Result<(), ResolutionError> {
		match self.symbols.get_mut(key) {
			Some(Symbol { kind: SymbolKind::Label { address: resolution }, .. }) => resolution.resolve(address),
			_ => Err(ResolutionError::UnknownLabel(key.clone())),
		}
	}

	/// Resets the addresses of all labels defined by a unit.
	pub fn clear_unit_labels(&mut self, unit: usize) {
		for symbol in self.symbols.values_mut() {
			if symbol.unit == unit
				&& let SymbolKind::Label { address } = &mut symbol.kind
			{
				*address = Resolution::Unresolved;
			}
		}
	}

	/// Iterates over all symbols.
	pub fn iter(&self) -> impl Iterator<Item = (&SymbolKey, &Symbol)> {
		self.symbols.iter()
	}

	/// Number of symbols.
	#[must_use]
	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	/// Whether there are no symbols.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}

	/// Computes a value. Label addresses are taken from this table.
	///
	/// # Errors
	/// If any symbol is unknown or unresolved, or the equations are cyclic.
	pub fn evaluate(&self, value: &AssemblyTimeValue) -> Result<i64, EvaluationError> {
		self.evaluate_impl(value, None, &mut Vec::new())
	}

	/// Computes a value, taking label addresses from this table and, for labels unresolved here, from `fallback`.
	///
	/// # Errors
	/// See [`Self::evaluate`].
	pub fn evaluate_with_fallback(
		&self,
		value: &AssemblyTimeValue,
		fallback: Option<&Self>,
	) -> Result<i64, EvaluationError> {
		self.evaluate_impl(value, fallback, &mut Vec::new())
	}

	fn evaluate_impl(
		&self,
		value: &AssemblyTimeValue,
		fallback: Option<&Self>,
		visiting: &mut Vec<SymbolKey>,
	) -> Result<i64, EvaluationError> {
		value.value_using_resolver(&mut |reference: &Reference| {
			let key = reference.key().ok_or_else(|| EvaluationError::Unknown(reference.clone()))?;
			let symbol = self.symbols.get(&key).ok_or_else(|| EvaluationError::Unknown(reference.clone()))?;
			match &symbol.kind {
				SymbolKind::Label { address } => address
					.get()
					.or_else(|| fallback.and_then(|fallback| fallback.label_address(&key)))
					.map(i64::from)
					.ok_or(EvaluationError::Unresolved(key)),
				SymbolKind::Equation { value } => {
					if let Some(start) = visiting.iter().position(|visited| visited == &key) {
						let mut cycle = visiting[start ..].to_vec();
						cycle.push(key);
						return Err(EvaluationError::Cyclic(cycle));
					}
					visiting.push(key);
					let result = self.evaluate_impl(value, fallback, visiting);
					visiting.pop();
					result
				},
				SymbolKind::Macro(_) => Err(EvaluationError::NotAValue(key)),
			}
		})
	}

	/// Searches for an equation cycle reachable from the given symbol. Labels end the search, since their values
	/// never depend on equations.
	#[must_use]
	pub fn find_cycle(&self, key: &SymbolKey) -> Option<Vec<SymbolKey>> {
		self.find_cycle_impl(key, &mut Vec::new())
	}

	fn find_cycle_impl(&self, key: &SymbolKey, visiting: &mut Vec<SymbolKey>) -> Option<Vec<SymbolKey>> {
		if let Some(start) = visiting.iter().position(|visited| visited == key) {
			let mut cycle = visiting[start ..].to_vec();
			cycle.push(key.clone());
			return Some(cycle);
		}
		let Some(Symbol { kind: SymbolKind::Equation { value }, .. }) = self.symbols.get(key) else {
			return None;
		};
		visiting.push(key.clone());
		let cycle = value
			.references()
			.into_iter()
			.filter_map(Reference::key)
			.find_map(|referenced| self.find_cycle_impl(&referenced, visiting));
		visiting.pop();
		cycle
	}

	/// Whether the value depends on the address of any label. Values that cannot be analyzed (unknown symbols, cycles)
	/// count as address-dependent.
	#[must_use]
	pub fn is_address_dependent(&self, value: &AssemblyTimeValue) -> bool {
		self.is_address_dependent_impl(value, &mut Vec::new())
	}

	fn is_address_dependent_impl(&self, value: &AssemblyTimeValue, visiting: &mut Vec<SymbolKey>) -> bool {
		value.references().into_iter().any(|reference| {
			let Some(key) = reference.key() else { return true };
			match self.symbols.get(&key).map(|symbol| &symbol.kind) {
				Some(SymbolKind::Equation { value }) => {
					if visiting.contains(&key) {
						return true;
					}
					visiting.push(key);
					let dependent = self.is_address_dependent_impl(value, visiting);
					visiting.pop();
					dependent
				},
				Some(SymbolKind::Label { .. } | SymbolKind::Macro(_)) | None => true,
			}
		})
	}

	/// Value of a reference, if it is an address-independent constant. Used for folding expressions.
	#[must_use]
	pub fn constant_value(&self, reference: &Reference) -> Option<i64> {
		let value = AssemblyTimeValue::Reference(reference.clone());
		if self.is_address_dependent(&value) { None } else { self.evaluate(&value).ok() }
	}

	/// A listing of all labels and equations, sorted by name, for debugging output.
	#[must_use]
	pub fn dump(&self) -> String {
		let mut lines = self
			.symbols
			.iter()
			.map(|(key, symbol)| {
				let name = key.to_string();
				match &symbol.kind {
					SymbolKind::Label { address: Resolution::Resolved(address) } => format!("{name:<30} = {address:04X}"),
					SymbolKind::Label { address: Resolution::Unresolved } => format!("{name:<30} = ????"),
					SymbolKind::Equation { value } => format!("{name:<30} = {value}"),
					SymbolKind::Macro(definition) => format!(
						"{name:<30}   macro({})",
						definition.parameters.iter().map(SharedStr::as_str).collect::<Vec<_>>().join(", ")
					),
				}
			})
			.collect::<Vec<_>>();
		lines.sort();
		lines.join("\n")
	}
}

/// A view on symbols used while computing instruction encodings.
pub trait ValueResolver {
	/// Computes a value.
	///
	/// # Errors
	/// If the value cannot be computed (yet).
	fn value_of(&self, value: &AssemblyTimeValue) -> Result<i64, EvaluationError>;

	/// Whether a small value may be encoded inline. Values that depend on label addresses may be withheld from
	/// inlining while those addresses are provisional.
	fn may_inline(&self, value: &AssemblyTimeValue) -> bool;
}

/// Resolves values from a symbol table, optionally falling back to an older table for labels that are not resolved
/// yet.
#[derive(Clone, Copy, Debug)]
pub struct SymbolView<'a> {
	/// The primary table.
	pub symbols:          &'a SymbolTable,
	/// Older label addresses.
	pub fallback:         Option<&'a SymbolTable>,
	/// Whether values that depend on label addresses may be inlined.
	pub inline_addresses: bool,
}

impl<'a> SymbolView<'a> {
	/// A view on a single table.
	#[must_use]
	pub const fn new(symbols: &'a SymbolTable) -> Self {
		Self { symbols, fallback: None, inline_addresses: true }
	}

	/// A view that falls back to older addresses.
	#[must_use]
	pub const fn with_fallback(symbols: &'a SymbolTable, fallback: &'a SymbolTable) -> Self {
		Self { symbols, fallback: Some(fallback), inline_addresses: true }
	}

	/// Keeps values that depend on label addresses at full width. Sizes computed this way never shrink once the
	/// addresses are known.
	#[must_use]
	pub const fn without_address_inlining(mut self) -> Self {
		self.inline_addresses = false;
		self
	}
}

impl ValueResolver for SymbolView<'_> {
	fn value_of(&self, value: &AssemblyTimeValue) -> Result<i64, EvaluationError> {
		self.symbols.evaluate_with_fallback(value, self.fallback)
	}

	fn may_inline(&self, value: &AssemblyTimeValue) -> bool {
		self.inline_addresses || !self.symbols.is_address_dependent(value)
	}
}
