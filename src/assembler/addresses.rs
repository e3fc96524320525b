//! Address calculation.

use std::sync::Arc;

use log::trace;
use miette::SourceSpan;

use super::encoder::{MAXIMUM_INSTRUCTION_BYTES, encoded_size};
use crate::AssemblyCode;
use crate::address::{Address, advance_offset, words_to_bytes};
use crate::cli::CompilerOptions;
use crate::error::AssemblyError;
use crate::sema::directive::DirectiveValue;
use crate::sema::program::walk;
use crate::sema::symbol::ResolutionError;
use crate::sema::{AssemblyTimeValue, ProgramElement, SymbolTable, SymbolView};

/// Result of one address calculation pass over a unit.
#[derive(Debug)]
pub struct AddressCalculation {
	/// The new symbol table, with this unit's labels assigned.
	pub symbols:    SymbolTable,
	/// Problems found on the way. Sizing never fails, so addresses are assigned even if there are errors.
	pub errors:     Vec<AssemblyError>,
	/// Byte offset after the last element.
	pub end_offset: u32,
	/// Size in bytes of every instruction, in program order.
	pub layout:     Vec<u32>,
}

/// How a pass sizes operands that depend on label addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressSizing {
	/// Such operands always take a trailing word. Every address found this way is an upper bound of the final one.
	WorstCase,
	/// Such operands are inlined if their value, computed from the best addresses known so far, is small.
	Final,
}

/// Assigns addresses to all labels of a unit.
///
/// This is a pure function of its inputs. The result starts as a copy of `previous` with the unit's label addresses
/// cleared; each label of the unit is then assigned exactly once. Labels that were not reached yet are read from
/// `previous`. Instructions whose size can't be determined yet count with the maximum instruction size.
#[must_use]
pub fn calculate_addresses(
	unit: usize,
	start_offset: u32,
	content: &[ProgramElement],
	src: &Arc<AssemblyCode>,
	previous: &SymbolTable,
	options: &CompilerOptions,
	sizing: AddressSizing,
) -> AddressCalculation {
	let mut pass = AddressPass {
		unit,
		previous,
		options,
		sizing,
		symbols: previous.clone(),
		errors: Vec::new(),
		offset: start_offset,
		layout: Vec::new(),
		overflowed: false,
	};
	pass.symbols.clear_unit_labels(unit);
	walk(content, src, &mut |element, src| pass.element(element, src));

	AddressCalculation { symbols: pass.symbols, errors: pass.errors, end_offset: pass.offset, layout: pass.layout }
}

struct AddressPass<'a> {
	unit:       usize,
	previous:   &'a SymbolTable,
	options:    &'a CompilerOptions,
	sizing:     AddressSizing,
	symbols:    SymbolTable,
	errors:     Vec<AssemblyError>,
	offset:     u32,
	layout:     Vec<u32>,
	/// Once the program leaves the address space, nothing after it has a valid address.
	overflowed: bool,
}

impl AddressPass<'_> {
	fn element(&mut self, element: &ProgramElement, src: &Arc<AssemblyCode>) {
		if self.overflowed {
			return;
		}
		let size = match element {
			ProgramElement::Label(label) => {
				let Some(key) = label.key() else { return };
				if self.symbols.get(&key).is_none_or(|symbol| symbol.unit != self.unit) {
					// Not declared by this unit; the declaration already failed.
					return;
				}
				if self.offset % 2 != 0 {
					self.errors.push(AssemblyError::OddByteOffset {
						offset:   self.offset,
						location: label.span,
						src:      src.clone(),
					});
					return;
				}
				let address = match Address::byte(i64::from(self.offset)).and_then(Address::to_word) {
					Ok(address) => address,
					Err(error) => {
						self.errors.push(AssemblyError::AddressOutOfRange {
							error,
							location: label.span,
							src: src.clone(),
						});
						return;
					},
				};
				trace!("{key} = {address:04X}");
				if let Err(error) = self.symbols.resolve_label(&key, address) {
					self.errors.push(AssemblyError::InternalError {
						cause:    match error {
							ResolutionError::AlreadyResolved => format!("label {key} was assigned twice").into(),
							ResolutionError::UnknownLabel(key) => format!("{key} is not a label").into(),
						},
						location: label.span,
						src:      src.clone(),
					});
				}
				return;
			},
			ProgramElement::Instruction(instruction) => {
				let view = SymbolView::with_fallback(&self.symbols, self.previous);
				let view = match self.sizing {
					AddressSizing::WorstCase => view.without_address_inlining(),
					AddressSizing::Final => view,
				};
				let size = match encoded_size(instruction, &view, self.options, src) {
					Ok(size) => size.unwrap_or(MAXIMUM_INSTRUCTION_BYTES),
					Err(error) => {
						self.errors.push(*error);
						MAXIMUM_INSTRUCTION_BYTES
					},
				};
				self.layout.push(size);
				u64::from(size)
			},
			ProgramElement::Directive(directive) => match &directive.value {
				DirectiveValue::Origin(value) => {
					self.origin(value, directive.span, src);
					return;
				},
				DirectiveValue::Data(values) => u64::try_from(values.len()).unwrap_or(u64::MAX).saturating_mul(2),
				DirectiveValue::Reserve(value) => {
					let bytes = self.evaluate(value, directive.span, src).and_then(|words| {
						words_to_bytes(words).map_err(|error| {
							AssemblyError::AddressOutOfRange { error, location: directive.span, src: src.clone() }.into()
						})
					});
					match bytes {
						Ok(bytes) => bytes,
						Err(error) => {
							self.errors.push(*error);
							return;
						},
					}
				},
				DirectiveValue::Equation { .. } | DirectiveValue::MacroDefinition(_) => return,
			},
			ProgramElement::IncludeSource { .. }
			| ProgramElement::MacroCall(_)
			| ProgramElement::ExpandedMacro { .. }
			| ProgramElement::Unparsed { .. } => return,
		};

		match advance_offset(self.offset, size) {
			Ok(end) => self.offset = end,
			Err(error) => {
				self.errors.push(AssemblyError::AddressOutOfRange { error, location: *element.span(), src: src.clone() });
				self.overflowed = true;
			},
		}
	}

	fn origin(&mut self, value: &AssemblyTimeValue, location: SourceSpan, src: &Arc<AssemblyCode>) {
		let origin = self.evaluate(value, location, src).and_then(|origin| {
			Address::word(origin)
				.map(Address::to_byte)
				.map_err(|error| AssemblyError::AddressOutOfRange { error, location, src: src.clone() }.into())
		});
		match origin {
			Ok(origin) if origin < self.offset => self.errors.push(AssemblyError::OriginMovesBackwards {
				origin: i64::from(origin / 2),
				current: self.offset / 2,
				location,
				src: src.clone(),
			}),
			Ok(origin) => self.offset = origin,
			Err(error) => self.errors.push(*error),
		}
	}

	fn evaluate(
		&self,
		value: &AssemblyTimeValue,
		location: SourceSpan,
		src: &Arc<AssemblyCode>,
	) -> Result<i64, Box<AssemblyError>> {
		self.symbols
			.evaluate_with_fallback(value, Some(self.previous))
			.map_err(|error| error.into_assembly_error(location, src.clone()).into())
	}
}
