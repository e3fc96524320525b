//! The standard compiler phases.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use super::{CompilationContext, CompilationUnit, CompilerPhase};
use crate::AssemblyCode;
use crate::address::{advance_offset, words_to_bytes};
use crate::assembler::{AddressSizing, calculate_addresses, generate_code};
use crate::change::Change;
use crate::error::AssemblyError;
use crate::parser::parse;
use crate::sema::directive::DirectiveValue;
use crate::sema::expansion::MacroExpander;
use crate::sema::program::{walk, walk_mut};
use crate::sema::symbol::{EvaluationError, SymbolKind};
use crate::sema::{ProgramElement, Reference, SymbolTable};
use crate::source::ResourceResolver;

/// Smallest and largest value that fits into a word, as a signed or an unsigned number.
const WORD_RANGE: std::ops::RangeInclusive<i64> = -0x8000 ..= 0xffff;

/// `parse`: lexes and parses the unit, resolves included files and declares all symbols.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParsePhase;

impl CompilerPhase for ParsePhase {
	fn name(&self) -> &'static str {
		"parse"
	}

	fn abort_on_errors(&self) -> bool {
		false
	}

	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>) {
		let parsed = parse(&unit.source, None);
		unit.lines = parsed.lines;
		unit.report_all(parsed.errors);
		let mut program = parsed.elements;

		let mut errors = Vec::new();
		resolve_includes(&mut program, &unit.source, context.resolver, &mut unit.dependencies, &mut errors);
		unit.report_all(errors);

		let errors = context.symbols.declare_program(
			&program,
			&unit.source,
			unit.index,
			context.options.local_labels_supported,
		);
		unit.report_all(errors);
		debug!("parsed {}: {} lines, {} elements", unit.source.file_name(), unit.lines, program.len());
		unit.program = Some(program);
	}
}

/// Parses all unresolved includes, recursively.
fn resolve_includes(
	elements: &mut [ProgramElement],
	src: &Arc<AssemblyCode>,
	resolver: &dyn ResourceResolver,
	dependencies: &mut Vec<std::path::PathBuf>,
	errors: &mut Vec<AssemblyError>,
) {
	for element in elements {
		match element {
			ProgramElement::IncludeSource { file, span, source, content } => {
				if let Some(included) = source {
					let included = included.clone();
					resolve_includes(content, &included, resolver, dependencies, errors);
					continue;
				}
				let code = match resolver.resolve(file, Some(src.as_ref())) {
					Ok(code) => code.included_from(src),
					Err(os_error) => {
						errors.push(AssemblyError::FileNotFound {
							os_error:  Arc::new(os_error),
							file_name: file.clone(),
							location:  *span,
							src:       src.clone(),
						});
						continue;
					},
				};
				if code.is_include_cycle() {
					errors.push(AssemblyError::IncludeCycle {
						cycle_trigger_file: file.clone(),
						include:            *span,
						src:                src.clone(),
					});
					continue;
				}
				let code = Arc::new(code);
				debug!("including {}", code.file_name());
				let parsed = parse(&code, None);
				errors.extend(parsed.errors);
				*content = parsed.elements;
				resolve_includes(content, &code, resolver, dependencies, errors);
				dependencies.push(code.name.clone());
				*source = Some(code);
			},
			ProgramElement::ExpandedMacro { body, .. } => resolve_includes(body, src, resolver, dependencies, errors),
			_ => {},
		}
	}
}

/// `expand-macros`: replaces macro calls by their expansions and declares the symbols inside them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpandMacros;

impl CompilerPhase for ExpandMacros {
	fn name(&self) -> &'static str {
		"expand-macros"
	}

	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>) {
		let Some(program) = &mut unit.program else { return };
		let mut expander = MacroExpander::new(&context.symbols, context.options.maximum_macro_expansion_depth);
		let (change, mut errors) = expander.expand_program(program, &unit.source);
		if !change.is_modified() {
			return;
		}
		// Expanded bodies may include files.
		resolve_includes(program, &unit.source, context.resolver, &mut unit.dependencies, &mut errors);
		declare_expansions(program, &unit.source, unit.index, context, &mut errors);
		unit.report_all(errors);
	}
}

/// Declares the symbols of all outermost expansions; nested expansions are part of their body.
fn declare_expansions(
	elements: &[ProgramElement],
	src: &Arc<AssemblyCode>,
	unit: usize,
	context: &mut CompilationContext<'_>,
	errors: &mut Vec<AssemblyError>,
) {
	for element in elements {
		match element {
			ProgramElement::ExpandedMacro { body, .. } => errors.extend(context.symbols.declare_program(
				body,
				src,
				unit,
				context.options.local_labels_supported,
			)),
			ProgramElement::IncludeSource { source: Some(included), content, .. } =>
				declare_expansions(content, included, unit, context, errors),
			_ => {},
		}
	}
}

/// `validate-symbols`: checks that every symbol reference names a value and that no equation depends on itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateSymbols;

impl CompilerPhase for ValidateSymbols {
	fn name(&self) -> &'static str {
		"validate-symbols"
	}

	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>) {
		let Some(program) = &unit.program else { return };
		let symbols = &context.symbols;
		let mut errors = Vec::new();
		let mut reported_cycles = HashSet::new();
		walk(program, &unit.source, &mut |element, src| {
			for reference in element.values().into_iter().flat_map(|value| value.references()) {
				let error = match reference.key().map(|key| (symbols.get(&key), key)) {
					None | Some((None, _)) => Some(EvaluationError::Unknown(reference.clone())),
					Some((Some(symbol), key)) => match &symbol.kind {
						SymbolKind::Macro(_) => Some(EvaluationError::NotAValue(key)),
						SymbolKind::Label { .. } => None,
						SymbolKind::Equation { .. } => symbols.find_cycle(&key).and_then(|cycle| {
							let mut members = cycle.clone();
							members.sort_by_key(ToString::to_string);
							members.dedup();
							reported_cycles.insert(members).then_some(EvaluationError::Cyclic(cycle))
						}),
					},
				};
				if let Some(error) = error {
					errors.push(error.into_assembly_error(reference.span, src.clone()));
				}
			}
		});
		unit.report_all(errors);
	}
}

/// `calculate-addresses` and `calculate-addresses-final`: assigns addresses to the labels of the unit.
#[derive(Debug, Clone, Copy)]
pub struct CalculateAddresses {
	is_final: bool,
}

impl CalculateAddresses {
	/// The first pass, before expressions are folded. Operands that depend on label addresses are sized at full width,
	/// so every address it assigns is an upper bound of the final one.
	#[must_use]
	pub const fn initial() -> Self {
		Self { is_final: false }
	}

	/// The authoritative pass, after expressions are folded.
	#[must_use]
	pub const fn final_pass() -> Self {
		Self { is_final: true }
	}
}

impl CompilerPhase for CalculateAddresses {
	fn name(&self) -> &'static str {
		if self.is_final { "calculate-addresses-final" } else { "calculate-addresses" }
	}

	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>) {
		let Some(program) = &unit.program else { return };
		let result = calculate_addresses(
			unit.index,
			unit.start_offset,
			program,
			&unit.source,
			&context.symbols,
			&context.options,
			if self.is_final { AddressSizing::Final } else { AddressSizing::WorstCase },
		);
		context.symbols = result.symbols;
		unit.end_offset = result.end_offset;
		unit.layout = result.layout;
		debug!(
			"{}: {} ends at word {:04X}",
			self.name(),
			unit.source.file_name(),
			result.end_offset / 2
		);
		unit.report_all(result.errors);
	}

	fn after_all_units(&self, _units: &mut [CompilationUnit], context: &mut CompilationContext<'_>) {
		if context.options.debug_mode {
			info!("symbols after {}:\n{}", self.name(), context.symbols.dump());
		}
	}
}

/// `fold-expressions`: replaces constant subexpressions by their values until nothing changes anymore. Values that
/// depend on label addresses are kept, since the addresses may still move.
#[derive(Debug, Clone, Copy, Default)]
pub struct FoldExpressions;

impl CompilerPhase for FoldExpressions {
	fn name(&self) -> &'static str {
		"fold-expressions"
	}

	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>) {
		let Some(program) = &mut unit.program else { return };
		let symbols = &context.symbols;
		let resolver = |reference: &Reference| symbols.constant_value(reference);
		let mut iterations = 0;
		loop {
			let mut change = Change::Unmodified;
			walk_mut(program, &unit.source, &mut |element, _| {
				change |= element.values_mut().into_iter().map(|value| value.fold(&resolver)).collect::<Change>();
			});
			iterations += 1;
			if !change.is_modified() {
				break;
			}
		}
		debug!("folded {} in {iterations} iterations", unit.source.file_name());
	}
}

/// `validate-value-ranges`: checks that every operand and data value fits into a word.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateValueRanges;

impl CompilerPhase for ValidateValueRanges {
	fn name(&self) -> &'static str {
		"validate-value-ranges"
	}

	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>) {
		let Some(program) = &unit.program else { return };
		let symbols: &SymbolTable = &context.symbols;
		let relaxed = context.options.relaxed_validation;
		let mut errors = Vec::new();
		walk(program, &unit.source, &mut |element, src| {
			if let ProgramElement::Directive(directive) = element
				&& let DirectiveValue::Reserve(size) = &directive.value
				&& let Ok(words) = symbols.evaluate(size)
				&& let Err(error) = words_to_bytes(words).and_then(|bytes| advance_offset(0, bytes))
			{
				errors.push(AssemblyError::AddressOutOfRange { error, location: directive.span, src: src.clone() });
			}
			let values = match element {
				ProgramElement::Instruction(instruction) =>
					instruction.operands.iter().filter_map(|operand| operand.mode.value()).collect(),
				ProgramElement::Directive(directive)
					if matches!(directive.value, DirectiveValue::Data(_)) =>
					directive.value.values(),
				_ => Vec::new(),
			};
			for value in values {
				// Unknown values were already reported.
				let Ok(number) = symbols.evaluate(value) else { continue };
				if WORD_RANGE.contains(&number) {
					continue;
				}
				let location = value.first_reference_span().unwrap_or(*element.span());
				errors.push(if relaxed {
					#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
					let truncated = number as u16;
					AssemblyError::ValueTruncated { value: number, truncated, location, src: src.clone() }
				} else {
					AssemblyError::ValueOutOfRange { value: number, location, src: src.clone() }
				});
			}
		});
		unit.report_all(errors);
	}
}

/// `generate-code`: encodes the program and writes it out. Once all units are done, the output of every unit with
/// errors is deleted and all writers are closed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateCode;

impl CompilerPhase for GenerateCode {
	fn name(&self) -> &'static str {
		"generate-code"
	}

	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>) {
		let Some(program) = &unit.program else { return };
		let mut writer = match context.writers.create_writer(unit.index, &unit.source.name, unit.start_offset) {
			Ok(writer) => writer,
			Err(error) => {
				unit.report(AssemblyError::OutputFailed { error, src: unit.source.clone() });
				return;
			},
		};
		let errors = generate_code(
			unit.index,
			program,
			&unit.source,
			&context.symbols,
			&context.options,
			&unit.layout,
			writer.as_mut(),
			&context.occupied,
		);
		debug!(
			"generated {} bytes for {}",
			writer.current_write_offset() - writer.first_write_offset().unwrap_or(writer.current_write_offset()),
			unit.source.file_name()
		);
		unit.writer = Some(writer);
		unit.report_all(errors);
	}

	fn after_all_units(&self, units: &mut [CompilationUnit], _context: &mut CompilationContext<'_>) {
		for unit in units {
			let has_errors = unit.has_errors();
			let Some(writer) = &mut unit.writer else { continue };
			let mut result = Ok(());
			if has_errors {
				debug!("{} has errors, deleting its output", unit.source.file_name());
				result = writer.delete_output();
			}
			let result = result.and_then(|()| writer.close());
			if let Err(error) = result {
				let src = unit.source.clone();
				unit.report(AssemblyError::OutputFailed { error, src });
			}
		}
	}
}
