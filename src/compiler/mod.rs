//! The compilation pipeline.
//!
//! Compilation runs an ordered list of named [`CompilerPhase`]s over all [`CompilationUnit`]s breadth-first: every unit
//! passes through a phase before any unit enters the next one. Units share one [`SymbolTable`], so this ordering is
//! what makes symbols of one unit visible to the others at the right time.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use flexstr::SharedStr;
use log::debug;
use thiserror::Error;

use crate::AssemblyCode;
use crate::address::AddressRangeIndex;
use crate::assembler::writer::{ObjectCodeWriter, WriterFactory};
use crate::cli::CompilerOptions;
use crate::error::{AssemblyError, Marker};
use crate::sema::{ProgramElement, SymbolTable};
use crate::source::ResourceResolver;

mod phases;

pub use phases::{
	CalculateAddresses, ExpandMacros, FoldExpressions, GenerateCode, ParsePhase, ValidateSymbols, ValidateValueRanges,
};

/// One source file and everything derived from it.
#[derive(Debug)]
pub struct CompilationUnit {
	/// Position of this unit in the batch.
	pub index:        usize,
	/// The source code.
	pub source:       Arc<AssemblyCode>,
	/// The program, once parsed.
	pub program:      Option<Vec<ProgramElement>>,
	/// Files included by this unit, directly or indirectly.
	pub dependencies: Vec<PathBuf>,
	/// Errors and warnings, in the order they were found.
	pub markers:      Vec<Marker>,
	/// Number of parsed source lines.
	pub lines:        usize,
	/// Byte offset where the unit's object code starts.
	pub start_offset: u32,
	/// Byte offset after the unit's last element, as of the most recent address calculation.
	pub end_offset:   u32,
	/// Instruction sizes in bytes, in program order, as of the most recent address calculation.
	pub layout:       Vec<u32>,
	/// The unit's output, once code generation started.
	pub writer:       Option<Box<dyn ObjectCodeWriter>>,
}

impl CompilationUnit {
	/// Creates an unparsed unit that starts at offset 0.
	#[must_use]
	pub fn new(index: usize, source: Arc<AssemblyCode>) -> Self {
		Self {
			index,
			source,
			program: None,
			dependencies: Vec::new(),
			markers: Vec::new(),
			lines: 0,
			start_offset: 0,
			end_offset: 0,
			layout: Vec::new(),
			writer: None,
		}
	}

	/// Sets the byte offset where the unit's object code starts.
	#[must_use]
	pub const fn with_start_offset(mut self, start_offset: u32) -> Self {
		self.start_offset = start_offset;
		self.end_offset = start_offset;
		self
	}

	/// Whether any marker is an error.
	#[must_use]
	pub fn has_errors(&self) -> bool {
		self.markers.iter().any(Marker::is_error)
	}

	/// Attaches a diagnostic.
	pub fn report(&mut self, error: AssemblyError) {
		if error.is_internal() {
			log::warn!("internal error in {}: {error}", self.source.file_name());
		}
		self.markers.push(Marker::new(error));
	}

	/// Attaches several diagnostics.
	pub fn report_all(&mut self, errors: impl IntoIterator<Item = AssemblyError>) {
		for error in errors {
			self.report(error);
		}
	}

	/// All error markers.
	pub fn errors(&self) -> impl Iterator<Item = &Marker> {
		self.markers.iter().filter(|marker| marker.is_error())
	}

	/// All markers that are not errors.
	pub fn warnings(&self) -> impl Iterator<Item = &Marker> {
		self.markers.iter().filter(|marker| !marker.is_error())
	}
}

/// Everything the phases share.
pub struct CompilationContext<'a> {
	/// Symbols of all units.
	pub symbols:  SymbolTable,
	/// Compiler options.
	pub options:  CompilerOptions,
	/// Resolves included files.
	pub resolver: &'a dyn ResourceResolver,
	/// Creates the output of each unit.
	pub writers:  &'a mut dyn WriterFactory,
	/// Memory written by any unit so far.
	pub occupied: AddressRangeIndex,
}

impl<'a> CompilationContext<'a> {
	/// Creates a context with an empty symbol table.
	pub fn new(options: CompilerOptions, resolver: &'a dyn ResourceResolver, writers: &'a mut dyn WriterFactory) -> Self {
		Self { symbols: SymbolTable::new(), options, resolver, writers, occupied: AddressRangeIndex::new() }
	}
}

impl Debug for CompilationContext<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CompilationContext")
			.field("symbols", &self.symbols.len())
			.field("options", &self.options)
			.field("writers", &self.writers)
			.field("occupied", &self.occupied)
			.finish_non_exhaustive()
	}
}

/// One step of the compilation pipeline.
pub trait CompilerPhase: Debug {
	/// Unique name of the phase.
	fn name(&self) -> &'static str;

	/// Whether units with errors skip this phase.
	fn abort_on_errors(&self) -> bool {
		true
	}

	/// Runs the phase on one unit. Problems are reported as markers on the unit.
	fn execute(&self, unit: &mut CompilationUnit, context: &mut CompilationContext<'_>);

	/// Runs once after all units went through [`Self::execute`].
	fn after_all_units(&self, _units: &mut [CompilationUnit], _context: &mut CompilationContext<'_>) {}
}

/// Errors while editing a [`PhaseList`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
	/// No phase has the given name.
	#[error("There is no compiler phase named '{0}'")]
	UnknownPhase(SharedStr),
	/// The phase name is taken.
	#[error("A compiler phase named '{0}' already exists")]
	DuplicatePhase(SharedStr),
}

/// An ordered list of uniquely named phases.
#[derive(Debug, Default)]
pub struct PhaseList {
	phases:     Vec<Box<dyn CompilerPhase>>,
	stop_after: Option<&'static str>,
}

impl PhaseList {
	/// A list without phases.
	#[must_use]
	pub fn empty() -> Self {
		Self::default()
	}

	/// The standard pipeline: parse, expand-macros, validate-symbols, calculate-addresses, fold-expressions,
	/// calculate-addresses-final, validate-value-ranges and generate-code.
	#[must_use]
	pub fn standard() -> Self {
		Self {
			phases:     vec![
				Box::new(ParsePhase),
				Box::new(ExpandMacros),
				Box::new(ValidateSymbols),
				Box::new(CalculateAddresses::initial()),
				Box::new(FoldExpressions),
				Box::new(CalculateAddresses::final_pass()),
				Box::new(ValidateValueRanges),
				Box::new(GenerateCode),
			],
			stop_after: None,
		}
	}

	/// Phase names in execution order.
	#[must_use]
	pub fn names(&self) -> Vec<&'static str> {
		self.phases.iter().map(|phase| phase.name()).collect()
	}

	fn position(&self, name: &str) -> Result<usize, PipelineError> {
		self.phases.iter().position(|phase| phase.name() == name).ok_or_else(|| PipelineError::UnknownPhase(name.into()))
	}

	fn check_unique(&self, phase: &dyn CompilerPhase) -> Result<(), PipelineError> {
		if self.phases.iter().any(|existing| existing.name() == phase.name()) {
			Err(PipelineError::DuplicatePhase(phase.name().into()))
		} else {
			Ok(())
		}
	}

	/// Appends a phase.
	///
	/// # Errors
	/// If the name is taken.
	pub fn push(&mut self, phase: Box<dyn CompilerPhase>) -> Result<(), PipelineError> {
		self.check_unique(phase.as_ref())?;
		self.phases.push(phase);
		Ok(())
	}

	/// Inserts a phase before the named phase.
	///
	/// # Errors
	/// If the named phase doesn't exist, or the new phase's name is taken.
	pub fn insert_before(&mut self, name: &str, phase: Box<dyn CompilerPhase>) -> Result<(), PipelineError> {
		let position = self.position(name)?;
		self.check_unique(phase.as_ref())?;
		self.phases.insert(position, phase);
		Ok(())
	}

	/// Inserts a phase after the named phase.
	///
	/// # Errors
	/// If the named phase doesn't exist, or the new phase's name is taken.
	pub fn insert_after(&mut self, name: &str, phase: Box<dyn CompilerPhase>) -> Result<(), PipelineError> {
		let position = self.position(name)?;
		self.check_unique(phase.as_ref())?;
		self.phases.insert(position + 1, phase);
		Ok(())
	}

	/// Removes the named phase and returns it.
	///
	/// # Errors
	/// If the named phase doesn't exist.
	pub fn remove(&mut self, name: &str) -> Result<Box<dyn CompilerPhase>, PipelineError> {
		let position = self.position(name)?;
		if self.stop_after == Some(self.phases[position].name()) {
			self.stop_after = None;
		}
		Ok(self.phases.remove(position))
	}

	/// Replaces the named phase and returns the old one. The replacement may have a different name.
	///
	/// # Errors
	/// If the named phase doesn't exist, or the replacement's name is taken by another phase.
	pub fn replace(&mut self, name: &str, phase: Box<dyn CompilerPhase>) -> Result<Box<dyn CompilerPhase>, PipelineError> {
		let position = self.position(name)?;
		if phase.name() != name {
			self.check_unique(phase.as_ref())?;
		}
		Ok(std::mem::replace(&mut self.phases[position], phase))
	}

	/// Stops compilation after the named phase.
	///
	/// # Errors
	/// If the named phase doesn't exist.
	pub fn stop_after(&mut self, name: &str) -> Result<(), PipelineError> {
		let position = self.position(name)?;
		self.stop_after = Some(self.phases[position].name());
		Ok(())
	}

	/// Runs all phases over all units.
	pub fn run(&self, units: &mut [CompilationUnit], context: &mut CompilationContext<'_>) {
		for phase in &self.phases {
			debug!("running phase {}", phase.name());
			for unit in units.iter_mut() {
				if phase.abort_on_errors() && unit.has_errors() {
					debug!("skipping {} for {}, which has errors", phase.name(), unit.source.file_name());
					continue;
				}
				phase.execute(unit, context);
			}
			phase.after_all_units(units, context);
			if self.stop_after == Some(phase.name()) {
				debug!("stopping after {}", phase.name());
				break;
			}
		}
	}
}

/// Result of [`compile`].
#[derive(Debug)]
pub struct CompilationResult {
	/// All units, with their markers.
	pub units:   Vec<CompilationUnit>,
	/// The final symbol table.
	pub symbols: SymbolTable,
}

impl CompilationResult {
	/// Whether any unit has an error.
	#[must_use]
	pub fn has_errors(&self) -> bool {
		self.units.iter().any(CompilationUnit::has_errors)
	}
}

/// Compiles a batch of sources with the standard pipeline. Each source becomes one unit; units start at offset 0.
#[must_use]
pub fn compile(
	sources: impl IntoIterator<Item = Arc<AssemblyCode>>,
	options: CompilerOptions,
	resolver: &dyn ResourceResolver,
	writers: &mut dyn WriterFactory,
) -> CompilationResult {
	compile_with(sources, &PhaseList::standard(), options, resolver, writers)
}

/// Compiles a batch of sources with the given phases.
#[must_use]
pub fn compile_with(
	sources: impl IntoIterator<Item = Arc<AssemblyCode>>,
	phases: &PhaseList,
	options: CompilerOptions,
	resolver: &dyn ResourceResolver,
	writers: &mut dyn WriterFactory,
) -> CompilationResult {
	let mut units = sources
		.into_iter()
		.enumerate()
		.map(|(index, source)| CompilationUnit::new(index, source))
		.collect::<Vec<_>>();
	let mut context = CompilationContext::new(options, resolver, writers);
	phases.run(&mut units, &mut context);
	CompilationResult { units, symbols: context.symbols }
}
