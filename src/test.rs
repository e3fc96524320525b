//! Pipeline tests.

use std::sync::Arc;

use crate::assembler::writer::MemoryWriterFactory;
use crate::assembler::{Encoded, encode};
use crate::compiler::{CompilationContext, CompilationUnit, CompilerPhase, GenerateCode, PhaseList, compile_with};
use crate::sema::program::walk;
use crate::sema::{ProgramElement, SymbolKey, SymbolView};
use crate::{AssemblyCode, AssemblyError, CompilationResult, CompilerOptions, MemoryResolver, compile};

struct Compiled {
	result:  CompilationResult,
	outputs: MemoryWriterFactory,
}

impl Compiled {
	fn output(&self, unit: usize) -> Option<Vec<u16>> {
		self.outputs
			.output(unit)
			.map(|bytes| bytes.chunks(2).map(|word| u16::from_be_bytes([word[0], word[1]])).collect())
	}

	fn label(&self, name: &str) -> Option<u16> {
		self.result.symbols.label_address(&SymbolKey::global(name))
	}

	fn errors(&self, unit: usize) -> Vec<&AssemblyError> {
		self.result.units[unit].errors().map(|marker| &marker.error).collect()
	}

	fn warnings(&self, unit: usize) -> Vec<&AssemblyError> {
		self.result.units[unit].warnings().map(|marker| &marker.error).collect()
	}

	fn assert_success(&self) {
		for unit in &self.result.units {
			assert!(!unit.has_errors(), "{}: {:?}", unit.source.file_name(), unit.markers);
		}
	}

	/// Checks every instruction against its `;=` comment.
	fn assert_expected_values(&self, options: &CompilerOptions) {
		let mut checked = 0;
		for unit in &self.result.units {
			let program = unit.program.as_ref().expect("unit was not parsed");
			walk(program, &unit.source, &mut |element, src| {
				if let ProgramElement::Instruction(instruction) = element
					&& let Some(expected) = &instruction.expected_value
				{
					let encoded = encode(instruction, &SymbolView::new(&self.result.symbols), options, src).unwrap();
					let (line, _) = src.line_and_column(instruction.span.offset());
					assert_eq!(encoded, Encoded::Words(expected.clone()), "`{instruction}` in line {line}");
					checked += 1;
				}
			});
		}
		assert!(checked > 0, "no test comments found");
	}
}

fn compile_files(files: &[(&str, &str)], resolver: &MemoryResolver, options: CompilerOptions) -> Compiled {
	compile_files_with(files, resolver, options, &PhaseList::standard())
}

fn compile_files_with(
	files: &[(&str, &str)],
	resolver: &MemoryResolver,
	options: CompilerOptions,
	phases: &PhaseList,
) -> Compiled {
	let mut outputs = MemoryWriterFactory::new();
	let sources = files.iter().map(|(name, text)| Arc::new(AssemblyCode::new(text, name)));
	let result = compile_with(sources, phases, options, resolver, &mut outputs);
	Compiled { result, outputs }
}

fn compile_source(text: &str) -> Compiled {
	compile_files(&[("test.dasm", text)], &MemoryResolver::new(), CompilerOptions::default())
}

#[test]
fn all_opcodes() {
	let compiled = compile_source(include_str!("../tests/opcodes.dasm"));
	compiled.assert_success();
	compiled.assert_expected_values(&CompilerOptions::default());
	assert_eq!(compiled.output(0).map(|words| words.len()), Some(54));
}

#[test]
fn program() {
	let compiled = compile_source(include_str!("../tests/program.dasm"));
	compiled.assert_success();
	compiled.assert_expected_values(&CompilerOptions::default());
	assert_eq!(compiled.label("init"), Some(5));
	assert_eq!(compiled.label("data"), Some(10));
	assert_eq!(compiled.label("end"), Some(16));
	assert_eq!(compiled.result.symbols.label_address(&SymbolKey::local("start", "hang")), Some(4));
	let output = compiled.output(0).unwrap();
	assert_eq!(output.len(), 16);
	assert_eq!(output[3], 0x8401);
	assert_eq!(output[10 ..], [0x6f, 0x6b, 0, 10, 13, 6]);
}

#[test]
fn labels_follow_instruction_sizes() {
	let compiled = compile_source("first:\nSET A, 0x1234\nsecond:\nSET [B+1], [0x100]\nthird:\nSET C, 5\nfourth:");
	compiled.assert_success();
	assert_eq!(compiled.label("second").unwrap() - compiled.label("first").unwrap(), 2);
	assert_eq!(compiled.label("third").unwrap() - compiled.label("second").unwrap(), 3);
	assert_eq!(compiled.label("fourth").unwrap() - compiled.label("third").unwrap(), 1);

	let compiled = compile_source(&format!("{}after:", "SET A, 1\n".repeat(31)));
	compiled.assert_success();
	assert_eq!(compiled.label("after"), Some(31));
	assert_eq!(compiled.output(0).unwrap(), vec![0x8801; 31]);
}

#[test]
fn forward_references() {
	let options = CompilerOptions { disable_literal_inlining: true, ..Default::default() };
	let resolver = MemoryResolver::new();
	let forward = compile_files(
		&[("forward.dasm", "JSR sub\nSET PC, end\nsub: SET A, 1\nSET PC, POP\nend: .dat end")],
		&resolver,
		options,
	);
	let literal = compile_files(
		&[("literal.dasm", "JSR 4\nSET PC, 7\nSET A, 1\nSET PC, POP\n.dat 7")],
		&resolver,
		options,
	);
	forward.assert_success();
	literal.assert_success();
	assert_eq!(forward.output(0), literal.output(0));
}

#[test]
fn label_values_are_inlined() {
	let compiled = compile_source("start: SET PC, start");
	compiled.assert_success();
	assert_eq!(compiled.output(0), Some(vec![0x8381]));

	let compiled = compile_source("JSR sub\nSET PC, POP\nsub: SET A, 1\nSET PC, POP");
	compiled.assert_success();
	assert_eq!(compiled.label("sub"), Some(2));
	assert_eq!(compiled.output(0), Some(vec![0x8c20, 0x6381, 0x8801, 0x6381]));

	let compiled = compile_source("SET A, high\n.reserve 40\nhigh:");
	compiled.assert_success();
	assert_eq!(compiled.output(0).unwrap()[.. 2], [0x7c01, 0x002a]);
}

#[test]
fn forward_labels_keep_their_first_size() {
	// The first pass places `far` above 30, so the jump to it keeps its trailing word.
	let compiled = compile_source("start: SET PC, start\nJSR far\n.reserve 27\nfar:");
	compiled.assert_success();
	assert_eq!(compiled.label("far"), Some(30));
	let output = compiled.output(0).unwrap();
	assert_eq!(output.len(), 30);
	assert_eq!(output[.. 3], [0x8381, 0x7c20, 0x001e]);
}

#[test]
fn units_share_symbols() {
	let compiled = compile_files(
		&[("main.dasm", "JSR library_routine\nmain_data: .dat 1"), ("library.dasm", "library_routine: SET A, main_data")],
		&MemoryResolver::new(),
		CompilerOptions::default(),
	);
	compiled.assert_success();
	assert_eq!(compiled.output(0), Some(vec![0x8420, 0x0001]));
	assert_eq!(compiled.output(1), Some(vec![0x8801]));
	// Both units start at address 0.
	assert!(compiled.warnings(1).iter().any(|warning| matches!(warning, AssemblyError::OverlappingOutput { .. })));
}

#[test]
fn equation_cycles() {
	for source in [
		"alpha .equ beta\nbeta .equ gamma\ngamma .equ alpha\nSET A, alpha",
		"alpha .equ beta\nbeta .equ alpha",
	] {
		let compiled = compile_source(source);
		let errors = compiled.errors(0);
		assert!(
			errors.iter().any(|error| matches!(error, AssemblyError::CyclicEquation { .. })),
			"{source}: {errors:?}"
		);
		assert_eq!(compiled.output(0), None);
	}
}

#[test]
fn symbol_errors() {
	let compiled = compile_source("SET A, missing");
	assert!(matches!(compiled.errors(0)[..], [AssemblyError::UnknownSymbol { .. }]));

	let compiled = compile_source(".loop: SET PC, .loop");
	assert!(compiled.errors(0).iter().any(|error| matches!(error, AssemblyError::MissingGlobalLabel { .. })));

	let compiled = compile_source("twice: SET A, 1\ntwice: SET A, 2");
	assert!(matches!(compiled.errors(0)[..], [AssemblyError::RedefinedSymbol { .. }]));

	let compiled = compile_files(
		&[("test.dasm", "main:\n.loop: SET PC, .loop")],
		&MemoryResolver::new(),
		CompilerOptions { local_labels_supported: false, ..Default::default() },
	);
	assert!(compiled.errors(0).iter().any(|error| matches!(error, AssemblyError::LocalLabelsDisabled { .. })));
}

#[test]
fn syntax_errors_are_local() {
	let compiled = compile_source("SET A, 1\nSET A, (\nlabel: SET B, label\nSET C, label\n");
	let errors = compiled.errors(0);
	assert_eq!(errors.len(), 1, "{errors:?}");
	assert_eq!(compiled.result.units[0].lines, 4);
	// The unit is still analyzed, but not assembled.
	assert!(compiled.result.symbols.get(&SymbolKey::global("label")).is_some());
	assert_eq!(compiled.output(0), None);
}

#[test]
fn data_and_origin() {
	let compiled = compile_source("SET A, 1\n.org 4\nSET B, 1\n.dat \"hi\", 0\n.reserve 2\n.word 0xffff");
	compiled.assert_success();
	assert_eq!(compiled.output(0), Some(vec![0x8801, 0, 0, 0, 0x8821, 0x68, 0x69, 0, 0, 0, 0xffff]));

	let compiled = compile_source(".org 4\nSET A, 1\n.org 2\nSET B, 1");
	assert!(compiled.errors(0).iter().any(|error| matches!(error, AssemblyError::OriginMovesBackwards { .. })));
}

#[test]
fn literal_at_end_of_file() {
	for source in ["SET A, 1\n.dat \"", "SET A, '"] {
		let compiled = compile_source(source);
		let errors = compiled.errors(0);
		assert!(
			errors.iter().any(|error| matches!(error, AssemblyError::UnterminatedString { .. })),
			"{source}: {errors:?}"
		);
		assert_eq!(compiled.output(0), None);
	}
}

#[test]
fn address_space_limits() {
	for source in [".reserve 0x80000000", "SET A, 1\n.reserve 0x10000", ".reserve -1", ".org 0xffff\n.dat 1, 2"] {
		let compiled = compile_source(source);
		let errors = compiled.errors(0);
		assert!(
			errors.iter().any(|error| matches!(error, AssemblyError::AddressOutOfRange { .. })),
			"{source}: {errors:?}"
		);
		assert_eq!(compiled.output(0), None, "{source}");
	}

	// Programs may fill the address space exactly.
	let compiled = compile_source("SET A, 1\n.reserve 0xffff");
	compiled.assert_success();
	assert_eq!(compiled.output(0).map(|words| words.len()), Some(0x10000));
	let compiled = compile_source(".org 0xffff\n.dat 1");
	compiled.assert_success();
	assert_eq!(compiled.output(0).map(|words| words[0xffff]), Some(1));
}

#[test]
fn start_offset() {
	let mut outputs = MemoryWriterFactory::new();
	let resolver = MemoryResolver::new();
	let mut units = vec![
		CompilationUnit::new(0, Arc::new(AssemblyCode::new("here: SET PC, here", "test.dasm"))).with_start_offset(0x20),
	];
	let mut context = CompilationContext::new(CompilerOptions::default(), &resolver, &mut outputs);
	PhaseList::standard().run(&mut units, &mut context);
	assert!(!units[0].has_errors());
	assert_eq!(context.symbols.label_address(&SymbolKey::global("here")), Some(0x10));
	assert_eq!(units[0].end_offset, 0x22);
	assert_eq!(outputs.output(0), Some(vec![0xc7, 0x81]));
}

#[test]
fn value_ranges() {
	let compiled = compile_source("SET A, 0x12345");
	assert!(matches!(compiled.errors(0)[..], [AssemblyError::ValueOutOfRange { value: 0x12345, .. }]));
	assert_eq!(compiled.output(0), None);

	let compiled = compile_files(
		&[("test.dasm", "SET A, 0x12345\n.dat -0x8000, 0xffff")],
		&MemoryResolver::new(),
		CompilerOptions { relaxed_validation: true, ..Default::default() },
	);
	compiled.assert_success();
	assert!(matches!(compiled.warnings(0)[..], [AssemblyError::ValueTruncated { truncated: 0x2345, .. }]));
	assert_eq!(compiled.output(0), Some(vec![0x7c01, 0x2345, 0x8000, 0xffff]));
}

#[test]
fn macros() {
	let compiled = compile_source(
		".macro wait(count)\nSET A, count\n.loop: SUB A, 1\nIFN A, 0\nSET PC, .loop\n.endmacro\nstart:\nwait(3)\nwait(4)",
	);
	compiled.assert_success();
	let output = compiled.output(0).unwrap();
	assert_eq!(output.len(), 8);
	// Each expansion jumps to its own loop.
	assert_eq!(output[0], 0x9001);
	assert_eq!(output[3], 0x8b81);
	assert_eq!(output[4], 0x9401);
	assert_eq!(output[7], 0x9b81);
}

#[test]
fn macro_errors() {
	let compiled = compile_source(".macro one(x)\nSET A, x\n.endmacro\none(1, 2)");
	assert!(matches!(
		compiled.errors(0)[..],
		[AssemblyError::IncorrectNumberOfMacroArguments { expected_number: 1, actual_number: 2, .. }]
	));

	let compiled = compile_source(".macro forever\nforever\n.endmacro\nforever");
	assert!(matches!(compiled.errors(0)[..], [AssemblyError::MacroExpansionFailed { .. }]));

	let compiled = compile_source(".macro broken\nSET 5, A\n.endmacro\nbroken");
	assert!(matches!(compiled.errors(0)[..], [AssemblyError::IllegalAddressingMode { .. }]));

	let compiled = compile_source(".macro broken\nSET A, (\n.endmacro\nbroken");
	let errors = compiled.errors(0);
	let [AssemblyError::MacroExpansionFailed { name, errors: inner, .. }] = &errors[..] else {
		panic!("{errors:?}");
	};
	assert_eq!(name.as_str(), "broken");
	assert_eq!(inner.len(), 1);

	let compiled = compile_source("undefined_macro(1)");
	assert!(matches!(compiled.errors(0)[..], [AssemblyError::UnknownMacro { .. }]));
}

#[test]
fn includes() {
	let resolver = MemoryResolver::new().with_file("lib/routines.dasm", "routine: SET A, 1\nSET PC, POP");
	let compiled = compile_files(
		&[("lib/main.dasm", ".include \"routines.dasm\"\nstart: JSR routine")],
		&resolver,
		CompilerOptions::default(),
	);
	compiled.assert_success();
	assert_eq!(compiled.result.units[0].dependencies.len(), 1);
	assert_eq!(compiled.output(0), Some(vec![0x8801, 0x6381, 0x8420]));

	let resolver = MemoryResolver::new().with_file("a.dasm", ".include \"b.dasm\"").with_file("b.dasm", ".include \"a.dasm\"");
	let compiled = compile_files(&[("a.dasm", ".include \"b.dasm\"")], &resolver, CompilerOptions::default());
	assert!(compiled.errors(0).iter().any(|error| matches!(error, AssemblyError::IncludeCycle { .. })));

	let compiled = compile_source(".include \"nowhere.dasm\"");
	assert!(matches!(compiled.errors(0)[..], [AssemblyError::FileNotFound { .. }]));
}

#[test]
fn stop_after() {
	let mut phases = PhaseList::standard();
	phases.stop_after("calculate-addresses").unwrap();
	let compiled =
		compile_files_with(&[("test.dasm", "SET A, 1\nend:")], &MemoryResolver::new(), CompilerOptions::default(), &phases);
	compiled.assert_success();
	assert_eq!(compiled.label("end"), Some(1));
	assert!(compiled.result.units[0].writer.is_none());
	assert_eq!(compiled.output(0), None);
}

#[test]
fn phase_list_editing() {
	#[derive(Debug)]
	struct Nothing;
	impl CompilerPhase for Nothing {
		fn name(&self) -> &'static str {
			"nothing"
		}

		fn execute(&self, _unit: &mut CompilationUnit, _context: &mut CompilationContext<'_>) {}
	}

	let mut phases = PhaseList::standard();
	assert_eq!(phases.names().len(), 8);
	phases.insert_after("parse", Box::new(Nothing)).unwrap();
	assert_eq!(phases.names()[1], "nothing");
	assert!(phases.insert_before("generate-code", Box::new(Nothing)).is_err());
	assert_eq!(phases.remove("nothing").unwrap().name(), "nothing");
	assert!(phases.remove("nothing").is_err());
	phases.remove("fold-expressions").unwrap();
	assert!(phases.stop_after("fold-expressions").is_err());
	let old = phases.replace("generate-code", Box::new(Nothing)).unwrap();
	assert_eq!(old.name(), "generate-code");
	assert_eq!(phases.names().last(), Some(&"nothing"));

	let compiled =
		compile_files_with(&[("test.dasm", "SET A, 1")], &MemoryResolver::new(), CompilerOptions::default(), &phases);
	compiled.assert_success();
	assert_eq!(compiled.output(0), None);
}

#[test]
fn failing_units_lose_their_output() {
	let mut outputs = MemoryWriterFactory::new();
	let resolver = MemoryResolver::new();
	let mut units = ["SET A, 1", "SET B, 2"]
		.into_iter()
		.enumerate()
		.map(|(index, text)| CompilationUnit::new(index, Arc::new(AssemblyCode::new(text, "test.dasm"))))
		.collect::<Vec<_>>();
	let mut context = CompilationContext::new(CompilerOptions::default(), &resolver, &mut outputs);
	let mut phases = PhaseList::standard();
	phases.stop_after("validate-value-ranges").unwrap();
	phases.run(&mut units, &mut context);

	for unit in &mut units {
		GenerateCode.execute(unit, &mut context);
	}
	let src = units[1].source.clone();
	units[1].report(AssemblyError::InternalError { cause: "test".into(), location: (0, 1).into(), src });
	GenerateCode.after_all_units(&mut units, &mut context);

	assert_eq!(outputs.output(0), Some(vec![0x88, 0x01]));
	assert_eq!(outputs.output(1), None);
}

#[test]
fn compile_entry_point() {
	let mut outputs = MemoryWriterFactory::new();
	let result = compile(
		[Arc::new(AssemblyCode::new("SET A, 1", "test.dasm"))],
		CompilerOptions::default(),
		&MemoryResolver::new(),
		&mut outputs,
	);
	assert!(!result.has_errors());
	assert_eq!(outputs.output(0), Some(vec![0x88, 0x01]));
}

#[test]
fn hex_dump() {
	assert_eq!(crate::pretty_hex(&[0x88, 0x01], 0x10), "0010: 88 01\n");
	assert_eq!(crate::pretty_hex(&[0; 17], 0).lines().nth(1), Some("0008: 00"));
}
