//! Semantics module unit tests.

use std::sync::Arc;

use flexstr::SharedStr;

use super::directive::MacroDefinition;
use super::expansion::{MacroExpander, substitute};
use super::symbol::{EvaluationError, ResolutionError};
use super::{AssemblyTimeValue, ProgramElement, Reference, SymbolKey, SymbolTable};
use crate::parser::parse;
use crate::{AssemblyCode, AssemblyError};

fn declare(text: &str) -> (SymbolTable, Vec<ProgramElement>, Arc<AssemblyCode>, Vec<AssemblyError>) {
	let src = Arc::new(AssemblyCode::new(text, "test.dasm"));
	let parsed = parse(&src, None);
	assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
	let mut symbols = SymbolTable::new();
	let errors = symbols.declare_program(&parsed.elements, &src, 0, true);
	(symbols, parsed.elements, src, errors)
}

fn reference(name: &str) -> AssemblyTimeValue {
	AssemblyTimeValue::Reference(Reference { name: name.into(), is_local: false, parent: None, span: (0, 0).into() })
}

#[test]
fn equation_cycles() {
	for (source, length) in
		[("alpha .equ beta\nbeta .equ gamma\ngamma .equ alpha", 4), ("alpha .equ beta + 1\nbeta .equ alpha * 2", 3)]
	{
		let (symbols, _, _, errors) = declare(source);
		assert!(errors.is_empty());

		let Err(EvaluationError::Cyclic(cycle)) = symbols.evaluate(&reference("alpha")) else {
			panic!("{source} is not cyclic");
		};
		assert_eq!(cycle.len(), length);
		assert_eq!(cycle.first(), cycle.last());

		let found = symbols.find_cycle(&SymbolKey::global("alpha")).unwrap();
		assert_eq!(found.len(), length);
		assert!(symbols.is_address_dependent(&reference("alpha")));
	}
}

#[test]
fn forward_equations() {
	let (symbols, _, _, errors) = declare("x .equ y + 1\ny .equ 2\nz .equ x * x");
	assert!(errors.is_empty());
	assert_eq!(symbols.evaluate(&reference("x")), Ok(3));
	assert_eq!(symbols.evaluate(&reference("z")), Ok(9));
	assert!(!symbols.is_address_dependent(&reference("z")));
	assert_eq!(symbols.find_cycle(&SymbolKey::global("z")), None);
	assert!(matches!(symbols.evaluate(&reference("w")), Err(EvaluationError::Unknown(_))));
}

#[test]
fn label_resolution() {
	let (mut symbols, _, _, errors) = declare("start:\nafter .equ start + 1\n.loop: SET PC, .loop");
	assert!(errors.is_empty());
	let start = SymbolKey::global("start");

	assert!(symbols.is_address_dependent(&reference("after")));
	assert_eq!(symbols.evaluate(&reference("after")), Err(EvaluationError::Unresolved(start.clone())));

	let mut fallback = symbols.clone();
	fallback.resolve_label(&start, 0x40).unwrap();
	assert_eq!(symbols.evaluate_with_fallback(&reference("after"), Some(&fallback)), Ok(0x41));

	symbols.resolve_label(&start, 4).unwrap();
	symbols.resolve_label(&SymbolKey::local("start", "loop"), 4).unwrap();
	assert_eq!(symbols.evaluate(&reference("after")), Ok(5));
	assert_eq!(symbols.evaluate_with_fallback(&reference("after"), Some(&fallback)), Ok(5));
	assert_eq!(symbols.resolve_label(&start, 6), Err(ResolutionError::AlreadyResolved));
	assert!(matches!(symbols.resolve_label(&SymbolKey::global("after"), 6), Err(ResolutionError::UnknownLabel(_))));

	symbols.clear_unit_labels(1);
	assert_eq!(symbols.label_address(&start), Some(4));
	symbols.clear_unit_labels(0);
	assert_eq!(symbols.label_address(&start), None);
	assert_eq!(symbols.label_address(&SymbolKey::local("start", "loop")), None);
}

#[test]
fn declaration_errors() {
	let (_, _, _, errors) = declare(".orphan: SET A, 1");
	assert!(matches!(errors[..], [AssemblyError::MissingGlobalLabel { .. }]));

	let (symbols, _, _, errors) = declare("twice:\ntwice .equ 4");
	assert!(matches!(errors[..], [AssemblyError::RedefinedSymbol { .. }]));
	assert_eq!(symbols.len(), 1);

	// Local labels of different global labels don't collide.
	let (symbols, _, _, errors) = declare("one:\n.loop: SET A, 1\ntwo:\n.loop: SET A, 2");
	assert!(errors.is_empty());
	assert!(symbols.get(&SymbolKey::local("one", "loop")).is_some());
	assert!(symbols.get(&SymbolKey::local("two", "loop")).is_some());
}

#[test]
fn parameter_substitution() {
	let src = Arc::new(AssemblyCode::new("", "test.dasm"));
	let definition = MacroDefinition {
		name:       "store".into(),
		parameters: vec!["value".into(), "target".into()],
		body:       "SET target, value ; value\n.dat \"value\", value_2, target\n".into(),
	};
	let arguments: Vec<SharedStr> = vec!["[B+1]".into(), "A".into()];
	assert_eq!(
		substitute(&definition, &arguments, (0, 0).into(), &src).unwrap(),
		"SET A, [B+1] ; value\n.dat \"value\", value_2, A\n"
	);

	let error = substitute(&definition, &arguments[.. 1], (0, 0).into(), &src).unwrap_err();
	assert!(matches!(*error, AssemblyError::IncorrectNumberOfMacroArguments {
		expected_number: 2,
		actual_number: 1,
		..
	}));

	let definition = MacroDefinition { name: "nothing".into(), parameters: Vec::new(), body: "SET A, value\n".into() };
	assert_eq!(substitute(&definition, &[], (0, 0).into(), &src).unwrap(), "SET A, value\n");
}

#[test]
fn expansions_have_distinct_scopes() {
	let (symbols, mut elements, src, errors) = declare(".macro spin()\n.here: SET PC, .here\n.endmacro\nspin()\nspin()");
	assert!(errors.is_empty());

	let mut expander = MacroExpander::new(&symbols, 10);
	let (_, errors) = expander.expand_program(&mut elements, &src);
	assert!(errors.is_empty(), "{errors:?}");

	let scopes = elements
		.iter()
		.filter_map(|element| match element {
			ProgramElement::ExpandedMacro { scope, .. } => Some(scope.clone()),
			_ => None,
		})
		.collect::<Vec<_>>();
	assert_eq!(scopes.len(), 2);
	assert_ne!(scopes[0], scopes[1]);
	assert!(scopes.iter().all(|scope| scope.starts_with("spin@")));
}

#[test]
fn recursive_macros_are_limited() {
	let (symbols, mut elements, src, _) = declare(".macro forever()\nforever()\n.endmacro\nforever()");
	let mut expander = MacroExpander::new(&symbols, 5);
	let (_, errors) = expander.expand_program(&mut elements, &src);
	assert!(matches!(errors[..], [AssemblyError::MacroExpansionFailed { .. }]));
	assert!(matches!(elements.last(), Some(ProgramElement::Unparsed { .. })));
}
