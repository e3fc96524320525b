//! Symbolic references.

use std::fmt::{Display, Formatter};

use flexstr::SharedStr;
use miette::SourceSpan;

/// Identifies a symbol within the symbol table. Global symbols have no scope; local symbols are scoped under the name
/// of their enclosing global label.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SymbolKey {
	/// Enclosing global label, for local symbols.
	pub scope: Option<SharedStr>,
	/// Name of the symbol, without any local prefix.
	pub name:  SharedStr,
}

impl SymbolKey {
	/// Key of a global symbol.
	#[must_use]
	pub fn global(name: impl Into<SharedStr>) -> Self {
		Self { scope: None, name: name.into() }
	}

	/// Key of a local symbol.
	#[must_use]
	pub fn local(scope: impl Into<SharedStr>, name: impl Into<SharedStr>) -> Self {
		Self { scope: Some(scope.into()), name: name.into() }
	}
}

impl Display for SymbolKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match &self.scope {
			Some(scope) => write!(f, "{scope}.{}", self.name),
			None => write!(f, "{}", self.name),
		}
	}
}

/// A use of a symbol in source code. Equality ignores the location.
#[derive(Clone, Debug)]
pub struct Reference {
	/// Name as written, without the local prefix.
	pub name:     SharedStr,
	/// Whether this is a `.local` reference.
	pub is_local: bool,
	/// The global label that encloses this reference in source order, if any.
	pub parent:   Option<SharedStr>,
	/// Where the reference is used.
	pub span:     SourceSpan,
}

impl PartialEq for Reference {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name && self.is_local == other.is_local && self.parent == other.parent
	}
}

impl Eq for Reference {}

impl Reference {
	/// The symbol table key this reference refers to. Local references without a parent have no key.
	#[must_use]
	pub fn key(&self) -> Option<SymbolKey> {
		if self.is_local {
			self.parent.clone().map(|parent| SymbolKey::local(parent, self.name.clone()))
		} else {
			Some(SymbolKey::global(self.name.clone()))
		}
	}
}

impl Display for Reference {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		if self.is_local { write!(f, ".{}", self.name) } else { write!(f, "{}", self.name) }
	}
}
