//! Progress reporting for passes that rewrite the program in place.

use std::ops::{BitOr, BitOrAssign};

/// Whether a rewriting pass touched its input. Passes that can enable further rewrites (macro expansion, constant
/// folding) are repeated until they report [`Change::Unmodified`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Change {
	/// Nothing was rewritten.
	#[default]
	Unmodified,
	/// Something was rewritten.
	Modified,
}

impl Change {
	/// Whether another round of the pass may find more work.
	#[must_use]
	pub const fn is_modified(self) -> bool {
		matches!(self, Self::Modified)
	}
}

impl From<bool> for Change {
	fn from(modified: bool) -> Self {
		if modified { Self::Modified } else { Self::Unmodified }
	}
}

impl BitOr for Change {
	type Output = Self;

	fn bitor(self, rhs: Self) -> Self::Output {
		Self::from(self.is_modified() || rhs.is_modified())
	}
}

impl BitOrAssign for Change {
	fn bitor_assign(&mut self, rhs: Self) {
		*self = *self | rhs;
	}
}

impl FromIterator<Self> for Change {
	fn from_iter<T: IntoIterator<Item = Self>>(iter: T) -> Self {
		iter.into_iter().fold(Self::Unmodified, BitOr::bitor)
	}
}
