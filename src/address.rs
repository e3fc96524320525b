//! Range-checked address and size types.
//!
//! The DCPU-16 addresses 0x10000 words of 16 bits each. The assembler however calculates in bytes (output is a byte
//! stream), so every address exists in a word and a byte flavor. Byte addresses are only convertible to word
//! addresses if they are even.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};

use parking_lot::RwLock;
use thiserror::Error;

/// Highest word address.
pub const MAX_WORD_ADDRESS: i64 = 0xFFFF;
/// Highest byte address; one past the last byte of the last word would be `MAX_BYTE_ADDRESS + 1`.
pub const MAX_BYTE_ADDRESS: i64 = 0x1_FFFF;
/// One past the last byte of the address space. Output may end here, but not extend past it.
pub const ADDRESS_SPACE_END: u32 = 0x2_0000;

/// Moves a byte offset forward, staying inside the address space.
///
/// # Errors
/// If the result lies past [`ADDRESS_SPACE_END`].
pub fn advance_offset(offset: u32, bytes: u64) -> Result<u32, AddressError> {
	let end = u64::from(offset).saturating_add(bytes);
	u32::try_from(end)
		.ok()
		.filter(|end| *end <= ADDRESS_SPACE_END)
		.ok_or_else(|| AddressError::ByteOutOfRange(i64::try_from(end).unwrap_or(i64::MAX)))
}

/// Number of bytes taken up by a word count, such as the operand of `.reserve`.
///
/// # Errors
/// If the count is negative.
pub fn words_to_bytes(words: i64) -> Result<u64, AddressError> {
	u64::try_from(words).map(|words| words.saturating_mul(2)).map_err(|_| AddressError::NegativeSize(words))
}

/// Errors of the address value types.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub enum AddressError {
	/// Word address outside of 0..=0xFFFF.
	#[error("Word address {0:#x} is outside of the address space")]
	WordOutOfRange(i64),
	/// Byte address outside of 0..=0x1FFFF.
	#[error("Byte address {0:#x} is outside of the address space")]
	ByteOutOfRange(i64),
	/// An odd byte quantity was converted to words.
	#[error("Byte quantity {0:#x} is not word-aligned")]
	Unaligned(i64),
	/// Sizes cannot be negative.
	#[error("Size {0} is negative")]
	NegativeSize(i64),
	/// A range whose end lies before its start.
	#[error("Range end {end:#x} lies before its start {start:#x}")]
	InvertedRange {
		/// Start byte.
		start: i64,
		/// End byte (exclusive).
		end:   i64,
	},
}

/// A location in the DCPU-16 address space.
#[derive(Clone, Copy, Debug, Eq)]
pub enum Address {
	/// Address counted in 16-bit words.
	Word(u16),
	/// Address counted in bytes.
	Byte(u32),
}

impl Address {
	/// Creates a word address.
	///
	/// # Errors
	/// If the value is outside of the word address space.
	pub fn word(value: i64) -> Result<Self, AddressError> {
		u16::try_from(value).map(Self::Word).map_err(|_| AddressError::WordOutOfRange(value))
	}

	/// Creates a byte address.
	///
	/// # Errors
	/// If the value is outside of the byte address space.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	pub fn byte(value: i64) -> Result<Self, AddressError> {
		if (0 ..= MAX_BYTE_ADDRESS).contains(&value) {
			Ok(Self::Byte(value as u32))
		} else {
			Err(AddressError::ByteOutOfRange(value))
		}
	}

	/// The address as a byte offset. Always succeeds.
	#[must_use]
	pub const fn to_byte(self) -> u32 {
		match self {
			Self::Word(word) => (word as u32) << 1,
			Self::Byte(byte) => byte,
		}
	}

	/// The address as a word index.
	///
	/// # Errors
	/// If this is an odd byte address.
	pub const fn to_word(self) -> Result<u16, AddressError> {
		match self {
			Self::Word(word) => Ok(word),
			Self::Byte(byte) if byte & 1 == 1 => Err(AddressError::Unaligned(byte as i64)),
			#[allow(clippy::cast_possible_truncation)]
			Self::Byte(byte) => Ok((byte >> 1) as u16),
		}
	}

	/// Moves this address forward (or backward, for negative sizes) by the given number of bytes, keeping the
	/// granularity of this address.
	///
	/// # Errors
	/// If the result leaves the address space, or a word address would end up unaligned.
	pub fn offset_by(self, bytes: i64) -> Result<Self, AddressError> {
		let target = i64::from(self.to_byte()) + bytes;
		match self {
			Self::Byte(_) => Self::byte(target),
			Self::Word(_) if target & 1 == 1 => Err(AddressError::Unaligned(target)),
			Self::Word(_) => Self::word(target >> 1),
		}
	}

	/// Adds a size to this address.
	///
	/// # Errors
	/// See [`Self::offset_by`].
	pub fn plus(self, size: Size) -> Result<Self, AddressError> {
		self.offset_by(i64::from(size.in_bytes()))
	}
}

impl PartialEq for Address {
	fn eq(&self, other: &Self) -> bool {
		self.to_byte() == other.to_byte()
	}
}

impl PartialOrd for Address {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Address {
	fn cmp(&self, other: &Self) -> Ordering {
		self.to_byte().cmp(&other.to_byte())
	}
}

impl Display for Address {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Self::Word(word) => write!(f, "{word:04X}"),
			Self::Byte(byte) => write!(f, "{byte:05X}b"),
		}
	}
}

/// Unit of a [`Size`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SizeUnit {
	/// 8-bit bytes.
	Bytes,
	/// 16-bit words.
	Words,
}

/// A non-negative quantity of memory.
#[derive(Clone, Copy, Debug, Eq)]
pub struct Size {
	value: u32,
	unit:  SizeUnit,
}

impl Size {
	/// The empty size.
	pub const ZERO: Self = Self { value: 0, unit: SizeUnit::Bytes };

	/// A size in bytes.
	#[must_use]
	pub const fn bytes(value: u32) -> Self {
		Self { value, unit: SizeUnit::Bytes }
	}

	/// A size in words.
	#[must_use]
	pub const fn words(value: u32) -> Self {
		Self { value, unit: SizeUnit::Words }
	}

	/// Creates a size from a possibly negative number.
	///
	/// # Errors
	/// If the number is negative or does not fit the byte address space.
	pub fn checked(value: i64, unit: SizeUnit) -> Result<Self, AddressError> {
		if value < 0 {
			return Err(AddressError::NegativeSize(value));
		}
		let value = u32::try_from(value).map_err(|_| AddressError::ByteOutOfRange(value))?;
		Ok(Self { value, unit })
	}

	/// The unit this size was created with.
	#[must_use]
	pub const fn unit(self) -> SizeUnit {
		self.unit
	}

	/// This size in bytes.
	#[must_use]
	pub const fn in_bytes(self) -> u32 {
		match self.unit {
			SizeUnit::Bytes => self.value,
			SizeUnit::Words => self.value << 1,
		}
	}

	/// This size in words.
	///
	/// # Errors
	/// If the size is an odd number of bytes.
	pub const fn in_words(self) -> Result<u32, AddressError> {
		match self.unit {
			SizeUnit::Words => Ok(self.value),
			SizeUnit::Bytes if self.value & 1 == 1 => Err(AddressError::Unaligned(self.value as i64)),
			SizeUnit::Bytes => Ok(self.value >> 1),
		}
	}
}

impl PartialEq for Size {
	fn eq(&self, other: &Self) -> bool {
		self.in_bytes() == other.in_bytes()
	}
}

impl std::ops::Add for Size {
	type Output = Self;

	fn add(self, rhs: Self) -> Self::Output {
		if self.unit == rhs.unit {
			Self { value: self.value + rhs.value, unit: self.unit }
		} else {
			Self::bytes(self.in_bytes() + rhs.in_bytes())
		}
	}
}

impl Display for Size {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self.unit {
			SizeUnit::Bytes => write!(f, "{} bytes", self.value),
			SizeUnit::Words => write!(f, "{} words", self.value),
		}
	}
}

/// A half-open region `[start, end)` of memory, stored in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddressRange {
	start: u32,
	end:   u32,
}

impl AddressRange {
	/// Creates a range starting at `start` that spans `size`.
	///
	/// # Errors
	/// If the range leaves the address space.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	pub fn new(start: Address, size: Size) -> Result<Self, AddressError> {
		let end = i64::from(start.to_byte()) + i64::from(size.in_bytes());
		// The end is exclusive and may sit one past the last byte.
		if end > MAX_BYTE_ADDRESS + 1 {
			return Err(AddressError::ByteOutOfRange(end));
		}
		Ok(Self { start: start.to_byte(), end: end as u32 })
	}

	/// Creates a range from its two bounds.
	///
	/// # Errors
	/// If `end < start`.
	pub fn from_bounds(start: Address, end: Address) -> Result<Self, AddressError> {
		if end < start {
			return Err(AddressError::InvertedRange { start: start.to_byte().into(), end: end.to_byte().into() });
		}
		Ok(Self { start: start.to_byte(), end: end.to_byte() })
	}

	/// First byte of the range.
	#[must_use]
	pub const fn start(&self) -> Address {
		Address::Byte(self.start)
	}

	/// First byte after the range.
	#[must_use]
	pub const fn end(&self) -> Address {
		Address::Byte(self.end)
	}

	/// Size of the range.
	#[must_use]
	pub const fn size(&self) -> Size {
		Size::bytes(self.end - self.start)
	}

	/// Whether the range contains no bytes.
	#[must_use]
	pub const fn is_empty(&self) -> bool {
		self.start == self.end
	}

	/// Whether the address lies inside the range.
	#[must_use]
	pub fn contains(&self, address: Address) -> bool {
		(self.start .. self.end).contains(&address.to_byte())
	}

	/// Whether the two ranges share at least one byte.
	#[must_use]
	pub const fn intersects(&self, other: &Self) -> bool {
		self.start < other.end && other.start < self.end
	}

	/// Merges two overlapping or adjacent ranges into one. Disjoint ranges cannot be merged.
	#[must_use]
	pub fn merge(&self, other: &Self) -> Option<Self> {
		if self.start <= other.end && other.start <= self.end {
			Some(Self { start: self.start.min(other.start), end: self.end.max(other.end) })
		} else {
			None
		}
	}

	/// Removes `other` from this range. Between zero and two non-empty ranges remain.
	#[must_use]
	pub fn subtract(&self, other: &Self) -> Vec<Self> {
		if !self.intersects(other) {
			return vec![*self];
		}
		let before = Self { start: self.start, end: other.start.max(self.start) };
		let after = Self { start: other.end.min(self.end), end: self.end };
		[before, after].into_iter().filter(|range| !range.is_empty()).collect()
	}
}

impl Display for AddressRange {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "[{:05X}, {:05X})", self.start, self.end)
	}
}

/// A sorted set of disjoint address ranges with fast containment lookup, safe to share between threads.
///
/// Overlapping and adjacent ranges are merged on insertion.
#[derive(Debug, Default)]
pub struct AddressRangeIndex {
	ranges: RwLock<Vec<AddressRange>>,
}

impl AddressRangeIndex {
	/// Creates an empty index.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Inserts a range. Returns the parts of the range that were already present, which is empty if the range did not
	/// overlap anything.
	pub fn insert(&self, range: AddressRange) -> Vec<AddressRange> {
		if range.is_empty() {
			return Vec::new();
		}
		let mut ranges = self.ranges.write();
		let overlaps = ranges
			.iter()
			.filter(|existing| existing.intersects(&range))
			.map(|existing| AddressRange { start: existing.start.max(range.start), end: existing.end.min(range.end) })
			.collect();

		let mut merged = range;
		ranges.retain(|existing| {
			merged.merge(existing).map_or(true, |combined| {
				merged = combined;
				false
			})
		});
		let position = ranges.partition_point(|existing| existing.start < merged.start);
		ranges.insert(position, merged);
		overlaps
	}

	/// Removes a range, splitting stored ranges where necessary.
	pub fn remove(&self, range: AddressRange) {
		let mut ranges = self.ranges.write();
		let remaining = ranges.iter().flat_map(|existing| existing.subtract(&range)).collect();
		*ranges = remaining;
	}

	/// Whether any stored range contains the address.
	#[must_use]
	pub fn contains(&self, address: Address) -> bool {
		let ranges = self.ranges.read();
		let byte = address.to_byte();
		let position = ranges.partition_point(|range| range.end <= byte);
		ranges.get(position).is_some_and(|range| range.contains(address))
	}

	/// A snapshot of all stored ranges in ascending order.
	#[must_use]
	pub fn ranges(&self) -> Vec<AddressRange> {
		self.ranges.read().clone()
	}

	/// Removes all ranges.
	pub fn clear(&self) {
		self.ranges.write().clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn address_bounds() {
		assert!(Address::word(0).is_ok());
		assert!(Address::word(0xFFFF).is_ok());
		assert_eq!(Address::word(0x1_0000), Err(AddressError::WordOutOfRange(0x1_0000)));
		assert_eq!(Address::word(-1), Err(AddressError::WordOutOfRange(-1)));
		assert!(Address::byte(0x1_FFFF).is_ok());
		assert_eq!(Address::byte(0x2_0000), Err(AddressError::ByteOutOfRange(0x2_0000)));
	}

	#[test]
	fn byte_to_word_requires_alignment() {
		assert_eq!(Address::Byte(0x20).to_word(), Ok(0x10));
		assert_eq!(Address::Byte(0x21).to_word(), Err(AddressError::Unaligned(0x21)));
		assert_eq!(Address::Word(0x10), Address::Byte(0x20));
		assert!(Address::Word(3) < Address::Byte(7));
	}

	#[test]
	fn address_arithmetic() {
		assert_eq!(Address::Word(1).plus(Size::words(2)), Ok(Address::Word(3)));
		assert_eq!(Address::Word(1).offset_by(1), Err(AddressError::Unaligned(3)));
		assert_eq!(Address::Byte(1).offset_by(1), Ok(Address::Byte(2)));
		assert_eq!(Address::Word(0xFFFF).plus(Size::words(1)), Err(AddressError::WordOutOfRange(0x1_0000)));
	}

	#[test]
	fn offsets_stay_in_address_space() {
		assert_eq!(advance_offset(0, 0x2_0000), Ok(ADDRESS_SPACE_END));
		assert_eq!(advance_offset(2, 0x1_FFFE), Ok(ADDRESS_SPACE_END));
		assert_eq!(advance_offset(2, 0x2_0000), Err(AddressError::ByteOutOfRange(0x2_0002)));
		assert_eq!(advance_offset(0x1_0000, u64::MAX), Err(AddressError::ByteOutOfRange(i64::MAX)));
		assert_eq!(words_to_bytes(0x8000_0000), Ok(0x1_0000_0000));
		assert_eq!(words_to_bytes(-1), Err(AddressError::NegativeSize(-1)));
	}

	#[test]
	fn sizes() {
		assert_eq!(Size::words(3).in_bytes(), 6);
		assert_eq!(Size::bytes(6).in_words(), Ok(3));
		assert_eq!(Size::bytes(5).in_words(), Err(AddressError::Unaligned(5)));
		assert_eq!(Size::checked(-2, SizeUnit::Bytes), Err(AddressError::NegativeSize(-2)));
		assert_eq!(Size::words(1) + Size::bytes(2), Size::bytes(4));
	}

	#[test]
	fn range_operations() {
		let range = AddressRange::new(Address::Word(0x10), Size::words(0x10)).unwrap();
		assert!(range.contains(Address::Word(0x10)));
		assert!(range.contains(Address::Word(0x1F)));
		assert!(!range.contains(Address::Word(0x20)));

		let adjacent = AddressRange::new(Address::Word(0x20), Size::words(4)).unwrap();
		assert!(!range.intersects(&adjacent));
		let merged = range.merge(&adjacent).unwrap();
		assert_eq!(merged.start(), Address::Word(0x10));
		assert_eq!(merged.end(), Address::Word(0x24));

		let middle = AddressRange::new(Address::Word(0x14), Size::words(2)).unwrap();
		let pieces = range.subtract(&middle);
		assert_eq!(pieces.len(), 2);
		assert_eq!(pieces[0].end(), Address::Word(0x14));
		assert_eq!(pieces[1].start(), Address::Word(0x16));

		assert!(AddressRange::from_bounds(Address::Word(2), Address::Word(1)).is_err());
		assert!(AddressRange::new(Address::Word(0xFFFF), Size::words(1)).is_ok());
		assert!(AddressRange::new(Address::Word(0xFFFF), Size::words(2)).is_err());
	}

	#[test]
	fn range_index() {
		let index = AddressRangeIndex::new();
		assert!(index.insert(AddressRange::new(Address::Word(0x100), Size::words(0x10)).unwrap()).is_empty());
		assert!(index.insert(AddressRange::new(Address::Word(0), Size::words(4)).unwrap()).is_empty());
		assert!(index.insert(AddressRange::new(Address::Word(4), Size::words(4)).unwrap()).is_empty());
		assert_eq!(index.ranges().len(), 2);

		assert!(index.contains(Address::Word(7)));
		assert!(!index.contains(Address::Word(8)));
		assert!(index.contains(Address::Word(0x10F)));
		assert!(!index.contains(Address::Word(0x110)));

		let overlap = index.insert(AddressRange::new(Address::Word(0x10E), Size::words(4)).unwrap());
		assert_eq!(overlap, vec![AddressRange::new(Address::Word(0x10E), Size::words(2)).unwrap()]);

		index.remove(AddressRange::new(Address::Word(2), Size::words(2)).unwrap());
		assert!(index.contains(Address::Word(1)));
		assert!(!index.contains(Address::Word(3)));
		assert!(index.contains(Address::Word(4)));
	}
}
