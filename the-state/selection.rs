//! Multi-range selections.
//!
//! A [`SelectionRange`] has two positions: `anchor` and `head`. The `head`
//! is where the cursor visually sits, the `anchor` is the other end. When
//! `anchor == head` the range is a plain cursor.
//!
//! ```text
//! anchor=(0,2), head=(0,7): "he[llo w]orld"  (forward selection)
//! anchor=(0,7), head=(0,2): "he]llo w[orld"  (backward selection)
//! anchor=(0,5), head=(0,5): "hello|world"    (cursor)
//! ```
//!
//! A [`SelectionSet`] holds one or more ranges (multi-cursor) and marks one
//! of them as the main range. Every operation returns a new set, never
//! leaves it empty, and re-clamps the main index.

use ropey::RopeSlice;
use serde::{
  Deserialize,
  Serialize,
};
use smallvec::{
  SmallVec,
  smallvec,
};
use thiserror::Error;

use crate::{
  change::{
    Assoc,
    ChangeSet,
  },
  position::{
    Position,
    Range,
    char_to_pos,
    pos_to_char,
  },
};

pub type Result<T> = std::result::Result<T, SelectionError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SelectionError {
  #[error("selection must contain at least one range")]
  EmptySelection,
  #[error("range index {index} out of bounds for selection of length {len}")]
  RangeIndexOutOfBounds { index: usize, len: usize },
  #[error("cannot remove the last range from a selection")]
  RemoveLastRange,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionRange {
  pub anchor: Position,
  pub head:   Position,
}

impl SelectionRange {
  pub fn new(anchor: impl Into<Position>, head: impl Into<Position>) -> Self {
    Self {
      anchor: anchor.into(),
      head:   head.into(),
    }
  }

  #[inline]
  pub fn cursor(pos: impl Into<Position>) -> Self {
    let pos = pos.into();
    Self::new(pos, pos)
  }

  /// Start of the range
  #[inline]
  #[must_use]
  pub fn from(&self) -> Position {
    std::cmp::min(self.anchor, self.head)
  }

  /// End of the range
  #[inline]
  #[must_use]
  pub fn to(&self) -> Position {
    std::cmp::max(self.anchor, self.head)
  }

  /// When the head and anchor are in the same position, we have a cursor.
  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.anchor == self.head
  }

  #[inline]
  pub fn is_forward(&self) -> bool {
    self.anchor <= self.head
  }

  /// Swap anchor and head.
  #[must_use]
  pub fn flip(&self) -> Self {
    Self::new(self.head, self.anchor)
  }

  /// The covered interval, direction dropped.
  #[inline]
  pub fn range(&self) -> Range {
    Range::new(self.anchor, self.head)
  }

  /// Resolve both ends to char offsets in `text`, ordered.
  pub fn offsets(&self, text: RopeSlice) -> (usize, usize) {
    (pos_to_char(text, self.from()), pos_to_char(text, self.to()))
  }

  /// Apply `f` to both ends.
  #[must_use]
  pub fn map_positions(self, mut f: impl FnMut(Position) -> Position) -> Self {
    Self::new(f(self.anchor), f(self.head))
  }
}

impl From<Position> for SelectionRange {
  fn from(pos: Position) -> Self {
    Self::cursor(pos)
  }
}

impl From<(Position, Position)> for SelectionRange {
  fn from((anchor, head): (Position, Position)) -> Self {
    Self::new(anchor, head)
  }
}

/// A selection is one or more ranges, one of which is the main range.
/// INVARIANT: A selection can never be empty (always contain at least one
/// range), and `main_index` always points at one of its ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet {
  ranges:     SmallVec<[SelectionRange; 1]>,
  main_index: usize,
}

impl Default for SelectionSet {
  fn default() -> Self {
    Self::cursor(Position::zero())
  }
}

impl SelectionSet {
  /// Build a selection from `ranges`. An out of bounds `main_index` is
  /// clamped to the last range.
  pub fn new<I>(ranges: I, main_index: usize) -> Result<Self>
  where
    I: IntoIterator,
    I::Item: Into<SelectionRange>,
  {
    let ranges: SmallVec<[SelectionRange; 1]> = ranges.into_iter().map(Into::into).collect();
    if ranges.is_empty() {
      return Err(SelectionError::EmptySelection);
    }
    Ok(Self::new_unchecked(ranges, main_index))
  }

  fn new_unchecked(ranges: SmallVec<[SelectionRange; 1]>, main_index: usize) -> Self {
    debug_assert!(!ranges.is_empty());
    let main_index = main_index.min(ranges.len() - 1);
    Self { ranges, main_index }
  }

  pub fn single(anchor: impl Into<Position>, head: impl Into<Position>) -> Self {
    Self::new_unchecked(smallvec![SelectionRange::new(anchor, head)], 0)
  }

  pub fn cursor(pos: impl Into<Position>) -> Self {
    Self::new_unchecked(smallvec![SelectionRange::cursor(pos)], 0)
  }

  #[inline]
  pub fn ranges(&self) -> &[SelectionRange] {
    &self.ranges
  }

  #[inline]
  pub fn main_index(&self) -> usize {
    self.main_index
  }

  #[inline]
  pub fn main(&self) -> SelectionRange {
    self.ranges[self.main_index]
  }

  /// Number of ranges.
  #[inline]
  #[must_use]
  pub fn len(&self) -> usize {
    self.ranges.len()
  }

  /// Check if every range is a cursor.
  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.ranges.iter().all(SelectionRange::is_empty)
  }

  #[inline]
  pub fn iter(&self) -> std::slice::Iter<'_, SelectionRange> {
    self.ranges.iter()
  }

  pub fn range_at(&self, idx: usize) -> Result<SelectionRange> {
    self.ranges.get(idx).copied().ok_or(SelectionError::RangeIndexOutOfBounds {
      index: idx,
      len:   self.ranges.len(),
    })
  }

  /// Apply `f` to every position in the selection.
  #[must_use]
  pub fn map_positions(&self, mut f: impl FnMut(Position) -> Position) -> Self {
    let ranges = self
      .ranges
      .iter()
      .map(|range| range.map_positions(&mut f))
      .collect();
    Self::new_unchecked(ranges, self.main_index)
  }

  /// Map the selection through `changes`.
  ///
  /// Positions are resolved against `before` (the document the changes apply
  /// to), mapped with [`Assoc::After`], and converted back against `after`.
  #[must_use]
  pub fn map(&self, changes: &ChangeSet, before: RopeSlice, after: RopeSlice) -> Self {
    if changes.is_empty() {
      return self.clone();
    }
    self.map_positions(|pos| {
      let offset = changes.map_offset(pos_to_char(before, pos), Assoc::After);
      char_to_pos(after, offset)
    })
  }

  /// Replace the main range.
  #[must_use]
  pub fn replace_main(&self, range: SelectionRange) -> Self {
    let mut ranges = self.ranges.clone();
    ranges[self.main_index] = range;
    Self::new_unchecked(ranges, self.main_index)
  }

  /// Append `range`, making it the main range when `make_main` is set.
  #[must_use]
  pub fn add_range(&self, range: SelectionRange, make_main: bool) -> Self {
    let mut ranges = self.ranges.clone();
    ranges.push(range);
    let main_index = if make_main {
      ranges.len() - 1
    } else {
      self.main_index
    };
    Self::new_unchecked(ranges, main_index)
  }

  pub fn replace(&self, idx: usize, range: SelectionRange) -> Result<Self> {
    self.range_at(idx)?;
    let mut ranges = self.ranges.clone();
    ranges[idx] = range;
    Ok(Self::new_unchecked(ranges, self.main_index))
  }

  /// Remove the range at `idx`. The main range moves back by one when a range
  /// before it is removed.
  pub fn remove(&self, idx: usize) -> Result<Self> {
    self.range_at(idx)?;
    if self.ranges.len() == 1 {
      return Err(SelectionError::RemoveLastRange);
    }
    let mut ranges = self.ranges.clone();
    ranges.remove(idx);
    let main_index = if idx < self.main_index {
      self.main_index - 1
    } else {
      self.main_index
    };
    Ok(Self::new_unchecked(ranges, main_index))
  }

  /// Keep only the main range.
  #[must_use]
  pub fn as_single(&self) -> Self {
    Self::new_unchecked(smallvec![self.main()], 0)
  }
}

impl<'a> IntoIterator for &'a SelectionSet {
  type IntoIter = std::slice::Iter<'a, SelectionRange>;
  type Item = &'a SelectionRange;

  fn into_iter(self) -> Self::IntoIter {
    self.ranges.iter()
  }
}

impl From<SelectionRange> for SelectionSet {
  fn from(range: SelectionRange) -> Self {
    Self::new_unchecked(smallvec![range], 0)
  }
}
