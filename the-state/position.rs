use std::cmp::Ordering;

use ropey::RopeSlice;
use serde::{
  Deserialize,
  Serialize,
};

/// A line/column point in a document.
/// 0-indexed; `column` counts chars from the start of the line.
///
/// Positions are not checked against any document when built. They are
/// checked on resolution: [`EditorState::position_to_offset`] rejects a
/// missing line, while [`pos_to_char`], used for selection mapping, clamps.
///
/// [`EditorState::position_to_offset`]: crate::EditorState::position_to_offset
#[derive(
  Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
  pub line:   usize,
  pub column: usize,
}

impl Position {
  pub const fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }

  pub const fn zero() -> Self {
    Self { line: 0, column: 0 }
  }

  pub const fn is_zero(&self) -> bool {
    self.line == 0 && self.column == 0
  }
}

impl From<(usize, usize)> for Position {
  fn from(value: (usize, usize)) -> Self {
    Position::new(value.0, value.1)
  }
}

/// Orders two positions by line, then column.
#[inline]
pub fn compare_positions(a: Position, b: Position) -> Ordering {
  a.cmp(&b)
}

/// An interval between two positions, `start` inclusive and `end` exclusive.
/// INVARIANT: `start <= end`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
  start: Position,
  end:   Position,
}

impl Range {
  /// Builds a range from two positions in any order.
  pub fn new(a: Position, b: Position) -> Self {
    if a <= b {
      Self { start: a, end: b }
    } else {
      Self { start: b, end: a }
    }
  }

  #[inline]
  pub fn point(pos: Position) -> Self {
    Self {
      start: pos,
      end:   pos,
    }
  }

  #[inline]
  pub const fn start(&self) -> Position {
    self.start
  }

  #[inline]
  pub const fn end(&self) -> Position {
    self.end
  }

  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }

  #[inline]
  pub fn contains(&self, pos: Position) -> bool {
    self.start <= pos && pos < self.end
  }

  /// Check if two ranges share at least one position, or touch while one of
  /// them is empty.
  pub fn overlaps(&self, other: &Self) -> bool {
    self.start == other.start || (self.end > other.start && other.end > self.start)
  }

  /// Smallest range covering both.
  pub fn union(&self, other: &Self) -> Self {
    Self {
      start: self.start.min(other.start),
      end:   self.end.max(other.end),
    }
  }
}

impl From<(Position, Position)> for Range {
  fn from(value: (Position, Position)) -> Self {
    Self::new(value.0, value.1)
  }
}

/// Number of chars taken by the line ending at the end of `line` (0 on the
/// last line of a document without a trailing newline).
pub fn line_ending_len(line: RopeSlice) -> usize {
  let len = line.len_chars();
  if len == 0 {
    return 0;
  }
  match line.char(len - 1) {
    '\n' if len >= 2 && line.char(len - 2) == '\r' => 2,
    ch if char_is_line_ending(ch) => 1,
    _ => 0,
  }
}

#[inline]
pub fn char_is_line_ending(ch: char) -> bool {
  if cfg!(feature = "unicode-lines") {
    matches!(
      ch,
      '\u{000A}' | '\u{000B}' | '\u{000C}' | '\u{000D}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
  } else {
    matches!(ch, '\u{000A}' | '\u{000D}')
  }
}

/// Length in chars of line `line`, line ending excluded.
pub fn line_len(text: RopeSlice, line: usize) -> usize {
  let slice = text.line(line);
  slice.len_chars() - line_ending_len(slice)
}

/// Resolves `pos` to a char index in `text`.
///
/// A `line` past the end of the document resolves on the last line; a
/// `column` past the end of its line resolves to the end of the line content
/// (before the line ending).
pub fn pos_to_char(text: RopeSlice, pos: Position) -> usize {
  let line = pos.line.min(text.len_lines().saturating_sub(1));
  let line_start = text.line_to_char(line);
  line_start + pos.column.min(line_len(text, line))
}

/// Converts a char index into a [`Position`]. Indices past the end of the
/// document clamp to the end.
pub fn char_to_pos(text: RopeSlice, char_idx: usize) -> Position {
  let char_idx = char_idx.min(text.len_chars());
  let line = text.char_to_line(char_idx);
  Position::new(line, char_idx - text.line_to_char(line))
}
