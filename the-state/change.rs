//! Document changes and their algebra.
//!
//! A [`Change`] replaces the char range `[from, to)` of a document with new
//! text. A [`ChangeSet`] is an ordered list of non-overlapping changes that
//! all refer to coordinates of the same *original* document, together with
//! that document's length. A change set owns no document text; it only
//! describes a transformation.
//!
//! # Operations
//!
//! Internally, composition and inversion work on the equivalent
//! [`Operation`] sequence, applied left to right from the start of the
//! document:
//!
//! - **Retain(n)** - keep `n` chars
//! - **Delete(n)** - remove `n` chars
//! - **Insert(s)** - insert `s`
//!
//! # Mapping
//!
//! [`ChangeSet::map_offset`] projects an offset from the original document
//! into the changed one. A position sitting exactly where text was inserted
//! is ambiguous; [`Assoc`] picks the side.
//!
//! ```
//! use the_state::change::{
//!   Assoc,
//!   Change,
//!   ChangeSet,
//! };
//!
//! let cs = ChangeSet::of([Change::insert(5, "hello")], 20).unwrap();
//! assert_eq!(cs.map_offset(5, Assoc::After), 10);
//! assert_eq!(cs.map_offset(5, Assoc::Before), 5);
//! ```
//!
//! # Error Handling
//!
//! Fallible operations return [`Result<T, ChangeError>`]:
//!
//! - **LengthMismatch** - document length doesn't match the change set
//! - **ComposeLengthMismatch** - output length of the left side doesn't match
//!   the input length of the right side
//! - **InvalidRange** - a change has `from > to`
//! - **RangeOutOfBounds** - a change extends past the document end
//! - **OverlappingRange** - two changes overlap

use std::borrow::Cow;

use ropey::{
  Rope,
  RopeBuilder,
};
use serde::{
  Deserialize,
  Serialize,
};
use thiserror::Error;

use crate::Tendril;

pub type Result<T> = std::result::Result<T, ChangeError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChangeError {
  #[error("changeset length mismatch: expected {expected}, got {actual}")]
  LengthMismatch { expected: usize, actual: usize },
  #[error(
    "changeset compose length mismatch: left output {left_len_after}, right input {right_len}"
  )]
  ComposeLengthMismatch {
    left_len_after: usize,
    right_len:      usize,
  },
  #[error("invalid change range: start {from} is after end {to}")]
  InvalidRange { from: usize, to: usize },
  #[error("change range {from}..{to} is out of bounds for document length {len}")]
  RangeOutOfBounds {
    from: usize,
    to:   usize,
    len:  usize,
  },
  #[error("change range {from}..{to} overlaps previous end {prev_end}")]
  OverlappingRange {
    prev_end: usize,
    from:     usize,
    to:       usize,
  },
}

/// Replace `[from, to)` of the pre-change document with `insert`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
  pub from:   usize,
  pub to:     usize,
  pub insert: Tendril,
}

impl Change {
  pub fn new(from: usize, to: usize, insert: impl Into<Tendril>) -> Self {
    Self {
      from,
      to,
      insert: insert.into(),
    }
  }

  /// Pure insertion at `at`.
  pub fn insert(at: usize, text: impl Into<Tendril>) -> Self {
    Self::new(at, at, text)
  }

  /// Pure deletion of `[from, to)`.
  pub fn delete(from: usize, to: usize) -> Self {
    Self::new(from, to, Tendril::new())
  }

  pub fn replace(from: usize, to: usize, text: impl Into<Tendril>) -> Self {
    Self::new(from, to, text)
  }

  #[inline]
  pub fn delete_len(&self) -> usize {
    self.to.saturating_sub(self.from)
  }

  #[inline]
  pub fn insert_len(&self) -> usize {
    self.insert.chars().count()
  }

  #[inline]
  pub fn length_delta(&self) -> isize {
    self.insert_len() as isize - self.delete_len() as isize
  }

  /// Neither deletes nor inserts anything.
  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.from == self.to && self.insert.is_empty()
  }
}

impl From<(usize, usize, Option<Tendril>)> for Change {
  fn from((from, to, insert): (usize, usize, Option<Tendril>)) -> Self {
    Self {
      from,
      to,
      insert: insert.unwrap_or_default(),
    }
  }
}

impl From<(usize, usize, &str)> for Change {
  fn from((from, to, insert): (usize, usize, &str)) -> Self {
    Self::new(from, to, insert)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
  /// Move cursor by n characters.
  Retain(usize),

  /// Delete n characters.
  Delete(usize),

  /// Insert text at position.
  Insert(Tendril),
}

impl Operation {
  pub fn len_chars(&self) -> usize {
    match self {
      Operation::Retain(n) | Operation::Delete(n) => *n,
      Operation::Insert(s) => s.chars().count(),
    }
  }
}

/// Which side of an ambiguous boundary a mapped offset sticks to.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Assoc {
  /// Stay before text inserted at the offset.
  Before,
  /// Move past text inserted at the offset.
  #[default]
  After,
}

impl Assoc {
  /// Negative values associate before, everything else after.
  pub const fn from_sign(sign: i32) -> Self {
    if sign < 0 { Assoc::Before } else { Assoc::After }
  }
}

#[inline]
fn shift(pos: usize, delta: isize) -> usize {
  pos.saturating_add_signed(delta)
}

fn validate_change_bounds(from: usize, to: usize, len: usize) -> Result<()> {
  if from > to {
    return Err(ChangeError::InvalidRange { from, to });
  }
  if to > len {
    return Err(ChangeError::RangeOutOfBounds { from, to, len });
  }
  Ok(())
}

/// An ordered set of changes against a document of `original_len` chars.
/// INVARIANT: changes are sorted by `from`, do not overlap, and none of them
/// is empty.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawChangeSet")]
pub struct ChangeSet {
  changes:   Vec<Change>,
  len:       usize,
  len_after: usize,
}

/// Wire shape of a [`ChangeSet`]; decoding goes through [`ChangeSet::of`] so
/// the invariants hold for deserialized sets too. `len_after` is recomputed.
#[derive(Deserialize)]
struct RawChangeSet {
  changes: Vec<Change>,
  len:     usize,
}

impl TryFrom<RawChangeSet> for ChangeSet {
  type Error = ChangeError;

  fn try_from(raw: RawChangeSet) -> Result<Self> {
    ChangeSet::of(raw.changes, raw.len)
  }
}

impl ChangeSet {
  /// A change set that leaves a document of `len` chars untouched.
  pub fn empty(len: usize) -> Self {
    Self {
      changes:   Vec::new(),
      len,
      len_after: len,
    }
  }

  /// Build a change set from changes in any order.
  ///
  /// Changes are sorted by `(from, to)` (stable, so insertions at the same
  /// offset keep their given order), empty changes are dropped, and the
  /// remaining ones must fit in `len` without overlapping.
  pub fn of<I>(changes: I, len: usize) -> Result<Self>
  where
    I: IntoIterator,
    I::Item: Into<Change>,
  {
    let mut changes: Vec<Change> = changes
      .into_iter()
      .map(Into::into)
      .filter(|change| !change.is_empty())
      .collect();
    changes.sort_by_key(|change| (change.from, change.to));

    let mut last = 0;
    let mut len_after = len as isize;
    for change in &changes {
      validate_change_bounds(change.from, change.to, len)?;
      if change.from < last {
        return Err(ChangeError::OverlappingRange {
          prev_end: last,
          from:     change.from,
          to:       change.to,
        });
      }
      last = change.to;
      len_after += change.length_delta();
    }

    Ok(Self {
      changes,
      len,
      len_after: len_after as usize,
    })
  }

  /// Length of the document this change set applies to.
  #[inline]
  pub fn original_len(&self) -> usize {
    self.len
  }

  /// Length of the document after applying this change set.
  #[inline]
  pub fn new_len(&self) -> usize {
    self.len_after
  }

  #[inline]
  pub fn changes(&self) -> &[Change] {
    &self.changes
  }

  #[inline]
  pub fn iter(&self) -> std::slice::Iter<'_, Change> {
    self.changes.iter()
  }

  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.changes.is_empty()
  }

  /// The equivalent retain/delete/insert sequence covering the whole
  /// original document.
  pub fn operations(&self) -> Vec<Operation> {
    let mut builder = OperationBuilder::with_capacity(2 * self.changes.len() + 1);
    let mut last = 0;
    for change in &self.changes {
      builder.retain(change.from - last);
      builder.insert(change.insert.clone());
      builder.delete(change.delete_len());
      last = change.to;
    }
    builder.retain(self.len - last);
    builder.ops
  }

  /// Map an offset in the original document to the changed one.
  ///
  /// Offsets before a change are shifted by the net length change of the
  /// changes preceding them. An offset touching a change (anywhere from its
  /// `from` up to, but not including, the end of its deleted range; or
  /// exactly at a pure insertion) lands before the inserted text with
  /// [`Assoc::Before`] and after it with [`Assoc::After`]. Insertions stacked
  /// at the same offset are all skipped by `After`.
  pub fn map_offset(&self, offset: usize, assoc: Assoc) -> usize {
    let mut delta = 0isize;

    for change in &self.changes {
      if offset < change.from {
        break;
      }
      let past = offset > change.to || (offset == change.to && change.to > change.from);
      if past {
        delta += change.length_delta();
        continue;
      }

      let start = shift(change.from, delta);
      match assoc {
        Assoc::Before => return start,
        Assoc::After if change.from == change.to => delta += change.length_delta(),
        Assoc::After => return start + change.insert_len(),
      }
    }

    shift(offset, delta)
  }

  /// Combine two change sets: applying the result is equivalent to applying
  /// `self` and then `other`.
  pub fn compose(self, other: Self) -> Result<Self> {
    // An empty side is an identity whatever length it was built for.
    if self.is_empty() {
      return Ok(other);
    }
    if other.is_empty() {
      return Ok(self);
    }

    // The output length of the first must match the input length of the second.
    if self.len_after != other.len {
      return Err(ChangeError::ComposeLengthMismatch {
        left_len_after: self.len_after,
        right_len:      other.len,
      });
    }

    let len = self.len;
    let ops_a = self.operations();
    let capacity = ops_a.len();
    let mut changes_a = ops_a.into_iter();
    let mut changes_b = other.operations().into_iter();

    let mut head_a = changes_a.next();
    let mut head_b = changes_b.next();

    let mut changes = OperationBuilder::with_capacity(capacity);

    loop {
      use std::cmp::Ordering;

      use Operation::*;
      match (head_a, head_b) {
        // we are done
        (None, None) => {
          break;
        },
        // deletion in A
        (Some(Delete(i)), b) => {
          changes.delete(i);
          head_a = changes_a.next();
          head_b = b;
        },
        // insertion in B
        (a, Some(Insert(current))) => {
          changes.insert(current);
          head_a = a;
          head_b = changes_b.next();
        },
        (None, val) | (val, None) => unreachable!("({:?})", val),
        (Some(Retain(i)), Some(Retain(j))) => {
          match i.cmp(&j) {
            Ordering::Less => {
              changes.retain(i);
              head_a = changes_a.next();
              head_b = Some(Retain(j - i));
            },
            Ordering::Equal => {
              changes.retain(i);
              head_a = changes_a.next();
              head_b = changes_b.next();
            },
            Ordering::Greater => {
              changes.retain(j);
              head_a = Some(Retain(i - j));
              head_b = changes_b.next();
            },
          }
        },
        (Some(Insert(mut s)), Some(Delete(j))) => {
          let len = s.chars().count();
          match len.cmp(&j) {
            Ordering::Less => {
              head_a = changes_a.next();
              head_b = Some(Delete(j - len));
            },
            Ordering::Equal => {
              head_a = changes_a.next();
              head_b = changes_b.next();
            },
            Ordering::Greater => {
              // drop the deleted prefix of the insertion
              let (pos, _) = s.char_indices().nth(j).unwrap();
              s.replace_range(0..pos, "");
              head_a = Some(Insert(s));
              head_b = changes_b.next();
            },
          }
        },
        (Some(Insert(s)), Some(Retain(j))) => {
          let len = s.chars().count();
          match len.cmp(&j) {
            Ordering::Less => {
              changes.insert(s);
              head_a = changes_a.next();
              head_b = Some(Retain(j - len));
            },
            Ordering::Equal => {
              changes.insert(s);
              head_a = changes_a.next();
              head_b = changes_b.next();
            },
            Ordering::Greater => {
              // figure out the byte index of the truncated string end
              let (pos, _) = s.char_indices().nth(j).unwrap();
              let mut before = s;
              let after = before.split_off(pos);

              changes.insert(before);
              head_a = Some(Insert(after));
              head_b = changes_b.next();
            },
          }
        },
        (Some(Retain(i)), Some(Delete(j))) => {
          match i.cmp(&j) {
            Ordering::Less => {
              changes.delete(i);
              head_a = changes_a.next();
              head_b = Some(Delete(j - i));
            },
            Ordering::Equal => {
              changes.delete(j);
              head_a = changes_a.next();
              head_b = changes_b.next();
            },
            Ordering::Greater => {
              changes.delete(j);
              head_a = Some(Retain(i - j));
              head_b = changes_b.next();
            },
          }
        },
      };
    }

    debug_assert!(changes.len == len);

    Ok(changes.finish())
  }

  /// Returns a change set that reverts this one, for undo. `original_doc`
  /// must be the document *before* this change set was applied, since the
  /// change set itself does not carry the deleted text.
  pub fn invert(&self, original_doc: &Rope) -> Result<Self> {
    if self.changes.is_empty() {
      return Ok(Self::empty(self.len_after));
    }

    self.ensure_len(original_doc.len_chars())?;

    let mut delta = 0isize;
    let changes = self
      .changes
      .iter()
      .map(|change| {
        let from = shift(change.from, delta);
        delta += change.length_delta();
        let deleted = Cow::from(original_doc.slice(change.from..change.to));
        Change::new(from, from + change.insert_len(), deleted.as_ref())
      })
      .collect();

    Ok(Self {
      changes,
      len: self.len_after,
      len_after: self.len,
    })
  }

  fn ensure_len(&self, text_len: usize) -> Result<()> {
    if text_len != self.len {
      return Err(ChangeError::LengthMismatch {
        expected: self.len,
        actual:   text_len,
      });
    }
    Ok(())
  }

  /// Apply this change set in-place.
  ///
  /// Changes are applied in ascending order; a running offset corrects each
  /// change's original coordinates for the edits already made.
  pub fn apply(&self, text: &mut Rope) -> Result<()> {
    self.ensure_len(text.len_chars())?;
    let mut delta = 0isize;

    for change in &self.changes {
      let from = shift(change.from, delta);
      if change.to > change.from {
        text.remove(from..from + change.delete_len());
      }
      if !change.insert.is_empty() {
        text.insert(from, &change.insert);
      }
      delta += change.length_delta();
    }

    Ok(())
  }

  /// Apply this change set to a rope and return the updated rope.
  pub fn apply_to(&self, text: &Rope) -> Result<Rope> {
    self.ensure_len(text.len_chars())?;
    if self.is_empty() {
      return Ok(text.clone());
    }

    let mut builder = RopeBuilder::new();
    let mut pos = 0;

    let append_slice = |from: usize, to: usize, builder: &mut RopeBuilder| {
      if from >= to {
        return;
      }
      let slice = text.slice(from..to);
      for chunk in slice.chunks() {
        builder.append(chunk);
      }
    };

    for change in &self.changes {
      append_slice(pos, change.from, &mut builder);
      builder.append(change.insert.as_str());
      pos = change.to;
    }

    append_slice(pos, self.len, &mut builder);

    Ok(builder.finish())
  }
}

impl<'a> IntoIterator for &'a ChangeSet {
  type IntoIter = std::slice::Iter<'a, Change>;
  type Item = &'a Change;

  fn into_iter(self) -> Self::IntoIter {
    self.changes.iter()
  }
}

/// Accumulates operations, merging neighbours of the same kind and keeping
/// an insertion ahead of a deletion at the same point.
struct OperationBuilder {
  ops:       Vec<Operation>,
  len:       usize,
  len_after: usize,
}

impl OperationBuilder {
  fn with_capacity(capacity: usize) -> Self {
    Self {
      ops:       Vec::with_capacity(capacity),
      len:       0,
      len_after: 0,
    }
  }

  fn delete(&mut self, n: usize) {
    use Operation::*;

    if n == 0 {
      return;
    }

    self.len += n;

    if let Some(Delete(count)) = self.ops.last_mut() {
      *count += n;
    } else {
      self.ops.push(Delete(n))
    }
  }

  fn insert(&mut self, fragment: Tendril) {
    use Operation::*;

    if fragment.is_empty() {
      return;
    }

    self.len_after += fragment.chars().count();

    let new_last = match self.ops.as_mut_slice() {
      [.., Insert(prev)] | [.., Insert(prev), Delete(_)] => {
        prev.push_str(&fragment);
        return;
      },
      [.., last @ Delete(_)] => std::mem::replace(last, Insert(fragment)),
      _ => Insert(fragment),
    };

    self.ops.push(new_last);
  }

  fn retain(&mut self, n: usize) {
    use Operation::*;

    if n == 0 {
      return;
    }

    self.len += n;
    self.len_after += n;

    if let Some(Retain(count)) = self.ops.last_mut() {
      *count += n;
    } else {
      self.ops.push(Retain(n))
    }
  }

  /// Turn the operation sequence back into positioned changes.
  fn finish(self) -> ChangeSet {
    use Operation::*;

    let mut changes = Vec::new();
    let mut pos = 0;
    let mut iter = self.ops.into_iter().peekable();

    while let Some(op) = iter.next() {
      match op {
        Retain(len) => pos += len,
        Delete(len) => {
          changes.push(Change::delete(pos, pos + len));
          pos += len;
        },
        Insert(s) => {
          // a subsequent delete means a replace, consume it
          let to = match iter.peek() {
            Some(Delete(len)) => pos + *len,
            _ => pos,
          };
          if to > pos {
            iter.next();
          }
          changes.push(Change::new(pos, to, s));
          pos = to;
        },
      }
    }

    ChangeSet {
      changes,
      len: self.len,
      len_after: self.len_after,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  /// Turn arbitrary seeds into sorted, non-overlapping changes over `len`.
  fn changes_from_seed(len: usize, seed: &[(u8, u8, String)]) -> Vec<Change> {
    let mut cursor = 0;
    let mut changes = Vec::new();
    for (skip, delete, insert) in seed {
      let from = (cursor + *skip as usize % 4).min(len);
      let to = (from + *delete as usize % 4).min(len);
      let insert: String = insert.chars().take(4).collect();
      changes.push(Change::new(from, to, insert.as_str()));
      cursor = to;
    }
    changes
  }

  #[test]
  fn new_len_sums_deltas() {
    let cs = ChangeSet::of([Change::insert(0, "ab"), Change::delete(5, 8)], 10).unwrap();
    assert_eq!(cs.new_len(), 9);
    assert_eq!(cs.original_len(), 10);
  }

  #[test]
  fn of_sorts_and_drops_empty_changes() {
    let cs = ChangeSet::of(
      vec![
        Change::replace(6, 8, "x"),
        Change::delete(1, 1),
        Change::insert(2, "y"),
      ],
      10,
    )
    .unwrap();
    assert_eq!(cs.changes(), &[Change::insert(2, "y"), Change::replace(6, 8, "x")]);
  }

  #[test]
  fn of_rejects_bad_ranges() {
    assert_eq!(
      ChangeSet::of([Change::delete(4, 2)], 10).unwrap_err(),
      ChangeError::InvalidRange { from: 4, to: 2 }
    );
    assert_eq!(
      ChangeSet::of([Change::delete(4, 12)], 10).unwrap_err(),
      ChangeError::RangeOutOfBounds {
        from: 4,
        to:   12,
        len:  10,
      }
    );
    assert_eq!(
      ChangeSet::of([Change::delete(2, 6), Change::delete(4, 8)], 10).unwrap_err(),
      ChangeError::OverlappingRange {
        prev_end: 6,
        from:     4,
        to:       8,
      }
    );
  }

  #[test]
  fn map_offset() {
    // maps inserts
    let cs = ChangeSet::of([Change::insert(5, "hello")], 20).unwrap();
    assert_eq!(cs.map_offset(0, Assoc::After), 0);
    assert_eq!(cs.map_offset(5, Assoc::After), 10);
    assert_eq!(cs.map_offset(5, Assoc::Before), 5);
    assert_eq!(cs.map_offset(6, Assoc::Before), 11);
    assert_eq!(cs.map_offset(20, Assoc::Before), 25);

    // maps deletes
    let cs = ChangeSet::of([Change::delete(4, 8)], 12).unwrap();
    assert_eq!(cs.map_offset(4, Assoc::Before), 4);
    assert_eq!(cs.map_offset(5, Assoc::Before), 4);
    assert_eq!(cs.map_offset(5, Assoc::After), 4);
    assert_eq!(cs.map_offset(8, Assoc::Before), 4);
    assert_eq!(cs.map_offset(9, Assoc::Before), 5);

    // replacements
    let cs = ChangeSet::of([Change::replace(2, 4, "xyz")], 6).unwrap();
    assert_eq!(cs.map_offset(2, Assoc::Before), 2);
    assert_eq!(cs.map_offset(2, Assoc::After), 5);
    assert_eq!(cs.map_offset(3, Assoc::Before), 2);
    assert_eq!(cs.map_offset(3, Assoc::After), 5);
    assert_eq!(cs.map_offset(4, Assoc::Before), 5);
    assert_eq!(cs.map_offset(6, Assoc::After), 7);
  }

  #[test]
  fn map_offset_past_stacked_insertions() {
    let cs = ChangeSet::of([Change::insert(3, "ab"), Change::insert(3, "cd")], 5).unwrap();
    assert_eq!(cs.map_offset(3, Assoc::Before), 3);
    assert_eq!(cs.map_offset(3, Assoc::After), 7);
  }

  #[test]
  fn map_offset_accumulates_delta() {
    let cs = ChangeSet::of(
      [Change::insert(0, "ab"), Change::delete(5, 8), Change::insert(9, "!")],
      10,
    )
    .unwrap();
    assert_eq!(cs.map_offset(2, Assoc::After), 4);
    assert_eq!(cs.map_offset(8, Assoc::After), 7);
    assert_eq!(cs.map_offset(9, Assoc::Before), 8);
    assert_eq!(cs.map_offset(9, Assoc::After), 9);
    assert_eq!(cs.map_offset(10, Assoc::After), 10);
  }

  #[test]
  fn assoc_from_sign() {
    assert_eq!(Assoc::from_sign(-1), Assoc::Before);
    assert_eq!(Assoc::from_sign(0), Assoc::After);
    assert_eq!(Assoc::from_sign(1), Assoc::After);
  }

  #[test]
  fn apply_in_ascending_order() {
    let mut doc = Rope::from("hello world!\ntest 123");
    // (1, 1, None) is a useless 0-width delete that gets factored out
    let changes: Vec<(usize, usize, Option<Tendril>)> =
      vec![(1, 1, None), (6, 11, Some("void".into())), (12, 17, None)];
    let cs = ChangeSet::of(changes, doc.len_chars()).unwrap();
    assert_eq!(cs.changes().len(), 2);
    cs.apply(&mut doc).unwrap();
    assert_eq!(doc, Rope::from_str("hello void! 123"));
  }

  #[test]
  fn apply_to_matches_in_place() {
    let doc = Rope::from("hello world!");
    let cs = ChangeSet::of(
      [Change::replace(6, 11, "void"), Change::insert(12, "!!")],
      doc.len_chars(),
    )
    .unwrap();

    let mut in_place = doc.clone();
    cs.apply(&mut in_place).unwrap();
    let persistent = cs.apply_to(&doc).unwrap();

    assert_eq!(in_place, persistent);
    assert_eq!(persistent, Rope::from("hello void!!!"));
    assert_eq!(doc, Rope::from("hello world!"));
  }

  #[test]
  fn apply_errors_on_length_mismatch() {
    let cs = ChangeSet::empty(5);
    let mut other = Rope::from("nope");

    let err = cs.apply(&mut other).unwrap_err();
    assert!(matches!(err, ChangeError::LengthMismatch {
      expected: 5,
      actual:   4,
    }));
    let err = cs.apply_to(&other).unwrap_err();
    assert!(matches!(err, ChangeError::LengthMismatch {
      expected: 5,
      actual:   4,
    }));
    assert_eq!(other, Rope::from("nope"));
  }

  #[test]
  fn operations_cover_the_document() {
    use Operation::*;

    let cs = ChangeSet::of(
      [Change::replace(4, 9, "test"), Change::insert(12, "!")],
      12,
    )
    .unwrap();
    assert_eq!(cs.operations(), vec![
      Retain(4),
      Insert("test".into()),
      Delete(5),
      Retain(3),
      Insert("!".into()),
    ]);
  }

  #[test]
  fn composition() {
    let a = ChangeSet::of([Change::insert(5, " test!"), Change::replace(6, 8, "abc")], 8).unwrap();
    assert_eq!(a.new_len(), 15);

    let b = ChangeSet::of([Change::replace(0, 10, "世orld")], 15).unwrap();

    let mut text = Rope::from("hello xz");
    let composed = a.compose(b).unwrap();
    assert_eq!(composed.original_len(), 8);
    assert_eq!(composed.new_len(), 10);
    composed.apply(&mut text).unwrap();
    assert_eq!(text, "世orld! abc");
  }

  #[test]
  fn compose_with_empty_returns_operand() {
    let x = ChangeSet::of([Change::insert(0, "a")], 3).unwrap();
    let empty = ChangeSet::empty(3);
    assert_eq!(empty.compose(x.clone()).unwrap(), x);

    let empty_after = ChangeSet::empty(4);
    assert_eq!(x.clone().compose(empty_after).unwrap(), x);
  }

  #[test]
  fn compose_with_empty_ignores_its_length() {
    let x = ChangeSet::of([Change::insert(0, "a")], 5).unwrap();
    assert_eq!(ChangeSet::empty(0).compose(x.clone()).unwrap(), x);
    assert_eq!(x.clone().compose(ChangeSet::empty(0)).unwrap(), x);
  }

  #[test]
  fn compose_length_mismatch() {
    let a = ChangeSet::of([Change::insert(0, "a")], 3).unwrap();
    let b = ChangeSet::of([Change::delete(0, 1)], 3).unwrap();
    assert_eq!(a.compose(b).unwrap_err(), ChangeError::ComposeLengthMismatch {
      left_len_after: 4,
      right_len:      3,
    });
  }

  #[test]
  fn combine_with_utf8() {
    const TEST_CASE: &str = "Hello, これはヘリックスエディターです！";

    let a = ChangeSet::empty(0);
    let b = ChangeSet::of([Change::insert(0, TEST_CASE)], 0).unwrap();

    let changes = a.compose(b).unwrap();

    assert_eq!(changes.changes(), &[Change::insert(0, TEST_CASE)]);
    assert_eq!(changes.new_len(), TEST_CASE.chars().count());
  }

  #[test]
  fn invert() {
    let changes = ChangeSet::of([Change::replace(4, 9, "test")], 12).unwrap();
    assert_eq!(changes.new_len(), 11);

    let doc = Rope::from("世界3 hello xz");
    let revert = changes.invert(&doc).unwrap();
    assert_eq!(revert.changes(), &[Change::replace(4, 8, "hello")]);

    let mut doc2 = doc.clone();
    changes.apply(&mut doc2).unwrap();

    // a revert is different
    assert_ne!(changes, revert);
    assert_ne!(doc, doc2);

    // but inverting a revert will give us the original
    assert_eq!(changes, revert.invert(&doc2).unwrap());

    // applying a revert gives us back the original
    revert.apply(&mut doc2).unwrap();
    assert_eq!(doc, doc2);
  }

  #[test]
  fn invert_shifts_later_changes() {
    let doc = Rope::from("0123456789");
    let cs = ChangeSet::of([Change::insert(0, "ab"), Change::delete(5, 8)], 10).unwrap();
    let revert = cs.invert(&doc).unwrap();
    assert_eq!(revert.changes(), &[
      Change::delete(0, 2),
      Change::insert(7, "567")
    ]);
    assert_eq!(revert.original_len(), 9);
    assert_eq!(revert.new_len(), 10);
  }

  #[test]
  fn invert_empty_changeset_is_identity() {
    let doc = Rope::from("hello");
    let changes = ChangeSet::empty(doc.len_chars());
    let invert = changes.invert(&doc).unwrap();

    let updated = invert.apply_to(&doc).unwrap();
    assert_eq!(updated, doc);
    assert_eq!(invert.original_len(), doc.len_chars());
  }

  #[test]
  fn deserialize_validates_changes() {
    let set = ChangeSet::of([Change::replace(1, 2, "xy")], 3).unwrap();
    let json = serde_json::to_string(&set).unwrap();
    assert_eq!(serde_json::from_str::<ChangeSet>(&json).unwrap(), set);

    // out of bounds for the declared length
    let out_of_bounds = r#"{"changes":[{"from":8,"to":9,"insert":""}],"len":3,"len_after":2}"#;
    assert!(serde_json::from_str::<ChangeSet>(out_of_bounds).is_err());

    let overlapping =
      r#"{"changes":[{"from":0,"to":2,"insert":""},{"from":1,"to":3,"insert":""}],"len":3}"#;
    assert!(serde_json::from_str::<ChangeSet>(overlapping).is_err());

    // a forged `len_after` is recomputed, so composing stays consistent
    let forged: ChangeSet =
      serde_json::from_str(r#"{"changes":[{"from":0,"to":0,"insert":"a"}],"len":3,"len_after":7}"#)
        .unwrap();
    assert_eq!(forged.new_len(), 4);
    let next = ChangeSet::of([Change::delete(3, 4)], 4).unwrap();
    let doc = Rope::from("abc");
    let composed = forged.compose(next).unwrap();
    assert_eq!(composed.apply_to(&doc).unwrap().to_string(), "aab");
  }

  quickcheck::quickcheck! {
      fn new_len_matches_applied(doc: String, seed: Vec<(u8, u8, String)>) -> bool {
          let doc = Rope::from(doc);
          let len = doc.len_chars();
          let changes = changes_from_seed(len, &seed);
          let expected = changes
            .iter()
            .fold(len as isize, |acc, change| acc + change.length_delta());
          let cs = ChangeSet::of(changes, len).unwrap();
          let applied = cs.apply_to(&doc).unwrap();
          cs.new_len() as isize == expected && applied.len_chars() == cs.new_len()
      }

      fn map_offset_is_monotonic(doc: String, seed: Vec<(u8, u8, String)>, before: bool) -> bool {
          let len = Rope::from(doc).len_chars();
          let cs = ChangeSet::of(changes_from_seed(len, &seed), len).unwrap();
          let assoc = if before { Assoc::Before } else { Assoc::After };
          (0..len)
            .all(|offset| cs.map_offset(offset, assoc) <= cs.map_offset(offset + 1, assoc))
      }

      fn invert_restores_document(doc: String, seed: Vec<(u8, u8, String)>) -> bool {
          let original = Rope::from(doc);
          let len = original.len_chars();
          let cs = ChangeSet::of(changes_from_seed(len, &seed), len).unwrap();
          let changed = cs.apply_to(&original).unwrap();
          let restored = cs.invert(&original).unwrap().apply_to(&changed).unwrap();
          restored == original
      }

      fn compose_matches_sequential_apply(
          doc: String,
          first: Vec<(u8, u8, String)>,
          second: Vec<(u8, u8, String)>
      ) -> bool {
          let doc = Rope::from(doc);
          let a = ChangeSet::of(changes_from_seed(doc.len_chars(), &first), doc.len_chars()).unwrap();
          let mid = a.apply_to(&doc).unwrap();
          let b = ChangeSet::of(changes_from_seed(mid.len_chars(), &second), mid.len_chars()).unwrap();
          let expected = b.apply_to(&mid).unwrap();
          let composed = a.compose(b).unwrap();
          composed.apply_to(&doc).unwrap() == expected
      }
  }
}
