//! Linear undo/redo.
//!
//! [`History`] records applied updates that changed the document and can
//! produce the transaction that reverts (or re-applies) the latest one. It
//! is not part of [`EditorState`]; hosts usually feed it from an update
//! listener:
//!
//! ```
//! use std::sync::{
//!   Arc,
//!   Mutex,
//! };
//!
//! use the_state::{
//!   EditorState,
//!   EditorStateConfig,
//!   Extension,
//!   History,
//!   TransactionSpec,
//! };
//!
//! let history = Arc::new(Mutex::new(History::default()));
//! let recorder = Arc::clone(&history);
//! let state = EditorState::create(EditorStateConfig::new("hello").with_extension(
//!   Extension::new("history").update_listener(move |update| {
//!     recorder.lock().unwrap().commit(update).unwrap();
//!   }),
//! ));
//!
//! let edited = state.update(TransactionSpec::new().insert(5, "!")).unwrap();
//! let undo = history.lock().unwrap().undo(&edited).unwrap().unwrap();
//! let reverted = edited.apply(undo).unwrap();
//! assert_eq!(reverted.doc().to_string(), "hello");
//! ```

use std::collections::VecDeque;

use thiserror::Error;

use crate::{
  change::{
    ChangeError,
    ChangeSet,
  },
  extension::StateUpdate,
  selection::SelectionSet,
  state::EditorState,
  transaction::Transaction,
};

/// Entries kept before the oldest one is dropped.
pub const MAX_HISTORY_SIZE: usize = 1000;

pub const UNDO_EVENT: &str = "undo";
pub const REDO_EVENT: &str = "redo";

pub type Result<T> = std::result::Result<T, HistoryError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum HistoryError {
  #[error(transparent)]
  Change(#[from] ChangeError),
  #[error("history expects a document of length {expected}, got {actual}")]
  Diverged { expected: usize, actual: usize },
}

#[derive(Debug, Clone)]
struct Entry {
  changes:          ChangeSet,
  inversion:        ChangeSet,
  selection_before: SelectionSet,
  selection_after:  SelectionSet,
}

#[derive(Debug, Clone)]
pub struct History {
  undo_stack: VecDeque<Entry>,
  redo_stack: Vec<Entry>,
  capacity:   usize,
}

impl Default for History {
  fn default() -> Self {
    Self::with_capacity(MAX_HISTORY_SIZE)
  }
}

impl History {
  /// A history keeping at most `capacity` undo entries (at least one).
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      undo_stack: VecDeque::new(),
      redo_stack: Vec::new(),
      capacity:   capacity.max(1),
    }
  }

  /// Record an applied update.
  ///
  /// Updates that leave the document alone, and the undo/redo transactions
  /// this history hands out, are not recorded. Recording clears the redo
  /// stack.
  pub fn commit(&mut self, update: &StateUpdate<'_>) -> Result<()> {
    let transaction = update.transaction;
    if !transaction.doc_changed()
      || transaction.is_user_event(UNDO_EVENT)
      || transaction.is_user_event(REDO_EVENT)
    {
      return Ok(());
    }

    let inversion = transaction.changes().invert(update.prev_state.doc())?;
    self.redo_stack.clear();
    self.undo_stack.push_back(Entry {
      changes: transaction.changes().clone(),
      inversion,
      selection_before: update.prev_state.selection().clone(),
      selection_after: update.state.selection().clone(),
    });

    if self.undo_stack.len() > self.capacity {
      self.undo_stack.pop_front();
      tracing::trace!(capacity = self.capacity, "dropped oldest history entry");
    }
    Ok(())
  }

  /// The transaction reverting the latest recorded change, or `None` when
  /// there is nothing to undo. The entry moves to the redo stack.
  pub fn undo(&mut self, state: &EditorState) -> Result<Option<Transaction>> {
    let Some(entry) = self.undo_stack.back() else {
      return Ok(None);
    };
    ensure_len(&entry.inversion, state)?;

    let Some(entry) = self.undo_stack.pop_back() else {
      return Ok(None);
    };
    let transaction = Transaction::from(entry.inversion.clone())
      .with_selection(entry.selection_before.clone())
      .with_user_event(UNDO_EVENT);
    self.redo_stack.push(entry);
    Ok(Some(transaction))
  }

  /// The transaction re-applying the latest undone change.
  pub fn redo(&mut self, state: &EditorState) -> Result<Option<Transaction>> {
    let Some(entry) = self.redo_stack.last() else {
      return Ok(None);
    };
    ensure_len(&entry.changes, state)?;

    let Some(entry) = self.redo_stack.pop() else {
      return Ok(None);
    };
    let transaction = Transaction::from(entry.changes.clone())
      .with_selection(entry.selection_after.clone())
      .with_user_event(REDO_EVENT);
    self.undo_stack.push_back(entry);
    Ok(Some(transaction))
  }

  #[inline]
  pub fn can_undo(&self) -> bool {
    !self.undo_stack.is_empty()
  }

  #[inline]
  pub fn can_redo(&self) -> bool {
    !self.redo_stack.is_empty()
  }

  #[inline]
  pub fn undo_depth(&self) -> usize {
    self.undo_stack.len()
  }

  #[inline]
  pub fn redo_depth(&self) -> usize {
    self.redo_stack.len()
  }

  pub fn clear(&mut self) {
    self.undo_stack.clear();
    self.redo_stack.clear();
  }
}

fn ensure_len(changes: &ChangeSet, state: &EditorState) -> Result<()> {
  if changes.original_len() != state.len() {
    return Err(HistoryError::Diverged {
      expected: changes.original_len(),
      actual:   state.len(),
    });
  }
  Ok(())
}
