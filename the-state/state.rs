//! The immutable editor state and the transaction pipeline.
//!
//! An [`EditorState`] is a cheap handle to a shared snapshot: the document
//! rope, the selection, one value per registered state field and the
//! combined extension data. [`EditorState::apply`] runs a transaction
//! through the pipeline and yields a new snapshot; the old one stays valid.
//!
//! Pipeline, in order:
//!
//! 1. transaction filters, in extension order; a veto returns the current
//!    state unchanged (same allocation, see [`EditorState::ptr_eq`]),
//! 2. the change set is applied to the document,
//! 3. the selection is taken from the transaction or mapped through the
//!    changes,
//! 4. every state field derives its next value,
//! 5. update listeners observe the result.

use std::{
  borrow::Cow,
  collections::HashMap,
  fmt,
  sync::Arc,
};

use ropey::Rope;
use thiserror::Error;

use crate::{
  change::ChangeError,
  decoration::{
    Decoration,
    DecorationProvider,
  },
  extension::{
    Extension,
    ExtensionData,
    FieldId,
    FieldValue,
    StateField,
    StateUpdate,
    combine_extensions,
  },
  keymap::{
    KeyCombo,
    KeyOutcome,
    Keymap,
    Platform,
  },
  position::{
    Position,
    char_to_pos,
    line_ending_len,
    pos_to_char,
  },
  selection::SelectionSet,
  transaction::{
    self,
    Transaction,
    TransactionError,
    TransactionSpec,
  },
};

pub type Result<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
  #[error("state field {id} is not registered on this state")]
  UnknownField { id: u64 },
  #[error(transparent)]
  Transaction(#[from] TransactionError),
  #[error(transparent)]
  Change(#[from] ChangeError),
}

/// Everything needed to create a state.
#[derive(Debug, Clone, Default)]
pub struct EditorStateConfig {
  doc:        Rope,
  selection:  Option<SelectionSet>,
  extensions: Vec<Extension>,
}

impl EditorStateConfig {
  pub fn new(doc: impl Into<Rope>) -> Self {
    Self {
      doc: doc.into(),
      ..Self::default()
    }
  }

  #[must_use]
  pub fn with_selection(mut self, selection: impl Into<SelectionSet>) -> Self {
    self.selection = Some(selection.into());
    self
  }

  #[must_use]
  pub fn with_extension(mut self, extension: Extension) -> Self {
    self.extensions.push(extension);
    self
  }

  #[must_use]
  pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = Extension>) -> Self {
    self.extensions.extend(extensions);
    self
  }
}

#[derive(Clone)]
struct Snapshot {
  doc:        Rope,
  selection:  SelectionSet,
  values:     HashMap<FieldId, FieldValue>,
  extensions: Arc<ExtensionData>,
}

#[derive(Clone)]
pub struct EditorState {
  inner: Arc<Snapshot>,
}

impl EditorState {
  /// Combine the configured extensions and create every field in
  /// registration order. A field's `create` can read fields registered
  /// before it.
  pub fn create(config: EditorStateConfig) -> Self {
    let EditorStateConfig {
      doc,
      selection,
      extensions,
    } = config;
    let extensions = Arc::new(combine_extensions(&extensions));

    let mut state = Self {
      inner: Arc::new(Snapshot {
        doc,
        selection: selection.unwrap_or_default(),
        values: HashMap::with_capacity(extensions.state_fields.len()),
        extensions: Arc::clone(&extensions),
      }),
    };

    for field in &extensions.state_fields {
      let value = field.create(&state);
      Arc::make_mut(&mut state.inner)
        .values
        .insert(field.id(), value);
    }

    tracing::debug!(
      len = state.len(),
      fields = extensions.state_fields.len(),
      "created editor state"
    );
    state
  }

  /// Build a transaction against this state's document.
  pub fn transaction(&self, spec: TransactionSpec) -> transaction::Result<Transaction> {
    Transaction::create(self.len(), spec)
  }

  /// Run `transaction` through the pipeline.
  ///
  /// Fails only when the (possibly filtered) change set was built for a
  /// document of a different length.
  pub fn apply(&self, transaction: Transaction) -> Result<EditorState> {
    let extensions = &self.inner.extensions;

    let mut transaction = transaction;
    for (idx, filter) in extensions.transaction_filters.iter().enumerate() {
      match filter(transaction, self) {
        Some(next) => transaction = next,
        None => {
          tracing::debug!(filter = idx, "transaction vetoed");
          return Ok(self.clone());
        },
      }
    }

    let doc = if transaction.doc_changed() {
      transaction.changes().apply_to(&self.inner.doc)?
    } else {
      self.inner.doc.clone()
    };

    let selection = match transaction.selection() {
      Some(selection) => selection.clone(),
      None => {
        self
          .inner
          .selection
          .map(transaction.changes(), self.inner.doc.slice(..), doc.slice(..))
      },
    };

    let values = extensions
      .state_fields
      .iter()
      .filter_map(|field| {
        let prev = self.inner.values.get(&field.id())?;
        Some((field.id(), field.update(prev, &transaction)))
      })
      .collect();

    let state = Self {
      inner: Arc::new(Snapshot {
        doc,
        selection,
        values,
        extensions: Arc::clone(extensions),
      }),
    };

    tracing::trace!(
      doc_changed = transaction.doc_changed(),
      selection_set = transaction.selection_changed(),
      effects = transaction.effects().len(),
      user_event = transaction.user_event(),
      "applied transaction"
    );

    let update = StateUpdate {
      state:       &state,
      prev_state:  self,
      transaction: &transaction,
    };
    for listener in &extensions.update_listeners {
      listener(&update);
    }

    Ok(state)
  }

  /// Build and apply a transaction in one step.
  pub fn update(&self, spec: TransactionSpec) -> Result<EditorState> {
    let transaction = self.transaction(spec)?;
    self.apply(transaction)
  }

  /// Whether both handles point at the same snapshot.
  #[inline]
  pub fn ptr_eq(a: &Self, b: &Self) -> bool {
    Arc::ptr_eq(&a.inner, &b.inner)
  }

  #[inline]
  pub fn doc(&self) -> &Rope {
    &self.inner.doc
  }

  #[inline]
  pub fn selection(&self) -> &SelectionSet {
    &self.inner.selection
  }

  /// Document length in chars.
  #[inline]
  pub fn len(&self) -> usize {
    self.inner.doc.len_chars()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Number of lines; an empty document has one line.
  #[inline]
  pub fn line_count(&self) -> usize {
    self.inner.doc.len_lines()
  }

  /// Text of `line` without its line ending.
  pub fn line(&self, line: usize) -> Option<Cow<'_, str>> {
    if line >= self.line_count() {
      return None;
    }
    let slice = self.inner.doc.line(line);
    let end = slice.len_chars() - line_ending_len(slice);
    Some(slice.slice(..end).into())
  }

  /// Text between two char offsets. Offsets are clamped to the document.
  pub fn slice_doc(&self, from: usize, to: usize) -> Cow<'_, str> {
    let to = to.min(self.len());
    let from = from.min(to);
    self.inner.doc.slice(from..to).into()
  }

  /// Char offset of `pos`, or `None` when its line does not exist. A column
  /// past the end of the line resolves to the end of the line content.
  pub fn position_to_offset(&self, pos: Position) -> Option<usize> {
    if pos.line >= self.line_count() {
      return None;
    }
    Some(pos_to_char(self.inner.doc.slice(..), pos))
  }

  pub fn offset_to_position(&self, offset: usize) -> Position {
    char_to_pos(self.inner.doc.slice(..), offset)
  }

  pub fn extensions(&self) -> &ExtensionData {
    &self.inner.extensions
  }

  pub fn field<T: 'static>(&self, field: &StateField<T>) -> Result<&T> {
    self
      .try_field(field)
      .ok_or(StateError::UnknownField {
        id: field.id().get(),
      })
  }

  pub fn try_field<T: 'static>(&self, field: &StateField<T>) -> Option<&T> {
    self
      .inner
      .values
      .get(&field.id())
      .and_then(|value| value.downcast_ref())
  }

  pub fn field_or_default<T: Clone + Default + 'static>(&self, field: &StateField<T>) -> T {
    self.try_field(field).cloned().unwrap_or_default()
  }

  #[inline]
  pub fn keymap(&self) -> &Keymap {
    &self.inner.extensions.keymap
  }

  #[inline]
  pub fn decoration_providers(&self) -> &[DecorationProvider] {
    &self.inner.extensions.decoration_providers
  }

  /// Decorations from every provider, in provider order.
  pub fn decorations(&self) -> Vec<Decoration> {
    self
      .decoration_providers()
      .iter()
      .flat_map(|provider| provider(self))
      .collect()
  }

  /// Resolve a key press against the combined keymap.
  pub fn run_key(&self, key: &KeyCombo, platform: Platform) -> KeyOutcome {
    self.keymap().run(self, key, platform)
  }
}

impl Default for EditorState {
  fn default() -> Self {
    Self::create(EditorStateConfig::default())
  }
}

impl fmt::Debug for EditorState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EditorState")
      .field("len", &self.len())
      .field("selection", &self.inner.selection)
      .field("fields", &self.inner.values.len())
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod test {
  use std::sync::atomic::{
    AtomicUsize,
    Ordering,
  };

  use parking_lot::Mutex;

  use super::*;
  use crate::{
    change::ChangeSet,
    decoration::WidgetSide,
    keymap::{
      Key,
      KeyBinding,
      Modifiers,
    },
    selection::SelectionRange,
    transaction::StateEffectType,
  };

  fn state(doc: &str) -> EditorState {
    EditorState::create(EditorStateConfig::new(doc))
  }

  #[test]
  fn insert_at_end() {
    let state = state("hello");
    let tr = state
      .transaction(TransactionSpec::new().insert(5, " world"))
      .unwrap();
    let next = state.apply(tr).unwrap();

    assert_eq!(next.doc().to_string(), "hello world");
    assert_eq!(state.doc().to_string(), "hello");
    assert_eq!(next.len(), 11);
  }

  #[test]
  fn delete_range() {
    let next = state("hello world")
      .update(TransactionSpec::new().delete(5, 11))
      .unwrap();
    assert_eq!(next.doc().to_string(), "hello");
  }

  #[test]
  fn default_selection_is_cursor_at_start() {
    let state = state("abc");
    assert_eq!(state.selection().len(), 1);
    assert_eq!(state.selection().main(), SelectionRange::cursor((0, 0)));
  }

  #[test]
  fn selection_is_mapped_or_replaced() {
    let state = EditorState::create(
      EditorStateConfig::new("hello world").with_selection(SelectionSet::cursor((0, 6))),
    );

    let mapped = state
      .update(TransactionSpec::new().insert(0, ">> "))
      .unwrap();
    assert_eq!(mapped.selection().main(), SelectionRange::cursor((0, 9)));

    let explicit = state
      .update(
        TransactionSpec::new()
          .insert(0, ">> ")
          .selection(SelectionSet::single((0, 0), (0, 2))),
      )
      .unwrap();
    assert_eq!(
      explicit.selection().main(),
      SelectionRange::new((0, 0), (0, 2))
    );
  }

  #[test]
  fn veto_returns_same_state() {
    let listened = Arc::new(AtomicUsize::new(0));
    let filtered = Arc::new(AtomicUsize::new(0));
    let updated = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&listened);
    let filter_counter = Arc::clone(&filtered);
    let update_counter = Arc::clone(&updated);
    let field = StateField::define(
      |_| 0usize,
      move |value: &usize, _| {
        update_counter.fetch_add(1, Ordering::SeqCst);
        value + 1
      },
    );
    let state = EditorState::create(
      EditorStateConfig::new("read only")
        .with_extension(
          Extension::new("readonly")
            .state_field(&field)
            .transaction_filter(|tr, _| (!tr.doc_changed()).then_some(tr))
            .update_listener(move |_| {
              counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .with_extension(Extension::new("after").transaction_filter(move |tr, _| {
          filter_counter.fetch_add(1, Ordering::SeqCst);
          Some(tr)
        })),
    );

    let next = state.update(TransactionSpec::new().insert(0, "x")).unwrap();
    assert!(EditorState::ptr_eq(&state, &next));
    assert_eq!(next.doc().to_string(), "read only");
    assert_eq!(next.field(&field), Ok(&0));
    assert_eq!(listened.load(Ordering::SeqCst), 0);
    assert_eq!(filtered.load(Ordering::SeqCst), 0);
    assert_eq!(updated.load(Ordering::SeqCst), 0);

    let moved = state
      .update(TransactionSpec::new().selection(SelectionSet::cursor((0, 4))))
      .unwrap();
    assert!(!EditorState::ptr_eq(&state, &moved));
    assert_eq!(moved.field(&field), Ok(&1));
    assert_eq!(listened.load(Ordering::SeqCst), 1);
    assert_eq!(filtered.load(Ordering::SeqCst), 1);
    assert_eq!(updated.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn filters_run_in_order_and_rewrite() {
    let upper = |tr: Transaction, _: &EditorState| {
      let changes = tr.changes().clone();
      let upper = ChangeSet::of(
        changes
          .iter()
          .map(|change| {
            let mut change = change.clone();
            change.insert = change.insert.to_uppercase().into();
            change
          }),
        changes.original_len(),
      )
      .ok()?;
      Some(tr.with_changes(upper))
    };
    let exclaim = |tr: Transaction, _: &EditorState| {
      let end = tr.changes().new_len();
      let extra = ChangeSet::of([(end, end, "!")], end).ok()?;
      let changes = tr.changes().clone().compose(extra).ok()?;
      Some(tr.with_changes(changes))
    };

    let state = EditorState::create(EditorStateConfig::new("ab").with_extensions([
      Extension::new("upper").transaction_filter(upper),
      Extension::new("exclaim").transaction_filter(exclaim),
    ]));

    let next = state.update(TransactionSpec::new().insert(2, "cd")).unwrap();
    assert_eq!(next.doc().to_string(), "abCD!");
  }

  #[test]
  fn listeners_see_both_states_in_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&log);
    let second = Arc::clone(&log);

    let state = EditorState::create(EditorStateConfig::new("one").with_extension(
      Extension::new("log")
        .update_listener(move |update| {
          first.lock().push(format!(
            "1:{}->{}",
            update.prev_state.doc(),
            update.state.doc()
          ));
        })
        .extension(Extension::new("nested").update_listener(move |update| {
          second.lock().push(format!("2:{}", update.doc_changed()));
        })),
    ));

    state.update(TransactionSpec::new().insert(3, "!")).unwrap();
    assert_eq!(*log.lock(), vec!["1:one->one!", "2:true"]);
  }

  #[test]
  fn fields_create_in_order_and_update() {
    let set_count = StateEffectType::<usize>::define();
    let count = StateField::define(
      |_| 0usize,
      move |value: &usize, tr: &Transaction| {
        tr.effects_of(&set_count).last().copied().unwrap_or(*value)
      },
    );
    let edits = StateField::define(
      |_| 0usize,
      |value: &usize, tr: &Transaction| value + usize::from(tr.doc_changed()),
    );
    let count_for_double = count.clone();
    let initial_double = StateField::define(
      move |state: &EditorState| state.field(&count_for_double).map_or(0, |n| n * 2) + 1,
      |value: &usize, _| *value,
    );

    let state = EditorState::create(
      EditorStateConfig::new("text").with_extension(
        Extension::new("fields")
          .state_field(&count)
          .state_field(&edits)
          .state_field(&initial_double),
      ),
    );
    assert_eq!(state.field(&count), Ok(&0));
    assert_eq!(state.field(&initial_double), Ok(&1));

    let next = state
      .update(TransactionSpec::new().effect(set_count.of(7)))
      .unwrap();
    assert_eq!(next.field(&count), Ok(&7));
    assert_eq!(next.field(&edits), Ok(&0));
    assert_eq!(state.field(&count), Ok(&0));

    let edited = next.update(TransactionSpec::new().insert(0, "x")).unwrap();
    assert_eq!(edited.field(&count), Ok(&7));
    assert_eq!(edited.field(&edits), Ok(&1));
  }

  #[test]
  fn unknown_field() {
    let field = StateField::define(|_| 'x', |value: &char, _| *value);
    let state = state("");
    assert_eq!(
      state.field(&field),
      Err(StateError::UnknownField {
        id: field.id().get()
      })
    );
    assert_eq!(state.try_field(&field), None);
    assert_eq!(state.field_or_default(&field), '\0');
  }

  #[test]
  fn empty_transaction_keeps_document_and_selection() {
    let state = EditorState::create(
      EditorStateConfig::new("same").with_selection(SelectionSet::single((0, 1), (0, 3))),
    );
    let next = state.apply(Transaction::from(ChangeSet::empty(4))).unwrap();
    assert!(!EditorState::ptr_eq(&state, &next));
    assert_eq!(next.doc(), state.doc());
    assert_eq!(next.selection(), state.selection());
  }

  #[test]
  fn mismatched_length_is_an_error() {
    let state = state("abc");
    let tr = Transaction::create(10, TransactionSpec::new().insert(8, "x")).unwrap();
    assert!(matches!(state.apply(tr), Err(StateError::Change(_))));
  }

  #[test]
  fn document_queries() {
    let state = state("first\r\nsecond\nthird");
    assert_eq!(state.line_count(), 3);
    assert_eq!(state.line(0).as_deref(), Some("first"));
    assert_eq!(state.line(1).as_deref(), Some("second"));
    assert_eq!(state.line(2).as_deref(), Some("third"));
    assert_eq!(state.line(3), None);

    assert_eq!(state.slice_doc(7, 13), "second");
    assert_eq!(state.slice_doc(14, 100), "third");
    assert_eq!(state.slice_doc(50, 60), "");

    assert_eq!(state.position_to_offset(Position::new(1, 3)), Some(10));
    assert_eq!(state.position_to_offset(Position::new(0, 99)), Some(5));
    assert_eq!(state.position_to_offset(Position::new(2, 5)), Some(19));
    assert_eq!(state.offset_to_position(10), Position::new(1, 3));
    assert_eq!(state.offset_to_position(99), Position::new(2, 5));

    let empty = state_empty();
    assert_eq!(empty.line_count(), 1);
    assert_eq!(empty.line(0).as_deref(), Some(""));
    assert!(empty.is_empty());
  }

  #[test]
  fn position_on_missing_line_does_not_resolve() {
    let state = state("first\nsecond");
    assert_eq!(state.position_to_offset(Position::new(2, 0)), None);
    assert_eq!(state.position_to_offset(Position::new(9, 1)), None);
    assert_eq!(state.position_to_offset(Position::new(1, 99)), Some(12));

    let empty = state_empty();
    assert_eq!(empty.position_to_offset(Position::zero()), Some(0));
    assert_eq!(empty.position_to_offset(Position::new(1, 0)), None);
  }

  fn state_empty() -> EditorState {
    EditorState::default()
  }

  #[test]
  fn decorations_follow_provider_order() {
    let state = EditorState::create(EditorStateConfig::new("a b").with_extensions([
      Extension::new("marks").decoration_provider(|state| {
        vec![Decoration::mark(0, state.len(), "all")]
      }),
      Extension::new("widgets")
        .decoration_provider(|_| vec![Decoration::widget(1, WidgetSide::After, "·")]),
    ]));

    let decorations = state.decorations();
    assert_eq!(decorations.len(), 2);
    assert_eq!(decorations[0], Decoration::mark(0, 3, "all"));
    assert_eq!(decorations[1].from, 1);
  }

  #[test]
  fn run_key_first_applicable_command_wins() {
    let state = EditorState::create(
      EditorStateConfig::new("abc").with_extension(
        Extension::new("keys")
          .key_binding(KeyBinding::new("Mod-d", |_| None).prevent_default())
          .key_binding(KeyBinding::new("Ctrl-d", |state: &EditorState| {
            state.transaction(TransactionSpec::new().delete(0, 1)).ok()
          }))
          .key_binding(KeyBinding::new("Ctrl-d", |state: &EditorState| {
            state.transaction(TransactionSpec::new().delete(0, 3)).ok()
          }))
          .key_binding(KeyBinding::new("Ctrl-q", |_| None).prevent_default()),
      ),
    );

    let ctrl = |c| KeyCombo::new(Key::Char(c)).with_modifiers(Modifiers::CTRL);
    let KeyOutcome::Handled(tr) = state.run_key(&ctrl('d'), Platform::Other) else {
      panic!("ctrl-d should be handled");
    };
    assert_eq!(state.apply(tr).unwrap().doc().to_string(), "bc");

    assert!(matches!(
      state.run_key(&ctrl('q'), Platform::Other),
      KeyOutcome::Prevented
    ));
    assert!(matches!(
      state.run_key(&ctrl('z'), Platform::Other),
      KeyOutcome::Unhandled
    ));
  }

  #[test]
  fn states_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<EditorState>();
    assert_send_sync::<Transaction>();
  }
}
