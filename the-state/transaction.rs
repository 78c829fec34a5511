//! Proposed state updates.
//!
//! A [`Transaction`] bundles a [`ChangeSet`], an optional explicit
//! [`SelectionSet`], typed [`StateEffect`]s, typed annotations and a few
//! flags consumers use to interpret the update (`scroll_into_view`,
//! `user_event`). Transactions are built from a [`TransactionSpec`], which
//! accepts changes in several shapes:
//!
//! ```
//! use the_state::{
//!   change::Change,
//!   transaction::{
//!     ChangeDesc,
//!     Transaction,
//!     TransactionSpec,
//!   },
//! };
//!
//! let spec = TransactionSpec::new()
//!   .change(ChangeDesc::at(5).insert(" world"))
//!   .change(Change::delete(0, 1))
//!   .user_event("input");
//!
//! let tr = Transaction::create(5, spec).unwrap();
//! assert!(tr.doc_changed());
//! assert!(!tr.selection_changed());
//! assert_eq!(tr.changes().new_len(), 10);
//! ```
//!
//! Effects are how extensions ask each other for state changes. An effect
//! type is an identity; only code holding the [`StateEffectType`] can create
//! or read its payloads.

use std::{
  any::Any,
  fmt,
  marker::PhantomData,
  sync::Arc,
};

use thiserror::Error;

use crate::{
  Tendril,
  change::{
    Change,
    ChangeError,
    ChangeSet,
  },
  selection::SelectionSet,
};

pub type Result<T> = std::result::Result<T, TransactionError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransactionError {
  #[error(transparent)]
  Change(#[from] ChangeError),
}

type Payload = Arc<dyn Any + Send + Sync>;

unique_id! {
  /// Identity of a [`StateEffectType`].
  EffectId
}

unique_id! {
  /// Identity of an [`AnnotationType`].
  AnnotationId
}

/// A typed effect kind. Every call to [`StateEffectType::define`] yields a
/// distinct identity.
pub struct StateEffectType<T> {
  id:      EffectId,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StateEffectType<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for StateEffectType<T> {}

impl<T> fmt::Debug for StateEffectType<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("StateEffectType").field(&self.id.get()).finish()
  }
}

impl<T: Send + Sync + 'static> StateEffectType<T> {
  pub fn define() -> Self {
    Self {
      id:      EffectId::fresh(),
      _marker: PhantomData,
    }
  }

  #[inline]
  pub fn id(&self) -> EffectId {
    self.id
  }

  /// Wrap `value` as an effect of this type.
  pub fn of(&self, value: T) -> StateEffect {
    StateEffect {
      type_id: self.id,
      value:   Arc::new(value),
    }
  }
}

/// An opaque effect payload attached to a transaction.
#[derive(Clone)]
pub struct StateEffect {
  type_id: EffectId,
  value:   Payload,
}

impl StateEffect {
  #[inline]
  pub fn type_id(&self) -> EffectId {
    self.type_id
  }

  #[inline]
  pub fn is<T>(&self, ty: &StateEffectType<T>) -> bool {
    self.type_id == ty.id
  }

  /// The payload, if this effect is of type `ty`.
  pub fn value<T: 'static>(&self, ty: &StateEffectType<T>) -> Option<&T> {
    if self.is(ty) {
      self.value.downcast_ref()
    } else {
      None
    }
  }
}

impl fmt::Debug for StateEffect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("StateEffect")
      .field("type_id", &self.type_id.get())
      .finish_non_exhaustive()
  }
}

/// A typed annotation key.
pub struct AnnotationType<T> {
  id:      AnnotationId,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for AnnotationType<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for AnnotationType<T> {}

impl<T> fmt::Debug for AnnotationType<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("AnnotationType").field(&self.id.get()).finish()
  }
}

impl<T: Send + Sync + 'static> AnnotationType<T> {
  pub fn define() -> Self {
    Self {
      id:      AnnotationId::fresh(),
      _marker: PhantomData,
    }
  }

  #[inline]
  pub fn id(&self) -> AnnotationId {
    self.id
  }
}

/// Annotation values keyed by [`AnnotationType`]. Setting a key twice keeps
/// the last value.
#[derive(Clone, Default)]
pub struct Annotations {
  entries: Vec<(AnnotationId, Payload)>,
}

impl Annotations {
  pub fn insert<T: Send + Sync + 'static>(&mut self, ty: &AnnotationType<T>, value: T) {
    self.insert_payload(ty.id, Arc::new(value));
  }

  fn insert_payload(&mut self, id: AnnotationId, value: Payload) {
    match self.entries.iter_mut().find(|(key, _)| *key == id) {
      Some((_, slot)) => *slot = value,
      None => self.entries.push((id, value)),
    }
  }

  pub fn get<T: 'static>(&self, ty: &AnnotationType<T>) -> Option<&T> {
    self
      .entries
      .iter()
      .find(|(key, _)| *key == ty.id)
      .and_then(|(_, value)| value.downcast_ref())
  }

  pub fn contains<T>(&self, ty: &AnnotationType<T>) -> bool {
    self.entries.iter().any(|(key, _)| *key == ty.id)
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Merge `other` into `self`, `other` winning on shared keys.
  fn extend(&mut self, other: Annotations) {
    for (id, value) in other.entries {
      self.insert_payload(id, value);
    }
  }
}

impl fmt::Debug for Annotations {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set()
      .entries(self.entries.iter().map(|(id, _)| id.get()))
      .finish()
  }
}

/// A loosely specified change: `to` defaults to `from` (pure insertion) and
/// `insert` to the empty string (pure deletion).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeDesc {
  pub from:   usize,
  pub to:     Option<usize>,
  pub insert: Option<Tendril>,
}

impl ChangeDesc {
  pub fn at(from: usize) -> Self {
    Self {
      from,
      ..Self::default()
    }
  }

  #[must_use]
  pub fn to(mut self, to: usize) -> Self {
    self.to = Some(to);
    self
  }

  #[must_use]
  pub fn insert(mut self, text: impl Into<Tendril>) -> Self {
    self.insert = Some(text.into());
    self
  }
}

impl From<ChangeDesc> for Change {
  fn from(desc: ChangeDesc) -> Self {
    Change {
      from:   desc.from,
      to:     desc.to.unwrap_or(desc.from),
      insert: desc.insert.unwrap_or_default(),
    }
  }
}

/// Input for [`Transaction::create`].
#[derive(Debug, Clone, Default)]
pub struct TransactionSpec {
  changes:          Vec<Change>,
  selection:        Option<SelectionSet>,
  effects:          Vec<StateEffect>,
  annotations:      Annotations,
  scroll_into_view: bool,
  user_event:       Option<Tendril>,
}

impl TransactionSpec {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a single change. Accepts [`Change`], [`ChangeDesc`] and
  /// `(from, to, insert)` tuples.
  #[must_use]
  pub fn change(mut self, change: impl Into<Change>) -> Self {
    self.changes.push(change.into());
    self
  }

  /// Add several changes, in any order.
  #[must_use]
  pub fn changes<I>(mut self, changes: I) -> Self
  where
    I: IntoIterator,
    I::Item: Into<Change>,
  {
    self.changes.extend(changes.into_iter().map(Into::into));
    self
  }

  #[must_use]
  pub fn insert(self, at: usize, text: impl Into<Tendril>) -> Self {
    self.change(Change::insert(at, text))
  }

  #[must_use]
  pub fn delete(self, from: usize, to: usize) -> Self {
    self.change(Change::delete(from, to))
  }

  #[must_use]
  pub fn replace(self, from: usize, to: usize, text: impl Into<Tendril>) -> Self {
    self.change(Change::replace(from, to, text))
  }

  #[must_use]
  pub fn selection(mut self, selection: impl Into<SelectionSet>) -> Self {
    self.selection = Some(selection.into());
    self
  }

  #[must_use]
  pub fn effect(mut self, effect: StateEffect) -> Self {
    self.effects.push(effect);
    self
  }

  #[must_use]
  pub fn effects(mut self, effects: impl IntoIterator<Item = StateEffect>) -> Self {
    self.effects.extend(effects);
    self
  }

  #[must_use]
  pub fn annotation<T: Send + Sync + 'static>(mut self, ty: &AnnotationType<T>, value: T) -> Self {
    self.annotations.insert(ty, value);
    self
  }

  #[must_use]
  pub fn scroll_into_view(mut self) -> Self {
    self.scroll_into_view = true;
    self
  }

  #[must_use]
  pub fn user_event(mut self, event: impl Into<Tendril>) -> Self {
    self.user_event = Some(event.into());
    self
  }
}

#[derive(Debug, Clone, Default)]
pub struct Transaction {
  changes:          ChangeSet,
  selection:        Option<SelectionSet>,
  effects:          Vec<StateEffect>,
  annotations:      Annotations,
  scroll_into_view: bool,
  user_event:       Option<Tendril>,
}

impl From<ChangeSet> for Transaction {
  fn from(changes: ChangeSet) -> Self {
    Self {
      changes,
      ..Self::default()
    }
  }
}

impl Transaction {
  /// Normalize `spec` into a transaction against a document of `doc_len`
  /// chars. Changes are sorted by position and must not overlap.
  pub fn create(doc_len: usize, spec: TransactionSpec) -> Result<Self> {
    let TransactionSpec {
      changes,
      selection,
      effects,
      annotations,
      scroll_into_view,
      user_event,
    } = spec;

    Ok(Self {
      changes: ChangeSet::of(changes, doc_len)?,
      selection,
      effects,
      annotations,
      scroll_into_view,
      user_event,
    })
  }

  /// Changes made to the document.
  #[inline]
  pub fn changes(&self) -> &ChangeSet {
    &self.changes
  }

  /// When set, explicitly replaces the selection.
  #[inline]
  pub fn selection(&self) -> Option<&SelectionSet> {
    self.selection.as_ref()
  }

  #[inline]
  pub fn effects(&self) -> &[StateEffect] {
    &self.effects
  }

  /// Payloads of every effect of type `ty`, in order.
  pub fn effects_of<'a, T: 'static>(
    &'a self,
    ty: &'a StateEffectType<T>,
  ) -> impl Iterator<Item = &'a T> + 'a {
    self.effects.iter().filter_map(move |effect| effect.value(ty))
  }

  #[inline]
  pub fn annotations(&self) -> &Annotations {
    &self.annotations
  }

  pub fn annotation<T: 'static>(&self, ty: &AnnotationType<T>) -> Option<&T> {
    self.annotations.get(ty)
  }

  #[inline]
  pub fn scroll_into_view(&self) -> bool {
    self.scroll_into_view
  }

  #[inline]
  pub fn user_event(&self) -> Option<&str> {
    self.user_event.as_deref()
  }

  /// Whether this transaction's user event is `event` or one of its dotted
  /// sub-events (`"input.paste"` matches `"input"`).
  pub fn is_user_event(&self, event: &str) -> bool {
    self.user_event().is_some_and(|ours| {
      ours
        .strip_prefix(event)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    })
  }

  #[inline]
  pub fn doc_changed(&self) -> bool {
    !self.changes.is_empty()
  }

  /// True only when a selection was explicitly given, not when the selection
  /// merely follows the changes.
  #[inline]
  pub fn selection_changed(&self) -> bool {
    self.selection.is_some()
  }

  #[must_use]
  pub fn with_selection(mut self, selection: SelectionSet) -> Self {
    self.selection = Some(selection);
    self
  }

  #[must_use]
  pub fn without_selection(mut self) -> Self {
    self.selection = None;
    self
  }

  #[must_use]
  pub fn with_changes(mut self, changes: ChangeSet) -> Self {
    self.changes = changes;
    self
  }

  #[must_use]
  pub fn with_effect(mut self, effect: StateEffect) -> Self {
    self.effects.push(effect);
    self
  }

  #[must_use]
  pub fn with_annotation<T: Send + Sync + 'static>(
    mut self,
    ty: &AnnotationType<T>,
    value: T,
  ) -> Self {
    self.annotations.insert(ty, value);
    self
  }

  #[must_use]
  pub fn with_user_event(mut self, event: impl Into<Tendril>) -> Self {
    self.user_event = Some(event.into());
    self
  }

  #[must_use]
  pub fn with_scroll_into_view(mut self, scroll: bool) -> Self {
    self.scroll_into_view = scroll;
    self
  }

  /// Sequence two transactions. Changes compose, effects concatenate and the
  /// later transaction's selection, annotations and user event take
  /// precedence. An explicit selection of `self` survives when `other` sets
  /// none.
  pub fn compose(mut self, other: Self) -> Result<Self> {
    self.changes = self.changes.compose(other.changes)?;
    self.selection = other.selection.or(self.selection);
    self.effects.extend(other.effects);
    self.annotations.extend(other.annotations);
    self.scroll_into_view |= other.scroll_into_view;
    if other.user_event.is_some() {
      self.user_event = other.user_event;
    }
    Ok(self)
  }
}
