//! Extension registration and combination.
//!
//! An [`Extension`] is a named bundle of contributions: state fields,
//! transaction filters, update listeners, key bindings and decoration
//! providers, plus nested extensions. [`combine_extensions`] flattens a list
//! of extensions depth-first (an extension's own entries before its
//! children's) into one [`ExtensionData`] per state.

use std::{
  any::Any,
  collections::HashSet,
  fmt,
  sync::Arc,
};

use crate::{
  Tendril,
  decoration::{
    Decoration,
    DecorationProvider,
  },
  keymap::{
    KeyBinding,
    Keymap,
  },
  state::EditorState,
  transaction::Transaction,
};

pub(crate) type FieldValue = Arc<dyn Any + Send + Sync>;

/// Rewrites or vetoes (`None`) a transaction before it is applied. Filters
/// see the state the transaction is about to be applied to.
pub type TransactionFilter =
  Arc<dyn Fn(Transaction, &EditorState) -> Option<Transaction> + Send + Sync>;

/// Observes every applied update. Listeners cannot alter the update.
pub type UpdateListener = Arc<dyn Fn(&StateUpdate<'_>) + Send + Sync>;

unique_id! {
  /// Identity of a [`StateField`].
  FieldId
}

type CreateFn<T> = Arc<dyn Fn(&EditorState) -> T + Send + Sync>;
type UpdateFn<T> = Arc<dyn Fn(&T, &Transaction) -> T + Send + Sync>;

/// Extension-owned state carried by every [`EditorState`].
///
/// `create` runs once when a state is created and may read fields registered
/// before this one. `update` derives the next value from the previous value
/// and the applied transaction; it must be pure.
pub struct StateField<T> {
  id:     FieldId,
  create: CreateFn<T>,
  update: UpdateFn<T>,
}

impl<T> Clone for StateField<T> {
  fn clone(&self) -> Self {
    Self {
      id:     self.id,
      create: Arc::clone(&self.create),
      update: Arc::clone(&self.update),
    }
  }
}

impl<T> fmt::Debug for StateField<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("StateField").field(&self.id.get()).finish()
  }
}

impl<T: Send + Sync + 'static> StateField<T> {
  pub fn define<C, U>(create: C, update: U) -> Self
  where
    C: Fn(&EditorState) -> T + Send + Sync + 'static,
    U: Fn(&T, &Transaction) -> T + Send + Sync + 'static,
  {
    Self {
      id:     FieldId::fresh(),
      create: Arc::new(create),
      update: Arc::new(update),
    }
  }
}

impl<T> StateField<T> {
  #[inline]
  pub fn id(&self) -> FieldId {
    self.id
  }
}

/// Type-erased view of a [`StateField`], stored in combined extension data.
pub(crate) trait AnyStateField: Send + Sync {
  fn id(&self) -> FieldId;
  fn create(&self, state: &EditorState) -> FieldValue;
  fn update(&self, value: &FieldValue, transaction: &Transaction) -> FieldValue;
}

impl<T: Send + Sync + 'static> AnyStateField for StateField<T> {
  fn id(&self) -> FieldId {
    self.id
  }

  fn create(&self, state: &EditorState) -> FieldValue {
    Arc::new((self.create)(state))
  }

  fn update(&self, value: &FieldValue, transaction: &Transaction) -> FieldValue {
    match value.downcast_ref::<T>() {
      Some(value) => Arc::new((self.update)(value, transaction)),
      None => {
        tracing::error!(field = self.id.get(), "state field holds a foreign value");
        Arc::clone(value)
      },
    }
  }
}

/// The update handed to listeners after a transaction was applied.
#[derive(Debug, Clone, Copy)]
pub struct StateUpdate<'a> {
  pub state:       &'a EditorState,
  pub prev_state:  &'a EditorState,
  pub transaction: &'a Transaction,
}

impl StateUpdate<'_> {
  #[inline]
  pub fn doc_changed(&self) -> bool {
    self.transaction.doc_changed()
  }

  #[inline]
  pub fn selection_set(&self) -> bool {
    self.transaction.selection_changed()
  }
}

/// A named bundle of contributions.
#[derive(Clone, Default)]
pub struct Extension {
  name:                 Tendril,
  state_fields:         Vec<Arc<dyn AnyStateField>>,
  transaction_filters:  Vec<TransactionFilter>,
  update_listeners:     Vec<UpdateListener>,
  key_bindings:         Vec<KeyBinding>,
  decoration_providers: Vec<DecorationProvider>,
  extensions:           Vec<Extension>,
}

impl Extension {
  pub fn new(name: impl Into<Tendril>) -> Self {
    Self {
      name: name.into(),
      ..Self::default()
    }
  }

  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[must_use]
  pub fn state_field<T: Send + Sync + 'static>(mut self, field: &StateField<T>) -> Self {
    self.state_fields.push(Arc::new(field.clone()));
    self
  }

  #[must_use]
  pub fn transaction_filter<F>(mut self, filter: F) -> Self
  where
    F: Fn(Transaction, &EditorState) -> Option<Transaction> + Send + Sync + 'static,
  {
    self.transaction_filters.push(Arc::new(filter));
    self
  }

  #[must_use]
  pub fn update_listener<F>(mut self, listener: F) -> Self
  where
    F: Fn(&StateUpdate<'_>) + Send + Sync + 'static,
  {
    self.update_listeners.push(Arc::new(listener));
    self
  }

  #[must_use]
  pub fn key_binding(mut self, binding: KeyBinding) -> Self {
    self.key_bindings.push(binding);
    self
  }

  #[must_use]
  pub fn keymap(mut self, bindings: impl IntoIterator<Item = KeyBinding>) -> Self {
    self.key_bindings.extend(bindings);
    self
  }

  #[must_use]
  pub fn decoration_provider<F>(mut self, provider: F) -> Self
  where
    F: Fn(&EditorState) -> Vec<Decoration> + Send + Sync + 'static,
  {
    self.decoration_providers.push(Arc::new(provider));
    self
  }

  /// Nest `extension`; its entries follow this extension's own.
  #[must_use]
  pub fn extension(mut self, extension: Extension) -> Self {
    self.extensions.push(extension);
    self
  }
}

impl fmt::Debug for Extension {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Extension")
      .field("name", &self.name)
      .field("state_fields", &self.state_fields.len())
      .field("transaction_filters", &self.transaction_filters.len())
      .field("update_listeners", &self.update_listeners.len())
      .field("key_bindings", &self.key_bindings.len())
      .field("decoration_providers", &self.decoration_providers.len())
      .field("extensions", &self.extensions)
      .finish()
  }
}

/// Flattened contributions of all extensions of a state.
#[derive(Default)]
pub struct ExtensionData {
  pub(crate) state_fields:         Vec<Arc<dyn AnyStateField>>,
  pub(crate) transaction_filters:  Vec<TransactionFilter>,
  pub(crate) update_listeners:     Vec<UpdateListener>,
  pub(crate) keymap:               Keymap,
  pub(crate) decoration_providers: Vec<DecorationProvider>,
}

impl ExtensionData {
  pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
    self.state_fields.iter().map(|field| field.id())
  }

  #[inline]
  pub fn transaction_filters(&self) -> &[TransactionFilter] {
    &self.transaction_filters
  }

  #[inline]
  pub fn update_listeners(&self) -> &[UpdateListener] {
    &self.update_listeners
  }

  #[inline]
  pub fn keymap(&self) -> &Keymap {
    &self.keymap
  }

  #[inline]
  pub fn decoration_providers(&self) -> &[DecorationProvider] {
    &self.decoration_providers
  }
}

impl fmt::Debug for ExtensionData {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExtensionData")
      .field("state_fields", &self.state_fields.len())
      .field("transaction_filters", &self.transaction_filters.len())
      .field("update_listeners", &self.update_listeners.len())
      .field("keymap", &self.keymap.len())
      .field("decoration_providers", &self.decoration_providers.len())
      .finish()
  }
}

/// Flatten `extensions` depth-first. A state field registered more than once
/// (the same [`StateField`] reached through several extensions) is kept at
/// its first position only.
pub fn combine_extensions(extensions: &[Extension]) -> ExtensionData {
  #[derive(Default)]
  struct Combiner {
    data:        ExtensionData,
    bindings:    Vec<KeyBinding>,
    seen_fields: HashSet<FieldId>,
  }

  impl Combiner {
    fn visit(&mut self, extension: &Extension) {
      tracing::trace!(name = %extension.name, "combining extension");

      for field in &extension.state_fields {
        if self.seen_fields.insert(field.id()) {
          self.data.state_fields.push(Arc::clone(field));
        }
      }
      self
        .data
        .transaction_filters
        .extend(extension.transaction_filters.iter().cloned());
      self
        .data
        .update_listeners
        .extend(extension.update_listeners.iter().cloned());
      self.bindings.extend(extension.key_bindings.iter().cloned());
      self
        .data
        .decoration_providers
        .extend(extension.decoration_providers.iter().cloned());

      for child in &extension.extensions {
        self.visit(child);
      }
    }
  }

  let mut combiner = Combiner::default();
  for extension in extensions {
    combiner.visit(extension);
  }

  let Combiner {
    mut data, bindings, ..
  } = combiner;
  data.keymap = Keymap::new(bindings);
  data
}
