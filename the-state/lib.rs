//! Headless editor state.
//!
//! An immutable [`EditorState`] (document, multi-range selection and
//! extension-owned field values) evolves only through [`Transaction`]s.
//! Independent features plug in through [`Extension`]s: state fields,
//! transaction filters, update listeners, key bindings and decoration
//! providers. Nothing here renders or reads input devices.
//!
//! ```
//! use the_state::{
//!   EditorState,
//!   EditorStateConfig,
//!   transaction::TransactionSpec,
//! };
//!
//! let state = EditorState::create(EditorStateConfig::new("hello"));
//! let tr = state
//!   .transaction(TransactionSpec::new().insert(5, " world"))
//!   .unwrap();
//! let next = state.apply(tr).unwrap();
//!
//! assert_eq!(next.doc().to_string(), "hello world");
//! assert_eq!(state.doc().to_string(), "hello");
//! ```

use smartstring::{
  LazyCompact,
  SmartString,
};

/// Declares an opaque identity token handed out from a process-wide counter.
/// Two tokens are equal only if they came from the same `fresh()` call.
macro_rules! unique_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct $name(std::num::NonZeroU64);

    impl $name {
      pub(crate) fn fresh() -> Self {
        use std::sync::atomic::{
          AtomicU64,
          Ordering,
        };

        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed).max(1);
        Self(std::num::NonZeroU64::new(id).expect("id must be non-zero"))
      }

      pub fn get(self) -> u64 {
        self.0.get()
      }
    }
  };
}

pub mod change;
pub mod decoration;
pub mod extension;
pub mod history;
pub mod keymap;
pub mod position;
pub mod selection;
pub mod state;
pub mod transaction;

pub type Tendril = SmartString<LazyCompact>;

pub use crate::{
  change::{
    Assoc,
    Change,
    ChangeSet,
  },
  extension::{
    Extension,
    StateField,
    StateUpdate,
  },
  history::History,
  keymap::{
    KeyBinding,
    KeyCombo,
  },
  position::{
    Position,
    Range,
  },
  selection::{
    SelectionRange,
    SelectionSet,
  },
  state::{
    EditorState,
    EditorStateConfig,
    StateError,
  },
  transaction::{
    StateEffect,
    StateEffectType,
    Transaction,
    TransactionSpec,
  },
};
