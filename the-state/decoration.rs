//! Decorations describe visual annotations anchored to character offsets.
//!
//! The engine never renders them. Extensions register providers that derive
//! decorations from a state and the host collects them with
//! [`EditorState::decorations`].

use std::sync::Arc;

use serde::{
  Deserialize,
  Serialize,
};

use crate::{
  Tendril,
  change::{
    Assoc,
    ChangeSet,
  },
  state::EditorState,
};

/// Derives decorations from a state. Providers run in registration order.
pub type DecorationProvider = Arc<dyn Fn(&EditorState) -> Vec<Decoration> + Send + Sync>;

/// Where a widget renders relative to its anchor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WidgetSide {
  #[default]
  Before,
  After,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecorationKind {
  /// Styles the text in `from..to`.
  Mark,
  /// Styles the whole line starting at `from`.
  Line,
  /// Virtual content inserted at `from`.
  Widget { side: WidgetSide, text: Tendril },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Decoration {
  pub kind:  DecorationKind,
  pub from:  usize,
  pub to:    usize,
  pub class: Tendril,
}

impl Decoration {
  /// A mark over `from..to`. The bounds are normalized.
  pub fn mark(from: usize, to: usize, class: impl Into<Tendril>) -> Self {
    Self {
      kind:  DecorationKind::Mark,
      from:  from.min(to),
      to:    from.max(to),
      class: class.into(),
    }
  }

  /// A line decoration anchored at the offset where the line starts.
  pub fn line(line_start: usize, class: impl Into<Tendril>) -> Self {
    Self {
      kind:  DecorationKind::Line,
      from:  line_start,
      to:    line_start,
      class: class.into(),
    }
  }

  pub fn widget(at: usize, side: WidgetSide, text: impl Into<Tendril>) -> Self {
    Self {
      kind:  DecorationKind::Widget {
        side,
        text: text.into(),
      },
      from:  at,
      to:    at,
      class: Tendril::new(),
    }
  }

  #[must_use]
  pub fn with_class(mut self, class: impl Into<Tendril>) -> Self {
    self.class = class.into();
    self
  }

  #[inline]
  pub fn is_point(&self) -> bool {
    self.from == self.to
  }

  /// Map the decoration through `changes`. Returns `None` when a mark's
  /// whole range was deleted.
  pub fn map(&self, changes: &ChangeSet) -> Option<Self> {
    if changes.is_empty() {
      return Some(self.clone());
    }

    let (from, to) = match &self.kind {
      DecorationKind::Mark => {
        let from = changes.map_offset(self.from, Assoc::After);
        let to = changes.map_offset(self.to, Assoc::Before).max(from);
        if from == to && self.from != self.to {
          return None;
        }
        (from, to)
      },
      DecorationKind::Line => {
        let from = changes.map_offset(self.from, Assoc::Before);
        (from, from)
      },
      DecorationKind::Widget { side, .. } => {
        let assoc = match side {
          WidgetSide::Before => Assoc::After,
          WidgetSide::After => Assoc::Before,
        };
        let at = changes.map_offset(self.from, assoc);
        (at, at)
      },
    };

    Some(Self {
      from,
      to,
      ..self.clone()
    })
  }
}

/// Sort decorations by start offset; line decorations go first at a given
/// offset, then widgets, then marks. Stable for equal keys.
pub fn sort_decorations(decorations: &mut [Decoration]) {
  fn rank(kind: &DecorationKind) -> u8 {
    match kind {
      DecorationKind::Line => 0,
      DecorationKind::Widget { .. } => 1,
      DecorationKind::Mark => 2,
    }
  }

  decorations.sort_by_key(|decoration| (decoration.from, rank(&decoration.kind)));
}
