//! Key bindings contributed by extensions.
//!
//! Bindings are written as strings such as `"Mod-z"` or `"Ctrl-Shift-Enter"`
//! and resolved into [`KeyCombo`]s when the keymap is combined. `Mod` means
//! `Meta` on macOS and `Ctrl` elsewhere; a binding may also carry a separate
//! `mac` spelling. Lookup walks bindings in declaration order and the first
//! command that produces a transaction wins.

use std::{
  fmt,
  str::FromStr,
  sync::Arc,
};

use bitflags::bitflags;
use thiserror::Error;

use crate::{
  Tendril,
  state::EditorState,
  transaction::Transaction,
};

pub type Result<T> = std::result::Result<T, KeymapError>;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeymapError {
  #[error("empty key literal")]
  Empty,
  #[error("invalid key modifier '{0}-'")]
  InvalidModifier(String),
  #[error("repeated key modifier '{0}-'")]
  RepeatedModifier(String),
  #[error("unknown key '{0}'")]
  InvalidKey(String),
}

/// Runs against the current state; `None` means "not applicable here".
pub type Command = Arc<dyn Fn(&EditorState) -> Option<Transaction> + Send + Sync>;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
  Mac,
  #[default]
  Other,
}

impl Platform {
  pub const fn current() -> Self {
    if cfg!(target_os = "macos") {
      Platform::Mac
    } else {
      Platform::Other
    }
  }
}

bitflags! {
  #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
  pub struct Modifiers: u8 {
    const CTRL  = 0b0000_0001;
    const ALT   = 0b0000_0010;
    const SHIFT = 0b0000_0100;
    const META  = 0b0000_1000;
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
  Char(char),
  Enter,
  Escape,
  Backspace,
  Tab,
  Delete,
  Insert,
  Home,
  End,
  PageUp,
  PageDown,
  Left,
  Right,
  Up,
  Down,
  F(u8),
}

/// A key plus modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCombo {
  pub key:       Key,
  pub modifiers: Modifiers,
}

impl KeyCombo {
  pub const fn new(key: Key) -> Self {
    Self {
      key,
      modifiers: Modifiers::empty(),
    }
  }

  #[must_use]
  pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
    self.modifiers = modifiers;
    self
  }

  /// Parse a binding literal, resolving `Mod` for `platform`.
  pub fn parse(literal: &str, platform: Platform) -> Result<Self> {
    let trimmed = literal.trim();
    if trimmed.is_empty() {
      return Err(KeymapError::Empty);
    }

    if trimmed == "-" {
      return Ok(KeyCombo::new(Key::Char('-')));
    }

    let mut tokens: Vec<_> = trimmed.split('-').collect();
    // "Ctrl--" binds the minus key
    if trimmed.ends_with("--") {
      tokens.pop();
      tokens.pop();
      tokens.push("-");
    }
    let key_token = tokens.pop().ok_or(KeymapError::Empty)?;

    let mut modifiers = Modifiers::empty();
    for token in tokens {
      let modifier = token.trim();
      if modifier.is_empty() {
        continue;
      }

      let flag = match modifier.to_ascii_lowercase().as_str() {
        "s" | "shift" => Modifiers::SHIFT,
        "c" | "ctrl" | "control" => Modifiers::CTRL,
        "a" | "alt" => Modifiers::ALT,
        "m" | "meta" | "cmd" => Modifiers::META,
        "mod" => {
          match platform {
            Platform::Mac => Modifiers::META,
            Platform::Other => Modifiers::CTRL,
          }
        },
        _ => return Err(KeymapError::InvalidModifier(modifier.to_string())),
      };
      if modifiers.contains(flag) {
        return Err(KeymapError::RepeatedModifier(modifier.to_string()));
      }
      modifiers.insert(flag);
    }

    Ok(Self {
      key: parse_key_token(key_token)?,
      modifiers,
    })
  }
}

impl FromStr for KeyCombo {
  type Err = KeymapError;

  fn from_str(s: &str) -> Result<Self> {
    Self::parse(s, Platform::current())
  }
}

impl fmt::Display for KeyCombo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.modifiers.contains(Modifiers::ALT) {
      f.write_str("Alt-")?;
    }
    if self.modifiers.contains(Modifiers::CTRL) {
      f.write_str("Ctrl-")?;
    }
    if self.modifiers.contains(Modifiers::META) {
      f.write_str("Meta-")?;
    }
    if self.modifiers.contains(Modifiers::SHIFT) {
      f.write_str("Shift-")?;
    }

    match self.key {
      Key::Char(' ') => f.write_str("Space"),
      Key::Char(c) => write!(f, "{c}"),
      Key::Enter => f.write_str("Enter"),
      Key::Escape => f.write_str("Escape"),
      Key::Backspace => f.write_str("Backspace"),
      Key::Tab => f.write_str("Tab"),
      Key::Delete => f.write_str("Delete"),
      Key::Insert => f.write_str("Insert"),
      Key::Home => f.write_str("Home"),
      Key::End => f.write_str("End"),
      Key::PageUp => f.write_str("PageUp"),
      Key::PageDown => f.write_str("PageDown"),
      Key::Left => f.write_str("ArrowLeft"),
      Key::Right => f.write_str("ArrowRight"),
      Key::Up => f.write_str("ArrowUp"),
      Key::Down => f.write_str("ArrowDown"),
      Key::F(n) => write!(f, "F{n}"),
    }
  }
}

fn parse_key_token(token: &str) -> Result<Key> {
  let mut chars = token.chars();
  if let (Some(ch), None) = (chars.next(), chars.next()) {
    return Ok(Key::Char(ch));
  }

  match token.to_ascii_lowercase().as_str() {
    "space" => Ok(Key::Char(' ')),
    "minus" => Ok(Key::Char('-')),
    "enter" | "ret" | "return" => Ok(Key::Enter),
    "esc" | "escape" => Ok(Key::Escape),
    "backspace" | "bs" => Ok(Key::Backspace),
    "tab" => Ok(Key::Tab),
    "delete" | "del" => Ok(Key::Delete),
    "insert" | "ins" => Ok(Key::Insert),
    "home" => Ok(Key::Home),
    "end" => Ok(Key::End),
    "pageup" | "pgup" => Ok(Key::PageUp),
    "pagedown" | "pgdown" => Ok(Key::PageDown),
    "left" | "arrowleft" => Ok(Key::Left),
    "right" | "arrowright" => Ok(Key::Right),
    "up" | "arrowup" => Ok(Key::Up),
    "down" | "arrowdown" => Ok(Key::Down),
    lower => {
      lower
        .strip_prefix('f')
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|n| (1..=24).contains(n))
        .map(Key::F)
        .ok_or_else(|| KeymapError::InvalidKey(token.to_string()))
    },
  }
}

/// A single key binding as declared by an extension.
#[derive(Clone)]
pub struct KeyBinding {
  pub key:             Tendril,
  pub mac:             Option<Tendril>,
  pub run:             Command,
  pub prevent_default: bool,
}

impl KeyBinding {
  pub fn new<F>(key: impl Into<Tendril>, run: F) -> Self
  where
    F: Fn(&EditorState) -> Option<Transaction> + Send + Sync + 'static,
  {
    Self {
      key:             key.into(),
      mac:             None,
      run:             Arc::new(run),
      prevent_default: false,
    }
  }

  /// Spelling to use on macOS instead of `key`.
  #[must_use]
  pub fn mac(mut self, key: impl Into<Tendril>) -> Self {
    self.mac = Some(key.into());
    self
  }

  #[must_use]
  pub fn prevent_default(mut self) -> Self {
    self.prevent_default = true;
    self
  }

  /// The literal that applies on `platform`.
  pub fn key_for(&self, platform: Platform) -> &str {
    match (platform, &self.mac) {
      (Platform::Mac, Some(mac)) => mac,
      _ => &self.key,
    }
  }
}

impl fmt::Debug for KeyBinding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("KeyBinding")
      .field("key", &self.key)
      .field("mac", &self.mac)
      .field("prevent_default", &self.prevent_default)
      .finish_non_exhaustive()
  }
}

/// What a key press resolved to.
#[derive(Debug)]
pub enum KeyOutcome {
  /// A command produced a transaction to dispatch.
  Handled(Transaction),
  /// A matching binding asked to swallow the key although its command did
  /// not apply.
  Prevented,
  /// Nothing matched; fall back to literal insertion.
  Unhandled,
}

#[derive(Debug, Clone)]
struct ResolvedBinding {
  binding: KeyBinding,
  other:   Option<KeyCombo>,
  mac:     Option<KeyCombo>,
}

impl ResolvedBinding {
  fn resolve(binding: KeyBinding) -> Self {
    let parse = |platform| {
      KeyCombo::parse(binding.key_for(platform), platform)
        .map_err(|err| {
          tracing::warn!(%err, key = binding.key_for(platform), "ignoring key binding");
        })
        .ok()
    };
    let other = parse(Platform::Other);
    let mac = parse(Platform::Mac);
    Self {
      binding,
      other,
      mac,
    }
  }

  fn combo(&self, platform: Platform) -> Option<&KeyCombo> {
    match platform {
      Platform::Mac => self.mac.as_ref(),
      Platform::Other => self.other.as_ref(),
    }
  }
}

/// Ordered bindings; earlier bindings take precedence.
#[derive(Debug, Clone, Default)]
pub struct Keymap {
  bindings: Vec<ResolvedBinding>,
}

impl Keymap {
  pub fn new(bindings: impl IntoIterator<Item = KeyBinding>) -> Self {
    Self {
      bindings: bindings.into_iter().map(ResolvedBinding::resolve).collect(),
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }

  pub fn bindings(&self) -> impl Iterator<Item = &KeyBinding> {
    self.bindings.iter().map(|resolved| &resolved.binding)
  }

  /// Bindings for `combo` on `platform`, in precedence order.
  pub fn lookup<'a>(
    &'a self,
    combo: &'a KeyCombo,
    platform: Platform,
  ) -> impl Iterator<Item = &'a KeyBinding> + 'a {
    self
      .bindings
      .iter()
      .filter(move |resolved| resolved.combo(platform) == Some(combo))
      .map(|resolved| &resolved.binding)
  }

  /// Run the commands bound to `combo` until one produces a transaction.
  pub fn run(&self, state: &EditorState, combo: &KeyCombo, platform: Platform) -> KeyOutcome {
    let mut prevented = false;
    for binding in self.lookup(combo, platform) {
      if let Some(transaction) = (binding.run)(state) {
        tracing::trace!(key = %combo, "key binding handled");
        return KeyOutcome::Handled(transaction);
      }
      prevented |= binding.prevent_default;
    }

    if prevented {
      KeyOutcome::Prevented
    } else {
      KeyOutcome::Unhandled
    }
  }
}
