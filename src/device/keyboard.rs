//! Key binding parsing and dispatch with held-key tracking
//!
//! A binding is either a single key (`"1"`) or a `+`-joined chord
//! (`"alt+3"`, `"ctrl+shift+f1"`). Chords press modifiers down in order,
//! tap the final key, then release the modifiers in reverse order.

use super::error::{DeviceError, DeviceResult};
use super::types::InputSink;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    keys: Vec<String>,
}

impl KeyChord {
    pub fn parse(binding: &str) -> DeviceResult<Self> {
        let keys: Vec<String> = binding
            .split('+')
            .map(|part| part.trim().to_lowercase())
            .filter(|part| !part.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(DeviceError::EmptyKeyBinding {
                binding: binding.to_string(),
            });
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Everything but the last key
    pub fn modifiers(&self) -> &[String] {
        &self.keys[..self.keys.len() - 1]
    }

    /// The key that gets tapped
    pub fn key(&self) -> &str {
        &self.keys[self.keys.len() - 1]
    }

    pub fn is_single(&self) -> bool {
        self.keys.len() == 1
    }
}

impl FromStr for KeyChord {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keys.join("+"))
    }
}

/// Sends key bindings to an [`InputSink`] and remembers which keys it is
/// currently holding down, so a failed chord can be unwound without
/// touching keys this process never pressed.
pub struct KeyDispatcher<S: InputSink> {
    sink: S,
    held: Vec<String>,
}

impl<S: InputSink> KeyDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            held: Vec::new(),
        }
    }

    /// Press the binding. On failure every key still held is released
    /// before the error is returned.
    pub fn dispatch(&mut self, binding: &str) -> DeviceResult<()> {
        let chord = KeyChord::parse(binding)?;
        let result = if chord.is_single() {
            self.press(chord.key())
        } else {
            self.press_chord(chord.keys())
        };

        if let Err(e) = &result {
            log::error!("Key dispatch '{}' failed: {}", chord, e);
            let released = self.release_all();
            if released > 0 {
                log::warn!("Released {} stuck key(s) after failed dispatch", released);
            }
        }
        result
    }

    pub fn press(&mut self, key: &str) -> DeviceResult<()> {
        self.down(key)?;
        self.up(key)
    }

    /// Hold `keys[..n-1]` in order, tap `keys[n-1]`, release in reverse.
    pub fn press_chord(&mut self, keys: &[String]) -> DeviceResult<()> {
        let Some((last, modifiers)) = keys.split_last() else {
            return Err(DeviceError::EmptyKeyBinding {
                binding: String::new(),
            });
        };

        for modifier in modifiers {
            self.down(modifier)?;
        }
        self.down(last)?;
        self.up(last)?;
        for modifier in modifiers.iter().rev() {
            self.up(modifier)?;
        }
        Ok(())
    }

    /// Release every key this dispatcher still holds, newest first.
    /// Release failures are logged and the key is forgotten regardless.
    pub fn release_all(&mut self) -> usize {
        let count = self.held.len();
        while let Some(key) = self.held.pop() {
            if let Err(e) = self.sink.key_up(&key) {
                log::warn!("Could not release '{}': {}", key, e);
            }
        }
        count
    }

    pub fn held_keys(&self) -> &[String] {
        &self.held
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn down(&mut self, key: &str) -> DeviceResult<()> {
        self.sink.key_down(key)?;
        self.held.push(key.to_string());
        Ok(())
    }

    fn up(&mut self, key: &str) -> DeviceResult<()> {
        self.sink.key_up(key)?;
        if let Some(pos) = self.held.iter().rposition(|k| k == key) {
            self.held.remove(pos);
        }
        Ok(())
    }
}
