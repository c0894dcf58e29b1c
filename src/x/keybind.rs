//! Key Binding Module
//!
//! Binding strings such as "Mod4-t" resolve to one or more (modifiers,
//! keycode) pairs. Passive grabs are shared through a [`GrabRegistry`] and
//! replicated over the ignore-modifier set. Every binding is also kept in an
//! ordered log so it can be re-resolved after a keyboard mapping change.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};
use x11rb::protocol::xproto::{KeyPressEvent, Mapping, MappingNotifyEvent, ModMask, Window};

use crate::error::{Error, Result};
use crate::x::conn::{read, write, BindingId};
use crate::x::grabs::GrabRegistry;
use crate::x::keymap::{parse_modifier, Keymap};
use crate::x::XConn;

/// Key event callback; KeyRelease events share the KeyPress layout
pub type KeyCallback = Arc<dyn Fn(&XConn, &KeyPressEvent) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyEventKind {
    Press,
    Release,
}

/// One physical grab: event type, window, modifiers and keycode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyKey {
    pub kind: KeyEventKind,
    pub window: Window,
    pub mods: u16,
    pub keycode: u8,
}

/// A binding as it was requested, replayed after a mapping change
#[derive(Clone)]
struct KeyBinding {
    id: BindingId,
    kind: KeyEventKind,
    window: Window,
    binding: String,
    grab: bool,
    callback: KeyCallback,
    keys: Vec<KeyKey>,
}

#[derive(Default)]
pub(crate) struct KeyState {
    binds: RwLock<HashMap<KeyKey, Vec<(BindingId, KeyCallback)>>>,
    grabs: RwLock<GrabRegistry<KeyKey>>,
    log: RwLock<Vec<KeyBinding>>,
}

/// Resolve a key binding string to its modifier mask and keycodes
///
/// Tokens are separated by '-'. Modifier tokens accumulate wherever they
/// appear; exactly one other token names the key. A key name that resolves
/// to no keycode, or a string with no key or more than one, is an error.
pub fn parse_key_binding(keymap: &Keymap, binding: &str) -> Result<(u16, Vec<u8>)> {
    let invalid = || Error::InvalidKeyBinding(binding.to_string());
    let mut mods = 0u16;
    let mut keycodes: Option<Vec<u8>> = None;
    for token in binding.split('-') {
        if let Some(m) = parse_modifier(token, false) {
            mods |= m;
            continue;
        }
        if keycodes.is_some() {
            return Err(invalid());
        }
        let found = keymap.lookup(token);
        if found.is_empty() {
            return Err(invalid());
        }
        keycodes = Some(found);
    }
    keycodes.map(|codes| (mods, codes)).ok_or_else(invalid)
}

/// Turn a grab failure into the error a caller should see
pub(crate) fn classify_grab_error(binding: &str, window: Window, e: Error) -> Error {
    if e.is_access() {
        Error::AlreadyGrabbed {
            binding: binding.to_string(),
            window,
        }
    } else {
        Error::Grab {
            binding: binding.to_string(),
            window,
            source: Box::new(e),
        }
    }
}

impl XConn {
    /// Modifier masks a grab on `mods` is replicated over
    pub(crate) fn grab_mods(&self, mods: u16) -> Vec<u16> {
        if mods & u16::from(ModMask::ANY) != 0 {
            return vec![u16::from(ModMask::ANY)];
        }
        let mut out: Vec<u16> = self.ignore_mods().iter().map(|m| mods | m).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Grab `key` under every ignore-modifier variant, or none of them
    fn grab_key_all(&self, key: &KeyKey) -> Result<()> {
        let variants = self.grab_mods(key.mods);
        for (i, mods) in variants.iter().enumerate() {
            if let Err(e) = self.server().grab_key(key.window, *mods, key.keycode) {
                for done in &variants[..i] {
                    let _ = self.server().ungrab_key(key.window, *done, key.keycode);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn ungrab_key_all(&self, key: &KeyKey) -> Result<()> {
        for mods in self.grab_mods(key.mods) {
            self.server().ungrab_key(key.window, mods, key.keycode)?;
        }
        Ok(())
    }

    /// Bind `binding` on `window`
    ///
    /// With `grab` set, a passive grab is held for every keycode the string
    /// resolves to; otherwise the callback only fires for key events the
    /// window already receives. A grab conflict fails with
    /// [`Error::AlreadyGrabbed`] and leaves nothing behind.
    pub fn bind_key<F>(
        &self,
        kind: KeyEventKind,
        window: Window,
        binding: &str,
        grab: bool,
        callback: F,
    ) -> Result<BindingId>
    where
        F: Fn(&XConn, &KeyPressEvent) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.next_binding_id();
        let entry = KeyBinding {
            id,
            kind,
            window,
            binding: binding.to_string(),
            grab,
            callback: Arc::new(callback),
            keys: Vec::new(),
        };
        let entry = self.attach_key_binding(entry)?;
        write(&self.keys.log).push(entry);
        Ok(id)
    }

    /// Resolve, grab and register one binding, returning it with its keys
    fn attach_key_binding(&self, mut entry: KeyBinding) -> Result<KeyBinding> {
        let (mods, keycodes) = parse_key_binding(&self.keymap(), &entry.binding)?;
        let keys: Vec<KeyKey> = keycodes
            .into_iter()
            .map(|keycode| KeyKey {
                kind: entry.kind,
                window: entry.window,
                mods,
                keycode,
            })
            .collect();

        if entry.grab {
            let mut grabs = write(&self.keys.grabs);
            for (i, key) in keys.iter().enumerate() {
                let res = grabs.acquire(*key, |k| self.grab_key_all(k));
                if let Err(e) = res {
                    for done in &keys[..i] {
                        let _ = grabs.release(done, |k| self.ungrab_key_all(k));
                    }
                    return Err(classify_grab_error(&entry.binding, entry.window, e));
                }
            }
        }

        let mut binds = write(&self.keys.binds);
        for key in &keys {
            binds
                .entry(*key)
                .or_default()
                .push((entry.id, entry.callback.clone()));
        }
        debug!(
            "Bound '{}' on 0x{:x} ({} keycodes, grab {})",
            entry.binding,
            entry.window,
            keys.len(),
            entry.grab
        );
        entry.keys = keys;
        Ok(entry)
    }

    fn detach_key_binding(&self, entry: &KeyBinding) {
        let mut binds = write(&self.keys.binds);
        for key in &entry.keys {
            if let Some(chain) = binds.get_mut(key) {
                chain.retain(|(id, _)| *id != entry.id);
                if chain.is_empty() {
                    binds.remove(key);
                }
            }
        }
        drop(binds);
        if entry.grab {
            let mut grabs = write(&self.keys.grabs);
            for key in &entry.keys {
                if let Err(e) = grabs.release(key, |k| self.ungrab_key_all(k)) {
                    debug!("Ungrab of '{}' failed: {}", entry.binding, e);
                }
            }
        }
    }

    /// Remove one key binding; unknown ids are ignored
    pub fn unbind_key(&self, id: BindingId) {
        let removed = {
            let mut log = write(&self.keys.log);
            log.iter()
                .position(|b| b.id == id)
                .map(|pos| log.remove(pos))
        };
        if let Some(entry) = removed {
            self.detach_key_binding(&entry);
        }
    }

    /// Remove every key binding on `window`
    pub fn detach_keys(&self, window: Window) {
        let removed: Vec<KeyBinding> = {
            let mut log = write(&self.keys.log);
            let (gone, kept): (Vec<_>, Vec<_>) = log.drain(..).partition(|b| b.window == window);
            *log = kept;
            gone
        };
        for entry in &removed {
            self.detach_key_binding(entry);
        }
    }

    /// Number of references held on the grab for `key`
    pub fn key_grab_count(&self, key: &KeyKey) -> usize {
        read(&self.keys.grabs).count(key)
    }

    /// Run the callbacks bound to a key event
    ///
    /// Lock modifiers are stripped from the event state first; bindings made
    /// with the "any" modifier match regardless of state.
    pub(crate) fn run_key_bindings(&self, kind: KeyEventKind, event: &KeyPressEvent) {
        let mods = self.clean_mods(u16::from(event.state));
        let lookup = |mods: u16| KeyKey {
            kind,
            window: event.event,
            mods,
            keycode: event.detail,
        };
        let chain: Vec<KeyCallback> = {
            let binds = read(&self.keys.binds);
            [lookup(mods), lookup(u16::from(ModMask::ANY))]
                .iter()
                .filter_map(|k| binds.get(k))
                .flatten()
                .map(|(_, cb)| cb.clone())
                .collect()
        };
        for callback in chain {
            if let Err(e) = callback(self, event) {
                warn!("Key binding callback failed: {}", e);
            }
        }
    }

    /// Rebuild every key binding after a keyboard mapping change
    ///
    /// All grabs are released and the tables cleared, the keymap is reloaded
    /// and each logged binding is resolved and grabbed again in its original
    /// order, keeping its id. A keymap that cannot be reloaded is fatal.
    pub(crate) fn handle_mapping_notify(&self, event: &MappingNotifyEvent) -> Result<()> {
        if event.request == Mapping::POINTER {
            return Ok(());
        }
        info!("Keyboard mapping changed; rebuilding key bindings");

        let stale: Vec<KeyKey> = write(&self.keys.grabs).drain();
        for key in &stale {
            if let Err(e) = self.ungrab_key_all(key) {
                debug!("Ungrab during remap failed: {}", e);
            }
        }
        write(&self.keys.binds).clear();

        let keymap = Keymap::load(self.server())?;
        *write(&self.keymap) = keymap;

        let log: Vec<KeyBinding> = std::mem::take(&mut *write(&self.keys.log));
        let mut rebuilt = Vec::with_capacity(log.len());
        for entry in log {
            let binding = entry.binding.clone();
            match self.attach_key_binding(entry) {
                Ok(entry) => rebuilt.push(entry),
                Err(e) => warn!("Dropping binding '{}' after remap: {}", binding, e),
            }
        }
        *write(&self.keys.log) = rebuilt;
        Ok(())
    }
}
