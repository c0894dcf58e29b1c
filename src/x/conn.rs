//! Connection Module
//!
//! [`XConn`] is the explicit context object every subsystem works through:
//! it owns the server handle, the atom cache, the callback and binding
//! tables and the event queue. It is created once at startup and driven by
//! a single event-loop thread.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};
use x11rb::protocol::xproto::{Atom, ModMask, Timestamp, Window};
use x11rb::protocol::Event;

use crate::error::Result;
use crate::x::event::Callback;
use crate::x::keybind::KeyState;
use crate::x::keymap::Keymap;
use crate::x::mousebind::MouseState;
use crate::x::{EventKind, XServer};

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle for one key, button or drag binding; used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub(crate) u64);

/// Lock modifiers a binding should fire regardless of: none, caps lock,
/// num lock (mod2 on virtually every keymap) and both
pub fn default_ignore_mods() -> Vec<u16> {
    let lock = u16::from(ModMask::LOCK);
    let num = u16::from(ModMask::M2);
    vec![0, lock, num, lock | num]
}

pub struct XConn {
    server: Box<dyn XServer>,
    root: Window,
    atoms: RwLock<HashMap<String, Atom>>,
    atom_names: RwLock<HashMap<Atom, String>>,
    pub(crate) callbacks: RwLock<HashMap<(EventKind, Window), Vec<Callback>>>,
    pub(crate) queue: Mutex<VecDeque<Event>>,
    pub(crate) keymap: RwLock<Keymap>,
    pub(crate) keys: KeyState,
    pub(crate) mouse: MouseState,
    ignore_mods: RwLock<Vec<u16>>,
    next_binding: AtomicU64,
    time: AtomicU32,
    quit: AtomicBool,
}

impl XConn {
    /// Wrap a server connection and load its keyboard mapping
    pub fn new(server: impl XServer + 'static) -> Result<Self> {
        let keymap = Keymap::load(&server)?;
        let root = server.root();
        info!(
            "XConn ready: root 0x{:x}, keycodes {}..={}",
            root,
            keymap.min_keycode(),
            keymap.max_keycode()
        );
        Ok(Self {
            server: Box::new(server),
            root,
            atoms: RwLock::new(HashMap::new()),
            atom_names: RwLock::new(HashMap::new()),
            callbacks: RwLock::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            keymap: RwLock::new(keymap),
            keys: KeyState::default(),
            mouse: MouseState::default(),
            ignore_mods: RwLock::new(default_ignore_mods()),
            next_binding: AtomicU64::new(1),
            time: AtomicU32::new(x11rb::CURRENT_TIME),
            quit: AtomicBool::new(false),
        })
    }

    pub fn server(&self) -> &dyn XServer {
        self.server.as_ref()
    }

    pub fn root(&self) -> Window {
        self.root
    }

    pub fn screen_size(&self) -> (i32, i32) {
        let (w, h) = self.server.screen_size();
        (w as i32, h as i32)
    }

    /// Intern `name`, caching the result for the life of the connection
    pub fn atom(&self, name: &str) -> Result<Atom> {
        if let Some(atom) = read(&self.atoms).get(name) {
            return Ok(*atom);
        }
        let atom = self.server.intern_atom(name)?;
        write(&self.atoms).insert(name.to_string(), atom);
        write(&self.atom_names).insert(atom, name.to_string());
        Ok(atom)
    }

    pub fn atom_name(&self, atom: Atom) -> Result<String> {
        if let Some(name) = read(&self.atom_names).get(&atom) {
            return Ok(name.clone());
        }
        let name = self.server.atom_name(atom)?;
        write(&self.atom_names).insert(atom, name.clone());
        write(&self.atoms).insert(name.clone(), atom);
        Ok(name)
    }

    pub fn ignore_mods(&self) -> Vec<u16> {
        read(&self.ignore_mods).clone()
    }

    /// Replace the lock-modifier combinations every grab is replicated over
    ///
    /// Must be called before any binding is made: grabs already issued were
    /// replicated over the old set and will not be released correctly.
    pub fn set_ignore_mods(&self, mods: Vec<u16>) {
        debug!("Ignore modifiers set to {:?}", mods);
        *write(&self.ignore_mods) = mods;
    }

    /// Strip every ignored modifier bit from an event state
    pub fn clean_mods(&self, state: u16) -> u16 {
        read(&self.ignore_mods).iter().fold(state, |s, m| s & !m)
    }

    pub fn keymap(&self) -> RwLockReadGuard<'_, Keymap> {
        read(&self.keymap)
    }

    /// Timestamp of the most recent event that carried one
    pub fn time(&self) -> Timestamp {
        self.time.load(Ordering::Relaxed)
    }

    pub(crate) fn set_time(&self, time: Timestamp) {
        if time != x11rb::CURRENT_TIME {
            self.time.store(time, Ordering::Relaxed);
        }
    }

    pub(crate) fn next_binding_id(&self) -> BindingId {
        BindingId(self.next_binding.fetch_add(1, Ordering::Relaxed))
    }

    /// Ask the event loop to return after the current event
    pub fn stop(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }
}
