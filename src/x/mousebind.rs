//! Mouse Binding Module
//!
//! Button bindings ("Mod1-1", "control-3") with reference counted passive
//! grabs, and the Begin/Step/End drag protocol built on top of them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, warn};
use x11rb::protocol::xproto::{ButtonPressEvent, Cursor, ModMask, MotionNotifyEvent, Window};
use x11rb::protocol::Event;

use crate::error::{Error, Result};
use crate::x::conn::{lock, read, write, BindingId};
use crate::x::grabs::GrabRegistry;
use crate::x::keybind::classify_grab_error;
use crate::x::keymap::parse_modifier;
use crate::x::event::Callback;
use crate::x::{EventKind, XConn};

/// Button event callback; ButtonRelease events share the ButtonPress layout
pub type ButtonCallback = Arc<dyn Fn(&XConn, &ButtonPressEvent) -> Result<()> + Send + Sync>;

/// Bits of an event state that record held buttons rather than modifiers
const BUTTON_STATE_MASK: u16 = 0x1f00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEventKind {
    Press,
    Release,
}

/// One physical grab: event type, window, modifiers and button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MouseKey {
    pub kind: ButtonEventKind,
    pub window: Window,
    pub mods: u16,
    pub button: u8,
}

struct MouseBinding {
    id: BindingId,
    key: MouseKey,
    grab: bool,
}

/// Pointer position handed to drag callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragPoint {
    pub root_x: i32,
    pub root_y: i32,
    pub event_x: i32,
    pub event_y: i32,
}

impl DragPoint {
    fn from_button(e: &ButtonPressEvent) -> Self {
        Self {
            root_x: e.root_x.into(),
            root_y: e.root_y.into(),
            event_x: e.event_x.into(),
            event_y: e.event_y.into(),
        }
    }

    fn from_motion(e: &MotionNotifyEvent) -> Self {
        Self {
            root_x: e.root_x.into(),
            root_y: e.root_y.into(),
            event_x: e.event_x.into(),
            event_y: e.event_y.into(),
        }
    }
}

/// What a drag's begin callback decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragDecision {
    pub proceed: bool,
    /// Cursor shown for the life of the drag; `x11rb::NONE` keeps the current one
    pub cursor: Cursor,
}

impl DragDecision {
    pub fn proceed(cursor: Cursor) -> Self {
        Self {
            proceed: true,
            cursor,
        }
    }

    pub fn cancel() -> Self {
        Self {
            proceed: false,
            cursor: x11rb::NONE,
        }
    }
}

pub type DragBeginFn = Arc<dyn Fn(&XConn, DragPoint) -> Result<DragDecision> + Send + Sync>;
pub type DragFn = Arc<dyn Fn(&XConn, DragPoint) -> Result<()> + Send + Sync>;

struct ActiveDrag {
    step: DragFn,
    end: DragFn,
}

#[derive(Default)]
pub(crate) struct MouseState {
    binds: RwLock<HashMap<MouseKey, Vec<(BindingId, ButtonCallback)>>>,
    grabs: RwLock<GrabRegistry<MouseKey>>,
    log: RwLock<Vec<MouseBinding>>,
    drag: Mutex<Option<ActiveDrag>>,
    /// Motion and release handlers installed on each drag grab window
    drag_windows: Mutex<HashMap<Window, Vec<(EventKind, Callback)>>>,
}

/// Resolve a button binding string to its modifier mask and button
///
/// Same grammar as key bindings, except that the key is a button number
/// and button1..button5 are accepted as modifiers.
pub fn parse_button_binding(binding: &str) -> Result<(u16, u8)> {
    let invalid = || Error::InvalidButtonBinding(binding.to_string());
    let mut mods = 0u16;
    let mut button = None;
    for token in binding.split('-') {
        if let Some(m) = parse_modifier(token, true) {
            mods |= m;
            continue;
        }
        match token.parse::<u8>() {
            Ok(b) if b > 0 && button.is_none() => button = Some(b),
            _ => return Err(invalid()),
        }
    }
    button.map(|b| (mods, b)).ok_or_else(invalid)
}

impl XConn {
    fn grab_button_all(&self, key: &MouseKey) -> Result<()> {
        let variants = self.grab_mods(key.mods);
        for (i, mods) in variants.iter().enumerate() {
            if let Err(e) = self.server().grab_button(key.window, *mods, key.button) {
                for done in &variants[..i] {
                    let _ = self.server().ungrab_button(key.window, *done, key.button);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn ungrab_button_all(&self, key: &MouseKey) -> Result<()> {
        for mods in self.grab_mods(key.mods) {
            self.server().ungrab_button(key.window, mods, key.button)?;
        }
        Ok(())
    }

    /// Bind `binding` on `window`, optionally holding a passive button grab
    pub fn bind_button<F>(
        &self,
        kind: ButtonEventKind,
        window: Window,
        binding: &str,
        grab: bool,
        callback: F,
    ) -> Result<BindingId>
    where
        F: Fn(&XConn, &ButtonPressEvent) -> Result<()> + Send + Sync + 'static,
    {
        let (mods, button) = parse_button_binding(binding)?;
        let key = MouseKey {
            kind,
            window,
            mods,
            button,
        };
        if grab {
            write(&self.mouse.grabs)
                .acquire(key, |k| self.grab_button_all(k))
                .map_err(|e| classify_grab_error(binding, window, e))?;
        }
        let id = self.next_binding_id();
        write(&self.mouse.binds)
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        write(&self.mouse.log).push(MouseBinding { id, key, grab });
        debug!("Bound button '{}' on 0x{:x}", binding, window);
        Ok(id)
    }

    fn detach_button_binding(&self, binding: &MouseBinding) {
        {
            let mut binds = write(&self.mouse.binds);
            if let Some(chain) = binds.get_mut(&binding.key) {
                chain.retain(|(id, _)| *id != binding.id);
                if chain.is_empty() {
                    binds.remove(&binding.key);
                }
            }
        }
        if binding.grab {
            let res = write(&self.mouse.grabs).release(&binding.key, |k| self.ungrab_button_all(k));
            if let Err(e) = res {
                debug!("Button ungrab on 0x{:x} failed: {}", binding.key.window, e);
            }
        }
    }

    /// Remove one button binding; unknown ids are ignored
    pub fn unbind_button(&self, id: BindingId) {
        let removed = {
            let mut log = write(&self.mouse.log);
            log.iter()
                .position(|b| b.id == id)
                .map(|pos| log.remove(pos))
        };
        if let Some(binding) = removed {
            self.detach_button_binding(&binding);
        }
    }

    /// Remove every button binding on `window`
    pub fn detach_buttons(&self, window: Window) {
        let removed: Vec<MouseBinding> = {
            let mut log = write(&self.mouse.log);
            let (gone, kept): (Vec<_>, Vec<_>) =
                log.drain(..).partition(|b| b.key.window == window);
            *log = kept;
            gone
        };
        for binding in &removed {
            self.detach_button_binding(binding);
        }
        let handlers = lock(&self.mouse.drag_windows).remove(&window);
        for (kind, callback) in handlers.into_iter().flatten() {
            self.disconnect(kind, window, &callback);
        }
    }

    pub fn button_grab_count(&self, key: &MouseKey) -> usize {
        read(&self.mouse.grabs).count(key)
    }

    pub(crate) fn run_button_bindings(&self, kind: ButtonEventKind, event: &ButtonPressEvent) {
        let state = self.clean_mods(u16::from(event.state));
        let mut candidates = vec![state, state & !BUTTON_STATE_MASK, u16::from(ModMask::ANY)];
        candidates.dedup();
        let chain: Vec<ButtonCallback> = {
            let binds = read(&self.mouse.binds);
            candidates
                .into_iter()
                .filter_map(|mods| {
                    binds.get(&MouseKey {
                        kind,
                        window: event.event,
                        mods,
                        button: event.detail,
                    })
                })
                .flatten()
                .map(|(_, cb)| cb.clone())
                .collect()
        };
        for callback in chain {
            if let Err(e) = callback(self, event) {
                warn!("Button binding callback failed: {}", e);
            }
        }
    }

    /// True while a drag holds the pointer
    pub fn is_dragging(&self) -> bool {
        lock(&self.mouse.drag).is_some()
    }

    /// Set up a drag started by pressing `binding` on `window`
    ///
    /// On press, `begin` decides whether to proceed and which cursor to show.
    /// The pointer is then actively grabbed on `grab_window`; each
    /// (compressed) motion runs `step`, and the release runs `end` followed by
    /// an unconditional pointer ungrab. Only one drag is active at a time.
    #[allow(clippy::too_many_arguments)]
    pub fn drag<B, S, E>(
        &self,
        grab_window: Window,
        window: Window,
        binding: &str,
        grab: bool,
        begin: B,
        step: S,
        end: E,
    ) -> Result<BindingId>
    where
        B: Fn(&XConn, DragPoint) -> Result<DragDecision> + Send + Sync + 'static,
        S: Fn(&XConn, DragPoint) -> Result<()> + Send + Sync + 'static,
        E: Fn(&XConn, DragPoint) -> Result<()> + Send + Sync + 'static,
    {
        let begin: DragBeginFn = Arc::new(begin);
        let step: DragFn = Arc::new(step);
        let end: DragFn = Arc::new(end);

        let id = self.bind_button(ButtonEventKind::Press, window, binding, grab, move |conn, e| {
            conn.drag_begin(grab_window, &begin, step.clone(), end.clone(), e)
        })?;

        let mut drag_windows = lock(&self.mouse.drag_windows);
        if !drag_windows.contains_key(&grab_window) {
            let motion: Callback = Arc::new(|conn: &XConn, ev: &Event| match ev {
                Event::MotionNotify(m) => conn.drag_step(m),
                _ => Ok(()),
            });
            let release: Callback = Arc::new(|conn: &XConn, ev: &Event| match ev {
                Event::ButtonRelease(b) => conn.drag_end(b),
                _ => Ok(()),
            });
            self.connect_callback(EventKind::MotionNotify, grab_window, motion.clone());
            self.connect_callback(EventKind::ButtonRelease, grab_window, release.clone());
            drag_windows.insert(
                grab_window,
                vec![
                    (EventKind::MotionNotify, motion),
                    (EventKind::ButtonRelease, release),
                ],
            );
        }
        Ok(id)
    }

    fn drag_begin(
        &self,
        grab_window: Window,
        begin: &DragBeginFn,
        step: DragFn,
        end: DragFn,
        event: &ButtonPressEvent,
    ) -> Result<()> {
        if self.is_dragging() {
            return Ok(());
        }
        let decision = begin(self, DragPoint::from_button(event))?;
        if !decision.proceed {
            return Ok(());
        }
        if !self
            .server()
            .grab_pointer(grab_window, x11rb::NONE, decision.cursor)?
        {
            debug!("Pointer grab refused; drag not started");
            return Ok(());
        }
        *lock(&self.mouse.drag) = Some(ActiveDrag { step, end });
        Ok(())
    }

    fn drag_step(&self, event: &MotionNotifyEvent) -> Result<()> {
        let step = match lock(&self.mouse.drag).as_ref() {
            Some(drag) => drag.step.clone(),
            None => return Ok(()),
        };
        step(self, DragPoint::from_motion(event))
    }

    fn drag_end(&self, event: &ButtonPressEvent) -> Result<()> {
        let active = lock(&self.mouse.drag).take();
        let res = match active {
            Some(drag) => (drag.end)(self, DragPoint::from_button(event)),
            None => Ok(()),
        };
        self.server().ungrab_pointer()?;
        res
    }
}
