//! Events Module
//!
//! The single-threaded dispatcher: reads protocol events, compresses pointer
//! motion, routes key and button events through the binding registries and
//! then runs every callback registered for the event's kind and window, in
//! registration order.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use x11rb::protocol::xproto::{MotionNotifyEvent, Timestamp, Window};
use x11rb::protocol::Event;

use crate::error::Result;
use crate::x::conn::{lock, read, write};
use crate::x::keybind::KeyEventKind;
use crate::x::mousebind::ButtonEventKind;
use crate::x::XConn;

/// Generic event callback
pub type Callback = Arc<dyn Fn(&XConn, &Event) -> Result<()> + Send + Sync>;

/// Event type tag used as half of the callback table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    KeyPress,
    KeyRelease,
    ButtonPress,
    ButtonRelease,
    MotionNotify,
    EnterNotify,
    LeaveNotify,
    FocusIn,
    FocusOut,
    Expose,
    CreateNotify,
    DestroyNotify,
    UnmapNotify,
    MapNotify,
    MapRequest,
    ReparentNotify,
    ConfigureNotify,
    ConfigureRequest,
    PropertyNotify,
    SelectionClear,
    ClientMessage,
    MappingNotify,
}

impl EventKind {
    /// Kind of a core protocol event; `None` for errors and extension events
    pub fn of(event: &Event) -> Option<Self> {
        Some(match event {
            Event::KeyPress(_) => Self::KeyPress,
            Event::KeyRelease(_) => Self::KeyRelease,
            Event::ButtonPress(_) => Self::ButtonPress,
            Event::ButtonRelease(_) => Self::ButtonRelease,
            Event::MotionNotify(_) => Self::MotionNotify,
            Event::EnterNotify(_) => Self::EnterNotify,
            Event::LeaveNotify(_) => Self::LeaveNotify,
            Event::FocusIn(_) => Self::FocusIn,
            Event::FocusOut(_) => Self::FocusOut,
            Event::Expose(_) => Self::Expose,
            Event::CreateNotify(_) => Self::CreateNotify,
            Event::DestroyNotify(_) => Self::DestroyNotify,
            Event::UnmapNotify(_) => Self::UnmapNotify,
            Event::MapNotify(_) => Self::MapNotify,
            Event::MapRequest(_) => Self::MapRequest,
            Event::ReparentNotify(_) => Self::ReparentNotify,
            Event::ConfigureNotify(_) => Self::ConfigureNotify,
            Event::ConfigureRequest(_) => Self::ConfigureRequest,
            Event::PropertyNotify(_) => Self::PropertyNotify,
            Event::SelectionClear(_) => Self::SelectionClear,
            Event::ClientMessage(_) => Self::ClientMessage,
            Event::MappingNotify(_) => Self::MappingNotify,
            _ => return None,
        })
    }
}

/// Window an event is routed by
///
/// This is the window whose event mask selected the event: `event` for
/// input and structure notifications, `parent` for redirected requests.
/// Events without a window (MappingNotify) route to `x11rb::NONE`.
pub fn event_window(event: &Event) -> Window {
    match event {
        Event::KeyPress(e) => e.event,
        Event::KeyRelease(e) => e.event,
        Event::ButtonPress(e) => e.event,
        Event::ButtonRelease(e) => e.event,
        Event::MotionNotify(e) => e.event,
        Event::EnterNotify(e) => e.event,
        Event::LeaveNotify(e) => e.event,
        Event::FocusIn(e) => e.event,
        Event::FocusOut(e) => e.event,
        Event::Expose(e) => e.window,
        Event::CreateNotify(e) => e.parent,
        Event::DestroyNotify(e) => e.event,
        Event::UnmapNotify(e) => e.event,
        Event::MapNotify(e) => e.event,
        Event::MapRequest(e) => e.parent,
        Event::ReparentNotify(e) => e.event,
        Event::ConfigureNotify(e) => e.event,
        Event::ConfigureRequest(e) => e.parent,
        Event::PropertyNotify(e) => e.window,
        Event::SelectionClear(e) => e.owner,
        Event::ClientMessage(e) => e.window,
        _ => x11rb::NONE,
    }
}

/// Server timestamp carried by an event, if any
pub fn event_time(event: &Event) -> Option<Timestamp> {
    match event {
        Event::KeyPress(e) => Some(e.time),
        Event::KeyRelease(e) => Some(e.time),
        Event::ButtonPress(e) => Some(e.time),
        Event::ButtonRelease(e) => Some(e.time),
        Event::MotionNotify(e) => Some(e.time),
        Event::EnterNotify(e) => Some(e.time),
        Event::LeaveNotify(e) => Some(e.time),
        Event::PropertyNotify(e) => Some(e.time),
        Event::SelectionClear(e) => Some(e.time),
        _ => None,
    }
}

/// True when `b` supersedes `a` during motion compression
fn same_motion(a: &MotionNotifyEvent, b: &MotionNotifyEvent) -> bool {
    a.event == b.event
        && a.child == b.child
        && a.detail == b.detail
        && a.state == b.state
        && a.root == b.root
        && a.same_screen == b.same_screen
}

impl XConn {
    /// Register `callback` for events of `kind` routed to `window`
    ///
    /// Any number of callbacks may share a kind and window; they run in the
    /// order they were connected.
    pub fn connect<F>(&self, kind: EventKind, window: Window, callback: F)
    where
        F: Fn(&XConn, &Event) -> Result<()> + Send + Sync + 'static,
    {
        self.connect_callback(kind, window, Arc::new(callback));
    }

    pub(crate) fn connect_callback(&self, kind: EventKind, window: Window, callback: Callback) {
        write(&self.callbacks)
            .entry((kind, window))
            .or_default()
            .push(callback);
    }

    /// Remove one previously connected callback, matched by identity
    pub(crate) fn disconnect(&self, kind: EventKind, window: Window, callback: &Callback) {
        let mut callbacks = write(&self.callbacks);
        if let Some(chain) = callbacks.get_mut(&(kind, window)) {
            chain.retain(|cb| !Arc::ptr_eq(cb, callback));
            if chain.is_empty() {
                callbacks.remove(&(kind, window));
            }
        }
    }

    pub fn has_callbacks(&self, kind: EventKind, window: Window) -> bool {
        read(&self.callbacks)
            .get(&(kind, window))
            .is_some_and(|chain| !chain.is_empty())
    }

    /// Forget every callback and binding attached to `window`
    pub fn detach(&self, window: Window) {
        write(&self.callbacks).retain(|(_, w), _| *w != window);
        self.detach_keys(window);
        self.detach_buttons(window);
        debug!("Detached all callbacks from 0x{:x}", window);
    }

    /// Put an event at the back of the internal queue
    pub fn enqueue(&self, event: Event) {
        lock(&self.queue).push_back(event);
    }

    /// Move everything the server has already sent into the queue
    pub fn read_pending(&self) -> Result<()> {
        while let Some(event) = self.server().poll_for_event()? {
            self.enqueue(event);
        }
        Ok(())
    }

    fn pop_queued(&self) -> Option<Event> {
        lock(&self.queue).pop_front()
    }

    /// Dispatch everything currently available without blocking
    pub fn dispatch_pending(&self) -> Result<()> {
        self.read_pending()?;
        while let Some(event) = self.pop_queued() {
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// Block on the server and dispatch events until [`XConn::stop`]
    ///
    /// Only fatal conditions end the loop with an error: a lost connection or
    /// a keyboard map that cannot be reloaded.
    pub fn run(&self) -> Result<()> {
        info!("Entering event loop");
        while !self.is_stopped() {
            self.server().flush()?;
            let event = match self.pop_queued() {
                Some(event) => event,
                None => self.server().wait_for_event()?,
            };
            self.dispatch(event)?;
        }
        info!("Event loop stopped");
        Ok(())
    }

    /// Run every handler interested in `event`
    pub fn dispatch(&self, event: Event) -> Result<()> {
        let event = match event {
            Event::MotionNotify(e) => Event::MotionNotify(self.compress_motion(e)?),
            Event::Error(e) => {
                warn!(
                    "X11 Error: {:?}, request {:?} ({}), value 0x{:x}",
                    e.error_kind, e.request_name, e.major_opcode, e.bad_value
                );
                return Ok(());
            }
            other => other,
        };
        if let Some(time) = event_time(&event) {
            self.set_time(time);
        }
        let Some(kind) = EventKind::of(&event) else {
            trace!("Ignoring event {:?}", event);
            return Ok(());
        };

        match &event {
            Event::MappingNotify(e) => self.handle_mapping_notify(e)?,
            Event::KeyPress(e) => self.run_key_bindings(KeyEventKind::Press, e),
            Event::KeyRelease(e) => self.run_key_bindings(KeyEventKind::Release, e),
            Event::ButtonPress(e) => self.run_button_bindings(ButtonEventKind::Press, e),
            Event::ButtonRelease(e) => self.run_button_bindings(ButtonEventKind::Release, e),
            _ => {}
        }

        self.run_callbacks(kind, event_window(&event), &event);
        Ok(())
    }

    fn run_callbacks(&self, kind: EventKind, window: Window, event: &Event) {
        // Clone the chain so callbacks may connect or detach while running
        let chain = match read(&self.callbacks).get(&(kind, window)) {
            Some(chain) => chain.clone(),
            None => return,
        };
        for callback in chain {
            if let Err(e) = callback(self, event) {
                if e.is_bad_window() {
                    debug!("{:?} callback on vanished window 0x{:x}: {}", kind, window, e);
                } else {
                    warn!("{:?} callback on 0x{:x} failed: {}", kind, window, e);
                }
            }
        }
    }

    /// Collapse queued motion events into the most recent one
    ///
    /// Round trips first so everything the server has produced is queued,
    /// then removes every queued motion event matching `first` and returns
    /// the last of them (or `first` when there are none).
    fn compress_motion(&self, first: MotionNotifyEvent) -> Result<MotionNotifyEvent> {
        self.server().sync()?;
        self.read_pending()?;
        let mut last = first.clone();
        let mut dropped = 0usize;
        lock(&self.queue).retain(|event| match event {
            Event::MotionNotify(m) if same_motion(&first, m) => {
                last = m.clone();
                dropped += 1;
                false
            }
            _ => true,
        });
        if dropped > 0 {
            trace!("Compressed {} motion events", dropped);
        }
        Ok(last)
    }
}
