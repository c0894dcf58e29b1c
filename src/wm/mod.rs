//! Window Manager Module
//!
//! Manages top-level windows on top of the event dispatcher: frames and
//! reparents clients, keeps the focus order, tracks docks and the workareas
//! their struts leave, and runs the configured shortcuts.

pub mod client;
pub mod shortcuts;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, trace, warn};
use x11rb::protocol::xproto::{
    Atom, ClientMessageEvent, ConfigWindow, ConfigureRequestEvent, EventMask, PropertyNotifyEvent,
    Window,
};
use x11rb::protocol::Event;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::rect::{Rect, Strut};
use crate::x::conn::{lock, read, write};
use crate::x::ewmh::{self, StateAction};
use crate::x::heads::Heads;
use crate::x::icccm::{self, WmState};
use crate::x::keybind::KeyEventKind;
use crate::x::mousebind::{DragDecision, DragPoint};
use crate::x::{EventKind, WindowChanges, XConn, XWindow};

pub use client::Client;
pub use shortcuts::Shortcut;

/// Name published on the supporting check window
pub const WM_NAME: &str = "FyneDesk";

const WAKE_ATOM: &str = "_FYNEDESK_WAKE";

/// Notifications for code that mirrors the window list, such as a taskbar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    Added(Window),
    Removed(Window),
    Focused(Window),
    TitleChanged(Window, String),
    WorkareaChanged(Vec<Rect>),
}

pub type Listener = Arc<dyn Fn(&WindowEvent) + Send + Sync>;

fn root_event_mask() -> EventMask {
    EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY
}

struct State {
    /// In the order they were managed
    clients: Vec<Client>,
    /// Most recently focused first
    focus_stack: Vec<Window>,
    active: Option<Window>,
    docks: BTreeMap<Window, Strut>,
    heads: Heads,
}

impl State {
    fn index(&self, window: Window) -> Option<usize> {
        self.clients.iter().position(|c| c.id() == window)
    }

    fn client(&self, window: Window) -> Option<&Client> {
        self.clients.iter().find(|c| c.id() == window)
    }

    fn client_mut(&mut self, window: Window) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.id() == window)
    }

    fn publish_lists(&self, conn: &XConn) -> Result<()> {
        let ids: Vec<Window> = self.clients.iter().map(Client::id).collect();
        ewmh::set_client_list(conn, &ids)?;
        // bottom to top
        let stacking: Vec<Window> = self.focus_stack.iter().rev().copied().collect();
        ewmh::set_client_list_stacking(conn, &stacking)
    }

    fn focus(&mut self, conn: &XConn, window: Window, events: &mut Vec<WindowEvent>) -> Result<()> {
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        client.restore(conn)?;
        client.raise(conn)?;
        client.focus(conn)?;
        ewmh::set_active_window(conn, window)?;

        self.focus_stack.retain(|w| *w != window);
        self.focus_stack.insert(0, window);
        self.active = Some(window);
        self.publish_lists(conn)?;
        events.push(WindowEvent::Focused(window));
        Ok(())
    }

    /// Focus the most recent client still on screen, or the root
    fn focus_fallback(&mut self, conn: &XConn, events: &mut Vec<WindowEvent>) -> Result<()> {
        let next = self
            .focus_stack
            .iter()
            .copied()
            .find(|w| self.client(*w).is_some_and(|c| !c.minimized));
        match next {
            Some(window) => self.focus(conn, window, events),
            None => {
                self.active = None;
                conn.server().set_input_focus(conn.root(), conn.time())?;
                ewmh::set_active_window(conn, x11rb::NONE)
            }
        }
    }

    fn focus_next(&mut self, conn: &XConn, events: &mut Vec<WindowEvent>) -> Result<()> {
        match self.focus_stack.last().copied() {
            Some(window) if self.active != Some(window) => self.focus(conn, window, events),
            _ => Ok(()),
        }
    }

    fn focus_previous(&mut self, conn: &XConn, events: &mut Vec<WindowEvent>) -> Result<()> {
        if self.focus_stack.len() > 1 {
            self.focus_stack.rotate_left(1);
        }
        match self.focus_stack.first().copied() {
            Some(window) if self.active != Some(window) => self.focus(conn, window, events),
            _ => Ok(()),
        }
    }

    fn minimize(&mut self, conn: &XConn, window: Window, events: &mut Vec<WindowEvent>) -> Result<()> {
        let Some(client) = self.client_mut(window) else {
            return Ok(());
        };
        if client.minimized {
            return Ok(());
        }
        client.minimize(conn)?;
        self.focus_stack.retain(|w| *w != window);
        self.focus_stack.push(window);
        if self.active == Some(window) {
            self.focus_fallback(conn, events)?;
        }
        self.publish_lists(conn)
    }

    fn toggle_maximize(&mut self, conn: &XConn, window: Window) -> Result<()> {
        let Some(i) = self.index(window) else {
            return Ok(());
        };
        let area = self.heads.workarea_for(&self.clients[i].outer_rect());
        let client = &mut self.clients[i];
        let action = match client.saved_rect.take() {
            Some(saved) => {
                client.move_resize_outer(conn, saved)?;
                StateAction::Remove
            }
            None => {
                client.saved_rect = Some(client.outer_rect());
                client.move_resize_outer(conn, area)?;
                StateAction::Add
            }
        };
        debug!("Maximize 0x{:x}: {:?}", window, action);
        for state in [ewmh::STATE_MAXIMIZED_VERT, ewmh::STATE_MAXIMIZED_HORZ] {
            ewmh::update_state(conn, window, action, state)?;
        }
        Ok(())
    }

    /// Apply a `_NET_WM_STATE` request for the states this manager supports
    fn request_state(
        &mut self,
        conn: &XConn,
        window: Window,
        action: StateAction,
        states: &[String],
        events: &mut Vec<WindowEvent>,
    ) -> Result<()> {
        let Some(client) = self.client(window) else {
            return Ok(());
        };
        let (maximized, minimized) = (client.is_maximized(), client.minimized);
        let wanted = |current: bool| match action {
            StateAction::Add => true,
            StateAction::Remove => false,
            StateAction::Toggle => !current,
        };

        let maximize = states
            .iter()
            .any(|s| s == ewmh::STATE_MAXIMIZED_VERT || s == ewmh::STATE_MAXIMIZED_HORZ);
        if maximize && wanted(maximized) != maximized {
            self.toggle_maximize(conn, window)?;
        }
        if states.iter().any(|s| s == ewmh::STATE_HIDDEN) {
            match (wanted(minimized), minimized) {
                (true, false) => self.minimize(conn, window, events)?,
                (false, true) => self.focus(conn, window, events)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn refresh_workareas(&mut self, conn: &XConn, events: &mut Vec<WindowEvent>) -> Result<()> {
        self.heads.apply_struts(self.docks.values());
        ewmh::set_workarea(conn, self.heads.bounding_workarea())?;
        events.push(WindowEvent::WorkareaChanged(self.heads.workareas().to_vec()));
        Ok(())
    }

    fn unmanage(
        &mut self,
        conn: &XConn,
        window: Window,
        destroyed: bool,
        events: &mut Vec<WindowEvent>,
    ) -> Result<()> {
        let Some(i) = self.index(window) else {
            return Ok(());
        };
        let mut client = self.clients.remove(i);
        self.focus_stack.retain(|w| *w != window);
        let released = client.unmanage(conn, destroyed);

        self.publish_lists(conn)?;
        events.push(WindowEvent::Removed(window));
        if self.active == Some(window) {
            self.focus_fallback(conn, events)?;
        }
        released
    }
}

struct Inner {
    config: Config,
    check: Window,
    wake_atom: Atom,
    state: Mutex<State>,
    listeners: RwLock<Vec<Listener>>,
}

impl Inner {
    /// Run `f` under the state lock, then notify listeners of what it did
    fn update<T>(&self, f: impl FnOnce(&mut State, &mut Vec<WindowEvent>) -> Result<T>) -> Result<T> {
        let mut events = Vec::new();
        let res = f(&mut lock(&self.state), &mut events);
        self.emit(&events);
        res
    }

    fn emit(&self, events: &[WindowEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = read(&self.listeners).clone();
        for event in events {
            trace!("Window event {:?}", event);
            for listener in &listeners {
                listener(event);
            }
        }
    }

    /// MapRequest, ConfigureRequest, UnmapNotify and DestroyNotify arrive
    /// on the root for top-level windows and on a frame for its client
    fn connect_structure(self: &Arc<Self>, conn: &XConn, window: Window) {
        let inner = self.clone();
        conn.connect(EventKind::MapRequest, window, move |conn, ev| match ev {
            Event::MapRequest(e) => inner.map_request(conn, e.window),
            _ => Ok(()),
        });
        let inner = self.clone();
        conn.connect(EventKind::ConfigureRequest, window, move |conn, ev| match ev {
            Event::ConfigureRequest(e) => inner.configure_request(conn, e),
            _ => Ok(()),
        });
        let inner = self.clone();
        conn.connect(EventKind::UnmapNotify, window, move |conn, ev| match ev {
            Event::UnmapNotify(e) => inner.unmap_notify(conn, e.window),
            _ => Ok(()),
        });
        let inner = self.clone();
        conn.connect(EventKind::DestroyNotify, window, move |conn, ev| match ev {
            Event::DestroyNotify(e) => inner.destroy_notify(conn, e.window),
            _ => Ok(()),
        });
    }

    fn connect_properties(self: &Arc<Self>, conn: &XConn, window: Window) {
        let inner = self.clone();
        conn.connect(EventKind::PropertyNotify, window, move |conn, ev| match ev {
            Event::PropertyNotify(e) => inner.property_notify(conn, e),
            _ => Ok(()),
        });
    }

    fn bind_shortcuts(self: &Arc<Self>, conn: &XConn) {
        for config in &self.config.shortcuts {
            let Some(shortcut) = Shortcut::from_config(config) else {
                continue;
            };
            let inner = self.clone();
            let action = shortcut.clone();
            let res = conn.bind_key(
                KeyEventKind::Press,
                conn.root(),
                &config.binding,
                true,
                move |conn, _| inner.run_shortcut(conn, &action),
            );
            match res {
                Ok(_) => debug!("Bound {} to {:?}", config.binding, shortcut),
                Err(e) => warn!("Failed to bind shortcut {}: {}", config.binding, e),
            }
        }
    }

    /// Manage every window that was already on screen
    fn adopt(self: &Arc<Self>, conn: &XConn) -> Result<()> {
        let tree = conn.server().query_tree(conn.root())?;
        for window in tree.children {
            if window == self.check {
                continue;
            }
            let attrs = match conn.server().window_attributes(window) {
                Ok(attrs) => attrs,
                Err(e) => {
                    debug!("Skipping 0x{:x}: {}", window, e);
                    continue;
                }
            };
            if attrs.override_redirect || !attrs.viewable {
                continue;
            }
            if let Err(e) = self.manage(conn, window) {
                warn!("Failed to adopt 0x{:x}: {}", window, e);
            }
        }
        Ok(())
    }

    fn manage(self: &Arc<Self>, conn: &XConn, window: Window) -> Result<()> {
        if ewmh::is_dock(conn, window)? {
            return self.manage_dock(conn, window);
        }

        let mut client = Client::manage(conn, window, &self.config.decorations)?;
        self.connect_client(conn, &client);
        let iconic = client.hints.starts_iconic();
        if iconic {
            client.show_iconic(conn)?;
        } else {
            client.show(conn)?;
        }

        self.update(|st, events| {
            st.clients.push(client);
            events.push(WindowEvent::Added(window));
            if iconic {
                st.focus_stack.push(window);
                st.publish_lists(conn)
            } else {
                st.focus(conn, window, events)
            }
        })
    }

    fn connect_client(self: &Arc<Self>, conn: &XConn, client: &Client) {
        let id = client.id();
        if let Some(frame) = &client.frame {
            self.connect_structure(conn, frame.id);
            if self.config.mouse.focus_on_click {
                let inner = self.clone();
                conn.connect(EventKind::ButtonPress, frame.id, move |conn, _| {
                    inner.update(|st, events| {
                        if st.active == Some(id) {
                            return Ok(());
                        }
                        st.focus(conn, id, events)
                    })
                });
            }
        }
        self.connect_properties(conn, id);

        let inner = self.clone();
        conn.connect(EventKind::ClientMessage, id, move |conn, ev| match ev {
            Event::ClientMessage(e) => inner.client_message(conn, e),
            _ => Ok(()),
        });

        if let Err(e) = self.bind_move(conn, client.top().id, id) {
            warn!("Failed to bind window move on 0x{:x}: {}", id, e);
        }
    }

    /// Drag the window with the configured button binding
    fn bind_move(self: &Arc<Self>, conn: &XConn, top: Window, id: Window) -> Result<()> {
        let origin: Arc<Mutex<Option<(DragPoint, Rect)>>> = Arc::default();

        let (inner, start) = (self.clone(), origin.clone());
        let begin = move |conn: &XConn, p: DragPoint| -> Result<DragDecision> {
            let outer = inner.update(|st, events| {
                let Some(client) = st.client(id) else {
                    return Ok(None);
                };
                if client.is_maximized() {
                    return Ok(None);
                }
                let outer = client.outer_rect();
                st.focus(conn, id, events)?;
                Ok(Some(outer))
            })?;
            Ok(match outer {
                Some(outer) => {
                    *lock(&start) = Some((p, outer));
                    DragDecision::proceed(x11rb::NONE)
                }
                None => DragDecision::cancel(),
            })
        };

        let (inner, start) = (self.clone(), origin.clone());
        let step = move |conn: &XConn, p: DragPoint| inner.drag_to(conn, id, &start, p);

        let inner = self.clone();
        let end = move |conn: &XConn, p: DragPoint| {
            let res = inner.drag_to(conn, id, &origin, p);
            *lock(&origin) = None;
            res
        };

        conn.drag(
            conn.root(),
            top,
            &self.config.mouse.move_binding,
            true,
            begin,
            step,
            end,
        )?;
        Ok(())
    }

    fn drag_to(
        &self,
        conn: &XConn,
        id: Window,
        origin: &Mutex<Option<(DragPoint, Rect)>>,
        p: DragPoint,
    ) -> Result<()> {
        let Some((start, outer)) = *lock(origin) else {
            return Ok(());
        };
        let x = outer.x + p.root_x - start.root_x;
        let y = outer.y + p.root_y - start.root_y;
        self.update(|st, _| match st.client_mut(id) {
            Some(client) => client.move_to(conn, x, y),
            None => Ok(()),
        })
    }

    fn manage_dock(self: &Arc<Self>, conn: &XConn, window: Window) -> Result<()> {
        let strut = ewmh::strut(conn, window)?.unwrap_or_default();
        XWindow::new(window).listen(conn, EventMask::PROPERTY_CHANGE)?;
        self.connect_properties(conn, window);
        conn.server().map_window(window)?;
        info!("Managing dock 0x{:x}", window);
        self.update(|st, events| {
            st.docks.insert(window, strut);
            st.refresh_workareas(conn, events)
        })
    }

    fn map_request(self: &Arc<Self>, conn: &XConn, window: Window) -> Result<()> {
        let known = self.update(|st, events| {
            if st.docks.contains_key(&window) {
                conn.server().map_window(window)?;
                return Ok(true);
            }
            if st.index(window).is_none() {
                return Ok(false);
            }
            st.focus(conn, window, events)?;
            Ok(true)
        })?;
        if known {
            return Ok(());
        }

        if conn.server().window_attributes(window)?.override_redirect {
            return conn.server().map_window(window);
        }
        self.manage(conn, window)
    }

    fn configure_request(&self, conn: &XConn, e: &ConfigureRequestEvent) -> Result<()> {
        let mask = u16::from(e.value_mask);
        let has = move |flag: ConfigWindow| mask & u16::from(flag) != 0;

        let managed = self.update(|st, _| {
            let Some(client) = st.client_mut(e.window) else {
                return Ok(false);
            };
            if client.is_maximized() {
                return Ok(true);
            }
            if has(ConfigWindow::WIDTH) || has(ConfigWindow::HEIGHT) {
                let width = if has(ConfigWindow::WIDTH) {
                    i32::from(e.width)
                } else {
                    client.window.geom.width
                };
                let height = if has(ConfigWindow::HEIGHT) {
                    i32::from(e.height)
                } else {
                    client.window.geom.height
                };
                client.resize_client(conn, width, height)?;
            }
            if has(ConfigWindow::X) || has(ConfigWindow::Y) {
                let outer = client.outer_rect();
                let x = if has(ConfigWindow::X) {
                    i32::from(e.x) - client.extents.left
                } else {
                    outer.x
                };
                let y = if has(ConfigWindow::Y) {
                    i32::from(e.y) - client.extents.top
                } else {
                    outer.y
                };
                client.move_to(conn, x, y)?;
            }
            Ok(true)
        })?;
        if managed {
            return Ok(());
        }

        let changes = WindowChanges {
            x: has(ConfigWindow::X).then_some(i32::from(e.x)),
            y: has(ConfigWindow::Y).then_some(i32::from(e.y)),
            width: has(ConfigWindow::WIDTH).then_some(u32::from(e.width)),
            height: has(ConfigWindow::HEIGHT).then_some(u32::from(e.height)),
            border_width: has(ConfigWindow::BORDER_WIDTH).then_some(u32::from(e.border_width)),
            sibling: has(ConfigWindow::SIBLING).then_some(e.sibling),
            stack_mode: has(ConfigWindow::STACK_MODE).then_some(e.stack_mode),
        };
        debug!("Passing configure request through for 0x{:x}", e.window);
        conn.server().configure_window(e.window, &changes)
    }

    fn unmap_notify(&self, conn: &XConn, window: Window) -> Result<()> {
        self.update(|st, events| {
            if st.docks.remove(&window).is_some() {
                conn.detach(window);
                return st.refresh_workareas(conn, events);
            }
            let Some(client) = st.client_mut(window) else {
                return Ok(());
            };
            if client.pending_unmaps > 0 {
                client.pending_unmaps -= 1;
                return Ok(());
            }
            st.unmanage(conn, window, false, events)
        })
    }

    fn destroy_notify(&self, conn: &XConn, window: Window) -> Result<()> {
        self.update(|st, events| {
            if st.docks.remove(&window).is_some() {
                conn.detach(window);
                return st.refresh_workareas(conn, events);
            }
            st.unmanage(conn, window, true, events)
        })
    }

    fn property_notify(&self, conn: &XConn, e: &PropertyNotifyEvent) -> Result<()> {
        let window = e.window;
        let name = conn.atom_name(e.atom)?;
        trace!("Property {} changed on 0x{:x}", name, window);
        match name.as_str() {
            "_NET_WM_STRUT" | "_NET_WM_STRUT_PARTIAL" => {
                let strut = ewmh::strut(conn, window)?.unwrap_or_default();
                self.update(|st, events| {
                    match st.docks.get_mut(&window) {
                        Some(current) if *current != strut => *current = strut,
                        _ => return Ok(()),
                    }
                    st.refresh_workareas(conn, events)
                })
            }
            "_NET_WM_NAME" | "WM_NAME" => {
                let title = ewmh::title(conn, window)?;
                self.update(|st, events| {
                    if let Some(client) = st.client_mut(window) {
                        if client.title != title {
                            client.title = title.clone();
                            events.push(WindowEvent::TitleChanged(window, title));
                        }
                    }
                    Ok(())
                })
            }
            "WM_HINTS" => {
                let hints = icccm::wm_hints(conn, window)?.unwrap_or_default();
                self.update(|st, _| {
                    let Some(client) = st.client_mut(window) else {
                        return Ok(());
                    };
                    let urgent = hints.is_urgent();
                    let changed = client.hints.is_urgent() != urgent;
                    client.hints = hints;
                    if changed {
                        let action = if urgent {
                            StateAction::Add
                        } else {
                            StateAction::Remove
                        };
                        ewmh::update_state(conn, window, action, ewmh::STATE_DEMANDS_ATTENTION)?;
                    }
                    Ok(())
                })
            }
            "WM_NORMAL_HINTS" => {
                let size_hints = icccm::wm_normal_hints(conn, window)?.unwrap_or_default();
                self.update(|st, _| {
                    if let Some(client) = st.client_mut(window) {
                        client.size_hints = size_hints;
                    }
                    Ok(())
                })
            }
            "WM_PROTOCOLS" => {
                let protocols = icccm::wm_protocols(conn, window)?;
                self.update(|st, _| {
                    if let Some(client) = st.client_mut(window) {
                        client.protocols = protocols;
                    }
                    Ok(())
                })
            }
            _ => Ok(()),
        }
    }

    fn client_message(&self, conn: &XConn, e: &ClientMessageEvent) -> Result<()> {
        let window = e.window;
        let name = conn.atom_name(e.type_)?;
        let data = e.data.as_data32();
        debug!("Client message {} for 0x{:x}", name, window);
        match name.as_str() {
            "_NET_ACTIVE_WINDOW" => self.update(|st, events| st.focus(conn, window, events)),
            "_NET_CLOSE_WINDOW" => self.close(conn, window),
            "WM_CHANGE_STATE" if data[0] == WmState::Iconic as u32 => {
                self.update(|st, events| st.minimize(conn, window, events))
            }
            "_NET_WM_STATE" => {
                let Some(action) = StateAction::from_u32(data[0]) else {
                    debug!("Ignoring _NET_WM_STATE action {}", data[0]);
                    return Ok(());
                };
                let states = [data[1], data[2]]
                    .into_iter()
                    .filter(|a| *a != x11rb::NONE)
                    .map(|a| conn.atom_name(a))
                    .collect::<Result<Vec<String>>>()?;
                self.update(|st, events| st.request_state(conn, window, action, &states, events))
            }
            _ => Ok(()),
        }
    }

    fn close(&self, conn: &XConn, window: Window) -> Result<()> {
        let st = lock(&self.state);
        match st.client(window) {
            Some(client) => client.close(conn),
            None => Ok(()),
        }
    }

    fn run_shortcut(&self, conn: &XConn, shortcut: &Shortcut) -> Result<()> {
        debug!("Shortcut {:?}", shortcut);
        if shortcut.needs_focus() {
            let active = lock(&self.state).active;
            let Some(window) = active else {
                return Ok(());
            };
            return match shortcut {
                Shortcut::CloseWindow => self.close(conn, window),
                Shortcut::ToggleMaximize => self.update(|st, _| st.toggle_maximize(conn, window)),
                Shortcut::Minimize => self.update(|st, events| st.minimize(conn, window, events)),
                _ => Ok(()),
            };
        }
        match shortcut {
            Shortcut::FocusNext => self.update(|st, events| st.focus_next(conn, events)),
            Shortcut::FocusPrevious => self.update(|st, events| st.focus_previous(conn, events)),
            Shortcut::Spawn(command) => {
                shortcuts::spawn(command);
                Ok(())
            }
            Shortcut::Quit => {
                info!("Quit requested");
                conn.stop();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Handle to the running window manager
///
/// Cheap to clone; every clone drives the same state. Methods that talk to
/// the server take the [`XConn`] the manager was started on.
#[derive(Clone)]
pub struct WindowManager {
    inner: Arc<Inner>,
}

impl WindowManager {
    /// Become the window manager for the root of `conn`
    ///
    /// Fails with [`Error::OtherWmRunning`] when another client already
    /// holds substructure redirection on the root.
    pub fn start(conn: &XConn, config: Config) -> Result<Self> {
        let root = conn.root();
        conn.server()
            .select_input(root, root_event_mask())
            .map_err(|e| if e.is_access() { Error::OtherWmRunning } else { e })?;

        match config.input.ignore_mods() {
            Ok(mods) => conn.set_ignore_mods(mods),
            Err(e) => warn!("{:#}; keeping default ignore modifiers", e),
        }

        let check = XWindow::create(conn, root, Rect::new(-1, -1, 1, 1), EventMask::NO_EVENT)?;
        ewmh::set_supporting_wm_check(conn, check.id)?;
        ewmh::set_wm_name(conn, check.id, WM_NAME)?;
        ewmh::set_supported(conn, ewmh::SUPPORTED)?;

        let heads = Heads::load(conn)?;
        info!("Heads: {:?}", heads.physical());
        ewmh::set_workarea(conn, heads.bounding_workarea())?;

        let inner = Arc::new(Inner {
            config,
            check: check.id,
            wake_atom: conn.atom(WAKE_ATOM)?,
            state: Mutex::new(State {
                clients: Vec::new(),
                focus_stack: Vec::new(),
                active: None,
                docks: BTreeMap::new(),
                heads,
            }),
            listeners: RwLock::default(),
        });

        inner.connect_structure(conn, root);
        conn.connect(EventKind::ClientMessage, check.id, |_, _| {
            trace!("Dispatcher woken");
            Ok(())
        });
        inner.bind_shortcuts(conn);
        inner.adopt(conn)?;

        info!("Window manager started on root 0x{:x}", root);
        Ok(Self { inner })
    }

    /// The supporting check window, also used to wake the dispatcher
    pub fn check_window(&self) -> Window {
        self.inner.check
    }

    /// Register a listener for window list changes
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&WindowEvent) + Send + Sync + 'static,
    {
        write(&self.inner.listeners).push(Arc::new(listener));
    }

    /// Managed clients in the order they were managed
    pub fn clients(&self) -> Vec<Window> {
        lock(&self.inner.state).clients.iter().map(Client::id).collect()
    }

    pub fn focused(&self) -> Option<Window> {
        lock(&self.inner.state).active
    }

    /// Geometry of the client including its frame
    pub fn client_rect(&self, window: Window) -> Option<Rect> {
        lock(&self.inner.state).client(window).map(Client::outer_rect)
    }

    pub fn title(&self, window: Window) -> Option<String> {
        lock(&self.inner.state).client(window).map(|c| c.title.clone())
    }

    pub fn is_minimized(&self, window: Window) -> bool {
        lock(&self.inner.state).client(window).is_some_and(|c| c.minimized)
    }

    pub fn is_maximized(&self, window: Window) -> bool {
        lock(&self.inner.state).client(window).is_some_and(Client::is_maximized)
    }

    /// Per-head area left after dock struts
    pub fn workareas(&self) -> Vec<Rect> {
        lock(&self.inner.state).heads.workareas().to_vec()
    }

    pub fn focus(&self, conn: &XConn, window: Window) -> Result<()> {
        self.inner.update(|st, events| st.focus(conn, window, events))
    }

    pub fn focus_next(&self, conn: &XConn) -> Result<()> {
        self.inner.update(|st, events| st.focus_next(conn, events))
    }

    pub fn focus_previous(&self, conn: &XConn) -> Result<()> {
        self.inner.update(|st, events| st.focus_previous(conn, events))
    }

    pub fn close(&self, conn: &XConn, window: Window) -> Result<()> {
        self.inner.close(conn, window)
    }

    pub fn toggle_maximize(&self, conn: &XConn, window: Window) -> Result<()> {
        self.inner.update(|st, _| st.toggle_maximize(conn, window))
    }

    pub fn minimize(&self, conn: &XConn, window: Window) -> Result<()> {
        self.inner.update(|st, events| st.minimize(conn, window, events))
    }

    pub fn run_shortcut(&self, conn: &XConn, shortcut: &Shortcut) -> Result<()> {
        self.inner.run_shortcut(conn, shortcut)
    }

    /// Make [`XConn::run`] return; callable from any thread
    ///
    /// The dispatcher may be blocked waiting for the server, so a message to
    /// the check window is sent to wake it.
    pub fn request_stop(&self, conn: &XConn) -> Result<()> {
        conn.stop();
        conn.server().send_client_message(
            self.inner.check,
            self.inner.check,
            self.inner.wake_atom,
            [0; 5],
            EventMask::NO_EVENT,
        )?;
        conn.server().flush()
    }

    /// Hand every client back to the root so a restarted manager can adopt it
    pub fn shutdown(&self, conn: &XConn) -> Result<()> {
        let clients = {
            let mut st = lock(&self.inner.state);
            st.focus_stack.clear();
            st.active = None;
            std::mem::take(&mut st.clients)
        };
        for mut client in clients {
            if let Err(e) = client.unmanage(conn, false) {
                warn!("Failed to release 0x{:x}: {}", client.id(), e);
            }
        }
        conn.server().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShortcutConfig;
    use crate::x::testing::{events, FakeServer, Request, KC_A, KC_F1, KC_SPACE, KC_TAB, ROOT};
    use crate::x::{Property, WindowAttributes};

    const SHIFT: u16 = 1;
    const MOD1: u16 = 8;
    const MOD4: u16 = 64;

    fn config() -> Config {
        Config {
            shortcuts: vec![
                ShortcutConfig::new("Mod1-Tab", "focus_next"),
                ShortcutConfig::new("Mod1-shift-Tab", "focus_previous"),
                ShortcutConfig::new("Mod4-a", "close_window"),
                ShortcutConfig::new("Mod4-space", "toggle_maximize"),
                ShortcutConfig::new("Mod4-F1", "minimize"),
            ],
            ..Config::default()
        }
    }

    struct Harness {
        server: FakeServer,
        conn: XConn,
        wm: WindowManager,
        events: Arc<Mutex<Vec<WindowEvent>>>,
    }

    impl Harness {
        fn start(server: FakeServer) -> Self {
            let conn = XConn::new(server.clone()).unwrap();
            let wm = WindowManager::start(&conn, config()).unwrap();
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = events.clone();
            wm.on_event(move |e| sink.lock().unwrap().push(e.clone()));
            Self {
                server,
                conn,
                wm,
                events,
            }
        }

        fn new() -> Self {
            Self::start(FakeServer::new())
        }

        fn map(&self, window: Window, rect: Rect) {
            self.server.add_window(window, ROOT, rect);
            self.conn.dispatch(events::map_request(window)).unwrap();
        }

        fn frame(&self, window: Window) -> Window {
            self.conn.server().query_tree(window).unwrap().parent
        }

        fn u32s(&self, window: Window, name: &str) -> Option<Vec<u32>> {
            self.server.property(window, name).and_then(|p| p.as_u32s())
        }

        fn key(&self, state: u16, keycode: u8) {
            self.conn.dispatch(events::key_press(ROOT, state, keycode)).unwrap();
        }

        fn message(&self, window: Window, name: &str, data: [u32; 5]) {
            let type_ = self.server.atom(name);
            self.conn
                .dispatch(events::client_message(window, type_, data))
                .unwrap();
        }

        fn take_events(&self) -> Vec<WindowEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    #[test]
    fn test_start_publishes_check_window() {
        let h = Harness::new();
        let check = h.wm.check_window();
        assert_eq!(h.u32s(ROOT, "_NET_SUPPORTING_WM_CHECK"), Some(vec![check]));
        assert_eq!(
            h.server.property(check, "_NET_WM_NAME").unwrap().as_string(),
            "FyneDesk"
        );
        assert!(h.server.property(ROOT, "_NET_SUPPORTED").is_some());
        assert_eq!(h.u32s(ROOT, "_NET_WORKAREA"), Some(vec![0, 0, 1920, 1080]));
        assert!(h.server.requests().contains(&Request::SelectInput {
            window: ROOT,
            mask: u32::from(root_event_mask()),
        }));
    }

    #[test]
    fn test_other_wm_running() {
        let server = FakeServer::new();
        server.take_redirect();
        let conn = XConn::new(server).unwrap();
        assert!(matches!(
            WindowManager::start(&conn, config()),
            Err(Error::OtherWmRunning)
        ));
    }

    #[test]
    fn test_map_request_manages_and_focuses() {
        let h = Harness::new();
        h.map(0x42, Rect::new(100, 50, 400, 300));

        let frame = h.frame(0x42);
        assert_ne!(frame, ROOT);
        assert_eq!(h.wm.clients(), vec![0x42]);
        assert_eq!(h.wm.focused(), Some(0x42));
        assert_eq!(h.wm.client_rect(0x42), Some(Rect::new(100, 50, 408, 328)));

        let reqs = h.server.requests();
        assert!(reqs.contains(&Request::Map(frame)));
        assert!(reqs.contains(&Request::SetInputFocus(0x42)));
        assert_eq!(h.u32s(ROOT, "_NET_CLIENT_LIST"), Some(vec![0x42]));
        assert_eq!(h.u32s(ROOT, "_NET_ACTIVE_WINDOW"), Some(vec![0x42]));
        assert_eq!(
            icccm::wm_state(&h.conn, 0x42).unwrap(),
            Some(WmState::Normal)
        );
        assert_eq!(
            h.take_events(),
            vec![WindowEvent::Added(0x42), WindowEvent::Focused(0x42)]
        );
    }

    #[test]
    fn test_override_redirect_is_not_managed() {
        let h = Harness::new();
        h.server.add_window(0x43, ROOT, Rect::new(0, 0, 10, 10));
        h.server.set_attributes(
            0x43,
            WindowAttributes {
                override_redirect: true,
                viewable: false,
            },
        );
        h.conn.dispatch(events::map_request(0x43)).unwrap();
        assert!(h.wm.clients().is_empty());
        assert!(h.server.requests().contains(&Request::Map(0x43)));
    }

    #[test]
    fn test_destroy_unmanages_and_refocuses() {
        let h = Harness::new();
        h.map(0x42, Rect::new(0, 0, 200, 100));
        h.map(0x43, Rect::new(50, 50, 200, 100));
        let frame = h.frame(0x43);
        h.take_events();

        h.conn.dispatch(events::destroy_notify(frame, 0x43)).unwrap();
        assert_eq!(h.wm.clients(), vec![0x42]);
        assert_eq!(h.wm.focused(), Some(0x42));
        assert!(h.server.requests().contains(&Request::DestroyWindow(frame)));
        assert_eq!(
            h.server.count(|r| matches!(r, Request::Reparent { window: 0x43, parent: ROOT, .. })),
            0
        );
        assert_eq!(h.u32s(ROOT, "_NET_CLIENT_LIST"), Some(vec![0x42]));
        assert_eq!(
            h.take_events(),
            vec![WindowEvent::Removed(0x43), WindowEvent::Focused(0x42)]
        );
    }

    #[test]
    fn test_adopted_window_ignores_own_unmap() {
        let server = FakeServer::new();
        server.add_window(0x42, ROOT, Rect::new(0, 0, 200, 100));
        server.set_attributes(
            0x42,
            WindowAttributes {
                override_redirect: false,
                viewable: true,
            },
        );
        server.add_window(0x44, ROOT, Rect::new(0, 0, 20, 20));
        server.set_attributes(
            0x44,
            WindowAttributes {
                override_redirect: true,
                viewable: true,
            },
        );
        let h = Harness::start(server);
        assert_eq!(h.wm.clients(), vec![0x42]);

        let frame = h.frame(0x42);
        h.conn.dispatch(events::unmap_notify(ROOT, 0x42)).unwrap();
        assert_eq!(h.wm.clients(), vec![0x42]);

        h.conn.dispatch(events::unmap_notify(frame, 0x42)).unwrap();
        assert!(h.wm.clients().is_empty());
        let reqs = h.server.requests();
        assert!(reqs.contains(&Request::Reparent {
            window: 0x42,
            parent: ROOT,
            x: 0,
            y: 0
        }));
        assert!(reqs.contains(&Request::DestroyWindow(frame)));
        assert_eq!(
            icccm::wm_state(&h.conn, 0x42).unwrap(),
            Some(WmState::Withdrawn)
        );
    }

    #[test]
    fn test_focus_cycling_shortcuts() {
        let h = Harness::new();
        for w in [0x42, 0x43, 0x44] {
            h.map(w, Rect::new(0, 0, 100, 100));
        }
        assert_eq!(h.wm.focused(), Some(0x44));

        h.key(MOD1, KC_TAB);
        assert_eq!(h.wm.focused(), Some(0x42));
        h.key(MOD1, KC_TAB);
        assert_eq!(h.wm.focused(), Some(0x43));
        h.key(MOD1 | SHIFT, KC_TAB);
        assert_eq!(h.wm.focused(), Some(0x42));
        assert_eq!(
            h.u32s(ROOT, "_NET_CLIENT_LIST_STACKING"),
            Some(vec![0x43, 0x44, 0x42])
        );
    }

    #[test]
    fn test_maximize_respects_dock_strut() {
        let h = Harness::new();
        let atom = h.server.atom("ATOM");
        let dock = h.server.atom("_NET_WM_WINDOW_TYPE_DOCK");
        let cardinal = h.server.atom("CARDINAL");
        h.server
            .set_property(0x50, "_NET_WM_WINDOW_TYPE", Property::from_u32s(atom, &[dock]));
        h.server
            .set_property(0x50, "_NET_WM_STRUT", Property::from_u32s(cardinal, &[0, 0, 0, 30]));
        h.map(0x50, Rect::new(0, 1050, 1920, 30));

        assert!(h.wm.clients().is_empty());
        assert_eq!(h.u32s(ROOT, "_NET_WORKAREA"), Some(vec![0, 0, 1920, 1050]));
        assert_eq!(
            h.take_events(),
            vec![WindowEvent::WorkareaChanged(vec![Rect::new(0, 0, 1920, 1050)])]
        );

        h.map(0x42, Rect::new(100, 50, 400, 300));
        h.key(MOD4, KC_SPACE);
        assert!(h.wm.is_maximized(0x42));
        assert_eq!(h.wm.client_rect(0x42), Some(Rect::new(0, 0, 1920, 1050)));
        assert!(h.server.requests().contains(&Request::Configure {
            window: 0x42,
            changes: WindowChanges::rect(Rect::new(4, 24, 1912, 1022)),
        }));
        let states = ewmh::wm_state(&h.conn, 0x42).unwrap();
        assert!(states.iter().any(|s| s == ewmh::STATE_MAXIMIZED_VERT));
        assert!(states.iter().any(|s| s == ewmh::STATE_MAXIMIZED_HORZ));

        h.key(MOD4, KC_SPACE);
        assert!(!h.wm.is_maximized(0x42));
        assert_eq!(h.wm.client_rect(0x42), Some(Rect::new(100, 50, 408, 328)));
        assert!(ewmh::wm_state(&h.conn, 0x42).unwrap().is_empty());
    }

    #[test]
    fn test_dock_removal_restores_workarea() {
        let h = Harness::new();
        let atom = h.server.atom("ATOM");
        let dock = h.server.atom("_NET_WM_WINDOW_TYPE_DOCK");
        let cardinal = h.server.atom("CARDINAL");
        h.server
            .set_property(0x50, "_NET_WM_WINDOW_TYPE", Property::from_u32s(atom, &[dock]));
        h.server
            .set_property(0x50, "_NET_WM_STRUT", Property::from_u32s(cardinal, &[0, 0, 40, 0]));
        h.map(0x50, Rect::new(0, 0, 1920, 40));
        assert_eq!(h.wm.workareas(), vec![Rect::new(0, 40, 1920, 1040)]);

        h.conn.dispatch(events::destroy_notify(ROOT, 0x50)).unwrap();
        assert_eq!(h.wm.workareas(), vec![Rect::new(0, 0, 1920, 1080)]);
        assert_eq!(h.u32s(ROOT, "_NET_WORKAREA"), Some(vec![0, 0, 1920, 1080]));
    }

    #[test]
    fn test_close_shortcut() {
        let h = Harness::new();
        h.map(0x42, Rect::new(0, 0, 100, 100));
        h.key(MOD4, KC_A);
        assert_eq!(h.server.requests().last(), Some(&Request::KillClient(0x42)));

        let atom = h.server.atom("ATOM");
        let delete = h.server.atom("WM_DELETE_WINDOW");
        h.server
            .set_property(0x43, "WM_PROTOCOLS", Property::from_u32s(atom, &[delete]));
        h.map(0x43, Rect::new(0, 0, 100, 100));
        h.key(MOD4, KC_A);
        assert!(matches!(
            h.server.requests().last(),
            Some(Request::ClientMessage {
                destination: 0x43,
                ..
            })
        ));
    }

    #[test]
    fn test_minimize_and_activate() {
        let h = Harness::new();
        h.map(0x42, Rect::new(0, 0, 100, 100));
        h.map(0x43, Rect::new(0, 0, 100, 100));
        let frame = h.frame(0x43);

        h.key(MOD4, KC_F1);
        assert!(h.wm.is_minimized(0x43));
        assert!(h.server.requests().contains(&Request::Unmap(frame)));
        assert_eq!(h.wm.focused(), Some(0x42));

        h.server.clear_requests();
        h.message(0x43, "_NET_ACTIVE_WINDOW", [2, 0, 0, 0, 0]);
        assert!(!h.wm.is_minimized(0x43));
        assert_eq!(h.wm.focused(), Some(0x43));
        assert!(h.server.requests().contains(&Request::Map(frame)));

        h.message(0x42, "WM_CHANGE_STATE", [3, 0, 0, 0, 0]);
        assert!(h.wm.is_minimized(0x42));
        assert_eq!(h.wm.focused(), Some(0x43));
    }

    #[test]
    fn test_net_wm_state_messages() {
        let h = Harness::new();
        h.map(0x42, Rect::new(100, 100, 300, 200));
        let vert = h.server.atom(ewmh::STATE_MAXIMIZED_VERT);
        let horz = h.server.atom(ewmh::STATE_MAXIMIZED_HORZ);
        let hidden = h.server.atom(ewmh::STATE_HIDDEN);

        h.message(0x42, "_NET_WM_STATE", [1, vert, horz, 2, 0]);
        assert!(h.wm.is_maximized(0x42));
        h.message(0x42, "_NET_WM_STATE", [1, vert, horz, 2, 0]);
        assert!(h.wm.is_maximized(0x42));
        h.message(0x42, "_NET_WM_STATE", [0, vert, horz, 2, 0]);
        assert!(!h.wm.is_maximized(0x42));

        h.message(0x42, "_NET_WM_STATE", [2, hidden, 0, 2, 0]);
        assert!(h.wm.is_minimized(0x42));
        h.message(0x42, "_NET_WM_STATE", [2, hidden, 0, 2, 0]);
        assert!(!h.wm.is_minimized(0x42));
    }

    #[test]
    fn test_title_change_notifies_once() {
        let h = Harness::new();
        h.map(0x42, Rect::new(0, 0, 100, 100));
        h.take_events();

        let utf8 = h.server.atom("UTF8_STRING");
        h.server
            .set_property(0x42, "_NET_WM_NAME", Property::from_bytes(utf8, b"Editor"));
        let name = h.server.atom("_NET_WM_NAME");
        h.conn.dispatch(events::property_notify(0x42, name)).unwrap();
        h.conn.dispatch(events::property_notify(0x42, name)).unwrap();

        assert_eq!(h.wm.title(0x42).as_deref(), Some("Editor"));
        assert_eq!(
            h.take_events(),
            vec![WindowEvent::TitleChanged(0x42, "Editor".to_string())]
        );
    }

    #[test]
    fn test_urgency_hint_demands_attention() {
        let h = Harness::new();
        h.map(0x42, Rect::new(0, 0, 100, 100));
        let hints_atom = h.server.atom("WM_HINTS");
        let set_urgent = |urgent: bool| {
            let flags = if urgent { 1 << 8 } else { 0 };
            h.server.set_property(
                0x42,
                "WM_HINTS",
                Property::from_u32s(hints_atom, &[flags, 0, 0, 0, 0, 0, 0, 0, 0]),
            );
            h.conn
                .dispatch(events::property_notify(0x42, hints_atom))
                .unwrap();
        };
        let demands_attention = || {
            ewmh::wm_state(&h.conn, 0x42)
                .unwrap()
                .iter()
                .any(|s| s == ewmh::STATE_DEMANDS_ATTENTION)
        };

        set_urgent(true);
        assert!(demands_attention());
        set_urgent(false);
        assert!(!demands_attention());
    }

    #[test]
    fn test_configure_requests() {
        let h = Harness::new();
        h.server.add_window(0x60, ROOT, Rect::new(0, 0, 50, 50));
        h.conn
            .dispatch(events::configure_request(0x60, 10, 20, 300, 200))
            .unwrap();
        assert_eq!(
            h.server.requests().last(),
            Some(&Request::Configure {
                window: 0x60,
                changes: WindowChanges::rect(Rect::new(10, 20, 300, 200)),
            })
        );

        h.map(0x42, Rect::new(100, 50, 400, 300));
        let frame = h.frame(0x42);
        let mut ev = events::configure_request(0x42, 10, 30, 300, 200);
        if let Event::ConfigureRequest(e) = &mut ev {
            e.parent = frame;
        }
        h.conn.dispatch(ev).unwrap();
        assert_eq!(h.wm.client_rect(0x42), Some(Rect::new(6, 6, 308, 228)));
    }

    #[test]
    fn test_drag_moves_frame() {
        let h = Harness::new();
        h.map(0x42, Rect::new(100, 50, 400, 300));
        let frame = h.frame(0x42);

        h.conn
            .dispatch(events::button_press(frame, MOD1, 1, 150, 60))
            .unwrap();
        assert!(h.conn.is_dragging());
        h.conn.dispatch(events::motion(ROOT, 200, 100)).unwrap();
        assert_eq!(h.wm.client_rect(0x42), Some(Rect::new(150, 90, 408, 328)));

        h.conn
            .dispatch(events::button_release(ROOT, MOD1, 1, 210, 110))
            .unwrap();
        assert!(!h.conn.is_dragging());
        assert_eq!(h.wm.client_rect(0x42), Some(Rect::new(160, 100, 408, 328)));
        assert_eq!(h.server.requests().last(), Some(&Request::UngrabPointer));
    }

    #[test]
    fn test_request_stop_and_shutdown() {
        let h = Harness::new();
        h.map(0x42, Rect::new(100, 50, 400, 300));

        h.wm.request_stop(&h.conn).unwrap();
        assert!(h.conn.is_stopped());
        let check = h.wm.check_window();
        assert!(matches!(
            h.server.requests().last(),
            Some(Request::ClientMessage { destination, .. }) if *destination == check
        ));

        h.wm.shutdown(&h.conn).unwrap();
        assert!(h.wm.clients().is_empty());
        assert!(h.server.requests().contains(&Request::Reparent {
            window: 0x42,
            parent: ROOT,
            x: 100,
            y: 50
        }));
    }
}
