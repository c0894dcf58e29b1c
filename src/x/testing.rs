//! In-process fake X server for unit tests
//!
//! Records every request and serves scripted keymaps, window trees,
//! geometries, properties and queued events.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use x11rb::errors::ConnectionError;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;

use crate::error::{Error, ProtocolError, ProtocolErrorKind, Result};
use crate::rect::Rect;
use crate::x::{
    KeyboardMapping, ModifierMapping, Property, Tree, WindowAttributes, WindowChanges, XServer,
};

pub const ROOT: Window = 1;
pub const SCREEN: (u16, u16) = (1920, 1080);

pub const KC_A: u8 = 10;
pub const KC_RETURN: u8 = 36;
pub const KC_TAB: u8 = 37;
pub const KC_SPACE: u8 = 38;
pub const KC_F1: u8 = 39;
pub const KC_SUPER_L: u8 = 43;
pub const KC_NUM_LOCK: u8 = 44;
pub const KC_RETURN_2: u8 = 47;
pub const KC_0: u8 = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    GrabKey { window: Window, modifiers: u16, keycode: u8 },
    UngrabKey { window: Window, modifiers: u16, keycode: u8 },
    GrabButton { window: Window, modifiers: u16, button: u8 },
    UngrabButton { window: Window, modifiers: u16, button: u8 },
    GrabPointer { window: Window, cursor: Cursor },
    UngrabPointer,
    CreateWindow { window: Window, parent: Window, rect: Rect },
    DestroyWindow(Window),
    Configure { window: Window, changes: WindowChanges },
    Map(Window),
    Unmap(Window),
    Reparent { window: Window, parent: Window, x: i32, y: i32 },
    SelectInput { window: Window, mask: u32 },
    SetInputFocus(Window),
    KillClient(Window),
    ChangeProperty { window: Window, property: Atom, value: Property },
    DeleteProperty { window: Window, property: Atom },
    ClientMessage { destination: Window, window: Window, type_: Atom, data: [u32; 5] },
}

struct FakeState {
    atoms: HashMap<String, Atom>,
    next_id: u32,
    keymap: KeyboardMapping,
    modmap: ModifierMapping,
    parents: HashMap<Window, Window>,
    geometries: HashMap<Window, Rect>,
    attributes: HashMap<Window, WindowAttributes>,
    properties: HashMap<(Window, Atom), Property>,
    xinerama: Option<Vec<Rect>>,
    events: VecDeque<Event>,
    requests: Vec<Request>,
    taken_keys: HashSet<(Window, u16, u8)>,
    redirect_taken: bool,
    pointer_busy: bool,
    fail_keymap: bool,
}

/// Cheap handle; clones share the same server state
#[derive(Clone)]
pub struct FakeServer {
    state: Arc<Mutex<FakeState>>,
}

pub fn default_keymap() -> KeyboardMapping {
    let (min, max, per) = (8u8, 60u8, 2u8);
    let mut keysyms = vec![0u32; (max - min + 1) as usize * per as usize];
    let mut set = |kc: u8, syms: [u32; 2]| {
        let base = (kc - min) as usize * per as usize;
        keysyms[base] = syms[0];
        keysyms[base + 1] = syms[1];
    };
    for (i, c) in (b'a'..=b'z').enumerate() {
        set(KC_A + i as u8, [c as u32, c.to_ascii_uppercase() as u32]);
    }
    set(KC_RETURN, [0xff0d, 0]);
    set(KC_TAB, [0xff09, 0xfe20]);
    set(KC_SPACE, [0x20, 0]);
    set(KC_F1, [0xffbe, 0]);
    set(40, [0xffe1, 0]);
    set(41, [0xffe3, 0]);
    set(42, [0xffe9, 0]);
    set(KC_SUPER_L, [0xffeb, 0]);
    set(KC_NUM_LOCK, [0xff7f, 0]);
    set(45, [0xffe5, 0]);
    set(46, [0xffec, 0]);
    set(KC_RETURN_2, [0xff0d, 0]);
    for (i, d) in (b'0'..=b'9').enumerate() {
        set(KC_0 + i as u8, [d as u32, 0]);
    }
    KeyboardMapping {
        min_keycode: min,
        max_keycode: max,
        keysyms_per_keycode: per,
        keysyms,
    }
}

pub fn default_modmap() -> ModifierMapping {
    // shift, lock, control, mod1, mod2, mod3, mod4, mod5
    ModifierMapping {
        keycodes_per_modifier: 2,
        keycodes: vec![40, 0, 45, 0, 41, 0, 42, 0, KC_NUM_LOCK, 0, 0, 0, KC_SUPER_L, 46, 0, 0],
    }
}

fn bad(kind: ProtocolErrorKind) -> Error {
    Error::Protocol(ProtocolError::new(kind))
}

impl FakeServer {
    pub fn new() -> Self {
        let mut geometries = HashMap::new();
        geometries.insert(ROOT, Rect::new(0, 0, SCREEN.0 as i32, SCREEN.1 as i32));
        Self {
            state: Arc::new(Mutex::new(FakeState {
                atoms: HashMap::new(),
                next_id: 0x100,
                keymap: default_keymap(),
                modmap: default_modmap(),
                parents: HashMap::new(),
                geometries,
                attributes: HashMap::new(),
                properties: HashMap::new(),
                xinerama: None,
                events: VecDeque::new(),
                requests: Vec::new(),
                taken_keys: HashSet::new(),
                redirect_taken: false,
                pointer_busy: false,
                fail_keymap: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn record(&self, req: Request) {
        self.lock().requests.push(req);
    }

    /// Add a window directly below `parent`
    pub fn add_window(&self, window: Window, parent: Window, rect: Rect) {
        let mut st = self.lock();
        st.parents.insert(window, parent);
        st.geometries.insert(window, rect);
        st.attributes.insert(window, WindowAttributes::default());
    }

    pub fn set_attributes(&self, window: Window, attrs: WindowAttributes) {
        self.lock().attributes.insert(window, attrs);
    }

    pub fn set_property(&self, window: Window, name: &str, value: Property) {
        let atom = self.atom(name);
        self.lock().properties.insert((window, atom), value);
    }

    pub fn property(&self, window: Window, name: &str) -> Option<Property> {
        let atom = self.atom(name);
        self.lock().properties.get(&(window, atom)).cloned()
    }

    /// Intern `name`, allocating a fresh atom if needed
    pub fn atom(&self, name: &str) -> Atom {
        let mut st = self.lock();
        if let Some(a) = st.atoms.get(name) {
            return *a;
        }
        let a = st.next_id;
        st.next_id += 1;
        st.atoms.insert(name.to_string(), a);
        a
    }

    pub fn set_xinerama(&self, heads: Option<Vec<Rect>>) {
        self.lock().xinerama = heads;
    }

    pub fn set_keymap(&self, keymap: KeyboardMapping) {
        self.lock().keymap = keymap;
    }

    pub fn fail_keymap(&self) {
        self.lock().fail_keymap = true;
    }

    /// Make a key grab fail with BadAccess, as if another client owned it
    pub fn take_key(&self, window: Window, modifiers: u16, keycode: u8) {
        self.lock().taken_keys.insert((window, modifiers, keycode));
    }

    pub fn take_redirect(&self) {
        self.lock().redirect_taken = true;
    }

    pub fn set_pointer_busy(&self, busy: bool) {
        self.lock().pointer_busy = busy;
    }

    pub fn push_event(&self, event: Event) {
        self.lock().events.push_back(event);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    pub fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.lock().requests.iter().filter(|r| pred(r)).count()
    }
}

impl XServer for FakeServer {
    fn root(&self) -> Window {
        ROOT
    }

    fn screen_size(&self) -> (u16, u16) {
        SCREEN
    }

    fn intern_atom(&self, name: &str) -> Result<Atom> {
        Ok(self.atom(name))
    }

    fn atom_name(&self, atom: Atom) -> Result<String> {
        self.lock()
            .atoms
            .iter()
            .find(|(_, a)| **a == atom)
            .map(|(n, _)| n.clone())
            .ok_or_else(|| bad(ProtocolErrorKind::Atom))
    }

    fn keyboard_mapping(&self) -> Result<KeyboardMapping> {
        let st = self.lock();
        if st.fail_keymap {
            return Err(bad(ProtocolErrorKind::Other(17)));
        }
        Ok(st.keymap.clone())
    }

    fn modifier_mapping(&self) -> Result<ModifierMapping> {
        Ok(self.lock().modmap.clone())
    }

    fn grab_key(&self, window: Window, modifiers: u16, keycode: u8) -> Result<()> {
        if self.lock().taken_keys.contains(&(window, modifiers, keycode)) {
            return Err(bad(ProtocolErrorKind::Access));
        }
        self.record(Request::GrabKey {
            window,
            modifiers,
            keycode,
        });
        Ok(())
    }

    fn ungrab_key(&self, window: Window, modifiers: u16, keycode: u8) -> Result<()> {
        self.record(Request::UngrabKey {
            window,
            modifiers,
            keycode,
        });
        Ok(())
    }

    fn grab_button(&self, window: Window, modifiers: u16, button: u8) -> Result<()> {
        self.record(Request::GrabButton {
            window,
            modifiers,
            button,
        });
        Ok(())
    }

    fn ungrab_button(&self, window: Window, modifiers: u16, button: u8) -> Result<()> {
        self.record(Request::UngrabButton {
            window,
            modifiers,
            button,
        });
        Ok(())
    }

    fn grab_pointer(&self, window: Window, _confine_to: Window, cursor: Cursor) -> Result<bool> {
        if self.lock().pointer_busy {
            return Ok(false);
        }
        self.record(Request::GrabPointer { window, cursor });
        Ok(true)
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.record(Request::UngrabPointer);
        Ok(())
    }

    fn query_tree(&self, window: Window) -> Result<Tree> {
        let st = self.lock();
        if window != ROOT && !st.parents.contains_key(&window) {
            return Err(bad(ProtocolErrorKind::Window));
        }
        let mut children: Vec<Window> = st
            .parents
            .iter()
            .filter(|(_, p)| **p == window)
            .map(|(c, _)| *c)
            .collect();
        children.sort_unstable();
        Ok(Tree {
            root: ROOT,
            parent: st.parents.get(&window).copied().unwrap_or(x11rb::NONE),
            children,
        })
    }

    fn geometry(&self, window: Window) -> Result<Rect> {
        self.lock()
            .geometries
            .get(&window)
            .copied()
            .ok_or_else(|| bad(ProtocolErrorKind::Drawable))
    }

    fn window_attributes(&self, window: Window) -> Result<WindowAttributes> {
        self.lock()
            .attributes
            .get(&window)
            .copied()
            .ok_or_else(|| bad(ProtocolErrorKind::Window))
    }

    fn create_window(&self, parent: Window, rect: Rect, _event_mask: EventMask) -> Result<Window> {
        let window = {
            let mut st = self.lock();
            let w = st.next_id;
            st.next_id += 1;
            w
        };
        self.add_window(window, parent, rect);
        self.record(Request::CreateWindow {
            window,
            parent,
            rect,
        });
        Ok(window)
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        {
            let mut st = self.lock();
            st.parents.remove(&window);
            st.geometries.remove(&window);
            st.attributes.remove(&window);
        }
        self.record(Request::DestroyWindow(window));
        Ok(())
    }

    fn configure_window(&self, window: Window, changes: &WindowChanges) -> Result<()> {
        {
            let mut st = self.lock();
            if let Some(g) = st.geometries.get_mut(&window) {
                if let Some(x) = changes.x {
                    g.x = x;
                }
                if let Some(y) = changes.y {
                    g.y = y;
                }
                if let Some(w) = changes.width {
                    g.width = w as i32;
                }
                if let Some(h) = changes.height {
                    g.height = h as i32;
                }
            }
        }
        self.record(Request::Configure {
            window,
            changes: *changes,
        });
        Ok(())
    }

    fn map_window(&self, window: Window) -> Result<()> {
        if let Some(a) = self.lock().attributes.get_mut(&window) {
            a.viewable = true;
        }
        self.record(Request::Map(window));
        Ok(())
    }

    fn unmap_window(&self, window: Window) -> Result<()> {
        if let Some(a) = self.lock().attributes.get_mut(&window) {
            a.viewable = false;
        }
        self.record(Request::Unmap(window));
        Ok(())
    }

    fn reparent_window(&self, window: Window, parent: Window, x: i32, y: i32) -> Result<()> {
        {
            let mut st = self.lock();
            st.parents.insert(window, parent);
            if let Some(g) = st.geometries.get_mut(&window) {
                g.x = x;
                g.y = y;
            }
        }
        self.record(Request::Reparent {
            window,
            parent,
            x,
            y,
        });
        Ok(())
    }

    fn select_input(&self, window: Window, event_mask: EventMask) -> Result<()> {
        let mask = u32::from(event_mask);
        if window == ROOT
            && mask & u32::from(EventMask::SUBSTRUCTURE_REDIRECT) != 0
            && self.lock().redirect_taken
        {
            return Err(bad(ProtocolErrorKind::Access));
        }
        self.record(Request::SelectInput { window, mask });
        Ok(())
    }

    fn set_input_focus(&self, window: Window, _time: Timestamp) -> Result<()> {
        self.record(Request::SetInputFocus(window));
        Ok(())
    }

    fn kill_client(&self, window: Window) -> Result<()> {
        self.record(Request::KillClient(window));
        Ok(())
    }

    fn get_property(&self, window: Window, property: Atom) -> Result<Option<Property>> {
        Ok(self.lock().properties.get(&(window, property)).cloned())
    }

    fn change_property(&self, window: Window, property: Atom, value: &Property) -> Result<()> {
        self.lock()
            .properties
            .insert((window, property), value.clone());
        self.record(Request::ChangeProperty {
            window,
            property,
            value: value.clone(),
        });
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> Result<()> {
        self.lock().properties.remove(&(window, property));
        self.record(Request::DeleteProperty { window, property });
        Ok(())
    }

    fn send_client_message(
        &self,
        destination: Window,
        window: Window,
        type_: Atom,
        data: [u32; 5],
        _event_mask: EventMask,
    ) -> Result<()> {
        self.record(Request::ClientMessage {
            destination,
            window,
            type_,
            data,
        });
        Ok(())
    }

    fn xinerama_screens(&self) -> Result<Option<Vec<Rect>>> {
        Ok(self.lock().xinerama.clone())
    }

    fn poll_for_event(&self) -> Result<Option<Event>> {
        Ok(self.lock().events.pop_front())
    }

    fn wait_for_event(&self) -> Result<Event> {
        self.lock().events.pop_front().ok_or_else(|| {
            Error::Connection(ConnectionError::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "fake server has no more events",
            )))
        })
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Event constructors
pub mod events {
    use super::*;

    pub fn motion(window: Window, root_x: i16, root_y: i16) -> Event {
        Event::MotionNotify(MotionNotifyEvent {
            response_type: MOTION_NOTIFY_EVENT,
            detail: Motion::NORMAL,
            sequence: 0,
            time: 0,
            root: ROOT,
            event: window,
            child: x11rb::NONE,
            root_x,
            root_y,
            event_x: root_x,
            event_y: root_y,
            state: KeyButMask::BUTTON1,
            same_screen: true,
        })
    }

    pub fn key_press(window: Window, state: u16, keycode: u8) -> Event {
        Event::KeyPress(KeyPressEvent {
            response_type: KEY_PRESS_EVENT,
            detail: keycode,
            sequence: 0,
            time: 0,
            root: ROOT,
            event: window,
            child: x11rb::NONE,
            root_x: 0,
            root_y: 0,
            event_x: 0,
            event_y: 0,
            state: KeyButMask::from(state),
            same_screen: true,
        })
    }

    fn button(response_type: u8, window: Window, state: u16, button: u8, x: i16, y: i16) -> ButtonPressEvent {
        ButtonPressEvent {
            response_type,
            detail: button,
            sequence: 0,
            time: 0,
            root: ROOT,
            event: window,
            child: x11rb::NONE,
            root_x: x,
            root_y: y,
            event_x: x,
            event_y: y,
            state: KeyButMask::from(state),
            same_screen: true,
        }
    }

    pub fn button_press(window: Window, state: u16, b: u8, x: i16, y: i16) -> Event {
        Event::ButtonPress(button(BUTTON_PRESS_EVENT, window, state, b, x, y))
    }

    pub fn button_release(window: Window, state: u16, b: u8, x: i16, y: i16) -> Event {
        Event::ButtonRelease(button(BUTTON_RELEASE_EVENT, window, state, b, x, y))
    }

    pub fn mapping_notify(request: Mapping) -> Event {
        Event::MappingNotify(MappingNotifyEvent {
            response_type: MAPPING_NOTIFY_EVENT,
            sequence: 0,
            request,
            first_keycode: 8,
            count: 53,
        })
    }

    pub fn map_request(window: Window) -> Event {
        Event::MapRequest(MapRequestEvent {
            response_type: MAP_REQUEST_EVENT,
            sequence: 0,
            parent: ROOT,
            window,
        })
    }

    pub fn unmap_notify(event: Window, window: Window) -> Event {
        Event::UnmapNotify(UnmapNotifyEvent {
            response_type: UNMAP_NOTIFY_EVENT,
            sequence: 0,
            event,
            window,
            from_configure: false,
        })
    }

    pub fn destroy_notify(event: Window, window: Window) -> Event {
        Event::DestroyNotify(DestroyNotifyEvent {
            response_type: DESTROY_NOTIFY_EVENT,
            sequence: 0,
            event,
            window,
        })
    }

    pub fn configure_request(window: Window, x: i16, y: i16, width: u16, height: u16) -> Event {
        Event::ConfigureRequest(ConfigureRequestEvent {
            response_type: CONFIGURE_REQUEST_EVENT,
            stack_mode: StackMode::ABOVE,
            sequence: 0,
            parent: ROOT,
            window,
            sibling: x11rb::NONE,
            x,
            y,
            width,
            height,
            border_width: 0,
            value_mask: ConfigWindow::X | ConfigWindow::Y | ConfigWindow::WIDTH | ConfigWindow::HEIGHT,
        })
    }

    pub fn property_notify(window: Window, atom: Atom) -> Event {
        Event::PropertyNotify(PropertyNotifyEvent {
            response_type: PROPERTY_NOTIFY_EVENT,
            sequence: 0,
            window,
            atom,
            time: 0,
            state: x11rb::protocol::xproto::Property::NEW_VALUE,
        })
    }

    pub fn client_message(window: Window, type_: Atom, data: [u32; 5]) -> Event {
        Event::ClientMessage(ClientMessageEvent::new(32, window, type_, data))
    }
}
