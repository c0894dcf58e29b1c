//! x11rb Server
//!
//! [`XServer`] over a real `RustConnection`.

use tracing::{debug, info};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::xinerama::ConnectionExt as _;
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::error::Result;
use crate::rect::Rect;
use crate::x::{
    KeyboardMapping, ModifierMapping, Property, Tree, WindowAttributes, WindowChanges, XServer,
};

/// Buttons and motion, the events passive button grabs and drags listen for
fn pointer_mask() -> EventMask {
    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION
}

pub struct X11rbServer {
    conn: RustConnection,
    screen_num: usize,
    root: Window,
}

impl X11rbServer {
    /// Connect to the display named by `display`, or `$DISPLAY` when `None`
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let root = conn.setup().roots[screen_num].root;
        info!("Connected to X server, screen {} root 0x{:x}", screen_num, root);
        Ok(Self {
            conn,
            screen_num,
            root,
        })
    }

    fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }
}

impl XServer for X11rbServer {
    fn root(&self) -> Window {
        self.root
    }

    fn screen_size(&self) -> (u16, u16) {
        let screen = self.screen();
        (screen.width_in_pixels, screen.height_in_pixels)
    }

    fn intern_atom(&self, name: &str) -> Result<Atom> {
        Ok(self.conn.intern_atom(false, name.as_bytes())?.reply()?.atom)
    }

    fn atom_name(&self, atom: Atom) -> Result<String> {
        let reply = self.conn.get_atom_name(atom)?.reply()?;
        Ok(String::from_utf8_lossy(&reply.name).into_owned())
    }

    fn keyboard_mapping(&self) -> Result<KeyboardMapping> {
        let setup = self.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = self
            .conn
            .get_keyboard_mapping(min, max - min + 1)?
            .reply()?;
        Ok(KeyboardMapping {
            min_keycode: min,
            max_keycode: max,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    fn modifier_mapping(&self) -> Result<ModifierMapping> {
        let reply = self.conn.get_modifier_mapping()?.reply()?;
        Ok(ModifierMapping {
            keycodes_per_modifier: reply.keycodes_per_modifier(),
            keycodes: reply.keycodes,
        })
    }

    fn grab_key(&self, window: Window, modifiers: u16, keycode: u8) -> Result<()> {
        self.conn
            .grab_key(
                true,
                window,
                ModMask::from(modifiers),
                keycode,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )?
            .check()?;
        Ok(())
    }

    fn ungrab_key(&self, window: Window, modifiers: u16, keycode: u8) -> Result<()> {
        self.conn
            .ungrab_key(keycode, window, ModMask::from(modifiers))?
            .check()?;
        Ok(())
    }

    fn grab_button(&self, window: Window, modifiers: u16, button: u8) -> Result<()> {
        self.conn
            .grab_button(
                true,
                window,
                pointer_mask(),
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                x11rb::NONE,
                ButtonIndex::from(button),
                ModMask::from(modifiers),
            )?
            .check()?;
        Ok(())
    }

    fn ungrab_button(&self, window: Window, modifiers: u16, button: u8) -> Result<()> {
        self.conn
            .ungrab_button(ButtonIndex::from(button), window, ModMask::from(modifiers))?
            .check()?;
        Ok(())
    }

    fn grab_pointer(&self, window: Window, confine_to: Window, cursor: Cursor) -> Result<bool> {
        let reply = self
            .conn
            .grab_pointer(
                false,
                window,
                pointer_mask(),
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                confine_to,
                cursor,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        Ok(reply.status == GrabStatus::SUCCESS)
    }

    fn ungrab_pointer(&self) -> Result<()> {
        self.conn.ungrab_pointer(x11rb::CURRENT_TIME)?;
        Ok(())
    }

    fn query_tree(&self, window: Window) -> Result<Tree> {
        let reply = self.conn.query_tree(window)?.reply()?;
        Ok(Tree {
            root: reply.root,
            parent: reply.parent,
            children: reply.children,
        })
    }

    fn geometry(&self, window: Window) -> Result<Rect> {
        let reply = self.conn.get_geometry(window)?.reply()?;
        Ok(Rect::new(
            reply.x as i32,
            reply.y as i32,
            reply.width as i32,
            reply.height as i32,
        ))
    }

    fn window_attributes(&self, window: Window) -> Result<WindowAttributes> {
        let reply = self.conn.get_window_attributes(window)?.reply()?;
        Ok(WindowAttributes {
            override_redirect: reply.override_redirect,
            viewable: reply.map_state == MapState::VIEWABLE,
        })
    }

    fn create_window(&self, parent: Window, rect: Rect, event_mask: EventMask) -> Result<Window> {
        let wid = self.conn.generate_id()?;
        let screen = self.screen();
        self.conn.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            wid,
            parent,
            rect.x as i16,
            rect.y as i16,
            rect.width.max(1) as u16,
            rect.height.max(1) as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            x11rb::COPY_FROM_PARENT,
            &CreateWindowAux::new()
                .background_pixel(screen.black_pixel)
                .event_mask(event_mask),
        )?;
        debug!("Created window 0x{:x} in 0x{:x}", wid, parent);
        Ok(wid)
    }

    fn destroy_window(&self, window: Window) -> Result<()> {
        self.conn.destroy_window(window)?;
        Ok(())
    }

    fn configure_window(&self, window: Window, changes: &WindowChanges) -> Result<()> {
        let mut aux = ConfigureWindowAux::new();
        aux.x = changes.x;
        aux.y = changes.y;
        aux.width = changes.width;
        aux.height = changes.height;
        aux.border_width = changes.border_width;
        aux.sibling = changes.sibling;
        aux.stack_mode = changes.stack_mode;
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    fn map_window(&self, window: Window) -> Result<()> {
        self.conn.map_window(window)?;
        Ok(())
    }

    fn unmap_window(&self, window: Window) -> Result<()> {
        self.conn.unmap_window(window)?;
        Ok(())
    }

    fn reparent_window(&self, window: Window, parent: Window, x: i32, y: i32) -> Result<()> {
        self.conn.reparent_window(window, parent, x as i16, y as i16)?;
        Ok(())
    }

    fn select_input(&self, window: Window, event_mask: EventMask) -> Result<()> {
        self.conn
            .change_window_attributes(
                window,
                &ChangeWindowAttributesAux::new().event_mask(event_mask),
            )?
            .check()?;
        Ok(())
    }

    fn set_input_focus(&self, window: Window, time: Timestamp) -> Result<()> {
        self.conn.set_input_focus(InputFocus::POINTER_ROOT, window, time)?;
        Ok(())
    }

    fn kill_client(&self, window: Window) -> Result<()> {
        self.conn.kill_client(window)?;
        Ok(())
    }

    fn get_property(&self, window: Window, property: Atom) -> Result<Option<Property>> {
        let reply = self
            .conn
            .get_property(false, window, property, AtomEnum::ANY, 0, u32::MAX / 4)?
            .reply()?;
        if reply.type_ == x11rb::NONE {
            return Ok(None);
        }
        Ok(Some(Property {
            type_: reply.type_,
            format: reply.format,
            value: reply.value,
        }))
    }

    fn change_property(&self, window: Window, property: Atom, value: &Property) -> Result<()> {
        let len = match value.format {
            32 => value.value.len() / 4,
            16 => value.value.len() / 2,
            _ => value.value.len(),
        };
        self.conn.change_property(
            PropMode::REPLACE,
            window,
            property,
            value.type_,
            value.format,
            len as u32,
            &value.value,
        )?;
        Ok(())
    }

    fn delete_property(&self, window: Window, property: Atom) -> Result<()> {
        self.conn.delete_property(window, property)?;
        Ok(())
    }

    fn send_client_message(
        &self,
        destination: Window,
        window: Window,
        type_: Atom,
        data: [u32; 5],
        event_mask: EventMask,
    ) -> Result<()> {
        let event = ClientMessageEvent::new(32, window, type_, data);
        self.conn.send_event(false, destination, event_mask, event)?;
        Ok(())
    }

    fn xinerama_screens(&self) -> Result<Option<Vec<Rect>>> {
        if self.conn.extension_information(x11rb::protocol::xinerama::X11_EXTENSION_NAME)?.is_none() {
            return Ok(None);
        }
        if self.conn.xinerama_is_active()?.reply()?.state == 0 {
            return Ok(None);
        }
        let reply = self.conn.xinerama_query_screens()?.reply()?;
        Ok(Some(
            reply
                .screen_info
                .iter()
                .map(|s| {
                    Rect::new(
                        s.x_org as i32,
                        s.y_org as i32,
                        s.width as i32,
                        s.height as i32,
                    )
                })
                .collect(),
        ))
    }

    fn poll_for_event(&self) -> Result<Option<Event>> {
        Ok(self.conn.poll_for_event()?)
    }

    fn wait_for_event(&self) -> Result<Event> {
        Ok(self.conn.wait_for_event()?)
    }

    fn sync(&self) -> Result<()> {
        self.conn.get_input_focus()?.reply()?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}
