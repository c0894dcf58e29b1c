//! Error Module
//!
//! One error type for the whole window-management core. Protocol errors are
//! classified so callers can tell a grab conflict or a vanished window apart
//! from everything else.

use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::ErrorKind;
use x11rb::x11_utils::X11Error;

/// Crate result alias
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classified X protocol error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    /// BadAccess: usually someone else already holds the grab or redirect
    Access,
    /// BadWindow: the window is gone
    Window,
    /// BadDrawable
    Drawable,
    /// BadMatch
    Match,
    /// BadValue
    Value,
    /// BadAtom
    Atom,
    /// Anything else, by raw error code
    Other(u8),
}

/// An X protocol error reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub kind: ProtocolErrorKind,
    pub major_opcode: u8,
    pub bad_value: u32,
}

impl ProtocolError {
    pub fn new(kind: ProtocolErrorKind) -> Self {
        Self {
            kind,
            major_opcode: 0,
            bad_value: 0,
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} error (request {}, value 0x{:x})",
            self.kind, self.major_opcode, self.bad_value
        )
    }
}

impl From<&X11Error> for ProtocolError {
    fn from(e: &X11Error) -> Self {
        let kind = match e.error_kind {
            ErrorKind::Access => ProtocolErrorKind::Access,
            ErrorKind::Window => ProtocolErrorKind::Window,
            ErrorKind::Drawable => ProtocolErrorKind::Drawable,
            ErrorKind::Match => ProtocolErrorKind::Match,
            ErrorKind::Value => ProtocolErrorKind::Value,
            ErrorKind::Atom => ProtocolErrorKind::Atom,
            _ => ProtocolErrorKind::Other(e.error_code),
        };
        Self {
            kind,
            major_opcode: e.major_opcode,
            bad_value: e.bad_value,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to X server: {0}")]
    Connect(#[from] ConnectError),

    #[error("X connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("X resource ids exhausted")]
    IdsExhausted,

    #[error("could not find a valid keycode in the string '{0}'; key binding failed")]
    InvalidKeyBinding(String),

    #[error("could not find a valid mouse button in the string '{0}'; mouse binding failed")]
    InvalidButtonBinding(String),

    #[error("could not parse modifier string '{0}'")]
    InvalidModifier(String),

    #[error(
        "'{binding}' on window 0x{window:x} is already grabbed; \
         another client has probably bound the same keys"
    )]
    AlreadyGrabbed { binding: String, window: u32 },

    #[error("could not bind '{binding}' on window 0x{window:x}: {source}")]
    Grab {
        binding: String,
        window: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("another window manager is already running")]
    OtherWmRunning,

    #[error("could not load keyboard mapping: {0}")]
    Keymap(#[source] Box<Error>),

    #[error("property {property} on window 0x{window:x} is malformed")]
    BadProperty { window: u32, property: String },
}

impl Error {
    /// Protocol error kind, if this is a protocol error
    pub fn protocol_kind(&self) -> Option<ProtocolErrorKind> {
        match self {
            Error::Protocol(p) => Some(p.kind),
            _ => None,
        }
    }

    /// True when the window this request targeted no longer exists
    pub fn is_bad_window(&self) -> bool {
        matches!(
            self.protocol_kind(),
            Some(ProtocolErrorKind::Window) | Some(ProtocolErrorKind::Drawable)
        )
    }

    pub fn is_access(&self) -> bool {
        self.protocol_kind() == Some(ProtocolErrorKind::Access)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<X11Error> for Error {
    fn from(e: X11Error) -> Self {
        Error::Protocol(ProtocolError::from(&e))
    }
}

impl From<ReplyError> for Error {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::ConnectionError(e) => Error::Connection(e),
            ReplyError::X11Error(e) => e.into(),
        }
    }
}

impl From<ReplyOrIdError> for Error {
    fn from(e: ReplyOrIdError) -> Self {
        match e {
            ReplyOrIdError::IdsExhausted => Error::IdsExhausted,
            ReplyOrIdError::ConnectionError(e) => Error::Connection(e),
            ReplyOrIdError::X11Error(e) => e.into(),
        }
    }
}
