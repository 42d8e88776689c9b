//! Error handling stuff
use std::io;

use displaydoc::Display;
use thiserror::Error;

/// Error type for [`crate::path`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// path `{0}` has no segments
    Empty(String),
}

/// Error type for [`crate::sysfs`]
#[derive(Debug, Display, Error)]
pub enum SysfsError {
    /// IO failed reading `{0}`
    Io(String, #[source] io::Error),

    /// `dev` file at `{0}` was malformed: expected `MAJOR:MINOR`, got `{1:?}`
    MalformedDevFile(String, String),

    /// `subsystem` symlink at `{0}` did not resolve to a basename
    MalformedSubsystemLink(String),
}

/// Error type for [`crate::event`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// `move` event for `{0}` is missing `DEVPATH_OLD`
    MissingDevpathOld(String),

    /// devpath `{0}` did not start with a recognized prefix
    UnrecognizedDevpath(String),
}

/// Error type for [`crate::manager`]
#[derive(Debug, Display, Error)]
pub enum ManagerError {
    /// no device at path `{0}`
    DeviceNotFound(String),

    /// no devices classified under subsystem `{0}`
    EntryNotFound(String),

    /// {0}
    Event(#[from] EventError),

    /// {0}
    Sysfs(#[from] SysfsError),

    /// {0}
    Handle(#[from] HandleError),
}

/// Error type for [`crate::handle`], the ephemeral devfs-node broker
#[derive(Debug, Display, Error)]
pub enum HandleError {
    /// no device at path `{0}`
    DeviceNotFound(String),

    /// handle was invalid or already released
    InvalidHandle,

    /// parameter `{0}` was out of range
    InvalidParam(&'static str),

    /// `mknod` for `{0}` failed
    Mknod(String, #[source] nix::Error),

    /// `open` for `{0}` failed
    Open(String, #[source] nix::Error),

    /// system is out of memory or file descriptors
    MemoryError,
}

/// Error type for [`crate::terminal`]
#[derive(Debug, Display, Error)]
pub enum TerminalError {
    /// requested read/write of zero bytes
    InvalidRange,

    /// the underlying handle reached end-of-file
    Eof,

    /// the underlying handle was closed or returned a fatal error
    HandleClosed(#[source] io::Error),
}

impl Clone for TerminalError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidRange => Self::InvalidRange,
            Self::Eof => Self::Eof,
            Self::HandleClosed(e) => {
                Self::HandleClosed(io::Error::new(e.kind(), e.to_string()))
            }
        }
    }
}
