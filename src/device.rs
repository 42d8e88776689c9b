//! Identifiers for the devices the kernel exposes through `/dev`.

/// A kernel device number, the `(major, minor)` pair assigned to a character
/// or block special file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub major: u32,
    pub minor: u32,
}

impl DeviceId {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Whether a device is addressed a byte at a time or a block at a time.
///
/// This mirrors the on-disk distinction between `/dev/char` and `/dev/block`,
/// and is what `mknod(2)` needs to create the right kind of special file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Char,
    Block,
}

impl DeviceKind {
    /// Classify a device by its sysfs subsystem name.
    ///
    /// Per the kernel's own convention, only the `block` subsystem produces
    /// block devices; everything else is addressed a byte at a time.
    pub fn from_subsystem(subsystem: &str) -> Self {
        if subsystem == "block" {
            Self::Block
        } else {
            Self::Char
        }
    }
}

/// A device this crate can open: its kind and kernel device number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    pub kind: DeviceKind,
    pub id: DeviceId,
}

impl Device {
    pub fn new(kind: DeviceKind, id: DeviceId) -> Self {
        Self { kind, id }
    }

    /// Build a [`Device`] the way the sysfs reader facade does: subsystem
    /// name decides the kind, the `dev` file's contents decide the id.
    pub fn make(subsystem: &str, id: DeviceId) -> Self {
        Self::new(DeviceKind::from_subsystem(subsystem), id)
    }
}
