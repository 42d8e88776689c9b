//! The sysfs reader facade, §4.4.
//!
//! Thin, synchronous reads of the two sysfs attributes this crate actually
//! needs: the `subsystem` symlink and the `dev` file. Everything else about
//! sysfs (attribute files, uevent writing, the full ABI) is out of scope —
//! see [`crate::device`] for what we do with what's read here.
use std::{fs, path::Path};

use crate::{
    device::{Device, DeviceId},
    error::SysfsError,
};

/// Technically Linux requires sysfs to be at `/sys`; tests point this
/// elsewhere by constructing [`crate::manager::DeviceManager`] with their own
/// root instead of relying on this constant.
pub const SYSFS_PATH: &str = "/sys";

/// `readSubsystem(p)`, §4.4: basename of the `subsystem` symlink under `p`,
/// or `None` if there isn't one.
pub fn read_subsystem(sysfs_path: &Path) -> Result<Option<String>, SysfsError> {
    let link = sysfs_path.join("subsystem");
    let target = match fs::read_link(&link) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SysfsError::Io(link.display().to_string(), e)),
    };
    target
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .map(Ok)
        .unwrap_or_else(|| Err(SysfsError::MalformedSubsystemLink(link.display().to_string())))
        .map(Some)
}

/// `readDevFile(p)`, §4.4: parse the first 16 bytes of `p/dev` as
/// `"MAJOR:MINOR\n"`.
pub fn read_dev_file(sysfs_path: &Path) -> Result<Option<DeviceId>, SysfsError> {
    let dev_path = sysfs_path.join("dev");
    let contents = match fs::read_to_string(&dev_path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SysfsError::Io(dev_path.display().to_string(), e)),
    };
    let bounded: String = contents.chars().take(16).collect();
    parse_dev(&bounded)
        .ok_or_else(|| SysfsError::MalformedDevFile(dev_path.display().to_string(), bounded))
        .map(Some)
}

fn parse_dev(s: &str) -> Option<DeviceId> {
    let trimmed = s.trim_end_matches('\n');
    let (major, minor) = trimmed.split_once(':')?;
    Some(DeviceId::new(major.parse().ok()?, minor.parse().ok()?))
}

/// `makeDevice(subsystem, id)`, §4.4.
pub fn make_device(subsystem: &str, id: DeviceId) -> Device {
    Device::make(subsystem, id)
}

/// Resolve `(subsystem?, device?)` for a sysfs-relative path by reading both
/// attributes. Used by the cold-plug enumeration and as the fallback path of
/// `deviceAdd` when a hot-plug event's details don't already carry
/// `MAJOR`/`MINOR` (§4.5).
pub fn read_classification(
    sysfs_path: &Path,
) -> Result<(Option<String>, Option<Device>), SysfsError> {
    let subsystem = read_subsystem(sysfs_path)?;
    let id = read_dev_file(sysfs_path)?;
    let device = match (&subsystem, id) {
        (Some(s), Some(id)) => Some(make_device(s, id)),
        // A `dev` file without a `subsystem` link is a kernel anomaly,
        // tolerated per §3's invariant: the node is still added, just
        // without a `device`.
        (None, Some(_)) => {
            tracing::warn!(path = %sysfs_path.display(), "dev file without subsystem link");
            None
        }
        _ => None,
    };
    Ok((subsystem, device))
}
