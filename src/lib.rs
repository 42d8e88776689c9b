//! A live, concurrently-queryable mirror of the Linux device tree, fed by
//! cold-plug sysfs enumeration and a hot-plug kernel event stream, plus an
//! async terminal I/O core.
//!
//! # Implementation details
//!
//! The device side of this crate (`device`, `tree`, `subsystem`, `sysfs`,
//! `event`, `manager`, `handle`) assumes `sysfs` is mounted and that whatever
//! feeds it kernel events has already parsed raw netlink datagrams into
//! [`event::KernelEvent`]. The terminal side (`terminal`) assumes a single
//! non-blocking file descriptor and multiplexes it among concurrent callers.
//!
//! This crate never installs a `tracing` subscriber; the binary embedding it
//! does that.

pub mod device;
pub mod error;
pub mod event;
pub mod handle;
pub mod manager;
pub mod path;
pub mod subsystem;
pub mod sysfs;
pub mod terminal;
pub mod tree;
