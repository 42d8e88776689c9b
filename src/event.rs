//! Kernel object events ("uevents"), and the broadcast channel they arrive on.
//!
//! This module only models the *shape* of a parsed uevent; turning netlink
//! datagrams into [`KernelEvent`]s is the job of the (out of scope) netlink
//! parser this crate is meant to sit downstream of.
use std::collections::HashMap;

use tokio::sync::broadcast;

use crate::error::EventError;

/// The action a [`KernelEvent`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    Move,
    Change,
    Online,
    Offline,
    /// An action the kernel sent that we don't specifically recognize.
    Other(String),
}

impl Action {
    /// Parse the `ACTION` field of a uevent.
    pub fn parse(s: &str) -> Self {
        match s {
            "add" => Self::Add,
            "remove" => Self::Remove,
            "move" => Self::Move,
            "change" => Self::Change,
            "online" => Self::Online,
            "offline" => Self::Offline,
            other => Self::Other(other.to_owned()),
        }
    }
}

/// A single parsed kernel object event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelEvent {
    pub action: Action,
    /// Path as reported by the kernel, e.g. `/devices/platform/foo`.
    pub devpath: String,
    pub details: HashMap<String, String>,
}

impl KernelEvent {
    pub fn new(action: Action, devpath: impl Into<String>) -> Self {
        Self {
            action,
            devpath: devpath.into(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// `MAJOR`/`MINOR` from `details`, if both are present and numeric.
    pub fn major_minor(&self) -> Option<(u32, u32)> {
        let major = self.details.get("MAJOR")?.parse().ok()?;
        let minor = self.details.get("MINOR")?.parse().ok()?;
        Some((major, minor))
    }

    /// `SUBSYSTEM`, if the kernel included a hint.
    pub fn subsystem_hint(&self) -> Option<&str> {
        self.details.get("SUBSYSTEM").map(String::as_str)
    }

    /// `DEVPATH_OLD`, required on `move` events.
    ///
    /// Returns [`EventError::MissingDevpathOld`] when absent, per §4.5.
    pub fn devpath_old(&self) -> Result<&str, EventError> {
        self.details
            .get("DEVPATH_OLD")
            .map(String::as_str)
            .ok_or_else(|| EventError::MissingDevpathOld(self.devpath.clone()))
    }
}

/// The channel capacity for [`EventSource`]; events that outrun the slowest
/// subscriber by this many are lost to it (standard `tokio::sync::broadcast`
/// lagging-subscriber behavior).
const CHANNEL_CAPACITY: usize = 1024;

/// The shared broadcast channel of kernel events, §4.5.
///
/// Cloning an [`EventSource`] is cheap and yields a handle to the same
/// underlying channel, matching the "duplicate the inbound channel" step of
/// manager initialization (§4.6 step 1): the manager subscribes before
/// cold-plug enumeration runs so that events racing the enumeration aren't
/// lost.
#[derive(Clone)]
pub struct EventSource {
    tx: broadcast::Sender<KernelEvent>,
}

impl EventSource {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. Used by whatever feeds this crate real or synthetic
    /// uevents (the netlink parser in production, tests otherwise).
    ///
    /// Returns the number of live subscribers it was delivered to; `Err` only
    /// if there are currently none.
    pub fn publish(&self, event: KernelEvent) -> Result<usize, broadcast::error::SendError<KernelEvent>> {
        self.tx.send(event)
    }

    /// Subscribe to future events. Must be called before anything that could
    /// race with event delivery, per §4.6 step 1.
    pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventSource {
    fn default() -> Self {
        Self::new()
    }
}
