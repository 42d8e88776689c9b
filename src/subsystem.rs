//! The subsystem index, §4.3: for each subsystem name, the set of device
//! paths currently classified under it, plus add/remove broadcast channels.
use std::collections::{HashMap, HashSet};

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// `SubsystemIndex(s)`, §3.
pub struct SubsystemEntry {
    devices: HashSet<String>,
    on_add: broadcast::Sender<String>,
    on_remove: broadcast::Sender<String>,
}

impl SubsystemEntry {
    fn new() -> Self {
        Self {
            devices: HashSet::new(),
            on_add: broadcast::channel(CHANNEL_CAPACITY).0,
            on_remove: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn devices(&self) -> &HashSet<String> {
        &self.devices
    }

    pub fn subscribe_add(&self) -> broadcast::Receiver<String> {
        self.on_add.subscribe()
    }

    pub fn subscribe_remove(&self) -> broadcast::Receiver<String> {
        self.on_remove.subscribe()
    }
}

/// The full subsystem mapping owned by the [`crate::manager::DeviceManager`],
/// plus the `onSubsystemAdd` channel that fires the first time each subsystem
/// name is observed.
pub struct SubsystemMap {
    entries: HashMap<String, SubsystemEntry>,
    on_subsystem_add: broadcast::Sender<String>,
}

impl SubsystemMap {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            on_subsystem_add: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe_subsystem_add(&self) -> broadcast::Receiver<String> {
        self.on_subsystem_add.subscribe()
    }

    pub fn get(&self, subsystem: &str) -> Option<&SubsystemEntry> {
        self.entries.get(subsystem)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `addDevice(s, path)`, §4.3: creates the entry and fires
    /// `onSubsystemAdd` the first time `s` is seen; otherwise inserts into
    /// the existing entry's device set and fires `onAdd`.
    ///
    /// Mirrors the `BTreeMap`-of-devices style the grounding example
    /// (`device_registry.rs`'s `DeviceRegistry::update`) uses for udev
    /// bookkeeping, generalized to per-subsystem sets with their own
    /// broadcast channels.
    pub fn add_device(&mut self, subsystem: &str, path: &str) {
        match self.entries.get_mut(subsystem) {
            None => {
                let mut entry = SubsystemEntry::new();
                entry.devices.insert(path.to_owned());
                self.entries.insert(subsystem.to_owned(), entry);
                let _ = self.on_subsystem_add.send(subsystem.to_owned());
            }
            Some(entry) => {
                entry.devices.insert(path.to_owned());
                let _ = entry.on_add.send(path.to_owned());
            }
        }
    }

    /// `removeDevice(s, path)`, §4.3.
    pub fn remove_device(&mut self, subsystem: &str, path: &str) {
        if let Some(entry) = self.entries.get_mut(subsystem) {
            entry.devices.remove(path);
            let _ = entry.on_remove.send(path.to_owned());
        }
    }
}

impl Default for SubsystemMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_add_once() {
        let mut map = SubsystemMap::new();
        let mut sub_add = map.subscribe_subsystem_add();
        map.add_device("block", "a/b");
        map.add_device("block", "a/c");

        assert_eq!(sub_add.try_recv().unwrap(), "block");
        assert!(sub_add.try_recv().is_err());
        assert_eq!(
            map.get("block").unwrap().devices().len(),
            2
        );
    }

    #[test]
    fn remove_updates_set_and_fires() {
        let mut map = SubsystemMap::new();
        map.add_device("block", "a/b");
        let mut on_remove = map.get("block").unwrap().subscribe_remove();
        map.remove_device("block", "a/b");
        assert!(map.get("block").unwrap().devices().is_empty());
        assert_eq!(on_remove.try_recv().unwrap(), "a/b");
    }
}
