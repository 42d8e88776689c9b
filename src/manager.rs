//! The Device Manager, §4.6: owns the device tree and subsystem index,
//! merges cold-plug enumeration with the hot-plug event stream, and brokers
//! handle acquisition.
use std::{
    path::{Path, PathBuf},
    sync::{atomic::{AtomicU64, Ordering}, Arc},
};

use tokio::{
    sync::{broadcast, RwLock},
    task::JoinHandle,
};
use walkdir::WalkDir;

use crate::{
    device::Device,
    error::ManagerError,
    event::{Action, EventSource, KernelEvent},
    handle, path,
    subsystem::{SubsystemEntry, SubsystemMap},
    sysfs,
    tree::{self, DeviceNode},
};

struct ManagerState {
    root: Arc<DeviceNode>,
    subsystems: SubsystemMap,
}

struct Inner {
    sysfs_root: PathBuf,
    devfs_root: PathBuf,
    counter: AtomicU64,
    state: RwLock<ManagerState>,
    events: EventSource,
}

/// A handle to the running device manager. Cheap to clone; clones share the
/// same tree, subsystem index, and event loop.
#[derive(Clone)]
pub struct DeviceManager {
    inner: Arc<Inner>,
}

/// `initDeviceManager(sysfs, devfs)`, §4.6.
///
/// Subscribes to the event source and spawns the event-handling task before
/// cold-plug enumeration runs, so hot-plug events racing the walk are queued
/// rather than lost (step 1 of the reference initialization order).
#[tracing::instrument(skip_all, fields(sysfs = %sysfs_root.as_ref().display()))]
pub async fn init(sysfs_root: impl AsRef<Path>, devfs_root: impl AsRef<Path>) -> (DeviceManager, JoinHandle<()>) {
    let events = EventSource::new();
    let rx = events.subscribe();

    let manager = DeviceManager {
        inner: Arc::new(Inner {
            sysfs_root: sysfs_root.as_ref().to_path_buf(),
            devfs_root: devfs_root.as_ref().to_path_buf(),
            counter: AtomicU64::new(0),
            state: RwLock::new(ManagerState {
                root: DeviceNode::empty_root(),
                subsystems: SubsystemMap::new(),
            }),
            events,
        }),
    };

    manager.cold_plug().await;

    let loop_manager = manager.clone();
    let task = tokio::spawn(run_event_loop(loop_manager, rx));

    (manager, task)
}

async fn run_event_loop(manager: DeviceManager, mut rx: broadcast::Receiver<KernelEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => manager.handle_event(event).await,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event loop lagged, some events were dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl DeviceManager {
    /// Step 3 of initialization: walk `sysfs/devices`, best-effort, emitting
    /// a synthetic `deviceAdd(path, none)` for every directory found.
    /// Directory listing failures are logged and skipped, never fatal.
    #[tracing::instrument(skip(self))]
    async fn cold_plug(&self) {
        let devices_root = self.inner.sysfs_root.join("devices");
        let walker = WalkDir::new(&devices_root).into_iter();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "sysfs walk entry failed, skipping");
                    continue;
                }
            };
            if !entry.file_type().is_dir() || entry.path() == devices_root {
                continue;
            }
            let relative = match entry.path().strip_prefix(&devices_root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let Some(relative_str) = relative.to_str() else {
                tracing::warn!(path = ?relative, "non-utf8 sysfs path, skipping");
                continue;
            };
            if let Err(e) = self.device_add(relative_str, None).await {
                tracing::warn!(path = relative_str, error = %e, "cold-plug add failed, skipping");
            }
        }
    }

    /// Event handler dispatch on `devpath`, §4.6.
    #[tracing::instrument(skip(self, event), fields(devpath = %event.devpath, action = ?event.action))]
    async fn handle_event(&self, event: KernelEvent) {
        if let Some(stripped) = path::strip_segment(&event.devpath, "devices").map(str::to_owned) {
            let stripped = stripped.as_str();
            let result = match event.action.clone() {
                Action::Add => self.device_add(stripped, Some(event)).await,
                Action::Remove => self.device_remove(stripped, event).await,
                Action::Move => self.device_move(stripped, event).await,
                Action::Change | Action::Online | Action::Offline | Action::Other(_) => {
                    self.publish_to_node(stripped, event).await
                }
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "event handler failed, continuing");
            }
        } else if path::strip_segment(&event.devpath, "module").is_some() {
            tracing::debug!(devpath = %event.devpath, "module event ignored, out of scope");
        } else {
            let err = crate::error::EventError::UnrecognizedDevpath(event.devpath.clone());
            tracing::warn!(error = %err, "event for unrecognized devpath prefix");
        }
    }

    async fn publish_to_node(&self, path: &str, event: KernelEvent) -> Result<(), ManagerError> {
        let state = self.inner.state.read().await;
        let Some(node) = tree::lookup(path, &state.root) else {
            tracing::warn!(path, "event for unknown node");
            return Ok(());
        };
        let channel = match event.action {
            Action::Change => &node.channels.on_change,
            Action::Online => &node.channels.on_online,
            Action::Offline => &node.channels.on_offline,
            _ => &node.channels.on_other,
        };
        let _ = channel.send(event);
        Ok(())
    }

    /// `deviceAdd(path, ev?)`, §4.6.
    #[tracing::instrument(skip(self, event))]
    pub async fn device_add(&self, path: &str, event: Option<KernelEvent>) -> Result<(), ManagerError> {
        let (subsystem, device) = self.classify(path, event.as_ref())?;
        let node = DeviceNode::create(subsystem.clone(), device);

        let mut state = self.inner.state.write().await;
        state.root = tree::insert(path, node, &state.root);
        if let Some(subsystem) = subsystem {
            state.subsystems.add_device(&subsystem, path);
        }
        Ok(())
    }

    /// Resolve `(subsystem?, device?)` for an add: prefer the event's
    /// `MAJOR`/`MINOR` details to avoid a sysfs read, falling back to the
    /// sysfs reader facade.
    fn classify(
        &self,
        path: &str,
        event: Option<&KernelEvent>,
    ) -> Result<(Option<String>, Option<Device>), ManagerError> {
        if let Some(event) = event {
            if let Some((major, minor)) = event.major_minor() {
                let subsystem = event.subsystem_hint().map(str::to_owned);
                let device = subsystem
                    .as_deref()
                    .map(|s| sysfs::make_device(s, crate::device::DeviceId::new(major, minor)));
                if subsystem.is_some() {
                    return Ok((subsystem, device));
                }
            }
        }
        let sysfs_path = self.inner.sysfs_root.join("devices").join(path);
        Ok(sysfs::read_classification(&sysfs_path)?)
    }

    /// `deviceRemove(path, ev)`, §4.6.
    #[tracing::instrument(skip(self, event))]
    pub async fn device_remove(&self, path: &str, event: KernelEvent) -> Result<(), ManagerError> {
        let mut state = self.inner.state.write().await;
        let Some(node) = tree::lookup(path, &state.root) else {
            tracing::warn!(path, "remove for unknown node");
            return Ok(());
        };
        let _ = node.channels.on_remove.send(event);
        state.root = tree::remove(path, &state.root);
        if let Some(subsystem) = &node.subsystem {
            state.subsystems.remove_device(subsystem, path);
        }
        Ok(())
    }

    /// `deviceMove(path, ev)`, §4.6. Missing source falls back to
    /// `deviceAdd`, per the resolved Open Question.
    #[tracing::instrument(skip(self, event))]
    pub async fn device_move(&self, path: &str, event: KernelEvent) -> Result<(), ManagerError> {
        let devpath_old = event.devpath_old()?.to_owned();
        let old_path = path::strip_segment(&devpath_old, "devices").unwrap_or(&devpath_old);

        let mut state = self.inner.state.write().await;
        match tree::lookup(old_path, &state.root) {
            Some(node) => {
                state.root = tree::move_node(old_path, path, &state.root)
                    .expect("move_node must succeed: lookup above already confirmed the source exists");
                if let Some(subsystem) = &node.subsystem {
                    state.subsystems.remove_device(subsystem, old_path);
                    state.subsystems.add_device(subsystem, path);
                }
                let _ = node.channels.on_move.send(event);
                Ok(())
            }
            None => {
                drop(state);
                tracing::warn!(old = old_path, new = path, "move source missing, falling back to add");
                self.device_add(path, Some(event)).await
            }
        }
    }

    /// `deviceLookup(path)`, §4.6: a non-suspending snapshot read.
    pub async fn device_lookup(&self, path: &str) -> Option<Arc<DeviceNode>> {
        let state = self.inner.state.read().await;
        tree::lookup(path, &state.root)
    }

    /// `listDevices()`, §6.
    pub async fn list_devices(&self) -> Vec<(String, Arc<DeviceNode>)> {
        let state = self.inner.state.read().await;
        tree::list_devices(&state.root)
    }

    /// `listDeviceClasses()`, §6.
    pub async fn list_device_classes(&self) -> Vec<String> {
        let state = self.inner.state.read().await;
        state.subsystems.classes().map(str::to_owned).collect()
    }

    /// `listDevicesWithClass(class)`, §6. Errors with
    /// [`ManagerError::EntryNotFound`] if `class` has never been observed.
    pub async fn list_devices_with_class(&self, class: &str) -> Result<Vec<String>, ManagerError> {
        let state = self.inner.state.read().await;
        state
            .subsystems
            .get(class)
            .map(|entry| entry.devices().iter().cloned().collect())
            .ok_or_else(|| ManagerError::EntryNotFound(class.to_owned()))
    }

    /// Subscribe to `onSubsystemAdd`, fired the first time a subsystem name
    /// is observed (§4.3).
    pub async fn subscribe_subsystem_add(&self) -> broadcast::Receiver<String> {
        self.inner.state.read().await.subsystems.subscribe_subsystem_add()
    }

    /// Subscribe to `onAdd`/`onRemove` for an already-observed subsystem.
    pub async fn subscribe_subsystem(&self, class: &str) -> Option<(broadcast::Receiver<String>, broadcast::Receiver<String>)> {
        let state = self.inner.state.read().await;
        let entry: &SubsystemEntry = state.subsystems.get(class)?;
        Some((entry.subscribe_add(), entry.subscribe_remove()))
    }

    /// `getDeviceHandle(device)`, §4.9: allocate a unique ephemeral devfs
    /// name and broker the mknod/open/unlink sequence.
    #[tracing::instrument(skip(self))]
    pub async fn get_device_handle(&self, device: Device) -> Result<std::fs::File, ManagerError> {
        let id = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("./dev{id}");
        Ok(handle::get_device_handle(&self.inner.devfs_root, &name, device)?)
    }

    /// `getDeviceHandleByName(path)`, §6: resolve a tree path to its
    /// [`Device`] and open a handle for it.
    pub async fn get_device_handle_by_name(&self, path: &str) -> Result<std::fs::File, ManagerError> {
        let node = self
            .device_lookup(path)
            .await
            .ok_or_else(|| ManagerError::DeviceNotFound(path.to_owned()))?;
        let device = node
            .device
            .ok_or_else(|| ManagerError::DeviceNotFound(path.to_owned()))?;
        self.get_device_handle(device).await
    }

    /// `releaseDeviceHandle(h)`, §6.
    pub fn release_device_handle(&self, h: std::fs::File) {
        handle::release_device_handle(h);
    }

    /// `openDeviceDir(device)`, §4.9.
    pub async fn open_device_dir(&self, device: Device) -> Result<std::fs::File, ManagerError> {
        Ok(handle::open_device_dir(&self.inner.devfs_root, device)?)
    }

    /// Publish a kernel event onto this manager's inbound channel. Exposed
    /// for whatever feeds real or synthetic uevents in; tests use it to
    /// drive hot-plug scenarios directly.
    pub fn publish(&self, event: KernelEvent) -> Result<usize, broadcast::error::SendError<KernelEvent>> {
        self.inner.events.publish(event)
    }
}
