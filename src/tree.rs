//! The device tree store: an immutable-by-replacement tree of [`DeviceNode`]s
//! indexed by path segment, per §4.2.
//!
//! Every mutation (`insert`/`remove`/`move_node`) takes a tree value and
//! returns a *new* tree value; it never mutates the tree it was given. What
//! does survive mutation, deliberately, is each node's broadcast channels:
//! when an ancestor is rebuilt because one of its descendants changed, the
//! ancestor's own `NodeChannels` are cloned forward into the new node rather
//! than recreated, so existing subscribers keep receiving events for that
//! node across the rebuild. Only a node that is actually replaced or removed
//! loses its channels.
use std::{collections::HashMap, sync::Arc};

use tokio::sync::broadcast;

use crate::{device::Device, event::KernelEvent, path};

const CHANNEL_CAPACITY: usize = 256;

/// The six per-node broadcast channels named in §3.
#[derive(Clone)]
pub struct NodeChannels {
    pub on_remove: broadcast::Sender<KernelEvent>,
    pub on_change: broadcast::Sender<KernelEvent>,
    pub on_move: broadcast::Sender<KernelEvent>,
    pub on_online: broadcast::Sender<KernelEvent>,
    pub on_offline: broadcast::Sender<KernelEvent>,
    pub on_other: broadcast::Sender<KernelEvent>,
}

impl NodeChannels {
    fn fresh() -> Self {
        Self {
            on_remove: broadcast::channel(CHANNEL_CAPACITY).0,
            on_change: broadcast::channel(CHANNEL_CAPACITY).0,
            on_move: broadcast::channel(CHANNEL_CAPACITY).0,
            on_online: broadcast::channel(CHANNEL_CAPACITY).0,
            on_offline: broadcast::channel(CHANNEL_CAPACITY).0,
            on_other: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }
}

/// A node in the device tree.
///
/// Nodes are reference-counted ([`Arc`]) so that unmodified subtrees are
/// shared, not copied, when an ancestor is rebuilt.
pub struct DeviceNode {
    pub subsystem: Option<String>,
    pub device: Option<Device>,
    children: HashMap<String, Arc<DeviceNode>>,
    pub channels: NodeChannels,
}

impl DeviceNode {
    /// `create(subsystem?, device?)`, §4.2: a fresh node with no children and
    /// six fresh broadcast channels.
    pub fn create(subsystem: Option<String>, device: Option<Device>) -> Arc<Self> {
        Arc::new(Self {
            subsystem,
            device,
            children: HashMap::new(),
            channels: NodeChannels::fresh(),
        })
    }

    /// An anonymous intermediate node, created implicitly by `insert` when it
    /// needs a parent that doesn't exist yet.
    fn anonymous() -> Arc<Self> {
        Self::create(None, None)
    }

    /// Root node of an empty tree.
    pub fn empty_root() -> Arc<Self> {
        Self::anonymous()
    }

    pub fn children(&self) -> &HashMap<String, Arc<DeviceNode>> {
        &self.children
    }

    fn with_children(&self, children: HashMap<String, Arc<DeviceNode>>) -> Arc<Self> {
        Arc::new(Self {
            subsystem: self.subsystem.clone(),
            device: self.device,
            children,
            channels: self.channels.clone(),
        })
    }
}

/// `lookup(path, root)`, §4.2.
pub fn lookup(path: &str, root: &Arc<DeviceNode>) -> Option<Arc<DeviceNode>> {
    let (head, tail) = path::split(path);
    if head.is_empty() {
        return Some(root.clone());
    }
    let child = root.children.get(head)?;
    if tail.is_empty() {
        Some(child.clone())
    } else {
        lookup(tail, child)
    }
}

/// `insert(path, node, root)`, §4.2: creates anonymous intermediate nodes as
/// needed; if the final segment already exists, its subtree is replaced
/// wholesale (the existing node's channels are *not* carried over — it is a
/// different node now).
pub fn insert(path: &str, node: Arc<DeviceNode>, root: &Arc<DeviceNode>) -> Arc<DeviceNode> {
    let (head, tail) = path::split(path);
    if head.is_empty() {
        return node;
    }
    let mut children = root.children.clone();
    let new_child = if tail.is_empty() {
        node
    } else {
        let existing = children.get(head).cloned().unwrap_or_else(DeviceNode::anonymous);
        insert(tail, node, &existing)
    };
    children.insert(head.to_string(), new_child);
    root.with_children(children)
}

/// `remove(path, root)`, §4.2. Absent paths are a no-op, returning the
/// original `root` `Arc` unchanged.
pub fn remove(path: &str, root: &Arc<DeviceNode>) -> Arc<DeviceNode> {
    let (head, tail) = path::split(path);
    if head.is_empty() {
        return root.clone();
    }
    let Some(existing) = root.children.get(head) else {
        return root.clone();
    };
    let mut children = root.children.clone();
    if tail.is_empty() {
        children.remove(head);
    } else {
        let new_child = remove(tail, existing);
        children.insert(head.to_string(), new_child);
    }
    root.with_children(children)
}

/// `move(src, tgt, root)`, §4.2.
///
/// Returns `None` if there is no node at `src` (the "missing source" usage
/// error from the reference design; callers are expected to warn and recover,
/// see [`crate::manager`]).
pub fn move_node(src: &str, tgt: &str, root: &Arc<DeviceNode>) -> Option<Arc<DeviceNode>> {
    let (src_head, src_tail) = path::split(src);
    let (tgt_head, tgt_tail) = path::split(tgt);

    if !src_head.is_empty() && src_head == tgt_head {
        let child = root.children.get(src_head)?;
        let new_child = move_node(src_tail, tgt_tail, child)?;
        let mut children = root.children.clone();
        children.insert(src_head.to_string(), new_child);
        return Some(root.with_children(children));
    }

    let node = lookup(src, root)?;
    let removed = remove(src, root);
    Some(insert(tgt, node, &removed))
}

/// Walk every node carrying a [`Device`], returning its full path and node.
///
/// Backs `listDevices()`; paths are built without a leading slash, matching
/// the convention used throughout this crate (`"a/b"`, not `"/a/b"`).
pub fn list_devices(root: &Arc<DeviceNode>) -> Vec<(String, Arc<DeviceNode>)> {
    let mut out = Vec::new();
    walk(root, String::new(), &mut out);
    out
}

fn walk(node: &Arc<DeviceNode>, prefix: String, out: &mut Vec<(String, Arc<DeviceNode>)>) {
    if node.device.is_some() {
        out.push((prefix.clone(), node.clone()));
    }
    for (name, child) in &node.children {
        let child_path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        walk(child, child_path, out);
    }
}
