//! Integration tests for the device manager's cold-plug/hot-plug scenarios,
//! S1-S4.
use std::fs;

use devmgrd::{
    device::{DeviceId, DeviceKind},
    event::{Action, KernelEvent},
    manager,
};

fn fake_sysfs_root() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

/// S1 — cold plug, one device.
#[tokio::test]
async fn cold_plug_one_device() {
    let sysfs = fake_sysfs_root();
    let dev_dir = sysfs.path().join("devices/platform/foo");
    fs::create_dir_all(&dev_dir).unwrap();
    fs::write(dev_dir.join("dev"), "240:5\n").unwrap();
    let class_dir = sysfs.path().join("class/xyz");
    fs::create_dir_all(&class_dir).unwrap();
    std::os::unix::fs::symlink(&class_dir, dev_dir.join("subsystem")).unwrap();

    let devfs = tempfile::tempdir().unwrap();
    let (mgr, task) = manager::init(sysfs.path(), devfs.path()).await;

    let node = mgr.device_lookup("platform/foo").await.unwrap();
    assert_eq!(node.subsystem.as_deref(), Some("xyz"));
    let device = node.device.unwrap();
    assert_eq!(device.kind, DeviceKind::Char);
    assert_eq!(device.id, DeviceId::new(240, 5));

    let with_class = mgr.list_devices_with_class("xyz").await.unwrap();
    assert_eq!(with_class, vec!["platform/foo".to_string()]);

    task.abort();
}

/// S2 — hot plug add.
#[tokio::test]
async fn hot_plug_add() {
    let sysfs = fake_sysfs_root();
    fs::create_dir_all(sysfs.path().join("devices")).unwrap();
    let devfs = tempfile::tempdir().unwrap();
    let (mgr, task) = manager::init(sysfs.path(), devfs.path()).await;

    let mut sub_add = mgr.subscribe_subsystem_add().await;

    let event = KernelEvent::new(Action::Add, "/devices/a/b")
        .with_detail("MAJOR", "7")
        .with_detail("MINOR", "2")
        .with_detail("SUBSYSTEM", "block");
    mgr.publish(event).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let ab = mgr.device_lookup("a/b").await.unwrap();
    assert_eq!(ab.device.unwrap(), devmgrd::device::Device::new(DeviceKind::Block, DeviceId::new(7, 2)));
    assert!(mgr.device_lookup("a").await.unwrap().device.is_none());
    assert_eq!(sub_add.try_recv().unwrap(), "block");
    let classified = mgr.list_devices_with_class("block").await.unwrap();
    assert_eq!(classified, vec!["a/b".to_string()]);

    task.abort();
}

/// S3 — move, continuing from S2's post-state.
#[tokio::test]
async fn move_relocates_device() {
    let sysfs = fake_sysfs_root();
    fs::create_dir_all(sysfs.path().join("devices")).unwrap();
    let devfs = tempfile::tempdir().unwrap();
    let (mgr, task) = manager::init(sysfs.path(), devfs.path()).await;

    mgr.publish(
        KernelEvent::new(Action::Add, "/devices/a/b")
            .with_detail("MAJOR", "7")
            .with_detail("MINOR", "2")
            .with_detail("SUBSYSTEM", "block"),
    )
    .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    mgr.publish(
        KernelEvent::new(Action::Move, "/devices/a/c")
            .with_detail("DEVPATH_OLD", "/devices/a/b"),
    )
    .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(mgr.device_lookup("a/b").await.is_none());
    let moved = mgr.device_lookup("a/c").await.unwrap();
    assert_eq!(moved.device.unwrap().id, DeviceId::new(7, 2));

    task.abort();
}

/// S4 — remove, continuing from S3's post-state.
#[tokio::test]
async fn remove_clears_tree_and_index() {
    let sysfs = fake_sysfs_root();
    fs::create_dir_all(sysfs.path().join("devices")).unwrap();
    let devfs = tempfile::tempdir().unwrap();
    let (mgr, task) = manager::init(sysfs.path(), devfs.path()).await;

    mgr.publish(
        KernelEvent::new(Action::Add, "/devices/a/b")
            .with_detail("MAJOR", "7")
            .with_detail("MINOR", "2")
            .with_detail("SUBSYSTEM", "block"),
    )
    .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    mgr.publish(KernelEvent::new(Action::Move, "/devices/a/c").with_detail("DEVPATH_OLD", "/devices/a/b"))
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    mgr.publish(KernelEvent::new(Action::Remove, "/devices/a/c")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(mgr.device_lookup("a/c").await.is_none());
    let classified = mgr.list_devices_with_class("block").await.unwrap();
    assert!(classified.is_empty());

    task.abort();
}
