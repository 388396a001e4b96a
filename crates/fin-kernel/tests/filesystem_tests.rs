//! End-to-end filesystem behavior through a booted kernel.
//!
//! Every test boots its own kernel and goes through the public surface only:
//! `make_device`, `mount`, path operations on the root and file streams.

use std::sync::Arc;

use fin_kernel::signal::{Capabilities, ObjectId, ObjectResolver, SenderHub};
use fin_kernel::vfs::{FileMode, ReadFormat, ReadValue, Whence};
use fin_kernel::{FsError, KernelConfig, KernelSystem};
use proptest::prelude::*;

fn setup(config: KernelConfig) -> KernelSystem {
    let resolver: Arc<dyn ObjectResolver> =
        Arc::new(|_: ObjectId| Some(Capabilities::new(true, true)));
    KernelSystem::new(config, ObjectId(1), Arc::new(SenderHub::new()), resolver)
        .expect("failed to boot kernel")
}

/// Default boot plus a `tmpfs` drive mounted at `/` and another at `/tmp`.
fn setup_with_drives() -> KernelSystem {
    let kernel = setup(KernelConfig::default());
    kernel.make_device("tmpfs", "drive").unwrap();
    kernel.make_device("tmpfs", "scratch").unwrap();
    kernel.filesystem().mount("/dev/drive", "/").unwrap();
    kernel.filesystem().mount("/dev/scratch", "/tmp").unwrap();
    kernel
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_tmp_scenario() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();

    fs.create_dir("/tmp/a", false).unwrap();
    let mut stream = kernel.open("/tmp/a/f.txt", "w").unwrap();
    stream.write(b"hello").unwrap();
    stream.close().unwrap();

    let mut stream = kernel.open("/tmp/a/f.txt", "r").unwrap();
    assert_eq!(stream.read_all().unwrap(), b"hello");
    stream.close().unwrap();

    assert_eq!(
        fs.remove("/tmp/a", false),
        Err(FsError::DirectoryNotEmpty("/a".to_string()))
    );
    fs.remove("/tmp/a", true).unwrap();
    assert!(!fs.exists("/tmp/a"));
}

#[test]
fn test_remount_shows_no_stale_nodes() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    fs.write_file("/tmp/old.txt", b"old").unwrap();

    fs.unmount("/tmp").unwrap();
    assert!(!fs.exists("/tmp/old.txt"));

    kernel.make_device("tmpfs", "fresh").unwrap();
    fs.mount("/dev/fresh", "/tmp").unwrap();
    assert!(!fs.exists("/tmp/old.txt"));
    assert!(fs.children("/tmp").unwrap().is_empty());

    fs.unmount("/tmp").unwrap();
    fs.mount("/dev/scratch", "/tmp").unwrap();
    assert_eq!(fs.read_file("/tmp/old.txt").unwrap(), b"old");
}

#[test]
fn test_same_device_at_two_mount_points() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    fs.create_dir("/mnt", false).unwrap();
    fs.mount("/dev/scratch", "/mnt").unwrap();

    fs.write_file("/tmp/shared", b"both").unwrap();
    assert_eq!(fs.read_file("/mnt/shared").unwrap(), b"both");
}

#[test]
fn test_open_streams_keep_device_busy() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    let mut stream = kernel.open("/tmp/log", "a").unwrap();

    assert_eq!(fs.unmount("/tmp"), Err(FsError::Busy("/tmp".to_string())));
    stream.write(b"line\n").unwrap();
    stream.close().unwrap();
    fs.unmount("/tmp").unwrap();
}

#[test]
fn test_stale_stream_after_remove() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    fs.write_file("/doomed", b"x").unwrap();

    let mut stream = kernel.open("/doomed", "+r").unwrap();
    fs.remove("/doomed", false).unwrap();
    assert_eq!(stream.write(b"y"), Err(FsError::NotFound("/doomed".to_string())));
    assert_eq!(stream.read_all(), Err(FsError::NotFound("/doomed".to_string())));
    assert_eq!(stream.close(), Err(FsError::NotFound("/doomed".to_string())));
    assert_eq!(stream.close(), Ok(()));
}

#[test]
fn test_cross_device_move_leaves_both_sides_untouched() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    fs.create_dir("/docs", false).unwrap();
    fs.write_file("/docs/readme", b"r").unwrap();

    assert!(matches!(
        fs.rename("/docs", "/tmp/docs"),
        Err(FsError::CrossDeviceMoveUnsupported { .. })
    ));
    assert_eq!(fs.read_file("/docs/readme").unwrap(), b"r");
    assert!(!fs.exists("/tmp/docs"));

    fs.rename("/docs", "/archive").unwrap();
    assert_eq!(fs.read_file("/archive/readme").unwrap(), b"r");
}

#[test]
fn test_devices_cannot_be_edited_through_the_tree() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    assert!(matches!(fs.remove("/dev/drive", false), Err(FsError::ReadOnly(_))));
    assert!(matches!(fs.create_dir("/dev/x", false), Err(FsError::ReadOnly(_))));
    assert!(matches!(fs.mount("/tmp", "/x"), Err(FsError::NotMountable(_))));
}

#[test]
fn test_mount_listing() {
    let kernel = setup_with_drives();
    let mounts: Vec<(String, String)> = kernel
        .filesystem()
        .mounts()
        .into_iter()
        .map(|m| (m.path.to_string(), m.device_type))
        .collect();
    assert_eq!(
        mounts,
        vec![
            ("/".to_string(), "tmpfs".to_string()),
            ("/dev".to_string(), "devfs".to_string()),
            ("/tmp".to_string(), "tmpfs".to_string()),
        ]
    );
}

// ============================================================================
// Streams
// ============================================================================

#[test]
fn test_stream_formats() {
    let kernel = setup_with_drives();
    kernel
        .filesystem()
        .write_file("/data.txt", b"42 0x10\nsecond line\nrest")
        .unwrap();

    let mut stream = kernel.open("/data.txt", "r").unwrap();
    assert_eq!(stream.read(ReadFormat::Number).unwrap(), ReadValue::Number(42.0));
    assert_eq!(stream.read(ReadFormat::Number).unwrap(), ReadValue::Number(16.0));
    assert_eq!(
        stream.read(ReadFormat::Line).unwrap(),
        ReadValue::Line(String::new())
    );
    let lines: Vec<String> = stream.lines().collect::<Result<_, _>>().unwrap();
    assert_eq!(lines, vec!["second line", "rest"]);
    assert_eq!(stream.read(ReadFormat::Line).unwrap(), ReadValue::Eof);
    assert_eq!(stream.read(ReadFormat::All).unwrap(), ReadValue::Bytes(Vec::new()));
}

#[test]
fn test_append_and_seek() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    fs.write_file("/log", b"one\n").unwrap();

    let mut stream = fs.open("/log", FileMode::UpdateAppend).unwrap();
    stream.seek(Whence::Set, 0).unwrap();
    stream.write(b"two\n").unwrap();
    stream.seek(Whence::Set, 0).unwrap();
    assert_eq!(stream.read_all().unwrap(), b"one\ntwo\n");
    assert_eq!(stream.seek(Whence::Cur, -100), Err(FsError::InvalidSeek(-92)));
    stream.close().unwrap();
    stream.close().unwrap();
}

#[test]
fn test_writes_invisible_until_flush() {
    let kernel = setup_with_drives();
    let fs = kernel.filesystem();
    let mut writer = kernel.open("/draft", "w").unwrap();
    writer.write(b"pending").unwrap();
    assert_eq!(fs.read_file("/draft").unwrap(), b"");

    writer.flush().unwrap();
    assert_eq!(fs.read_file("/draft").unwrap(), b"pending");
}

#[test]
fn test_drop_closes_stream() {
    let kernel = setup_with_drives();
    {
        let mut stream = kernel.open("/tmp/dropped", "w").unwrap();
        stream.write(b"kept").unwrap();
    }
    assert_eq!(kernel.filesystem().read_file("/tmp/dropped").unwrap(), b"kept");
    kernel.filesystem().unmount("/tmp").unwrap();
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn write_close_reopen_round_trip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let kernel = setup_with_drives();
        let mut stream = kernel.open("/tmp/blob", "w").unwrap();
        stream.write(&data).unwrap();
        stream.close().unwrap();

        let mut stream = kernel.open("/tmp/blob", "r").unwrap();
        prop_assert_eq!(stream.read_all().unwrap(), data);
    }

    #[test]
    fn longest_mount_wins(name in "[a-z]{1,8}") {
        let kernel = setup_with_drives();
        let fs = kernel.filesystem();
        fs.create_dir("/tmp/inner", false).unwrap();
        kernel.make_device("tmpfs", "inner").unwrap();
        fs.mount("/dev/inner", "/tmp/inner").unwrap();

        let path = format!("/tmp/inner/{}", name);
        let resolved = fs.resolve(&path).unwrap();
        prop_assert_eq!(resolved.mount_point.to_string(), "/tmp/inner");
        prop_assert_eq!(resolved.relative.to_string(), format!("/{}", name));

        fs.write_file(&path, name.as_bytes()).unwrap();
        let outer_path = format!("/inner/{}", name);
        prop_assert!(!fs.exists(&outer_path));
        prop_assert_eq!(fs.read_file(&path).unwrap(), name.as_bytes());
    }
}
