//! KernelSystem: the per-computer context.
//!
//! A kernel owns one filesystem [`Root`], the [`DevDevice`] listing the
//! computer's devices, and one [`SignalRegistry`] for its network
//! component. The host creates it at boot, calls [`KernelSystem::tick`]
//! from its simulation loop and shuts it down (or drops it) at power-off.

use std::sync::Arc;

use tokio::time::Instant;

use crate::config::KernelConfig;
use crate::error::{FsError, KernelError, KernelResult};
use crate::signal::{
    ObjectId, ObjectResolver, PullOutcome, PullTimeout, SenderHub, SignalRegistry,
};
use crate::vfs::{DevDevice, Device, FileMode, FileStream, MemDevice, Root, TMPFS_TAG};

/// Power state of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelState {
    Running,
    Shutoff,
}

#[derive(Debug)]
pub struct KernelSystem {
    name: String,
    state: KernelState,
    filesystem: Root,
    devices: Arc<DevDevice>,
    network: Arc<SignalRegistry>,
}

impl KernelSystem {
    /// Boot a kernel.
    ///
    /// `identity` is the computer's own object id; it is the listener side of
    /// every trace the kernel registers on `hub`.
    pub fn new(
        config: KernelConfig,
        identity: ObjectId,
        hub: Arc<SenderHub>,
        resolver: Arc<dyn ObjectResolver>,
    ) -> KernelResult<Self> {
        let kernel = Self {
            name: config.name.clone(),
            state: KernelState::Running,
            filesystem: Root::new(),
            devices: Arc::new(DevDevice::new()),
            network: Arc::new(SignalRegistry::new(identity, hub, resolver)),
        };

        if config.root_tmpfs {
            let drive = Arc::new(MemDevice::new());
            kernel.devices.add_device("root", drive.clone())?;
            kernel.filesystem.mount_device(drive, "/")?;
        }
        if let Some(dev_path) = &config.dev_path {
            kernel.init_filesystem(dev_path)?;
        }
        if let Some(tmp_path) = &config.tmp_mount {
            let scratch = Arc::new(MemDevice::new());
            kernel.devices.add_device("tmp", scratch.clone())?;
            kernel.filesystem.mount_device(scratch, tmp_path)?;
        }

        tracing::debug!(name = %kernel.name, %identity, "kernel: boot");
        Ok(kernel)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn filesystem(&self) -> &Root {
        &self.filesystem
    }

    pub fn devices(&self) -> &Arc<DevDevice> {
        &self.devices
    }

    pub fn network(&self) -> &Arc<SignalRegistry> {
        &self.network
    }

    fn ensure_running(&self) -> KernelResult<()> {
        match self.state {
            KernelState::Running => Ok(()),
            KernelState::Shutoff => Err(KernelError::Shutoff),
        }
    }

    /// Mount the device listing at `path`. It can be mounted only once.
    pub fn init_filesystem(&self, path: &str) -> KernelResult<()> {
        self.ensure_running()?;
        let devices: Arc<dyn Device> = self.devices.clone();
        if let Some(existing) = self.filesystem.mount_point_of(&devices) {
            return Err(FsError::AlreadyMounted(existing.to_string()).into());
        }
        self.filesystem.mount_device(devices, path)?;
        Ok(())
    }

    /// Create a new device of type `tag` and list it as `name`.
    pub fn make_device(&self, tag: &str, name: &str) -> KernelResult<()> {
        self.ensure_running()?;
        let device: Arc<dyn Device> = match tag {
            TMPFS_TAG => Arc::new(MemDevice::new()),
            other => return Err(FsError::UnsupportedDeviceType(other.to_string()).into()),
        };
        self.devices.add_device(name, device)?;
        tracing::debug!(kernel = %self.name, tag, name, "kernel: make device");
        Ok(())
    }

    /// Open a file with a mode token such as `r`, `w` or `+a`.
    pub fn open(&self, path: &str, mode: &str) -> KernelResult<FileStream> {
        self.ensure_running()?;
        let mode: FileMode = mode.parse()?;
        Ok(self.filesystem.open(path, mode)?)
    }

    /// Pull from the network queue with a script-level timeout in seconds.
    pub fn pull(&self, timeout_secs: Option<f64>) -> KernelResult<PullOutcome> {
        self.ensure_running()?;
        let timeout = PullTimeout::from_secs(timeout_secs)?;
        Ok(self.network.pull(timeout, Instant::now())?)
    }

    /// Advance the processor clock. Returns true if a pull just timed out.
    pub fn tick(&self, now: Instant) -> bool {
        self.state == KernelState::Running && self.network.tick(now)
    }

    /// Power off: discard any wait, drop registrations, unmount everything.
    ///
    /// Queued signals stay in the registry; only registrations are removed.
    pub fn shutdown(&mut self) {
        if self.state == KernelState::Shutoff {
            return;
        }
        let cancelled = self.network.cancel();
        let ignored = self.network.ignore_all();
        let unmounted = self.filesystem.unmount_all();
        self.state = KernelState::Shutoff;
        tracing::debug!(
            name = %self.name,
            cancelled,
            ignored,
            unmounted,
            "kernel: shutdown"
        );
    }
}

impl Drop for KernelSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use crate::signal::{Capabilities, Signal, WaitState};
    use crate::vfs::Node;

    fn resolver() -> Arc<dyn ObjectResolver> {
        Arc::new(|id: ObjectId| (id.0 < 100).then_some(Capabilities::new(true, false)))
    }

    fn boot(config: KernelConfig) -> KernelSystem {
        KernelSystem::new(config, ObjectId(1000), Arc::new(SenderHub::new()), resolver()).unwrap()
    }

    #[test]
    fn test_default_boot_mounts_dev() {
        let kernel = boot(KernelConfig::default());
        assert!(kernel.filesystem().is_dir("/dev"));
        assert!(kernel.filesystem().is_dir("/"));
        assert!(kernel.filesystem().children("/dev").unwrap().is_empty());
    }

    #[test]
    fn test_isolated_boot() {
        let kernel = boot(KernelConfig::isolated());
        kernel.filesystem().write_file("/boot.lua", b"print(1)").unwrap();
        assert!(!kernel.filesystem().exists("/dev"));

        kernel.init_filesystem("/dev").unwrap();
        let names: Vec<String> = kernel
            .filesystem()
            .children("/dev")
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(names, vec!["root"]);
    }

    #[test]
    fn test_init_filesystem_once() {
        let kernel = boot(KernelConfig::default());
        assert_eq!(
            kernel.init_filesystem("/other"),
            Err(KernelError::Fs(FsError::AlreadyMounted("/dev".to_string())))
        );
    }

    #[test]
    fn test_make_device() {
        let kernel = boot(KernelConfig::default());
        kernel.make_device("tmpfs", "drive").unwrap();
        assert!(matches!(kernel.filesystem().get("/dev/drive"), Ok(Node::Device(_))));

        assert_eq!(
            kernel.make_device("tmpfs", "drive"),
            Err(KernelError::Fs(FsError::AlreadyExists("/drive".to_string())))
        );
        assert_eq!(
            kernel.make_device("ext4", "disk"),
            Err(KernelError::Fs(FsError::UnsupportedDeviceType("ext4".to_string())))
        );
    }

    #[test]
    fn test_open_parses_mode_token() {
        let kernel = boot(KernelConfig::isolated());
        let mut stream = kernel.open("/f", "+w").unwrap();
        stream.write(b"abc").unwrap();
        stream.close().unwrap();
        assert_eq!(
            kernel.open("/f", "rw").unwrap_err(),
            KernelError::Fs(FsError::InvalidMode("rw".to_string()))
        );
    }

    #[test]
    fn test_pull_timeout_validation() {
        let kernel = boot(KernelConfig::isolated());
        assert_eq!(kernel.pull(Some(0.0)).unwrap(), PullOutcome::NoSignal);
        assert_eq!(
            kernel.pull(Some(-2.0)),
            Err(KernelError::Signal(SignalError::InvalidTimeout(-2.0)))
        );
        assert_eq!(
            kernel.pull(Some(1e20)),
            Err(KernelError::Signal(SignalError::InvalidTimeout(1e20)))
        );
        assert_eq!(kernel.network().wait_state(), WaitState::Running);
    }

    #[test]
    fn test_pull_with_far_deadline_suspends() {
        let kernel = boot(KernelConfig::isolated());
        assert_eq!(kernel.pull(Some(1e19)).unwrap(), PullOutcome::Suspended);
        assert_eq!(kernel.network().wait_state(), WaitState::BlockedIndefinite);
    }

    #[test]
    fn test_shutdown_tears_everything_down() {
        let mut kernel = boot(KernelConfig::isolated());
        kernel.network().listen(ObjectId(5)).unwrap();
        kernel.network().enqueue(Signal::new("queued", ObjectId(5)));
        assert_eq!(
            kernel.pull(None).unwrap(),
            PullOutcome::Signal(Signal::new("queued", ObjectId(5)))
        );
        assert_eq!(kernel.pull(None).unwrap(), PullOutcome::Suspended);

        kernel.shutdown();
        assert_eq!(kernel.state(), KernelState::Shutoff);
        assert!(kernel.filesystem().mounts().is_empty());
        assert!(kernel.network().senders().is_empty());
        assert!(!kernel.network().wait_state().is_blocked());
        assert_eq!(kernel.make_device("tmpfs", "x"), Err(KernelError::Shutoff));

        kernel.shutdown();
    }
}
