use std::path::Path;

/// The small slice of the host filesystem the engine inspects. Injected so
/// firmware probes and device-node waits can be tested without real hardware.
pub trait HostFs: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_block_device(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostFs for SystemHost {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_block_device(&self, path: &Path) -> bool {
        use std::os::unix::fs::FileTypeExt;

        // Follows symlinks, so /dev/disk/by-uuid/* resolves to the node.
        std::fs::metadata(path)
            .map(|m| m.file_type().is_block_device())
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(path)
    }
}
