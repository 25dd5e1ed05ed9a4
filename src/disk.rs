//! Free space queries for install targets.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Space on the volume holding a path, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpace {
    pub free: u64,
    pub total: u64,
}

/// Source of free-space information; replaceable in tests.
pub trait DiskSpaceProvider: Send + Sync {
    fn disk_space(&self, path: &Path) -> io::Result<DiskSpace>;
}

/// Queries the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDiskSpace;

impl DiskSpaceProvider for SystemDiskSpace {
    fn disk_space(&self, path: &Path) -> io::Result<DiskSpace> {
        Ok(DiskSpace {
            free: fs2::available_space(path)?,
            total: fs2::total_space(path)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_disk_space() {
        let temp = tempfile::TempDir::new().unwrap();
        let space = SystemDiskSpace.disk_space(temp.path()).unwrap();
        assert!(space.total > 0);
        assert!(space.free <= space.total);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(SystemDiskSpace
            .disk_space(&temp.path().join("missing"))
            .is_err());
    }
}
