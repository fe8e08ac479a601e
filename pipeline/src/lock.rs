use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult};
use chaos_tunnel_faults::prelude::FaultKind;

/// Exclusive claim on a `(service, kind)` pair within an output root.
///
/// The lock is a file created with `create_new`, holding the pid of the owner. It is removed when
/// the lock is dropped. A lock left behind by a killed process has to be removed by hand.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(root: &Path, service: &str, kind: FaultKind) -> ChaosResult<Self> {
        Self::acquire_with(root, service, kind, |file| {
            write!(file, "{}", std::process::id())
        })
    }

    fn acquire_with(
        root: &Path,
        service: &str,
        kind: FaultKind,
        write_owner: impl FnOnce(&mut File) -> std::io::Result<()>,
    ) -> ChaosResult<Self> {
        std::fs::create_dir_all(root)?;
        let path = root.join(format!(".lock-{service}-{kind}"));

        match File::create_new(&path) {
            Ok(mut file) => {
                let lock = Self { path };
                if let Err(e) = write_owner(&mut file) {
                    // Closed first so the guard can remove it
                    drop(file);
                    return Err(e.into());
                }
                log::debug!("Acquired run lock {}", lock.path.display());
                Ok(lock)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ChaosError::RunLocked {
                service: service.to_string(),
                kind: kind.to_string(),
                path,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove run lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_second_acquire_is_refused_until_release() {
        let root = TempDir::new().unwrap();

        let lock = RunLock::acquire(root.path(), "carts", FaultKind::Cpu).unwrap();
        assert!(lock.path().exists());

        let second = RunLock::acquire(root.path(), "carts", FaultKind::Cpu);
        assert!(matches!(second, Err(ChaosError::RunLocked { ref service, .. }) if service == "carts"));

        drop(lock);
        assert!(!root.path().join(".lock-carts-cpu").exists());
        RunLock::acquire(root.path(), "carts", FaultKind::Cpu).unwrap();
    }

    #[test]
    fn test_lock_removed_when_owner_cannot_be_written() {
        let root = TempDir::new().unwrap();

        let result = RunLock::acquire_with(root.path(), "carts", FaultKind::Cpu, |_| {
            Err(std::io::Error::new(ErrorKind::Other, "disk full"))
        });

        assert!(matches!(result, Err(ChaosError::Io(_))));
        assert!(!root.path().join(".lock-carts-cpu").exists());
        RunLock::acquire(root.path(), "carts", FaultKind::Cpu).unwrap();
    }

    #[test]
    fn test_lock_holds_owner_pid() {
        let root = TempDir::new().unwrap();

        let lock = RunLock::acquire(root.path(), "orders", FaultKind::NetworkDelay).unwrap();

        assert_eq!(
            std::fs::read_to_string(lock.path()).unwrap(),
            std::process::id().to_string()
        );
    }

    #[test]
    fn test_pairs_lock_independently() {
        let root = TempDir::new().unwrap();

        let _cpu = RunLock::acquire(root.path(), "carts", FaultKind::Cpu).unwrap();
        let _memory = RunLock::acquire(root.path(), "carts", FaultKind::Memory).unwrap();
        let _orders = RunLock::acquire(root.path(), "orders", FaultKind::Cpu).unwrap();
    }
}
