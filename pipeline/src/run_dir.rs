use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult};
use chaos_tunnel_faults::prelude::FaultKind;
use chrono::DateTime;

pub const LOG_FILE: &str = "pipeline.log";
pub const EPOCH_FILE: &str = "inject_epoch.txt";
pub const DURATION_FILE: &str = "duration.txt";
pub const MANIFEST_FILE: &str = "manifest.json";
/// Stable name for the first export of a run. Per-resolution exports are named after it.
pub const METRICS_ALIAS: &str = "metrics.csv";

const MAX_SUFFIX: u32 = 1000;

/// The directory holding every artifact of one experiment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    path: PathBuf,
}

impl RunDir {
    /// Create `<root>/<UTC %Y%m%dT%H%M%SZ>_<service>_<kind>`.
    ///
    /// Creation is atomic. If another run already took the name, `-1`, `-2`, .. is appended until a
    /// free name is found.
    pub fn create(root: &Path, started_at: i64, service: &str, kind: FaultKind) -> ChaosResult<Self> {
        std::fs::create_dir_all(root)?;

        let timestamp = DateTime::from_timestamp(started_at, 0)
            .map(|t| t.format("%Y%m%dT%H%M%SZ").to_string())
            .ok_or_else(|| {
                ChaosError::Serialization(format!("{started_at} is not a representable time"))
            })?;
        let base = format!("{timestamp}_{service}_{kind}");

        for suffix in 0..MAX_SUFFIX {
            let name = match suffix {
                0 => base.clone(),
                n => format!("{base}-{n}"),
            };
            let path = root.join(name);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    log::debug!("Created run directory {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(ChaosError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free run directory name for {base} in {}", root.display()),
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    pub fn epoch_path(&self) -> PathBuf {
        self.path.join(EPOCH_FILE)
    }

    pub fn duration_path(&self) -> PathBuf {
        self.path.join(DURATION_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }

    pub fn alias_path(&self) -> PathBuf {
        self.path.join(METRICS_ALIAS)
    }

    /// Point `metrics.csv` at `target`, which must live in this directory.
    ///
    /// On unix this is a relative symlink so the run directory can be moved as a whole. Elsewhere
    /// the file is copied.
    pub fn link_alias(&self, target: &Path) -> ChaosResult<PathBuf> {
        let alias = self.alias_path();
        if alias.symlink_metadata().is_ok() {
            std::fs::remove_file(&alias)?;
        }

        #[cfg(unix)]
        {
            let relative = target.file_name().map(PathBuf::from).ok_or_else(|| {
                ChaosError::Serialization(format!("{} has no file name", target.display()))
            })?;
            std::os::unix::fs::symlink(relative, &alias)?;
        }
        #[cfg(not(unix))]
        {
            std::fs::copy(target, &alias)?;
        }

        Ok(alias)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    const STARTED: i64 = 1_762_691_400;

    #[test]
    fn test_name_carries_time_service_and_kind() {
        let root = TempDir::new().unwrap();
        let run_dir = RunDir::create(root.path(), STARTED, "carts", FaultKind::Memory).unwrap();

        assert_eq!(
            run_dir.path(),
            root.path().join("20251109T123000Z_carts_memory")
        );
        assert!(run_dir.path().is_dir());
    }

    #[test]
    fn test_collisions_get_a_suffix() {
        let root = TempDir::new().unwrap();
        let first = RunDir::create(root.path(), STARTED, "orders", FaultKind::Cpu).unwrap();
        let second = RunDir::create(root.path(), STARTED, "orders", FaultKind::Cpu).unwrap();
        let third = RunDir::create(root.path(), STARTED, "orders", FaultKind::Cpu).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            second.path().file_name().unwrap(),
            "20251109T123000Z_orders_cpu-1"
        );
        assert_eq!(
            third.path().file_name().unwrap(),
            "20251109T123000Z_orders_cpu-2"
        );
    }

    #[test]
    fn test_alias_follows_target() {
        let root = TempDir::new().unwrap();
        let run_dir = RunDir::create(root.path(), STARTED, "user", FaultKind::NetworkDelay).unwrap();
        let first = run_dir.path().join("metrics_5s.csv");
        let second = run_dir.path().join("metrics_15s.csv");
        std::fs::write(&first, "time\n1\n").unwrap();
        std::fs::write(&second, "time\n2\n").unwrap();

        let alias = run_dir.link_alias(&first).unwrap();
        assert_eq!(std::fs::read_to_string(&alias).unwrap(), "time\n1\n");

        run_dir.link_alias(&second).unwrap();
        assert_eq!(std::fs::read_to_string(&alias).unwrap(), "time\n2\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_alias_is_a_relative_symlink() {
        let root = TempDir::new().unwrap();
        let run_dir = RunDir::create(root.path(), STARTED, "user", FaultKind::Cpu).unwrap();
        let target = run_dir.path().join("metrics_15s.csv");
        std::fs::write(&target, "time\n").unwrap();

        let alias = run_dir.link_alias(&target).unwrap();

        assert_eq!(
            std::fs::read_link(alias).unwrap(),
            PathBuf::from("metrics_15s.csv")
        );
    }
}
