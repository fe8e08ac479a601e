use std::fs::File;
use std::io::Write;
use std::path::Path;

use chaos_tunnel_core::prelude::{ChaosResult, Seconds};
use chaos_tunnel_faults::prelude::FaultKind;
use serde::{Deserialize, Serialize};

/// When a fault took effect, and what it was.
///
/// This is the only thing handed from the injection stage to the export stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionRecord {
    /// Unix timestamp in seconds, captured right after the cluster accepted the fault.
    started_at: i64,
    kind: FaultKind,
    target: String,
    requested_duration: Seconds,
}

impl InjectionRecord {
    pub fn new(
        started_at: i64,
        kind: FaultKind,
        target: impl Into<String>,
        requested_duration: Seconds,
    ) -> Self {
        Self {
            started_at,
            kind,
            target: target.into(),
            requested_duration,
        }
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn requested_duration(&self) -> Seconds {
        self.requested_duration
    }

    /// Write the start epoch as a bare base-10 integer with no trailing newline.
    ///
    /// The file must not exist yet.
    pub fn write_epoch_file(&self, path: impl AsRef<Path>) -> ChaosResult<()> {
        let mut file = File::create_new(path.as_ref())?;
        write!(file, "{}", self.started_at)?;
        file.sync_all()?;
        Ok(())
    }
}
