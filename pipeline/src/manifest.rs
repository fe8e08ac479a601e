use std::path::{Path, PathBuf};

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult};
use chaos_tunnel_export::prelude::ExportWindow;
use chaos_tunnel_faults::prelude::FaultKind;
use chaos_tunnel_runner::prelude::InjectionRecord;
use serde::{Deserialize, Serialize};

/// How far a run got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RunStatus {
    Complete,
    /// The exporter produced nothing for `failed_resolution`, so later resolutions were skipped.
    Partial {
        failed_resolution: String,
        reason: String,
    },
}

/// One produced time series file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifact {
    pub resolution: String,
    pub path: PathBuf,
}

/// Files of a run, in the order they were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub log: PathBuf,
    pub duration: PathBuf,
    pub injection_epoch: PathBuf,
    pub exports: Vec<ExportArtifact>,
    /// `metrics.csv`, present once at least one export succeeded.
    pub alias: Option<PathBuf>,
}

/// Summary of a run, written to `manifest.json` in the run directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub tool_version: String,
    pub run_dir: PathBuf,
    pub service: String,
    pub kind: FaultKind,
    pub injection: InjectionRecord,
    pub window: ExportWindow,
    pub artifacts: RunArtifacts,
    pub status: RunStatus,
}

impl RunManifest {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    pub fn write(&self, path: &Path) -> ChaosResult<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ChaosError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: &Path) -> ChaosResult<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ChaosError::Serialization(format!("failed to read {}: {e}", path.display()))
        })
    }
}
