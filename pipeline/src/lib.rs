pub mod cli;
mod collaborators;
mod config;
mod lock;
mod manifest;
mod pipeline;
mod plan;
mod run_dir;

pub mod prelude {
    pub use crate::cli::{ChaosTunnelCli, Command, FaultArgs, FaultCommand, FaultSetup};
    pub use crate::collaborators::{ClusterCollaborators, Collaborators, DryRunCollaborators};
    pub use crate::config::{
        default_services, ExperimentConfig, ExporterSettings, FileConfig, DEFAULT_SERVICES,
    };
    pub use crate::lock::RunLock;
    pub use crate::manifest::{ExportArtifact, RunArtifacts, RunManifest, RunStatus};
    pub use crate::pipeline::ExperimentPipeline;
    pub use crate::plan::ExperimentPreview;
    pub use crate::run_dir::{
        RunDir, DURATION_FILE, EPOCH_FILE, LOG_FILE, MANIFEST_FILE, METRICS_ALIAS,
    };
}
