use std::path::PathBuf;
use std::sync::Arc;

use chaos_tunnel_core::prelude::{ChaosResult, Clock, ManualClock, PipelineLog};
use chaos_tunnel_export::prelude::{CommandExporter, DryRunExporter, MetricsExporter};
use chaos_tunnel_runner::prelude::{FaultBackend, InMemoryBackend, KubectlBackend};

use crate::config::ExporterSettings;

/// Supplies the outside world to a pipeline run.
///
/// The backend and exporter are created per run so that they write to that run's log.
pub trait Collaborators {
    fn backend(&self, log: &PipelineLog) -> ChaosResult<Arc<dyn FaultBackend>>;

    fn exporter(&self, log: &PipelineLog) -> Arc<dyn MetricsExporter>;

    fn clock(&self) -> Arc<dyn Clock>;
}

/// A real cluster through `kubectl` and a real exporter program.
pub struct ClusterCollaborators {
    kubeconfig: Option<PathBuf>,
    exporter: ExporterSettings,
    clock: Arc<dyn Clock>,
}

impl ClusterCollaborators {
    pub fn new(exporter: ExporterSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            kubeconfig: None,
            exporter,
            clock,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: Option<PathBuf>) -> Self {
        self.kubeconfig = kubeconfig;
        self
    }
}

impl Collaborators for ClusterCollaborators {
    fn backend(&self, log: &PipelineLog) -> ChaosResult<Arc<dyn FaultBackend>> {
        let backend = KubectlBackend::locate()?
            .with_kubeconfig(self.kubeconfig.clone())
            .with_log(log.clone());
        Ok(Arc::new(backend))
    }

    fn exporter(&self, log: &PipelineLog) -> Arc<dyn MetricsExporter> {
        Arc::new(
            CommandExporter::new(&self.exporter.program)
                .with_args(self.exporter.args.clone())
                .with_prometheus_url(self.exporter.prometheus_url.clone())
                .with_log(log.clone()),
        )
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

/// Nothing leaves the process: faults are kept in memory, waits return at once and the exports
/// are empty time series.
pub struct DryRunCollaborators {
    clock: Arc<ManualClock>,
}

impl DryRunCollaborators {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::from_now()),
        }
    }

    pub fn with_clock(clock: Arc<ManualClock>) -> Self {
        Self { clock }
    }
}

impl Default for DryRunCollaborators {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborators for DryRunCollaborators {
    fn backend(&self, log: &PipelineLog) -> ChaosResult<Arc<dyn FaultBackend>> {
        Ok(Arc::new(InMemoryBackend::new().with_log(log.clone())))
    }

    fn exporter(&self, log: &PipelineLog) -> Arc<dyn MetricsExporter> {
        Arc::new(DryRunExporter::new().with_log(log.clone()))
    }

    fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}
