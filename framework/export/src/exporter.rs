use std::path::PathBuf;
use std::process::Command;

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult, PipelineLog};
use itertools::Itertools;

use crate::window::ExportRequest;

/// The external collaborator that turns an [ExportRequest] into a time series file.
///
/// On success the request's output file exists. On failure it must not exist. Callers treat the
/// presence of the file as the only success signal.
pub trait MetricsExporter: Send + Sync {
    fn export(&self, request: &ExportRequest) -> ChaosResult<()>;
}

/// Runs an exporter program once per request.
///
/// The program is called as
/// `<program> <args..> [--prom <url>] --start <rfc3339> --end <rfc3339> --step <resolution>
/// --namespace <ns> --services <a,b,..> --out <path>`.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    program: PathBuf,
    args: Vec<String>,
    prometheus_url: Option<String>,
    log: PipelineLog,
}

impl CommandExporter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            prometheus_url: None,
            log: PipelineLog::disabled(),
        }
    }

    /// Arguments placed before the generated ones, such as the script for an interpreter.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_prometheus_url(mut self, url: Option<String>) -> Self {
        self.prometheus_url = url;
        self
    }

    pub fn with_log(mut self, log: PipelineLog) -> Self {
        self.log = log;
        self
    }

    fn command(&self, request: &ExportRequest) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(url) = &self.prometheus_url {
            command.arg("--prom").arg(url);
        }
        command
            .arg("--start")
            .arg(request.window.start_rfc3339())
            .arg("--end")
            .arg(request.window.end_rfc3339())
            .arg("--step")
            .arg(&request.resolution)
            .arg("--namespace")
            .arg(&request.namespace)
            .arg("--services")
            .arg(request.services.iter().join(","))
            .arg("--out")
            .arg(&request.output);
        command
    }
}

impl MetricsExporter for CommandExporter {
    fn export(&self, request: &ExportRequest) -> ChaosResult<()> {
        let description = format!(
            "{} [{}, {}) step {} -> {}",
            self.program.display(),
            request.window.start,
            request.window.end,
            request.resolution,
            request.output.display()
        );
        log::info!("Exporting metrics: {description}");

        let output = self.command(request).output().map_err(|e| {
            self.log
                .record("export", format_args!("failed to run {description}: {e}"));
            ChaosError::Backend(format!("failed to run {}: {e}", self.program.display()))
        })?;
        self.log.record_output("export", &description, &output);

        if output.status.success() {
            Ok(())
        } else {
            Err(ChaosError::Backend(format!(
                "exporter exited with {} for resolution '{}'",
                output.status, request.resolution
            )))
        }
    }
}
