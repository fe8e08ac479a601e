use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult, Clock, PipelineLog, Seconds};
use chaos_tunnel_export::prelude::{ExportRequest, ExportWindow, MetricsExporter};
use chaos_tunnel_faults::prelude::FaultDescriptor;
use chaos_tunnel_runner::prelude::{EscalationPlan, EscalationStepper, FaultController};

use crate::collaborators::Collaborators;
use crate::config::ExperimentConfig;
use crate::lock::RunLock;
use crate::manifest::{ExportArtifact, RunArtifacts, RunManifest, RunStatus};
use crate::run_dir::RunDir;

/// Epoch used to check the export settings before the real injection epoch is known.
const PROBE_EPOCH: i64 = 0;

/// Runs one experiment end to end: inject, record, export.
///
/// Each run gets its own directory under the output root holding the pipeline log, the requested
/// duration, the injection epoch, one export per resolution, the `metrics.csv` alias and the run
/// manifest.
pub struct ExperimentPipeline<C> {
    collaborators: C,
}

/// The injection a validated config resolves to.
enum Injection<'a> {
    Single(FaultDescriptor),
    Escalation(&'a EscalationPlan),
}

impl<C: Collaborators> ExperimentPipeline<C> {
    pub fn new(collaborators: C) -> Self {
        Self { collaborators }
    }

    /// Run the experiment described by `config`.
    ///
    /// On [ChaosError::ExportMissing] the manifest is still written, with a partial status, before
    /// the error is returned. Every error is also written to the run's pipeline log, except a bad
    /// target, which is rejected before the run directory exists.
    pub fn run(&self, config: &ExperimentConfig) -> ChaosResult<RunManifest> {
        config.fault.check_target()?;
        let service = config.fault.target().to_string();
        let kind = config.fault.kind();

        let _lock = RunLock::acquire(&config.output_root, &service, kind)?;

        let clock = self.collaborators.clock();
        let run_dir = RunDir::create(&config.output_root, clock.now_epoch(), &service, kind)?;
        let log = PipelineLog::open(run_dir.log_path())?;
        let run_id = nanoid::nanoid!(10);

        log::info!(
            "Starting run {run_id} for {service}/{kind} in {}",
            run_dir.path().display()
        );
        log.record(
            "pipeline",
            format_args!("run {run_id} for {service}/{kind} started"),
        );

        let result = self.run_in(&run_id, &run_dir, &log, clock, config);
        match &result {
            Ok(manifest) => {
                log::info!("Run {run_id} complete: {}", manifest.run_dir.display());
                log.record("pipeline", "run complete");
            }
            Err(e) => {
                log::error!("Run {run_id} failed: {e}");
                log.record("error", e);
            }
        }
        result
    }

    fn run_in(
        &self,
        run_id: &str,
        run_dir: &RunDir,
        log: &PipelineLog,
        clock: Arc<dyn Clock>,
        config: &ExperimentConfig,
    ) -> ChaosResult<RunManifest> {
        let namespace = config.fault.resolved_namespace();

        let (injection, total) = validate(config, run_dir, &namespace)?;
        log.record("validate", format_args!("inputs valid, fault lasts {total}"));

        let backend = self.collaborators.backend(log)?;
        let exporter = self.collaborators.exporter(log);

        write_bare(&run_dir.duration_path(), total.as_secs())?;

        let controller = FaultController::new(backend, clock.clone()).with_log(log.clone());
        let record = match injection {
            Injection::Single(descriptor) => controller.run(&descriptor)?,
            Injection::Escalation(plan) => {
                EscalationStepper::new(&controller).run(plan, &config.fault)?
            }
        };
        record.write_epoch_file(run_dir.epoch_path())?;
        log.record(
            "inject",
            format_args!("injection epoch {}", record.started_at()),
        );

        let requests = config.export.plan(
            record.started_at(),
            &run_dir.alias_path(),
            &config.services,
            &namespace,
        )?;
        let window = config.export.window(record.started_at())?;
        log.record(
            "export",
            format_args!(
                "window [{}, {}) ({} to {})",
                window.start,
                window.end,
                window.start_rfc3339(),
                window.end_rfc3339()
            ),
        );

        if config.settle {
            settle(&*clock, log, &window)?;
        }

        let mut exports = Vec::with_capacity(requests.len());
        let mut status = RunStatus::Complete;
        let mut missing = None;
        for request in &requests {
            match export_one(&*exporter, log, request) {
                Ok(()) => exports.push(ExportArtifact {
                    resolution: request.resolution.clone(),
                    path: request.output.clone(),
                }),
                Err(reason) => {
                    status = RunStatus::Partial {
                        failed_resolution: request.resolution.clone(),
                        reason,
                    };
                    missing = Some(ChaosError::ExportMissing {
                        resolution: request.resolution.clone(),
                        path: request.output.clone(),
                    });
                    break;
                }
            }
        }

        let alias = match exports.first() {
            Some(first) => {
                let alias = run_dir.link_alias(&first.path)?;
                log.record(
                    "export",
                    format_args!("{} -> {}", alias.display(), first.path.display()),
                );
                Some(alias)
            }
            None => None,
        };

        let manifest = RunManifest {
            run_id: run_id.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            run_dir: run_dir.path().to_path_buf(),
            service: config.fault.target().to_string(),
            kind: config.fault.kind(),
            injection: record,
            window,
            artifacts: RunArtifacts {
                log: run_dir.log_path(),
                duration: run_dir.duration_path(),
                injection_epoch: run_dir.epoch_path(),
                exports,
                alias,
            },
            status,
        };
        manifest.write(&run_dir.manifest_path())?;
        log.record(
            "pipeline",
            format_args!("wrote {}", run_dir.manifest_path().display()),
        );

        match missing {
            Some(e) => Err(e),
            None => Ok(manifest),
        }
    }
}

/// Check every input before anything touches the cluster.
fn validate<'a>(
    config: &'a ExperimentConfig,
    run_dir: &RunDir,
    namespace: &str,
) -> ChaosResult<(Injection<'a>, Seconds)> {
    let injection = match &config.escalation {
        Some(plan) => {
            EscalationStepper::step_descriptors(plan, &config.fault)?;
            (Injection::Escalation(plan), plan.total_duration())
        }
        None => {
            let descriptor = config.fault.build()?;
            let duration = descriptor.duration();
            (Injection::Single(descriptor), duration)
        }
    };

    if config.services.is_empty() {
        return Err(ChaosError::InvalidWindow(
            "at least one service to export is required".to_string(),
        ));
    }
    config.export.plan(
        PROBE_EPOCH,
        &run_dir.alias_path(),
        &config.services,
        namespace,
    )?;

    Ok(injection)
}

/// Block until the end of the export window has passed.
fn settle(clock: &dyn Clock, log: &PipelineLog, window: &ExportWindow) -> ChaosResult<()> {
    let now = clock.now_epoch();
    if window.end <= now {
        return Ok(());
    }
    let wait = Seconds((window.end - now) as u64);
    log::info!("Waiting {wait} for the export window to close");
    log.record("export", format_args!("waiting {wait} for the window to close"));
    clock.sleep(Duration::from_secs(wait.as_secs()))
}

/// Run the exporter for one request. The output file existing is the only success signal.
fn export_one(
    exporter: &dyn MetricsExporter,
    log: &PipelineLog,
    request: &ExportRequest,
) -> Result<(), String> {
    let outcome = exporter.export(request);
    if let Err(e) = &outcome {
        log::warn!("Exporter failed for {}: {e}", request.resolution);
        log.record("export", format_args!("exporter failed for {}: {e}", request.resolution));
    }

    if request.output.exists() {
        log.record(
            "export",
            format_args!("{} written", request.output.display()),
        );
        return Ok(());
    }

    let reason = match outcome {
        Err(e) => e.to_string(),
        Ok(()) => "exporter reported success but wrote no file".to_string(),
    };
    log.record(
        "export",
        format_args!("{} missing: {reason}", request.output.display()),
    );
    Err(reason)
}

fn write_bare(path: &Path, value: impl std::fmt::Display) -> ChaosResult<()> {
    let mut file = File::create_new(path)?;
    write!(file, "{value}")?;
    file.sync_all()?;
    Ok(())
}
