use std::fmt::{Display, Formatter};
use std::path::Path;

use chaos_tunnel_core::prelude::ChaosResult;
use chaos_tunnel_runner::prelude::EscalationStepper;
use itertools::Itertools;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::config::ExperimentConfig;
use crate::run_dir::METRICS_ALIAS;

#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct StepRow {
    pub step: u32,
    pub name: String,
    pub intensity: String,
    #[tabled(rename = "starts after")]
    pub starts_after: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct ExportRow {
    pub resolution: String,
    pub start: String,
    pub end: String,
    pub output: String,
}

/// What a run would do, computed without touching the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentPreview {
    pub steps: Vec<StepRow>,
    pub exports: Vec<ExportRow>,
    pub services: Vec<String>,
}

impl ExperimentPreview {
    /// Preview `config` as if the first fault took effect at `injection_epoch`.
    pub fn build(config: &ExperimentConfig, injection_epoch: i64) -> ChaosResult<Self> {
        let descriptors = match &config.escalation {
            Some(plan) => EscalationStepper::step_descriptors(plan, &config.fault)?,
            None => vec![config.fault.build()?],
        };
        let unit = config.fault.kind().intensity_unit();

        let mut offset = 0;
        let steps = descriptors
            .iter()
            .zip(1..)
            .map(|(descriptor, step)| {
                let row = StepRow {
                    step,
                    name: descriptor.name().to_string(),
                    intensity: format!("{}{unit}", descriptor.intensity()),
                    starts_after: format!("{offset}s"),
                    duration: descriptor.duration().to_string(),
                };
                offset += descriptor.duration().as_secs();
                row
            })
            .collect();

        let exports = config
            .export
            .plan(
                injection_epoch,
                Path::new(METRICS_ALIAS),
                &config.services,
                &config.fault.resolved_namespace(),
            )?
            .into_iter()
            .map(|request| ExportRow {
                resolution: request.resolution,
                start: request.window.start_rfc3339(),
                end: request.window.end_rfc3339(),
                output: request.output.display().to_string(),
            })
            .collect();

        Ok(Self {
            steps,
            exports,
            services: config.services.clone(),
        })
    }
}

impl Display for ExperimentPreview {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut steps = Table::new(&self.steps);
        steps.with(Style::modern());
        let mut exports = Table::new(&self.exports);
        exports.with(Style::modern());

        writeln!(f, "Fault steps")?;
        writeln!(f, "{steps}")?;
        writeln!(f, "Exports")?;
        writeln!(f, "{exports}")?;
        write!(f, "Services: {}", self.services.iter().join(", "))
    }
}
