use std::path::{Path, PathBuf};

use anyhow::Context;
use chaos_tunnel_core::prelude::parse_duration;
use chaos_tunnel_export::prelude::{ExportWindowPlanner, WindowMode, DEFAULT_RESOLUTION};
use chaos_tunnel_faults::prelude::FaultSpecBuilder;
use chaos_tunnel_runner::prelude::EscalationPlan;
use serde::Deserialize;

/// Sock Shop services whose metrics are exported when no list is configured.
pub const DEFAULT_SERVICES: &[&str] = &[
    "carts",
    "user",
    "orders",
    "payment",
    "shipping",
    "front-end",
    "catalogue",
    "queue-master",
    "rabbitmq",
    "orders-db",
    "carts-db",
    "user-db",
];

pub const DEFAULT_OUTPUT_ROOT: &str = "runs";
pub const DEFAULT_EXPORTER_PROGRAM: &str = "python3";
pub const DEFAULT_EXPORTER_SCRIPT: &str = "export_metrics.py";

/// Everything an [crate::prelude::ExperimentPipeline] run needs.
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// The fault, or the template for every escalation step.
    pub fault: FaultSpecBuilder,
    pub escalation: Option<EscalationPlan>,
    pub export: ExportWindowPlanner,
    /// Services whose metrics are exported, not the services that are faulted.
    pub services: Vec<String>,
    pub output_root: PathBuf,
    /// Wait for the export window to close before exporting.
    pub settle: bool,
}

impl ExperimentConfig {
    pub fn new(fault: FaultSpecBuilder) -> Self {
        Self {
            fault,
            escalation: None,
            export: ExportWindowPlanner::default(),
            services: default_services(),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            settle: true,
        }
    }

    pub fn with_escalation(mut self, plan: EscalationPlan) -> Self {
        self.escalation = Some(plan);
        self
    }

    pub fn with_export(mut self, export: ExportWindowPlanner) -> Self {
        self.export = export;
        self
    }

    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = output_root.into();
        self
    }

    pub fn with_settle(mut self, settle: bool) -> Self {
        self.settle = settle;
        self
    }
}

pub fn default_services() -> Vec<String> {
    DEFAULT_SERVICES.iter().map(|s| s.to_string()).collect()
}

/// How the metrics exporter program is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterSettings {
    pub program: PathBuf,
    /// Arguments placed before the generated ones.
    pub args: Vec<String>,
    /// Passed as `--prom` when set. The exporter has its own default otherwise.
    pub prometheus_url: Option<String>,
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_EXPORTER_PROGRAM),
            args: vec![DEFAULT_EXPORTER_SCRIPT.to_string()],
            prometheus_url: None,
        }
    }
}

/// The optional TOML configuration file. Command line flags take precedence over it.
///
/// ```toml
/// output_root = "runs"
///
/// [cluster]
/// kubeconfig = "/home/me/.kube/sock-shop"
/// namespace = "sock-shop"
///
/// [exporter]
/// program = "python3"
/// args = ["experiment_ec2/export_metrics.py"]
/// prometheus_url = "http://127.0.0.1:8428"
/// services = ["carts", "orders"]
///
/// [export]
/// lead = "1m"
/// window_minutes = 10
/// mode = "lead-adjusted"
/// resolutions = ["5s", "15s"]
/// settle = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub output_root: Option<PathBuf>,
    pub cluster: ClusterSection,
    pub exporter: ExporterSection,
    pub export: ExportSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterSection {
    pub kubeconfig: Option<PathBuf>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterSection {
    pub program: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub prometheus_url: Option<String>,
    pub services: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportSection {
    pub lead: Option<String>,
    pub window_minutes: Option<i64>,
    pub mode: Option<WindowMode>,
    pub resolutions: Option<Vec<String>>,
    pub settle: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: FileConfig = toml::from_str(content)?;
        if let Some(url) = &config.exporter.prometheus_url {
            validate_prometheus_url(url)?;
        }
        Ok(config)
    }

    /// Exporter settings with defaults filled in.
    pub fn exporter_settings(&self) -> ExporterSettings {
        let defaults = ExporterSettings::default();
        ExporterSettings {
            program: self.exporter.program.clone().unwrap_or(defaults.program),
            args: self.exporter.args.clone().unwrap_or(defaults.args),
            prometheus_url: self.exporter.prometheus_url.clone(),
        }
    }

    /// The export planner described by the `[export]` section.
    ///
    /// An empty resolution list falls back to the default resolution.
    pub fn export_planner(&self) -> anyhow::Result<ExportWindowPlanner> {
        let defaults = ExportWindowPlanner::default();
        let lead_seconds = match &self.export.lead {
            Some(lead) => parse_duration(lead)
                .context("Invalid [export] lead")?
                .as_secs(),
            None => defaults.lead_seconds,
        };
        let resolutions = match &self.export.resolutions {
            Some(list) if !list.is_empty() => list.clone(),
            _ => vec![DEFAULT_RESOLUTION.to_string()],
        };

        Ok(ExportWindowPlanner {
            lead_seconds,
            window_minutes: self.export.window_minutes.unwrap_or(defaults.window_minutes),
            mode: self.export.mode.unwrap_or(defaults.mode),
            resolutions,
        })
    }

    pub fn services(&self) -> Vec<String> {
        self.exporter
            .services
            .clone()
            .filter(|services| !services.is_empty())
            .unwrap_or_else(default_services)
    }
}

/// Accept only absolute http(s) URLs.
pub fn validate_prometheus_url(url: &str) -> anyhow::Result<()> {
    let parsed = url::Url::parse(url).with_context(|| format!("Invalid Prometheus URL '{url}'"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => anyhow::bail!("Prometheus URL '{url}' must use http or https, not {scheme}"),
    }
}
