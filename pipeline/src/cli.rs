use std::path::PathBuf;

use chaos_tunnel_core::prelude::{
    parse_duration, ChaosError, ChaosResult, Latency, MemorySize, Seconds,
};
use chaos_tunnel_export::prelude::WindowMode;
use chaos_tunnel_faults::prelude::{FaultKind, FaultSpecBuilder};
use chaos_tunnel_runner::prelude::{EscalationPlan, EscalationStepper};
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::config::{
    validate_prometheus_url, ExperimentConfig, ExporterSettings, FileConfig, DEFAULT_OUTPUT_ROOT,
};

#[derive(Debug, Parser)]
#[command(name = "chaos-tunnel", version, about, long_about = None)]
pub struct ChaosTunnelCli {
    /// Path to a TOML configuration file. Command line flags take precedence over it.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// The kubeconfig passed to kubectl
    #[clap(long, global = true, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace of the target service, `sock-shop` by default
    #[clap(long, global = true)]
    pub namespace: Option<String>,

    /// Do not touch the cluster or run the exporter.
    ///
    /// Faults are kept in memory, waits return immediately and exports are empty time series. The
    /// rendered manifests are written to the pipeline log.
    #[clap(long, global = true, default_value = "false")]
    pub dry_run: bool,

    /// Do not show a progress bar while waiting.
    ///
    /// This is recommended for CI/CD environments where nobody is watching the terminal.
    #[clap(long, global = true, default_value = "false")]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl ChaosTunnelCli {
    /// The namespace from the command line, then the config file.
    pub fn namespace<'a>(&'a self, file: &'a FileConfig) -> Option<&'a str> {
        self.namespace
            .as_deref()
            .or(file.cluster.namespace.as_deref())
    }

    pub fn kubeconfig(&self, file: &FileConfig) -> Option<PathBuf> {
        self.kubeconfig
            .clone()
            .or_else(|| file.cluster.kubeconfig.clone())
    }
    /// A usage error for `error` if it was caused by bad input, `None` otherwise.
    pub fn usage_error(error: &ChaosError) -> Option<clap::Error> {
        error
            .is_input_error()
            .then(|| Self::command().error(ErrorKind::ValueValidation, error))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stress the CPU of a service and write the injection epoch to a file
    Cpu {
        #[command(flatten)]
        fault: CpuFault,

        /// File to write the injection epoch to. Must not exist yet.
        #[clap(long)]
        out: PathBuf,
    },
    /// Stress the memory of a service and write the injection epoch to a file
    Memory {
        #[command(flatten)]
        fault: MemoryFault,

        /// File to write the injection epoch to. Must not exist yet.
        #[clap(long)]
        out: PathBuf,
    },
    /// Delay the network traffic of a service and write the injection epoch to a file
    Network {
        #[command(flatten)]
        fault: NetworkFault,

        /// File to write the injection epoch to. Must not exist yet.
        #[clap(long)]
        out: PathBuf,
    },
    /// Inject a fault, then export the metrics around it into a new run directory
    Run {
        #[command(flatten)]
        export: ExportArgs,

        #[command(subcommand)]
        fault: FaultCommand,
    },
    /// Show the steps and export window a run would use, without touching the cluster
    Plan {
        #[command(flatten)]
        export: ExportArgs,

        #[command(subcommand)]
        fault: FaultCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum FaultCommand {
    /// CPU stress
    Cpu(CpuFault),
    /// Memory stress
    Memory(MemoryFault),
    /// Network delay
    Network(NetworkFault),
}

/// A fault as given on the command line, ready to be validated.
#[derive(Debug, Clone)]
pub struct FaultSetup {
    pub fault: FaultSpecBuilder,
    pub escalation: Option<EscalationPlan>,
}

impl FaultSetup {
    /// Build every descriptor the setup would apply, without applying anything.
    pub fn validate(&self) -> ChaosResult<()> {
        match &self.escalation {
            Some(plan) => {
                EscalationStepper::step_descriptors(plan, &self.fault)?;
            }
            None => {
                self.fault.build()?;
            }
        }
        Ok(())
    }
}

/// Turns parsed fault arguments into a [FaultSetup].
pub trait FaultArgs {
    fn setup(&self, namespace: Option<&str>) -> ChaosResult<FaultSetup>;
}

#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// The Sock Shop service to inject the fault into, for example `carts`
    #[clap(long)]
    pub service: String,

    /// How long the fault lasts, as `<N>`, `<N>s`, `<N>m` or `<N>h`. With `--steps`, the length
    /// of each step.
    #[clap(long, value_parser = parse_duration)]
    pub duration: Seconds,

    /// Name of the fault resource, `<service>-<kind>-stress` by default
    #[clap(long)]
    pub name: Option<String>,

    /// Pod label used to select the service, `name` by default
    #[clap(long)]
    pub selector_key: Option<String>,

    /// Value of the selector label, the service by default
    #[clap(long)]
    pub selector_value: Option<String>,

    /// Namespaces to select pods in. Can be given more than once. The fault namespace by default.
    #[clap(long)]
    pub selector_namespace: Vec<String>,

    /// How pods are picked: all, one, fixed, fixed-percent or random-max-percent
    #[clap(long)]
    pub mode: Option<String>,

    /// Pod count or percentage for the fixed and percent modes
    #[clap(long)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct EscalationArgs {
    /// Escalate the fault over this many steps, each lasting `--duration`
    #[clap(long)]
    pub steps: Option<u32>,

    /// Intensity of the last step. Requires `--steps`.
    #[clap(long)]
    pub ceiling: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct CpuFault {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of stress workers
    #[clap(long)]
    pub workers: Option<u32>,

    /// CPU load per worker in percent. The escalation starts here.
    #[clap(long)]
    pub load: Option<u32>,

    #[command(flatten)]
    pub escalation: EscalationArgs,
}

#[derive(Debug, Clone, Args)]
pub struct MemoryFault {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Number of stress workers
    #[clap(long)]
    pub workers: Option<u32>,

    /// Memory to allocate, as `<N>MB` or `<N>GB`. The escalation starts here.
    #[clap(long)]
    pub size: Option<String>,

    #[command(flatten)]
    pub escalation: EscalationArgs,
}

#[derive(Debug, Clone, Args)]
pub struct NetworkFault {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Added latency, as `<N>ms` or `<N>s`. The escalation starts here.
    #[clap(long)]
    pub latency: Option<String>,

    /// Latency jitter, as `<N>ms` or `<N>s`
    #[clap(long)]
    pub jitter: Option<String>,

    /// Correlation between consecutive delays in percent
    #[clap(long)]
    pub correlation: Option<u32>,

    /// Traffic direction: to, from or both
    #[clap(long)]
    pub direction: Option<String>,

    #[command(flatten)]
    pub escalation: EscalationArgs,
}

impl TargetArgs {
    fn builder(&self, kind: FaultKind, namespace: Option<&str>) -> FaultSpecBuilder {
        let mut builder = FaultSpecBuilder::new(kind, &self.service).duration(self.duration);
        if let Some(namespace) = namespace {
            builder = builder.namespace(namespace);
        }
        if let Some(name) = &self.name {
            builder = builder.name(name);
        }
        if let Some(key) = &self.selector_key {
            builder = builder.selector_key(key);
        }
        if let Some(value) = &self.selector_value {
            builder = builder.selector_value(value);
        }
        for namespace in &self.selector_namespace {
            builder = builder.selector_namespace(namespace);
        }
        if let Some(mode) = &self.mode {
            builder = builder.mode(mode);
        }
        if let Some(value) = &self.value {
            builder = builder.value(value);
        }
        builder
    }
}

impl EscalationArgs {
    /// The plan for `fault`, starting from its configured intensity.
    ///
    /// `parse_ceiling` reads the ceiling in the unit of the fault kind.
    fn plan(
        &self,
        fault: &FaultSpecBuilder,
        step_duration: Seconds,
        parse_ceiling: impl Fn(&str) -> ChaosResult<u64>,
    ) -> ChaosResult<Option<EscalationPlan>> {
        let Some(steps) = self.steps else {
            return match &self.ceiling {
                Some(_) => Err(ChaosError::InvalidFaultSpec(
                    "--ceiling only applies to an escalation, add --steps".to_string(),
                )),
                None => Ok(None),
            };
        };

        let start = fault.intensity()?;
        let ceiling = match &self.ceiling {
            Some(ceiling) => parse_ceiling(ceiling)?,
            None => start,
        };
        EscalationPlan::new(start, ceiling, steps, step_duration).map(Some)
    }
}

impl FaultArgs for CpuFault {
    fn setup(&self, namespace: Option<&str>) -> ChaosResult<FaultSetup> {
        let mut fault = self.target.builder(FaultKind::Cpu, namespace);
        if let Some(workers) = self.workers {
            fault = fault.workers(workers);
        }
        if let Some(load) = self.load {
            fault = fault.load(load);
        }
        let escalation = self
            .escalation
            .plan(&fault, self.target.duration, parse_percent)?;
        Ok(FaultSetup { fault, escalation })
    }
}

impl FaultArgs for MemoryFault {
    fn setup(&self, namespace: Option<&str>) -> ChaosResult<FaultSetup> {
        let mut fault = self.target.builder(FaultKind::Memory, namespace);
        if let Some(workers) = self.workers {
            fault = fault.workers(workers);
        }
        if let Some(size) = &self.size {
            fault = fault.memory_size(size);
        }
        let escalation = self.escalation.plan(&fault, self.target.duration, |s| {
            Ok(s.parse::<MemorySize>()?.megabytes())
        })?;
        Ok(FaultSetup { fault, escalation })
    }
}

impl FaultArgs for NetworkFault {
    fn setup(&self, namespace: Option<&str>) -> ChaosResult<FaultSetup> {
        let mut fault = self.target.builder(FaultKind::NetworkDelay, namespace);
        if let Some(latency) = &self.latency {
            fault = fault.latency(latency);
        }
        if let Some(jitter) = &self.jitter {
            fault = fault.jitter(jitter);
        }
        if let Some(correlation) = self.correlation {
            fault = fault.correlation(correlation);
        }
        if let Some(direction) = &self.direction {
            fault = fault.direction(direction);
        }
        let escalation = self.escalation.plan(&fault, self.target.duration, |s| {
            Ok(s.parse::<Latency>()?.millis())
        })?;
        Ok(FaultSetup { fault, escalation })
    }
}

impl FaultArgs for FaultCommand {
    fn setup(&self, namespace: Option<&str>) -> ChaosResult<FaultSetup> {
        match self {
            FaultCommand::Cpu(args) => args.setup(namespace),
            FaultCommand::Memory(args) => args.setup(namespace),
            FaultCommand::Network(args) => args.setup(namespace),
        }
    }
}

fn parse_percent(s: &str) -> ChaosResult<u64> {
    s.trim()
        .trim_end_matches('%')
        .parse::<u64>()
        .map_err(|e| ChaosError::InvalidQuantity {
            input: s.to_string(),
            reason: e.to_string(),
        })
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Baseline to include before the injection, as `<N>`, `<N>s`, `<N>m` or `<N>h`
    #[clap(long, value_parser = parse_duration)]
    pub lead: Option<Seconds>,

    /// Half the length of the export window, in minutes
    #[clap(long)]
    pub window_minutes: Option<i64>,

    /// How the window is placed around the injection: lead-adjusted or centered
    #[clap(long)]
    pub window_mode: Option<WindowMode>,

    /// Sampling step for the export. Can be given more than once to export several resolutions
    /// of the same window.
    #[clap(long = "step")]
    pub resolutions: Vec<String>,

    /// Comma separated services to export metrics for
    #[clap(long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Export as soon as the fault is removed instead of waiting for the window to close
    #[clap(long, default_value = "false")]
    pub no_settle: bool,

    /// Prometheus compatible query endpoint passed to the exporter
    #[clap(long)]
    pub prom: Option<String>,

    /// Exporter program to run instead of the configured one. It is called with no leading
    /// arguments.
    #[clap(long)]
    pub exporter: Option<PathBuf>,

    /// Directory the run directories are created in
    #[clap(long)]
    pub output_root: Option<PathBuf>,
}

impl ExportArgs {
    /// Combine these flags with the config file into an [ExperimentConfig].
    pub fn experiment_config(
        &self,
        file: &FileConfig,
        setup: FaultSetup,
    ) -> anyhow::Result<ExperimentConfig> {
        let mut export = file.export_planner()?;
        if let Some(lead) = self.lead {
            export.lead_seconds = lead.as_secs();
        }
        if let Some(window_minutes) = self.window_minutes {
            export.window_minutes = window_minutes;
        }
        if let Some(mode) = self.window_mode {
            export.mode = mode;
        }
        if !self.resolutions.is_empty() {
            export.resolutions = self.resolutions.clone();
        }

        let services = if self.services.is_empty() {
            file.services()
        } else {
            self.services.clone()
        };
        let output_root = self
            .output_root
            .clone()
            .or_else(|| file.output_root.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT));
        let settle = !self.no_settle && file.export.settle.unwrap_or(true);

        let mut config = ExperimentConfig::new(setup.fault)
            .with_export(export)
            .with_services(services)
            .with_output_root(output_root)
            .with_settle(settle);
        if let Some(plan) = setup.escalation {
            config = config.with_escalation(plan);
        }
        Ok(config)
    }

    pub fn exporter_settings(&self, file: &FileConfig) -> anyhow::Result<ExporterSettings> {
        let mut settings = file.exporter_settings();
        if let Some(program) = &self.exporter {
            settings.program = program.clone();
            settings.args = Vec::new();
        }
        if let Some(url) = &self.prom {
            validate_prometheus_url(url)?;
            settings.prometheus_url = Some(url.clone());
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> ChaosTunnelCli {
        ChaosTunnelCli::try_parse_from(std::iter::once("chaos-tunnel").chain(args.iter().copied()))
            .unwrap()
    }

    fn run_parts(cli: ChaosTunnelCli) -> (ExportArgs, FaultCommand) {
        match cli.command {
            Command::Run { export, fault } => (export, fault),
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_cpu_inject_command() {
        let cli = parse(&[
            "cpu", "--service", "carts", "--duration", "2m", "--load", "80", "--out",
            "epoch.txt", "--namespace", "shop",
        ]);
        let file = FileConfig::default();

        let Command::Cpu { fault, out } = &cli.command else {
            panic!("expected cpu, got {:?}", cli.command);
        };
        assert_eq!(out, &PathBuf::from("epoch.txt"));

        let setup = fault.setup(cli.namespace(&file)).unwrap();
        assert!(setup.escalation.is_none());
        let descriptor = setup.fault.build().unwrap();
        assert_eq!(descriptor.duration(), Seconds(120));
        assert_eq!(descriptor.intensity(), 80);
        assert_eq!(descriptor.namespace(), "shop");
    }

    #[test]
    fn test_memory_escalation() {
        let cli = parse(&[
            "run", "--step", "5s", "--step", "15s", "--services", "carts,orders", "memory",
            "--service", "carts", "--duration", "60", "--size", "20MB", "--steps", "5",
            "--ceiling", "150MB",
        ]);
        let (export, fault) = run_parts(cli);

        let setup = fault.setup(None).unwrap();
        let plan = setup.escalation.clone().unwrap();
        assert_eq!(plan.intensities(), vec![20, 52, 85, 117, 150]);
        assert_eq!(plan.total_duration(), Seconds(300));

        let config = export
            .experiment_config(&FileConfig::default(), setup)
            .unwrap();
        assert_eq!(config.export.resolutions, vec!["5s", "15s"]);
        assert_eq!(config.services, vec!["carts", "orders"]);
        assert_eq!(config.output_root, PathBuf::from(DEFAULT_OUTPUT_ROOT));
        assert!(config.settle);
    }

    #[test]
    fn test_network_ceiling_in_seconds() {
        let cli = parse(&[
            "plan", "network", "--service", "user", "--duration", "30s", "--latency", "100ms",
            "--steps", "3", "--ceiling", "1s",
        ]);
        let Command::Plan { fault, .. } = cli.command else {
            panic!("expected plan");
        };

        let plan = fault.setup(None).unwrap().escalation.unwrap();
        assert_eq!(plan.intensities(), vec![100, 550, 1000]);
    }

    #[test]
    fn test_ceiling_without_steps_is_rejected() {
        let cli = parse(&[
            "cpu", "--service", "carts", "--duration", "60", "--ceiling", "90", "--out", "e.txt",
        ]);
        let Command::Cpu { fault, .. } = cli.command else {
            panic!("expected cpu");
        };

        assert!(matches!(
            fault.setup(None),
            Err(ChaosError::InvalidFaultSpec(_))
        ));
    }

    #[test]
    fn test_invalid_arguments_fail_to_parse() {
        let base = ["cpu", "--service", "carts", "--out", "e.txt"];
        for duration in ["", "1.5s", "-5", "10d"] {
            let mut args = base.to_vec();
            args.extend(["--duration", duration]);
            assert!(
                ChaosTunnelCli::try_parse_from(std::iter::once("chaos-tunnel").chain(args))
                    .is_err(),
                "expected duration '{duration}' to be rejected"
            );
        }

        assert!(ChaosTunnelCli::try_parse_from(["chaos-tunnel", "cpu", "--duration", "5"]).is_err());
        assert!(ChaosTunnelCli::try_parse_from([
            "chaos-tunnel", "run", "--window-mode", "sideways", "cpu", "--service", "carts",
            "--duration", "5",
        ])
        .is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let file = FileConfig::parse(
            r#"
output_root = "/data/runs"

[exporter]
program = "python3"
args = ["tools/export_metrics.py"]
services = ["carts"]

[export]
lead = "1m"
window_minutes = 5
resolutions = ["1s"]
settle = false
"#,
        )
        .unwrap();
        let cli = parse(&[
            "run", "--lead", "30s", "--output-root", "/tmp/runs", "--exporter",
            "./export.sh", "--prom", "http://127.0.0.1:8428", "cpu", "--service", "carts",
            "--duration", "10",
        ]);
        let (export, fault) = run_parts(cli);

        let config = export
            .experiment_config(&file, fault.setup(None).unwrap())
            .unwrap();
        assert_eq!(config.export.lead_seconds, 30);
        assert_eq!(config.export.window_minutes, 5);
        assert_eq!(config.export.resolutions, vec!["1s"]);
        assert_eq!(config.services, vec!["carts"]);
        assert_eq!(config.output_root, PathBuf::from("/tmp/runs"));
        assert!(!config.settle);

        assert_eq!(
            export.exporter_settings(&file).unwrap(),
            ExporterSettings {
                program: PathBuf::from("./export.sh"),
                args: Vec::new(),
                prometheus_url: Some("http://127.0.0.1:8428".to_string()),
            }
        );
    }

    #[test]
    fn test_input_errors_render_usage() {
        let cli = parse(&[
            "cpu", "--service", "carts", "--duration", "60", "--load", "150", "--out", "e.txt",
        ]);
        let Command::Cpu { fault, .. } = cli.command else {
            panic!("expected cpu");
        };
        let error = fault.setup(None).unwrap().validate().unwrap_err();

        let usage = ChaosTunnelCli::usage_error(&error).unwrap();
        assert_eq!(usage.kind(), ErrorKind::ValueValidation);
        assert_eq!(usage.exit_code(), 2);
        let rendered = usage.render().to_string();
        assert!(rendered.contains("invalid fault spec"), "{rendered}");
        assert!(rendered.contains("Usage:"), "{rendered}");

        let cluster_error = ChaosError::ApplyError {
            name: "carts-cpu-stress".to_string(),
            reason: "no CRD".to_string(),
        };
        assert!(ChaosTunnelCli::usage_error(&cluster_error).is_none());
    }

    #[test]
    fn test_setup_validation_reports_bad_step() {
        let cli = parse(&[
            "plan", "cpu", "--service", "carts", "--duration", "10", "--load", "50", "--steps",
            "3", "--ceiling", "150",
        ]);
        let Command::Plan { fault, .. } = cli.command else {
            panic!("expected plan");
        };

        let setup = fault.setup(None).unwrap();
        assert!(matches!(
            setup.validate(),
            Err(ChaosError::InvalidFaultSpec(_))
        ));
    }
}
