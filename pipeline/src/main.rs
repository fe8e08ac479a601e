use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chaos_pipeline::prelude::*;
use chaos_tunnel_core::prelude::{ChaosError, Clock, ManualClock, ShutdownHandle, SystemClock};
use chaos_tunnel_runner::prelude::{
    EscalationStepper, FaultBackend, FaultController, InMemoryBackend, KubectlBackend,
};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = ChaosTunnelCli::parse();
    match run_command(&cli) {
        Err(e) => {
            if let Some(usage) = e
                .downcast_ref::<ChaosError>()
                .and_then(ChaosTunnelCli::usage_error)
            {
                usage.exit();
            }
            Err(e)
        }
        ok => ok,
    }
}

fn run_command(cli: &ChaosTunnelCli) -> anyhow::Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    match &cli.command {
        Command::Cpu { fault, out } => inject(cli, &file, fault, out),
        Command::Memory { fault, out } => inject(cli, &file, fault, out),
        Command::Network { fault, out } => inject(cli, &file, fault, out),
        Command::Run { export, fault } => {
            let setup = fault.setup(cli.namespace(&file))?;
            setup.validate()?;
            let config = export.experiment_config(&file, setup)?;
            if cli.dry_run {
                run_pipeline(DryRunCollaborators::new(), &config)
            } else {
                let collaborators =
                    ClusterCollaborators::new(export.exporter_settings(&file)?, system_clock(cli)?)
                        .with_kubeconfig(cli.kubeconfig(&file));
                run_pipeline(collaborators, &config)
            }
        }
        Command::Plan { export, fault } => {
            let setup = fault.setup(cli.namespace(&file))?;
            setup.validate()?;
            let config = export.experiment_config(&file, setup)?;
            let preview = ExperimentPreview::build(&config, chrono::Utc::now().timestamp())?;
            println!("{preview}");
            Ok(())
        }
    }
}

/// Inject one fault, or one escalation, and write its epoch to `out`.
fn inject(
    cli: &ChaosTunnelCli,
    file: &FileConfig,
    fault: &dyn FaultArgs,
    out: &Path,
) -> anyhow::Result<()> {
    if out.exists() {
        anyhow::bail!("Refusing to overwrite existing epoch file {}", out.display());
    }

    let setup = fault.setup(cli.namespace(file))?;
    setup.validate()?;

    let (backend, clock): (Arc<dyn FaultBackend>, Arc<dyn Clock>) = if cli.dry_run {
        log::info!("Dry run, faults are kept in memory");
        (
            Arc::new(InMemoryBackend::new()),
            Arc::new(ManualClock::from_now()),
        )
    } else {
        let backend = KubectlBackend::locate()?.with_kubeconfig(cli.kubeconfig(file));
        (Arc::new(backend), system_clock(cli)?)
    };

    let controller = FaultController::new(backend, clock);
    let record = match &setup.escalation {
        Some(plan) => EscalationStepper::new(&controller).run(plan, &setup.fault)?,
        None => controller.run(&setup.fault.build()?)?,
    };

    record
        .write_epoch_file(out)
        .with_context(|| format!("Failed to write epoch file {}", out.display()))?;
    println!("{}", record.started_at());
    Ok(())
}

fn run_pipeline<C: Collaborators>(collaborators: C, config: &ExperimentConfig) -> anyhow::Result<()> {
    let manifest = ExperimentPipeline::new(collaborators).run(config)?;
    println!("{}", manifest.run_dir.display());
    Ok(())
}

fn system_clock(cli: &ChaosTunnelCli) -> anyhow::Result<Arc<dyn Clock>> {
    let clock = SystemClock::new(ShutdownHandle::new())
        .context("Failed to start the clock runtime")?
        .with_progress(!cli.no_progress);
    clock.listen_for_ctrl_c();
    Ok(Arc::new(clock))
}
