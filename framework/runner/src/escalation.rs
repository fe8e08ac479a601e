use chaos_tunnel_core::prelude::{ChaosError, ChaosResult, Seconds};
use chaos_tunnel_faults::prelude::{FaultDescriptor, FaultSpecBuilder};

use crate::controller::FaultController;
use crate::record::InjectionRecord;

/// A progressive fault: `steps` faults of growing intensity, each held for `step_duration`.
///
/// Intensity is in the unit of the fault kind (cpu load percent, memory megabytes, latency
/// milliseconds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPlan {
    start: u64,
    ceiling: u64,
    steps: u32,
    step_duration: Seconds,
}

impl EscalationPlan {
    /// A ceiling below `start` is raised to `start`, giving a constant stress.
    pub fn new(start: u64, ceiling: u64, steps: u32, step_duration: Seconds) -> ChaosResult<Self> {
        if steps < 1 {
            return Err(ChaosError::InvalidFaultSpec(
                "an escalation needs at least one step".to_string(),
            ));
        }
        if step_duration.is_zero() {
            return Err(ChaosError::InvalidFaultSpec(
                "escalation step duration must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            start,
            ceiling: ceiling.max(start),
            steps,
            step_duration,
        })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn step_duration(&self) -> Seconds {
        self.step_duration
    }

    /// The whole-unit increment between steps, rounded down. Zero for a single step.
    pub fn increment(&self) -> u64 {
        if self.steps > 1 {
            (self.ceiling - self.start) / u64::from(self.steps - 1)
        } else {
            0
        }
    }

    /// Intensity of the 1-based `step`.
    ///
    /// Rounding is applied to each step on its own rather than accumulating the rounded increment,
    /// so the last step always lands on the ceiling.
    pub fn intensity_at(&self, step: u32) -> u64 {
        if self.steps <= 1 || step <= 1 {
            return self.start;
        }
        let span = u128::from(self.ceiling - self.start);
        let offset = span * u128::from(step - 1) / u128::from(self.steps - 1);
        let intensity = u128::from(self.start) + offset;
        u64::try_from(intensity)
            .unwrap_or(u64::MAX)
            .min(self.ceiling)
    }

    pub fn intensities(&self) -> Vec<u64> {
        (1..=self.steps).map(|step| self.intensity_at(step)).collect()
    }

    pub fn total_duration(&self) -> Seconds {
        Seconds(self.step_duration.as_secs() * u64::from(self.steps))
    }
}

/// Drives a [FaultController] once per step of an [EscalationPlan].
pub struct EscalationStepper<'c> {
    controller: &'c FaultController,
}

impl<'c> EscalationStepper<'c> {
    pub fn new(controller: &'c FaultController) -> Self {
        Self { controller }
    }

    /// Build the descriptor for every step, named `<prefix>-s<i>`.
    ///
    /// The prefix is the name `template` would build with. All steps are validated here, so a bad
    /// step is reported before anything is applied.
    pub fn step_descriptors(
        plan: &EscalationPlan,
        template: &FaultSpecBuilder,
    ) -> ChaosResult<Vec<FaultDescriptor>> {
        let prefix = template.resolved_name();
        (1..=plan.steps())
            .map(|step| {
                template
                    .clone()
                    .name(format!("{prefix}-s{step}"))
                    .duration(plan.step_duration())
                    .with_intensity(plan.intensity_at(step))
                    .build()
            })
            .collect()
    }

    /// Run every step in order. A step starts only after the previous one has been deleted.
    ///
    /// The returned record starts at step 1 and spans the whole escalation.
    pub fn run(
        &self,
        plan: &EscalationPlan,
        template: &FaultSpecBuilder,
    ) -> ChaosResult<InjectionRecord> {
        let descriptors = Self::step_descriptors(plan, template)?;
        let unit = template.kind().intensity_unit();

        let mut first_epoch = None;
        for (index, descriptor) in descriptors.iter().enumerate() {
            log::info!(
                "Escalation step {}/{}: {} at {}{unit} for {}",
                index + 1,
                descriptors.len(),
                descriptor.name(),
                descriptor.intensity(),
                descriptor.duration()
            );
            let record = self.controller.run(descriptor)?;
            first_epoch.get_or_insert(record.started_at());
        }

        let started_at = first_epoch.ok_or_else(|| {
            ChaosError::InvalidFaultSpec("escalation produced no steps".to_string())
        })?;
        Ok(InjectionRecord::new(
            started_at,
            template.kind(),
            template.target(),
            plan.total_duration(),
        ))
    }
}
