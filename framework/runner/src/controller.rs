use std::sync::Arc;

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult, Clock, PipelineLog};
use chaos_tunnel_faults::prelude::{FaultDescriptor, FaultIdentity};

use crate::backend::FaultBackend;
use crate::record::InjectionRecord;

#[derive(Debug, Clone, Copy, derive_more::Display)]
enum Phase {
    #[display("cleaning")]
    Cleaning,
    #[display("applying")]
    Applying,
    #[display("recording")]
    Recording,
    #[display("waiting")]
    Waiting,
    #[display("releasing")]
    Releasing,
    #[display("done")]
    Done,
}

/// Runs a single fault: clean, apply, record the start epoch, wait, and delete.
///
/// The controller is the only thing that deletes the faults it applies. Every apply hands out a
/// [LiveFault] which deletes the resource when released or dropped, so the resource is removed on
/// every exit path.
pub struct FaultController {
    backend: Arc<dyn FaultBackend>,
    clock: Arc<dyn Clock>,
    log: PipelineLog,
}

impl FaultController {
    pub fn new(backend: Arc<dyn FaultBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            log: PipelineLog::disabled(),
        }
    }

    pub fn with_log(mut self, log: PipelineLog) -> Self {
        self.log = log;
        self
    }

    /// Inject `descriptor` for its full duration, blocking until it has been removed again.
    pub fn run(&self, descriptor: &FaultDescriptor) -> ChaosResult<InjectionRecord> {
        let identity = descriptor.identity();

        self.enter(identity, Phase::Cleaning);
        self.clean(identity);

        self.enter(identity, Phase::Applying);
        let live = self.apply(descriptor)?;

        self.enter(identity, Phase::Recording);
        let record = InjectionRecord::new(
            self.clock.now_epoch(),
            descriptor.kind(),
            descriptor.target(),
            descriptor.duration(),
        );
        self.log.record(
            "inject",
            format_args!(
                "{identity} took effect at {} for {}",
                record.started_at(),
                descriptor.duration()
            ),
        );

        self.enter(identity, Phase::Waiting);
        let waited = self.clock.sleep(descriptor.duration().as_duration());
        if let Err(e) = &waited {
            log::warn!("Wait for {identity} interrupted: {e}");
            self.log.record("inject", format_args!("wait for {identity} interrupted: {e}"));
        }

        self.enter(identity, Phase::Releasing);
        live.release();
        self.enter(identity, Phase::Done);

        waited.map(|()| record)
    }

    /// Apply `descriptor` and take ownership of the live resource.
    ///
    /// If the cluster rejects it, whatever may have been partially created is cleaned up before
    /// the [ChaosError::ApplyError] is returned.
    pub fn apply(&self, descriptor: &FaultDescriptor) -> ChaosResult<LiveFault<'_>> {
        match self.backend.apply(descriptor) {
            Ok(()) => Ok(LiveFault {
                controller: self,
                identity: Some(descriptor.identity().clone()),
            }),
            Err(e) => {
                log::error!("Failed to apply {}: {e}", descriptor.identity());
                self.log.record("inject", format_args!("apply failed: {e}"));
                self.clean(descriptor.identity());
                Err(e)
            }
        }
    }

    /// Delete `identity` if it exists. Failures are logged and swallowed, since an absent resource
    /// is all that is wanted and a later run cleans up again before applying.
    pub fn clean(&self, identity: &FaultIdentity) {
        if let Err(e) = self.backend.delete(identity) {
            log::warn!("Failed to delete {identity}: {e}");
            self.log
                .record("inject", format_args!("cleanup of {identity} failed: {e}"));
        }
    }

    fn enter(&self, identity: &FaultIdentity, phase: Phase) {
        log::debug!("{identity}: {phase}");
    }
}

/// A fault resource that is live on the cluster.
///
/// Releasing it deletes the resource. Dropping it without releasing deletes it too.
#[must_use = "dropping a LiveFault deletes the fault immediately"]
pub struct LiveFault<'c> {
    controller: &'c FaultController,
    identity: Option<FaultIdentity>,
}

impl LiveFault<'_> {
    pub fn identity(&self) -> Option<&FaultIdentity> {
        self.identity.as_ref()
    }

    pub fn release(mut self) {
        if let Some(identity) = self.identity.take() {
            self.controller.clean(&identity);
        }
    }
}

impl Drop for LiveFault<'_> {
    fn drop(&mut self) {
        if let Some(identity) = self.identity.take() {
            log::warn!("Releasing {identity} on an unexpected exit path");
            self.controller.clean(&identity);
        }
    }
}

impl std::fmt::Debug for FaultController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultController")
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
