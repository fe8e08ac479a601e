use std::collections::HashSet;

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult, PipelineLog};
use chaos_tunnel_faults::prelude::{FaultDescriptor, FaultIdentity};
use parking_lot::Mutex;

use crate::backend::FaultBackend;

/// Something that happened to the in-memory fault store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Applied {
        identity: FaultIdentity,
        intensity: u64,
        /// True if a resource with the same identity was still live.
        over_live: bool,
    },
    Deleted {
        identity: FaultIdentity,
        existed: bool,
    },
}

/// A fault store that lives in memory.
///
/// Backs `--dry-run`, where the rendered manifests are only written to the pipeline log, and lets
/// tests observe exactly which resources were live at any point.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
    log: PipelineLog,
}

#[derive(Debug, Default)]
struct State {
    live: Vec<FaultDescriptor>,
    events: Vec<BackendEvent>,
    max_live: usize,
    rejected_names: HashSet<String>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: PipelineLog) -> Self {
        self.log = log;
        self
    }

    /// Reject any apply of a descriptor with this name, as a cluster without the CRD would.
    pub fn reject_apply_of(self, name: impl Into<String>) -> Self {
        self.state.lock().rejected_names.insert(name.into());
        self
    }

    /// Identities of the resources that are currently live.
    pub fn live(&self) -> Vec<FaultIdentity> {
        self.state
            .lock()
            .live
            .iter()
            .map(|descriptor| descriptor.identity().clone())
            .collect()
    }

    pub fn events(&self) -> Vec<BackendEvent> {
        self.state.lock().events.clone()
    }

    /// The largest number of resources that were ever live at the same time.
    pub fn max_live(&self) -> usize {
        self.state.lock().max_live
    }

    /// Intensities of every successful apply, in order.
    pub fn applied_intensities(&self) -> Vec<u64> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|event| match event {
                BackendEvent::Applied { intensity, .. } => Some(*intensity),
                BackendEvent::Deleted { .. } => None,
            })
            .collect()
    }
}

impl FaultBackend for InMemoryBackend {
    fn apply(&self, descriptor: &FaultDescriptor) -> ChaosResult<()> {
        let manifest = descriptor.to_manifest()?;
        let mut state = self.state.lock();
        if state.rejected_names.contains(descriptor.name()) {
            return Err(ChaosError::ApplyError {
                name: descriptor.name().to_string(),
                reason: "rejected by the in-memory backend".to_string(),
            });
        }

        let identity = descriptor.identity().clone();
        let over_live = state
            .live
            .iter()
            .any(|live| live.identity() == &identity);
        state.live.retain(|live| live.identity() != &identity);
        state.live.push(descriptor.clone());
        state.max_live = state.max_live.max(state.live.len());
        state.events.push(BackendEvent::Applied {
            identity: identity.clone(),
            intensity: descriptor.intensity(),
            over_live,
        });
        drop(state);

        self.log
            .record("dry-run", format_args!("apply {identity}\n{manifest}"));
        Ok(())
    }

    fn delete(&self, identity: &FaultIdentity) -> ChaosResult<()> {
        let mut state = self.state.lock();
        let before = state.live.len();
        state.live.retain(|live| live.identity() != identity);
        let existed = state.live.len() != before;
        state.events.push(BackendEvent::Deleted {
            identity: identity.clone(),
            existed,
        });
        drop(state);

        self.log
            .record("dry-run", format_args!("delete {identity} (existed: {existed})"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chaos_tunnel_core::prelude::Seconds;
    use chaos_tunnel_faults::prelude::{FaultKind, FaultSpecBuilder};

    use super::*;

    fn descriptor(target: &str) -> FaultDescriptor {
        FaultSpecBuilder::new(FaultKind::Memory, target)
            .duration(Seconds(10))
            .build()
            .unwrap()
    }

    #[test]
    fn test_apply_then_delete() {
        let backend = InMemoryBackend::new();
        let carts = descriptor("carts");

        backend.apply(&carts).unwrap();
        assert_eq!(backend.live(), vec![carts.identity().clone()]);

        backend.delete(carts.identity()).unwrap();
        assert!(backend.live().is_empty());
        assert_eq!(backend.max_live(), 1);
    }

    #[test]
    fn test_delete_of_absent_identity_succeeds() {
        let backend = InMemoryBackend::new();
        backend.delete(descriptor("carts").identity()).unwrap();

        assert_eq!(
            backend.events(),
            vec![BackendEvent::Deleted {
                identity: descriptor("carts").identity().clone(),
                existed: false,
            }]
        );
    }

    #[test]
    fn test_apply_over_live_is_flagged() {
        let backend = InMemoryBackend::new();
        backend.apply(&descriptor("carts")).unwrap();
        backend.apply(&descriptor("carts")).unwrap();

        assert_eq!(backend.live().len(), 1);
        assert!(matches!(
            backend.events().last(),
            Some(BackendEvent::Applied { over_live: true, .. })
        ));
    }

    #[test]
    fn test_rejected_apply_leaves_nothing_live() {
        let backend = InMemoryBackend::new().reject_apply_of("carts-memory-stress");
        let result = backend.apply(&descriptor("carts"));

        assert!(matches!(result, Err(ChaosError::ApplyError { .. })));
        assert!(backend.live().is_empty());
        assert!(backend.events().is_empty());
    }
}
