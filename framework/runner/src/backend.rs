use chaos_tunnel_core::prelude::ChaosResult;
use chaos_tunnel_faults::prelude::{FaultDescriptor, FaultIdentity};

/// The cluster-side store of fault resources, keyed by [FaultIdentity].
pub trait FaultBackend: Send + Sync {
    /// Create the resource described by `descriptor`.
    ///
    /// A rejection by the cluster must be reported as [chaos_tunnel_core::prelude::ChaosError::ApplyError].
    fn apply(&self, descriptor: &FaultDescriptor) -> ChaosResult<()>;

    /// Remove the resource with this identity. Removing a resource that does not exist succeeds.
    fn delete(&self, identity: &FaultIdentity) -> ChaosResult<()>;
}
