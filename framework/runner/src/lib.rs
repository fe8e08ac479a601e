mod backend;
mod controller;
mod escalation;
mod in_memory;
mod kubectl;
mod record;

pub mod prelude {
    pub use crate::backend::FaultBackend;
    pub use crate::controller::{FaultController, LiveFault};
    pub use crate::escalation::{EscalationPlan, EscalationStepper};
    pub use crate::in_memory::{BackendEvent, InMemoryBackend};
    pub use crate::kubectl::{KubectlBackend, KUBECTL_PATH_ENV};
    pub use crate::record::InjectionRecord;
}
