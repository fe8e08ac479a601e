use chaos_tunnel_core::prelude::{ChaosResult, Latency, MemorySize, Seconds};

use crate::kind::{Direction, FaultKind, SelectorMode};
use crate::manifest;

/// The Chaos Mesh resource type a descriptor is applied as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ResourceKind {
    #[display("StressChaos")]
    StressChaos,
    #[display("NetworkChaos")]
    NetworkChaos,
}

impl ResourceKind {
    pub fn for_fault(kind: FaultKind) -> Self {
        match kind {
            FaultKind::Cpu | FaultKind::Memory => ResourceKind::StressChaos,
            FaultKind::NetworkDelay => ResourceKind::NetworkChaos,
        }
    }

    /// Resource name as understood by `kubectl`.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::StressChaos => "stresschaos",
            ResourceKind::NetworkChaos => "networkchaos",
        }
    }
}

/// Identity of a fault resource on the cluster. Applying a descriptor replaces any live resource
/// with the same identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FaultIdentity {
    pub resource: ResourceKind,
    pub name: String,
    pub namespace: String,
}

impl std::fmt::Display for FaultIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.resource.plural(), self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub label_key: String,
    pub label_value: String,
    pub namespaces: Vec<String>,
    pub mode: SelectorMode,
    pub value: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stressor {
    Cpu {
        workers: u32,
        load: u32,
    },
    Memory {
        workers: u32,
        size: MemorySize,
    },
    NetworkDelay {
        latency: Latency,
        jitter: Latency,
        correlation: u32,
        direction: Direction,
    },
}

impl Stressor {
    pub fn kind(&self) -> FaultKind {
        match self {
            Stressor::Cpu { .. } => FaultKind::Cpu,
            Stressor::Memory { .. } => FaultKind::Memory,
            Stressor::NetworkDelay { .. } => FaultKind::NetworkDelay,
        }
    }

    /// The value an escalation varies: load percent, megabytes or latency milliseconds.
    pub fn intensity(&self) -> u64 {
        match self {
            Stressor::Cpu { load, .. } => u64::from(*load),
            Stressor::Memory { size, .. } => size.megabytes(),
            Stressor::NetworkDelay { latency, .. } => latency.millis(),
        }
    }
}

/// A validated, declarative fault. Only [crate::builder::FaultSpecBuilder] creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultDescriptor {
    pub(crate) identity: FaultIdentity,
    pub(crate) target: String,
    pub(crate) selector: Selector,
    pub(crate) stressor: Stressor,
    pub(crate) duration: Seconds,
}

impl FaultDescriptor {
    pub fn identity(&self) -> &FaultIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn namespace(&self) -> &str {
        &self.identity.namespace
    }

    pub fn kind(&self) -> FaultKind {
        self.stressor.kind()
    }

    /// The service the fault is aimed at.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn stressor(&self) -> &Stressor {
        &self.stressor
    }

    pub fn intensity(&self) -> u64 {
        self.stressor.intensity()
    }

    pub fn duration(&self) -> Seconds {
        self.duration
    }

    /// Render the Chaos Mesh manifest for this fault as YAML.
    pub fn to_manifest(&self) -> ChaosResult<String> {
        manifest::render(self)
    }
}
