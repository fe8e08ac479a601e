use std::str::FromStr;

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult};
use serde::{Deserialize, Serialize};

/// The faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    #[display("cpu")]
    Cpu,
    #[display("memory")]
    Memory,
    #[display("network-delay")]
    NetworkDelay,
}

impl FaultKind {
    /// The unit of the dimension an escalation varies for this kind.
    pub fn intensity_unit(&self) -> &'static str {
        match self {
            FaultKind::Cpu => "%",
            FaultKind::Memory => "MB",
            FaultKind::NetworkDelay => "ms",
        }
    }
}

impl FromStr for FaultKind {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(FaultKind::Cpu),
            "memory" | "mem" => Ok(FaultKind::Memory),
            "network-delay" | "network" | "delay" => Ok(FaultKind::NetworkDelay),
            other => Err(ChaosError::InvalidFaultSpec(format!(
                "unknown fault kind '{other}'"
            ))),
        }
    }
}

/// How Chaos Mesh picks pods among those matched by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum SelectorMode {
    #[default]
    #[display("all")]
    All,
    #[display("one")]
    One,
    #[display("fixed")]
    Fixed,
    #[display("fixed-percent")]
    FixedPercent,
    #[display("random-max-percent")]
    RandomMaxPercent,
}

impl SelectorMode {
    /// Modes that only make sense together with a numeric `value`.
    pub fn requires_value(&self) -> bool {
        matches!(
            self,
            SelectorMode::Fixed | SelectorMode::FixedPercent | SelectorMode::RandomMaxPercent
        )
    }

    pub fn is_percent(&self) -> bool {
        matches!(self, SelectorMode::FixedPercent | SelectorMode::RandomMaxPercent)
    }
}

impl FromStr for SelectorMode {
    type Err = ChaosError;

    fn from_str(s: &str) -> ChaosResult<Self> {
        match s {
            "all" => Ok(SelectorMode::All),
            "one" => Ok(SelectorMode::One),
            "fixed" => Ok(SelectorMode::Fixed),
            "fixed-percent" => Ok(SelectorMode::FixedPercent),
            "random-max-percent" => Ok(SelectorMode::RandomMaxPercent),
            other => Err(ChaosError::InvalidFaultSpec(format!(
                "unknown mode '{other}', expected one of all, one, fixed, fixed-percent, random-max-percent"
            ))),
        }
    }
}

/// Direction of traffic a network delay applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, derive_more::Display)]
pub enum Direction {
    #[default]
    #[display("to")]
    To,
    #[display("from")]
    From,
    #[display("both")]
    Both,
}

impl FromStr for Direction {
    type Err = ChaosError;

    fn from_str(s: &str) -> ChaosResult<Self> {
        match s {
            "to" => Ok(Direction::To),
            "from" => Ok(Direction::From),
            "both" => Ok(Direction::Both),
            other => Err(ChaosError::InvalidFaultSpec(format!(
                "unknown direction '{other}', expected to, from or both"
            ))),
        }
    }
}
