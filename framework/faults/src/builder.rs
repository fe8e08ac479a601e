use chaos_tunnel_core::prelude::{ChaosError, ChaosResult, Latency, MemorySize, Seconds};

use crate::descriptor::{FaultDescriptor, FaultIdentity, ResourceKind, Selector, Stressor};
use crate::kind::{Direction, FaultKind, SelectorMode};

/// Namespace the target services run in when none is given.
pub const DEFAULT_NAMESPACE: &str = "sock-shop";
/// Pod label used to select the target service when none is given.
pub const DEFAULT_SELECTOR_KEY: &str = "name";

const DEFAULT_WORKERS: u32 = 1;
const DEFAULT_CPU_LOAD: u32 = 100;
const DEFAULT_MEMORY_SIZE: &str = "256MB";
const DEFAULT_LATENCY: &str = "100ms";
const DEFAULT_JITTER: &str = "0ms";
const MAX_NAME_LEN: usize = 63;

/// Builds a validated [FaultDescriptor] for a target service.
///
/// Anything not overridden is derived from the target: the selector matches `name=<target>` and
/// the descriptor is called `<target>-<kind>-stress`. Stressor settings are kept as given until
/// [FaultSpecBuilder::build] so that every violation is reported instead of being clamped.
#[derive(Debug, Clone)]
pub struct FaultSpecBuilder {
    kind: FaultKind,
    target: String,
    name: Option<String>,
    namespace: Option<String>,
    selector_key: Option<String>,
    selector_value: Option<String>,
    selector_namespaces: Vec<String>,
    mode: Option<String>,
    value: Option<String>,
    duration: Option<Seconds>,
    workers: Option<u32>,
    load: Option<u32>,
    memory_size: Option<String>,
    latency: Option<String>,
    jitter: Option<String>,
    correlation: Option<u32>,
    direction: Option<String>,
}

impl FaultSpecBuilder {
    pub fn new(kind: FaultKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            name: None,
            namespace: None,
            selector_key: None,
            selector_value: None,
            selector_namespaces: Vec::new(),
            mode: None,
            value: None,
            duration: None,
            workers: None,
            load: None,
            memory_size: None,
            latency: None,
            jitter: None,
            correlation: None,
            direction: None,
        }
    }

    pub fn kind(&self) -> FaultKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Check the target on its own. It names run directories and lock files, so it is checked
    /// before anything else is built.
    pub fn check_target(&self) -> ChaosResult<()> {
        validate_target(&self.target)
    }

    /// The descriptor name that [FaultSpecBuilder::build] will use.
    pub fn resolved_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{}-stress", self.target, self.kind))
    }

    pub fn resolved_namespace(&self) -> String {
        self.namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn selector_key(mut self, key: impl Into<String>) -> Self {
        self.selector_key = Some(key.into());
        self
    }

    pub fn selector_value(mut self, value: impl Into<String>) -> Self {
        self.selector_value = Some(value.into());
        self
    }

    /// Add a namespace the selector matches pods in. Defaults to the descriptor namespace.
    pub fn selector_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.selector_namespaces.push(namespace.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn duration(mut self, duration: Seconds) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn workers(mut self, workers: u32) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn load(mut self, load: u32) -> Self {
        self.load = Some(load);
        self
    }

    pub fn memory_size(mut self, size: impl Into<String>) -> Self {
        self.memory_size = Some(size.into());
        self
    }

    pub fn latency(mut self, latency: impl Into<String>) -> Self {
        self.latency = Some(latency.into());
        self
    }

    pub fn jitter(mut self, jitter: impl Into<String>) -> Self {
        self.jitter = Some(jitter.into());
        self
    }

    pub fn correlation(mut self, correlation: u32) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    /// Set the dimension an escalation varies: cpu load, memory megabytes or latency millis.
    pub fn with_intensity(self, intensity: u64) -> Self {
        match self.kind {
            FaultKind::Cpu => {
                let load = u32::try_from(intensity).unwrap_or(u32::MAX);
                self.load(load)
            }
            FaultKind::Memory => self.memory_size(format!("{intensity}MB")),
            FaultKind::NetworkDelay => self.latency(format!("{intensity}ms")),
        }
    }

    /// The intensity the built descriptor will have, taking defaults into account.
    pub fn intensity(&self) -> ChaosResult<u64> {
        Ok(self.build_stressor()?.intensity())
    }

    pub fn build(&self) -> ChaosResult<FaultDescriptor> {
        validate_target(&self.target)?;

        let name = self.resolved_name();
        validate_name(&name)?;

        let namespace = self.resolved_namespace();
        validate_name(&namespace)?;

        let duration = self
            .duration
            .ok_or_else(|| invalid("a duration is required"))?;
        if duration.is_zero() {
            return Err(invalid("duration must be greater than zero"));
        }

        let selector = self.build_selector(&namespace)?;
        let stressor = self.build_stressor()?;

        Ok(FaultDescriptor {
            identity: FaultIdentity {
                resource: ResourceKind::for_fault(self.kind),
                name,
                namespace,
            },
            target: self.target.clone(),
            selector,
            stressor,
            duration,
        })
    }

    fn build_selector(&self, namespace: &str) -> ChaosResult<Selector> {
        let label_key = self
            .selector_key
            .clone()
            .unwrap_or_else(|| DEFAULT_SELECTOR_KEY.to_string());
        if label_key.trim().is_empty() {
            return Err(invalid("selector key must not be empty"));
        }
        let label_value = self
            .selector_value
            .clone()
            .unwrap_or_else(|| self.target.clone());
        validate_target(&label_value)?;

        let namespaces = if self.selector_namespaces.is_empty() {
            vec![namespace.to_string()]
        } else {
            for ns in &self.selector_namespaces {
                validate_name(ns)?;
            }
            self.selector_namespaces.clone()
        };

        let mode = match &self.mode {
            Some(mode) => mode.parse::<SelectorMode>()?,
            None => SelectorMode::default(),
        };
        let value = match (&self.value, mode.requires_value()) {
            (Some(raw), true) => {
                let value = raw.trim().parse::<u32>().map_err(|_| {
                    invalid(format!("mode '{mode}' requires a numeric value, got '{raw}'"))
                })?;
                if mode.is_percent() && !(1..=100).contains(&value) {
                    return Err(invalid(format!(
                        "mode '{mode}' requires a percentage in [1,100], got {value}"
                    )));
                }
                if mode == SelectorMode::Fixed && value == 0 {
                    return Err(invalid("mode 'fixed' requires at least one pod"));
                }
                Some(value)
            }
            (None, true) => {
                return Err(invalid(format!("mode '{mode}' requires a value")));
            }
            (Some(_), false) => {
                return Err(invalid(format!("mode '{mode}' does not take a value")));
            }
            (None, false) => None,
        };

        Ok(Selector {
            label_key,
            label_value,
            namespaces,
            mode,
            value,
        })
    }

    fn build_stressor(&self) -> ChaosResult<Stressor> {
        self.reject_foreign_overrides()?;

        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if self.kind != FaultKind::NetworkDelay && workers < 1 {
            return Err(invalid("workers must be at least 1"));
        }

        match self.kind {
            FaultKind::Cpu => {
                let load = self.load.unwrap_or(DEFAULT_CPU_LOAD);
                if !(1..=100).contains(&load) {
                    return Err(invalid(format!("cpu load must be in [1,100], got {load}")));
                }
                Ok(Stressor::Cpu { workers, load })
            }
            FaultKind::Memory => {
                let raw = self.memory_size.as_deref().unwrap_or(DEFAULT_MEMORY_SIZE);
                let size = raw.parse::<MemorySize>().map_err(into_spec_error)?;
                Ok(Stressor::Memory { workers, size })
            }
            FaultKind::NetworkDelay => {
                let latency = self
                    .latency
                    .as_deref()
                    .unwrap_or(DEFAULT_LATENCY)
                    .parse::<Latency>()
                    .map_err(into_spec_error)?;
                let jitter = self
                    .jitter
                    .as_deref()
                    .unwrap_or(DEFAULT_JITTER)
                    .parse::<Latency>()
                    .map_err(into_spec_error)?;
                let correlation = self.correlation.unwrap_or(0);
                if correlation > 100 {
                    return Err(invalid(format!(
                        "correlation must be in [0,100], got {correlation}"
                    )));
                }
                let direction = match &self.direction {
                    Some(direction) => direction.parse::<Direction>()?,
                    None => Direction::default(),
                };
                Ok(Stressor::NetworkDelay {
                    latency,
                    jitter,
                    correlation,
                    direction,
                })
            }
        }
    }

    /// Stressor settings that belong to another kind are a mistake, not something to ignore.
    fn reject_foreign_overrides(&self) -> ChaosResult<()> {
        let stress_set = self.workers.is_some();
        let cpu_set = self.load.is_some();
        let memory_set = self.memory_size.is_some();
        let network_set = self.latency.is_some()
            || self.jitter.is_some()
            || self.correlation.is_some()
            || self.direction.is_some();

        let foreign = match self.kind {
            FaultKind::Cpu => memory_set || network_set,
            FaultKind::Memory => cpu_set || network_set,
            FaultKind::NetworkDelay => stress_set || cpu_set || memory_set,
        };
        if foreign {
            return Err(invalid(format!(
                "stressor settings given that do not apply to a {} fault",
                self.kind
            )));
        }
        Ok(())
    }
}

fn validate_target(target: &str) -> ChaosResult<()> {
    if target.is_empty() {
        return Err(invalid("target service must not be empty"));
    }
    let edges_alphanumeric = target.starts_with(|c: char| c.is_ascii_alphanumeric())
        && target.ends_with(|c: char| c.is_ascii_alphanumeric());
    if target.len() > MAX_NAME_LEN
        || !edges_alphanumeric
        || !target
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid(format!("'{target}' is not a valid label value")));
    }
    Ok(())
}

fn validate_name(name: &str) -> ChaosResult<()> {
    let well_formed = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !well_formed {
        return Err(invalid(format!(
            "'{name}' is not a valid resource name (lowercase alphanumerics and '-', at most {MAX_NAME_LEN} characters)"
        )));
    }
    Ok(())
}

fn invalid(reason: impl Into<String>) -> ChaosError {
    ChaosError::InvalidFaultSpec(reason.into())
}

fn into_spec_error(err: ChaosError) -> ChaosError {
    match err {
        ChaosError::InvalidQuantity { input, reason } => {
            invalid(format!("invalid quantity '{input}': {reason}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu(target: &str) -> FaultSpecBuilder {
        FaultSpecBuilder::new(FaultKind::Cpu, target).duration(Seconds(60))
    }

    fn assert_invalid(builder: FaultSpecBuilder) {
        let result = builder.build();
        assert!(
            matches!(result, Err(ChaosError::InvalidFaultSpec(_))),
            "expected InvalidFaultSpec, got {result:?}"
        );
    }

    #[test]
    fn test_defaults_derived_from_target() {
        let descriptor = cpu("carts").build().unwrap();

        assert_eq!(descriptor.name(), "carts-cpu-stress");
        assert_eq!(descriptor.namespace(), "sock-shop");
        assert_eq!(descriptor.target(), "carts");
        assert_eq!(descriptor.selector().label_key, "name");
        assert_eq!(descriptor.selector().label_value, "carts");
        assert_eq!(descriptor.selector().namespaces, vec!["sock-shop".to_string()]);
        assert_eq!(descriptor.selector().mode, SelectorMode::All);
        assert_eq!(
            descriptor.stressor(),
            &Stressor::Cpu {
                workers: 1,
                load: 100
            }
        );
        assert_eq!(descriptor.identity().resource, ResourceKind::StressChaos);
    }

    #[test]
    fn test_overrides_are_applied() {
        let descriptor = cpu("carts")
            .name("custom-fault")
            .namespace("chaos")
            .selector_key("app")
            .selector_value("carts-v2")
            .selector_namespace("sock-shop")
            .selector_namespace("sock-shop-canary")
            .build()
            .unwrap();

        assert_eq!(descriptor.name(), "custom-fault");
        assert_eq!(descriptor.namespace(), "chaos");
        assert_eq!(descriptor.selector().label_key, "app");
        assert_eq!(descriptor.selector().label_value, "carts-v2");
        assert_eq!(descriptor.selector().namespaces.len(), 2);
    }

    #[test]
    fn test_network_name_and_resource() {
        let descriptor = FaultSpecBuilder::new(FaultKind::NetworkDelay, "front-end")
            .duration(Seconds(10))
            .build()
            .unwrap();
        assert_eq!(descriptor.name(), "front-end-network-delay-stress");
        assert_eq!(descriptor.identity().resource, ResourceKind::NetworkChaos);
        assert_eq!(descriptor.intensity(), 100);
    }

    #[test]
    fn test_cpu_load_bounds() {
        assert!(cpu("carts").load(1).build().is_ok());
        assert!(cpu("carts").load(100).build().is_ok());
        assert_invalid(cpu("carts").load(0));
        assert_invalid(cpu("carts").load(101));
    }

    #[test]
    fn test_workers_must_be_positive() {
        assert_invalid(cpu("carts").workers(0));
        assert_invalid(
            FaultSpecBuilder::new(FaultKind::Memory, "carts")
                .duration(Seconds(1))
                .workers(0),
        );
    }

    #[test]
    fn test_memory_size_requires_single_unit() {
        let memory = |size: &str| {
            FaultSpecBuilder::new(FaultKind::Memory, "orders")
                .duration(Seconds(30))
                .memory_size(size)
        };
        assert_eq!(memory("1GB").build().unwrap().intensity(), 1024);
        assert_invalid(memory("1GB512MB"));
        assert_invalid(memory("512"));
        assert_invalid(memory("0MB"));
    }

    #[test]
    fn test_mode_validation() {
        let network = || {
            FaultSpecBuilder::new(FaultKind::NetworkDelay, "payment").duration(Seconds(30))
        };
        assert!(network().mode("one").build().is_ok());
        assert!(network().mode("fixed").value("2").build().is_ok());
        assert!(network().mode("random-max-percent").value("30").build().is_ok());

        assert_invalid(network().mode("some"));
        assert_invalid(network().mode("fixed"));
        assert_invalid(network().mode("fixed-percent").value("half"));
        assert_invalid(network().mode("fixed-percent").value("150"));
        assert_invalid(network().mode("all").value("3"));
    }

    #[test]
    fn test_network_settings_validated() {
        let network = || {
            FaultSpecBuilder::new(FaultKind::NetworkDelay, "payment").duration(Seconds(30))
        };
        assert_invalid(network().correlation(101));
        assert_invalid(network().direction("sideways"));
        assert_invalid(network().latency("100"));
    }

    #[test]
    fn test_foreign_overrides_rejected() {
        assert_invalid(cpu("carts").memory_size("100MB"));
        assert_invalid(cpu("carts").latency("10ms"));
        assert_invalid(
            FaultSpecBuilder::new(FaultKind::NetworkDelay, "carts")
                .duration(Seconds(5))
                .workers(2),
        );
    }

    #[test]
    fn test_duration_required_and_positive() {
        assert_invalid(FaultSpecBuilder::new(FaultKind::Cpu, "carts"));
        assert_invalid(FaultSpecBuilder::new(FaultKind::Cpu, "carts").duration(Seconds(0)));
    }

    #[test]
    fn test_names_validated() {
        assert_invalid(cpu(""));
        assert_invalid(cpu("carts").name("Carts_Fault"));
        assert_invalid(cpu("carts").name("-carts"));
        assert_invalid(cpu("carts").namespace("Sock Shop"));
        assert_invalid(cpu(&"a".repeat(64)));
    }

    #[test]
    fn test_target_must_be_a_label_value() {
        for target in ["carts/x", "../carts", "..", ".carts", "carts-"] {
            assert!(
                matches!(cpu(target).check_target(), Err(ChaosError::InvalidFaultSpec(_))),
                "{target} accepted"
            );
            assert_invalid(cpu(target));
        }
        cpu("front-end").check_target().unwrap();
        cpu("carts_db.v2").check_target().unwrap();
    }

    #[test]
    fn test_with_intensity_sets_kind_dimension() {
        let cpu = cpu("carts").with_intensity(40).build().unwrap();
        assert_eq!(cpu.intensity(), 40);

        let memory = FaultSpecBuilder::new(FaultKind::Memory, "carts")
            .duration(Seconds(5))
            .with_intensity(52)
            .build()
            .unwrap();
        assert_eq!(
            memory.stressor(),
            &Stressor::Memory {
                workers: 1,
                size: MemorySize::from_megabytes(52).unwrap()
            }
        );

        let network = FaultSpecBuilder::new(FaultKind::NetworkDelay, "carts")
            .duration(Seconds(5))
            .with_intensity(300);
        assert_eq!(network.intensity().unwrap(), 300);
    }
}
