use std::collections::BTreeMap;

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult};
use serde::Serialize;

use crate::descriptor::{FaultDescriptor, Stressor};

const API_VERSION: &str = "chaos-mesh.org/v1alpha1";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
const MANAGED_BY: &str = "chaos-tunnel";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a, S> {
    api_version: &'static str,
    kind: String,
    metadata: Metadata<'a>,
    spec: S,
}

#[derive(Serialize)]
struct Metadata<'a> {
    name: &'a str,
    namespace: &'a str,
    labels: BTreeMap<&'static str, &'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SelectorSpec<'a> {
    namespaces: &'a [String],
    label_selectors: BTreeMap<&'a str, &'a str>,
}

#[derive(Serialize)]
struct StressSpec<'a> {
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    selector: SelectorSpec<'a>,
    stressors: Stressors,
    duration: String,
}

#[derive(Serialize)]
struct Stressors {
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<CpuStressor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<MemoryStressor>,
}

#[derive(Serialize)]
struct CpuStressor {
    workers: u32,
    load: u32,
}

#[derive(Serialize)]
struct MemoryStressor {
    workers: u32,
    size: String,
}

#[derive(Serialize)]
struct NetworkSpec<'a> {
    action: &'static str,
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    selector: SelectorSpec<'a>,
    delay: Delay,
    direction: String,
    duration: String,
}

#[derive(Serialize)]
struct Delay {
    latency: String,
    jitter: String,
    correlation: String,
}

pub(crate) fn render(descriptor: &FaultDescriptor) -> ChaosResult<String> {
    let selector = &descriptor.selector;
    let metadata = Metadata {
        name: &descriptor.identity.name,
        namespace: &descriptor.identity.namespace,
        labels: BTreeMap::from([(MANAGED_BY_LABEL, MANAGED_BY)]),
    };
    let selector_spec = SelectorSpec {
        namespaces: &selector.namespaces,
        label_selectors: BTreeMap::from([(
            selector.label_key.as_str(),
            selector.label_value.as_str(),
        )]),
    };
    let mode = selector.mode.to_string();
    let value = selector.value.map(|v| v.to_string());
    let duration = descriptor.duration.to_string();
    let kind = descriptor.identity.resource.to_string();

    let rendered = match &descriptor.stressor {
        Stressor::Cpu { workers, load } => serde_yaml::to_string(&Manifest {
            api_version: API_VERSION,
            kind,
            metadata,
            spec: StressSpec {
                mode,
                value,
                selector: selector_spec,
                stressors: Stressors {
                    cpu: Some(CpuStressor {
                        workers: *workers,
                        load: *load,
                    }),
                    memory: None,
                },
                duration,
            },
        }),
        Stressor::Memory { workers, size } => serde_yaml::to_string(&Manifest {
            api_version: API_VERSION,
            kind,
            metadata,
            spec: StressSpec {
                mode,
                value,
                selector: selector_spec,
                stressors: Stressors {
                    cpu: None,
                    memory: Some(MemoryStressor {
                        workers: *workers,
                        size: size.to_string(),
                    }),
                },
                duration,
            },
        }),
        Stressor::NetworkDelay {
            latency,
            jitter,
            correlation,
            direction,
        } => serde_yaml::to_string(&Manifest {
            api_version: API_VERSION,
            kind,
            metadata,
            spec: NetworkSpec {
                action: "delay",
                mode,
                value,
                selector: selector_spec,
                delay: Delay {
                    latency: latency.to_string(),
                    jitter: jitter.to_string(),
                    correlation: correlation.to_string(),
                },
                direction: direction.to_string(),
                duration,
            },
        }),
    };

    rendered.map_err(|e| ChaosError::Serialization(e.to_string()))
}
