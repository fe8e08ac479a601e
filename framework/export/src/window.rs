use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chaos_tunnel_core::prelude::{ChaosError, ChaosResult};
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

/// Resolution used when none is configured.
pub const DEFAULT_RESOLUTION: &str = "15s";

/// How the export window is laid out around the injection epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowMode {
    /// `start = epoch - lead`, `end = start + 2 * window_minutes`.
    #[default]
    LeadAdjusted,
    /// `window_minutes` either side of the epoch, with the lead added before the start.
    Centered,
}

impl FromStr for WindowMode {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead-adjusted" => Ok(WindowMode::LeadAdjusted),
            "centered" => Ok(WindowMode::Centered),
            other => Err(ChaosError::InvalidWindow(format!(
                "unknown window mode '{other}', expected lead-adjusted or centered"
            ))),
        }
    }
}

/// A `[start, end)` range of Unix timestamps in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportWindow {
    pub start: i64,
    pub end: i64,
}

impl ExportWindow {
    pub fn len_seconds(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, epoch: i64) -> bool {
        self.start <= epoch && epoch < self.end
    }

    pub fn start_rfc3339(&self) -> String {
        rfc3339(self.start)
    }

    pub fn end_rfc3339(&self) -> String {
        rfc3339(self.end)
    }
}

fn rfc3339(epoch: i64) -> String {
    DateTime::from_timestamp(epoch, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| epoch.to_string())
}

/// One call to the metrics exporter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub window: ExportWindow,
    /// Sampling step as passed to the exporter, for example `5s`.
    pub resolution: String,
    /// Filesystem safe form of the resolution, used in the output file name.
    pub tag: String,
    pub services: Vec<String>,
    pub namespace: String,
    pub output: PathBuf,
}

/// Computes the window and the per-resolution requests for an injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportWindowPlanner {
    /// Seconds of baseline to include before the injection.
    pub lead_seconds: u64,
    /// Half the window length, in minutes.
    pub window_minutes: i64,
    pub mode: WindowMode,
    pub resolutions: Vec<String>,
}

impl Default for ExportWindowPlanner {
    fn default() -> Self {
        Self {
            lead_seconds: 0,
            window_minutes: 10,
            mode: WindowMode::default(),
            resolutions: vec![DEFAULT_RESOLUTION.to_string()],
        }
    }
}

impl ExportWindowPlanner {
    /// Check the planner settings without needing an injection epoch.
    pub fn validate(&self) -> ChaosResult<()> {
        if self.window_minutes <= 0 {
            return Err(ChaosError::InvalidWindow(format!(
                "window minutes must be positive, got {}",
                self.window_minutes
            )));
        }
        if self.resolutions.is_empty() {
            return Err(ChaosError::InvalidWindow(
                "at least one resolution is required".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(self.resolutions.len());
        for resolution in &self.resolutions {
            let tag = resolution_tag(resolution)?;
            if !seen.insert(tag.clone()) {
                return Err(ChaosError::InvalidWindow(format!(
                    "resolution '{resolution}' would overwrite the export for tag '{tag}'"
                )));
            }
        }
        Ok(())
    }

    pub fn window(&self, injection_epoch: i64) -> ChaosResult<ExportWindow> {
        self.validate()?;
        let half = self.window_minutes * 60;
        let lead = i64::try_from(self.lead_seconds)
            .map_err(|_| ChaosError::InvalidWindow("lead is too large".to_string()))?;

        Ok(match self.mode {
            WindowMode::LeadAdjusted => {
                let start = injection_epoch - lead;
                ExportWindow {
                    start,
                    end: start + half * 2,
                }
            }
            WindowMode::Centered => ExportWindow {
                start: injection_epoch - half - lead,
                end: injection_epoch + half,
            },
        })
    }

    /// One request per resolution, all sharing the same window.
    ///
    /// Output paths are derived from `output_base` by suffixing the file stem with the resolution
    /// tag, so `metrics.csv` becomes `metrics_5s.csv`.
    pub fn plan(
        &self,
        injection_epoch: i64,
        output_base: &Path,
        services: &[String],
        namespace: &str,
    ) -> ChaosResult<Vec<ExportRequest>> {
        let window = self.window(injection_epoch)?;

        self.resolutions
            .iter()
            .map(|resolution| {
                let tag = resolution_tag(resolution)?;
                Ok(ExportRequest {
                    window,
                    resolution: resolution.trim().to_string(),
                    output: tagged_path(output_base, &tag),
                    tag,
                    services: services.to_vec(),
                    namespace: namespace.to_string(),
                })
            })
            .collect()
    }
}

/// Strip everything but ASCII alphanumerics from a resolution.
pub fn resolution_tag(resolution: &str) -> ChaosResult<String> {
    let tag: String = resolution
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if tag.is_empty() {
        return Err(ChaosError::InvalidWindow(format!(
            "resolution '{resolution}' is empty once sanitized"
        )));
    }
    Ok(tag)
}

fn tagged_path(base: &Path, tag: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "metrics".to_string());
    let file_name = match base.extension() {
        Some(ext) => format!("{stem}_{tag}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{tag}"),
    };
    base.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn planner(lead_seconds: u64, window_minutes: i64, resolutions: &[&str]) -> ExportWindowPlanner {
        ExportWindowPlanner {
            lead_seconds,
            window_minutes,
            mode: WindowMode::LeadAdjusted,
            resolutions: resolutions.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_lead_adjusted_window() {
        let window = planner(100, 10, &["15s"]).window(1000).unwrap();
        assert_eq!(window, ExportWindow { start: 900, end: 2100 });
        assert!(window.contains(1000));
        assert!(!window.contains(2100));
    }

    #[test]
    fn test_zero_lead_starts_at_injection() {
        let window = planner(0, 5, &["1s"]).window(1_731_000_000).unwrap();
        assert_eq!(window.start, 1_731_000_000);
        assert_eq!(window.len_seconds(), 600);
    }

    #[test]
    fn test_centered_window() {
        let mut planner = planner(30, 10, &["15s"]);
        planner.mode = WindowMode::Centered;
        let window = planner.window(10_000).unwrap();
        assert_eq!(window, ExportWindow { start: 9_370, end: 10_600 });
    }

    #[test]
    fn test_one_request_per_resolution() {
        let services = vec!["carts".to_string(), "orders".to_string()];
        let requests = planner(100, 10, &["2s", "5s"])
            .plan(1000, Path::new("/runs/r1/metrics.csv"), &services, "sock-shop")
            .unwrap();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].window, ExportWindow { start: 900, end: 2100 });
        assert_eq!(requests[0].window, requests[1].window);
        assert_eq!(requests[0].resolution, "2s");
        assert_eq!(requests[1].resolution, "5s");
        assert_eq!(requests[0].output, PathBuf::from("/runs/r1/metrics_2s.csv"));
        assert_eq!(requests[1].output, PathBuf::from("/runs/r1/metrics_5s.csv"));
        assert_eq!(requests[0].services, services);
        assert_eq!(requests[0].namespace, "sock-shop");
    }

    #[test]
    fn test_output_without_extension() {
        let requests = planner(0, 1, &["1m"])
            .plan(0, Path::new("out/export"), &[], "ns")
            .unwrap();
        assert_eq!(requests[0].output, PathBuf::from("out/export_1m"));
    }

    #[test]
    fn test_resolution_tags_are_sanitized() {
        assert_eq!(resolution_tag("1m30s").unwrap(), "1m30s");
        assert_eq!(resolution_tag(" 0.5s ").unwrap(), "05s");
        assert!(matches!(resolution_tag("./-"), Err(ChaosError::InvalidWindow(_))));
        assert!(matches!(resolution_tag(""), Err(ChaosError::InvalidWindow(_))));
    }

    #[test]
    fn test_invalid_windows() {
        for planner in [
            planner(0, 0, &["15s"]),
            planner(0, -5, &["15s"]),
            planner(0, 10, &[]),
            planner(0, 10, &["5s", "  "]),
            planner(0, 10, &["5s", "5-s"]),
        ] {
            assert!(
                matches!(planner.window(1000), Err(ChaosError::InvalidWindow(_))),
                "expected {planner:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_rfc3339_rendering() {
        let window = ExportWindow {
            start: 1_762_691_400,
            end: 1_762_695_000,
        };
        assert_eq!(window.start_rfc3339(), "2025-11-09T12:30:00Z");
        assert_eq!(window.end_rfc3339(), "2025-11-09T13:30:00Z");
    }
}
