use std::path::PathBuf;

/// Result type used across the Chaos Tunnel crates.
pub type ChaosResult<T> = Result<T, ChaosError>;

/// Every failure an experiment can end with.
///
/// The first four variants are input errors. They are raised before anything is applied to the
/// cluster, see [ChaosError::is_input_error].
#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    #[error("invalid duration '{0}': expected <N>, <N>s, <N>m or <N>h")]
    InvalidDuration(String),
    #[error("invalid quantity '{input}': {reason}")]
    InvalidQuantity { input: String, reason: String },
    #[error("invalid fault spec: {0}")]
    InvalidFaultSpec(String),
    #[error("invalid export window: {0}")]
    InvalidWindow(String),
    #[error("cluster rejected fault '{name}': {reason}")]
    ApplyError { name: String, reason: String },
    #[error("exporter did not produce {} for resolution '{resolution}'", .path.display())]
    ExportMissing { resolution: String, path: PathBuf },
    #[error("run cancelled while waiting")]
    Cancelled,
    #[error("another run holds the lock for {service}/{kind} ({})", .path.display())]
    RunLocked {
        service: String,
        kind: String,
        path: PathBuf,
    },
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ChaosError {
    /// True for errors caused by bad input rather than by the cluster or the exporter.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ChaosError::InvalidDuration(_)
                | ChaosError::InvalidQuantity { .. }
                | ChaosError::InvalidFaultSpec(_)
                | ChaosError::InvalidWindow(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_classified() {
        assert!(ChaosError::InvalidDuration("x".to_string()).is_input_error());
        assert!(ChaosError::InvalidWindow("w".to_string()).is_input_error());
        assert!(!ChaosError::Cancelled.is_input_error());
        assert!(!ChaosError::ApplyError {
            name: "carts-cpu-stress".to_string(),
            reason: "no CRD".to_string(),
        }
        .is_input_error());
    }

    #[test]
    fn test_export_missing_message_names_the_file() {
        let err = ChaosError::ExportMissing {
            resolution: "5s".to_string(),
            path: PathBuf::from("/tmp/run/metrics_5s.csv"),
        };
        assert_eq!(
            err.to_string(),
            "exporter did not produce /tmp/run/metrics_5s.csv for resolution '5s'"
        );
    }
}
