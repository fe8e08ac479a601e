use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChaosError, ChaosResult};

/// A memory size in whole megabytes.
///
/// Parsed from `<N>MB` or `<N>GB`. Only a single number with a single unit is accepted, so inputs
/// like `1GB512MB` are rejected rather than summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemorySize {
    megabytes: u64,
}

impl MemorySize {
    pub fn from_megabytes(megabytes: u64) -> ChaosResult<Self> {
        if megabytes == 0 {
            return Err(ChaosError::InvalidQuantity {
                input: format!("{megabytes}MB"),
                reason: "memory size must be positive".to_string(),
            });
        }
        Ok(Self { megabytes })
    }

    pub fn megabytes(&self) -> u64 {
        self.megabytes
    }
}

impl Display for MemorySize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}MB", self.megabytes)
    }
}

impl FromStr for MemorySize {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_number_and_unit(s)?;
        let multiplier = match unit.to_ascii_uppercase().as_str() {
            "MB" => 1,
            "GB" => 1024,
            "" => return Err(quantity_error(s, "missing unit, expected MB or GB")),
            _ => return Err(quantity_error(s, "unsupported unit, expected MB or GB")),
        };
        let megabytes = value
            .checked_mul(multiplier)
            .ok_or_else(|| quantity_error(s, "value too large"))?;
        MemorySize::from_megabytes(megabytes).map_err(|_| quantity_error(s, "memory size must be positive"))
    }
}

/// A network latency in whole milliseconds, parsed from `<N>ms` or `<N>s`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Latency {
    millis: u64,
}

impl Latency {
    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }
}

impl Display for Latency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.millis)
    }
}

impl FromStr for Latency {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, unit) = split_number_and_unit(s)?;
        let millis = match unit {
            "ms" => Some(value),
            "s" => value.checked_mul(1000),
            "" => return Err(quantity_error(s, "missing unit, expected ms or s")),
            _ => return Err(quantity_error(s, "unsupported unit, expected ms or s")),
        };
        millis
            .map(Latency::from_millis)
            .ok_or_else(|| quantity_error(s, "value too large"))
    }
}

/// Split `<digits><unit>` into its number and unit. The unit must be purely alphabetic, which
/// rules out mixed forms such as `1GB512MB`.
fn split_number_and_unit(input: &str) -> ChaosResult<(u64, &str)> {
    let trimmed = input.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(digits_end);
    if number.is_empty() {
        return Err(quantity_error(input, "expected a leading whole number"));
    }
    if !unit.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(quantity_error(input, "expected a single unit suffix"));
    }
    let value = number
        .parse::<u64>()
        .map_err(|_| quantity_error(input, "value too large"))?;
    Ok((value, unit))
}

fn quantity_error(input: &str, reason: &str) -> ChaosError {
    ChaosError::InvalidQuantity {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_sizes() {
        assert_eq!("256MB".parse::<MemorySize>().unwrap().megabytes(), 256);
        assert_eq!("2GB".parse::<MemorySize>().unwrap().megabytes(), 2048);
        assert_eq!("20mb".parse::<MemorySize>().unwrap().megabytes(), 20);
    }

    #[test]
    fn test_reject_bad_memory_sizes() {
        for bad in ["1GB512MB", "0MB", "12", "MB", "12KB", "1.5GB", "-3MB", "12 MB"] {
            assert!(
                bad.parse::<MemorySize>().is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn test_memory_size_display() {
        let size: MemorySize = "1GB".parse().unwrap();
        assert_eq!(size.to_string(), "1024MB");
    }

    #[test]
    fn test_parse_latency() {
        assert_eq!("100ms".parse::<Latency>().unwrap().millis(), 100);
        assert_eq!("2s".parse::<Latency>().unwrap().millis(), 2000);
        assert_eq!("0ms".parse::<Latency>().unwrap().to_string(), "0ms");
    }

    #[test]
    fn test_reject_bad_latency() {
        for bad in ["100", "1s500ms", "ms", "10us", "1.5s"] {
            assert!(bad.parse::<Latency>().is_err(), "expected '{bad}' to be rejected");
        }
    }
}
