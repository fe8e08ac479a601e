use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChaosError, ChaosResult};

/// A non-negative number of whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seconds(pub u64);

impl Seconds {
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Display for Seconds {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl FromStr for Seconds {
    type Err = ChaosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s)
    }
}

/// Parse a duration expression into whole seconds.
///
/// Accepted forms are `<N>` (seconds), `<N>s`, `<N>m` and `<N>h`, where `N` is a run of ASCII
/// digits. Anything else, including signs, fractions and compound forms like `1m30s`, is rejected.
pub fn parse_duration(text: &str) -> ChaosResult<Seconds> {
    let trimmed = text.trim();
    let invalid = || ChaosError::InvalidDuration(text.to_string());

    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(digits_end);
    if number.is_empty() {
        return Err(invalid());
    }

    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => return Err(invalid()),
    };

    let value = number.parse::<u64>().map_err(|_| invalid())?;
    value
        .checked_mul(multiplier)
        .map(Seconds)
        .ok_or_else(invalid)
}
