use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("version '{0}' is not of the form major.minor.patch")]
    Malformed(String),
    #[error("version component '{0}' is not a number")]
    NotANumber(String),
}

/// Semantic version of the benchmarked code base, ordered by (major, minor, patch).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionError;

    /// accepts `v15.0.2`, `15.0.2` and suffixed forms like `15.0.2-SNAPSHOT`
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed
            .split(|c: char| c == '-' || c == '+')
            .next()
            .unwrap_or_default();

        let parts = core.split('.').collect::<Vec<_>>();
        if parts.len() != 3 {
            return Err(VersionError::Malformed(input.to_owned()));
        }

        let number = |part: &str| {
            part.parse::<u64>()
                .map_err(|_| VersionError::NotANumber(part.to_owned()))
        };

        Ok(Self {
            major: number(parts[0])?,
            minor: number(parts[1])?,
            patch: number(parts[2])?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!("v15.0.2".parse::<Version>(), Ok(Version::new(15, 0, 2)));
        assert_eq!("16.0.0".parse::<Version>(), Ok(Version::new(16, 0, 0)));
        assert_eq!(
            "17.0.0-SNAPSHOT".parse::<Version>(),
            Ok(Version::new(17, 0, 0))
        );
        assert_eq!(
            "15.0".parse::<Version>(),
            Err(VersionError::Malformed("15.0".to_owned()))
        );
        assert_eq!(
            "15.x.0".parse::<Version>(),
            Err(VersionError::NotANumber("x".to_owned()))
        );
    }

    #[test]
    fn ordering() {
        assert!(Version::new(15, 0, 2) < Version::new(15, 1, 0));
        assert!(Version::new(9, 9, 9) < Version::new(10, 0, 0));
        assert_eq!(Version::new(14, 0, 3).to_string(), "14.0.3");
    }
}
