use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// REST API revisions understood by this client, newest first.
pub const SUPPORTED_VERSIONS: [ProtocolVersion; 3] = [
    ProtocolVersion::new(13, 0),
    ProtocolVersion::new(12, 0),
    ProtocolVersion::new(3, 0),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid API version {0:?} (expected <major>.<minor>, e.g. 13.0)")]
pub struct ParseVersionError(String);

/// API version token sent in the `Accept` header, e.g. `13.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolVersion {
    major: u32,
    minor: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Negotiation candidates in probe order.
    pub fn candidates() -> Vec<ProtocolVersion> {
        SUPPORTED_VERSIONS.to_vec()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || ParseVersionError(s.to_string());

        let (major, minor) = match trimmed.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (trimmed, "0"),
        };
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits(major) || !digits(minor) {
            return Err(err());
        }

        Ok(Self {
            major: major.parse().map_err(|_| err())?,
            minor: minor.parse().map_err(|_| err())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_are_strictly_descending() {
        let candidates = ProtocolVersion::candidates();
        assert_eq!(candidates.len(), 3);
        assert!(candidates.windows(2).all(|w| w[0] > w[1]));

        let tokens: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        assert_eq!(tokens, ["13.0", "12.0", "3.0"]);
    }

    #[test]
    fn parses_tokens() {
        assert_eq!("13.0".parse(), Ok(ProtocolVersion::new(13, 0)));
        assert_eq!(" 12.0 ".parse(), Ok(ProtocolVersion::new(12, 0)));
        assert_eq!("3".parse(), Ok(ProtocolVersion::new(3, 0)));
        assert_eq!("10.5".parse(), Ok(ProtocolVersion::new(10, 5)));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "v13", "13.", ".0", "13.0.1", "abc", "-1.0"] {
            assert!(bad.parse::<ProtocolVersion>().is_err(), "{bad:?} parsed");
        }
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(ProtocolVersion::new(13, 0) > ProtocolVersion::new(3, 0));
        assert!(ProtocolVersion::new(12, 1) > ProtocolVersion::new(12, 0));
    }
}
