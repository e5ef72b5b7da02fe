//! Semantic version type with loose parsing.
//!
//! Registries publish version strings that are not always strictly valid
//! semver (`v1.2.3`, `=1.2.3`, `1.2.3beta`). Parsing here is loose in the
//! same way npm's registry tooling is, and ordering follows semver
//! precedence rules.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Semantic version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

/// Version parsing and validation errors
#[derive(Error, Debug)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },

    #[error("Invalid prerelease identifier: {prerelease}")]
    InvalidPrerelease { prerelease: String },

    #[error("Invalid build metadata: {build}")]
    InvalidBuild { build: String },
}

impl Version {
    /// Create a new version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            prerelease: None,
            build: None,
        }
    }

    /// Parse loosely, returning `None` for anything that is not a version
    pub fn parse_loose(input: &str) -> Option<Self> {
        Self::from_str(input).ok()
    }

    /// Check if this is a prerelease version
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Get the precedence for comparison (ignores build metadata)
    fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => {
                match (&self.prerelease, &other.prerelease) {
                    (None, None) => Ordering::Equal,
                    (Some(_), None) => Ordering::Less, // prerelease < normal
                    (None, Some(_)) => Ordering::Greater, // normal > prerelease
                    (Some(a), Some(b)) => compare_prerelease(a, b),
                }
            },
            other => other,
        }
    }
}

/// Compare dot-separated prerelease identifiers: numeric ones numerically,
/// numeric below alphanumeric, shorter list first when all else is equal.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ordering = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(x), Ok(y)) => x.cmp(&y),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            },
        }
    }
}

fn valid_identifiers(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|ident| {
            !ident.is_empty() && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Split a leading run of ASCII digits off `input`
fn take_number<'a>(input: &'a str, whole: &str) -> Result<(u64, &'a str), VersionError> {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return Err(VersionError::InvalidFormat {
            input: whole.to_string(),
        });
    }
    let number = input[..end].parse().map_err(|_| VersionError::InvalidNumber {
        component: input[..end].to_string(),
    })?;
    Ok((number, &input[end..]))
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        // Loose mode tolerates `v`/`=` prefixes and stray whitespace before them
        let body = input.trim_start_matches(|c: char| c == 'v' || c == '=' || c.is_whitespace());

        // Split on '+' for build metadata
        let (version_part, build) = match body.split_once('+') {
            Some((v, b)) => {
                if !valid_identifiers(b) {
                    return Err(VersionError::InvalidBuild {
                        build: b.to_string(),
                    });
                }
                (v, Some(b.to_string()))
            },
            None => (body, None),
        };

        // Parse major.minor.patch
        let (major, rest) = take_number(version_part, input)?;
        let rest = rest.strip_prefix('.').ok_or_else(|| VersionError::InvalidFormat {
            input: input.to_string(),
        })?;
        let (minor, rest) = take_number(rest, input)?;
        let rest = rest.strip_prefix('.').ok_or_else(|| VersionError::InvalidFormat {
            input: input.to_string(),
        })?;
        let (patch, rest) = take_number(rest, input)?;

        // The prerelease hyphen is optional in loose mode (1.2.3beta)
        let prerelease = match rest {
            "" => None,
            rest => {
                let pre = rest.strip_prefix('-').unwrap_or(rest);
                if !valid_identifiers(pre) {
                    return Err(VersionError::InvalidPrerelease {
                        prerelease: rest.to_string(),
                    });
                }
                Some(pre.to_string())
            },
        };

        Ok(Version {
            major,
            minor,
            patch,
            prerelease,
            build,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;

        if let Some(ref pre) = self.prerelease {
            write!(f, "-{}", pre)?;
        }

        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }

        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.precedence_cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
    }
}
