// SPDX-License-Identifier: MIT
//! Tag names and versions carried by tagged tree nodes

use std::fmt;
use std::str::FromStr;

use super::TreeError;

/// Semantic version of a tag (`major.minor.patch`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl TagVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Versions sharing a major number are interchangeable on read
    pub fn is_compatible_with(&self, other: &TagVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for TagVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for TagVersion {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TreeError::InvalidTag(format!("invalid tag version '{}'", s));
        let mut parts = s.split('.');
        let mut next = || -> Result<u32, TreeError> {
            parts
                .next()
                .and_then(|part| part.parse().ok())
                .ok_or_else(invalid)
        };
        let version = TagVersion::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(version)
    }
}

/// Tag name plus version, written as `name-major.minor.patch`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    pub name: String,
    pub version: TagVersion,
}

impl Tag {
    pub fn new(name: impl Into<String>, version: TagVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

impl FromStr for Tag {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .rsplit_once('-')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| TreeError::InvalidTag(format!("tag '{}' has no version", s)))?;
        Ok(Tag::new(name, version.parse()?))
    }
}
