/// Four-part `major.minor.build.revision` versions.
///
/// Both the declared assembly version and the file version are normalised to
/// four parts so their string forms feed the fingerprint consistently.
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourPartVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl FourPartVersion {
    /// Substituted when a file version is missing or unparsable.
    pub const PLACEHOLDER: Self = Self::new(0, 0, 999, 9);

    pub const fn new(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }
}

impl Serialize for FourPartVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for FourPartVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(pub String);

impl fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version string '{}'", self.0)
    }
}

impl std::error::Error for ParseVersionError {}

/// Accepts two to four dot-separated decimal components; absent ones are 0.
impl FromStr for FourPartVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        let parts: Vec<&str> = s.trim().split('.').collect();
        if !(2..=4).contains(&parts.len()) {
            return Err(err());
        }
        let mut nums = [0u32; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.trim().parse().map_err(|_| err())?;
        }
        Ok(Self::new(nums[0], nums[1], nums[2], nums[3]))
    }
}
