//! Volume level and relative volume change.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MIN_VOLUME: u8 = 0;
pub const MAX_VOLUME: u8 = 100;

/// Absolute volume level, always within `0..=100`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Volume(u8);

impl Volume {
    pub const MAX: Volume = Volume(MAX_VOLUME);

    /// Clamp an arbitrary level into range.
    pub fn clamped(level: i64) -> Self {
        Self(level.clamp(i64::from(MIN_VOLUME), i64::from(MAX_VOLUME)) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Volume {
    type Error = VolumeError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        if level > MAX_VOLUME {
            return Err(VolumeError::OutOfRange(level));
        }
        Ok(Self(level))
    }
}

impl From<Volume> for u8 {
    fn from(v: Volume) -> Self {
        v.0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    #[error("volume {0} is outside 0..=100")]
    OutOfRange(u8),
    #[error("volume delta must look like \"+N\" or \"-N\", got {0:?}")]
    MalformedDelta(String),
}

/// Signed relative change, carried on the wire as `"+10"` / `"-5"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VolumeDelta {
    raise: bool,
    magnitude: u32,
}

impl VolumeDelta {
    pub fn up(magnitude: u32) -> Self {
        Self { raise: true, magnitude }
    }

    pub fn down(magnitude: u32) -> Self {
        Self { raise: false, magnitude }
    }

    /// Apply to `current`, capping at 100 and flooring at 0.
    pub fn apply(self, current: Volume) -> Volume {
        let current = i64::from(current.get());
        let magnitude = i64::from(self.magnitude);
        if self.raise {
            Volume::clamped(current + magnitude)
        } else {
            Volume::clamped(current - magnitude)
        }
    }
}

impl FromStr for VolumeDelta {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let malformed = || VolumeError::MalformedDelta(s.to_string());
        let (raise, digits) = match trimmed.as_bytes().first() {
            Some(b'+') => (true, &trimmed[1..]),
            Some(b'-') => (false, &trimmed[1..]),
            _ => return Err(malformed()),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let magnitude = digits.parse::<u32>().map_err(|_| malformed())?;
        Ok(Self { raise, magnitude })
    }
}

impl TryFrom<String> for VolumeDelta {
    type Error = VolumeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<VolumeDelta> for String {
    fn from(d: VolumeDelta) -> Self {
        d.to_string()
    }
}

impl fmt::Display for VolumeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.raise { '+' } else { '-' };
        write!(f, "{sign}{}", self.magnitude)
    }
}
