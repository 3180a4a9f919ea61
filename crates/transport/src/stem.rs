use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the fixed stems the separation backend produces.
///
/// The declaration order is the display order; UI rows and gain handles are keyed by it,
/// so it must stay stable for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemId {
    Vocals,
    Guitar,
    Bass,
    Drums,
    Piano,
    Other,
}

impl StemId {
    pub const ALL: [StemId; 6] = [
        StemId::Vocals,
        StemId::Guitar,
        StemId::Bass,
        StemId::Drums,
        StemId::Piano,
        StemId::Other,
    ];

    /// Identifier used on the wire (`/download/{job}/{stem}`, mix volumes).
    pub fn as_str(&self) -> &'static str {
        match self {
            StemId::Vocals => "vocals",
            StemId::Guitar => "guitar",
            StemId::Bass => "bass",
            StemId::Drums => "drums",
            StemId::Piano => "piano",
            StemId::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StemId::Vocals => "Vocals",
            StemId::Guitar => "Guitar",
            StemId::Bass => "Bass",
            StemId::Drums => "Drums",
            StemId::Piano => "Piano",
            StemId::Other => "Other",
        }
    }

    /// Row color as RGB.
    pub fn color(&self) -> [u8; 3] {
        match self {
            StemId::Vocals => [0xf1, 0xc4, 0x0f],
            StemId::Guitar => [0xe7, 0x4c, 0x3c],
            StemId::Bass => [0x34, 0x98, 0xdb],
            StemId::Drums => [0x2e, 0xcc, 0x71],
            StemId::Piano => [0xec, 0x48, 0x99],
            StemId::Other => [0x9b, 0x59, 0xb6],
        }
    }
}

impl fmt::Display for StemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStem(pub String);

impl fmt::Display for UnknownStem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown stem '{}'", self.0)
    }
}

impl std::error::Error for UnknownStem {}

impl FromStr for StemId {
    type Err = UnknownStem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StemId::ALL
            .into_iter()
            .find(|stem| stem.as_str() == s)
            .ok_or_else(|| UnknownStem(s.to_string()))
    }
}
