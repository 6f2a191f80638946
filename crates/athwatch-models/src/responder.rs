use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Position of a responder within its pipeline stage.
///
/// The derived ordering is the configuration order used for tie-breaks:
/// primary always enumerates before secondary.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::Primary, Slot::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Primary => "primary",
            Slot::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which verification responders receive each request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMode {
    #[default]
    Both,
    Primary,
    Secondary,
}

impl VerificationMode {
    /// Active slots in configuration order.
    pub fn slots(&self) -> &'static [Slot] {
        match self {
            VerificationMode::Both => &Slot::ALL,
            VerificationMode::Primary => &[Slot::Primary],
            VerificationMode::Secondary => &[Slot::Secondary],
        }
    }
}

impl FromStr for VerificationMode {
    type Err = String;

    /// Accepts the mode names plus the numeric menu choices operators are
    /// used to ("1" primary, "2" secondary, "3" both).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "both" | "3" | "" => Ok(VerificationMode::Both),
            "primary" | "ath1" | "1" => Ok(VerificationMode::Primary),
            "secondary" | "ath2" | "2" => Ok(VerificationMode::Secondary),
            other => Err(format!("unknown verification mode: {other}")),
        }
    }
}

/// How the evaluator settles a request once replies start arriving.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// The first successful reply wins immediately.
    #[default]
    FirstGood,
    /// Wait until every responder is terminal, then take the smallest value.
    BestOfBoth,
}
