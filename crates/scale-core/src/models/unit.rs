//! Weight units reported by scale devices

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnitParseError;

/// Unit of a weight reading
///
/// The set is closed: devices that report anything else are decoded with the
/// default unit (kilograms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeightUnit {
    /// Kilogram (`kg`)
    #[default]
    #[serde(rename = "kg")]
    Kilogram,
    /// Gram (`g`)
    #[serde(rename = "g")]
    Gram,
    /// Pound (`lb`)
    #[serde(rename = "lb")]
    Pound,
    /// Ounce (`oz`)
    #[serde(rename = "oz")]
    Ounce,
    /// Metric tonne (`t`)
    #[serde(rename = "t")]
    Tonne,
}

impl WeightUnit {
    /// All units, in the order tokens are matched against device text
    ///
    /// `kg` must precede `g` so that a scan over free text prefers the longer
    /// token.
    pub const ALL: [WeightUnit; 5] = [
        WeightUnit::Kilogram,
        WeightUnit::Gram,
        WeightUnit::Pound,
        WeightUnit::Ounce,
        WeightUnit::Tonne,
    ];

    /// Short token as printed by devices
    pub fn symbol(&self) -> &'static str {
        match self {
            WeightUnit::Kilogram => "kg",
            WeightUnit::Gram => "g",
            WeightUnit::Pound => "lb",
            WeightUnit::Ounce => "oz",
            WeightUnit::Tonne => "t",
        }
    }

    /// Match a whole token, ignoring ASCII case
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|unit| unit.symbol().eq_ignore_ascii_case(token))
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for WeightUnit {
    type Err = UnitParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s.trim()).ok_or_else(|| UnitParseError(s.to_string()))
    }
}
