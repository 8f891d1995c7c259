use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::analysis::SourceId;

/// Entity a correction patch applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CorrectionTarget {
    Customer,
    Line(usize),
    Delivery,
}

impl fmt::Display for CorrectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => f.write_str("customer"),
            Self::Line(index) => write!(f, "line:{index}"),
            Self::Delivery => f.write_str("delivery"),
        }
    }
}

impl FromStr for CorrectionTarget {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "customer" => Ok(Self::Customer),
            "delivery" => Ok(Self::Delivery),
            other => {
                let index = other
                    .strip_prefix("line:")
                    .or_else(|| other.strip_prefix("line="))
                    .ok_or_else(|| {
                        format!("unknown correction target `{other}` (expected customer|line:N|delivery)")
                    })?;
                index
                    .parse::<usize>()
                    .map(Self::Line)
                    .map_err(|_| format!("invalid line index `{index}` in correction target"))
            }
        }
    }
}

impl Serialize for CorrectionTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CorrectionTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Sparse field patch; an absent key means "keep the machine value".
pub type CorrectionPatch = BTreeMap<String, serde_json::Value>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionOverlay {
    pub source_id: SourceId,
    pub target: CorrectionTarget,
    pub patch: CorrectionPatch,
    pub author: String,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of a manual unit price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceCorrection {
    pub id: String,
    pub source_id: SourceId,
    pub line_index: usize,
    pub unit_price: Decimal,
    pub author: String,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::CorrectionTarget;

    #[test]
    fn targets_round_trip_through_display() {
        for target in [CorrectionTarget::Customer, CorrectionTarget::Line(4), CorrectionTarget::Delivery]
        {
            assert_eq!(target.to_string().parse::<CorrectionTarget>(), Ok(target));
        }
    }

    #[test]
    fn malformed_targets_are_rejected() {
        assert!("line:x".parse::<CorrectionTarget>().is_err());
        assert!("shipping".parse::<CorrectionTarget>().is_err());
    }
}
