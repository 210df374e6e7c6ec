//! Subscription tiers and the shared alert vocabulary.
//!
//! Tiers gate both *when* updates are released (wall-clock cadence) and
//! *what* fields a payload carries (open-interest redaction for free).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Subscription tier controlling update cadence and field visibility.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Elite,
}

impl Tier {
    pub const ALL: [Self; 3] = [Self::Free, Self::Pro, Self::Elite];

    /// Wall-clock release period for this tier. `None` means the tier is
    /// ungated and streams continuously.
    #[must_use]
    pub const fn release_period(self) -> Option<Duration> {
        match self {
            Self::Free => Some(Duration::from_secs(15 * 60)),
            Self::Pro => Some(Duration::from_secs(5 * 60)),
            Self::Elite => None,
        }
    }

    /// Whether open-interest fields are replaced with a placeholder for
    /// this tier. A product gate, not a security boundary.
    #[must_use]
    pub const fn redacts_open_interest(self) -> bool {
        matches!(self, Self::Free)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Elite => "elite",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "elite" => Ok(Self::Elite),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Metric a user alert watches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    PriceCross,
    FundingCross,
    OiCross,
}

impl AlertKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PriceCross => "PRICE_CROSS",
            Self::FundingCross => "FUNDING_CROSS",
            Self::OiCross => "OI_CROSS",
        }
    }
}

/// Which threshold crossings fire a user alert.
///
/// The upstream product never settled on one interpretation, so it is a
/// per-alert setting rather than a global constant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrossDirection {
    /// Fire on a crossing in either direction.
    #[default]
    Any,
    /// Fire only when the metric crosses upward through the threshold.
    Up,
    /// Fire only when the metric crosses downward through the threshold.
    Down,
}

/// How a triggered user alert is delivered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    #[default]
    Dashboard,
    Email,
    Both,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_periods_match_tier_cadence() {
        assert_eq!(
            Tier::Free.release_period(),
            Some(Duration::from_secs(900))
        );
        assert_eq!(Tier::Pro.release_period(), Some(Duration::from_secs(300)));
        assert_eq!(Tier::Elite.release_period(), None);
    }

    #[test]
    fn only_free_redacts_open_interest() {
        assert!(Tier::Free.redacts_open_interest());
        assert!(!Tier::Pro.redacts_open_interest());
        assert!(!Tier::Elite.redacts_open_interest());
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Elite".parse::<Tier>().unwrap(), Tier::Elite);
        assert_eq!("free".parse::<Tier>().unwrap(), Tier::Free);
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn alert_kind_serializes_to_wire_names() {
        let json = serde_json::to_string(&AlertKind::FundingCross).unwrap();
        assert_eq!(json, "\"FUNDING_CROSS\"");
        let kind: AlertKind = serde_json::from_str("\"PRICE_CROSS\"").unwrap();
        assert_eq!(kind, AlertKind::PriceCross);
    }
}
