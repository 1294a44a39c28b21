//! Safety limits per metric.

use crate::error::{HazardError, Result};
use crate::readings::{FeedFrame, Metric};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Maximum safe value for every metric. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    limits: BTreeMap<Metric, f64>,
}

impl SafetyLimits {
    /// Build limits from explicit entries. Every metric needs a finite limit.
    pub fn new(entries: impl IntoIterator<Item = (Metric, f64)>) -> Result<Self> {
        let mut limits = BTreeMap::new();
        for (metric, limit) in entries {
            if !limit.is_finite() {
                return Err(HazardError::config_error(format!(
                    "limit for {metric} must be a finite number"
                )));
            }
            if limits.insert(metric, limit).is_some() {
                return Err(HazardError::config_error(format!(
                    "limit for {metric} given twice"
                )));
            }
        }

        let missing: Vec<&str> = Metric::ALL
            .iter()
            .filter(|metric| !limits.contains_key(*metric))
            .map(|metric| metric.name())
            .collect();
        if !missing.is_empty() {
            return Err(HazardError::config_error(format!(
                "missing safety limit(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self { limits })
    }

    pub fn limit(&self, metric: Metric) -> f64 {
        self.limits.get(&metric).copied().unwrap_or(f64::INFINITY)
    }

    /// Metrics whose value is strictly above their limit.
    ///
    /// A frame lacking a value for a limited metric is a configuration
    /// error, never a pass. Callers handle the all-null sentinel first.
    pub fn exceeded(&self, frame: &FeedFrame) -> Result<Vec<Metric>> {
        let mut exceeded = Vec::new();
        for (&metric, &limit) in &self.limits {
            let value = frame.value(metric).ok_or_else(|| {
                HazardError::config_error(format!(
                    "reading has no value for limited metric {metric}"
                ))
            })?;
            if value > limit {
                exceeded.push(metric);
            }
        }
        Ok(exceeded)
    }
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            limits: BTreeMap::from([
                (Metric::Lpg, 1000.0),
                (Metric::Ch4, 1000.0),
                (Metric::Co, 50.0),
                (Metric::Temperature, 50.0),
            ]),
        }
    }
}

impl FromStr for SafetyLimits {
    type Err = HazardError;

    /// Parse `lpg=1000,ch4=1000,co=50,temp=50`.
    fn from_str(s: &str) -> Result<Self> {
        let entries = s
            .split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(|entry| {
                let (name, value) = entry.split_once('=').ok_or_else(|| {
                    HazardError::config_error(format!("limit entry {entry:?} lacks '='"))
                })?;
                let metric: Metric = name.parse()?;
                let limit: f64 = value.trim().parse().map_err(|_| {
                    HazardError::config_error(format!("limit for {metric} is not numeric: {value:?}"))
                })?;
                Ok((metric, limit))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(entries)
    }
}

impl fmt::Display for SafetyLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .limits
            .iter()
            .map(|(metric, limit)| format!("{metric}={limit}"))
            .collect();
        f.write_str(&rendered.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(lpg: f64, ch4: f64, co: f64, temp: f64) -> FeedFrame {
        FeedFrame {
            lpg: Some(lpg),
            ch4: Some(ch4),
            co: Some(co),
            temp: Some(temp),
        }
    }

    #[test]
    fn default_limits_parse_from_default_string() {
        let parsed: SafetyLimits = crate::DEFAULT_SAFE_LIMITS.parse().unwrap();
        assert_eq!(parsed, SafetyLimits::default());
        assert_eq!(parsed.to_string().parse::<SafetyLimits>().unwrap(), parsed);
    }

    #[test]
    fn missing_or_unknown_entries_are_rejected() {
        assert!("lpg=1000,ch4=1000,co=9".parse::<SafetyLimits>().is_err());
        assert!("lpg=1000,ch4=1000,co=9,temp=50,humidity=3"
            .parse::<SafetyLimits>()
            .is_err());
        assert!("lpg=1000,ch4=1000,co=9,temp=hot".parse::<SafetyLimits>().is_err());
        assert!("lpg=1,lpg=2,ch4=1000,co=9,temp=50".parse::<SafetyLimits>().is_err());
    }

    #[test]
    fn hazard_is_strictly_above_limit() {
        let limits = SafetyLimits::default();
        assert!(limits.exceeded(&frame(10.0, 10.0, 50.0, 25.0)).unwrap().is_empty());
        assert_eq!(
            limits.exceeded(&frame(10.0, 10.0, 75.0, 25.0)).unwrap(),
            vec![Metric::Co]
        );
        assert_eq!(
            limits.exceeded(&frame(1500.0, 10.0, 75.0, 51.0)).unwrap(),
            vec![Metric::Lpg, Metric::Co, Metric::Temperature]
        );
    }

    #[test]
    fn missing_value_is_a_configuration_error() {
        let limits = SafetyLimits::default();
        let partial = FeedFrame {
            co: None,
            ..frame(1.0, 1.0, 1.0, 1.0)
        };
        assert!(matches!(
            limits.exceeded(&partial),
            Err(HazardError::Config(_))
        ));
    }
}
