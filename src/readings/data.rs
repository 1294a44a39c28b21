//! Data structures for hazard-sensor readings.

use crate::error::{HazardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four metrics reported by the sensor device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Lpg,
    Ch4,
    Co,
    #[serde(rename = "temp")]
    Temperature,
}

impl Metric {
    /// All metrics in the fixed storage order `(LPG, CH4, CO, Temperature)`.
    pub const ALL: [Metric; 4] = [Metric::Lpg, Metric::Ch4, Metric::Co, Metric::Temperature];

    /// Key used in serial frames and in the ingest payload.
    pub fn frame_key(self) -> &'static str {
        match self {
            Metric::Lpg => "LPG",
            Metric::Ch4 => "CH4",
            Metric::Co => "CO",
            Metric::Temperature => "Temperature",
        }
    }

    /// Key used in feed frames and safety limit configuration.
    pub fn name(self) -> &'static str {
        match self {
            Metric::Lpg => "lpg",
            Metric::Ch4 => "ch4",
            Metric::Co => "co",
            Metric::Temperature => "temp",
        }
    }

    /// Look up a metric by its serial frame key (exact match).
    pub fn from_frame_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|metric| metric.frame_key() == key)
    }

    fn index(self) -> usize {
        match self {
            Metric::Lpg => 0,
            Metric::Ch4 => 1,
            Metric::Co => 2,
            Metric::Temperature => 3,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = HazardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lpg" => Ok(Metric::Lpg),
            "ch4" => Ok(Metric::Ch4),
            "co" => Ok(Metric::Co),
            "temp" | "temperature" => Ok(Metric::Temperature),
            other => Err(HazardError::config_error(format!("unknown metric '{other}'"))),
        }
    }
}

/// A stored sensor reading. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Store-assigned identity, strictly increasing
    pub id: u64,
    /// LPG concentration
    pub lpg: f64,
    /// Methane concentration
    pub ch4: f64,
    /// Carbon monoxide concentration
    pub co: f64,
    /// Temperature in Celsius
    pub temperature: f64,
    /// Insert time assigned by the store; `None` for rows written before
    /// the store kept timestamps
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Reading {
    /// Value of a single metric.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Lpg => self.lpg,
            Metric::Ch4 => self.ch4,
            Metric::Co => self.co,
            Metric::Temperature => self.temperature,
        }
    }

    /// Wire representation used by the query and feed endpoints.
    pub fn to_frame(&self) -> FeedFrame {
        FeedFrame::from(self)
    }
}

/// A validated reading that has not been stored yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewReading {
    pub lpg: f64,
    pub ch4: f64,
    pub co: f64,
    pub temperature: f64,
}

impl NewReading {
    /// Build a reading and check that every value is finite.
    pub fn new(lpg: f64, ch4: f64, co: f64, temperature: f64) -> Result<Self> {
        let reading = Self {
            lpg,
            ch4,
            co,
            temperature,
        };
        reading.validate()?;
        Ok(reading)
    }

    /// Build a reading from per-metric slots indexed in storage order.
    ///
    /// Every slot must be filled; missing metrics are reported together.
    pub(crate) fn from_slots(slots: [Option<f64>; 4]) -> Result<Self> {
        let missing: Vec<&str> = Metric::ALL
            .iter()
            .filter(|metric| slots[metric.index()].is_none())
            .map(|metric| metric.frame_key())
            .collect();

        match slots {
            [Some(lpg), Some(ch4), Some(co), Some(temperature)] => {
                Self::new(lpg, ch4, co, temperature)
            }
            _ => Err(HazardError::validation(format!(
                "missing required field(s): {}",
                missing.join(", ")
            ))),
        }
    }

    /// Build a reading from an ingest payload keyed by `LPG`, `CH4`, `CO`
    /// and `Temperature`.
    pub fn from_json(payload: &serde_json::Value) -> Result<Self> {
        let object = payload
            .as_object()
            .ok_or_else(|| HazardError::validation("reading must be a JSON object"))?;

        let mut slots = [None; 4];
        for metric in Metric::ALL {
            match object.get(metric.frame_key()) {
                None | Some(serde_json::Value::Null) => {}
                Some(value) => {
                    let number = value.as_f64().ok_or_else(|| {
                        HazardError::validation(format!(
                            "{} is not numeric: {value}",
                            metric.frame_key()
                        ))
                    })?;
                    slots[metric.index()] = Some(number);
                }
            }
        }

        Self::from_slots(slots)
    }

    /// Check that every metric is a finite number.
    pub fn validate(&self) -> Result<()> {
        for metric in Metric::ALL {
            let value = self.value(metric);
            if !value.is_finite() {
                return Err(HazardError::validation(format!(
                    "{} is not a finite number: {value}",
                    metric.frame_key()
                )));
            }
        }
        Ok(())
    }

    /// Value of a single metric.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Lpg => self.lpg,
            Metric::Ch4 => self.ch4,
            Metric::Co => self.co,
            Metric::Temperature => self.temperature,
        }
    }

    pub(crate) fn slot_index(metric: Metric) -> usize {
        metric.index()
    }
}

/// One feed emission: the latest reading, or the all-null sentinel when the
/// store holds no reading yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedFrame {
    pub lpg: Option<f64>,
    pub ch4: Option<f64>,
    pub co: Option<f64>,
    pub temp: Option<f64>,
}

impl FeedFrame {
    /// The "no data" sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this is the "no data" sentinel.
    pub fn is_empty(&self) -> bool {
        Metric::ALL.iter().all(|metric| self.value(*metric).is_none())
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Lpg => self.lpg,
            Metric::Ch4 => self.ch4,
            Metric::Co => self.co,
            Metric::Temperature => self.temp,
        }
    }
}

impl From<&Reading> for FeedFrame {
    fn from(reading: &Reading) -> Self {
        Self {
            lpg: Some(reading.lpg),
            ch4: Some(reading.ch4),
            co: Some(reading.co),
            temp: Some(reading.temperature),
        }
    }
}

impl From<Option<&Reading>> for FeedFrame {
    fn from(reading: Option<&Reading>) -> Self {
        reading.map(FeedFrame::from).unwrap_or_default()
    }
}
