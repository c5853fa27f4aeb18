use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Pollutant,
    Region,
    Station,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Pollutant => write!(f, "pollutant"),
            EntityKind::Region => write!(f, "region"),
            EntityKind::Station => write!(f, "station"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PollutantCode(pub u32);

impl PollutantCode {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PollutantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionCode(pub u32);

impl RegionCode {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pollutant {
    pub code: PollutantCode,
    pub formula: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub code: RegionCode,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub region: RegionCode,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Lookup key accepted by the ontology: either a numeric code or any of
/// the textual keys of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identifier<'a> {
    Code(u32),
    Text(&'a str),
}

impl fmt::Display for Identifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Code(code) => write!(f, "{code}"),
            Identifier::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<u32> for Identifier<'_> {
    fn from(value: u32) -> Self {
        Identifier::Code(value)
    }
}

impl<'a> From<&'a str> for Identifier<'a> {
    fn from(value: &'a str) -> Self {
        Identifier::Text(value)
    }
}

impl<'a> From<&'a String> for Identifier<'a> {
    fn from(value: &'a String) -> Self {
        Identifier::Text(value.as_str())
    }
}

/// Canonical code returned by a successful ontology resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityCode {
    Pollutant(PollutantCode),
    Region(RegionCode),
    Station(String),
}

/// A validated hourly measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub region: RegionCode,
    pub station: String,
    pub pollutant: PollutantCode,
    pub timestamp: NaiveDateTime,
    pub quantity: f64,
}

impl Sample {
    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Daily reduction of one run of samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRecord {
    pub region: RegionCode,
    pub station: String,
    pub pollutant: PollutantCode,
    pub day: NaiveDate,
    pub maximum: f64,
    pub average: f64,
    pub count: usize,
}

/// How the normalizer treats a row whose pollutant differs from the one
/// its archive was requested for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Keep the row, using its own pollutant.
    #[default]
    Lenient,
    /// Drop the row as a `PollutantMismatch`.
    Strict,
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::Lenient => write!(f, "lenient"),
            ValidationMode::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_day_drops_hour() {
        let sample = Sample {
            region: RegionCode(12),
            station: "Roma - Villa Ada".to_string(),
            pollutant: PollutantCode(1),
            timestamp: NaiveDate::from_ymd_opt(2010, 3, 4)
                .unwrap()
                .and_hms_opt(23, 0, 0)
                .unwrap(),
            quantity: 4.5,
        };
        assert_eq!(sample.day(), NaiveDate::from_ymd_opt(2010, 3, 4).unwrap());
    }

    #[test]
    fn identifier_conversions() {
        assert_eq!(Identifier::from(8u32), Identifier::Code(8));
        assert_eq!(Identifier::from("no2"), Identifier::Text("no2"));
        assert_eq!(Identifier::Text("O3").to_string(), "O3");
    }

    #[test]
    fn validation_mode_defaults_to_lenient() {
        assert_eq!(ValidationMode::default(), ValidationMode::Lenient);
        assert_eq!(ValidationMode::Strict.to_string(), "strict");
    }
}
