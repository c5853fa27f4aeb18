//! Turns raw CSV rows into validated [`Sample`]s.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;

use crate::domain::{PollutantCode, RegionCode, Sample, ValidationMode};
use crate::error::ValidationError;
use crate::ontology::Ontology;

/// The four text fields of an archive row: station, pollutant formula
/// (possibly empty), `DD-MM-YYYY HH` timestamp and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRow<'a> {
    pub station: &'a str,
    pub pollutant: &'a str,
    pub timestamp: &'a str,
    pub quantity: &'a str,
}

impl<'a> RawRow<'a> {
    pub fn from_record(record: &'a StringRecord) -> Result<Self, ValidationError> {
        if record.len() != 4 {
            return Err(ValidationError::FieldCount {
                found: record.len(),
            });
        }
        Ok(Self {
            station: &record[0],
            pollutant: &record[1],
            timestamp: &record[2],
            quantity: &record[3],
        })
    }
}

/// What the enclosing archive was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowContext {
    pub region: RegionCode,
    pub pollutant: PollutantCode,
}

/// Headerless, comma separated reader over one transcoded archive entry.
pub fn csv_reader(text: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes())
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    ontology: Arc<Ontology>,
    mode: ValidationMode,
}

impl Normalizer {
    pub fn new(ontology: Arc<Ontology>, mode: ValidationMode) -> Self {
        Self { ontology, mode }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn normalize(&self, raw: &RawRow<'_>, context: &RowContext) -> Result<Sample, ValidationError> {
        let station_name = raw.station.trim();
        let station = self
            .ontology
            .station(station_name)
            .map_err(|_| ValidationError::UnknownStation(station_name.to_string()))?;

        let region = self
            .ontology
            .region(context.region.get())
            .map_err(|_| ValidationError::UnknownRegion(context.region.get()))?;
        if station.region != region.code {
            return Err(ValidationError::StationRegionMismatch {
                station: station.name.clone(),
                expected: region.code.get(),
                found: station.region.get(),
            });
        }

        let expected = self
            .ontology
            .pollutant(context.pollutant.get())
            .map_err(|_| ValidationError::UnknownPollutant(context.pollutant.to_string()))?;
        let formula = raw.pollutant.trim();
        let pollutant = if formula.is_empty() {
            expected
        } else {
            let found = self
                .ontology
                .pollutant(formula)
                .map_err(|_| ValidationError::UnknownPollutant(formula.to_string()))?;
            if found.code != expected.code && self.mode == ValidationMode::Strict {
                return Err(ValidationError::PollutantMismatch {
                    expected: expected.formula.clone(),
                    found: found.formula.clone(),
                });
            }
            found
        };

        let timestamp = parse_timestamp(raw.timestamp)?;
        let quantity = parse_quantity(raw.quantity)?;

        Ok(Sample {
            region: region.code,
            station: station.name.clone(),
            pollutant: pollutant.code,
            timestamp,
            quantity,
        })
    }
}

/// Parses `DD-MM-YYYY HH` into a naive timestamp on the hour.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, ValidationError> {
    let bad = || ValidationError::BadTimestamp(text.to_string());
    let mut parts = text.split_whitespace();
    let (Some(date), Some(hour), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(bad());
    };
    let date = NaiveDate::parse_from_str(date, "%d-%m-%Y").map_err(|_| bad())?;
    if hour.is_empty() || hour.len() > 2 || !hour.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(bad());
    }
    let hour: u32 = hour.parse().map_err(|_| bad())?;
    date.and_hms_opt(hour, 0, 0).ok_or_else(bad)
}

/// Negative readings are kept; only non-numeric and non-finite text fails.
pub fn parse_quantity(text: &str) -> Result<f64, ValidationError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ValidationError::BadQuantity(text.to_string()))
}
