use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::{aggregate, sort_for_grouping};
use crate::archive::CsvArchive;
use crate::config::WorkUnit;
use crate::domain::{AggregateRecord, RegionCode, Sample};
use crate::error::{BraceError, ValidationError};
use crate::fetch::Fetcher;
use crate::locator::Locator;
use crate::normalize::{Normalizer, RawRow, RowContext, csv_reader};
use crate::ontology::Ontology;
use crate::samples::SampleStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Sort samples by group key before aggregating, so that runs split by
    /// arrival order are merged.
    pub regroup: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedUnit {
    pub pollutant: String,
    pub region: String,
    pub year: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub units_total: usize,
    pub units_ingested: usize,
    pub units_skipped: Vec<SkippedUnit>,
    pub rows_read: usize,
    pub rows_accepted: usize,
    pub rows_dropped: BTreeMap<String, usize>,
    pub aggregates: usize,
    pub elapsed_ms: u128,
}

impl RunReport {
    pub fn rows_dropped_total(&self) -> usize {
        self.rows_dropped.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub report: RunReport,
    pub aggregates: Vec<AggregateRecord>,
    /// Stations that contributed samples, with their region, first-seen order.
    pub stations: Vec<(String, RegionCode)>,
}

#[derive(Debug, Default)]
struct UnitStats {
    rows_read: usize,
    rows_accepted: usize,
    rows_dropped: BTreeMap<&'static str, usize>,
}

pub struct App<F: Fetcher> {
    ontology: Arc<Ontology>,
    locator: Locator<F>,
    normalizer: Normalizer,
}

impl<F: Fetcher> App<F> {
    pub fn new(ontology: Arc<Ontology>, locator: Locator<F>, normalizer: Normalizer) -> Self {
        Self {
            ontology,
            locator,
            normalizer,
        }
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    /// Fetches and ingests every unit, then aggregates the whole store once.
    pub fn run(&self, units: &[WorkUnit], options: RunOptions) -> Result<RunResult, BraceError> {
        let start = Instant::now();
        let mut report = RunReport::default();
        let mut store = SampleStore::new();

        self.ingest(units, &mut store, &mut report)?;

        let stations = store.stations().to_vec();
        info!(samples = store.len(), "aggregating");
        let aggregates: Vec<AggregateRecord> = if options.regroup {
            let mut samples: Vec<Sample> = store.into_iter().collect();
            sort_for_grouping(&mut samples);
            aggregate(samples).collect()
        } else {
            aggregate(store).collect()
        };

        report.aggregates = aggregates.len();
        report.elapsed_ms = start.elapsed().as_millis();
        Ok(RunResult {
            report,
            aggregates,
            stations,
        })
    }

    /// Ingests units one at a time. A failing unit is logged and skipped;
    /// only filesystem errors abort.
    pub fn ingest(
        &self,
        units: &[WorkUnit],
        store: &mut SampleStore,
        report: &mut RunReport,
    ) -> Result<(), BraceError> {
        report.units_total += units.len();
        for unit in units {
            info!(
                pollutant = %unit.pollutant.formula,
                region = %unit.region.name,
                year = unit.year,
                "fetching unit"
            );
            let mut staged = Vec::new();
            match self.ingest_unit(unit, &mut staged) {
                Ok(stats) => {
                    info!(
                        pollutant = %unit.pollutant.formula,
                        region = %unit.region.name,
                        year = unit.year,
                        rows = stats.rows_read,
                        accepted = stats.rows_accepted,
                        "unit ingested"
                    );
                    store.extend(staged);
                    report.units_ingested += 1;
                    report.rows_read += stats.rows_read;
                    report.rows_accepted += stats.rows_accepted;
                    for (kind, count) in stats.rows_dropped {
                        *report.rows_dropped.entry(kind.to_string()).or_default() += count;
                    }
                }
                Err(BraceError::Filesystem(message)) => {
                    return Err(BraceError::Filesystem(message));
                }
                Err(err) => {
                    warn!(
                        pollutant = %unit.pollutant.formula,
                        region = %unit.region.name,
                        year = unit.year,
                        error = %err,
                        "data unavailable, unit skipped"
                    );
                    report.units_skipped.push(SkippedUnit {
                        pollutant: unit.pollutant.formula.clone(),
                        region: unit.region.name.clone(),
                        year: unit.year,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Samples are only staged; the caller commits them when the whole unit
    /// succeeded.
    fn ingest_unit(&self, unit: &WorkUnit, staged: &mut Vec<Sample>) -> Result<UnitStats, BraceError> {
        let buffer = self.locator.locate(&unit.region, &unit.pollutant, unit.year)?;
        if buffer.is_empty() {
            return Err(BraceError::ArchiveCorrupt("empty archive".to_string()));
        }
        let mut archive = CsvArchive::open(buffer)?;
        let context = RowContext {
            region: unit.region.code,
            pollutant: unit.pollutant.code,
        };
        let mut stats = UnitStats::default();

        for index in 0..archive.len() {
            let Some(entry) = archive.entry(index)? else {
                continue;
            };
            info!(entry = %entry.name, "reading entry");
            let mut reader = csv_reader(&entry.text);
            for (row, record) in reader.records().enumerate() {
                let row = row + 1;
                stats.rows_read += 1;
                let outcome = match &record {
                    Ok(record) => RawRow::from_record(record)
                        .and_then(|raw| self.normalizer.normalize(&raw, &context)),
                    Err(err) => {
                        warn!(
                            pollutant = %unit.pollutant.formula,
                            region = %unit.region.name,
                            year = unit.year,
                            entry = %entry.name,
                            row,
                            error = %err,
                            "row dropped: unreadable csv"
                        );
                        *stats.rows_dropped.entry("csv").or_default() += 1;
                        continue;
                    }
                };
                match outcome {
                    Ok(sample) => {
                        stats.rows_accepted += 1;
                        staged.push(sample);
                    }
                    Err(err) => {
                        self.log_drop(unit, &entry.name, row, &err);
                        *stats.rows_dropped.entry(err.kind()).or_default() += 1;
                    }
                }
            }
        }
        Ok(stats)
    }

    fn log_drop(&self, unit: &WorkUnit, entry: &str, row: usize, err: &ValidationError) {
        warn!(
            pollutant = %unit.pollutant.formula,
            region = %unit.region.name,
            year = unit.year,
            entry,
            row,
            reason = err.kind(),
            error = %err,
            "row dropped"
        );
    }
}
