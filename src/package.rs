//! Writes the results of a run as a self-describing dataset: a ZIP holding
//! CSV tables plus a DSPL descriptor (`dataset.xml`) tying them together.

use std::fs;
use std::io::{Seek, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::domain::{AggregateRecord, Pollutant, RegionCode};
use crate::error::BraceError;
use crate::ontology::Ontology;

pub const DESCRIPTOR: &str = "dataset.xml";
pub const REGIONS_TABLE: &str = "regions.csv";
pub const STATIONS_TABLE: &str = "stations.csv";

/// Everything the packager needs from a finished run.
pub struct Dataset<'a> {
    pub ontology: &'a Ontology,
    pub pollutants: &'a [Pollutant],
    pub aggregates: &'a [AggregateRecord],
    pub stations: &'a [(String, RegionCode)],
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageSummary {
    pub path: Utf8PathBuf,
    pub entries: Vec<String>,
}

pub fn pollutant_table(pollutant: &Pollutant) -> String {
    format!("{}.csv", pollutant.formula)
}

/// Writes the package next to `path` and renames it into place, so a
/// failed run never leaves a truncated archive behind.
pub fn write_package(path: &Utf8Path, dataset: &Dataset<'_>) -> Result<PackageSummary, BraceError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| BraceError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".brace-package")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| BraceError::Filesystem(err.to_string()))?;

    let entries = build_package(&mut temp, dataset)?;
    temp.persist(path.as_std_path())
        .map_err(|err| BraceError::Filesystem(err.to_string()))?;

    info!(path = %path, entries = entries.len(), "package written");
    Ok(PackageSummary {
        path: path.to_path_buf(),
        entries,
    })
}

/// Streams every table and the descriptor into `writer`. Returns entry
/// names in the order they were written.
pub fn build_package<W: Write + Seek>(
    writer: W,
    dataset: &Dataset<'_>,
) -> Result<Vec<String>, BraceError> {
    let mut zip = ZipWriter::new(writer);
    let mut entries = Vec::new();

    let mut add = |name: String, body: Vec<u8>| -> Result<(), BraceError> {
        zip.start_file(name.as_str(), SimpleFileOptions::default())
            .map_err(|err| BraceError::Filesystem(format!("{name}: {err}")))?;
        zip.write_all(&body)
            .map_err(|err| BraceError::Filesystem(format!("{name}: {err}")))?;
        entries.push(name);
        Ok(())
    };

    let pollutants = packaged_pollutants(dataset);
    add(DESCRIPTOR.to_string(), descriptor(&pollutants).into_bytes())?;
    add(REGIONS_TABLE.to_string(), regions_csv(dataset.ontology)?)?;
    add(STATIONS_TABLE.to_string(), stations_csv(dataset)?)?;
    for pollutant in &pollutants {
        add(
            pollutant_table(pollutant),
            aggregates_csv(pollutant, dataset.aggregates)?,
        )?;
    }

    zip.finish()
        .map_err(|err| BraceError::Filesystem(err.to_string()))?;
    Ok(entries)
}

/// Requested pollutants first, then any other pollutant that appears in the
/// aggregates (lenient runs keep a row's own pollutant), in first-seen order.
fn packaged_pollutants(dataset: &Dataset<'_>) -> Vec<Pollutant> {
    let mut pollutants = dataset.pollutants.to_vec();
    for record in dataset.aggregates {
        if pollutants.iter().any(|p| p.code == record.pollutant) {
            continue;
        }
        match dataset.ontology.pollutant(record.pollutant.get()) {
            Ok(pollutant) => {
                info!(pollutant = %pollutant.formula, "packaging unrequested pollutant");
                pollutants.push(pollutant.clone());
            }
            Err(_) => warn!(pollutant = %record.pollutant, "aggregates for unknown pollutant not packaged"),
        }
    }
    pollutants
}

fn csv_error(err: impl std::fmt::Display) -> BraceError {
    BraceError::Filesystem(format!("csv: {err}"))
}

fn into_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, BraceError> {
    writer.into_inner().map_err(|err| csv_error(err.error()))
}

fn regions_csv(ontology: &Ontology) -> Result<Vec<u8>, BraceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["region", "name", "latitude", "longitude"])
        .map_err(csv_error)?;
    for region in ontology.regions() {
        writer
            .write_record([
                region.code.to_string(),
                region.name.clone(),
                region.latitude.to_string(),
                region.longitude.to_string(),
            ])
            .map_err(csv_error)?;
    }
    into_bytes(writer)
}

// Stations with no coordinates of their own are placed at their region's capital.
fn stations_csv(dataset: &Dataset<'_>) -> Result<Vec<u8>, BraceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["station", "region", "latitude", "longitude"])
        .map_err(csv_error)?;
    for (name, region) in dataset.stations {
        let (latitude, longitude) = match dataset.ontology.station(name) {
            Ok(station) if station.latitude != 0.0 || station.longitude != 0.0 => {
                (station.latitude, station.longitude)
            }
            _ => dataset
                .ontology
                .region(region.get())
                .map(|region| (region.latitude, region.longitude))
                .unwrap_or_default(),
        };
        writer
            .write_record([
                name.clone(),
                region.to_string(),
                latitude.to_string(),
                longitude.to_string(),
            ])
            .map_err(csv_error)?;
    }
    into_bytes(writer)
}

fn aggregates_csv(pollutant: &Pollutant, aggregates: &[AggregateRecord]) -> Result<Vec<u8>, BraceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["region", "station", "day", "max", "average", "count"])
        .map_err(csv_error)?;
    for record in aggregates.iter().filter(|r| r.pollutant == pollutant.code) {
        writer
            .write_record([
                record.region.to_string(),
                record.station.clone(),
                record.day.format("%Y-%m-%d").to_string(),
                record.maximum.to_string(),
                record.average.to_string(),
                record.count.to_string(),
            ])
            .map_err(csv_error)?;
    }
    into_bytes(writer)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn descriptor(pollutants: &[Pollutant]) -> String {
    let mut concepts = String::new();
    let mut tables = String::new();

    for pollutant in pollutants {
        let id = escape(&pollutant.formula);
        concepts.push_str(&format!(
            r#"    <concept id="{id}">
      <info>
        <name><value>{name}</value></name>
      </info>
      <type ref="float"/>
    </concept>
"#,
            name = escape(&pollutant.name),
        ));
        tables.push_str(&format!(
            r#"    <table id="{id}_table">
      <column id="region" type="string"/>
      <column id="station" type="string"/>
      <column id="day" type="date" format="yyyy-MM-dd"/>
      <column id="max" type="float"/>
      <column id="average" type="float"/>
      <column id="count" type="integer"/>
      <data><file format="csv" encoding="utf-8">{file}</file></data>
    </table>
"#,
            file = escape(&pollutant_table(pollutant)),
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<dspl xmlns="http://schemas.google.com/dspl/2010"
    xmlns:time="http://www.google.com/publicdata/dataset/google/time"
    xmlns:geo="http://www.google.com/publicdata/dataset/google/geo">
  <import namespace="http://www.google.com/publicdata/dataset/google/time"/>
  <import namespace="http://www.google.com/publicdata/dataset/google/geo"/>
  <info>
    <name><value>Air quality in Italian regions</value></name>
    <description><value>Daily maximum and average of hourly pollutant measurements per station</value></description>
  </info>
  <provider>
    <name><value>BRACE database</value></name>
  </provider>
  <concepts>
    <concept id="region" extends="geo:location">
      <info>
        <name><value>Regions</value></name>
      </info>
      <type ref="string"/>
      <property id="name">
        <info><name><value>Name</value></name></info>
        <type ref="string"/>
      </property>
      <table ref="regions_table"/>
    </concept>
{concepts}  </concepts>
  <tables>
    <table id="regions_table">
      <column id="region" type="string"/>
      <column id="name" type="string"/>
      <column id="latitude" type="float"/>
      <column id="longitude" type="float"/>
      <data><file format="csv" encoding="utf-8">{REGIONS_TABLE}</file></data>
    </table>
    <table id="stations_table">
      <column id="station" type="string"/>
      <column id="region" type="string"/>
      <column id="latitude" type="float"/>
      <column id="longitude" type="float"/>
      <data><file format="csv" encoding="utf-8">{STATIONS_TABLE}</file></data>
    </table>
{tables}  </tables>
</dspl>
"#
    )
}
