use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Backoff, Pollutant, Region, Station, ValidationMode};
use crate::error::BraceError;
use crate::fetch::{DEFAULT_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT, RetryPolicy};
use crate::locator::DEFAULT_BASE_URL;
use crate::ontology::Ontology;

pub const CONFIG_FILE: &str = "brace.json";
pub const FIRST_YEAR: i32 = 2002;
pub const LAST_YEAR: i32 = 2011;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub from_year: Option<i32>,
    #[serde(default)]
    pub to_year: Option<i32>,
    #[serde(default)]
    pub pollutants: Vec<EntityRef>,
    #[serde(default)]
    pub regions: Vec<EntityRef>,
    #[serde(default)]
    pub validation: Option<ValidationMode>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub stations: Vec<StationEntry>,
}

/// A pollutant or region given either by code or by name.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EntityRef {
    Code(u32),
    Name(String),
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub delay_secs: Option<u64>,
    #[serde(default)]
    pub backoff: Option<Backoff>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StationEntry {
    pub region: EntityRef,
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub from_year: Option<i32>,
    pub to_year: Option<i32>,
    pub pollutants: Vec<String>,
    pub regions: Vec<String>,
    pub validation: Option<ValidationMode>,
}

#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub pollutant: Pollutant,
    pub region: Region,
    pub year: i32,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub from_year: i32,
    pub to_year: i32,
    pub pollutants: Vec<Pollutant>,
    pub regions: Vec<Region>,
    pub validation: ValidationMode,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub ontology: Arc<Ontology>,
}

impl ResolvedConfig {
    /// Units of work in pollutant, region, year order.
    pub fn plan(&self) -> Vec<WorkUnit> {
        let mut units = Vec::new();
        for pollutant in &self.pollutants {
            for region in &self.regions {
                for year in self.from_year..=self.to_year {
                    units.push(WorkUnit {
                        pollutant: pollutant.clone(),
                        region: region.clone(),
                        year,
                    });
                }
            }
        }
        units
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file. Without an explicit path, `brace.json` in the
    /// working directory is used and must exist unless `optional` is set.
    pub fn load(path: Option<&str>, optional: bool) -> Result<Config, BraceError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            if optional {
                return Ok(Config::default());
            }
            return Err(BraceError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BraceError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| BraceError::ConfigParse(err.to_string()))
    }

    pub fn resolve(
        path: Option<&str>,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, BraceError> {
        let config = Self::load(path, false)?;
        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: Overrides,
    ) -> Result<ResolvedConfig, BraceError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let ontology = Arc::new(Self::ontology(&config)?);

        let from_year = overrides.from_year.or(config.from_year).unwrap_or(FIRST_YEAR);
        let to_year = overrides.to_year.or(config.to_year).unwrap_or(LAST_YEAR);
        if from_year > to_year || from_year < FIRST_YEAR || to_year > LAST_YEAR {
            return Err(BraceError::InvalidYearRange {
                from: from_year,
                to: to_year,
            });
        }

        let pollutant_refs = pick(overrides.pollutants, config.pollutants);
        let mut pollutants: Vec<Pollutant> = Vec::new();
        for reference in &pollutant_refs {
            let pollutant = match reference {
                EntityRef::Code(code) => ontology.pollutant(*code)?,
                EntityRef::Name(name) => ontology.pollutant(name)?,
            };
            if !pollutants.iter().any(|p| p.code == pollutant.code) {
                pollutants.push(pollutant.clone());
            }
        }
        if pollutants.is_empty() {
            pollutants = ontology.pollutants().to_vec();
        }

        let region_refs = pick(overrides.regions, config.regions);
        let mut regions: Vec<Region> = Vec::new();
        for reference in &region_refs {
            let region = match reference {
                EntityRef::Code(code) => ontology.region(*code)?,
                EntityRef::Name(name) => ontology.region(name)?,
            };
            if !regions.iter().any(|r| r.code == region.code) {
                regions.push(region.clone());
            }
        }
        if regions.is_empty() {
            regions = ontology.regions().to_vec();
        }

        let retry_config = config.retry.unwrap_or_default();
        let retry = RetryPolicy {
            max_attempts: retry_config.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            delay: retry_config
                .delay_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_DELAY),
            backoff: retry_config.backoff.unwrap_or_default(),
        };
        let timeout = retry_config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(ResolvedConfig {
            schema_version,
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            from_year,
            to_year,
            pollutants,
            regions,
            validation: overrides
                .validation
                .or(config.validation)
                .unwrap_or_default(),
            retry,
            timeout,
            ontology,
        })
    }

    /// Built-in tables plus the stations declared in the config.
    pub fn ontology(config: &Config) -> Result<Ontology, BraceError> {
        let base = Ontology::builtin();
        let mut stations = Vec::with_capacity(config.stations.len());
        for entry in &config.stations {
            let region = match &entry.region {
                EntityRef::Code(code) => base.region(*code)?,
                EntityRef::Name(name) => base.region(name)?,
            };
            stations.push(Station {
                region: region.code,
                name: entry.name.trim().to_string(),
                latitude: entry.latitude,
                longitude: entry.longitude,
            });
        }
        base.with_stations(stations)
    }
}

fn pick(cli: Vec<String>, file: Vec<EntityRef>) -> Vec<EntityRef> {
    if cli.is_empty() {
        file
    } else {
        cli.into_iter().map(EntityRef::Name).collect()
    }
}
