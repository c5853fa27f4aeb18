//! Read-only reference tables for pollutants, regions and stations.
//!
//! The tables are fixed once an [`Ontology`] is built; components receive
//! it behind an `Arc` instead of reaching for global state.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::domain::{
    EntityCode, EntityKind, Identifier, Pollutant, PollutantCode, Region, RegionCode, Station,
};
use crate::error::BraceError;

const POLLUTANTS: &[(u32, &str, &str)] = &[
    (1, "SO2", "Sulfur Dioxide"),
    (8, "NO2", "Nitrogen Dioxide"),
    (9, "NOx", "Nitrogen Oxides"),
    (38, "NO", "Nitrogen Oxide"),
    (7, "O3", "Ozone"),
    (10, "CO", "Carbon Oxide"),
    (5, "PM10", "Particulates < 10 μm"),
    (6001, "PM25", "Particulates < 2.5 μm"),
    (4, "PTS", "Particulates"),
    (20, "C6H6", "Benzene"),
];

// Coordinates are those of each region's capital.
const REGIONS: &[(u32, &str, f64, f64)] = &[
    (13, "Abruzzo", 42.350, 13.400),
    (21, "Alto Adige", 46.498, 11.354),
    (17, "Basilicata", 40.640, 15.805),
    (18, "Calabria", 38.910, 16.587),
    (15, "Campania", 40.852, 14.268),
    (8, "Emilia Romagna", 44.494, 11.343),
    (6, "Friuli Venezia Giulia", 45.650, 13.777),
    (12, "Lazio", 41.903, 12.496),
    (7, "Liguria", 44.407, 8.934),
    (3, "Lombardia", 45.464, 9.190),
    (11, "Marche", 43.617, 13.519),
    (14, "Molise", 41.561, 14.668),
    (1, "Piemonte", 45.070, 7.687),
    (16, "Puglia", 41.117, 16.872),
    (20, "Sardegna", 39.224, 9.122),
    (19, "Sicilia", 38.116, 13.361),
    (9, "Toscana", 43.770, 11.256),
    (4, "Trentino", 46.068, 11.121),
    (10, "Umbria", 43.112, 12.389),
    (2, "Valle d'Aosta", 45.737, 7.320),
    (5, "Veneto", 45.441, 12.316),
];

/// Borrowed view of one entity, as returned by [`Ontology::all`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Entity<'a> {
    Pollutant(&'a Pollutant),
    Region(&'a Region),
    Station(&'a Station),
}

#[derive(Debug, Clone)]
pub struct Ontology {
    pollutants: Vec<Pollutant>,
    regions: Vec<Region>,
    stations: Vec<Station>,
    station_index: HashMap<String, usize>,
}

impl Ontology {
    /// Pollutant and region tables as published by the portal, with an
    /// empty station table.
    pub fn builtin() -> Self {
        let pollutants = POLLUTANTS
            .iter()
            .map(|(code, formula, name)| Pollutant {
                code: PollutantCode(*code),
                formula: formula.to_string(),
                name: name.to_string(),
            })
            .collect();
        let regions = REGIONS
            .iter()
            .map(|(code, name, latitude, longitude)| Region {
                code: RegionCode(*code),
                name: name.to_string(),
                latitude: *latitude,
                longitude: *longitude,
            })
            .collect();
        Self::new(pollutants, regions)
    }

    pub fn new(pollutants: Vec<Pollutant>, regions: Vec<Region>) -> Self {
        Self {
            pollutants,
            regions,
            stations: Vec::new(),
            station_index: HashMap::new(),
        }
    }

    /// Registers the station table. Every station must belong to a known
    /// region; a repeated name keeps its first definition.
    pub fn with_stations(mut self, stations: Vec<Station>) -> Result<Self, BraceError> {
        for station in stations {
            if self.find_region(Identifier::Code(station.region.get())).is_none() {
                return Err(BraceError::NotFound {
                    kind: EntityKind::Region,
                    identifier: station.region.to_string(),
                });
            }
            let key = fold(station.name.trim());
            if self.station_index.contains_key(&key) {
                warn!(station = %station.name, "duplicate station definition ignored");
                continue;
            }
            self.station_index.insert(key, self.stations.len());
            self.stations.push(station);
        }
        Ok(self)
    }

    pub fn pollutants(&self) -> &[Pollutant] {
        &self.pollutants
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn pollutant<'a>(&self, ident: impl Into<Identifier<'a>>) -> Result<&Pollutant, BraceError> {
        let ident = ident.into();
        self.find_pollutant(ident)
            .ok_or_else(|| not_found(EntityKind::Pollutant, ident))
    }

    pub fn region<'a>(&self, ident: impl Into<Identifier<'a>>) -> Result<&Region, BraceError> {
        let ident = ident.into();
        self.find_region(ident)
            .ok_or_else(|| not_found(EntityKind::Region, ident))
    }

    pub fn station<'a>(&self, ident: impl Into<Identifier<'a>>) -> Result<&Station, BraceError> {
        let ident = ident.into();
        self.find_station(ident)
            .ok_or_else(|| not_found(EntityKind::Station, ident))
    }

    /// Resolves any identifier of an entity to its canonical code. Stations
    /// resolve to their registered name.
    pub fn resolve<'a>(
        &self,
        kind: EntityKind,
        ident: impl Into<Identifier<'a>>,
    ) -> Result<EntityCode, BraceError> {
        let ident = ident.into();
        match kind {
            EntityKind::Pollutant => self.pollutant(ident).map(|p| EntityCode::Pollutant(p.code)),
            EntityKind::Region => self.region(ident).map(|r| EntityCode::Region(r.code)),
            EntityKind::Station => self
                .station(ident)
                .map(|s| EntityCode::Station(s.name.clone())),
        }
    }

    pub fn contains<'a>(&self, kind: EntityKind, ident: impl Into<Identifier<'a>>) -> bool {
        let ident = ident.into();
        match kind {
            EntityKind::Pollutant => self.find_pollutant(ident).is_some(),
            EntityKind::Region => self.find_region(ident).is_some(),
            EntityKind::Station => self.find_station(ident).is_some(),
        }
    }

    pub fn all(&self, kind: EntityKind) -> Vec<Entity<'_>> {
        match kind {
            EntityKind::Pollutant => self.pollutants.iter().map(Entity::Pollutant).collect(),
            EntityKind::Region => self.regions.iter().map(Entity::Region).collect(),
            EntityKind::Station => self.stations.iter().map(Entity::Station).collect(),
        }
    }

    fn find_pollutant(&self, ident: Identifier<'_>) -> Option<&Pollutant> {
        if let Some(code) = as_code(ident) {
            if let Some(found) = self.pollutants.iter().find(|p| p.code.get() == code) {
                return Some(found);
            }
        }
        let Identifier::Text(text) = ident else {
            return None;
        };
        let text = text.trim();
        self.pollutants
            .iter()
            .find(|p| same_key(&p.formula, text) || same_key(&p.name, text))
    }

    fn find_region(&self, ident: Identifier<'_>) -> Option<&Region> {
        if let Some(code) = as_code(ident) {
            if let Some(found) = self.regions.iter().find(|r| r.code.get() == code) {
                return Some(found);
            }
        }
        let Identifier::Text(text) = ident else {
            return None;
        };
        let text = text.trim();
        self.regions.iter().find(|r| same_key(&r.name, text))
    }

    fn find_station(&self, ident: Identifier<'_>) -> Option<&Station> {
        let Identifier::Text(text) = ident else {
            return None;
        };
        self.station_index
            .get(&fold(text.trim()))
            .map(|index| &self.stations[*index])
    }
}

fn as_code(ident: Identifier<'_>) -> Option<u32> {
    match ident {
        Identifier::Code(code) => Some(code),
        Identifier::Text(text) => text.trim().parse().ok(),
    }
}

fn fold(value: &str) -> String {
    value.to_lowercase()
}

fn same_key(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

fn not_found(kind: EntityKind, ident: Identifier<'_>) -> BraceError {
    BraceError::NotFound {
        kind,
        identifier: ident.to_string(),
    }
}
