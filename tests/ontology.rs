use assert_matches::assert_matches;
use brace::domain::{EntityCode, EntityKind, PollutantCode, RegionCode, Station};
use brace::error::BraceError;
use brace::ontology::{Entity, Ontology};

#[test]
fn pollutant_keys_resolve_to_same_code() {
    let ontology = Ontology::builtin();
    let expected = EntityCode::Pollutant(PollutantCode(1));

    assert_eq!(ontology.resolve(EntityKind::Pollutant, "so2").unwrap(), expected);
    assert_eq!(ontology.resolve(EntityKind::Pollutant, "SO2").unwrap(), expected);
    assert_eq!(ontology.resolve(EntityKind::Pollutant, 1u32).unwrap(), expected);
    assert_eq!(
        ontology.resolve(EntityKind::Pollutant, "sulfur dioxide").unwrap(),
        expected
    );
}

#[test]
fn unknown_identifiers_fail_without_panicking() {
    let ontology = Ontology::builtin();
    let err = ontology.resolve(EntityKind::Region, "Atlantide").unwrap_err();
    assert_matches!(
        err,
        BraceError::NotFound {
            kind: EntityKind::Region,
            ..
        }
    );
    assert!(!ontology.contains(EntityKind::Pollutant, 4242u32));
    assert!(!ontology.contains(EntityKind::Station, ""));
    assert!(ontology.contains(EntityKind::Region, "PIEMONTE"));
}

#[test]
fn enumerates_every_kind() {
    let ontology = Ontology::builtin()
        .with_stations(vec![Station {
            region: RegionCode(15),
            name: "Napoli - Museo".to_string(),
            latitude: 40.85,
            longitude: 14.25,
        }])
        .unwrap();

    assert_eq!(ontology.all(EntityKind::Pollutant).len(), 10);
    assert_eq!(ontology.all(EntityKind::Region).len(), 21);
    let stations = ontology.all(EntityKind::Station);
    assert_eq!(stations.len(), 1);
    assert_matches!(stations[0], Entity::Station(station) if station.region == RegionCode(15));
    assert_eq!(
        ontology.resolve(EntityKind::Station, "napoli - museo").unwrap(),
        EntityCode::Station("Napoli - Museo".to_string())
    );
}
