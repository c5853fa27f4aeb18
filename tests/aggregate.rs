use brace::aggregate::{aggregate, sort_for_grouping};
use brace::domain::{AggregateRecord, PollutantCode, RegionCode, Sample};
use chrono::NaiveDate;

fn sample(station: &str, day: u32, hour: u32, quantity: f64) -> Sample {
    Sample {
        region: RegionCode(12),
        station: station.to_string(),
        pollutant: PollutantCode(1),
        timestamp: NaiveDate::from_ymd_opt(2020, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap(),
        quantity,
    }
}

fn day(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, day).unwrap()
}

/// Counts maximal runs of adjacent samples sharing a key.
fn run_count(samples: &[Sample]) -> usize {
    samples
        .windows(2)
        .filter(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            (a.region, &a.station, a.pollutant, a.day()) != (b.region, &b.station, b.pollutant, b.day())
        })
        .count()
        + usize::from(!samples.is_empty())
}

#[test]
fn reduces_two_days_of_one_station() {
    let records: Vec<AggregateRecord> = aggregate(vec![
        sample("StationX", 1, 8, 10.0),
        sample("StationX", 1, 9, 20.0),
        sample("StationX", 2, 8, 5.0),
    ])
    .collect();

    assert_eq!(
        records,
        vec![
            AggregateRecord {
                region: RegionCode(12),
                station: "StationX".to_string(),
                pollutant: PollutantCode(1),
                day: day(1),
                maximum: 20.0,
                average: 15.0,
                count: 2,
            },
            AggregateRecord {
                region: RegionCode(12),
                station: "StationX".to_string(),
                pollutant: PollutantCode(1),
                day: day(2),
                maximum: 5.0,
                average: 5.0,
                count: 1,
            },
        ]
    );
}

#[test]
fn output_length_matches_run_count() {
    let fixtures = vec![
        vec![sample("A", 1, 0, 1.0)],
        vec![sample("A", 1, 0, 1.0), sample("A", 1, 1, 2.0), sample("A", 1, 2, 3.0)],
        vec![
            sample("A", 1, 0, 1.0),
            sample("B", 1, 0, 1.0),
            sample("A", 1, 1, 1.0),
            sample("A", 2, 0, 1.0),
            sample("A", 2, 1, 1.0),
        ],
        vec![
            sample("A", 3, 0, 1.0),
            sample("A", 2, 0, 1.0),
            sample("A", 3, 1, 1.0),
        ],
    ];
    for samples in fixtures {
        assert_eq!(aggregate(samples.clone()).count(), run_count(&samples));
    }
}

#[test]
fn maximum_and_average_are_exact() {
    let quantities = [3.5, -1.25, 17.0, 0.0, 8.75];
    let samples: Vec<Sample> = quantities
        .iter()
        .enumerate()
        .map(|(hour, q)| sample("A", 1, hour as u32, *q))
        .collect();

    let records: Vec<AggregateRecord> = aggregate(samples).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].maximum, 17.0);
    let mean = quantities.iter().sum::<f64>() / quantities.len() as f64;
    assert!((records[0].average - mean).abs() < 1e-12);
    assert_eq!(records[0].count, quantities.len());
}

#[test]
fn grouping_follows_arrival_order() {
    let mut samples = vec![
        sample("A", 1, 8, 1.0),
        sample("B", 1, 8, 2.0),
        sample("A", 1, 9, 3.0),
    ];
    assert_eq!(aggregate(samples.clone()).count(), 3);

    samples.swap(1, 2);
    let records: Vec<AggregateRecord> = aggregate(samples).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].maximum, 3.0);
    assert_eq!(records[0].average, 2.0);
}

#[test]
fn sort_for_grouping_is_stable() {
    let mut samples = vec![
        sample("B", 1, 3, 1.0),
        sample("A", 1, 5, 2.0),
        sample("B", 1, 1, 3.0),
        sample("A", 1, 2, 4.0),
    ];
    sort_for_grouping(&mut samples);
    let order: Vec<f64> = samples.iter().map(|s| s.quantity).collect();
    assert_eq!(order, vec![2.0, 4.0, 1.0, 3.0]);
}
