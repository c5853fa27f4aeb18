//! Daily reduction of hourly samples.
//!
//! Grouping is by adjacency only: a group is a maximal run of consecutive
//! samples sharing (region, station, pollutant, day). Samples with the same
//! key that are not adjacent produce separate records. Use
//! [`sort_for_grouping`] first when input order cannot be trusted.

use std::mem;

use chrono::NaiveDate;

use crate::domain::{AggregateRecord, PollutantCode, RegionCode, Sample};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub region: RegionCode,
    pub station: String,
    pub pollutant: PollutantCode,
    pub day: NaiveDate,
}

impl GroupKey {
    pub fn of(sample: &Sample) -> Self {
        Self {
            region: sample.region,
            station: sample.station.clone(),
            pollutant: sample.pollutant,
            day: sample.day(),
        }
    }

    fn matches(&self, sample: &Sample) -> bool {
        self.region == sample.region
            && self.pollutant == sample.pollutant
            && self.day == sample.day()
            && self.station == sample.station
    }
}

#[derive(Debug)]
struct OpenGroup {
    key: GroupKey,
    maximum: f64,
    sum: f64,
    count: usize,
}

impl OpenGroup {
    fn start(sample: Sample) -> Self {
        let quantity = sample.quantity;
        let day = sample.day();
        Self {
            key: GroupKey {
                region: sample.region,
                station: sample.station,
                pollutant: sample.pollutant,
                day,
            },
            maximum: quantity,
            sum: quantity,
            count: 1,
        }
    }

    fn push(&mut self, quantity: f64) {
        self.maximum = self.maximum.max(quantity);
        self.sum += quantity;
        self.count += 1;
    }

    fn close(self) -> AggregateRecord {
        AggregateRecord {
            region: self.key.region,
            station: self.key.station,
            pollutant: self.key.pollutant,
            day: self.key.day,
            maximum: self.maximum,
            average: self.sum / self.count as f64,
            count: self.count,
        }
    }
}

#[derive(Debug)]
enum State {
    NoOpenGroup,
    Open(OpenGroup),
    Done,
}

/// Streaming group-by over an ordered sample sequence. Pulls each input
/// sample exactly once and emits a record whenever a run ends, including
/// the run still open when the input is exhausted.
#[derive(Debug)]
pub struct Aggregator<I> {
    input: I,
    state: State,
}

impl<I: Iterator<Item = Sample>> Aggregator<I> {
    pub fn new(input: I) -> Self {
        Self {
            input,
            state: State::NoOpenGroup,
        }
    }
}

impl<I: Iterator<Item = Sample>> Iterator for Aggregator<I> {
    type Item = AggregateRecord;

    fn next(&mut self) -> Option<AggregateRecord> {
        loop {
            match mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::NoOpenGroup => match self.input.next() {
                    Some(sample) => self.state = State::Open(OpenGroup::start(sample)),
                    None => return None,
                },
                State::Open(mut group) => match self.input.next() {
                    Some(sample) if group.key.matches(&sample) => {
                        group.push(sample.quantity);
                        self.state = State::Open(group);
                    }
                    Some(sample) => {
                        self.state = State::Open(OpenGroup::start(sample));
                        return Some(group.close());
                    }
                    // terminal flush; state stays Done
                    None => return Some(group.close()),
                },
            }
        }
    }
}

impl<I: Iterator<Item = Sample>> std::iter::FusedIterator for Aggregator<I> {}

pub fn aggregate<I>(samples: I) -> Aggregator<I::IntoIter>
where
    I: IntoIterator<Item = Sample>,
{
    Aggregator::new(samples.into_iter())
}

/// Stable sort by group key, making grouping independent of arrival order.
pub fn sort_for_grouping(samples: &mut [Sample]) {
    samples.sort_by(|a, b| {
        (a.region, &a.station, a.pollutant, a.day()).cmp(&(b.region, &b.station, b.pollutant, b.day()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn empty_input_yields_nothing() {
        let mut records = aggregate(Vec::<Sample>::new());
        assert_eq!(records.next(), None);
        assert_eq!(records.next(), None);
    }

    #[test]
    fn single_sample_is_flushed() {
        let records: Vec<_> = aggregate(vec![sample("X", 1, 8, 7.25)]).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].maximum, 7.25);
        assert_eq!(records[0].average, 7.25);
        assert_eq!(records[0].count, 1);
    }

    #[test]
    fn negative_runs_keep_true_maximum() {
        let records: Vec<_> =
            aggregate(vec![sample("X", 1, 1, -3.0), sample("X", 1, 2, -1.0)]).collect();
        assert_eq!(records[0].maximum, -1.0);
        assert_eq!(records[0].average, -2.0);
    }

    #[test]
    fn splits_on_day_and_station() {
        let records: Vec<_> = aggregate(vec![
            sample("X", 1, 8, 10.0),
            sample("X", 1, 9, 20.0),
            sample("Y", 1, 9, 1.0),
            sample("X", 2, 8, 5.0),
        ])
        .collect();
        let summary: Vec<(&str, u32, f64, f64)> = records
            .iter()
            .map(|r| {
                (
                    r.station.as_str(),
                    chrono::Datelike::day(&r.day),
                    r.maximum,
                    r.average,
                )
            })
            .collect();
        assert_eq!(
            summary,
            vec![("X", 1, 20.0, 15.0), ("Y", 1, 1.0, 1.0), ("X", 2, 5.0, 5.0)]
        );
    }

    #[test]
    fn sorting_merges_separated_runs() {
        let mut samples = vec![
            sample("X", 1, 8, 1.0),
            sample("Y", 1, 8, 2.0),
            sample("X", 1, 9, 3.0),
        ];
        assert_eq!(aggregate(samples.clone()).count(), 3);
        sort_for_grouping(&mut samples);
        assert_eq!(aggregate(samples).count(), 2);
    }
}
