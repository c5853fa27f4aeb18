use std::collections::HashSet;

use crate::domain::{PollutantCode, RegionCode, Sample};

/// Append-only, insertion-ordered collection of validated samples.
///
/// Nothing here sorts or deduplicates: the order seen by the aggregator is
/// exactly the order of `append` calls.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    samples: Vec<Sample>,
    stations: Vec<(String, RegionCode)>,
    seen: HashSet<String>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, sample: Sample) {
        if !self.seen.contains(&sample.station) {
            self.seen.insert(sample.station.clone());
            self.stations.push((sample.station.clone(), sample.region));
        }
        self.samples.push(sample);
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) {
        for sample in samples {
            self.append(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn filter_by_pollutant(
        &self,
        pollutant: PollutantCode,
    ) -> impl Iterator<Item = &Sample> + '_ {
        self.samples
            .iter()
            .filter(move |sample| sample.pollutant == pollutant)
    }

    /// Stations seen so far with the region of their first sample, in
    /// first-seen order.
    pub fn stations(&self) -> &[(String, RegionCode)] {
        &self.stations
    }
}

impl IntoIterator for SampleStore {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a> IntoIterator for &'a SampleStore {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
