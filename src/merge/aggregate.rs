use crate::core::{ProfError, Result};
use crate::profile::{
    self, Frame, FunctionDescriptor, LocationDescriptor, LocationId, ProfileData, SampleRecord,
    SampleType,
};
use std::collections::HashMap;

/// The result of merging several snapshots.
///
/// Tables are de-duplicated by content and numbered in first-seen order, so
/// the same inputs always produce the same IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedProfile {
    pub sample_types: Vec<SampleType>,
    pub functions: Vec<FunctionDescriptor>,
    pub locations: Vec<LocationDescriptor>,
    /// One record per distinct call stack, values summed per column.
    pub samples: Vec<SampleRecord>,
    pub duration_total: i64,
    /// Earliest capture start among the inputs, 0 when none reported one.
    pub time_nanos: i64,
    pub period_type: Option<SampleType>,
    pub period: i64,
}

impl AggregatedProfile {
    pub fn sample_values(&self, stack: &[LocationId]) -> Option<&[i64]> {
        self.samples
            .iter()
            .find(|s| s.stack == stack)
            .map(|s| s.values.as_slice())
    }

    pub fn totals(&self) -> Vec<i64> {
        self.to_profile_data().totals()
    }

    pub fn to_profile_data(&self) -> ProfileData {
        ProfileData {
            sample_types: self.sample_types.clone(),
            functions: self.functions.clone(),
            locations: self.locations.clone(),
            samples: self.samples.clone(),
            time_nanos: self.time_nanos,
            duration_nanos: self.duration_total,
            period_type: self.period_type.clone(),
            period: self.period,
            comments: Vec::new(),
        }
    }

    /// Gzip pprof bytes, the same format individual snapshots are stored in.
    pub fn encode(&self) -> Result<Vec<u8>> {
        profile::encode(&self.to_profile_data())
    }
}

/// Content identity of a location once its frames live in the global
/// function space. The address only matters for unsymbolized locations.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LocationKey {
    frames: Vec<Frame>,
    address: u64,
}

/// Incremental builder behind [`super::merge_profiles`].
pub(crate) struct Aggregator {
    sample_types: Vec<SampleType>,
    functions: Vec<FunctionDescriptor>,
    function_index: HashMap<FunctionDescriptor, u64>,
    locations: Vec<LocationDescriptor>,
    location_index: HashMap<LocationKey, LocationId>,
    samples: Vec<SampleRecord>,
    sample_index: HashMap<Vec<LocationId>, usize>,
    duration_total: i64,
    time_nanos: i64,
    period_type: Option<SampleType>,
    period: i64,
}

impl Aggregator {
    /// `period_type` is the first one reported by any input; every other
    /// input must report the same one or none at all.
    pub(crate) fn new(sample_types: Vec<SampleType>, period_type: Option<SampleType>) -> Self {
        Self {
            sample_types,
            functions: Vec::new(),
            function_index: HashMap::new(),
            locations: Vec::new(),
            location_index: HashMap::new(),
            samples: Vec::new(),
            sample_index: HashMap::new(),
            duration_total: 0,
            time_nanos: 0,
            period_type,
            period: 0,
        }
    }

    pub(crate) fn check_compatible(&self, profile: &ProfileData) -> Result<()> {
        if profile.sample_types != self.sample_types {
            return Err(ProfError::IncompatibleSampleTypes {
                expected: self.sample_types.clone(),
                found: profile.sample_types.clone(),
            });
        }
        if let (Some(expected), Some(found)) = (&self.period_type, &profile.period_type) {
            if expected != found {
                return Err(ProfError::IncompatiblePeriodTypes {
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
        let width = self.sample_types.len();
        if let Some(sample) = profile.samples.iter().find(|s| s.values.len() != width) {
            return Err(ProfError::MalformedSnapshot(format!(
                "sample has {} values but profile declares {} sample types",
                sample.values.len(),
                width
            )));
        }
        Ok(())
    }

    pub(crate) fn add(&mut self, profile: &ProfileData) -> Result<()> {
        self.check_compatible(profile)?;

        let function_map = profile
            .functions
            .iter()
            .map(|f| self.intern_function(f))
            .collect::<Vec<_>>();

        let mut location_map = Vec::with_capacity(profile.locations.len());
        for location in &profile.locations {
            let frames = location
                .frames
                .iter()
                .map(|frame| {
                    translate(&function_map, frame.function)
                        .map(|function| Frame { function, line: frame.line })
                        .ok_or_else(|| {
                            ProfError::MalformedSnapshot(format!(
                                "frame references unknown function {}",
                                frame.function
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            location_map.push(self.intern_location(location.address, frames));
        }

        for sample in &profile.samples {
            let stack = sample
                .stack
                .iter()
                .map(|&id| {
                    translate(&location_map, id).ok_or_else(|| {
                        ProfError::MalformedSnapshot(format!("sample references unknown location {}", id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            self.add_sample(stack, &sample.values);
        }

        self.duration_total = self.duration_total.saturating_add(profile.duration_nanos);
        if profile.time_nanos != 0 && (self.time_nanos == 0 || profile.time_nanos < self.time_nanos) {
            self.time_nanos = profile.time_nanos;
        }
        self.period = self.period.max(profile.period);
        Ok(())
    }

    fn intern_function(&mut self, function: &FunctionDescriptor) -> u64 {
        if let Some(&id) = self.function_index.get(function) {
            return id;
        }
        let id = self.functions.len() as u64 + 1;
        self.functions.push(function.clone());
        self.function_index.insert(function.clone(), id);
        id
    }

    fn intern_location(&mut self, address: u64, frames: Vec<Frame>) -> LocationId {
        let key = LocationKey {
            address: if frames.is_empty() { address } else { 0 },
            frames,
        };
        if let Some(&id) = self.location_index.get(&key) {
            return id;
        }
        let id = self.locations.len() as u64 + 1;
        self.locations.push(LocationDescriptor {
            address,
            frames: key.frames.clone(),
        });
        self.location_index.insert(key, id);
        id
    }

    fn add_sample(&mut self, stack: Vec<LocationId>, values: &[i64]) {
        match self.sample_index.get(&stack) {
            Some(&index) => {
                for (total, value) in self.samples[index].values.iter_mut().zip(values) {
                    *total = total.saturating_add(*value);
                }
            }
            None => {
                self.sample_index.insert(stack.clone(), self.samples.len());
                self.samples.push(SampleRecord {
                    stack,
                    values: values.to_vec(),
                });
            }
        }
    }

    pub(crate) fn finish(self) -> AggregatedProfile {
        AggregatedProfile {
            sample_types: self.sample_types,
            functions: self.functions,
            locations: self.locations,
            samples: self.samples,
            duration_total: self.duration_total,
            time_nanos: self.time_nanos,
            period_type: self.period_type,
            period: self.period,
        }
    }
}

fn translate(map: &[u64], id: u64) -> Option<u64> {
    let index = usize::try_from(id).ok()?.checked_sub(1)?;
    map.get(index).copied()
}
