use serde::Serialize;
use std::fmt;

/// 1-based index into a profile's function table.
pub type FunctionId = u64;
/// 1-based index into a profile's location table.
pub type LocationId = u64;

/// A named, unit-tagged value column (e.g. `samples/count`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SampleType {
    pub kind: String,
    pub unit: String,
}

impl SampleType {
    pub fn new(kind: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            unit: unit.into(),
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionDescriptor {
    pub name: String,
    pub system_name: String,
    pub filename: String,
    pub start_line: i64,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, start_line: i64) -> Self {
        let name = name.into();
        Self {
            system_name: name.clone(),
            name,
            filename: filename.into(),
            start_line,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    pub function: FunctionId,
    pub line: i64,
}

/// A code location. Frames are leaf-first: the last one is the caller that
/// the earlier ones were inlined into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocationDescriptor {
    pub address: u64,
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    /// Leaf-first call stack.
    pub stack: Vec<LocationId>,
    pub values: Vec<i64>,
}

/// A decoded profile with string-table indirection resolved.
///
/// `functions[i]` has ID `i + 1`, likewise for `locations`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileData {
    pub sample_types: Vec<SampleType>,
    pub functions: Vec<FunctionDescriptor>,
    pub locations: Vec<LocationDescriptor>,
    pub samples: Vec<SampleRecord>,
    pub time_nanos: i64,
    pub duration_nanos: i64,
    pub period_type: Option<SampleType>,
    pub period: i64,
    pub comments: Vec<String>,
}

impl ProfileData {
    pub fn new(sample_types: Vec<SampleType>) -> Self {
        Self {
            sample_types,
            ..Default::default()
        }
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDescriptor> {
        lookup(&self.functions, id)
    }

    pub fn location(&self, id: LocationId) -> Option<&LocationDescriptor> {
        lookup(&self.locations, id)
    }

    /// Per-column totals over every sample.
    pub fn totals(&self) -> Vec<i64> {
        let mut totals = vec![0i64; self.sample_types.len()];
        for sample in &self.samples {
            for (total, value) in totals.iter_mut().zip(&sample.values) {
                *total = total.saturating_add(*value);
            }
        }
        totals
    }

    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            sample_types: self.sample_types.iter().map(|t| t.to_string()).collect(),
            functions: self.functions.len(),
            locations: self.locations.len(),
            samples: self.samples.len(),
            totals: self.totals(),
            duration_nanos: self.duration_nanos,
            time_nanos: self.time_nanos,
        }
    }
}

fn lookup<T>(table: &[T], id: u64) -> Option<&T> {
    let index = usize::try_from(id).ok()?.checked_sub(1)?;
    table.get(index)
}

/// Short description of a profile, printed by `pgoprof inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub sample_types: Vec<String>,
    pub functions: usize,
    pub locations: usize,
    pub samples: usize,
    pub totals: Vec<i64>,
    pub duration_nanos: i64,
    pub time_nanos: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_one_based() {
        let mut profile = ProfileData::new(vec![SampleType::new("samples", "count")]);
        profile.functions.push(FunctionDescriptor::new("main", "main.rs", 1));

        assert!(profile.function(0).is_none());
        assert_eq!(profile.function(1).map(|f| f.name.as_str()), Some("main"));
        assert!(profile.function(2).is_none());
    }

    #[test]
    fn test_totals_sum_columns() {
        let mut profile = ProfileData::new(vec![
            SampleType::new("samples", "count"),
            SampleType::new("cpu", "nanoseconds"),
        ]);
        profile.samples.push(SampleRecord { stack: vec![], values: vec![2, 20] });
        profile.samples.push(SampleRecord { stack: vec![], values: vec![3, 30] });

        assert_eq!(profile.totals(), vec![5, 50]);
        assert_eq!(profile.summary().sample_types, vec!["samples/count", "cpu/nanoseconds"]);
    }
}
