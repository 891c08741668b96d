//! pprof protobuf encoding (`perftools.profiles.Profile`).
//!
//! Input may be raw or gzip-compressed protobuf; output is gzip-compressed,
//! which is what `go tool pprof` and `go build -pgo` expect on disk.

use super::model::{
    Frame, FunctionDescriptor, LocationDescriptor, ProfileData, SampleRecord, SampleType,
};
use crate::core::{ProfError, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use pprof::protos::{self, Message};
use std::collections::HashMap;
use std::io::{Read, Write};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Decodes a pprof payload into [`ProfileData`], renumbering IDs densely.
pub fn decode(bytes: &[u8]) -> Result<ProfileData> {
    let raw;
    let bytes = if is_gzip(bytes) {
        let mut buf = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut buf)
            .map_err(|e| malformed(format!("gzip: {}", e)))?;
        raw = buf;
        raw.as_slice()
    } else {
        bytes
    };

    let profile = protos::Profile::decode(bytes).map_err(|e| malformed(format!("protobuf: {}", e)))?;
    from_proto(&profile)
}

/// Encodes and gzip-compresses.
pub fn encode(profile: &ProfileData) -> Result<Vec<u8>> {
    compress(&encode_raw(profile))
}

/// Gzip-compresses an already encoded protobuf profile.
pub fn compress(raw: &[u8]) -> Result<Vec<u8>> {
    let mut gz = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    gz.write_all(raw)?;
    Ok(gz.finish()?)
}

/// Encodes to plain protobuf without compression.
pub fn encode_raw(profile: &ProfileData) -> Vec<u8> {
    to_proto(profile).encode_to_vec()
}

fn malformed(reason: String) -> ProfError {
    ProfError::MalformedSnapshot(reason)
}

// ============================================================================
// Proto -> model
// ============================================================================

struct Strings<'a>(&'a [String]);

impl Strings<'_> {
    fn get(&self, index: i64, what: &str) -> Result<String> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.0.get(i))
            .cloned()
            .ok_or_else(|| malformed(format!("{} string index {} out of range", what, index)))
    }

    fn value_type(&self, vt: &protos::ValueType) -> Result<SampleType> {
        Ok(SampleType {
            kind: self.get(vt.ty, "sample type")?,
            unit: self.get(vt.unit, "sample unit")?,
        })
    }
}

fn from_proto(profile: &protos::Profile) -> Result<ProfileData> {
    if profile.string_table.first().map(String::as_str) != Some("") {
        return Err(malformed("string table must start with an empty string".to_string()));
    }
    let strings = Strings(&profile.string_table);

    let sample_types = profile
        .sample_type
        .iter()
        .map(|vt| strings.value_type(vt))
        .collect::<Result<Vec<_>>>()?;

    let mut function_ids = HashMap::with_capacity(profile.function.len());
    let mut functions = Vec::with_capacity(profile.function.len());
    for function in &profile.function {
        let dense = functions.len() as u64 + 1;
        if function.id == 0 || function_ids.insert(function.id, dense).is_some() {
            return Err(malformed(format!("invalid or duplicate function id {}", function.id)));
        }
        functions.push(FunctionDescriptor {
            name: strings.get(function.name, "function name")?,
            system_name: strings.get(function.system_name, "function system name")?,
            filename: strings.get(function.filename, "function filename")?,
            start_line: function.start_line,
        });
    }

    let mut location_ids = HashMap::with_capacity(profile.location.len());
    let mut locations = Vec::with_capacity(profile.location.len());
    for location in &profile.location {
        let dense = locations.len() as u64 + 1;
        if location.id == 0 || location_ids.insert(location.id, dense).is_some() {
            return Err(malformed(format!("invalid or duplicate location id {}", location.id)));
        }
        let mut frames = Vec::with_capacity(location.line.len());
        for line in &location.line {
            if line.function_id == 0 {
                continue;
            }
            let function = *function_ids.get(&line.function_id).ok_or_else(|| {
                malformed(format!(
                    "location {} references unknown function {}",
                    location.id, line.function_id
                ))
            })?;
            frames.push(Frame { function, line: line.line });
        }
        locations.push(LocationDescriptor {
            address: location.address,
            frames,
        });
    }

    let mut samples = Vec::with_capacity(profile.sample.len());
    for sample in &profile.sample {
        if sample.value.len() != sample_types.len() {
            return Err(malformed(format!(
                "sample has {} values but profile declares {} sample types",
                sample.value.len(),
                sample_types.len()
            )));
        }
        let stack = sample
            .location_id
            .iter()
            .map(|id| {
                location_ids
                    .get(id)
                    .copied()
                    .ok_or_else(|| malformed(format!("sample references unknown location {}", id)))
            })
            .collect::<Result<Vec<_>>>()?;
        samples.push(SampleRecord {
            stack,
            values: sample.value.clone(),
        });
    }

    let period_type = match &profile.period_type {
        Some(vt) if vt.ty != 0 || vt.unit != 0 => Some(strings.value_type(vt)?),
        _ => None,
    };

    let comments = profile
        .comment
        .iter()
        .map(|&index| strings.get(index, "comment"))
        .collect::<Result<Vec<_>>>()?;

    Ok(ProfileData {
        sample_types,
        functions,
        locations,
        samples,
        time_nanos: profile.time_nanos,
        duration_nanos: profile.duration_nanos,
        period_type,
        period: profile.period,
        comments,
    })
}

// ============================================================================
// Model -> proto
// ============================================================================

#[derive(Default)]
struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, i64>,
}

impl StringTable {
    fn new() -> Self {
        let mut table = Self::default();
        table.intern("");
        table
    }

    fn intern(&mut self, s: &str) -> i64 {
        if let Some(&index) = self.index.get(s) {
            return index;
        }
        let index = self.strings.len() as i64;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), index);
        index
    }

    fn value_type(&mut self, sample_type: &SampleType) -> protos::ValueType {
        protos::ValueType {
            ty: self.intern(&sample_type.kind),
            unit: self.intern(&sample_type.unit),
        }
    }
}

fn to_proto(profile: &ProfileData) -> protos::Profile {
    let mut strings = StringTable::new();

    let sample_type = profile
        .sample_types
        .iter()
        .map(|t| strings.value_type(t))
        .collect();

    let function = profile
        .functions
        .iter()
        .enumerate()
        .map(|(i, f)| protos::Function {
            id: i as u64 + 1,
            name: strings.intern(&f.name),
            system_name: strings.intern(&f.system_name),
            filename: strings.intern(&f.filename),
            start_line: f.start_line,
        })
        .collect();

    let location = profile
        .locations
        .iter()
        .enumerate()
        .map(|(i, l)| protos::Location {
            id: i as u64 + 1,
            address: l.address,
            line: l
                .frames
                .iter()
                .map(|frame| protos::Line {
                    function_id: frame.function,
                    line: frame.line,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        })
        .collect();

    let sample = profile
        .samples
        .iter()
        .map(|s| protos::Sample {
            location_id: s.stack.clone(),
            value: s.values.clone(),
            ..Default::default()
        })
        .collect();

    let period_type = profile.period_type.as_ref().map(|t| strings.value_type(t));
    let comment = profile.comments.iter().map(|c| strings.intern(c)).collect();

    protos::Profile {
        sample_type,
        sample,
        location,
        function,
        time_nanos: profile.time_nanos,
        duration_nanos: profile.duration_nanos,
        period_type,
        period: profile.period,
        comment,
        string_table: strings.strings,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> ProfileData {
        let mut profile = ProfileData::new(vec![
            SampleType::new("samples", "count"),
            SampleType::new("cpu", "nanoseconds"),
        ]);
        profile.functions.push(FunctionDescriptor::new("main", "src/main.rs", 1));
        profile.functions.push(FunctionDescriptor::new("work", "src/work.rs", 10));
        profile.locations.push(LocationDescriptor {
            address: 0x1000,
            frames: vec![Frame { function: 1, line: 5 }],
        });
        profile.locations.push(LocationDescriptor {
            address: 0x2000,
            frames: vec![Frame { function: 2, line: 12 }],
        });
        profile.samples.push(SampleRecord { stack: vec![2, 1], values: vec![3, 30_000_000] });
        profile.time_nanos = 1_700_000_000_000_000_000;
        profile.duration_nanos = 10_000_000_000;
        profile.period_type = Some(SampleType::new("cpu", "nanoseconds"));
        profile.period = 10_000_000;
        profile.comments.push("captured by test".to_string());
        profile
    }

    #[test]
    fn test_encode_is_gzip_and_decodes_back() {
        let profile = sample_profile();
        let bytes = encode(&profile).unwrap();
        assert!(is_gzip(&bytes));
        assert_eq!(decode(&bytes).unwrap(), profile);
    }

    #[test]
    fn test_raw_protobuf_is_accepted() {
        let profile = sample_profile();
        let bytes = encode_raw(&profile);
        assert!(!is_gzip(&bytes));
        assert_eq!(decode(&bytes).unwrap(), profile);
    }

    #[test]
    fn test_sparse_ids_are_renumbered() {
        let proto = protos::Profile {
            sample_type: vec![protos::ValueType { ty: 1, unit: 2 }],
            function: vec![protos::Function { id: 40, name: 3, ..Default::default() }],
            location: vec![protos::Location {
                id: 77,
                line: vec![protos::Line { function_id: 40, line: 9, ..Default::default() }],
                ..Default::default()
            }],
            sample: vec![protos::Sample { location_id: vec![77], value: vec![4], ..Default::default() }],
            string_table: vec!["".into(), "samples".into(), "count".into(), "f".into()],
            ..Default::default()
        };

        let decoded = decode(&proto.encode_to_vec()).unwrap();
        assert_eq!(decoded.locations[0].frames, vec![Frame { function: 1, line: 9 }]);
        assert_eq!(decoded.samples[0].stack, vec![1]);
        assert_eq!(decoded.function(1).unwrap().name, "f");
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(decode(b"definitely not a profile"), Err(ProfError::MalformedSnapshot(_))));
        assert!(matches!(decode(&[0x1f, 0x8b, 0x00]), Err(ProfError::MalformedSnapshot(_))));
    }

    #[test]
    fn test_dangling_location_is_malformed() {
        let proto = protos::Profile {
            sample_type: vec![protos::ValueType { ty: 1, unit: 2 }],
            sample: vec![protos::Sample { location_id: vec![5], value: vec![1], ..Default::default() }],
            string_table: vec!["".into(), "samples".into(), "count".into()],
            ..Default::default()
        };
        let err = decode(&proto.encode_to_vec()).unwrap_err();
        assert!(matches!(err, ProfError::MalformedSnapshot(msg) if msg.contains("unknown location 5")));
    }

    #[test]
    fn test_value_count_mismatch_is_malformed() {
        let proto = protos::Profile {
            sample_type: vec![protos::ValueType { ty: 1, unit: 2 }],
            sample: vec![protos::Sample { value: vec![1, 2], ..Default::default() }],
            string_table: vec!["".into(), "samples".into(), "count".into()],
            ..Default::default()
        };
        assert!(matches!(decode(&proto.encode_to_vec()), Err(ProfError::MalformedSnapshot(_))));
    }
}
