#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use pgoprof::Snapshot;
use pgoprof::profile::{self, Frame, FunctionDescriptor, LocationDescriptor, ProfileData, SampleRecord, SampleType};

pub fn cpu_types() -> Vec<SampleType> {
    vec![SampleType::new("samples", "count"), SampleType::new("cpu", "nanoseconds")]
}

/// Profile whose stacks are lists of function names, leaf first. Every frame
/// gets its own location so duplicates inside one profile are exercised too.
pub fn profile_of(stacks: &[(&[&str], [i64; 2])], duration: i64) -> ProfileData {
    let mut profile = ProfileData::new(cpu_types());
    profile.duration_nanos = duration;
    for (names, values) in stacks {
        let mut stack = Vec::new();
        for name in names.iter() {
            let function = match profile.functions.iter().position(|f| f.name == *name) {
                Some(i) => i as u64 + 1,
                None => {
                    profile
                        .functions
                        .push(FunctionDescriptor::new(*name, format!("src/{}.rs", name), 1));
                    profile.functions.len() as u64
                }
            };
            profile.locations.push(LocationDescriptor {
                address: 0x1000 + profile.locations.len() as u64,
                frames: vec![Frame { function, line: 10 }],
            });
            stack.push(profile.locations.len() as u64);
        }
        profile.samples.push(SampleRecord {
            stack,
            values: values.to_vec(),
        });
    }
    profile
}

pub fn at_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).unwrap()
}

pub fn snapshot_of(captured_at: DateTime<Utc>, data: &ProfileData) -> Snapshot {
    Snapshot::new(captured_at, profile::encode(data).unwrap())
}

/// Gzip pprof bytes padded by `extra` comment strings, for size-ranked tests.
pub fn payload_with_size_hint(samples: i64, extra: usize) -> Vec<u8> {
    let mut data = profile_of(&[(&["work", "main"], [samples, samples * 10_000_000])], 1_000_000_000);
    data.comments = (0..extra).map(|i| format!("padding-{}-{}", i, "x".repeat(64))).collect();
    profile::encode_raw(&data)
}
