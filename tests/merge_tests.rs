mod profile_utils;

use pgoprof::profile::{self, SampleType};
use pgoprof::{ProfError, Snapshot, merge, merge_profiles};
use profile_utils::{at_millis, cpu_types, profile_of, snapshot_of};

#[test]
fn test_merge_sums_matching_stacks() {
    let a = snapshot_of(at_millis(1_000), &profile_of(&[(&["parse", "main"], [3, 30])], 10));
    let b = snapshot_of(at_millis(2_000), &profile_of(&[(&["parse", "main"], [2, 20])], 20));

    let merged = merge(&[a, b]).unwrap();

    assert_eq!(merged.functions.len(), 2);
    assert_eq!(merged.locations.len(), 2);
    assert_eq!(merged.samples.len(), 1);
    assert_eq!(merged.sample_values(&[1, 2]), Some(&[5, 50][..]));
    assert_eq!(merged.duration_total, 30);
}

#[test]
fn test_merge_keeps_distinct_stacks_apart() {
    let a = profile_of(&[(&["parse", "main"], [1, 10]), (&["render", "main"], [4, 40])], 0);
    let b = profile_of(&[(&["render", "parse", "main"], [2, 20])], 0);

    let merged = merge_profiles(&[a, b]).unwrap();

    assert_eq!(merged.samples.len(), 3);
    assert_eq!(merged.totals(), vec![7, 70]);
    let names: Vec<_> = merged.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["parse", "main", "render"]);
}

#[test]
fn test_merge_is_associative_through_encoding() {
    let a = profile_of(&[(&["parse", "main"], [1, 10]), (&["io", "main"], [2, 20])], 100);
    let b = profile_of(&[(&["io", "main"], [5, 50]), (&["hash", "parse", "main"], [1, 10])], 200);
    let c = profile_of(&[(&["hash", "parse", "main"], [7, 70]), (&["gc"], [1, 10])], 300);

    let ab = merge_profiles(&[a.clone(), b.clone()]).unwrap();
    let ab = profile::decode(&ab.encode().unwrap()).unwrap();

    let nested = merge_profiles(&[ab, c.clone()]).unwrap();
    let flat = merge_profiles(&[a, b, c]).unwrap();

    assert_eq!(nested, flat);
    assert_eq!(flat.duration_total, 600);
}

#[test]
fn test_merge_of_one_snapshot_preserves_totals() {
    let source = profile_of(&[(&["parse", "main"], [1, 10]), (&["parse", "main"], [2, 20])], 50);
    let merged = merge(&[snapshot_of(at_millis(5), &source)]).unwrap();

    assert_eq!(merged.totals(), source.totals());
    assert_eq!(merged.samples.len(), 1);
}

#[test]
fn test_merge_rejects_mismatched_sample_types() {
    let cpu = profile_of(&[(&["main"], [1, 10])], 0);
    let mut alloc = profile_of(&[(&["main"], [1, 10])], 0);
    alloc.sample_types = vec![SampleType::new("alloc_objects", "count"), SampleType::new("alloc_space", "bytes")];

    let err = merge(&[snapshot_of(at_millis(1), &cpu), snapshot_of(at_millis(2), &alloc)]).unwrap_err();

    match err {
        ProfError::IncompatibleSampleTypes { expected, found } => {
            assert_eq!(expected, cpu_types());
            assert_eq!(found[0].kind, "alloc_objects");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_merge_of_nothing_is_an_error() {
    assert!(matches!(merge(&[]), Err(ProfError::NoSnapshots)));
}

#[test]
fn test_merge_names_the_corrupt_snapshot() {
    let good = snapshot_of(at_millis(1_000), &profile_of(&[(&["main"], [1, 10])], 0));
    let bad = Snapshot::new(at_millis(2_000), b"not a profile".to_vec());

    let err = merge(&[good, bad]).unwrap_err();
    match err {
        ProfError::MalformedSnapshot(reason) => assert!(reason.contains("1970-01-01T00:00:02")),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_aggregate_encodes_to_decodable_pprof() {
    let a = profile_of(&[(&["parse", "main"], [1, 10])], 10);
    let b = profile_of(&[(&["render", "main"], [2, 20])], 10);

    let merged = merge_profiles(&[a, b]).unwrap();
    let bytes = merged.encode().unwrap();
    assert!(profile::is_gzip(&bytes));

    let decoded = profile::decode(&bytes).unwrap();
    assert_eq!(decoded.sample_types, cpu_types());
    assert_eq!(decoded.totals(), vec![3, 30]);
    assert_eq!(decoded.duration_nanos, 20);
    assert_eq!(decoded.functions, merged.functions);
}

#[test]
fn test_merge_rejects_mismatched_period_types() {
    let mut cpu = profile_of(&[(&["main"], [1, 10])], 0);
    cpu.period_type = Some(SampleType::new("cpu", "nanoseconds"));
    cpu.period = 10_000_000;
    let mut heap = profile_of(&[(&["main"], [1, 10])], 0);
    heap.period_type = Some(SampleType::new("space", "bytes"));
    heap.period = 524_288;

    let err = merge(&[snapshot_of(at_millis(1), &cpu), snapshot_of(at_millis(2), &heap)]).unwrap_err();
    match err {
        ProfError::IncompatiblePeriodTypes { expected, found } => {
            assert_eq!(expected, SampleType::new("cpu", "nanoseconds"));
            assert_eq!(found, SampleType::new("space", "bytes"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_merge_keeps_the_largest_period() {
    let mut fine = profile_of(&[(&["main"], [1, 10])], 0);
    fine.period_type = Some(SampleType::new("cpu", "nanoseconds"));
    fine.period = 1_000_000;
    let mut coarse = fine.clone();
    coarse.period = 10_000_000;
    let untyped = profile_of(&[(&["main"], [1, 10])], 0);

    let merged = merge_profiles(&[untyped, fine, coarse]).unwrap();
    assert_eq!(merged.period_type, Some(SampleType::new("cpu", "nanoseconds")));
    assert_eq!(merged.period, 10_000_000);
}

#[test]
fn test_merge_rejects_values_that_do_not_match_sample_types() {
    let mut short = profile_of(&[(&["main"], [1, 10])], 0);
    short.samples[0].values = vec![7];

    let err = merge_profiles(&[short]).unwrap_err();
    assert!(matches!(err, ProfError::MalformedSnapshot(_)));
}
