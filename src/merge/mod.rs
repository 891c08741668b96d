//! Merge engine: many call-graph snapshots in, one aggregated profile out.

mod aggregate;

pub use aggregate::AggregatedProfile;

use crate::core::{ProfError, Result, Snapshot};
use crate::profile::{self, ProfileData};
use aggregate::Aggregator;
use tracing::{debug, info_span};

/// Decodes and merges `snapshots`.
///
/// One undecodable payload or one sample-type mismatch fails the whole call;
/// no partial aggregate is returned.
pub fn merge(snapshots: &[Snapshot]) -> Result<AggregatedProfile> {
    let span = info_span!("merge", snapshots = snapshots.len());
    let _enter = span.enter();

    let profiles = snapshots
        .iter()
        .map(|snapshot| {
            profile::decode(snapshot.payload()).map_err(|err| match err {
                ProfError::MalformedSnapshot(reason) => ProfError::MalformedSnapshot(format!(
                    "snapshot captured at {}: {}",
                    snapshot.captured_at.to_rfc3339(),
                    reason
                )),
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    merge_profiles(&profiles)
}

/// Merges already decoded profiles.
pub fn merge_profiles(profiles: &[ProfileData]) -> Result<AggregatedProfile> {
    let first = profiles.first().ok_or(ProfError::NoSnapshots)?;
    let period_type = profiles.iter().find_map(|p| p.period_type.clone());
    let mut aggregator = Aggregator::new(first.sample_types.clone(), period_type);

    // Validate every input before touching the tables.
    for profile in profiles {
        aggregator.check_compatible(profile)?;
    }
    for profile in profiles {
        aggregator.add(profile)?;
    }

    let aggregate = aggregator.finish();
    debug!(
        inputs = profiles.len(),
        functions = aggregate.functions.len(),
        locations = aggregate.locations.len(),
        stacks = aggregate.samples.len(),
        "merged profiles"
    );
    Ok(aggregate)
}
