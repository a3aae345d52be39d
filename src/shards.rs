//! Shard planning for parallel extraction: map every primary shard of an
//! index to the routing slice that covers it.

use crate::service::{IndexService, ServiceError};
use std::collections::BTreeMap;

/// Probe budget per shard. The slice-to-shard assignment is service-defined
/// and many-to-one; probing must terminate even if the assignment is skewed,
/// so the planner gives up after this many slices per shard and fails the
/// dump instead of spinning.
pub const MAX_SLICE_PROBES_PER_SHARD: u32 = 128;

/// Immutable plan for one dump invocation: node address per primary shard,
/// plus the first slice id observed to land on each shard.
#[derive(Debug, Clone)]
pub struct ShardMap {
    pub nodes: BTreeMap<u32, String>,
    pub slice_for_shard: BTreeMap<u32, u32>,
}

impl ShardMap {
    pub fn shard_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// `(shard, slice)` pairs in shard order; one dump worker each.
    pub fn assignments(&self) -> Vec<(u32, u32)> {
        self.slice_for_shard.iter().map(|(s, sl)| (*s, *sl)).collect()
    }
}

/// Query the topology once, then probe increasing slice ids until every
/// distinct primary shard has been observed at least once. Slice count is
/// pinned to the primary-shard count, so the slices the workers end up
/// using form a disjoint cover of the index.
pub fn plan(service: &dyn IndexService, index: &str) -> Result<ShardMap, ServiceError> {
    let nodes = service.shard_topology(index)?;
    let shard_count = nodes.len() as u32;

    let mut slice_for_shard = BTreeMap::new();
    if shard_count <= 1 {
        if let Some(shard) = nodes.keys().next() {
            slice_for_shard.insert(*shard, 0);
        }
        return Ok(ShardMap { nodes, slice_for_shard });
    }

    let budget = shard_count.saturating_mul(MAX_SLICE_PROBES_PER_SHARD);
    for slice_id in 0..budget {
        let shard = service.shard_for_slice(index, slice_id, shard_count)?;
        slice_for_shard.entry(shard).or_insert(slice_id);
        if slice_for_shard.len() as u32 == shard_count {
            tracing::debug!(index, shards = shard_count, probes = slice_id + 1, "shard plan complete");
            return Ok(ShardMap { nodes, slice_for_shard });
        }
    }

    Err(ServiceError::Transport(format!(
        "slice probing for {index} did not cover all {shard_count} shards within {budget} probes"
    )))
}
