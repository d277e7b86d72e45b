use crate::{
    chunkid::ChunkId,
    store::{BucketAllocator, BucketId},
};
use cubefile_base::{err, Result};
use std::collections::BTreeMap;
use tracing::debug;

// Greedy packing of small subtrees into buckets, in arrival order: items
// fill the current bucket until the next one would overflow it, which
// opens a fresh bucket. Nothing is reordered.

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClusterItem {
    pub id: ChunkId,
    pub cost: usize,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Clustering {
    pub bucket_ids: Vec<BucketId>,
    pub regions: BTreeMap<BucketId, Vec<ChunkId>>,
    pub costs: BTreeMap<BucketId, usize>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SimpleClusteringAlg {
    capacity: usize,
    threshold: usize,
}

impl SimpleClusteringAlg {
    pub fn new(capacity: usize, threshold: usize) -> Result<Self> {
        if threshold > capacity {
            return Err(err(format!(
                "cluster threshold {} above capacity {}",
                threshold, capacity
            )));
        }
        Ok(SimpleClusteringAlg {
            capacity,
            threshold,
        })
    }

    pub fn run(
        &self,
        items: &[ClusterItem],
        alloc: &mut impl BucketAllocator,
    ) -> Result<Clustering> {
        let mut out = Clustering::default();
        let mut current: Option<BucketId> = None;
        let mut total = 0_usize;
        for item in items {
            if item.cost >= self.threshold {
                return Err(err(format!(
                    "{} costs {} bytes, at or above the cluster threshold {}",
                    item.id, item.cost, self.threshold
                )));
            }
            let bucket = match current {
                Some(b) if total + item.cost <= self.capacity => b,
                _ => {
                    let b = alloc.allocate_bucket()?;
                    out.bucket_ids.push(b);
                    current = Some(b);
                    total = 0;
                    b
                }
            };
            total += item.cost;
            out.regions.entry(bucket).or_default().push(item.id.clone());
            out.costs.insert(bucket, total);
        }
        debug!(
            items = items.len(),
            buckets = out.bucket_ids.len(),
            "clustered chunk subtrees"
        );
        Ok(out)
    }
}
