use crate::{
    chunkid::ChunkId,
    cluster::{ClusterItem, SimpleClusteringAlg},
    config::StorageConfig,
    costtree::{ChunkKind, CostTree, NodeIdx},
    layout::{RegionMember, Scope},
    split::split_data_node,
    store::{BucketAllocator, BucketId},
};
use cubefile_base::{err, Result};
use std::collections::BTreeMap;
use tracing::debug;

// Deciding which chunks share a bucket. A subtree that fits the bucket
// body goes in whole. One that doesn't is taken apart: its own directory
// chunk becomes an item by itself and its children are considered in
// turn, recursing into those still too big. Items under the cluster
// threshold are packed together; the rest take a bucket each. Oversized
// data chunks are split first and then placed like any directory.

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Region {
    pub bucket: BucketId,
    pub members: Vec<RegionMember>,
    pub cost: usize,
}

pub struct Planner<'c> {
    cfg: &'c StorageConfig,
    clustering: SimpleClusteringAlg,
}

impl<'c> Planner<'c> {
    pub fn new(cfg: &'c StorageConfig) -> Result<Self> {
        cfg.validate()?;
        let clustering = SimpleClusteringAlg::new(cfg.body_capacity(), cfg.cluster_threshold())?;
        Ok(Planner { cfg, clustering })
    }

    pub fn plan(
        &self,
        tree: &mut CostTree,
        alloc: &mut impl BucketAllocator,
    ) -> Result<Vec<Region>> {
        let mut regions = Vec::new();
        self.place(tree, tree.root(), alloc, &mut regions)?;
        debug!(regions = regions.len(), chunks = tree.len(), "planned bucket regions");
        Ok(regions)
    }

    fn fits(&self, tree: &CostTree, idx: NodeIdx) -> bool {
        tree.subtree_cost(idx) <= self.cfg.body_capacity() && tree.subtree_fits_entry_limit(idx)
    }

    fn standalone(
        &self,
        tree: &CostTree,
        member: RegionMember,
        alloc: &mut impl BucketAllocator,
        out: &mut Vec<Region>,
    ) -> Result<()> {
        let cost = match member.scope {
            Scope::Subtree => tree.subtree_cost(member.node),
            Scope::ChunkOnly => tree.chunk_cost(member.node),
        };
        let bucket = alloc.allocate_bucket()?;
        out.push(Region {
            bucket,
            members: vec![member],
            cost,
        });
        Ok(())
    }

    fn place(
        &self,
        tree: &mut CostTree,
        idx: NodeIdx,
        alloc: &mut impl BucketAllocator,
        out: &mut Vec<Region>,
    ) -> Result<()> {
        let capacity = self.cfg.body_capacity();
        let threshold = self.cfg.cluster_threshold();
        if self.fits(tree, idx) {
            let member = RegionMember {
                node: idx,
                scope: Scope::Subtree,
            };
            return self.standalone(tree, member, alloc, out);
        }
        if tree.node(idx).kind() == ChunkKind::Data {
            split_data_node(tree, idx, capacity)?;
            return self.place(tree, idx, alloc, out);
        }

        let own = tree.chunk_cost(idx);
        if own > capacity {
            return Err(err(format!(
                "directory chunk {} takes {} bytes, more than a bucket holds ({})",
                tree.node(idx).header().id(),
                own,
                capacity
            )));
        }
        let mut small: Vec<(RegionMember, usize)> = Vec::new();
        let own_member = RegionMember {
            node: idx,
            scope: Scope::ChunkOnly,
        };
        if own >= threshold {
            self.standalone(tree, own_member, alloc, out)?;
        } else {
            small.push((own_member, own));
        }
        let children = tree.node(idx).children().to_vec();
        for child in children {
            if !self.fits(tree, child) {
                self.place(tree, child, alloc, out)?;
                continue;
            }
            let member = RegionMember {
                node: child,
                scope: Scope::Subtree,
            };
            let cost = tree.subtree_cost(child);
            if cost >= threshold {
                self.standalone(tree, member, alloc, out)?;
            } else {
                small.push((member, cost));
            }
        }
        self.cluster(tree, small, alloc, out)
    }

    fn cluster(
        &self,
        tree: &CostTree,
        small: Vec<(RegionMember, usize)>,
        alloc: &mut impl BucketAllocator,
        out: &mut Vec<Region>,
    ) -> Result<()> {
        if small.is_empty() {
            return Ok(());
        }
        let mut by_id: BTreeMap<ChunkId, RegionMember> = BTreeMap::new();
        let mut items = Vec::with_capacity(small.len());
        for (member, cost) in small {
            let id = tree.node(member.node).header().id().clone();
            items.push(ClusterItem {
                id: id.clone(),
                cost,
            });
            by_id.insert(id, member);
        }
        let clustering = self.clustering.run(&items, alloc)?;
        for bucket in clustering.bucket_ids.iter() {
            let mut members = Vec::new();
            for id in clustering.regions.get(bucket).into_iter().flatten() {
                let member = by_id
                    .get(id)
                    .ok_or_else(|| err(format!("clustered unknown chunk {}", id)))?;
                members.push(*member);
            }
            out.push(Region {
                bucket: *bucket,
                members,
                cost: clustering.costs.get(bucket).copied().unwrap_or(0),
            });
        }
        Ok(())
    }
}
