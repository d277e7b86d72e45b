use crate::{
    chunk::{DataChunk, DataEntry, DirChunk, DirEntry, NULL_SLOT},
    chunkid::ChunkId,
    costtree::{ChunkKind, CostTree, NodeIdx},
    facts::FactStream,
};
use cubefile_base::{err, Result};
use rapidhash::RapidHasher;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    hash::BuildHasherDefault,
    io::{BufRead, Seek},
};
use tracing::trace;

// Turning the regions placed in one bucket into the chunk vectors that get
// serialized. Every chunk gets a slot: directory chunks take `0..D`, data
// chunks follow. Within each kind, chunks are numbered in the traversal
// order chosen for the cube. Slots of all buckets are fixed before any
// bucket is materialized, since directory entries point across buckets.

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LayoutOrder {
    DepthFirst,
    #[default]
    BreadthFirst,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Scope {
    // The chunk and everything below it.
    Subtree,
    // The chunk alone; its children were placed elsewhere.
    ChunkOnly,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RegionMember {
    pub node: NodeIdx,
    pub scope: Scope,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SlotAssignment {
    pub dirs: Vec<NodeIdx>,
    pub datas: Vec<NodeIdx>,
}

impl SlotAssignment {
    pub fn num_chunks(&self) -> usize {
        self.dirs.len() + self.datas.len()
    }

    pub fn slots(&self) -> impl Iterator<Item = (u16, NodeIdx)> + '_ {
        self.dirs
            .iter()
            .chain(self.datas.iter())
            .enumerate()
            .map(|(slot, idx)| (slot as u16, *idx))
    }
}

pub fn assign_slots(
    tree: &CostTree,
    members: &[RegionMember],
    order: LayoutOrder,
) -> Result<SlotAssignment> {
    if members.is_empty() {
        return Err(err("cannot lay out an empty region"));
    }
    let mut out = SlotAssignment::default();
    for m in members {
        let nodes = match (m.scope, order) {
            (Scope::ChunkOnly, _) => vec![m.node],
            (Scope::Subtree, LayoutOrder::DepthFirst) => tree.preorder(m.node),
            (Scope::Subtree, LayoutOrder::BreadthFirst) => tree.level_order(m.node),
        };
        for idx in nodes {
            match tree.node(idx).kind() {
                ChunkKind::Dir => out.dirs.push(idx),
                ChunkKind::Data => out.datas.push(idx),
            }
        }
    }
    if out.num_chunks() >= NULL_SLOT as usize {
        return Err(err(format!("{} chunks in one bucket", out.num_chunks())));
    }
    Ok(out)
}

// The facts below one fact prefix, keyed by cell id. The sub data chunks
// of a split chunk all share the prefix of the chunk they came from, so one
// pass over the stream serves every one of them.
#[derive(Clone, Debug, Default)]
pub struct CellValues {
    prefix: Option<ChunkId>,
    values: HashMap<ChunkId, Vec<f32>, BuildHasherDefault<RapidHasher>>,
    loads: usize,
}

impl CellValues {
    pub fn new() -> Self {
        Self::default()
    }

    // Number of passes made over the fact stream so far.
    pub fn loads(&self) -> usize {
        self.loads
    }

    fn load<R: BufRead + Seek>(
        &mut self,
        facts: &mut FactStream<R>,
        prefix: &ChunkId,
    ) -> Result<()> {
        if self.prefix.as_ref() == Some(prefix) {
            return Ok(());
        }
        self.prefix = None;
        self.values.clear();
        for rec in facts.values_under(prefix)? {
            self.values.insert(rec.id, rec.values);
        }
        self.prefix = Some(prefix.clone());
        self.loads += 1;
        trace!(prefix = %prefix, cells = self.values.len(), "loaded cell values");
        Ok(())
    }

    fn get(&self, cell: &ChunkId) -> Option<&[f32]> {
        self.values.get(cell).map(|v| v.as_slice())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BucketChunks {
    pub num_measures: usize,
    pub dir_chunks: Vec<DirChunk>,
    pub data_chunks: Vec<DataChunk>,
}

// `placements[i]` is where node `i` of the tree was put. `values` may be
// carried from bucket to bucket.
pub fn materialize<R: BufRead + Seek>(
    tree: &CostTree,
    assignment: &SlotAssignment,
    placements: &[DirEntry],
    facts: &mut FactStream<R>,
    values: &mut CellValues,
) -> Result<BucketChunks> {
    if placements.len() != tree.len() {
        return Err(err(format!(
            "{} placements for {} chunks",
            placements.len(),
            tree.len()
        )));
    }
    let mut out = BucketChunks {
        num_measures: tree.num_measures(),
        ..BucketChunks::default()
    };
    for idx in assignment.dirs.iter() {
        let node = tree.node(*idx);
        if node.cells().len() != node.children().len() {
            return Err(err(format!(
                "chunk {} has {} cells but {} children",
                node.header().id(),
                node.cells().len(),
                node.children().len()
            )));
        }
        let mut dir = DirChunk::new(node.header().clone())?;
        for (cell, child) in node.cells().cells().iter().zip(node.children()) {
            let child_id = tree.node(*child).header().id();
            if child_id != cell {
                return Err(err(format!("cell {} leads to chunk {}", cell, child_id)));
            }
            let entry = placements[child.0];
            if entry.is_null() {
                return Err(err(format!("chunk {} was never placed", child_id)));
            }
            dir.set_entry(&cell.extract_coords()?, entry)?;
        }
        trace!(chunk = %node.header().id(), entries = dir.entries().len(), "dir chunk");
        out.dir_chunks.push(dir);
    }
    // Data chunks are visited grouped by fact prefix, then put back in
    // slot order.
    let mut order: Vec<usize> = (0..assignment.datas.len()).collect();
    order.sort_by(|a, b| {
        let pa = tree.node(assignment.datas[*a]).fact_prefix();
        let pb = tree.node(assignment.datas[*b]).fact_prefix();
        pa.cmp(pb)
    });
    let mut datas: Vec<Option<DataChunk>> = vec![None; assignment.datas.len()];
    for pos in order {
        let node = tree.node(assignment.datas[pos]);
        values.load(facts, node.fact_prefix())?;
        let mut cells = Vec::with_capacity(node.cells().len());
        for cell in node.cells().cells() {
            let v = values.get(cell).ok_or_else(|| {
                err(format!("no values for cell {} of {}", cell, node.header().id()))
            })?;
            cells.push((cell.extract_coords()?, DataEntry::new(v.to_vec())));
        }
        let data = DataChunk::from_cells(node.header().clone(), tree.num_measures(), cells)?;
        trace!(chunk = %node.header().id(), cells = data.entries().len(), "data chunk");
        datas[pos] = Some(data);
    }
    out.data_chunks = datas.into_iter().flatten().collect();
    Ok(out)
}
