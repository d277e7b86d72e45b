use crate::{
    cellmap::CellMap,
    chunkid::ChunkId,
    disk::{data_chunk_size, dir_chunk_size, fits_entry_limit, SLOT_BYTES},
    facts::FactStream,
    header::ChunkHeader,
    offset::calc_cell_offset,
    schema::CubeSchema,
};
use cubefile_base::{err, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    io::{BufRead, Seek},
};
use tracing::{debug, trace};

// The cost tree mirrors the chunk hierarchy of a cube as discovered in the
// fact stream: one node per non-empty chunk, each knowing its header
// (including its serialized size) and which of its cells exist. Nodes live
// in an arena and refer to their children by index; for directory nodes
// `children[i]` is the chunk named by `cells[i]`.

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeIdx(pub(crate) usize);

impl NodeIdx {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ChunkKind {
    Dir,
    Data,
}

#[derive(Clone, Debug)]
pub struct CostNode {
    pub(crate) header: ChunkHeader,
    pub(crate) cells: CellMap,
    pub(crate) children: Vec<NodeIdx>,
    pub(crate) kind: ChunkKind,
    // Chunk whose cells the facts of a data node are named under. The
    // node's own id, except below a split.
    pub(crate) fact_prefix: ChunkId,
}

impl CostNode {
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn cells(&self) -> &CellMap {
        &self.cells
    }

    pub fn children(&self) -> &[NodeIdx] {
        &self.children
    }

    pub fn kind(&self) -> ChunkKind {
        self.kind
    }

    pub fn fact_prefix(&self) -> &ChunkId {
        &self.fact_prefix
    }
}

#[derive(Clone, Debug)]
pub struct CostTree {
    nodes: Vec<CostNode>,
    root: NodeIdx,
    max_depth: usize,
    num_measures: usize,
}

impl CostTree {
    pub fn build<R: BufRead + Seek>(
        schema: &CubeSchema,
        facts: &mut FactStream<R>,
    ) -> Result<Self> {
        if facts.num_measures() != schema.num_measures() {
            return Err(err(format!(
                "fact stream carries {} measures, cube has {}",
                facts.num_measures(),
                schema.num_measures()
            )));
        }
        let mut tree = CostTree {
            nodes: Vec::new(),
            root: NodeIdx(0),
            max_depth: schema.max_depth(),
            num_measures: schema.num_measures(),
        };
        tree.root = tree.build_node(schema, facts, ChunkId::root())?;
        debug!(
            nodes = tree.nodes.len(),
            dirs = tree.count_dir_chunks(tree.root),
            datas = tree.count_data_chunks(tree.root),
            bytes = tree.tree_size(tree.root),
            "built cost tree"
        );
        Ok(tree)
    }

    fn build_node<R: BufRead + Seek>(
        &mut self,
        schema: &CubeSchema,
        facts: &mut FactStream<R>,
        id: ChunkId,
    ) -> Result<NodeIdx> {
        let depth = id.depth()?;
        let kind = if depth < self.max_depth {
            ChunkKind::Dir
        } else {
            ChunkKind::Data
        };
        let ranges = schema.chunk_ranges(&id)?;
        let cells = CellMap::scan(facts, &id, kind == ChunkKind::Data)?;
        if cells.is_empty() {
            return Err(err(format!("no cells found under chunk {}", id)));
        }
        for cell in cells.cells() {
            calc_cell_offset(&cell.extract_coords()?, &ranges)?;
        }
        let mut header = match kind {
            ChunkKind::Dir => ChunkHeader::dense(id.clone(), ranges)?,
            ChunkKind::Data => ChunkHeader::new(id.clone(), ranges, cells.len())?,
        };
        header.set_size(self.serialized_size(kind, &header));
        trace!(chunk = %id, ?kind, cells = cells.len(), size = header.size(), "cost node");
        let idx = NodeIdx(self.nodes.len());
        let child_ids: Vec<ChunkId> = match kind {
            ChunkKind::Dir => cells.cells().to_vec(),
            ChunkKind::Data => Vec::new(),
        };
        self.nodes.push(CostNode {
            header,
            cells,
            children: Vec::new(),
            kind,
            fact_prefix: id,
        });
        let mut children = Vec::with_capacity(child_ids.len());
        for child in child_ids {
            children.push(self.build_node(schema, facts, child)?);
        }
        self.nodes[idx.0].children = children;
        Ok(idx)
    }

    pub(crate) fn serialized_size(&self, kind: ChunkKind, header: &ChunkHeader) -> usize {
        match kind {
            ChunkKind::Dir => {
                dir_chunk_size(header.depth(), header.num_dims(), header.tot_num_cells())
            }
            ChunkKind::Data => data_chunk_size(
                header.depth(),
                header.num_dims(),
                header.tot_num_cells(),
                header.rl_num_cells(),
                self.num_measures,
            ),
        }
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn num_measures(&self) -> usize {
        self.num_measures
    }

    pub fn node(&self, idx: NodeIdx) -> &CostNode {
        &self.nodes[idx.0]
    }

    pub fn preorder(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            out.push(i);
            stack.extend(self.nodes[i.0].children.iter().rev());
        }
        out
    }

    pub fn level_order(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([idx]);
        while let Some(i) = queue.pop_front() {
            out.push(i);
            queue.extend(self.nodes[i.0].children.iter());
        }
        out
    }

    pub fn count_dir_chunks(&self, idx: NodeIdx) -> usize {
        self.preorder(idx)
            .into_iter()
            .filter(|i| self.nodes[i.0].kind == ChunkKind::Dir)
            .count()
    }

    pub fn count_data_chunks(&self, idx: NodeIdx) -> usize {
        self.preorder(idx)
            .into_iter()
            .filter(|i| self.nodes[i.0].kind == ChunkKind::Data)
            .count()
    }

    pub fn count_chunks(&self, idx: NodeIdx) -> usize {
        self.preorder(idx).len()
    }

    // Serialized bytes of every chunk in the subtree.
    pub fn tree_size(&self, idx: NodeIdx) -> usize {
        self.preorder(idx)
            .into_iter()
            .map(|i| self.nodes[i.0].header.size())
            .sum()
    }

    // Bucket bytes a chunk takes: its image plus its slot.
    pub fn chunk_cost(&self, idx: NodeIdx) -> usize {
        self.nodes[idx.0].header.size() + SLOT_BYTES
    }

    pub fn subtree_cost(&self, idx: NodeIdx) -> usize {
        self.preorder(idx)
            .into_iter()
            .map(|i| self.chunk_cost(i))
            .sum()
    }

    pub fn subtree_fits_entry_limit(&self, idx: NodeIdx) -> bool {
        self.preorder(idx)
            .into_iter()
            .all(|i| fits_entry_limit(&self.nodes[i.0].header))
    }

    // Turns data node `idx` into a directory node over freshly added data
    // nodes. Parents keep pointing at `idx`.
    pub(crate) fn replace_with_split(
        &mut self,
        idx: NodeIdx,
        mut dir_header: ChunkHeader,
        subs: Vec<(ChunkHeader, CellMap)>,
    ) -> Result<()> {
        let node = &self.nodes[idx.0];
        if node.kind != ChunkKind::Data {
            return Err(err(format!("chunk {} is not a data chunk", node.header.id())));
        }
        if dir_header.id() != node.header.id() {
            return Err(err(format!(
                "split of {} given header for {}",
                node.header.id(),
                dir_header.id()
            )));
        }
        let fact_prefix = node.fact_prefix.clone();
        dir_header.set_size(self.serialized_size(ChunkKind::Dir, &dir_header));
        let mut dir_cells = CellMap::new();
        let mut children = Vec::with_capacity(subs.len());
        for (mut header, cells) in subs {
            header.set_size(self.serialized_size(ChunkKind::Data, &header));
            dir_cells.insert(header.id().clone());
            children.push(NodeIdx(self.nodes.len()));
            self.nodes.push(CostNode {
                header,
                cells,
                children: Vec::new(),
                kind: ChunkKind::Data,
                fact_prefix: fact_prefix.clone(),
            });
        }
        self.nodes[idx.0] = CostNode {
            header: dir_header,
            cells: dir_cells,
            children,
            kind: ChunkKind::Dir,
            fact_prefix,
        };
        Ok(())
    }
}
