use crate::{
    chunkid::{ChunkId, Coordinates},
    range::{cross_product, LevelRange},
};
use cubefile_base::{err, Result};
use serde::{Deserialize, Serialize};

// What every chunk knows about itself: where it sits in the hierarchy, the
// ranges it covers, and how many of its cells exist. `tot_num_cells` is
// the cross product of the ranges; `rl_num_cells` is the number of cells
// actually stored (equal for directory chunks, which are dense). `size` is
// the serialized size in bytes, filled in once known.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChunkHeader {
    id: ChunkId,
    depth: usize,
    num_dims: usize,
    ranges: Vec<LevelRange>,
    tot_num_cells: usize,
    rl_num_cells: usize,
    size: usize,
}

impl ChunkHeader {
    pub fn new(id: ChunkId, ranges: Vec<LevelRange>, rl_num_cells: usize) -> Result<Self> {
        let depth = id.depth()?;
        let num_dims = ranges.len();
        if num_dims == 0 {
            return Err(err(format!("chunk {} has no ranges", id)));
        }
        if !id.is_root() && id.num_dims()? != num_dims {
            return Err(err(format!(
                "chunk {} has {} ranges for {} dimensions",
                id,
                num_dims,
                id.num_dims()?
            )));
        }
        let tot_num_cells = cross_product(&ranges);
        if rl_num_cells > tot_num_cells {
            return Err(err(format!(
                "chunk {} claims {} cells out of {}",
                id, rl_num_cells, tot_num_cells
            )));
        }
        Ok(ChunkHeader {
            id,
            depth,
            num_dims,
            ranges,
            tot_num_cells,
            rl_num_cells,
            size: 0,
        })
    }

    // A directory chunk stores every cell of its cross product.
    pub fn dense(id: ChunkId, ranges: Vec<LevelRange>) -> Result<Self> {
        let tot = cross_product(&ranges);
        Self::new(id, ranges, tot)
    }

    pub fn id(&self) -> &ChunkId {
        &self.id
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    pub fn ranges(&self) -> &[LevelRange] {
        &self.ranges
    }

    pub fn tot_num_cells(&self) -> usize {
        self.tot_num_cells
    }

    pub fn rl_num_cells(&self) -> usize {
        self.rl_num_cells
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    pub fn contains(&self, coords: &Coordinates) -> bool {
        coords.len() == self.num_dims
            && self
                .ranges
                .iter()
                .zip(coords.as_slice())
                .all(|(r, c)| r.contains(*c))
    }
}
