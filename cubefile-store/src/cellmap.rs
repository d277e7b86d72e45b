use crate::{chunkid::ChunkId, facts::FactStream};
use cubefile_base::{err, Result};
use rapidhash::RapidHasher;
use std::{
    collections::HashSet,
    hash::BuildHasherDefault,
    io::{BufRead, Seek},
};
use tracing::trace;

type CellSet = HashSet<ChunkId, BuildHasherDefault<RapidHasher>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Insert {
    New,
    AlreadyPresent,
}

// The non-empty cells of one chunk, in discovery order. For a directory
// chunk the cells are the ids of its child chunks; for a data chunk they
// are the fact ids naming its populated cells.
#[derive(Clone, Debug, Default)]
pub struct CellMap {
    cells: Vec<ChunkId>,
    seen: CellSet,
}

impl CellMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ChunkId) -> Insert {
        if self.seen.contains(&id) {
            return Insert::AlreadyPresent;
        }
        self.seen.insert(id.clone());
        self.cells.push(id);
        Insert::New
    }

    pub fn cells(&self) -> &[ChunkId] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, id: &ChunkId) -> bool {
        self.seen.contains(id)
    }

    // Scans the fact stream for the cells directly below `prefix`. A cell
    // named twice is fine for a directory chunk (many facts share a
    // child) but means a double value for a data chunk.
    pub fn scan<R: BufRead + Seek>(
        facts: &mut FactStream<R>,
        prefix: &ChunkId,
        data_chunk: bool,
    ) -> Result<CellMap> {
        let depth = prefix.depth()?;
        let mut map = CellMap::new();
        facts.rewind()?;
        while let Some(rec) = facts.next_record()? {
            if !prefix.is_prefix_of(&rec.id) {
                continue;
            }
            let fact_depth = rec.id.depth()?;
            if data_chunk && fact_depth != depth + 1 {
                return Err(err(format!(
                    "fact {} does not name a cell of data chunk {}",
                    rec.id, prefix
                )));
            }
            let cell = if data_chunk {
                rec.id
            } else {
                rec.id.prefix(depth + 1)?
            };
            if map.insert(cell.clone()) == Insert::AlreadyPresent && data_chunk {
                return Err(err(format!("double value for cell {}", cell)));
            }
        }
        trace!(chunk = %prefix, cells = map.len(), "scanned cell map");
        Ok(map)
    }
}

impl FromIterator<ChunkId> for CellMap {
    fn from_iter<I: IntoIterator<Item = ChunkId>>(iter: I) -> Self {
        let mut map = CellMap::new();
        for id in iter {
            map.insert(id);
        }
        map
    }
}
