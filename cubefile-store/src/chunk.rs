use crate::{
    chunkid::Coordinates,
    header::ChunkHeader,
    offset::{calc_cell_offset, calc_compressed_offset},
    store::BucketId,
};
use cubefile_base::{err, Bitmap, Context, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub type Measure = OrderedFloat<f32>;

pub const NULL_SLOT: u16 = u16::MAX;

// A directory cell: where the child chunk lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct DirEntry {
    pub bucket: BucketId,
    pub slot: u16,
}

impl DirEntry {
    pub const NULL: DirEntry = DirEntry {
        bucket: BucketId::NULL,
        slot: NULL_SLOT,
    };

    pub fn new(bucket: BucketId, slot: u16) -> Self {
        DirEntry { bucket, slot }
    }

    pub fn is_null(&self) -> bool {
        self.bucket.is_null()
    }
}

// A data cell: the measures stored for it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DataEntry {
    pub facts: Vec<Measure>,
}

impl DataEntry {
    pub fn new(facts: Vec<f32>) -> Self {
        DataEntry {
            facts: facts.into_iter().map(OrderedFloat).collect(),
        }
    }

    pub fn num_facts(&self) -> usize {
        self.facts.len()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DirChunk {
    header: ChunkHeader,
    entries: Vec<DirEntry>,
}

impl DirChunk {
    // A directory chunk with every cell empty.
    pub fn new(header: ChunkHeader) -> Result<Self> {
        let n = header.tot_num_cells();
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(n)
            .context(format!("allocating {} entries for directory chunk {}", n, header.id()))?;
        entries.resize(n, DirEntry::NULL);
        Ok(DirChunk { header, entries })
    }

    pub fn from_entries(header: ChunkHeader, entries: Vec<DirEntry>) -> Result<Self> {
        if entries.len() != header.tot_num_cells() {
            return Err(err(format!(
                "directory chunk {} has {} entries for {} cells",
                header.id(),
                entries.len(),
                header.tot_num_cells()
            )));
        }
        Ok(DirChunk { header, entries })
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn set_entry(&mut self, coords: &Coordinates, entry: DirEntry) -> Result<()> {
        let offset = calc_cell_offset(coords, self.header.ranges())?;
        let slot = self
            .entries
            .get_mut(offset)
            .ok_or_else(|| err(format!("offset {} out of range", offset)))?;
        *slot = entry;
        Ok(())
    }

    pub fn entry(&self, coords: &Coordinates) -> Result<DirEntry> {
        let offset = calc_cell_offset(coords, self.header.ranges())?;
        self.entries
            .get(offset)
            .copied()
            .ok_or_else(|| err(format!("offset {} out of range", offset)))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DataChunk {
    header: ChunkHeader,
    num_measures: usize,
    bitmap: Bitmap,
    entries: Vec<DataEntry>,
}

impl DataChunk {
    // Builds the sparse body from populated cells given in any order.
    pub fn from_cells(
        header: ChunkHeader,
        num_measures: usize,
        cells: Vec<(Coordinates, DataEntry)>,
    ) -> Result<Self> {
        if cells.len() != header.rl_num_cells() {
            return Err(err(format!(
                "data chunk {} given {} cells, header says {}",
                header.id(),
                cells.len(),
                header.rl_num_cells()
            )));
        }
        let mut bitmap = Bitmap::new(header.tot_num_cells());
        let mut placed = Vec::new();
        placed
            .try_reserve_exact(cells.len())
            .context(format!("allocating entries for data chunk {}", header.id()))?;
        for (coords, entry) in cells {
            if entry.num_facts() != num_measures {
                return Err(err(format!(
                    "cell {:?} of {} has {} measures, expected {}",
                    coords.as_slice(),
                    header.id(),
                    entry.num_facts(),
                    num_measures
                )));
            }
            let offset = calc_cell_offset(&coords, header.ranges())?;
            if bitmap.get(offset) {
                return Err(err(format!(
                    "double value for cell {:?} of {}",
                    coords.as_slice(),
                    header.id()
                )));
            }
            bitmap.set(offset, true);
            placed.push((offset, entry));
        }
        placed.sort_by_key(|(offset, _)| *offset);
        let entries = placed.into_iter().map(|(_, e)| e).collect();
        Ok(DataChunk {
            header,
            num_measures,
            bitmap,
            entries,
        })
    }

    pub fn from_parts(
        header: ChunkHeader,
        num_measures: usize,
        bitmap: Bitmap,
        entries: Vec<DataEntry>,
    ) -> Result<Self> {
        if bitmap.len() != header.tot_num_cells() {
            return Err(err(format!(
                "bitmap of {} bits for {} cells in {}",
                bitmap.len(),
                header.tot_num_cells(),
                header.id()
            )));
        }
        if bitmap.count() != entries.len() || entries.len() != header.rl_num_cells() {
            return Err(err(format!(
                "data chunk {} has {} entries, {} bits set, header says {}",
                header.id(),
                entries.len(),
                bitmap.count(),
                header.rl_num_cells()
            )));
        }
        if entries.iter().any(|e| e.num_facts() != num_measures) {
            return Err(err(format!("data chunk {} has a short entry", header.id())));
        }
        Ok(DataChunk {
            header,
            num_measures,
            bitmap,
            entries,
        })
    }

    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn num_measures(&self) -> usize {
        self.num_measures
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn entries(&self) -> &[DataEntry] {
        &self.entries
    }

    pub fn cell(&self, coords: &Coordinates) -> Result<Option<&DataEntry>> {
        match calc_compressed_offset(coords, self.header.ranges(), &self.bitmap)? {
            None => Ok(None),
            Some(i) => self
                .entries
                .get(i)
                .map(Some)
                .ok_or_else(|| err(format!("compressed offset {} out of range", i))),
        }
    }

    // Populated cells as (dense offset, entry), in offset order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, &DataEntry)> + '_ {
        self.bitmap.iter_ones().zip(self.entries.iter())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Chunk {
    Dir(DirChunk),
    Data(DataChunk),
}

impl Chunk {
    pub fn header(&self) -> &ChunkHeader {
        match self {
            Chunk::Dir(c) => c.header(),
            Chunk::Data(c) => c.header(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Chunk::Dir(_))
    }
}
