use crate::{
    chunk::{Chunk, DataChunk, DataEntry, DirChunk, DirEntry},
    chunkid::{ChunkId, Coordinates},
    header::ChunkHeader,
    ioutil::{ByteReader, ByteWriter},
    layout::BucketChunks,
    range::LevelRange,
    store::BucketId,
};
use cubefile_base::{err, Bitmap, Result, Word};
use std::mem::size_of;

// On-disk chunk and bucket images. All numbers are little-endian.
//
// Chunk header (variable length):
//
//   depth: u8, no_dims: u8, no_measures: u8, no_entries: u16
//   domain_slots: depth x u16   -- byte offset, from the header start, of
//                                  each domain's order-codes
//   order_codes: depth x no_dims x i16
//   ranges: no_dims x (left: i16, right: i16)   -- NULL range is (-1, -1)
//
// Directory chunk: header, entries_at: u32 (byte offset of the entries
// from the chunk start), then no_entries x (bucket: u64, slot: u16).
//
// Data chunk: header, no_ace: u16, bitmap: ceil(no_entries / 32) x u32,
// then no_ace x no_measures x f32.
//
// Bucket (one page):
//
//   id: u64, no_chunks: u16, no_dir_chunks: u16, next_free: u16
//   slots: no_chunks x u16      -- byte offset of each chunk image
//   chunk images, directory chunks first
//   zero fill to the page size

pub type OrderCode = i16;
pub type EntryCount = u16;
pub type ChunkSlot = u16;
pub type DomainSlot = u16;
pub type EntriesAt = u32;
pub type PageOffset = u16;
pub type StoredBucketId = u64;
pub type StoredMeasure = f32;

pub const HEADER_FIXED_BYTES: usize = 3 * size_of::<u8>() + size_of::<EntryCount>();
pub const DOMAIN_SLOT_BYTES: usize = size_of::<DomainSlot>();
pub const ORDER_CODE_BYTES: usize = size_of::<OrderCode>();
pub const RANGE_BYTES: usize = 2 * ORDER_CODE_BYTES;
pub const ENTRIES_AT_BYTES: usize = size_of::<EntriesAt>();
pub const DIR_ENTRY_BYTES: usize = size_of::<StoredBucketId>() + size_of::<ChunkSlot>();
pub const NO_ACE_BYTES: usize = size_of::<EntryCount>();
pub const WORD_BYTES: usize = size_of::<Word>();
pub const MEASURE_BYTES: usize = size_of::<StoredMeasure>();
pub const BUCKET_HEADER_BYTES: usize = size_of::<StoredBucketId>() + 3 * size_of::<PageOffset>();
pub const SLOT_BYTES: usize = size_of::<PageOffset>();

pub fn chunk_header_size(depth: usize, no_dims: usize) -> usize {
    HEADER_FIXED_BYTES
        + depth * DOMAIN_SLOT_BYTES
        + depth * no_dims * ORDER_CODE_BYTES
        + no_dims * RANGE_BYTES
}

pub fn dir_chunk_size(depth: usize, no_dims: usize, no_entries: usize) -> usize {
    chunk_header_size(depth, no_dims) + ENTRIES_AT_BYTES + no_entries * DIR_ENTRY_BYTES
}

pub fn data_chunk_size(
    depth: usize,
    no_dims: usize,
    no_entries: usize,
    no_ace: usize,
    no_measures: usize,
) -> usize {
    chunk_header_size(depth, no_dims)
        + NO_ACE_BYTES
        + Bitmap::words_for(no_entries) * WORD_BYTES
        + no_ace * no_measures * MEASURE_BYTES
}

// Whether a chunk's cell count can be recorded in `no_entries`.
pub fn fits_entry_limit(header: &ChunkHeader) -> bool {
    header.tot_num_cells() <= EntryCount::MAX as usize
}

fn narrow<T: TryFrom<usize>>(v: usize, what: &str) -> Result<T> {
    T::try_from(v).map_err(|_| err(format!("{} {} does not fit its on-disk field", what, v)))
}

fn narrow_code(v: i32, what: &str) -> Result<OrderCode> {
    OrderCode::try_from(v).map_err(|_| err(format!("{} {} does not fit an order-code", what, v)))
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiskChunkHeader {
    pub depth: u8,
    pub no_dims: u8,
    pub no_measures: u8,
    pub no_entries: EntryCount,
    // depth x no_dims, one domain after another
    pub order_codes: Vec<OrderCode>,
    pub ranges: Vec<(OrderCode, OrderCode)>,
}

impl DiskChunkHeader {
    pub fn from_header(header: &ChunkHeader, no_measures: usize) -> Result<Self> {
        let depth = narrow::<u8>(header.depth(), "chunk depth")?;
        let no_dims = narrow::<u8>(header.num_dims(), "dimension count")?;
        let no_measures = narrow::<u8>(no_measures, "measure count")?;
        let no_entries = narrow::<EntryCount>(header.tot_num_cells(), "cell count")?;
        let mut order_codes = Vec::with_capacity(header.depth() * header.num_dims());
        for domain in header.id().domains() {
            let coords = Coordinates::from_domain(domain)?;
            if coords.len() != header.num_dims() {
                return Err(err(format!("chunk {} has a short domain", header.id())));
            }
            for c in coords.as_slice() {
                order_codes.push(narrow_code(*c, "order-code")?);
            }
        }
        if order_codes.len() != header.depth() * header.num_dims() {
            return Err(err(format!("chunk {} has the wrong number of domains", header.id())));
        }
        let mut ranges = Vec::with_capacity(header.num_dims());
        for r in header.ranges() {
            ranges.push((
                narrow_code(r.left_end, "range end")?,
                narrow_code(r.right_end, "range end")?,
            ));
        }
        Ok(DiskChunkHeader {
            depth,
            no_dims,
            no_measures,
            no_entries,
            order_codes,
            ranges,
        })
    }

    pub fn size(&self) -> usize {
        chunk_header_size(self.depth as usize, self.no_dims as usize)
    }

    pub fn domain(&self, i: usize) -> &[OrderCode] {
        let n = self.no_dims as usize;
        &self.order_codes[i * n..(i + 1) * n]
    }

    pub fn chunk_id(&self) -> Result<ChunkId> {
        let mut id = ChunkId::root();
        for i in 0..self.depth as usize {
            let coords = Coordinates::new(self.domain(i).iter().map(|c| *c as i32).collect());
            id.add_suffix_domain(&coords.to_domain())?;
        }
        Ok(id)
    }

    pub fn level_ranges(&self) -> Result<Vec<LevelRange>> {
        self.ranges
            .iter()
            .map(|(l, r)| LevelRange::anonymous(*l as i32, *r as i32))
            .collect()
    }

    pub fn to_header(&self, rl_num_cells: usize) -> Result<ChunkHeader> {
        let mut header = ChunkHeader::new(self.chunk_id()?, self.level_ranges()?, rl_num_cells)?;
        if header.tot_num_cells() != self.no_entries as usize {
            return Err(err(format!(
                "chunk {} records {} entries but its ranges span {}",
                header.id(),
                self.no_entries,
                header.tot_num_cells()
            )));
        }
        header.set_size(self.size());
        Ok(header)
    }

    pub(crate) fn write(&self, wr: &mut ByteWriter) -> Result<()> {
        let start = wr.pos();
        wr.push_context("header");
        wr.write_annotated_le_num("depth", self.depth);
        wr.write_annotated_le_num("no_dims", self.no_dims);
        wr.write_annotated_le_num("no_measures", self.no_measures);
        wr.write_annotated_le_num("no_entries", self.no_entries);
        let slots_at = wr.pos();
        let zero_slots = vec![0 as DomainSlot; self.depth as usize];
        wr.write_annotated_le_num_slice("domain_slots", &zero_slots);
        for i in 0..self.depth as usize {
            let rel = narrow::<DomainSlot>(wr.pos() - start, "domain offset")?;
            wr.patch_le_num(slots_at + i * DOMAIN_SLOT_BYTES, rel)?;
            wr.write_annotated_le_num_slice(&format!("domain{}", i), self.domain(i));
        }
        let flat: Vec<OrderCode> = self.ranges.iter().flat_map(|(l, r)| [*l, *r]).collect();
        wr.write_annotated_le_num_slice("ranges", &flat);
        wr.pop_context();
        Ok(())
    }

    pub(crate) fn read(rd: &mut ByteReader) -> Result<Self> {
        let start = rd.pos();
        let depth: u8 = rd.read_le_num()?;
        let no_dims: u8 = rd.read_le_num()?;
        let no_measures: u8 = rd.read_le_num()?;
        let no_entries: EntryCount = rd.read_le_num()?;
        let slots: Vec<DomainSlot> = rd.read_le_num_vec(depth as usize)?;
        let mut order_codes = Vec::with_capacity(depth as usize * no_dims as usize);
        for (i, slot) in slots.iter().enumerate() {
            let here = rd.pos() - start;
            if *slot as usize != here {
                return Err(err(format!(
                    "domain slot {} points at {}, codes start at {}",
                    i, slot, here
                )));
            }
            order_codes.extend(rd.read_le_num_vec::<OrderCode>(no_dims as usize)?);
        }
        let flat: Vec<OrderCode> = rd.read_le_num_vec(2 * no_dims as usize)?;
        let ranges = flat.chunks(2).map(|p| (p[0], p[1])).collect();
        Ok(DiskChunkHeader {
            depth,
            no_dims,
            no_measures,
            no_entries,
            order_codes,
            ranges,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiskDirChunk {
    pub header: DiskChunkHeader,
    pub entries: Vec<DirEntry>,
}

impl DiskDirChunk {
    pub fn from_chunk(chunk: &DirChunk, no_measures: usize) -> Result<Self> {
        Ok(DiskDirChunk {
            header: DiskChunkHeader::from_header(chunk.header(), no_measures)?,
            entries: chunk.entries().to_vec(),
        })
    }

    pub fn size(&self) -> usize {
        self.header.size() + ENTRIES_AT_BYTES + self.entries.len() * DIR_ENTRY_BYTES
    }

    pub fn into_chunk(self) -> Result<DirChunk> {
        let header = self.header.to_header(self.header.no_entries as usize)?;
        DirChunk::from_entries(header, self.entries)
    }

    pub(crate) fn write(&self, wr: &mut ByteWriter) -> Result<()> {
        let start = wr.pos();
        self.header.write(wr)?;
        let entries_at_pos = wr.pos();
        wr.write_annotated_le_num("entries_at", 0 as EntriesAt);
        let rel = narrow::<EntriesAt>(wr.pos() - start, "entries offset")?;
        wr.patch_le_num(entries_at_pos, rel)?;
        wr.push_context("entries");
        for (i, e) in self.entries.iter().enumerate() {
            wr.push_context(i);
            wr.write_annotated_le_num("bucket", e.bucket.to_u64());
            wr.write_annotated_le_num("slot", e.slot);
            wr.pop_context();
        }
        wr.pop_context();
        Ok(())
    }

    pub(crate) fn read(rd: &mut ByteReader) -> Result<Self> {
        let start = rd.pos();
        let header = DiskChunkHeader::read(rd)?;
        let entries_at: EntriesAt = rd.read_le_num()?;
        if entries_at as usize != rd.pos() - start {
            return Err(err(format!(
                "directory entries recorded at {}, found at {}",
                entries_at,
                rd.pos() - start
            )));
        }
        let n = header.no_entries as usize;
        let mut entries = Vec::new();
        entries.try_reserve_exact(n)?;
        for _ in 0..n {
            let bucket: StoredBucketId = rd.read_le_num()?;
            let slot: ChunkSlot = rd.read_le_num()?;
            entries.push(DirEntry::new(BucketId::from_u64(bucket), slot));
        }
        Ok(DiskDirChunk { header, entries })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiskDataChunk {
    pub header: DiskChunkHeader,
    pub no_ace: EntryCount,
    pub bitmap: Bitmap,
    // no_ace x no_measures, one cell after another
    pub measures: Vec<StoredMeasure>,
}

impl DiskDataChunk {
    pub fn from_chunk(chunk: &DataChunk) -> Result<Self> {
        let header = DiskChunkHeader::from_header(chunk.header(), chunk.num_measures())?;
        let no_ace = narrow::<EntryCount>(chunk.entries().len(), "populated cell count")?;
        let measures = chunk
            .entries()
            .iter()
            .flat_map(|e| e.facts.iter().map(|m| m.0))
            .collect();
        Ok(DiskDataChunk {
            header,
            no_ace,
            bitmap: chunk.bitmap().clone(),
            measures,
        })
    }

    pub fn size(&self) -> usize {
        self.header.size()
            + NO_ACE_BYTES
            + self.bitmap.words().len() * WORD_BYTES
            + self.measures.len() * MEASURE_BYTES
    }

    pub fn into_chunk(self) -> Result<DataChunk> {
        let no_measures = self.header.no_measures as usize;
        if no_measures == 0 {
            return Err(err("data chunk without measures"));
        }
        let header = self.header.to_header(self.no_ace as usize)?;
        let entries = self
            .measures
            .chunks(no_measures)
            .map(|m| DataEntry::new(m.to_vec()))
            .collect();
        DataChunk::from_parts(header, no_measures, self.bitmap, entries)
    }

    pub(crate) fn write(&self, wr: &mut ByteWriter) -> Result<()> {
        self.header.write(wr)?;
        wr.write_annotated_le_num("no_ace", self.no_ace);
        wr.write_annotated_le_num_slice("bitmap", self.bitmap.words());
        wr.write_annotated_le_num_slice("measures", &self.measures);
        Ok(())
    }

    pub(crate) fn read(rd: &mut ByteReader) -> Result<Self> {
        let header = DiskChunkHeader::read(rd)?;
        let no_ace: EntryCount = rd.read_le_num()?;
        let no_entries = header.no_entries as usize;
        let words: Vec<Word> = rd.read_le_num_vec(Bitmap::words_for(no_entries))?;
        let bitmap = Bitmap::from_words(words, no_entries)?;
        if bitmap.count() != no_ace as usize {
            return Err(err(format!(
                "data chunk bitmap has {} bits set, no_ace is {}",
                bitmap.count(),
                no_ace
            )));
        }
        let measures = rd.read_le_num_vec(no_ace as usize * header.no_measures as usize)?;
        Ok(DiskDataChunk {
            header,
            no_ace,
            bitmap,
            measures,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiskBucket {
    id: BucketId,
    no_chunks: u16,
    no_dir_chunks: u16,
    next_free: PageOffset,
    image: Vec<u8>,
}

impl DiskBucket {
    pub fn build(id: BucketId, chunks: &BucketChunks, page_size: usize) -> Result<Self> {
        let (bucket, _) = Self::serialize(id, chunks, page_size, ByteWriter::new(page_size))?;
        Ok(bucket)
    }

    // Also renders an annotated hexdump of the page.
    pub fn build_with_dump(
        id: BucketId,
        chunks: &BucketChunks,
        page_size: usize,
    ) -> Result<(Self, String)> {
        let (bucket, dump) =
            Self::serialize(id, chunks, page_size, ByteWriter::annotated(page_size))?;
        Ok((bucket, dump))
    }

    fn serialize(
        id: BucketId,
        chunks: &BucketChunks,
        page_size: usize,
        mut wr: ByteWriter,
    ) -> Result<(Self, String)> {
        let no_dir_chunks = chunks.dir_chunks.len();
        let no_chunks = no_dir_chunks + chunks.data_chunks.len();
        if no_chunks >= ChunkSlot::MAX as usize {
            return Err(err(format!("{} chunks exceed the slot limit", no_chunks)));
        }
        wr.push_context("bucket");
        wr.write_annotated_le_num("id", id.to_u64());
        wr.write_annotated_le_num("no_chunks", no_chunks as u16);
        wr.write_annotated_le_num("no_dir_chunks", no_dir_chunks as u16);
        let next_free_pos = wr.pos();
        wr.write_annotated_le_num("next_free", 0 as PageOffset);
        let slots_pos = wr.pos();
        wr.write_annotated_le_num_slice("slots", &vec![0 as PageOffset; no_chunks]);
        let mut slot = 0;
        for dir in chunks.dir_chunks.iter() {
            let at = narrow::<PageOffset>(wr.pos(), "chunk offset")?;
            wr.patch_le_num(slots_pos + slot * SLOT_BYTES, at)?;
            wr.push_context(format!("chunk{}", slot));
            DiskDirChunk::from_chunk(dir, chunks.num_measures)?.write(&mut wr)?;
            wr.pop_context();
            slot += 1;
        }
        for data in chunks.data_chunks.iter() {
            let at = narrow::<PageOffset>(wr.pos(), "chunk offset")?;
            wr.patch_le_num(slots_pos + slot * SLOT_BYTES, at)?;
            wr.push_context(format!("chunk{}", slot));
            DiskDataChunk::from_chunk(data)?.write(&mut wr)?;
            wr.pop_context();
            slot += 1;
        }
        let end = wr.pos();
        if end > page_size {
            return Err(err(format!(
                "bucket {} overflows: {} bytes for a {} byte page",
                id, end, page_size
            )));
        }
        let next_free = narrow::<PageOffset>(end, "bucket fill")?;
        wr.patch_le_num(next_free_pos, next_free)?;
        wr.pad_to("free", page_size)?;
        wr.pop_context();
        let dump = if wr.is_annotated() {
            wr.render_annotations()?
        } else {
            String::new()
        };
        let image = wr.into_inner();
        let bucket = DiskBucket {
            id,
            no_chunks: no_chunks as u16,
            no_dir_chunks: no_dir_chunks as u16,
            next_free,
            image,
        };
        Ok((bucket, dump))
    }

    pub fn from_bytes(image: Vec<u8>, page_size: usize) -> Result<Self> {
        if image.len() != page_size {
            return Err(err(format!(
                "bucket image of {} bytes for a {} byte page",
                image.len(),
                page_size
            )));
        }
        let mut rd = ByteReader::new(&image);
        let id = BucketId::from_u64(rd.read_le_num()?);
        let no_chunks: u16 = rd.read_le_num()?;
        let no_dir_chunks: u16 = rd.read_le_num()?;
        let next_free: PageOffset = rd.read_le_num()?;
        if no_dir_chunks > no_chunks {
            return Err(err("bucket has more directory chunks than chunks"));
        }
        let slots: Vec<PageOffset> = rd.read_le_num_vec(no_chunks as usize)?;
        let mut prev = rd.pos();
        for s in slots.iter() {
            if (*s as usize) < prev || *s > next_free {
                return Err(err(format!("bucket slot offset {} out of order", s)));
            }
            prev = *s as usize;
        }
        if (next_free as usize) > page_size {
            return Err(err("bucket fill past page end"));
        }
        Ok(DiskBucket {
            id,
            no_chunks,
            no_dir_chunks,
            next_free,
            image,
        })
    }

    pub fn id(&self) -> BucketId {
        self.id
    }

    pub fn no_chunks(&self) -> u16 {
        self.no_chunks
    }

    pub fn no_dir_chunks(&self) -> u16 {
        self.no_dir_chunks
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.image
    }

    pub fn free_bytes(&self) -> usize {
        self.image.len() - self.next_free as usize
    }

    fn slot_offset(&self, slot: u16) -> Result<usize> {
        let mut rd = ByteReader::new(&self.image);
        rd.seek(BUCKET_HEADER_BYTES + slot as usize * SLOT_BYTES)?;
        let at: PageOffset = rd.read_le_num()?;
        Ok(at as usize)
    }

    pub fn chunk(&self, slot: u16) -> Result<Chunk> {
        if slot >= self.no_chunks {
            return Err(err(format!(
                "slot {} past the {} chunks of {}",
                slot, self.no_chunks, self.id
            )));
        }
        let start = self.slot_offset(slot)?;
        let end = if slot + 1 < self.no_chunks {
            self.slot_offset(slot + 1)?
        } else {
            self.next_free as usize
        };
        let bytes = self
            .image
            .get(start..end)
            .ok_or_else(|| err(format!("slot {} of {} spans past the page", slot, self.id)))?;
        let mut rd = ByteReader::new(bytes);
        let chunk = if slot < self.no_dir_chunks {
            Chunk::Dir(DiskDirChunk::read(&mut rd)?.into_chunk()?)
        } else {
            Chunk::Data(DiskDataChunk::read(&mut rd)?.into_chunk()?)
        };
        if rd.remaining() != 0 {
            return Err(err(format!(
                "slot {} of {} has {} trailing bytes",
                slot,
                self.id,
                rd.remaining()
            )));
        }
        Ok(chunk)
    }

    pub fn chunks(&self) -> Result<Vec<Chunk>> {
        (0..self.no_chunks).map(|s| self.chunk(s)).collect()
    }
}
