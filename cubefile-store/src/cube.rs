use crate::{
    chunk::{Chunk, DataChunk, DataEntry, DirChunk, DirEntry},
    chunkid::{ChunkId, Coordinates},
    config::StorageConfig,
    costtree::CostTree,
    disk::DiskBucket,
    facts::FactStream,
    layout::{assign_slots, materialize, CellValues},
    placement::Planner,
    schema::CubeSchema,
    store::{read_bucket, BucketFile, BucketId, FileId, RecordId, RecordStore, VolumeId},
};
use cubefile_base::{err, Result};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Seek};
use tracing::{debug, info, trace};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub bucket: BucketId,
    // Top chunks of the region.
    pub chunks: Vec<ChunkId>,
    pub cost: usize,
}

// Everything needed to find a stored cube again.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CubeManifest {
    pub volume: VolumeId,
    pub file: FileId,
    pub page_size: usize,
    pub max_depth: usize,
    pub num_measures: usize,
    pub root: DirEntry,
    pub buckets: Vec<BucketId>,
    pub regions: Vec<RegionSummary>,
}

impl CubeManifest {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

pub struct CubeWriter<'s, S: RecordStore> {
    store: &'s mut S,
    cfg: StorageConfig,
}

impl<'s, S: RecordStore> CubeWriter<'s, S> {
    pub fn new(store: &'s mut S, cfg: StorageConfig) -> Result<Self> {
        cfg.validate()?;
        Ok(CubeWriter { store, cfg })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.cfg
    }

    // Builds, places and writes every chunk of the cube, then records the
    // manifest. Returns the manifest's record id along with it.
    pub fn write_cube<R: BufRead + Seek>(
        &mut self,
        schema: &CubeSchema,
        facts: &mut FactStream<R>,
    ) -> Result<(RecordId, CubeManifest)> {
        let mut tree = CostTree::build(schema, facts)?;
        let volume = self.cfg.volume;
        let page_size = self.cfg.page_size;
        let mut file = BucketFile::create(&mut *self.store, volume, page_size)?;
        let regions = Planner::new(&self.cfg)?.plan(&mut tree, &mut file)?;

        let mut placements = vec![DirEntry::NULL; tree.len()];
        let mut assignments = Vec::with_capacity(regions.len());
        for region in regions.iter() {
            let assignment = assign_slots(&tree, &region.members, self.cfg.layout_order)?;
            for (slot, idx) in assignment.slots() {
                placements[idx.index()] = DirEntry::new(region.bucket, slot);
            }
            assignments.push(assignment);
        }

        let mut values = CellValues::new();
        for (region, assignment) in regions.iter().zip(assignments.iter()) {
            let chunks = materialize(&tree, assignment, &placements, facts, &mut values)?;
            let bucket = if tracing::enabled!(tracing::Level::TRACE) {
                let (bucket, dump) = DiskBucket::build_with_dump(region.bucket, &chunks, page_size)?;
                trace!(bucket = %region.bucket, "bucket image:\n{}", dump);
                bucket
            } else {
                DiskBucket::build(region.bucket, &chunks, page_size)?
            };
            debug!(
                bucket = %region.bucket,
                dirs = chunks.dir_chunks.len(),
                datas = chunks.data_chunks.len(),
                free = bucket.free_bytes(),
                "materialized bucket"
            );
            file.write_bucket(&bucket)?;
        }

        let root = placements[tree.root().index()];
        if root.is_null() {
            return Err(err("root chunk was never placed"));
        }
        let manifest = CubeManifest {
            volume,
            file: file.file(),
            page_size,
            max_depth: tree.max_depth(),
            num_measures: tree.num_measures(),
            root,
            buckets: file.allocated().to_vec(),
            regions: regions
                .iter()
                .map(|r| RegionSummary {
                    bucket: r.bucket,
                    chunks: r
                        .members
                        .iter()
                        .map(|m| tree.node(m.node).header().id().clone())
                        .collect(),
                    cost: r.cost,
                })
                .collect(),
        };
        let body = manifest.to_bytes()?;
        let rid = file
            .store_mut()
            .create_record(volume, manifest.file, &[], &body, body.len())?;
        info!(
            manifest = rid.0,
            buckets = manifest.buckets.len(),
            chunks = tree.len(),
            "wrote cube"
        );
        Ok((rid, manifest))
    }

    // Removes the buckets, the manifest and the file of a stored cube.
    pub fn destroy(&mut self, volume: VolumeId, manifest_rid: RecordId) -> Result<()> {
        let bytes = self.store.read_record(volume, manifest_rid)?;
        let manifest = CubeManifest::from_bytes(&bytes)?;
        for bucket in manifest.buckets.iter() {
            self.store.destroy_record(manifest.volume, bucket.record())?;
        }
        self.store.destroy_record(volume, manifest_rid)?;
        self.store.destroy_file(manifest.volume, manifest.file)?;
        info!(manifest = manifest_rid.0, buckets = manifest.buckets.len(), "destroyed cube");
        Ok(())
    }
}

pub struct CubeReader<'s, S: RecordStore> {
    store: &'s S,
    manifest: CubeManifest,
}

impl<'s, S: RecordStore> CubeReader<'s, S> {
    pub fn open(store: &'s S, volume: VolumeId, manifest_rid: RecordId) -> Result<Self> {
        let bytes = store.read_record(volume, manifest_rid)?;
        Ok(Self::new(store, CubeManifest::from_bytes(&bytes)?))
    }

    pub fn new(store: &'s S, manifest: CubeManifest) -> Self {
        CubeReader { store, manifest }
    }

    pub fn manifest(&self) -> &CubeManifest {
        &self.manifest
    }

    pub fn load_chunk(&self, entry: DirEntry) -> Result<Chunk> {
        if entry.is_null() {
            return Err(err("cannot load a chunk through a null entry"));
        }
        let bucket = read_bucket(
            self.store,
            self.manifest.volume,
            entry.bucket,
            self.manifest.page_size,
        )?;
        bucket.chunk(entry.slot)
    }

    // The measures of the cell named by a fact id, or None if the cube has
    // no value there.
    pub fn get_cell(&self, cell: &ChunkId) -> Result<Option<DataEntry>> {
        let depth = cell.depth()?;
        if depth != self.manifest.max_depth + 1 {
            return Err(err(format!(
                "{} is not a cell id: depth {}, cells sit at depth {}",
                cell,
                depth,
                self.manifest.max_depth + 1
            )));
        }
        let grain = cell.extract_coords()?;
        let mut chunk = self.load_chunk(self.manifest.root)?;
        loop {
            let dir = match chunk {
                Chunk::Data(data) => {
                    trace!(cell = %cell, chunk = %data.header().id(), "data chunk reached");
                    return Ok(data.cell(&grain)?.cloned());
                }
                Chunk::Dir(dir) => dir,
            };
            let here = dir.header().depth();
            if here < self.manifest.max_depth {
                let coords = Coordinates::from_domain(cell.domain_at(here + 1)?)?;
                let entry = dir.entry(&coords)?;
                if entry.is_null() {
                    return Ok(None);
                }
                chunk = self.load_chunk(entry)?;
                continue;
            }
            // A split level: find the data chunk holding the grain.
            match self.search_split(&dir, &grain)? {
                Some(data) => chunk = Chunk::Data(data),
                None => return Ok(None),
            }
        }
    }

    // Below a split every directory is artificial and its children are
    // keyed by grid codes, so the data chunks are told apart by their
    // ranges.
    fn search_split(&self, dir: &DirChunk, grain: &Coordinates) -> Result<Option<DataChunk>> {
        for entry in dir.entries().iter().filter(|e| !e.is_null()) {
            match self.load_chunk(*entry)? {
                Chunk::Data(data) => {
                    if data.header().contains(grain) {
                        return Ok(Some(data));
                    }
                }
                Chunk::Dir(sub) => {
                    if let Some(data) = self.search_split(&sub, grain)? {
                        return Ok(Some(data));
                    }
                }
            }
        }
        Ok(None)
    }
}
