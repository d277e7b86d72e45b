use crate::disk::DiskBucket;
use cubefile_base::{err, Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    panic::Location,
};
use tracing::{debug, info};

// The record store is an external collaborator: a transactional file of
// variable-length records, addressed by (volume, record id). We consume it
// through this narrow trait. A bucket is one record whose body is the full
// page image; nothing goes in the record header.

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct VolumeId(pub u16);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct FileId(pub u32);

// Record ids start at 1; 0 is never handed out.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    pub const NULL: RecordId = RecordId(0);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BucketId(RecordId);

impl BucketId {
    pub const NULL: BucketId = BucketId(RecordId::NULL);

    pub fn new(rid: RecordId) -> Self {
        BucketId(rid)
    }

    pub fn is_null(&self) -> bool {
        self.0 == RecordId::NULL
    }

    pub fn record(&self) -> RecordId {
        self.0
    }

    pub fn to_u64(&self) -> u64 {
        (self.0).0
    }

    pub fn from_u64(v: u64) -> Self {
        BucketId(RecordId(v))
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bucket#{}", (self.0).0)
    }
}

// Store status codes; 0 is success.
pub const STATUS_OK: i32 = 0;
pub const STATUS_NO_FILE: i32 = 1;
pub const STATUS_NO_RECORD: i32 = 2;
pub const STATUS_FILE_IN_USE: i32 = 3;

pub struct StoreFailure {
    pub op: &'static str,
    pub status: i32,
    pub location: &'static Location<'static>,
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record store {} failed with status {} at {}",
            self.op, self.status, self.location
        )
    }
}

impl fmt::Debug for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for StoreFailure {}

#[track_caller]
pub fn store_failure(op: &'static str, status: i32) -> Error {
    Error::new(StoreFailure {
        op,
        status,
        location: Location::caller(),
    })
}

// Turns a non-zero store status into an error naming the call site.
#[track_caller]
pub fn check_status(op: &'static str, status: i32) -> Result<()> {
    if status == STATUS_OK {
        Ok(())
    } else {
        Err(store_failure(op, status))
    }
}

pub trait RecordStore {
    fn create_file(&mut self, vol: VolumeId) -> Result<FileId>;
    fn destroy_file(&mut self, vol: VolumeId, file: FileId) -> Result<()>;
    fn create_record(
        &mut self,
        vol: VolumeId,
        file: FileId,
        header: &[u8],
        body: &[u8],
        size_hint: usize,
    ) -> Result<RecordId>;
    fn read_record(&self, vol: VolumeId, rid: RecordId) -> Result<Vec<u8>>;
    fn write_record(&mut self, vol: VolumeId, rid: RecordId, body: &[u8]) -> Result<()>;
    fn destroy_record(&mut self, vol: VolumeId, rid: RecordId) -> Result<()>;
}

#[derive(Clone, Debug)]
struct MemRecord {
    file: FileId,
    header: Vec<u8>,
    body: Vec<u8>,
}

// A record store held entirely in memory.
#[derive(Clone, Debug, Default)]
pub struct MemRecordStore {
    files: BTreeMap<(VolumeId, FileId), BTreeSet<RecordId>>,
    records: BTreeMap<(VolumeId, RecordId), MemRecord>,
    next_file: u32,
    next_record: u64,
}

impl MemRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }

    pub fn num_files(&self) -> usize {
        self.files.len()
    }

    pub fn record_header(&self, vol: VolumeId, rid: RecordId) -> Result<&[u8]> {
        match self.records.get(&(vol, rid)) {
            Some(rec) => Ok(&rec.header),
            None => Err(store_failure("read_record", STATUS_NO_RECORD)),
        }
    }
}

impl RecordStore for MemRecordStore {
    fn create_file(&mut self, vol: VolumeId) -> Result<FileId> {
        self.next_file += 1;
        let file = FileId(self.next_file);
        self.files.insert((vol, file), BTreeSet::new());
        Ok(file)
    }

    fn destroy_file(&mut self, vol: VolumeId, file: FileId) -> Result<()> {
        let status = match self.files.get(&(vol, file)) {
            None => STATUS_NO_FILE,
            Some(recs) if !recs.is_empty() => STATUS_FILE_IN_USE,
            Some(_) => STATUS_OK,
        };
        check_status("destroy_file", status)?;
        self.files.remove(&(vol, file));
        Ok(())
    }

    fn create_record(
        &mut self,
        vol: VolumeId,
        file: FileId,
        header: &[u8],
        body: &[u8],
        size_hint: usize,
    ) -> Result<RecordId> {
        let status = if self.files.contains_key(&(vol, file)) {
            STATUS_OK
        } else {
            STATUS_NO_FILE
        };
        check_status("create_record", status)?;
        self.next_record += 1;
        let rid = RecordId(self.next_record);
        let mut stored = Vec::with_capacity(size_hint.max(body.len()));
        stored.extend_from_slice(body);
        self.records.insert(
            (vol, rid),
            MemRecord {
                file,
                header: header.to_vec(),
                body: stored,
            },
        );
        if let Some(recs) = self.files.get_mut(&(vol, file)) {
            recs.insert(rid);
        }
        Ok(rid)
    }

    fn read_record(&self, vol: VolumeId, rid: RecordId) -> Result<Vec<u8>> {
        match self.records.get(&(vol, rid)) {
            Some(rec) => Ok(rec.body.clone()),
            None => Err(store_failure("read_record", STATUS_NO_RECORD)),
        }
    }

    fn write_record(&mut self, vol: VolumeId, rid: RecordId, body: &[u8]) -> Result<()> {
        match self.records.get_mut(&(vol, rid)) {
            Some(rec) => {
                rec.body.clear();
                rec.body.extend_from_slice(body);
                Ok(())
            }
            None => Err(store_failure("write_record", STATUS_NO_RECORD)),
        }
    }

    fn destroy_record(&mut self, vol: VolumeId, rid: RecordId) -> Result<()> {
        match self.records.remove(&(vol, rid)) {
            Some(rec) => {
                if let Some(recs) = self.files.get_mut(&(vol, rec.file)) {
                    recs.remove(&rid);
                }
                Ok(())
            }
            None => Err(store_failure("destroy_record", STATUS_NO_RECORD)),
        }
    }
}

pub trait BucketAllocator {
    fn allocate_bucket(&mut self) -> Result<BucketId>;
}

// The buckets of one cube: a record-store file of page-sized records.
pub struct BucketFile<'a, S: RecordStore> {
    store: &'a mut S,
    volume: VolumeId,
    file: FileId,
    page_size: usize,
    allocated: Vec<BucketId>,
}

impl<'a, S: RecordStore> BucketFile<'a, S> {
    pub fn create(store: &'a mut S, volume: VolumeId, page_size: usize) -> Result<Self> {
        let file = store.create_file(volume)?;
        debug!(?volume, ?file, "created bucket file");
        Ok(BucketFile {
            store,
            volume,
            file,
            page_size,
            allocated: Vec::new(),
        })
    }

    pub fn volume(&self) -> VolumeId {
        self.volume
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    pub fn allocated(&self) -> &[BucketId] {
        &self.allocated
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut *self.store
    }

    pub fn write_bucket(&mut self, bucket: &DiskBucket) -> Result<()> {
        debug!(bucket = %bucket.id(), chunks = bucket.no_chunks(), "writing bucket");
        self.store
            .write_record(self.volume, bucket.id().record(), bucket.as_bytes())
    }

    pub fn read_bucket(&self, id: BucketId) -> Result<DiskBucket> {
        read_bucket(&*self.store, self.volume, id, self.page_size)
    }
}

impl<'a, S: RecordStore> BucketAllocator for BucketFile<'a, S> {
    fn allocate_bucket(&mut self) -> Result<BucketId> {
        let empty = vec![0_u8; self.page_size];
        let rid = self
            .store
            .create_record(self.volume, self.file, &[], &empty, self.page_size)?;
        let id = BucketId::new(rid);
        info!(bucket = %id, "allocated bucket");
        self.allocated.push(id);
        Ok(id)
    }
}

pub fn read_bucket<S: RecordStore>(
    store: &S,
    volume: VolumeId,
    id: BucketId,
    page_size: usize,
) -> Result<DiskBucket> {
    let bytes = store.read_record(volume, id.record())?;
    let bucket = DiskBucket::from_bytes(bytes, page_size)?;
    if bucket.no_chunks() > 0 && bucket.id() != id {
        return Err(err(format!("record {} holds {}", id, bucket.id())));
    }
    Ok(bucket)
}
