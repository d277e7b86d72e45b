// A cube is cut into chunks along the levels of its dimension
// hierarchies. The root chunk covers the top level of every dimension;
// each of its cells is a chunk covering the children of one member per
// dimension, and so on down to the data chunks, whose cells hold the
// measures at grain level:
//
//   root                   depth 0, directory chunk
//   0|1                    depth 1, directory or data chunk
//   0|1.3|0                depth 2, ...
//
// A chunk id is its path from the root: one `.`-separated domain per
// level, each a `|`-separated order-code per dimension. A dimension with
// fewer real levels than the others is padded at the top with pseudo
// levels, whose single member has code -1 and whose range is NULL.
//
// Directory chunks are dense: one entry per cell, pointing at the bucket
// and slot of the child chunk. Data chunks are sparse: a bitmap over all
// cells marks the populated ones and only those carry measures.
//
// Chunks are packed into buckets of one page each. Small subtrees share a
// bucket, large ones are taken apart, and data chunks too big for any
// bucket are split by slipping an artificial level into their dimensions.
// Each bucket is a record in an external record store; a manifest record
// names the root chunk and the buckets of the cube.
//
// Building a cube goes fact stream -> cost tree -> regions -> slots ->
// chunk vectors -> bucket images -> records.

pub mod cellmap;
pub mod chunk;
pub mod chunkid;
pub mod cluster;
pub mod config;
pub mod costtree;
pub mod cube;
pub mod disk;
pub mod facts;
pub mod header;
mod ioutil;
pub mod layout;
pub mod offset;
pub mod placement;
pub mod range;
pub mod schema;
pub mod split;
pub mod store;


pub use chunk::{Chunk, DataChunk, DataEntry, DirChunk, DirEntry, Measure};
pub use chunkid::{ChunkId, Coordinates, PSEUDO_CODE};
pub use config::StorageConfig;
pub use cube::{CubeManifest, CubeReader, CubeWriter};
pub use facts::FactStream;
pub use header::ChunkHeader;
pub use layout::LayoutOrder;
pub use range::LevelRange;
pub use schema::{CubeSchema, Dimension};
pub use store::{BucketId, MemRecordStore, RecordId, RecordStore, VolumeId};
