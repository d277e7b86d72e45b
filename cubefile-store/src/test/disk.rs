use crate::{
    chunk::{Chunk, DataChunk, DataEntry, DirChunk, DirEntry},
    chunkid::{ChunkId, Coordinates, PSEUDO_CODE},
    disk::{
        chunk_header_size, data_chunk_size, dir_chunk_size, DiskBucket, DiskChunkHeader,
        DiskDataChunk, BUCKET_HEADER_BYTES,
    },
    header::ChunkHeader,
    ioutil::{ByteReader, ByteWriter},
    layout::BucketChunks,
    range::LevelRange,
    store::{BucketId, RecordId},
};
use cubefile_base::Result;
use test_log::test;

fn sample_header() -> Result<ChunkHeader> {
    ChunkHeader::dense(
        ChunkId::new("0|1"),
        vec![
            LevelRange::new("a", "x", 0, 1)?,
            LevelRange::new("b", "y", 2, 3)?,
        ],
    )
}

#[test]
fn test_header_bytes() -> Result<()> {
    let disk = DiskChunkHeader::from_header(&sample_header()?, 1)?;
    let mut wr = ByteWriter::new(64);
    disk.write(&mut wr)?;
    let bytes = wr.into_inner();
    #[rustfmt::skip]
    let expect: [u8; 19] = [
        1, 2, 1, 4, 0,      // depth, no_dims, no_measures, no_entries
        7, 0,               // domain 0 starts 7 bytes in
        0, 0, 1, 0,         // order-codes 0|1
        0, 0, 1, 0,         // range [0, 1]
        2, 0, 3, 0,         // range [2, 3]
    ];
    assert_eq!(bytes, expect);
    assert_eq!(bytes.len(), chunk_header_size(1, 2));
    assert_eq!(disk.size(), bytes.len());

    let mut rd = ByteReader::new(&bytes);
    let back = DiskChunkHeader::read(&mut rd)?;
    assert_eq!(rd.remaining(), 0);
    assert_eq!(back, disk);
    assert_eq!(back.chunk_id()?.as_str(), "0|1");
    let header = back.to_header(4)?;
    assert_eq!(header.ranges()[1].ends(), (2, 3));
    Ok(())
}

#[test]
fn test_header_bad_domain_slot() -> Result<()> {
    let disk = DiskChunkHeader::from_header(&sample_header()?, 1)?;
    let mut wr = ByteWriter::new(64);
    disk.write(&mut wr)?;
    let mut bytes = wr.into_inner();
    bytes[5] = 9;
    assert!(DiskChunkHeader::read(&mut ByteReader::new(&bytes)).is_err());
    assert!(DiskChunkHeader::read(&mut ByteReader::new(&bytes[..10])).is_err());
    Ok(())
}

#[test]
fn test_null_range_on_disk() -> Result<()> {
    let header = ChunkHeader::dense(
        ChunkId::root(),
        vec![LevelRange::new("a", "x", 0, 1)?, LevelRange::null("p", "all")],
    )?;
    let disk = DiskChunkHeader::from_header(&header, 2)?;
    let mut wr = ByteWriter::new(64);
    disk.write(&mut wr)?;
    let bytes = wr.into_inner();
    assert_eq!(bytes, vec![0, 2, 2, 2, 0, 0, 0, 1, 0, 0xff, 0xff, 0xff, 0xff]);
    let back = DiskChunkHeader::read(&mut ByteReader::new(&bytes))?.to_header(2)?;
    assert!(back.id().is_root());
    assert!(back.ranges()[1].is_null());
    assert_eq!(back.tot_num_cells(), 2);
    Ok(())
}

fn sample_bucket_chunks() -> Result<BucketChunks> {
    let root = ChunkHeader::dense(
        ChunkId::root(),
        vec![LevelRange::new("a", "x", 0, 1)?, LevelRange::null("p", "all")],
    )?;
    let mut dir = DirChunk::new(root)?;
    let child = DirEntry::new(BucketId::new(RecordId(5)), 1);
    dir.set_entry(&Coordinates::new(vec![1, PSEUDO_CODE]), child)?;

    let header = ChunkHeader::new(
        ChunkId::new("1|-1"),
        vec![LevelRange::new("a", "xx", 0, 3)?, LevelRange::new("p", "y", 0, 1)?],
        3,
    )?;
    let cells = vec![
        (Coordinates::new(vec![3, 1]), DataEntry::new(vec![7.0, 0.25])),
        (Coordinates::new(vec![0, 0]), DataEntry::new(vec![1.0, 2.0])),
        (Coordinates::new(vec![2, 1]), DataEntry::new(vec![-3.5, 4.0])),
    ];
    let data = DataChunk::from_cells(header, 2, cells)?;
    Ok(BucketChunks {
        num_measures: 2,
        dir_chunks: vec![dir],
        data_chunks: vec![data],
    })
}

#[test]
fn test_data_chunk_layout() -> Result<()> {
    let chunks = sample_bucket_chunks()?;
    let data = &chunks.data_chunks[0];
    // Cells (0,0), (2,1), (3,1) sit at dense offsets 0, 5, 7.
    assert_eq!(data.bitmap().words(), &[0b1010_0001]);
    let disk = DiskDataChunk::from_chunk(data)?;
    assert_eq!(disk.no_ace, 3);
    assert_eq!(disk.measures, vec![1.0, 2.0, -3.5, 4.0, 7.0, 0.25]);
    assert_eq!(disk.size(), data_chunk_size(1, 2, 8, 3, 2));
    Ok(())
}

#[test]
fn test_bucket_round_trip() -> Result<()> {
    let chunks = sample_bucket_chunks()?;
    let id = BucketId::new(RecordId(5));
    let bucket = DiskBucket::build(id, &chunks, 512)?;
    let image = bucket.as_bytes();
    assert_eq!(image.len(), 512);
    assert_eq!(&image[..8], &5_u64.to_le_bytes());
    assert_eq!(bucket.no_chunks(), 2);
    assert_eq!(bucket.no_dir_chunks(), 1);
    let used = BUCKET_HEADER_BYTES + 2 * 2 + dir_chunk_size(0, 2, 2) + data_chunk_size(1, 2, 8, 3, 2);
    assert_eq!(bucket.free_bytes(), 512 - used);
    assert!(image[used..].iter().all(|b| *b == 0));

    let back = DiskBucket::from_bytes(image.to_vec(), 512)?;
    assert_eq!(back.id(), id);
    match back.chunk(0)? {
        Chunk::Dir(dir) => {
            assert_eq!(dir.entries(), chunks.dir_chunks[0].entries());
            assert_eq!(dir.entries()[0], DirEntry::NULL);
            assert!(dir.header().id().is_root());
        }
        Chunk::Data(_) => panic!("slot 0 should hold the directory chunk"),
    }
    match back.chunk(1)? {
        Chunk::Data(data) => {
            let orig = &chunks.data_chunks[0];
            assert_eq!(data.bitmap(), orig.bitmap());
            assert_eq!(data.entries(), orig.entries());
            assert_eq!(data.header().id().as_str(), "1|-1");
            let cell = data.cell(&Coordinates::new(vec![2, 1]))?.expect("populated cell");
            assert_eq!(cell.facts[0].0, -3.5);
            assert!(data.cell(&Coordinates::new(vec![1, 1]))?.is_none());
        }
        Chunk::Dir(_) => panic!("slot 1 should hold the data chunk"),
    }
    assert!(back.chunk(2).is_err());
    assert_eq!(back.chunks()?.len(), 2);
    Ok(())
}

#[test]
fn test_bucket_overflow_and_corruption() -> Result<()> {
    let chunks = sample_bucket_chunks()?;
    let id = BucketId::new(RecordId(5));
    assert!(DiskBucket::build(id, &chunks, 100).is_err());

    let bucket = DiskBucket::build(id, &chunks, 512)?;
    assert!(DiskBucket::from_bytes(bucket.as_bytes()[..511].to_vec(), 512).is_err());

    // Point slot 1 into the middle of the directory chunk.
    let mut image = bucket.as_bytes().to_vec();
    image[BUCKET_HEADER_BYTES + 2] = 30;
    image[BUCKET_HEADER_BYTES + 3] = 0;
    let bad = DiskBucket::from_bytes(image, 512)?;
    assert!(bad.chunk(0).is_err() || bad.chunk(1).is_err());

    // An empty page claiming to be filled past its end.
    let mut image = vec![0_u8; 512];
    image[12..14].copy_from_slice(&513_u16.to_le_bytes());
    assert!(DiskBucket::from_bytes(image.clone(), 512).is_err());
    image[12..14].copy_from_slice(&512_u16.to_le_bytes());
    assert_eq!(DiskBucket::from_bytes(image, 512)?.free_bytes(), 0);
    let fresh = DiskBucket::from_bytes(vec![0_u8; 512], 512)?;
    assert_eq!(fresh.no_chunks(), 0);
    assert_eq!(fresh.free_bytes(), 512);
    Ok(())
}

#[test]
fn test_bucket_dump() -> Result<()> {
    let chunks = sample_bucket_chunks()?;
    let (bucket, dump) = DiskBucket::build_with_dump(BucketId::new(RecordId(5)), &chunks, 512)?;
    assert_eq!(bucket.no_chunks(), 2);
    assert!(dump.contains("bucket.next_free"));
    assert!(dump.contains("bucket.chunk0.entries.1.slot"));
    assert!(dump.contains("bucket.chunk1.bitmap"));
    assert!(dump.contains("bucket.free"));
    assert!(!dump.contains("ERROR"));
    assert!(!dump.contains("unannotated"));
    Ok(())
}
