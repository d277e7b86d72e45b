use super::{deep_facts, deep_schema, fact_stream, flat_schema, sales_facts, sales_schema};
use crate::{
    chunk::{DataEntry, DirEntry},
    costtree::{ChunkKind, CostTree, NodeIdx},
    disk::BUCKET_HEADER_BYTES,
    layout::{assign_slots, materialize, CellValues, LayoutOrder, RegionMember, Scope},
    split::split_data_node,
    store::{BucketId, RecordId},
};
use cubefile_base::Result;
use test_log::test;

#[test]
fn test_assign_slots() -> Result<()> {
    let schema = sales_schema()?;
    let mut facts = sales_facts();
    let tree = CostTree::build(&schema, &mut facts)?;
    let whole = [RegionMember {
        node: tree.root(),
        scope: Scope::Subtree,
    }];

    let bf = assign_slots(&tree, &whole, LayoutOrder::BreadthFirst)?;
    let df = assign_slots(&tree, &whole, LayoutOrder::DepthFirst)?;
    for a in [&bf, &df] {
        assert_eq!(a.dirs.len(), 5);
        assert_eq!(a.datas.len(), 24);
        assert_eq!(a.dirs[0], tree.root());
    }
    assert_eq!(bf.dirs[1..], tree.node(tree.root()).children()[..]);
    assert_eq!(df.dirs[1..], tree.node(tree.root()).children()[..]);
    // Depth-first keeps each directory's data chunks together.
    let first = tree.node(tree.root()).children()[0];
    let n = tree.node(first).children().len();
    assert_eq!(df.datas[..n], tree.node(first).children()[..]);
    // Breadth-first goes level by level; the same holds here since the
    // data chunks all sit on the last level.
    assert_eq!(bf.datas[..n], tree.node(first).children()[..]);

    let slots: Vec<u16> = bf.slots().map(|(s, _)| s).collect();
    assert_eq!(slots, (0..29).collect::<Vec<u16>>());

    let only = [RegionMember {
        node: first,
        scope: Scope::ChunkOnly,
    }];
    let a = assign_slots(&tree, &only, LayoutOrder::DepthFirst)?;
    assert_eq!(a.num_chunks(), 1);
    assert!(assign_slots(&tree, &[], LayoutOrder::DepthFirst).is_err());
    Ok(())
}

#[test]
fn test_deep_slot_orders() -> Result<()> {
    let schema = deep_schema()?;
    let mut facts = deep_facts();
    let tree = CostTree::build(&schema, &mut facts)?;
    assert_eq!(tree.max_depth(), 3);
    let whole = [RegionMember {
        node: tree.root(),
        scope: Scope::Subtree,
    }];
    let ids = |nodes: &[NodeIdx]| -> Vec<String> {
        nodes
            .iter()
            .map(|n| tree.node(*n).header().id().as_str().to_string())
            .collect()
    };

    let df = assign_slots(&tree, &whole, LayoutOrder::DepthFirst)?;
    let bf = assign_slots(&tree, &whole, LayoutOrder::BreadthFirst)?;
    assert_eq!(
        ids(&df.dirs),
        ["root", "0|0", "0|0.0|0", "0|0.1|0", "1|0", "1|0.2|0", "1|0.3|0"]
    );
    assert_eq!(
        ids(&bf.dirs),
        ["root", "0|0", "1|0", "0|0.0|0", "0|0.1|0", "1|0.2|0", "1|0.3|0"]
    );
    assert_ne!(df.dirs, bf.dirs);

    // Both orders are traversals of the whole tree, split by kind.
    let split = |nodes: Vec<NodeIdx>| {
        let (dirs, datas): (Vec<_>, Vec<_>) = nodes
            .into_iter()
            .partition(|n| tree.node(*n).kind() == ChunkKind::Dir);
        (dirs, datas)
    };
    assert_eq!(split(tree.preorder(tree.root())), (df.dirs.clone(), df.datas.clone()));
    assert_eq!(split(tree.level_order(tree.root())), (bf.dirs.clone(), bf.datas.clone()));
    assert_eq!(df.datas.len(), 8);
    assert_eq!(tree.node(df.datas[0]).header().id().as_str(), "0|0.0|0.0|0");
    Ok(())
}

#[test]
fn test_materialize() -> Result<()> {
    let schema = sales_schema()?;
    let mut facts = sales_facts();
    let tree = CostTree::build(&schema, &mut facts)?;
    let whole = [RegionMember {
        node: tree.root(),
        scope: Scope::Subtree,
    }];
    let bucket = BucketId::new(RecordId(1));
    let a = assign_slots(&tree, &whole, LayoutOrder::BreadthFirst)?;

    let mut placements = vec![DirEntry::NULL; tree.len()];
    let mut values = CellValues::new();
    // Unplaced children are refused.
    assert!(materialize(&tree, &a, &placements, &mut facts, &mut values).is_err());
    for (slot, idx) in a.slots() {
        placements[idx.index()] = DirEntry::new(bucket, slot);
    }
    let chunks = materialize(&tree, &a, &placements, &mut facts, &mut values)?;
    assert_eq!(chunks.dir_chunks.len(), 5);
    assert_eq!(chunks.data_chunks.len(), 24);
    assert_eq!(chunks.num_measures, 2);

    // Every directory entry names the slot its child was given.
    for (dir, idx) in chunks.dir_chunks.iter().zip(a.dirs.iter()) {
        let node = tree.node(*idx);
        for (cell, child) in node.cells().cells().iter().zip(node.children()) {
            let entry = dir.entry(&cell.extract_coords()?)?;
            assert_eq!(entry, placements[child.index()]);
            assert_eq!(entry.bucket, bucket);
        }
        let used = dir.entries().iter().filter(|e| !e.is_null()).count();
        assert_eq!(used, node.children().len());
    }
    for (data, idx) in chunks.data_chunks.iter().zip(a.datas.iter()) {
        let node = tree.node(*idx);
        assert_eq!(data.header(), node.header());
        assert_eq!(data.entries().len(), node.header().rl_num_cells());
    }
    assert!(materialize(&tree, &a, &placements[1..], &mut facts, &mut values).is_err());
    Ok(())
}

#[test]
fn test_materialize_split_reads_once() -> Result<()> {
    let schema = flat_schema(40, 1)?;
    let mut lines = Vec::new();
    for a in 0..40 {
        for b in 0..40 {
            if (a + b) % 3 != 0 {
                lines.push(format!("0|0.{}|{}\t{}", a, b, a * 40 + b));
            }
        }
    }
    let mut facts = fact_stream(&lines, 1);
    let mut tree = CostTree::build(&schema, &mut facts)?;
    let idx = tree.node(tree.root()).children()[0];
    split_data_node(&mut tree, idx, 4096 - BUCKET_HEADER_BYTES)?;
    let subs = tree.node(idx).children().to_vec();
    assert_eq!(subs.len(), 400);

    // Every sub chunk in one region, each scoped to itself.
    let members: Vec<RegionMember> = subs
        .iter()
        .map(|node| RegionMember {
            node: *node,
            scope: Scope::ChunkOnly,
        })
        .collect();
    let a = assign_slots(&tree, &members, LayoutOrder::DepthFirst)?;
    assert_eq!(a.datas, subs);
    let placements = vec![DirEntry::NULL; tree.len()];
    let mut values = CellValues::new();
    let chunks = materialize(&tree, &a, &placements, &mut facts, &mut values)?;
    assert_eq!(values.loads(), 1);
    assert_eq!(chunks.data_chunks.len(), 400);

    let mut total = 0;
    for (data, node) in chunks.data_chunks.iter().zip(subs.iter()) {
        assert_eq!(data.header(), tree.node(*node).header());
        for cell in tree.node(*node).cells().cells() {
            let coords = cell.extract_coords()?;
            let (x, y) = (coords.as_slice()[0], coords.as_slice()[1]);
            let want = DataEntry::new(vec![(x * 40 + y) as f32]);
            assert_eq!(data.cell(&coords)?, Some(&want));
        }
        total += data.entries().len();
    }
    assert_eq!(total, lines.len());

    // A second bucket under the same prefix does not read the stream again.
    materialize(&tree, &a, &placements, &mut facts, &mut values)?;
    assert_eq!(values.loads(), 1);
    Ok(())
}
