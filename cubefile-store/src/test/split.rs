use super::{fact_stream, flat_schema};
use crate::{
    chunkid::PSEUDO_CODE,
    costtree::{ChunkKind, CostTree},
    range::LevelRange,
    split::{create_new_hierarchies, int_root, max_dir_entries, plan_equi_grid, split_data_node},
};
use cubefile_base::Result;
use test_log::test;

#[test]
fn test_int_root() {
    assert_eq!(int_root(405, 2), 20);
    assert_eq!(int_root(400, 2), 20);
    assert_eq!(int_root(399, 2), 19);
    assert_eq!(int_root(1000, 3), 10);
    assert_eq!(int_root(999, 3), 9);
    assert_eq!(int_root(7, 1), 7);
    assert_eq!(int_root(1, 4), 1);
    assert_eq!(int_root(usize::MAX, 2), u32::MAX as usize);
}

#[test]
fn test_plan_equi_grid() -> Result<()> {
    let plan = plan_equi_grid(&[40, 40], 405)?;
    assert_eq!(plan.members, 20);
    assert_eq!(plan.max_children, vec![2, 2]);

    // Too narrow to split: stays whole under a pseudo member.
    let plan = plan_equi_grid(&[100, 5, 30], 1000)?;
    assert_eq!(plan.members, 10);
    assert_eq!(plan.max_children, vec![10, 0, 3]);
    Ok(())
}

#[test]
fn test_plan_degenerate() -> Result<()> {
    // Every count below the grid size: fall back to the smallest count.
    let plan = plan_equi_grid(&[4, 6], 10_000)?;
    assert_eq!(plan.members, 4);
    assert_eq!(plan.max_children, vec![1, 2]);

    // Single-member dimensions go pseudo and the smallest of the rest
    // sets the grid.
    let plan = plan_equi_grid(&[1, 9, 12], 2197)?;
    assert_eq!(plan.members, 9);
    assert_eq!(plan.max_children, vec![0, 1, 2]);

    let plan = plan_equi_grid(&[1, 3, 5], 1_000_000)?;
    assert_eq!(plan.members, 3);
    assert_eq!(plan.max_children, vec![0, 1, 2]);

    // A cube of one cell cannot be split.
    let e = plan_equi_grid(&[1, 1], 100).unwrap_err();
    assert!(e.message().contains("redesign"));

    // A grid of one member makes no progress.
    assert!(plan_equi_grid(&[50, 50], 3).is_err());
    Ok(())
}

#[test]
fn test_hierarchy_coverage() -> Result<()> {
    let ranges = vec![
        LevelRange::new("a", "day", 10, 32)?,
        LevelRange::new("b", "city", 0, 4)?,
    ];
    let plan = plan_equi_grid(&[23, 5], 49)?;
    assert_eq!(plan.members, 7);
    let hier = create_new_hierarchies(&ranges, &plan)?;

    let a = &hier[0];
    assert!(!a.pseudo);
    assert_eq!(a.parents.len(), 7);
    let mut next = 10;
    let mut total = 0;
    for (lo, hi) in a.parents.iter() {
        assert_eq!(*lo, next);
        assert!(hi >= lo);
        total += (hi - lo + 1) as usize;
        next = hi + 1;
    }
    assert_eq!(total, 23);
    assert_eq!(next, 33);
    // Dealt round-robin, the first two members get a fourth child.
    let sizes: Vec<i32> = a.parents.iter().map(|(lo, hi)| hi - lo + 1).collect();
    assert_eq!(sizes, vec![4, 4, 3, 3, 3, 3, 3]);
    assert_eq!(a.parent_of(10), Some(0));
    assert_eq!(a.parent_of(32), Some(6));
    assert_eq!(a.parent_of(33), None);

    let b = &hier[1];
    assert!(b.pseudo);
    assert_eq!(b.parents, vec![(0, 4)]);
    assert_eq!(b.parent_of(3), Some(PSEUDO_CODE));
    assert_eq!(b.children_of(PSEUDO_CODE), Some((0, 4)));
    assert_eq!(b.children_of(0), None);
    Ok(())
}

#[test]
fn test_split_data_node() -> Result<()> {
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
    let facts_before = tree.node(idx).cells().len();
    let capacity = 4096 - crate::disk::BUCKET_HEADER_BYTES;
    assert_eq!(max_dir_entries(1, 2, capacity), 405);

    split_data_node(&mut tree, idx, capacity)?;
    let dir = tree.node(idx);
    assert_eq!(dir.kind(), ChunkKind::Dir);
    assert_eq!(dir.header().id().as_str(), "0|0");
    assert_eq!(dir.header().tot_num_cells(), 400);
    assert!(tree.chunk_cost(idx) <= capacity);
    assert_eq!(dir.children().len(), 400);

    let mut facts_after = 0;
    for child in dir.children() {
        let sub = tree.node(*child);
        assert_eq!(sub.kind(), ChunkKind::Data);
        assert_eq!(sub.header().depth(), 2);
        assert_eq!(sub.header().tot_num_cells(), 4);
        assert_eq!(sub.fact_prefix().as_str(), "0|0");
        for cell in sub.cells().cells() {
            assert!(sub.header().contains(&cell.extract_coords()?));
        }
        facts_after += sub.cells().len();
    }
    assert_eq!(facts_after, facts_before);
    assert_eq!(tree.count_data_chunks(tree.root()), 400);
    Ok(())
}
