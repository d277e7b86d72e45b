use crate::{
    cellmap::CellMap,
    chunkid::{ChunkId, Coordinates, PSEUDO_CODE},
    costtree::{ChunkKind, CostTree, NodeIdx},
    disk::{chunk_header_size, DIR_ENTRY_BYTES, ENTRIES_AT_BYTES, SLOT_BYTES},
    header::ChunkHeader,
    range::LevelRange,
};
use cubefile_base::{err, Result};
use std::collections::BTreeMap;
use tracing::debug;

// EquiGrid-EquiChildren splitting of a data chunk too large for a bucket.
// An artificial level is slipped in above the grain: every dimension gets
// the same number `m` of new members (the grid), and the grain members of
// a dimension are dealt out to them round-robin so each new member has the
// same number of children give or take one. A dimension with fewer than
// `m` grain members is not split; it becomes a pseudo level whose single
// member keeps the whole original range.
//
// The chunk turns into a directory chunk over the new members, keeping its
// id, and each populated grid cell becomes a data chunk one level deeper.

pub const SPLIT_LEVEL_SUFFIX: &str = "~split";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SplitPlan {
    // New members per split dimension.
    pub members: usize,
    // Children per new member, per dimension; 0 marks a pseudo level.
    pub max_children: Vec<usize>,
}

impl SplitPlan {
    pub fn is_pseudo(&self, dim: usize) -> bool {
        self.max_children[dim] == 0
    }
}

// floor(e^(1/n)), corrected for floating point drift.
pub fn int_root(e: usize, n: usize) -> usize {
    if n == 0 || e == 0 {
        return 0;
    }
    if n == 1 {
        return e;
    }
    let mut r = (e as f64).powf(1.0 / n as f64).floor() as usize;
    let pow = |b: usize| -> Option<usize> {
        let mut acc = 1_usize;
        for _ in 0..n {
            acc = acc.checked_mul(b)?;
        }
        Some(acc)
    };
    while r > 0 && pow(r).map_or(true, |p| p > e) {
        r -= 1;
    }
    while pow(r + 1).map_or(false, |p| p <= e) {
        r += 1;
    }
    r
}

fn classify(counts: &[usize], members: usize, forced_pseudo: &[bool]) -> Vec<usize> {
    counts
        .iter()
        .zip(forced_pseudo)
        .map(|(c, forced)| {
            if *forced || *c < members {
                0
            } else {
                c.div_ceil(members)
            }
        })
        .collect()
}

// `counts` are the grain member counts per dimension, `max_entries` the
// most directory entries the artificial chunk may have.
pub fn plan_equi_grid(counts: &[usize], max_entries: usize) -> Result<SplitPlan> {
    if counts.is_empty() {
        return Err(err("cannot split a chunk without dimensions"));
    }
    let no_forced = vec![false; counts.len()];
    let mut members = int_root(max_entries, counts.len());
    let mut max_children = classify(counts, members, &no_forced);
    if max_children.iter().all(|c| *c == 0) {
        if counts.iter().all(|c| *c == 1) {
            return Err(err(
                "every dimension has a single grain member; the cube collapses to one cell, \
                 consider a redesign of the cube",
            ));
        }
        if !counts.contains(&1) {
            members = counts.iter().copied().min().unwrap_or(0);
            max_children = classify(counts, members, &no_forced);
        } else {
            let forced: Vec<bool> = counts.iter().map(|c| *c == 1).collect();
            let rest = forced.iter().filter(|f| !**f).count();
            members = int_root(max_entries, rest);
            max_children = classify(counts, members, &forced);
            if max_children.iter().all(|c| *c == 0) {
                members = counts
                    .iter()
                    .filter(|c| **c != 1)
                    .copied()
                    .min()
                    .unwrap_or(0);
                max_children = classify(counts, members, &forced);
            }
        }
    }
    if members < 2 {
        return Err(err(format!(
            "a grid of {} members per dimension cannot split a chunk",
            members
        )));
    }
    Ok(SplitPlan {
        members,
        max_children,
    })
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct NewHierarchy {
    pub pseudo: bool,
    // Children range of each new member, indexed by its order-code. A
    // pseudo hierarchy has one entry, for PSEUDO_CODE.
    pub parents: Vec<(i32, i32)>,
}

impl NewHierarchy {
    pub fn parent_of(&self, code: i32) -> Option<i32> {
        if self.pseudo {
            return Some(PSEUDO_CODE);
        }
        self.parents
            .iter()
            .position(|(lo, hi)| *lo <= code && code <= *hi)
            .map(|p| p as i32)
    }

    pub fn children_of(&self, parent: i32) -> Option<(i32, i32)> {
        if self.pseudo {
            return (parent == PSEUDO_CODE).then(|| self.parents[0]);
        }
        usize::try_from(parent)
            .ok()
            .and_then(|p| self.parents.get(p))
            .copied()
    }
}

pub fn create_new_hierarchies(ranges: &[LevelRange], plan: &SplitPlan) -> Result<Vec<NewHierarchy>> {
    if ranges.len() != plan.max_children.len() {
        return Err(err(format!(
            "split plan for {} dimensions applied to {} ranges",
            plan.max_children.len(),
            ranges.len()
        )));
    }
    let mut out = Vec::with_capacity(ranges.len());
    for (d, r) in ranges.iter().enumerate() {
        if plan.is_pseudo(d) || r.is_null() {
            out.push(NewHierarchy {
                pseudo: true,
                parents: vec![r.ends()],
            });
            continue;
        }
        let total = r.cardinality();
        let mut counters = vec![0_usize; plan.members];
        for i in 0..total {
            counters[i % plan.members] += 1;
        }
        let assigned: usize = counters.iter().sum();
        if assigned != total {
            return Err(err(format!(
                "dimension {}: dealt {} children out of {}",
                r.dim_name, assigned, total
            )));
        }
        let mut parents = Vec::with_capacity(plan.members);
        let mut next = r.left_end;
        for n in counters.into_iter().filter(|n| *n > 0) {
            parents.push((next, next + n as i32 - 1));
            next += n as i32;
        }
        out.push(NewHierarchy {
            pseudo: false,
            parents,
        });
    }
    Ok(out)
}

// Most entries a directory chunk at `depth` can have and still fit in a
// bucket body of `capacity` bytes.
pub fn max_dir_entries(depth: usize, num_dims: usize, capacity: usize) -> usize {
    capacity
        .saturating_sub(SLOT_BYTES + chunk_header_size(depth, num_dims) + ENTRIES_AT_BYTES)
        / DIR_ENTRY_BYTES
}

pub fn split_data_node(tree: &mut CostTree, idx: NodeIdx, capacity: usize) -> Result<()> {
    let node = tree.node(idx);
    if node.kind() != ChunkKind::Data {
        return Err(err(format!("chunk {} is not a data chunk", node.header().id())));
    }
    let header = node.header();
    let id = header.id().clone();
    let ranges = header.ranges().to_vec();
    let counts: Vec<usize> = ranges.iter().map(|r| r.cardinality()).collect();
    let max_entries = max_dir_entries(header.depth(), header.num_dims(), capacity);
    let plan = plan_equi_grid(&counts, max_entries)?;
    let hierarchies = create_new_hierarchies(&ranges, &plan)?;

    let mut dir_ranges = Vec::with_capacity(ranges.len());
    for (r, h) in ranges.iter().zip(hierarchies.iter()) {
        let lvl = format!("{}{}", r.lvl_name, SPLIT_LEVEL_SUFFIX);
        if h.pseudo {
            dir_ranges.push(LevelRange::null(&r.dim_name, lvl));
        } else {
            dir_ranges.push(LevelRange::new(&r.dim_name, lvl, 0, h.parents.len() as i32 - 1)?);
        }
    }
    let dir_header = ChunkHeader::dense(id.clone(), dir_ranges)?;

    let mut groups: BTreeMap<Vec<i32>, Vec<ChunkId>> = BTreeMap::new();
    for cell in node.cells().cells() {
        let coords = cell.extract_coords()?;
        let mut parent = Vec::with_capacity(coords.len());
        for (c, h) in coords.as_slice().iter().zip(hierarchies.iter()) {
            let p = h
                .parent_of(*c)
                .ok_or_else(|| err(format!("cell {} outside the split of {}", cell, id)))?;
            parent.push(p);
        }
        groups.entry(parent).or_default().push(cell.clone());
    }

    let mut subs = Vec::with_capacity(groups.len());
    for (parent, cells) in groups {
        let sub_id = id.child(&Coordinates::new(parent.clone()))?;
        let mut sub_ranges = Vec::with_capacity(ranges.len());
        for ((r, h), p) in ranges.iter().zip(hierarchies.iter()).zip(parent.iter()) {
            if h.pseudo {
                sub_ranges.push(r.clone());
                continue;
            }
            let (lo, hi) = h
                .children_of(*p)
                .ok_or_else(|| err(format!("no children for split code {} of {}", p, id)))?;
            sub_ranges.push(LevelRange::new(&r.dim_name, &r.lvl_name, lo, hi)?);
        }
        let sub_header = ChunkHeader::new(sub_id, sub_ranges, cells.len())?;
        if sub_header.tot_num_cells() >= header.tot_num_cells() {
            return Err(err(format!(
                "splitting {} makes no progress: {} cells remain in {}",
                id,
                sub_header.tot_num_cells(),
                sub_header.id()
            )));
        }
        subs.push((sub_header, cells.into_iter().collect::<CellMap>()));
    }
    debug!(
        chunk = %id,
        members = plan.members,
        subchunks = subs.len(),
        "split oversized data chunk"
    );
    tree.replace_with_split(idx, dir_header, subs)
}
