use crate::{
    chunkid::{ChunkId, PSEUDO_CODE},
    range::LevelRange,
};
use cubefile_base::{err, Result};

// The dimension hierarchies of a cube, as far as chunking needs them.
// Members of a level carry dense order-codes `0..n`; the children of a
// member form a contiguous order-code interval at the next level down.
// A pseudo level has one member (code -1) standing in for a level the
// dimension lacks, so that all dimensions share one hierarchy depth.
// Pseudo levels may only pad the top of a hierarchy.
//
// Parsing schema files is somebody else's problem; schemas are assembled
// through `Dimension` builders.

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Level {
    name: String,
    pseudo: bool,
    num_members: usize,
    // Children interval per member, indexed by order-code (index 0 for
    // the pseudo member). Empty on the grain level.
    children: Vec<(i32, i32)>,
}

impl Level {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_pseudo(&self) -> bool {
        self.pseudo
    }

    pub fn num_members(&self) -> usize {
        self.num_members
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Dimension {
    name: String,
    levels: Vec<Level>,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Dimension {
            name: name.into(),
            levels: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn pseudo_level(mut self, name: impl Into<String>) -> Result<Self> {
        if self.levels.iter().any(|l| !l.pseudo) {
            return Err(err(format!(
                "dimension {}: pseudo levels must precede real levels",
                self.name
            )));
        }
        self.levels.push(Level {
            name: name.into(),
            pseudo: true,
            num_members: 1,
            children: Vec::new(),
        });
        Ok(self)
    }

    // The topmost real level, with `members` members.
    pub fn top_level(self, name: impl Into<String>, members: usize) -> Result<Self> {
        if self.levels.iter().any(|l| !l.pseudo) {
            return Err(err(format!("dimension {} already has a top level", self.name)));
        }
        let fanout = [members];
        self.add_real_level(name.into(), &fanout)
    }

    // A real level below the current bottom level; `fanouts[p]` is the
    // number of children of parent member `p`.
    pub fn child_level(self, name: impl Into<String>, fanouts: &[usize]) -> Result<Self> {
        if self.levels.iter().all(|l| l.pseudo) {
            return Err(err(format!("dimension {}: child level before top level", self.name)));
        }
        self.add_real_level(name.into(), fanouts)
    }

    fn add_real_level(mut self, name: String, fanouts: &[usize]) -> Result<Self> {
        let parents = match self.levels.last() {
            Some(l) => l.num_members,
            None => 1,
        };
        if fanouts.len() != parents {
            return Err(err(format!(
                "dimension {}: {} fanouts given for {} parent members",
                self.name,
                fanouts.len(),
                parents
            )));
        }
        let mut children = Vec::with_capacity(fanouts.len());
        let mut next = 0_i32;
        for &n in fanouts {
            if n == 0 {
                return Err(err(format!("dimension {}: member without children", self.name)));
            }
            children.push((next, next + n as i32 - 1));
            next += n as i32;
        }
        if let Some(parent) = self.levels.last_mut() {
            parent.children = children;
        }
        self.levels.push(Level {
            name,
            pseudo: false,
            num_members: next as usize,
            children: Vec::new(),
        });
        Ok(self)
    }

    // The range covered by a chunk at `depth` whose order-code in this
    // dimension is `code` (ignored at the root).
    fn range_below(&self, depth: usize, code: i32) -> Result<LevelRange> {
        let level = self
            .levels
            .get(depth)
            .ok_or_else(|| err(format!("dimension {} has no level {}", self.name, depth)))?;
        if level.pseudo {
            return Ok(LevelRange::null(&self.name, &level.name));
        }
        if depth == 0 {
            return LevelRange::new(&self.name, &level.name, 0, level.num_members as i32 - 1);
        }
        let parent = &self.levels[depth - 1];
        let idx = if parent.pseudo {
            if code != PSEUDO_CODE {
                return Err(err(format!(
                    "dimension {}: code {} under pseudo level {}",
                    self.name, code, parent.name
                )));
            }
            0
        } else {
            if code < 0 || code as usize >= parent.num_members {
                return Err(err(format!(
                    "dimension {}: code {} out of range for level {}",
                    self.name, code, parent.name
                )));
            }
            code as usize
        };
        let (lo, hi) = parent
            .children
            .get(idx)
            .ok_or_else(|| err(format!("dimension {}: level {} has no children", self.name, parent.name)))?;
        LevelRange::new(&self.name, &level.name, *lo, *hi)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct CubeSchema {
    dims: Vec<Dimension>,
    num_measures: usize,
}

impl CubeSchema {
    pub fn new(dims: Vec<Dimension>, num_measures: usize) -> Result<Self> {
        if dims.is_empty() || dims.len() > u8::MAX as usize {
            return Err(err(format!("unsupported dimension count {}", dims.len())));
        }
        if num_measures == 0 || num_measures > u8::MAX as usize {
            return Err(err(format!("unsupported measure count {}", num_measures)));
        }
        let nlevels = dims[0].levels.len();
        for d in dims.iter() {
            if d.levels.len() != nlevels {
                return Err(err(format!(
                    "dimension {} has {} levels, expected {}",
                    d.name,
                    d.levels.len(),
                    nlevels
                )));
            }
            match d.levels.last() {
                Some(l) if !l.pseudo => (),
                _ => return Err(err(format!("dimension {} has no grain level", d.name))),
            }
        }
        Ok(CubeSchema { dims, num_measures })
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn num_dims(&self) -> usize {
        self.dims.len()
    }

    pub fn num_measures(&self) -> usize {
        self.num_measures
    }

    // Depth of the data chunks; the root sits at depth 0.
    pub fn max_depth(&self) -> usize {
        self.dims[0].levels.len() - 1
    }

    pub fn chunk_ranges(&self, id: &ChunkId) -> Result<Vec<LevelRange>> {
        let depth = id.depth()?;
        if depth > self.max_depth() {
            return Err(err(format!(
                "chunk {} lies below the maximum chunking depth {}",
                id,
                self.max_depth()
            )));
        }
        let codes = if id.is_root() {
            vec![PSEUDO_CODE; self.dims.len()]
        } else {
            id.extract_coords()?.as_slice().to_vec()
        };
        if codes.len() != self.dims.len() {
            return Err(err(format!(
                "chunk {} has {} coordinates for {} dimensions",
                id,
                codes.len(),
                self.dims.len()
            )));
        }
        self.dims
            .iter()
            .zip(codes)
            .map(|(d, code)| d.range_below(depth, code))
            .collect()
    }
}
