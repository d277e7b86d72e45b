use cubefile_base::{err, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// A chunk id names a chunk by the path of order-codes leading to it from
// the root: one `.`-separated domain per chunking depth, each domain a
// `|`-separated tuple of order-codes, one per dimension. For example
// `0|2.1|5` is the depth-2 chunk reached through cell (0,2) of the root
// and then cell (1,5) of chunk `0|2`.

pub const ROOT_ID: &str = "root";
pub const MIN_DEPTH: usize = 0;

// Order-code of the single member of a pseudo level.
pub const PSEUDO_CODE: i32 = -1;

pub(crate) const DOMAIN_SEP: u8 = b'.';
pub(crate) const CODE_SEP: u8 = b'|';

// Splits on an ASCII separator. Separators are single bytes so every
// split point is a char boundary.
pub(crate) fn split_on(s: &str, sep: u8) -> impl Iterator<Item = &str> + '_ {
    let mut start = 0;
    memchr::memchr_iter(sep, s.as_bytes())
        .chain(std::iter::once(s.len()))
        .map(move |end| {
            let piece = &s[start..end];
            start = end + 1;
            piece
        })
}

fn count_fields(domain: &str) -> usize {
    memchr::memchr_iter(CODE_SEP, domain.as_bytes()).count() + 1
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Coordinates {
    coords: Vec<i32>,
}

impl Coordinates {
    pub fn new(coords: Vec<i32>) -> Self {
        Coordinates { coords }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.coords
    }

    pub fn has_pseudo(&self) -> bool {
        self.coords.iter().any(|c| *c == PSEUDO_CODE)
    }

    // domain2coords
    pub fn from_domain(domain: &str) -> Result<Self> {
        if domain.is_empty() {
            return Ok(Coordinates::default());
        }
        let mut coords = Vec::with_capacity(count_fields(domain));
        for field in split_on(domain, CODE_SEP) {
            let code = field
                .parse::<i32>()
                .context(format!("bad order-code {:?} in domain {:?}", field, domain))?;
            if code < PSEUDO_CODE {
                return Err(err(format!("negative order-code {} in domain {:?}", code, domain)));
            }
            coords.push(code);
        }
        Ok(Coordinates { coords })
    }

    // coords2domain
    pub fn to_domain(&self) -> String {
        let mut s = String::new();
        for (i, c) in self.coords.iter().enumerate() {
            if i > 0 {
                s.push(CODE_SEP as char);
            }
            s.push_str(&c.to_string());
        }
        s
    }
}

impl From<Vec<i32>> for Coordinates {
    fn from(coords: Vec<i32>) -> Self {
        Coordinates { coords }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ChunkId {
    cid: String,
}

impl ChunkId {
    pub fn root() -> Self {
        ChunkId {
            cid: ROOT_ID.to_string(),
        }
    }

    pub fn new(cid: impl Into<String>) -> Self {
        ChunkId { cid: cid.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.cid
    }

    pub fn is_root(&self) -> bool {
        self.cid == ROOT_ID
    }

    // Root has no domains.
    pub fn domains(&self) -> impl Iterator<Item = &str> + '_ {
        let body = if self.is_root() { "" } else { self.cid.as_str() };
        split_on(body, DOMAIN_SEP).filter(move |_| !body.is_empty())
    }

    pub fn depth(&self) -> Result<usize> {
        if self.cid.is_empty() {
            return Err(err("empty chunk id has no depth"));
        }
        if self.is_root() {
            return Ok(MIN_DEPTH);
        }
        Ok(memchr::memchr_iter(DOMAIN_SEP, self.cid.as_bytes()).count() + 1)
    }

    // The number of dimensions every domain agrees on. Root has none; use
    // `is_root` to tell it apart from a malformed id.
    pub fn num_dims(&self) -> Result<usize> {
        if self.cid.is_empty() {
            return Err(err("empty chunk id has no dimensions"));
        }
        if self.is_root() {
            return Ok(0);
        }
        let mut n = None;
        for domain in self.domains() {
            let fields = count_fields(domain);
            match n {
                None => n = Some(fields),
                Some(prev) if prev != fields => {
                    return Err(err(format!(
                        "chunk id {} has domains of differing dimensionality",
                        self.cid
                    )))
                }
                Some(_) => (),
            }
        }
        n.ok_or_else(|| err("chunk id without domains"))
    }

    pub fn last_domain(&self) -> Result<&str> {
        if self.is_root() {
            return Err(err("root chunk has no domain"));
        }
        if self.cid.is_empty() {
            return Err(err("empty chunk id has no domain"));
        }
        match memchr::memrchr(DOMAIN_SEP, self.cid.as_bytes()) {
            Some(pos) => Ok(&self.cid[pos + 1..]),
            None => Ok(&self.cid),
        }
    }

    // Domain at 1-based `depth`.
    pub fn domain_at(&self, depth: usize) -> Result<&str> {
        if depth == MIN_DEPTH {
            return Err(err("root depth has no domain"));
        }
        self.domains()
            .nth(depth - 1)
            .ok_or_else(|| err(format!("chunk id {} has no domain at depth {}", self.cid, depth)))
    }

    pub fn extract_coords(&self) -> Result<Coordinates> {
        Coordinates::from_domain(self.last_domain()?)
    }

    pub fn parent(&self) -> Result<ChunkId> {
        if self.is_root() {
            return Err(err("root chunk has no parent"));
        }
        match memchr::memrchr(DOMAIN_SEP, self.cid.as_bytes()) {
            Some(pos) => Ok(ChunkId::new(&self.cid[..pos])),
            None => Ok(ChunkId::root()),
        }
    }

    // The ancestor at `depth`, or the id itself at its own depth.
    pub fn prefix(&self, depth: usize) -> Result<ChunkId> {
        let own = self.depth()?;
        if depth > own {
            return Err(err(format!("chunk id {} is shallower than {}", self.cid, depth)));
        }
        if depth == MIN_DEPTH {
            return Ok(ChunkId::root());
        }
        let domains: Vec<&str> = self.domains().take(depth).collect();
        Ok(ChunkId::new(domains.join(".")))
    }

    // True when `other` lies strictly below this chunk.
    pub fn is_prefix_of(&self, other: &ChunkId) -> bool {
        if other.is_root() || other.cid.is_empty() {
            return false;
        }
        if self.is_root() {
            return true;
        }
        other.cid.len() > self.cid.len()
            && other.cid.as_bytes()[self.cid.len()] == DOMAIN_SEP
            && other.cid.starts_with(&self.cid)
    }

    pub fn add_suffix_domain(&mut self, suffix: &str) -> Result<()> {
        if suffix.is_empty() || memchr::memchr(DOMAIN_SEP, suffix.as_bytes()).is_some() {
            return Err(err(format!("bad suffix domain {:?}", suffix)));
        }
        Coordinates::from_domain(suffix)?;
        if self.is_root() {
            self.cid = suffix.to_string();
            return Ok(());
        }
        let dims = self.num_dims()?;
        if dims != count_fields(suffix) {
            return Err(err(format!(
                "suffix {:?} does not match the {} dimensions of {}",
                suffix, dims, self.cid
            )));
        }
        self.cid.push(DOMAIN_SEP as char);
        self.cid.push_str(suffix);
        Ok(())
    }

    pub fn child(&self, coords: &Coordinates) -> Result<ChunkId> {
        let mut id = self.clone();
        id.add_suffix_domain(&coords.to_domain())?;
        Ok(id)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cid)
    }
}
