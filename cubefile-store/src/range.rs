use cubefile_base::{err, Result};
use serde::{Deserialize, Serialize};

// The order-code interval a chunk covers along one dimension, at the level
// its cells live on. Both ends are inclusive. A NULL range (both ends -1)
// marks a pseudo level: the dimension is not chunked there and contributes
// a single pseudo member instead.

pub const NULL_RANGE_END: i32 = -1;

#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct LevelRange {
    pub dim_name: String,
    pub lvl_name: String,
    pub left_end: i32,
    pub right_end: i32,
}

impl LevelRange {
    pub fn new(
        dim_name: impl Into<String>,
        lvl_name: impl Into<String>,
        left_end: i32,
        right_end: i32,
    ) -> Result<Self> {
        if left_end < 0 || right_end < left_end {
            return Err(err(format!("bad level range [{}, {}]", left_end, right_end)));
        }
        Ok(LevelRange {
            dim_name: dim_name.into(),
            lvl_name: lvl_name.into(),
            left_end,
            right_end,
        })
    }

    pub fn null(dim_name: impl Into<String>, lvl_name: impl Into<String>) -> Self {
        LevelRange {
            dim_name: dim_name.into(),
            lvl_name: lvl_name.into(),
            left_end: NULL_RANGE_END,
            right_end: NULL_RANGE_END,
        }
    }

    // A range read back from disk, where names are not stored.
    pub(crate) fn anonymous(left_end: i32, right_end: i32) -> Result<Self> {
        if left_end == NULL_RANGE_END && right_end == NULL_RANGE_END {
            Ok(Self::null("", ""))
        } else {
            Self::new("", "", left_end, right_end)
        }
    }

    pub fn is_null(&self) -> bool {
        self.left_end == NULL_RANGE_END && self.right_end == NULL_RANGE_END
    }

    pub fn ends(&self) -> (i32, i32) {
        (self.left_end, self.right_end)
    }

    // A pseudo level holds exactly one (pseudo) member.
    pub fn cardinality(&self) -> usize {
        if self.is_null() {
            1
        } else {
            (self.right_end - self.left_end + 1) as usize
        }
    }

    pub fn contains(&self, code: i32) -> bool {
        if self.is_null() {
            code == crate::chunkid::PSEUDO_CODE
        } else {
            self.left_end <= code && code <= self.right_end
        }
    }
}

// Number of cells in the cross product of `ranges`.
pub fn cross_product(ranges: &[LevelRange]) -> usize {
    ranges.iter().map(|r| r.cardinality()).product()
}
