use crate::{
    chunkid::{Coordinates, PSEUDO_CODE},
    range::LevelRange,
};
use cubefile_base::{err, Bitmap, Result};

// Cells of a chunk are laid out in row-major order over the non-pseudo
// dimensions: the last dimension varies fastest. For coordinates `c` and
// ranges with cardinalities `n`,
//
//     offset = sum_d (c[d] - left[d]) * prod_{d' > d} n[d']
//
// Pseudo dimensions hold a single member and contribute nothing, so they
// are stripped first. Data chunks store only populated cells; their
// compression bitmap maps a dense offset to a position in the entry array
// by discounting the empty cells in front of it.

// Drops the pseudo coordinates along with their NULL ranges. A pseudo
// coordinate must line up with a NULL range and vice versa.
pub fn exclude_pseudo_coords<'r>(
    coords: &Coordinates,
    ranges: &'r [LevelRange],
) -> Result<(Vec<i32>, Vec<&'r LevelRange>)> {
    if coords.len() != ranges.len() {
        return Err(err(format!(
            "{} coordinates against {} ranges",
            coords.len(),
            ranges.len()
        )));
    }
    let mut kept_coords = Vec::with_capacity(coords.len());
    let mut kept_ranges = Vec::with_capacity(ranges.len());
    for (c, r) in coords.as_slice().iter().zip(ranges) {
        match (*c == PSEUDO_CODE, r.is_null()) {
            (true, true) => (),
            (false, false) => {
                kept_coords.push(*c);
                kept_ranges.push(r);
            }
            _ => {
                return Err(err(format!(
                    "pseudo coordinates {:?} misaligned with ranges {:?}",
                    coords.as_slice(),
                    ranges.iter().map(|r| r.ends()).collect::<Vec<_>>()
                )))
            }
        }
    }
    Ok((kept_coords, kept_ranges))
}

// Dense offset of a cell, in `[0, cross_product(ranges))`.
pub fn calc_cell_offset(coords: &Coordinates, ranges: &[LevelRange]) -> Result<usize> {
    let (coords, ranges) = exclude_pseudo_coords(coords, ranges)?;
    let mut offset = 0_usize;
    for (c, r) in coords.iter().zip(ranges) {
        if !r.contains(*c) {
            return Err(err(format!(
                "coordinate {} outside range [{}, {}] of {}",
                c, r.left_end, r.right_end, r.dim_name
            )));
        }
        offset = offset * r.cardinality() + (*c - r.left_end) as usize;
    }
    Ok(offset)
}

// Inverse of `calc_cell_offset`.
pub fn offset_to_coords(offset: usize, ranges: &[LevelRange]) -> Result<Coordinates> {
    let total: usize = ranges.iter().map(|r| r.cardinality()).product();
    if offset >= total {
        return Err(err(format!("offset {} outside chunk of {} cells", offset, total)));
    }
    let mut coords = vec![PSEUDO_CODE; ranges.len()];
    let mut rest = offset;
    for (c, r) in coords.iter_mut().zip(ranges).rev() {
        if r.is_null() {
            continue;
        }
        let card = r.cardinality();
        *c = r.left_end + (rest % card) as i32;
        rest /= card;
    }
    Ok(Coordinates::new(coords))
}

// Position of a cell in a data chunk's entry array, or None when the
// bitmap says the cell is empty.
pub fn calc_compressed_offset(
    coords: &Coordinates,
    ranges: &[LevelRange],
    bitmap: &Bitmap,
) -> Result<Option<usize>> {
    let dense = calc_cell_offset(coords, ranges)?;
    compress_offset(dense, bitmap)
}

pub fn compress_offset(dense: usize, bitmap: &Bitmap) -> Result<Option<usize>> {
    if dense >= bitmap.len() {
        return Err(err(format!(
            "offset {} outside bitmap of {} cells",
            dense,
            bitmap.len()
        )));
    }
    if !bitmap.get(dense) {
        return Ok(None);
    }
    Ok(Some(dense - bitmap.zeros_before(dense)))
}
