mod bitmap;
mod error;


pub use bitmap::{Bitmap, Word, MASK, SHIFT, WORD_BITS};
pub use error::{err, Context, Error, Result};
