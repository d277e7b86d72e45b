use crate::{err, Result};

// A variable-length bitmap that counts bits in order from
// least-to-most significant bits and ascending words. Bit `i` lives in
// `words[i >> SHIFT]` at position `i & MASK`. This is the compression
// bitmap of a data chunk: one bit per logical cell, 1 when the cell is
// populated.

pub type Word = u32;
pub const WORD_BITS: usize = Word::BITS as usize;
pub const SHIFT: usize = WORD_BITS.trailing_zeros() as usize;
pub const MASK: usize = WORD_BITS - 1;

#[derive(Clone, Default, PartialEq, Eq, Debug, Hash)]
pub struct Bitmap {
    words: Vec<Word>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Bitmap {
            words: vec![0; Self::words_for(len)],
            len,
        }
    }

    pub fn words_for(len: usize) -> usize {
        (len + MASK) >> SHIFT
    }

    pub fn from_words(words: Vec<Word>, len: usize) -> Result<Self> {
        if words.len() != Self::words_for(len) {
            return Err(err("bitmap word count does not match bit length"));
        }
        let tail = len & MASK;
        if tail != 0 {
            if let Some(last) = words.last() {
                if last >> tail != 0 {
                    return Err(err("bitmap has bits set past its length"));
                }
            }
        }
        Ok(Bitmap { words, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn set(&mut self, i: usize, val: bool) {
        assert!(i < self.len, "bit {} out of range for bitmap of {}", i, self.len);
        if val {
            self.words[i >> SHIFT] |= 1 << (i & MASK);
        } else {
            self.words[i >> SHIFT] &= !(1 << (i & MASK));
        }
    }

    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len, "bit {} out of range for bitmap of {}", i, self.len);
        (self.words[i >> SHIFT] & (1 << (i & MASK))) != 0
    }

    pub fn set_all(&mut self) {
        for w in self.words.iter_mut() {
            *w = Word::MAX;
        }
        let tail = self.len & MASK;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1 << tail) - 1;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|x| x.count_ones() as usize).sum()
    }

    // Number of set bits in `[0, i]`.
    pub fn rank(&self, i: usize) -> usize {
        assert!(i < self.len, "bit {} out of range for bitmap of {}", i, self.len);
        let w = i >> SHIFT;
        let b = i & MASK;
        let full: usize = self.words[..w].iter().map(|x| x.count_ones() as usize).sum();
        let mask = if b == MASK { Word::MAX } else { (1 << (b + 1)) - 1 };
        full + (self.words[w] & mask).count_ones() as usize
    }

    // Number of set bits in `[0, i)`; `i` may equal `len`.
    pub fn ones_before(&self, i: usize) -> usize {
        if i == 0 {
            0
        } else {
            self.rank(i - 1)
        }
    }

    // Number of clear bits in `[0, i)`.
    pub fn zeros_before(&self, i: usize) -> usize {
        i - self.ones_before(i)
    }

    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(move |i| self.get(*i))
    }
}
