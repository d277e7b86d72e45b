use crate::{Bitmap, MASK, SHIFT, WORD_BITS};
use test_log::test;

#[test]
fn test_shift_and_mask() {
    assert_eq!(WORD_BITS, 32);
    assert_eq!(SHIFT, 5);
    assert_eq!(MASK, 31);
    assert_eq!(Bitmap::words_for(0), 0);
    assert_eq!(Bitmap::words_for(1), 1);
    assert_eq!(Bitmap::words_for(32), 1);
    assert_eq!(Bitmap::words_for(33), 2);
}

#[test]
fn test_rank() {
    let mut bm = Bitmap::new(300);
    for i in 0..300 {
        bm.set(i, true);
        assert_eq!(bm.rank(i), i + 1);
    }
    assert_eq!(bm.rank(299), 300);
    for i in 0..150 {
        assert_eq!(bm.rank(299), 300 - i);
        bm.set(i * 2, false);
    }
    assert_eq!(bm.count(), 150);
}

#[test]
fn test_lsb_first_words() {
    let mut bm = Bitmap::new(40);
    bm.set(0, true);
    bm.set(2, true);
    bm.set(33, true);
    assert_eq!(bm.words(), &[0b101, 0b10]);
    assert!(bm.get(33));
    assert!(!bm.get(32));
}

#[test]
fn test_zeros_before() {
    // bit0=1, bit1=0, bit2=1, bit3=1
    let mut bm = Bitmap::new(4);
    bm.set(0, true);
    bm.set(2, true);
    bm.set(3, true);
    assert_eq!(bm.zeros_before(0), 0);
    assert_eq!(bm.zeros_before(2), 1);
    assert_eq!(bm.zeros_before(3), 1);
    assert_eq!(bm.ones_before(4), 3);
    assert_eq!(bm.iter_ones().collect::<Vec<_>>(), vec![0, 2, 3]);
}

#[test]
fn test_set_all_respects_len() {
    let mut bm = Bitmap::new(37);
    bm.set_all();
    assert_eq!(bm.count(), 37);
    assert!(Bitmap::from_words(bm.words().to_vec(), 37).is_ok());
}

#[test]
fn test_from_words_rejects_bad_input() {
    assert!(Bitmap::from_words(vec![0, 0], 32).is_err());
    assert!(Bitmap::from_words(vec![0b10000], 4).is_err());
    let bm = Bitmap::from_words(vec![0b1101], 4).unwrap();
    assert_eq!(bm.count(), 3);
}
