//! The fixed Huffman codes of RFC 1951 section 3.2.6, derived canonically
//! from their defining length tables.

use std::collections::HashMap;

use crate::huffman::{codes_from_lengths, CodeDict};

/// The fixed literal/length code: 288 symbols with lengths 8/9/7/8.
pub fn fixed_lenlit_dict() -> CodeDict<u16> {
  let mut lengths = HashMap::new();
  for sym in 0u16..=287 {
    let len = match sym {
      0..=143 => 8,
      144..=255 => 9,
      256..=279 => 7,
      _ => 8,
    };
    lengths.insert(sym, len);
  }
  codes_from_lengths(&lengths)
}

/// The fixed distance code: thirty 5-bit codes. Codes 30 and 31 never occur
/// in a conforming stream, but the bitstream-io tree compilers insist on a
/// complete tree, so they are mapped anyway.
pub fn fixed_dist_dict() -> CodeDict<u16> {
  let mut lengths = HashMap::new();
  for sym in 0u16..=31 {
    lengths.insert(sym, 5);
  }
  codes_from_lengths(&lengths)
}
