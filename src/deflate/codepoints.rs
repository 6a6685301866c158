/*! The length and distance codepoints of RFC 1951.

Each codepoint is a Huffman-coded value, possibly followed by literal extra
bits that disambiguate it within its range. The tables below reproduce
section 3.2.5 of the RFC:

             Extra               Extra               Extra
        Code Bits Length(s) Code Bits Lengths   Code Bits Length(s)
        ---- ---- ------     ---- ---- -------   ---- ---- -------
         257   0     3       267   1   15,16     277   4   67-82
         258   0     4       268   1   17,18     278   4   83-98
         259   0     5       269   2   19-22     279   4   99-114
         260   0     6       270   2   23-26     280   4  115-130
         261   0     7       271   2   27-30     281   5  131-162
         262   0     8       272   2   31-34     282   5  163-194
         263   0     9       273   3   35-42     283   5  195-226
         264   0    10       274   3   43-50     284   5  227-257
         265   1  11,12      275   3   51-58     285   0    258
         266   1  13,14      276   3   59-66

              Extra           Extra               Extra
         Code Bits Dist  Code Bits   Dist     Code Bits Distance
         ---- ---- ----  ---- ----  ------    ---- ---- --------
           0   0    1     10   4     33-48    20    9   1025-1536
           1   0    2     11   4     49-64    21    9   1537-2048
           2   0    3     12   5     65-96    22   10   2049-3072
           3   0    4     13   5     97-128   23   10   3073-4096
           4   1   5,6    14   6    129-192   24   11   4097-6144
           5   1   7,8    15   6    193-256   25   11   6145-8192
           6   2   9-12   16   7    257-384   26   12  8193-12288
           7   2  13-16   17   7    385-512   27   12 12289-16384
           8   3  17-24   18   8    513-768   28   13 16385-24576
           9   3  25-32   19   8   769-1024   29   13 24577-32768
*/

use bitstream_io::{BitRead, BitReader, LittleEndian};
use lazy_static::lazy_static;
use std::io::Read;

use super::decoder::DeflateReadError;

pub const MIN_LENGTH_CODE: u16 = 257;
pub const MAX_LENGTH_CODE: u16 = 285;
pub const MAX_DIST_CODE: u16 = 29;

lazy_static! {
  pub static ref CODEPOINTS: CodepointTable = CodepointTable::new();
}

#[derive(Debug, Copy, Clone)]
pub struct Codepoint {
  code: u16,
  nbits: u8,
  lo: u16,
  hi: u16,
}

impl Codepoint {
  fn new(code: u16, nbits: u8, lo: u16) -> Self {
    let range = if nbits == 0 { 0 } else { (1u16 << nbits) - 1 };
    Self {
      code,
      nbits,
      lo,
      hi: lo + range,
    }
  }

  pub fn code(&self) -> u16 {
    self.code
  }

  pub fn nbits(&self) -> u8 {
    self.nbits
  }

  pub fn lo(&self) -> u16 {
    self.lo
  }

  /// Read this codepoint's extra bits and produce the decoded value.
  pub fn read_value<R: Read>(
    &self,
    bit_src: &mut BitReader<R, LittleEndian>,
  ) -> Result<u16, DeflateReadError> {
    let extra: u16 = if self.nbits == 0 {
      0
    } else {
      bit_src.read(u32::from(self.nbits))?
    };
    let val = self.lo + extra;
    if val > self.hi {
      Err(DeflateReadError::CodeOutOfRange(val))
    } else {
      Ok(val)
    }
  }
}

pub struct CodepointTable {
  lengths: Vec<Codepoint>,
  dists: Vec<Codepoint>,
}

impl CodepointTable {
  fn new() -> Self {
    let dists = vec![
      Codepoint::new(0, 0, 1),
      Codepoint::new(1, 0, 2),
      Codepoint::new(2, 0, 3),
      Codepoint::new(3, 0, 4),
      Codepoint::new(4, 1, 5),
      Codepoint::new(5, 1, 7),
      Codepoint::new(6, 2, 9),
      Codepoint::new(7, 2, 13),
      Codepoint::new(8, 3, 17),
      Codepoint::new(9, 3, 25),
      Codepoint::new(10, 4, 33),
      Codepoint::new(11, 4, 49),
      Codepoint::new(12, 5, 65),
      Codepoint::new(13, 5, 97),
      Codepoint::new(14, 6, 129),
      Codepoint::new(15, 6, 193),
      Codepoint::new(16, 7, 257),
      Codepoint::new(17, 7, 385),
      Codepoint::new(18, 8, 513),
      Codepoint::new(19, 8, 769),
      Codepoint::new(20, 9, 1025),
      Codepoint::new(21, 9, 1537),
      Codepoint::new(22, 10, 2049),
      Codepoint::new(23, 10, 3073),
      Codepoint::new(24, 11, 4097),
      Codepoint::new(25, 11, 6145),
      Codepoint::new(26, 12, 8193),
      Codepoint::new(27, 12, 12289),
      Codepoint::new(28, 13, 16385),
      Codepoint::new(29, 13, 24577),
    ];

    let lengths = vec![
      Codepoint::new(257, 0, 3),
      Codepoint::new(258, 0, 4),
      Codepoint::new(259, 0, 5),
      Codepoint::new(260, 0, 6),
      Codepoint::new(261, 0, 7),
      Codepoint::new(262, 0, 8),
      Codepoint::new(263, 0, 9),
      Codepoint::new(264, 0, 10),
      Codepoint::new(265, 1, 11),
      Codepoint::new(266, 1, 13),
      Codepoint::new(267, 1, 15),
      Codepoint::new(268, 1, 17),
      Codepoint::new(269, 2, 19),
      Codepoint::new(270, 2, 23),
      Codepoint::new(271, 2, 27),
      Codepoint::new(272, 2, 31),
      Codepoint::new(273, 3, 35),
      Codepoint::new(274, 3, 43),
      Codepoint::new(275, 3, 51),
      Codepoint::new(276, 3, 59),
      Codepoint::new(277, 4, 67),
      Codepoint::new(278, 4, 83),
      Codepoint::new(279, 4, 99),
      Codepoint::new(280, 4, 115),
      Codepoint::new(281, 5, 131),
      Codepoint::new(282, 5, 163),
      Codepoint::new(283, 5, 195),
      Codepoint::new(284, 5, 227),
      Codepoint::new(285, 0, 258),
    ];

    Self { lengths, dists }
  }

  /// The codepoint whose range covers a match length in 3..=258.
  pub fn for_length(&self, val: u16) -> &Codepoint {
    for pt in self.lengths.iter() {
      if val >= pt.lo && val <= pt.hi {
        return pt;
      }
    }
    panic!("no codepoint covers match length {}", val);
  }

  /// The codepoint whose range covers a match distance in 1..=32768.
  pub fn for_dist(&self, val: u16) -> &Codepoint {
    for pt in self.dists.iter() {
      if val >= pt.lo && val <= pt.hi {
        return pt;
      }
    }
    panic!("no codepoint covers match distance {}", val);
  }

  /// Look up a length codepoint by its code, 257..=285.
  pub fn length_code(&self, code: u16) -> &Codepoint {
    assert!((MIN_LENGTH_CODE..=MAX_LENGTH_CODE).contains(&code));
    &self.lengths[(code - MIN_LENGTH_CODE) as usize]
  }

  /// Look up a distance codepoint by its code, 0..=29.
  pub fn dist_code(&self, code: u16) -> &Codepoint {
    assert!(code <= MAX_DIST_CODE);
    &self.dists[code as usize]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn length_table_covers_3_to_258() {
    for len in 3u16..=258 {
      let pt = CODEPOINTS.for_length(len);
      assert!(pt.lo() <= len && len <= pt.hi);
      assert!((MIN_LENGTH_CODE..=MAX_LENGTH_CODE).contains(&pt.code()));
    }
    assert_eq!(CODEPOINTS.for_length(3).code(), 257);
    assert_eq!(CODEPOINTS.for_length(258).code(), 285);
    assert_eq!(CODEPOINTS.for_length(258).nbits(), 0);
    assert_eq!(CODEPOINTS.for_length(130).code(), 280);
  }

  #[test]
  fn dist_table_covers_1_to_32768() {
    for dist in [1u16, 2, 4, 5, 24, 32, 33, 1024, 1025, 24576, 24577, 32768].iter() {
      let pt = CODEPOINTS.for_dist(*dist);
      assert!(pt.lo() <= *dist && *dist <= pt.hi);
    }
    assert_eq!(CODEPOINTS.for_dist(1).code(), 0);
    assert_eq!(CODEPOINTS.for_dist(32768).code(), 29);
    assert_eq!(CODEPOINTS.for_dist(32768).nbits(), 13);
  }

  #[test]
  fn codes_partition_their_ranges() {
    // Consecutive codepoints must tile the value space with no gap.
    for pair in CODEPOINTS.lengths.windows(2) {
      assert_eq!(pair[0].hi + 1, pair[1].lo);
    }
    for pair in CODEPOINTS.dists.windows(2) {
      assert_eq!(pair[0].hi + 1, pair[1].lo);
    }
  }
}
