/*! A DEFLATE-shaped compression path as specified in RFC 1951
(https://tools.ietf.org/html/rfc1951): LZ factorization over a 32 KiB
window feeding fixed- or dynamic-Huffman coded blocks.

This is the static-entropy back end of the library. The factorization is
shared with the range-coded paths; only the token serialization differs.
*/

pub mod codepoints;
pub mod decoder;
pub mod encoder;
pub mod fixed;

use bitstream_io::huffman::{ReadHuffmanTree, WriteHuffmanTree};
use bitstream_io::LittleEndian;
use static_assertions::const_assert;

pub use decoder::{decode, DeflateReadError};
pub use encoder::{encode, encode_fixed, DeflateWriteError};

pub(crate) type DeflateReadTree = ReadHuffmanTree<LittleEndian, u16>;
pub(crate) type DeflateWriteTree = WriteHuffmanTree<LittleEndian, u16>;

/// Limits from RFC 1951: matches span 3..=258 symbols from at most 32 KiB
/// back, and symbol 256 terminates a block.
pub const MIN_MATCH: usize = 3;
pub const MAX_MATCH: usize = 258;
pub const MAX_DIST: usize = 32768;
pub const END_OF_BLOCK: u16 = 256;

// The codepoint tables are written against exactly these bounds.
const_assert!(MIN_MATCH == 3 && MAX_MATCH == 258);
const_assert!(MAX_DIST == 1 << 15);

#[cfg(test)]
mod tests {
  use super::*;
  use quickcheck_macros::quickcheck;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  #[quickcheck]
  fn qc_dynamic_roundtrip(data: Vec<u8>) -> bool {
    decode(&encode(&data).unwrap()).unwrap() == data
  }

  fn roundtrip_dynamic(data: &[u8]) {
    let encoded = encode(data).unwrap();
    let decoded = decode(&encoded).unwrap();
    assert_eq!(decoded, data);
  }

  fn roundtrip_fixed(data: &[u8]) {
    let encoded = encode_fixed(data).unwrap();
    let decoded = decode(&encoded).unwrap();
    assert_eq!(decoded, data);
  }

  #[test]
  fn roundtrip_short_text() {
    let data = b"hellohellohelloIamGeronimohello";
    roundtrip_dynamic(data);
    roundtrip_fixed(data);
  }

  #[test]
  fn roundtrip_longer_text() {
    let data = b"Entire any had depend and figure winter. Change stairs and men likely \
                 wisdom new happen piqued six. Now taken him timed sex world get. Enjoyed \
                 married an feeling delight pursuit as offered. As admire roused length \
                 likely played pretty to no. Means had joy miles her merry solid order.";
    roundtrip_dynamic(data);
    roundtrip_fixed(data);
  }

  #[test]
  fn roundtrip_degenerate_inputs() {
    roundtrip_dynamic(b"");
    roundtrip_fixed(b"");
    roundtrip_dynamic(b"x");
    roundtrip_dynamic(&[0u8; 1000]);
    roundtrip_fixed(&[0u8; 1000]);
  }

  #[test]
  fn roundtrip_all_byte_values() {
    let data: Vec<u8> = (0..=255u8).cycle().take(2048).collect();
    roundtrip_dynamic(&data);
    roundtrip_fixed(&data);
  }

  #[test]
  fn roundtrip_randomlike() {
    let mut rng = StdRng::seed_from_u64(2021);
    let mut data = vec![1u8, 2, 3, 4, 3, 2, 1];
    for _ in 0..4000 {
      data.push(rng.gen());
    }
    data.extend_from_slice(&[15, 16, 17, 18, 17, 16, 15]);
    roundtrip_dynamic(&data);
    roundtrip_fixed(&data);
  }

  #[test]
  fn compresses_repetitive_data() {
    let data: Vec<u8> = b"abcdefgh".iter().copied().cycle().take(8000).collect();
    let encoded = encode(&data).unwrap();
    assert!(
      encoded.len() < data.len() / 10,
      "{} bytes compressed to {}",
      data.len(),
      encoded.len()
    );
    assert_eq!(decode(&encoded).unwrap(), data);
  }

  #[test]
  fn long_range_matches_roundtrip() {
    // Repeats separated by more than a thousand bytes still land inside
    // the 32 KiB window.
    let mut rng = StdRng::seed_from_u64(7);
    let chunk: Vec<u8> = (0..1500).map(|_| rng.gen_range(0..16)).collect();
    let mut data = chunk.clone();
    data.extend(std::iter::repeat(255u8).take(2000));
    data.extend_from_slice(&chunk);
    roundtrip_dynamic(&data);
  }
}
