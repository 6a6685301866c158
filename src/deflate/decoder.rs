/*! DEFLATE decoding: block framing, header parsing, canonical tree
reconstruction, and token expansion.

The stream carries no checksum at this layer, so the only protection
against a desynchronized or corrupt input is strict validation: reserved
block types, out-of-range codes, undecodable trees, and backreferences
into thin air all surface as errors rather than silently producing
garbage.
*/

use std::collections::HashMap;
use std::io::Read;

use bitstream_io::huffman::compile_read_tree;
use bitstream_io::{BitRead, BitReader, HuffmanRead, LittleEndian};
use thiserror::Error;

use super::codepoints::{CODEPOINTS, MAX_DIST_CODE, MAX_LENGTH_CODE, MIN_LENGTH_CODE};
use super::encoder::CODE_LENGTH_ORDER;
use super::fixed::{fixed_dist_dict, fixed_lenlit_dict};
use super::{DeflateReadTree, END_OF_BLOCK};
use crate::huffman::codes_from_lengths;

#[derive(Error, Debug)]
pub enum DeflateReadError {
  #[error("a reserved block type was used")]
  ReservedBlockType,
  #[error("stored block LEN {0:#06x} does not match NLEN {1:#06x}")]
  LenNlenMismatch(u16, u16),
  #[error("value out of range of valid encoded values: {0}")]
  CodeOutOfRange(u16),
  #[error("backreference reaches {0} symbols back but only {1} have been decoded")]
  BackrefPastStart(u16, usize),
  #[error("the header does not describe a decodable huffman code")]
  MalformedTree,
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

/// Decode a complete DEFLATE stream: blocks until one carries the final
/// flag.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, DeflateReadError> {
  let mut bit_src: BitReader<&[u8], LittleEndian> = BitReader::new(input);
  let mut out = Vec::new();
  loop {
    let bfinal = bit_src.read_bit()?;
    let btype: u8 = bit_src.read(2)?;
    match btype {
      0b00 => read_stored_block(&mut bit_src, &mut out)?,
      0b01 => {
        let lenlit_tree =
          compile_read_tree(fixed_lenlit_dict()).map_err(|_| DeflateReadError::MalformedTree)?;
        let dist_tree =
          compile_read_tree(fixed_dist_dict()).map_err(|_| DeflateReadError::MalformedTree)?;
        read_compressed_block(&mut bit_src, &lenlit_tree, &dist_tree, &mut out)?;
      }
      0b10 => {
        let (lenlit_tree, dist_tree) = read_header(&mut bit_src)?;
        read_compressed_block(&mut bit_src, &lenlit_tree, &dist_tree, &mut out)?;
      }
      _ => return Err(DeflateReadError::ReservedBlockType),
    }
    if bfinal {
      break;
    }
  }
  Ok(out)
}

/// A stored block: skip to the byte boundary, check LEN against its
/// complement, copy the payload.
fn read_stored_block<R: Read>(
  bit_src: &mut BitReader<R, LittleEndian>,
  out: &mut Vec<u8>,
) -> Result<(), DeflateReadError> {
  bit_src.byte_align();
  let len: u16 = bit_src.read(16)?;
  let nlen: u16 = bit_src.read(16)?;
  if len != !nlen {
    return Err(DeflateReadError::LenNlenMismatch(len, nlen));
  }
  for _ in 0..len {
    let byte: u8 = bit_src.read(8)?;
    out.push(byte);
  }
  Ok(())
}

/// Parse the dynamic-block header and rebuild both canonical trees.
fn read_header<R: Read>(
  bit_src: &mut BitReader<R, LittleEndian>,
) -> Result<(Box<[DeflateReadTree]>, Box<[DeflateReadTree]>), DeflateReadError> {
  let hlit: u16 = bit_src.read(5)?;
  let hdist: u16 = bit_src.read(5)?;
  let hclen: u16 = bit_src.read(4)?;
  log::debug!("deflate header: hlit {} hdist {} hclen {}", hlit, hdist, hclen);

  let mut cl_lengths = HashMap::new();
  for sym in CODE_LENGTH_ORDER.iter().take(hclen as usize + 4) {
    let len: u8 = bit_src.read(3)?;
    if len != 0 {
      cl_lengths.insert(*sym, len as usize);
    }
  }
  let cl_tree =
    compile_read_tree(codes_from_lengths(&cl_lengths)).map_err(|_| DeflateReadError::MalformedTree)?;

  let num_lenlit = hlit as usize + 257;
  let num_dist = hdist as usize + 1;
  let total = num_lenlit + num_dist;
  let mut lengths: Vec<u8> = Vec::with_capacity(total);
  while lengths.len() < total {
    let sym: u16 = bit_src.read_huffman(&cl_tree)?;
    match sym {
      0..=15 => lengths.push(sym as u8),
      16 => {
        let extra: u8 = bit_src.read(2)?;
        let last = *lengths.last().ok_or(DeflateReadError::MalformedTree)?;
        for _ in 0..extra + 3 {
          lengths.push(last);
        }
      }
      17 => {
        let extra: u8 = bit_src.read(3)?;
        for _ in 0..extra + 3 {
          lengths.push(0);
        }
      }
      18 => {
        let extra: u8 = bit_src.read(7)?;
        for _ in 0..u16::from(extra) + 11 {
          lengths.push(0);
        }
      }
      bad => return Err(DeflateReadError::CodeOutOfRange(bad)),
    }
  }
  // A run crossing the alphabet boundary means the header lied about its
  // counts.
  if lengths.len() != total {
    return Err(DeflateReadError::MalformedTree);
  }

  let mut lenlit_lengths = HashMap::new();
  let mut dist_lengths = HashMap::new();
  for (pos, len) in lengths.into_iter().enumerate() {
    if len == 0 {
      continue;
    }
    if pos < num_lenlit {
      lenlit_lengths.insert(pos as u16, len as usize);
    } else {
      dist_lengths.insert((pos - num_lenlit) as u16, len as usize);
    }
  }
  let lenlit_tree = compile_read_tree(codes_from_lengths(&lenlit_lengths))
    .map_err(|_| DeflateReadError::MalformedTree)?;
  let dist_tree = compile_read_tree(codes_from_lengths(&dist_lengths))
    .map_err(|_| DeflateReadError::MalformedTree)?;
  Ok((lenlit_tree, dist_tree))
}

/// Read literal/length and distance codes until the end-of-block symbol,
/// expanding backreferences as they arrive.
fn read_compressed_block<R: Read>(
  bit_src: &mut BitReader<R, LittleEndian>,
  lenlit_tree: &[DeflateReadTree],
  dist_tree: &[DeflateReadTree],
  out: &mut Vec<u8>,
) -> Result<(), DeflateReadError> {
  loop {
    let sym: u16 = bit_src.read_huffman(lenlit_tree)?;
    match sym {
      0..=255 => out.push(sym as u8),
      END_OF_BLOCK => return Ok(()),
      MIN_LENGTH_CODE..=MAX_LENGTH_CODE => {
        let length = CODEPOINTS.length_code(sym).read_value(bit_src)?;
        let dist_code: u16 = bit_src.read_huffman(dist_tree)?;
        if dist_code > MAX_DIST_CODE {
          return Err(DeflateReadError::CodeOutOfRange(dist_code));
        }
        let distance = CODEPOINTS.dist_code(dist_code).read_value(bit_src)?;
        expand_backref(length, distance, out)?;
      }
      bad => return Err(DeflateReadError::CodeOutOfRange(bad)),
    }
  }
}

/// Copy `length` bytes from `distance` back, wrapping through the copied
/// region when the match overlaps itself.
fn expand_backref(length: u16, distance: u16, out: &mut Vec<u8>) -> Result<(), DeflateReadError> {
  let produced = out.len();
  if distance as usize > produced {
    return Err(DeflateReadError::BackrefPastStart(distance, produced));
  }
  let start = produced - distance as usize;
  for j in 0..length as usize {
    let byte = out[start + j];
    out.push(byte);
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn expand_backref_copies_and_overlaps() {
    let mut out = vec![1u8, 2, 3];
    expand_backref(2, 3, &mut out).unwrap();
    assert_eq!(out, vec![1, 2, 3, 1, 2]);

    let mut out = vec![9u8];
    expand_backref(4, 1, &mut out).unwrap();
    assert_eq!(out, vec![9u8; 5]);
  }

  #[test]
  fn expand_backref_rejects_overreach() {
    let mut out = vec![1u8, 2];
    assert!(matches!(
      expand_backref(1, 3, &mut out),
      Err(DeflateReadError::BackrefPastStart(3, 2))
    ));
  }

  #[test]
  fn reserved_block_type_is_an_error() {
    // BFINAL=1, BTYPE=11.
    let stream = [0b0000_0111u8, 0, 0, 0];
    assert!(matches!(
      decode(&stream),
      Err(DeflateReadError::ReservedBlockType)
    ));
  }

  #[test]
  fn truncated_stream_is_an_error() {
    assert!(decode(&[0b0000_0101u8]).is_err());
  }
}
