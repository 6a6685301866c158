/*! DEFLATE encoding: LZ factorization under a bit-exact cost model, then
block emission with fixed or dynamic Huffman codes.

A dynamic block is preceded by the RFC 1951 header: 5 bits of HLIT, 5 of
HDIST, 4 of HCLEN, then the code-length code lengths in the fixed reorder
16 17 18 0 8 7 9 6 10 5 11 4 12 3 13 2 14 1 15, then both alphabets' code
lengths compressed with the run-length codepoints 16 (repeat previous),
17 (short zero run), and 18 (long zero run).

Huffman codes travel most-significant-bit first while raw values (header
fields, extra bits) travel least-significant-bit first; the bitstream-io
writer provides both orderings over one little-endian stream.
*/

use std::collections::HashMap;
use std::io::Write;

use bitstream_io::huffman::compile_write_tree;
use bitstream_io::{BitWrite, BitWriter, HuffmanWrite, LittleEndian};
use thiserror::Error;

use super::codepoints::CODEPOINTS;
use super::fixed::{fixed_dist_dict, fixed_lenlit_dict};
use super::{DeflateWriteTree, END_OF_BLOCK, MAX_DIST, MAX_MATCH, MIN_MATCH};
use crate::huffman::{codes_from_freqs, CodeDict};
use crate::lz77::{build_matches, parse, CostModel, Token};

#[derive(Error, Debug)]
pub enum DeflateWriteError {
  #[error("could not compile a huffman tree for the block")]
  TreeCompile,
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

/// Code-length order of the header's code-length alphabet.
pub(crate) const CODE_LENGTH_ORDER: [u16; 19] = [
  16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Bit prices for the parse, taken from a pair of code-length tables. The
/// fixed tables give a serviceable estimate even when the block is later
/// emitted with a dynamic code.
struct BitCost {
  lenlit: [u64; 288],
  dist: [u64; 30],
}

impl BitCost {
  fn fixed() -> Self {
    let mut lenlit = [0u64; 288];
    for (sym, cost) in lenlit.iter_mut().enumerate() {
      *cost = match sym {
        0..=143 => 8,
        144..=255 => 9,
        256..=279 => 7,
        _ => 8,
      };
    }
    Self {
      lenlit,
      dist: [5u64; 30],
    }
  }
}

impl CostModel<u8> for BitCost {
  fn literal_cost(&self, sym: u8) -> u64 {
    self.lenlit[sym as usize]
  }

  fn match_cost(&self, length: usize, distance: usize) -> u64 {
    let lc = CODEPOINTS.for_length(length as u16);
    let dc = CODEPOINTS.for_dist(distance as u16);
    self.lenlit[lc.code() as usize]
      + u64::from(lc.nbits())
      + self.dist[dc.code() as usize]
      + u64::from(dc.nbits())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
  Fixed,
  Dynamic,
}

/// Factorize the input under DEFLATE's limits and bit costs.
pub fn tokenize(data: &[u8]) -> Vec<Token<u8>> {
  let matches = build_matches(data, MAX_DIST);
  parse(data, &matches, MIN_MATCH, MAX_MATCH, MAX_DIST, &BitCost::fixed())
}

/// Compress `data` into a single final dynamic-Huffman block.
pub fn encode(data: &[u8]) -> Result<Vec<u8>, DeflateWriteError> {
  encode_with(data, BlockKind::Dynamic)
}

/// Compress `data` into a single final fixed-Huffman block.
pub fn encode_fixed(data: &[u8]) -> Result<Vec<u8>, DeflateWriteError> {
  encode_with(data, BlockKind::Fixed)
}

fn encode_with(data: &[u8], kind: BlockKind) -> Result<Vec<u8>, DeflateWriteError> {
  let tokens = tokenize(data);
  log::debug!(
    "deflate: {} bytes -> {} tokens ({:?} block)",
    data.len(),
    tokens.len(),
    kind
  );
  let mut sink: BitWriter<Vec<u8>, LittleEndian> = BitWriter::new(Vec::new());
  write_block(&mut sink, &tokens, true, kind)?;
  sink.byte_align()?;
  Ok(sink.into_writer())
}

/// Emit one block: final-flag, type, any header, tokens, end-of-block.
pub fn write_block<W: Write>(
  bit_sink: &mut BitWriter<W, LittleEndian>,
  tokens: &[Token<u8>],
  bfinal: bool,
  kind: BlockKind,
) -> Result<(), DeflateWriteError> {
  bit_sink.write_bit(bfinal)?;
  let (lenlit_dict, dist_dict) = match kind {
    BlockKind::Fixed => {
      bit_sink.write(2, 0b01u8)?;
      (fixed_lenlit_dict(), fixed_dist_dict())
    }
    BlockKind::Dynamic => {
      bit_sink.write(2, 0b10u8)?;
      let (lenlit_dict, dist_dict) = compute_dynamic_dicts(tokens);
      write_header(bit_sink, &lenlit_dict, &dist_dict)?;
      (lenlit_dict, dist_dict)
    }
  };

  let lenlit_tree =
    compile_write_tree(lenlit_dict).map_err(|_| DeflateWriteError::TreeCompile)?;
  let dist_tree = compile_write_tree(dist_dict).map_err(|_| DeflateWriteError::TreeCompile)?;

  for token in tokens {
    write_token(bit_sink, token, &lenlit_tree, &dist_tree)?;
  }
  bit_sink.write_huffman(&lenlit_tree, END_OF_BLOCK)?;
  Ok(())
}

fn write_token<W: Write>(
  bit_sink: &mut BitWriter<W, LittleEndian>,
  token: &Token<u8>,
  lenlit_tree: &DeflateWriteTree,
  dist_tree: &DeflateWriteTree,
) -> Result<(), DeflateWriteError> {
  match token {
    Token::Literal(sym) => bit_sink.write_huffman(lenlit_tree, u16::from(*sym))?,
    Token::Match { length, distance } => {
      let lc = CODEPOINTS.for_length(*length as u16);
      bit_sink.write_huffman(lenlit_tree, lc.code())?;
      if lc.nbits() > 0 {
        bit_sink.write(u32::from(lc.nbits()), *length as u16 - lc.lo())?;
      }
      let dc = CODEPOINTS.for_dist(*distance as u16);
      bit_sink.write_huffman(dist_tree, dc.code())?;
      if dc.nbits() > 0 {
        bit_sink.write(u32::from(dc.nbits()), *distance as u16 - dc.lo())?;
      }
    }
  }
  Ok(())
}

/// Length-restricted dynamic codes from the block's own symbol statistics.
fn compute_dynamic_dicts(tokens: &[Token<u8>]) -> (CodeDict<u16>, CodeDict<u16>) {
  let mut lenlit_freqs: HashMap<u16, usize> = HashMap::new();
  let mut dist_freqs: HashMap<u16, usize> = HashMap::new();
  lenlit_freqs.insert(END_OF_BLOCK, 1);
  for token in tokens {
    match token {
      Token::Literal(sym) => *lenlit_freqs.entry(u16::from(*sym)).or_default() += 1,
      Token::Match { length, distance } => {
        let lc = CODEPOINTS.for_length(*length as u16);
        *lenlit_freqs.entry(lc.code()).or_default() += 1;
        let dc = CODEPOINTS.for_dist(*distance as u16);
        *dist_freqs.entry(dc.code()).or_default() += 1;
      }
    }
  }

  ensure_two_symbols(&mut lenlit_freqs);
  let lenlit_dict = codes_from_freqs(&lenlit_freqs, Some(15));

  // With no distances at all, any dictionary is as good as another, so use
  // the fixed one rather than invent a shape the header cannot describe.
  let dist_dict = if dist_freqs.is_empty() {
    fixed_dist_dict()
  } else {
    ensure_two_symbols(&mut dist_freqs);
    codes_from_freqs(&dist_freqs, Some(15))
  };
  (lenlit_dict, dist_dict)
}

/// A one-symbol alphabet would compile to an incomplete one-code tree,
/// which neither the header nor the tree compilers can express; pad it
/// with a never-used neighbour.
fn ensure_two_symbols(freqs: &mut HashMap<u16, usize>) {
  if freqs.len() == 1 {
    let only = *freqs.keys().next().unwrap();
    let dummy = if only == 0 { 1 } else { only - 1 };
    freqs.insert(dummy, 1);
  }
}

/// Run-length codepoints for the code-length alphabet.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
enum ClCodepoint {
  /// An explicit code length, 0-15.
  Length(u8),
  /// Repeat the previous length 3-6 times.
  Repeat(u8),
  /// 3-10 zero lengths.
  ShortZeroRun(u8),
  /// 11-138 zero lengths.
  LongZeroRun(u8),
}

impl ClCodepoint {
  fn symbol(&self) -> u16 {
    match self {
      Self::Length(len) => u16::from(*len),
      Self::Repeat(_) => 16,
      Self::ShortZeroRun(_) => 17,
      Self::LongZeroRun(_) => 18,
    }
  }

  fn write<W: Write>(
    &self,
    bit_sink: &mut BitWriter<W, LittleEndian>,
    cl_tree: &DeflateWriteTree,
  ) -> Result<(), DeflateWriteError> {
    bit_sink.write_huffman(cl_tree, self.symbol())?;
    match self {
      Self::Length(_) => {}
      Self::Repeat(n) => {
        debug_assert!((3..=6).contains(n));
        bit_sink.write(2, n - 3)?;
      }
      Self::ShortZeroRun(n) => {
        debug_assert!((3..=10).contains(n));
        bit_sink.write(3, n - 3)?;
      }
      Self::LongZeroRun(n) => {
        debug_assert!((11..=138).contains(n));
        bit_sink.write(7, n - 11)?;
      }
    }
    Ok(())
  }
}

fn runlength_encode(data: &[u8]) -> Vec<(u8, usize)> {
  let mut out: Vec<(u8, usize)> = Vec::new();
  for &value in data {
    match out.last_mut() {
      Some((prev, count)) if *prev == value => *count += 1,
      _ => out.push((value, 1)),
    }
  }
  out
}

/// Split a nonzero-length repeat count (excluding the leading explicit
/// copy) into legal 3-6 chunks.
fn break_repeat_run(mut rep: usize) -> Vec<u8> {
  debug_assert!(rep >= 3);
  let mut out = Vec::new();
  while rep >= 9 {
    out.push(6);
    rep -= 6;
  }
  match rep {
    8 => out.extend(&[4, 4]),
    7 => out.extend(&[4, 3]),
    _ => out.push(rep as u8),
  }
  out
}

/// Split a zero run into legal 3-10 / 11-138 chunks.
fn break_zero_run(mut rep: usize) -> Vec<usize> {
  debug_assert!(rep >= 3);
  let mut out = Vec::new();
  while rep > 140 {
    out.push(138);
    rep -= 138;
  }
  if rep > 138 {
    // 139 or 140 would strand a remainder below 3; peel it off early.
    out.push(rep - 3);
    rep = 3;
  }
  while rep >= 13 {
    out.push(10);
    rep -= 10;
  }
  match rep {
    12 => out.extend(&[6, 6]),
    11 => out.extend(&[6, 5]),
    _ => out.push(rep),
  }
  out
}

fn lengths_to_cl_codepoints(lengths: &[u8]) -> Vec<ClCodepoint> {
  let mut out = Vec::new();
  for (len, rep) in runlength_encode(lengths) {
    if rep <= 2 || (rep == 3 && len != 0) {
      for _ in 0..rep {
        out.push(ClCodepoint::Length(len));
      }
    } else if len == 0 {
      for run in break_zero_run(rep) {
        if run <= 10 {
          out.push(ClCodepoint::ShortZeroRun(run as u8));
        } else {
          out.push(ClCodepoint::LongZeroRun(run as u8));
        }
      }
    } else {
      out.push(ClCodepoint::Length(len));
      for run in break_repeat_run(rep - 1) {
        out.push(ClCodepoint::Repeat(run));
      }
    }
  }
  out
}

/// Write the dynamic-block header describing both code dictionaries.
fn write_header<W: Write>(
  bit_sink: &mut BitWriter<W, LittleEndian>,
  lenlit_dict: &CodeDict<u16>,
  dist_dict: &CodeDict<u16>,
) -> Result<(), DeflateWriteError> {
  let lenlit_lengths: HashMap<u16, usize> =
    lenlit_dict.iter().map(|(sym, code)| (*sym, code.len())).collect();
  let dist_lengths: HashMap<u16, usize> =
    dist_dict.iter().map(|(sym, code)| (*sym, code.len())).collect();

  let largest_lenlit = *lenlit_lengths.keys().max().unwrap();
  let largest_dist = *dist_lengths.keys().max().unwrap();
  // Without a code for 256 the block cannot be terminated.
  assert!(largest_lenlit >= END_OF_BLOCK);

  let mut code_sizes: Vec<u8> = Vec::new();
  for sym in 0..=largest_lenlit {
    code_sizes.push(*lenlit_lengths.get(&sym).unwrap_or(&0) as u8);
  }
  for sym in 0..=largest_dist {
    code_sizes.push(*dist_lengths.get(&sym).unwrap_or(&0) as u8);
  }
  let codepoints = lengths_to_cl_codepoints(&code_sizes);

  let mut cl_freqs: HashMap<u16, usize> = HashMap::new();
  for cp in codepoints.iter() {
    *cl_freqs.entry(cp.symbol()).or_default() += 1;
  }
  ensure_two_symbols(&mut cl_freqs);
  let cl_dict = codes_from_freqs(&cl_freqs, Some(7));
  let cl_lengths: HashMap<u16, usize> =
    cl_dict.iter().map(|(sym, code)| (*sym, code.len())).collect();

  let mut last_used = 3usize;
  for (idx, sym) in CODE_LENGTH_ORDER.iter().enumerate() {
    if cl_lengths.contains_key(sym) {
      last_used = last_used.max(idx);
    }
  }

  let hlit = u32::from(largest_lenlit) + 1 - 257;
  let hdist = u32::from(largest_dist) + 1 - 1;
  let hclen = (last_used + 1 - 4) as u32;
  bit_sink.write(5, hlit)?;
  bit_sink.write(5, hdist)?;
  bit_sink.write(4, hclen)?;
  for sym in CODE_LENGTH_ORDER.iter().take(last_used + 1) {
    bit_sink.write(3, *cl_lengths.get(sym).unwrap_or(&0) as u32)?;
  }

  let cl_tree = compile_write_tree(cl_dict).map_err(|_| DeflateWriteError::TreeCompile)?;
  for cp in codepoints.iter() {
    cp.write(bit_sink, &cl_tree)?;
  }
  Ok(())
}
