/*! Canonical Huffman codes with a restricted maximum length.

Two constraints make a code canonical in the RFC 1951 sense:
 - symbols with the same code length appear in lexicographical order, and
 - shorter codes lexicographically precede longer codes.

A code is therefore fully described by one length per symbol. Lengths are
assigned by the package-merge (coin collector) algorithm, which produces
minimum-redundancy codes under a hard length cap; the cap is what lets
DEFLATE describe its trees with 4-bit length fields.

Codes are returned as `(symbol, bits)` pairs, where the bits are 0/1 bytes
in most-significant-first order, the shape the bitstream-io tree compilers
consume.
*/

use std::cmp::Eq;
use std::cmp::Ord;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use bit_vec::BitVec;

/// A compiled code dictionary: each symbol with its code as 0/1 bytes.
pub type CodeDict<S> = Vec<(S, Vec<u8>)>;

/// The lower `nbits` bits of `source`, most significant first.
fn to_bitvec(nbits: usize, source: u64) -> BitVec {
  let mut mask = 1u64 << (nbits - 1);
  let mut v = BitVec::new();
  while mask != 0 {
    v.push(mask & source != 0);
    mask >>= 1;
  }
  v
}

fn bitvec_to_bytes(v: &BitVec) -> Vec<u8> {
  v.iter().map(|b| b as u8).collect()
}

/// Build the canonical code from per-symbol code lengths. Symbols with
/// length zero are omitted from the dictionary.
pub fn codes_from_lengths<S>(lengths: &HashMap<S, usize>) -> CodeDict<S>
where
  S: Eq + Hash + Ord + Clone + Debug,
{
  // Count the symbols at each code length; absent symbols (length zero)
  // take no part in code assignment.
  let mut bl_count = HashMap::<usize, usize>::new();
  bl_count.insert(0, 0);
  for len in lengths.values() {
    if *len != 0 {
      *bl_count.entry(*len).or_insert(0) += 1;
    }
  }
  let max_bits = *bl_count.keys().max().unwrap_or(&0);
  for (len, count) in bl_count.iter() {
    if *len == 0 || *len >= 64 {
      continue;
    }
    assert!(
      *count <= 1usize << len,
      "{} codes of {} bits cannot be prefix-free",
      count,
      len
    );
  }

  // Smallest code value at each length, per the RFC 1951 recipe.
  let mut code = 0u64;
  let mut next_code = HashMap::<usize, u64>::new();
  for bits in 1..=max_bits {
    let shorter = *bl_count.entry(bits - 1).or_default() as u64;
    code = (code + shorter) << 1;
    next_code.insert(bits, code);
  }

  let mut symbols: Vec<&S> = lengths.keys().collect();
  symbols.sort();
  let mut dict = Vec::with_capacity(symbols.len());
  for sym in symbols {
    let len = lengths[sym];
    if len == 0 {
      continue;
    }
    let assigned = next_code.get_mut(&len).unwrap();
    dict.push((sym.clone(), bitvec_to_bytes(&to_bitvec(len, *assigned))));
    *assigned += 1;
  }
  dict
}

/// Assign code lengths from frequencies, capped at `max_length` when given,
/// and compile the canonical code.
pub fn codes_from_freqs<S>(freqs: &HashMap<S, usize>, max_length: Option<usize>) -> CodeDict<S>
where
  S: Eq + Hash + Ord + Clone + Copy + Debug,
{
  if freqs.is_empty() {
    return Vec::new();
  }
  let lengths = lengths_from_freqs(freqs, max_length.unwrap_or(usize::MAX));
  codes_from_lengths(&lengths)
}

/// Length-restricted code lengths by package-merge.
pub fn lengths_from_freqs<S>(freqs: &HashMap<S, usize>, max_length: usize) -> HashMap<S, usize>
where
  S: Eq + Hash + Ord + Clone + Copy,
{
  let n = freqs.len();
  if n == 1 {
    // A lone symbol still needs one bit on the wire.
    let sym = *freqs.keys().next().unwrap();
    let mut lengths = HashMap::new();
    lengths.insert(sym, 1);
    return lengths;
  }

  // No optimal code over n symbols is deeper than n - 1, so an "unlimited"
  // cap never needs more denominations than the symbol count.
  let max_length = max_length.min(n.max(64));
  let mut coins = Vec::with_capacity(n * max_length);
  for (sym, freq) in freqs.iter() {
    for denom in 1..=max_length {
      coins.push(Coin {
        value: *freq,
        invdenom: denom,
        sym: *sym,
      });
    }
  }

  // The n-1 cheapest whole-value packages pay for the tree; each coin a
  // symbol contributes to them deepens that symbol by one level.
  let packages = package_merge(coins);
  let mut lengths = HashMap::new();
  for package in packages.into_iter().take(n - 1) {
    debug_assert_eq!(package.invdenom, 0);
    for coin in package.coins {
      *lengths.entry(coin.sym).or_insert(0) += 1;
    }
  }
  lengths
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Coin<S> {
  value: usize,
  /// Denomination 2^-invdenom.
  invdenom: usize,
  sym: S,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Package<S> {
  value: usize,
  invdenom: usize,
  coins: Vec<Coin<S>>,
}

impl<S: Clone + Copy> Package<S> {
  fn singleton(coin: Coin<S>) -> Self {
    Self {
      value: coin.value,
      invdenom: coin.invdenom,
      coins: vec![coin],
    }
  }

  fn merge(self, other: Package<S>) -> Package<S> {
    assert_eq!(self.invdenom, other.invdenom);
    assert_ne!(self.invdenom, 0, "merging two whole-value packages");
    let coins = self.coins.into_iter().chain(other.coins).collect();
    Package {
      value: self.value + other.value,
      invdenom: self.invdenom - 1,
      coins,
    }
  }
}

/// Pair off same-denomination packages, cheapest first; an odd leftover is
/// discarded.
fn pair_packages<S: Clone + Copy + Eq>(mut packages: Vec<Package<S>>) -> Vec<Package<S>> {
  packages.sort_by(|a, b| a.value.cmp(&b.value));
  let mut out = Vec::with_capacity(packages.len() / 2);
  let mut i = 0;
  while i + 1 < packages.len() {
    out.push(packages[i].clone().merge(packages[i + 1].clone()));
    i += 2;
  }
  out
}

/// Merge coins denomination by denomination until only whole-value packages
/// remain, returned cheapest first.
fn package_merge<S: Clone + Copy + Eq>(coins: Vec<Coin<S>>) -> Vec<Package<S>> {
  let mut by_denom: HashMap<usize, Vec<Package<S>>> = HashMap::new();
  for coin in coins {
    by_denom
      .entry(coin.invdenom)
      .or_default()
      .push(Package::singleton(coin));
  }

  let n_denoms = *by_denom.keys().max().unwrap() + 1;
  let mut levels: Vec<Vec<Package<S>>> = Vec::new();
  levels.resize_with(n_denoms, Default::default);
  for (denom, packages) in by_denom {
    levels[denom] = packages;
  }

  while levels.len() > 1 {
    let deepest = levels.pop().unwrap();
    let mut merged = pair_packages(deepest);
    let top = levels.len() - 1;
    levels[top].append(&mut merged);
  }

  let mut out = levels.pop().unwrap();
  out.sort_by(|a, b| a.value.cmp(&b.value));
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonical_codes_from_lengths() {
    let lengths: HashMap<i32, usize> = [
      (0, 3),
      (1, 3),
      (2, 3),
      (3, 3),
      (4, 3),
      (5, 2),
      (6, 4),
      (7, 4),
    ]
    .iter()
    .cloned()
    .collect();
    for (sym, code) in codes_from_lengths(&lengths) {
      let expect = match sym {
        0 => vec![0, 1, 0],
        1 => vec![0, 1, 1],
        2 => vec![1, 0, 0],
        3 => vec![1, 0, 1],
        4 => vec![1, 1, 0],
        5 => vec![0, 0],
        6 => vec![1, 1, 1, 0],
        7 => vec![1, 1, 1, 1],
        _ => panic!("symbol not in the test input"),
      };
      assert_eq!(code, expect, "symbol {}", sym);
    }
  }

  #[test]
  fn fixed_deflate_lengths_give_rfc_codes() {
    // The fixed literal/length code from RFC 1951 3.2.6 is the canonical
    // code of the well-known length table.
    let mut lengths = HashMap::<u16, usize>::new();
    for sym in 0u16..=287 {
      let len = match sym {
        0..=143 => 8,
        144..=255 => 9,
        256..=279 => 7,
        _ => 8,
      };
      lengths.insert(sym, len);
    }
    let dict = codes_from_lengths(&lengths);
    let lookup: HashMap<u16, Vec<u8>> = dict.into_iter().collect();
    assert_eq!(lookup[&0], vec![0, 0, 1, 1, 0, 0, 0, 0]);
    assert_eq!(lookup[&143], vec![1, 0, 1, 1, 1, 1, 1, 1]);
    assert_eq!(lookup[&144], vec![1, 1, 0, 0, 1, 0, 0, 0, 0]);
    assert_eq!(lookup[&256], vec![0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(lookup[&280], vec![1, 1, 0, 0, 0, 0, 0, 0]);
  }

  #[test]
  fn restricted_lengths_respect_the_cap() {
    let freqs: HashMap<u8, usize> = [(1, 1), (2, 32), (3, 16), (4, 4), (5, 8), (6, 2), (7, 1)]
      .iter()
      .cloned()
      .collect();
    let max8: HashMap<u8, usize> = [(1, 6), (2, 1), (3, 2), (4, 4), (5, 3), (6, 5), (7, 6)]
      .iter()
      .cloned()
      .collect();
    let max5: HashMap<u8, usize> = [(1, 5), (2, 1), (3, 2), (4, 5), (5, 3), (6, 5), (7, 5)]
      .iter()
      .cloned()
      .collect();
    assert_eq!(lengths_from_freqs(&freqs, 8), max8);
    assert_eq!(lengths_from_freqs(&freqs, 5), max5);
  }

  #[test]
  fn lengths_are_kraft_complete() {
    let freqs: HashMap<u16, usize> = (0..40u16).map(|s| (s, 1 + (s as usize * 7) % 13)).collect();
    for &cap in [6usize, 9, 15].iter() {
      let lengths = lengths_from_freqs(&freqs, cap);
      assert_eq!(lengths.len(), freqs.len());
      let kraft: f64 = lengths.values().map(|&l| (0.5f64).powi(l as i32)).sum();
      assert!((kraft - 1.0).abs() < 1e-9, "kraft sum {} at cap {}", kraft, cap);
      assert!(lengths.values().all(|&l| l >= 1 && l <= cap));
    }
  }

  #[test]
  fn singleton_gets_one_bit() {
    let mut freqs = HashMap::new();
    freqs.insert(42u16, 7usize);
    let dict = codes_from_freqs(&freqs, Some(15));
    assert_eq!(dict, vec![(42u16, vec![0u8])]);
  }
}
