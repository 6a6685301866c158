/*! A byte-oriented range coder with 64-bit working precision.

The coder narrows a [low, low+range) interval proportionally to symbol
probability, expressed as (cumulative, frequency, total) triples. Settled
high-order bytes are shifted out once `range` drops below the working floor,
and additions into `low` carry into bytes that have already been emitted.

All interval arithmetic runs on fixed-point fractions of 2^64. The two
primitives this requires, a 64x64 -> high-64 multiply and a floor(x * 2^64 / z)
divide, are built from 32-bit halves and a shift-subtract loop so that no
wider-than-64-bit integer is ever needed. Exactness here is not optional: a
single off-by-one desynchronizes the encoder and decoder with no way to
resynchronize, since the stream carries no redundancy.
*/

pub mod adaptive;

use std::collections::BTreeMap;

pub use adaptive::{
  adaptive_decode_a, adaptive_decode_b, adaptive_decode_c, adaptive_decode_d, adaptive_encode_a,
  adaptive_encode_b, adaptive_encode_c, adaptive_encode_d, DenseSymbol,
};

/// Renormalization floor: once `range` is below this, the top byte of the
/// interval is settled and can be moved to the output buffer.
const RENORM_FLOOR: u64 = (1u64 << 56) - 1;

/// High 64 bits of the 128-bit product `u * v`, by 32-bit half decomposition.
pub(crate) fn mulhi(u: u64, v: u64) -> u64 {
  const HALF_MASK: u64 = 0xffff_ffff;
  let u0 = u & HALF_MASK;
  let u1 = u >> 32;
  let v0 = v & HALF_MASK;
  let v1 = v >> 32;
  let w0 = u0 * v0;
  let t = u1 * v0 + (w0 >> 32);
  let w1 = (t & HALF_MASK) + u0 * v1;
  let w2 = t >> 32;
  u1 * v1 + w2 + (w1 >> 32)
}

/// floor(x * 2^64 / z), by 64 rounds of shift-subtract long division.
///
/// The quotient saturates at u64::MAX when the mathematical result does not
/// fit (x >= z), which is exactly the behaviour the interval arithmetic
/// relies on for a full-range subdivision.
pub(crate) fn idiv(x: u64, z: u64) -> u64 {
  debug_assert!(z != 0, "range subdivision with zero total");
  let mut x = x;
  let mut y: u64 = 0;
  for _ in 0..64 {
    let t = x & (1u64 << 63) != 0;
    x = (x << 1) | (y >> 63);
    y <<= 1;
    if t || x >= z {
      x = x.wrapping_sub(z);
      y += 1;
    }
  }
  y
}

/// Encoder state. `low` and `range` describe the current interval; `buf`
/// holds the settled output bytes, which a carry out of `low` may still
/// increment after the fact.
pub struct Encoder {
  buf: Vec<u8>,
  low: u64,
  range: u64,
}

impl Default for Encoder {
  fn default() -> Self {
    Self::new()
  }
}

impl Encoder {
  pub fn new() -> Self {
    Self {
      buf: Vec::new(),
      low: 0,
      range: u64::MAX,
    }
  }

  /// Propagate a +1 carry backwards through the emitted bytes.
  ///
  /// A carry with an empty buffer would mean low + range exceeded the
  /// representable span, which the subdivision arithmetic never allows.
  fn propagate_carry(&mut self) {
    let mut i = self.buf.len() - 1;
    self.buf[i] = self.buf[i].wrapping_add(1);
    while self.buf[i] == 0 {
      i -= 1;
      self.buf[i] = self.buf[i].wrapping_add(1);
    }
  }

  fn renormalize(&mut self) {
    while self.range < RENORM_FLOOR {
      self.buf.push((self.low >> 56) as u8);
      self.low <<= 8;
      self.range <<= 8;
    }
  }

  /// Narrow the interval by fractions of 2^64 that have already been scaled.
  fn encode_scaled(&mut self, low: u64, range: u64) {
    let new_low = self.low.wrapping_add(mulhi(self.range, low));
    if new_low < self.low {
      self.propagate_carry();
    }
    self.low = new_low;
    self.range = mulhi(self.range, range);
    self.renormalize();
  }

  /// Encode one symbol described by its cumulative frequency, frequency, and
  /// the table total. `cum + freq <= total` and `total > 0` are caller
  /// contracts.
  pub fn encode(&mut self, cum: u64, freq: u64, total: u64) {
    self.encode_scaled(idiv(cum, total), idiv(freq, total));
  }

  /// Flush the interval midpoint and return the finished byte stream.
  pub fn finish(mut self) -> Vec<u8> {
    let new_low = self.low.wrapping_add(self.range / 2);
    if new_low < self.low {
      self.propagate_carry();
    }
    self.low = new_low;
    self.buf.push((self.low >> 56) as u8);
    self.buf.push((self.low >> 48) as u8);
    self.buf
  }
}

/// Decoder state. `data` is a 64-bit window over the consumed input which is
/// refilled a byte at a time as the interval renormalizes.
pub struct Decoder<'a> {
  input: &'a [u8],
  low: u64,
  range: u64,
  data: u64,
  index: usize,
}

impl<'a> Decoder<'a> {
  pub fn new(input: &'a [u8]) -> Self {
    let mut data = 0u64;
    for i in 0..8 {
      data <<= 8;
      if i < input.len() {
        data += u64::from(input[i]);
      }
    }
    Self {
      input,
      low: 0,
      range: u64::MAX,
      data,
      index: 8,
    }
  }

  /// Position of the consumed bits inside the current interval.
  fn code_offset(&self) -> u64 {
    self.data.wrapping_sub(self.low)
  }

  /// Does the consumed value fall at or above `border` out of `total`?
  ///
  /// Used by escape-based models: the escape zone is the top part of the
  /// interval. A border equal to the total leaves nothing to subdivide, so
  /// the answer is always "no".
  pub fn split(&self, border: u64, total: u64) -> bool {
    if border == total {
      return false;
    }
    let ch_in = idiv(self.code_offset(), self.range);
    idiv(border, total) <= ch_in
  }

  /// The cumulative-frequency bucket the consumed value falls into, out of
  /// `total`.
  pub fn fetch(&self, total: u64) -> u64 {
    mulhi(idiv(self.code_offset(), self.range), total)
  }

  /// Identify a symbol from a dense frequency table, or `None` if the
  /// consumed value falls outside the first `covered` units of `total`
  /// (the caller then consults its escape path instead).
  pub fn partial_fetch(&self, freqs: &[u64], covered: u64, total: u64) -> Option<usize> {
    if total == 0 {
      return None;
    }
    let exact = idiv(self.code_offset(), self.range);
    if idiv(covered, total) <= exact {
      return None;
    }
    let ch_in = mulhi(exact, total);
    let mut ch = 0usize;
    let mut cum = freqs[0];
    while cum <= ch_in {
      ch += 1;
      cum += freqs[ch];
    }
    Some(ch)
  }

  /// Identify a symbol from a dense frequency table whose entries sum to at
  /// least the consumed bucket.
  pub fn fetch_in(&self, freqs: &[u64], total: u64) -> usize {
    let ch_in = self.fetch(total);
    let mut ch = 0usize;
    let mut cum = freqs[0];
    while cum <= ch_in {
      ch += 1;
      cum += freqs[ch];
    }
    ch
  }

  /// Mirror of [`Encoder::encode`]: narrow the interval by the identified
  /// symbol's triple, refilling the data window as bytes settle.
  pub fn process(&mut self, cum: u64, freq: u64, total: u64) {
    let fixed_low = idiv(cum, total);
    let fixed_range = idiv(freq, total);
    self.low = self.low.wrapping_add(mulhi(self.range, fixed_low));
    self.range = mulhi(self.range, fixed_range);
    while self.range < RENORM_FLOOR {
      self.data <<= 8;
      self.low <<= 8;
      self.range <<= 8;
      if self.index < self.input.len() {
        self.data += u64::from(self.input[self.index]);
        self.index += 1;
      }
    }
  }
}

/// Encode `data` against a fixed frequency table. Every symbol in `data`
/// must appear in `freq` with a nonzero count.
pub fn static_encode<T: Ord + Copy>(data: &[T], freq: &[(T, u64)]) -> Vec<u8> {
  let mut cum_map = BTreeMap::new();
  let mut freq_map = BTreeMap::new();
  let mut sum = 0u64;
  for &(sym, f) in freq {
    cum_map.insert(sym, sum);
    freq_map.insert(sym, f);
    sum += f;
  }
  let mut enc = Encoder::new();
  for sym in data {
    let cum = match cum_map.get(sym) {
      Some(&c) => c,
      None => panic!("symbol missing from the static frequency table"),
    };
    enc.encode(cum, freq_map[sym], sum);
  }
  enc.finish()
}

/// Count symbol frequencies and encode against them. Returns the encoded
/// bytes together with the table and length the decoder needs.
pub fn static_encode_auto<T: Ord + Copy>(data: &[T]) -> (Vec<u8>, Vec<(T, u64)>, usize) {
  let mut counts = BTreeMap::new();
  for sym in data {
    *counts.entry(*sym).or_insert(0u64) += 1;
  }
  let freq: Vec<(T, u64)> = counts.into_iter().collect();
  let encoded = static_encode(data, &freq);
  (encoded, freq, data.len())
}

/// Decode `original_len` symbols against the same fixed table the encoder
/// used. Symbol identification is a binary search over the cumulative sums.
pub fn static_decode<T: Copy>(input: &[u8], freq: &[(T, u64)], original_len: usize) -> Vec<T> {
  if original_len == 0 {
    return Vec::new();
  }
  let mut cum = Vec::with_capacity(freq.len());
  let mut sum = 0u64;
  for &(_, f) in freq {
    cum.push(sum);
    sum += f;
  }
  let mut dec = Decoder::new(input);
  let mut out = Vec::with_capacity(original_len);
  for _ in 0..original_len {
    let ch_in = dec.fetch(sum);
    let mut left = 0usize;
    let mut right = freq.len() - 1;
    while left < right {
      let mid = (left + right) / 2;
      if cum[mid + 1] <= ch_in {
        left = mid + 1;
      } else {
        right = mid;
      }
    }
    dec.process(cum[left], freq[left].1, sum);
    out.push(freq[left].0);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use quickcheck_macros::quickcheck;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  #[quickcheck]
  fn qc_static_roundtrip(data: Vec<u8>) -> bool {
    let (encoded, freq, len) = static_encode_auto(&data);
    static_decode(&encoded, &freq, len) == data
  }

  #[quickcheck]
  fn qc_mulhi_idiv_consistent(u: u64, v: u64) -> bool {
    let wide = (u as u128 * v as u128 >> 64) as u64;
    if mulhi(u, v) != wide {
      return false;
    }
    if v == 0 {
      return true;
    }
    // The coder only ever divides a numerator by a total at least as large.
    let x = u % v;
    let q = ((x as u128) << 64) / v as u128;
    idiv(x, v) == q as u64
  }

  #[test]
  fn mulhi_matches_wide_multiply() {
    let cases = [
      (0u64, 0u64),
      (1, 1),
      (u64::MAX, u64::MAX),
      (u64::MAX, 2),
      (0xdead_beef_cafe_f00d, 0x1234_5678_9abc_def0),
      (1 << 63, 3),
    ];
    for &(u, v) in cases.iter() {
      let wide = (u as u128 * v as u128 >> 64) as u64;
      assert_eq!(mulhi(u, v), wide, "mulhi({:#x}, {:#x})", u, v);
    }
  }

  #[test]
  fn idiv_matches_wide_divide() {
    let cases = [
      (0u64, 1u64),
      (1, 1),
      (1, 3),
      (2, 3),
      (12345, 99999),
      (u64::MAX - 1, u64::MAX),
    ];
    for &(x, z) in cases.iter() {
      let wide = ((x as u128) << 64) / z as u128;
      let expect = if wide > u64::MAX as u128 {
        u64::MAX
      } else {
        wide as u64
      };
      assert_eq!(idiv(x, z), expect, "idiv({:#x}, {:#x})", x, z);
    }
  }

  #[test]
  fn raw_triples_roundtrip() {
    // Drive the coder directly with a fixed three-symbol distribution.
    let freq = [5u64, 3, 2];
    let cum = [0u64, 5, 8];
    let total = 10u64;
    let syms: Vec<usize> = (0..2000).map(|i| (i * 7 + i / 3) % 3).collect();

    let mut enc = Encoder::new();
    for &s in syms.iter() {
      enc.encode(cum[s], freq[s], total);
    }
    let bytes = enc.finish();

    let mut dec = Decoder::new(&bytes);
    for &s in syms.iter() {
      let got = dec.fetch_in(&freq, total);
      assert_eq!(got, s);
      dec.process(cum[got], freq[got], total);
    }
  }

  #[test]
  fn static_roundtrip_random() {
    let mut rng = StdRng::seed_from_u64(10);
    let data: Vec<u32> = (0..10_000).map(|_| rng.gen_range(0..100)).collect();
    let (encoded, freq, len) = static_encode_auto(&data);
    let decoded = static_decode(&encoded, &freq, len);
    assert_eq!(decoded, data);
  }

  #[test]
  fn static_roundtrip_carry_stress() {
    // Long, heavily skewed stream: low stays near the top of the interval
    // for long stretches, which is what exercises carry propagation.
    let mut rng = StdRng::seed_from_u64(77);
    let data: Vec<u8> = (0..150_000)
      .map(|_| if rng.gen_range(0..100) < 97 { 1u8 } else { 0u8 })
      .collect();
    let (encoded, freq, len) = static_encode_auto(&data);
    let decoded = static_decode(&encoded, &freq, len);
    assert_eq!(decoded, data);
  }

  #[test]
  fn static_roundtrip_degenerate_inputs() {
    let empty: Vec<u8> = Vec::new();
    let (encoded, freq, len) = static_encode_auto(&empty);
    assert_eq!(static_decode(&encoded, &freq, len), empty);

    let one = vec![42u8, 42, 42];
    let (encoded, freq, len) = static_encode_auto(&one);
    assert_eq!(static_decode(&encoded, &freq, len), one);
  }
}
