/*! Adaptive range coding over a dense alphabet, with four escape policies
for the zero-frequency problem.

All four methods keep a per-symbol count table that both sides update in
lockstep, plus a "novel symbol" table holding one unit of mass for every
symbol not yet seen. An unseen symbol is coded as an escape (the top zone of
the interval) followed by a uniform pick among the remaining unseen symbols.
The methods differ in how much mass the escape zone gets:

- Method A reserves a flat single count.
- Method B gives symbols seen exactly once their own second-stage escape
  zone and codes re-seen symbols at count minus one.
- Method C grows the escape mass with the number of distinct symbols seen.
- Method D doubles all counts so a half count can be shaved off each
  distinct symbol.

Cumulative tables are repaired lazily from the lowest invalidated index, so
an update costs O(1) and a lookup costs at most the distance since the last
repair.
*/

use super::{Decoder, Encoder};

/// Symbols a dense table can be indexed by.
pub trait DenseSymbol: Copy + Eq {
  fn index(self) -> usize;
  fn from_index(ix: usize) -> Self;
}

macro_rules! impl_dense_symbol {
  ($($t:ty),*) => {
    $(impl DenseSymbol for $t {
      fn index(self) -> usize {
        self as usize
      }

      fn from_index(ix: usize) -> Self {
        debug_assert!(ix <= <$t>::MAX as usize);
        ix as $t
      }
    })*
  };
}

impl_dense_symbol!(u8, u16, u32, usize);

/// Cumulative-frequency table that is repaired on demand: `stale_from` is
/// the lowest index whose prefix sum may be out of date.
struct LazyCdf {
  cum: Vec<u64>,
  stale_from: usize,
}

impl LazyCdf {
  fn new(len: usize) -> Self {
    Self {
      cum: vec![0; len],
      stale_from: 0,
    }
  }

  /// Cumulative frequency below `d`, repairing stale entries first.
  fn cum_at(&mut self, freqs: &[u64], d: usize) -> u64 {
    if self.stale_from <= d {
      if self.stale_from == 0 {
        self.stale_from = 1;
      }
      for j in self.stale_from..=d {
        self.cum[j] = self.cum[j - 1] + freqs[j - 1];
      }
      self.stale_from = d + 1;
    }
    self.cum[d]
  }

  fn invalidate(&mut self, d: usize) {
    if d < self.stale_from {
      self.stale_from = d;
    }
  }
}

/// Rebuild the cumulative table above `d` after `freqs[d]` changed. The
/// novel-symbol tables change rarely (once per distinct symbol), so the
/// eager rebuild is fine there.
fn rebuild_tail(cum: &mut [u64], freqs: &[u64], d: usize) {
  for j in d + 1..freqs.len() {
    cum[j] = cum[j - 1] + freqs[j - 1];
  }
}

fn novel_tables(alphabet_size: usize) -> (Vec<u64>, Vec<u64>) {
  let nfreq = vec![1u64; alphabet_size];
  let mut sum_nfreq = vec![0u64; alphabet_size];
  rebuild_tail(&mut sum_nfreq, &nfreq, 0);
  (nfreq, sum_nfreq)
}

/// Method A: one flat count of escape mass.
pub fn adaptive_encode_a<S: DenseSymbol>(data: &[S], max: S) -> Vec<u8> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut seen = 0u64;
  let mut enc = Encoder::new();
  for (i, s) in data.iter().enumerate() {
    let n = i as u64 + 1;
    let d = s.index();
    if freq[d] == 0 {
      enc.encode(i as u64, 1, n);
      enc.encode(sum_nfreq[d], 1, alpha as u64 - seen);
      nfreq[d] = 0;
      rebuild_tail(&mut sum_nfreq, &nfreq, d);
      seen += 1;
    } else {
      let cum = cdf.cum_at(&freq, d);
      enc.encode(cum, freq[d], n);
    }
    freq[d] += 1;
    cdf.invalidate(d);
  }
  enc.finish()
}

pub fn adaptive_decode_a<S: DenseSymbol>(input: &[u8], original_len: usize, max: S) -> Vec<S> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut seen = 0u64;
  let mut dec = Decoder::new(input);
  let mut out = Vec::with_capacity(original_len);
  for i in 0..original_len {
    let n = i as u64 + 1;
    let d = match dec.partial_fetch(&freq, i as u64, n) {
      None => {
        dec.process(i as u64, 1, n);
        let d = dec.fetch_in(&nfreq, alpha as u64 - seen);
        dec.process(sum_nfreq[d], 1, alpha as u64 - seen);
        nfreq[d] = 0;
        rebuild_tail(&mut sum_nfreq, &nfreq, d);
        seen += 1;
        d
      }
      Some(d) => {
        let cum = cdf.cum_at(&freq, d);
        dec.process(cum, freq[d], n);
        d
      }
    };
    out.push(S::from_index(d));
    freq[d] += 1;
    cdf.invalidate(d);
  }
  out
}

/// Method B: re-seen symbols are coded at count minus one; symbols seen
/// exactly once live in a second escape zone of their own.
pub fn adaptive_encode_b<S: DenseSymbol>(data: &[S], max: S) -> Vec<u8> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut freq_m1 = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut nfreq2 = vec![0u64; alpha];
  let mut sum_nfreq2 = vec![0u64; alpha];
  let mut seen = 0u64;
  let mut once = 0u64;
  let mut enc = Encoder::new();
  for (i, s) in data.iter().enumerate() {
    let d = s.index();
    if freq[d] <= 1 {
      if i != 0 {
        enc.encode(i as u64 - seen, seen, i as u64);
      }
      let n = alpha as u64 - seen + once;
      if freq[d] == 0 {
        enc.encode(sum_nfreq[d], 1, n);
        nfreq[d] = 0;
        nfreq2[d] = 1;
        rebuild_tail(&mut sum_nfreq, &nfreq, d);
        rebuild_tail(&mut sum_nfreq2, &nfreq2, d);
        seen += 1;
        once += 1;
      } else {
        enc.encode(alpha as u64 - seen, once, n);
        enc.encode(sum_nfreq2[d], 1, once);
        nfreq2[d] = 0;
        rebuild_tail(&mut sum_nfreq2, &nfreq2, d);
        once -= 1;
      }
    } else {
      let cum = cdf.cum_at(&freq_m1, d);
      enc.encode(cum, freq_m1[d], i as u64);
    }
    freq_m1[d] = freq[d];
    freq[d] += 1;
    cdf.invalidate(d);
  }
  enc.finish()
}

pub fn adaptive_decode_b<S: DenseSymbol>(input: &[u8], original_len: usize, max: S) -> Vec<S> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut freq_m1 = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut nfreq2 = vec![0u64; alpha];
  let mut sum_nfreq2 = vec![0u64; alpha];
  let mut seen = 0u64;
  let mut once = 0u64;
  let mut dec = Decoder::new(input);
  let mut out = Vec::with_capacity(original_len);
  for i in 0..original_len {
    let fetched = dec.partial_fetch(&freq_m1, i as u64 - seen, i as u64);
    let d = match fetched {
      Some(d) if i != 0 => {
        let cum = cdf.cum_at(&freq_m1, d);
        dec.process(cum, freq_m1[d], i as u64);
        d
      }
      _ => {
        if i != 0 {
          dec.process(i as u64 - seen, seen, i as u64);
        }
        let n = alpha as u64 - seen + once;
        match dec.partial_fetch(&nfreq, alpha as u64 - seen, n) {
          Some(d) => {
            dec.process(sum_nfreq[d], 1, n);
            nfreq[d] = 0;
            nfreq2[d] = 1;
            rebuild_tail(&mut sum_nfreq, &nfreq, d);
            rebuild_tail(&mut sum_nfreq2, &nfreq2, d);
            seen += 1;
            once += 1;
            d
          }
          None => {
            dec.process(alpha as u64 - seen, once, n);
            let d = dec.fetch_in(&nfreq2, once);
            dec.process(sum_nfreq2[d], 1, once);
            nfreq2[d] = 0;
            rebuild_tail(&mut sum_nfreq2, &nfreq2, d);
            once -= 1;
            d
          }
        }
      }
    };
    out.push(S::from_index(d));
    freq_m1[d] = freq[d];
    freq[d] += 1;
    cdf.invalidate(d);
  }
  out
}

/// Method C: escape mass equal to the number of distinct symbols seen.
pub fn adaptive_encode_c<S: DenseSymbol>(data: &[S], max: S) -> Vec<u8> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut seen = 0u64;
  let mut enc = Encoder::new();
  for (i, s) in data.iter().enumerate() {
    let n = i as u64 + seen;
    let d = s.index();
    if freq[d] == 0 {
      if i != 0 {
        enc.encode(i as u64, seen, n);
      }
      enc.encode(sum_nfreq[d], 1, alpha as u64 - seen);
      nfreq[d] = 0;
      rebuild_tail(&mut sum_nfreq, &nfreq, d);
      seen += 1;
    } else {
      let cum = cdf.cum_at(&freq, d);
      enc.encode(cum, freq[d], n);
    }
    freq[d] += 1;
    cdf.invalidate(d);
  }
  enc.finish()
}

pub fn adaptive_decode_c<S: DenseSymbol>(input: &[u8], original_len: usize, max: S) -> Vec<S> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut seen = 0u64;
  let mut dec = Decoder::new(input);
  let mut out = Vec::with_capacity(original_len);
  for i in 0..original_len {
    let n = i as u64 + seen;
    let fetched = dec.partial_fetch(&freq, i as u64, n);
    let d = match fetched {
      Some(d) if i != 0 => {
        let cum = cdf.cum_at(&freq, d);
        dec.process(cum, freq[d], n);
        d
      }
      _ => {
        if i != 0 {
          dec.process(i as u64, seen, n);
        }
        let d = dec.fetch_in(&nfreq, alpha as u64 - seen);
        dec.process(sum_nfreq[d], 1, alpha as u64 - seen);
        nfreq[d] = 0;
        rebuild_tail(&mut sum_nfreq, &nfreq, d);
        seen += 1;
        d
      }
    };
    out.push(S::from_index(d));
    freq[d] += 1;
    cdf.invalidate(d);
  }
  out
}

/// Method D: counts are doubled so each distinct symbol can donate a half
/// count of escape mass.
pub fn adaptive_encode_d<S: DenseSymbol>(data: &[S], max: S) -> Vec<u8> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut seen = 0u64;
  let mut enc = Encoder::new();
  for (i, s) in data.iter().enumerate() {
    let d = s.index();
    if freq[d] == 0 {
      if i != 0 {
        enc.encode(i as u64 * 2 - seen, seen, i as u64 * 2);
      }
      enc.encode(sum_nfreq[d], 1, alpha as u64 - seen);
      nfreq[d] = 0;
      rebuild_tail(&mut sum_nfreq, &nfreq, d);
      seen += 1;
      freq[d] = freq[d].wrapping_sub(1);
    } else {
      let cum = cdf.cum_at(&freq, d);
      enc.encode(cum, freq[d], i as u64 * 2);
    }
    freq[d] = freq[d].wrapping_add(2);
    cdf.invalidate(d);
  }
  enc.finish()
}

pub fn adaptive_decode_d<S: DenseSymbol>(input: &[u8], original_len: usize, max: S) -> Vec<S> {
  let alpha = max.index() + 1;
  let mut freq = vec![0u64; alpha];
  let mut cdf = LazyCdf::new(alpha);
  let (mut nfreq, mut sum_nfreq) = novel_tables(alpha);
  let mut seen = 0u64;
  let mut dec = Decoder::new(input);
  let mut out = Vec::with_capacity(original_len);
  for i in 0..original_len {
    let total = i as u64 * 2;
    let fetched = dec.partial_fetch(&freq, total - seen, total);
    let d = match fetched {
      Some(d) if i != 0 => {
        let cum = cdf.cum_at(&freq, d);
        dec.process(cum, freq[d], total);
        d
      }
      _ => {
        if i != 0 {
          dec.process(total - seen, seen, total);
        }
        let d = dec.fetch_in(&nfreq, alpha as u64 - seen);
        dec.process(sum_nfreq[d], 1, alpha as u64 - seen);
        nfreq[d] = 0;
        rebuild_tail(&mut sum_nfreq, &nfreq, d);
        seen += 1;
        freq[d] = freq[d].wrapping_sub(1);
        d
      }
    };
    out.push(S::from_index(d));
    freq[d] = freq[d].wrapping_add(2);
    cdf.invalidate(d);
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  fn sample(seed: u64, len: usize, max: u32) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..=max)).collect()
  }

  #[test]
  fn method_a_roundtrip() {
    let data = sample(10, 10_000, 99);
    let encoded = adaptive_encode_a(&data, 99u32);
    assert_eq!(adaptive_decode_a(&encoded, data.len(), 99u32), data);
  }

  #[test]
  fn method_b_roundtrip() {
    let data = sample(11, 10_000, 99);
    let encoded = adaptive_encode_b(&data, 99u32);
    assert_eq!(adaptive_decode_b(&encoded, data.len(), 99u32), data);
  }

  #[test]
  fn method_c_roundtrip() {
    let data = sample(12, 10_000, 99);
    let encoded = adaptive_encode_c(&data, 99u32);
    assert_eq!(adaptive_decode_c(&encoded, data.len(), 99u32), data);
  }

  #[test]
  fn method_d_roundtrip() {
    let data = sample(13, 10_000, 99);
    let encoded = adaptive_encode_d(&data, 99u32);
    assert_eq!(adaptive_decode_d(&encoded, data.len(), 99u32), data);
  }

  #[test]
  fn small_and_degenerate_inputs() {
    let empty: Vec<u8> = Vec::new();
    assert_eq!(
      adaptive_decode_a(&adaptive_encode_a(&empty, 5u8), 0, 5u8),
      empty
    );

    let single = vec![3u8];
    assert_eq!(
      adaptive_decode_b(&adaptive_encode_b(&single, 5u8), 1, 5u8),
      single
    );

    let run = vec![0u8; 500];
    assert_eq!(
      adaptive_decode_c(&adaptive_encode_c(&run, 1u8), run.len(), 1u8),
      run
    );
    assert_eq!(
      adaptive_decode_d(&adaptive_encode_d(&run, 1u8), run.len(), 1u8),
      run
    );
  }

  #[test]
  fn full_alphabet_coverage() {
    // Every symbol of the alphabet appears, so the novel-symbol table is
    // fully consumed by the end.
    let mut data: Vec<u8> = (0..=255u8).map(|x| x as u8).collect();
    data.extend((0..=255u8).rev());
    for _ in 0..4 {
      let encoded = adaptive_encode_a(&data, 255u8);
      assert_eq!(adaptive_decode_a(&encoded, data.len(), 255u8), data);
      let encoded = adaptive_encode_b(&data, 255u8);
      assert_eq!(adaptive_decode_b(&encoded, data.len(), 255u8), data);
      let encoded = adaptive_encode_c(&data, 255u8);
      assert_eq!(adaptive_decode_c(&encoded, data.len(), 255u8), data);
      let encoded = adaptive_encode_d(&data, 255u8);
      assert_eq!(adaptive_decode_d(&encoded, data.len(), 255u8), data);
      data.extend_from_slice(&data.clone());
    }
  }

  #[test]
  fn carry_stress_100k() {
    let data = sample(99, 120_000, 7);
    let encoded = adaptive_encode_c(&data, 7u32);
    assert_eq!(adaptive_decode_c(&encoded, data.len(), 7u32), data);
  }
}
