/*! Prediction by partial matching over the range coder.

A predictor keeps one frequency table per context order, keyed by the most
recent k symbols at order k. Symbols the current context has never seen are
coded as escapes down to shorter contexts, and ultimately as a uniform pick
over the not-yet-seen part of the alphabet. Four escape policies (Methods
A-D) control how much probability mass the escape gets; they are selected at
construction and are not interchangeable mid-stream.

The escape state is a single counter resolved to an (order, stage) pair.
Methods A, C, and D spend one escape per order. Method B spends two: a
context first escapes into its "seen exactly once" set, and only a second
escape moves to the next-shorter order. Frequency updates propagate down
exactly the chain of fully-escaped orders (update exclusion), and each
order's context window shifts the way the original recursion reaches it, so
an encoder and decoder built with the same parameters stay in lockstep.
*/

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::Hash;

use crate::range::{Decoder, Encoder};

/// Escape policy for the zero-frequency problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  A,
  B,
  C,
  D,
}

/// Per-context counts. `once` holds symbols seen exactly once and not
/// re-seen since; only Method B reads it.
struct ContextStats<T: Ord> {
  freq: BTreeMap<T, u64>,
  once: BTreeSet<T>,
  total: u64,
}

impl<T: Ord> ContextStats<T> {
  fn new() -> Self {
    Self {
      freq: BTreeMap::new(),
      once: BTreeSet::new(),
      total: 0,
    }
  }
}

/// All contexts of one order, plus the most-recent-k window keying them.
struct OrderTable<T: Ord> {
  window: VecDeque<T>,
  contexts: HashMap<Vec<T>, ContextStats<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
  /// Regular counts of the active context.
  Normal,
  /// Method B's second chance: the context's seen-exactly-once set.
  Once,
  /// Uniform over the symbols the base context has never seen.
  Novel,
}

pub struct Predictor<T: Ord + Hash + Copy> {
  alphabet: BTreeSet<T>,
  method: Method,
  depth: usize,
  orders: Vec<OrderTable<T>>,
  escapes: usize,
}

impl<T: Ord + Hash + Copy> Predictor<T> {
  pub fn new(alphabet: BTreeSet<T>, depth: usize, method: Method) -> Self {
    let orders = (0..=depth)
      .map(|_| OrderTable {
        window: VecDeque::new(),
        contexts: HashMap::new(),
      })
      .collect();
    Self {
      alphabet,
      method,
      depth,
      orders,
      escapes: 0,
    }
  }

  /// Which order and stage the current escape count lands on.
  fn resolve(&self) -> (usize, Stage) {
    match self.method {
      Method::B => {
        let levels = self.escapes / 2;
        if levels > self.depth {
          (0, Stage::Novel)
        } else if self.escapes % 2 == 0 {
          (self.depth - levels, Stage::Normal)
        } else {
          (self.depth - levels, Stage::Once)
        }
      }
      _ => {
        if self.escapes > self.depth {
          (0, Stage::Novel)
        } else {
          (self.depth - self.escapes, Stage::Normal)
        }
      }
    }
  }

  fn window_full(&self, order: usize) -> bool {
    self.orders[order].window.len() >= order
  }

  fn stats(&self, order: usize) -> Option<&ContextStats<T>> {
    let table = &self.orders[order];
    if table.window.len() < order {
      return None;
    }
    let key: Vec<T> = table.window.iter().copied().collect();
    table.contexts.get(&key)
  }

  /// The per-symbol mass a stored count contributes at the Normal stage.
  fn weight(&self, count: u64) -> u64 {
    match self.method {
      Method::A | Method::C => count,
      Method::B => count - 1,
      Method::D => count * 2 - 1,
    }
  }

  fn counts(&self, order: usize) -> (u64, u64) {
    match self.stats(order) {
      Some(st) => (st.total, st.freq.len() as u64),
      None => (0, 0),
    }
  }

  fn seen_at_base(&self) -> u64 {
    match self.stats(0) {
      Some(st) => st.freq.len() as u64,
      None => 0,
    }
  }

  pub fn has_to_escape(&self, value: T) -> bool {
    let (order, stage) = self.resolve();
    match stage {
      Stage::Novel => false,
      Stage::Once => match self.stats(order) {
        Some(st) => !st.once.contains(&value),
        None => true,
      },
      Stage::Normal => match self.stats(order) {
        Some(st) => match self.method {
          Method::B => match st.freq.get(&value) {
            Some(_) => st.once.contains(&value),
            None => true,
          },
          _ => !st.freq.contains_key(&value),
        },
        None => true,
      },
    }
  }

  pub fn denominator(&self) -> u64 {
    let (order, stage) = self.resolve();
    match stage {
      Stage::Novel => self.alphabet.len() as u64 - self.seen_at_base(),
      Stage::Once => {
        if !self.window_full(order) {
          return 1;
        }
        let (distinct, once) = match self.stats(order) {
          Some(st) => (st.freq.len() as u64, st.once.len() as u64),
          None => (0, 0),
        };
        self.alphabet.len() as u64 - distinct + once
      }
      Stage::Normal => {
        let (n, q) = self.counts(order);
        match self.method {
          Method::A => n + 1,
          Method::B => {
            if n == 0 {
              1
            } else {
              n
            }
          }
          Method::C => {
            if n == 0 {
              1
            } else {
              n + q
            }
          }
          Method::D => {
            if n == 0 {
              1
            } else {
              n * 2
            }
          }
        }
      }
    }
  }

  pub fn numerator(&self) -> u64 {
    let (order, stage) = self.resolve();
    match stage {
      Stage::Novel => self.alphabet.len() as u64 - self.seen_at_base(),
      Stage::Once => match self.stats(order) {
        Some(st) => st.once.len() as u64,
        None => 0,
      },
      Stage::Normal => {
        let (n, q) = self.counts(order);
        match self.method {
          Method::A | Method::C => n,
          Method::B => n - q,
          Method::D => n * 2 - q,
        }
      }
    }
  }

  pub fn pdf(&self, value: T) -> u64 {
    let (order, stage) = self.resolve();
    match stage {
      Stage::Novel | Stage::Once => 1,
      Stage::Normal => match self.stats(order) {
        Some(st) => match st.freq.get(&value) {
          Some(&f) => self.weight(f),
          None => 0,
        },
        None => 0,
      },
    }
  }

  pub fn cdf(&self, value: T) -> u64 {
    let (order, stage) = self.resolve();
    match stage {
      Stage::Novel => {
        let base = self.stats(0);
        self
          .alphabet
          .range(..value)
          .filter(|sym| base.map_or(true, |st| !st.freq.contains_key(*sym)))
          .count() as u64
      }
      Stage::Once => match self.stats(order) {
        Some(st) => st.once.range(..value).count() as u64,
        None => 0,
      },
      Stage::Normal => match self.stats(order) {
        Some(st) => st.freq.range(..value).map(|(_, &f)| self.weight(f)).sum(),
        None => 0,
      },
    }
  }

  /// Inverse of `cdf` for the current stage. Panics if the cumulative value
  /// does not land on any symbol, which means the decoder has lost sync
  /// with the model that produced the stream.
  pub fn icdf(&self, cum: u64) -> T {
    let (order, stage) = self.resolve();
    match stage {
      Stage::Novel => {
        let base = self.stats(0);
        let mut sum = 0u64;
        for sym in self.alphabet.iter() {
          if base.map_or(true, |st| !st.freq.contains_key(sym)) {
            sum += 1;
            if sum > cum {
              return *sym;
            }
          }
        }
      }
      Stage::Once => {
        if let Some(st) = self.stats(order) {
          let mut sum = 0u64;
          for sym in st.once.iter() {
            sum += 1;
            if sum > cum {
              return *sym;
            }
          }
        }
      }
      Stage::Normal => {
        if let Some(st) = self.stats(order) {
          let mut sum = 0u64;
          for (sym, &f) in st.freq.iter() {
            sum += self.weight(f);
            if sum > cum {
              return *sym;
            }
          }
        }
      }
    }
    panic!("predictor lost sync with the coded stream");
  }

  pub fn enter_escape_mode(&mut self) {
    self.escapes += 1;
  }

  pub fn leave_escape_mode(&mut self) {
    self.escapes = 0;
  }

  /// How many orders were fully escaped through for the current symbol.
  fn escaped_levels(&self) -> usize {
    let levels = match self.method {
      Method::B => self.escapes / 2,
      _ => self.escapes,
    };
    levels.min(self.depth)
  }

  fn bump(&mut self, order: usize, value: T) {
    let table = &mut self.orders[order];
    if table.window.len() < order {
      return;
    }
    let key: Vec<T> = table.window.iter().copied().collect();
    let st = table.contexts.entry(key).or_insert_with(ContextStats::new);
    match st.freq.get_mut(&value) {
      Some(f) => {
        *f += 1;
        st.once.remove(&value);
      }
      None => {
        st.freq.insert(value, 1);
        st.once.insert(value);
      }
    }
    st.total += 1;
  }

  fn shift_window(&mut self, order: usize, value: T) {
    if order == 0 {
      return;
    }
    let table = &mut self.orders[order];
    if table.window.len() == order {
      table.window.pop_front();
    }
    table.window.push_back(value);
  }

  /// Record the coded symbol. Counts bump down exactly the chain of orders
  /// the escapes passed through; context windows shift one order further,
  /// mirroring how the original per-order recursion reaches them.
  pub fn update_predictor(&mut self, value: T) {
    let full = self.escaped_levels();
    let lowest_bumped = self.depth - full;
    for order in lowest_bumped..=self.depth {
      self.bump(order, value);
    }
    let lowest_shifted = lowest_bumped.saturating_sub(1);
    for order in lowest_shifted..=self.depth {
      self.shift_window(order, value);
    }
  }
}

/// Encode a symbol sequence with a fresh predictor over `alphabet`.
pub fn encode<T: Ord + Hash + Copy>(
  data: &[T],
  alphabet: &BTreeSet<T>,
  depth: usize,
  method: Method,
) -> Vec<u8> {
  let mut predictor = Predictor::new(alphabet.clone(), depth, method);
  let mut enc = Encoder::new();
  for sym in data {
    assert!(
      alphabet.contains(sym),
      "symbol outside the predictor alphabet"
    );
    while predictor.has_to_escape(*sym) {
      let num = predictor.numerator();
      let den = predictor.denominator();
      if den != num {
        enc.encode(num, den - num, den);
      }
      predictor.enter_escape_mode();
    }
    enc.encode(predictor.cdf(*sym), predictor.pdf(*sym), predictor.denominator());
    predictor.update_predictor(*sym);
    predictor.leave_escape_mode();
  }
  enc.finish()
}

/// Collect the alphabet from the data, then encode. Returns the alphabet
/// and length alongside the bytes, which is what `decode` needs back.
pub fn encode_auto<T: Ord + Hash + Copy>(
  data: &[T],
  depth: usize,
  method: Method,
) -> (Vec<u8>, BTreeSet<T>, usize) {
  let alphabet: BTreeSet<T> = data.iter().copied().collect();
  let encoded = encode(data, &alphabet, depth, method);
  (encoded, alphabet, data.len())
}

/// Decode `original_len` symbols with a predictor built from the same
/// alphabet, depth, and method the encoder used.
pub fn decode<T: Ord + Hash + Copy>(
  input: &[u8],
  alphabet: &BTreeSet<T>,
  original_len: usize,
  depth: usize,
  method: Method,
) -> Vec<T> {
  let mut predictor = Predictor::new(alphabet.clone(), depth, method);
  let mut dec = Decoder::new(input);
  let mut out = Vec::with_capacity(original_len);
  for _ in 0..original_len {
    while dec.split(predictor.numerator(), predictor.denominator()) {
      let num = predictor.numerator();
      let den = predictor.denominator();
      if den != num {
        dec.process(num, den - num, den);
      }
      predictor.enter_escape_mode();
    }
    let cum = dec.fetch(predictor.denominator());
    let sym = predictor.icdf(cum);
    dec.process(predictor.cdf(sym), predictor.pdf(sym), predictor.denominator());
    out.push(sym);
    predictor.update_predictor(sym);
    predictor.leave_escape_mode();
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use quickcheck_macros::quickcheck;
  use rand::rngs::StdRng;
  use rand::{Rng, SeedableRng};

  const METHODS: [Method; 4] = [Method::A, Method::B, Method::C, Method::D];

  #[quickcheck]
  fn qc_order1_method_b_roundtrip(data: Vec<u8>) -> bool {
    let (encoded, alphabet, len) = encode_auto(&data, 1, Method::B);
    if alphabet.is_empty() {
      return len == 0;
    }
    decode(&encoded, &alphabet, len, 1, Method::B) == data
  }

  fn roundtrip<T: Ord + Hash + Copy + std::fmt::Debug>(data: &[T], depth: usize, method: Method) {
    let (encoded, alphabet, len) = encode_auto(data, depth, method);
    if alphabet.is_empty() {
      assert_eq!(len, 0);
      return;
    }
    let decoded = decode(&encoded, &alphabet, len, depth, method);
    assert_eq!(decoded, data, "depth {} method {:?}", depth, method);
  }

  #[test]
  fn roundtrip_all_methods_and_depths() {
    let mut rng = StdRng::seed_from_u64(5);
    let data: Vec<u8> = (0..3000).map(|_| rng.gen_range(0..30)).collect();
    for &method in METHODS.iter() {
      for depth in 0..=3 {
        roundtrip(&data, depth, method);
      }
    }
  }

  #[test]
  fn roundtrip_degenerate_inputs() {
    for &method in METHODS.iter() {
      for depth in 0..=2 {
        roundtrip::<u8>(&[], depth, method);
        roundtrip(&[7u8], depth, method);
        roundtrip(&[7u8, 7, 7, 7, 7, 7], depth, method);
        roundtrip(&[0u8, 1, 0, 1, 0, 1, 0, 1], depth, method);
      }
    }
  }

  #[test]
  fn roundtrip_text_like() {
    let text = b"the quick brown fox jumps over the lazy dog, \
                 the quick brown fox jumps over the lazy dog again";
    for &method in METHODS.iter() {
      roundtrip(&text[..], 2, method);
    }
  }

  #[test]
  fn cdf_icdf_inverse_law() {
    // Feed a predictor some history, then check ICDF(CDF(s)) == s for every
    // symbol with positive mass, at every escape stage that admits symbols.
    let history = [3u8, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5, 1, 4, 1];
    for &method in METHODS.iter() {
      let alphabet: BTreeSet<u8> = (0..10).collect();
      let mut p = Predictor::new(alphabet.clone(), 1, method);
      for &sym in history.iter() {
        while p.has_to_escape(sym) {
          p.enter_escape_mode();
        }
        p.update_predictor(sym);
        p.leave_escape_mode();
      }
      loop {
        let (order, stage) = p.resolve();
        for &sym in alphabet.iter() {
          // Only symbols carried by the current stage obey the inverse law:
          // regular counts at Normal, the once-set at Once, unseen at Novel.
          let supported = match stage {
            Stage::Normal => p.pdf(sym) > 0,
            Stage::Once => !p.has_to_escape(sym),
            Stage::Novel => p.stats(0).map_or(true, |st| !st.freq.contains_key(&sym)),
          };
          if supported {
            assert_eq!(p.icdf(p.cdf(sym)), sym, "method {:?}", method);
          }
        }
        if order == 0 && stage == Stage::Novel {
          break;
        }
        p.enter_escape_mode();
      }
      p.leave_escape_mode();
    }
  }

  #[test]
  fn escape_chain_terminates() {
    // Numerator never exceeds denominator, and the chain always reaches a
    // stage that does not request another escape.
    for &method in METHODS.iter() {
      let alphabet: BTreeSet<u8> = (0..4).collect();
      let mut p = Predictor::new(alphabet, 3, method);
      for &sym in [0u8, 1, 2, 0, 1, 3, 3, 2].iter() {
        let mut steps = 0;
        while p.has_to_escape(sym) {
          assert!(p.numerator() <= p.denominator());
          p.enter_escape_mode();
          steps += 1;
          assert!(steps <= 2 * 3 + 2, "escape chain did not terminate");
        }
        assert!(p.numerator() <= p.denominator());
        p.update_predictor(sym);
        p.leave_escape_mode();
      }
    }
  }

  #[test]
  fn biased_source_compresses() {
    // 100k symbols, 90% zeros: Method C order 2 must land strictly below
    // the 12,500 bytes a flat bit-packing would take.
    let mut rng = StdRng::seed_from_u64(42);
    let data: Vec<u8> = (0..100_000)
      .map(|_| if rng.gen_range(0..10) < 9 { 0u8 } else { 1u8 })
      .collect();
    let alphabet: BTreeSet<u8> = [0u8, 1].iter().copied().collect();
    let encoded = encode(&data, &alphabet, 2, Method::C);
    assert!(
      encoded.len() < 100_000 / 8,
      "compressed to {} bytes",
      encoded.len()
    );
    let decoded = decode(&encoded, &alphabet, data.len(), 2, Method::C);
    assert_eq!(decoded, data);
  }

  #[test]
  fn long_stream_carry_stress() {
    let mut rng = StdRng::seed_from_u64(123);
    let data: Vec<u8> = (0..110_000).map(|_| rng.gen_range(0..4)).collect();
    let alphabet: BTreeSet<u8> = (0..4).collect();
    let encoded = encode(&data, &alphabet, 1, Method::A);
    let decoded = decode(&encoded, &alphabet, data.len(), 1, Method::A);
    assert_eq!(decoded, data);
  }
}
