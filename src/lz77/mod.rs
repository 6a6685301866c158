/*! Sliding-window LZ factorization: a suffix-tree match finder feeding a
minimum-cost parser.

The match finder reports, for every position of the input, the longest
earlier occurrence whose start lies inside the window. The parser then picks
a minimum-cost partition of the input into literal and match tokens under a
pluggable cost model, and `parse::expand` plays a token stream back into the
original sequence.
*/

pub mod parse;
pub mod suffix_tree;

use std::hash::Hash;

pub use parse::{expand, parse, CostModel, TokenCount};
pub use suffix_tree::SuffixTree;

/// Longest match found for one input position. A length of zero means no
/// usable match; `source` is then meaningless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchRecord {
  pub length: usize,
  pub source: usize,
}

/// One parsed token: a literal symbol, or a copy of `length` symbols
/// starting `distance` positions back in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<T> {
  Literal(T),
  Match { length: usize, distance: usize },
}

/// Length and window bounds for a factorization. The defaults are the
/// DEFLATE limits from RFC 1951.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRules {
  pub min_length: usize,
  pub max_length: usize,
  pub window_width: usize,
}

impl Default for MatchRules {
  fn default() -> Self {
    Self {
      min_length: 3,
      max_length: 258,
      window_width: 32768,
    }
  }
}

/// Build the per-position table of longest in-window matches.
pub fn build_matches<T: Copy + Eq + Hash>(data: &[T], window_width: usize) -> Vec<MatchRecord> {
  SuffixTree::build(data, window_width).into_matches()
}

/// Factorize `data` into tokens under the token-count cost model.
pub fn compress_tokens<T: Copy + Eq + Hash>(data: &[T], rules: &MatchRules) -> Vec<Token<T>> {
  let matches = build_matches(data, rules.window_width);
  parse(
    data,
    &matches,
    rules.min_length,
    rules.max_length,
    rules.window_width,
    &TokenCount,
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use quickcheck_macros::quickcheck;

  #[quickcheck]
  fn qc_tokens_roundtrip(data: Vec<u8>) -> bool {
    let tokens = compress_tokens(&data, &MatchRules::default());
    expand(&tokens) == data
  }

  #[quickcheck]
  fn qc_tight_window_roundtrip(data: Vec<u8>) -> bool {
    let rules = MatchRules {
      min_length: 2,
      max_length: 16,
      window_width: 8,
    };
    let tokens = compress_tokens(&data, &rules);
    expand(&tokens) == data
  }

  #[test]
  fn tokenize_and_expand_roundtrip() {
    let data: Vec<u8> = b"abcabcabcabcxyzxyzxyzabc".to_vec();
    let tokens = compress_tokens(&data, &MatchRules::default());
    assert_eq!(expand(&tokens), data);
  }

  #[test]
  fn periodic_input_prefers_match() {
    // Window 8, minimum match 2: the matcher must see the length-6 overlap
    // at position 2 and the parser must take it over six literals.
    let data = [1u8, 2, 1, 2, 1, 2, 1, 2, 3];
    let matches = build_matches(&data, 8);
    assert!(matches[2].length >= 6, "match table: {:?}", matches);
    assert_eq!(matches[2].source, 0);

    let rules = MatchRules {
      min_length: 2,
      max_length: 258,
      window_width: 8,
    };
    let tokens = compress_tokens(&data, &rules);
    assert!(
      tokens.len() < 9,
      "parser kept all literals: {:?}",
      tokens
    );
    assert!(tokens
      .iter()
      .any(|t| matches!(t, Token::Match { length, .. } if *length >= 6)));
    assert_eq!(expand(&tokens), data);
  }

  #[test]
  fn empty_input_degenerates() {
    let data: [u8; 0] = [];
    assert!(build_matches(&data, 1024).is_empty());
    let tokens = compress_tokens(&data, &MatchRules::default());
    assert!(tokens.is_empty());
    assert_eq!(expand(&tokens), data);
  }
}
