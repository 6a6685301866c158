/*! Minimum-cost segmentation of an input into literal and match tokens.

A single forward dynamic program proposes, at every position, a literal step
and (when the match table allows one) a match step, keeping the cheaper
arrival cost and a predecessor link. Backtracking the links yields the token
boundaries in reverse; inverting them recovers the tokens in input order.
The cost of each step comes from a caller-supplied model, so the same parse
drives both a token-count LZSS factorization and a bit-exact DEFLATE cost.
*/

use super::{MatchRecord, Token};

/// Cost of emitting a token, in whatever unit the caller optimizes.
pub trait CostModel<T> {
  fn literal_cost(&self, sym: T) -> u64;
  fn match_cost(&self, length: usize, distance: usize) -> u64;
}

/// Every token costs one unit: minimizes the token count.
pub struct TokenCount;

impl<T> CostModel<T> for TokenCount {
  fn literal_cost(&self, _sym: T) -> u64 {
    1
  }

  fn match_cost(&self, _length: usize, _distance: usize) -> u64 {
    1
  }
}

/// Choose a minimum-cost tokenization of `data` given its match table.
///
/// Matches shorter than `min_length` are unusable and matches longer than
/// `max_length` are clipped before the program runs; a match that would
/// run past the end of the input is suppressed. Match distances are a
/// matcher contract: zero or beyond the window is a bug, not an input
/// condition.
pub fn parse<T: Copy, C: CostModel<T>>(
  data: &[T],
  matches: &[MatchRecord],
  min_length: usize,
  max_length: usize,
  window_width: usize,
  cost_model: &C,
) -> Vec<Token<T>> {
  let n = data.len();
  assert_eq!(matches.len(), n, "match table length mismatch");

  let mut cost = vec![u64::MAX; n + 1];
  let mut from = vec![0usize; n + 1];
  cost[0] = 0;
  for i in 0..n {
    let via_literal = cost[i] + cost_model.literal_cost(data[i]);
    if via_literal < cost[i + 1] {
      cost[i + 1] = via_literal;
      from[i + 1] = i;
    }

    let mut length = matches[i].length;
    if length < min_length {
      length = 0;
    } else if length > max_length {
      length = max_length;
    }
    if length != 0 && i + length <= n {
      let distance = i - matches[i].source;
      assert!(
        distance >= 1 && distance <= window_width,
        "match distance {} out of window at position {}",
        distance,
        i
      );
      let via_match = cost[i] + cost_model.match_cost(length, distance);
      if via_match < cost[i + length] {
        cost[i + length] = via_match;
        from[i + length] = i;
      }
    }
  }

  // Backtrack the predecessor links, then walk forward over the inverted
  // links to emit tokens in input order.
  let mut to = vec![0usize; n + 1];
  let mut i = n;
  while i > 0 {
    to[from[i]] = i;
    i = from[i];
  }

  let mut tokens = Vec::new();
  let mut i = 0;
  while i < n {
    let next = to[i];
    if next == i + 1 {
      tokens.push(Token::Literal(data[i]));
    } else {
      tokens.push(Token::Match {
        length: next - i,
        distance: i - matches[i].source,
      });
    }
    i = next;
  }
  log::debug!("parsed {} symbols into {} tokens", n, tokens.len());
  tokens
}

/// Play a token stream back into the sequence it encodes. Overlapping
/// copies (length greater than distance) replay already-copied symbols, as
/// the sliding-window semantics require.
pub fn expand<T: Copy>(tokens: &[Token<T>]) -> Vec<T> {
  let mut out = Vec::new();
  for token in tokens {
    match token {
      Token::Literal(sym) => out.push(*sym),
      Token::Match { length, distance } => {
        assert!(
          *distance >= 1 && *distance <= out.len(),
          "match reaches back {} past the {} symbols produced",
          distance,
          out.len()
        );
        let start = out.len() - distance;
        for j in 0..*length {
          let sym = out[start + j];
          out.push(sym);
        }
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::super::{build_matches, MatchRecord};
  use super::*;

  #[test]
  fn literal_only_when_no_matches() {
    let data = [10u8, 20, 30];
    let matches = vec![MatchRecord::default(); 3];
    let tokens = parse(&data, &matches, 3, 258, 32768, &TokenCount);
    assert_eq!(
      tokens,
      vec![
        Token::Literal(10),
        Token::Literal(20),
        Token::Literal(30)
      ]
    );
  }

  #[test]
  fn chooses_match_over_literals() {
    let data = [1u8, 2, 3, 1, 2, 3];
    let matches = build_matches(&data, 64);
    let tokens = parse(&data, &matches, 2, 258, 64, &TokenCount);
    assert_eq!(
      tokens,
      vec![
        Token::Literal(1),
        Token::Literal(2),
        Token::Literal(3),
        Token::Match {
          length: 3,
          distance: 3
        },
      ]
    );
    assert_eq!(expand(&tokens), data);
  }

  #[test]
  fn min_length_suppresses_short_matches() {
    let data = [1u8, 2, 1, 2];
    let matches = build_matches(&data, 64);
    // With a minimum of 3 the length-2 repeat is unusable.
    let tokens = parse(&data, &matches, 3, 258, 64, &TokenCount);
    assert!(tokens.iter().all(|t| matches!(t, Token::Literal(_))));
    assert_eq!(expand(&tokens), data);
  }

  #[test]
  fn max_length_clips_matches() {
    let data = vec![9u8; 50];
    let matches = build_matches(&data, 64);
    let tokens = parse(&data, &matches, 2, 8, 64, &TokenCount);
    for t in tokens.iter() {
      if let Token::Match { length, .. } = t {
        assert!(*length <= 8);
      }
    }
    assert_eq!(expand(&tokens), data);
  }

  #[test]
  fn weighted_costs_steer_the_parse() {
    // A model where matches are exorbitant keeps everything literal.
    struct DearMatches;
    impl CostModel<u8> for DearMatches {
      fn literal_cost(&self, _s: u8) -> u64 {
        1
      }
      fn match_cost(&self, _l: usize, _d: usize) -> u64 {
        1000
      }
    }
    let data = [4u8, 5, 4, 5, 4, 5, 4, 5];
    let matches = build_matches(&data, 64);
    let tokens = parse(&data, &matches, 2, 258, 64, &DearMatches);
    assert!(tokens.iter().all(|t| matches!(t, Token::Literal(_))));
  }

  #[test]
  fn expand_handles_overlap() {
    let tokens = vec![
      Token::Literal(1u8),
      Token::Match {
        length: 5,
        distance: 1,
      },
    ];
    assert_eq!(expand(&tokens), vec![1u8; 6]);
  }
}
