/*! Online suffix tree (Ukkonen's construction) used as the match finder.

Nodes live in an arena and refer to each other by index: owning parent-to-
child edges sit in a per-node transition map, while suffix links and parent
back-references are plain indices that never imply ownership. Edges do not
copy text; they hold 1-based [k, p] ranges into the shared input, with leaf
edges open-ended to a large sentinel. Because ranges alias the input,
attaching a new child can retroactively redefine where an ancestor's own
range sits, which `update_range_to_root` repairs.

Construction maintains the canonical reference pair (explicit node, range
start) for the active point. Each round applies `test_and_split` until the
active point becomes an end-point, creating leaf edges and suffix links on
the way, then `canonize` re-establishes the canonical pair. The auxiliary
state below the root (reached by the root's suffix link) is represented as
`None`; it admits every symbol and consumes exactly one of them.

Whenever a leaf is about to be created, the node it hangs off describes the
longest earlier occurrence of the suffix being inserted, and that match is
recorded. If the occurrence starts too far back for the window, parent links
are walked until one qualifies; the first qualifying ancestor wins.
*/

use std::collections::HashMap;
use std::hash::Hash;

use super::MatchRecord;

/// Open-ended edge bound for leaves. Half the address space so the range
/// arithmetic in `canonize` cannot wrap for real edges.
const INFTY: usize = usize::MAX / 2;

const ROOT: usize = 0;

/// Transition label: a real input symbol, or the virtual end marker read
/// past the last position. All end markers collide to one map key, but for
/// the extension test below an end marker matches nothing, itself included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EdgeLabel<T> {
  Sym(T),
  End,
}

fn labels_extend<T: Eq>(a: EdgeLabel<T>, b: EdgeLabel<T>) -> bool {
  match (a, b) {
    (EdgeLabel::Sym(x), EdgeLabel::Sym(y)) => x == y,
    _ => false,
  }
}

struct Node<T> {
  /// 1-based edge range [k, p] into the input.
  k: usize,
  p: usize,
  /// Symbols from the root to the top of this node's edge.
  depth: usize,
  /// Suffix link; `None` is the auxiliary state (only ever set on the root).
  link: Option<usize>,
  parent: Option<usize>,
  children: HashMap<EdgeLabel<T>, usize>,
}

pub struct SuffixTree {
  matched: Vec<MatchRecord>,
}

/// Number of symbols on the edge [k, p]. Wrapping, because the root carries
/// the empty range [1, 0].
fn span(k: usize, p: usize) -> usize {
  p.wrapping_sub(k).wrapping_add(1)
}

struct Builder<'a, T> {
  data: &'a [T],
  nodes: Vec<Node<T>>,
  matched: Vec<MatchRecord>,
  window: usize,
}

impl<'a, T: Copy + Eq + Hash> Builder<'a, T> {
  fn new_node(&mut self) -> usize {
    self.nodes.push(Node {
      k: 1,
      p: 0,
      depth: 0,
      link: None,
      parent: None,
      children: HashMap::new(),
    });
    self.nodes.len() - 1
  }

  /// The i-th input symbol, 1-based; past the end it is the end marker.
  fn label(&self, i: usize) -> EdgeLabel<T> {
    if i >= 1 && i <= self.data.len() {
      EdgeLabel::Sym(self.data[i - 1])
    } else {
      EdgeLabel::End
    }
  }

  /// Re-derive ancestor ranges after `s` gained a child whose edge starts
  /// at `k`: each ancestor's range is slid so that it ends where its
  /// child's begins.
  fn update_range_to_root(&mut self, mut s: usize, mut k: usize) {
    loop {
      let node = &mut self.nodes[s];
      node.k = k - span(node.k, node.p);
      node.p = k - 1;
      k = node.k;
      match node.parent {
        Some(parent) => s = parent,
        None => break,
      }
    }
  }

  /// Attach `r` below `s` with edge range [k, p].
  fn connect(&mut self, s: usize, k: usize, p: usize, r: usize) {
    let t_k = self.label(k);
    self.nodes[s].children.insert(t_k, r);
    let s_depth = self.nodes[s].depth;
    let s_span = span(self.nodes[s].k, self.nodes[s].p);
    {
      let node = &mut self.nodes[r];
      node.k = k;
      node.p = p;
      node.depth = s_depth + s_span;
      node.parent = Some(s);
    }
    if self.nodes[s].p != k.wrapping_sub(1) {
      self.update_range_to_root(s, k);
    }
  }

  fn has_transition(&self, state: Option<usize>, label: &EdgeLabel<T>) -> bool {
    match state {
      // The auxiliary state admits every symbol of the alphabet.
      None => true,
      Some(s) => self.nodes[s].children.contains_key(label),
    }
  }

  /// The t_k-transition from `s`: the child and its edge range.
  fn find_transition(&self, s: usize, k: usize) -> (usize, usize, usize) {
    let t_k = self.label(k);
    match self.nodes[s].children.get(&t_k) {
      Some(&child) => (child, self.nodes[child].k, self.nodes[child].p),
      None => unreachable!("canonical reference pair names a missing transition"),
    }
  }

  /// Record the longest-match information carried by `s` while inserting
  /// the suffix whose next position is `i` (1-based). Walks parents until
  /// the recorded occurrence starts within the window of the match start.
  fn update_matched(&mut self, mut s: usize, i: usize) {
    let mut node = &self.nodes[s];
    let mut matched_length = node.depth + span(node.k, node.p);
    let mut matched_from = i - matched_length - 1;
    let mut matched_to = node.k - node.depth - 1;
    while matched_to.saturating_add(self.window) < matched_from {
      s = match self.nodes[s].parent {
        Some(parent) => parent,
        None => return,
      };
      node = &self.nodes[s];
      matched_length = node.depth + span(node.k, node.p);
      matched_from = i - matched_length - 1;
      matched_to = node.k - node.depth - 1;
    }
    if matched_from >= self.matched.len() {
      return;
    }
    if self.matched[matched_from].length < matched_length {
      self.matched[matched_from].length = matched_length;
      self.matched[matched_from].source = matched_to;
    }
  }

  /// Does the state (s, k..p) already admit `t`? If not and the point sits
  /// inside an edge, split the edge with a fresh explicit node.
  fn test_and_split(
    &mut self,
    s: Option<usize>,
    k: usize,
    p: usize,
    t: EdgeLabel<T>,
  ) -> (bool, Option<usize>) {
    if k <= p {
      let s = match s {
        Some(s) => s,
        None => unreachable!("implicit point below the auxiliary state"),
      };
      let (s_prime, k_prime, p_prime) = self.find_transition(s, k);
      if labels_extend(t, self.label(k_prime + p - k + 1)) {
        (true, Some(s))
      } else {
        let r = self.new_node();
        self.connect(s, k_prime, k_prime + p - k, r);
        self.connect(r, k_prime + p - k + 1, p_prime, s_prime);
        (false, Some(r))
      }
    } else if !self.has_transition(s, &t) {
      (false, s)
    } else {
      (true, s)
    }
  }

  /// Walk edges until (s, k) is the closest explicit ancestor of the point
  /// ending at p, i.e. the canonical reference pair.
  fn canonize(&self, mut s: Option<usize>, mut k: usize, p: usize) -> (Option<usize>, usize) {
    if p < k {
      return (s, k);
    }
    // The auxiliary state's edge to the root consumes exactly one symbol,
    // modelled as a [MAX, MAX] pseudo-range so the wrapping compare below
    // reduces to k <= p.
    let (mut s_prime, mut k_prime, mut p_prime) = match s {
      None => (ROOT, usize::MAX, usize::MAX),
      Some(id) => self.find_transition(id, k),
    };
    while p_prime.wrapping_add(k) <= p.wrapping_add(k_prime) {
      k = k.wrapping_add(p_prime.wrapping_sub(k_prime)).wrapping_add(1);
      s = Some(s_prime);
      if k <= p {
        let next = self.find_transition(s_prime, k);
        s_prime = next.0;
        k_prime = next.1;
        p_prime = next.2;
      }
    }
    (s, k)
  }

  /// One Ukkonen round: extend the tree with t_i from the active point,
  /// creating leaves and suffix links until the end-point is reached.
  fn update(&mut self, mut s: Option<usize>, mut k: usize, i: usize) -> (Option<usize>, usize) {
    let mut old_r = ROOT;
    let t_i = self.label(i);
    let (mut end_point, mut r) = self.test_and_split(s, k, i - 1, t_i);
    while !end_point {
      let r_id = match r {
        Some(id) => id,
        None => unreachable!("non-end-point at the auxiliary state"),
      };
      self.update_matched(r_id, i);
      let leaf = self.new_node();
      self.connect(r_id, i, INFTY, leaf);
      if old_r != ROOT {
        self.nodes[old_r].link = Some(r_id);
      }
      old_r = r_id;
      let s_id = match s {
        Some(id) => id,
        None => unreachable!("active state lost below the auxiliary state"),
      };
      let canonical = self.canonize(self.nodes[s_id].link, k, i - 1);
      s = canonical.0;
      k = canonical.1;
      let step = self.test_and_split(s, k, i - 1, t_i);
      end_point = step.0;
      r = step.1;
    }
    if old_r != ROOT {
      self.nodes[old_r].link = s;
    }
    (s, k)
  }
}

impl SuffixTree {
  /// Build the tree over `data` one symbol at a time (plus the virtual end
  /// marker), recording longest in-window matches as leaves appear.
  pub fn build<T: Copy + Eq + Hash>(data: &[T], window_width: usize) -> Self {
    let mut builder = Builder {
      data,
      nodes: Vec::new(),
      matched: vec![MatchRecord::default(); data.len()],
      window: window_width,
    };
    let root = builder.new_node();
    debug_assert_eq!(root, ROOT);

    let mut s = Some(ROOT);
    let mut k = 1usize;
    for i in 1..=data.len() + 1 {
      let updated = builder.update(s, k, i);
      let canonical = builder.canonize(updated.0, updated.1, i);
      s = canonical.0;
      k = canonical.1;
    }
    log::debug!(
      "suffix tree over {} symbols: {} explicit nodes",
      data.len(),
      builder.nodes.len()
    );
    SuffixTree {
      matched: builder.matched,
    }
  }

  pub fn matches(&self) -> &[MatchRecord] {
    &self.matched
  }

  pub fn into_matches(self) -> Vec<MatchRecord> {
    self.matched
  }
}
