/*! Lossless data-compression primitives.

The library is built around three tightly coupled pieces that together form
a complete LZ77-family compressor:

 - [`lz77`]: an online suffix tree (Ukkonen's construction) reporting the
   longest in-window match for every input position, and a minimum-cost
   dynamic-programming parser turning those matches into literal/match
   tokens under a pluggable cost model.
 - [`range`]: a carrying, renormalizing 64-bit range coder with a static
   frequency model and four adaptive escape methods, all of it exact
   integer arithmetic built from 64-bit halves.
 - [`ppm`]: prediction-by-partial-matching predictors (escape Methods A-D,
   arbitrary context order) driving the range coder.

Alongside them, [`huffman`] assigns length-restricted canonical codes and
[`deflate`] serializes tokens as an RFC 1951-shaped bitstream with fixed or
dynamic Huffman blocks.

Every encoder in the crate has a symmetric decoder that reconstructs the
model the same way, which is the only correctness story these formats have:
none of them carries a checksum or any other self-validation at this layer.
*/

pub mod deflate;
pub mod huffman;
pub mod lz77;
pub mod ppm;
pub mod range;
