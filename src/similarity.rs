//! Vector math for cosine similarity.
//!
//! Embeddings are stored as loaded (not normalized), so cosine similarity is
//! the dot product divided by both L2 norms. Norms are computed once per row
//! when the store is built.

use wide::f32x8;

/// Compute the L2 norm of a vector.
#[inline]
#[must_use]
pub fn l2_norm(vec: &[f32]) -> f32 {
    dot_product_simd(vec, vec).sqrt()
}

/// Compute the dot product of two vectors (scalar reference implementation).
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute the dot product using SIMD (8 floats per iteration).
///
/// Falls back to scalar for remainder elements. The lane-wise products are
/// commutative, so `dot_product_simd(a, b)` and `dot_product_simd(b, a)` are
/// bit-identical.
#[inline]
#[must_use]
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same dimension");

    let chunks_a = a.chunks_exact(8);
    let chunks_b = b.chunks_exact(8);
    let remainder_a = chunks_a.remainder();
    let remainder_b = chunks_b.remainder();

    let mut sum = f32x8::ZERO;
    for (ca, cb) in chunks_a.zip(chunks_b) {
        // chunks_exact always yields 8 elements
        let arr_a: [f32; 8] = ca.try_into().unwrap_or([0.0; 8]);
        let arr_b: [f32; 8] = cb.try_into().unwrap_or([0.0; 8]);
        sum += f32x8::from(arr_a) * f32x8::from(arr_b);
    }

    let mut scalar_sum: f32 = sum.reduce_add();
    for (a, b) in remainder_a.iter().zip(remainder_b) {
        scalar_sum += a * b;
    }
    scalar_sum
}

/// Cosine similarity given precomputed norms.
///
/// A vector with norm exactly 0.0 has similarity 0.0 to everything, itself
/// included. So does a pair whose norm product underflows to 0.0. Any other
/// vector, however short, is compared by direction. The result is clamped to
/// `[-1.0, 1.0]` to absorb rounding.
#[inline]
#[must_use]
pub fn cosine_with_norms(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    let denominator = norm_a * norm_b;
    if denominator <= 0.0 {
        return 0.0;
    }
    (dot_product_simd(a, b) / denominator).clamp(-1.0, 1.0)
}

/// Cosine similarity of two vectors.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, l2_norm(a), b, l2_norm(b))
}
