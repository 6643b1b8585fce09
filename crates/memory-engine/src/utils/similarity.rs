/// Calculate cosine similarity between two embedding vectors.
/// Returns value between -1.0 (opposite) and 1.0 (identical).
///
/// Never fails: mismatched or empty vectors and zero-magnitude vectors
/// all score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    // Avoid division by zero
    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (magnitude_a * magnitude_b);

    // Clamp to [-1, 1] to handle floating point errors
    similarity.clamp(-1.0, 1.0)
}

/// Cosine distance as used by pgvector's `<=>` operator.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Round a score to two decimals for presentation.
pub fn round2(score: f32) -> f32 {
    (score * 100.0).round() / 100.0
}
