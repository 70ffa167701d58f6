//! Vector similarity utilities.

use boundless_core::memory::EmbeddingRecord;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical direction, 0 = orthogonal.
/// Returns 0.0 if the vectors differ in length or either has zero
/// magnitude — mismatched lengths should not occur when a single embedding
/// model is used consistently.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank embedding records by cosine similarity to a query vector.
///
/// Records whose `message_id` appears in `exclude` are skipped. Results
/// are sorted by descending similarity and truncated to `top_k`.
pub fn rank_records(
    records: &[EmbeddingRecord],
    query: &[f32],
    top_k: usize,
    exclude: &[String],
) -> Vec<(f32, EmbeddingRecord)> {
    let mut scored: Vec<(f32, EmbeddingRecord)> = records
        .iter()
        .filter(|r| !exclude.iter().any(|id| id == &r.message_id))
        .map(|r| (cosine_similarity(&r.vector, query), r.clone()))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
}
