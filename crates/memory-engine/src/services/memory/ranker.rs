//! Relevance ranking of candidate memories against a query embedding.

pub use crate::utils::similarity::cosine_similarity as cosine;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MIN_SCORE: f32 = 0.7;

/// A candidate with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub item: T,
    pub score: f32,
}

/// Score each candidate against `query` by cosine similarity.
/// Candidates and embeddings are paired positionally.
pub fn score_candidates<T>(
    query: &[f32],
    candidates: Vec<T>,
    embeddings: &[Vec<f32>],
) -> Vec<Scored<T>> {
    candidates
        .into_iter()
        .zip(embeddings)
        .map(|(item, embedding)| Scored {
            item,
            score: cosine(query, embedding),
        })
        .collect()
}

/// Best `k` candidates scoring strictly above `min_score`, highest first.
/// The sort is stable: tied scores keep their input order.
pub fn select_top<T>(mut candidates: Vec<Scored<T>>, k: usize, min_score: f32) -> Vec<Scored<T>> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
        .into_iter()
        .filter(|c| c.score > min_score)
        .take(k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(pairs: &[(&'static str, f32)]) -> Vec<Scored<&'static str>> {
        pairs
            .iter()
            .map(|&(item, score)| Scored { item, score })
            .collect()
    }

    #[test]
    fn test_ties_keep_input_order() {
        let candidates = scored(&[("a", 0.8), ("b", 0.9), ("c", 0.8), ("d", 0.9), ("e", 0.8)]);
        let top = select_top(candidates, 10, 0.0);
        let order: Vec<&str> = top.iter().map(|s| s.item).collect();
        assert_eq!(order, vec!["b", "d", "a", "c", "e"]);
    }

    #[test]
    fn test_cap_and_threshold() {
        let candidates = scored(&[("a", 0.95), ("b", 0.7), ("c", 0.71), ("d", 0.99), ("e", 0.85), ("f", 0.1)]);
        let top = select_top(candidates, DEFAULT_TOP_K, DEFAULT_MIN_SCORE);

        assert!(top.len() <= DEFAULT_TOP_K);
        assert!(top.iter().all(|s| s.score > DEFAULT_MIN_SCORE));
        let order: Vec<&str> = top.iter().map(|s| s.item).collect();
        assert_eq!(order, vec!["d", "a", "e"]);
    }

    #[test]
    fn test_score_equal_to_threshold_is_dropped() {
        let top = select_top(scored(&[("edge", 0.7)]), 3, 0.7);
        assert!(top.is_empty());
    }

    #[test]
    fn test_exact_match_scores_one() {
        let query = vec![0.3, -0.2, 0.9];
        let results = score_candidates(&query, vec!["same", "zero"], &[query.clone(), vec![0.0; 3]]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].score, 0.0);

        let top = select_top(results, DEFAULT_TOP_K, DEFAULT_MIN_SCORE);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].item, "same");
    }
}
