//! Vector math for the in-process semantic index: cosine similarity,
//! top-k search and a feature-hashing embedder.

use hearth_core::MemoryItem;

/// Cosine similarity of two vectors, accumulated in `f64`.
///
/// Mismatched lengths, empty input or a zero vector give 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, sq_a, sq_b) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |acc, (&x, &y)| {
        let (x, y) = (f64::from(x), f64::from(y));
        (acc.0 + x * y, acc.1 + x * x, acc.2 + y * y)
    });

    let magnitude = (sq_a * sq_b).sqrt();
    if magnitude < 1e-10 {
        0.0
    } else {
        (dot / magnitude) as f32
    }
}

/// Rank stored points by cosine similarity to a query vector.
///
/// Returns items sorted by descending similarity (ties by id), with
/// `relevance_score` set to the similarity. Points below `min_score` are
/// dropped.
pub fn vector_search<'a, I>(
    points: I,
    query: &[f32],
    limit: usize,
    min_score: f32,
) -> Vec<MemoryItem>
where
    I: IntoIterator<Item = (&'a [f32], &'a MemoryItem)>,
{
    let mut scored: Vec<(f32, &MemoryItem)> = points
        .into_iter()
        .filter_map(|(vector, item)| {
            let sim = cosine_similarity(vector, query);
            (sim >= min_score).then_some((sim, item))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
    scored.truncate(limit);
    scored
        .into_iter()
        .map(|(sim, item)| item.clone().with_score(sim))
        .collect()
}

/// Deterministic bag-of-words embedding via feature hashing.
///
/// Lowercased alphanumeric tokens are hashed (FNV-1a) into `dimension`
/// buckets and the vector is L2-normalized. Texts sharing words get
/// positive cosine similarity; empty text yields the zero vector.
pub fn hash_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];
    if dimension == 0 {
        return vector;
    }
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let bucket = (fnv1a(&token.to_lowercase()) % dimension as u64) as usize;
        vector[bucket] += 1.0;
    }
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::MemoryType;

    fn item(id: &str) -> MemoryItem {
        MemoryItem::new("u1", "c1", MemoryType::Context, format!("Content for {id}")).with_id(id)
    }

    #[test]
    fn cosine_handles_degenerate_input() {
        let v = [0.3, -1.2, 4.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[2.0, 0.0], &[0.0, 5.0])).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        for (a, b) in [
            (&[][..], &[][..]),
            (&[1.0, 2.0][..], &[1.0, 2.0, 3.0][..]),
            (&[0.0, 0.0][..], &[1.0, 2.0][..]),
        ] {
            assert_eq!(cosine_similarity(a, b), 0.0);
        }
    }

    #[test]
    fn vector_search_ranks_by_similarity() {
        let (a, b, c) = (item("a"), item("b"), item("c"));
        let va = vec![0.0, 1.0, 0.0];
        let vb = vec![1.0, 0.0, 0.0];
        let vc = vec![0.5, 0.5, 0.0];
        let points = vec![(va.as_slice(), &a), (vb.as_slice(), &b), (vc.as_slice(), &c)];

        let results = vector_search(points, &[1.0, 0.0, 0.0], 10, 0.0);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!((results[0].relevance_score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vector_search_respects_min_score_and_limit() {
        let items: Vec<_> = (0..10).map(|i| item(&format!("e{i}"))).collect();
        let vectors: Vec<Vec<f32>> = (0..10).map(|i| vec![1.0, i as f32 * 0.1]).collect();
        let points = vectors.iter().map(Vec::as_slice).zip(items.iter());
        assert_eq!(vector_search(points, &[1.0, 0.0], 3, 0.0).len(), 3);

        let (a, b) = (item("a"), item("b"));
        let (va, vb) = (vec![1.0, 0.0], vec![0.0, 1.0]);
        let points = vec![(va.as_slice(), &a), (vb.as_slice(), &b)];
        let results = vector_search(points, &[1.0, 0.0], 10, 0.5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
    }

    #[test]
    fn hash_embedding_is_deterministic_and_normalized() {
        let a = hash_embedding("Homework help for math", 64);
        let b = hash_embedding("homework HELP for math", 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hash_embedding_shared_words_are_similar() {
        let q = hash_embedding("math homework", 256);
        let near = hash_embedding("Sofia needs help with math homework", 256);
        let far = hash_embedding("grocery list for saturday", 256);
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn hash_embedding_of_empty_text_is_zero() {
        assert!(hash_embedding("", 8).iter().all(|v| *v == 0.0));
    }
}
