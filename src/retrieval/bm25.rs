//! BM25 lexical scoring over a candidate set
//!
//! ```text
//! score(d, q) = Σ_{t ∈ q} idf(t) · tf·(k1+1) / (tf + k1·(1 − b + b·|d|/avgdl))
//! idf(t)      = ln((N − df + 0.5)/(df + 0.5) + 1)
//! ```
//!
//! Statistics (N, df, avgdl) are computed over the candidate set, not a
//! global index. idf is strictly positive, so any candidate containing at
//! least one query term scores above zero.

use std::collections::{HashMap, HashSet};

use crate::retrieval::types::RetrievedDocument;

/// Term-frequency saturation
pub const DEFAULT_K1: f64 = 1.5;
/// Length normalisation
pub const DEFAULT_B: f64 = 0.75;
/// Tokens shorter than this (in characters) are dropped
pub const MIN_TOKEN_CHARS: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "his", "how", "its", "may", "who", "did", "does", "this", "that",
    "these", "those", "with", "from", "into", "what", "when", "where", "which", "while", "why",
    "will", "would", "there", "their", "them", "then", "than", "they", "have", "been", "were",
    "being", "about", "over", "such", "also", "only", "some", "other", "more", "most", "very",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Lowercase, split on whitespace, drop short tokens and stopwords
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() >= MIN_TOKEN_CHARS && !is_stopword(token))
        .map(str::to_string)
        .collect()
}

/// BM25 scorer parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Scorer {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }
}

impl Bm25Scorer {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }

    /// Inverse document frequency over a candidate set of size `n`
    pub fn idf(n: usize, df: usize) -> f64 {
        let n = n as f64;
        let df = df as f64;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Score every candidate against the query; each query term counts once
    pub fn score_all(&self, query_terms: &[String], candidates: &[RetrievedDocument]) -> Vec<f64> {
        let terms: Vec<&str> = {
            let mut seen = HashSet::new();
            query_terms
                .iter()
                .map(String::as_str)
                .filter(|term| seen.insert(*term))
                .collect()
        };

        let doc_terms: Vec<HashMap<String, usize>> = candidates
            .iter()
            .map(|doc| term_frequencies(&doc.content))
            .collect();
        let doc_lengths: Vec<usize> = doc_terms.iter().map(|tf| tf.values().sum()).collect();

        let n = candidates.len();
        let avg_len = if n == 0 {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f64 / n as f64
        };

        let idf: HashMap<&str, f64> = terms
            .iter()
            .map(|term| {
                let df = doc_terms.iter().filter(|tf| tf.contains_key(*term)).count();
                (*term, Self::idf(n, df))
            })
            .collect();

        doc_terms
            .iter()
            .zip(&doc_lengths)
            .map(|(tf_map, &len)| {
                let length_ratio = if avg_len > 0.0 { len as f64 / avg_len } else { 0.0 };
                let norm = self.k1 * (1.0 - self.b + self.b * length_ratio);

                terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *tf_map.get(*term)? as f64;
                        Some(idf[term] * (tf * (self.k1 + 1.0)) / (tf + norm))
                    })
                    .sum()
            })
            .collect()
    }

    /// Score, drop zero scores, sort descending, truncate to `top_k`
    pub fn rank(
        &self,
        query_terms: &[String],
        candidates: Vec<RetrievedDocument>,
        top_k: usize,
    ) -> Vec<RetrievedDocument> {
        let scores = self.score_all(query_terms, &candidates);

        let mut ranked: Vec<RetrievedDocument> = candidates
            .into_iter()
            .zip(scores)
            .filter(|(_, score)| *score > 0.0)
            .map(|(mut doc, score)| {
                doc.score = score as f32;
                doc
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(top_k);
        ranked
    }
}

fn term_frequencies(text: &str) -> HashMap<String, usize> {
    let mut frequencies = HashMap::new();
    for token in tokenize(text) {
        *frequencies.entry(token).or_insert(0) += 1;
    }
    frequencies
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn doc(id: &str, content: &str) -> RetrievedDocument {
        RetrievedDocument::new(id, content)
    }

    #[test]
    fn test_tokenize_drops_short_tokens_and_stopwords() {
        assert_eq!(
            tokenize("The Rust borrow checker is in THE compiler"),
            vec!["rust", "borrow", "checker", "compiler"]
        );
        assert!(tokenize("a an is of to").is_empty());
    }

    #[test]
    fn test_idf_is_positive() {
        assert!(Bm25Scorer::idf(10, 10) > 0.0);
        assert!(Bm25Scorer::idf(10, 1) > Bm25Scorer::idf(10, 5));
    }

    #[test]
    fn test_rank_orders_by_relevance() {
        let scorer = Bm25Scorer::default();
        let docs = vec![
            doc("1", "ownership rules"),
            doc("2", "borrow checker enforces ownership and borrow rules"),
            doc("3", "garbage collection"),
        ];
        let ranked = scorer.rank(&tokenize("borrow ownership"), docs, 10);

        let ids: Vec<_> = ranked.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert!(ranked.iter().all(|d| d.score > 0.0));
    }

    #[test]
    fn test_rank_truncates() {
        let scorer = Bm25Scorer::default();
        let docs = (0..5).map(|i| doc(&i.to_string(), "tokio runtime")).collect();
        assert_eq!(scorer.rank(&tokenize("tokio"), docs, 2).len(), 2);
    }

    #[test]
    fn test_known_score() {
        // Single doc, single term occurring once: idf = ln(0.5/1.5 + 1) = ln(4/3),
        // |d| = avgdl so the term weight is (k1+1)/(1+k1) = 1.
        let scorer = Bm25Scorer::default();
        let scores = scorer.score_all(&tokenize("tokio"), &[doc("1", "tokio runtime")]);
        assert!((scores[0] - (4.0f64 / 3.0).ln()).abs() < 1e-9);
    }

    #[quickcheck]
    fn prop_score_positive_iff_term_present(words: Vec<u8>, query_word: u8, include: bool) -> bool {
        let vocab = |w: u8| format!("term{}", w % 16);
        let mut content: Vec<String> = words
            .iter()
            .map(|w| vocab(*w))
            .filter(|w| *w != vocab(query_word))
            .collect();
        if include {
            content.push(vocab(query_word));
        }

        let candidates = vec![doc("d", &content.join(" ")), doc("other", "unrelated filler text")];
        let scores = Bm25Scorer::default().score_all(&[vocab(query_word)], &candidates);

        if include {
            scores[0] > 0.0
        } else {
            scores[0] == 0.0
        }
    }
}
