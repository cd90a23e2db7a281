//! BM25 narrowing for dropdown questions.
//!
//! Dropdowns can carry thousands of options; sending them all wastes
//! prompt tokens. The question text (plus any scenario-derived query)
//! scores each option label and only the top `k` survive into the prompt.

use std::collections::HashMap;

const K1: f64 = 1.2;
const B: f64 = 0.75;

/// Indices of the `k` best-scoring options for the query, best first.
/// Falls back to the head of the list when nothing scores above zero, so
/// the prompt never ends up empty.
pub fn narrow_options(options: &[String], query: &str, k: usize) -> Vec<usize> {
    if options.len() <= k {
        return (0..options.len()).collect();
    }

    let documents: Vec<Vec<String>> = options.iter().map(|option| tokenize(option)).collect();
    let average_length = documents.iter().map(Vec::len).sum::<usize>() as f64 / documents.len() as f64;

    // Document frequency per term.
    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for document in &documents {
        let mut seen: Vec<&str> = Vec::new();
        for term in document {
            if !seen.contains(&term.as_str()) {
                seen.push(term);
                *document_frequency.entry(term).or_default() += 1;
            }
        }
    }

    let total = documents.len() as f64;
    let query_terms = tokenize(query);

    let mut scored: Vec<(usize, f64)> = documents
        .iter()
        .enumerate()
        .map(|(index, document)| {
            let length = document.len() as f64;
            let mut score = 0.0;

            for term in &query_terms {
                let tf = document.iter().filter(|t| *t == term).count() as f64;
                if tf == 0.0 {
                    continue;
                }

                let df = document_frequency.get(term.as_str()).copied().unwrap_or(0) as f64;
                let idf = ((total - df + 0.5) / (df + 0.5) + 1.0).ln();

                score += idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * length / average_length));
            }

            (index, score)
        })
        .collect();

    // Stable order for equal scores keeps the narrowing deterministic.
    scored.sort_by(|(left_index, left), (right_index, right)| {
        right
            .partial_cmp(left)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(left_index.cmp(right_index))
    });

    if scored.first().is_none_or(|(_, score)| *score <= 0.0) {
        return (0..k).collect();
    }

    scored.into_iter().take(k).map(|(index, _)| index).collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}
