use crate::models::{DocumentRecord, SearchQuery, SearchResult};
use tracing::debug;

/// Counts non-overlapping occurrences of every term in an already
/// lowercased chunk.
pub fn score_chunk(lowered_chunk: &str, terms: &[String]) -> usize {
    terms
        .iter()
        .map(|term| lowered_chunk.matches(term.as_str()).count())
        .sum()
}

/// Keyword-overlap ranking over every chunk of every document in `corpus`.
///
/// Chunks without any query term are dropped. The sort is stable, so equal
/// scores keep document order and then chunk order.
pub fn search(query: &SearchQuery, corpus: &[DocumentRecord]) -> Vec<SearchResult> {
    let terms = query.terms();
    if terms.is_empty() || query.limit == 0 {
        return Vec::new();
    }

    let mut scored = Vec::new();
    for document in corpus.iter().filter(|document| in_category(document, query)) {
        for chunk in &document.chunks {
            let score = score_chunk(&chunk.to_lowercase(), &terms);
            if score > 0 {
                scored.push((score, document, chunk));
            }
        }
    }

    debug!(
        terms = ?terms,
        documents = corpus.len(),
        matches = scored.len(),
        "scored chunks"
    );

    scored.sort_by(|left, right| right.0.cmp(&left.0));

    scored
        .into_iter()
        .take(query.limit)
        .map(|(score, document, chunk)| SearchResult {
            content: chunk.clone(),
            filename: document.filename.clone(),
            category: document.category.clone(),
            score,
        })
        .collect()
}

fn in_category(document: &DocumentRecord, query: &SearchQuery) -> bool {
    query
        .category
        .as_deref()
        .map_or(true, |category| document.category.eq_ignore_ascii_case(category))
}

/// Filenames of the results, deduplicated, in first-appearance order.
pub fn contributing_sources(results: &[SearchResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for result in results {
        if !sources.contains(&result.filename) {
            sources.push(result.filename.clone());
        }
    }
    sources
}
