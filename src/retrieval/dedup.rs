//! Cross-store deduplication and ranking.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::core::RetrievedDocument;

/// Collapses documents with identical content.
///
/// The copy with the higher score wins and takes the position of the first
/// occurrence. A scored copy beats an unscored one.
#[must_use]
pub fn dedup(documents: Vec<RetrievedDocument>) -> Vec<RetrievedDocument> {
    let mut out: Vec<RetrievedDocument> = Vec::with_capacity(documents.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(documents.len());

    for doc in documents {
        if let Some(&i) = index.get(&doc.content) {
            if better(doc.score, out[i].score) {
                out[i] = doc;
            }
        } else {
            index.insert(doc.content.clone(), out.len());
            out.push(doc);
        }
    }
    out
}

fn better(candidate: Option<f32>, current: Option<f32>) -> bool {
    match (candidate, current) {
        (Some(a), Some(b)) => a > b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

fn by_score_desc(a: &RetrievedDocument, b: &RetrievedDocument) -> Ordering {
    match (a.score, b.score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sorts by score descending, unscored last, and keeps the first `top_k`.
///
/// The sort is stable, so ties keep first-seen order.
#[must_use]
pub fn rank_and_cap(mut documents: Vec<RetrievedDocument>, top_k: usize) -> Vec<RetrievedDocument> {
    documents.sort_by(by_score_desc);
    documents.truncate(top_k);
    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc(content: &str, source: &str, score: Option<f32>) -> RetrievedDocument {
        RetrievedDocument::new(content, source, score)
    }

    #[test]
    fn test_dedup_keeps_higher_score_at_first_position() {
        let docs = vec![
            doc("a", "S1", Some(0.4)),
            doc("b", "S1", Some(0.9)),
            doc("a", "S2", Some(0.7)),
            doc("c", "S2", None),
            doc("c", "S3", Some(0.1)),
        ];
        let out = dedup(docs);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].source, "S2");
        assert_eq!(out[0].content, "a");
        assert_eq!(out[2].source, "S3");
    }

    #[test]
    fn test_rank_unscored_last_stable() {
        let docs = vec![
            doc("x", "S", None),
            doc("y", "S", Some(0.2)),
            doc("z", "S", None),
            doc("w", "S", Some(0.8)),
        ];
        let out = rank_and_cap(docs, 10);
        let order: Vec<&str> = out.iter().map(|d| d.content.as_str()).collect();
        assert_eq!(order, vec!["w", "y", "x", "z"]);
        assert_eq!(rank_and_cap(out, 2).len(), 2);
    }

    fn arb_doc() -> impl Strategy<Value = RetrievedDocument> {
        ("[a-d]", "[A-C]", prop::option::of(0.0f32..1.0))
            .prop_map(|(c, s, score)| RetrievedDocument::new(c, s, score))
    }

    proptest! {
        #[test]
        fn prop_dedup_idempotent(docs in prop::collection::vec(arb_doc(), 0..20)) {
            let once = dedup(docs);
            let twice = dedup(once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_dedup_unique_content(docs in prop::collection::vec(arb_doc(), 0..20)) {
            let out = dedup(docs);
            let mut seen = std::collections::HashSet::new();
            prop_assert!(out.iter().all(|d| seen.insert(d.content.clone())));
        }

        #[test]
        fn prop_rank_is_order_independent(mut docs in prop::collection::vec(arb_doc(), 0..20), k in 0usize..10) {
            let docs_unique = dedup(std::mem::take(&mut docs));
            let mut reversed = docs_unique.clone();
            reversed.reverse();
            let a: Vec<Option<f32>> = rank_and_cap(docs_unique, k).iter().map(|d| d.score).collect();
            let b: Vec<Option<f32>> = rank_and_cap(reversed, k).iter().map(|d| d.score).collect();
            prop_assert_eq!(a, b);
        }
    }
}
