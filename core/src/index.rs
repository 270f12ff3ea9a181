use crate::document::Document;
use crate::error::{Result, SearchError};
use crate::field::{Field, PerField, TEXT_FIELDS};
use crate::DocId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Postings of one term: document id -> term frequency (always >= 1).
pub type PostingMap = HashMap<DocId, u32>;

/// Inverted index of one text field, `{term: {doc_id: tf}}` on disk.
///
/// A term key exists only while at least one document contains the term;
/// removing the last posting removes the key. Loading goes through the same
/// rule, so empty terms and zero frequencies in a file are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldIndex {
    terms: HashMap<String, PostingMap>,
}

impl FieldIndex {
    pub fn new() -> Self { Self::default() }

    pub fn postings(&self, term: &str) -> Option<&PostingMap> {
        self.terms.get(term)
    }

    pub fn term_frequency(&self, term: &str, doc_id: &str) -> u32 {
        self.terms.get(term).and_then(|p| p.get(doc_id)).copied().unwrap_or(0)
    }

    /// Number of documents containing `term`.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.terms.get(term).map_or(0, |p| p.len())
    }

    /// Total occurrences of `term` across the field.
    pub fn collection_frequency(&self, term: &str) -> u64 {
        self.terms.get(term).map_or(0, |p| p.values().map(|&tf| u64::from(tf)).sum())
    }

    pub fn doc_ids(&self, term: &str) -> BTreeSet<DocId> {
        self.terms.get(term).map(|p| p.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn contains_term(&self, term: &str) -> bool {
        self.terms.contains_key(term)
    }

    pub fn terms(&self) -> impl Iterator<Item = (&String, &PostingMap)> {
        self.terms.iter()
    }

    pub fn len(&self) -> usize { self.terms.len() }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    /// Sets the posting for (`term`, `doc_id`). A zero frequency is ignored so
    /// that no term key ever holds an empty or zero posting.
    pub fn insert_posting(&mut self, term: impl Into<String>, doc_id: impl Into<DocId>, tf: u32) {
        if tf == 0 {
            return;
        }
        self.terms.entry(term.into()).or_default().insert(doc_id.into(), tf);
    }

    fn index_tokens<'a>(&mut self, doc_id: &str, tokens: impl Iterator<Item = &'a str>) {
        for (term, tf) in tally(tokens) {
            self.insert_posting(term, doc_id, tf);
        }
    }

    fn remove_posting(&mut self, term: &str, doc_id: &str) {
        if let Some(postings) = self.terms.get_mut(term) {
            postings.remove(doc_id);
            if postings.is_empty() {
                self.terms.remove(term);
            }
        }
    }

    fn remove_everywhere(&mut self, doc_id: &str) {
        self.terms.retain(|_, postings| {
            postings.remove(doc_id);
            !postings.is_empty()
        });
    }
}

impl<'de> Deserialize<'de> for FieldIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = HashMap::<String, PostingMap>::deserialize(deserializer)?;
        let raw_postings: usize = raw.values().map(|p| p.len()).sum();
        let index: FieldIndex = raw.into_iter().collect();
        let kept: usize = index.terms.values().map(|p| p.len()).sum();
        if kept < raw_postings {
            tracing::warn!(dropped = raw_postings - kept, "zero-frequency postings dropped while loading");
        }
        Ok(index)
    }
}

impl FromIterator<(String, PostingMap)> for FieldIndex {
    fn from_iter<I: IntoIterator<Item = (String, PostingMap)>>(iter: I) -> Self {
        let mut index = FieldIndex::new();
        for (term, postings) in iter {
            for (doc_id, tf) in postings {
                index.insert_posting(term.clone(), doc_id, tf);
            }
        }
        index
    }
}

/// Token counts of one field, keyed by document id. Documents with a null
/// field are present with length 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentLengths {
    lengths: HashMap<DocId, usize>,
}

impl DocumentLengths {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, doc_id: &str) -> Option<usize> {
        self.lengths.get(doc_id).copied()
    }

    pub fn insert(&mut self, doc_id: impl Into<DocId>, length: usize) {
        self.lengths.insert(doc_id.into(), length);
    }

    pub fn remove(&mut self, doc_id: &str) -> Option<usize> {
        self.lengths.remove(doc_id)
    }

    /// Sum of all document lengths in the field.
    pub fn total(&self) -> usize {
        self.lengths.values().sum()
    }

    pub fn len(&self) -> usize { self.lengths.len() }

    pub fn is_empty(&self) -> bool { self.lengths.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&DocId, &usize)> {
        self.lengths.iter()
    }
}

impl FromIterator<(DocId, usize)> for DocumentLengths {
    fn from_iter<I: IntoIterator<Item = (DocId, usize)>>(iter: I) -> Self {
        Self { lengths: iter.into_iter().collect() }
    }
}

/// The document store plus one inverted index and one length table per text field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Index {
    documents: HashMap<DocId, Document>,
    fields: PerField<FieldIndex>,
    lengths: PerField<DocumentLengths>,
}

impl Index {
    pub fn new() -> Self { Self::default() }

    /// Builds every field index from a full corpus. A repeated id keeps the
    /// last record.
    pub fn build(documents: impl IntoIterator<Item = Document>) -> Self {
        let mut index = Index::new();
        for doc in documents {
            index.add_document(doc);
        }
        tracing::info!(
            documents = index.documents.len(),
            stars_terms = index.fields.stars.len(),
            genres_terms = index.fields.genres.len(),
            summaries_terms = index.fields.summaries.len(),
            "built field indexes"
        );
        index
    }

    /// Reassembles an index from persisted parts. Length tables are derived
    /// from the document store.
    pub fn from_parts(documents: HashMap<DocId, Document>, fields: PerField<FieldIndex>) -> Self {
        let lengths = PerField::from_fn(|field| {
            documents.values().map(|doc| (doc.id.clone(), doc.field_length(field))).collect()
        });
        Self { documents, fields, lengths }
    }

    pub fn documents(&self) -> &HashMap<DocId, Document> {
        &self.documents
    }

    pub fn document(&self, doc_id: &str) -> Option<&Document> {
        self.documents.get(doc_id)
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.documents.contains_key(doc_id)
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn field(&self, field: Field) -> Result<&FieldIndex> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &PerField<FieldIndex> {
        &self.fields
    }

    pub fn lengths(&self, field: Field) -> Result<&DocumentLengths> {
        self.lengths.get(field)
    }

    /// Ids of documents whose `field` contains `term`. An absent term yields
    /// an empty set; `Documents` is rejected because it holds no terms.
    pub fn posting_list(&self, field: Field, term: &str) -> Result<BTreeSet<DocId>> {
        Ok(self.field(field)?.doc_ids(term))
    }

    /// Inserts `doc` and its postings. Re-adding an existing id replaces the
    /// previous record and all of its postings.
    pub fn add_document(&mut self, doc: Document) {
        if self.documents.contains_key(&doc.id) {
            self.remove_document(&doc.id);
        }
        for field in TEXT_FIELDS {
            if let (Ok(index), Ok(lengths)) = (self.fields.get_mut(field), self.lengths.get_mut(field)) {
                index.index_tokens(&doc.id, doc.tokens(field));
                lengths.insert(doc.id.clone(), doc.field_length(field));
            }
        }
        self.documents.insert(doc.id.clone(), doc);
    }

    /// Removes a document and every posting that refers to it. Returns the
    /// stored record, or `None` when the id was unknown.
    pub fn remove_document(&mut self, doc_id: &str) -> Option<Document> {
        let removed = self.documents.remove(doc_id);
        for (field, index) in self.fields.iter_mut() {
            match &removed {
                Some(doc) => {
                    let terms: HashSet<&str> = doc.tokens(field).collect();
                    for term in terms {
                        index.remove_posting(term, doc_id);
                    }
                }
                // no record to guide us, e.g. a field index loaded without its store
                None => index.remove_everywhere(doc_id),
            }
        }
        for (_, lengths) in self.lengths.iter_mut() {
            lengths.remove(doc_id);
        }
        removed
    }

    /// Adds `doc`, checks that each of its terms now lists it, removes it again
    /// and checks that the index is back to its previous state.
    pub fn verify_add_remove(&mut self, doc: Document) -> Result<bool> {
        if self.contains(&doc.id) {
            return Err(SearchError::invalid(format!("document `{}` is already indexed", doc.id)));
        }
        let before = self.clone();
        let probe = doc.clone();
        self.add_document(doc);

        let mut added_ok = self.document(&probe.id) == Some(&probe);
        for field in TEXT_FIELDS {
            for term in probe.tokens(field) {
                added_ok &= self.posting_list(field, term)?.contains(&probe.id);
            }
        }
        if !added_ok {
            tracing::warn!(doc_id = %probe.id, "add_document did not index every term");
        }

        self.remove_document(&probe.id);
        let restored = *self == before;
        if !restored {
            tracing::warn!(doc_id = %probe.id, "remove_document did not restore the index");
        }
        Ok(added_ok && restored)
    }

    /// Compares the posting list of `term` with a brute-force scan of the store.
    pub fn verify_postings(&self, field: Field, term: &str) -> Result<bool> {
        let indexed = self.posting_list(field, term)?;
        Ok(indexed == self.scan_postings(field, term)?)
    }

    /// Ids of documents containing `term` in `field`, found without the index.
    pub fn scan_postings(&self, field: Field, term: &str) -> Result<BTreeSet<DocId>> {
        field.require_text()?;
        Ok(self
            .documents
            .values()
            .filter(|doc| doc.tokens(field).any(|t| t == term))
            .map(|doc| doc.id.clone())
            .collect())
    }
}

fn tally<'a>(tokens: impl Iterator<Item = &'a str>) -> HashMap<&'a str, u32> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for token in tokens {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document::new("1")
                .with_field(Field::Stars, &["tim robbins", "morgan freeman"])
                .with_field(Field::Genres, &["drama"])
                .with_field(Field::Summaries, &["good good prison", "hope"]),
            Document::new("2")
                .with_field(Field::Stars, &["al pacino", "robert de niro"])
                .with_field(Field::Genres, &["crime", "drama"])
                .with_field(Field::Summaries, &["good heist"]),
            Document::new("3").with_field(Field::Genres, &["comedy"]),
        ]
    }

    #[test]
    fn build_tallies_term_frequencies() {
        let index = Index::build(corpus());
        let summaries = index.field(Field::Summaries).unwrap();
        assert_eq!(summaries.term_frequency("good", "1"), 2);
        assert_eq!(summaries.term_frequency("good", "2"), 1);
        assert_eq!(summaries.term_frequency("good", "3"), 0);
        assert_eq!(summaries.document_frequency("good"), 2);
        assert_eq!(summaries.collection_frequency("good"), 3);
    }

    #[test]
    fn posting_list_of_absent_term_is_empty() {
        let index = Index::build(corpus());
        assert!(index.posting_list(Field::Genres, "western").unwrap().is_empty());
    }

    #[test]
    fn posting_list_rejects_documents_field() {
        let index = Index::build(corpus());
        let err = index.posting_list(Field::Documents, "good").unwrap_err();
        assert!(err.is_invalid_request());
    }

    #[test]
    fn lengths_count_tokens_and_null_fields() {
        let index = Index::build(corpus());
        let stars = index.lengths(Field::Stars).unwrap();
        assert_eq!(stars.get("1"), Some(4));
        assert_eq!(stars.get("3"), Some(0));
        assert_eq!(stars.total(), 9);
    }

    #[test]
    fn remove_drops_empty_term_keys() {
        let mut index = Index::build(corpus());
        assert!(index.field(Field::Genres).unwrap().contains_term("comedy"));
        let removed = index.remove_document("3").unwrap();
        assert_eq!(removed.id, "3");
        assert!(!index.field(Field::Genres).unwrap().contains_term("comedy"));
        assert!(index.lengths(Field::Genres).unwrap().get("3").is_none());
    }

    #[test]
    fn remove_unknown_document_is_a_no_op() {
        let mut index = Index::build(corpus());
        let before = index.clone();
        assert!(index.remove_document("404").is_none());
        assert_eq!(index, before);
    }

    #[test]
    fn re_adding_replaces_postings() {
        let mut index = Index::build(corpus());
        index.add_document(Document::new("2").with_field(Field::Summaries, &["quiet"]));
        let summaries = index.field(Field::Summaries).unwrap();
        assert_eq!(summaries.doc_ids("good").into_iter().collect::<Vec<_>>(), vec!["1".to_string()]);
        assert_eq!(summaries.term_frequency("quiet", "2"), 1);
        assert!(index.field(Field::Stars).unwrap().postings("pacino").is_none());
    }

    #[test]
    fn verify_add_remove_restores_state() {
        let mut index = Index::build(corpus());
        let dummy = Document::new("100")
            .with_field(Field::Stars, &["tim", "henry"])
            .with_field(Field::Genres, &["drama", "crime"])
            .with_field(Field::Summaries, &["good"]);
        assert!(index.verify_add_remove(dummy).unwrap());
        assert!(!index.contains("100"));
    }

    #[test]
    fn verify_add_remove_rejects_existing_id() {
        let mut index = Index::build(corpus());
        assert!(index.verify_add_remove(Document::new("1")).is_err());
    }

    #[test]
    fn from_parts_derives_lengths() {
        let built = Index::build(corpus());
        let rebuilt = Index::from_parts(built.documents().clone(), built.fields().clone());
        assert_eq!(rebuilt, built);
    }

    #[test]
    fn loading_drops_empty_terms_and_zero_postings() {
        let index: FieldIndex =
            serde_json::from_str(r#"{"good": {"1": 2, "2": 0}, "empty": {}, "zero": {"3": 0}}"#).unwrap();
        assert_eq!(index.len(), 1);
        assert!(!index.contains_term("empty"));
        assert!(!index.contains_term("zero"));
        assert_eq!(index.document_frequency("good"), 1);
        assert_eq!(index.term_frequency("good", "1"), 2);
    }
}
