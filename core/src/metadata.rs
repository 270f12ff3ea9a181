use crate::document::Document;
use crate::error::Result;
use crate::field::{Field, PerField};
use crate::index::Index;
use serde::{Deserialize, Serialize};

/// Mean token count per text field.
pub type FieldLengths = PerField<f64>;

/// Corpus statistics, persisted as `documents_metadata_index.json`.
///
/// Derived from the document store and never maintained incrementally;
/// rebuild it after a batch of mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataIndex {
    pub document_count: usize,
    #[serde(alias = "averge_document_length")]
    pub average_document_length: FieldLengths,
}

impl MetadataIndex {
    pub fn build<'a>(documents: impl IntoIterator<Item = &'a Document>) -> Self {
        let mut count = 0usize;
        let mut totals = PerField::<usize>::default();
        for doc in documents {
            count += 1;
            for (field, total) in totals.iter_mut() {
                *total += doc.field_length(field);
            }
        }
        let average_document_length = PerField::from_fn(|field| match totals.get(field) {
            Ok(&total) if count > 0 => total as f64 / count as f64,
            _ => 0.0,
        });
        tracing::info!(documents = count, "built metadata index");
        Self { document_count: count, average_document_length }
    }

    pub fn from_index(index: &Index) -> Self {
        Self::build(index.documents().values())
    }

    pub fn average_length(&self, field: Field) -> Result<f64> {
        self.average_document_length.get(field).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_include_null_fields_as_zero() {
        let docs = vec![
            Document::new("a").with_field(Field::Stars, &["tim robbins"]).with_field(Field::Genres, &["drama"]),
            Document::new("b").with_field(Field::Stars, &["al pacino", "robert de niro"]),
        ];
        let meta = MetadataIndex::build(&docs);
        assert_eq!(meta.document_count, 2);
        assert!((meta.average_length(Field::Stars).unwrap() - 3.5).abs() < 1e-12);
        assert!((meta.average_length(Field::Genres).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(meta.average_length(Field::Summaries).unwrap(), 0.0);
    }

    #[test]
    fn empty_corpus_has_zero_averages() {
        let meta = MetadataIndex::build(std::iter::empty());
        assert_eq!(meta.document_count, 0);
        assert_eq!(meta.average_length(Field::Stars).unwrap(), 0.0);
    }

    #[test]
    fn serializes_with_documented_keys_and_reads_legacy_key() {
        let meta = MetadataIndex {
            document_count: 3,
            average_document_length: FieldLengths { stars: 1.0, genres: 2.0, summaries: 3.0 },
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["document_count"], 3);
        assert_eq!(json["average_document_length"]["genres"], 2.0);

        let legacy: MetadataIndex = serde_json::from_str(
            r#"{"document_count": 3, "averge_document_length": {"stars": 1.0, "genres": 2.0, "summaries": 3.0}}"#,
        )
        .unwrap();
        assert_eq!(legacy, meta);
    }

    #[test]
    fn metadata_is_rejected_for_documents_field() {
        let meta = MetadataIndex::default();
        assert!(meta.average_length(Field::Documents).is_err());
    }
}
