use crate::field::Field;
use crate::DocId;
use serde::{Deserialize, Serialize};

/// A preprocessed movie record.
///
/// Text fields are lists of entries (one per star, genre or summary paragraph),
/// each entry a whitespace-joined run of normalized tokens. Any other keys of
/// the source record are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    #[serde(default)]
    pub stars: Option<Vec<String>>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub summaries: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<DocId>) -> Self {
        Self { id: id.into(), stars: None, genres: None, summaries: None, extra: serde_json::Map::new() }
    }

    pub fn with_field(mut self, field: Field, entries: &[&str]) -> Self {
        let values = Some(entries.iter().map(|e| e.to_string()).collect());
        match field {
            Field::Stars => self.stars = values,
            Field::Genres => self.genres = values,
            Field::Summaries => self.summaries = values,
            Field::Documents => {}
        }
        self
    }

    /// Raw entries of a text field; `None` for a null field or for `Documents`.
    pub fn entries(&self, field: Field) -> Option<&[String]> {
        match field {
            Field::Stars => self.stars.as_deref(),
            Field::Genres => self.genres.as_deref(),
            Field::Summaries => self.summaries.as_deref(),
            Field::Documents => None,
        }
    }

    pub fn entries_mut(&mut self, field: Field) -> Option<&mut Vec<String>> {
        match field {
            Field::Stars => self.stars.as_mut(),
            Field::Genres => self.genres.as_mut(),
            Field::Summaries => self.summaries.as_mut(),
            Field::Documents => None,
        }
    }

    /// Tokens of all entries of `field`, concatenated in order.
    pub fn tokens(&self, field: Field) -> impl Iterator<Item = &str> + '_ {
        self.entries(field).unwrap_or(&[]).iter().flat_map(|entry| entry.split_whitespace())
    }

    /// Token count of `field`; a null field has length 0.
    pub fn field_length(&self, field: Field) -> usize {
        self.tokens(field).count()
    }
}
