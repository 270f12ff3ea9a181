use crate::error::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named parts of a movie record. `Documents` is the raw record store; the
/// other three are token-indexed text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Documents,
    Stars,
    Genres,
    Summaries,
}

/// The indexable text fields, in persistence and merge order.
pub const TEXT_FIELDS: [Field; 3] = [Field::Stars, Field::Genres, Field::Summaries];

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Documents => "documents",
            Field::Stars => "stars",
            Field::Genres => "genres",
            Field::Summaries => "summaries",
        }
    }

    pub fn is_text(self) -> bool {
        !matches!(self, Field::Documents)
    }

    /// Rejects `Documents` where a token-indexed field is required.
    pub fn require_text(self) -> Result<Self> {
        if self.is_text() {
            Ok(self)
        } else {
            Err(SearchError::invalid(format!("`{}` is not a text field", self)))
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "documents" => Ok(Field::Documents),
            "stars" => Ok(Field::Stars),
            "genres" => Ok(Field::Genres),
            "summaries" => Ok(Field::Summaries),
            other => Err(SearchError::invalid(format!("unknown field `{other}`"))),
        }
    }
}

/// One value per text field. Serializes as `{"stars": .., "genres": .., "summaries": ..}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerField<T> {
    pub stars: T,
    pub genres: T,
    pub summaries: T,
}

impl<T> PerField<T> {
    pub fn from_fn(mut f: impl FnMut(Field) -> T) -> Self {
        Self { stars: f(Field::Stars), genres: f(Field::Genres), summaries: f(Field::Summaries) }
    }

    pub fn get(&self, field: Field) -> Result<&T> {
        match field {
            Field::Stars => Ok(&self.stars),
            Field::Genres => Ok(&self.genres),
            Field::Summaries => Ok(&self.summaries),
            Field::Documents => Err(SearchError::invalid("`documents` is not a text field")),
        }
    }

    pub fn get_mut(&mut self, field: Field) -> Result<&mut T> {
        match field {
            Field::Stars => Ok(&mut self.stars),
            Field::Genres => Ok(&mut self.genres),
            Field::Summaries => Ok(&mut self.summaries),
            Field::Documents => Err(SearchError::invalid("`documents` is not a text field")),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &T)> {
        [(Field::Stars, &self.stars), (Field::Genres, &self.genres), (Field::Summaries, &self.summaries)]
            .into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Field, &mut T)> {
        [
            (Field::Stars, &mut self.stars),
            (Field::Genres, &mut self.genres),
            (Field::Summaries, &mut self.summaries),
        ]
        .into_iter()
    }
}

/// Kinds of persisted index artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Full inverted index (`<field>_index.json`)
    Field,
    /// Three importance tiers (`<field>_tiered_index.json`)
    Tiered,
    /// Per-document token counts (`<field>_document_length_index.json`)
    DocumentLength,
    /// Corpus statistics (`documents_metadata_index.json`)
    Metadata,
}

impl IndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IndexKind::Field => "index",
            IndexKind::Tiered => "tiered",
            IndexKind::DocumentLength => "document_length",
            IndexKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "index" | "field" => Ok(IndexKind::Field),
            "tiered" => Ok(IndexKind::Tiered),
            "document_length" => Ok(IndexKind::DocumentLength),
            "metadata" => Ok(IndexKind::Metadata),
            other => Err(SearchError::invalid(format!("unknown index kind `{other}`"))),
        }
    }
}
