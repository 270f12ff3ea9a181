//! Indexing and ranking engine for a small movie corpus.
//!
//! The crate is organised leaves first:
//!
//! - [`index`]: per-field inverted indexes plus the flat document store.
//! - [`metadata`]: corpus-wide document count and average field lengths.
//! - [`tiered`]: importance-partitioned copies of each field index.
//! - [`scorer`]: vector space, Okapi BM25 and unigram language model scoring.
//! - [`search`]: per-field scoring, weighting and union-merge into one ranking.
//!
//! [`persist`] reads and writes every artifact as JSON, and [`tokenizer`] is the
//! default implementation of the [`Preprocessor`] contract.

pub mod document;
pub mod error;
pub mod field;
pub mod index;
pub mod metadata;
pub mod persist;
pub mod scorer;
pub mod search;
pub mod tiered;
pub mod tokenizer;

pub use document::Document;
pub use error::{Result, SearchError};
pub use field::{Field, IndexKind, PerField, TEXT_FIELDS};
pub use index::{DocumentLengths, FieldIndex, Index, PostingMap};
pub use metadata::{FieldLengths, MetadataIndex};
pub use scorer::{Scorer, ScoreMap, Smoothing, VsmMethod};
pub use search::{
    merge_scores, Catalog, FieldWeights, RankingMethod, SearchEngine, SearchHit, SearchRequest,
};
pub use tiered::{FieldTiers, Tier, TieredIndex};
pub use tokenizer::{Preprocessor, StandardPreprocessor};

/// Document identifiers are the corpus' own string ids.
pub type DocId = String;
