//! JSON persistence, one directory per corpus snapshot:
//!
//! ```text
//! preprocessed_data.json              input corpus
//! documents_index.json                {doc_id: record}
//! <field>_index.json                  {term: {doc_id: tf}}
//! <field>_document_length_index.json  {doc_id: length}
//! <field>_tiered_index.json           {"first_tier": .., "second_tier": .., "third_tier": ..}
//! documents_metadata_index.json       {"document_count": .., "average_document_length": ..}
//! ```
//!
//! I/O failures are fatal to the operation and are returned as-is.

use crate::document::Document;
use crate::error::{Result, SearchError};
use crate::field::{Field, IndexKind, PerField};
use crate::index::{DocumentLengths, FieldIndex, Index};
use crate::metadata::MetadataIndex;
use crate::search::Catalog;
use crate::tiered::{FieldTiers, TieredIndex};
use crate::DocId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn preprocessed_data(&self) -> PathBuf { self.root.join("preprocessed_data.json") }

    pub fn documents(&self) -> PathBuf { self.root.join("documents_index.json") }

    /// File holding the artifact of `kind` for `field`. Metadata lives under
    /// `documents` whatever field is given.
    pub fn artifact(&self, field: Field, kind: IndexKind) -> Result<PathBuf> {
        let name = match kind {
            IndexKind::Field => format!("{field}_index.json"),
            IndexKind::Metadata => "documents_metadata_index.json".to_string(),
            IndexKind::Tiered | IndexKind::DocumentLength => {
                format!("{}_{kind}_index.json", field.require_text()?)
            }
        };
        Ok(self.root.join(name))
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        create_dir_all(dir).map_err(|source| SearchError::Io { path: dir.to_path_buf(), source })?;
    }
    let file = File::create(path).map_err(|source| SearchError::Io { path: path.to_path_buf(), source })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|source| SearchError::Json { path: path.to_path_buf(), source })?;
    writer.flush().map_err(|source| SearchError::Io { path: path.to_path_buf(), source })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| SearchError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| SearchError::Json { path: path.to_path_buf(), source })
}

/// Reads the corpus as an ordered list of records.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    read_json(path)
}

pub fn save_corpus(path: &Path, documents: &[Document]) -> Result<()> {
    write_json(path, documents)
}

pub fn save_documents(paths: &IndexPaths, documents: &HashMap<DocId, Document>) -> Result<()> {
    write_json(&paths.documents(), documents)
}

pub fn load_documents(paths: &IndexPaths) -> Result<HashMap<DocId, Document>> {
    read_json(&paths.documents())
}

pub fn save_field_index(paths: &IndexPaths, field: Field, index: &FieldIndex) -> Result<()> {
    write_json(&paths.artifact(field.require_text()?, IndexKind::Field)?, index)
}

pub fn load_field_index(paths: &IndexPaths, field: Field) -> Result<FieldIndex> {
    read_json(&paths.artifact(field.require_text()?, IndexKind::Field)?)
}

pub fn save_document_lengths(paths: &IndexPaths, field: Field, lengths: &DocumentLengths) -> Result<()> {
    write_json(&paths.artifact(field, IndexKind::DocumentLength)?, lengths)
}

pub fn load_document_lengths(paths: &IndexPaths, field: Field) -> Result<DocumentLengths> {
    read_json(&paths.artifact(field, IndexKind::DocumentLength)?)
}

pub fn save_tiers(paths: &IndexPaths, field: Field, tiers: &FieldTiers) -> Result<()> {
    write_json(&paths.artifact(field, IndexKind::Tiered)?, tiers)
}

pub fn load_tiers(paths: &IndexPaths, field: Field) -> Result<FieldTiers> {
    read_json(&paths.artifact(field, IndexKind::Tiered)?)
}

pub fn save_metadata(paths: &IndexPaths, metadata: &MetadataIndex) -> Result<()> {
    write_json(&paths.artifact(Field::Documents, IndexKind::Metadata)?, metadata)
}

pub fn load_metadata(paths: &IndexPaths) -> Result<MetadataIndex> {
    read_json(&paths.artifact(Field::Documents, IndexKind::Metadata)?)
}

/// Writes the document store and every field's inverted index and lengths.
pub fn save_index(paths: &IndexPaths, index: &Index) -> Result<()> {
    save_documents(paths, index.documents())?;
    for (field, field_index) in index.fields().iter() {
        save_field_index(paths, field, field_index)?;
        save_document_lengths(paths, field, index.lengths(field)?)?;
    }
    Ok(())
}

/// Reads the document store and the field indexes. Lengths are re-derived
/// from the store and checked against the persisted length tables; the store
/// wins on disagreement.
pub fn load_index(paths: &IndexPaths) -> Result<Index> {
    let documents = load_documents(paths)?;
    let stars = load_field_index(paths, Field::Stars)?;
    let genres = load_field_index(paths, Field::Genres)?;
    let summaries = load_field_index(paths, Field::Summaries)?;
    let index = Index::from_parts(documents, PerField { stars, genres, summaries });
    for field in crate::field::TEXT_FIELDS {
        let persisted = load_document_lengths(paths, field)?;
        let derived = index.lengths(field)?;
        if &persisted != derived {
            let disagreeing = derived.iter().filter(|&(id, &len)| persisted.get(id) != Some(len)).count()
                + persisted.iter().filter(|&(id, _)| derived.get(id).is_none()).count();
            tracing::warn!(%field, disagreeing, "persisted document lengths disagree with the document store");
        }
    }
    Ok(index)
}

pub fn save_tiered_index(paths: &IndexPaths, tiered: &TieredIndex) -> Result<()> {
    for field in crate::field::TEXT_FIELDS {
        save_tiers(paths, field, tiered.field(field)?)?;
    }
    Ok(())
}

pub fn load_tiered_index(paths: &IndexPaths) -> Result<TieredIndex> {
    let stars = load_tiers(paths, Field::Stars)?;
    let genres = load_tiers(paths, Field::Genres)?;
    let summaries = load_tiers(paths, Field::Summaries)?;
    Ok(TieredIndex::from_parts(PerField { stars, genres, summaries }))
}

/// Persists every artifact of a catalog into one directory.
pub fn save_catalog(paths: &IndexPaths, catalog: &Catalog) -> Result<()> {
    save_index(paths, catalog.index())?;
    save_metadata(paths, catalog.metadata())?;
    save_tiered_index(paths, catalog.tiered())?;
    tracing::info!(root = %paths.root.display(), documents = catalog.index().document_count(), "saved catalog");
    Ok(())
}

pub fn load_catalog(paths: &IndexPaths) -> Result<Catalog> {
    let index = load_index(paths)?;
    let metadata = load_metadata(paths)?;
    let tiered = load_tiered_index(paths)?;
    tracing::info!(root = %paths.root.display(), documents = index.document_count(), "loaded catalog");
    Ok(Catalog::from_parts(index, metadata, tiered))
}
