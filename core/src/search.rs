//! Query orchestration: per-field scoring, field weighting and the union merge
//! into one ranked list.

use crate::document::Document;
use crate::error::{Result, SearchError};
use crate::field::Field;
use crate::index::{FieldIndex, Index};
use crate::metadata::MetadataIndex;
use crate::scorer::{ScoreMap, Scorer, Smoothing, VsmMethod, DEFAULT_ALPHA, DEFAULT_LAMBDA};
use crate::tiered::{Tier, TieredIndex};
use crate::tokenizer::Preprocessor;
use crate::DocId;
use parking_lot::{RwLock, RwLockReadGuard};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

pub const DEFAULT_MAX_RESULTS: usize = 10;

/// How documents are scored within a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RankingMethod {
    VectorSpace(VsmMethod),
    OkapiBm25,
    /// Always scored against the full field index.
    Unigram(Smoothing),
}

impl RankingMethod {
    /// Parses a method name (`lnc.ltc`, `okapibm25`, `unigram`). Unigram needs
    /// a smoothing name; `alpha` and `lambda` parameterise it.
    pub fn parse(method: &str, smoothing: Option<&str>, alpha: f64, lambda: f64) -> Result<Self> {
        match method.trim().to_ascii_lowercase().as_str() {
            "okapibm25" | "okapi_bm25" | "bm25" => Ok(RankingMethod::OkapiBm25),
            "unigram" => {
                let name = smoothing
                    .ok_or_else(|| SearchError::invalid("unigram ranking requires a smoothing method"))?;
                Ok(RankingMethod::Unigram(Smoothing::parse(name, alpha, lambda)?))
            }
            code => Ok(RankingMethod::VectorSpace(code.parse()?)),
        }
    }
}

impl FromStr for RankingMethod {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        RankingMethod::parse(s, None, DEFAULT_ALPHA, DEFAULT_LAMBDA)
    }
}

impl fmt::Display for RankingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingMethod::VectorSpace(method) => write!(f, "{method}"),
            RankingMethod::OkapiBm25 => f.write_str("okapibm25"),
            RankingMethod::Unigram(smoothing) => write!(f, "unigram({smoothing:?})"),
        }
    }
}

/// Per-field multipliers. Fields without a weight, or with weight zero, are
/// not scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldWeights {
    weights: BTreeMap<Field, f64>,
}

impl FieldWeights {
    pub fn new() -> Self { Self::default() }

    /// Weight 1 on every text field.
    pub fn uniform() -> Self {
        Self { weights: crate::field::TEXT_FIELDS.iter().map(|&f| (f, 1.0)).collect() }
    }

    pub fn with(mut self, field: Field, weight: f64) -> Result<Self> {
        self.set(field, weight)?;
        Ok(self)
    }

    pub fn set(&mut self, field: Field, weight: f64) -> Result<()> {
        field.require_text()?;
        if !weight.is_finite() || weight < 0.0 {
            return Err(SearchError::invalid(format!("weight for `{field}` must be a non-negative number, got {weight}")));
        }
        self.weights.insert(field, weight);
        Ok(())
    }

    pub fn get(&self, field: Field) -> f64 {
        self.weights.get(&field).copied().unwrap_or(0.0)
    }

    /// Fields with a non-zero weight.
    pub fn active(&self) -> impl Iterator<Item = (Field, f64)> + '_ {
        self.weights.iter().filter(|(_, &w)| w > 0.0).map(|(&f, &w)| (f, w))
    }
}

impl FromStr for FieldWeights {
    type Err = SearchError;

    /// Parses `stars=1,genres=0.5,summaries=2`.
    fn from_str(s: &str) -> Result<Self> {
        let mut weights = FieldWeights::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (field, weight) = pair
                .split_once('=')
                .ok_or_else(|| SearchError::invalid(format!("malformed field weight `{pair}`")))?;
            let weight: f64 = weight
                .trim()
                .parse()
                .map_err(|_| SearchError::invalid(format!("malformed field weight `{pair}`")))?;
            weights.set(field.parse()?, weight)?;
        }
        Ok(weights)
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Normalized query tokens.
    pub query: Vec<String>,
    pub method: RankingMethod,
    pub weights: FieldWeights,
    /// Score the full field indexes (`true`) or scan tiers (`false`).
    /// Ignored by the unigram model.
    pub safe_ranking: bool,
    /// `None` returns every scored document.
    pub max_results: Option<usize>,
    /// Tier scanning stops descending once this passes.
    pub deadline: Option<Instant>,
}

impl SearchRequest {
    pub fn new(query: Vec<String>, method: RankingMethod) -> Self {
        Self {
            query,
            method,
            weights: FieldWeights::uniform(),
            safe_ranking: true,
            max_results: Some(DEFAULT_MAX_RESULTS),
            deadline: None,
        }
    }

    /// Runs a raw query string through `preprocessor` first.
    pub fn from_text(raw: &str, preprocessor: &impl Preprocessor, method: RankingMethod) -> Self {
        Self::new(preprocessor.preprocess(raw), method)
    }

    pub fn weights(mut self, weights: FieldWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn safe_ranking(mut self, safe: bool) -> Self {
        self.safe_ranking = safe;
        self
    }

    pub fn max_results(mut self, max_results: Option<usize>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: f64,
}

/// Union-sum of score maps: a document's score is the sum of its scores in
/// every map it appears in.
pub fn merge_scores(maps: impl IntoIterator<Item = ScoreMap>) -> ScoreMap {
    let mut merged = ScoreMap::new();
    for map in maps {
        if merged.is_empty() {
            merged = map;
            continue;
        }
        for (doc_id, score) in map {
            *merged.entry(doc_id).or_insert(0.0) += score;
        }
    }
    merged
}

/// Orders by score descending, then document id ascending, and truncates.
pub fn rank(scores: ScoreMap, max_results: Option<usize>) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> =
        scores.into_iter().map(|(doc_id, score)| SearchHit { doc_id, score }).collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
    if let Some(limit) = max_results {
        hits.truncate(limit);
    }
    hits
}

/// Everything a query reads: the field indexes and the artifacts derived from
/// them.
///
/// Mutations keep the field indexes and document lengths exact but only mark
/// the metadata and tiered index stale; [`Catalog::refresh`] rebuilds them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    index: Index,
    metadata: MetadataIndex,
    tiered: TieredIndex,
    stale: bool,
}

impl Catalog {
    pub fn build(index: Index) -> Self {
        let metadata = MetadataIndex::from_index(&index);
        let tiered = TieredIndex::build(&index);
        Self { index, metadata, tiered, stale: false }
    }

    pub fn from_parts(index: Index, metadata: MetadataIndex, tiered: TieredIndex) -> Self {
        let stale = metadata.document_count != index.document_count();
        if stale {
            tracing::warn!(
                metadata = metadata.document_count,
                documents = index.document_count(),
                "loaded metadata disagrees with document store"
            );
        }
        Self { index, metadata, tiered, stale }
    }

    pub fn index(&self) -> &Index { &self.index }

    pub fn metadata(&self) -> &MetadataIndex { &self.metadata }

    pub fn tiered(&self) -> &TieredIndex { &self.tiered }

    pub fn is_stale(&self) -> bool { self.stale }

    pub fn add_document(&mut self, doc: Document) {
        self.index.add_document(doc);
        self.stale = true;
    }

    pub fn remove_document(&mut self, doc_id: &str) -> Option<Document> {
        let removed = self.index.remove_document(doc_id);
        if removed.is_some() {
            self.stale = true;
        }
        removed
    }

    /// Rebuilds metadata and tiers from the current field indexes.
    pub fn refresh(&mut self) {
        self.metadata = MetadataIndex::from_index(&self.index);
        self.tiered = TieredIndex::build(&self.index);
        self.stale = false;
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let fields: Vec<(Field, f64)> = request.weights.active().collect();
        if request.query.is_empty() || fields.is_empty() {
            return Ok(Vec::new());
        }
        if self.stale {
            tracing::warn!("searching with stale metadata and tiers, call refresh after mutations");
        }

        let weighted: Vec<ScoreMap> = fields
            .par_iter()
            .map(|&(field, weight)| -> Result<ScoreMap> {
                let mut scores = self.score_field(field, request)?;
                scores.values_mut().for_each(|s| *s *= weight);
                Ok(scores)
            })
            .collect::<Result<_>>()?;

        let hits = rank(merge_scores(weighted), request.max_results);
        tracing::debug!(method = %request.method, hits = hits.len(), "search complete");
        Ok(hits)
    }

    fn score_field(&self, field: Field, request: &SearchRequest) -> Result<ScoreMap> {
        match request.method {
            RankingMethod::Unigram(smoothing) => {
                let scorer = Scorer::new(self.index.field(field)?, self.metadata.document_count);
                Ok(scorer.unigram(&request.query, smoothing, self.index.lengths(field)?))
            }
            _ if request.safe_ranking => self.score_source(field, self.index.field(field)?, request),
            _ => self.score_tiers(field, request),
        }
    }

    /// Scans tiers first to last, summing their scores. The first tier is
    /// always scanned; later tiers are skipped once the field already has
    /// `max_results` documents or the deadline has passed.
    fn score_tiers(&self, field: Field, request: &SearchRequest) -> Result<ScoreMap> {
        let mut field_scores = ScoreMap::new();
        for tier in Tier::ALL {
            if tier != Tier::First {
                if request.deadline.is_some_and(|d| Instant::now() >= d) {
                    tracing::debug!(%field, %tier, "deadline passed, skipping remaining tiers");
                    break;
                }
                if request.max_results.is_some_and(|k| field_scores.len() >= k) {
                    tracing::debug!(%field, %tier, "enough candidates, skipping remaining tiers");
                    break;
                }
            }
            let scores = self.score_source(field, self.tiered.tier(field, tier)?, request)?;
            field_scores = merge_scores([field_scores, scores]);
        }
        Ok(field_scores)
    }

    fn score_source(&self, field: Field, source: &FieldIndex, request: &SearchRequest) -> Result<ScoreMap> {
        let scorer = Scorer::new(source, self.metadata.document_count);
        match &request.method {
            RankingMethod::VectorSpace(method) => Ok(scorer.vector_space(&request.query, method)),
            RankingMethod::OkapiBm25 => {
                let avg_len = self.metadata.average_length(field)?;
                Ok(scorer.okapi_bm25(&request.query, avg_len, self.index.lengths(field)?))
            }
            RankingMethod::Unigram(smoothing) => {
                Ok(scorer.unigram(&request.query, *smoothing, self.index.lengths(field)?))
            }
        }
    }
}

/// A [`Catalog`] shared between concurrent readers and a single writer.
///
/// Each query holds a read guard for its whole run, so it never observes a
/// half-applied mutation.
#[derive(Debug, Default)]
pub struct SearchEngine {
    catalog: RwLock<Catalog>,
}

impl SearchEngine {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog: RwLock::new(catalog) }
    }

    pub fn build(documents: impl IntoIterator<Item = Document>) -> Self {
        Self::new(Catalog::build(Index::build(documents)))
    }

    pub fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.catalog.read().search(request)
    }

    pub fn document(&self, doc_id: &str) -> Option<Document> {
        self.catalog.read().index().document(doc_id).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.catalog.read().index().document_count()
    }

    pub fn add_document(&self, doc: Document) {
        self.catalog.write().add_document(doc);
    }

    pub fn remove_document(&self, doc_id: &str) -> Option<Document> {
        self.catalog.write().remove_document(doc_id)
    }

    pub fn refresh(&self) {
        self.catalog.write().refresh();
    }

    /// Read access to the whole catalog, e.g. for persisting a snapshot.
    pub fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> ScoreMap {
        pairs.iter().map(|&(d, s)| (d.to_string(), s)).collect()
    }

    #[test]
    fn merge_is_a_union_sum() {
        let merged = merge_scores([
            scores(&[("a", 1.0), ("b", 2.0)]),
            scores(&[("b", 0.5), ("c", 4.0)]),
            scores(&[("d", 3.0)]),
        ]);
        assert_eq!(merged, scores(&[("a", 1.0), ("b", 2.5), ("c", 4.0), ("d", 3.0)]));
    }

    #[test]
    fn merge_keeps_documents_only_in_later_maps() {
        let merged = merge_scores([scores(&[("m", 1.0)]), scores(&[("a", 1.0), ("z", 2.0)])]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged["z"], 2.0);
    }

    #[test]
    fn rank_breaks_ties_by_doc_id_and_truncates() {
        let hits = rank(scores(&[("b", 1.0), ("a", 1.0), ("c", 3.0)]), Some(2));
        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids, ["c", "a"]);
        assert_eq!(rank(scores(&[("x", 1.0)]), None).len(), 1);
    }

    #[test]
    fn parses_ranking_methods() {
        assert_eq!("OkapiBM25".parse::<RankingMethod>().unwrap(), RankingMethod::OkapiBm25);
        assert!(matches!("lnc.ltc".parse::<RankingMethod>().unwrap(), RankingMethod::VectorSpace(_)));
        assert_eq!(
            RankingMethod::parse("unigram", Some("naive"), 0.5, 0.5).unwrap(),
            RankingMethod::Unigram(Smoothing::Naive)
        );
        assert!("unigram".parse::<RankingMethod>().unwrap_err().is_invalid_request());
        assert!("pagerank".parse::<RankingMethod>().unwrap_err().is_invalid_request());
        assert!(RankingMethod::parse("unigram", Some("laplace"), 0.5, 0.5).is_err());
    }

    #[test]
    fn parses_field_weights() {
        let weights: FieldWeights = "stars=1, genres=0.5,summaries=0".parse().unwrap();
        assert_eq!(weights.get(Field::Genres), 0.5);
        let active: Vec<Field> = weights.active().map(|(f, _)| f).collect();
        assert_eq!(active, [Field::Stars, Field::Genres]);
        assert!("documents=1".parse::<FieldWeights>().is_err());
        assert!("stars=-1".parse::<FieldWeights>().is_err());
        assert!("stars".parse::<FieldWeights>().is_err());
        assert!("plot=1".parse::<FieldWeights>().is_err());
    }
}
