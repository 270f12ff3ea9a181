//! Relevance models over one posting source.
//!
//! A [`Scorer`] borrows either a full [`FieldIndex`] or one tier of it together
//! with the corpus size, and only ever visits documents that appear in the
//! postings of at least one query term.
//!
//! Three families are supported:
//!
//! - vector space, configured by a pair of SMART codes such as `lnc.ltc`
//! - Okapi BM25 with k1 = 1.5 and b = 0.75
//! - a unigram language model with Bayesian, Jelinek-Mercer or no smoothing
//!
//! A term with no postings contributes nothing. A document whose length is
//! unknown contributes zero for that term and the gap is logged.

use crate::error::{Result, SearchError};
use crate::index::{DocumentLengths, FieldIndex};
use crate::DocId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Document id -> relevance score.
pub type ScoreMap = HashMap<DocId, f64>;

pub const BM25_K1: f64 = 1.5;
pub const BM25_B: f64 = 0.75;

pub const DEFAULT_ALPHA: f64 = 0.5;
pub const DEFAULT_LAMBDA: f64 = 0.5;

/// Term-frequency component of a SMART code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TfWeight {
    /// `n`: raw count
    Natural,
    /// `l`: 1 + ln(tf)
    Logarithmic,
}

/// Document-frequency component of a SMART code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdfWeight {
    /// `n`
    Ignore,
    /// `t`: ln(N / df)
    Idf,
}

/// Normalization component of a SMART code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalization {
    /// `n`
    None,
    /// `c`: divide by the Euclidean norm of the weight vector
    Cosine,
}

/// One side of a vector space method, e.g. `lnc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmartCode {
    pub tf: TfWeight,
    pub idf: IdfWeight,
    pub norm: Normalization,
}

impl SmartCode {
    fn tf_weight(&self, tf: u32) -> f64 {
        match self.tf {
            TfWeight::Natural => f64::from(tf),
            TfWeight::Logarithmic if tf > 0 => 1.0 + f64::from(tf).ln(),
            TfWeight::Logarithmic => 0.0,
        }
    }

    fn idf_weight(&self, idf: f64) -> f64 {
        match self.idf {
            IdfWeight::Ignore => 1.0,
            IdfWeight::Idf => idf,
        }
    }

    fn normalize(&self, weights: &mut [f64]) {
        if self.norm == Normalization::Cosine {
            let norm = weights.iter().map(|w| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                weights.iter_mut().for_each(|w| *w /= norm);
            }
        }
    }
}

impl FromStr for SmartCode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || SearchError::invalid(format!("malformed weighting code `{s}`, expected (n|l)(n|t)(n|c)"));
        let chars: Vec<char> = s.chars().collect();
        let &[tf, idf, norm] = chars.as_slice() else {
            return Err(bad());
        };
        let tf = match tf {
            'n' => TfWeight::Natural,
            'l' => TfWeight::Logarithmic,
            _ => return Err(bad()),
        };
        let idf = match idf {
            'n' => IdfWeight::Ignore,
            't' => IdfWeight::Idf,
            _ => return Err(bad()),
        };
        let norm = match norm {
            'n' => Normalization::None,
            'c' => Normalization::Cosine,
            _ => return Err(bad()),
        };
        Ok(SmartCode { tf, idf, norm })
    }
}

impl fmt::Display for SmartCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tf = match self.tf {
            TfWeight::Natural => 'n',
            TfWeight::Logarithmic => 'l',
        };
        let idf = match self.idf {
            IdfWeight::Ignore => 'n',
            IdfWeight::Idf => 't',
        };
        let norm = match self.norm {
            Normalization::None => 'n',
            Normalization::Cosine => 'c',
        };
        write!(f, "{tf}{idf}{norm}")
    }
}

/// Vector space method: document code and query code, written `ddd.qqq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VsmMethod {
    pub document: SmartCode,
    pub query: SmartCode,
}

impl FromStr for VsmMethod {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        let (document, query) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| SearchError::invalid(format!("unknown ranking method `{s}`")))?;
        Ok(VsmMethod { document: document.parse()?, query: query.parse()? })
    }
}

impl fmt::Display for VsmMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.document, self.query)
    }
}

/// Smoothing of the unigram document model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    /// Dirichlet prior: (tf + alpha * cf / T) / (Ld + alpha)
    Bayes { alpha: f64 },
    /// Jelinek-Mercer: lambda * tf / Ld + (1 - lambda) * cf / T
    Mixture { lambda: f64 },
    /// Maximum likelihood: tf / Ld
    Naive,
}

impl Smoothing {
    /// Parses `bayes`, `mixture` or `naive` with the given parameters.
    pub fn parse(name: &str, alpha: f64, lambda: f64) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bayes" => {
                if !alpha.is_finite() || alpha < 0.0 {
                    return Err(SearchError::invalid(format!("alpha must be a non-negative number, got {alpha}")));
                }
                Ok(Smoothing::Bayes { alpha })
            }
            "mixture" => {
                if !(0.0..=1.0).contains(&lambda) {
                    return Err(SearchError::invalid(format!("lambda must lie in [0, 1], got {lambda}")));
                }
                Ok(Smoothing::Mixture { lambda })
            }
            "naive" => Ok(Smoothing::Naive),
            other => Err(SearchError::invalid(format!("unknown smoothing method `{other}`"))),
        }
    }

    fn probability(&self, tf: u32, doc_len: f64, cf: u64, total_len: f64) -> f64 {
        let tf = f64::from(tf);
        let collection = cf as f64 / total_len;
        match *self {
            Smoothing::Bayes { alpha } => (tf + alpha * collection) / (doc_len + alpha),
            Smoothing::Mixture { lambda } => lambda * (tf / doc_len) + (1.0 - lambda) * collection,
            Smoothing::Naive => tf / doc_len,
        }
    }
}

impl FromStr for Smoothing {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        Smoothing::parse(s, DEFAULT_ALPHA, DEFAULT_LAMBDA)
    }
}

/// Scores documents of one posting source.
#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    index: &'a FieldIndex,
    document_count: usize,
}

impl<'a> Scorer<'a> {
    pub fn new(index: &'a FieldIndex, document_count: usize) -> Self {
        Self { index, document_count }
    }

    /// Documents containing at least one query term.
    pub fn candidates(&self, query: &[String]) -> HashSet<&'a DocId> {
        query
            .iter()
            .filter_map(|term| self.index.postings(term))
            .flat_map(|postings| postings.keys())
            .collect()
    }

    /// Occurrences of each distinct query term.
    pub fn query_tfs<'q>(&self, query: &'q [String]) -> BTreeMap<&'q str, u32> {
        let mut tfs = BTreeMap::new();
        for term in query {
            *tfs.entry(term.as_str()).or_insert(0) += 1;
        }
        tfs
    }

    pub fn df(&self, term: &str) -> usize {
        self.index.document_frequency(term)
    }

    /// ln(N / df), or `None` when the term has no postings.
    pub fn idf(&self, term: &str) -> Option<f64> {
        let df = self.df(term);
        if df == 0 {
            return None;
        }
        if self.document_count < df {
            tracing::warn!(term, df, document_count = self.document_count, "document count below document frequency");
            return Some(0.0);
        }
        Some((self.document_count as f64 / df as f64).ln())
    }

    /// Dot product of the weighted query and document vectors over the query
    /// terms that occur in this source.
    pub fn vector_space(&self, query: &[String], method: &VsmMethod) -> ScoreMap {
        let terms: Vec<(&str, u32, f64)> = self
            .query_tfs(query)
            .into_iter()
            .filter_map(|(term, qtf)| self.idf(term).map(|idf| (term, qtf, idf)))
            .collect();
        if terms.is_empty() {
            return ScoreMap::new();
        }

        let mut query_weights: Vec<f64> = terms
            .iter()
            .map(|&(_, qtf, idf)| method.query.tf_weight(qtf) * method.query.idf_weight(idf))
            .collect();
        method.query.normalize(&mut query_weights);

        let mut candidates: Vec<&DocId> = terms
            .iter()
            .filter_map(|(term, _, _)| self.index.postings(term))
            .flat_map(|postings| postings.keys())
            .collect();
        candidates.sort_unstable();
        candidates.dedup();

        let mut doc_weights = vec![0.0; terms.len()];
        candidates
            .into_iter()
            .map(|doc_id| {
                for (slot, &(term, _, idf)) in doc_weights.iter_mut().zip(&terms) {
                    let tf = self.index.term_frequency(term, doc_id);
                    *slot = method.document.tf_weight(tf) * method.document.idf_weight(idf);
                }
                method.document.normalize(&mut doc_weights);
                let score: f64 = query_weights.iter().zip(&doc_weights).map(|(q, d)| q * d).sum();
                (doc_id.clone(), score)
            })
            .collect()
    }

    /// Okapi BM25 with fixed k1 and b. `avg_len` is the field's mean length.
    pub fn okapi_bm25(&self, query: &[String], avg_len: f64, lengths: &DocumentLengths) -> ScoreMap {
        let mut scores = ScoreMap::new();
        let usable_avg = avg_len.is_finite() && avg_len > 0.0;
        if !usable_avg {
            tracing::warn!(avg_len, "average field length unusable, BM25 contributions are zero");
        }
        let mut missing_lengths = 0usize;

        for term in self.query_tfs(query).into_keys() {
            let (Some(idf), Some(postings)) = (self.idf(term), self.index.postings(term)) else {
                continue;
            };
            for (doc_id, &tf) in postings {
                let entry = scores.entry(doc_id.clone()).or_insert(0.0);
                let Some(doc_len) = lengths.get(doc_id) else {
                    missing_lengths += 1;
                    continue;
                };
                if usable_avg {
                    *entry += bm25_term(idf, tf, doc_len as f64, avg_len);
                }
            }
        }
        if missing_lengths > 0 {
            tracing::warn!(missing_lengths, "documents without a length scored zero for BM25 terms");
        }
        scores
    }

    /// Product over query tokens of the smoothed probability of each token
    /// under the document's unigram model. Tokens absent from the whole source
    /// are skipped; documents of length zero are left out.
    pub fn unigram(&self, query: &[String], smoothing: Smoothing, lengths: &DocumentLengths) -> ScoreMap {
        let total_len = lengths.total();
        if total_len == 0 {
            tracing::warn!("field has no tokens, unigram model is undefined");
            return ScoreMap::new();
        }

        let terms: Vec<(&str, u64)> = query
            .iter()
            .map(|term| (term.as_str(), self.index.collection_frequency(term)))
            // a term unseen in the field is a zero factor for every document
            // under MLE; the smoothed models have no estimate for it
            .filter(|&(_, cf)| cf > 0 || smoothing == Smoothing::Naive)
            .collect();

        let mut scores = ScoreMap::new();
        let mut missing_lengths = 0usize;
        for doc_id in self.candidates(query) {
            let doc_len = match lengths.get(doc_id) {
                Some(0) => continue,
                Some(len) => len as f64,
                None => {
                    missing_lengths += 1;
                    continue;
                }
            };
            let score: f64 = terms
                .iter()
                .map(|&(term, cf)| {
                    let tf = self.index.term_frequency(term, doc_id);
                    smoothing.probability(tf, doc_len, cf, total_len as f64)
                })
                .product();
            scores.insert(doc_id.clone(), score);
        }
        if missing_lengths > 0 {
            tracing::warn!(missing_lengths, "documents without a length left out of unigram scores");
        }
        scores
    }
}

/// BM25 contribution of one term with frequency `tf` in a document of
/// length `doc_len`.
pub fn bm25_term(idf: f64, tf: u32, doc_len: f64, avg_len: f64) -> f64 {
    if tf == 0 {
        return 0.0;
    }
    let tf = f64::from(tf);
    idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len))
}
