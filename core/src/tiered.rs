//! Importance tiers over each field index.
//!
//! Every term's postings are ordered by (term frequency desc, doc id asc) and
//! cut into three consecutive slices of `ceil(n / 3)`, `ceil(n / 3)` and the
//! remainder. Each tier is itself a [`FieldIndex`], so the scorer consumes a
//! tier exactly like a full index.

use crate::error::{Result, SearchError};
use crate::field::{Field, PerField};
use crate::index::{FieldIndex, Index};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    First,
    Second,
    Third,
}

impl Tier {
    /// Scan order for unsafe ranking.
    pub const ALL: [Tier; 3] = [Tier::First, Tier::Second, Tier::Third];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::First => "first_tier",
            Tier::Second => "second_tier",
            Tier::Third => "third_tier",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first_tier" | "first" => Ok(Tier::First),
            "second_tier" | "second" => Ok(Tier::Second),
            "third_tier" | "third" => Ok(Tier::Third),
            other => Err(SearchError::invalid(format!("unknown tier `{other}`"))),
        }
    }
}

/// Three tiers of one field, persisted as `<field>_tiered_index.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTiers {
    #[serde(default)]
    pub first_tier: FieldIndex,
    #[serde(default)]
    pub second_tier: FieldIndex,
    #[serde(default)]
    pub third_tier: FieldIndex,
}

impl FieldTiers {
    pub fn build(index: &FieldIndex) -> Self {
        let mut tiers = FieldTiers::default();
        for (term, postings) in index.terms() {
            let mut ranked: Vec<(&String, u32)> = postings.iter().map(|(doc, &tf)| (doc, tf)).collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

            let [first, second, _] = tier_sizes(ranked.len());
            for (rank, (doc_id, tf)) in ranked.into_iter().enumerate() {
                let tier = if rank < first {
                    &mut tiers.first_tier
                } else if rank < first + second {
                    &mut tiers.second_tier
                } else {
                    &mut tiers.third_tier
                };
                tier.insert_posting(term.as_str(), doc_id.as_str(), tf);
            }
        }
        tiers
    }

    pub fn get(&self, tier: Tier) -> &FieldIndex {
        match tier {
            Tier::First => &self.first_tier,
            Tier::Second => &self.second_tier,
            Tier::Third => &self.third_tier,
        }
    }
}

/// Sizes of the three tiers for a posting list of length `n`.
pub fn tier_sizes(n: usize) -> [usize; 3] {
    let chunk = n.div_ceil(3);
    let first = chunk.min(n);
    let second = chunk.min(n - first);
    [first, second, n - first - second]
}

/// Tiers for every text field. Derived from a built [`Index`]; rebuild after
/// mutations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TieredIndex {
    fields: PerField<FieldTiers>,
}

impl TieredIndex {
    pub fn build(index: &Index) -> Self {
        let fields = PerField::from_fn(|field| {
            index.field(field).map(FieldTiers::build).unwrap_or_default()
        });
        tracing::info!(
            stars_terms = index.fields().stars.len(),
            genres_terms = index.fields().genres.len(),
            summaries_terms = index.fields().summaries.len(),
            "built tiered index"
        );
        Self { fields }
    }

    pub fn from_parts(fields: PerField<FieldTiers>) -> Self {
        Self { fields }
    }

    pub fn field(&self, field: Field) -> Result<&FieldTiers> {
        self.fields.get(field)
    }

    /// The postings of `field` restricted to `tier`, shaped like a field index.
    pub fn tier(&self, field: Field, tier: Tier) -> Result<&FieldIndex> {
        Ok(self.field(field)?.get(tier))
    }
}
