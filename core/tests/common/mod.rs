#![allow(dead_code)]

use cinesearch_core::{Document, Field};

pub fn movie(id: &str, stars: &[&str], genres: &[&str], summaries: &[&str]) -> Document {
    let mut doc = Document::new(id);
    if !stars.is_empty() {
        doc = doc.with_field(Field::Stars, stars);
    }
    if !genres.is_empty() {
        doc = doc.with_field(Field::Genres, genres);
    }
    if !summaries.is_empty() {
        doc = doc.with_field(Field::Summaries, summaries);
    }
    doc
}

/// A handful of films with overlapping cast, genres and plot words.
pub fn corpus() -> Vec<Document> {
    vec![
        movie("tt0111161", &["tim robbins", "morgan freeman"], &["drama"], &["banker imprisoned prison hope", "good friendship"]),
        movie("tt0068646", &["marlon brando", "al pacino"], &["crime", "drama"], &["aging patriarch crime dynasty"]),
        movie("tt0468569", &["christian bale", "heath ledger"], &["action", "crime", "drama"], &["batman joker chaos gotham crime"]),
        movie("tt0071562", &["al pacino", "robert de niro"], &["crime", "drama"], &["young vito corleone crime family"]),
        movie("tt0110912", &["john travolta", "uma thurman"], &["crime", "drama"], &["good hitmen boxer crime crime"]),
        movie("tt0109830", &["tom hanks"], &["drama", "romance"], &["good slow man history"]),
        movie("tt0133093", &["keanu reeves", "laurence fishburne"], &["action", "sci fi"], &[]),
    ]
}

pub fn tokens(terms: &[&str]) -> Vec<String> {
    terms.iter().map(|t| t.to_string()).collect()
}
