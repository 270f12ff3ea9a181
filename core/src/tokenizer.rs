use crate::document::Document;
use crate::field::TEXT_FIELDS;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref LINK: Regex = Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("valid regex");
    static ref WORD: Regex = Regex::new(r"(?u)\p{L}[\p{L}\p{N}_']*").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","aren't","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","can't","cannot","could","couldn't",
            "did","didn't","do","does","doesn't","doing","don't","down","during",
            "each","few","for","from","further",
            "had","hadn't","has","hasn't","have","haven't","having","he","he'd","he'll","he's","her","here","here's","hers","herself","him","himself","his","how","how's",
            "i","i'd","i'll","i'm","i've","if","in","into","is","isn't","it","it's","its","itself",
            "let's","me","more","most","mustn't","my","myself",
            "no","nor","not","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "same","she","she'd","she'll","she's","should","shouldn't","so","some","such",
            "than","that","that's","the","their","theirs","them","themselves","then","there","there's","these","they","they'd","they'll","they're","they've","this","those","through","to","too",
            "under","until","up","very",
            "was","wasn't","we","we'd","we'll","we're","we've","were","weren't","what","what's","when","when's","where","where's","which","while","who","who's","whom","why","why's","with","won't","would","wouldn't",
            "you","you'd","you'll","you're","you've","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Turns raw text into normalized tokens. Implementations must be
/// deterministic and must not depend on any index state, since documents and
/// queries go through the same preprocessor at different times.
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, raw: &str) -> Vec<String>;
}

/// Link and punctuation stripping, NFKC normalization, lowercasing, stopword
/// removal and English stemming.
#[derive(Debug, Clone, Copy)]
pub struct StandardPreprocessor {
    pub stem: bool,
}

impl Default for StandardPreprocessor {
    fn default() -> Self {
        Self { stem: true }
    }
}

impl Preprocessor for StandardPreprocessor {
    fn preprocess(&self, raw: &str) -> Vec<String> {
        tokenize(raw)
            .into_iter()
            .map(|token| if self.stem { STEMMER.stem(&token).into_owned() } else { token })
            .collect()
    }
}

impl StandardPreprocessor {
    /// Preprocesses every entry of every text field of a raw record. Each
    /// entry becomes a space-joined token run; other keys are left untouched.
    pub fn preprocess_document(&self, mut doc: Document) -> Document {
        for field in TEXT_FIELDS {
            if let Some(entries) = doc.entries_mut(field) {
                for entry in entries.iter_mut() {
                    *entry = self.preprocess(entry).join(" ");
                }
            }
        }
        doc
    }
}

fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Lowercased, stopword-free words of `text` with links removed, unstemmed.
pub fn tokenize(text: &str) -> Vec<String> {
    let without_links = LINK.replace_all(text, " ");
    let normalized = without_links.nfkc().collect::<String>().to_lowercase();
    WORD.find_iter(&normalized)
        .map(|m| m.as_str().trim_end_matches('\''))
        .filter(|token| !token.is_empty() && !is_stopword(token))
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    #[test]
    fn stems_inflected_forms() {
        let t = StandardPreprocessor::default().preprocess("Running, runner's run!");
        assert!(t.iter().any(|w| w == "run"));
    }

    #[test]
    fn strips_links() {
        let t = tokenize("see https://example.com/movie?id=1 or www.imdb.com now");
        assert_eq!(t, vec!["see", "now"]);
    }

    #[test]
    fn preprocess_document_keeps_entry_structure() {
        let doc = Document::new("1").with_field(Field::Stars, &["Tim Robbins", "The Morgan Freeman"]);
        let doc = StandardPreprocessor { stem: false }.preprocess_document(doc);
        assert_eq!(doc.stars.unwrap(), vec!["tim robbins", "morgan freeman"]);
        assert!(doc.genres.is_none());
    }
}
