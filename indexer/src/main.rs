use anyhow::{bail, Context, Result};
use cinesearch_core::persist::{load_catalog, load_corpus, load_index, save_catalog, save_corpus, IndexPaths};
use cinesearch_core::{
    Catalog, Document, Field, FieldWeights, Index, RankingMethod, SearchRequest, StandardPreprocessor, TEXT_FIELDS,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, check and query the movie field indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a raw crawl (JSON array of records) into preprocessed_data.json
    Preprocess {
        /// Raw crawler output
        #[arg(long)]
        input: PathBuf,
        /// Destination corpus file
        #[arg(long, default_value = "./index/preprocessed_data.json")]
        output: PathBuf,
        /// Keep whole words instead of stems
        #[arg(long, default_value_t = false)]
        no_stem: bool,
    },
    /// Build every index artifact from a preprocessed corpus
    Build {
        /// Preprocessed corpus; defaults to <output>/preprocessed_data.json
        #[arg(long)]
        input: Option<PathBuf>,
        /// Output index directory
        #[arg(long, default_value = "./index")]
        output: PathBuf,
    },
    /// Verify posting lists against a scan and the add/remove round trip
    Check {
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: PathBuf,
        /// Terms to verify; defaults to every indexed term
        #[arg(long)]
        term: Vec<String>,
    },
    /// Run one query against a built index
    Search {
        #[arg(long, default_value = "./index")]
        index: PathBuf,
        /// Raw query text
        #[arg(long)]
        query: String,
        /// ddd.qqq SMART code, okapibm25 or unigram
        #[arg(long, default_value = "lnc.ltc")]
        method: String,
        /// bayes, mixture or naive (unigram only)
        #[arg(long)]
        smoothing: Option<String>,
        #[arg(long, default_value_t = 0.5)]
        alpha: f64,
        #[arg(long, default_value_t = 0.5)]
        lambda: f64,
        /// e.g. stars=1,genres=1,summaries=1
        #[arg(long, default_value = "stars=1,genres=1,summaries=1")]
        weights: String,
        /// Scan the tiered index instead of the full index
        #[arg(long = "unsafe", default_value_t = false)]
        tiered: bool,
        #[arg(long, default_value_t = 10)]
        max_results: usize,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Preprocess { input, output, no_stem } => preprocess(&input, &output, !no_stem),
        Commands::Build { input, output } => build_index(input, &output),
        Commands::Check { index, term } => check_index(&index, &term),
        Commands::Search { index, query, method, smoothing, alpha, lambda, weights, tiered, max_results } => {
            let method = RankingMethod::parse(&method, smoothing.as_deref(), alpha, lambda)?;
            let weights: FieldWeights = weights.parse()?;
            let catalog = load_catalog(&IndexPaths::new(&index))?;
            let request = SearchRequest::from_text(&query, &StandardPreprocessor::default(), method)
                .weights(weights)
                .safe_ranking(!tiered)
                .max_results(Some(max_results));
            for (rank, hit) in catalog.search(&request)?.into_iter().enumerate() {
                println!("{:>3}  {:<16} {:.6}", rank + 1, hit.doc_id, hit.score);
            }
            Ok(())
        }
    }
}

fn preprocess(input: &Path, output: &Path, stem: bool) -> Result<()> {
    let raw = load_corpus(input).with_context(|| format!("reading raw corpus {}", input.display()))?;
    let preprocessor = StandardPreprocessor { stem };
    let docs: Vec<Document> = raw.into_iter().map(|doc| preprocessor.preprocess_document(doc)).collect();
    save_corpus(output, &docs)?;
    tracing::info!(documents = docs.len(), output = %output.display(), "preprocessed corpus");
    Ok(())
}

fn build_index(input: Option<PathBuf>, output: &Path) -> Result<()> {
    let paths = IndexPaths::new(output);
    let input = input.unwrap_or_else(|| paths.preprocessed_data());
    let docs = load_corpus(&input).with_context(|| format!("reading corpus {}", input.display()))?;
    tracing::info!(documents = docs.len(), input = %input.display(), "ingested documents");

    let catalog = Catalog::build(Index::build(docs));
    save_catalog(&paths, &catalog)?;
    tracing::info!(output = %output.display(), "index build complete");
    Ok(())
}

fn check_index(root: &Path, terms: &[String]) -> Result<()> {
    let mut index = load_index(&IndexPaths::new(root))?;
    let mut failures = 0usize;
    let mut checked = 0usize;

    for field in TEXT_FIELDS {
        let field_terms: Vec<String> = if terms.is_empty() {
            index.field(field)?.terms().map(|(t, _)| t.clone()).collect()
        } else {
            terms.to_vec()
        };
        for term in field_terms {
            checked += 1;
            if !index.verify_postings(field, &term)? {
                failures += 1;
                tracing::warn!(%field, %term, "posting list disagrees with document scan");
            }
        }
    }
    println!("posting lists: {} checked, {} wrong", checked, failures);

    let probe = Document::new("__index_check_probe__")
        .with_field(Field::Stars, &["tim", "henry"])
        .with_field(Field::Genres, &["drama", "crime"])
        .with_field(Field::Summaries, &["good"]);
    let round_trip = index.verify_add_remove(probe)?;
    println!("add/remove round trip: {}", if round_trip { "correct" } else { "incorrect" });

    if failures > 0 || !round_trip {
        bail!("index check failed");
    }
    Ok(())
}
