//! Command-line surface for the n-gram language model.
//!
//! Two mutually exclusive modes:
//! - `--evaluate <file>`: report the perplexity of a text file, or of
//!   the corpus's own held-out test split when the file argument is the
//!   sentinel `TEST_CORPUS`.
//! - `--unscramble <file>`: read one scrambled sentence and report the
//!   original text, the unscrambled text, both perplexities and both
//!   log-probabilities.
//!
//! The smoothing scheme is chosen with a subcommand (`raw`, `laplace`,
//! `abs-dis`), each carrying its own parameters.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use rs_lm_core::corpus::CorpusBuilder;
use rs_lm_core::model::language_model::NGramLanguageModel;
use rs_lm_core::model::probability::Smoothing;

/// File argument value selecting the corpus's own test split.
const TEST_CORPUS: &str = "TEST_CORPUS";

#[derive(Parser, Debug)]
#[command(name = "rs-lm")]
#[command(about = "N-gram language model: perplexity evaluation and sentence unscrambling")]
#[command(version)]
struct Args {
    /// File to evaluate the model on; use TEST_CORPUS for the corpus's
    /// own held-out test set
    #[arg(long, value_name = "FILE", conflicts_with = "unscramble", required_unless_present = "unscramble")]
    evaluate: Option<String>,

    /// File containing one scrambled sentence to reorder
    #[arg(long, value_name = "FILE")]
    unscramble: Option<PathBuf>,

    /// N-gram order of the model
    #[arg(short = 'n', long = "order", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    order: u32,

    /// Use the stemmed corpus
    #[arg(short, long)]
    stemmed: bool,

    /// Corpus data directory
    #[arg(long, default_value = "data")]
    data: PathBuf,

    #[command(subcommand)]
    smoothing: Option<SmoothingArgs>,
}

#[derive(Subcommand, Debug)]
enum SmoothingArgs {
    /// Raw maximum-likelihood probabilities, no smoothing
    Raw,
    /// Laplace (add-k) smoothing
    Laplace {
        /// Amount to adjust counts by
        #[arg(short, long, default_value_t = 1)]
        k: u64,
    },
    /// Absolute discounting
    AbsDis {
        /// Probability mass set aside for unseen n-grams, in [0, 1]
        #[arg(short = 'D', long = "D", default_value_t = 0.3)]
        d: f64,
    },
}

impl SmoothingArgs {
    fn to_smoothing(&self) -> Smoothing {
        match self {
            Self::Raw => Smoothing::Raw,
            Self::Laplace { k } => Smoothing::Laplace { k: *k },
            Self::AbsDis { d } => Smoothing::AbsoluteDiscount { d: *d },
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let smoothing = args
        .smoothing
        .as_ref()
        .map(SmoothingArgs::to_smoothing)
        .unwrap_or(Smoothing::Raw);

    let builder = CorpusBuilder::new(&args.data, args.stemmed);
    let model = NGramLanguageModel::from_builder(args.order as usize, smoothing, &builder)?;
    println!("{}", model);

    if let Some(evaluate) = args.evaluate.as_deref() {
        let test_file = if evaluate == TEST_CORPUS { None } else { Some(Path::new(evaluate)) };
        let perplexity = model.evaluate(test_file)?;
        println!("Perplexity: {}", perplexity);
    } else if let Some(unscramble) = args.unscramble.as_deref() {
        let text = fs::read_to_string(unscramble)?.trim().to_owned();
        let unscrambled = model.unscramble(&text);

        println!("Original text: {}", text);
        println!("Unscrambled sentence: {}", unscrambled);
        println!(
            "Original perplexity: {}; Unscrambled perplexity: {}",
            model.perplexity_str(&text),
            model.perplexity_str(&unscrambled)
        );
        println!("Original log-probability: {}", model.text_log_prob(&text));
        println!("Unscrambled log-probability: {}", model.text_log_prob(&unscrambled));
    }

    Ok(())
}
