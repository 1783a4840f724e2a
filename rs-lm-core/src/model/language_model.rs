use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::corpus::{Corpus, CorpusBuilder};
use crate::io::read_text;
use crate::model::counts::{NGramCounts, Sentinels};
use crate::model::permutation::Permutations;
use crate::model::probability::{ProbabilityTables, Smoothing};

/// Transient probability cache scoped to one scoring or unscrambling
/// invocation.
///
/// Keys are (visible tokens, effective order). Sentence-specific keys
/// never recur across unrelated calls, so the cache is created fresh
/// per call and dropped with it instead of growing without bound.
#[derive(Default)]
pub struct ScoreCache {
	entries: HashMap<(Vec<String>, usize), f64>,
}

impl ScoreCache {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of cached window probabilities.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether the cache is empty.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// A ready-to-score n-gram language model.
///
/// Construction builds (or reloads) the count tables over the training
/// split and derives the probability tables under the requested
/// smoothing scheme. A constructed model is immutable: every scoring
/// call is stateless apart from its own transient `ScoreCache`.
///
/// # Responsibilities
/// - Score a text's log-probability under the model
/// - Compute the perplexity of held-out text
/// - Unscramble a shuffled sentence by exhaustive permutation search
///
/// # Invariants
/// - `n >= 1` and the training split is non-empty
/// - Probability tables cover every order `1..=n`
pub struct NGramLanguageModel {
	n: usize,
	corpus: Corpus,
	sentinels: Sentinels,
	tables: ProbabilityTables,
}

impl NGramLanguageModel {
	/// Builds a model of order `n` over `corpus` with in-memory counting.
	///
	/// # Errors
	/// Fails fast on `n == 0`, an empty training split or invalid
	/// smoothing parameters; no partial model is returned.
	pub fn new(
		n: usize,
		smoothing: Smoothing,
		corpus: Corpus,
		sentinels: Sentinels,
	) -> Result<Self, Box<dyn std::error::Error>> {
		Self::check_construction(n, &corpus)?;
		let counts = NGramCounts::build_parallel(n, &corpus.train, sentinels.clone())?;
		Self::from_counts(corpus, sentinels, &counts, smoothing)
	}

	/// Builds a model of order `n`, reusing the count tables cached at
	/// `cache_path` when they match.
	///
	/// # Errors
	/// As `new`, plus cache write failures on a miss.
	pub fn with_count_cache<P: AsRef<Path>>(
		n: usize,
		smoothing: Smoothing,
		corpus: Corpus,
		sentinels: Sentinels,
		cache_path: P,
	) -> Result<Self, Box<dyn std::error::Error>> {
		Self::check_construction(n, &corpus)?;
		let counts = NGramCounts::build_or_load(n, &corpus.train, cache_path, sentinels.clone())?;
		Self::from_counts(corpus, sentinels, &counts, smoothing)
	}

	/// Loads the corpus through `builder` and builds a model with the
	/// builder's count cache location.
	///
	/// This is the construction path the command-line surface uses.
	pub fn from_builder(
		n: usize,
		smoothing: Smoothing,
		builder: &CorpusBuilder,
	) -> Result<Self, Box<dyn std::error::Error>> {
		let corpus = builder.load_corpus()?;
		let cache_path = builder.counts_cache_path(n);
		Self::with_count_cache(n, smoothing, corpus, Sentinels::default(), cache_path)
	}

	fn check_construction(n: usize, corpus: &Corpus) -> Result<(), String> {
		if n == 0 {
			return Err("n-gram order must be >= 1".to_owned());
		}
		if corpus.train.is_empty() {
			return Err("Training corpus is empty".to_owned());
		}
		Ok(())
	}

	fn from_counts(
		corpus: Corpus,
		sentinels: Sentinels,
		counts: &NGramCounts,
		smoothing: Smoothing,
	) -> Result<Self, Box<dyn std::error::Error>> {
		let tables = ProbabilityTables::new(counts, smoothing)?;
		Ok(Self { n: counts.order(), corpus, sentinels, tables })
	}

	/// The maximum n-gram order of the model.
	pub fn order(&self) -> usize {
		self.n
	}

	/// The smoothing scheme the model scores with.
	pub fn smoothing(&self) -> Smoothing {
		self.tables.smoothing()
	}

	/// The corpus snapshot the model was built over.
	pub fn corpus(&self) -> &Corpus {
		&self.corpus
	}

	/// Natural-log probability of `text` under the model.
	///
	/// The text is whitespace-tokenized, wrapped with the sentinel
	/// tokens and scored window by window. The first words are scored
	/// under progressively higher orders until full order `n` context
	/// is available. Any window resolving to probability 0 makes the
	/// whole text impossible and short-circuits to negative infinity.
	pub fn text_log_prob(&self, text: &str) -> f64 {
		let mut cache = ScoreCache::new();
		self.text_log_prob_cached(text, &mut cache)
	}

	/// As `text_log_prob`, sharing a caller-owned cache across calls
	/// within one invocation (perplexity over many sentences, the
	/// permutation search).
	fn text_log_prob_cached(&self, text: &str, cache: &mut ScoreCache) -> f64 {
		// Left-pad with "no token" slots so position p is scored at
		// effective order min(p, n).
		let mut padded: Vec<Option<String>> = vec![None; self.n - 1];
		padded.push(Some(self.sentinels.start.clone()));
		padded.extend(text.split_whitespace().map(|w| Some(w.to_owned())));
		padded.push(Some(self.sentinels.end.clone()));

		let mut running_log_prob = 0.0;
		for window in padded.windows(self.n) {
			let visible: Vec<String> = window.iter().flatten().cloned().collect();
			let order = visible.len();

			let key = (visible, order);
			let probability = match cache.entries.get(&key) {
				Some(&p) => p,
				None => {
					// The window construction keeps the order within
					// 1..=n, so the lookup cannot fail on the order.
					let p = self.tables.probability(&key.0).unwrap_or(0.0);
					cache.entries.insert(key, p);
					p
				}
			};

			if probability == 0.0 {
				return f64::NEG_INFINITY;
			}
			running_log_prob += probability.ln();
		}
		running_log_prob
	}

	/// Perplexity of an ordered sequence of sentences:
	/// `exp(-(1/T) * sum of sentence log-probabilities)` where `T`
	/// counts every token plus one start and one end sentinel per
	/// sentence.
	///
	/// A single impossible sentence drives the sum to negative
	/// infinity, which propagates through the exponential to positive
	/// infinity.
	pub fn perplexity(&self, sentences: &[String]) -> f64 {
		let text_len: usize = sentences.iter().map(|s| s.split_whitespace().count() + 2).sum();
		if text_len == 0 {
			return f64::INFINITY;
		}

		let mut cache = ScoreCache::new();
		let running_log_prob: f64 = sentences
			.iter()
			.map(|s| self.text_log_prob_cached(s, &mut cache))
			.sum();

		(-running_log_prob / text_len as f64).exp()
	}

	/// Perplexity of a single piece of text.
	pub fn perplexity_str(&self, text: &str) -> f64 {
		self.perplexity(std::slice::from_ref(&text.to_owned()))
	}

	/// Perplexity of an evaluation file, or of the corpus's own
	/// held-out test split when no file is given.
	///
	/// The file is split into sentences on `.` and stemmed when the
	/// model operates on a stemmed corpus.
	///
	/// # Errors
	/// Returns an error if the file cannot be read.
	pub fn evaluate(&self, test_file: Option<&Path>) -> Result<f64, Box<dyn std::error::Error>> {
		let sentences: Vec<String> = match test_file {
			None => self.corpus.test.iter().map(|s| s.join(" ")).collect(),
			Some(path) => {
				let text = read_text(path)?;
				let sentences: Vec<String> = text
					.split('.')
					.map(str::trim)
					.filter(|s| !s.is_empty())
					.map(str::to_owned)
					.collect();
				if self.corpus.stemmed() {
					self.corpus.stem_sentences(&sentences)
				} else {
					sentences
				}
			}
		};
		Ok(self.perplexity(&sentences))
	}

	/// Reorders the whitespace-separated tokens of `text` into the
	/// arrangement with the highest log-probability under the model.
	///
	/// Every permutation of the token positions is scored; the first
	/// strictly best arrangement wins, so the input order is kept when
	/// nothing beats it. For a stemmed model the search scores stemmed
	/// tokens but the returned sentence carries the original surface
	/// forms (token positions correspond one-to-one).
	///
	/// The search is exact and factorial in the token count; callers
	/// are expected to bound the input length.
	pub fn unscramble(&self, text: &str) -> String {
		// Fresh cache per call: permutations of one sentence share
		// sub-sequences heavily, unrelated calls share nothing.
		let mut cache = ScoreCache::new();

		let original: Vec<&str> = text.split_whitespace().collect();
		let scored: Vec<String> = if self.corpus.stemmed() {
			self.corpus.stem(text).split_whitespace().map(str::to_owned).collect()
		} else {
			original.iter().map(|w| (*w).to_owned()).collect()
		};

		let mut best: Vec<usize> = (0..original.len()).collect();
		let mut best_log_prob = f64::NEG_INFINITY;

		for permutation in Permutations::new(scored.len()) {
			let candidate = permutation
				.iter()
				.map(|&i| scored[i].as_str())
				.collect::<Vec<_>>()
				.join(" ");
			let log_prob = self.text_log_prob_cached(&candidate, &mut cache);
			if log_prob > best_log_prob {
				best = permutation;
				best_log_prob = log_prob;
			}
		}

		best.iter().map(|&i| original[i]).collect::<Vec<_>>().join(" ")
	}
}

impl fmt::Display for NGramLanguageModel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"Model: {}-gram; {}; {}",
			self.n,
			if self.corpus.stemmed() { "Stemmed" } else { "Unstemmed" },
			self.tables.smoothing()
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::corpus::Sentence;
	use std::collections::HashMap;
	use std::io::Write;

	fn sentences(raw: &[&str]) -> Vec<Sentence> {
		raw.iter()
			.map(|s| s.split_whitespace().map(str::to_owned).collect())
			.collect()
	}

	fn model(train: &[&str], n: usize, smoothing: Smoothing) -> NGramLanguageModel {
		let corpus = Corpus::from_sentences(sentences(train), Vec::new());
		NGramLanguageModel::new(n, smoothing, corpus, Sentinels::default()).unwrap()
	}

	#[test]
	fn construction_fails_fast_on_bad_configuration() {
		let corpus = Corpus::from_sentences(sentences(&["a b"]), Vec::new());
		assert!(
			NGramLanguageModel::new(0, Smoothing::Raw, corpus.clone(), Sentinels::default())
				.is_err()
		);
		assert!(
			NGramLanguageModel::new(
				2,
				Smoothing::AbsoluteDiscount { d: 2.0 },
				corpus,
				Sentinels::default()
			)
			.is_err()
		);

		let empty = Corpus::from_sentences(Vec::new(), Vec::new());
		assert!(NGramLanguageModel::new(1, Smoothing::Raw, empty, Sentinels::default()).is_err());
	}

	#[test]
	fn log_prob_is_the_sum_of_window_log_probabilities() {
		// One-sentence corpus, order 2, raw counts. Left padding makes
		// the first window the unigram (START) with probability 1/5;
		// the four bigram windows (START the), (the cat), (cat sat),
		// (sat END) each have probability 1/4.
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		let expected = (0.2_f64).ln() + 4.0 * (0.25_f64).ln();
		let got = lm.text_log_prob("the cat sat");
		assert!((got - expected).abs() < 1e-12, "got {}", got);
	}

	#[test]
	fn log_prob_round_trips_through_exp() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		let product = 0.2 * 0.25_f64.powi(4);
		assert!((lm.text_log_prob("the cat sat").exp() - product).abs() < 1e-12);
	}

	#[test]
	fn unseen_window_short_circuits_to_negative_infinity() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		assert_eq!(lm.text_log_prob("the dog sat"), f64::NEG_INFINITY);
	}

	#[test]
	fn early_words_use_lower_orders() {
		// Order 3 over a single sentence: the first window is the
		// unigram (START), the second the bigram (START, the), then
		// full trigrams. All are seen, so the score is finite.
		let lm = model(&["the cat sat"], 3, Smoothing::Raw);
		assert!(lm.text_log_prob("the cat sat").is_finite());
	}

	#[test]
	fn perplexity_matches_the_closed_form() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		// T = 3 tokens + 2 sentinels; log prob = ln(1/5) + 4 ln(1/4).
		let expected = (-(0.2_f64.ln() + 4.0 * 0.25_f64.ln()) / 5.0).exp();
		let got = lm.perplexity_str("the cat sat");
		assert!((got - expected).abs() < 1e-9, "got {}", got);
	}

	#[test]
	fn impossible_sentence_makes_perplexity_infinite() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		assert_eq!(lm.perplexity_str("the dog sat"), f64::INFINITY);

		// One impossible sentence dominates a batch.
		let batch = vec!["the cat sat".to_owned(), "the dog sat".to_owned()];
		assert_eq!(lm.perplexity(&batch), f64::INFINITY);
	}

	#[test]
	fn empty_sentence_list_has_infinite_perplexity() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		assert_eq!(lm.perplexity(&[]), f64::INFINITY);
	}

	#[test]
	fn laplace_perplexity_is_monotone_in_k() {
		let train = &["a b c d e"];
		let text = "a b c d e";
		let small = model(train, 2, Smoothing::Laplace { k: 1 }).perplexity_str(text);
		let large = model(train, 2, Smoothing::Laplace { k: 5 }).perplexity_str(text);
		assert!(large > small, "k=5 gave {} <= k=1's {}", large, small);
	}

	#[test]
	fn discount_perplexity_falls_as_d_grows_on_unseen_text() {
		let train = &["a b c d e"];
		// Every window of "c a" is unseen, so only the fallback mass
		// matters and a larger discount frees more of it.
		let text = "c a";
		let low = model(train, 2, Smoothing::AbsoluteDiscount { d: 0.1 }).perplexity_str(text);
		let high = model(train, 2, Smoothing::AbsoluteDiscount { d: 0.5 }).perplexity_str(text);
		assert!(high < low, "D=0.5 gave {} >= D=0.1's {}", high, low);
	}

	#[test]
	fn unscramble_single_word_returns_it_unchanged() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		assert_eq!(lm.unscramble("cat"), "cat");
		// Even a word the model has never seen: the identity is the
		// only permutation.
		assert_eq!(lm.unscramble("zebra"), "zebra");
	}

	#[test]
	fn unscramble_recovers_the_training_order() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		assert_eq!(lm.unscramble("cat sat the"), "the cat sat");
		assert_eq!(lm.unscramble("sat the cat"), "the cat sat");
	}

	#[test]
	fn unscramble_keeps_an_already_ordered_sentence() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		assert_eq!(lm.unscramble("the cat sat"), "the cat sat");
	}

	#[test]
	fn stemmed_unscramble_returns_surface_forms() {
		let mut stems = HashMap::new();
		stems.insert("cats".to_owned(), "cat".to_owned());
		stems.insert("sat".to_owned(), "sit".to_owned());
		let corpus =
			Corpus::from_parts(sentences(&["the cat sit"]), Vec::new(), stems, true);
		let lm =
			NGramLanguageModel::new(2, Smoothing::Raw, corpus, Sentinels::default()).unwrap();

		// Scoring happens over "the cat sit", output keeps "cats sat".
		assert_eq!(lm.unscramble("cats sat the"), "the cats sat");
	}

	#[test]
	fn evaluate_uses_the_held_out_split_by_default() {
		let corpus =
			Corpus::from_sentences(sentences(&["the cat sat"]), sentences(&["the cat sat"]));
		let lm =
			NGramLanguageModel::new(2, Smoothing::Raw, corpus, Sentinels::default()).unwrap();
		let expected = (-(0.2_f64.ln() + 4.0 * 0.25_f64.ln()) / 5.0).exp();
		assert!((lm.evaluate(None).unwrap() - expected).abs() < 1e-9);
	}

	#[test]
	fn evaluate_reads_and_splits_a_file_on_periods() {
		let lm = model(&["the cat sat"], 2, Smoothing::Raw);
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("eval.txt");
		let mut f = std::fs::File::create(&path).unwrap();
		write!(f, "the cat sat. the cat sat.").unwrap();
		drop(f);

		let single = lm.evaluate(Some(&path)).unwrap();
		let expected = (-(2.0 * (0.2_f64.ln() + 4.0 * 0.25_f64.ln())) / 10.0).exp();
		assert!((single - expected).abs() < 1e-9);

		assert!(lm.evaluate(Some(Path::new("no/such/file.txt"))).is_err());
	}

	#[test]
	fn from_builder_builds_and_caches_everything() {
		let dir = tempfile::tempdir().unwrap();
		let text_dir = dir.path().join("wordLemPoS");
		std::fs::create_dir_all(&text_dir).unwrap();
		let mut f = std::fs::File::create(text_dir.join("a.txt")).unwrap();
		for (word, lemma, pos) in
			[("the", "the", "at"), ("cat", "cat", "nn"), ("sat", "sit", "vb"), (".", ".", ".")]
		{
			writeln!(f, "{}\t{}\t{}", word, lemma, pos).unwrap();
		}
		drop(f);

		let builder = crate::corpus::CorpusBuilder::new(dir.path(), false);
		let lm =
			NGramLanguageModel::from_builder(2, Smoothing::Laplace { k: 1 }, &builder).unwrap();

		assert!(builder.corpus_cache_path().exists());
		assert!(builder.counts_cache_path(2).exists());
		assert!(lm.perplexity_str("the cat sat").is_finite());

		// A second construction reuses both caches and scores identically.
		let again =
			NGramLanguageModel::from_builder(2, Smoothing::Laplace { k: 1 }, &builder).unwrap();
		assert_eq!(
			lm.text_log_prob("the cat sat"),
			again.text_log_prob("the cat sat")
		);
	}

	#[test]
	fn model_description_names_order_and_scheme() {
		let lm = model(&["a b"], 3, Smoothing::Laplace { k: 2 });
		assert_eq!(lm.to_string(), "Model: 3-gram; Unstemmed; Laplace(k=2)");
	}
}
