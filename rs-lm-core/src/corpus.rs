use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::{list_files, read_lines};

/// A sentence is an ordered sequence of tokens, immutable once built.
pub type Sentence = Vec<String>;

/// Fraction of sentences held out as the test split (one out of ten).
const TEST_SPLIT_DENOMINATOR: usize = 10;

/// A loaded corpus snapshot: train/test sentence splits plus the
/// token-to-stem mapping gathered while reading the tagged source files.
///
/// # Invariants
/// - `train` is never empty for a corpus produced by `CorpusBuilder`
///   from non-empty source data
/// - The train/test split is deterministic for a fixed set of source files
/// - `stems` maps surface words to their lemmas; words without a lemma
///   are simply absent (they stem to themselves)
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Corpus {
	/// Training sentences, used to build count tables.
	pub train: Vec<Sentence>,
	/// Held-out sentences, used for evaluation when no external file is given.
	pub test: Vec<Sentence>,
	/// Surface word to lemma mapping.
	stems: HashMap<String, String>,
	/// Whether the sentences carry lemmas instead of surface words.
	stemmed: bool,
}

impl Corpus {
	/// Builds a corpus directly from pre-split sentences.
	///
	/// Intended for library users that already have tokenized text and do
	/// not need the tagged-file reader (no stemming support).
	pub fn from_sentences(train: Vec<Sentence>, test: Vec<Sentence>) -> Self {
		Self { train, test, stems: HashMap::new(), stemmed: false }
	}

	/// Builds a corpus from all of its parts, for corpus sources other
	/// than the tagged-file reader.
	///
	/// When `stemmed` is true the sentences are expected to already
	/// carry stems, and `stems` must map surface words onto them.
	pub fn from_parts(
		train: Vec<Sentence>,
		test: Vec<Sentence>,
		stems: HashMap<String, String>,
		stemmed: bool,
	) -> Self {
		Self { train, test, stems, stemmed }
	}

	/// Returns whether this corpus was built in stemmed mode.
	pub fn stemmed(&self) -> bool {
		self.stemmed
	}

	/// Maps every whitespace-separated token of `text` through the stem
	/// mapping, leaving unknown tokens unchanged.
	///
	/// The output has exactly one token per input token, so token
	/// positions correspond one-to-one with the input. `unscramble`
	/// relies on this to map a stemmed permutation back onto the
	/// original surface forms.
	pub fn stem(&self, text: &str) -> String {
		text.split_whitespace()
			.map(|w| self.stems.get(w).map(String::as_str).unwrap_or(w))
			.collect::<Vec<_>>()
			.join(" ")
	}

	/// Applies `stem` to every sentence of a slice.
	pub fn stem_sentences(&self, sentences: &[String]) -> Vec<String> {
		sentences.iter().map(|s| self.stem(s)).collect()
	}
}

/// Reads a tagged text corpus and turns it into a `Corpus` snapshot.
///
/// The source data is a directory of tab-separated files
/// (`<data>/wordLemPoS/*.txt`), one token per line: `word`, `lemma`,
/// `part-of-speech`.
///
/// # Responsibilities
/// - Filter noise tokens (NUL bytes, `#`/`@` markers)
/// - Split the token stream into sentences on terminal punctuation
/// - Produce either surface words or lemmas depending on `stemmed`
/// - Persist the built snapshot as a binary blob for fast reloading
///
/// # Notes
/// - The snapshot cache file is `corpus_stemmed.bin` or
///   `corpus_unstemmed.bin` under the data path, so the two modes never
///   collide.
pub struct CorpusBuilder {
	data_path: PathBuf,
	stemmed: bool,
}

impl CorpusBuilder {
	/// Creates a builder rooted at `data_path`.
	pub fn new<P: AsRef<Path>>(data_path: P, stemmed: bool) -> Self {
		Self { data_path: data_path.as_ref().to_path_buf(), stemmed }
	}

	/// Returns the data directory this builder reads from.
	pub fn data_path(&self) -> &Path {
		&self.data_path
	}

	/// Returns whether this builder produces stemmed sentences.
	pub fn stemmed(&self) -> bool {
		self.stemmed
	}

	/// Loads the corpus snapshot, building it from the tagged source
	/// files when no cached blob exists.
	///
	/// # Behavior
	/// - Cache hit: deserializes `corpus_*.bin` and returns it.
	/// - Cache miss (or unreadable blob): reads the source files, builds
	///   the snapshot, writes the blob, returns the fresh snapshot.
	///
	/// # Errors
	/// Returns an error if the source directory is missing or unreadable
	/// on a cache miss; a corrupt cache blob triggers a rebuild instead
	/// of an error.
	pub fn load_corpus(&self) -> Result<Corpus, Box<dyn std::error::Error>> {
		let cache = self.corpus_cache_path();
		if cache.exists() {
			match std::fs::read(&cache).ok().and_then(|bytes| postcard::from_bytes(&bytes).ok()) {
				Some(corpus) => {
					log::info!("Loaded corpus snapshot from {}", cache.display());
					return Ok(corpus);
				}
				None => log::warn!("Unreadable corpus snapshot {}, rebuilding", cache.display()),
			}
		}

		let corpus = self.build_corpus()?;
		let bytes = postcard::to_stdvec(&corpus)?;
		std::fs::write(&cache, bytes)?;
		log::info!(
			"Built corpus snapshot: {} train / {} test sentences",
			corpus.train.len(),
			corpus.test.len()
		);
		Ok(corpus)
	}

	/// Reads every tagged file and assembles the sentence list.
	fn build_corpus(&self) -> Result<Corpus, Box<dyn std::error::Error>> {
		let text_dir = self.data_path.join("wordLemPoS");
		let mut sentences: Vec<Sentence> = Vec::new();
		let mut stems: HashMap<String, String> = HashMap::new();

		for file in list_files(&text_dir, "txt")? {
			let mut sentence: Sentence = Vec::new();
			for line in read_lines(text_dir.join(&file))? {
				let clean = line.replace('\0', "");
				let mut fields = clean.split('\t');
				let word = fields.next().unwrap_or("");
				let lemma = fields.next().unwrap_or("");
				let pos = fields.next().unwrap_or("");

				if word.contains('#') || word.contains('@') {
					continue;
				}
				if pos.contains('.') || pos.contains('!') || pos.contains('?') {
					if !sentence.is_empty() {
						sentences.push(std::mem::take(&mut sentence));
					}
					continue;
				}
				if !lemma.is_empty() && word != lemma {
					stems.insert(word.to_owned(), lemma.to_owned());
				}
				if self.stemmed {
					if !lemma.is_empty() {
						sentence.push(lemma.to_owned());
					}
				} else if !word.is_empty() {
					sentence.push(word.to_owned());
				}
			}
			// A trailing run of tokens without terminal punctuation is
			// not a sentence and is dropped.
		}

		let test_len = sentences.len() / TEST_SPLIT_DENOMINATOR;
		let split = sentences.len() - test_len;
		let test = sentences.split_off(split.max(1).min(sentences.len()));

		Ok(Corpus { train: sentences, test, stems, stemmed: self.stemmed })
	}

	/// Path of the binary corpus snapshot for the current mode.
	pub fn corpus_cache_path(&self) -> PathBuf {
		let suffix = if self.stemmed { "stemmed" } else { "unstemmed" };
		self.data_path.join(format!("corpus_{}.bin", suffix))
	}

	/// Path of the binary count-table cache for a given maximum order.
	///
	/// The path is keyed by (order, stemmed flag) so that models of
	/// different configurations never read each other's tables.
	pub fn counts_cache_path(&self, n: usize) -> PathBuf {
		let suffix = if self.stemmed { "stemmed" } else { "unstemmed" };
		self.data_path.join(format!("{}gram_counts_{}.bin", n, suffix))
	}
}
