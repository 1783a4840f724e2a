use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::corpus::Sentence;

/// Reserved token marking the start of every sentence.
pub const START_TOKEN: &str = "__START__";
/// Reserved token marking the end of every sentence.
pub const END_TOKEN: &str = "__END__";

/// The pair of reserved boundary tokens wrapped around every sentence.
///
/// Passed explicitly into counting and model construction so corpora
/// using a different sentinel convention can be supported without
/// touching the counting code.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Sentinels {
	pub start: String,
	pub end: String,
}

impl Default for Sentinels {
	fn default() -> Self {
		Self { start: START_TOKEN.to_owned(), end: END_TOKEN.to_owned() }
	}
}

/// Frequency counts for every n-gram order `1..=n` over one training
/// corpus snapshot.
///
/// # Responsibilities
/// - Count every contiguous token window of length `k`, for each `k`,
///   over sentinel-padded sentences
/// - Merge partial counts built in parallel over corpus chunks
/// - Persist and reload the tables as a compact binary blob
///
/// # Invariants
/// - All orders are counted from the same sentence sequence
/// - The sum of order-1 counts equals the number of token occurrences
///   (sentinels included) in the corpus
/// - Every stored count is >= 1
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NGramCounts {
	/// The maximum order counted (highest n-gram length).
	n: usize,
	/// Boundary tokens wrapped around every sentence before counting.
	sentinels: Sentinels,
	/// Mapping from order to its n-gram count table.
	counts: HashMap<usize, HashMap<Vec<String>, u64>>,
}

impl NGramCounts {
	/// Counts all orders `1..=n` over `sentences` sequentially.
	///
	/// # Errors
	/// Returns an error if `n == 0`.
	pub fn from_sentences(n: usize, sentences: &[Sentence], sentinels: Sentinels) -> Result<Self, String> {
		if n == 0 {
			return Err("n-gram order must be >= 1".to_owned());
		}

		let mut counts: HashMap<usize, HashMap<Vec<String>, u64>> = HashMap::new();
		for k in 1..=n {
			counts.insert(k, HashMap::new());
		}

		let mut result = Self { n, sentinels, counts };
		for sentence in sentences {
			result.add_sentence(sentence);
		}
		Ok(result)
	}

	/// Counts all orders `1..=n` over `sentences`, splitting the work
	/// across threads and merging the partial tables.
	///
	/// Counting is an associative, commutative reduction, so the merged
	/// result is identical to a sequential count regardless of how the
	/// sentences are chunked.
	///
	/// # Errors
	/// Returns an error if `n == 0` or if a worker thread fails.
	pub fn build_parallel(n: usize, sentences: &[Sentence], sentinels: Sentinels) -> Result<Self, String> {
		if sentences.is_empty() {
			return Self::from_sentences(n, sentences, sentinels);
		}
		if n == 0 {
			return Err("n-gram order must be >= 1".to_owned());
		}

		let cpus = num_cpus::get();
		let factor = 8;
		let chunks = cpus * factor;
		let chunk_size = (sentences.len() + chunks - 1) / chunks;

		let (tx, rx) = mpsc::channel();
		thread::scope(|scope| {
			for chunk in sentences.chunks(chunk_size) {
				let tx = tx.clone();
				let sentinels = sentinels.clone();
				scope.spawn(move || {
					let partial = Self::from_sentences(n, chunk, sentinels);
					tx.send(partial).expect("Failed to send from thread");
				});
			}
			drop(tx);
		});

		let mut merged = Self::from_sentences(n, &[], sentinels)?;
		for partial in rx.iter() {
			merged.merge(&partial?)?;
		}
		Ok(merged)
	}

	/// Loads the count tables from a cache file, rebuilding them from
	/// `sentences` on a miss.
	///
	/// # Behavior
	/// - Cache hit: deserializes the blob; a blob whose order or
	///   sentinels do not match the request counts as a miss.
	/// - Cache miss: builds the tables in parallel, writes the blob and
	///   returns the fresh tables.
	///
	/// # Errors
	/// Returns an error on invalid `n` or if the rebuilt blob cannot be
	/// written. A corrupt cache file triggers a rebuild, not an error.
	pub fn build_or_load<P: AsRef<Path>>(
		n: usize,
		sentences: &[Sentence],
		cache_path: P,
		sentinels: Sentinels,
	) -> Result<Self, Box<dyn std::error::Error>> {
		let cache_path = cache_path.as_ref();
		if cache_path.exists() {
			let loaded: Option<Self> = std::fs::read(cache_path)
				.ok()
				.and_then(|bytes| postcard::from_bytes(&bytes).ok());
			match loaded {
				Some(counts) if counts.n == n && counts.sentinels == sentinels => {
					log::info!("Loaded {}-gram counts from {}", n, cache_path.display());
					return Ok(counts);
				}
				Some(_) => log::warn!("Stale count cache {}, rebuilding", cache_path.display()),
				None => log::warn!("Unreadable count cache {}, rebuilding", cache_path.display()),
			}
		}

		let counts = Self::build_parallel(n, sentences, sentinels)?;
		let bytes = postcard::to_stdvec(&counts)?;
		std::fs::write(cache_path, bytes)?;
		log::info!("Built {}-gram counts over {} sentences", n, sentences.len());
		Ok(counts)
	}

	/// Counts every window of every order over one sentinel-padded
	/// sentence.
	///
	/// A sentence shorter than `k - 2` (after padding) simply yields no
	/// windows at order `k`.
	fn add_sentence(&mut self, sentence: &[String]) {
		let mut padded: Vec<String> = Vec::with_capacity(sentence.len() + 2);
		padded.push(self.sentinels.start.clone());
		padded.extend(sentence.iter().cloned());
		padded.push(self.sentinels.end.clone());

		for k in 1..=self.n {
			// Should not panic, all orders 1..=n are initialized
			let table = self.counts.get_mut(&k).unwrap();
			for window in padded.windows(k) {
				*table.entry(window.to_vec()).or_insert(0) += 1;
			}
		}
	}

	/// Merges another count table set into this one.
	///
	/// Counts for matching n-gram keys are summed.
	///
	/// # Errors
	/// Returns an error if the orders or sentinels do not match.
	pub fn merge(&mut self, other: &Self) -> Result<(), String> {
		if self.n != other.n {
			return Err("N mismatch".to_owned());
		}
		if self.sentinels != other.sentinels {
			return Err("Sentinel mismatch".to_owned());
		}

		for (k, table) in &other.counts {
			let target = self.counts.entry(*k).or_default();
			for (key, count) in table {
				*target.entry(key.clone()).or_insert(0) += count;
			}
		}
		Ok(())
	}

	/// The maximum order counted.
	pub fn order(&self) -> usize {
		self.n
	}

	/// The sentinel tokens this table set was counted with.
	pub fn sentinels(&self) -> &Sentinels {
		&self.sentinels
	}

	/// Returns the count table for order `k`.
	///
	/// # Errors
	/// Returns an error for `k == 0` or `k` beyond the maximum order.
	pub fn get_counts(&self, k: usize) -> Result<&HashMap<Vec<String>, u64>, String> {
		self.counts
			.get(&k)
			.ok_or_else(|| format!("No counts for order {} (maximum order is {})", k, self.n))
	}

	/// Sum of all counts at order `k`, 0 for an order out of range.
	pub fn total(&self, k: usize) -> u64 {
		self.counts.get(&k).map(|t| t.values().sum()).unwrap_or(0)
	}

	/// Number of distinct unigrams (sentinels included).
	///
	/// Used by the smoothing schemes as the vocabulary size.
	pub fn vocab_size(&self) -> usize {
		self.counts.get(&1).map(|t| t.len()).unwrap_or(0)
	}
}
