use std::collections::HashMap;
use std::fmt;

use crate::model::counts::NGramCounts;

/// Closed set of probability smoothing schemes.
///
/// Each variant carries its own parameters; estimation dispatches over
/// this enum explicitly, so adding a scheme is a compile-checked change.
///
/// # Variants
/// - `Raw`: maximum likelihood, no mass for unseen n-grams.
/// - `Laplace { k }`: add-k smoothing, pseudo-count `k >= 0`.
/// - `AbsoluteDiscount { d }`: subtracts `d` in `[0, 1]` from every seen
///   count and spreads the freed mass uniformly over unseen n-grams.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Smoothing {
	Raw,
	Laplace { k: u64 },
	AbsoluteDiscount { d: f64 },
}

impl Smoothing {
	/// Checks the scheme parameters.
	///
	/// # Errors
	/// Returns an error for a discount outside `[0, 1]`.
	pub fn validate(&self) -> Result<(), String> {
		match self {
			Self::Raw | Self::Laplace { .. } => Ok(()),
			Self::AbsoluteDiscount { d } => {
				if (0.0..=1.0).contains(d) {
					Ok(())
				} else {
					Err(format!("Discount must be between 0.0 and 1.0, got {}", d))
				}
			}
		}
	}
}

impl fmt::Display for Smoothing {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Raw => write!(f, "Raw"),
			Self::Laplace { k } => write!(f, "Laplace(k={})", k),
			Self::AbsoluteDiscount { d } => write!(f, "AbsoluteDiscount(D={})", d),
		}
	}
}

/// Per-order probability tables derived from count tables under one
/// smoothing scheme.
///
/// # Responsibilities
/// - Materialize the seen-n-gram probabilities for every order
/// - Compute the per-order fallback scalar substituted for unseen
///   n-grams (smoothed schemes only)
/// - Answer exact and partial-prefix probability queries
///
/// # Invariants
/// - Tables are immutable after construction; identical queries always
///   return identical results
/// - Only seen n-grams are stored. The unseen space is covered by one
///   scalar per order, never materialized per key
#[derive(Clone, Debug)]
pub struct ProbabilityTables {
	/// The maximum order with a table.
	n: usize,
	/// The scheme the tables were derived under.
	smoothing: Smoothing,
	/// Mapping from order to its seen-n-gram probability table.
	probs: HashMap<usize, HashMap<Vec<String>, f64>>,
	/// Mapping from order to the fallback probability for unseen
	/// n-grams. Absent for the raw scheme.
	fallback: HashMap<usize, f64>,
}

impl ProbabilityTables {
	/// Derives probability tables for every order of `counts`.
	///
	/// # Errors
	/// Returns an error for invalid scheme parameters.
	pub fn new(counts: &NGramCounts, smoothing: Smoothing) -> Result<Self, String> {
		smoothing.validate()?;

		let n = counts.order();
		let vocab = counts.vocab_size();
		let mut probs: HashMap<usize, HashMap<Vec<String>, f64>> = HashMap::new();
		let mut fallback: HashMap<usize, f64> = HashMap::new();

		for i in 1..=n {
			let table = counts.get_counts(i)?;
			let total = counts.total(i) as f64;
			let possible = possible_arrangements(vocab, i);

			let mut order_probs: HashMap<Vec<String>, f64> = HashMap::with_capacity(table.len());
			match smoothing {
				Smoothing::Raw => {
					if total > 0.0 {
						for (key, &count) in table {
							order_probs.insert(key.clone(), count as f64 / total);
						}
					}
				}
				Smoothing::Laplace { k } => {
					let denominator = total + possible * k as f64;
					if denominator > 0.0 {
						for (key, &count) in table {
							order_probs.insert(key.clone(), (count + k) as f64 / denominator);
						}
						fallback.insert(i, k as f64 / denominator);
					}
				}
				Smoothing::AbsoluteDiscount { d } => {
					if total > 0.0 {
						for (key, &count) in table {
							order_probs.insert(key.clone(), (count as f64 - d) / total);
						}
					}
					let unseen = possible - table.len() as f64;
					fallback.insert(i, if unseen > 0.0 { d / unseen } else { 0.0 });
				}
			}
			probs.insert(i, order_probs);
		}

		Ok(Self { n, smoothing, probs, fallback })
	}

	/// The maximum order with a table.
	pub fn order(&self) -> usize {
		self.n
	}

	/// The smoothing scheme the tables were derived under.
	pub fn smoothing(&self) -> Smoothing {
		self.smoothing
	}

	/// The fallback probability for unseen n-grams at `order`, if the
	/// scheme defines one.
	pub fn fallback(&self, order: usize) -> Option<f64> {
		self.fallback.get(&order).copied()
	}

	/// Resolves the probability of one full n-gram; the order is the
	/// key length.
	///
	/// The fallback scalar is substituted whenever the exact key is
	/// absent or carries zero stored mass. Under the raw scheme an
	/// unseen n-gram resolves to 0.0, which callers interpret as an
	/// impossible event.
	///
	/// # Errors
	/// Returns an error for an empty key or one longer than the maximum
	/// order.
	pub fn probability(&self, ngram: &[String]) -> Result<f64, String> {
		let order = ngram.len();
		let table = self
			.probs
			.get(&order)
			.ok_or_else(|| format!("No probabilities for order {} (maximum order is {})", order, self.n))?;

		match table.get(ngram) {
			Some(&p) if p > 0.0 => Ok(p),
			_ => Ok(self.fallback(order).unwrap_or(0.0)),
		}
	}

	/// Returns every n-gram at `order` whose leading tokens equal
	/// `prefix`, with its probability.
	///
	/// When `prefix` is a full `order`-length key the result is the
	/// single matching entry, with the fallback substituted for an
	/// unseen key under a smoothed scheme (empty under raw). A shorter
	/// prefix enumerates the seen continuations only.
	///
	/// # Errors
	/// Returns an error for order 0, an order beyond the maximum, an
	/// empty prefix or one longer than `order`.
	pub fn get_probabilities(
		&self,
		prefix: &[String],
		order: usize,
	) -> Result<Vec<(Vec<String>, f64)>, String> {
		if prefix.is_empty() || prefix.len() > order {
			return Err(format!(
				"Prefix length {} is not within 1..={}",
				prefix.len(),
				order
			));
		}
		let table = self
			.probs
			.get(&order)
			.ok_or_else(|| format!("No probabilities for order {} (maximum order is {})", order, self.n))?;

		if prefix.len() == order {
			let p = self.probability(prefix)?;
			if p == 0.0 && !table.contains_key(prefix) {
				return Ok(Vec::new());
			}
			return Ok(vec![(prefix.to_vec(), p)]);
		}

		let mut matches: Vec<(Vec<String>, f64)> = table
			.iter()
			.filter(|(key, _)| key.starts_with(prefix))
			.map(|(key, &p)| (key.clone(), p))
			.collect();
		matches.sort_by(|a, b| a.0.cmp(&b.0));
		Ok(matches)
	}
}

/// Number of distinct ordered `order`-length arrangements over a
/// vocabulary of `vocab` tokens (the falling factorial
/// `vocab * (vocab - 1) * ... * (vocab - order + 1)`).
///
/// Computed in `f64`: for a realistic vocabulary the value overflows
/// any integer type long before it stops being meaningful as a
/// smoothing denominator.
fn possible_arrangements(vocab: usize, order: usize) -> f64 {
	let mut possible = 1.0_f64;
	for i in 0..order {
		possible *= vocab.saturating_sub(i) as f64;
	}
	possible
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::corpus::Sentence;
	use crate::model::counts::{END_TOKEN, START_TOKEN, Sentinels};

	fn counts(raw: &[&str], n: usize) -> NGramCounts {
		let sentences: Vec<Sentence> = raw
			.iter()
			.map(|s| s.split_whitespace().map(str::to_owned).collect())
			.collect();
		NGramCounts::from_sentences(n, &sentences, Sentinels::default()).unwrap()
	}

	fn key(tokens: &[&str]) -> Vec<String> {
		tokens.iter().map(|t| t.to_string()).collect()
	}

	#[test]
	fn raw_probabilities_normalize_over_each_order() {
		let counts = counts(&["the cat sat"], 2);
		let tables = ProbabilityTables::new(&counts, Smoothing::Raw).unwrap();

		for order in 1..=2 {
			let total: f64 = counts
				.get_counts(order)
				.unwrap()
				.keys()
				.map(|k| tables.probability(k).unwrap())
				.sum();
			assert!((total - 1.0).abs() < 1e-12, "order {} sums to {}", order, total);
		}
	}

	#[test]
	fn raw_unseen_ngram_has_zero_probability() {
		let counts = counts(&["the cat sat"], 2);
		let tables = ProbabilityTables::new(&counts, Smoothing::Raw).unwrap();
		assert_eq!(tables.probability(&key(&["cat", "the"])).unwrap(), 0.0);
		assert!(tables.fallback(2).is_none());
	}

	#[test]
	fn raw_exact_bigram_probability() {
		// 4 bigram windows over __START__ the cat sat __END__.
		let counts = counts(&["the cat sat"], 2);
		let tables = ProbabilityTables::new(&counts, Smoothing::Raw).unwrap();
		let p = tables.probability(&key(&[START_TOKEN, "the"])).unwrap();
		assert!((p - 0.25).abs() < 1e-12);
	}

	#[test]
	fn laplace_seen_and_fallback_share_a_denominator() {
		let counts = counts(&["a b"], 1);
		let tables = ProbabilityTables::new(&counts, Smoothing::Laplace { k: 1 }).unwrap();

		// Vocabulary: a, b, __START__, __END__ -> total 4, possible 4.
		let denominator = 4.0 + 4.0;
		let p = tables.probability(&key(&["a"])).unwrap();
		assert!((p - 2.0 / denominator).abs() < 1e-12);
		let fb = tables.fallback(1).unwrap();
		assert!((fb - 1.0 / denominator).abs() < 1e-12);
		assert_eq!(tables.probability(&key(&["zzz"])).unwrap(), fb);
	}

	#[test]
	fn laplace_fallback_grows_and_seen_mass_shrinks_with_k() {
		let counts = counts(&["a b c d e"], 2);
		let small = ProbabilityTables::new(&counts, Smoothing::Laplace { k: 1 }).unwrap();
		let large = ProbabilityTables::new(&counts, Smoothing::Laplace { k: 5 }).unwrap();

		let seen = key(&["a", "b"]);
		assert!(large.probability(&seen).unwrap() < small.probability(&seen).unwrap());
		assert!(large.fallback(2).unwrap() > small.fallback(2).unwrap());
		// The same pseudo-count spread over a vastly larger denominator.
		assert!(large.fallback(2).unwrap() < 5.0 * small.fallback(2).unwrap());
	}

	#[test]
	fn absolute_discount_subtracts_mass_from_seen_ngrams() {
		let counts = counts(&["the cat sat"], 2);
		let d = 0.3;
		let tables =
			ProbabilityTables::new(&counts, Smoothing::AbsoluteDiscount { d }).unwrap();

		// Each of the 4 bigrams was seen once.
		let p = tables.probability(&key(&["the", "cat"])).unwrap();
		assert!((p - (1.0 - d) / 4.0).abs() < 1e-12);

		let fb = tables.fallback(2).unwrap();
		assert!(fb > 0.0);
		assert_eq!(tables.probability(&key(&["cat", "the"])).unwrap(), fb);
	}

	#[test]
	fn full_discount_falls_back_instead_of_zero() {
		// With D = 1.0 every singleton bigram keeps zero stored mass;
		// lookups must substitute the fallback, not return 0.
		let counts = counts(&["the cat sat"], 2);
		let tables =
			ProbabilityTables::new(&counts, Smoothing::AbsoluteDiscount { d: 1.0 }).unwrap();
		let p = tables.probability(&key(&["the", "cat"])).unwrap();
		assert_eq!(p, tables.fallback(2).unwrap());
		assert!(p > 0.0);
	}

	#[test]
	fn invalid_discount_is_a_construction_error() {
		let counts = counts(&["a b"], 1);
		assert!(ProbabilityTables::new(&counts, Smoothing::AbsoluteDiscount { d: 1.5 }).is_err());
		assert!(ProbabilityTables::new(&counts, Smoothing::AbsoluteDiscount { d: -0.1 }).is_err());
	}

	#[test]
	fn out_of_range_orders_are_rejected() {
		let counts = counts(&["a b"], 2);
		let tables = ProbabilityTables::new(&counts, Smoothing::Raw).unwrap();
		assert!(tables.probability(&[]).is_err());
		assert!(tables.probability(&key(&["a", "b", "c"])).is_err());
		assert!(tables.get_probabilities(&key(&["a"]), 0).is_err());
		assert!(tables.get_probabilities(&key(&["a"]), 3).is_err());
	}

	#[test]
	fn partial_prefix_enumerates_continuations() {
		let counts = counts(&["the cat sat", "the cat ran"], 2);
		let tables = ProbabilityTables::new(&counts, Smoothing::Raw).unwrap();

		let matches = tables.get_probabilities(&key(&["cat"]), 2).unwrap();
		let continuations: Vec<&str> =
			matches.iter().map(|(k, _)| k[1].as_str()).collect();
		assert_eq!(continuations, vec!["ran", "sat"]);

		let start = tables.get_probabilities(&key(&[START_TOKEN]), 2).unwrap();
		assert_eq!(start.len(), 1);
		assert_eq!(start[0].0, key(&[START_TOKEN, "the"]));
	}

	#[test]
	fn full_length_prefix_returns_the_single_match() {
		let counts = counts(&["the cat sat"], 2);
		let tables = ProbabilityTables::new(&counts, Smoothing::Raw).unwrap();

		let matches = tables.get_probabilities(&key(&["sat", END_TOKEN]), 2).unwrap();
		assert_eq!(matches.len(), 1);
		assert!((matches[0].1 - 0.25).abs() < 1e-12);

		// Raw scheme: an unseen full key yields no match at all.
		assert!(tables.get_probabilities(&key(&["cat", "the"]), 2).unwrap().is_empty());
	}

	#[test]
	fn repeated_queries_are_idempotent() {
		let counts = counts(&["a b c"], 3);
		let tables = ProbabilityTables::new(&counts, Smoothing::Laplace { k: 2 }).unwrap();
		let query = key(&["a", "b"]);
		let first = tables.get_probabilities(&query, 3).unwrap();
		let second = tables.get_probabilities(&query, 3).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn possible_arrangements_is_the_falling_factorial() {
		assert_eq!(possible_arrangements(4, 1), 4.0);
		assert_eq!(possible_arrangements(4, 2), 12.0);
		assert_eq!(possible_arrangements(4, 4), 24.0);
		// Vocabulary smaller than the order leaves no arrangements.
		assert_eq!(possible_arrangements(2, 3), 0.0);
	}
}
