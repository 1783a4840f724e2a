//! Top-level module for the n-gram language model.
//!
//! This module provides the full scoring pipeline:
//! - Per-order frequency counting (`NGramCounts`)
//! - Smoothed probability estimation (`ProbabilityTables`, `Smoothing`)
//! - Text scoring, perplexity and unscrambling (`NGramLanguageModel`)
//! - A standalone permutation generator (`Permutations`)

/// Frequency counting for every n-gram order up to a configured maximum.
///
/// Supports parallel construction, merging of partial counts and an
/// on-disk binary cache.
pub mod counts;

/// End-to-end scoring: log-probability, perplexity, unscrambling.
pub mod language_model;

/// Iterative permutation generator over index orderings.
///
/// Kept independent of the language model so the enumeration can be
/// tested on its own.
pub mod permutation;

/// Probability estimation over count tables under a closed set of
/// smoothing schemes.
pub mod probability;
