//! Statistical n-gram language modelling library.
//!
//! This crate provides a word-level n-gram language model including:
//! - Frequency counting for every n-gram order up to a configured maximum
//! - A family of probability estimators (raw, Laplace, absolute discounting)
//! - Perplexity evaluation of held-out text
//! - Sentence unscrambling by exhaustive permutation search
//!
//! Count tables and corpus snapshots are cached on disk as compact binary
//! blobs so repeated runs over the same corpus skip the counting phase.

/// Corpus loading and preparation.
///
/// Reads tagged token files, splits them into sentences, builds the
/// train/test split and the token-to-stem mapping.
pub mod corpus;

/// Core language model: counting, probability estimation, scoring.
pub mod model;

/// I/O utilities (file loading, path helpers).
///
/// Not exposed
pub(crate) mod io;
