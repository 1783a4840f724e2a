/// Lazy iterator over every permutation of the indices `0..len`,
/// using the iterative form of Heap's algorithm.
///
/// The identity ordering is yielded first, then each successive
/// permutation is produced by a single swap. The sequence is finite
/// (`len!` orderings) and restartable by constructing a new iterator.
///
/// # Notes
/// - `len == 0` yields exactly one empty ordering.
/// - The factorial growth is the caller's problem: unscrambling is
///   only expected to run on short sentences.
pub struct Permutations {
	items: Vec<usize>,
	counters: Vec<usize>,
	depth: usize,
	started: bool,
	done: bool,
}

impl Permutations {
	/// Creates the permutation sequence for `0..len`.
	pub fn new(len: usize) -> Self {
		Self {
			items: (0..len).collect(),
			counters: vec![0; len],
			depth: 0,
			started: false,
			done: false,
		}
	}
}

impl Iterator for Permutations {
	type Item = Vec<usize>;

	fn next(&mut self) -> Option<Vec<usize>> {
		if self.done {
			return None;
		}
		if !self.started {
			self.started = true;
			return Some(self.items.clone());
		}

		while self.depth < self.items.len() {
			if self.counters[self.depth] < self.depth {
				if self.depth % 2 == 0 {
					self.items.swap(0, self.depth);
				} else {
					self.items.swap(self.counters[self.depth], self.depth);
				}
				self.counters[self.depth] += 1;
				self.depth = 0;
				return Some(self.items.clone());
			}
			self.counters[self.depth] = 0;
			self.depth += 1;
		}

		self.done = true;
		None
	}
}
