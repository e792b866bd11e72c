use crate::graph::ProviderId;

const WORD_BITS: usize = u64::BITS as usize;

/// A set of providers stored as one bit per provider id.
///
/// Every set in a compilation is sized for the same graph, so unions are a
/// word-by-word `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProviderSet {
	words: Vec<u64>,
}

impl ProviderSet {
	/// An empty set with room for `providers` ids.
	pub(crate) fn empty(providers: usize) -> Self {
		Self {
			words: vec![0; providers.div_ceil(WORD_BITS)],
		}
	}

	pub(crate) fn insert(&mut self, id: ProviderId) {
		if let Some(word) = self.words.get_mut(id.0 / WORD_BITS) {
			*word |= 1_u64 << (id.0 % WORD_BITS);
		}
	}

	pub(crate) fn insert_all(&mut self, other: &Self) {
		for (word, theirs) in self.words.iter_mut().zip(&other.words) {
			*word |= theirs;
		}
	}

	pub(crate) fn len(&self) -> usize {
		self.words.iter().map(|word| word.count_ones() as usize).sum()
	}

	/// Members in ascending id order.
	pub(crate) fn iter(&self) -> impl Iterator<Item = ProviderId> + '_ {
		self.words.iter().enumerate().flat_map(|(index, &word)| {
			let mut rest = word;
			std::iter::from_fn(move || {
				if rest == 0 {
					return None;
				}
				let bit = rest.trailing_zeros() as usize;
				rest &= rest - 1;
				Some(ProviderId(index * WORD_BITS + bit))
			})
		})
	}
}
