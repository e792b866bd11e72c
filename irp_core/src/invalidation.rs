use std::collections::BTreeMap;

use crate::bitset::ProviderSet;
use crate::cycles::TopologicalOrder;
use crate::graph::DependencyGraph;
use crate::graph::ProviderId;

/// For every provider and input variable, the providers that transitively
/// depend on it. These are the flags a touch has to reset.
#[derive(Debug, Clone)]
pub struct InvalidationSets {
	/// Dependent ids of each provider, in topological order.
	providers: Vec<Vec<ProviderId>>,
	/// Dependent ids of each input variable, in topological order.
	inputs: BTreeMap<String, Vec<ProviderId>>,
	names: Vec<String>,
}

impl InvalidationSets {
	/// Compute every dependent set in one sweep over the providers in reverse
	/// topological order. When a provider is visited, all of its direct
	/// dependents are already complete, so its own set is the union of those
	/// dependents and their sets.
	pub fn compute(graph: &DependencyGraph, order: &TopologicalOrder) -> Self {
		let mut sets: Vec<ProviderSet> = vec![ProviderSet::empty(graph.len()); graph.len()];

		for &id in order.ids().iter().rev() {
			let mut set = ProviderSet::empty(graph.len());
			for &dependent in graph.dependents(id) {
				set.insert(dependent);
				set.insert_all(&sets[dependent.0]);
			}
			sets[id.0] = set;
		}

		let sorted = |set: &ProviderSet| {
			let mut ids: Vec<ProviderId> = set.iter().collect();
			ids.sort_by_key(|&id| order.rank(id));
			ids
		};

		let inputs = graph
			.inputs()
			.iter()
			.map(|(name, readers)| {
				let mut set = ProviderSet::empty(graph.len());
				for &reader in readers {
					set.insert(reader);
					set.insert_all(&sets[reader.0]);
				}
				(name.clone(), sorted(&set))
			})
			.collect();

		let providers: Vec<Vec<ProviderId>> = sets.iter().map(sorted).collect();

		for id in graph.ids() {
			tracing::debug!(
				variable = graph.name(id),
				dependents = sets[id.0].len(),
				"invalidation set"
			);
		}

		Self {
			providers,
			inputs,
			names: graph.ids().map(|id| graph.name(id).to_string()).collect(),
		}
	}

	/// Providers that transitively depend on provider `id`.
	pub fn dependents(&self, id: ProviderId) -> &[ProviderId] {
		&self.providers[id.0]
	}

	/// Providers that transitively depend on `variable`, which may be a
	/// provider variable or an input variable. Unknown names have no
	/// dependents.
	pub fn dependents_of(&self, variable: &str) -> Vec<&str> {
		let ids = match self.names.iter().position(|name| name == variable) {
			Some(index) => self.providers[index].as_slice(),
			None => self.inputs.get(variable).map_or(&[][..], Vec::as_slice),
		};

		ids.iter().map(|id| self.names[id.0].as_str()).collect()
	}
}
