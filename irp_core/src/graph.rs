use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Display;

use serde::Serialize;

use crate::registry::ProviderRegistry;
use crate::scanner::Scanner;

/// Index of a provider node in a [`DependencyGraph`]. Ids follow declaration
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProviderId(pub usize);

impl Display for ProviderId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Providers as nodes and "reads the variable of" as edges.
///
/// Touched variables that no provider owns are kept as input nodes: they have
/// no provider of their own but are read by some.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
	names: Vec<String>,
	index: HashMap<String, ProviderId>,
	/// `dependencies[p]`: the providers `p` reads, in order of first read.
	dependencies: Vec<Vec<ProviderId>>,
	/// `dependents[p]`: the providers that read `p` directly, by id.
	dependents: Vec<Vec<ProviderId>>,
	/// `guards[p]`: the providers whose guards run inside `p`, which are the
	/// ones it reads followed by the ones whose variable it overwrites.
	guards: Vec<Vec<ProviderId>>,
	/// `guarded_by[p]`: the providers whose bodies guard `p`.
	guarded_by: Vec<Vec<ProviderId>>,
	/// Input variable to the providers that read it directly.
	inputs: BTreeMap<String, Vec<ProviderId>>,
}

impl DependencyGraph {
	pub fn build(registry: &ProviderRegistry) -> Self {
		let names: Vec<String> = registry
			.providers()
			.iter()
			.map(|provider| provider.variable.clone())
			.collect();
		let index: HashMap<String, ProviderId> = names
			.iter()
			.enumerate()
			.map(|(id, name)| (name.clone(), ProviderId(id)))
			.collect();

		let mut inputs: BTreeMap<String, Vec<ProviderId>> = registry
			.touched_variables()
			.into_iter()
			.filter(|variable| !index.contains_key(*variable))
			.map(|variable| (variable.to_string(), Vec::new()))
			.collect();

		let tracked: HashSet<String> = names.iter().chain(inputs.keys()).cloned().collect();

		let mut dependencies = vec![Vec::new(); names.len()];
		let mut dependents = vec![Vec::new(); names.len()];
		let mut guards: Vec<Vec<ProviderId>> = vec![Vec::new(); names.len()];
		let mut guarded_by = vec![Vec::new(); names.len()];

		for (id, provider) in registry.providers().iter().enumerate() {
			let own = Some(provider.variable.as_str());
			let usage =
				Scanner::for_function(&tracked, &provider.function, own).statements(&provider.function.body);

			for read in &usage.reads {
				if let Some(&dependency) = index.get(read) {
					dependencies[id].push(dependency);
					dependents[dependency.0].push(ProviderId(id));
				} else if let Some(readers) = inputs.get_mut(read) {
					readers.push(ProviderId(id));
				}
			}

			// Overwriting another provider's variable forces that provider first.
			for name in usage.reads.iter().chain(&usage.writes) {
				let Some(&guarded) = index.get(name) else {
					continue;
				};
				if !guards[id].contains(&guarded) {
					guards[id].push(guarded);
					guarded_by[guarded.0].push(ProviderId(id));
				}
			}
		}

		let graph = Self {
			names,
			index,
			dependencies,
			dependents,
			guards,
			guarded_by,
			inputs,
		};

		tracing::debug!(
			providers = graph.len(),
			edges = graph.edges().count(),
			inputs = graph.inputs.len(),
			"built dependency graph"
		);

		graph
	}

	pub fn len(&self) -> usize {
		self.names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	pub fn ids(&self) -> impl Iterator<Item = ProviderId> + '_ {
		(0..self.names.len()).map(ProviderId)
	}

	pub fn name(&self, id: ProviderId) -> &str {
		&self.names[id.0]
	}

	pub fn id(&self, name: &str) -> Option<ProviderId> {
		self.index.get(name).copied()
	}

	/// Providers that `id` reads directly.
	pub fn dependencies(&self, id: ProviderId) -> &[ProviderId] {
		&self.dependencies[id.0]
	}

	/// Providers that read `id` directly.
	pub fn dependents(&self, id: ProviderId) -> &[ProviderId] {
		&self.dependents[id.0]
	}

	/// Providers guarded inside the body of `id`: every provider it reads
	/// and every provider whose variable it overwrites.
	pub fn guards(&self, id: ProviderId) -> &[ProviderId] {
		&self.guards[id.0]
	}

	/// Providers whose bodies guard `id`.
	pub fn guarded_by(&self, id: ProviderId) -> &[ProviderId] {
		&self.guarded_by[id.0]
	}

	/// Touched variables without a provider, with their direct readers.
	pub fn inputs(&self) -> &BTreeMap<String, Vec<ProviderId>> {
		&self.inputs
	}

	pub fn is_input(&self, name: &str) -> bool {
		self.inputs.contains_key(name)
	}

	/// Every `(consumer, dependency)` edge.
	pub fn edges(&self) -> impl Iterator<Item = (ProviderId, ProviderId)> + '_ {
		self.dependencies
			.iter()
			.enumerate()
			.flat_map(|(consumer, dependencies)| {
				dependencies
					.iter()
					.map(move |&dependency| (ProviderId(consumer), dependency))
			})
	}
}
