use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::IrpError;
use crate::IrpResult;
use crate::graph::DependencyGraph;
use crate::graph::ProviderId;

/// Providers ordered so that every provider comes after all of its
/// dependencies and after every provider whose variable it overwrites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologicalOrder {
	order: Vec<ProviderId>,
	rank: Vec<usize>,
}

impl TopologicalOrder {
	pub fn ids(&self) -> &[ProviderId] {
		&self.order
	}

	/// Position of `id` in the order.
	pub fn rank(&self, id: ProviderId) -> usize {
		self.rank[id.0]
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
	/// Unvisited.
	White,
	/// On the current DFS path.
	Gray,
	/// Fully processed.
	Black,
}

/// Reject graphs where a provider depends on itself, directly or through other
/// providers.
///
/// Overwriting another provider's variable counts as depending on it, since the
/// generated body runs that provider before the write.
///
/// Runs a depth-first search with three-color marking. Reaching a node that is
/// still on the DFS path closes a cycle, reported as `[p0, p1, ..., p0]`.
pub fn validate_acyclic(graph: &DependencyGraph) -> IrpResult<TopologicalOrder> {
	fn dfs(
		graph: &DependencyGraph,
		node: ProviderId,
		colors: &mut [Color],
		stack: &mut Vec<ProviderId>,
	) -> Result<(), Vec<ProviderId>> {
		colors[node.0] = Color::Gray;
		stack.push(node);

		for &dependency in graph.guards(node) {
			match colors[dependency.0] {
				Color::Gray => {
					let start = stack
						.iter()
						.position(|&id| id == dependency)
						.unwrap_or_default();
					let mut cycle = stack[start..].to_vec();
					cycle.push(dependency);
					return Err(cycle);
				}
				Color::White => dfs(graph, dependency, colors, stack)?,
				Color::Black => {}
			}
		}

		stack.pop();
		colors[node.0] = Color::Black;
		Ok(())
	}

	let mut colors = vec![Color::White; graph.len()];
	let mut stack = Vec::new();

	for id in graph.ids() {
		if colors[id.0] != Color::White {
			continue;
		}

		if let Err(cycle) = dfs(graph, id, &mut colors, &mut stack) {
			let cycle: Vec<String> = cycle
				.into_iter()
				.map(|id| graph.name(id).to_string())
				.collect();
			tracing::debug!(cycle = ?cycle, "dependency cycle found");
			return Err(IrpError::CyclicDependency { cycle });
		}
	}

	let order = topological_order(graph);
	tracing::debug!(
		order = ?order.iter().map(|&id| graph.name(id)).collect::<Vec<_>>(),
		"topological order"
	);

	let mut rank = vec![0; graph.len()];
	for (position, id) in order.iter().enumerate() {
		rank[id.0] = position;
	}

	Ok(TopologicalOrder { order, rank })
}

/// Kahn's algorithm over an acyclic graph. Among providers whose dependencies
/// are all placed, the earliest declared goes first.
fn topological_order(graph: &DependencyGraph) -> Vec<ProviderId> {
	let mut remaining: Vec<usize> = graph
		.ids()
		.map(|id| graph.guards(id).len())
		.collect();
	let mut ready: BinaryHeap<Reverse<ProviderId>> = graph
		.ids()
		.filter(|id| remaining[id.0] == 0)
		.map(Reverse)
		.collect();
	let mut order = Vec::with_capacity(graph.len());

	while let Some(Reverse(id)) = ready.pop() {
		order.push(id);

		for &dependent in graph.guarded_by(id) {
			remaining[dependent.0] -= 1;
			if remaining[dependent.0] == 0 {
				ready.push(Reverse(dependent));
			}
		}
	}

	order
}
