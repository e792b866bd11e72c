use std::fmt::Write as _;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;

use crate::IrpConfig;
use crate::IrpResult;
use crate::codegen::Analysis;
use crate::codegen::generate;
use crate::cycles::TopologicalOrder;
use crate::cycles::validate_acyclic;
use crate::graph::DependencyGraph;
use crate::graph::ProviderId;
use crate::invalidation::InvalidationSets;
use crate::location;
use crate::parser::parse;
use crate::project::ScanOptions;
use crate::project::SourceFile;
use crate::project::discover_sources;
use crate::project::load_sources;
use crate::project::normalize_line_endings;
use crate::registry::ProviderRegistry;
use crate::syntax::SourceUnit;

/// The result of compiling a set of sources: every intermediate stage plus
/// the generated translation unit.
#[derive(Debug, Clone)]
pub struct Compilation {
	pub units: Vec<SourceUnit>,
	pub registry: ProviderRegistry,
	pub graph: DependencyGraph,
	pub order: TopologicalOrder,
	pub invalidation: InvalidationSets,
	/// The generated source.
	pub output: String,
}

/// Compile `sources` into one translation unit.
///
/// All sources are analyzed together: a provider in one file may depend on a
/// provider in another. Any error aborts the compilation without output.
pub fn compile(sources: &[SourceFile], config: &IrpConfig) -> IrpResult<Compilation> {
	let units = sources
		.iter()
		.map(|source| parse(&source.content, &source.path, &config.naming.touch_prefix))
		.collect::<IrpResult<Vec<_>>>()?;
	tracing::debug!(units = units.len(), "parsed sources");

	let registry = ProviderRegistry::build(&units, &config.naming)?;
	let graph = DependencyGraph::build(&registry);
	let order = validate_acyclic(&graph)?;
	let invalidation = InvalidationSets::compute(&graph, &order);

	let output = generate(
		&units,
		Analysis {
			registry: &registry,
			graph: &graph,
			order: &order,
			invalidation: &invalidation,
		},
		config,
	);

	tracing::info!(
		providers = registry.len(),
		touches = registry.touches().len(),
		bytes = output.len(),
		"compilation finished"
	);

	Ok(Compilation {
		units,
		registry,
		graph,
		order,
		invalidation,
		output,
	})
}

/// Compile a single in-memory source with the default configuration.
pub fn compile_str(source: &str) -> IrpResult<Compilation> {
	compile(
		&[SourceFile::new("<input>", source)],
		&IrpConfig::default(),
	)
}

/// Compile the inputs of a project rooted at `root`, using its `irp.toml` if
/// present. Relative inputs are resolved against `root`; without inputs the
/// whole root is compiled.
pub fn compile_project(root: &Path, inputs: &[PathBuf]) -> IrpResult<Compilation> {
	let config = IrpConfig::load(root)?.unwrap_or_default();
	let options = ScanOptions::from_config(Some(&config));

	let inputs: Vec<PathBuf> = if inputs.is_empty() {
		vec![root.to_path_buf()]
	} else {
		inputs.iter().map(|input| root.join(input)).collect()
	};

	let paths = discover_sources(&inputs, &options)?;
	let sources = load_sources(&paths, &options)?;
	compile(&sources, &config)
}

/// Result of comparing generated output with a file on disk.
#[derive(Debug)]
pub struct CheckResult {
	/// The file that was compared.
	pub path: PathBuf,
	/// Current content of the file, or `None` if it does not exist.
	pub current: Option<String>,
	/// Freshly generated content.
	pub generated: String,
}

impl CheckResult {
	/// Returns true if the file matches the generated output.
	pub fn is_ok(&self) -> bool {
		self.current.as_deref() == Some(self.generated.as_str())
	}
}

/// Compare the generated output of `compilation` with the file at `path`.
pub fn check_output(compilation: &Compilation, path: &Path) -> IrpResult<CheckResult> {
	let current = if path.is_file() {
		Some(normalize_line_endings(&std::fs::read_to_string(path)?))
	} else {
		None
	};

	Ok(CheckResult {
		path: path.to_path_buf(),
		current,
		generated: compilation.output.clone(),
	})
}

/// A serializable summary of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphReport {
	/// Providers in topological order.
	pub providers: Vec<ProviderReport>,
	/// Touched variables without a provider.
	pub inputs: Vec<InputReport>,
	pub touches: Vec<TouchReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderReport {
	pub variable: String,
	#[serde(rename = "type")]
	pub declared_type: String,
	pub function: String,
	pub location: String,
	/// Variables this provider reads directly.
	pub dependencies: Vec<String>,
	/// Providers invalidated when this variable is touched.
	pub dependents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputReport {
	pub variable: String,
	/// Providers that read the variable directly.
	pub readers: Vec<String>,
	pub dependents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TouchReport {
	pub variable: String,
	pub function: String,
	pub location: String,
}

impl Compilation {
	pub fn graph_report(&self) -> GraphReport {
		let graph = &self.graph;
		let names = |ids: &[ProviderId]| {
			ids.iter()
				.map(|&id| graph.name(id).to_string())
				.collect::<Vec<_>>()
		};

		let providers = self
			.order
			.ids()
			.iter()
			.filter_map(|&id| {
				let provider = self.registry.get(graph.name(id))?;
				Some(ProviderReport {
					variable: provider.variable.clone(),
					declared_type: provider.declared_type().to_string(),
					function: provider.function.name.clone(),
					location: provider.location(),
					dependencies: names(graph.dependencies(id)),
					dependents: names(self.invalidation.dependents(id)),
				})
			})
			.collect();

		let inputs = graph
			.inputs()
			.iter()
			.map(|(variable, readers)| {
				InputReport {
					variable: variable.clone(),
					readers: names(readers.as_slice()),
					dependents: self
						.invalidation
						.dependents_of(variable)
						.into_iter()
						.map(ToString::to_string)
						.collect(),
				}
			})
			.collect();

		let touches = self
			.registry
			.touches()
			.iter()
			.map(|touch| {
				TouchReport {
					variable: touch.variable.clone(),
					function: touch.function.clone(),
					location: location(&touch.file, touch.position),
				}
			})
			.collect();

		GraphReport {
			providers,
			inputs,
			touches,
		}
	}
}

impl GraphReport {
	/// Human readable listing, one provider per line.
	pub fn to_text(&self) -> String {
		let mut text = String::new();

		for provider in &self.providers {
			let _ = writeln!(
				text,
				"{} ({}) <- {}; invalidated by touch: {}",
				provider.variable,
				provider.declared_type,
				list(&provider.dependencies),
				list(&provider.dependents),
			);
		}

		for input in &self.inputs {
			let _ = writeln!(
				text,
				"{} (input) read by {}; invalidated by touch: {}",
				input.variable,
				list(&input.readers),
				list(&input.dependents),
			);
		}

		for touch in &self.touches {
			let _ = writeln!(
				text,
				"touch {} in {} at {}",
				touch.variable, touch.function, touch.location
			);
		}

		text
	}

	/// Graphviz digraph with one edge per `consumer -> dependency`.
	pub fn to_dot(&self) -> String {
		let mut dot = String::from("digraph providers {\n");

		for provider in &self.providers {
			let _ = writeln!(dot, "  \"{}\";", provider.variable);
		}
		for input in &self.inputs {
			let _ = writeln!(dot, "  \"{}\" [shape=box];", input.variable);
		}
		for provider in &self.providers {
			for dependency in &provider.dependencies {
				let _ = writeln!(dot, "  \"{}\" -> \"{dependency}\";", provider.variable);
			}
		}
		for input in &self.inputs {
			for reader in &input.readers {
				let _ = writeln!(dot, "  \"{reader}\" -> \"{}\";", input.variable);
			}
		}

		dot.push_str("}\n");
		dot
	}
}

fn list(names: &[String]) -> String {
	if names.is_empty() {
		"-".to_string()
	} else {
		names.join(", ")
	}
}
