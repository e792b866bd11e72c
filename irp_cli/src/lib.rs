use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Compile provider functions into lazily evaluated, memoized C.",
	long_about = "irp (implicit reference to parameters) compiles C sources in which every value \
	              is produced by a `provide_<name>` function.\n\nReads of a provided variable are \
	              guarded so the provider runs at most once until a `touch_<name>()` call \
	              invalidates everything that depends on it.\n\nQuick start:\n  irp compile    \
	              Print the generated source\n  irp check      Verify a generated file is up to \
	              date\n  irp graph      Inspect the provider dependency graph"
)]
pub struct IrpCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Path to the project root directory. Relative inputs and `irp.toml`
	/// are resolved against it.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Compile the inputs into a single translation unit.
	///
	/// Every input file is parsed, providers are collected across all of
	/// them and one amalgamated source with staleness flags, guards and
	/// touch routines is produced. Directories are searched for files
	/// matching the `[include]` patterns of `irp.toml` (`*.irp.c` by
	/// default).
	Compile {
		/// Source files or directories. Defaults to the project root.
		inputs: Vec<PathBuf>,

		/// Write the generated source to this file instead of stdout.
		#[arg(long, short)]
		output: Option<PathBuf>,
	},
	/// Check that a previously generated file is up to date.
	///
	/// Compiles the inputs and compares the result with the expected file.
	/// Exits with a non-zero status code when the file is missing or stale.
	Check {
		/// Source files or directories. Defaults to the project root.
		inputs: Vec<PathBuf>,

		/// The generated file to compare against.
		#[arg(long, short)]
		expected: PathBuf,

		/// Show a unified diff between the file on disk and the freshly
		/// generated source.
		#[arg(long, default_value_t = false)]
		diff: bool,
	},
	/// Print the provider dependency graph.
	///
	/// Lists every provider in topological order with the variables it reads
	/// directly and the providers a touch of it invalidates, followed by
	/// input variables and touch sites.
	Graph {
		/// Source files or directories. Defaults to the project root.
		inputs: Vec<PathBuf>,

		/// Output format. Use `text` for a readable listing, `json` for
		/// programmatic consumption or `dot` for Graphviz.
		#[arg(long, value_enum, default_value_t = GraphFormat::Text)]
		format: GraphFormat,
	},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum GraphFormat {
	/// One line per provider, input and touch site.
	Text,
	/// The full report as JSON.
	Json,
	/// A Graphviz digraph with `consumer -> dependency` edges.
	Dot,
}
