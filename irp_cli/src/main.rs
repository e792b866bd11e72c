use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use irp_cli::Commands;
use irp_cli::GraphFormat;
use irp_cli::IrpCli;
use irp_core::Compilation;
use irp_core::IrpError;
use irp_core::check_output;
use irp_core::compile_project;
use owo_colors::OwoColorize;
use similar::ChangeTag;
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,green) => {
		if color_enabled() {
			format!("{}", $text.green())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,bold) => {
		if color_enabled() {
			format!("{}", $text.bold())
		} else {
			format!("{}", $text)
		}
	};
}

fn main() {
	let args = IrpCli::parse();

	// Respect NO_COLOR, --no-color and what the terminal supports.
	let use_color = !args.no_color
		&& std::env::var_os("NO_COLOR").is_none()
		&& supports_color::on(supports_color::Stream::Stderr).is_some();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	init_tracing(args.verbose);

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	let result = match &args.command {
		Some(Commands::Compile { inputs, output }) => run_compile(&args, inputs, output.as_deref()),
		Some(Commands::Check {
			inputs,
			expected,
			diff,
		}) => run_check(&args, inputs, expected, *diff),
		Some(Commands::Graph { inputs, format }) => run_graph(&args, inputs, *format),
		None => {
			eprintln!("No subcommand specified. Run `irp --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		match e.downcast::<IrpError>() {
			Ok(irp_err) => {
				let report: miette::Report = (*irp_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

/// Log to stderr. `RUST_LOG` wins; otherwise `--verbose` enables debug
/// events from the compiler.
fn init_tracing(verbose: bool) {
	let default = if verbose { "irp_core=debug" } else { "warn" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

	let _ = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.without_time()
		.try_init();
}

fn resolve_root(args: &IrpCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn compile_inputs(args: &IrpCli, inputs: &[PathBuf]) -> Result<Compilation, IrpError> {
	let root = resolve_root(args);
	tracing::debug!(root = %root.display(), inputs = inputs.len(), "compiling project");
	let compilation = compile_project(&root, inputs)?;

	if args.verbose {
		eprintln!(
			"Compiled {} provider(s) and {} touch site(s) from {} file(s).",
			compilation.registry.len(),
			compilation.registry.touches().len(),
			compilation.units.len()
		);
	}

	Ok(compilation)
}

fn run_compile(
	args: &IrpCli,
	inputs: &[PathBuf],
	output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
	let compilation = compile_inputs(args, inputs)?;

	match output {
		Some(path) => {
			let path = resolve_root(args).join(path);
			if let Some(parent) = path.parent() {
				std::fs::create_dir_all(parent)?;
			}
			std::fs::write(&path, &compilation.output)?;
			println!("Wrote {}", path.display());
		}
		None => print!("{}", compilation.output),
	}

	Ok(())
}

fn run_check(
	args: &IrpCli,
	inputs: &[PathBuf],
	expected: &Path,
	show_diff: bool,
) -> Result<(), Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let compilation = compile_inputs(args, inputs)?;
	let path = root.join(expected);
	let result = check_output(&compilation, &path)?;
	let display = make_relative(&result.path, &root);

	if result.is_ok() {
		println!("Check passed: {display} is up to date.");
		return Ok(());
	}

	match &result.current {
		None => eprintln!("Check failed: {display} does not exist."),
		Some(current) => {
			eprintln!("Check failed: {display} is out of date.");
			if show_diff {
				eprintln!();
				print_diff(current, &result.generated);
			}
		}
	}
	eprintln!();
	eprintln!(
		"Run `{}` to regenerate it.",
		colored!(format!("irp compile -o {display}"), bold)
	);

	process::exit(1);
}

fn run_graph(
	args: &IrpCli,
	inputs: &[PathBuf],
	format: GraphFormat,
) -> Result<(), Box<dyn std::error::Error>> {
	let compilation = compile_inputs(args, inputs)?;
	let report = compilation.graph_report();

	match format {
		GraphFormat::Text => print!("{}", report.to_text()),
		GraphFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
		GraphFormat::Dot => print!("{}", report.to_dot()),
	}

	Ok(())
}

fn print_diff(current: &str, expected: &str) {
	let diff = TextDiff::from_lines(current, expected);
	for change in diff.iter_all_changes() {
		match change.tag() {
			ChangeTag::Delete => {
				eprint!("  {}", colored!(format!("-{change}"), red));
			}
			ChangeTag::Insert => {
				eprint!("  {}", colored!(format!("+{change}"), green));
			}
			ChangeTag::Equal => {
				eprint!("   {change}");
			}
		}
	}
}

/// Make a path relative to root for display purposes.
fn make_relative(path: &Path, root: &Path) -> String {
	path.strip_prefix(root)
		.unwrap_or(path)
		.display()
		.to_string()
}
