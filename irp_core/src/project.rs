use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use globset::Glob;
use globset::GlobSet;
use globset::GlobSetBuilder;
use ignore::gitignore::Gitignore;
use ignore::gitignore::GitignoreBuilder;

use crate::IrpConfig;
use crate::IrpError;
use crate::IrpResult;

/// Options for controlling which files are compiled when a directory is given
/// as input.
///
/// Use [`ScanOptions::default()`] for sensible defaults or
/// [`ScanOptions::from_config`] to construct from an [`IrpConfig`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
	/// Gitignore-style patterns to exclude.
	pub exclude_patterns: Vec<String>,
	/// Glob patterns a file must match to be compiled.
	pub include_set: GlobSet,
	/// Maximum file size to read in bytes.
	pub max_file_size: u64,
	/// Whether to disable `.gitignore` integration.
	pub disable_gitignore: bool,
}

impl Default for ScanOptions {
	fn default() -> Self {
		Self::from_config(None)
	}
}

impl ScanOptions {
	/// Construct [`ScanOptions`] from an [`IrpConfig`], falling back to the
	/// default include patterns without one.
	pub fn from_config(config: Option<&IrpConfig>) -> Self {
		let defaults = IrpConfig::default();
		let config = config.unwrap_or(&defaults);

		Self {
			exclude_patterns: config.exclude.patterns.clone(),
			include_set: build_glob_set(&config.include.patterns),
			max_file_size: config.max_file_size,
			disable_gitignore: config.disable_gitignore,
		}
	}
}

/// A source file read from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
	pub path: PathBuf,
	pub content: String,
}

impl SourceFile {
	pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
		Self {
			path: path.into(),
			content: content.into(),
		}
	}
}

/// Resolve the inputs of a compilation. Files are taken as given; directories
/// are walked for files matching the include patterns. Results are
/// deduplicated and, per directory, sorted.
pub fn discover_sources(inputs: &[PathBuf], options: &ScanOptions) -> IrpResult<Vec<PathBuf>> {
	let mut files: Vec<PathBuf> = Vec::new();

	for input in inputs {
		if input.is_dir() {
			let mut found = collect_files(input, options)?;
			found.retain(|path| !files.contains(path));
			files.extend(found);
		} else if input.is_file() {
			if !files.contains(input) {
				files.push(input.clone());
			}
		} else {
			return Err(IrpError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("input `{}` does not exist", input.display()),
			)));
		}
	}

	if files.is_empty() {
		let description = inputs
			.iter()
			.map(|input| input.display().to_string())
			.collect::<Vec<_>>()
			.join(", ");
		return Err(IrpError::NoInputFiles(description));
	}

	tracing::debug!(files = files.len(), "discovered source files");
	Ok(files)
}

/// Read every file. A file larger than `max_file_size` fails the whole load,
/// since compiling without it would leave its providers unguarded.
pub fn load_sources(paths: &[PathBuf], options: &ScanOptions) -> IrpResult<Vec<SourceFile>> {
	let mut sources = Vec::with_capacity(paths.len());

	for path in paths {
		let size = std::fs::metadata(path)?.len();
		if size > options.max_file_size {
			return Err(IrpError::FileTooLarge {
				path: path.display().to_string(),
				size,
				limit: options.max_file_size,
			});
		}

		let content = std::fs::read_to_string(path)?;
		sources.push(SourceFile::new(path.clone(), normalize_line_endings(&content)));
	}

	Ok(sources)
}

/// Normalize CRLF line endings to LF.
pub fn normalize_line_endings(content: &str) -> String {
	if content.contains('\r') {
		content.replace("\r\n", "\n").replace('\r', "\n")
	} else {
		content.to_string()
	}
}

/// Build a `GlobSet` from a list of glob pattern strings.
fn build_glob_set(patterns: &[String]) -> GlobSet {
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		if let Ok(glob) = Glob::new(pattern) {
			builder.add(glob);
		}
	}
	builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Build a matcher for the `[exclude]` patterns. These follow `.gitignore`
/// syntax and are applied on top of any `.gitignore` rules.
fn build_exclude_matcher(root: &Path, patterns: &[String]) -> IrpResult<Gitignore> {
	let mut builder = GitignoreBuilder::new(root);
	for pattern in patterns {
		builder.add_line(None, pattern).map_err(|e| {
			IrpError::ConfigParse(format!("invalid exclude pattern `{pattern}`: {e}"))
		})?;
	}
	builder
		.build()
		.map_err(|e| IrpError::ConfigParse(format!("failed to build exclude rules: {e}")))
}

/// Build a `Gitignore` matcher from the directory's `.gitignore` file (if any).
fn build_gitignore(root: &Path) -> Gitignore {
	let mut builder = GitignoreBuilder::new(root);
	let gitignore_path = root.join(".gitignore");
	if gitignore_path.exists() {
		let _ = builder.add(gitignore_path);
	}
	builder.build().unwrap_or_else(|_| Gitignore::empty())
}

fn collect_files(root: &Path, options: &ScanOptions) -> IrpResult<Vec<PathBuf>> {
	let gitignore = if options.disable_gitignore {
		Gitignore::empty()
	} else {
		build_gitignore(root)
	};
	let exclude = build_exclude_matcher(root, &options.exclude_patterns)?;

	let mut walker = Walker {
		root,
		include_set: &options.include_set,
		gitignore: &gitignore,
		exclude: &exclude,
		visited_dirs: HashSet::new(),
		files: Vec::new(),
	};
	walker.walk(root)?;

	let mut files = walker.files;
	files.sort();
	Ok(files)
}

fn is_ignored_directory_name(name: &str) -> bool {
	name.starts_with('.') || name == "node_modules" || name == "target"
}

struct Walker<'a> {
	root: &'a Path,
	include_set: &'a GlobSet,
	gitignore: &'a Gitignore,
	exclude: &'a Gitignore,
	/// Canonical paths of visited directories, to stop at symlink cycles.
	visited_dirs: HashSet<PathBuf>,
	files: Vec<PathBuf>,
}

impl Walker<'_> {
	fn walk(&mut self, dir: &Path) -> IrpResult<()> {
		let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
		if !self.visited_dirs.insert(canonical) {
			return Ok(());
		}

		for entry in std::fs::read_dir(dir)? {
			let path = entry?.path();

			if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
				if is_ignored_directory_name(name) {
					continue;
				}
			}

			let is_dir = path.is_dir();
			if self.gitignore.matched(&path, is_dir).is_ignore()
				|| self.exclude.matched(&path, is_dir).is_ignore()
			{
				continue;
			}

			if is_dir {
				self.walk(&path)?;
			} else if self.is_included(&path) {
				self.files.push(path);
			}
		}

		Ok(())
	}

	/// Include patterns match either the file name or the path relative to the
	/// walked directory.
	fn is_included(&self, path: &Path) -> bool {
		let by_name = path
			.file_name()
			.is_some_and(|name| self.include_set.is_match(name));
		let by_path = path
			.strip_prefix(self.root)
			.is_ok_and(|relative| self.include_set.is_match(relative));

		by_name || by_path
	}
}
