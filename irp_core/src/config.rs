use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::IrpError;
use crate::IrpResult;

/// Default maximum file size in bytes (10 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["irp.toml", ".irp.toml", ".config/irp.toml"];

/// Configuration loaded from an `irp.toml` file.
///
/// ```toml
/// disable_gitignore = false
///
/// [naming]
/// provider_prefix = "provide_"
/// touch_prefix = "touch_"
/// flag_suffix = "_provided"
///
/// [output]
/// indent = "  "
/// stdbool = true
/// prototypes = true
///
/// [include]
/// patterns = ["*.irp.c"]
///
/// [exclude]
/// patterns = ["build/"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct IrpConfig {
	/// Naming conventions that mark providers, touches and flags.
	#[serde(default)]
	pub naming: NamingConfig,
	/// Layout of the generated source.
	#[serde(default)]
	pub output: OutputConfig,
	/// Glob patterns selecting source files when a directory is compiled.
	#[serde(default)]
	pub include: IncludeConfig,
	/// Gitignore-style patterns for files and directories to skip.
	#[serde(default)]
	pub exclude: ExcludeConfig,
	/// Maximum file size in bytes to read. Larger files are skipped.
	#[serde(default = "default_max_file_size")]
	pub max_file_size: u64,
	/// When true, `.gitignore` files are not used for filtering.
	#[serde(default)]
	pub disable_gitignore: bool,
}

impl Default for IrpConfig {
	fn default() -> Self {
		Self {
			naming: NamingConfig::default(),
			output: OutputConfig::default(),
			include: IncludeConfig::default(),
			exclude: ExcludeConfig::default(),
			max_file_size: DEFAULT_MAX_FILE_SIZE,
			disable_gitignore: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
	/// A function named `<provider_prefix><var>` provides `var`.
	pub provider_prefix: String,
	/// A call statement `<touch_prefix><var>()` touches `var`.
	pub touch_prefix: String,
	/// The staleness flag of `var` is `<var><flag_suffix>`.
	pub flag_suffix: String,
}

impl Default for NamingConfig {
	fn default() -> Self {
		Self {
			provider_prefix: "provide_".into(),
			touch_prefix: "touch_".into(),
			flag_suffix: "_provided".into(),
		}
	}
}

impl NamingConfig {
	pub fn provider(&self, variable: &str) -> String {
		format!("{}{variable}", self.provider_prefix)
	}

	pub fn touch(&self, variable: &str) -> String {
		format!("{}{variable}", self.touch_prefix)
	}

	pub fn flag(&self, variable: &str) -> String {
		format!("{variable}{}", self.flag_suffix)
	}

	/// The variable a function provides, if its name follows the provider
	/// convention.
	pub fn provided_variable<'a>(&self, function: &'a str) -> Option<&'a str> {
		function
			.strip_prefix(self.provider_prefix.as_str())
			.filter(|variable| !variable.is_empty())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
	/// One level of indentation in generated code.
	pub indent: String,
	/// Emit `#include <stdbool.h>` at the top of the output.
	pub stdbool: bool,
	/// Emit prototypes for providers and touch routines before any storage.
	pub prototypes: bool,
}

impl Default for OutputConfig {
	fn default() -> Self {
		Self {
			indent: "  ".into(),
			stdbool: true,
			prototypes: true,
		}
	}
}

/// Configuration for selecting files when a directory is given as input.
#[derive(Debug, Clone, Deserialize)]
pub struct IncludeConfig {
	/// Glob patterns matched against file names and paths relative to the
	/// walked directory.
	#[serde(default = "default_include_patterns")]
	pub patterns: Vec<String>,
}

impl Default for IncludeConfig {
	fn default() -> Self {
		Self {
			patterns: default_include_patterns(),
		}
	}
}

/// Configuration for excluding files from directory walks.
///
/// Patterns follow gitignore syntax and are applied on top of any `.gitignore`
/// rules (unless `disable_gitignore` is set).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExcludeConfig {
	/// Examples: `"build/"`, `"*.gen.c"`, `"!keep.irp.c"`.
	#[serde(default)]
	pub patterns: Vec<String>,
}

fn default_max_file_size() -> u64 {
	DEFAULT_MAX_FILE_SIZE
}

fn default_include_patterns() -> Vec<String> {
	vec!["*.irp.c".into()]
}

impl IrpConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> IrpResult<Option<IrpConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::parse(&content)?;
		tracing::debug!(path = %config_path.display(), "loaded config");

		Ok(Some(config))
	}

	pub fn parse(content: &str) -> IrpResult<IrpConfig> {
		toml::from_str(content).map_err(|e| IrpError::ConfigParse(e.to_string()))
	}
}
