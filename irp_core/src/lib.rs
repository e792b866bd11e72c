//! `irp_core` is the core library for the irp provider compiler. It turns C
//! functions that each compute one named value into code with lazy
//! evaluation, memoization and touch-driven invalidation.
//!
//! ## Processing Pipeline
//!
//! ```text
//! C source files
//!   -> Lexer (logos tokens with positions, comments and directives kept)
//!   -> Parser (functions, declarations and statements; expressions stay token lists)
//!   -> Registry (providers `provide_<var>`, touch points `touch_<var>()`, validation)
//!   -> Dependency graph (identifier scanner over every provider body)
//!   -> Cycle validator (three-color DFS, topological order)
//!   -> Invalidation sets (reverse topological sweep over provider bitsets)
//!   -> Code generator (flags, guards, touch routines)
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Configuration loading from `irp.toml`: naming conventions,
//!   output layout and include/exclude patterns.
//! - [`project`] - Input discovery for files and directories.
//! - [`scanner`] - Extraction of managed variable reads and writes.
//! - [`registry`] - Providers, touch points and their validation.
//! - [`graph`], [`cycles`], [`invalidation`] - Dependency analysis.
//! - [`codegen`] - Output generation.
//! - [`runtime`] - An executable model of the generated program's semantics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use irp_core::compile_project;
//! use std::path::Path;
//!
//! let compilation = compile_project(Path::new("."), &[])?;
//! print!("{}", compilation.output);
//! # Ok::<(), irp_core::IrpError>(())
//! ```

pub use config::*;
pub use engine::*;
pub use error::*;
pub use parser::parse;
pub use position::*;

mod bitset;
pub mod codegen;
pub mod config;
pub mod cycles;
mod engine;
#[allow(unused_assignments)]
mod error;
pub mod graph;
pub mod invalidation;
pub(crate) mod lexer;
mod parser;
mod position;
pub mod project;
pub mod registry;
pub mod runtime;
pub mod scanner;
pub mod syntax;
pub mod tokens;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
