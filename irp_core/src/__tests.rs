use std::cell::Cell;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;
use std::rc::Rc;

use rstest::rstest;
use similar_asserts::assert_eq;

use super::__fixtures::*;
use super::*;
use crate::bitset::ProviderSet;
use crate::cycles::validate_acyclic;
use crate::graph::DependencyGraph;
use crate::graph::ProviderId;
use crate::lexer::tokenize;
use crate::project::ScanOptions;
use crate::project::SourceFile;
use crate::project::discover_sources;
use crate::project::load_sources;
use crate::registry::ProviderRegistry;
use crate::runtime::EvalError;
use crate::runtime::Evaluator;
use crate::runtime::Freshness;
use crate::scanner::Scanner;
use crate::scanner::Usage;
use crate::syntax::ForInit;
use crate::syntax::Item;
use crate::syntax::Statement;
use crate::tokens::Token;

fn names(values: &[&str]) -> Vec<String> {
	values.iter().map(ToString::to_string).collect()
}

fn usage_of(body: &str, tracked: &[&str]) -> IrpResult<Usage> {
	let function = body_function(body)?;
	let tracked: HashSet<String> = tracked.iter().map(ToString::to_string).collect();
	let usage = Scanner::for_function(&tracked, &function, None).statements(&function.body);
	Ok(usage)
}

/// The text of `main` in generated output.
fn main_of(output: &str) -> &str {
	let start = output
		.find("int main()")
		.unwrap_or_else(|| panic!("no main in:\n{output}"));
	&output[start..]
}

#[test]
fn tokenize_with_positions() -> IrpResult<()> {
	let tokens = tokenize("int a;\n  a = 1;", Path::new("t.c"))?;
	let kinds: Vec<String> = tokens.iter().map(|t| t.token.to_string()).collect();
	assert_eq!(kinds, names(&["int", "a", ";", "a", "=", "1", ";"]));
	assert_eq!(tokens[0].position, Position::new(1, 1, 0, 1, 4, 3));
	assert_eq!(tokens[1].position, Position::new(1, 5, 4, 1, 6, 5));
	assert_eq!(tokens[3].position, Position::new(2, 3, 9, 2, 4, 10));

	Ok(())
}

#[test]
fn tokenize_keeps_comments_and_directives() -> IrpResult<()> {
	let tokens = tokenize(
		"#include <math.h>\n/* note */ x += 1.e-9; // done\n",
		Path::new("t.c"),
	)?;
	let kinds: Vec<Token> = tokens.into_iter().map(|t| t.token).collect();
	assert_eq!(
		kinds,
		vec![
			Token::Directive("#include <math.h>".into()),
			Token::Comment("/* note */".into()),
			Token::Ident("x".into()),
			Token::Symbol("+=".into()),
			Token::Number("1.e-9".into()),
			Token::Symbol(";".into()),
			Token::Comment("// done".into()),
		]
	);

	Ok(())
}

#[rstest]
#[case::unterminated_string("x = \"abc;", "unterminated string literal")]
#[case::unterminated_char("c = 'a;", "unterminated character literal")]
#[case::unterminated_comment("x = 1; /* open", "unterminated block comment")]
#[case::unexpected_character("x = 1 @ 2;", "unexpected character `@`")]
fn tokenize_errors(#[case] source: &str, #[case] expected: &str) {
	let result = tokenize(source, Path::new("t.c"));
	let Err(IrpError::Syntax { message, line, .. }) = result else {
		panic!("expected a syntax error, got {result:?}");
	};
	assert_eq!(message, expected);
	assert_eq!(line, 1);
}

#[test]
fn parse_provider_function() -> IrpResult<()> {
	let unit = parse_source(simple_source())?;
	assert_eq!(unit.items.len(), 3);
	assert!(matches!(&unit.items[0], Item::Directive { text, .. } if text == "#include <stdio.h>"));

	let functions: Vec<_> = unit.functions().collect();
	assert_eq!(functions[0].name, "provide_a");
	assert_eq!(functions[0].specifiers, "void");
	assert_eq!(functions[0].signature, "void provide_a()");
	assert!(functions[0].params.is_empty());
	assert_eq!(functions[0].body.len(), 2);

	let Statement::Declaration(declaration) = &functions[0].body[0] else {
		panic!("expected a declaration");
	};
	assert_eq!(declaration.specifiers, "int");
	assert_eq!(declaration.text, "int a;");
	assert_eq!(declaration.names().collect::<Vec<_>>(), vec!["a"]);

	assert_eq!(functions[1].name, "main");
	assert!(matches!(functions[1].body[1], Statement::Return { value: Some(_), .. }));

	Ok(())
}

#[test]
fn parse_touch_statement() -> IrpResult<()> {
	let function = body_function("x = 1; touch_x(); touch_x(1); retouch_x();")?;
	assert!(matches!(&function.body[0], Statement::Expression(_)));
	assert!(matches!(&function.body[1], Statement::Touch { variable, .. } if variable == "x"));
	assert!(matches!(&function.body[2], Statement::Expression(_)));
	assert!(matches!(&function.body[3], Statement::Expression(_)));

	Ok(())
}

#[test]
fn parse_control_flow() -> IrpResult<()> {
	let function = body_function(
		"for (int i = 0; i < n; i++) { if (i == 2) continue; else if (i > 5) break; } do { n--; } \
		 while (n > 0); switch (n) { case 1: n = 2; break; default: ; }",
	)?;
	assert_eq!(function.body.len(), 3);

	let Statement::For {
		init: Some(ForInit::Declaration(init)),
		condition: Some(condition),
		step: Some(step),
		body,
		..
	} = &function.body[0]
	else {
		panic!("expected a for loop");
	};
	assert_eq!(init.text, "int i = 0;");
	assert_eq!(condition.text, "i < n");
	assert_eq!(step.text, "i++");
	let Statement::Block(block) = body.as_ref() else {
		panic!("expected a block body");
	};
	assert!(matches!(
		&block[0],
		Statement::If {
			else_branch: Some(_),
			..
		}
	));

	assert!(matches!(&function.body[1], Statement::DoWhile { condition, .. } if condition.text == "n > 0"));
	assert!(matches!(&function.body[2], Statement::Switch { .. }));

	Ok(())
}

#[test]
fn parse_declarators() -> IrpResult<()> {
	let function = body_function("static const float *p = 0, values[3] = {1, 2, 3}, z;")?;
	let Statement::Declaration(declaration) = &function.body[0] else {
		panic!("expected a declaration");
	};
	assert_eq!(declaration.specifiers, "static const float");
	assert_eq!(declaration.names().collect::<Vec<_>>(), vec!["p", "values", "z"]);
	assert_eq!(declaration.declarators[0].text, "*p");
	assert_eq!(declaration.declarators[1].text, "values[3]");
	assert_eq!(
		declaration.declarators[1]
			.init
			.as_ref()
			.map(|init| init.text.as_str()),
		Some("{1, 2, 3}")
	);
	assert!(declaration.declarators[2].init.is_none());

	Ok(())
}

#[test]
fn parse_typedef_names_as_declarations() -> IrpResult<()> {
	let unit = parse_source("typedef struct { int x; } point;\nvoid f() { point p; p.x = 1; }\n")?;
	let function = unit
		.functions()
		.next()
		.unwrap_or_else(|| panic!("no function"));
	assert!(matches!(&function.body[0], Statement::Declaration(d) if d.names().eq(["p"])));

	Ok(())
}

#[rstest]
#[case::missing_semicolon("int main() { x = 1 }", 1)]
#[case::missing_brace("int main() {\n  x = 1;\n", 2)]
#[case::unbalanced_paren("int main() { f(x; }", 1)]
fn parse_errors(#[case] source: &str, #[case] expected_line: usize) {
	let result = parse_source(source);
	let Err(IrpError::Syntax { line, .. }) = result else {
		panic!("expected a syntax error, got {result:?}");
	};
	assert_eq!(line, expected_line);
}

#[rstest]
#[case::simple_write("y = x + 1;", &["x", "y"], &["x"], &["y"])]
#[case::read_then_write("x = x + 1;", &["x"], &["x"], &["x"])]
#[case::compound("x += 2;", &["x"], &["x"], &["x"])]
#[case::increment("n++;", &["n"], &["n"], &["n"])]
#[case::pre_decrement("--n;", &["n"], &["n"], &["n"])]
#[case::element("v[i] = 3;", &["v", "i"], &["v", "i"], &["v"])]
#[case::member_name_ignored("p.x = 1;", &["p", "x"], &["p"], &["p"])]
#[case::arrow_member("q->x = x;", &["q", "x"], &["q", "x"], &["q"])]
#[case::call_argument("printf(\"%d\", a);", &["a", "printf"], &["a"], &[])]
#[case::chained_assignment("a = b = c;", &["a", "b", "c"], &["c"], &["a", "b"])]
#[case::comparison("if (x == y) z = 1;", &["x", "y", "z"], &["x", "y"], &["z"])]
#[case::shadowed("{ int a = 1; b = a; } c = a;", &["a", "b", "c"], &["a"], &["b", "c"])]
#[case::loop_variable("for (int i = 0; i < n; i++) total += i;", &["i", "n", "total"], &["n", "total"], &["total"])]
#[case::untracked("y = z;", &["x"], &[], &[])]
fn scan_usage(
	#[case] body: &str,
	#[case] tracked: &[&str],
	#[case] reads: &[&str],
	#[case] writes: &[&str],
) -> IrpResult<()> {
	let usage = usage_of(body, tracked)?;
	assert_eq!(usage.reads, names(reads));
	assert_eq!(usage.writes, names(writes));

	Ok(())
}

#[test]
fn scan_excludes_own_variable_and_parameters() -> IrpResult<()> {
	let unit = parse_source("void provide_x(int y) { float x = y; x = x + z; }")?;
	let function = unit
		.functions()
		.next()
		.unwrap_or_else(|| panic!("no function"));
	let tracked: HashSet<String> = names(&["x", "y", "z"]).into_iter().collect();
	let reads = scanner::scan_reads(function, &tracked, Some("x"));
	assert_eq!(reads, names(&["z"]));

	Ok(())
}

#[test]
fn registry_collects_providers_and_touches() -> IrpResult<()> {
	let compilation = compile_source(touch_source())?;
	let registry = &compilation.registry;
	assert_eq!(registry.len(), 2);
	assert!(registry.is_provided("a"));
	assert!(registry.is_provided("b"));
	assert!(!registry.is_provided("main"));
	assert_eq!(
		registry.get("a").map(|p| p.declared_type()),
		Some("int")
	);
	assert_eq!(
		registry.by_function("provide_b").map(|p| p.variable.as_str()),
		Some("b")
	);

	assert_eq!(registry.touches().len(), 1);
	assert_eq!(registry.touches()[0].variable, "a");
	assert_eq!(registry.touches()[0].function, "provide_b");
	assert_eq!(registry.touched_variables(), vec!["a"]);

	Ok(())
}

#[rstest]
#[case::two_providers(
	"void provide_a() { int a; a = 1; }\nvoid provide_a() { int a; a = 2; }\n",
	"a"
)]
#[case::provider_and_global("int a;\nvoid provide_a() { int a; a = 1; }\n", "a")]
#[case::before_incomplete(
	"void provide_b() { int b; }\nvoid provide_b() { int b; b = 1; }\n",
	"b"
)]
fn duplicate_definitions(#[case] source: &str, #[case] expected: &str) {
	let result = compile_source(source);
	let Err(IrpError::DuplicateDefinition { name, first, second }) = result else {
		panic!("expected a duplicate definition, got {result:?}");
	};
	assert_eq!(name, expected);
	assert!(first.starts_with("input.irp.c:1:"));
	assert!(second.starts_with("input.irp.c:"));
}

#[test]
fn duplicate_definition_across_files() {
	let sources = [
		SourceFile::new("one.irp.c", "void provide_a() { int a; a = 1; }\n"),
		SourceFile::new("two.irp.c", "void provide_a() { int a; a = 2; }\n"),
	];
	let result = compile(&sources, &IrpConfig::default());
	let Err(IrpError::DuplicateDefinition { first, second, .. }) = result else {
		panic!("expected a duplicate definition, got {result:?}");
	};
	assert_eq!(first, "one.irp.c:1:1");
	assert_eq!(second, "two.irp.c:1:1");
}

#[rstest]
#[case::never_assigned("void provide_a() { int a; }")]
#[case::one_branch("void provide_a() { int a; if (flag) { a = 1; } }")]
#[case::early_return("void provide_a() { int a; if (flag) return; a = 1; }")]
#[case::loop_only("void provide_a() { int a; while (flag) a = 1; }")]
#[case::shadowed("void provide_a() { int a; { int a; a = 1; } }")]
#[case::shadowed_by_for("void provide_a() { int a; for (int a = 0; a < 1; a++) a = 2; }")]
#[case::do_while_break("void provide_a() { int a; do { if (flag) break; a = 1; } while (0); }")]
fn incomplete_providers(#[case] source: &str) {
	let result = compile_source(source);
	assert!(
		matches!(&result, Err(IrpError::IncompleteProvider { name, .. }) if name == "a"),
		"got {result:?}"
	);
}

#[rstest]
#[case::plain("void provide_a() { int a; a = 1; }")]
#[case::initializer("void provide_a() { int a = 1; }")]
#[case::both_branches("void provide_a() { int a; if (flag) a = 1; else a = 2; }")]
#[case::returns_after("void provide_a() { int a; a = 1; if (flag) return; a = 2; }")]
#[case::element_write("void provide_a() { int a[2]; a[0] = 1; a[1] = 2; }")]
#[case::do_while("void provide_a() { int a; do { a = 1; } while (0); }")]
#[case::do_while_condition("void provide_a() { int a; do { flag--; } while ((a = flag) > 0); }")]
#[case::after_shadow("void provide_a() { int a; { int a = 2; } a = 1; }")]
#[case::pointer_to_const("void provide_a() { const char *a = \"x\"; }")]
fn complete_providers(#[case] source: &str) -> IrpResult<()> {
	compile_source(source)?;

	Ok(())
}

#[rstest]
#[case::parameters("void provide_a(int n) { int a; a = n; }")]
#[case::non_void("int provide_a() { int a; a = 1; return a; }")]
#[case::no_declaration("void provide_a() { a = 1; }")]
#[case::shared_declaration("void provide_a() { int a, b; a = 1; b = 2; }")]
#[case::defines_touch("void touch_a() { }")]
#[case::const_variable("void provide_a() { const float a = 2; }")]
#[case::const_pointer("void provide_a() { char *const a = 0; }")]
#[case::brace_initializer("void provide_a() { int a[3] = {1, 2, 3}; }")]
#[case::array_initializer("void provide_a() { char a[4] = \"abc\"; }")]
fn malformed_providers(#[case] source: &str) {
	let result = compile_source(source);
	assert!(matches!(result, Err(IrpError::Syntax { .. })), "got {result:?}");
}

#[test]
fn unknown_touch_target() {
	let result = compile_source("int main() { touch_y(); return 0; }\n");
	let Err(IrpError::UnknownTouchTarget { name, location }) = result else {
		panic!("expected an unknown touch target, got {result:?}");
	};
	assert_eq!(name, "y");
	assert_eq!(location, "input.irp.c:1:14");
}

#[test]
fn touch_of_assigned_variable_is_accepted() -> IrpResult<()> {
	let compilation = compile_source("int main() { int y; y = 1; touch_y(); return y; }\n")?;
	assert!(compilation.output.contains("void touch_y(void)\n{\n}\n"));

	Ok(())
}

#[test]
fn graph_edges() -> IrpResult<()> {
	let compilation = compile_source(newton_source())?;
	let graph = &compilation.graph;
	assert_eq!(graph.len(), 4);

	let name_of = |ids: &[ProviderId]| -> Vec<String> {
		ids.iter().map(|&id| graph.name(id).to_string()).collect()
	};
	let x_next = graph.id("x_next").unwrap_or_else(|| panic!("no x_next"));
	let x = graph.id("x").unwrap_or_else(|| panic!("no x"));
	assert_eq!(name_of(graph.dependencies(x_next)), names(&["x", "f", "fprime"]));
	assert_eq!(name_of(graph.dependents(x)), names(&["f", "fprime", "x_next"]));
	assert_eq!(graph.edges().count(), 5);

	Ok(())
}

#[test]
fn graph_keeps_touched_inputs() -> IrpResult<()> {
	let compilation = compile_source(input_source())?;
	assert!(compilation.graph.is_input("rate"));
	assert_eq!(compilation.invalidation.dependents_of("rate"), vec!["cost"]);

	Ok(())
}

#[test]
fn topological_order_places_dependencies_first() -> IrpResult<()> {
	let compilation = compile_source(diamond_source())?;
	let order: Vec<&str> = compilation
		.order
		.ids()
		.iter()
		.map(|&id| compilation.graph.name(id))
		.collect();
	assert_eq!(order, vec!["top", "left", "right", "bottom"]);

	Ok(())
}

#[test]
fn cycle_is_reported_as_path() {
	let result = compile_source(cycle_source());
	let Err(IrpError::CyclicDependency { cycle }) = result else {
		panic!("expected a cycle, got {result:?}");
	};
	assert_eq!(cycle, names(&["a", "b", "c", "a"]));
}

#[test]
fn overwriting_a_reader_is_a_cycle() {
	let source = "void provide_a() { int a; a = 1; b = 0; }\nvoid provide_b() { int b; b = a; \
	              }\nint main() { return b; }\n";
	let result = compile_source(source);
	let Err(IrpError::CyclicDependency { cycle }) = result else {
		panic!("expected a cycle, got {result:?}");
	};
	assert_eq!(cycle, names(&["a", "b", "a"]));
}

#[test]
fn overwrites_order_providers() -> IrpResult<()> {
	let source = "void provide_late() { int late; late = 1; early = 2; }\nvoid provide_early() { int \
	              early; early = 0; }\n";
	let compilation = compile_source(source)?;
	let graph = &compilation.graph;
	let (late, early) = (
		graph.id("late").unwrap_or_else(|| panic!("late")),
		graph.id("early").unwrap_or_else(|| panic!("early")),
	);

	assert!(graph.dependencies(late).is_empty());
	assert_eq!(graph.guards(late).to_vec(), vec![early]);
	assert_eq!(graph.guarded_by(early).to_vec(), vec![late]);
	assert!(compilation.order.rank(early) < compilation.order.rank(late));
	assert!(compilation.invalidation.dependents_of("early").is_empty());

	Ok(())
}

#[test]
fn cycle_path_follows_graph_edges() -> IrpResult<()> {
	let source = "void provide_p() { int p; p = 1; }\nvoid provide_q() { int q; q = p + r; }\nvoid \
	              provide_r() { int r; r = q; }\n";
	let unit = parse_source(source)?;
	let registry = ProviderRegistry::build(&[unit], &NamingConfig::default())?;
	let graph = DependencyGraph::build(&registry);
	let Err(IrpError::CyclicDependency { cycle }) = validate_acyclic(&graph) else {
		panic!("expected a cycle");
	};
	assert_eq!(cycle.first(), cycle.last());
	for pair in cycle.windows(2) {
		let from = graph.id(&pair[0]).unwrap_or_else(|| panic!("unknown {}", pair[0]));
		let to = graph.id(&pair[1]).unwrap_or_else(|| panic!("unknown {}", pair[1]));
		assert!(graph.guards(from).contains(&to));
	}
	assert!(!cycle.contains(&"p".to_string()));

	Ok(())
}

#[test]
fn provider_set_spans_words() {
	let mut left = ProviderSet::empty(130);
	left.insert(ProviderId(70));
	left.insert(ProviderId(3));
	let mut right = ProviderSet::empty(130);
	right.insert(ProviderId(129));
	right.insert(ProviderId(64));
	right.insert(ProviderId(3));

	left.insert_all(&right);
	assert_eq!(left.len(), 4);
	assert_eq!(
		left.iter().collect::<Vec<_>>(),
		vec![ProviderId(3), ProviderId(64), ProviderId(70), ProviderId(129)]
	);
}

#[rstest]
#[case::chain(chain_source(), "a", &["b", "c", "d"])]
#[case::chain_middle(chain_source(), "c", &["d"])]
#[case::chain_leaf(chain_source(), "d", &[])]
#[case::diamond(diamond_source(), "top", &["left", "right", "bottom"])]
#[case::newton(newton_source(), "x", &["f", "fprime", "x_next"])]
#[case::unknown(newton_source(), "nothing", &[])]
fn transitive_invalidation(
	#[case] source: &str,
	#[case] variable: &str,
	#[case] expected: &[&str],
) -> IrpResult<()> {
	let compilation = compile_source(source)?;
	assert_eq!(compilation.invalidation.dependents_of(variable), expected.to_vec());

	Ok(())
}

#[test]
fn generate_simple_program() -> IrpResult<()> {
	let compilation = compile_source(simple_source())?;
	assert_eq!(compilation.output, simple_output());

	Ok(())
}

#[test]
fn generate_touch_routine() -> IrpResult<()> {
	let compilation = compile_source(touch_source())?;
	let output = &compilation.output;

	assert!(output.contains("void touch_a(void);\n"));
	assert!(output.ends_with("void touch_a(void)\n{\n  b_provided = false;\n}\n"));
	assert_eq!(output.matches("bool b_provided").count(), 1);
	assert!(output.contains(
		"void provide_b()\n{\n  if (!a_provided)\n  {\n    provide_a();\n    a_provided = true;\n  }\n  \
		 a = 20;\n  touch_a();\n  if (!a_provided)\n  {\n    provide_a();\n    a_provided = \
		 true;\n  }\n  b = a;\n}\n"
	));

	Ok(())
}

#[test]
fn generate_transitive_touch_routine() -> IrpResult<()> {
	let compilation = compile_source(chain_source())?;
	assert!(compilation.output.contains(
		"void touch_a(void)\n{\n  b_provided = false;\n  c_provided = false;\n  d_provided = \
		 false;\n}\n"
	));

	Ok(())
}

#[test]
fn generate_guard_before_overwrite() -> IrpResult<()> {
	let compilation = compile_source(chain_source())?;
	assert!(main_of(&compilation.output).starts_with(
		"int main()\n{\n  if (!a_provided)\n  {\n    provide_a();\n    a_provided = true;\n  }\n  a = \
		 5;\n  touch_a();\n"
	));

	Ok(())
}

#[test]
fn generate_storage_in_topological_order() -> IrpResult<()> {
	let compilation = compile_source(newton_source())?;
	assert!(compilation.output.contains(
		"float x;\nbool x_provided = false;\nfloat f;\nbool f_provided = false;\nfloat \
		 fprime;\nbool fprime_provided = false;\nfloat x_next;\nbool x_next_provided = false;\n"
	));
	assert!(compilation.output.starts_with(
		"#include <stdbool.h>\n#include <stdio.h>\n#include <math.h>\n\nvoid provide_x(void);\n"
	));

	Ok(())
}

#[test]
fn generate_loop_condition_guards() -> IrpResult<()> {
	let compilation = compile_source(newton_source())?;
	let main = main_of(&compilation.output);

	assert!(main.contains(
		"  if (!x_next_provided)\n  {\n    provide_x_next();\n    x_next_provided = true;\n  }\n  \
		 while ((x - x_next) > 1.e-9)\n  {\n"
	));
	assert!(main.contains(
		"    touch_x();\n    if (!x_provided)\n    {\n      provide_x();\n      x_provided = \
		 true;\n    }\n    if (!x_next_provided)\n    {\n      provide_x_next();\n      \
		 x_next_provided = true;\n    }\n  }\n"
	));

	Ok(())
}

#[test]
fn generate_guard_before_continue() -> IrpResult<()> {
	let source = "void provide_n() { int n; n = 4; }\nint main() {\n  int i;\n  for (i = 0; i < n; i++) \
	              {\n    if (i == 2) continue;\n    puts(\"x\");\n  }\n  return 0;\n}\n";
	let compilation = compile_source(source)?;
	let main = main_of(&compilation.output);

	assert!(main.contains("  for (i = 0; i < n; i++)\n  {\n"));
	assert!(main.contains(
		"    if (i == 2)\n    {\n      if (!n_provided)\n      {\n        provide_n();\n        \
		 n_provided = true;\n      }\n      continue;\n    }\n"
	));

	Ok(())
}

#[test]
fn generate_braces_only_when_needed() -> IrpResult<()> {
	let source = "void provide_a() { int a; a = 1; }\nint main() {\n  if (flag) printf(\"%d\", a); else \
	              puts(\"none\");\n  if (flag) puts(\"x\"); else if (other) puts(\"y\");\n  return \
	              0;\n}\n";
	let compilation = compile_source(source)?;
	let main = main_of(&compilation.output);

	assert!(main.contains(
		"  if (flag)\n  {\n    if (!a_provided)\n    {\n      provide_a();\n      a_provided = \
		 true;\n    }\n    printf(\"%d\", a);\n  }\n  else\n    puts(\"none\");\n"
	));
	assert!(main.contains("  if (flag)\n    puts(\"x\");\n  else if (other)\n    puts(\"y\");\n"));

	Ok(())
}

#[test]
fn generate_storage_after_type_definitions() -> IrpResult<()> {
	let source = "#define N 3\ntypedef struct { float re; float im; } complex_t;\n\nvoid provide_z() { \
	              complex_t z; z.re = 1; z.im = 0; }\nvoid provide_v() { float v[N]; v[0] = z.re; v[1] \
	              = 0; v[2] = 0; }\nint main() { return (int)v[0]; }\n";
	let compilation = compile_source(source)?;
	let output = &compilation.output;

	assert!(output.contains(
		"#define N 3\ntypedef struct { float re; float im; } complex_t;\n\ncomplex_t z;\nbool \
		 z_provided = false;\nfloat v[N];\nbool v_provided = false;\n\nvoid provide_z()\n"
	));
	assert!(output.starts_with(
		"#include <stdbool.h>\n\nvoid provide_z(void);\nvoid provide_v(void);\n\n#define N 3\n"
	));

	Ok(())
}

#[test]
fn generate_without_functions() -> IrpResult<()> {
	let compilation = compile_source("#define LIMIT 4\nint a;\n")?;
	assert_eq!(compilation.output, "#include <stdbool.h>\n\n#define LIMIT 4\nint a;\n");

	Ok(())
}

#[test]
fn generate_hoisted_initializer() -> IrpResult<()> {
	let source = "void provide_a() { int a = 5; }\nvoid provide_b() { int b = a + 1; }\nint main() { return \
	              b; }\n";
	let compilation = compile_source(source)?;
	let output = &compilation.output;

	assert!(output.contains("int a;\nbool a_provided = false;\nint b;\nbool b_provided = false;\n"));
	assert!(output.contains("void provide_a()\n{\n  a = 5;\n}\n"));
	assert!(output.contains(
		"void provide_b()\n{\n  if (!a_provided)\n  {\n    provide_a();\n    a_provided = true;\n  \
		 }\n  b = a + 1;\n}\n"
	));

	Ok(())
}

#[test]
fn generate_with_custom_naming() -> IrpResult<()> {
	let config = IrpConfig::parse(
		"[naming]\nprovider_prefix = \"make_\"\ntouch_prefix = \"reset_\"\nflag_suffix = \
		 \"_ok\"\n\n[output]\nindent = \"    \"\nprototypes = false\n",
	)?;
	let source = "void make_a() { int a; a = 1; }\nvoid make_b() { int b; b = a; }\nint main() { \
	              reset_a(); return b; }\n";
	let compilation = compile(&[SourceFile::new("input.irp.c", source)], &config)?;
	let output = &compilation.output;

	assert!(!output.contains("(void);"));
	assert!(output.contains("bool a_ok = false;\n"));
	assert!(output.contains("    if (!b_ok)\n    {\n        make_b();\n        b_ok = true;\n    }\n"));
	assert!(output.ends_with("void reset_a(void)\n{\n    b_ok = false;\n}\n"));

	Ok(())
}

#[test]
fn generate_across_files() -> IrpResult<()> {
	let sources = [
		SourceFile::new(
			"providers.irp.c",
			"#include <stdio.h>\nvoid provide_a() { int a; a = 1; }\n",
		),
		SourceFile::new(
			"main.irp.c",
			"#include <stdio.h>\nint main() { printf(\"%d\", a); return 0; }\n",
		),
	];
	let compilation = compile(&sources, &IrpConfig::default())?;
	assert_eq!(compilation.output.matches("#include <stdio.h>").count(), 1);
	assert!(main_of(&compilation.output).contains("provide_a();"));

	Ok(())
}

#[test]
fn failed_compilation_has_no_output() {
	let result = compile_source("void provide_a() { int a; }\nint main() { return a; }\n");
	assert!(result.is_err());
}

#[test]
fn scenario_single_provider_runs_once() -> Result<(), EvalError> {
	let mut evaluator = Evaluator::<i64>::new();
	evaluator.provider("a", |_| Ok(10));

	assert_eq!(evaluator.freshness("a"), Freshness::Stale);
	assert_eq!(evaluator.get("a")?, 10);
	assert_eq!(evaluator.get("a")?, 10);
	assert_eq!(evaluator.invocations("a"), 1);
	assert_eq!(evaluator.freshness("a"), Freshness::Fresh);

	Ok(())
}

#[test]
fn scenario_touch_inside_provider() -> IrpResult<()> {
	let compilation = compile_source(touch_source())?;
	let mut evaluator = Evaluator::<i64>::from_compilation(&compilation);
	evaluator
		.provider("a", |_| Ok(10))
		.provider("b", |evaluator| {
			evaluator.assign("a", 20)?;
			evaluator.touch("a");
			evaluator.get("a")
		});

	assert_eq!(evaluator.get("b").ok(), Some(20));
	assert_eq!(evaluator.invocations("a"), 1);
	assert_eq!(evaluator.invocations("b"), 1);
	assert_eq!(evaluator.freshness("b"), Freshness::Fresh);

	evaluator.touch("a");
	assert_eq!(evaluator.freshness("b"), Freshness::Stale);
	assert_eq!(evaluator.freshness("a"), Freshness::Fresh);

	Ok(())
}

#[test]
fn scenario_newton_iteration() -> IrpResult<()> {
	let compilation = compile_source(newton_source())?;
	let mut evaluator = Evaluator::<f64>::from_compilation(&compilation);
	evaluator
		.provider("x", |_| Ok(1.0))
		.provider("f", |evaluator| {
			let x = evaluator.get("x")?;
			Ok(x.cos() - x)
		})
		.provider("fprime", |evaluator| Ok(-evaluator.get("x")?.sin() - 1.0))
		.provider("x_next", |evaluator| {
			let x = evaluator.get("x")?;
			let f = evaluator.get("f")?;
			let fprime = evaluator.get("fprime")?;
			Ok(x - f / fprime)
		});

	let run = |evaluator: &mut Evaluator<f64>| -> Result<usize, EvalError> {
		let mut iterations = 0;
		while evaluator.get("x")? - evaluator.get("x_next")? > 1e-9 {
			let next = evaluator.get("x_next")?;
			evaluator.assign("x", next)?;
			evaluator.touch("x");
			iterations += 1;
		}
		Ok(iterations)
	};

	let iterations = run(&mut evaluator).unwrap_or_else(|e| panic!("evaluation failed: {e}"));
	let x = evaluator
		.get("x")
		.unwrap_or_else(|e| panic!("evaluation failed: {e}"));

	assert!((x - 0.739_085_133).abs() < 1e-6);
	assert!(iterations >= 3);
	assert_eq!(evaluator.invocations("x"), 1);
	assert_eq!(evaluator.invocations("x_next"), iterations + 1);
	assert_eq!(evaluator.invocations("f"), iterations + 1);
	assert_eq!(evaluator.invocations("fprime"), iterations + 1);

	Ok(())
}

#[test]
fn assign_when_fresh_does_not_recompute() -> Result<(), EvalError> {
	let mut evaluator = Evaluator::<i64>::new();
	evaluator.provider("x", |_| Ok(1));

	evaluator.get("x")?;
	evaluator.assign("x", 7)?;
	assert_eq!(evaluator.get("x")?, 7);
	assert_eq!(evaluator.invocations("x"), 1);

	Ok(())
}

#[test]
fn touch_is_idempotent() -> Result<(), EvalError> {
	let mut evaluator = Evaluator::<i64>::new();
	evaluator
		.provider("a", |_| Ok(1))
		.provider("b", |evaluator| Ok(evaluator.get("a")? + 1))
		.dependents("a", ["b"]);

	evaluator.get("b")?;
	evaluator.touch("a");
	evaluator.touch("a");
	assert_eq!(evaluator.freshness("b"), Freshness::Stale);
	assert_eq!(evaluator.get("b")?, 2);
	assert_eq!(evaluator.invocations("b"), 2);
	assert_eq!(evaluator.invocations("a"), 1);

	Ok(())
}

#[test]
fn failed_provider_is_retried() -> Result<(), EvalError> {
	let attempts = Rc::new(Cell::new(0));
	let counter = Rc::clone(&attempts);
	let mut evaluator = Evaluator::<i64>::new();
	evaluator.provider("a", move |_| {
		counter.set(counter.get() + 1);
		if counter.get() == 1 {
			Err(EvalError::failed("a", "boom"))
		} else {
			Ok(10)
		}
	});

	assert!(matches!(evaluator.get("a"), Err(EvalError::ProviderFailed { .. })));
	assert_eq!(evaluator.freshness("a"), Freshness::Stale);
	assert_eq!(evaluator.get("a")?, 10);
	assert_eq!(attempts.get(), 2);

	Ok(())
}

#[test]
fn reentrant_provider_is_rejected() {
	let mut evaluator = Evaluator::<i64>::new();
	evaluator.provider("a", |evaluator| evaluator.get("a"));

	assert!(matches!(evaluator.get("a"), Err(EvalError::Reentrant(name)) if name == "a"));
}

#[test]
fn unknown_variable_without_provider() -> Result<(), EvalError> {
	let mut evaluator = Evaluator::<i64>::new();
	assert!(matches!(evaluator.get("y"), Err(EvalError::UnknownVariable(_))));

	evaluator.assign("y", 3)?;
	assert_eq!(evaluator.get("y")?, 3);

	Ok(())
}

#[test]
fn graph_report_text() -> IrpResult<()> {
	let compilation = compile_source(newton_source())?;
	insta::assert_snapshot!(compilation.graph_report().to_text(), @r"
	x (float) <- -; invalidated by touch: f, fprime, x_next
	f (float) <- x; invalidated by touch: x_next
	fprime (float) <- x; invalidated by touch: x_next
	x_next (float) <- x, f, fprime; invalidated by touch: -
	touch x in main at input.irp.c:28:9
	");

	Ok(())
}

#[test]
fn graph_report_dot() -> IrpResult<()> {
	let compilation = compile_source(input_source())?;
	let dot = compilation.graph_report().to_dot();
	assert_eq!(
		dot,
		"digraph providers {\n  \"cost\";\n  \"rate\" [shape=box];\n  \"cost\" -> \"rate\";\n}\n"
	);

	Ok(())
}

#[test]
fn graph_report_json() -> IrpResult<()> {
	let compilation = compile_source(input_source())?;
	let json = serde_json::to_value(compilation.graph_report())
		.unwrap_or_else(|e| panic!("serialize: {e}"));
	assert_eq!(json["providers"][0]["variable"], "cost");
	assert_eq!(json["providers"][0]["type"], "float");
	assert_eq!(json["inputs"][0]["variable"], "rate");
	assert_eq!(json["inputs"][0]["dependents"][0], "cost");
	assert_eq!(json["touches"][0]["function"], "main");

	Ok(())
}

#[test]
fn config_defaults() {
	let config = IrpConfig::default();
	assert_eq!(config.naming.provider("x"), "provide_x");
	assert_eq!(config.naming.touch("x"), "touch_x");
	assert_eq!(config.naming.flag("x"), "x_provided");
	assert_eq!(config.naming.provided_variable("provide_x_next"), Some("x_next"));
	assert_eq!(config.naming.provided_variable("provide_"), None);
	assert_eq!(config.output.indent, "  ");
	assert!(config.output.prototypes);
	assert_eq!(config.include.patterns, names(&["*.irp.c"]));
}

#[test]
fn config_load_from_candidates() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	assert!(IrpConfig::load(tmp.path())?.is_none());

	std::fs::create_dir_all(tmp.path().join(".config"))?;
	std::fs::write(
		tmp.path().join(".config/irp.toml"),
		"[naming]\nprovider_prefix = \"make_\"\n",
	)?;
	let config = IrpConfig::load(tmp.path())?.unwrap_or_else(|| panic!("config not found"));
	assert_eq!(config.naming.provider_prefix, "make_");
	assert_eq!(config.naming.touch_prefix, "touch_");

	std::fs::write(tmp.path().join("irp.toml"), "[output]\nstdbool = false\n")?;
	let config = IrpConfig::load(tmp.path())?.unwrap_or_else(|| panic!("config not found"));
	assert!(!config.output.stdbool);
	assert_eq!(config.naming.provider_prefix, "provide_");

	Ok(())
}

#[test]
fn config_parse_error() {
	let result = IrpConfig::parse("[naming\nprovider_prefix = 1");
	assert!(matches!(result, Err(IrpError::ConfigParse(_))));
}

#[test]
fn discover_sources_in_directory() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	std::fs::create_dir_all(root.join("sub"))?;
	std::fs::create_dir_all(root.join("build"))?;
	std::fs::create_dir_all(root.join(".hidden"))?;
	std::fs::write(root.join("a.irp.c"), "")?;
	std::fs::write(root.join("notes.txt"), "")?;
	std::fs::write(root.join("sub/c.irp.c"), "")?;
	std::fs::write(root.join("build/d.irp.c"), "")?;
	std::fs::write(root.join(".hidden/e.irp.c"), "")?;

	let mut config = IrpConfig::default();
	config.exclude.patterns = names(&["build/"]);
	let options = ScanOptions::from_config(Some(&config));
	let files = discover_sources(&[root.to_path_buf()], &options)?;

	assert_eq!(files, vec![root.join("a.irp.c"), root.join("sub/c.irp.c")]);

	Ok(())
}

#[test]
fn discover_sources_respects_gitignore() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	std::fs::write(root.join(".gitignore"), "skip.irp.c\n")?;
	std::fs::write(root.join("keep.irp.c"), "")?;
	std::fs::write(root.join("skip.irp.c"), "")?;

	let files = discover_sources(&[root.to_path_buf()], &ScanOptions::default())?;
	assert_eq!(files, vec![root.join("keep.irp.c")]);

	let config = IrpConfig {
		disable_gitignore: true,
		..IrpConfig::default()
	};
	let files = discover_sources(&[root.to_path_buf()], &ScanOptions::from_config(Some(&config)))?;
	assert_eq!(files.len(), 2);

	Ok(())
}

#[test]
fn discover_sources_errors() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let options = ScanOptions::default();

	let empty = discover_sources(&[tmp.path().to_path_buf()], &options);
	assert!(matches!(empty, Err(IrpError::NoInputFiles(_))));

	let missing = discover_sources(&[tmp.path().join("missing.c")], &options);
	assert!(matches!(missing, Err(IrpError::Io(_))));

	let explicit = tmp.path().join("plain.c");
	std::fs::write(&explicit, "int x;\n")?;
	let files = discover_sources(&[explicit.clone(), explicit.clone()], &options)?;
	assert_eq!(files, vec![explicit]);

	Ok(())
}

#[test]
fn load_sources_normalizes_line_endings() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let small = tmp.path().join("small.irp.c");
	std::fs::write(&small, "int x;\r\nint y;\r\n")?;

	let sources = load_sources(&[small.clone()], &ScanOptions::from_config(None))?;
	assert_eq!(sources, vec![SourceFile::new(small, "int x;\nint y;\n")]);

	Ok(())
}

#[test]
fn load_sources_rejects_oversized_files() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let small = tmp.path().join("small.irp.c");
	let large = tmp.path().join("large.irp.c");
	std::fs::write(&small, "int x;\n")?;
	std::fs::write(&large, "x".repeat(64))?;

	let config = IrpConfig {
		max_file_size: 32,
		..IrpConfig::default()
	};
	let options = ScanOptions::from_config(Some(&config));
	let result = load_sources(&[small, large.clone()], &options);

	let Err(IrpError::FileTooLarge { path, size, limit }) = result else {
		panic!("expected FileTooLarge, got {result:?}");
	};
	assert_eq!(path, large.display().to_string());
	assert_eq!(size, 64);
	assert_eq!(limit, 32);

	Ok(())
}

#[test]
fn compile_project_with_config() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let root = tmp.path();
	std::fs::write(root.join("irp.toml"), "[output]\nstdbool = false\nprototypes = false\n")?;
	std::fs::write(root.join("simple.irp.c"), simple_source())?;

	let compilation = compile_project(root, &[])?;
	assert!(compilation.output.starts_with("#include <stdio.h>\n\nint a;\n"));

	let compilation = compile_project(root, &[PathBuf::from("simple.irp.c")])?;
	assert!(!compilation.output.contains("stdbool"));

	Ok(())
}

#[test]
fn check_output_compares_file() -> IrpResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	let path = tmp.path().join("out.c");
	let compilation = compile_source(simple_source())?;

	let missing = check_output(&compilation, &path)?;
	assert!(!missing.is_ok());
	assert!(missing.current.is_none());

	std::fs::write(&path, simple_output().replace('\n', "\r\n"))?;
	assert!(check_output(&compilation, &path)?.is_ok());

	std::fs::write(&path, "stale")?;
	assert!(!check_output(&compilation, &path)?.is_ok());

	Ok(())
}

#[tracing_test::traced_test]
#[test]
fn compile_logs_pipeline_stages() {
	compile_source(newton_source()).unwrap_or_else(|e| panic!("compile failed: {e}"));
	assert!(logs_contain("parsed sources"));
	assert!(logs_contain("registered providers"));
	assert!(logs_contain("topological order"));
	assert!(logs_contain("compilation finished"));
}
