use std::path::PathBuf;

use crate::IrpConfig;
use crate::IrpResult;
use crate::project::SourceFile;
use crate::syntax::Function;
use crate::syntax::SourceUnit;

/// One provider read once in `main`.
pub fn simple_source() -> &'static str {
	"#include <stdio.h>\n\nvoid provide_a() {\n    int a;\n    a = 10;\n}\n\nint main() {\n    \
	 printf(\"a = %d\\n\", a);\n    return 0;\n}\n"
}

pub fn simple_output() -> &'static str {
	"#include <stdbool.h>
#include <stdio.h>

void provide_a(void);

int a;
bool a_provided = false;

void provide_a()
{
  a = 10;
}

int main()
{
  if (!a_provided)
  {
    provide_a();
    a_provided = true;
  }
  printf(\"a = %d\\n\", a);
  return 0;
}
"
}

/// A provider that overwrites another provider's variable and touches it.
pub fn touch_source() -> &'static str {
	"#include <stdio.h>

void provide_a() {
    int a;
    a = 10;
}

void provide_b() {
    int b;
    a = 20;
    touch_a();
    b = a;
}

int main() {
    printf(\"b = %i\\n\", b);
    return 0;
}
"
}

/// Newton iteration for `cos(x) = x`.
pub fn newton_source() -> &'static str {
	"#include <stdio.h>
#include <math.h>

void provide_x() {
    float x;
    x = 1;
}

void provide_f() {
    float f;
    f = cos(x) - x;
}

void provide_fprime() {
    float fprime;
    fprime = -sin(x) - 1;
}

void provide_x_next() {
    float x_next;
    x_next = x - f / fprime;
}

int main() {
    printf(\"x %f\\n\", x);
    while ((x - x_next) > 1.e-9) {
        x = x_next;
        touch_x();
    }
    printf(\"x converged %f\\n\", x);
    return 0;
}
"
}

/// `d` reads `c` reads `b` reads `a`.
pub fn chain_source() -> &'static str {
	"void provide_a() { int a; a = 1; }
void provide_b() { int b; b = a + 1; }
void provide_c() { int c; c = b + 1; }
void provide_d() { int d; d = c + 1; }

int main() {
    a = 5;
    touch_a();
    return d;
}
"
}

/// `bottom` reads `left` and `right`, both of which read `top`.
pub fn diamond_source() -> &'static str {
	"void provide_top() { int top; top = 1; }
void provide_left() { int left; left = top * 2; }
void provide_right() { int right; right = top * 3; }
void provide_bottom() { int bottom; bottom = left + right; }

int main() {
    top = 2;
    touch_top();
    return bottom;
}
"
}

pub fn cycle_source() -> &'static str {
	"void provide_a() { int a; a = b + 1; }
void provide_b() { int b; b = c + 1; }
void provide_c() { int c; c = a + 1; }

int main() { return a; }
"
}

/// A global without a provider that is touched after being assigned.
pub fn input_source() -> &'static str {
	"#include <stdio.h>

float rate;

void provide_cost() {
    float cost;
    cost = rate * 2;
}

int main() {
    rate = 3;
    touch_rate();
    printf(\"%f\\n\", cost);
    return 0;
}
"
}

pub fn compile_source(source: &str) -> IrpResult<crate::Compilation> {
	crate::compile(&[SourceFile::new("input.irp.c", source)], &IrpConfig::default())
}

pub fn parse_source(source: &str) -> IrpResult<SourceUnit> {
	crate::parse(source, &PathBuf::from("input.irp.c"), "touch_")
}

/// Parse `body` as the body of a function called `sample`.
pub fn body_function(body: &str) -> IrpResult<Function> {
	let unit = parse_source(&format!("void sample() {{ {body} }}"))?;
	let function = unit
		.functions()
		.next()
		.cloned()
		.unwrap_or_else(|| panic!("no function parsed from `{body}`"));
	Ok(function)
}
