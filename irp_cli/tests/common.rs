#![allow(dead_code)]

use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub const SIMPLE: &str = "#include <stdio.h>\n\nvoid provide_a() {\n    int a;\n    a = 10;\n}\n\nint \
                          main() {\n    printf(\"a = %d\\n\", a);\n    return 0;\n}\n";

pub const NEWTON: &str = "#include <stdio.h>
#include <math.h>

void provide_x() { float x; x = 1; }
void provide_f() { float f; f = cos(x) - x; }
void provide_fprime() { float fprime; fprime = -sin(x) - 1; }
void provide_x_next() { float x_next; x_next = x - f / fprime; }

int main() {
    while ((x - x_next) > 1.e-9) {
        x = x_next;
        touch_x();
    }
    printf(\"%f\\n\", x);
    return 0;
}
";

pub fn irp_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("irp"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("RUST_LOG");
	cmd
}
