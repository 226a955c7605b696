//! refract CLI binary entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    refract::cli::run()
}
