//! Command line entry point of s3bench.
#![warn(missing_debug_implementations)]

use yansi::Paint;

fn main() {
    if let Err(err) = s3bench::cli::execute() {
        eprintln!("{}", format!("error: {err:#}").red().bold());
        std::process::exit(1);
    }
}
