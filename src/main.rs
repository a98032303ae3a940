//! Assetpipe - build front-end assets and serve them with live reload

use std::process::ExitCode;

use assetpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
