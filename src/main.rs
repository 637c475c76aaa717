use clap::Parser;
use chaintrader::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
