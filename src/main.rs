//! `reclaim` binary entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let cli = cli_app::Cli::parse();
    if let Err(err) = cli_app::run(&cli) {
        eprintln!("reclaim: {err}");
        std::process::exit(err.exit_code());
    }
}
