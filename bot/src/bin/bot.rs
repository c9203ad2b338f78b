//! IRC bot binary.

use bot::config::{Config, DEFAULT_CONFIG};
use bot::logging;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bot")]
#[command(about = "IRC bot that stays connected")]
struct Args {
    /// Path to configuration file
    config: Option<PathBuf>,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    let args = Args::parse();

    if args.print_config {
        print!("{}", DEFAULT_CONFIG);
        return;
    }

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            eprintln!("No config file specified. Pass a path or use --print-config");
            std::process::exit(1);
        }
    };

    logging::init(&config.logging);

    if let Err(e) = bot::run(&config) {
        tracing::error!(error = %e, "bot error");
        std::process::exit(1);
    }
}
