use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use ics_crawler::{Config, Crawler};

#[derive(Parser, Debug)]
#[command(name = "ics-crawler", about = "Polite multi-threaded crawler for the UCI ICS web space")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Discard any saved frontier state and start over from the seeds.
    #[arg(long)]
    restart: bool,
}

fn main() {
    // Initialize tracing with RUST_LOG env filter (defaults to "info")
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::from_file(&args.config).expect("failed to load configuration");
    let mut crawler = Crawler::new(&config, args.restart).expect("failed to build crawler");
    crawler
        .install_signal_handler()
        .expect("failed to install signal handler");

    crawler.run();
}
