use clap::Parser;
use tracing_subscriber::EnvFilter;

use ugv_messenger::config::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = ugv_messenger::runtime::run(cli).await {
        eprintln!("Messenger error: {}", e);
        std::process::exit(1);
    }
}
