use std::str::FromStr;

use clap::Parser;
use tracing::Level;

/// AegisFlux ETL enrichment daemon.
#[derive(Parser, Debug)]
#[command(name = "etld", version, about = "AegisFlux ETL enrichment daemon")]
struct Args {
    /// Emit newline-delimited JSON log lines
    #[arg(long, env = "AF_LOG_JSON")]
    json_logs: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "AF_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let level = Level::from_str(&args.log_level).unwrap_or(Level::INFO);
    etl_core::init_tracing(args.json_logs, level);

    let config = etl_core::Config::from_env();
    if let Err(err) = etld::supervisor::run(config).await {
        tracing::error!(error = %err, "fatal error");
        std::process::exit(1);
    }
}
