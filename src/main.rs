//! herder - process supervisor daemon
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;

/// herder - spawn processes and stream their output to watchers
#[derive(Parser, Debug)]
#[command(name = "herder")]
#[command(about = "A process supervisor daemon", long_about = None)]
struct Args {
    /// Path to the settings file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:20202
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,

    /// Directory for log files (default: ~/.local/share/herder/logs)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let log_dir = herder_core::logging::init(args.log_dir)?;
    eprintln!("Logging to {}", log_dir.display());

    herder::run(args.config, args.listen).await?;
    Ok(())
}
