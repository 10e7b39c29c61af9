mod changelog;
mod cli;
mod client;
mod config;
mod content;
mod error;
mod feed;
mod kv;
mod server;
mod source;
mod util;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt::init();

  #[cfg(unix)]
  {
    tokio::spawn(async {
      if let Err(e) = signal_handler().await {
        tracing::error!("signal handler failed: {e}");
      }
    });
  }

  let cli = cli::Cli::parse();
  cli.run().await
}

#[cfg(unix)]
async fn signal_handler() -> std::io::Result<()> {
  use tokio::signal::unix::{SignalKind, signal};
  use tracing::info;

  let mut sigint = signal(SignalKind::interrupt())?;
  let mut sigterm = signal(SignalKind::terminate())?;

  tokio::select! {
    _ = sigint.recv() => {
      info!("Received SIGINT, shutting down...");
    }
    _ = sigterm.recv() => {
      info!("Received SIGTERM, shutting down...");
    }
  };

  std::process::exit(0)
}
