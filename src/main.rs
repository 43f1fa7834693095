mod app;
mod audio;
mod config;
mod controller;
mod engine;
mod error;
mod input;
mod messages;
mod permission;
mod progress;
mod reconcile;

use app::App;
use config::Config;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the status line
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    tracing::info!("Starting voux");

    let config = Config::load()?;
    config.validate()?;

    // Player and recorder handles are Rc-shared and hold !Send streams
    let local = tokio::task::LocalSet::new();

    local
        .run_until(async move { App::new(config)?.run().await })
        .await
}
