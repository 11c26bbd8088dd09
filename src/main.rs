// Segtrain - segmentation training harness
// Flag-driven entry point (no tracking)

use anyhow::Result;
use clap::Parser;

use segtrain::config::{Settings, TrainArgs};
use segtrain::errors::user_facing;
use segtrain::logging::init_tracing;
use segtrain::TrainingRunner;

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit here (code 2) before anything else happens
    let args = TrainArgs::parse();

    init_tracing();

    let request = args.into_request()?;
    let settings = Settings::load()?;

    let runner = TrainingRunner::new(settings.trainer);
    runner.run(&request).await.map_err(user_facing)?;

    Ok(())
}
