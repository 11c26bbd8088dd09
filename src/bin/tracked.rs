// Segtrain - segmentation training harness
// Environment-driven entry point with experiment tracking

use anyhow::Result;

use segtrain::errors::user_facing;
use segtrain::logging::init_tracing;
use segtrain::runner::run_tracked_from_env;
use segtrain::tracking::MlflowClient;
use segtrain::training::ProcessTrainer;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    run_tracked_from_env(|key| std::env::var_os(key), ProcessTrainer::new(), MlflowClient::new)
        .await
        .map_err(user_facing)?;

    Ok(())
}
