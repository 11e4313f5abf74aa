use anyhow::Result;
use demo_app::{setup, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let telemetry = setup::setup(&config)?;

    let served = demo_app::run_server(&config, telemetry.metrics().clone()).await;

    tokio::task::spawn_blocking(move || telemetry.shutdown()).await?;
    served
}
