use crate::bridge::Bridge;
use crate::config::Config;
use crate::error::Result;
use tracing::info;

pub async fn execute() -> Result<()> {
    let config = Config::load()?;
    let bridge = Bridge::start(config).await?;

    info!("Bridge running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    bridge.shutdown().await;

    Ok(())
}
