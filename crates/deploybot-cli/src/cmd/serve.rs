use anyhow::Context;
use deploybot_core::config::Secrets;
use deploybot_server::AppState;
use std::path::Path;

pub fn run(config_path: &Path, port: u16) -> anyhow::Result<()> {
    let config = super::load_valid_config(config_path)?;
    let secrets = Secrets::from_env().context("missing credentials")?;
    let state = AppState::from_config(&config, &secrets)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        tokio::select! {
            res = deploybot_server::serve_on(state, listener) => res,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                Ok(())
            }
        }
    })
}
