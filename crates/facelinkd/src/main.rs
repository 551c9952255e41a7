use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod navigator;

const BUS_NAME: &str = "org.freedesktop.FaceLink1";
const OBJECT_PATH: &str = "/org/freedesktop/FaceLink1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facelinkd starting");

    let config = config::Config::from_env();
    let engine::Engine { handle, mut exited } =
        engine::spawn_engine(&config).context("failed to start engine")?;

    let service = dbus_interface::FaceLinkService::new(
        handle.clone(),
        config.camera_device.clone(),
        config.api_url.clone(),
    );
    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on the session bus")?;

    tracing::info!(bus = BUS_NAME, "facelinkd ready");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("facelinkd shutting down");
            // The loop may already have stopped on its own.
            let _ = handle.shutdown().await;
            match exited.await {
                Ok(result) => result?,
                Err(_) => anyhow::bail!("engine thread ended without reporting"),
            }
        }
        result = &mut exited => match result {
            Ok(Ok(())) => tracing::info!("engine stopped"),
            Ok(Err(e)) => return Err(e).context("engine failed"),
            Err(_) => anyhow::bail!("engine thread ended without reporting"),
        },
    }

    Ok(())
}
