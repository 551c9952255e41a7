use crate::engine::{EngineError, EngineHandle};
use facelink_core::Point;
use std::path::PathBuf;
use zbus::interface;

/// D-Bus interface for the FaceLink overlay daemon.
///
/// Bus name: org.freedesktop.FaceLink1
/// Object path: /org/freedesktop/FaceLink1
pub struct FaceLinkService {
    engine: EngineHandle,
    camera_device: String,
    api_url: String,
}

impl FaceLinkService {
    pub fn new(engine: EngineHandle, camera_device: String, api_url: String) -> Self {
        Self {
            engine,
            camera_device,
            api_url,
        }
    }
}

fn failed(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

#[interface(name = "org.freedesktop.FaceLink1")]
impl FaceLinkService {
    /// Pointer press at (x, y) on a display of the given size.
    ///
    /// Returns the identity id whose profile was opened, or "" on a miss.
    async fn click(
        &self,
        x: f64,
        y: f64,
        display_width: f64,
        display_height: f64,
    ) -> zbus::fdo::Result<String> {
        tracing::debug!(x, y, display_width, display_height, "click requested");
        let opened = self
            .engine
            .click(
                Point::new(x as f32, y as f32),
                (display_width as f32, display_height as f32),
            )
            .await
            .map_err(failed)?;
        Ok(opened.unwrap_or_default())
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let status = self.engine.status().await.map_err(failed)?;
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": self.camera_device,
            "api_url": self.api_url,
            "surface": [status.surface_width, status.surface_height],
            "recognitions_in_flight": status.recognitions_in_flight,
            "pipeline": status.stats,
        })
        .to_string())
    }

    /// Write the current overlay to an image file on the daemon's filesystem.
    async fn snapshot(&self, path: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(path, "snapshot requested");
        match self.engine.snapshot(PathBuf::from(path)).await {
            Ok(()) => Ok(true),
            Err(EngineError::NothingRendered) => Ok(false),
            Err(e) => Err(failed(e)),
        }
    }
}
