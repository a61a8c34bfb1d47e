use crate::engine::{EngineError, EngineHandle};
use std::path::PathBuf;
use std::time::Duration;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// D-Bus interface for the attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    request_timeout: Duration,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, request_timeout: Duration) -> Self {
        Self { engine, request_timeout }
    }
}

fn engine_failure(err: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(err.to_string())
}

/// Paths arrive from another process with its own working directory, so only
/// absolute paths are meaningful here.
fn image_paths(paths: Vec<String>) -> zbus::fdo::Result<Vec<PathBuf>> {
    if paths.is_empty() {
        return Err(zbus::fdo::Error::InvalidArgs("no images given".into()));
    }
    paths
        .into_iter()
        .map(|p| {
            let path = PathBuf::from(&p);
            if path.is_absolute() {
                Ok(path)
            } else {
                Err(zbus::fdo::Error::InvalidArgs(format!("image path must be absolute: {p}")))
            }
        })
        .collect()
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Match the given images and record today's attendance.
    ///
    /// Returns a JSON array of every record accepted in this call, including
    /// people already recorded earlier today.
    async fn mark_attendance(&self, paths: Vec<String>) -> zbus::fdo::Result<String> {
        let paths = image_paths(paths)?;
        tracing::info!(images = paths.len(), "mark_attendance requested");

        let result = tokio::time::timeout(self.request_timeout, self.engine.mark(paths))
            .await
            .map_err(|_| {
                tracing::warn!(timeout = ?self.request_timeout, "mark_attendance timed out");
                zbus::fdo::Error::TimedOut("attendance run timed out".into())
            })?
            .map_err(engine_failure)?;
        tracing::info!(
            present = result.run.present.len(),
            accepted = result.recorded.records.len(),
            appended = result.recorded.appended.len(),
            unknown = result.run.faces_unknown,
            "mark_attendance finished"
        );

        serde_json::to_string(&result.recorded.records).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Rebuild the gallery from the dataset directory. Returns the identity count.
    async fn reload_gallery(&self) -> zbus::fdo::Result<u32> {
        tracing::info!("reload_gallery requested");
        let count = tokio::time::timeout(self.request_timeout, self.engine.reload())
            .await
            .map_err(|_| zbus::fdo::Error::TimedOut("gallery reload timed out".into()))?
            .map_err(engine_failure)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "identities": self.engine.identities(),
            "request_timeout_secs": self.request_timeout.as_secs(),
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_paths_require_absolute() {
        assert!(image_paths(vec![]).is_err());
        assert!(image_paths(vec!["class.jpg".into()]).is_err());
        let ok = image_paths(vec!["/srv/photos/class.jpg".into()]).unwrap();
        assert_eq!(ok, vec![PathBuf::from("/srv/photos/class.jpg")]);
    }
}
