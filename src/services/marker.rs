//! Volatile marker files for cross-restart state tracking.
//!
//! Marker files record whether certain events have occurred or been
//! acknowledged. Kept in `/tmp/`, they are lost on reboot, which is when the
//! controller probes the radio from scratch anyway.

use log::{error, info};
use std::{
    fs, io,
    io::ErrorKind,
    path::PathBuf,
};

/// A marker file whose presence is the recorded state
#[derive(Clone, Debug)]
pub struct MarkerFile {
    path: PathBuf,
    label: &'static str,
}

impl MarkerFile {
    pub fn new(path: impl Into<PathBuf>, label: &'static str) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }

    /// Set the marker file, recording `detail` as its content.
    pub fn set(&self, detail: &str) -> io::Result<()> {
        info!("Setting {} marker at: {:?}", self.label, self.path);
        fs::write(&self.path, detail)
    }

    /// Set the marker file, logging errors instead of propagating them.
    pub fn set_or_log(&self, detail: &str) {
        if let Err(e) = self.set(detail) {
            error!("Failed to set {} marker: {e}", self.label);
        }
    }

    /// Content recorded when the marker was set.
    pub fn detail(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    /// Clear the marker file. NotFound is silently ignored.
    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => info!("Cleared {} marker", self.label),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => error!("Failed to clear {} marker: {e}", self.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_detail_and_clear() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let marker = MarkerFile::new(dir.path().join("failed"), "test");

        assert_eq!(marker.detail(), None);

        marker.set("`systemctl stop hostapd` timed out").expect("should set");
        assert_eq!(
            marker.detail().as_deref(),
            Some("`systemctl stop hostapd` timed out")
        );

        marker.clear();
        assert_eq!(marker.detail(), None);

        // clearing twice is fine
        marker.clear();
    }
}
