use std::path::PathBuf;

use crate::error::DownloadError;

/// Lifecycle of one download: `Idle -> Running -> {Completed, Cancelled, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Cancelled | DownloadState::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    /// 0 when the server sent no content length
    pub total_bytes: u64,
    /// In `[0, 1]`; stays 0 when the total is unknown
    pub fraction_complete: f64,
}

impl DownloadProgress {
    pub fn new(bytes_downloaded: u64, total_bytes: u64) -> Self {
        let fraction_complete = if total_bytes > 0 {
            (bytes_downloaded as f64 / total_bytes as f64).min(1.0)
        } else {
            0.0
        };

        Self {
            bytes_downloaded,
            total_bytes,
            fraction_complete,
        }
    }

    pub fn is_size_known(&self) -> bool {
        self.total_bytes > 0
    }

    pub fn percent(&self) -> f64 {
        self.fraction_complete * 100.0
    }

    pub fn status_text(&self, file_name: &str) -> String {
        if self.is_size_known() {
            format!(
                "Downloading {}: {} of {} bytes [{:.2}%]",
                file_name,
                self.bytes_downloaded,
                self.total_bytes,
                self.percent()
            )
        } else {
            format!("Downloading {}: {} bytes", file_name, self.bytes_downloaded)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Started {
        url: String,
        output_path: PathBuf,
        total_bytes: u64,
    },
    /// One per chunk written
    Progress {
        progress: DownloadProgress,
        status: String,
    },
    Completed {
        bytes_downloaded: u64,
    },
    Cancelled {
        bytes_downloaded: u64,
    },
    Failed {
        error: DownloadError,
        bytes_downloaded: u64,
    },
}

impl DownloadEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed { .. }
                | DownloadEvent::Cancelled { .. }
                | DownloadEvent::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        assert_eq!(DownloadProgress::new(50, 200).fraction_complete, 0.25);
        assert_eq!(DownloadProgress::new(300, 200).fraction_complete, 1.0);
        assert_eq!(DownloadProgress::new(300, 0).fraction_complete, 0.0);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(
            DownloadProgress::new(8192, 16384).status_text("a.mkv"),
            "Downloading a.mkv: 8192 of 16384 bytes [50.00%]"
        );
        assert_eq!(
            DownloadProgress::new(10, 0).status_text("a.mkv"),
            "Downloading a.mkv: 10 bytes"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DownloadState::Running.is_terminal());
        assert!(DownloadState::Cancelled.is_terminal());
    }
}
