pub mod engine;
pub mod progress;

pub use engine::{CHUNK_SIZE, ChunkedDownloader};
pub use progress::{DownloadEvent, DownloadProgress, DownloadState};

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::DEFAULT_USER_AGENT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub output_path: PathBuf,
    pub user_agent: Option<String>,
    pub chunk_size: usize,
    pub idle_timeout: Duration,
}

impl DownloadRequest {
    pub fn new(url: String, output_path: PathBuf) -> Self {
        Self {
            url,
            output_path,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            chunk_size: CHUNK_SIZE,
            idle_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = Some(user_agent);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn file_name(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.output_path.display().to_string())
    }
}

/// Local file name for a direct URL: the last path segment, or `download`.
pub fn file_name_from_url(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut s| s.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "download".to_string())
}

/// `dir/<file name from url>`.
pub fn destination_for(url: &str, dir: &Path) -> PathBuf {
    dir.join(file_name_from_url(url))
}
