pub mod config;
pub mod download;
pub mod error;
pub mod fetch;
pub mod parser;
pub mod tasks;

// Re-export commonly used types for easier access in tests
pub use config::{Config, ConfigManager};
pub use download::{
    ChunkedDownloader, DownloadEvent, DownloadProgress, DownloadRequest, DownloadState,
};
pub use error::{ApiError, ApiErrorKind, DownloadError, FetchError, FetchErrorKind, TaskError};
pub use fetch::HttpFetcher;
pub use parser::{ExtractionRule, HosterEntry, ListingRecord, PageParser};
pub use tasks::{Emitter, Task, TaskHandle, TaskOutcome, TaskRunner};
