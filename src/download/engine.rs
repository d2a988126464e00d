use async_trait::async_trait;
use futures_util::TryStreamExt;
use std::io;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DownloadEvent, DownloadProgress, DownloadRequest, DownloadState};
use crate::error::DownloadError;
use crate::fetch::{DEFAULT_USER_AGENT, HttpFetcher};
use crate::tasks::{Emitter, Task, TaskOutcome};

pub const CHUNK_SIZE: usize = 8192;

/// Streams one URL to a local file in fixed-size chunks.
///
/// Each chunk is written, then reported as a [`DownloadEvent::Progress`].
/// Cancellation is checked before every chunk read; a cancelled download
/// leaves its partial file on disk.
pub struct ChunkedDownloader {
    request: DownloadRequest,
    fetcher: HttpFetcher,
    state: DownloadState,
    bytes_downloaded: u64,
}

impl ChunkedDownloader {
    pub fn new(request: DownloadRequest, fetcher: HttpFetcher) -> Self {
        Self {
            request,
            fetcher,
            state: DownloadState::Idle,
            bytes_downloaded: 0,
        }
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    pub fn state(&self) -> DownloadState {
        self.state
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded
    }

    /// Run the transfer and return the terminal state. Exactly one terminal
    /// event is emitted.
    pub async fn download(
        &mut self,
        cancel: &CancellationToken,
        emitter: &mut Emitter<DownloadEvent>,
    ) -> DownloadState {
        self.state = DownloadState::Running;

        let state = match self.transfer(cancel, emitter).await {
            Ok(state) => state,
            Err(error) => {
                warn!("Download of {} failed: {}", self.request.url, error);
                emitter.emit(DownloadEvent::Failed {
                    error,
                    bytes_downloaded: self.bytes_downloaded,
                });
                DownloadState::Failed
            }
        };

        self.state = state;
        state
    }

    async fn transfer(
        &mut self,
        cancel: &CancellationToken,
        emitter: &mut Emitter<DownloadEvent>,
    ) -> Result<DownloadState, DownloadError> {
        let url = self.request.url.clone();
        let user_agent = self
            .request
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                emitter.emit(DownloadEvent::Cancelled { bytes_downloaded: 0 });
                return Ok(DownloadState::Cancelled);
            }
            response = self.fetcher.fetch(&url, &user_agent) => response?,
        };

        let total_bytes = response.content_length().unwrap_or(0);
        let path = self.request.output_path.clone();
        let file_name = self.request.file_name();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| filesystem_error(parent, e))?;
        }
        let mut file = File::create(&path)
            .await
            .map_err(|e| filesystem_error(&path, e))?;

        info!(
            "Downloading {} to {} ({} bytes)",
            url,
            path.display(),
            total_bytes
        );
        emitter.emit(DownloadEvent::Started {
            url: url.clone(),
            output_path: path.clone(),
            total_bytes,
        });

        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader = StreamReader::new(Box::pin(stream));
        let mut buffer = vec![0u8; self.request.chunk_size];
        let idle_timeout = self.request.idle_timeout;

        loop {
            if cancel.is_cancelled() {
                file.flush().await.map_err(|e| filesystem_error(&path, e))?;
                info!(
                    "Download of {} cancelled after {} bytes",
                    file_name, self.bytes_downloaded
                );
                emitter.emit(DownloadEvent::Cancelled {
                    bytes_downloaded: self.bytes_downloaded,
                });
                return Ok(DownloadState::Cancelled);
            }

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => continue,
                read = timeout(idle_timeout, read_chunk(&mut reader, &mut buffer)) => read,
            };

            let len = match read {
                Err(_) => return Err(DownloadError::Timeout(idle_timeout.as_secs())),
                Ok(Err(e)) => return Err(DownloadError::Stream(e.to_string())),
                Ok(Ok(0)) => break,
                Ok(Ok(len)) => len,
            };

            file.write_all(&buffer[..len])
                .await
                .map_err(|e| filesystem_error(&path, e))?;

            self.bytes_downloaded += len as u64;
            let progress = DownloadProgress::new(self.bytes_downloaded, total_bytes);
            emitter.emit(DownloadEvent::Progress {
                status: progress.status_text(&file_name),
                progress,
            });
        }

        file.flush().await.map_err(|e| filesystem_error(&path, e))?;
        debug!("Finished {} ({} bytes)", file_name, self.bytes_downloaded);
        emitter.emit(DownloadEvent::Completed {
            bytes_downloaded: self.bytes_downloaded,
        });
        Ok(DownloadState::Completed)
    }
}

#[async_trait]
impl Task for ChunkedDownloader {
    type Event = DownloadEvent;

    fn kind(&self) -> &'static str {
        "download"
    }

    fn cancelled_event(&self) -> DownloadEvent {
        DownloadEvent::Cancelled { bytes_downloaded: 0 }
    }

    async fn run(mut self, cancel: CancellationToken, mut emitter: Emitter<DownloadEvent>) -> TaskOutcome {
        match self.download(&cancel, &mut emitter).await {
            DownloadState::Completed => TaskOutcome::Completed,
            DownloadState::Cancelled => TaskOutcome::Cancelled,
            _ => TaskOutcome::Failed,
        }
    }
}

// Fill `buffer` completely unless the stream ends first, so every chunk but
// the last has exactly the configured size.
async fn read_chunk<R>(reader: &mut R, buffer: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

fn filesystem_error(path: &Path, err: io::Error) -> DownloadError {
    DownloadError::Filesystem {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::streaming(Duration::from_secs(5)).unwrap()
    }

    fn recorder() -> (Arc<Mutex<Vec<DownloadEvent>>>, Emitter<DownloadEvent>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let emitter = Emitter::new(move |event| sink.lock().unwrap().push(event));
        (events, emitter)
    }

    fn progress_events(events: &[DownloadEvent]) -> Vec<DownloadProgress> {
        events
            .iter()
            .filter_map(|e| match e {
                DownloadEvent::Progress { progress, .. } => Some(*progress),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_progress_per_chunk() {
        let size = CHUNK_SIZE * 3 + 100;
        let body = vec![7u8; size];

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/file.bin")
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested").join("file.bin");
        let request = DownloadRequest::new(format!("{}/file.bin", server.url()), output.clone());

        let (events, mut emitter) = recorder();
        let mut downloader = ChunkedDownloader::new(request, fetcher());
        let state = downloader
            .download(&CancellationToken::new(), &mut emitter)
            .await;

        assert_eq!(state, DownloadState::Completed);
        assert_eq!(downloader.state(), DownloadState::Completed);

        let events = events.lock().unwrap();
        let progress = progress_events(&events);
        assert_eq!(progress.len(), 4);
        assert_eq!(progress.last().unwrap().bytes_downloaded, size as u64);
        assert_eq!(progress.last().unwrap().fraction_complete, 1.0);
        assert!(
            progress
                .windows(2)
                .all(|w| w[1].fraction_complete > w[0].fraction_complete)
        );
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Completed { bytes_downloaded }) if *bytes_downloaded == size as u64
        ));

        assert_eq!(std::fs::read(&output).unwrap(), body);
    }

    #[tokio::test]
    async fn test_cancel_leaves_partial_file() {
        let size = CHUNK_SIZE * 10;
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/big.bin")
            .with_status(200)
            .with_body(vec![1u8; size])
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("big.bin");
        let request = DownloadRequest::new(format!("{}/big.bin", server.url()), output.clone());

        // Cancel from inside the consumer as soon as the first chunk lands
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut emitter = Emitter::new(move |event: DownloadEvent| {
            if matches!(event, DownloadEvent::Progress { .. }) {
                trigger.cancel();
            }
            sink.lock().unwrap().push(event);
        });

        let mut downloader = ChunkedDownloader::new(request, fetcher());
        let state = downloader.download(&cancel, &mut emitter).await;

        assert_eq!(state, DownloadState::Cancelled);
        let events = events.lock().unwrap();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, DownloadEvent::Completed { .. }))
        );
        assert_eq!(progress_events(&events).len(), 1);

        let on_disk = std::fs::metadata(&output).unwrap().len();
        assert_eq!(on_disk, CHUNK_SIZE as u64);
        assert!(on_disk < size as u64);
    }

    #[tokio::test]
    async fn test_unknown_length_reports_bytes_only() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stream")
            .with_status(200)
            .with_chunked_body(|w| w.write_all(&[5u8; 1000]))
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let request = DownloadRequest::new(
            format!("{}/stream", server.url()),
            dir.path().join("stream.bin"),
        );

        let (events, mut emitter) = recorder();
        let state = ChunkedDownloader::new(request, fetcher())
            .download(&CancellationToken::new(), &mut emitter)
            .await;

        assert_eq!(state, DownloadState::Completed);
        let events = events.lock().unwrap();
        let progress = progress_events(&events);
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].bytes_downloaded, 1000);
        assert_eq!(progress[0].total_bytes, 0);
        assert_eq!(progress[0].fraction_complete, 0.0);
    }

    #[tokio::test]
    async fn test_http_error_fails_without_creating_file() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/gone")
            .with_status(410)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("gone.bin");
        let request = DownloadRequest::new(format!("{}/gone", server.url()), output.clone());

        let (events, mut emitter) = recorder();
        let state = ChunkedDownloader::new(request, fetcher())
            .download(&CancellationToken::new(), &mut emitter)
            .await;

        assert_eq!(state, DownloadState::Failed);
        assert!(!output.exists());
        match events.lock().unwrap().as_slice() {
            [DownloadEvent::Failed { error: DownloadError::Fetch(e), .. }] => {
                assert_eq!(e.kind, FetchErrorKind::HttpStatus);
                assert_eq!(e.code, Some(410));
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_stream_fails_after_idle_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stall")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(&[9u8; CHUNK_SIZE])?;
                std::thread::sleep(Duration::from_secs(3));
                Ok(())
            })
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("stall.bin");
        let request = DownloadRequest::new(format!("{}/stall", server.url()), output.clone())
            .with_idle_timeout(Duration::from_secs(1));

        let (events, mut emitter) = recorder();
        let state = ChunkedDownloader::new(request, fetcher())
            .download(&CancellationToken::new(), &mut emitter)
            .await;

        assert_eq!(state, DownloadState::Failed);
        assert!(output.exists());

        let events = events.lock().unwrap();
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, DownloadEvent::Completed { .. }))
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed {
                error: DownloadError::Timeout(1),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_broken_stream_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/broken")
            .with_status(200)
            .with_chunked_body(|w| {
                w.write_all(&[3u8; CHUNK_SIZE])?;
                Err(io::Error::other("connection reset"))
            })
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let output = dir.path().join("broken.bin");
        let request = DownloadRequest::new(format!("{}/broken", server.url()), output.clone());

        let (events, mut emitter) = recorder();
        let mut downloader = ChunkedDownloader::new(request, fetcher());
        let state = downloader
            .download(&CancellationToken::new(), &mut emitter)
            .await;

        assert_eq!(state, DownloadState::Failed);
        assert!(output.exists());
        assert!(downloader.bytes_downloaded() <= CHUNK_SIZE as u64);

        let events = events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(
            events.last(),
            Some(DownloadEvent::Failed {
                error: DownloadError::Stream(_),
                ..
            })
        ));
    }
}
