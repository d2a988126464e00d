use anyhow::{Context, Result};
use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process;
use tvlinker::{ChunkedDownloader, Config, DownloadEvent, HttpFetcher, TaskRunner};

use super::resolve_direct_link;

pub async fn handle_download(
    config: &Config,
    url: String,
    output: Option<PathBuf>,
    unrestrict: bool,
) -> Result<()> {
    let term = Term::stdout();

    let url = if unrestrict {
        resolve_direct_link(config, url).await?
    } else {
        url
    };

    let request = config.download_request(&url, output);
    let file_name = request.file_name();

    term.write_line(&format!(
        "{} Downloading {}",
        style("⬇️").cyan(),
        style(&file_name).cyan().bold()
    ))?;
    term.write_line(&format!(
        "{} Destination: {}",
        style("📁").cyan(),
        style(request.output_path.display()).cyan()
    ))?;

    let fetcher = HttpFetcher::streaming(config.request_timeout())
        .context("Failed to create HTTP client")?;
    let runner = TaskRunner::new(config.general.max_concurrent_tasks as usize);
    let mut handle = runner.start(ChunkedDownloader::new(request, fetcher)).await;

    let pb = ProgressBar::new(0);
    let mut failed = false;

    loop {
        let event = tokio::select! {
            event = handle.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                pb.set_message("Cancelling...");
                runner.shutdown().await;
                continue;
            }
        };

        let Some(event) = event else { break };

        match event {
            DownloadEvent::Started { total_bytes, .. } => {
                if total_bytes > 0 {
                    pb.set_length(total_bytes);
                    pb.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                } else {
                    pb.set_style(
                        ProgressStyle::default_spinner()
                            .template("{spinner:.green} [{elapsed_precise}] {bytes} ({bytes_per_sec})")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                }
            }
            DownloadEvent::Progress { progress, status } => {
                tracing::debug!("{}", status);
                pb.set_position(progress.bytes_downloaded);
            }
            DownloadEvent::Completed { bytes_downloaded } => {
                pb.finish_and_clear();
                term.write_line(&format!(
                    "{} Downloaded {} ({} bytes)",
                    style("✅").green(),
                    style(&file_name).cyan(),
                    bytes_downloaded
                ))?;
            }
            DownloadEvent::Cancelled { bytes_downloaded } => {
                pb.abandon();
                term.write_line(&format!(
                    "{} Download cancelled after {} bytes; the partial file was kept",
                    style("⚠️").yellow(),
                    bytes_downloaded
                ))?;
            }
            DownloadEvent::Failed {
                error,
                bytes_downloaded,
            } => {
                pb.abandon();
                term.write_line(&format!(
                    "{} Download failed after {} bytes: {}",
                    style("❌").red(),
                    bytes_downloaded,
                    error
                ))?;
                failed = true;
            }
        }
    }

    handle.join().await?;

    if failed {
        process::exit(1);
    }
    Ok(())
}
