pub mod aria2;
pub mod config;
pub mod download;
pub mod hosters;
pub mod realdebrid;
pub mod scrape;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tvlinker::Config;
use tvlinker::tasks::{
    LinkUnrestrictor, UnrestrictAction, UnrestrictEvent, UnrestrictResult, UnrestrictTask,
};
use tvlinker::{HttpFetcher, TaskHandle};

// Re-export all handlers
pub use aria2::handle_aria2;
pub use config::handle_config;
pub use download::handle_download;
pub use hosters::handle_hosters;
pub use realdebrid::{handle_host_status, handle_hosts, handle_unrestrict};
pub use scrape::handle_scrape;

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub(crate) fn page_fetcher(config: &Config) -> Result<HttpFetcher> {
    HttpFetcher::new(config.request_timeout()).context("Failed to create HTTP client")
}

pub(crate) fn unrestrictor(config: &Config) -> Result<LinkUnrestrictor> {
    LinkUnrestrictor::new(config.unrestrict_config(), config.request_timeout())
        .context("Failed to create Real-Debrid client")
}

/// Run one Real-Debrid action in the background and wait for its single result event.
pub(crate) async fn run_unrestrict(
    config: &Config,
    action: UnrestrictAction,
) -> Result<UnrestrictResult> {
    let task = UnrestrictTask::new(unrestrictor(config)?, action);
    let mut handle = TaskHandle::spawn(task);

    let event = handle.next_event().await;
    handle.join().await?;

    match event {
        Some(UnrestrictEvent::Resolved(result)) => Ok(result),
        Some(UnrestrictEvent::Failed(error)) => Err(error).context(
            "A problem occurred whilst communicating with Real-Debrid. Please check your Internet connection",
        ),
        Some(UnrestrictEvent::Cancelled) | None => bail!("Real-Debrid request was cancelled"),
    }
}

/// Hoster link -> direct link, used by the commands that accept `--unrestrict`.
pub(crate) async fn resolve_direct_link(config: &Config, link: String) -> Result<String> {
    let spinner = spinner("Unrestricting link via Real-Debrid...");
    let result = run_unrestrict(config, UnrestrictAction::UnrestrictLink(link)).await;
    spinner.finish_and_clear();

    match result? {
        UnrestrictResult::Link(url) => Ok(url),
        other => bail!("Unexpected Real-Debrid result: {:?}", other),
    }
}
