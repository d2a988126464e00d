use anyhow::{Context, Result, bail};
use console::{Term, style};
use tvlinker::Config;
use tvlinker::TaskHandle;
use tvlinker::tasks::{HosterEvent, HosterResolver};

use super::{page_fetcher, spinner};

pub async fn handle_hosters(config: &Config, url: String) -> Result<()> {
    let term = Term::stdout();

    let resolver = HosterResolver::new(config.hoster_config(&url), page_fetcher(config)?)
        .context("Invalid hoster extraction rule")?;
    let mut handle = TaskHandle::spawn(resolver);

    let spinner = spinner("Resolving hoster links...");
    let event = handle.next_event().await;
    spinner.finish_and_clear();
    handle.join().await?;

    let entries = match event {
        Some(HosterEvent::Entries(entries)) => entries,
        Some(HosterEvent::Failed(error)) => {
            return Err(error).with_context(|| format!("Failed to resolve hosters of {}", url));
        }
        Some(HosterEvent::Cancelled) | None => bail!("Hoster lookup was cancelled"),
    };

    if entries.is_empty() {
        term.write_line(&format!(
            "{} No hoster links found on {}",
            style("⚠️").yellow(),
            style(&url).cyan()
        ))?;
        return Ok(());
    }

    term.write_line(&format!(
        "{} {} hoster link(s):",
        style("🔗").cyan(),
        entries.len()
    ))?;
    for (index, entry) in entries.iter().enumerate() {
        let host = entry.host().unwrap_or_else(|| entry.icon_file_name());
        term.write_line(&format!(
            "  {:>2}. {} {}",
            index + 1,
            style(host).green().bold(),
            entry.target_url
        ))?;
    }

    Ok(())
}
