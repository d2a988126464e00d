use anyhow::{Context, Result};
use console::{Term, style};
use tvlinker::Config;
use tvlinker::{ListingRecord, TaskHandle};
use tvlinker::tasks::{ListingScraper, ScrapeEvent};

use super::{page_fetcher, spinner};

pub async fn handle_scrape(config: &Config, pages: Option<u32>, filter: Option<String>) -> Result<()> {
    let term = Term::stdout();
    let scrape_config = config.scrape_config(pages);

    term.write_line(&format!(
        "{} Scraping {} page(s) of {}",
        style("🔍").cyan(),
        scrape_config.max_pages,
        style(&scrape_config.url_template).cyan()
    ))?;

    let scraper = ListingScraper::new(scrape_config, page_fetcher(config)?)
        .context("Invalid listing extraction rule")?;
    let mut handle = TaskHandle::spawn(scraper);

    let needle = filter.map(|f| f.to_lowercase());
    let progress = spinner("Fetching page 1...");
    let mut shown = 0usize;

    loop {
        let event = tokio::select! {
            event = handle.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                progress.set_message("Stopping...");
                handle.cancel();
                continue;
            }
        };

        let Some(event) = event else { break };

        match event {
            ScrapeEvent::Record { record, .. } => {
                let matches = needle
                    .as_ref()
                    .is_none_or(|n| record.title.to_lowercase().contains(n));
                if !matches {
                    continue;
                }
                shown += 1;
                progress.suspend(|| -> std::io::Result<()> {
                    for line in record_lines(&record) {
                        term.write_line(&line)?;
                    }
                    Ok(())
                })?;
            }
            ScrapeEvent::PageCompleted { page, records } => {
                tracing::debug!("Page {} yielded {} record(s)", page, records);
                progress.set_message(format!("Fetching page {}...", page + 1));
            }
            ScrapeEvent::Finished { pages, records } => {
                progress.finish_and_clear();
                term.write_line(&format!(
                    "{} Scraped {} page(s), {} release(s), {} shown",
                    style("✅").green(),
                    pages,
                    records,
                    shown
                ))?;
            }
            ScrapeEvent::Failed { page, error } => {
                progress.finish_and_clear();
                term.write_line(&format!(
                    "{} Page {} failed: {}",
                    style("❌").red(),
                    page,
                    error
                ))?;
            }
            ScrapeEvent::Cancelled { pages_completed } => {
                progress.finish_and_clear();
                term.write_line(&format!(
                    "{} Cancelled after {} page(s), {} release(s) shown",
                    style("⚠️").yellow(),
                    pages_completed,
                    shown
                ))?;
            }
        }
    }

    handle.join().await?;
    Ok(())
}

fn record_lines(record: &ListingRecord) -> [String; 2] {
    [
        format!(
            "{}  {}  {}",
            style(&record.published_date).dim(),
            style(&record.category).yellow(),
            style(&record.title).bold()
        ),
        format!("   {}", style(&record.detail_url).dim()),
    ]
}
