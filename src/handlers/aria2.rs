use anyhow::{Context, Result};
use console::{Term, style};
use std::process;
use tvlinker::Config;
use tvlinker::TaskHandle;
use tvlinker::tasks::{Aria2Event, Aria2Task, RemoteDispatcher};

use super::{resolve_direct_link, spinner};

pub async fn handle_aria2(config: &Config, url: String, unrestrict: bool) -> Result<()> {
    let term = Term::stdout();

    let url = if unrestrict {
        resolve_direct_link(config, url).await?
    } else {
        url
    };

    let aria2 = config.aria2_config();
    term.write_line(&format!(
        "{} Sending {} to aria2 at {}",
        style("📤").cyan(),
        style(&url).cyan(),
        aria2.endpoint()
    ))?;

    let dispatcher = RemoteDispatcher::new(aria2, config.request_timeout())
        .context("Failed to create aria2 RPC client")?;
    let mut handle = TaskHandle::spawn(Aria2Task::new(dispatcher, url));

    let spinner = spinner("Waiting for aria2...");
    let event = handle.next_event().await;
    spinner.finish_and_clear();
    handle.join().await?;

    match event {
        Some(Aria2Event::Confirmation(true)) => {
            term.write_line(&format!("{} Download added to aria2", style("✅").green()))?;
        }
        Some(Aria2Event::Confirmation(false)) => {
            term.write_line(&format!(
                "{} aria2 did not accept the link; check that it is running and the RPC settings are correct",
                style("❌").red()
            ))?;
            process::exit(1);
        }
        Some(Aria2Event::Cancelled) | None => {
            term.write_line(&format!("{} Cancelled", style("⚠️").yellow()))?;
        }
    }

    Ok(())
}
