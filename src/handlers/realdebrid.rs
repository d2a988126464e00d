use anyhow::{Result, bail};
use console::{Term, style};
use serde_json::Value;
use std::collections::BTreeMap;
use tvlinker::Config;
use tvlinker::tasks::{UnrestrictAction, UnrestrictResult};

use super::{resolve_direct_link, run_unrestrict, spinner};

pub async fn handle_unrestrict(config: &Config, link: String) -> Result<()> {
    let term = Term::stdout();
    let direct = resolve_direct_link(config, link).await?;

    term.write_line(&format!("{} Direct link:", style("✅").green()))?;
    term.write_line(&direct)?;
    Ok(())
}

pub async fn handle_hosts(config: &Config) -> Result<()> {
    let term = Term::stdout();
    let spinner = spinner("Fetching supported hosts...");
    let result = run_unrestrict(config, UnrestrictAction::SupportedHosts).await;
    spinner.finish_and_clear();

    let UnrestrictResult::SupportedHosts(hosts) = result? else {
        bail!("Unexpected Real-Debrid response for supported hosts");
    };

    term.write_line(&format!(
        "{} {} supported host(s):",
        style("🌐").cyan(),
        hosts.len()
    ))?;
    for (domain, info) in &hosts {
        let name = info.get("name").and_then(Value::as_str).unwrap_or(domain.as_str());
        term.write_line(&format!("  {} {}", style(domain).green(), style(name).dim()))?;
    }
    Ok(())
}

pub async fn handle_host_status(config: &Config, host: Option<String>) -> Result<()> {
    let term = Term::stdout();
    let spinner = spinner("Fetching host status...");
    let result = run_unrestrict(config, UnrestrictAction::HostStatus(host.clone())).await;
    spinner.finish_and_clear();

    let UnrestrictResult::HostStatus(statuses) = result? else {
        bail!("Unexpected Real-Debrid response for host status");
    };

    if statuses.is_empty() {
        match host {
            Some(h) => term.write_line(&format!(
                "{} No status reported for {}",
                style("⚠️").yellow(),
                style(h).cyan()
            ))?,
            None => term.write_line(&format!("{} No host status reported", style("⚠️").yellow()))?,
        }
        return Ok(());
    }

    print_statuses(&term, &statuses)?;
    Ok(())
}

fn print_statuses(term: &Term, statuses: &BTreeMap<String, Value>) -> Result<()> {
    for (domain, info) in statuses {
        let status = info
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let styled = match status {
            "up" => style(status).green(),
            "down" => style(status).red(),
            _ => style(status).yellow(),
        };
        let supported = info
            .get("supported")
            .and_then(Value::as_i64)
            .is_some_and(|s| s != 0);

        term.write_line(&format!(
            "  {:<30} {}{}",
            domain,
            styled,
            if supported { "" } else { " (unsupported)" }
        ))?;
    }
    Ok(())
}
