use crate::cli::ConfigAction;
use anyhow::{Context, Result};
use console::{Term, style};
use dialoguer::Confirm;
use std::process;
use tvlinker::{Config, ConfigManager};

pub async fn handle_config(config_manager: &mut ConfigManager, action: ConfigAction) -> Result<()> {
    let term = Term::stdout();

    match action {
        ConfigAction::Show => {
            let config = redacted(config_manager.config());

            let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;

            term.write_line(&format!("{} Current configuration:", style("⚙️").cyan()))?;
            term.write_line("")?;
            term.write_line(&content)?;
        }

        ConfigAction::Path => {
            term.write_line(&format!(
                "{} Config file location: {}",
                style("📝").cyan(),
                config_manager.config_file().display()
            ))?;
        }

        ConfigAction::Validate => {
            term.write_line(&format!(
                "{} Validating configuration...",
                style("🔍").cyan()
            ))?;

            match config_manager.validate() {
                Ok(()) => {
                    term.write_line(&format!("{} Configuration is valid", style("✅").green()))?;
                    if !config_manager.config().has_realdebrid_token() {
                        term.write_line(&format!(
                            "{} No Real-Debrid API token set; unrestrict commands will not work",
                            style("⚠️").yellow()
                        ))?;
                    }
                }
                Err(e) => {
                    term.write_line(&format!(
                        "{} Configuration validation failed:",
                        style("❌").red()
                    ))?;
                    term.write_line(&format!("   {}", e))?;
                    process::exit(1);
                }
            }
        }

        ConfigAction::Reset { yes } => {
            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Are you sure you want to reset {}?",
                        style(config_manager.config_file().display()).cyan()
                    ))
                    .default(false)
                    .interact()?;

                if !confirmed {
                    term.write_line(&format!("{} Operation cancelled", style("❌").red()))?;
                    return Ok(());
                }
            }

            config_manager.reset()?;
            term.write_line(&format!(
                "{} Configuration reset to defaults",
                style("✅").green()
            ))?;
        }
    }
    Ok(())
}

const MASK: &str = "********";

/// Copy of `config` with every credential replaced by a mask.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    for secret in [
        &mut config.realdebrid.api_token,
        &mut config.aria2.rpc_secret,
        &mut config.aria2.rpc_password,
    ] {
        if !secret.is_empty() {
            *secret = MASK.to_string();
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_masks_every_credential() {
        let mut config = Config::default();
        config.realdebrid.api_token = "rd-token".to_string();
        config.aria2.rpc_secret = "aria-secret".to_string();
        config.aria2.rpc_password = "aria-pass".to_string();
        config.aria2.rpc_username = "me".to_string();

        let shown = toml::to_string_pretty(&redacted(&config)).unwrap();
        assert!(!shown.contains("rd-token"));
        assert!(!shown.contains("aria-secret"));
        assert!(!shown.contains("aria-pass"));
        assert!(shown.contains("\"me\""));

        // Unset credentials stay empty rather than looking configured
        let empty = redacted(&Config::default());
        assert!(empty.aria2.rpc_secret.is_empty());
    }
}
