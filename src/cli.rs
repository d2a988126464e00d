use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tvlinker")]
#[command(about = "Find release links, resolve hosters and download them")]
#[command(long_about = "
tvlinker scrapes a paginated release listing, resolves the hoster links of a
release, turns hoster links into direct links through Real-Debrid, and either
downloads the file itself or hands it to an aria2 instance.

Examples:
  tvlinker scrape --pages 3          # List releases from the first 3 pages
  tvlinker hosters <release-url>     # Show hoster links of a release
  tvlinker unrestrict <hoster-link>  # Get a direct link from Real-Debrid
  tvlinker download <link> --unrestrict
  tvlinker aria2 <direct-link>       # Queue the link in aria2
")]
#[command(version)]
pub struct Cli {
    /// Override config file path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape the release listing
    #[command(visible_alias = "s")]
    Scrape {
        /// Number of pages to scrape (defaults to general.max_pages)
        #[arg(short, long, value_name = "N")]
        pages: Option<u32>,

        /// Only show releases whose title contains this text
        #[arg(short, long, value_name = "TEXT")]
        filter: Option<String>,
    },

    /// List the hoster links of a release page
    #[command(visible_alias = "h")]
    Hosters {
        /// Release detail page URL
        url: String,
    },

    /// Turn a hoster link into a direct download link
    #[command(visible_alias = "u")]
    Unrestrict {
        /// Hoster link
        link: String,
    },

    /// List hosts supported by Real-Debrid
    Hosts,

    /// Show Real-Debrid host status
    HostStatus {
        /// Only show this host
        host: Option<String>,
    },

    /// Send a direct link to aria2
    Aria2 {
        /// Direct download link
        url: String,

        /// Unrestrict the link through Real-Debrid first
        #[arg(long)]
        unrestrict: bool,
    },

    /// Download a link to disk
    #[command(visible_alias = "dl")]
    Download {
        /// Direct download link (or hoster link with --unrestrict)
        url: String,

        /// Output file (defaults to download.directory/<file name>)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Unrestrict the link through Real-Debrid first
        #[arg(long)]
        unrestrict: bool,
    },

    /// Manage configuration
    #[command(visible_alias = "cfg")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the config file location
    Path,

    /// Validate configuration
    #[command(visible_alias = "check")]
    Validate,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    /// Validate CLI arguments and show helpful error messages
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Commands::Scrape {
                pages: Some(pages), ..
            } => {
                if *pages > 100 {
                    return Err("Cannot scrape more than 100 pages at once".to_string());
                }
            }
            Commands::Hosters { url } | Commands::Download { url, .. } | Commands::Aria2 { url, .. } => {
                if url.trim().is_empty() {
                    return Err("URL cannot be empty".to_string());
                }
            }
            Commands::Unrestrict { link } => {
                if link.trim().is_empty() {
                    return Err("Link cannot be empty".to_string());
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether the command talks to Real-Debrid and so needs an API token
    pub fn requires_realdebrid(&self) -> bool {
        matches!(
            self.command,
            Commands::Unrestrict { .. }
                | Commands::Hosts
                | Commands::HostStatus { .. }
                | Commands::Download {
                    unrestrict: true,
                    ..
                }
                | Commands::Aria2 {
                    unrestrict: true,
                    ..
                }
        )
    }

    /// Config commands must work even when the config does not validate
    pub fn skips_config_validation(&self) -> bool {
        matches!(
            self.command,
            Commands::Config {
                action: ConfigAction::Reset { .. } | ConfigAction::Path | ConfigAction::Validate
            }
        )
    }
}
