use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{Emitter, Task, TaskOutcome};
use crate::error::{FetchError, ParseError};
use crate::fetch::HttpFetcher;
use crate::parser::{ExtractionRule, HosterEntry, PageParser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HosterConfig {
    pub detail_url: String,
    pub user_agent: String,
    pub rule: ExtractionRule,
}

impl HosterConfig {
    pub fn new(detail_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            detail_url: detail_url.into(),
            user_agent: user_agent.into(),
            rule: ExtractionRule::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HosterEvent {
    Entries(Vec<HosterEntry>),
    Failed(FetchError),
    Cancelled,
}

/// Fetches one detail page and lists its hoster links.
pub struct HosterResolver {
    config: HosterConfig,
    parser: PageParser,
    fetcher: HttpFetcher,
}

impl HosterResolver {
    pub fn new(config: HosterConfig, fetcher: HttpFetcher) -> Result<Self, ParseError> {
        let parser = PageParser::new(config.rule.clone())?;
        Ok(Self {
            config,
            parser,
            fetcher,
        })
    }

    /// Fetch and parse without going through the task machinery.
    pub async fn resolve(&self) -> Result<Vec<HosterEntry>, FetchError> {
        let html = self
            .fetcher
            .fetch_text(&self.config.detail_url, &self.config.user_agent)
            .await?;

        Ok(self.parser.parse_hosters(&html))
    }
}

#[async_trait]
impl Task for HosterResolver {
    type Event = HosterEvent;

    fn kind(&self) -> &'static str {
        "hosters"
    }

    fn cancelled_event(&self) -> HosterEvent {
        HosterEvent::Cancelled
    }

    async fn run(self, cancel: CancellationToken, mut emitter: Emitter<HosterEvent>) -> TaskOutcome {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.resolve() => Some(result),
        };

        match result {
            Some(Ok(entries)) => {
                info!(
                    "Found {} hoster link(s) on {}",
                    entries.len(),
                    self.config.detail_url
                );
                emitter.emit(HosterEvent::Entries(entries));
                TaskOutcome::Completed
            }
            Some(Err(error)) => {
                warn!("Hoster lookup for {} failed: {}", self.config.detail_url, error);
                emitter.emit(HosterEvent::Failed(error));
                TaskOutcome::Failed
            }
            None => {
                emitter.emit(HosterEvent::Cancelled);
                TaskOutcome::Cancelled
            }
        }
    }
}
