use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Emitter, Task, TaskOutcome};
use crate::error::{FetchError, ParseError};
use crate::fetch::HttpFetcher;
use crate::parser::{ExtractionRule, ListingRecord, PageParser};

static PAGE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%d|%s|\{page\}").expect("page placeholder pattern is valid"));

/// Snapshot of everything a scrape needs, taken when the task is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeConfig {
    pub url_template: String,
    pub user_agent: String,
    pub max_pages: u32,
    pub rule: ExtractionRule,
}

impl ScrapeConfig {
    pub fn new(url_template: impl Into<String>, user_agent: impl Into<String>, max_pages: u32) -> Self {
        Self {
            url_template: url_template.into(),
            user_agent: user_agent.into(),
            max_pages,
            rule: ExtractionRule::default(),
        }
    }

    pub fn with_rule(mut self, rule: ExtractionRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn page_url(&self, page: u32) -> String {
        page_url(&self.url_template, page)
    }
}

/// Substitute the page number for every `%d`, `%s` or `{page}` in `template`.
pub fn page_url(template: &str, page: u32) -> String {
    PAGE_PLACEHOLDER
        .replace_all(template, page.to_string().as_str())
        .into_owned()
}

pub fn has_page_placeholder(template: &str) -> bool {
    PAGE_PLACEHOLDER.is_match(template)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeEvent {
    Record { page: u32, record: ListingRecord },
    PageCompleted { page: u32, records: usize },
    Finished { pages: u32, records: usize },
    Failed { page: u32, error: FetchError },
    Cancelled { pages_completed: u32 },
}

impl ScrapeEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScrapeEvent::Finished { .. } | ScrapeEvent::Failed { .. } | ScrapeEvent::Cancelled { .. }
        )
    }
}

/// Walks pages `1..=max_pages` in order, emitting each record as soon as its
/// page is parsed. The first failed page ends the scrape.
pub struct ListingScraper {
    config: ScrapeConfig,
    parser: PageParser,
    fetcher: HttpFetcher,
}

impl ListingScraper {
    pub fn new(config: ScrapeConfig, fetcher: HttpFetcher) -> Result<Self, ParseError> {
        let parser = PageParser::new(config.rule.clone())?;
        Ok(Self {
            config,
            parser,
            fetcher,
        })
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }
}

#[async_trait]
impl Task for ListingScraper {
    type Event = ScrapeEvent;

    fn kind(&self) -> &'static str {
        "scrape"
    }

    fn cancelled_event(&self) -> ScrapeEvent {
        ScrapeEvent::Cancelled { pages_completed: 0 }
    }

    async fn run(self, cancel: CancellationToken, mut emitter: Emitter<ScrapeEvent>) -> TaskOutcome {
        info!(
            "Scraping {} page(s) from {}",
            self.config.max_pages, self.config.url_template
        );

        let mut total = 0;

        for page in 1..=self.config.max_pages {
            if cancel.is_cancelled() {
                info!("Scrape cancelled before page {}", page);
                emitter.emit(ScrapeEvent::Cancelled {
                    pages_completed: page - 1,
                });
                return TaskOutcome::Cancelled;
            }

            let url = self.config.page_url(page);
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.fetcher.fetch_text(&url, &self.config.user_agent) => Some(result),
            };

            let html = match fetched {
                None => {
                    info!("Scrape cancelled while fetching page {}", page);
                    emitter.emit(ScrapeEvent::Cancelled {
                        pages_completed: page - 1,
                    });
                    return TaskOutcome::Cancelled;
                }
                Some(Ok(html)) => html,
                Some(Err(error)) => {
                    warn!("Page {} ({}) failed: {}", page, url, error);
                    emitter.emit(ScrapeEvent::Failed { page, error });
                    return TaskOutcome::Failed;
                }
            };

            let records = self.parser.parse_listing(&html);
            debug!("Page {} yielded {} record(s)", page, records.len());

            let count = records.len();
            for record in records {
                emitter.emit(ScrapeEvent::Record { page, record });
            }
            emitter.emit(ScrapeEvent::PageCompleted {
                page,
                records: count,
            });
            total += count;
        }

        emitter.emit(ScrapeEvent::Finished {
            pages: self.config.max_pages,
            records: total,
        });
        TaskOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_url_placeholders() {
        assert_eq!(
            page_url("https://example.org/page/%d/", 3),
            "https://example.org/page/3/"
        );
        assert_eq!(page_url("https://example.org/?p=%s", 12), "https://example.org/?p=12");
        assert_eq!(
            page_url("https://example.org/{page}/x/{page}", 2),
            "https://example.org/2/x/2"
        );
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(has_page_placeholder("https://example.org/page/%d/"));
        assert!(!has_page_placeholder("https://example.org/latest"));
    }

    #[test]
    fn test_terminal_events() {
        assert!(ScrapeEvent::Finished { pages: 0, records: 0 }.is_terminal());
        assert!(!ScrapeEvent::PageCompleted { page: 1, records: 0 }.is_terminal());
    }
}
