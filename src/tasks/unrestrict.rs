use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Emitter, Task, TaskOutcome};
use crate::error::{ApiError, ApiErrorKind, FetchError};
use crate::fetch::DEFAULT_USER_AGENT;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrestrictConfig {
    pub api_base: String,
    pub api_token: String,
    pub user_agent: String,
}

impl UnrestrictConfig {
    pub fn new(api_base: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_token: api_token.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// What to ask the unrestriction API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnrestrictAction {
    /// Exchange a hoster link for a direct download URL
    UnrestrictLink(String),
    SupportedHosts,
    /// Status of all hosts, or only of the named one
    HostStatus(Option<String>),
}

impl UnrestrictAction {
    pub fn endpoint(&self) -> &'static str {
        match self {
            UnrestrictAction::UnrestrictLink(_) => "/unrestrict/link",
            UnrestrictAction::SupportedHosts => "/hosts",
            UnrestrictAction::HostStatus(_) => "/hosts/status",
        }
    }
}

impl fmt::Display for UnrestrictAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnrestrictAction::UnrestrictLink(link) => write!(f, "unrestrict {}", link),
            UnrestrictAction::SupportedHosts => write!(f, "supported hosts"),
            UnrestrictAction::HostStatus(Some(host)) => write!(f, "status of {}", host),
            UnrestrictAction::HostStatus(None) => write!(f, "host status"),
        }
    }
}

/// Result tagged by the action that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum UnrestrictResult {
    Link(String),
    SupportedHosts(BTreeMap<String, Value>),
    HostStatus(BTreeMap<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnrestrictEvent {
    Resolved(UnrestrictResult),
    Failed(ApiError),
    Cancelled,
}

/// Client for the link-unrestriction REST API.
#[derive(Debug, Clone)]
pub struct LinkUnrestrictor {
    config: UnrestrictConfig,
    client: Client,
}

impl LinkUnrestrictor {
    pub fn new(config: UnrestrictConfig, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::from(FetchError::from(e)))?;

        Ok(Self { config, client })
    }

    pub fn with_client(config: UnrestrictConfig, client: Client) -> Self {
        Self { config, client }
    }

    pub async fn dispatch(&self, action: &UnrestrictAction) -> Result<UnrestrictResult, ApiError> {
        let url = format!(
            "{}{}",
            self.config.api_base.trim_end_matches('/'),
            action.endpoint()
        );
        debug!("Real-Debrid request: {} -> {}", action, url);

        let request = match action {
            UnrestrictAction::UnrestrictLink(link) => {
                self.client.post(&url).form(&[("link", link.as_str())])
            }
            UnrestrictAction::SupportedHosts | UnrestrictAction::HostStatus(_) => {
                self.client.get(&url)
            }
        };

        let response = request
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_token))
            .header(CACHE_CONTROL, "no-cache")
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| ApiError::from(FetchError::from(e)))?;

        let body = read_json(response).await?;

        match action {
            UnrestrictAction::UnrestrictLink(_) => body
                .get("download")
                .and_then(Value::as_str)
                .map(|link| UnrestrictResult::Link(link.to_string()))
                .ok_or_else(|| ApiError::missing_field("download")),
            UnrestrictAction::SupportedHosts => Ok(UnrestrictResult::SupportedHosts(into_map(body)?)),
            UnrestrictAction::HostStatus(host) => {
                let mut statuses = into_map(body)?;
                if let Some(host) = host {
                    statuses.retain(|name, _| name == host);
                }
                Ok(UnrestrictResult::HostStatus(statuses))
            }
        }
    }

    /// Shorthand for [`UnrestrictAction::UnrestrictLink`].
    pub async fn unrestrict_link(&self, link: &str) -> Result<String, ApiError> {
        match self
            .dispatch(&UnrestrictAction::UnrestrictLink(link.to_string()))
            .await?
        {
            UnrestrictResult::Link(url) => Ok(url),
            _ => Err(ApiError::decode("unexpected result for unrestrict action")),
        }
    }
}

// Non-2xx answers become Network errors carrying the real status; the API's
// own `error` text is preferred over the canonical reason when present.
async fn read_json(response: Response) -> Result<Value, ApiError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ApiError::from(FetchError::from(e)))?;

    if !status.is_success() {
        let reason = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());

        return Err(ApiError {
            kind: ApiErrorKind::Network,
            code: Some(status.as_u16()),
            reason,
        });
    }

    serde_json::from_str(&text).map_err(|e| ApiError::decode(format!("invalid JSON: {}", e)))
}

fn into_map(value: Value) -> Result<BTreeMap<String, Value>, ApiError> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(ApiError::decode(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One API call run as a background task.
pub struct UnrestrictTask {
    unrestrictor: LinkUnrestrictor,
    action: UnrestrictAction,
}

impl UnrestrictTask {
    pub fn new(unrestrictor: LinkUnrestrictor, action: UnrestrictAction) -> Self {
        Self {
            unrestrictor,
            action,
        }
    }
}

#[async_trait]
impl Task for UnrestrictTask {
    type Event = UnrestrictEvent;

    fn kind(&self) -> &'static str {
        "unrestrict"
    }

    fn cancelled_event(&self) -> UnrestrictEvent {
        UnrestrictEvent::Cancelled
    }

    async fn run(
        self,
        cancel: CancellationToken,
        mut emitter: Emitter<UnrestrictEvent>,
    ) -> TaskOutcome {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.unrestrictor.dispatch(&self.action) => Some(result),
        };

        match result {
            Some(Ok(result)) => {
                info!("Real-Debrid {} succeeded", self.action);
                emitter.emit(UnrestrictEvent::Resolved(result));
                TaskOutcome::Completed
            }
            Some(Err(error)) => {
                warn!("Real-Debrid {} failed: {}", self.action, error);
                emitter.emit(UnrestrictEvent::Failed(error));
                TaskOutcome::Failed
            }
            None => {
                emitter.emit(UnrestrictEvent::Cancelled);
                TaskOutcome::Cancelled
            }
        }
    }
}
