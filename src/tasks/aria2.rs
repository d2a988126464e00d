use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Emitter, Task, TaskOutcome};
use crate::error::FetchError;
use crate::fetch::check_status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aria2Config {
    pub rpc_host: String,
    pub rpc_port: u16,
    pub rpc_secret: String,
    pub rpc_username: String,
    pub rpc_password: String,
}

impl Aria2Config {
    pub fn new(rpc_host: impl Into<String>, rpc_port: u16) -> Self {
        Self {
            rpc_host: rpc_host.into(),
            rpc_port,
            rpc_secret: String::new(),
            rpc_username: String::new(),
            rpc_password: String::new(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.rpc_secret = secret.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.rpc_username = username.into();
        self.rpc_password = password.into();
        self
    }

    /// `user:pass` when both are set, else `token:<secret>`, else `:`.
    pub fn rpc_auth(&self) -> String {
        let (user, pass) = if !self.rpc_username.is_empty() && !self.rpc_password.is_empty() {
            (self.rpc_username.as_str(), self.rpc_password.as_str())
        } else if !self.rpc_secret.is_empty() {
            ("token", self.rpc_secret.as_str())
        } else {
            ("", "")
        };

        format!("{}:{}", user, pass)
    }

    pub fn endpoint(&self) -> String {
        let host = self.rpc_host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}/jsonrpc", host, self.rpc_port)
        } else {
            format!("http://{}:{}/jsonrpc", host, self.rpc_port)
        }
    }
}

/// Hands direct URLs to an aria2 instance over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
    config: Aria2Config,
    client: Client,
}

impl RemoteDispatcher {
    pub fn new(config: Aria2Config, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { config, client })
    }

    pub fn with_client(config: Aria2Config, client: Client) -> Self {
        Self { config, client }
    }

    pub fn payload(&self, url: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "aria2.addUri",
            "params": [self.config.rpc_auth(), [url]],
        })
    }

    /// True iff aria2 answered with a `result`. Every other outcome, transport
    /// failures included, is false.
    pub async fn add_uri(&self, url: &str) -> bool {
        match self.call(url).await {
            Ok(response) => match response.get("result") {
                Some(gid) => {
                    info!("aria2 accepted {} (gid {})", url, gid);
                    true
                }
                None => {
                    warn!("aria2 rejected {}: {}", url, response);
                    false
                }
            },
            Err(e) => {
                warn!("aria2 RPC at {} failed: {}", self.config.endpoint(), e);
                false
            }
        }
    }

    async fn call(&self, url: &str) -> Result<Value, FetchError> {
        let endpoint = self.config.endpoint();
        debug!("aria2.addUri {} via {}", url, endpoint);

        let response = self
            .client
            .post(&endpoint)
            .json(&self.payload(url))
            .send()
            .await?;

        Ok(check_status(response)?.json().await?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aria2Event {
    Confirmation(bool),
    Cancelled,
}

pub struct Aria2Task {
    dispatcher: RemoteDispatcher,
    url: String,
}

impl Aria2Task {
    pub fn new(dispatcher: RemoteDispatcher, url: impl Into<String>) -> Self {
        Self {
            dispatcher,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Task for Aria2Task {
    type Event = Aria2Event;

    fn kind(&self) -> &'static str {
        "aria2"
    }

    fn cancelled_event(&self) -> Aria2Event {
        Aria2Event::Cancelled
    }

    async fn run(self, cancel: CancellationToken, mut emitter: Emitter<Aria2Event>) -> TaskOutcome {
        let confirmed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            ok = self.dispatcher.add_uri(&self.url) => Some(ok),
        };

        match confirmed {
            Some(ok) => {
                emitter.emit(Aria2Event::Confirmation(ok));
                if ok {
                    TaskOutcome::Completed
                } else {
                    TaskOutcome::Failed
                }
            }
            None => {
                emitter.emit(Aria2Event::Cancelled);
                TaskOutcome::Cancelled
            }
        }
    }
}
