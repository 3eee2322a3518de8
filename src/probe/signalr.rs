//! SignalR hub probe.
//!
//! Performs the hub's negotiate handshake, the first step every SignalR
//! client takes before opening a transport.

use super::{Probe, ProbeContext, ProbeError, ProbeResult};

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignalROptions {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Negotiation {
    connection_id: Option<String>,
    connection_token: Option<String>,
    /// Set when the hub redirects clients elsewhere (e.g. Azure SignalR).
    url: Option<String>,
    error: Option<String>,
}

pub struct SignalRHubProbe {
    url: String,
    client: reqwest::Client,
}

impl SignalRHubProbe {
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn negotiate_url(&self) -> String {
        format!("{}/negotiate?negotiateVersion=1", self.url)
    }

    async fn negotiate(&self, ctx: &ProbeContext) -> Result<Negotiation, ProbeError> {
        let resp = self
            .client
            .post(self.negotiate_url())
            .timeout(ctx.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Protocol(format!(
                "hub {} returns status code {}",
                self.url, status
            )));
        }
        Ok(resp.json::<Negotiation>().await?)
    }
}

#[async_trait]
impl Probe for SignalRHubProbe {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult {
        match self.negotiate(ctx).await {
            Ok(Negotiation { error: Some(error), .. }) => {
                ProbeResult::new(ctx.failure_status, format!("hub {} refused connection: {}", self.url, error))
            }
            Ok(n) if n.connection_id.is_some() || n.connection_token.is_some() || n.url.is_some() => {
                ProbeResult::healthy()
            }
            Ok(_) => ProbeResult::new(
                ctx.failure_status,
                format!("hub {} returned an unexpected negotiate response", self.url),
            ),
            Err(e) => ProbeResult::from_error(ctx.failure_status, e),
        }
    }
}
