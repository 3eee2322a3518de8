//! REST endpoint probe.

use super::{Probe, ProbeContext, ProbeResult};
use crate::model::HealthStatus;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;

/// One endpoint: `host` and `service` are concatenated into the URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestEndpoint {
    pub host: String,
    #[serde(default)]
    pub service: String,
}

impl RestEndpoint {
    pub fn url(&self) -> String {
        format!("{}{}", self.host, self.service)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestOptions {
    #[serde(default)]
    pub hosts: Vec<RestEndpoint>,
}

/// Issues a GET to every endpoint.
///
/// 401 counts as a warning (degraded); any other non-success status or a
/// failed request counts as an error (failure status). Errors win over
/// warnings. Certificates are not validated.
pub struct RestProbe {
    endpoints: Vec<RestEndpoint>,
    client: reqwest::Client,
}

impl RestProbe {
    pub fn new(endpoints: Vec<RestEndpoint>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { endpoints, client })
    }
}

#[async_trait]
impl Probe for RestProbe {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for endpoint in &self.endpoints {
            let url = endpoint.url();
            let response = self
                .client
                .get(&url)
                .header(ACCEPT, "application/json")
                .timeout(ctx.timeout)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) if resp.status() == StatusCode::UNAUTHORIZED => {
                    warnings.push(format!("rest api {} returns status code {}", url, resp.status()));
                }
                Ok(resp) => {
                    errors.push(format!("rest api {} returns status code {}", url, resp.status()));
                }
                Err(e) => {
                    tracing::debug!("Rest probe request to {} failed: {}", url, e);
                    errors.push(format!("rest api {} is unreachable: {}", url, e));
                }
            }
        }

        if !errors.is_empty() {
            ProbeResult::new(ctx.failure_status, errors.join(";"))
        } else if !warnings.is_empty() {
            ProbeResult::new(HealthStatus::Degraded, warnings.join(";"))
        } else {
            ProbeResult::healthy()
        }
    }
}
