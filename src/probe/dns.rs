//! DNS resolution probe.

use super::{Probe, ProbeContext, ProbeError, ProbeResult};
use crate::model::HealthStatus;

use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DnsOptions {
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// Hostname resolver.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// The operating system resolver.
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Resolves each configured hostname.
///
/// A hostname without addresses fails the target with the configured
/// failure status. A resolver error fails the probe itself and is always
/// reported as unhealthy.
pub struct DnsProbe {
    hosts: Vec<String>,
    resolver: Arc<dyn Resolver>,
}

impl DnsProbe {
    pub fn new(hosts: Vec<String>) -> Self {
        Self::with_resolver(hosts, Arc::new(SystemResolver))
    }

    pub fn with_resolver(hosts: Vec<String>, resolver: Arc<dyn Resolver>) -> Self {
        Self { hosts, resolver }
    }
}

#[async_trait]
impl Probe for DnsProbe {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult {
        for host in &self.hosts {
            match self.resolver.resolve(host).await {
                Ok(addrs) if addrs.is_empty() => {
                    return ProbeResult::new(
                        ctx.failure_status,
                        format!("host {} was not resolved from dns server", host),
                    );
                }
                Ok(_) => {}
                Err(e) => return ProbeResult::from_error(HealthStatus::Unhealthy, ProbeError::Io(e)),
            }
        }
        ProbeResult::healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    /// Resolves "good.test" only; "empty.test" yields no addresses and
    /// anything else errors.
    struct StaticResolver;

    #[async_trait]
    impl Resolver for StaticResolver {
        async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            match host {
                "good.test" => Ok(vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))]),
                "empty.test" => Ok(vec![]),
                _ => Err(io::Error::new(io::ErrorKind::Other, "resolver unavailable")),
            }
        }
    }

    fn probe(hosts: &[&str]) -> DnsProbe {
        DnsProbe::with_resolver(
            hosts.iter().map(|h| h.to_string()).collect(),
            Arc::new(StaticResolver),
        )
    }

    fn degraded_ctx() -> ProbeContext {
        ProbeContext {
            failure_status: HealthStatus::Degraded,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_resolved_hosts_are_healthy() {
        let result = probe(&["good.test"]).check(&degraded_ctx()).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_unresolved_host_uses_failure_status() {
        let result = probe(&["good.test", "empty.test"]).check(&degraded_ctx()).await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(
            result.description.as_deref(),
            Some("host empty.test was not resolved from dns server")
        );
    }

    #[tokio::test]
    async fn test_resolver_error_is_unhealthy() {
        let result = probe(&["broken.test"]).check(&degraded_ctx()).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_system_resolver_localhost() {
        let addrs = SystemResolver.resolve("localhost").await.unwrap();
        assert!(!addrs.is_empty());
    }
}
