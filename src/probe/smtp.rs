//! SMTP server probe: connect and expect a 220 greeting.

use super::{Probe, ProbeContext, ProbeError, ProbeResult};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SmtpOptions {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub enable_ssl: Option<bool>,
}

impl SmtpOptions {
    /// Configured port, else 443 with SSL and 25 without.
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.enable_ssl.unwrap_or(false) { 443 } else { 25 })
    }
}

pub struct SmtpProbe {
    hostname: String,
    port: u16,
}

impl SmtpProbe {
    pub fn new(options: &SmtpOptions) -> Self {
        Self {
            hostname: options.hostname.clone(),
            port: options.port(),
        }
    }

    async fn greeting(&self, ctx: &ProbeContext) -> Result<String, ProbeError> {
        let connect = TcpStream::connect((self.hostname.as_str(), self.port));
        let stream = tokio::time::timeout(ctx.timeout, connect)
            .await
            .map_err(|_| ProbeError::Timeout(ctx.timeout))??;
        read_greeting(BufReader::new(stream)).await
    }
}

/// Read the first line the server sends.
async fn read_greeting<R: AsyncBufRead + Unpin>(mut reader: R) -> Result<String, ProbeError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ProbeError::Protocol(
            "connection closed before greeting".to_string(),
        ));
    }
    Ok(line.trim_end().to_string())
}

#[async_trait]
impl Probe for SmtpProbe {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult {
        match self.greeting(ctx).await {
            Ok(line) if line.contains("220") => ProbeResult::healthy(),
            Ok(_) => ProbeResult::new(ctx.failure_status, "Server-Response not expected"),
            Err(e) => ProbeResult::from_error(ctx.failure_status, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HealthStatus;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn fake_server(greeting: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(greeting).await.unwrap();
        });
        port
    }

    fn probe(port: u16) -> SmtpProbe {
        SmtpProbe::new(&SmtpOptions {
            hostname: "127.0.0.1".to_string(),
            port: Some(port),
            enable_ssl: None,
        })
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(SmtpOptions::default().port(), 25);
        let ssl = SmtpOptions {
            enable_ssl: Some(true),
            ..Default::default()
        };
        assert_eq!(ssl.port(), 443);
    }

    #[tokio::test]
    async fn test_read_greeting() {
        let mock = tokio_test::io::Builder::new()
            .read(b"220 mail.example.com ESMTP ready\r\n")
            .build();
        let line = read_greeting(BufReader::new(mock)).await.unwrap();
        assert_eq!(line, "220 mail.example.com ESMTP ready");
    }

    #[tokio::test]
    async fn test_ready_server_is_healthy() {
        let port = fake_server(b"220 localhost ESMTP\r\n").await;
        let result = probe(port).check(&ProbeContext::default()).await;
        assert_eq!(result.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_unexpected_greeting_uses_failure_status() {
        let port = fake_server(b"554 no service\r\n").await;
        let ctx = ProbeContext {
            failure_status: HealthStatus::Degraded,
            ..Default::default()
        };
        let result = probe(port).check(&ctx).await;
        assert_eq!(result.status, HealthStatus::Degraded);
        assert_eq!(result.description.as_deref(), Some("Server-Response not expected"));
    }

    #[tokio::test]
    async fn test_refused_connection_uses_failure_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = probe(port).check(&ProbeContext::default()).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.is_some());
    }
}
