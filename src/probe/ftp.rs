//! FTP server probe: log in and print the working directory.

use super::{Probe, ProbeContext, ProbeError, ProbeResult};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const FTP_PORT: u16 = 21;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FtpHost {
    pub host: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FtpOptions {
    #[serde(default)]
    pub hosts: Vec<FtpHost>,
}

#[derive(Debug, Clone, PartialEq)]
struct FtpReply {
    code: u16,
    text: String,
}

fn reply_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{3})([ -])(.*)$").expect("valid regex"))
}

/// Split `ftp://host[:port][/path]` or `host[:port]` into host and port.
fn parse_address(address: &str) -> Result<(String, u16), ProbeError> {
    let rest = address.strip_prefix("ftp://").unwrap_or(address);
    let authority = rest.split('/').next().unwrap_or_default();
    // Credentials embedded in the URL are not used for the address.
    let authority = authority.rsplit('@').next().unwrap_or(authority);

    if authority.is_empty() {
        return Err(ProbeError::Address(address.to_string()));
    }

    // IPv6 literal: [addr] or [addr]:port
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, rest) = bracketed
            .split_once(']')
            .ok_or_else(|| ProbeError::Address(address.to_string()))?;
        if host.is_empty() {
            return Err(ProbeError::Address(address.to_string()));
        }
        let port = match rest.strip_prefix(':') {
            Some(port) => port
                .parse()
                .map_err(|_| ProbeError::Address(address.to_string()))?,
            None if rest.is_empty() => FTP_PORT,
            None => return Err(ProbeError::Address(address.to_string())),
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port
                .parse()
                .map_err(|_| ProbeError::Address(address.to_string()))?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(ProbeError::Address(address.to_string())),
        None => Ok((authority.to_string(), FTP_PORT)),
    }
}

/// Read one possibly multi-line reply.
async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<FtpReply, ProbeError> {
    let mut first: Option<FtpReply> = None;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(ProbeError::Protocol("connection closed".to_string()));
        }
        let trimmed = line.trim_end();

        let Some(caps) = reply_line().captures(trimmed) else {
            if first.is_none() {
                return Err(ProbeError::Protocol(format!("malformed reply: {}", trimmed)));
            }
            continue;
        };
        let code: u16 = caps[1]
            .parse()
            .map_err(|_| ProbeError::Protocol(format!("malformed reply: {}", trimmed)))?;
        let last = &caps[2] == " ";

        if let Some(reply) = &first {
            if last && reply.code == code {
                return Ok(reply.clone());
            }
            continue;
        }

        let reply = FtpReply {
            code,
            text: caps[3].to_string(),
        };
        if last {
            return Ok(reply);
        }
        first = Some(reply);
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, command: &str) -> Result<(), ProbeError> {
    writer.write_all(format!("{}\r\n", command).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn expect(reply: &FtpReply, codes: &[u16], step: &str) -> Result<(), ProbeError> {
    if codes.contains(&reply.code) {
        Ok(())
    } else {
        Err(ProbeError::Protocol(format!(
            "{} rejected with {} {}",
            step, reply.code, reply.text
        )))
    }
}

/// Log in and issue `PWD`, returning the `PWD` reply.
async fn print_working_directory<S>(stream: S, user: &str, password: &str) -> Result<FtpReply, ProbeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = BufReader::new(stream);

    let greeting = read_reply(&mut conn).await?;
    expect(&greeting, &[220], "connection")?;

    send(&mut conn, &format!("USER {}", user)).await?;
    let reply = read_reply(&mut conn).await?;
    if reply.code == 331 {
        send(&mut conn, &format!("PASS {}", password)).await?;
        let reply = read_reply(&mut conn).await?;
        expect(&reply, &[230, 202], "login")?;
    } else {
        expect(&reply, &[230], "login")?;
    }

    send(&mut conn, "PWD").await?;
    let pwd = read_reply(&mut conn).await?;

    send(&mut conn, "QUIT").await?;
    if let Err(e) = read_reply(&mut conn).await {
        tracing::debug!("FTP QUIT reply not received: {}", e);
    }

    Ok(pwd)
}

pub struct FtpProbe {
    hosts: Vec<FtpHost>,
}

impl FtpProbe {
    pub fn new(hosts: Vec<FtpHost>) -> Self {
        Self { hosts }
    }

    async fn check_host(&self, host: &FtpHost, ctx: &ProbeContext) -> Result<FtpReply, ProbeError> {
        let (name, port) = parse_address(&host.host)?;
        let stream = tokio::time::timeout(ctx.timeout, TcpStream::connect((name.as_str(), port)))
            .await
            .map_err(|_| ProbeError::Timeout(ctx.timeout))??;

        let user = host.user.as_deref().unwrap_or("anonymous");
        let password = host.password.as_deref().unwrap_or("anonymous@");
        print_working_directory(stream, user, password).await
    }
}

#[async_trait]
impl Probe for FtpProbe {
    async fn check(&self, ctx: &ProbeContext) -> ProbeResult {
        for host in &self.hosts {
            match self.check_host(host, ctx).await {
                // 257 pathname created, 226 closing data connection
                Ok(reply) if reply.code == 257 || reply.code == 226 => {}
                Ok(reply) => {
                    return ProbeResult::new(
                        ctx.failure_status,
                        format!("Error connecting to ftp host {} with exit code {}", host.host, reply.code),
                    )
                }
                Err(e) => return ProbeResult::from_error(ctx.failure_status, e),
            }
        }
        ProbeResult::healthy()
    }
}
