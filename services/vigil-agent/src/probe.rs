//! Probes that produce heartbeat samples

use crate::config::ProbeScheme;
use async_trait::async_trait;
use chrono::Utc;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::debug;
use vigil_core::HeartbeatSample;

#[async_trait]
pub trait Probe: Send + Sync + std::fmt::Debug {
    /// Runs one check against `url`. Failures are reported in the sample,
    /// never as an error.
    async fn run(&self, url: &str) -> HeartbeatSample;
}

/// HTTP GET probe; any 2xx counts as success.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn run(&self, url: &str) -> HeartbeatSample {
        let executed_at = Utc::now();
        let started = Instant::now();
        let result = self.client.get(url).send().await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(url, elapsed_ms, "Probe succeeded");
                HeartbeatSample::succeeded(executed_at, Some(elapsed_ms))
            }
            Ok(response) => {
                let mut sample = HeartbeatSample::failed(
                    executed_at,
                    "STATUS_CODE_MISMATCH",
                    format!("Unexpected status code: {}", response.status()),
                );
                sample.response_time_ms = Some(elapsed_ms);
                sample
            }
            Err(error) => HeartbeatSample::failed(executed_at, error_type(&error), error.to_string()),
        }
    }
}

fn error_type(error: &reqwest::Error) -> &'static str {
    if error.is_timeout() {
        "TIMEOUT"
    } else if error.is_connect() {
        "CONNECTION_ERROR"
    } else if error.is_request() {
        "HTTP_ERROR"
    } else {
        "COLLECTION_ERROR"
    }
}

/// TCP connect probe for `tcp://host:port` targets. The connection is
/// dropped as soon as it is established.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn connect(address: &str) -> Result<(), (&'static str, String)> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host(address)
            .await
            .map_err(|e| ("DNS_ERROR", format!("Host not found: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(("DNS_ERROR", format!("Host not found: {address}")));
        }
        TcpStream::connect(&addrs[..])
            .await
            .map(drop)
            .map_err(|e| (connect_error_type(&e), e.to_string()))
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn run(&self, url: &str) -> HeartbeatSample {
        let executed_at = Utc::now();
        let address = url
            .split_once("://")
            .map_or(url, |(_, rest)| rest)
            .trim_end_matches('/');
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, Self::connect(address)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                debug!(address, elapsed_ms, "TCP connect succeeded");
                HeartbeatSample::succeeded(executed_at, Some(elapsed_ms))
            }
            Ok(Err((error_type, message))) => {
                HeartbeatSample::failed(executed_at, error_type, message)
            }
            Err(_) => HeartbeatSample::failed(
                executed_at,
                "TIMEOUT",
                format!("Connection timeout after {}ms", self.timeout.as_millis()),
            ),
        }
    }
}

fn connect_error_type(error: &io::Error) -> &'static str {
    match error.kind() {
        io::ErrorKind::ConnectionRefused => "CONNECTION_REFUSED",
        io::ErrorKind::HostUnreachable => "HOST_UNREACHABLE",
        io::ErrorKind::TimedOut => "TIMEOUT",
        _ => "CONNECTION_ERROR",
    }
}

/// Picks the HTTP or TCP probe from the target URL's scheme.
#[derive(Debug, Clone)]
pub struct SchemeProbe {
    http: HttpProbe,
    tcp: TcpProbe,
}

impl SchemeProbe {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: HttpProbe::new(timeout)?,
            tcp: TcpProbe::new(timeout),
        })
    }
}

#[async_trait]
impl Probe for SchemeProbe {
    async fn run(&self, url: &str) -> HeartbeatSample {
        match ProbeScheme::of(url) {
            Some(ProbeScheme::Tcp) => self.tcp.run(url).await,
            Some(ProbeScheme::Http) => self.http.run(url).await,
            None => HeartbeatSample::failed(
                Utc::now(),
                "COLLECTION_ERROR",
                format!("Unsupported target scheme: {url}"),
            ),
        }
    }
}
