//! Connectivity probes.
//!
//! A probe answers one question: can this host reach the outside world
//! right now? It says nothing about the DrCOM session itself.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;

use crate::config::{ProbeConfig, ProbeKind};
use crate::error::{DrcomError, Result};

/// Pluggable connectivity check used by the supervisor.
pub trait ConnectivityProbe: Send + Sync {
    /// `Ok(())` when the network is reachable.
    fn check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Get the probe name for logging.
    fn name(&self) -> &'static str;
}

/// Build the probe described by `config`.
pub fn from_config(config: &ProbeConfig) -> Result<Box<dyn ConnectivityProbe>> {
    match config.kind {
        ProbeKind::Tcp => Ok(Box::new(TcpProbe::new(
            config.tcp_target()?,
            config.timeout(),
        ))),
        ProbeKind::Http => Ok(Box::new(HttpProbe::new(&config.target, config.timeout())?)),
    }
}

/// TCP connect with a timeout (DNS port of a public resolver by default).
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: SocketAddr,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe `target`, giving up after `timeout`
    pub fn new(target: SocketAddr, timeout: Duration) -> Self {
        Self { target, timeout }
    }
}

impl ConnectivityProbe for TcpProbe {
    fn check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, TcpStream::connect(self.target)).await {
                Ok(Ok(_stream)) => Ok(()),
                Ok(Err(e)) => Err(DrcomError::Network(format!(
                    "connect to {} failed: {e}",
                    self.target
                ))),
                Err(_) => Err(DrcomError::Network(format!(
                    "connect to {} timed out after {:?}",
                    self.target, self.timeout
                ))),
            }
        })
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// HTTP HEAD; only a 2xx counts, so captive-portal redirects read as offline.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Probe `url`, giving up after `timeout`
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(DrcomError::Config(format!(
                "HTTP probe target '{url}' must be an http(s) URL"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl ConnectivityProbe for HttpProbe {
    fn check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let response = self.client.head(&self.url).send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(DrcomError::Network(format!(
                    "HEAD {} returned {status}",
                    self.url
                )))
            }
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_reaches_listener() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let probe = TcpProbe::new(listener.local_addr().unwrap(), Duration::from_secs(1));
        probe.check().await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_probe_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = TcpProbe::new(addr, Duration::from_secs(1));
        assert!(matches!(probe.check().await, Err(DrcomError::Network(_))));
    }

    #[test]
    fn test_http_probe_requires_url() {
        assert!(HttpProbe::new("114.114.114.114:53", Duration::from_secs(1)).is_err());
        assert!(HttpProbe::new("http://connect.example/generate_204", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_from_config() {
        let probe = from_config(&ProbeConfig::default()).unwrap();
        assert_eq!(probe.name(), "tcp");

        let config = ProbeConfig {
            kind: ProbeKind::Http,
            target: "not a url".to_string(),
            ..ProbeConfig::default()
        };
        assert!(from_config(&config).is_err());
    }
}
