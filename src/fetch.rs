//! Out-of-band content fetching.
//!
//! The interceptor replaces the engine's network round-trip for tracked
//! resources with its own bounded HTTP fetch. Timeout expiry here is an
//! ordinary miss, not a crash path: the caller releases the deferral and the
//! page degrades to the unrewritten original. Compressed responses are
//! decoded transparently by the client so the rewriter always sees plain
//! bytes.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::debug;
use url::Url;

use crate::config::FetchConfig;

/// Default user-agent for out-of-band fetches: a generic browser string so
/// the dictionary sites serve their regular pages.
const DEFAULT_FETCH_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Failure modes of an out-of-band fetch. Every variant is recovered at the
/// call site: the deferral is released and the engine's normal path takes
/// over.
#[derive(Debug)]
pub enum FetchError {
    /// The bounded timeout expired before the response completed.
    Timeout,
    /// The upstream answered with a non-success status.
    Status(u16),
    /// Connection, protocol or body-read failure.
    Transport(reqwest::Error),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Timeout => write!(f, "fetch timed out"),
            FetchError::Status(code) => write!(f, "upstream returned status {code}"),
            FetchError::Transport(e) => write!(f, "transport failure: {e}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// Fetching seam used by the interceptor. [`HttpFetcher`] is the production
/// implementation; tests substitute their own.
pub trait Fetcher: Send + Sync {
    /// Fetches the raw decoded bytes of `url`, bounded by `timeout`.
    fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<Vec<u8>, FetchError>>;
}

/// Reqwest-backed fetcher with automatic decompression.
pub struct HttpFetcher {
    client: reqwest::Client,
    auxiliary_timeout: Duration,
}

impl HttpFetcher {
    /// Builds the fetcher from configuration. Fails only when the TLS
    /// backend cannot be initialized.
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let user_agent = if config.user_agent.is_empty() {
            DEFAULT_FETCH_USER_AGENT
        } else {
            config.user_agent.as_str()
        };
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(FetchError::Transport)?;
        Ok(Self {
            client,
            auxiliary_timeout: config.auxiliary_timeout(),
        })
    }

    /// Shorter-bounded fetch for image-like assets loaded outside the
    /// interception path (daily-sentence imagery and similar).
    pub async fn fetch_auxiliary(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        bounded_fetch(self.client.clone(), url.clone(), self.auxiliary_timeout).await
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> BoxFuture<'static, Result<Vec<u8>, FetchError>> {
        let client = self.client.clone();
        let url = url.clone();
        Box::pin(bounded_fetch(client, url, timeout))
    }
}

/// Runs the whole fetch (connect, headers, body) under one deadline.
async fn bounded_fetch(
    client: reqwest::Client,
    url: Url,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    match tokio::time::timeout(timeout, fetch_bytes(client, url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout),
    }
}

async fn fetch_bytes(client: reqwest::Client, url: Url) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(FetchError::Transport)?;
    let status = response.status();
    if !status.is_success() {
        debug!(%url, status = status.as_u16(), "Upstream refused the out-of-band fetch");
        return Err(FetchError::Status(status.as_u16()));
    }
    let body = response.bytes().await.map_err(FetchError::Transport)?;
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn canned_server(response: &'static str) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = sock.read(&mut buf).await;
                let _ = sock.write_all(response.as_bytes()).await;
                let _ = sock.shutdown().await;
            }
        });
        addr
    }

    #[test]
    fn test_error_display() {
        assert_eq!(FetchError::Timeout.to_string(), "fetch timed out");
        assert_eq!(
            FetchError::Status(503).to_string(),
            "upstream returned status 503"
        );
    }

    #[tokio::test]
    async fn test_fetch_returns_body_bytes() {
        let addr = canned_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello",
        )
        .await;
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let body = fetcher.fetch(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn test_fetch_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept, then hold the connection open without answering.
            let sock = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(sock);
        });
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let result = fetcher.fetch(&url, Duration::from_millis(200)).await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let addr = canned_server(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/missing")).unwrap();
        let result = fetcher.fetch(&url, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(FetchError::Status(404))));
    }

    #[tokio::test]
    async fn test_auxiliary_fetch_uses_its_own_bound() {
        let addr = canned_server(
            "HTTP/1.1 200 OK\r\nContent-Length: 3\r\nConnection: close\r\n\r\nimg",
        )
        .await;
        let fetcher = HttpFetcher::new(&FetchConfig::default()).unwrap();
        let url = Url::parse(&format!("http://{addr}/banner.jpg")).unwrap();
        let body = fetcher.fetch_auxiliary(&url).await.unwrap();
        assert_eq!(body, b"img");
    }
}
