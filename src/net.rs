//! Network edges of the client: the shared HTTP client for REST calls and
//! the newline-delimited TCP transport behind the live channel.
//!
//! Everything here is a thin adapter; retry policy, staleness, and state
//! transitions live with the channel manager and the search coordinator.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::channel::poll::{DashboardSnapshot, SnapshotSource};
use crate::channel::transport::{ChannelHandle, ChannelTransport};
use crate::error::{ChannelError, SearchError};
use crate::search::SearchBackend;
use crate::search::suggest::SearchResponse;

/// What: Derive the live channel endpoint from the server base URL.
///
/// Inputs:
/// - `server_url`: REST base, e.g. `http://host:8000`.
///
/// Output: Channel URL on the matching scheme, `http` becomes `ws` and
/// `https` becomes `wss`, with the `/ws/dashboard` path appended.
#[must_use]
pub fn channel_url(server_url: &str) -> String {
    let base = if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server_url.starts_with("ws://") || server_url.starts_with("wss://") {
        server_url.to_string()
    } else {
        format!("ws://{server_url}")
    };
    format!("{}/ws/dashboard", base.trim_end_matches('/'))
}

/// Shared client for the dashboard REST endpoints.
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    /// Client with the standard timeouts and user agent. `base_url` keeps
    /// its scheme; a trailing slash is dropped.
    ///
    /// # Errors
    /// - Returns the `reqwest` builder error, e.g. when TLS backend
    ///   initialization fails.
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(30))
            .user_agent(format!("Shelfwire/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl SearchBackend for HttpApiClient {
    async fn search(
        &self,
        query: &str,
        include_ai: bool,
        max_results: u32,
    ) -> Result<SearchResponse, SearchError> {
        let url = format!("{}/api/search/smart", self.base_url);
        let body = serde_json::json!({
            "query": query,
            "include_ai_suggestions": include_ai,
            "max_results": max_results,
        });
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| SearchError::Failed(e.to_string()))?;
        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| SearchError::Failed(e.to_string()))
    }
}

/// Body of the snapshot endpoint.
#[derive(Debug, Deserialize)]
struct WireSnapshot {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    kpis: BTreeMap<String, i64>,
}

impl SnapshotSource for HttpApiClient {
    async fn fetch_snapshot(&self) -> Result<DashboardSnapshot, ChannelError> {
        let url = format!("{}/api/dashboard/updates", self.base_url);
        let wire = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ChannelError::Poll(e.to_string()))?
            .error_for_status()
            .map_err(|e| ChannelError::Poll(e.to_string()))?
            .json::<WireSnapshot>()
            .await
            .map_err(|e| ChannelError::Poll(e.to_string()))?;
        if wire.success {
            Ok(DashboardSnapshot { kpis: wire.kpis })
        } else {
            Err(ChannelError::Poll("server reported failure".to_string()))
        }
    }
}

/// Live channel transport: one frame per line over a plain TCP stream.
/// `wss` endpoints are refused up front rather than silently downgraded.
pub struct TcpChannelTransport;

fn split_channel_url(url: &str) -> Result<(String, u16), ChannelError> {
    if url.starts_with("wss://") {
        return Err(ChannelError::UnsupportedScheme("wss".to_string()));
    }
    let rest = url.strip_prefix("ws://").ok_or_else(|| {
        let scheme = url.split("://").next().unwrap_or(url);
        ChannelError::UnsupportedScheme(scheme.to_string())
    })?;
    let authority = rest.split('/').next().unwrap_or(rest);
    // A bracketed IPv6 literal keeps its colons; any port sits after the
    // closing bracket.
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| ChannelError::Connect(format!("unclosed bracket in `{url}`")))?;
        let port: u16 = match after.strip_prefix(':') {
            Some(port) => port
                .parse()
                .map_err(|_| ChannelError::Connect(format!("invalid port in `{url}`")))?,
            None if after.is_empty() => 80,
            None => {
                return Err(ChannelError::Connect(format!("invalid authority in `{url}`")));
            }
        };
        return Ok((host.to_string(), port));
    }
    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port: u16 = port
                .parse()
                .map_err(|_| ChannelError::Connect(format!("invalid port in `{url}`")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), 80)),
    }
}

impl ChannelTransport for TcpChannelTransport {
    async fn open(&self, url: &str) -> Result<ChannelHandle, ChannelError> {
        let (host, port) = split_channel_url(url)?;
        let stream = TcpStream::connect((host.as_str(), port))
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (read_half, mut write_half) = stream.into_split();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if in_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        debug!(error = %err, "channel read ended");
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let mut buf = frame.into_bytes();
                buf.push(b'\n');
                if let Err(err) = write_half.write_all(&buf).await {
                    debug!(error = %err, "channel write ended");
                    break;
                }
            }
        });

        Ok(ChannelHandle {
            incoming: in_rx,
            outgoing: out_tx,
        })
    }
}
