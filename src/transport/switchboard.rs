use anyhow::Result;
use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::Duration;

use crate::config::NodeConfig;
use crate::error::StoreError;

const MAX_BACKOFF_MS: u64 = 1200;

/// Outbound RPC pool shared by everything one node talks to other nodes with.
///
/// `reqwest` keeps connections alive per host and redials closed ones, so a
/// retry after "connection closed" goes out on a fresh connection.
pub struct Switchboard {
    client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
    backoff_ms: u64,
}

impl Switchboard {
    pub fn new(config: &NodeConfig) -> Arc<Self> {
        Arc::new(Self {
            client: reqwest::Client::new(),
            timeout: config.rpc_timeout(),
            attempts: config.rpc_attempts.max(1),
            backoff_ms: config.rpc_backoff_ms,
        })
    }

    /// Calls `endpoint` on `addr`, retrying transport failures and server
    /// errors with exponential backoff.
    pub async fn call<Req, Resp>(&self, addr: &str, endpoint: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.call_with_attempts(addr, endpoint, request, self.attempts)
            .await
    }

    /// A single attempt, for liveness checks where a retry would only delay
    /// the verdict.
    pub async fn try_call<Req, Resp>(&self, addr: &str, endpoint: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        self.call_with_attempts(addr, endpoint, request, 1).await
    }

    async fn call_with_attempts<Req, Resp>(
        &self,
        addr: &str,
        endpoint: &str,
        request: &Req,
        attempts: usize,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let body = bincode::serialize(request).map_err(StoreError::from)?;
        let url = format!("http://{}{}", addr, endpoint);
        let mut delay_ms = self.backoff_ms;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let response = self
                .client
                .post(&url)
                .body(body.clone())
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp.bytes().await?;
                    return Ok(bincode::deserialize(&bytes).map_err(StoreError::from)?);
                }
                Ok(resp) if resp.status() == StatusCode::BAD_REQUEST => {
                    let reason = resp.text().await.unwrap_or_default();
                    return Err(StoreError::InvalidRequest(reason).into());
                }
                Ok(resp) => last_error = format!("{} returned {}", endpoint, resp.status()),
                Err(e) => last_error = e.to_string(),
            }

            if attempt + 1 < attempts {
                tracing::debug!(
                    "Call to {}{} failed (attempt {}): {}",
                    addr,
                    endpoint,
                    attempt + 1,
                    last_error
                );
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
            }
        }

        Err(StoreError::Unreachable {
            addr: addr.to_string(),
            reason: last_error,
        }
        .into())
    }
}
