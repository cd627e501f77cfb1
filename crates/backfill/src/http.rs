// crates/backfill/src/http.rs
//! Rate-limited `reqwest` implementation of [`StatsClient`].

use std::time::Duration;

use serde::de::DeserializeOwned;
use spartan_ledger_core::Xuid;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::client::{
    AssetKind, ClientError, HighlightEventPayload, MatchStatsPayload, SkillPayload, StatsClient,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(serde::Deserialize)]
struct AssetNamePayload {
    name: String,
}

/// HTTP client for the Halo stats API with a fixed requests-per-second
/// budget. Calls are serialized through the governor, so the budget holds
/// even if callers overlap requests.
pub struct HaloStatsClient {
    http: reqwest::Client,
    base_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HaloStatsClient {
    pub fn new(base_url: impl Into<String>, requests_per_second: f64) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    /// Sleep until the rate budget allows the next request.
    async fn throttle(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let next_allowed = prev + self.min_interval;
            let now = Instant::now();
            if next_allowed > now {
                tokio::time::sleep_until(next_allowed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// GET a JSON payload. `Ok(None)` on 404; any other non-success status
    /// is an error.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClientError> {
        self.throttle().await;
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {url}");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                endpoint: path.to_string(),
            });
        }
        Ok(Some(response.json::<T>().await?))
    }

    fn missing(path: String) -> ClientError {
        ClientError::Status {
            status: 404,
            endpoint: path,
        }
    }
}

impl StatsClient for HaloStatsClient {
    async fn get_match_stats(&self, match_id: &str) -> Result<MatchStatsPayload, ClientError> {
        let path = format!("matches/{match_id}/stats");
        self.get_json(&path)
            .await?
            .ok_or_else(|| Self::missing(path))
    }

    async fn get_highlight_events(
        &self,
        match_id: &str,
    ) -> Result<Vec<HighlightEventPayload>, ClientError> {
        let path = format!("matches/{match_id}/events");
        self.get_json(&path)
            .await?
            .ok_or_else(|| Self::missing(path))
    }

    async fn get_skill_stats(
        &self,
        match_id: &str,
        xuids: &[Xuid],
    ) -> Result<SkillPayload, ClientError> {
        let joined = xuids
            .iter()
            .map(|x| x.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let path = format!("matches/{match_id}/skill?xuids={joined}");
        self.get_json(&path)
            .await?
            .ok_or_else(|| Self::missing(path))
    }

    async fn get_asset(
        &self,
        kind: AssetKind,
        asset_id: &str,
    ) -> Result<Option<String>, ClientError> {
        let path = format!("assets/{}/{asset_id}", kind.path_segment());
        let payload: Option<AssetNamePayload> = self.get_json(&path).await?;
        Ok(payload.map(|p| p.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn throttle_spaces_requests_by_the_configured_interval() {
        let client = HaloStatsClient::new("http://localhost", 2.0).unwrap();

        let start = Instant::now();
        client.throttle().await;
        client.throttle().await;
        client.throttle().await;

        // 2 req/s -> 500ms between requests, so the third waits ~1s total.
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn zero_rate_disables_the_governor() {
        let client = HaloStatsClient::new("http://localhost/", 0.0).unwrap();
        assert!(client.min_interval.is_zero());
        assert_eq!(client.base_url, "http://localhost");
        client.throttle().await;
    }
}
