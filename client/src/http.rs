use crate::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use trix_types::{
    api::{
        JoinConfirmation, JoinRequest, LeaderboardEntry, MoveRequest, MoveResponse, Period,
        PlayerStats,
    },
    Address, OpenMatch,
};
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// The authoritative match API.
#[async_trait]
pub trait MatchApi: Send + Sync + 'static {
    async fn available_matches(&self) -> Result<Vec<OpenMatch>>;

    async fn register_join(&self, request: &JoinRequest) -> Result<JoinConfirmation>;

    /// The response is the single source of truth for board, turn and outcome.
    async fn submit_move(&self, request: &MoveRequest) -> Result<MoveResponse>;
}

/// HTTP client for the match API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    pub(crate) base_url: Url,
    http_client: reqwest::Client,
}

impl ApiClient {
    /// `base` is the API root, e.g. `https://host/api`.
    pub fn new(base: &str) -> Result<Self> {
        let mut base_url = Url::parse(base)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        // Relative joins replace the last segment unless the path ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub async fn leaderboard(&self, period: Period) -> Result<Vec<LeaderboardEntry>> {
        let mut url = self.base_url.join("leaderboard")?;
        url.query_pairs_mut().append_pair("period", period.as_str());
        let response = self.http_client.get(url).send().await?;
        decode(response).await
    }

    /// `None` when the API has no record of the player.
    pub async fn player_stats(&self, player: &Address) -> Result<Option<PlayerStats>> {
        let url = self
            .base_url
            .join(&format!("players/{}/stats", player.as_str()))?;
        let response = self.http_client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        if body.is_empty() {
            return Err(Error::Failed(status));
        }
        return Err(Error::FailedWithBody { status, body });
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl MatchApi for ApiClient {
    async fn available_matches(&self) -> Result<Vec<OpenMatch>> {
        let url = self.base_url.join("matches/available")?;
        let response = self.http_client.get(url).send().await?;
        decode(response).await
    }

    async fn register_join(&self, request: &JoinRequest) -> Result<JoinConfirmation> {
        let url = self.base_url.join("matches/join")?;
        debug!(match_id = %request.match_id, "registering join");
        let response = self.http_client.post(url).json(request).send().await?;
        decode(response).await
    }

    async fn submit_move(&self, request: &MoveRequest) -> Result<MoveResponse> {
        let url = self.base_url.join("game/move")?;
        debug!(match_id = %request.match_id, cell = request.position, "submitting move");
        let response = self.http_client.post(url).json(request).send().await?;
        decode(response).await
    }
}
