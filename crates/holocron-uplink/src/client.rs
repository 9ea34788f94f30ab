//! Authenticated, rate-limited client for the game data API.

use std::{num::NonZeroU32, time::Duration};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::{
  config::{ApiConfig, Namespace},
  error::{CallError, CallErrorKind},
  model::{
    Auctions, OAuthToken, Profession, ProfessionIndex, Recipe, SkillTier,
    TokenIndex,
  },
  retry::RetryPolicy,
  token::TokenCache,
};

const OAUTH_ENDPOINT: &str = "/oauth/token";

pub struct BlizzardClient {
  http:    Client,
  config:  ApiConfig,
  tokens:  TokenCache,
  limiter: DefaultDirectRateLimiter,
  retry:   RetryPolicy,
}

impl BlizzardClient {
  pub fn new(config: ApiConfig) -> Result<Self, CallError> {
    let http = Client::builder()
      .connect_timeout(Duration::from_secs(5))
      .build()
      .map_err(|e| CallError::from_reqwest("client", e))?;
    let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
    Ok(Self {
      http,
      config,
      tokens: TokenCache::new(),
      limiter: RateLimiter::direct(Quota::per_second(rps)),
      retry: RetryPolicy::default(),
    })
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn config(&self) -> &ApiConfig { &self.config }

  // ── Market ──────────────────────────────────────────────────────────────

  /// `GET /data/wow/token/index`
  pub async fn token_index(&self) -> Result<TokenIndex, CallError> {
    self.market("/data/wow/token/index").await
  }

  /// `GET /data/wow/auctions/commodities`
  pub async fn commodities(&self) -> Result<Auctions, CallError> {
    self.market("/data/wow/auctions/commodities").await
  }

  /// `GET /data/wow/connected-realm/{id}/auctions`
  pub async fn realm_auctions(&self, connected_realm_id: u32) -> Result<Auctions, CallError> {
    self
      .market(&format!("/data/wow/connected-realm/{connected_realm_id}/auctions"))
      .await
  }

  // ── Catalog ─────────────────────────────────────────────────────────────

  /// `GET /data/wow/profession/index`
  pub async fn profession_index(&self) -> Result<ProfessionIndex, CallError> {
    self.catalog("/data/wow/profession/index").await
  }

  /// `GET /data/wow/profession/{id}`
  pub async fn profession(&self, id: u32) -> Result<Profession, CallError> {
    self.catalog(&format!("/data/wow/profession/{id}")).await
  }

  /// `GET /data/wow/profession/{id}/skill-tier/{tier}`
  pub async fn skill_tier(&self, profession: u32, tier: u32) -> Result<SkillTier, CallError> {
    self
      .catalog(&format!("/data/wow/profession/{profession}/skill-tier/{tier}"))
      .await
  }

  /// `GET /data/wow/recipe/{id}`
  pub async fn recipe(&self, id: u32) -> Result<Recipe, CallError> {
    self.catalog(&format!("/data/wow/recipe/{id}")).await
  }

  /// `GET /data/wow/journal-instance/{id}`
  pub async fn journal_instance(&self, id: u32) -> Result<serde_json::Value, CallError> {
    self.catalog(&format!("/data/wow/journal-instance/{id}")).await
  }

  /// `GET /data/wow/journal-encounter/{id}`
  pub async fn journal_encounter(&self, id: u32) -> Result<serde_json::Value, CallError> {
    self.catalog(&format!("/data/wow/journal-encounter/{id}")).await
  }

  // ── Plumbing ────────────────────────────────────────────────────────────

  async fn market<T: DeserializeOwned>(&self, path: &str) -> Result<T, CallError> {
    self.get(path, Namespace::Dynamic, self.config.market_timeout).await
  }

  async fn catalog<T: DeserializeOwned>(&self, path: &str) -> Result<T, CallError> {
    self.get(path, Namespace::Static, self.config.catalog_timeout).await
  }

  async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    namespace: Namespace,
    timeout: Duration,
  ) -> Result<T, CallError> {
    self.retry.run(|| self.get_once(path, namespace, timeout)).await
  }

  /// One logical call. A 401 invalidates the token and is retried once with
  /// a fresh one before it counts as an auth failure.
  async fn get_once<T: DeserializeOwned>(
    &self,
    path: &str,
    namespace: Namespace,
    timeout: Duration,
  ) -> Result<T, CallError> {
    let token = self.access_token().await?;
    let mut response = self.send(path, namespace, timeout, &token).await?;
    if response.status() == StatusCode::UNAUTHORIZED {
      debug!(endpoint = path, "token rejected, refreshing");
      self.tokens.invalidate(&token).await;
      let token = self.access_token().await?;
      response = self.send(path, namespace, timeout, &token).await?;
    }

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => CallErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CallErrorKind::Auth,
        other => CallErrorKind::Status(other.as_u16()),
      };
      return Err(CallError::new(kind, path, body));
    }
    response
      .json()
      .await
      .map_err(|e| CallError::new(CallErrorKind::Decode, path, e.to_string()))
  }

  async fn send(
    &self,
    path: &str,
    namespace: Namespace,
    timeout: Duration,
    token: &str,
  ) -> Result<reqwest::Response, CallError> {
    self.limiter.until_ready().await;
    self
      .http
      .get(format!("{}{path}", self.config.api_url))
      .query(&[
        ("namespace", self.config.namespace(namespace)),
        ("locale", self.config.locale.clone()),
      ])
      .bearer_auth(token)
      .timeout(timeout)
      .send()
      .await
      .map_err(|e| CallError::from_reqwest(path, e))
  }

  async fn access_token(&self) -> Result<String, CallError> {
    self.tokens.get(|| self.fetch_token()).await
  }

  async fn fetch_token(&self) -> Result<(String, Duration), CallError> {
    let response = self
      .http
      .post(&self.config.oauth_url)
      .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
      .form(&[("grant_type", "client_credentials")])
      .timeout(self.config.catalog_timeout)
      .send()
      .await
      .map_err(|e| CallError::from_reqwest(OAUTH_ENDPOINT, e))?;

    let status = response.status();
    if !status.is_success() {
      let kind = if status.is_server_error() {
        CallErrorKind::Status(status.as_u16())
      } else {
        CallErrorKind::Auth
      };
      let body = response.text().await.unwrap_or_default();
      return Err(CallError::new(kind, OAUTH_ENDPOINT, body));
    }
    let token: OAuthToken = response
      .json()
      .await
      .map_err(|e| CallError::new(CallErrorKind::Decode, OAUTH_ENDPOINT, e.to_string()))?;
    info!(expires_in = token.expires_in, "access token refreshed");
    Ok((token.access_token, Duration::from_secs(token.expires_in)))
  }
}
