//! Client configuration.

use std::time::Duration;

/// Where and as whom the client talks to the game data API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub client_id:           String,
  pub client_secret:       String,
  pub region:              String,
  pub locale:              String,
  /// Full URL of the OAuth token endpoint.
  pub oauth_url:           String,
  /// Base URL of the data API, without a trailing slash.
  pub api_url:             String,
  pub requests_per_second: u32,
  pub catalog_timeout:     Duration,
  pub market_timeout:      Duration,
}

impl ApiConfig {
  pub fn new(
    region: &str,
    client_id: impl Into<String>,
    client_secret: impl Into<String>,
  ) -> Self {
    let region = region.to_ascii_lowercase();
    Self {
      client_id:           client_id.into(),
      client_secret:       client_secret.into(),
      oauth_url:           format!("https://{region}.battle.net/oauth/token"),
      api_url:             format!("https://{region}.api.blizzard.com"),
      region,
      locale:              "en_US".to_owned(),
      requests_per_second: 10,
      catalog_timeout:     Duration::from_secs(10),
      market_timeout:      Duration::from_secs(30),
    }
  }

  /// Point both endpoints somewhere else, e.g. a local stub.
  pub fn with_hosts(mut self, oauth_url: impl Into<String>, api_url: impl Into<String>) -> Self {
    self.oauth_url = oauth_url.into();
    self.api_url = api_url.into().trim_end_matches('/').to_owned();
    self
  }

  pub fn namespace(&self, ns: Namespace) -> String {
    format!("{}-{}", ns.as_str(), self.region)
  }
}

/// Catalog data lives in `static-<region>`, market data in `dynamic-<region>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
  Static,
  Dynamic,
}

impl Namespace {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Dynamic => "dynamic",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn hosts_follow_region() {
    let config = ApiConfig::new("EU", "id", "secret");
    assert_eq!(config.oauth_url, "https://eu.battle.net/oauth/token");
    assert_eq!(config.api_url, "https://eu.api.blizzard.com");
    assert_eq!(config.namespace(Namespace::Dynamic), "dynamic-eu");

    let stub = config.with_hosts("http://127.0.0.1:9/oauth/token", "http://127.0.0.1:9/");
    assert_eq!(stub.api_url, "http://127.0.0.1:9");
  }
}
