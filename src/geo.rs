//! Country lookup for a profile's remote host

use async_trait::async_trait;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::discovery::extract_remote_host;

/// Label used whenever a lookup fails
pub const UNKNOWN_LOCATION: &str = "UNKNOWN";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a profile to a location label. Never fails.
#[async_trait]
pub trait Locator: Send + Sync {
    async fn resolve(&self, profile: &Path) -> String;
}

/// ipinfo.io backed lookup
pub struct IpInfoLocator {
    client: reqwest::Client,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LiteResponse {
    country_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublicResponse {
    country: Option<String>,
}

impl IpInfoLocator {
    pub fn new(token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, token }
    }

    async fn resolve_ip(host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        match tokio::net::lookup_host((host, 0)).await {
            Ok(mut addrs) => addrs.next().map(|a| a.ip()),
            Err(e) => {
                debug!("Failed to resolve {}: {}", host, e);
                None
            }
        }
    }

    async fn country(&self, ip: IpAddr) -> Option<String> {
        let code = match &self.token {
            Some(token) => {
                let url = format!("https://api.ipinfo.io/lite/{}?token={}", ip, token);
                self.fetch::<LiteResponse>(&url).await?.country_code
            }
            None => {
                let url = format!("https://ipinfo.io/{}/json", ip);
                self.fetch::<PublicResponse>(&url).await?.country
            }
        };
        code.filter(|c| !c.is_empty())
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Option<T> {
        let response = match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                debug!("Geolocation API returned {}", resp.status());
                return None;
            }
            Err(e) => {
                debug!("Geolocation request failed: {}", e);
                return None;
            }
        };
        response
            .json::<T>()
            .await
            .map_err(|e| debug!("Geolocation response decode error: {}", e))
            .ok()
    }
}

#[async_trait]
impl Locator for IpInfoLocator {
    async fn resolve(&self, profile: &Path) -> String {
        let host = match extract_remote_host(profile) {
            Ok(Some(host)) => host,
            Ok(None) => {
                debug!("{:?} has no remote directive", profile);
                return UNKNOWN_LOCATION.to_string();
            }
            Err(e) => {
                debug!("Cannot read {:?}: {}", profile, e);
                return UNKNOWN_LOCATION.to_string();
            }
        };

        let Some(ip) = Self::resolve_ip(&host).await else {
            return UNKNOWN_LOCATION.to_string();
        };

        self.country(ip)
            .await
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string())
    }
}

/// Locator that labels every profile the same, for offline runs
pub struct StaticLocator(pub String);

#[async_trait]
impl Locator for StaticLocator {
    async fn resolve(&self, _profile: &Path) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreadable_profile_is_unknown() {
        let locator = IpInfoLocator::new(None);
        let label = locator.resolve(Path::new("/nonexistent/x.ovpn")).await;
        assert_eq!(label, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_profile_without_remote_is_unknown() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "client\ndev tun\n").unwrap();
        let locator = IpInfoLocator::new(None);
        assert_eq!(locator.resolve(file.path()).await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn test_ip_literal_skips_dns() {
        assert_eq!(
            IpInfoLocator::resolve_ip("10.1.2.3").await,
            Some("10.1.2.3".parse().unwrap())
        );
    }
}
