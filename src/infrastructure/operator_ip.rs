//! Operator public IP discovery

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

#[async_trait]
pub trait IpResolver: Send + Sync {
    async fn operator_ip(&self) -> Result<String>;
}

/// Asks an echo service which address our requests come from
pub struct HttpIpResolver {
    client: reqwest::Client,
    url: String,
}

impl HttpIpResolver {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

/// Echo services answer with the address as plain text, sometimes with trailing noise
fn parse_ip(body: &str) -> Result<String> {
    let candidate = body.trim();
    candidate
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .with_context(|| format!("IP echo service returned `{}`, not an IP address", candidate))
}

#[async_trait]
impl IpResolver for HttpIpResolver {
    async fn operator_ip(&self) -> Result<String> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.url))?
            .error_for_status()
            .with_context(|| format!("{} returned an error", self.url))?
            .text()
            .await
            .context("Failed to read IP echo response")?;
        let ip = parse_ip(&body)?;
        tracing::debug!(ip = %ip, "Resolved operator IP");
        Ok(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_trims_whitespace() {
        assert_eq!(parse_ip("203.0.113.4\n").unwrap(), "203.0.113.4");
        assert_eq!(parse_ip("2001:db8::1").unwrap(), "2001:db8::1");
    }

    #[test]
    fn test_parse_ip_rejects_html() {
        assert!(parse_ip("<html>rate limited</html>").is_err());
    }
}
