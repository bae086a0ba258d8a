//! HTTP lookup of the server assigned by a cluster balancer

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BalancerConfig;
use realtime_core::{ClusterResolver, RealtimeError};

static SOCKET_SERVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^var SOCKET_SERVER = "(?P<server>http.*)";$"#).expect("balancer pattern")
});

/// Extract the server URL from a balancer response body
pub fn parse_balancer_response(body: &str) -> Option<String> {
    SOCKET_SERVER
        .captures(body.trim())
        .map(|caps| caps["server"].to_string())
}

/// Resolves cluster URLs with an HTTP GET to the balancer
pub struct HttpBalancer {
    client: Client,
}

impl HttpBalancer {
    pub fn new(config: BalancerConfig) -> Result<Self, RealtimeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| RealtimeError::Http(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ClusterResolver for HttpBalancer {
    async fn resolve(&self, cluster_url: &str) -> Result<String, RealtimeError> {
        let response = self
            .client
            .get(cluster_url)
            .send()
            .await
            .map_err(|e| RealtimeError::ClusterResolution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %cluster_url, status = %status, "Balancer lookup failed");
            return Err(RealtimeError::ClusterResolution(format!(
                "Balancer responded with status {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RealtimeError::ClusterResolution(e.to_string()))?;

        match parse_balancer_response(&body) {
            Some(server) => {
                info!(url = %cluster_url, server = %server, "Balancer assigned server");
                Ok(server)
            }
            None => {
                warn!(url = %cluster_url, body = %body, "Unexpected balancer response");
                Err(RealtimeError::ClusterResolution(
                    "Unable to get URL from cluster".to_string(),
                ))
            }
        }
    }
}
