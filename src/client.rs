//! Deploy client
//!
//! Uploads a wasm file to a running node's `/deploy` endpoint.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info};
use url::Url;

use crate::agent::DeployRequest;
use crate::error::{Error, Result};

/// Default node address for the deploy command
pub const DEFAULT_NODE_ADDR: &str = "http://localhost:8080";

pub struct DeployClient {
    http: reqwest::Client,
    deploy_url: String,
}

impl DeployClient {
    pub fn new(addr: &str) -> Result<Self> {
        let base = Url::parse(addr)
            .map_err(|e| Error::connection_failed(addr, format!("invalid address: {}", e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::connection_failed(
                addr,
                format!("unsupported scheme '{}'", base.scheme()),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            deploy_url: format!("{}/deploy", base.as_str().trim_end_matches('/')),
        })
    }

    pub fn deploy_url(&self) -> &str {
        &self.deploy_url
    }

    /// Deploy `bytecode` as `name`; anything but 200 is an error
    pub async fn deploy(&self, name: &str, bytecode: &[u8]) -> Result<()> {
        let request = DeployRequest {
            name: name.to_string(),
            wasm: STANDARD.encode(bytecode),
        };

        debug!(url = %self.deploy_url, function = %name, bytes = bytecode.len(), "Deploying");
        let resp = self
            .http
            .post(&self.deploy_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::connection_failed(&self.deploy_url, e.to_string()))?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(Error::DeployRejected {
                status: resp.status().to_string(),
            });
        }

        info!(function = %name, url = %self.deploy_url, "Deployed");
        Ok(())
    }
}
