//! External address check.

use super::AddressProbe;
use crate::errors::RotationError;
use reqwest::Client;
use std::net::IpAddr;
use tracing::instrument;

/// Asks a plain-text "what is my IP" endpoint for the caller's address.
///
/// Must use the same proxied [`Client`] as the trend requests, otherwise it
/// reports the host's real address instead of the proxy exit.
#[derive(Debug, Clone)]
pub struct HttpAddressProbe {
    client: Client,
    url: String,
}

impl HttpAddressProbe {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl AddressProbe for HttpAddressProbe {
    #[instrument(level = "debug", skip_all, fields(url = %self.url))]
    async fn observe(&self) -> Result<IpAddr, RotationError> {
        let probe = |e: reqwest::Error| RotationError::Probe(e.to_string());
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(probe)?
            .error_for_status()
            .map_err(probe)?
            .text()
            .await
            .map_err(probe)?;

        let text = body.trim();
        text.parse::<IpAddr>()
            .map_err(|_| RotationError::Probe(format!("not an address: {text:?}")))
    }
}
