//! Instance identity from the EC2 metadata service

use crate::{GpumonError, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const INSTANCE_ID_PATH: &str = "instance-id";
pub const IMAGE_ID_PATH: &str = "ami-id";
pub const INSTANCE_TYPE_PATH: &str = "instance-type";
pub const AVAILABILITY_ZONE_PATH: &str = "placement/availability-zone";

/// Static labels attached to every submitted metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub image_id: String,
    pub instance_type: String,
    pub region: String,
}

/// Strip the trailing zone letter: `us-east-1a` becomes `us-east-1`.
pub fn region_from_zone(zone: &str) -> Result<String> {
    let zone = zone.trim();
    let mut chars = zone.chars();
    match chars.next_back() {
        Some(letter) if letter.is_ascii_alphabetic() && !chars.as_str().is_empty() => {
            Ok(chars.as_str().to_string())
        }
        _ => Err(GpumonError::Metadata {
            path: AVAILABILITY_ZONE_PATH.to_string(),
            reason: format!("unexpected availability zone {:?}", zone),
        }),
    }
}

pub struct MetadataClient {
    base_url: String,
    client: reqwest::Client,
}

impl MetadataClient {
    /// `base_url` must end with `/`; paths are appended to it verbatim.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| GpumonError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    /// Fetch a single plain-text metadata value.
    pub async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let metadata_error = |reason: String| GpumonError::Metadata {
            path: path.to_string(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| metadata_error(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| metadata_error(e.to_string()))?;

        let value = body.trim();
        if value.is_empty() {
            return Err(metadata_error("empty response body".to_string()));
        }

        Ok(value.to_string())
    }

    /// Resolve the full identity. Any failed lookup is fatal to startup.
    pub async fn resolve(&self) -> Result<InstanceIdentity> {
        let instance_id = self.get(INSTANCE_ID_PATH).await?;
        let image_id = self.get(IMAGE_ID_PATH).await?;
        let instance_type = self.get(INSTANCE_TYPE_PATH).await?;
        let zone = self.get(AVAILABILITY_ZONE_PATH).await?;
        let region = region_from_zone(&zone)?;

        info!(
            "Resolved instance {} ({}, {}) in {}",
            instance_id, instance_type, image_id, region
        );

        Ok(InstanceIdentity {
            instance_id,
            image_id,
            instance_type,
            region,
        })
    }
}
