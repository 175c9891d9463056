//! HDHomeRun HTTP document definitions.
//!
//! Field names follow the casing HDHomeRun clients (Plex, Emby, Jellyfin,
//! Channels DVR) expect, hence the explicit serde renames.

use serde::{Deserialize, Serialize};

/// Static identity advertised by the emulated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_number: String,
    pub firmware_name: String,
    pub firmware_version: String,
    pub device_id: String,
    pub device_auth: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            friendly_name: "IPTV HDHomeRun".to_string(),
            manufacturer: "Custom".to_string(),
            model_number: "HDTC-2US".to_string(),
            firmware_name: "hdhomeruntc_atsc".to_string(),
            firmware_version: "20250802".to_string(),
            device_id: "12345678".to_string(),
            device_auth: "testauth".to_string(),
        }
    }
}

/// `/discover.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiscoverResponse {
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_number: String,
    pub firmware_name: String,
    pub firmware_version: String,
    #[serde(rename = "DeviceID")]
    pub device_id: String,
    pub device_auth: String,
    #[serde(rename = "BaseURL")]
    pub base_url: String,
    #[serde(rename = "LineupURL")]
    pub lineup_url: String,
    pub tuner_count: u32,
}

impl DiscoverResponse {
    /// Build the discovery document for a device reachable at `base_url`.
    pub fn new(identity: &DeviceIdentity, base_url: &str, tuner_count: u32) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            friendly_name: identity.friendly_name.clone(),
            manufacturer: identity.manufacturer.clone(),
            model_number: identity.model_number.clone(),
            firmware_name: identity.firmware_name.clone(),
            firmware_version: identity.firmware_version.clone(),
            device_id: identity.device_id.clone(),
            device_auth: identity.device_auth.clone(),
            lineup_url: format!("{}/lineup.json", base_url),
            base_url,
            tuner_count,
        }
    }
}

/// One channel in `/lineup.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineupEntry {
    pub guide_number: String,
    pub guide_name: String,
    pub station: String,
    pub logo: String,
    #[serde(rename = "URL")]
    pub url: String,
}

impl LineupEntry {
    /// Lineup entry whose stream is served from `{base_url}/tuner/{number}`.
    pub fn new(base_url: &str, number: u32, name: &str, logo: Option<&str>) -> Self {
        let guide_number = number.to_string();
        Self {
            url: format!("{}/tuner/{}", base_url.trim_end_matches('/'), guide_number),
            station: guide_number.clone(),
            guide_number,
            guide_name: name.to_string(),
            logo: logo.unwrap_or_default().to_string(),
        }
    }
}

/// `/lineup_status.json` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LineupStatus {
    pub scan_in_progress: u8,
    pub scan_possible: u8,
    pub source: String,
    pub source_list: Vec<String>,
}

impl Default for LineupStatus {
    fn default() -> Self {
        Self {
            scan_in_progress: 0,
            scan_possible: 1,
            source: "Cable".to_string(),
            source_list: vec!["Cable".to_string()],
        }
    }
}
