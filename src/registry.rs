//! Plugin registry: fetch the remote plugin index and look up packages.

use serde::{Deserialize, Serialize};

/// A single entry in the remote plugin registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Package name, as used in `plugins/install?name=…` links.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    pub latest_version: String,
    /// Direct HTTPS download URL for the `.zip` archive.
    pub download_url: String,
}

/// Fetch the registry at `url`.
/// The caller is responsible for caching; every call hits the network.
pub async fn fetch_registry_from(
    client: &reqwest::Client,
    url: &str,
) -> Result<Vec<RegistryEntry>, String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| format!("Failed to fetch plugin registry: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("Plugin registry returned HTTP {}", response.status()));
    }

    response
        .json()
        .await
        .map_err(|e| format!("Failed to parse plugin registry JSON: {e}"))
}

pub fn find_entry<'a>(entries: &'a [RegistryEntry], name: &str) -> Option<&'a RegistryEntry> {
    entries.iter().find(|entry| entry.name == name)
}
