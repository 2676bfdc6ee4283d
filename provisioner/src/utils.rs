//! Utility functions

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Network interface whose MAC address identifies the device
const PRIMARY_INTERFACE_ADDRESS: &str = "/sys/class/net/eth0/address";

/// Identifier used when neither a MAC address nor a host name is available
pub const FALLBACK_DEVICE_IDENTIFIER: &str = "default-device";

/// Version information for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Calculate SHA256 hash of data
pub fn sha256_hash(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Discover the hardware identifier of this device: the primary interface MAC
/// address without colons, else the host name, else a fixed fallback.
pub async fn device_identifier() -> String {
    if let Some(mac) = read_mac_address(Path::new(PRIMARY_INTERFACE_ADDRESS)).await {
        return mac;
    }
    match sysinfo::System::host_name() {
        Some(host) if !host.trim().is_empty() => host.trim().to_string(),
        _ => FALLBACK_DEVICE_IDENTIFIER.to_string(),
    }
}

async fn read_mac_address(path: &Path) -> Option<String> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    let mac = normalize_mac(&raw);
    if mac.is_empty() {
        debug!("Interface address file {} is empty", path.display());
        return None;
    }
    Some(mac)
}

/// Strip separators and surrounding whitespace from a MAC address
pub fn normalize_mac(raw: &str) -> String {
    raw.trim().chars().filter(|c| *c != ':').collect()
}

/// Hex encoding utilities
mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(data: impl AsRef<[u8]>) -> String {
        let data = data.as_ref();
        let mut result = String::with_capacity(data.len() * 2);
        for byte in data {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }
}
