//! Host-side configuration
//!
//! Defaults match a stock ESP Linux image with one X-HEEP tile. Each field can
//! be overridden from the environment, and the CLI overrides the environment.

use std::path::PathBuf;

use xheep_tile::{DEFAULT_CONTIG_PATH, DEFAULT_DEVICE_PATH};

use crate::backend::BackendSelection;

/// Device node of the tile
pub const ENV_DEVICE: &str = "XHEEP_DEVICE";
/// Device node of the contiguous allocator
pub const ENV_CONTIG_DEVICE: &str = "XHEEP_CONTIG_DEVICE";
/// Physical address ELF segments are linked against
pub const ENV_LOAD_BASE: &str = "XHEEP_LOAD_BASE";
/// Backend selection (`auto`, `kernel`, `software`)
pub const ENV_BACKEND: &str = "XHEEP_BACKEND";

/// Where the tile and its allocator live, and how firmware is placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileConfig {
    /// Tile device node
    pub device_path: PathBuf,
    /// Contiguous allocator device node
    pub contig_path: PathBuf,
    /// Subtracted from ELF physical addresses to get tile offsets
    pub load_base: u32,
    /// Which backend to drive
    pub backend: BackendSelection,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            contig_path: PathBuf::from(DEFAULT_CONTIG_PATH),
            load_base: 0,
            backend: BackendSelection::Auto,
        }
    }
}

impl TileConfig {
    /// Defaults overridden by `XHEEP_*` environment variables
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_DEVICE) {
            config.device_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_CONTIG_DEVICE) {
            config.contig_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_LOAD_BASE) {
            match parse_u32(&value) {
                Some(base) => config.load_base = base,
                None => tracing::warn!("Ignoring {ENV_LOAD_BASE}={value}: not a 32-bit number"),
            }
        }
        if let Some(value) = lookup(ENV_BACKEND) {
            match value.parse() {
                Ok(selection) => config.backend = selection,
                Err(e) => tracing::warn!("Ignoring {ENV_BACKEND}: {e}"),
            }
        }

        config
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal `u32`
#[must_use]
pub fn parse_u32(value: &str) -> Option<u32> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = TileConfig::from_lookup(lookup(&[]));
        assert_eq!(config, TileConfig::default());
        assert_eq!(config.device_path, PathBuf::from("/dev/xheep_rtl.0"));
        assert_eq!(config.contig_path, PathBuf::from("/dev/contig_alloc"));
    }

    #[test]
    fn environment_overrides() {
        let config = TileConfig::from_lookup(lookup(&[
            (ENV_DEVICE, "/dev/xheep_rtl.1"),
            (ENV_LOAD_BASE, "0x8000_0000"),
            (ENV_BACKEND, "software"),
        ]));
        assert_eq!(config.device_path, PathBuf::from("/dev/xheep_rtl.1"));
        assert_eq!(config.load_base, 0x8000_0000);
        assert_eq!(config.backend, BackendSelection::Software);
    }

    #[test]
    fn bad_values_ignored() {
        let config = TileConfig::from_lookup(lookup(&[
            (ENV_LOAD_BASE, "0xzz"),
            (ENV_BACKEND, "fpga"),
        ]));
        assert_eq!(config.load_base, 0);
        assert_eq!(config.backend, BackendSelection::Auto);
    }

    #[test]
    fn parse_numbers() {
        assert_eq!(parse_u32("384"), Some(384));
        assert_eq!(parse_u32("0x180"), Some(0x180));
        assert_eq!(parse_u32("0X1_0000"), Some(0x1_0000));
        assert_eq!(parse_u32("0x1_0000_0000"), None);
    }
}
