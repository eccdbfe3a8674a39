//! Resolver configuration.
//!
//! Configurable parameters for the SPV resolver and its DNS front-ends.
//! Default values follow the service's documented defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    // === DNS front-ends ===
    pub doh_port: u16,
    pub dot_port: u16,

    // === Header chain ===
    pub checkpoint_height: u64,
    pub window_size: usize,

    // === Cache ===
    pub dns_cache_ttl_default_secs: u64,
    pub handshake_resolution_timeout_ms: u64,

    // === P2P ===
    pub max_message_size: u32,
    pub max_fallback_peers: usize,
    pub p2p_port: u16,
    pub magic: u32,

    // === Peer discovery ===
    pub dns_seeds: Vec<String>,
    pub static_bootstrap: Vec<String>,

    // === TLD routing ===
    pub icann_tld_set: Vec<String>,
    pub blacklisted_tld_set: Vec<String>,

    // === Upstream DNS ===
    pub upstream_dns: String,
    pub upstream_dns_fallback: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            doh_port: 8443,
            dot_port: 1853,

            checkpoint_height: 136_000,
            window_size: 150,

            dns_cache_ttl_default_secs: 3600,
            handshake_resolution_timeout_ms: 15_000,

            max_message_size: 8_000_000,
            max_fallback_peers: 10,
            p2p_port: 12_038,
            magic: 0xD9B4_BEF9,

            dns_seeds: vec![
                "seed1.hnsresolver.example".to_string(),
                "seed2.hnsresolver.example".to_string(),
            ],
            static_bootstrap: vec![],

            icann_tld_set: vec![
                "com".to_string(),
                "net".to_string(),
                "org".to_string(),
                "io".to_string(),
            ],
            blacklisted_tld_set: vec![],

            upstream_dns: "9.9.9.9:53".to_string(),
            upstream_dns_fallback: "system".to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn with_doh_port(mut self, port: u16) -> Self {
        self.doh_port = port;
        self
    }

    pub fn with_dot_port(mut self, port: u16) -> Self {
        self.dot_port = port;
        self
    }

    pub fn with_p2p_port(mut self, port: u16) -> Self {
        self.p2p_port = port;
        self
    }

    pub fn is_icann_tld(&self, tld: &str) -> bool {
        self.icann_tld_set.iter().any(|t| t.eq_ignore_ascii_case(tld))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.window_size == 0 {
            anyhow::bail!("window_size must be greater than zero");
        }
        if self.max_fallback_peers == 0 {
            anyhow::bail!("max_fallback_peers must be greater than zero");
        }
        if self.max_message_size > 8_000_000 {
            anyhow::bail!(
                "max_message_size ({}) exceeds the protocol ceiling of 8,000,000",
                self.max_message_size
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert_eq!(config.checkpoint_height, 136_000);
        assert_eq!(config.window_size, 150);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ResolverConfig::default()
            .with_doh_port(9443)
            .with_dot_port(9853)
            .with_p2p_port(19038);
        assert_eq!(config.doh_port, 9443);
        assert_eq!(config.dot_port, 9853);
        assert_eq!(config.p2p_port, 19038);
    }

    #[test]
    fn test_icann_tld_lookup_is_case_insensitive() {
        let config = ResolverConfig::default();
        assert!(config.is_icann_tld("COM"));
        assert!(!config.is_icann_tld("bit"));
    }

    #[test]
    fn test_rejects_oversize_message_limit() {
        let mut config = ResolverConfig::default();
        config.max_message_size = 9_000_000;
        assert!(config.validate().is_err());
    }
}
