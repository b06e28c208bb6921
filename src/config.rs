use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete detector configuration. Built once at startup and handed to
/// `QuishingDetector`; the pipeline itself never reads files or env vars.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub decoder: DecoderConfig,
    pub resolver: ResolverConfig,
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecoderConfig {
    /// Images whose shorter side is below this are upscaled before decoding
    pub min_dimension: u32,
    /// Zoom factors tried on the binarized (or grayscale) image, in order
    pub rescale_factors: Vec<u32>,
    /// Rescale steps producing more pixels than this are skipped
    pub max_scaled_pixels: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            min_dimension: 200,
            rescale_factors: vec![2, 3],
            max_scaled_pixels: 40_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    pub max_redirects: usize,
    pub follow_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub user_agent: String,
    /// When disabled only the redirect-count heuristic classifies the URL
    pub probe_destination: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            max_redirects: 20,
            follow_timeout_secs: 10,
            probe_timeout_secs: 5,
            user_agent: format!("QuishGuard/{}", env!("CARGO_PKG_VERSION")),
            probe_destination: true,
        }
    }
}

impl ResolverConfig {
    pub fn follow_timeout(&self) -> Duration {
        Duration::from_secs(self.follow_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    /// Hosts exempt from keyword suspicion (subdomains included)
    pub safe_domains: Vec<String>,
    pub suspicious_keywords: Vec<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            safe_domains: ["google.com", "microsoft.com", "paypal.com", "youtube.com"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
            suspicious_keywords: [
                "login", "verify", "secure", "account", "update", "bank", "confirm",
            ]
            .iter()
            .map(|k| k.to_string())
            .collect(),
        }
    }
}

impl DetectorConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {path}"))?;
        let config: DetectorConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {path}"))?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {path}"))?;
        Ok(())
    }
}
