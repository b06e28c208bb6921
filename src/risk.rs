//! Risk classification of a resolved QR destination.
//!
//! Levels are reason strings rather than a closed enum: the hop-count path
//! speaks `LOW`/`MEDIUM`/`HIGH` while the destination probe speaks
//! `MODERATE (SUSPICIOUS)`/`CRITICAL (PHISHING)`, and everything downstream
//! (user warning, statistics) dispatches on the severity keywords they contain.
use crate::url_resolver::{ChainTrace, ProbeReport};

pub const UNKNOWN: &str = "UNKNOWN";
pub const LOW: &str = "LOW";
pub const MEDIUM: &str = "MEDIUM";
pub const HIGH: &str = "HIGH";
pub const MODERATE_SUSPICIOUS: &str = "MODERATE (SUSPICIOUS)";
pub const CRITICAL_PHISHING: &str = "CRITICAL (PHISHING)";

pub const HIGH_RISK_WARNING: &str = "HIGH RISK - Do not visit the final URL. It may be malicious.";
pub const MEDIUM_RISK_WARNING: &str = "MEDIUM RISK - Inspect the final URL before visiting.";
pub const LOW_RISK_WARNING: &str = "LOW RISK - Exercise normal caution before visiting.";

/// Level and warnings chosen for one analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub risk_level: String,
    pub warnings: Vec<String>,
}

pub struct RiskClassifier;

impl RiskClassifier {
    /// The probe verdict wins whenever the probe ran; the hop count only
    /// decides when it did not.
    pub fn classify(chain: &ChainTrace, probe: Option<&ProbeReport>) -> Classification {
        match probe {
            Some(report) => {
                let risk_level = Self::classify_destination(report);
                log::debug!("Destination probe classified {} as {risk_level}", report.final_url);
                Classification {
                    risk_level: risk_level.to_string(),
                    warnings: report.warnings.clone(),
                }
            }
            None => {
                let risk_level = Self::classify_hops(chain.count);
                log::debug!("{} redirects classified as {risk_level}", chain.count);
                Classification {
                    risk_level: risk_level.to_string(),
                    warnings: Vec::new(),
                }
            }
        }
    }

    pub fn classify_hops(redirect_count: usize) -> &'static str {
        match redirect_count {
            0..=1 => LOW,
            2..=3 => MEDIUM,
            _ => HIGH,
        }
    }

    pub fn classify_destination(report: &ProbeReport) -> &'static str {
        if report.raw_ip || !report.keyword_hits.is_empty() {
            CRITICAL_PHISHING
        } else if !report.warnings.is_empty() {
            MODERATE_SUSPICIOUS
        } else {
            LOW
        }
    }
}

/// Fixed advice sentence for a risk level
pub fn user_warning(risk_level: &str) -> &'static str {
    match severity_rank(risk_level) {
        3 => HIGH_RISK_WARNING,
        2 => MEDIUM_RISK_WARNING,
        _ => LOW_RISK_WARNING,
    }
}

/// Ordinal severity of a reason string: 0 unknown, 1 low, 2 medium, 3 high
pub fn severity_rank(risk_level: &str) -> u8 {
    if risk_level.contains("CRITICAL") || risk_level == HIGH {
        3
    } else if risk_level.contains("MODERATE")
        || risk_level.contains("SUSPICIOUS")
        || risk_level == MEDIUM
    {
        2
    } else if risk_level == UNKNOWN {
        0
    } else {
        1
    }
}
