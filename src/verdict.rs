use crate::risk;
use serde::{Deserialize, Serialize};

pub const DECODE_FAILURE_MESSAGE: &str = "QR image detected, but decoding failed due to image quality or scaling. Try uploading the original QR image or a higher-resolution version.";

/// Outcome of one QR analysis. Every field is always present; optional
/// fields serialize as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanVerdict {
    /// `None` iff no QR symbol could be decoded
    pub decoded_url: Option<String>,
    pub redirect_chain: Vec<String>,
    pub redirect_count: usize,
    /// `None` only when decoding failed
    pub final_url: Option<String>,
    /// Host of `final_url`, empty when there is none
    pub final_domain: String,
    /// Severity reason string, see [`crate::risk`]
    pub risk_level: String,
    pub warnings: Vec<String>,
    pub user_warning: String,
    pub security_explanation: String,
}

impl ScanVerdict {
    /// Verdict for an image nothing could be decoded from
    pub fn undecoded() -> Self {
        ScanVerdict {
            decoded_url: None,
            redirect_chain: Vec::new(),
            redirect_count: 0,
            final_url: None,
            final_domain: String::new(),
            risk_level: risk::UNKNOWN.to_string(),
            warnings: Vec::new(),
            user_warning: DECODE_FAILURE_MESSAGE.to_string(),
            security_explanation: DECODE_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded_url.is_some()
    }
}
