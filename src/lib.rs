pub mod config;
pub mod detector;
pub mod domain_utils;
pub mod error;
pub mod history;
pub mod qr_decoder;
pub mod risk;
pub mod url_resolver;
pub mod verdict;

pub use config::DetectorConfig;
pub use detector::QuishingDetector;
pub use error::TransportError;
pub use history::{HistorySink, JsonLinesHistory, MemoryHistory, QuishingStats};
pub use qr_decoder::ImageQrDecoder;
pub use url_resolver::{HttpTransport, Trace, TraceMethod, Transport};
pub use verdict::ScanVerdict;

/// Analyze a QR image with the default configuration over real HTTP
pub async fn analyze_quishing(image_path: impl AsRef<std::path::Path>) -> anyhow::Result<ScanVerdict> {
    let detector = QuishingDetector::new(DetectorConfig::default())?;
    Ok(detector.analyze(image_path).await)
}
