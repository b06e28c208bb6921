//! The QR-to-verdict pipeline: decode, resolve, classify, compose.
use crate::config::DetectorConfig;
use crate::domain_utils::DomainUtils;
use crate::error::TransportError;
use crate::history::{HistorySink, QUISHING_SERVICE};
use crate::qr_decoder::ImageQrDecoder;
use crate::risk::{self, RiskClassifier};
use crate::url_resolver::{ChainTrace, HttpTransport, ProbeReport, RedirectResolver, Transport};
use crate::verdict::ScanVerdict;
use std::path::Path;
use std::sync::Arc;

pub struct QuishingDetector<T = HttpTransport> {
    decoder: ImageQrDecoder,
    resolver: RedirectResolver<T>,
    history: Option<Arc<dyn HistorySink>>,
}

impl QuishingDetector<HttpTransport> {
    pub fn new(config: DetectorConfig) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.resolver)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> QuishingDetector<T> {
    pub fn with_transport(config: DetectorConfig, transport: T) -> Self {
        Self {
            decoder: ImageQrDecoder::new(&config.decoder),
            resolver: RedirectResolver::new(transport, config.resolver, config.risk),
            history: None,
        }
    }

    /// Record every path-based analysis in `sink`
    pub fn with_history(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.history = Some(sink);
        self
    }

    pub fn transport(&self) -> &T {
        self.resolver.transport()
    }

    /// Analyze the image at `image_path`. Never fails: missing files and
    /// non-images produce the UNKNOWN verdict.
    pub async fn analyze(&self, image_path: impl AsRef<Path>) -> ScanVerdict {
        let image_path = image_path.as_ref();
        let decoded = self.decoder.decode_path(image_path);
        let verdict = self.analyze_decoded(&decoded).await;
        self.record(image_path, &verdict);
        verdict
    }

    /// Analyze encoded image bytes
    pub async fn analyze_bytes(&self, bytes: &[u8]) -> ScanVerdict {
        let decoded = self.decoder.decode_bytes(bytes);
        self.analyze_decoded(&decoded).await
    }

    /// Compose a verdict for already-decoded QR text. Empty text
    /// short-circuits to UNKNOWN without touching the network.
    pub async fn analyze_decoded(&self, decoded: &str) -> ScanVerdict {
        if decoded.trim().is_empty() {
            log::info!("No QR code decoded; skipping redirect analysis");
            return ScanVerdict::undecoded();
        }

        let url = DomainUtils::normalize_scanned_url(decoded);
        log::info!("Analyzing QR destination {url}");

        let chain = self.resolver.follow_chain(&url).await;
        let probe = if self.resolver.config().probe_destination {
            Some(self.resolver.probe_destination(&url).await)
        } else {
            None
        };

        let classification = RiskClassifier::classify(&chain, probe.as_ref());
        let final_url = match &probe {
            Some(report) => report.final_url.clone(),
            None => chain.final_url.clone(),
        };
        let security_explanation = explain(&url, &chain, probe.as_ref(), &final_url);
        let user_warning = risk::user_warning(&classification.risk_level).to_string();

        log::info!(
            "{url} -> {final_url}: {} ({} redirects)",
            classification.risk_level,
            chain.count
        );

        ScanVerdict {
            final_domain: DomainUtils::extract_host(&final_url),
            decoded_url: Some(url),
            redirect_chain: chain.chain,
            redirect_count: chain.count,
            final_url: Some(final_url),
            risk_level: classification.risk_level,
            warnings: classification.warnings,
            user_warning,
            security_explanation,
        }
    }

    fn record(&self, image_path: &Path, verdict: &ScanVerdict) {
        let Some(history) = &self.history else {
            return;
        };
        let label = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| image_path.display().to_string());
        match serde_json::to_string(verdict) {
            Ok(serialized) => history.record(QUISHING_SERVICE, &label, &serialized),
            Err(e) => log::warn!("Could not serialize verdict for {label}: {e}"),
        }
    }
}

/// Auditor-facing narrative of what the redirect trace showed
fn explain(
    decoded_url: &str,
    chain: &ChainTrace,
    probe: Option<&ProbeReport>,
    final_url: &str,
) -> String {
    let mut reasons = vec![format!("QR decoded to: {decoded_url}.")];
    let probe_hops = probe.map_or(0, |report| report.hops);

    match &chain.failure {
        Some(TransportError::TooManyRedirects { limit }) => {
            reasons.push(format!(
                "{} intermediate redirect(s) were observed.",
                chain.count
            ));
            reasons.push(format!(
                "The redirect chain exceeded {limit} hops and was not followed further."
            ));
        }
        Some(e) => {
            reasons.push(format!("The redirect chain could not be traced ({e})."));
        }
        None if chain.count > 0 => {
            reasons.push(format!(
                "{} intermediate redirect(s) were observed.",
                chain.count
            ));
        }
        None if probe_hops > 0 => {
            reasons.push(format!(
                "The redirect trace saw no redirections, but the destination check was redirected {probe_hops} time(s)."
            ));
        }
        None => {
            reasons.push("The URL does not perform redirections (direct link).".to_string());
        }
    }
    if probe.is_some_and(|report| !report.reachable) {
        reasons.push("The destination did not answer the reachability check.".to_string());
    }

    let initial_host = DomainUtils::extract_host(decoded_url);
    let final_host = DomainUtils::extract_host(final_url);
    if !initial_host.is_empty()
        && !final_host.is_empty()
        && DomainUtils::canonicalize_domain(&initial_host)
            != DomainUtils::canonicalize_domain(&final_host)
    {
        reasons.push(format!(
            "Final host ({final_host}) differs from initial host ({initial_host}), this can indicate URL masking."
        ));
    }

    if chain.count >= 4 {
        reasons.push("Multiple redirects may be used to obfuscate the final landing page and evade detection; treat as HIGH risk.".to_string());
    } else if chain.count >= 2 {
        reasons.push("A moderate number of redirects found; the final landing page should be inspected before visiting.".to_string());
    } else {
        reasons.push("Few or no redirects found; likely lower risk but always inspect the final destination.".to_string());
    }

    reasons.join(" ")
}
