use crate::config::{ResolverConfig, RiskConfig};
use crate::domain_utils::DomainUtils;
use crate::error::TransportError;
use reqwest::header::LOCATION;
use reqwest::{Client, Method};
use std::time::Duration;
use url::Url;

pub const UNREACHABLE_WARNING: &str = "URL is unreachable (Potential Block)";
pub const RAW_IP_WARNING: &str = "Destination is a raw IP address (High Risk)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceMethod {
    /// Full request; the body is never read
    Get,
    /// Existence check only
    Head,
}

/// Hops of one request that was followed to a non-redirect response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    /// Every URL that answered with a redirect, in order
    pub history: Vec<String>,
    pub final_url: String,
}

/// The only way the resolver touches the network.
#[allow(async_fn_in_trait)]
pub trait Transport: Send + Sync {
    /// Request `url`, following redirects. More than `max_redirects` hops
    /// must fail with `TransportError::TooManyRedirects`.
    async fn trace(
        &self,
        method: TraceMethod,
        url: &str,
        timeout: Duration,
        max_redirects: usize,
    ) -> Result<Trace, TransportError>;
}

/// reqwest-backed transport following redirects hop by hop
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ResolverConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    /// Wrap a preconfigured client. Its redirect policy must be
    /// `Policy::none()`, otherwise hops are followed invisibly.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn trace(
        &self,
        method: TraceMethod,
        url: &str,
        timeout: Duration,
        max_redirects: usize,
    ) -> Result<Trace, TransportError> {
        let mut current = Url::parse(url)?;
        if !matches!(current.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {}",
                current.scheme()
            )));
        }

        let method = match method {
            TraceMethod::Get => Method::GET,
            TraceMethod::Head => Method::HEAD,
        };
        let mut history = Vec::new();

        loop {
            let response = self
                .client
                .request(method.clone(), current.clone())
                .timeout(timeout)
                .send()
                .await?;

            if !response.status().is_redirection() {
                break;
            }
            let Some(location) = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                break;
            };

            // Handle relative URLs
            let next = current.join(location)?;
            if history.len() >= max_redirects {
                return Err(TransportError::TooManyRedirects {
                    limit: max_redirects,
                });
            }
            log::debug!("{} redirected to {}", current, next);
            history.push(current.to_string());
            current = next;
        }

        // Unredirected URLs are reported exactly as requested
        let final_url = if history.is_empty() {
            url.to_string()
        } else {
            current.to_string()
        };
        Ok(Trace { history, final_url })
    }
}

/// Result of following the full redirect chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTrace {
    /// Intermediate hops followed by the final URL; empty on any failure
    pub chain: Vec<String>,
    /// Number of intermediate hops, never above the configured maximum
    pub count: usize,
    pub final_url: String,
    pub failure: Option<TransportError>,
}

/// Result of the destination-risk probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub final_url: String,
    pub reachable: bool,
    pub hops: usize,
    /// Suspicious keywords found on a host outside the allow-list
    pub keyword_hits: Vec<String>,
    pub raw_ip: bool,
    pub warnings: Vec<String>,
}

/// Runs the two bounded network analyses of a decoded URL
pub struct RedirectResolver<T> {
    transport: T,
    config: ResolverConfig,
    risk: RiskConfig,
}

impl<T: Transport> RedirectResolver<T> {
    pub fn new(transport: T, config: ResolverConfig, risk: RiskConfig) -> Self {
        Self {
            transport,
            config,
            risk,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Follow every redirect of `url` with GET. Looping or over-long chains
    /// report the cap with no chain; other failures report zero hops.
    pub async fn follow_chain(&self, url: &str) -> ChainTrace {
        let max_redirects = self.config.max_redirects;
        let result = self
            .transport
            .trace(
                TraceMethod::Get,
                url,
                self.config.follow_timeout(),
                max_redirects,
            )
            .await
            .and_then(|trace| {
                // The cap holds even for transports that overshoot it
                if trace.history.len() > max_redirects {
                    Err(TransportError::TooManyRedirects {
                        limit: max_redirects,
                    })
                } else {
                    Ok(trace)
                }
            });

        match result {
            Ok(trace) => {
                let count = trace.history.len();
                let mut chain = trace.history;
                chain.push(trace.final_url.clone());
                ChainTrace {
                    chain,
                    count,
                    final_url: trace.final_url,
                    failure: None,
                }
            }
            Err(e @ TransportError::TooManyRedirects { .. }) => {
                log::debug!("Redirect chain of {url} cut off: {e}");
                ChainTrace {
                    chain: Vec::new(),
                    count: max_redirects,
                    final_url: url.to_string(),
                    failure: Some(e),
                }
            }
            Err(e) => {
                log::debug!("Redirect chain of {url} not followed: {e}");
                ChainTrace {
                    chain: Vec::new(),
                    count: 0,
                    final_url: url.to_string(),
                    failure: Some(e),
                }
            }
        }
    }

    /// Resolve `url` with HEAD and inspect where it lands
    pub async fn probe_destination(&self, url: &str) -> ProbeReport {
        let mut warnings = Vec::new();

        let result = self
            .transport
            .trace(
                TraceMethod::Head,
                url,
                self.config.probe_timeout(),
                self.config.max_redirects,
            )
            .await;

        let (final_url, hops, reachable) = match result {
            Ok(trace) if trace.history.len() <= self.config.max_redirects => {
                let hops = trace.history.len();
                if hops > 0 {
                    warnings.push(format!("Redirected {hops} times"));
                }
                (trace.final_url, hops, true)
            }
            Ok(trace) => {
                log::debug!("Probe of {url} exceeded redirect cap ({} hops)", trace.history.len());
                warnings.push(UNREACHABLE_WARNING.to_string());
                (url.to_string(), 0, false)
            }
            Err(e) => {
                log::debug!("Probe of {url} failed: {e}");
                warnings.push(UNREACHABLE_WARNING.to_string());
                (url.to_string(), 0, false)
            }
        };

        let host = DomainUtils::extract_host(&final_url);
        let keyword_hits = self.keyword_hits(&final_url, &host);
        if !keyword_hits.is_empty() {
            warnings.push(format!(
                "Suspicious keywords found: {}",
                keyword_hits.join(", ")
            ));
        }

        let raw_ip = DomainUtils::is_raw_ip(&host);
        if raw_ip {
            warnings.push(RAW_IP_WARNING.to_string());
        }

        ProbeReport {
            final_url,
            reachable,
            hops,
            keyword_hits,
            raw_ip,
            warnings,
        }
    }

    fn keyword_hits(&self, url: &str, host: &str) -> Vec<String> {
        if DomainUtils::matches_domain_list(host, &self.risk.safe_domains) {
            return Vec::new();
        }
        let target = DomainUtils::host_and_path(url);
        self.risk
            .suspicious_keywords
            .iter()
            .filter(|keyword| !keyword.is_empty() && target.contains(&keyword.to_lowercase()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Answers from a fixed table keyed by method; unknown URLs are unreachable
    #[derive(Default)]
    struct TableTransport {
        get: HashMap<String, Vec<String>>,
        head: HashMap<String, Vec<String>>,
    }

    impl TableTransport {
        fn route(mut self, url: &str, hops: &[&str]) -> Self {
            let hops: Vec<String> = hops.iter().map(|h| h.to_string()).collect();
            self.get.insert(url.to_string(), hops.clone());
            self.head.insert(url.to_string(), hops);
            self
        }
    }

    impl Transport for TableTransport {
        async fn trace(
            &self,
            method: TraceMethod,
            url: &str,
            _timeout: Duration,
            _max_redirects: usize,
        ) -> Result<Trace, TransportError> {
            let table = match method {
                TraceMethod::Get => &self.get,
                TraceMethod::Head => &self.head,
            };
            // hops lists every URL after the first; the last one is final
            let hops = table
                .get(url)
                .ok_or_else(|| TransportError::Connect("no route".to_string()))?;
            let mut history = vec![url.to_string()];
            history.extend(hops.iter().cloned());
            let final_url = history.pop().unwrap_or_default();
            Ok(Trace { history, final_url })
        }
    }

    fn resolver(transport: TableTransport) -> RedirectResolver<TableTransport> {
        RedirectResolver::new(
            transport,
            ResolverConfig::default(),
            RiskConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_follow_chain_records_hops() {
        let transport = TableTransport::default().route(
            "http://short.example/a",
            &["http://mid.example/b", "http://dest.example/c"],
        );
        let trace = resolver(transport).follow_chain("http://short.example/a").await;

        assert_eq!(trace.count, 2);
        assert_eq!(
            trace.chain,
            vec![
                "http://short.example/a".to_string(),
                "http://mid.example/b".to_string(),
                "http://dest.example/c".to_string(),
            ]
        );
        assert_eq!(trace.final_url, "http://dest.example/c");
        assert!(trace.failure.is_none());
    }

    #[tokio::test]
    async fn test_follow_chain_direct_link() {
        let transport = TableTransport::default().route("http://example.com", &[]);
        let trace = resolver(transport).follow_chain("http://example.com").await;

        assert_eq!(trace.count, 0);
        assert_eq!(trace.chain, vec!["http://example.com".to_string()]);
        assert_eq!(trace.final_url, "http://example.com");
    }

    #[tokio::test]
    async fn test_follow_chain_caps_overlong_chain() {
        let hops: Vec<String> = (1..=25).map(|i| format!("http://loop.example/{i}")).collect();
        let hop_refs: Vec<&str> = hops.iter().map(String::as_str).collect();
        let transport = TableTransport::default().route("http://loop.example/0", &hop_refs);
        let trace = resolver(transport).follow_chain("http://loop.example/0").await;

        assert_eq!(trace.count, 20);
        assert!(trace.chain.is_empty());
        assert_eq!(trace.final_url, "http://loop.example/0");
        assert_eq!(
            trace.failure,
            Some(TransportError::TooManyRedirects { limit: 20 })
        );
    }

    #[tokio::test]
    async fn test_follow_chain_network_failure() {
        let trace = resolver(TableTransport::default())
            .follow_chain("http://down.example")
            .await;

        assert_eq!(trace.count, 0);
        assert!(trace.chain.is_empty());
        assert_eq!(trace.final_url, "http://down.example");
        assert!(matches!(trace.failure, Some(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_probe_clean_destination() {
        let transport = TableTransport::default().route("http://example.com", &[]);
        let report = resolver(transport).probe_destination("http://example.com").await;

        assert!(report.reachable);
        assert!(report.warnings.is_empty());
        assert!(report.keyword_hits.is_empty());
        assert!(!report.raw_ip);
    }

    #[tokio::test]
    async fn test_probe_keyword_hits_after_redirects() {
        let transport = TableTransport::default().route(
            "http://qr.example/x",
            &["http://t.example/y", "https://secure-login.example/verify"],
        );
        let report = resolver(transport).probe_destination("http://qr.example/x").await;

        assert_eq!(report.final_url, "https://secure-login.example/verify");
        assert_eq!(report.hops, 2);
        assert_eq!(report.keyword_hits, vec!["login", "verify", "secure"]);
        assert_eq!(report.warnings[0], "Redirected 2 times");
        assert_eq!(
            report.warnings[1],
            "Suspicious keywords found: login, verify, secure"
        );
    }

    #[tokio::test]
    async fn test_probe_allow_list_exempts_keywords() {
        let transport = TableTransport::default()
            .route("https://accounts.google.com/login", &[]);
        let report = resolver(transport)
            .probe_destination("https://accounts.google.com/login")
            .await;

        assert!(report.keyword_hits.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_probe_ignores_query_string() {
        let transport = TableTransport::default()
            .route("https://shop.example/item?ref=account-update", &[]);
        let report = resolver(transport)
            .probe_destination("https://shop.example/item?ref=account-update")
            .await;

        assert!(report.keyword_hits.is_empty());
    }

    #[tokio::test]
    async fn test_probe_raw_ip() {
        let transport = TableTransport::default().route("http://203.0.113.7:8080/pay", &[]);
        let report = resolver(transport)
            .probe_destination("http://203.0.113.7:8080/pay")
            .await;

        assert!(report.raw_ip);
        assert_eq!(report.warnings, vec![RAW_IP_WARNING.to_string()]);
    }

    #[tokio::test]
    async fn test_probe_unreachable_keeps_url() {
        let report = resolver(TableTransport::default())
            .probe_destination("http://bank-update.example/")
            .await;

        assert!(!report.reachable);
        assert_eq!(report.final_url, "http://bank-update.example/");
        assert_eq!(report.warnings[0], UNREACHABLE_WARNING);
        // the keyword check still runs against the original URL
        assert_eq!(report.keyword_hits, vec!["update", "bank"]);
    }
}
