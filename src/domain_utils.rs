use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    // A scheme followed by something other than a port number ("host:8080" has no scheme)
    static ref SCHEME_RE: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:(?:[^0-9]|$)").unwrap();
}

/// Host and URL helpers shared by the resolver, classifier and composer
pub struct DomainUtils;

impl DomainUtils {
    /// Prefix `http://` to scanned text that carries no scheme
    pub fn normalize_scanned_url(raw: &str) -> String {
        let trimmed = raw.trim();
        if SCHEME_RE.is_match(trimmed) {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        }
    }

    /// Lowercased host of a URL, or an empty string when there is none
    pub fn extract_host(url: &str) -> String {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
            .unwrap_or_default()
    }

    /// Host plus path, lowercased; the text scanned for suspicious keywords.
    /// Falls back to the whole URL when it does not parse.
    pub fn host_and_path(url: &str) -> String {
        match Url::parse(url) {
            Ok(parsed) => format!(
                "{}{}",
                parsed.host_str().unwrap_or_default(),
                parsed.path()
            )
            .to_lowercase(),
            Err(_) => url.to_lowercase(),
        }
    }

    /// Check if domain matches any in list (with hierarchy support)
    pub fn matches_domain_list(domain: &str, domain_list: &[String]) -> bool {
        let domain_lower = domain.to_lowercase();

        domain_list.iter().any(|pattern| {
            let pattern_lower = pattern.to_lowercase();
            domain_lower == pattern_lower || domain_lower.ends_with(&format!(".{pattern_lower}"))
        })
    }

    /// Canonicalize domain (remove www prefix)
    pub fn canonicalize_domain(domain: &str) -> String {
        let domain_lower = domain.to_lowercase();
        if let Some(stripped) = domain_lower.strip_prefix("www.") {
            stripped.to_string()
        } else {
            domain_lower
        }
    }

    /// A host made only of digits once dots are removed, or a bracketed IPv6 literal
    pub fn is_raw_ip(host: &str) -> bool {
        if host.starts_with('[') && host.ends_with(']') {
            return true;
        }
        let digits: String = host.chars().filter(|c| *c != '.').collect();
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    }
}
