//! Upstream URL checks
//!
//! The relay forwards every accepted message to `upstream.base_url`, so a
//! misconfigured base URL must not point the relay at the host itself, a
//! private network or a cloud metadata service.

use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Reasons a base URL is refused
#[derive(Debug, Error)]
pub enum UrlPolicyError {
    #[error("Invalid upstream URL: {0}")]
    Parse(#[from] url::ParseError),

    #[error("Upstream scheme '{0}' is not allowed, use https")]
    Scheme(String),

    #[error("Upstream host '{0}' is not reachable from the relay")]
    Host(String),

    #[error("Upstream URL has no host")]
    MissingHost,
}

/// Hostnames that always resolve to the relay host or a metadata service
const LOCAL_HOSTNAMES: &[&str] = &["localhost", "localhost.localdomain", "ip6-localhost"];
const METADATA_HOSTNAMES: &[&str] = &["metadata.google.internal", "metadata.goog"];

/// What a base URL is permitted to point at
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlPolicy {
    pub allow_http: bool,
    pub allow_local: bool,
}

impl UrlPolicy {
    /// Local model servers over plain HTTP
    pub fn development() -> Self {
        Self {
            allow_http: true,
            allow_local: true,
        }
    }
}

/// Parse `raw` and check it against `policy`.
///
/// Link-local addresses and metadata hostnames are refused under every
/// policy.
pub fn validate_upstream_url(raw: &str, policy: &UrlPolicy) -> Result<Url, UrlPolicyError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "https" => {}
        "http" if policy.allow_http => {}
        other => return Err(UrlPolicyError::Scheme(other.to_string())),
    }

    let host = url
        .host_str()
        .ok_or(UrlPolicyError::MissingHost)?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();

    let refused = if matches_any(&host, METADATA_HOSTNAMES) {
        true
    } else if let Ok(ip) = host.parse::<IpAddr>() {
        let ip = unmap_ipv4(ip);
        is_link_local(&ip) || (!policy.allow_local && (ip.is_loopback() || is_private(&ip)))
    } else {
        !policy.allow_local && matches_any(&host, LOCAL_HOSTNAMES)
    };

    if refused {
        return Err(UrlPolicyError::Host(host));
    }
    Ok(url)
}

/// `::ffff:a.b.c.d` is checked as the IPv4 address it carries
fn unmap_ipv4(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}

fn matches_any(host: &str, names: &[&str]) -> bool {
    names
        .iter()
        .any(|name| host == *name || host.ends_with(&format!(".{}", name)))
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            // RFC 1918, carrier-grade NAT, "this network"
            v4.is_private() || (a == 100 && (b & 0xc0) == 64) || a == 0
        }
        // fc00::/7
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_https_accepted() {
        let url = validate_upstream_url("https://api.openai.com/v1", &UrlPolicy::default()).unwrap();
        assert_eq!(url.host_str(), Some("api.openai.com"));
    }

    #[test]
    fn test_plain_http_needs_opt_in() {
        let result = validate_upstream_url("http://api.example.com/v1", &UrlPolicy::default());
        assert!(matches!(result, Err(UrlPolicyError::Scheme(_))));

        let policy = UrlPolicy {
            allow_http: true,
            ..Default::default()
        };
        assert!(validate_upstream_url("http://api.example.com/v1", &policy).is_ok());
    }

    #[test]
    fn test_local_and_private_hosts_refused() {
        let policy = UrlPolicy::default();
        for raw in [
            "https://localhost:11434/v1",
            "https://127.0.0.1/v1",
            "https://[::1]/v1",
            "https://10.1.2.3/v1",
            "https://192.168.0.10/v1",
            "https://[::ffff:127.0.0.1]/v1",
            "https://[::ffff:10.0.0.1]/v1",
        ] {
            assert!(
                matches!(validate_upstream_url(raw, &policy), Err(UrlPolicyError::Host(_))),
                "{} should be refused",
                raw
            );
        }
    }

    #[test]
    fn test_development_policy_allows_local_model_server() {
        let policy = UrlPolicy::development();
        assert!(validate_upstream_url("http://localhost:11434/v1", &policy).is_ok());
        assert!(validate_upstream_url("http://192.168.0.10:8000/v1", &policy).is_ok());
    }

    #[test]
    fn test_metadata_refused_even_in_development() {
        let policy = UrlPolicy::development();
        assert!(validate_upstream_url("http://169.254.169.254/latest", &policy).is_err());
        assert!(validate_upstream_url("http://[::ffff:169.254.169.254]/latest", &policy).is_err());
        assert!(validate_upstream_url("http://metadata.google.internal/", &policy).is_err());
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        let result = validate_upstream_url("not a url", &UrlPolicy::default());
        assert!(matches!(result, Err(UrlPolicyError::Parse(_))));
    }
}
