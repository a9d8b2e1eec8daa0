//! Target checks shared by the browser drivers.
//!
//! Candidate URLs come from web search results, so before a driver loads one
//! it must be plain `http`/`https` and, unless private targets are allowed,
//! must not resolve to a loopback, private or link-local address.

use std::net::IpAddr;

use jobscout_core::AppError;
use url::Url;

/// Reject URLs a driver must not load.
pub async fn check_url(url: &str, allow_private: bool) -> Result<(), AppError> {
    let parsed = Url::parse(url).map_err(|e| AppError::InvalidUrl(format!("{url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AppError::InvalidUrl(format!(
                "scheme '{scheme}' is not allowed (only http/https): {url}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AppError::InvalidUrl(format!("no host in {url}")))?;

    if allow_private {
        return Ok(());
    }

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return if is_private_ip(ip) {
            Err(AppError::InvalidUrl(format!(
                "{host} is a private/reserved address"
            )))
        } else {
            Ok(())
        };
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AppError::NetworkError(format!("DNS resolution failed for {host}: {e}")))?
        .collect();

    if let Some(private) = addrs.iter().find(|a| is_private_ip(a.ip())) {
        return Err(AppError::InvalidUrl(format!(
            "{host} resolves to private/reserved address {}",
            private.ip()
        )));
    }
    if addrs.is_empty() {
        return Err(AppError::NetworkError(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }
    Ok(())
}

/// Loopback, private, link-local, CGN and other non-public ranges.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xFFC0) == 0xFE80
                || (v6.segments()[0] & 0xFE00) == 0xFC00
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}
