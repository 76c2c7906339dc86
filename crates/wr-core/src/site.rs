//! Registrable-domain helpers for first/third-party checks
//!
//! No Public Suffix List is bundled; eTLD+1 is approximated with the
//! common two-part suffix table below.
//!
//! # Examples
//!
//! ```
//! use wr_core::site::registrable_domain;
//!
//! assert_eq!(registrable_domain("sub.example.com"), "example.com");
//! assert_eq!(registrable_domain("sub.example.co.uk"), "example.co.uk");
//! ```

/// Common two-part TLDs.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the eTLD+1 (registrable domain) for a hostname.
pub fn registrable_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    // IP literals and single labels are their own site
    if host.is_empty() || host.starts_with('[') || host.parse::<std::net::Ipv4Addr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    let n = labels.len();
    if n <= 2 {
        return host;
    }

    let last_two = format!("{}.{}", labels[n - 2], labels[n - 1]);
    if COMMON_TWO_PART_TLDS.contains(&last_two.as_str()) {
        return labels[n - 3..].join(".");
    }

    labels[n - 2..].join(".")
}

/// Check if two hosts share the same eTLD+1.
pub fn is_same_site(host1: &str, host2: &str) -> bool {
    registrable_domain(host1) == registrable_domain(host2)
}

/// Check if a request is third-party.
///
/// An empty site host (no known document) counts as first-party.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    !site_host.is_empty() && !is_same_site(site_host, req_host)
}
