use std::net::{Ipv4Addr, Ipv6Addr};
use url::Host;

/// Returns true if the host points at this machine or a private network
///
/// # Arguments
///
/// * `host` - The parsed host of a URL
///
/// # Returns
///
/// * `true` - localhost, loopback, unspecified, link-local or private range
/// * `false` - Any other host
pub fn is_internal_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost")
        }
        Host::Ipv4(addr) => is_internal_v4(addr),
        Host::Ipv6(addr) => is_internal_v6(addr),
    }
}

fn is_internal_v4(addr: &Ipv4Addr) -> bool {
    addr.is_loopback() || addr.is_private() || addr.is_link_local() || addr.is_unspecified()
}

fn is_internal_v6(addr: &Ipv6Addr) -> bool {
    if let Some(mapped) = addr.to_ipv4_mapped() {
        return is_internal_v4(&mapped);
    }

    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}
