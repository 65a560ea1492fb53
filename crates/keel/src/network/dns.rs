//! Validation for DNS and host-table options.

use std::net::IpAddr;

use keel_common::{KeelError, KeelResult};

/// An `/etc/hosts` entry from `--add-host`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HostEntry {
    /// Hostname.
    pub host: String,
    /// Address.
    pub ip: IpAddr,
}

/// Parse `--add-host host:ip`. IPv6 addresses keep their colons.
pub fn parse_add_host(spec: &str) -> KeelResult<HostEntry> {
    let invalid = |message: String| KeelError::syntax("add-host", message);

    let (host, ip) = spec
        .split_once(':')
        .ok_or_else(|| invalid(format!("{spec:?} is not in host:ip format")))?;
    if !is_hostname(host) {
        return Err(invalid(format!("invalid hostname {host:?}")));
    }
    let ip = ip.trim_start_matches('[').trim_end_matches(']');
    let ip = ip
        .parse::<IpAddr>()
        .map_err(|_| invalid(format!("invalid IP address {ip:?}")))?;

    Ok(HostEntry {
        host: host.to_string(),
        ip,
    })
}

/// Parse `--dns` server addresses.
pub fn parse_dns_servers(servers: &[String]) -> KeelResult<Vec<IpAddr>> {
    servers
        .iter()
        .map(|server| {
            server
                .parse()
                .map_err(|_| KeelError::syntax("dns", format!("{server:?} is not an IP address")))
        })
        .collect()
}

/// Validate `--dns-search`; `.` clears the list and may not be combined.
pub fn validate_dns_search(domains: &[String]) -> KeelResult<Vec<String>> {
    if domains.iter().any(|d| d == ".") {
        if domains.len() > 1 {
            return Err(KeelError::conflict("--dns-search .", "other --dns-search domains"));
        }
        return Ok(Vec::new());
    }
    for domain in domains {
        if !is_hostname(domain.trim_end_matches('.')) {
            return Err(KeelError::syntax(
                "dns-search",
                format!("{domain:?} is not a valid domain"),
            ));
        }
    }
    Ok(domains.to_vec())
}

/// Validate `--ip`.
pub fn parse_static_ip(ip: &str) -> KeelResult<IpAddr> {
    ip.parse()
        .map_err(|_| KeelError::syntax("ip", format!("{ip:?} is not an IP address")))
}

/// Parse `--link-local-ip` addresses.
pub fn parse_link_local_ips(ips: &[String]) -> KeelResult<Vec<IpAddr>> {
    ips.iter()
        .map(|ip| {
            ip.parse().map_err(|_| {
                KeelError::syntax("link-local-ip", format!("{ip:?} is not an IP address"))
            })
        })
        .collect()
}

/// Validate `--mac-address` (six colon-separated hex octets).
pub fn validate_mac(mac: &str) -> KeelResult<String> {
    let octets: Vec<&str> = mac.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(KeelError::syntax(
            "mac-address",
            format!("{mac:?} is not a valid MAC address"),
        ));
    }
    Ok(mac.to_ascii_lowercase())
}

/// RFC 1123 hostname check.
pub fn is_hostname(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && name.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_common::ErrorKind;

    #[test]
    fn add_host() {
        let entry = parse_add_host("db.local:10.0.0.5").unwrap();
        assert_eq!(entry.host, "db.local");
        assert_eq!(entry.ip, "10.0.0.5".parse::<IpAddr>().unwrap());

        let v6 = parse_add_host("v6host:fe80::1").unwrap();
        assert!(v6.ip.is_ipv6());

        assert!(parse_add_host("nocolon").is_err());
        assert!(parse_add_host("-bad:10.0.0.1").is_err());
        assert!(parse_add_host("host:999.0.0.1").is_err());
    }

    #[test]
    fn dns_search_dot_is_exclusive() {
        assert!(validate_dns_search(&[".".into()]).unwrap().is_empty());
        let err = validate_dns_search(&[".".into(), "example.com".into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingOptions);
        assert_eq!(
            validate_dns_search(&["example.com".into()]).unwrap(),
            vec!["example.com".to_string()]
        );
        assert!(validate_dns_search(&["bad_domain".into()]).is_err());
    }

    #[test]
    fn servers_and_addresses() {
        assert_eq!(parse_dns_servers(&["1.1.1.1".into(), "::1".into()]).unwrap().len(), 2);
        assert!(parse_dns_servers(&["resolver".into()]).is_err());
        assert!(parse_static_ip("10.88.0.10").is_ok());
        assert!(parse_static_ip("10.88.0").is_err());
    }

    #[test]
    fn link_local_addresses() {
        let ips = parse_link_local_ips(&["169.254.10.1".into(), "fe80::2".into()]).unwrap();
        assert_eq!(ips.len(), 2);
        assert!(ips[1].is_ipv6());
        assert!(parse_link_local_ips(&["link-local".into()]).is_err());
    }

    #[test]
    fn mac_addresses() {
        assert_eq!(validate_mac("AA:bb:cc:00:11:22").unwrap(), "aa:bb:cc:00:11:22");
        assert!(validate_mac("aa:bb:cc:00:11").is_err());
        assert!(validate_mac("zz:bb:cc:00:11:22").is_err());
    }
}
