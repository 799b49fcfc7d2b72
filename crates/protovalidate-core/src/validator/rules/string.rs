use std::sync::LazyLock;

use regex::Regex;

use super::ipv4::Ipv4;
use super::ipv6::Ipv6;
use super::uri::Uri;

// HTML living standard "valid e-mail address".
#[allow(clippy::expect_used)]
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("email regex must compile")
});

pub(crate) fn is_email(s: &str) -> bool {
    if s.len() > 254 || !EMAIL_REGEX.is_match(s) {
        return false;
    }
    s.split_once('@')
        .is_some_and(|(local, domain)| local.len() < 64 && is_hostname(domain))
}

pub(crate) fn is_hostname(s: &str) -> bool {
    if s.len() > 253 {
        return false;
    }
    let s = s.strip_suffix('.').unwrap_or(s).to_ascii_lowercase();
    if s.is_empty() {
        return false;
    }
    let mut last_all_digits = false;
    for label in s.split('.') {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return false;
        }
        last_all_digits = label.bytes().all(|b| b.is_ascii_digit());
    }
    // The right-most label must not be all digits.
    !last_all_digits
}

/// Checks an address of the given version: 0 for either, 4 or 6.
pub(crate) fn is_ip(s: &str, version: i64) -> bool {
    match version {
        0 => Ipv4::new(s).address() || Ipv6::new(s).address(),
        4 => Ipv4::new(s).address(),
        6 => Ipv6::new(s).address(),
        _ => false,
    }
}

/// Checks a CIDR prefix of the given version; `strict` also requires zero host bits.
pub(crate) fn is_ip_prefix(s: &str, version: i64, strict: bool) -> bool {
    let v4 = || {
        let mut ip = Ipv4::new(s);
        ip.address_prefix() && (!strict || ip.is_prefix_only())
    };
    let v6 = || {
        let mut ip = Ipv6::new(s);
        ip.address_prefix() && (!strict || ip.is_prefix_only())
    };
    match version {
        0 => v4() || v6(),
        4 => v4(),
        6 => v6(),
        _ => false,
    }
}

pub(crate) fn is_uri(s: &str) -> bool {
    Uri::new(s).uri()
}

pub(crate) fn is_uri_ref(s: &str) -> bool {
    Uri::new(s).uri_reference()
}

/// `host:port`, `[v6]:port`, or without the port when `port_required` is false.
/// The host is a hostname or IPv4 address unless bracketed.
pub(crate) fn is_host_and_port(s: &str, port_required: bool) -> bool {
    if s.is_empty() {
        return false;
    }
    let split_idx = s.rfind(':');

    if let Some(rest) = s.strip_prefix('[') {
        let Some(end) = rest.find(']') else {
            return false;
        };
        let host = &rest[..end];
        let after_host = &rest[end + 1..];
        if after_host.is_empty() {
            return !port_required && is_ip(host, 6);
        }
        return match after_host.strip_prefix(':') {
            Some(port) if split_idx == Some(end + 2) => is_ip(host, 6) && is_port(port),
            _ => false,
        };
    }

    let Some(split_idx) = split_idx else {
        return !port_required && (is_hostname(s) || is_ip(s, 4));
    };
    let host = &s[..split_idx];
    let port = &s[split_idx + 1..];
    (is_hostname(host) || is_ip(host, 4)) && is_port(port)
}

/// 0-65535 without leading zeros.
fn is_port(s: &str) -> bool {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if s.len() > 1 && s.starts_with('0') {
        return false;
    }
    s.parse::<u16>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn hostnames() {
        let long_label = format!("{}.com", "a".repeat(64));
        let long_name = format!("{}a", "a.".repeat(127));
        for s in [
            "example.com",
            "EXAMPLE.com.",
            "a-b.c0",
            "localhost",
            "xn--bcher-kva.example",
            "1.example.com",
        ] {
            assert!(is_hostname(s), "{s}");
        }
        for s in [
            "",
            ".",
            "-a.com",
            "a-.com",
            "a..com",
            "a_b.com",
            "example.123",
            "127.0.0.1",
            "ex\u{e4}mple.com",
            long_label.as_str(),
            long_name.as_str(),
        ] {
            assert!(!is_hostname(s), "{s}");
        }
    }

    #[test]
    fn emails() {
        assert!(is_email("foo@example.com"));
        assert!(is_email("foo.bar+baz@sub.example.com"));
        assert!(!is_email(""));
        assert!(!is_email("foo@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("foo bar@example.com"));
        assert!(!is_email("<foo@example.com>"));
        assert!(!is_email("foo@-example.com"));
        assert!(!is_email(&format!("{}@example.com", "a".repeat(64))));
        assert!(!is_email(&format!("a@{}.com", "b".repeat(250))));
    }

    #[test]
    fn ip_versions() {
        assert!(is_ip("127.0.0.1", 0));
        assert!(is_ip("::1", 0));
        assert!(is_ip("127.0.0.1", 4));
        assert!(!is_ip("127.0.0.1", 6));
        assert!(is_ip("::1", 6));
        assert!(!is_ip("::1", 4));
        assert!(!is_ip("127.0.0.1", 5));
        assert!(!is_ip("", 0));
    }

    #[test]
    fn ip_prefix_strictness_matches_rule_modes() {
        assert!(is_ip_prefix("192.168.1.1/24", 4, false));
        assert!(!is_ip_prefix("192.168.1.1/24", 4, true));
        assert!(is_ip_prefix("192.168.1.0/24", 4, true));
        assert!(is_ip_prefix("2001:db8::1/64", 6, false));
        assert!(!is_ip_prefix("2001:db8::1/64", 6, true));
        assert!(is_ip_prefix("2001:db8::/64", 0, true));
        assert!(!is_ip_prefix("2001:db8::/64", 4, false));
        assert!(!is_ip_prefix("192.168.1.0", 0, false));
        assert!(!is_ip_prefix("192.168.1.0/24", 7, false));
    }

    #[test]
    fn host_and_port_requires_valid_host_and_canonical_port() {
        assert!(is_host_and_port("example.com:8080", true));
        assert!(is_host_and_port("127.0.0.1:0", true));
        assert!(is_host_and_port("[2001:db8::1]:443", true));
        assert!(is_host_and_port("[::1]", false));
        assert!(is_host_and_port("example.com", false));
        assert!(!is_host_and_port("example.com", true));
        assert!(!is_host_and_port("[::1]", true));
        assert!(!is_host_and_port("not a host:80", true));
        assert!(!is_host_and_port("example.com:080", true));
        assert!(!is_host_and_port("example.com:65536", true));
        assert!(!is_host_and_port("[2001:db8::1]443", true));
        assert!(!is_host_and_port("[2001:db8::1]:", true));
        assert!(!is_host_and_port("::1:80", true));
        assert!(!is_host_and_port("", false));
    }

    proptest! {
        #[test]
        fn ports_in_range_are_accepted(port: u16) {
            prop_assert!(is_host_and_port(&format!("example.com:{port}"), true));
            let bracketed = format!("[::1]:{port}");
            prop_assert!(is_host_and_port(&bracketed, true));
        }
    }
}
