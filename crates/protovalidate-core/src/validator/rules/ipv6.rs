//! IPv6 addresses (RFC 4291 text form, optional zone id) and CIDR prefixes.

use std::str;

use super::ipv4::Ipv4;
use super::{Scanner, bounded_decimal};

pub(crate) struct Ipv6<'a> {
    scanner: Scanner<'a>,
    pieces: Vec<u16>,
    double_colon_at: Option<usize>,
    dotted: Option<u32>,
    zone_id_found: bool,
    prefix_len: u32,
}

impl<'a> Ipv6<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            scanner: Scanner::new(input),
            pieces: Vec::with_capacity(8),
            double_colon_at: None,
            dotted: None,
            zone_id_found: false,
            prefix_len: 0,
        }
    }

    /// An address, optionally followed by a `%zone`, consuming all input.
    pub(crate) fn address(&mut self) -> bool {
        self.address_part() && self.scanner.at_end()
    }

    /// An address without zone id, `/`, and a prefix length of 0-128.
    pub(crate) fn address_prefix(&mut self) -> bool {
        self.address_part()
            && !self.zone_id_found
            && self.scanner.take(b'/')
            && self.prefix_length()
            && self.scanner.at_end()
    }

    /// The address as a 128-bit integer, with the `::` elision zero-filled.
    pub(crate) fn bits(&self) -> Option<u128> {
        let mut groups: Vec<u16> = self.pieces.clone();
        if let Some(dotted) = self.dotted {
            #[allow(clippy::cast_possible_truncation)] // splitting 32 bits into two halves
            groups.extend([(dotted >> 16) as u16, dotted as u16]);
        }
        if let Some(at) = self.double_colon_at {
            let fill = 8usize.checked_sub(groups.len())?;
            groups.splice(at..at, std::iter::repeat_n(0, fill));
        }
        if groups.len() != 8 {
            return None;
        }
        Some(
            groups
                .iter()
                .fold(0u128, |acc, group| (acc << 16) | u128::from(*group)),
        )
    }

    /// True when every bit after the prefix length is zero.
    pub(crate) fn is_prefix_only(&self) -> bool {
        let Some(bits) = self.bits() else {
            return false;
        };
        // Checked per 64-bit half so a prefix inside either half masks cleanly.
        #[allow(clippy::cast_possible_truncation)]
        let halves = [(bits >> 64) as u64, bits as u64];
        halves.iter().enumerate().all(|(i, half)| {
            let size = i64::from(self.prefix_len) - 64 * i64::try_from(i).unwrap_or(0);
            let mask = if size >= 64 {
                u64::MAX
            } else if size <= 0 {
                0
            } else {
                !(u64::MAX >> size)
            };
            half & !mask == 0
        })
    }

    fn group_count(&self) -> usize {
        self.pieces.len() + if self.dotted.is_some() { 2 } else { 0 }
    }

    fn groups_complete(&self) -> bool {
        if self.double_colon_at.is_some() {
            self.group_count() < 8
        } else {
            self.group_count() == 8
        }
    }

    fn address_part(&mut self) -> bool {
        while !self.scanner.at_end() {
            // Dotted notation for the right-most 32 bits, e.g. ::ffff:192.0.2.1
            if self.double_colon_at.is_some() || self.pieces.len() == 6 {
                if let Some(raw) = self.dotted_raw() {
                    let mut ipv4 = Ipv4::new(raw);
                    if !ipv4.address() {
                        return false;
                    }
                    self.dotted = ipv4.bits();
                    return self.groups_complete();
                }
            }
            match self.h16() {
                Some(true) => continue,
                Some(false) => {}
                None => return false,
            }
            if self.scanner.take(b':') {
                if self.scanner.take(b':') {
                    if self.double_colon_at.is_some() {
                        return false;
                    }
                    self.double_colon_at = Some(self.pieces.len());
                    if self.scanner.take(b':') {
                        return false;
                    }
                } else if self.scanner.checkpoint() == 1 || self.scanner.at_end() {
                    // A single colon can neither start nor end an address.
                    return false;
                }
                continue;
            }
            if self.scanner.peek(b'%') && !self.zone_id() {
                return false;
            }
            break;
        }
        self.groups_complete()
    }

    /// Any non-empty run after `%` is accepted as the zone id.
    fn zone_id(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.take(b'%') && self.scanner.remaining() > 0 {
            self.scanner.skip_to_end();
            self.zone_id_found = true;
            return true;
        }
        self.scanner.reset(start);
        self.zone_id_found = false;
        false
    }

    /// Consumes a run of digits and dots long enough to be a dotted quad.
    fn dotted_raw(&mut self) -> Option<&'a str> {
        let start = self.scanner.checkpoint();
        while self.scanner.digit() || self.scanner.take(b'.') {}
        let raw = self.scanner.since(start);
        if raw.len() >= 7 {
            return str::from_utf8(raw).ok();
        }
        self.scanner.reset(start);
        None
    }

    /// `Some(true)` when a group was read, `Some(false)` when none is present,
    /// `None` for more than four hex digits.
    fn h16(&mut self) -> Option<bool> {
        let start = self.scanner.checkpoint();
        while self.scanner.hex_dig() {}
        let digits = self.scanner.since(start);
        if digits.is_empty() {
            return Some(false);
        }
        if digits.len() > 4 {
            return None;
        }
        let text = str::from_utf8(digits).ok()?;
        self.pieces.push(u16::from_str_radix(text, 16).ok()?);
        Some(true)
    }

    fn prefix_length(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.scanner.digit() {
            if self.scanner.since(start).len() > 3 {
                return false;
            }
        }
        match bounded_decimal(self.scanner.since(start), 128) {
            Some(len) => {
                self.prefix_len = len;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn is_address(s: &str) -> bool {
        Ipv6::new(s).address()
    }

    #[test]
    fn accepts_standard_forms() {
        for s in [
            "::",
            "::1",
            "1::",
            "2001:db8::1",
            "2001:0db8:0000:0000:0000:ff00:0042:8329",
            "fe80::1%eth0",
            "::ffff:192.0.2.1",
            "1:2:3:4:5:6:1.2.3.4",
            "1:2:3:4:5:6:7::",
            "A:B:C:D:E:F:0:1",
        ] {
            assert!(is_address(s), "{s}");
        }
    }

    #[test]
    fn rejects_malformed_forms() {
        for s in [
            "",
            ":",
            ":::",
            "1:::2",
            "1::2::3",
            ":1::2",
            "1::2:",
            "12345::1",
            "1:2:3:4:5:6:7",
            "1:2:3:4:5:6:7:8:9",
            "1:2:3:4::5:6:7:8",
            "fe80::1%",
            "::ffff:256.0.0.1",
            "::ffff:1.2.3",
            "g::1",
            "1.2.3.4",
        ] {
            assert!(!is_address(s), "{s}");
        }
    }

    #[test]
    fn elision_is_zero_filled() {
        let mut ip = Ipv6::new("2001:db8::1");
        assert!(ip.address());
        assert_eq!(
            ip.bits(),
            Some(u128::from(std::net::Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)))
        );

        let mut mapped = Ipv6::new("::ffff:192.0.2.1");
        assert!(mapped.address());
        assert_eq!(
            mapped.bits(),
            Some(u128::from(
                std::net::Ipv4Addr::new(192, 0, 2, 1).to_ipv6_mapped()
            ))
        );
    }

    #[test]
    fn prefixes_reject_zones_and_check_host_bits() {
        let mut strict = Ipv6::new("2001:db8::/32");
        assert!(strict.address_prefix());
        assert!(strict.is_prefix_only());

        let mut host = Ipv6::new("2001:db8::1/64");
        assert!(host.address_prefix());
        assert!(!host.is_prefix_only());

        let mut upper = Ipv6::new("::1/128");
        assert!(upper.address_prefix());
        assert!(upper.is_prefix_only());

        let mut split = Ipv6::new("ffff:ffff:ffff:ffff:8000::/65");
        assert!(split.address_prefix());
        assert!(split.is_prefix_only());

        assert!(!Ipv6::new("fe80::1%eth0/64").address_prefix());
        assert!(!Ipv6::new("::/129").address_prefix());
        assert!(!Ipv6::new("::/064").address_prefix());
    }

    proptest! {
        #[test]
        fn agrees_with_std_on_rendered_addresses(bits: u128) {
            let rendered = std::net::Ipv6Addr::from(bits).to_string();
            let mut ip = Ipv6::new(&rendered);
            prop_assert!(ip.address(), "{}", rendered);
            prop_assert_eq!(ip.bits(), Some(bits));
        }

        #[test]
        fn never_panics(s in "[0-9a-fA-F:.%/]{0,48}") {
            let _ = Ipv6::new(&s).address();
            let mut p = Ipv6::new(&s);
            if p.address_prefix() {
                let _ = p.is_prefix_only();
            }
        }
    }
}
