//! IPv4 dotted-quad addresses and CIDR prefixes.

use super::{Scanner, bounded_decimal};

pub(crate) struct Ipv4<'a> {
    scanner: Scanner<'a>,
    octets: Vec<u8>,
    prefix_len: u32,
}

impl<'a> Ipv4<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            scanner: Scanner::new(input),
            octets: Vec::with_capacity(4),
            prefix_len: 0,
        }
    }

    /// `dec-octet "." dec-octet "." dec-octet "." dec-octet`, consuming all input.
    pub(crate) fn address(&mut self) -> bool {
        self.address_part() && self.scanner.at_end()
    }

    /// An address followed by `/` and a prefix length of 0-32, consuming all input.
    pub(crate) fn address_prefix(&mut self) -> bool {
        self.address_part()
            && self.scanner.take(b'/')
            && self.prefix_length()
            && self.scanner.at_end()
    }

    /// The address as a big-endian integer; `None` unless four octets were read.
    pub(crate) fn bits(&self) -> Option<u32> {
        let octets: [u8; 4] = self.octets.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(octets))
    }

    /// True when every bit after the prefix length is zero.
    pub(crate) fn is_prefix_only(&self) -> bool {
        let Some(bits) = self.bits() else {
            return false;
        };
        let mask = if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len)
        };
        bits & !mask == 0
    }

    fn address_part(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.dec_octet()
            && self.scanner.take(b'.')
            && self.dec_octet()
            && self.scanner.take(b'.')
            && self.dec_octet()
            && self.scanner.take(b'.')
            && self.dec_octet()
        {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn dec_octet(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.scanner.digit() {
            if self.scanner.since(start).len() > 3 {
                return false;
            }
        }
        match bounded_decimal(self.scanner.since(start), 255) {
            Some(value) => {
                #[allow(clippy::cast_possible_truncation)] // bounded to 255 above
                self.octets.push(value as u8);
                true
            }
            None => false,
        }
    }

    fn prefix_length(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.scanner.digit() {
            if self.scanner.since(start).len() > 2 {
                return false;
            }
        }
        match bounded_decimal(self.scanner.since(start), 32) {
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
        Ipv4::new(s).address()
    }

    #[test]
    fn accepts_canonical_dotted_quads() {
        for s in ["0.0.0.0", "127.0.0.1", "255.255.255.255", "192.168.1.10"] {
            assert!(is_address(s), "{s}");
        }
    }

    #[test]
    fn rejects_malformed_dotted_quads() {
        for s in [
            "",
            "1.2.3",
            "1.2.3.4.5",
            "256.0.0.1",
            "01.2.3.4",
            "1.2.3.4 ",
            "1..3.4",
            "1234.1.1.1",
            "a.b.c.d",
            "1.2.3.4/24",
        ] {
            assert!(!is_address(s), "{s}");
        }
    }

    #[test]
    fn prefixes_and_host_bits() {
        let mut strict = Ipv4::new("192.168.1.0/24");
        assert!(strict.address_prefix());
        assert!(strict.is_prefix_only());

        let mut host = Ipv4::new("192.168.1.1/24");
        assert!(host.address_prefix());
        assert!(!host.is_prefix_only());

        let mut zero = Ipv4::new("0.0.0.0/0");
        assert!(zero.address_prefix());
        assert!(zero.is_prefix_only());

        assert!(Ipv4::new("10.0.0.1/32").address_prefix());
        assert!(!Ipv4::new("10.0.0.0/33").address_prefix());
        assert!(!Ipv4::new("10.0.0.0/08").address_prefix());
        assert!(!Ipv4::new("10.0.0.0/").address_prefix());
        assert!(!Ipv4::new("10.0.0.0").address_prefix());
    }

    #[test]
    fn bits_are_big_endian() {
        let mut ip = Ipv4::new("1.2.3.4");
        assert!(ip.address());
        assert_eq!(ip.bits(), Some(0x0102_0304));
    }

    proptest! {
        #[test]
        fn agrees_with_std_on_rendered_addresses(a: u8, b: u8, c: u8, d: u8) {
            let rendered = std::net::Ipv4Addr::new(a, b, c, d).to_string();
            prop_assert!(is_address(&rendered));
        }

        #[test]
        fn never_panics(s in "\\PC{0,24}") {
            let _ = Ipv4::new(&s).address();
            let _ = Ipv4::new(&s).address_prefix();
        }
    }
}
