//! RFC 3986 URI and URI-reference recognizer.
//!
//! ```text
//! URI           = scheme ":" hier-part [ "?" query ] [ "#" fragment ]
//! URI-reference = URI / relative-ref
//! relative-ref  = relative-part [ "?" query ] [ "#" fragment ]
//! authority     = [ userinfo "@" ] host [ ":" port ]
//! host          = IP-literal / IPv4address / reg-name
//! ```

use super::Scanner;
use super::ipv6::Ipv6;

pub(crate) struct Uri<'a> {
    scanner: Scanner<'a>,
    pct_encoded_found: bool,
}

impl<'a> Uri<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            scanner: Scanner::new(input),
            pct_encoded_found: false,
        }
    }

    /// An absolute URI consuming all input.
    pub(crate) fn uri(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if !(self.scheme() && self.scanner.take(b':') && self.hier_part()) {
            self.scanner.reset(start);
            return false;
        }
        self.query_and_fragment(start)
    }

    /// A URI or a relative reference, consuming all input.
    pub(crate) fn uri_reference(&mut self) -> bool {
        self.uri() || self.relative_ref()
    }

    fn relative_ref(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if !self.relative_part() {
            return false;
        }
        self.query_and_fragment(start)
    }

    fn query_and_fragment(&mut self, start: usize) -> bool {
        if self.scanner.take(b'?') && !self.query() {
            self.scanner.reset(start);
            return false;
        }
        if self.scanner.take(b'#') && !self.fragment() {
            self.scanner.reset(start);
            return false;
        }
        if !self.scanner.at_end() {
            self.scanner.reset(start);
            return false;
        }
        true
    }

    fn hier_part(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.take(b'/')
            && self.scanner.take(b'/')
            && self.authority()
            && self.path_abempty()
        {
            return true;
        }
        self.scanner.reset(start);
        self.path_absolute() || self.path_rootless() || self.path_empty()
    }

    fn relative_part(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.take(b'/')
            && self.scanner.take(b'/')
            && self.authority()
            && self.path_abempty()
        {
            return true;
        }
        self.scanner.reset(start);
        self.path_absolute() || self.path_noscheme() || self.path_empty()
    }

    /// `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`, only when followed by `:`.
    fn scheme(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.alpha() {
            while self
                .scanner
                .take_if(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
            {}
            if self.scanner.peek(b':') {
                return true;
            }
        }
        self.scanner.reset(start);
        false
    }

    fn authority(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.userinfo() && !self.scanner.take(b'@') {
            self.scanner.reset(start);
            return false;
        }
        if !self.host() {
            self.scanner.reset(start);
            return false;
        }
        if self.scanner.take(b':') && !self.port() {
            self.scanner.reset(start);
            return false;
        }
        if !self.is_authority_end() {
            self.scanner.reset(start);
            return false;
        }
        true
    }

    fn is_authority_end(&self) -> bool {
        self.scanner
            .peek_byte()
            .is_none_or(|b| matches!(b, b'?' | b'#' | b'/'))
    }

    fn is_path_end(&self) -> bool {
        self.scanner
            .peek_byte()
            .is_none_or(|b| matches!(b, b'?' | b'#'))
    }

    /// `*( unreserved / pct-encoded / sub-delims / ":" )`, only when followed by `@`.
    fn userinfo(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.unreserved() || self.pct_encoded() || self.sub_delims() || self.scanner.take(b':')
        {}
        if self.scanner.peek(b'@') {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn host(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        self.pct_encoded_found = false;
        // IPv4address is a subset of reg-name.
        if (self.scanner.peek(b'[') && self.ip_literal()) || self.reg_name() {
            if self.pct_encoded_found {
                // Percent-encoding in a host may only represent UTF-8 sequences.
                return percent_decode(self.scanner.since(start))
                    .is_some_and(|bytes| String::from_utf8(bytes).is_ok());
            }
            return true;
        }
        false
    }

    fn port(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.scanner.digit() {}
        if self.is_authority_end() {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn ip_literal(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.take(b'[') {
            let inner = self.scanner.checkpoint();
            if self.ipv6_addrz() && self.scanner.take(b']') {
                return true;
            }
            self.scanner.reset(inner);
            if self.ipv6_address() && self.scanner.take(b']') {
                return true;
            }
            self.scanner.reset(inner);
            if self.ipv_future() && self.scanner.take(b']') {
                return true;
            }
        }
        self.scanner.reset(start);
        false
    }

    fn ipv6_address(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.scanner.hex_dig() || self.scanner.take(b':') || self.scanner.take(b'.') {}
        let candidate = std::str::from_utf8(self.scanner.since(start)).unwrap_or_default();
        if !candidate.is_empty() && Ipv6::new(candidate).address() {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    /// `IPv6address "%25" ZoneID`
    fn ipv6_addrz(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.ipv6_address()
            && self.scanner.take(b'%')
            && self.scanner.take(b'2')
            && self.scanner.take(b'5')
            && self.zone_id()
        {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn zone_id(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.unreserved() || self.pct_encoded() {}
        if self.scanner.checkpoint() > start {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    /// `"v" 1*HEXDIG "." 1*( unreserved / sub-delims / ":" )`
    fn ipv_future(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.take(b'v') && self.scanner.hex_dig() {
            while self.scanner.hex_dig() {}
            if self.scanner.take(b'.') {
                let mut count = 0;
                while self.unreserved() || self.sub_delims() || self.scanner.take(b':') {
                    count += 1;
                }
                if count >= 1 {
                    return true;
                }
            }
        }
        self.scanner.reset(start);
        false
    }

    /// `*( unreserved / pct-encoded / sub-delims )`; may be empty.
    fn reg_name(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.unreserved() || self.pct_encoded() || self.sub_delims() {}
        if self.is_authority_end() || self.scanner.peek(b':') {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn path_abempty(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.scanner.take(b'/') {
            self.segment();
        }
        if self.is_path_end() {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn path_absolute(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.take(b'/') {
            if self.segment_nz() {
                while self.scanner.take(b'/') {
                    self.segment();
                }
            }
            if self.is_path_end() {
                return true;
            }
        }
        self.scanner.reset(start);
        false
    }

    fn path_noscheme(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.segment_nz_nc() {
            while self.scanner.take(b'/') {
                self.segment();
            }
            if self.is_path_end() {
                return true;
            }
        }
        self.scanner.reset(start);
        false
    }

    fn path_rootless(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.segment_nz() {
            while self.scanner.take(b'/') {
                self.segment();
            }
            if self.is_path_end() {
                return true;
            }
        }
        self.scanner.reset(start);
        false
    }

    fn path_empty(&self) -> bool {
        self.is_path_end()
    }

    fn segment(&mut self) {
        while self.pchar() {}
    }

    fn segment_nz(&mut self) -> bool {
        if self.pchar() {
            self.segment();
            return true;
        }
        false
    }

    /// Like `segment-nz` but without `:`, so a relative path cannot pass for a scheme.
    fn segment_nz_nc(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.unreserved() || self.pct_encoded() || self.sub_delims() || self.scanner.take(b'@')
        {}
        self.scanner.checkpoint() > start
    }

    fn pchar(&mut self) -> bool {
        self.unreserved()
            || self.pct_encoded()
            || self.sub_delims()
            || self.scanner.take(b':')
            || self.scanner.take(b'@')
    }

    fn query(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.pchar() || self.scanner.take(b'/') || self.scanner.take(b'?') {}
        if self.scanner.at_end() || self.scanner.peek(b'#') {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn fragment(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        while self.pchar() || self.scanner.take(b'/') || self.scanner.take(b'?') {}
        if self.scanner.at_end() {
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn pct_encoded(&mut self) -> bool {
        let start = self.scanner.checkpoint();
        if self.scanner.take(b'%') && self.scanner.hex_dig() && self.scanner.hex_dig() {
            self.pct_encoded_found = true;
            return true;
        }
        self.scanner.reset(start);
        false
    }

    fn unreserved(&mut self) -> bool {
        self.scanner
            .take_if(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
    }

    fn sub_delims(&mut self) -> bool {
        self.scanner.take_if(|b| {
            matches!(
                b,
                b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'='
            )
        })
    }
}

/// Decodes `%XX` escapes, leaving other bytes untouched.
fn percent_decode(raw: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw.get(i + 1..i + 3)?;
            let hex = std::str::from_utf8(hex).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Some(out)
}
