//! Hand-written grammars behind the string-format custom functions and the
//! `format` implementation.
//!
//! The address and URI parsers are recursive descent over bytes. Every
//! production that can fail after consuming input records a checkpoint and
//! resets to it on failure, so alternatives can be tried in order.

pub(crate) mod format;
pub(crate) mod ipv4;
pub(crate) mod ipv6;
pub(crate) mod string;
pub(crate) mod uri;

/// Byte cursor shared by the recursive-descent parsers.
#[derive(Debug, Clone)]
pub(crate) struct Scanner<'a> {
    input: &'a [u8],
    index: usize,
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            index: 0,
        }
    }

    pub(crate) fn checkpoint(&self) -> usize {
        self.index
    }

    pub(crate) fn reset(&mut self, checkpoint: usize) {
        self.index = checkpoint;
    }

    pub(crate) fn at_end(&self) -> bool {
        self.index >= self.input.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.index)
    }

    /// Bytes consumed since `checkpoint`.
    pub(crate) fn since(&self, checkpoint: usize) -> &'a [u8] {
        &self.input[checkpoint.min(self.index)..self.index]
    }

    pub(crate) fn skip_to_end(&mut self) {
        self.index = self.input.len();
    }

    pub(crate) fn peek(&self, byte: u8) -> bool {
        self.input.get(self.index) == Some(&byte)
    }

    pub(crate) fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.index).copied()
    }

    pub(crate) fn take(&mut self, byte: u8) -> bool {
        self.take_if(|b| b == byte)
    }

    pub(crate) fn take_if(&mut self, pred: impl Fn(u8) -> bool) -> bool {
        match self.input.get(self.index) {
            Some(&b) if pred(b) => {
                self.index += 1;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn digit(&mut self) -> bool {
        self.take_if(|b| b.is_ascii_digit())
    }

    pub(crate) fn hex_dig(&mut self) -> bool {
        self.take_if(|b| b.is_ascii_hexdigit())
    }

    pub(crate) fn alpha(&mut self) -> bool {
        self.take_if(|b| b.is_ascii_alphabetic())
    }
}

/// Parses an ASCII decimal run, rejecting leading zeros, with an upper bound.
pub(crate) fn bounded_decimal(digits: &[u8], max: u32) -> Option<u32> {
    if digits.is_empty() || (digits.len() > 1 && digits[0] == b'0') {
        return None;
    }
    let mut value: u32 = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(u32::from(d - b'0'))?;
    }
    (value <= max).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scanner_checkpoint_and_reset() {
        let mut s = Scanner::new("ab1");
        let start = s.checkpoint();
        assert!(s.take(b'a') && s.alpha() && s.digit());
        assert!(s.at_end());
        assert_eq!(s.since(start), b"ab1");
        s.reset(start);
        assert!(s.peek(b'a'));
        assert_eq!(s.remaining(), 3);
    }

    #[test]
    fn bounded_decimal_rejects_leading_zero_and_overflow() {
        assert_eq!(bounded_decimal(b"0", 32), Some(0));
        assert_eq!(bounded_decimal(b"32", 32), Some(32));
        assert_eq!(bounded_decimal(b"33", 32), None);
        assert_eq!(bounded_decimal(b"08", 32), None);
        assert_eq!(bounded_decimal(b"", 32), None);
        assert_eq!(bounded_decimal(b"99999999999", u32::MAX), None);
    }
}
