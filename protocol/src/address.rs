//! Target address grammar
//!
//! IPv4 is checked as four dotted decimal octets. IPv6 is checked by a
//! single left-to-right scan into hextet / separator / compression tokens.
//! The IPv6 grammar is deliberately narrower than RFC 4291: embedded IPv4
//! tails and zone identifiers are rejected.

use crate::error::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token count of a fully written IPv6 address (8 hextets + 7 separators)
pub const IPV6_FULL_TOKENS: usize = 15;

/// Longest hextet accepted by the scanner
pub const MAX_HEXTET_LEN: usize = 4;

/// Address family of a validated target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Ipv4,
    Ipv6,
}

/// A validated probe target
///
/// Only constructed through [`Target::parse`], so the address always passed
/// one of the two checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    address: String,
    kind: AddressKind,
}

impl Target {
    /// Normalize and validate a candidate (trim, lower-case, drop CIDR suffix)
    pub fn parse(candidate: &str) -> Result<Self, AddressError> {
        let address = normalize(candidate);
        let kind = classify(&address)?;
        Ok(Self { address, kind })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Trim, lower-case and strip any `/prefix` suffix
pub fn normalize(candidate: &str) -> String {
    let trimmed = candidate.trim();
    let without_prefix = match trimmed.find('/') {
        Some(pos) if pos > 0 => &trimmed[..pos],
        _ => trimmed,
    };
    without_prefix.trim().to_lowercase()
}

/// Classify an already-normalized string
///
/// IPv4 is tried first; the IPv6 rejection reason is reported when both fail.
pub fn classify(address: &str) -> Result<AddressKind, AddressError> {
    if validate_ipv4(address).is_ok() {
        return Ok(AddressKind::Ipv4);
    }
    scan_ipv6(address)?;
    Ok(AddressKind::Ipv6)
}

pub fn is_ipv4(address: &str) -> bool {
    validate_ipv4(address).is_ok()
}

pub fn is_ipv6(address: &str) -> bool {
    scan_ipv6(address).is_ok()
}

/// Dotted-quad check: length 7..=15, exactly three dots, octets 0..=255
pub fn validate_ipv4(address: &str) -> Result<(), AddressError> {
    let address = address.trim();
    let len = address.len();
    if !(7..=15).contains(&len) {
        return Err(AddressError::Length(len));
    }

    let dots = address.matches('.').count();
    if dots != 3 {
        return Err(AddressError::SeparatorCount(dots));
    }

    for part in address.split('.') {
        let numeric = !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        let in_range = numeric && part.parse::<u16>().map(|v| v <= 255).unwrap_or(false);
        if !in_range {
            return Err(AddressError::Octet(part.to_string()));
        }
    }

    Ok(())
}

/// Lexical unit produced by the IPv6 scanner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Run of hex digits (length is only checked after the scan)
    Hextet(String),
    /// Single `:`
    Separator,
    /// `::` zero compression
    Compression,
}

/// Scan an IPv6 candidate into tokens, applying the acceptance rules
///
/// Per byte, in order: the byte must be a hex digit or `:`; the pair starting
/// at the byte must not be `.:`, `:.` or `..`; a `::` (or a `:` directly after
/// a `::`) is a compression marker and only one is allowed. After the scan an
/// uncompressed address needs exactly 15 tokens, no address may exceed 15,
/// and no hextet may exceed 4 digits.
pub fn scan_ipv6(address: &str) -> Result<Vec<Token>, AddressError> {
    let bytes = address.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut hextet = String::new();
    let mut compressed = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if !(b == b':' || b.is_ascii_hexdigit()) {
            return Err(AddressError::ProhibitedByte);
        }

        let next = bytes.get(i + 1).copied();
        if matches!((b, next), (b'.', Some(b':')) | (b':', Some(b'.')) | (b'.', Some(b'.'))) {
            return Err(AddressError::WrongSeparator);
        }

        if b == b':' {
            flush_hextet(&mut hextet, &mut tokens);

            let opens_compression = next == Some(b':') || tokens.last() == Some(&Token::Compression);
            if opens_compression {
                if compressed {
                    return Err(AddressError::DoubleJump);
                }
                compressed = true;
                tokens.push(Token::Compression);
                i += if next == Some(b':') { 2 } else { 1 };
                continue;
            }

            tokens.push(Token::Separator);
            i += 1;
            continue;
        }

        hextet.push(b as char);
        i += 1;
    }
    flush_hextet(&mut hextet, &mut tokens);

    if !compressed && tokens.len() < IPV6_FULL_TOKENS {
        return Err(AddressError::TooShort);
    }
    if tokens.len() > IPV6_FULL_TOKENS {
        return Err(AddressError::TokensOverflow);
    }
    let too_long = tokens.iter().any(|t| matches!(t, Token::Hextet(h) if h.len() > MAX_HEXTET_LEN));
    if too_long {
        return Err(AddressError::HextetTooLong);
    }

    Ok(tokens)
}

fn flush_hextet(hextet: &mut String, tokens: &mut Vec<Token>) {
    if !hextet.is_empty() {
        tokens.push(Token::Hextet(std::mem::take(hextet)));
    }
}

/// Pull addresses out of a target list, one per line
///
/// Lines are trimmed and lower-cased; blank lines and `#` comments are
/// skipped. Order and duplicates are preserved.
pub fn extract_addresses(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| is_ipv4(line) || is_ipv6(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_valid() {
        for addr in ["1.1.1.1", "0.0.0.0", "255.255.255.255", "192.168.10.200", "010.001.000.009"] {
            assert!(is_ipv4(addr), "{addr} should be valid");
        }
    }

    #[test]
    fn test_ipv4_invalid() {
        assert_eq!(validate_ipv4("1.1.1"), Err(AddressError::Length(5)));
        assert_eq!(validate_ipv4("1.1.1.1.1"), Err(AddressError::SeparatorCount(4)));
        assert_eq!(validate_ipv4("256.1.1.1"), Err(AddressError::Octet("256".into())));
        assert!(validate_ipv4("1.1.1.-1").is_err());
        assert!(validate_ipv4("a.b.c.d.e").is_err());
        assert!(validate_ipv4("1.1..11").is_err());
        assert!(validate_ipv4("1111.1.1.1").is_err());
        assert!(validate_ipv4("1000.1000.1000.1").is_err());
    }

    #[test]
    fn test_ipv6_compressed() {
        let tokens = scan_ipv6("2001:db8::1").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Hextet("2001".into()),
                Token::Separator,
                Token::Hextet("db8".into()),
                Token::Compression,
                Token::Hextet("1".into()),
            ]
        );
        assert!(is_ipv6("::"));
        assert!(is_ipv6("::1"));
        assert!(is_ipv6("fe80::"));
        assert!(is_ipv6("2001:DB8::A"));
    }

    #[test]
    fn test_ipv6_full() {
        assert!(is_ipv6("2001:0db8:0000:0000:0000:ff00:0042:8329"));
        assert_eq!(scan_ipv6("1:2:3:4:5:6:7:8").unwrap().len(), IPV6_FULL_TOKENS);
    }

    #[test]
    fn test_ipv6_double_jump() {
        assert_eq!(scan_ipv6("2001:db8:::1"), Err(AddressError::DoubleJump));
        assert_eq!(scan_ipv6("2001::db8::1"), Err(AddressError::DoubleJump));
        assert_eq!(scan_ipv6(":::"), Err(AddressError::DoubleJump));
    }

    #[test]
    fn test_ipv6_too_short() {
        assert_eq!(scan_ipv6("2001:db8:1"), Err(AddressError::TooShort));
        assert_eq!(scan_ipv6(""), Err(AddressError::TooShort));
        assert_eq!(scan_ipv6("1:2:3:4:5:6:7"), Err(AddressError::TooShort));
    }

    #[test]
    fn test_ipv6_overflow_and_long_hextet() {
        assert_eq!(scan_ipv6("1:2:3:4:5:6:7:8:9"), Err(AddressError::TokensOverflow));
        assert_eq!(scan_ipv6("1:2:3:4:5:6:7:8:"), Err(AddressError::TokensOverflow));
        assert_eq!(scan_ipv6("2001:db8::12345"), Err(AddressError::HextetTooLong));
    }

    #[test]
    fn test_ipv6_rejects_foreign_bytes() {
        assert_eq!(scan_ipv6("2001:db8::g"), Err(AddressError::ProhibitedByte));
        assert_eq!(scan_ipv6("fe80::1%eth0"), Err(AddressError::ProhibitedByte));
        // embedded IPv4 tail
        assert_eq!(scan_ipv6("::ffff:1.2.3.4"), Err(AddressError::ProhibitedByte));
        assert_eq!(scan_ipv6(" ::1"), Err(AddressError::ProhibitedByte));
        assert_eq!(scan_ipv6("2001:.db8::1"), Err(AddressError::WrongSeparator));
    }

    #[test]
    fn test_target_parse_normalizes() {
        let t = Target::parse("  10.0.0.0/8 ").unwrap();
        assert_eq!(t.address(), "10.0.0.0");
        assert_eq!(t.kind(), AddressKind::Ipv4);

        let t = Target::parse("2001:DB8::1/64").unwrap();
        assert_eq!(t.address(), "2001:db8::1");
        assert_eq!(t.kind(), AddressKind::Ipv6);

        assert!(Target::parse("example.com").is_err());
        assert!(Target::parse("").is_err());
    }

    #[test]
    fn test_extract_addresses() {
        let text = "# resolvers\n8.8.8.8\n\n  2001:4860:4860::8888  \nnot-an-ip\n8.8.8.8\n#1.1.1.1\nFE80::1\n";
        assert_eq!(
            extract_addresses(text),
            vec!["8.8.8.8", "2001:4860:4860::8888", "8.8.8.8", "fe80::1"]
        );
    }
}
